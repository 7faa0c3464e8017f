//! MQTT telemetry stage.
//!
//! `TelemetryConsumer` competes on the frame queue, converts the frame it
//! wins to the compressed wire form if needed, transmits it, and releases
//! the buffer. The broker connection runs on its own event-loop thread
//! (`MqttRuntime`), which surfaces connection lifecycle (connected,
//! disconnected, subscribed, published, error) as log lines; transport
//! errors are asynchronous and never fatal to the capture loop.

use std::borrow::Cow;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{bail, Result};
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use rumqttc::v5::mqttbytes::v5::Packet;
use rumqttc::v5::mqttbytes::QoS;
use rumqttc::v5::{Client, Connection, ConnectionError, Event, MqttOptions};

use crate::config::{MqttSettings, TelemetrySettings};
use crate::frame::{FrameBuffer, FrameSource, PixelFormat};
use crate::queue::{FrameTaker, QueueError};

/// Telemetry-stage errors. Both are reported and the cycle continues.
#[derive(Clone, Debug)]
pub enum TelemetryError {
    /// Encoding the frame to the wire form failed.
    CompressionFailure(String),
    /// The network publish failed.
    TransportError(String),
}

impl fmt::Display for TelemetryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryError::CompressionFailure(msg) => {
                write!(f, "jpeg compression failed: {}", msg)
            }
            TelemetryError::TransportError(msg) => {
                write!(f, "telemetry transport error: {}", msg)
            }
        }
    }
}

impl std::error::Error for TelemetryError {}

/// Where encoded frames go. The broker connection behind the real
/// implementation is an external collaborator.
pub trait TelemetrySink: Send {
    fn publish(
        &self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
    ) -> Result<(), TelemetryError>;
}

/// Map a configured QoS number to the wire enum.
pub fn qos_from_u8(qos: u8) -> Option<QoS> {
    match qos {
        0 => Some(QoS::AtMostOnce),
        1 => Some(QoS::AtLeastOnce),
        2 => Some(QoS::ExactlyOnce),
        _ => None,
    }
}

/// MQTT client plus the thread driving its event loop.
pub struct MqttRuntime {
    client: Client,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl MqttRuntime {
    /// Start the client and its event-observer thread. Broker availability
    /// is not checked here; connection state arrives asynchronously through
    /// the observer.
    pub fn connect(settings: &MqttSettings) -> Result<Self> {
        let mut options = MqttOptions::new(
            settings.client_id.clone(),
            settings.host.clone(),
            settings.port,
        );
        options.set_keep_alive(settings.keep_alive);

        let (client, connection) = Client::new(options, 10);
        let stop = Arc::new(AtomicBool::new(false));
        let handle = spawn_event_observer(
            connection,
            client.clone(),
            settings.diagnostics_topic.clone(),
            stop.clone(),
        );

        Ok(Self {
            client,
            stop,
            handle: Some(handle),
        })
    }

    /// A publish handle sharing this runtime's connection.
    pub fn sink(&self) -> MqttSink {
        MqttSink {
            client: self.client.clone(),
        }
    }

    pub fn disconnect(mut self) -> Result<()> {
        self.stop.store(true, Ordering::SeqCst);
        self.client.disconnect()?;
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        Ok(())
    }
}

fn spawn_event_observer(
    mut connection: Connection,
    client: Client,
    diagnostics_topic: String,
    stop: Arc<AtomicBool>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        for event in connection.iter() {
            if stop.load(Ordering::SeqCst) {
                break;
            }
            match event {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    log::info!("mqtt connected");
                }
                Ok(Event::Incoming(Packet::Disconnect(_))) => {
                    log::info!("mqtt disconnected");
                }
                Ok(Event::Incoming(Packet::SubAck(ack))) => {
                    log::info!("mqtt subscribed, msg_id={}", ack.pkid);
                    // Confirm the round trip with a diagnostic publish.
                    if let Err(e) =
                        client.publish(&diagnostics_topic, QoS::AtMostOnce, false, "data")
                    {
                        log::warn!("diagnostic publish failed: {}", e);
                    }
                }
                Ok(Event::Incoming(Packet::PubAck(ack))) => {
                    log::debug!("mqtt published, msg_id={}", ack.pkid);
                }
                Ok(_) => {}
                Err(ConnectionError::Io(e)) => {
                    log::warn!("mqtt transport error: {} (os error {:?})", e, e.raw_os_error());
                    std::thread::sleep(Duration::from_secs(1));
                }
                Err(e) => {
                    log::warn!("mqtt connection error: {}", e);
                    std::thread::sleep(Duration::from_secs(1));
                }
            }
        }
    })
}

/// Publish handle backed by the shared rumqttc client.
#[derive(Clone)]
pub struct MqttSink {
    client: Client,
}

impl TelemetrySink for MqttSink {
    fn publish(
        &self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
    ) -> Result<(), TelemetryError> {
        // The broker-assigned message id surfaces in the PubAck event on the
        // observer thread, not here.
        self.client
            .publish(topic, qos, retain, payload.to_vec())
            .map_err(|e| TelemetryError::TransportError(e.to_string()))
    }
}

/// Consumes frames from the queue and ships them to the sink.
pub struct TelemetryConsumer<S> {
    taker: FrameTaker,
    sink: S,
    source: Arc<dyn FrameSource>,
    settings: TelemetrySettings,
    qos: QoS,
}

impl<S: TelemetrySink> TelemetryConsumer<S> {
    pub fn new(
        taker: FrameTaker,
        sink: S,
        source: Arc<dyn FrameSource>,
        settings: TelemetrySettings,
    ) -> Self {
        let qos = qos_from_u8(settings.qos).unwrap_or(QoS::AtMostOnce);
        Self {
            taker,
            sink,
            source,
            settings,
            qos,
        }
    }

    /// Handle one frame: take, encode if raw, transmit, release.
    ///
    /// The wait on the queue is bounded: when a competing consumer wins
    /// every pending frame, this fails closed instead of stalling the
    /// capture loop. The original buffer is released on every path once a
    /// frame was taken; a temporary encoded buffer is freed right after
    /// transmission.
    pub fn handle(&mut self) -> Result<()> {
        let frame = match self.taker.take_timeout(self.settings.take_wait) {
            Ok(frame) => frame,
            Err(QueueError::Timeout) => {
                bail!("no frame won this cycle (a competing consumer took it)")
            }
            Err(QueueError::Closed) => bail!(QueueError::Closed),
        };

        let outcome = self.transmit(&frame);
        if let Err(e) = self
            .source
            .release(frame, self.settings.return_to_pool)
        {
            log::warn!("frame release failed: {}", e);
        }
        Ok(outcome?)
    }

    fn transmit(&self, frame: &FrameBuffer) -> Result<(), TelemetryError> {
        let payload: Cow<'_, [u8]> = if frame.format == PixelFormat::Jpeg {
            Cow::Borrowed(frame.data())
        } else {
            Cow::Owned(encode_jpeg(frame, self.settings.jpeg_quality)?)
        };
        self.sink
            .publish(&self.settings.topic, &payload, self.qos, self.settings.retain)
    }
}

/// Encode a raw frame to JPEG at the configured quality.
fn encode_jpeg(frame: &FrameBuffer, quality: u8) -> Result<Vec<u8>, TelemetryError> {
    let (raw, color): (Cow<'_, [u8]>, ExtendedColorType) = match frame.format {
        PixelFormat::Jpeg => return Ok(frame.data().to_vec()),
        PixelFormat::Grayscale => (Cow::Borrowed(frame.data()), ExtendedColorType::L8),
        PixelFormat::Yuv422 => (Cow::Owned(yuv422_luma(frame.data())), ExtendedColorType::L8),
        PixelFormat::Rgb565 => (
            Cow::Owned(rgb565_to_rgb8(frame.data())),
            ExtendedColorType::Rgb8,
        ),
    };

    let mut encoded = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut encoded, quality);
    encoder
        .encode(&raw, frame.width, frame.height, color)
        .map_err(|e| TelemetryError::CompressionFailure(e.to_string()))?;
    Ok(encoded)
}

/// Luma plane of packed YUYV data.
fn yuv422_luma(data: &[u8]) -> Vec<u8> {
    data.iter().step_by(2).copied().collect()
}

/// Unpack little-endian RGB565 into 8-bit RGB.
fn rgb565_to_rgb8(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() / 2 * 3);
    for pair in data.chunks_exact(2) {
        let v = u16::from_le_bytes([pair[0], pair[1]]);
        let r = ((v >> 11) & 0x1f) as u8;
        let g = ((v >> 5) & 0x3f) as u8;
        let b = (v & 0x1f) as u8;
        out.push((r << 3) | (r >> 2));
        out.push((g << 2) | (g >> 4));
        out.push((b << 3) | (b >> 2));
    }
    out
}
