//! End-to-end pipeline scenarios against the public API.

use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rumqttc::v5::mqttbytes::QoS;

use autoeye::{
    CaptureLoop, ClassifierRunner, CycleOutcome, FrameQueue, FrameSource, InferenceError,
    StreamConsumer, StubEngine, StubFrameConfig, StubFrameSource, TelemetryConsumer,
    TelemetryError, TelemetrySettings, TelemetrySink, QUEUE_DEPTH,
};

const ENGINE_INPUT: usize = 9216;

#[derive(Clone, Default)]
struct RecordingSink {
    published: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl RecordingSink {
    fn count(&self) -> usize {
        self.published.lock().unwrap().len()
    }
}

impl TelemetrySink for RecordingSink {
    fn publish(
        &self,
        _topic: &str,
        payload: &[u8],
        _qos: QoS,
        _retain: bool,
    ) -> Result<(), TelemetryError> {
        self.published.lock().unwrap().push(payload.to_vec());
        Ok(())
    }
}

fn telemetry_settings() -> TelemetrySettings {
    TelemetrySettings {
        topic: "autoeye/frames".to_string(),
        qos: 1,
        retain: false,
        jpeg_quality: 60,
        return_to_pool: true,
        take_wait: Duration::from_millis(100),
    }
}

#[test]
fn classifies_a_full_size_capture() {
    let source = StubFrameSource::new(StubFrameConfig::default());
    let mut runner = ClassifierRunner::new(StubEngine::new(ENGINE_INPUT));

    let frame = source.capture().unwrap().expect("frame");
    assert_eq!(frame.len(), ENGINE_INPUT);

    let result = runner.run(Some(frame.data())).unwrap();
    let reported: Vec<_> = result.reported_detections().collect();
    assert!(!reported.is_empty());
    assert!(reported.iter().all(|det| det.value > 0.0));

    source.release(frame, true).unwrap();
}

#[test]
fn undersized_capture_fails_size_mismatch_without_telemetry() {
    let source = StubFrameSource::new(StubFrameConfig {
        width: 32,
        height: 32,
        ..StubFrameConfig::default()
    });
    let mut runner = ClassifierRunner::new(StubEngine::new(ENGINE_INPUT));
    let sink = RecordingSink::default();

    let frame = source.capture().unwrap().expect("frame");
    assert_eq!(frame.len(), 1024);

    let err = runner.run(Some(frame.data())).unwrap_err();
    assert_eq!(
        err,
        InferenceError::SizeMismatch {
            expected: ENGINE_INPUT,
            actual: 1024
        }
    );
    assert_eq!(runner.engine().invocations(), 0);
    assert_eq!(sink.count(), 0);

    source.release(frame, true).unwrap();
}

#[test]
fn telemetry_round_trip_compresses_and_releases() {
    let source = Arc::new(StubFrameSource::new(StubFrameConfig::default()));
    let (publisher, taker) = FrameQueue::bounded(QUEUE_DEPTH);
    let sink = RecordingSink::default();
    let mut telemetry = TelemetryConsumer::new(
        taker,
        sink.clone(),
        source.clone(),
        telemetry_settings(),
    );

    let frame = source.capture().unwrap().expect("frame");
    publisher.publish(frame).unwrap();

    telemetry.handle().unwrap();

    let published = sink.published.lock().unwrap();
    assert_eq!(published.len(), 1);
    assert_eq!(&published[0][..2], &[0xff, 0xd8]);
    drop(published);

    assert_eq!(source.leased_count(), 0);
}

#[test]
fn competing_consumers_split_the_stream_without_losing_frames() {
    let source = Arc::new(StubFrameSource::new(StubFrameConfig::default()));
    let (publisher, taker) = FrameQueue::bounded(QUEUE_DEPTH);
    let sink = RecordingSink::default();

    let telemetry = TelemetryConsumer::new(
        taker.clone(),
        sink.clone(),
        source.clone(),
        telemetry_settings(),
    );
    let stream = StreamConsumer::spawn(taker, source.clone(), true, |_| Ok(()));

    let runner = ClassifierRunner::new(StubEngine::new(ENGINE_INPUT));
    let mut capture = CaptureLoop::new(
        source.clone(),
        publisher,
        runner,
        telemetry,
        Duration::from_millis(1),
        Arc::new(AtomicBool::new(false)),
    );

    let cycles = 8;
    let mut completed = 0;
    for _ in 0..cycles {
        if capture.run_cycle() == CycleOutcome::Completed {
            completed += 1;
        }
    }

    // Dropping the loop drops the publisher; the stream consumer drains the
    // queue and stops.
    drop(capture);
    let streamed = stream.join() as usize;

    // Every published frame went to exactly one consumer.
    assert_eq!(sink.count() + streamed, completed);
    assert_eq!(source.leased_count(), 0);
}
