//! autoeyed - AutoEye pipeline daemon
//!
//! This daemon:
//! 1. Captures frames from the configured source
//! 2. Classifies each capture through the pull-based signal adapter
//! 3. Publishes frame handles to the bounded queue
//! 4. Runs the MQTT telemetry consumer and the stream consumer against that
//!    queue (each frame goes to exactly one of them)
//! 5. Shuts down cleanly on ctrl-c

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use autoeye::{
    AppConfig, CaptureLoop, ClassifierRunner, FrameQueue, MqttRuntime, StreamConsumer,
    StubEngine, StubFrameConfig, StubFrameSource, TelemetryConsumer, QUEUE_DEPTH,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "AutoEye edge vision pipeline daemon")]
struct Args {
    /// MQTT broker address (host:port).
    #[arg(long, env = "AUTOEYE_MQTT_ADDR")]
    mqtt_addr: Option<String>,

    /// Telemetry topic for encoded frames.
    #[arg(long, env = "AUTOEYE_TOPIC")]
    topic: Option<String>,

    /// Capture pacing in milliseconds.
    #[arg(long, env = "AUTOEYE_PACE_MS")]
    pace_ms: Option<u64>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    // Push flag values into the AUTOEYE_* variables so AppConfig::load sees
    // one override channel, whichever way the value arrived.
    if let Some(addr) = &args.mqtt_addr {
        std::env::set_var("AUTOEYE_MQTT_ADDR", addr);
    }
    if let Some(topic) = &args.topic {
        std::env::set_var("AUTOEYE_TOPIC", topic);
    }
    if let Some(pace) = args.pace_ms {
        std::env::set_var("AUTOEYE_PACE_MS", pace.to_string());
    }

    let cfg = AppConfig::load().context("load configuration")?;

    // Camera bring-up is fatal at startup. The stub stands in for the sensor
    // driver; a real driver implements FrameSource the same way.
    let source = Arc::new(StubFrameSource::new(StubFrameConfig {
        width: cfg.capture.width,
        height: cfg.capture.height,
        pool_slots: cfg.capture.pool_slots,
        ..StubFrameConfig::default()
    }));

    let expected = (cfg.capture.width * cfg.capture.height) as usize;
    let runner = ClassifierRunner::new(StubEngine::new(expected));

    let (publisher, taker) = FrameQueue::bounded(QUEUE_DEPTH);

    let mqtt = MqttRuntime::connect(&cfg.mqtt).context("mqtt bring-up")?;
    let telemetry = TelemetryConsumer::new(
        taker.clone(),
        mqtt.sink(),
        source.clone(),
        cfg.telemetry.clone(),
    );

    let stream = StreamConsumer::spawn(
        taker,
        source.clone(),
        cfg.telemetry.return_to_pool,
        |frame| {
            // Stream transport is an external collaborator; the daemon only
            // proves the frame made it to this side of the race.
            log::debug!("stream frame: {} bytes, {:?}", frame.len(), frame.format);
            Ok(())
        },
    );

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = shutdown.clone();
    ctrlc::set_handler(move || {
        log::info!("shutdown requested");
        shutdown_flag.store(true, Ordering::SeqCst);
    })
    .context("install ctrl-c handler")?;

    log::info!(
        "autoeyed running: {}x{} capture, broker {}:{}, topic {}",
        cfg.capture.width,
        cfg.capture.height,
        cfg.mqtt.host,
        cfg.mqtt.port,
        cfg.telemetry.topic
    );

    let mut capture = CaptureLoop::new(
        source,
        publisher,
        runner,
        telemetry,
        cfg.capture.pace,
        shutdown,
    );
    capture.run();

    // Dropping the loop drops the last publisher; the stream consumer sees
    // the queue close and drains out.
    drop(capture);
    stream.join();
    mqtt.disconnect()?;
    log::info!("autoeyed stopped");
    Ok(())
}
