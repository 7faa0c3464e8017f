use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::frame::DEFAULT_POOL_SLOTS;

const DEFAULT_BROKER_ADDR: &str = "127.0.0.1:1883";
const DEFAULT_CLIENT_ID: &str = "autoeyed";
const DEFAULT_KEEP_ALIVE_SECS: u64 = 30;
const DEFAULT_DIAGNOSTICS_TOPIC: &str = "autoeye/diag";
const DEFAULT_TOPIC: &str = "autoeye/frames";
const DEFAULT_QOS: u8 = 1;
const DEFAULT_JPEG_QUALITY: u8 = 60;
const DEFAULT_TAKE_WAIT_MS: u64 = 1000;
const DEFAULT_WIDTH: u32 = 96;
const DEFAULT_HEIGHT: u32 = 96;
const DEFAULT_PACE_MS: u64 = 700;

#[derive(Debug, Deserialize, Default)]
struct AppConfigFile {
    capture: Option<CaptureConfigFile>,
    mqtt: Option<MqttConfigFile>,
    telemetry: Option<TelemetryConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CaptureConfigFile {
    width: Option<u32>,
    height: Option<u32>,
    pool_slots: Option<usize>,
    pace_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct MqttConfigFile {
    broker_addr: Option<String>,
    client_id: Option<String>,
    keep_alive_secs: Option<u64>,
    diagnostics_topic: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct TelemetryConfigFile {
    topic: Option<String>,
    qos: Option<u8>,
    retain: Option<bool>,
    jpeg_quality: Option<u8>,
    return_to_pool: Option<bool>,
    take_wait_ms: Option<u64>,
}

/// Fully validated application configuration. Components receive their
/// settings struct at construction; nothing is read from ambient state
/// after startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub capture: CaptureSettings,
    pub mqtt: MqttSettings,
    pub telemetry: TelemetrySettings,
}

#[derive(Debug, Clone)]
pub struct CaptureSettings {
    pub width: u32,
    pub height: u32,
    pub pool_slots: usize,
    pub pace: Duration,
}

#[derive(Debug, Clone)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub keep_alive: Duration,
    pub diagnostics_topic: String,
}

#[derive(Debug, Clone)]
pub struct TelemetrySettings {
    pub topic: String,
    /// QoS level 0..=2.
    pub qos: u8,
    pub retain: bool,
    /// 1..=100.
    pub jpeg_quality: u8,
    pub return_to_pool: bool,
    /// Bounded wait for a queued frame before failing closed.
    pub take_wait: Duration,
}

impl AppConfig {
    /// Load from the file named by `AUTOEYE_CONFIG` (if set), apply env
    /// overrides, validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("AUTOEYE_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => read_config_file(Path::new(path))?,
            None => AppConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: AppConfigFile) -> Self {
        let capture = file.capture.unwrap_or_default();
        let mqtt = file.mqtt.unwrap_or_default();
        let telemetry = file.telemetry.unwrap_or_default();
        Self {
            capture: CaptureSettings {
                width: capture.width.unwrap_or(DEFAULT_WIDTH),
                height: capture.height.unwrap_or(DEFAULT_HEIGHT),
                pool_slots: capture.pool_slots.unwrap_or(DEFAULT_POOL_SLOTS),
                pace: Duration::from_millis(capture.pace_ms.unwrap_or(DEFAULT_PACE_MS)),
            },
            mqtt: MqttSettings {
                // host/port split happens in validate().
                host: mqtt
                    .broker_addr
                    .unwrap_or_else(|| DEFAULT_BROKER_ADDR.to_string()),
                port: 0,
                client_id: mqtt
                    .client_id
                    .unwrap_or_else(|| DEFAULT_CLIENT_ID.to_string()),
                keep_alive: Duration::from_secs(
                    mqtt.keep_alive_secs.unwrap_or(DEFAULT_KEEP_ALIVE_SECS),
                ),
                diagnostics_topic: mqtt
                    .diagnostics_topic
                    .unwrap_or_else(|| DEFAULT_DIAGNOSTICS_TOPIC.to_string()),
            },
            telemetry: TelemetrySettings {
                topic: telemetry.topic.unwrap_or_else(|| DEFAULT_TOPIC.to_string()),
                qos: telemetry.qos.unwrap_or(DEFAULT_QOS),
                retain: telemetry.retain.unwrap_or(false),
                jpeg_quality: telemetry.jpeg_quality.unwrap_or(DEFAULT_JPEG_QUALITY),
                return_to_pool: telemetry.return_to_pool.unwrap_or(true),
                take_wait: Duration::from_millis(
                    telemetry.take_wait_ms.unwrap_or(DEFAULT_TAKE_WAIT_MS),
                ),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(addr) = std::env::var("AUTOEYE_MQTT_ADDR") {
            if !addr.trim().is_empty() {
                self.mqtt.host = addr;
            }
        }
        if let Ok(client_id) = std::env::var("AUTOEYE_MQTT_CLIENT_ID") {
            if !client_id.trim().is_empty() {
                self.mqtt.client_id = client_id;
            }
        }
        if let Ok(topic) = std::env::var("AUTOEYE_TOPIC") {
            if !topic.trim().is_empty() {
                self.telemetry.topic = topic;
            }
        }
        if let Ok(pace) = std::env::var("AUTOEYE_PACE_MS") {
            let ms: u64 = pace
                .parse()
                .map_err(|_| anyhow!("AUTOEYE_PACE_MS must be an integer number of ms"))?;
            self.capture.pace = Duration::from_millis(ms);
        }
        if let Ok(quality) = std::env::var("AUTOEYE_JPEG_QUALITY") {
            self.telemetry.jpeg_quality = quality
                .parse()
                .map_err(|_| anyhow!("AUTOEYE_JPEG_QUALITY must be an integer 1-100"))?;
        }
        if let Ok(qos) = std::env::var("AUTOEYE_QOS") {
            self.telemetry.qos = qos
                .parse()
                .map_err(|_| anyhow!("AUTOEYE_QOS must be 0, 1 or 2"))?;
        }
        if let Ok(flag) = std::env::var("AUTOEYE_RETURN_TO_POOL") {
            self.telemetry.return_to_pool = match flag.trim() {
                "1" | "true" => true,
                "0" | "false" => false,
                other => return Err(anyhow!("AUTOEYE_RETURN_TO_POOL must be a bool, got {:?}", other)),
            };
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if self.capture.width == 0 || self.capture.height == 0 {
            return Err(anyhow!("capture dimensions must be non-zero"));
        }
        if self.capture.pool_slots == 0 {
            return Err(anyhow!("pool_slots must be at least 1"));
        }
        if self.capture.pace.is_zero() {
            return Err(anyhow!("pace must be greater than zero"));
        }

        // The broker address may still carry a port; split it here.
        let (host, port) = split_broker_addr(&self.mqtt.host)?;
        self.mqtt.host = host;
        self.mqtt.port = port;
        if self.mqtt.client_id.trim().is_empty() {
            return Err(anyhow!("mqtt client_id must not be empty"));
        }

        validate_topic(&self.telemetry.topic)?;
        validate_topic(&self.mqtt.diagnostics_topic)?;
        if self.telemetry.qos > 2 {
            return Err(anyhow!("telemetry qos must be 0, 1 or 2"));
        }
        if !(1..=100).contains(&self.telemetry.jpeg_quality) {
            return Err(anyhow!("jpeg_quality must be 1-100"));
        }
        if self.telemetry.take_wait.is_zero() {
            return Err(anyhow!("take_wait must be greater than zero"));
        }
        Ok(())
    }
}

fn split_broker_addr(addr: &str) -> Result<(String, u16)> {
    match addr.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() => {
            let port: u16 = port
                .parse()
                .map_err(|_| anyhow!("invalid broker port in {:?}", addr))?;
            Ok((host.to_string(), port))
        }
        _ => Err(anyhow!("broker_addr must be host:port, got {:?}", addr)),
    }
}

fn validate_topic(topic: &str) -> Result<()> {
    if topic.trim().is_empty() {
        return Err(anyhow!("mqtt topic must not be empty"));
    }
    if topic.contains('#') || topic.contains('+') {
        return Err(anyhow!(
            "mqtt publish topic must not contain wildcards: {:?}",
            topic
        ));
    }
    Ok(())
}

fn read_config_file(path: &Path) -> Result<AppConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let mut cfg = AppConfig::from_file(AppConfigFile::default());
        cfg.validate().unwrap();
        assert_eq!(cfg.capture.width, 96);
        assert_eq!(cfg.capture.pool_slots, 2);
        assert_eq!(cfg.capture.pace, Duration::from_millis(700));
        assert_eq!(cfg.mqtt.host, "127.0.0.1");
        assert_eq!(cfg.mqtt.port, 1883);
        assert_eq!(cfg.telemetry.jpeg_quality, 60);
        assert!(cfg.telemetry.return_to_pool);
    }

    #[test]
    fn broker_addr_splits_host_and_port() {
        assert_eq!(
            split_broker_addr("broker.local:8883").unwrap(),
            ("broker.local".to_string(), 8883)
        );
        assert!(split_broker_addr("no-port").is_err());
        assert!(split_broker_addr(":1883").is_err());
        assert!(split_broker_addr("host:notaport").is_err());
    }

    #[test]
    fn wildcard_topics_are_rejected() {
        assert!(validate_topic("autoeye/frames").is_ok());
        assert!(validate_topic("autoeye/#").is_err());
        assert!(validate_topic("autoeye/+/frames").is_err());
        assert!(validate_topic(" ").is_err());
    }

    #[test]
    fn zero_pace_is_rejected() {
        let mut cfg = AppConfig::from_file(AppConfigFile {
            capture: Some(CaptureConfigFile {
                pace_ms: Some(0),
                ..CaptureConfigFile::default()
            }),
            ..AppConfigFile::default()
        });
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn file_values_reach_the_settings() {
        let file: AppConfigFile = serde_json::from_str(
            r#"{
                "capture": { "width": 160, "height": 120, "pool_slots": 3, "pace_ms": 250 },
                "mqtt": { "broker_addr": "10.0.0.2:1884", "client_id": "cam-7" },
                "telemetry": { "topic": "fleet/cam-7/frames", "qos": 0, "jpeg_quality": 80 }
            }"#,
        )
        .unwrap();
        let mut cfg = AppConfig::from_file(file);
        cfg.validate().unwrap();

        assert_eq!(cfg.capture.width, 160);
        assert_eq!(cfg.capture.pool_slots, 3);
        assert_eq!(cfg.mqtt.host, "10.0.0.2");
        assert_eq!(cfg.mqtt.port, 1884);
        assert_eq!(cfg.mqtt.client_id, "cam-7");
        assert_eq!(cfg.telemetry.topic, "fleet/cam-7/frames");
        assert_eq!(cfg.telemetry.qos, 0);
        assert_eq!(cfg.telemetry.jpeg_quality, 80);
    }
}
