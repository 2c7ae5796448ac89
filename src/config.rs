use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::capture::CaptureTiming;
use crate::ingest::SourceSettings;
use crate::zones::{Zone, ZoneTable};

const DEFAULT_API_ADDR: &str = "127.0.0.1:8000";
const DEFAULT_CAMERAS_PATH: &str = "cameras.json";
const DEFAULT_ZONE: &str = "main";
const DEFAULT_CONNECT_BACKOFF_MS: u64 = 5_000;
const DEFAULT_RECONNECT_DELAY_MS: u64 = 1_000;
const DEFAULT_POLL_INTERVAL_MS: u64 = 100;
const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 3_000;
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_READ_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_MIN_CONFIDENCE: f32 = 0.25;
const DEFAULT_INPUT_SIZE: u32 = 640;
const DEFAULT_STREAM_FPS: u32 = 30;
const DEFAULT_JPEG_QUALITY: u8 = 80;

#[derive(Debug, Deserialize, Default)]
struct CrowdsenseConfigFile {
    api: Option<ApiConfigFile>,
    cameras_path: Option<PathBuf>,
    legacy_camera_url: Option<String>,
    default_zone: Option<String>,
    capture: Option<CaptureConfigFile>,
    detection: Option<DetectionConfigFile>,
    stream: Option<StreamConfigFile>,
    zones: Option<Vec<Zone>>,
}

#[derive(Debug, Deserialize, Default)]
struct ApiConfigFile {
    addr: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct CaptureConfigFile {
    connect_backoff_ms: Option<u64>,
    reconnect_delay_ms: Option<u64>,
    poll_interval_ms: Option<u64>,
    shutdown_grace_ms: Option<u64>,
    connect_timeout_ms: Option<u64>,
    read_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectionConfigFile {
    min_confidence: Option<f32>,
    model_path: Option<PathBuf>,
    input_size: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct StreamConfigFile {
    fps: Option<u32>,
    jpeg_quality: Option<u8>,
}

#[derive(Debug, Clone)]
pub struct CrowdsenseConfig {
    pub api_addr: String,
    pub cameras_path: PathBuf,
    /// Single-camera deployments: registered as camera `default` when the
    /// persisted camera list is empty.
    pub legacy_camera_url: Option<String>,
    pub default_zone: String,
    pub capture: CaptureSettings,
    pub detection: DetectionSettings,
    pub stream: StreamSettings,
    pub zones: Vec<Zone>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureSettings {
    pub connect_backoff: Duration,
    pub reconnect_delay: Duration,
    pub poll_interval: Duration,
    pub shutdown_grace: Duration,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

impl CaptureSettings {
    pub fn timing(&self) -> CaptureTiming {
        CaptureTiming {
            connect_backoff: self.connect_backoff,
            reconnect_delay: self.reconnect_delay,
            poll_interval: self.poll_interval,
        }
    }

    pub fn source_settings(&self) -> SourceSettings {
        SourceSettings {
            connect_timeout: self.connect_timeout,
            read_timeout: self.read_timeout,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectionSettings {
    pub min_confidence: f32,
    pub model_path: Option<PathBuf>,
    pub input_size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSettings {
    pub fps: u32,
    pub jpeg_quality: u8,
}

impl Default for CrowdsenseConfig {
    fn default() -> Self {
        Self::from_file(CrowdsenseConfigFile::default())
    }
}

impl CrowdsenseConfig {
    /// File named by `CROWDSENSE_CONFIG` (if set), then env overrides, then
    /// validation.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("CROWDSENSE_CONFIG")
            .ok()
            .filter(|path| !path.trim().is_empty())
            .map(PathBuf::from);
        Self::load_from(config_path.as_deref())
    }

    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => read_config_file(path)?,
            None => CrowdsenseConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: CrowdsenseConfigFile) -> Self {
        let capture = file.capture.unwrap_or_default();
        let detection = file.detection.unwrap_or_default();
        let stream = file.stream.unwrap_or_default();
        Self {
            api_addr: file
                .api
                .and_then(|api| api.addr)
                .unwrap_or_else(|| DEFAULT_API_ADDR.to_string()),
            cameras_path: file
                .cameras_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CAMERAS_PATH)),
            legacy_camera_url: file.legacy_camera_url.filter(|url| !url.trim().is_empty()),
            default_zone: file
                .default_zone
                .unwrap_or_else(|| DEFAULT_ZONE.to_string()),
            capture: CaptureSettings {
                connect_backoff: millis(capture.connect_backoff_ms, DEFAULT_CONNECT_BACKOFF_MS),
                reconnect_delay: millis(capture.reconnect_delay_ms, DEFAULT_RECONNECT_DELAY_MS),
                poll_interval: millis(capture.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS),
                shutdown_grace: millis(capture.shutdown_grace_ms, DEFAULT_SHUTDOWN_GRACE_MS),
                connect_timeout: millis(capture.connect_timeout_ms, DEFAULT_CONNECT_TIMEOUT_MS),
                read_timeout: millis(capture.read_timeout_ms, DEFAULT_READ_TIMEOUT_MS),
            },
            detection: DetectionSettings {
                min_confidence: detection.min_confidence.unwrap_or(DEFAULT_MIN_CONFIDENCE),
                model_path: detection.model_path,
                input_size: detection.input_size.unwrap_or(DEFAULT_INPUT_SIZE),
            },
            stream: StreamSettings {
                fps: stream.fps.unwrap_or(DEFAULT_STREAM_FPS),
                jpeg_quality: stream.jpeg_quality.unwrap_or(DEFAULT_JPEG_QUALITY),
            },
            zones: file
                .zones
                .unwrap_or_else(|| ZoneTable::default_grid().zones().to_vec()),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(addr) = env_value("CROWDSENSE_API_ADDR") {
            self.api_addr = addr;
        }
        if let Some(path) = env_value("CROWDSENSE_CAMERAS_PATH") {
            self.cameras_path = PathBuf::from(path);
        }
        if let Some(url) = env_value("CROWDSENSE_CAMERA_URL") {
            self.legacy_camera_url = Some(url);
        }
        if let Some(zone) = env_value("CROWDSENSE_DEFAULT_ZONE") {
            self.default_zone = zone;
        }
        if let Some(path) = env_value("CROWDSENSE_MODEL_PATH") {
            self.detection.model_path = Some(PathBuf::from(path));
        }
        if let Some(grace) = env_value("CROWDSENSE_SHUTDOWN_GRACE_MS") {
            let ms: u64 = grace.parse().map_err(|_| {
                anyhow!("CROWDSENSE_SHUTDOWN_GRACE_MS must be an integer number of milliseconds")
            })?;
            self.capture.shutdown_grace = Duration::from_millis(ms);
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if self.api_addr.trim().is_empty() {
            return Err(anyhow!("api.addr must not be empty"));
        }
        self.default_zone = self.default_zone.trim().to_string();
        if self.default_zone.is_empty() {
            return Err(anyhow!("default_zone must not be empty"));
        }

        let capture = &self.capture;
        for (name, value) in [
            ("capture.connect_backoff_ms", capture.connect_backoff),
            ("capture.reconnect_delay_ms", capture.reconnect_delay),
            ("capture.poll_interval_ms", capture.poll_interval),
            ("capture.connect_timeout_ms", capture.connect_timeout),
            ("capture.read_timeout_ms", capture.read_timeout),
        ] {
            if value.is_zero() {
                return Err(anyhow!("{} must be greater than zero", name));
            }
        }
        if capture.poll_interval > Duration::from_secs(1) {
            return Err(anyhow!("capture.poll_interval_ms must be at most 1000"));
        }

        if !(0.0..=1.0).contains(&self.detection.min_confidence) {
            return Err(anyhow!("detection.min_confidence must be within [0, 1]"));
        }
        if self.detection.input_size == 0 {
            return Err(anyhow!("detection.input_size must be greater than zero"));
        }
        if self.stream.fps == 0 {
            return Err(anyhow!("stream.fps must be greater than zero"));
        }
        if !(1..=100).contains(&self.stream.jpeg_quality) {
            return Err(anyhow!("stream.jpeg_quality must be within [1, 100]"));
        }
        for zone in &self.zones {
            zone.validate()?;
        }
        Ok(())
    }

    pub fn zone_table(&self) -> Result<ZoneTable> {
        ZoneTable::new(self.zones.clone())
    }
}

fn millis(value: Option<u64>, default: u64) -> Duration {
    Duration::from_millis(value.unwrap_or(default))
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn read_config_file(path: &Path) -> Result<CrowdsenseConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}
