use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use crate::camera::CameraConfig;

/// Persistence for the camera list.
///
/// `save` always receives the complete list; implementations replace what they
/// held rather than merging.
pub trait CameraStore: Send + Sync {
    fn load(&self) -> Result<Vec<CameraConfig>>;
    fn save(&self, cameras: &[CameraConfig]) -> Result<()>;
}

#[derive(Serialize, Deserialize)]
struct CameraDocument {
    #[serde(default)]
    cameras: Vec<CameraConfig>,
}

/// `{"cameras": [...]}` on disk, replaced atomically on every save.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_else(|| "cameras.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl CameraStore for JsonFileStore {
    fn load(&self) -> Result<Vec<CameraConfig>> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("read camera list {}", self.path.display()))
            }
        };
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        let doc: CameraDocument = serde_json::from_str(&raw)
            .with_context(|| format!("parse camera list {}", self.path.display()))?;
        Ok(doc.cameras)
    }

    fn save(&self, cameras: &[CameraConfig]) -> Result<()> {
        let doc = CameraDocument {
            cameras: cameras.to_vec(),
        };
        let body = serde_json::to_vec_pretty(&doc).context("serialize camera list")?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        let temp = self.temp_path();
        std::fs::write(&temp, body).with_context(|| format!("write {}", temp.display()))?;
        std::fs::rename(&temp, &self.path)
            .with_context(|| format!("replace camera list {}", self.path.display()))?;
        Ok(())
    }
}

/// Volatile store for tests and for running without a config file.
#[derive(Default)]
pub struct InMemoryStore {
    cameras: Mutex<Vec<CameraConfig>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cameras(cameras: Vec<CameraConfig>) -> Self {
        Self {
            cameras: Mutex::new(cameras),
        }
    }

    pub fn snapshot(&self) -> Vec<CameraConfig> {
        self.cameras
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl CameraStore for InMemoryStore {
    fn load(&self) -> Result<Vec<CameraConfig>> {
        Ok(self.snapshot())
    }

    fn save(&self, cameras: &[CameraConfig]) -> Result<()> {
        *self.cameras.lock().unwrap_or_else(PoisonError::into_inner) = cameras.to_vec();
        Ok(())
    }
}
