//! Control-plane facade over the registry and the capture supervisor.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::camera::{CameraConfig, CameraInfo, CameraUpdate};
use crate::capture::{CaptureTiming, ShutdownReport, Supervisor};
use crate::config::CrowdsenseConfig;
use crate::error::CameraError;
use crate::ingest::SourceOpener;
use crate::reader::FrameReader;
use crate::registry::CameraRegistry;
use crate::store::CameraStore;

pub const LEGACY_CAMERA_ID: &str = "default";
pub const LEGACY_CAMERA_NAME: &str = "Default Camera";

#[derive(Clone, Debug, Default)]
pub struct ManagerSettings {
    pub timing: CaptureTiming,
    pub default_zone: String,
    pub legacy_camera_url: Option<String>,
}

impl ManagerSettings {
    pub fn from_config(config: &CrowdsenseConfig) -> Self {
        Self {
            timing: config.capture.timing(),
            default_zone: config.default_zone.clone(),
            legacy_camera_url: config.legacy_camera_url.clone(),
        }
    }
}

pub struct CameraManager {
    registry: Arc<CameraRegistry>,
    supervisor: Arc<Supervisor>,
    store: Arc<dyn CameraStore>,
    legacy_camera_url: Option<String>,
    started: AtomicBool,
}

impl CameraManager {
    pub fn new(
        settings: ManagerSettings,
        store: Arc<dyn CameraStore>,
        opener: Arc<dyn SourceOpener>,
    ) -> Self {
        let supervisor = Arc::new(Supervisor::new(opener, settings.timing));
        let registry = Arc::new(CameraRegistry::new(
            store.clone(),
            supervisor.clone(),
            settings.default_zone,
        ));
        Self {
            registry,
            supervisor,
            store,
            legacy_camera_url: settings.legacy_camera_url,
            started: AtomicBool::new(false),
        }
    }

    /// Load persisted cameras and start a worker for each enabled one. When
    /// nothing is persisted and a legacy camera url is configured, that camera
    /// is registered as `default`. Returns the number of registered cameras.
    ///
    /// Calling `start` again is a no-op.
    pub fn start(&self) -> usize {
        if self.started.swap(true, Ordering::SeqCst) {
            return self.registry.configs().len();
        }

        let configs = match self.store.load() {
            Ok(configs) => configs,
            Err(err) => {
                log::error!("manager: failed to load camera list, starting empty: {:#}", err);
                Vec::new()
            }
        };
        let restored = self.registry.restore(configs);
        log::info!("manager: restored {} camera(s)", restored);

        if self.registry.is_empty() {
            if let Some(url) = &self.legacy_camera_url {
                let config = CameraConfig::new(LEGACY_CAMERA_ID, url.as_str())
                    .with_name(LEGACY_CAMERA_NAME);
                match self.registry.add(config) {
                    Ok(_) => log::info!("manager: registered legacy camera from {}", url),
                    Err(err) => log::error!("manager: legacy camera rejected: {}", err),
                }
            }
        }
        self.registry.configs().len()
    }

    pub fn list_cameras(&self) -> Vec<CameraInfo> {
        self.registry.list()
    }

    pub fn add_camera(&self, config: CameraConfig) -> Result<CameraInfo, CameraError> {
        self.registry.add(config)
    }

    pub fn get_camera(&self, id: &str) -> Result<CameraInfo, CameraError> {
        self.registry.get(id)
    }

    pub fn update_camera(&self, id: &str, update: CameraUpdate) -> Result<CameraInfo, CameraError> {
        self.registry.update(id, update)
    }

    pub fn delete_camera(&self, id: &str) -> Result<CameraConfig, CameraError> {
        self.registry.delete(id)
    }

    pub fn frames(&self) -> FrameReader {
        FrameReader::new(self.registry.clone())
    }

    pub fn registry(&self) -> &Arc<CameraRegistry> {
        &self.registry
    }

    /// Stop every worker and join them for up to `grace`. Workers still inside
    /// a blocking read afterwards are detached.
    pub fn shutdown(&self, grace: Duration) -> ShutdownReport {
        self.registry.stop_all();
        let report = self.supervisor.shutdown(grace);
        log::info!(
            "manager: shutdown joined {} worker(s), detached {}",
            report.joined,
            report.detached
        );
        report
    }
}

impl Drop for CameraManager {
    fn drop(&mut self) {
        self.registry.stop_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::SourceFactory;
    use crate::store::InMemoryStore;

    fn fast_timing() -> CaptureTiming {
        CaptureTiming {
            connect_backoff: Duration::from_millis(20),
            reconnect_delay: Duration::from_millis(10),
            poll_interval: Duration::from_millis(5),
        }
    }

    fn manager(store: Arc<InMemoryStore>, legacy: Option<&str>) -> CameraManager {
        CameraManager::new(
            ManagerSettings {
                timing: fast_timing(),
                default_zone: "main".into(),
                legacy_camera_url: legacy.map(str::to_string),
            },
            store,
            Arc::new(SourceFactory::default()),
        )
    }

    #[test]
    fn legacy_camera_registered_when_store_is_empty() {
        let store = Arc::new(InMemoryStore::new());
        let manager = manager(store.clone(), Some("stub://legacy?width=4&height=4"));
        assert_eq!(manager.start(), 1);

        let camera = manager.get_camera(LEGACY_CAMERA_ID).unwrap();
        assert_eq!(camera.config.name, LEGACY_CAMERA_NAME);
        assert!(camera.config.enabled);
        assert_eq!(store.snapshot().len(), 1);
        manager.shutdown(Duration::from_secs(2));
    }

    #[test]
    fn legacy_camera_ignored_when_store_has_cameras() {
        let store = Arc::new(InMemoryStore::with_cameras(vec![CameraConfig::new(
            "lobby",
            "stub://lobby?width=4&height=4",
        )
        .disabled()]));
        let manager = manager(store, Some("stub://legacy"));
        assert_eq!(manager.start(), 1);
        assert!(manager.get_camera(LEGACY_CAMERA_ID).is_err());
        assert_eq!(manager.start(), 1);
    }

    #[test]
    fn shutdown_joins_running_workers() {
        let store = Arc::new(InMemoryStore::with_cameras(vec![
            CameraConfig::new("a", "stub://a?width=4&height=4&fps=50"),
            CameraConfig::new("b", "bad://b"),
        ]));
        let manager = manager(store, None);
        manager.start();
        std::thread::sleep(Duration::from_millis(50));
        let report = manager.shutdown(Duration::from_secs(2));
        assert_eq!(report, ShutdownReport { joined: 2, detached: 0 });
    }
}
