//! Camera registry: the source of truth for camera configs and their runtime
//! state.
//!
//! Every mutation runs under one write lock, including the worker start/stop it
//! implies, so concurrent readers observe a change set entirely or not at all
//! and rapid enable/disable sequences apply in order. Frame reads never take
//! this lock for longer than it takes to clone out an `Arc<CameraRuntime>`.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::camera::{CameraConfig, CameraInfo, CameraRuntime, CameraUpdate};
use crate::capture::WorkerControl;
use crate::error::CameraError;
use crate::store::CameraStore;

struct Entry {
    config: CameraConfig,
    runtime: Arc<CameraRuntime>,
}

pub struct CameraRegistry {
    entries: RwLock<BTreeMap<String, Entry>>,
    store: Arc<dyn CameraStore>,
    workers: Arc<dyn WorkerControl>,
    default_zone: String,
}

impl CameraRegistry {
    pub fn new(
        store: Arc<dyn CameraStore>,
        workers: Arc<dyn WorkerControl>,
        default_zone: impl Into<String>,
    ) -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            store,
            workers,
            default_zone: default_zone.into(),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, Entry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Entry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn normalize(&self, mut config: CameraConfig) -> Result<CameraConfig, CameraError> {
        config.id = config.id.trim().to_string();
        config.url = config.url.trim().to_string();
        if config.id.is_empty() {
            return Err(CameraError::InvalidInput("camera id must not be empty".into()));
        }
        if config.url.is_empty() {
            return Err(CameraError::InvalidInput("camera url must not be empty".into()));
        }
        if config.name.trim().is_empty() {
            config.name = config.id.clone();
        }
        if config.zone.trim().is_empty() {
            config.zone = self.default_zone.clone();
        }
        Ok(config)
    }

    fn persist(&self, entries: &BTreeMap<String, Entry>) {
        let configs: Vec<CameraConfig> = entries.values().map(|e| e.config.clone()).collect();
        if let Err(err) = self.store.save(&configs) {
            log::error!("registry: failed to persist camera list: {:#}", err);
        }
    }

    /// Register configs loaded at startup without writing them back. Invalid or
    /// duplicate entries are skipped with a warning. Returns how many were
    /// registered.
    pub fn restore(&self, configs: Vec<CameraConfig>) -> usize {
        let mut entries = self.write();
        let mut restored = 0;
        for config in configs {
            let config = match self.normalize(config) {
                Ok(config) => config,
                Err(err) => {
                    log::warn!("registry: skipping stored camera: {}", err);
                    continue;
                }
            };
            if entries.contains_key(&config.id) {
                log::warn!("registry: skipping duplicate stored camera '{}'", config.id);
                continue;
            }
            let runtime = Arc::new(CameraRuntime::new(&config.id, &config.url));
            if config.enabled {
                self.workers.start_worker(&runtime);
            }
            entries.insert(config.id.clone(), Entry { config, runtime });
            restored += 1;
        }
        restored
    }

    pub fn add(&self, config: CameraConfig) -> Result<CameraInfo, CameraError> {
        let config = self.normalize(config)?;
        let mut entries = self.write();
        if entries.contains_key(&config.id) {
            return Err(CameraError::AlreadyExists(config.id));
        }

        let runtime = Arc::new(CameraRuntime::new(&config.id, &config.url));
        let id = config.id.clone();
        entries.insert(
            id.clone(),
            Entry {
                config: config.clone(),
                runtime: runtime.clone(),
            },
        );
        self.persist(&entries);
        if config.enabled {
            self.workers.start_worker(&runtime);
        }
        log::info!("registry: added camera '{}' ({})", id, config.url);
        Ok(runtime.info(&config))
    }

    pub fn get(&self, id: &str) -> Result<CameraInfo, CameraError> {
        let entries = self.read();
        let entry = entries
            .get(id)
            .ok_or_else(|| CameraError::NotFound(id.to_string()))?;
        Ok(entry.runtime.info(&entry.config))
    }

    /// All cameras in id order.
    pub fn list(&self) -> Vec<CameraInfo> {
        self.read()
            .values()
            .map(|entry| entry.runtime.info(&entry.config))
            .collect()
    }

    pub fn update(&self, id: &str, update: CameraUpdate) -> Result<CameraInfo, CameraError> {
        let mut entries = self.write();
        let entry = entries
            .get_mut(id)
            .ok_or_else(|| CameraError::NotFound(id.to_string()))?;

        if let Some(new_id) = &update.id {
            if new_id != id {
                return Err(CameraError::InvalidInput(format!(
                    "camera id cannot change (got '{}' for '{}')",
                    new_id, id
                )));
            }
        }
        let url = match update.url {
            Some(url) if url.trim().is_empty() => {
                return Err(CameraError::InvalidInput("camera url must not be empty".into()))
            }
            Some(url) => Some(url.trim().to_string()),
            None => None,
        };

        let was_enabled = entry.config.enabled;
        let mut url_changed = false;
        if let Some(url) = url {
            url_changed = url != entry.config.url;
            entry.config.url = url;
        }
        if let Some(name) = update.name {
            entry.config.name = if name.trim().is_empty() {
                entry.config.id.clone()
            } else {
                name
            };
        }
        if let Some(zone) = update.zone {
            entry.config.zone = if zone.trim().is_empty() {
                self.default_zone.clone()
            } else {
                zone
            };
        }
        if let Some(enabled) = update.enabled {
            entry.config.enabled = enabled;
        }

        let runtime = entry.runtime.clone();
        let config = entry.config.clone();
        if url_changed {
            runtime.set_url(&config.url);
        }
        match (was_enabled, config.enabled) {
            (false, true) => self.workers.start_worker(&runtime),
            (true, false) => {
                self.workers.stop_worker(&runtime);
                runtime.slot.clear();
            }
            (true, true) if url_changed => runtime.reconnect.raise(),
            _ => {}
        }
        self.persist(&entries);
        log::info!("registry: updated camera '{}'", id);
        Ok(runtime.info(&config))
    }

    pub fn delete(&self, id: &str) -> Result<CameraConfig, CameraError> {
        let mut entries = self.write();
        let entry = entries
            .remove(id)
            .ok_or_else(|| CameraError::NotFound(id.to_string()))?;
        self.workers.stop_worker(&entry.runtime);
        entry.runtime.slot.clear();
        self.persist(&entries);
        log::info!("registry: deleted camera '{}'", id);
        Ok(entry.config)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.read().contains_key(id)
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn runtime(&self, id: &str) -> Option<Arc<CameraRuntime>> {
        self.read().get(id).map(|entry| entry.runtime.clone())
    }

    /// Runtime handles in id order.
    pub fn runtimes(&self) -> Vec<Arc<CameraRuntime>> {
        self.read()
            .values()
            .map(|entry| entry.runtime.clone())
            .collect()
    }

    /// Configs paired with their runtimes, in id order.
    pub fn cameras(&self) -> Vec<(CameraConfig, Arc<CameraRuntime>)> {
        self.read()
            .values()
            .map(|entry| (entry.config.clone(), entry.runtime.clone()))
            .collect()
    }

    pub fn configs(&self) -> Vec<CameraConfig> {
        self.read()
            .values()
            .map(|entry| entry.config.clone())
            .collect()
    }

    /// Ask every worker to stop. Slots keep their last frame.
    pub fn stop_all(&self) {
        let entries = self.write();
        for entry in entries.values() {
            self.workers.stop_worker(&entry.runtime);
        }
    }
}
