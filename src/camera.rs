//! Camera configuration entities and per-camera runtime state.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use crate::capture::{ReconnectSignal, StopSignal, WorkerHandle, WorkerState};
use crate::frame::FrameSlot;

/// Identity and connection info for one camera.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraConfig {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub zone: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl CameraConfig {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            url: url.into(),
            zone: String::new(),
            enabled: true,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_zone(mut self, zone: impl Into<String>) -> Self {
        self.zone = zone.into();
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Partial update. Only supplied fields change; `id` may be supplied but must
/// match the camera being updated.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct CameraUpdate {
    pub id: Option<String>,
    pub name: Option<String>,
    pub url: Option<String>,
    pub zone: Option<String>,
    pub enabled: Option<bool>,
}

impl CameraUpdate {
    pub fn url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    pub fn enabled(enabled: bool) -> Self {
        Self {
            enabled: Some(enabled),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.id.is_none()
            && self.name.is_none()
            && self.url.is_none()
            && self.zone.is_none()
            && self.enabled.is_none()
    }
}

/// Derived availability: online when the camera's slot holds a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraStatus {
    Online,
    Offline,
}

impl CameraStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CameraStatus::Online => "online",
            CameraStatus::Offline => "offline",
        }
    }
}

/// A camera as reported by `list` and `get`.
#[derive(Clone, Debug, Serialize)]
pub struct CameraInfo {
    #[serde(flatten)]
    pub config: CameraConfig,
    pub status: CameraStatus,
    pub worker_state: WorkerState,
    pub stats: CaptureStats,
}

/// Capture counters for one camera.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CaptureStats {
    pub frames_captured: u64,
    pub connects: u64,
    pub connect_failures: u64,
    pub read_failures: u64,
}

#[derive(Debug, Default)]
struct CaptureCounters {
    frames_captured: AtomicU64,
    connects: AtomicU64,
    connect_failures: AtomicU64,
    read_failures: AtomicU64,
}

// ----------------------------------------------------------------------------
// CameraRuntime
// ----------------------------------------------------------------------------

/// Live state for one registered camera.
///
/// Created together with the registry entry and dropped with it. The only other
/// holder of the `Arc` is the camera's own capture thread.
#[derive(Debug)]
pub struct CameraRuntime {
    id: String,
    url: RwLock<String>,
    pub slot: FrameSlot,
    pub reconnect: ReconnectSignal,
    state: AtomicU8,
    sequence: AtomicU64,
    counters: CaptureCounters,
    worker: Mutex<Option<WorkerHandle>>,
}

impl CameraRuntime {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: RwLock::new(url.into()),
            slot: FrameSlot::new(),
            reconnect: ReconnectSignal::default(),
            state: AtomicU8::new(WorkerState::Idle as u8),
            sequence: AtomicU64::new(0),
            counters: CaptureCounters::default(),
            worker: Mutex::new(None),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// The url the next connection attempt will use.
    pub fn url(&self) -> String {
        self.url
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn set_url(&self, url: &str) {
        *self.url.write().unwrap_or_else(PoisonError::into_inner) = url.to_string();
    }

    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub(crate) fn set_state(&self, state: WorkerState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    /// Record a state reported by the worker owning `stop`. Reports from a
    /// worker that has been replaced by a newer one are dropped.
    pub(crate) fn set_state_from(&self, stop: &Arc<StopSignal>, state: WorkerState) {
        let worker = self.worker();
        if worker.as_ref().map_or(true, |handle| handle.owns(stop)) {
            self.set_state(state);
        }
    }

    pub fn status(&self) -> CameraStatus {
        if self.slot.is_empty() {
            CameraStatus::Offline
        } else {
            CameraStatus::Online
        }
    }

    pub fn stats(&self) -> CaptureStats {
        CaptureStats {
            frames_captured: self.counters.frames_captured.load(Ordering::Relaxed),
            connects: self.counters.connects.load(Ordering::Relaxed),
            connect_failures: self.counters.connect_failures.load(Ordering::Relaxed),
            read_failures: self.counters.read_failures.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn record_frame(&self) {
        self.counters.frames_captured.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_connect(&self) {
        self.counters.connects.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_connect_failure(&self) {
        self.counters.connect_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_read_failure(&self) {
        self.counters.read_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn worker(&self) -> MutexGuard<'_, Option<WorkerHandle>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// True while a capture thread for this camera is alive and not asked to stop.
    pub fn has_live_worker(&self) -> bool {
        self.worker().as_ref().is_some_and(WorkerHandle::is_live)
    }

    pub(crate) fn info(&self, config: &CameraConfig) -> CameraInfo {
        CameraInfo {
            config: config.clone(),
            status: self.status(),
            worker_state: self.state(),
            stats: self.stats(),
        }
    }
}
