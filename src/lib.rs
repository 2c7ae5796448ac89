//! Crowdsense
//!
//! Multi-camera people counting. Each registered camera gets a background
//! capture worker that keeps the most recent decoded frame in a per-camera
//! slot; request handlers copy that frame out and run person detection,
//! zone classification and density analytics on the copy.
//!
//! # Module Structure
//!
//! - `frame`: Decoded RGB frames and the latest-frame slot
//! - `ingest`: Frame sources (`stub://`, HTTP MJPEG/snapshot, RTSP)
//! - `capture`: Per-camera capture workers and their supervisor
//! - `registry` / `store` / `manager`: Camera CRUD, persistence and lifecycle
//! - `reader`: Latest-frame lookup with first-online fallback
//! - `detect`: Detector backends and the person-only view over them
//! - `zones` / `analytics`: Zone classification and crowd density
//! - `service` / `api`: Frame-consuming operations and the HTTP surface

pub mod analytics;
pub mod api;
pub mod camera;
pub mod capture;
pub mod codec;
pub mod config;
pub mod detect;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod manager;
pub mod reader;
pub mod registry;
pub mod service;
pub mod store;
pub mod zones;

pub use analytics::{AnalyticsOverview, CameraAnalytics, CameraSummary};
pub use camera::{CameraConfig, CameraInfo, CameraStatus, CameraUpdate, CaptureStats};
pub use capture::{CaptureTiming, ShutdownReport, WorkerState};
pub use config::CrowdsenseConfig;
pub use detect::{build_backend, Detection, DetectorBackend, PersonBox, PersonDetector};
pub use error::CameraError;
pub use frame::{Frame, FrameSlot};
pub use ingest::{FrameSource, SourceFactory, SourceOpener, SourceSettings};
pub use manager::{CameraManager, ManagerSettings};
pub use reader::{FrameReader, SourcedFrame};
pub use registry::CameraRegistry;
pub use service::CrowdService;
pub use store::{CameraStore, InMemoryStore, JsonFileStore};
pub use zones::{Zone, ZoneTable};
