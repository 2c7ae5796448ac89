//! Per-camera capture threads.
//!
//! Every enabled camera gets one `CaptureWorker` running on its own OS thread.
//! The worker owns the connect/read/reconnect state machine and publishes into
//! the camera's `FrameSlot`; the `Supervisor` starts and stops workers on behalf
//! of the registry.
//!
//! Capture failures never leave this module: connection and read errors are
//! logged, counted, and turned into state transitions.

mod signal;
mod supervisor;
mod worker;

pub use signal::{wait_for, ReconnectSignal, StopSignal, Wake};
pub use supervisor::{ShutdownReport, Supervisor, WorkerControl, WorkerHandle};
pub use worker::{CaptureTiming, CaptureWorker, WorkerState};
