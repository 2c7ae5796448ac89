use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::signal::StopSignal;
use super::worker::{CaptureTiming, CaptureWorker, WorkerState};
use crate::camera::CameraRuntime;
use crate::ingest::SourceOpener;

/// Start/stop hooks the registry calls while it holds its write lock.
///
/// Implementations must not block: `stop_worker` only requests the stop.
pub trait WorkerControl: Send + Sync {
    fn start_worker(&self, camera: &Arc<CameraRuntime>);
    fn stop_worker(&self, camera: &CameraRuntime);
}

/// A running capture thread and the stop signal that belongs to it.
///
/// Each spawned worker gets its own `StopSignal`, so a camera that is disabled
/// and re-enabled quickly never revives the old thread.
#[derive(Debug)]
pub struct WorkerHandle {
    stop: Arc<StopSignal>,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    pub fn is_live(&self) -> bool {
        !self.stop.is_raised() && !self.join.is_finished()
    }

    pub(crate) fn owns(&self, stop: &Arc<StopSignal>) -> bool {
        Arc::ptr_eq(&self.stop, stop)
    }
}

struct RetiredWorker {
    camera_id: String,
    join: JoinHandle<()>,
}

/// Outcome of `Supervisor::shutdown`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Workers that exited within the grace period.
    pub joined: usize,
    /// Workers still mid-I/O or mid-backoff when the grace period ran out.
    pub detached: usize,
}

/// Spawns one capture thread per enabled camera and reaps them.
pub struct Supervisor {
    opener: Arc<dyn SourceOpener>,
    timing: CaptureTiming,
    retired: Mutex<Vec<RetiredWorker>>,
    /// Retired workers already joined by `retire`, reported by the next shutdown.
    reaped: AtomicUsize,
}

impl Supervisor {
    pub fn new(opener: Arc<dyn SourceOpener>, timing: CaptureTiming) -> Self {
        Self {
            opener,
            timing,
            retired: Mutex::new(Vec::new()),
            reaped: AtomicUsize::new(0),
        }
    }

    pub fn timing(&self) -> &CaptureTiming {
        &self.timing
    }

    fn retire(&self, camera_id: &str, join: JoinHandle<()>) {
        let mut retired = self.retired.lock().unwrap_or_else(PoisonError::into_inner);
        // Reap anything that already exited so the list stays short.
        let mut pending = Vec::with_capacity(retired.len() + 1);
        for worker in retired.drain(..) {
            if worker.join.is_finished() {
                let _ = worker.join.join();
                self.reaped.fetch_add(1, Ordering::Relaxed);
            } else {
                pending.push(worker);
            }
        }
        pending.push(RetiredWorker {
            camera_id: camera_id.to_string(),
            join,
        });
        *retired = pending;
    }

    /// Join stopped workers until `grace` runs out. Workers that have not
    /// exited by then are left to finish on their own.
    ///
    /// Callers raise the stop signals first (`stop_worker` for every camera).
    pub fn shutdown(&self, grace: Duration) -> ShutdownReport {
        let workers: Vec<RetiredWorker> = self
            .retired
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();

        let deadline = Instant::now() + grace;
        let mut report = ShutdownReport {
            joined: self.reaped.swap(0, Ordering::Relaxed),
            detached: 0,
        };
        let mut pending = workers;
        loop {
            let mut still_running = Vec::new();
            for worker in pending {
                if worker.join.is_finished() {
                    let _ = worker.join.join();
                    report.joined += 1;
                } else {
                    still_running.push(worker);
                }
            }
            pending = still_running;
            if pending.is_empty() || Instant::now() >= deadline {
                break;
            }
            std::thread::sleep(self.timing.poll_interval.min(Duration::from_millis(50)));
        }

        for worker in &pending {
            log::warn!(
                "capture[{}]: worker still busy after {:?} grace; detaching",
                worker.camera_id,
                grace
            );
        }
        report.detached = pending.len();
        report
    }
}

impl WorkerControl for Supervisor {
    fn start_worker(&self, camera: &Arc<CameraRuntime>) {
        let mut slot = camera.worker();
        if slot.as_ref().is_some_and(WorkerHandle::is_live) {
            return;
        }
        if let Some(previous) = slot.take() {
            previous.stop.raise();
            self.retire(camera.id(), previous.join);
        }

        let stop = Arc::new(StopSignal::default());
        let worker = CaptureWorker::new(
            camera.clone(),
            stop.clone(),
            self.opener.clone(),
            self.timing.clone(),
        );
        let thread_camera = camera.clone();
        camera.set_state(WorkerState::Connecting);
        let spawned = std::thread::Builder::new()
            .name(format!("capture-{}", camera.id()))
            .spawn(move || {
                if catch_unwind(AssertUnwindSafe(|| worker.run())).is_err() {
                    log::error!("capture[{}]: worker panicked", thread_camera.id());
                    thread_camera.set_state(WorkerState::Stopped);
                }
            });

        match spawned {
            Ok(join) => {
                log::info!("capture[{}]: worker started", camera.id());
                *slot = Some(WorkerHandle { stop, join });
            }
            Err(err) => {
                camera.set_state(WorkerState::Stopped);
                log::error!(
                    "capture[{}]: failed to spawn capture thread: {}",
                    camera.id(),
                    err
                );
            }
        }
    }

    fn stop_worker(&self, camera: &CameraRuntime) {
        let Some(handle) = camera.worker().take() else {
            return;
        };
        handle.stop.raise();
        log::info!("capture[{}]: stop requested", camera.id());
        self.retire(camera.id(), handle.join);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;
    use crate::ingest::FrameSource;
    use anyhow::{anyhow, Result};

    struct Blank;

    impl FrameSource for Blank {
        fn next_frame(&mut self) -> Result<Option<Frame>> {
            std::thread::sleep(Duration::from_millis(1));
            Frame::new(vec![0; 3], 1, 1).map(Some)
        }
    }

    struct Opener;

    impl SourceOpener for Opener {
        fn open(&self, url: &str) -> Result<Box<dyn FrameSource>> {
            if url.starts_with("ok://") {
                Ok(Box::new(Blank))
            } else {
                Err(anyhow!("refused"))
            }
        }
    }

    fn supervisor() -> Supervisor {
        Supervisor::new(
            Arc::new(Opener),
            CaptureTiming {
                connect_backoff: Duration::from_millis(10),
                reconnect_delay: Duration::from_millis(5),
                poll_interval: Duration::from_millis(2),
            },
        )
    }

    #[test]
    fn start_is_idempotent_while_worker_lives() {
        let supervisor = supervisor();
        let camera = Arc::new(CameraRuntime::new("cam-1", "ok://"));
        supervisor.start_worker(&camera);
        supervisor.start_worker(&camera);
        assert!(camera.has_live_worker());

        supervisor.stop_worker(&camera);
        assert!(!camera.has_live_worker());
        let report = supervisor.shutdown(Duration::from_secs(2));
        assert_eq!(report, ShutdownReport { joined: 1, detached: 0 });
    }

    #[test]
    fn restart_after_stop_spawns_fresh_worker() {
        let supervisor = supervisor();
        let camera = Arc::new(CameraRuntime::new("cam-1", "nope://"));
        supervisor.start_worker(&camera);
        supervisor.stop_worker(&camera);
        supervisor.start_worker(&camera);
        assert!(camera.has_live_worker());

        supervisor.stop_worker(&camera);
        let report = supervisor.shutdown(Duration::from_secs(2));
        assert_eq!(report, ShutdownReport { joined: 2, detached: 0 });
    }

    #[test]
    fn stop_without_worker_is_a_no_op() {
        let supervisor = supervisor();
        let camera = CameraRuntime::new("cam-1", "ok://");
        supervisor.stop_worker(&camera);
        assert_eq!(supervisor.shutdown(Duration::ZERO), ShutdownReport::default());
    }
}
