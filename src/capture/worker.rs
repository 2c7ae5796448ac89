use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use super::signal::{wait_for, StopSignal, Wake};
use crate::camera::CameraRuntime;
use crate::ingest::{FrameSource, SourceOpener};

const DEFAULT_CONNECT_BACKOFF: Duration = Duration::from_secs(5);
const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(1);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Capture state machine states.
///
/// `Idle` is only reported before a worker has ever run for the camera.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum WorkerState {
    Idle = 0,
    Connecting = 1,
    Streaming = 2,
    Reconnecting = 3,
    Stopped = 4,
}

impl WorkerState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => WorkerState::Connecting,
            2 => WorkerState::Streaming,
            3 => WorkerState::Reconnecting,
            4 => WorkerState::Stopped,
            _ => WorkerState::Idle,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerState::Idle => "idle",
            WorkerState::Connecting => "connecting",
            WorkerState::Streaming => "streaming",
            WorkerState::Reconnecting => "reconnecting",
            WorkerState::Stopped => "stopped",
        }
    }
}

/// Timing knobs for the capture state machine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CaptureTiming {
    /// Wait between failed connection attempts. Retries are unbounded.
    pub connect_backoff: Duration,
    /// Wait after releasing a connection before reconnecting.
    pub reconnect_delay: Duration,
    /// Upper bound on how long a stop request can go unobserved during a wait.
    pub poll_interval: Duration,
}

impl Default for CaptureTiming {
    fn default() -> Self {
        Self {
            connect_backoff: DEFAULT_CONNECT_BACKOFF,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// One camera's acquisition loop.
///
/// Runs `Connecting -> Streaming -> (Reconnecting | Stopped)` until its stop
/// signal is raised. Every error path leads back to `Connecting` or
/// `Reconnecting`, so the worker keeps making progress for as long as the camera
/// stays enabled. The worker never clears the slot; that is the controller's job
/// because disabling a camera is not the same as deleting it.
pub struct CaptureWorker {
    camera: Arc<CameraRuntime>,
    stop: Arc<StopSignal>,
    opener: Arc<dyn SourceOpener>,
    timing: CaptureTiming,
    source: Option<Box<dyn FrameSource>>,
    connect_streak: u32,
}

impl CaptureWorker {
    pub fn new(
        camera: Arc<CameraRuntime>,
        stop: Arc<StopSignal>,
        opener: Arc<dyn SourceOpener>,
        timing: CaptureTiming,
    ) -> Self {
        Self {
            camera,
            stop,
            opener,
            timing,
            source: None,
            connect_streak: 0,
        }
    }

    /// Run until stopped. Blocks the calling thread.
    pub fn run(mut self) {
        let mut state = WorkerState::Connecting;
        while state != WorkerState::Stopped {
            self.camera.set_state_from(&self.stop, state);
            state = match state {
                WorkerState::Connecting => self.connect(),
                WorkerState::Streaming => self.read_one(),
                WorkerState::Reconnecting => self.release_and_wait(),
                WorkerState::Idle | WorkerState::Stopped => WorkerState::Stopped,
            };
        }
        self.source = None;
        self.camera.set_state_from(&self.stop, WorkerState::Stopped);
        log::info!("capture[{}]: stopped", self.camera.id());
    }

    fn connect(&mut self) -> WorkerState {
        if self.stop.is_raised() {
            return WorkerState::Stopped;
        }
        // Any pending reconnect is satisfied by this attempt, which reads the
        // current url.
        self.camera.reconnect.take();
        let url = self.camera.url();

        match self.opener.open(&url) {
            Ok(source) => {
                log::info!("capture[{}]: connected to {}", self.camera.id(), url);
                self.camera.record_connect();
                self.connect_streak = 0;
                self.source = Some(source);
                WorkerState::Streaming
            }
            Err(err) => {
                self.camera.record_connect_failure();
                self.connect_streak = self.connect_streak.saturating_add(1);
                if self.connect_streak == 1 {
                    log::warn!(
                        "capture[{}]: connect to {} failed: {:#}; retrying every {:?}",
                        self.camera.id(),
                        url,
                        err,
                        self.timing.connect_backoff
                    );
                } else {
                    log::debug!(
                        "capture[{}]: connect attempt {} failed: {:#}",
                        self.camera.id(),
                        self.connect_streak,
                        err
                    );
                }
                match self.wait(self.timing.connect_backoff, true) {
                    Wake::Stopped => WorkerState::Stopped,
                    Wake::Elapsed | Wake::Reconnect => WorkerState::Connecting,
                }
            }
        }
    }

    fn read_one(&mut self) -> WorkerState {
        if self.stop.is_raised() {
            return WorkerState::Stopped;
        }
        if self.camera.reconnect.take() {
            log::info!("capture[{}]: reconnect requested", self.camera.id());
            return WorkerState::Reconnecting;
        }
        let Some(source) = self.source.as_mut() else {
            return WorkerState::Reconnecting;
        };

        match source.next_frame() {
            Ok(Some(frame)) => {
                let frame = frame.with_sequence(self.camera.next_sequence());
                if !self.camera.slot.publish_unless_stopped(frame, &self.stop) {
                    return WorkerState::Stopped;
                }
                self.camera.record_frame();
                WorkerState::Streaming
            }
            Ok(None) => {
                self.camera.record_read_failure();
                log::warn!("capture[{}]: stream ended", self.camera.id());
                WorkerState::Reconnecting
            }
            Err(err) => {
                self.camera.record_read_failure();
                log::warn!("capture[{}]: read failed: {:#}", self.camera.id(), err);
                WorkerState::Reconnecting
            }
        }
    }

    fn release_and_wait(&mut self) -> WorkerState {
        self.source = None;
        match self.wait(self.timing.reconnect_delay, false) {
            Wake::Stopped => WorkerState::Stopped,
            Wake::Elapsed | Wake::Reconnect => WorkerState::Connecting,
        }
    }

    fn wait(&self, total: Duration, wake_on_reconnect: bool) -> Wake {
        let reconnect = wake_on_reconnect.then_some(&self.camera.reconnect);
        wait_for(total, self.timing.poll_interval, &self.stop, reconnect)
    }
}
