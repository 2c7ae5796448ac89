//! Per-camera control signals observed by capture workers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Edge-triggered reconnect request. Observing it with `take` clears it.
#[derive(Debug, Default)]
pub struct ReconnectSignal {
    requested: AtomicBool,
}

impl ReconnectSignal {
    pub fn raise(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    /// Returns true at most once per `raise`.
    pub fn take(&self) -> bool {
        self.requested.swap(false, Ordering::SeqCst)
    }

    pub fn is_raised(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

/// Level-triggered stop request. Once raised it stays raised.
#[derive(Debug, Default)]
pub struct StopSignal {
    stopped: AtomicBool,
}

impl StopSignal {
    pub fn raise(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// Why a backoff wait ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Wake {
    Elapsed,
    Stopped,
    Reconnect,
}

/// Sleep for `total`, waking every `tick` to check the signals.
///
/// `reconnect` is only consulted when given; it is not cleared here.
pub fn wait_for(
    total: Duration,
    tick: Duration,
    stop: &StopSignal,
    reconnect: Option<&ReconnectSignal>,
) -> Wake {
    let deadline = Instant::now() + total;
    loop {
        if stop.is_raised() {
            return Wake::Stopped;
        }
        if reconnect.is_some_and(ReconnectSignal::is_raised) {
            return Wake::Reconnect;
        }
        let now = Instant::now();
        if now >= deadline {
            return Wake::Elapsed;
        }
        std::thread::sleep(tick.min(deadline - now));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn reconnect_clears_once_observed() {
        let signal = ReconnectSignal::default();
        assert!(!signal.take());
        signal.raise();
        signal.raise();
        assert!(signal.take());
        assert!(!signal.take());
    }

    #[test]
    fn stop_stays_raised() {
        let signal = StopSignal::default();
        signal.raise();
        assert!(signal.is_raised());
        assert!(signal.is_raised());
    }

    #[test]
    fn wait_returns_early_on_stop() {
        let stop = Arc::new(StopSignal::default());
        let raiser = {
            let stop = stop.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(30));
                stop.raise();
            })
        };
        let started = Instant::now();
        let wake = wait_for(
            Duration::from_secs(10),
            Duration::from_millis(5),
            &stop,
            None,
        );
        raiser.join().unwrap();
        assert_eq!(wake, Wake::Stopped);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn wait_reports_pending_reconnect_without_clearing_it() {
        let stop = StopSignal::default();
        let reconnect = ReconnectSignal::default();
        reconnect.raise();
        let wake = wait_for(
            Duration::from_secs(10),
            Duration::from_millis(5),
            &stop,
            Some(&reconnect),
        );
        assert_eq!(wake, Wake::Reconnect);
        assert!(reconnect.is_raised());
    }

    #[test]
    fn wait_elapses() {
        let stop = StopSignal::default();
        let wake = wait_for(
            Duration::from_millis(10),
            Duration::from_millis(2),
            &stop,
            None,
        );
        assert_eq!(wake, Wake::Elapsed);
    }
}
