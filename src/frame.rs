//! Decoded frames and the per-camera latest-frame slot.
//!
//! - `Frame`: decoded RGB8 image. Pixels live behind an `Arc<[u8]>` and are never
//!   mutated after construction, so a clone is an independent value for ownership
//!   purposes: a worker replacing the slot never affects a reader's copy.
//! - `FrameSlot`: holds exactly one frame per camera. Publish replaces, read copies
//!   out or reports empty. Each camera has its own slot lock.

use anyhow::{anyhow, Result};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::capture::StopSignal;

/// Bytes per pixel for the RGB8 layout every source normalizes to.
pub const RGB_CHANNELS: usize = 3;

// ----------------------------------------------------------------------------
// Frame
// ----------------------------------------------------------------------------

/// One decoded image captured from a camera.
#[derive(Clone)]
pub struct Frame {
    data: Arc<[u8]>,
    pub width: u32,
    pub height: u32,
    /// Per-camera publish sequence, assigned by the capture worker.
    pub sequence: u64,
    captured_at: Instant,
}

impl Frame {
    /// Build a frame from tightly packed RGB8 pixels.
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(RGB_CHANNELS))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if data.len() != expected {
            return Err(anyhow!(
                "RGB frame length mismatch: expected {}, got {}",
                expected,
                data.len()
            ));
        }
        Ok(Self {
            data: data.into(),
            width,
            height,
            sequence: 0,
            captured_at: Instant::now(),
        })
    }

    pub(crate) fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    /// Time since the frame was decoded.
    pub fn age(&self) -> Duration {
        self.captured_at.elapsed()
    }

    /// Pixel area (width x height).
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }
}

impl PartialEq for Frame {
    fn eq(&self, other: &Self) -> bool {
        self.width == other.width
            && self.height == other.height
            && self.sequence == other.sequence
            && self.data == other.data
    }
}

impl fmt::Debug for Frame {
    // Pixels are omitted.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("sequence", &self.sequence)
            .field("bytes", &self.data.len())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// FrameSlot
// ----------------------------------------------------------------------------

/// Latest-frame holder for one camera.
///
/// The lock is held only for an `Arc` swap or clone, never for I/O. Poisoning
/// is ignored: the protected value is always a complete `Option<Frame>`.
#[derive(Default)]
pub struct FrameSlot {
    current: Mutex<Option<Frame>>,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<Frame>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the held frame.
    pub fn publish(&self, frame: Frame) {
        let previous = self.lock().replace(frame);
        drop(previous);
    }

    /// Replace the held frame unless `stop` has been raised.
    ///
    /// The stop check happens under the slot lock. A controller that raises stop
    /// and then clears the slot is therefore guaranteed that no publish lands
    /// after the clear.
    pub fn publish_unless_stopped(&self, frame: Frame, stop: &StopSignal) -> bool {
        let previous = {
            let mut current = self.lock();
            if stop.is_raised() {
                return false;
            }
            current.replace(frame)
        };
        drop(previous);
        true
    }

    /// Copy out the current frame, or `None` if nothing has been published
    /// (or the slot was cleared).
    pub fn read(&self) -> Option<Frame> {
        self.lock().clone()
    }

    pub fn clear(&self) {
        let previous = self.lock().take();
        drop(previous);
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_none()
    }
}

impl fmt::Debug for FrameSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameSlot")
            .field("current", &*self.lock())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn solid_frame(value: u8, width: u32, height: u32) -> Frame {
        let len = width as usize * height as usize * RGB_CHANNELS;
        Frame::new(vec![value; len], width, height).unwrap()
    }

    #[test]
    fn frame_rejects_mismatched_length() {
        assert!(Frame::new(vec![0u8; 10], 2, 2).is_err());
        assert!(Frame::new(vec![0u8; 12], 2, 2).is_ok());
    }

    #[test]
    fn slot_starts_empty_and_returns_published_frame() {
        let slot = FrameSlot::new();
        assert!(slot.read().is_none());

        let frame = solid_frame(7, 4, 4).with_sequence(1);
        slot.publish(frame.clone());
        assert_eq!(slot.read(), Some(frame));
        assert!(!slot.is_empty());
    }

    #[test]
    fn reader_copy_survives_overwrite_and_clear() {
        let slot = FrameSlot::new();
        slot.publish(solid_frame(1, 2, 2));
        let copy = slot.read().unwrap();

        slot.publish(solid_frame(2, 2, 2));
        slot.clear();

        assert!(copy.pixels().iter().all(|&p| p == 1));
        assert!(slot.read().is_none());
    }

    #[test]
    fn publish_is_refused_once_stopped() {
        let slot = FrameSlot::new();
        let stop = StopSignal::default();
        assert!(slot.publish_unless_stopped(solid_frame(3, 2, 2), &stop));

        stop.raise();
        slot.clear();
        assert!(!slot.publish_unless_stopped(solid_frame(4, 2, 2), &stop));
        assert!(slot.read().is_none());
    }

    #[test]
    fn concurrent_reads_never_observe_torn_frames() {
        let slot = Arc::new(FrameSlot::new());
        let publisher = {
            let slot = slot.clone();
            thread::spawn(move || {
                for seq in 1..=2_000u64 {
                    let frame = solid_frame((seq % 251) as u8, 16, 16).with_sequence(seq);
                    slot.publish(frame);
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let slot = slot.clone();
                thread::spawn(move || {
                    let mut last_seq = 0;
                    for _ in 0..2_000 {
                        if let Some(frame) = slot.read() {
                            let expected = (frame.sequence % 251) as u8;
                            assert!(frame.pixels().iter().all(|&p| p == expected));
                            assert!(frame.sequence >= last_seq);
                            last_seq = frame.sequence;
                        }
                    }
                })
            })
            .collect();

        publisher.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(slot.read().map(|f| f.sequence), Some(2_000));
    }
}
