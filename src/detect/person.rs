use anyhow::{anyhow, Result};

use super::backend::SharedBackend;
use super::result::{ObjectClass, PersonBox};
use crate::frame::Frame;

pub const DEFAULT_MIN_CONFIDENCE: f32 = 0.25;

/// Person-only view over a shared backend.
#[derive(Clone)]
pub struct PersonDetector {
    backend: SharedBackend,
    min_confidence: f32,
}

impl PersonDetector {
    pub fn new(backend: SharedBackend) -> Self {
        Self {
            backend,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
        }
    }

    pub fn with_min_confidence(mut self, min_confidence: f32) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    pub fn min_confidence(&self) -> f32 {
        self.min_confidence
    }

    /// Persons in `frame`, clamped to its bounds. Boxes that clamp to nothing
    /// are dropped.
    pub fn detect(&self, frame: &Frame) -> Result<Vec<PersonBox>> {
        let detections = {
            let mut backend = self
                .backend
                .lock()
                .map_err(|_| anyhow!("detector backend lock poisoned"))?;
            backend.detect(frame.pixels(), frame.width, frame.height)?
        };

        let max_x = frame.width as f32;
        let max_y = frame.height as f32;
        let persons = detections
            .into_iter()
            .filter(|d| d.class == ObjectClass::Person && d.confidence >= self.min_confidence)
            .filter_map(|d| {
                let x1 = d.x1.clamp(0.0, max_x) as u32;
                let y1 = d.y1.clamp(0.0, max_y) as u32;
                let x2 = d.x2.clamp(0.0, max_x) as u32;
                let y2 = d.y2.clamp(0.0, max_y) as u32;
                if x2 <= x1 || y2 <= y1 {
                    return None;
                }
                Some(PersonBox {
                    x1,
                    y1,
                    x2,
                    y2,
                    confidence: round3(d.confidence),
                })
            })
            .collect();
        Ok(persons)
    }
}

fn round3(value: f32) -> f64 {
    (value as f64 * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{Detection, ScriptedBackend};
    use std::sync::{Arc, Mutex};

    fn detector(detections: Vec<Detection>) -> PersonDetector {
        PersonDetector::new(Arc::new(Mutex::new(ScriptedBackend::with_detections(
            detections,
        ))))
    }

    fn frame() -> Frame {
        Frame::new(vec![0; 100 * 50 * 3], 100, 50).unwrap()
    }

    #[test]
    fn keeps_confident_persons_only() -> Result<()> {
        let detector = detector(vec![
            Detection::person(10.0, 10.0, 20.0, 30.0, 0.91234),
            Detection::person(10.0, 10.0, 20.0, 30.0, 0.1),
            Detection::new(10.0, 10.0, 20.0, 30.0, 0.99, ObjectClass::Vehicle),
        ]);
        let persons = detector.detect(&frame())?;
        assert_eq!(
            persons,
            vec![PersonBox {
                x1: 10,
                y1: 10,
                x2: 20,
                y2: 30,
                confidence: 0.912
            }]
        );
        Ok(())
    }

    #[test]
    fn clamps_to_frame_and_drops_empty_boxes() -> Result<()> {
        let detector = detector(vec![
            Detection::person(-5.0, -5.0, 150.0, 80.0, 0.8),
            Detection::person(120.0, 10.0, 140.0, 20.0, 0.8),
        ]);
        let persons = detector.detect(&frame())?;
        assert_eq!(persons.len(), 1);
        assert_eq!((persons[0].x1, persons[0].y1), (0, 0));
        assert_eq!((persons[0].x2, persons[0].y2), (100, 50));
        Ok(())
    }

    #[test]
    fn threshold_is_inclusive() -> Result<()> {
        let detector = detector(vec![Detection::person(1.0, 1.0, 2.0, 2.0, 0.5)])
            .with_min_confidence(0.5);
        assert_eq!(detector.detect(&frame())?.len(), 1);
        Ok(())
    }

    #[test]
    fn backend_errors_propagate() {
        let detector =
            PersonDetector::new(Arc::new(Mutex::new(ScriptedBackend::failing("boom"))));
        assert!(detector.detect(&frame()).is_err());
    }
}
