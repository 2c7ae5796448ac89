use serde::Serialize;

/// A labelled box in pixel coordinates of the frame it was detected on.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
    pub class: ObjectClass,
}

impl Detection {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32, confidence: f32, class: ObjectClass) -> Self {
        Self {
            x1,
            y1,
            x2,
            y2,
            confidence,
            class,
        }
    }

    pub fn person(x1: f32, y1: f32, x2: f32, y2: f32, confidence: f32) -> Self {
        Self::new(x1, y1, x2, y2, confidence, ObjectClass::Person)
    }

    pub fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    pub fn iou(&self, other: &Detection) -> f32 {
        let ix = (self.x2.min(other.x2) - self.x1.max(other.x1)).max(0.0);
        let iy = (self.y2.min(other.y2) - self.y1.max(other.y1)).max(0.0);
        let inter = ix * iy;
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}

#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObjectClass {
    Person,
    Vehicle,
    Animal,
    Unknown,
}

impl ObjectClass {
    /// Map a COCO-80 class index.
    pub fn from_coco(index: usize) -> Self {
        match index {
            0 => ObjectClass::Person,
            1..=8 => ObjectClass::Vehicle,
            14..=23 => ObjectClass::Animal,
            _ => ObjectClass::Unknown,
        }
    }
}

/// Greedy per-class non-maximum suppression. Output is ordered by descending
/// confidence.
pub fn non_max_suppression(mut candidates: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut kept: Vec<Detection> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let suppressed = kept
            .iter()
            .any(|k| k.class == candidate.class && k.iou(&candidate) > iou_threshold);
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}

/// A person box as reported over the API: integer pixels, confidence rounded
/// to three decimals.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct PersonBox {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
    pub confidence: f64,
}

impl PersonBox {
    pub fn center(&self) -> (f64, f64) {
        (
            (self.x1 as f64 + self.x2 as f64) / 2.0,
            (self.y1 as f64 + self.y2 as f64) / 2.0,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iou_of_identical_and_disjoint_boxes() {
        let a = Detection::person(0.0, 0.0, 10.0, 10.0, 0.9);
        let b = Detection::person(20.0, 20.0, 30.0, 30.0, 0.9);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn nms_drops_overlapping_boxes_of_same_class() {
        let kept = non_max_suppression(
            vec![
                Detection::person(0.0, 0.0, 10.0, 10.0, 0.6),
                Detection::person(1.0, 1.0, 10.0, 10.0, 0.9),
                Detection::new(1.0, 1.0, 10.0, 10.0, 0.5, ObjectClass::Vehicle),
                Detection::person(50.0, 50.0, 60.0, 60.0, 0.4),
            ],
            0.45,
        );
        assert_eq!(kept.len(), 3);
        assert_eq!(kept[0].confidence, 0.9);
        assert_eq!(kept[1].class, ObjectClass::Vehicle);
    }

    #[test]
    fn coco_person_is_class_zero() {
        assert_eq!(ObjectClass::from_coco(0), ObjectClass::Person);
        assert_eq!(ObjectClass::from_coco(2), ObjectClass::Vehicle);
        assert_eq!(ObjectClass::from_coco(79), ObjectClass::Unknown);
    }
}
