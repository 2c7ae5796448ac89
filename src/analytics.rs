//! People count and crowd density.

use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::camera::CameraStatus;

/// Pixels of frame area budgeted per person at 100% density.
pub const PIXELS_PER_PERSON: f64 = 10_000.0;

/// Percent of frame capacity occupied, capped at 100. Zero-area frames report 0.
pub fn density(people_count: usize, width: u32, height: u32) -> u32 {
    let capacity = width as f64 * height as f64 / PIXELS_PER_PERSON;
    if capacity <= 0.0 {
        return 0;
    }
    let pct = (people_count as f64 / capacity * 100.0).floor();
    pct.min(100.0) as u32
}

/// Seconds since the unix epoch with sub-second precision.
pub fn unix_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CameraAnalytics {
    pub camera_id: String,
    pub people_count: usize,
    pub density: u32,
    pub timestamp: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CameraSummary {
    pub camera_id: String,
    pub name: String,
    pub zone: String,
    pub status: CameraStatus,
    pub people_count: usize,
    pub density: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AnalyticsOverview {
    pub cameras: Vec<CameraSummary>,
    pub total_people_count: usize,
    pub online_cameras: usize,
    /// Mean density over online cameras; 0 when none are online.
    pub average_density: f64,
    pub timestamp: f64,
}

impl AnalyticsOverview {
    pub fn from_cameras(cameras: Vec<CameraSummary>) -> Self {
        let online: Vec<&CameraSummary> = cameras
            .iter()
            .filter(|c| c.status == CameraStatus::Online)
            .collect();
        let average_density = if online.is_empty() {
            0.0
        } else {
            let sum: u32 = online.iter().map(|c| c.density).sum();
            (sum as f64 / online.len() as f64 * 100.0).round() / 100.0
        };
        Self {
            total_people_count: cameras.iter().map(|c| c.people_count).sum(),
            online_cameras: online.len(),
            average_density,
            cameras,
            timestamp: unix_timestamp(),
        }
    }
}
