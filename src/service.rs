//! Frame-consuming operations behind the HTTP routes: snapshots, detection,
//! zone coordinates, analytics and stream parts.
//!
//! Every operation copies the current frame out of its slot first and works on
//! that copy, so inference never holds a camera lock.

use anyhow::Result;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Serialize;
use std::sync::Arc;

use crate::analytics::{self, AnalyticsOverview, CameraAnalytics, CameraSummary};
use crate::camera::CameraStatus;
use crate::codec;
use crate::config::StreamSettings;
use crate::detect::{PersonBox, PersonDetector};
use crate::manager::CameraManager;
use crate::reader::SourcedFrame;
use crate::zones::ZoneTable;

#[derive(Clone, Debug, Serialize)]
pub struct FrameReport {
    pub camera_id: String,
    /// Base64 JPEG.
    pub image: String,
    pub width: u32,
    pub height: u32,
    pub persons: Vec<PersonBox>,
    pub person_count: usize,
}

/// Snapshot without detection.
#[derive(Clone, Debug, Serialize)]
pub struct SnapshotReport {
    pub camera_id: String,
    /// Base64 JPEG.
    pub image: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Clone, Debug, Serialize)]
pub struct DetectReport {
    pub camera_id: String,
    pub persons: Vec<PersonBox>,
    pub person_count: usize,
}

/// A detected person's center, in pixels and in percent of the frame.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PersonPoint {
    pub x: f64,
    pub y: f64,
    pub x_pct: f64,
    pub y_pct: f64,
    pub zone: String,
    pub confidence: f64,
}

#[derive(Clone, Debug, Serialize)]
pub struct CoordinatesReport {
    pub camera_id: String,
    pub width: u32,
    pub height: u32,
    pub points: Vec<PersonPoint>,
    pub count: usize,
}

pub struct CrowdService {
    manager: Arc<CameraManager>,
    detector: PersonDetector,
    zones: ZoneTable,
    stream: StreamSettings,
}

impl CrowdService {
    pub fn new(
        manager: Arc<CameraManager>,
        detector: PersonDetector,
        zones: ZoneTable,
        stream: StreamSettings,
    ) -> Self {
        Self {
            manager,
            detector,
            zones,
            stream,
        }
    }

    pub fn manager(&self) -> &Arc<CameraManager> {
        &self.manager
    }

    pub fn stream_settings(&self) -> &StreamSettings {
        &self.stream
    }

    /// Latest frame as JPEG. Errors are `CameraError` for missing cameras or
    /// frames.
    pub fn frame_jpeg(&self, camera_id: Option<&str>) -> Result<(String, Vec<u8>)> {
        let sourced = self.manager.frames().get(camera_id)?;
        let jpeg = codec::encode_jpeg(&sourced.frame, self.stream.jpeg_quality)?;
        Ok((sourced.camera_id, jpeg))
    }

    /// Latest frame as base64 JPEG. Does not run the detector.
    pub fn snapshot(&self, camera_id: Option<&str>) -> Result<SnapshotReport> {
        let sourced = self.manager.frames().get(camera_id)?;
        let jpeg = codec::encode_jpeg(&sourced.frame, self.stream.jpeg_quality)?;
        Ok(SnapshotReport {
            camera_id: sourced.camera_id,
            image: STANDARD.encode(jpeg),
            width: sourced.frame.width,
            height: sourced.frame.height,
        })
    }

    /// Latest frame with person boxes drawn in, plus the boxes themselves.
    pub fn frame_report(&self, camera_id: Option<&str>) -> Result<FrameReport> {
        let sourced = self.manager.frames().get(camera_id)?;
        let persons = self.detector.detect(&sourced.frame)?;
        let boxed = codec::draw_boxes(&sourced.frame, &persons)?;
        let jpeg = codec::encode_image(&boxed, self.stream.jpeg_quality)?;
        Ok(FrameReport {
            camera_id: sourced.camera_id,
            image: STANDARD.encode(jpeg),
            width: sourced.frame.width,
            height: sourced.frame.height,
            person_count: persons.len(),
            persons,
        })
    }

    pub fn detect(&self, camera_id: Option<&str>) -> Result<DetectReport> {
        let sourced = self.manager.frames().get(camera_id)?;
        let persons = self.detector.detect(&sourced.frame)?;
        Ok(DetectReport {
            camera_id: sourced.camera_id,
            person_count: persons.len(),
            persons,
        })
    }

    pub fn coordinates(&self, camera_id: Option<&str>) -> Result<CoordinatesReport> {
        let sourced = self.manager.frames().get(camera_id)?;
        let persons = self.detector.detect(&sourced.frame)?;
        let fallback_zone = self.camera_zone(&sourced.camera_id);
        let (width, height) = (sourced.frame.width, sourced.frame.height);

        let points: Vec<PersonPoint> = persons
            .iter()
            .map(|person| {
                let (x, y) = person.center();
                let x_pct = percent(x, width);
                let y_pct = percent(y, height);
                let zone = self
                    .zones
                    .classify(x_pct, y_pct)
                    .map(str::to_string)
                    .unwrap_or_else(|| fallback_zone.clone());
                PersonPoint {
                    x,
                    y,
                    x_pct,
                    y_pct,
                    zone,
                    confidence: person.confidence,
                }
            })
            .collect();
        Ok(CoordinatesReport {
            camera_id: sourced.camera_id,
            width,
            height,
            count: points.len(),
            points,
        })
    }

    pub fn analytics(&self, camera_id: Option<&str>) -> Result<CameraAnalytics> {
        let sourced = self.manager.frames().get(camera_id)?;
        let people_count = self.detector.detect(&sourced.frame)?.len();
        Ok(CameraAnalytics {
            camera_id: sourced.camera_id,
            people_count,
            density: analytics::density(people_count, sourced.frame.width, sourced.frame.height),
            timestamp: analytics::unix_timestamp(),
        })
    }

    /// Per-camera summaries plus aggregates. A camera whose detection fails is
    /// reported with zero people rather than failing the whole overview.
    pub fn analytics_all(&self) -> AnalyticsOverview {
        let cameras = self
            .manager
            .registry()
            .cameras()
            .into_iter()
            .map(|(config, runtime)| {
                let frame = runtime.slot.read();
                let status = if frame.is_some() {
                    CameraStatus::Online
                } else {
                    CameraStatus::Offline
                };
                let (people_count, density) = match frame {
                    Some(frame) => match self.detector.detect(&frame) {
                        Ok(persons) => (
                            persons.len(),
                            analytics::density(persons.len(), frame.width, frame.height),
                        ),
                        Err(err) => {
                            log::warn!("analytics[{}]: detection failed: {:#}", config.id, err);
                            (0, 0)
                        }
                    },
                    None => (0, 0),
                };
                CameraSummary {
                    camera_id: config.id,
                    name: config.name,
                    zone: config.zone,
                    status,
                    people_count,
                    density,
                }
            })
            .collect();
        AnalyticsOverview::from_cameras(cameras)
    }

    /// Next JPEG part for an MJPEG stream, or `None` while no frame is
    /// available.
    pub fn stream_part(&self, camera_id: Option<&str>, with_boxes: bool) -> Result<Option<Vec<u8>>> {
        let sourced: SourcedFrame = match self.manager.frames().get(camera_id) {
            Ok(sourced) => sourced,
            Err(crate::CameraError::SourceUnavailable(_)) => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let jpeg = if with_boxes {
            let persons = self.detector.detect(&sourced.frame)?;
            let mut boxed = codec::draw_boxes(&sourced.frame, &persons)?;
            codec::draw_caption(&mut boxed, &format!("Persons: {}", persons.len()));
            codec::encode_image(&boxed, self.stream.jpeg_quality)?
        } else {
            codec::encode_jpeg(&sourced.frame, self.stream.jpeg_quality)?
        };
        Ok(Some(jpeg))
    }

    fn camera_zone(&self, camera_id: &str) -> String {
        self.manager
            .get_camera(camera_id)
            .map(|info| info.config.zone)
            .unwrap_or_default()
    }
}

fn percent(value: f64, extent: u32) -> f64 {
    if extent == 0 {
        return 0.0;
    }
    (value / extent as f64 * 10_000.0).round() / 100.0
}
