use std::sync::Arc;

use crate::error::CameraError;
use crate::frame::Frame;
use crate::registry::CameraRegistry;

/// A frame copy tagged with the camera it came from.
#[derive(Clone, Debug)]
pub struct SourcedFrame {
    pub camera_id: String,
    pub frame: Frame,
}

/// Read access to the latest frame of each camera.
///
/// Cheap to clone; every read copies the frame out and holds no lock afterwards.
#[derive(Clone)]
pub struct FrameReader {
    registry: Arc<CameraRegistry>,
}

impl FrameReader {
    pub fn new(registry: Arc<CameraRegistry>) -> Self {
        Self { registry }
    }

    /// Latest frame for `camera_id`, or for the first online camera in id order
    /// when no id is given.
    pub fn get(&self, camera_id: Option<&str>) -> Result<SourcedFrame, CameraError> {
        match camera_id {
            Some(id) => {
                let runtime = self
                    .registry
                    .runtime(id)
                    .ok_or_else(|| CameraError::NotFound(id.to_string()))?;
                let frame = runtime
                    .slot
                    .read()
                    .ok_or_else(|| CameraError::SourceUnavailable(Some(id.to_string())))?;
                Ok(SourcedFrame {
                    camera_id: id.to_string(),
                    frame,
                })
            }
            None => self
                .registry
                .runtimes()
                .into_iter()
                .find_map(|runtime| {
                    runtime.slot.read().map(|frame| SourcedFrame {
                        camera_id: runtime.id().to_string(),
                        frame,
                    })
                })
                .ok_or(CameraError::SourceUnavailable(None)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{CameraConfig, CameraRuntime};
    use crate::capture::WorkerControl;
    use crate::store::InMemoryStore;

    struct NoWorkers;

    impl WorkerControl for NoWorkers {
        fn start_worker(&self, _camera: &Arc<CameraRuntime>) {}
        fn stop_worker(&self, _camera: &CameraRuntime) {}
    }

    fn reader_with(ids: &[&str]) -> (FrameReader, Arc<CameraRegistry>) {
        let registry = Arc::new(CameraRegistry::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(NoWorkers),
            "main",
        ));
        for id in ids {
            registry
                .add(CameraConfig::new(*id, format!("stub://{}", id)))
                .unwrap();
        }
        (FrameReader::new(registry.clone()), registry)
    }

    fn frame(fill: u8) -> Frame {
        Frame::new(vec![fill; 3], 1, 1).unwrap()
    }

    #[test]
    fn named_camera_errors() {
        let (reader, _) = reader_with(&["cam-1"]);
        assert_eq!(
            reader.get(Some("ghost")).unwrap_err(),
            CameraError::NotFound("ghost".into())
        );
        assert_eq!(
            reader.get(Some("cam-1")).unwrap_err(),
            CameraError::SourceUnavailable(Some("cam-1".into()))
        );
    }

    #[test]
    fn fallback_picks_first_online_in_id_order() {
        let (reader, registry) = reader_with(&["c", "a", "b"]);
        assert_eq!(
            reader.get(None).unwrap_err(),
            CameraError::SourceUnavailable(None)
        );

        registry.runtime("c").unwrap().slot.publish(frame(3));
        registry.runtime("b").unwrap().slot.publish(frame(2));
        let sourced = reader.get(None).unwrap();
        assert_eq!(sourced.camera_id, "b");
        assert_eq!(sourced.frame.pixels(), &[2, 2, 2]);
    }

    #[test]
    fn named_read_returns_copy() {
        let (reader, registry) = reader_with(&["cam-1"]);
        let runtime = registry.runtime("cam-1").unwrap();
        runtime.slot.publish(frame(9));
        let copy = reader.get(Some("cam-1")).unwrap();
        runtime.slot.clear();
        assert_eq!(copy.frame.pixels(), &[9, 9, 9]);
    }
}
