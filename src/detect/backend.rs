use anyhow::Result;
use std::sync::{Arc, Mutex};

use super::backends::ScriptedBackend;
use super::result::Detection;
use crate::config::DetectionSettings;

/// Detector backend trait.
///
/// Implementations treat the pixel slice as read-only and must not retain it
/// past the `detect` call.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a packed RGB8 frame. Boxes are in pixel coordinates of
    /// the frame passed in.
    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<Vec<Detection>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Backends are wrapped in `Mutex` because `detect` takes `&mut self`.
pub type SharedBackend = Arc<Mutex<dyn DetectorBackend>>;

/// Backend for the daemon: the ONNX model when one is configured, otherwise a
/// scripted backend that reports nothing.
pub fn build_backend(settings: &DetectionSettings) -> Result<SharedBackend> {
    match &settings.model_path {
        #[cfg(feature = "backend-tract")]
        Some(path) => {
            let mut backend = super::backends::TractBackend::new(path, settings.input_size)?
                .with_threshold(settings.min_confidence);
            backend.warm_up()?;
            log::info!("detector: loaded ONNX model {}", path.display());
            Ok(Arc::new(Mutex::new(backend)))
        }
        #[cfg(not(feature = "backend-tract"))]
        Some(path) => Err(anyhow::anyhow!(
            "detection.model_path {} requires the backend-tract feature",
            path.display()
        )),
        None => {
            log::warn!("detector: no model configured; detections will be empty");
            Ok(Arc::new(Mutex::new(ScriptedBackend::new())))
        }
    }
}
