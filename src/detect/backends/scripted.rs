use anyhow::{anyhow, Result};
use std::collections::HashMap;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::Detection;

/// Backend that returns preconfigured detections.
///
/// Used when no model is configured (returns nothing) and by tests, where
/// detections can be keyed by frame width to tell cameras apart.
#[derive(Clone, Debug, Default)]
pub struct ScriptedBackend {
    fixed: Vec<Detection>,
    by_width: HashMap<u32, Vec<Detection>>,
    failure: Option<String>,
    calls: u64,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always report `detections`.
    pub fn with_detections(detections: Vec<Detection>) -> Self {
        Self {
            fixed: detections,
            ..Self::default()
        }
    }

    /// Report `detections` for frames of the given width; other frames fall
    /// back to the fixed list.
    pub fn for_width(mut self, width: u32, detections: Vec<Detection>) -> Self {
        self.by_width.insert(width, detections);
        self
    }

    /// Fail every call with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl DetectorBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn detect(&mut self, _pixels: &[u8], width: u32, _height: u32) -> Result<Vec<Detection>> {
        self.calls += 1;
        if let Some(message) = &self.failure {
            return Err(anyhow!("{}", message));
        }
        Ok(self
            .by_width
            .get(&width)
            .unwrap_or(&self.fixed)
            .clone())
    }
}
