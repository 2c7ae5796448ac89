#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};
use image::RgbImage;
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{non_max_suppression, Detection, ObjectClass};

const DEFAULT_SCORE_THRESHOLD: f32 = 0.25;
const DEFAULT_IOU_THRESHOLD: f32 = 0.45;

/// Tract-based YOLOv8 backend.
///
/// Expects the stock export: input `[1, 3, S, S]` float RGB in `0..1`, output
/// `[1, 4 + classes, anchors]` with `cx, cy, w, h` rows followed by per-class
/// scores. Frames are resized (not letterboxed) to `S x S` and boxes are scaled
/// back to frame pixels.
pub struct TractBackend {
    model: TypedRunnableModel<TypedModel>,
    input_size: u32,
    score_threshold: f32,
    iou_threshold: f32,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, input_size: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let side = input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(0, InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, side, side)))
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            input_size,
            score_threshold: DEFAULT_SCORE_THRESHOLD,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
        })
    }

    /// Override the default score threshold.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.score_threshold = threshold;
        self
    }

    fn build_input(&self, pixels: &[u8], width: u32, height: u32) -> Result<Tensor> {
        let image = RgbImage::from_raw(width, height, pixels.to_vec())
            .ok_or_else(|| anyhow!("RGB buffer does not match {}x{}", width, height))?;
        let side = self.input_size;
        let resized = if width == side && height == side {
            image
        } else {
            imageops::resize(&image, side, side, FilterType::Triangle)
        };

        let side = side as usize;
        let input = tract_ndarray::Array4::from_shape_fn((1, 3, side, side), |(_, c, y, x)| {
            resized.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
        });
        Ok(input.into_tensor())
    }

    fn decode(&self, outputs: TVec<TValue>, width: u32, height: u32) -> Result<Vec<Detection>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?
            .into_dimensionality::<tract_ndarray::Ix3>()
            .context("model output is not [1, rows, anchors]")?;
        let rows = view.shape()[1];
        if rows < 5 {
            return Err(anyhow!("model output has {} rows; expected at least 5", rows));
        }
        let anchors = view.shape()[2];
        let scale_x = width as f32 / self.input_size as f32;
        let scale_y = height as f32 / self.input_size as f32;

        let mut candidates = Vec::new();
        for i in 0..anchors {
            let (best_class, best_score) = (4..rows)
                .map(|r| (r - 4, view[[0, r, i]]))
                .fold((0, f32::NEG_INFINITY), |best, cur| if cur.1 > best.1 { cur } else { best });
            if !best_score.is_finite() || best_score < self.score_threshold {
                continue;
            }
            let cx = view[[0, 0, i]] * scale_x;
            let cy = view[[0, 1, i]] * scale_y;
            let w = view[[0, 2, i]] * scale_x;
            let h = view[[0, 3, i]] * scale_y;
            candidates.push(Detection::new(
                cx - w / 2.0,
                cy - h / 2.0,
                cx + w / 2.0,
                cy + h / 2.0,
                best_score,
                ObjectClass::from_coco(best_class),
            ));
        }
        Ok(non_max_suppression(candidates, self.iou_threshold))
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<Vec<Detection>> {
        let input = self.build_input(pixels, width, height)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.decode(outputs, width, height)
    }

    fn warm_up(&mut self) -> Result<()> {
        let side = self.input_size;
        let blank = vec![0u8; side as usize * side as usize * 3];
        self.detect(&blank, side, side).map(|_| ())
    }
}
