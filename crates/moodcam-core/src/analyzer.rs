//! ONNX-backed [`EmotionDetector`]: SCRFD face localization followed by
//! FER+ classification of each face crop.

use crate::classifier::EmotionClassifier;
use crate::decode::PixelGrid;
use crate::detector::{DetectorError, FaceDetector};
use crate::scale::ScaleFactor;
use crate::types::{Detection, EmotionDetector};
use image::imageops;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

pub const SCRFD_MODEL_FILE: &str = "det_10g.onnx";
pub const FERPLUS_MODEL_FILE: &str = "emotion-ferplus-8.onnx";

/// Deployment operating point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectorMode {
    /// Downscale frames to 40% and run SCRFD at 320 px.
    #[default]
    Fast,
    /// Analyse full-resolution frames with SCRFD at 640 px.
    Accurate,
}

impl DetectorMode {
    pub fn scale_factor(self) -> ScaleFactor {
        match self {
            DetectorMode::Fast => ScaleFactor::new(0.4).unwrap_or_default(),
            DetectorMode::Accurate => ScaleFactor::IDENTITY,
        }
    }

    pub fn scrfd_input_size(self) -> usize {
        match self {
            DetectorMode::Fast => 320,
            DetectorMode::Accurate => 640,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DetectorMode::Fast => "fast",
            DetectorMode::Accurate => "accurate",
        }
    }
}

impl fmt::Display for DetectorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DetectorMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fast" => Ok(DetectorMode::Fast),
            "accurate" => Ok(DetectorMode::Accurate),
            other => Err(format!("unknown detector mode {other:?} (expected fast or accurate)")),
        }
    }
}

/// Face localizer plus emotion classifier, loaded once and reused.
pub struct OnnxEmotionDetector {
    faces: FaceDetector,
    classifier: EmotionClassifier,
}

impl OnnxEmotionDetector {
    /// Load both models from `model_dir`. Fails fast if either is missing.
    pub fn load(model_dir: &Path, mode: DetectorMode) -> Result<Self, DetectorError> {
        let scrfd_path = model_dir.join(SCRFD_MODEL_FILE).to_string_lossy().into_owned();
        let ferplus_path = model_dir.join(FERPLUS_MODEL_FILE).to_string_lossy().into_owned();

        let faces = FaceDetector::load(&scrfd_path, mode.scrfd_input_size())?;
        let classifier = EmotionClassifier::load(&ferplus_path)?;

        tracing::info!(%mode, dir = %model_dir.display(), "emotion detector ready");
        Ok(Self { faces, classifier })
    }
}

impl EmotionDetector for OnnxEmotionDetector {
    fn detect(&mut self, grid: &PixelGrid) -> Result<Vec<Detection>, DetectorError> {
        let candidates = self.faces.detect(grid)?;
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let gray = grid.to_luma();
        let mut detections = Vec::with_capacity(candidates.len());

        for candidate in &candidates {
            let Some(face_box) = candidate.to_face_box(grid.width(), grid.height()) else {
                tracing::debug!(?candidate, "face candidate outside frame, skipped");
                continue;
            };
            let crop = imageops::crop_imm(
                &gray,
                face_box.x,
                face_box.y,
                face_box.width,
                face_box.height,
            )
            .to_image();
            let scores = self.classifier.classify(&crop)?;
            detections.push(Detection { face_box, scores });
        }

        Ok(detections)
    }
}
