//! Per-frame analysis: decode → scale → detect → select → rescale.

use crate::decode::{DecodeError, ImageSource, PixelGrid};
use crate::detector::DetectorError;
use crate::scale::{rescale_box, scale_frame, ScaleFactor};
use crate::select::{select_primary, SelectError};
use crate::types::{AnalysisResult, EmotionDetector};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("decode: {0}")]
    Decode(#[from] DecodeError),
    #[error("detector: {0}")]
    Detector(#[from] DetectorError),
    #[error("selection: {0}")]
    Selection(#[from] SelectError),
    /// Analysis panicked; the panic was contained to this frame.
    #[error("analysis aborted: {0}")]
    Aborted(String),
}

impl PipelineError {
    /// True when the input never became a frame; detection was not attempted.
    pub fn is_decode(&self) -> bool {
        matches!(self, PipelineError::Decode(_))
    }
}

/// Owns the detector and the deployment scale factor.
pub struct Pipeline<D> {
    detector: D,
    scale: ScaleFactor,
}

impl<D: EmotionDetector> Pipeline<D> {
    pub fn new(detector: D, scale: ScaleFactor) -> Self {
        Self { detector, scale }
    }

    pub fn scale_factor(&self) -> ScaleFactor {
        self.scale
    }

    /// Decode `source` and analyse it.
    pub fn analyze(&mut self, source: &ImageSource) -> Result<AnalysisResult, PipelineError> {
        let grid = source.decode()?;
        tracing::debug!(width = grid.width(), height = grid.height(), "frame decoded");
        self.analyze_grid(grid)
    }

    /// Analyse an already-decoded frame.
    pub fn analyze_grid(&mut self, grid: PixelGrid) -> Result<AnalysisResult, PipelineError> {
        let grid = scale_frame(grid, self.scale);
        let detections = self.detector.detect(&grid)?;
        tracing::debug!(faces = detections.len(), "detector finished");

        let Some(selection) = select_primary(&detections)? else {
            return Ok(AnalysisResult::no_face());
        };

        let face_box = rescale_box(selection.face_box, self.scale);
        tracing::debug!(
            raw = %selection.raw_label,
            score = selection.score,
            ?face_box,
            "face selected"
        );
        Ok(AnalysisResult::face(selection.label, face_box, selection.score))
    }
}
