//! moodcam-core: single-frame facial emotion analysis.
//!
//! Decodes a frame, optionally downscales it, finds faces with SCRFD,
//! classifies the primary face with FER+ (both via ONNX Runtime), and maps
//! the result back to original-image coordinates.

pub mod analyzer;
pub mod classifier;
pub mod decode;
pub mod detector;
pub mod emotion;
pub mod gate;
pub mod pipeline;
pub mod scale;
pub mod select;
pub mod types;

pub use analyzer::{DetectorMode, OnnxEmotionDetector};
pub use decode::{DecodeError, ImageSource, PixelGrid};
pub use detector::DetectorError;
pub use emotion::{Emotion, ERROR_LABEL, NO_FACE_LABEL};
pub use gate::{Observation, PersistenceGate, RequestMeta};
pub use pipeline::{Pipeline, PipelineError};
pub use scale::ScaleFactor;
pub use types::{AnalysisResult, Detection, EmotionDetector, EmotionScores, FaceBox};

use std::path::PathBuf;

/// `$XDG_DATA_HOME/moodcam/models`, falling back to `~/.local/share/moodcam/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("moodcam")
        .join("models")
}
