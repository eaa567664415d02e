//! FER+ emotion classifier via ONNX Runtime.
//!
//! Classifies a grayscale face crop into the canonical emotion vocabulary
//! using the `emotion-ferplus-8` model (64×64 input, 8 logits).

use crate::emotion::Emotion;
use crate::types::EmotionScores;
use image::imageops::{self, FilterType};
use image::GrayImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const FERPLUS_INPUT_SIZE: u32 = 64;

/// FER+ output order. `None` marks contempt, which has no canonical
/// counterpart and is left out of the softmax.
const FERPLUS_CLASSES: [Option<Emotion>; 8] = [
    Some(Emotion::Neutral),
    Some(Emotion::Happy),
    Some(Emotion::Surprise),
    Some(Emotion::Sad),
    Some(Emotion::Angry),
    Some(Emotion::Disgust),
    Some(Emotion::Fear),
    None,
];

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("model file not found: {0}; download it and place it in the model directory")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("face crop is empty")]
    EmptyCrop,
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// FER+-based emotion classifier.
pub struct EmotionClassifier {
    session: Session,
}

impl EmotionClassifier {
    /// Load the FER+ ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, ClassifierError> {
        if !Path::new(model_path).exists() {
            return Err(ClassifierError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded FER+ model"
        );

        Ok(Self { session })
    }

    /// Score a grayscale face crop of any size.
    pub fn classify(&mut self, face: &GrayImage) -> Result<EmotionScores, ClassifierError> {
        if face.width() == 0 || face.height() == 0 {
            return Err(ClassifierError::EmptyCrop);
        }

        let input = Self::preprocess(face);
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, logits) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ClassifierError::InferenceFailed(format!("logits extraction: {e}")))?;

        scores_from_logits(logits)
    }

    /// Resize to 64×64 and lay out as a `[1, 1, 64, 64]` tensor of raw 0–255 values.
    fn preprocess(face: &GrayImage) -> Array4<f32> {
        let size = FERPLUS_INPUT_SIZE;
        let resized = imageops::resize(face, size, size, FilterType::Triangle);
        let mut tensor = Array4::<f32>::zeros((1, 1, size as usize, size as usize));
        for (x, y, pixel) in resized.enumerate_pixels() {
            tensor[[0, 0, y as usize, x as usize]] = pixel.0[0] as f32;
        }
        tensor
    }
}

/// Softmax over the canonical classes of a FER+ logit vector.
fn scores_from_logits(logits: &[f32]) -> Result<EmotionScores, ClassifierError> {
    if logits.len() != FERPLUS_CLASSES.len() {
        return Err(ClassifierError::InferenceFailed(format!(
            "expected {} logits, got {}",
            FERPLUS_CLASSES.len(),
            logits.len()
        )));
    }

    let kept: Vec<(Emotion, f32)> = FERPLUS_CLASSES
        .iter()
        .zip(logits)
        .filter_map(|(class, &logit)| class.map(|e| (e, logit)))
        .collect();

    if kept.iter().any(|(_, l)| !l.is_finite()) {
        return Err(ClassifierError::InferenceFailed("non-finite logits".into()));
    }
    let max = kept.iter().map(|(_, l)| *l).fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = kept.iter().map(|(_, l)| (l - max).exp()).collect();
    let sum: f32 = exps.iter().sum();

    let mut ordered: Vec<(Emotion, f32)> = kept
        .iter()
        .zip(&exps)
        .map(|((e, _), x)| (*e, x / sum))
        .collect();
    ordered.sort_by_key(|(e, _)| e.rank());

    Ok(ordered.into_iter().map(|(e, p)| (e.as_str(), p)).collect())
}
