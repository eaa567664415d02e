//! Primary-face selection.

use crate::emotion::localize;
use crate::types::{Detection, FaceBox};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum SelectError {
    #[error("primary face has no usable emotion scores")]
    NoScores,
}

/// The chosen face and its dominant emotion, still in scaled space.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub raw_label: String,
    pub label: String,
    /// Probability of the dominant emotion, clamped to [0, 1].
    pub score: f32,
    pub face_box: FaceBox,
}

/// Pick the first detection and its highest-probability emotion.
///
/// Returns `Ok(None)` when there are no detections. Ties are broken by
/// [`EmotionScores::top`](crate::types::EmotionScores::top).
pub fn select_primary(detections: &[Detection]) -> Result<Option<Selection>, SelectError> {
    let Some(first) = detections.first() else {
        return Ok(None);
    };
    let (raw, score) = first.scores.top().ok_or(SelectError::NoScores)?;

    Ok(Some(Selection {
        raw_label: raw.to_string(),
        label: localize(raw).to_string(),
        score: score.clamp(0.0, 1.0),
        face_box: first.face_box,
    }))
}
