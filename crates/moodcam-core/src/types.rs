use crate::decode::PixelGrid;
use crate::detector::DetectorError;
use crate::emotion::{Emotion, ERROR_LABEL, NO_FACE_LABEL};
use serde::Serialize;

/// Integer face box in pixel coordinates. Serializes as `[x, y, w, h]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(into = "[u32; 4]")]
pub struct FaceBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl FaceBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }
}

impl From<FaceBox> for [u32; 4] {
    fn from(b: FaceBox) -> Self {
        [b.x, b.y, b.width, b.height]
    }
}

/// Probability per emotion label, in the order the detector reported them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmotionScores {
    entries: Vec<(String, f32)>,
}

impl EmotionScores {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the probability for `label`, replacing any previous value.
    pub fn insert(&mut self, label: impl Into<String>, probability: f32) {
        let label = label.into();
        match self.entries.iter_mut().find(|(l, _)| *l == label) {
            Some(entry) => entry.1 = probability,
            None => self.entries.push((label, probability)),
        }
    }

    pub fn get(&self, label: &str) -> Option<f32> {
        self.entries
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, p)| *p)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f32)> {
        self.entries.iter().map(|(l, p)| (l.as_str(), *p))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Highest-probability label.
    ///
    /// Candidates are visited in canonical emotion order, then unknown labels
    /// in insertion order; the first label to reach the maximum wins. NaN
    /// probabilities are never selected.
    pub fn top(&self) -> Option<(&str, f32)> {
        let canonical = Emotion::ALL
            .into_iter()
            .filter_map(|e| self.get(e.as_str()).map(|p| (e.as_str(), p)));
        let unknown = self
            .iter()
            .filter(|(label, _)| Emotion::from_raw(label).is_none());

        let mut best: Option<(&str, f32)> = None;
        for (label, p) in canonical.chain(unknown) {
            if p.is_nan() {
                continue;
            }
            if best.map_or(true, |(_, b)| p > b) {
                best = Some((label, p));
            }
        }
        best
    }
}

impl<S: Into<String>> FromIterator<(S, f32)> for EmotionScores {
    fn from_iter<I: IntoIterator<Item = (S, f32)>>(iter: I) -> Self {
        let mut scores = EmotionScores::new();
        for (label, p) in iter {
            scores.insert(label, p);
        }
        scores
    }
}

/// One candidate face: box in the coordinate space of the analysed grid,
/// plus its emotion distribution.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub face_box: FaceBox,
    pub scores: EmotionScores,
}

/// Per-request analysis outcome, serialized as the response body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResult {
    pub has_face: bool,
    pub emotion: String,
    /// Face box in original-image coordinates.
    #[serde(rename = "box", skip_serializing_if = "Option::is_none")]
    pub face_box: Option<FaceBox>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

impl AnalysisResult {
    pub fn face(emotion: impl Into<String>, face_box: FaceBox, score: f32) -> Self {
        Self {
            has_face: true,
            emotion: emotion.into(),
            face_box: Some(face_box),
            score: Some(score),
        }
    }

    pub fn no_face() -> Self {
        Self {
            has_face: false,
            emotion: NO_FACE_LABEL.to_string(),
            face_box: None,
            score: None,
        }
    }

    /// Result for a frame that decoded but could not be analysed.
    pub fn failed() -> Self {
        Self {
            has_face: false,
            emotion: ERROR_LABEL.to_string(),
            face_box: None,
            score: None,
        }
    }
}

/// A swappable face + emotion detection capability.
///
/// Implementations return detections in their own ranking order; callers do
/// not re-sort. An empty vector means no face was found and is not an error.
pub trait EmotionDetector {
    fn detect(&mut self, grid: &PixelGrid) -> Result<Vec<Detection>, DetectorError>;
}

impl<T: EmotionDetector + ?Sized> EmotionDetector for Box<T> {
    fn detect(&mut self, grid: &PixelGrid) -> Result<Vec<Detection>, DetectorError> {
        (**self).detect(grid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_top_picks_maximum() {
        let scores: EmotionScores = [("sad", 0.1), ("happy", 0.7), ("neutral", 0.2)]
            .into_iter()
            .collect();
        assert_eq!(scores.top(), Some(("happy", 0.7)));
    }

    #[test]
    fn test_top_tie_breaks_by_canonical_order() {
        // Inserted neutral first, but happy precedes neutral canonically.
        let scores: EmotionScores = [("neutral", 0.5), ("happy", 0.5)].into_iter().collect();
        assert_eq!(scores.top(), Some(("happy", 0.5)));

        let scores: EmotionScores = [("fear", 0.4), ("angry", 0.4), ("sad", 0.2)]
            .into_iter()
            .collect();
        assert_eq!(scores.top(), Some(("angry", 0.4)));
    }

    #[test]
    fn test_top_unknown_labels_rank_after_canonical() {
        let scores: EmotionScores = [("contempt", 0.5), ("disgust", 0.5)].into_iter().collect();
        assert_eq!(scores.top(), Some(("disgust", 0.5)));

        let scores: EmotionScores = [("contempt", 0.6), ("disgust", 0.4)].into_iter().collect();
        assert_eq!(scores.top(), Some(("contempt", 0.6)));
    }

    #[test]
    fn test_top_skips_nan() {
        let scores: EmotionScores = [("happy", f32::NAN), ("sad", 0.3)].into_iter().collect();
        assert_eq!(scores.top(), Some(("sad", 0.3)));

        let scores: EmotionScores = [("happy", f32::NAN)].into_iter().collect();
        assert_eq!(scores.top(), None);
    }

    #[test]
    fn test_top_empty() {
        assert_eq!(EmotionScores::new().top(), None);
    }

    #[test]
    fn test_insert_replaces_existing() {
        let mut scores = EmotionScores::new();
        scores.insert("happy", 0.2);
        scores.insert("happy", 0.9);
        assert_eq!(scores.len(), 1);
        assert_eq!(scores.get("happy"), Some(0.9));
    }

    #[test]
    fn test_face_result_serializes_box_as_array() {
        let result = AnalysisResult::face("Hạnh phúc 😊", FaceBox::new(25, 50, 75, 100), 0.83);
        assert_eq!(
            serde_json::to_string(&result).unwrap(),
            r#"{"has_face":true,"emotion":"Hạnh phúc 😊","box":[25,50,75,100],"score":0.83}"#
        );
    }

    #[test]
    fn test_no_face_result_omits_box_and_score() {
        assert_eq!(
            serde_json::to_string(&AnalysisResult::no_face()).unwrap(),
            r#"{"has_face":false,"emotion":"Không tìm thấy mặt"}"#
        );
    }

    #[test]
    fn test_failed_result_is_distinct_from_no_face() {
        assert_ne!(AnalysisResult::failed(), AnalysisResult::no_face());
        assert!(!AnalysisResult::failed().has_face);
        assert_eq!(AnalysisResult::failed().emotion, "Lỗi xử lý");
    }
}
