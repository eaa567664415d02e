//! Canonical emotion vocabulary and its display localization.

/// Label reported when the detector finds no face.
pub const NO_FACE_LABEL: &str = "Không tìm thấy mặt";

/// Label reported when analysis fails after the frame was decoded.
pub const ERROR_LABEL: &str = "Lỗi xử lý";

/// The seven canonical emotions, in canonical order.
///
/// Canonical order is also the tie-break order when two emotions share the
/// top probability: the one listed first wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Emotion {
    Happy,
    Sad,
    Angry,
    Surprise,
    Fear,
    Disgust,
    Neutral,
}

impl Emotion {
    pub const ALL: [Emotion; 7] = [
        Emotion::Happy,
        Emotion::Sad,
        Emotion::Angry,
        Emotion::Surprise,
        Emotion::Fear,
        Emotion::Disgust,
        Emotion::Neutral,
    ];

    /// Raw detector label, e.g. `"happy"`.
    pub fn as_str(self) -> &'static str {
        match self {
            Emotion::Happy => "happy",
            Emotion::Sad => "sad",
            Emotion::Angry => "angry",
            Emotion::Surprise => "surprise",
            Emotion::Fear => "fear",
            Emotion::Disgust => "disgust",
            Emotion::Neutral => "neutral",
        }
    }

    /// Display label with its glyph.
    pub fn localized(self) -> &'static str {
        match self {
            Emotion::Happy => "Hạnh phúc 😊",
            Emotion::Sad => "Buồn 😢",
            Emotion::Angry => "Giận dữ 😡",
            Emotion::Surprise => "Ngạc nhiên 😲",
            Emotion::Fear => "Sợ hãi 😨",
            Emotion::Disgust => "Ghê tởm 🤢",
            Emotion::Neutral => "Bình thường 😐",
        }
    }

    /// Parse a raw detector label. Matching is exact.
    pub fn from_raw(label: &str) -> Option<Emotion> {
        Emotion::ALL.into_iter().find(|e| e.as_str() == label)
    }

    /// Position in canonical order.
    pub fn rank(self) -> usize {
        self as usize
    }
}

/// Map a raw label to its display form. Unknown labels pass through unchanged,
/// which makes the mapping idempotent on already-localized labels.
pub fn localize(raw: &str) -> &str {
    match Emotion::from_raw(raw) {
        Some(emotion) => emotion.localized(),
        None => raw,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_localize_known_labels() {
        assert_eq!(localize("happy"), "Hạnh phúc 😊");
        assert_eq!(localize("sad"), "Buồn 😢");
        assert_eq!(localize("angry"), "Giận dữ 😡");
        assert_eq!(localize("surprise"), "Ngạc nhiên 😲");
        assert_eq!(localize("fear"), "Sợ hãi 😨");
        assert_eq!(localize("disgust"), "Ghê tởm 🤢");
        assert_eq!(localize("neutral"), "Bình thường 😐");
    }

    #[test]
    fn test_localize_unknown_passes_through() {
        assert_eq!(localize("contempt"), "contempt");
        assert_eq!(localize("Happy"), "Happy");
        assert_eq!(localize(""), "");
    }

    #[test]
    fn test_localize_idempotent() {
        for emotion in Emotion::ALL {
            let once = localize(emotion.as_str());
            assert_eq!(localize(once), once);
        }
        assert_eq!(localize(localize("contempt")), "contempt");
        assert_eq!(localize(NO_FACE_LABEL), NO_FACE_LABEL);
    }

    #[test]
    fn test_from_raw_roundtrip() {
        for emotion in Emotion::ALL {
            assert_eq!(Emotion::from_raw(emotion.as_str()), Some(emotion));
        }
        assert_eq!(Emotion::from_raw("joy"), None);
    }

    #[test]
    fn test_rank_follows_canonical_order() {
        let ranks: Vec<usize> = Emotion::ALL.iter().map(|e| e.rank()).collect();
        assert_eq!(ranks, vec![0, 1, 2, 3, 4, 5, 6]);
    }
}
