//! Persistence gate: decides whether an analysis is confident enough to log.

use crate::types::AnalysisResult;

/// Scores must strictly exceed this to be persisted.
pub const DEFAULT_PERSIST_THRESHOLD: f32 = 0.5;

/// Username recorded when the caller gives none ("anonymous visitor").
pub const DEFAULT_USERNAME: &str = "Khách vãng lai";

/// Longest username kept, in characters.
pub const USERNAME_MAX_CHARS: usize = 100;

/// Caller metadata attached to a request.
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    pub source_address: String,
    /// Free-text label from the client; untrusted and unauthenticated.
    pub username: Option<String>,
}

/// An observation ready to be appended to the history store.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub emotion: String,
    pub confidence: f32,
    pub source_address: String,
    pub username: String,
}

#[derive(Debug, Clone, Copy)]
pub struct PersistenceGate {
    threshold: f32,
}

impl Default for PersistenceGate {
    fn default() -> Self {
        Self { threshold: DEFAULT_PERSIST_THRESHOLD }
    }
}

impl PersistenceGate {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    /// Build the observation to persist, or `None` if the result does not qualify.
    pub fn admit(&self, result: &AnalysisResult, meta: &RequestMeta) -> Option<Observation> {
        if !result.has_face {
            return None;
        }
        let score = result.score?;
        if score <= self.threshold {
            return None;
        }
        Some(Observation {
            emotion: result.emotion.clone(),
            confidence: score,
            source_address: meta.source_address.clone(),
            username: normalize_username(meta.username.as_deref()),
        })
    }
}

/// Trim, default when absent or blank, and cap at [`USERNAME_MAX_CHARS`].
pub fn normalize_username(raw: Option<&str>) -> String {
    match raw.map(str::trim) {
        Some(name) if !name.is_empty() => name.chars().take(USERNAME_MAX_CHARS).collect(),
        _ => DEFAULT_USERNAME.to_string(),
    }
}
