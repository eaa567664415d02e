use moodcam_core::DetectorMode;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error("unsupported DATABASE_URL {0:?}: only sqlite://<path> is supported")]
    UnsupportedDatabaseUrl(String),
}

/// Daemon configuration.
///
/// Loaded from an optional TOML file named by `MOODCAM_CONFIG`, then
/// overridden by `MOODCAM_*` environment variables. Unset keys keep defaults.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Address the HTTP listener binds to (default: 0.0.0.0:5000).
    pub listen_addr: SocketAddr,
    /// Detector operating point, read once at startup.
    pub mode: DetectorMode,
    /// Directory containing the SCRFD and FER+ ONNX files.
    pub model_dir: PathBuf,
    /// Path to the SQLite history database.
    pub db_path: PathBuf,
    /// Scores must strictly exceed this to be persisted.
    pub persist_threshold: f32,
    /// Largest accepted request body.
    pub max_body_bytes: usize,
    /// Bound on analyses waiting for the engine thread.
    pub queue_depth: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 5000)),
            mode: DetectorMode::Fast,
            model_dir: moodcam_core::default_model_dir(),
            db_path: PathBuf::from("history.db"),
            persist_threshold: moodcam_core::gate::DEFAULT_PERSIST_THRESHOLD,
            max_body_bytes: 10 * 1024 * 1024,
            queue_depth: 16,
        }
    }
}

impl Config {
    /// Load from `$MOODCAM_CONFIG` (if set) and the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var_os("MOODCAM_CONFIG") {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `MOODCAM_*` and `DATABASE_URL` overrides from `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("MOODCAM_LISTEN_ADDR") {
            self.listen_addr = parse_env("MOODCAM_LISTEN_ADDR", &v)?;
        }
        if let Some(v) = lookup("MOODCAM_MODE") {
            self.mode = v.parse().map_err(|reason| ConfigError::Invalid {
                key: "MOODCAM_MODE",
                value: v.clone(),
                reason,
            })?;
        }
        if let Some(v) = lookup("MOODCAM_MODEL_DIR") {
            self.model_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("MOODCAM_DB_PATH") {
            self.db_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("DATABASE_URL") {
            self.db_path = sqlite_path_from_url(&v)?;
        }
        if let Some(v) = lookup("MOODCAM_PERSIST_THRESHOLD") {
            self.persist_threshold = parse_env("MOODCAM_PERSIST_THRESHOLD", &v)?;
        }
        if let Some(v) = lookup("MOODCAM_MAX_BODY_BYTES") {
            self.max_body_bytes = parse_env("MOODCAM_MAX_BODY_BYTES", &v)?;
        }
        if let Some(v) = lookup("MOODCAM_QUEUE_DEPTH") {
            self.queue_depth = parse_env("MOODCAM_QUEUE_DEPTH", &v)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.persist_threshold) {
            return Err(ConfigError::Invalid {
                key: "persist_threshold",
                value: self.persist_threshold.to_string(),
                reason: "must be within [0, 1]".into(),
            });
        }
        if self.queue_depth == 0 {
            return Err(ConfigError::Invalid {
                key: "queue_depth",
                value: "0".into(),
                reason: "must be at least 1".into(),
            });
        }
        if self.max_body_bytes == 0 {
            return Err(ConfigError::Invalid {
                key: "max_body_bytes",
                value: "0".into(),
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}

fn parse_env<T>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

/// `sqlite://history.db` → `history.db`, `sqlite:///var/lib/x.db` → `/var/lib/x.db`.
pub fn sqlite_path_from_url(url: &str) -> Result<PathBuf, ConfigError> {
    match url.strip_prefix("sqlite://") {
        Some(path) if !path.is_empty() => Ok(PathBuf::from(path)),
        _ => Err(ConfigError::UnsupportedDatabaseUrl(url.to_string())),
    }
}
