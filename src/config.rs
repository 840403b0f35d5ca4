use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application-level constants
pub const APP_NAME: &str = "Homevault";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

const MIB: u64 = 1024 * 1024;

/// Get the application data directory.
/// Falls back to the working directory when no home can be resolved.
pub fn app_data_dir() -> PathBuf {
    dirs::data_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Location of the optional JSON config file.
pub fn config_file() -> PathBuf {
    app_data_dir().join("config.json")
}

/// Filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "homevault=info"
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Config value {field} = {value} is out of range")]
    OutOfRange { field: &'static str, value: i64 },
}

/// Widest accepted `expiry_window_days`, about a century.
pub const MAX_EXPIRY_WINDOW_DAYS: i64 = 36_500;
/// Widest accepted `new_badge_hours`, one year.
pub const MAX_NEW_BADGE_HOURS: i64 = 24 * 366;

/// Tunables for the intake pipeline and the collection views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntakeConfig {
    pub max_file_size_bytes: u64,
    pub accepted_mime_types: Vec<String>,
    /// Days before expiry at which a document turns `expires-soon`.
    pub expiry_window_days: i64,
    pub new_badge_hours: i64,
    /// Number of cards in the summary's recent list.
    pub recent_limit: usize,
    pub detection_settle_ms: u64,
    pub detection_poll_ms: u64,
    pub extraction_timeout_ms: u64,
    pub transfer_chunk_bytes: usize,
    /// Delay inserted between transfer chunks; zero disables pacing.
    pub transfer_pacing_ms: u64,
    /// When false, upload drafts skip extraction and commit as `pending`.
    pub extract_uploads: bool,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            max_file_size_bytes: 10 * MIB,
            accepted_mime_types: vec![
                "application/pdf".into(),
                "image/jpeg".into(),
                "image/jpg".into(),
                "image/png".into(),
                "image/heic".into(),
            ],
            expiry_window_days: 30,
            new_badge_hours: 24,
            recent_limit: 4,
            detection_settle_ms: 2000,
            detection_poll_ms: 250,
            extraction_timeout_ms: 30_000,
            transfer_chunk_bytes: 64 * 1024,
            transfer_pacing_ms: 0,
            extract_uploads: true,
        }
    }
}

impl IntakeConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject windows that are negative or too wide for date arithmetic.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ranges = [
            ("expiry_window_days", self.expiry_window_days, MAX_EXPIRY_WINDOW_DAYS),
            ("new_badge_hours", self.new_badge_hours, MAX_NEW_BADGE_HOURS),
        ];
        for (field, value, max) in ranges {
            if !(0..=max).contains(&value) {
                return Err(ConfigError::OutOfRange { field, value });
            }
        }
        Ok(())
    }

    /// Load from `config_file()`; a missing file yields the defaults.
    pub fn load_or_default() -> Result<Self, ConfigError> {
        let path = config_file();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        Self::load(&path)
    }

    pub fn accepts_mime(&self, mime: &str) -> bool {
        self.accepted_mime_types.iter().any(|m| m.eq_ignore_ascii_case(mime))
    }

    pub fn detection_settle(&self) -> Duration {
        Duration::from_millis(self.detection_settle_ms)
    }

    pub fn detection_poll(&self) -> Duration {
        Duration::from_millis(self.detection_poll_ms.max(1))
    }

    pub fn extraction_timeout(&self) -> Duration {
        Duration::from_millis(self.extraction_timeout_ms)
    }

    pub fn transfer_pacing(&self) -> Option<Duration> {
        (self.transfer_pacing_ms > 0).then(|| Duration::from_millis(self.transfer_pacing_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_data_dir_ends_with_app_name() {
        assert!(app_data_dir().ends_with("Homevault"));
        assert!(config_file().starts_with(app_data_dir()));
    }

    #[test]
    fn default_config_values() {
        let config = IntakeConfig::default();
        assert_eq!(config.max_file_size_bytes, 10 * 1024 * 1024);
        assert_eq!(config.expiry_window_days, 30);
        assert!(config.accepts_mime("application/pdf"));
        assert!(config.accepts_mime("IMAGE/PNG"));
        assert!(!config.accepts_mime("text/plain"));
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"expiry_window_days": 14}"#).unwrap();

        let config = IntakeConfig::load(&path).unwrap();
        assert_eq!(config.expiry_window_days, 14);
        assert_eq!(config.recent_limit, 4);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();

        assert!(matches!(
            IntakeConfig::load(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        std::fs::write(&path, r#"{"new_badge_hours": 9223372036854775807}"#).unwrap();
        assert!(matches!(
            IntakeConfig::load(&path),
            Err(ConfigError::OutOfRange { field: "new_badge_hours", .. })
        ));

        std::fs::write(&path, r#"{"expiry_window_days": -5}"#).unwrap();
        assert!(matches!(
            IntakeConfig::load(&path),
            Err(ConfigError::OutOfRange { field: "expiry_window_days", value: -5 })
        ));
    }

    #[test]
    fn zero_pacing_disables_delay() {
        let config = IntakeConfig::default();
        assert!(config.transfer_pacing().is_none());
        let paced = IntakeConfig {
            transfer_pacing_ms: 20,
            ..IntakeConfig::default()
        };
        assert_eq!(paced.transfer_pacing(), Some(Duration::from_millis(20)));
    }
}
