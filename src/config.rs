//! Application configuration.
//!
//! Settings come from three layers, later layers winning:
//!
//! 1. built-in defaults
//! 2. an optional JSON config file (missing file means defaults)
//! 3. `PROOFPACK_*` environment variables
//!
//! The PDF theme is part of [`ExportSettings`] and is handed to generators
//! through their context rather than held globally.

use crate::error::{PackError, Result, ResultExt as _};
use crate::sanitize::SanitizeMode;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const ENV_BIND: &str = "PROOFPACK_BIND";
pub const ENV_DATA_DIR: &str = "PROOFPACK_DATA_DIR";
pub const ENV_DATASET: &str = "PROOFPACK_DATASET";
pub const ENV_EXPORT_TIMEOUT: &str = "PROOFPACK_EXPORT_TIMEOUT_SECS";
pub const ENV_SANITIZE_MODE: &str = "PROOFPACK_SANITIZE_MODE";
pub const ENV_LOG_DIR: &str = "PROOFPACK_LOG_DIR";

const MAX_TIMEOUT_SECS: u64 = 600;

/// Default data directory: `<platform data dir>/proofpack`, or
/// `./proofpack-data` when the platform has none.
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|base| base.join("proofpack"))
        .unwrap_or_else(|| PathBuf::from("proofpack-data"))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind_address: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8080".to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Root of the ledger store.
    pub data_dir: PathBuf,
    /// Dataset served by the fixture data source.
    pub dataset_path: Option<PathBuf>,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            dataset_path: None,
        }
    }
}

/// Page geometry and title of the compliance report, in PDF points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PdfTheme {
    pub title: String,
    pub page_width: f32,
    pub page_height: f32,
    pub margin: f32,
    pub font_size: f32,
    pub title_font_size: f32,
    pub line_height: f32,
}

impl Default for PdfTheme {
    /// US Letter, portrait.
    fn default() -> Self {
        Self {
            title: "Compliance Proof Pack".to_owned(),
            page_width: 612.0,
            page_height: 792.0,
            margin: 48.0,
            font_size: 9.0,
            title_font_size: 14.0,
            line_height: 12.0,
        }
    }
}

impl PdfTheme {
    /// # Errors
    ///
    /// Returns [`PackError::Config`] for non-positive sizes or margins that
    /// leave no room for text.
    pub fn validate(&self) -> Result<()> {
        let sizes = [
            ("page_width", self.page_width),
            ("page_height", self.page_height),
            ("font_size", self.font_size),
            ("title_font_size", self.title_font_size),
            ("line_height", self.line_height),
        ];
        for (name, value) in sizes {
            if !value.is_finite() || value <= 0.0 {
                return Err(PackError::Config(format!("theme.{name} must be positive")));
            }
        }
        if !self.margin.is_finite()
            || self.margin < 0.0
            || self.margin * 2.0 >= self.page_width.min(self.page_height)
        {
            return Err(PackError::Config(
                "theme.margin leaves no printable area".to_owned(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    /// Deadline for one pack generation, in seconds.
    pub timeout_secs: u64,
    pub sanitize_mode: SanitizeMode,
    pub theme: PdfTheme,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            sanitize_mode: SanitizeMode::Strict,
            theme: PdfTheme::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Directory for rolling log files; `None` logs to the console only.
    pub log_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerSettings,
    pub storage: StorageSettings,
    pub export: ExportSettings,
    pub logging: LoggingSettings,
}

impl AppConfig {
    /// Read a JSON config file. A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        serde_json::from_str(&content)
            .map_err(|e| PackError::Config(format!("{}: {e}", path.display())))
    }

    /// Apply overrides from `lookup`, which maps a variable name to its
    /// value. [`AppConfig::load`] passes the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`PackError::Config`] for unparseable values.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bind) = lookup(ENV_BIND) {
            self.server.bind_address = bind;
        }
        if let Some(dir) = lookup(ENV_DATA_DIR) {
            self.storage.data_dir = PathBuf::from(dir);
        }
        if let Some(dataset) = lookup(ENV_DATASET) {
            self.storage.dataset_path = Some(PathBuf::from(dataset));
        }
        if let Some(raw) = lookup(ENV_EXPORT_TIMEOUT) {
            self.export.timeout_secs = raw.trim().parse().map_err(|e| {
                PackError::Config(format!("{ENV_EXPORT_TIMEOUT}='{raw}' is not a number: {e}"))
            })?;
        }
        if let Some(raw) = lookup(ENV_SANITIZE_MODE) {
            self.export.sanitize_mode = raw.parse()?;
        }
        if let Some(dir) = lookup(ENV_LOG_DIR) {
            self.logging.log_dir = Some(PathBuf::from(dir));
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`PackError::Config`] describing the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        if self.server.bind_address.parse::<std::net::SocketAddr>().is_err() {
            return Err(PackError::Config(format!(
                "server.bind_address '{}' is not a socket address",
                self.server.bind_address
            )));
        }
        if self.export.timeout_secs == 0 || self.export.timeout_secs > MAX_TIMEOUT_SECS {
            return Err(PackError::Config(format!(
                "export.timeout_secs must be between 1 and {MAX_TIMEOUT_SECS}"
            )));
        }
        self.export.theme.validate()
    }

    /// Defaults, then `path`, then the environment; validated.
    ///
    /// # Errors
    ///
    /// Returns error if any layer is invalid.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        AppConfig::default().validate().unwrap();
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = AppConfig::from_file(Path::new("/nonexistent/proofpack.json")).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"export": {"timeout_secs": 5}}"#).unwrap();

        let config = AppConfig::from_file(&path).unwrap();
        assert_eq!(config.export.timeout_secs, 5);
        assert_eq!(config.export.theme, PdfTheme::default());
        assert_eq!(config.server, ServerSettings::default());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            (ENV_BIND, "0.0.0.0:9000"),
            (ENV_EXPORT_TIMEOUT, "12"),
            (ENV_SANITIZE_MODE, "relaxed"),
            (ENV_DATA_DIR, "/var/lib/proofpack"),
        ]);
        let mut config = AppConfig::default();
        config
            .apply_env(|name| vars.get(name).map(|v| (*v).to_owned()))
            .unwrap();

        assert_eq!(config.server.bind_address, "0.0.0.0:9000");
        assert_eq!(config.export.timeout_secs, 12);
        assert_eq!(config.export.sanitize_mode, SanitizeMode::Relaxed);
        assert_eq!(config.storage.data_dir, PathBuf::from("/var/lib/proofpack"));
        config.validate().unwrap();
    }

    #[test]
    fn test_bad_env_value() {
        let mut config = AppConfig::default();
        let err = config
            .apply_env(|name| (name == ENV_EXPORT_TIMEOUT).then(|| "soon".to_owned()))
            .unwrap_err();
        assert!(matches!(err, PackError::Config(_)));
    }

    #[test]
    fn test_validation_failures() {
        let mut config = AppConfig::default();
        config.export.timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.export.theme.margin = 400.0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.server.bind_address = "localhost".to_owned();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_validates_before_any_command() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("proofpack.json");
        std::fs::write(&path, r#"{"export": {"theme": {"page_width": 0}}}"#).unwrap();

        let err = AppConfig::load(Some(&path)).unwrap_err();
        assert!(matches!(err, PackError::Config(ref m) if m.contains("page_width")), "{err}");
    }
}
