//! Runtime settings.
//!
//! Layering, lowest priority first: built-in defaults, a JSON settings file, then
//! whatever the caller (usually the CLI) overrides on the loaded value.

use crate::utils::ComplianceError;
use crate::validation::DEFAULT_PASS_THRESHOLD;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Rule catalog to load instead of the built-in one.
    pub rules_path: Option<PathBuf>,
    /// Format catalog to load instead of the built-in one.
    pub formats_path: Option<PathBuf>,
    /// Format used when none is given and detection finds nothing.
    pub default_format: Option<String>,
    /// Forces one jurisdiction's overrides for every format.
    pub jurisdiction: Option<String>,
    pub pass_threshold: f64,
    /// Run auto-fix after a failed validation.
    pub auto_fix: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            rules_path: None,
            formats_path: None,
            default_format: None,
            jurisdiction: None,
            pass_threshold: DEFAULT_PASS_THRESHOLD,
            auto_fix: false,
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self, ComplianceError> {
        let text = fs::read_to_string(path).map_err(|e| {
            ComplianceError::ConfigError(format!("Cannot read settings {}: {}", path.display(), e))
        })?;
        let settings: Settings = serde_json::from_str(&text).map_err(|e| {
            ComplianceError::ConfigError(format!("Invalid settings {}: {}", path.display(), e))
        })?;
        settings.validate()?;
        debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ComplianceError> {
        if !(0.0..=100.0).contains(&self.pass_threshold) {
            return Err(ComplianceError::ConfigError(format!(
                "pass_threshold {} is outside 0-100",
                self.pass_threshold
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"default_format": "US-Visa", "auto_fix": true}}"#).unwrap();

        let settings = Settings::load(file.path()).unwrap();
        assert_eq!(settings.default_format.as_deref(), Some("US-Visa"));
        assert!(settings.auto_fix);
        assert_eq!(settings.pass_threshold, DEFAULT_PASS_THRESHOLD);
        assert!(settings.rules_path.is_none());
    }

    #[test]
    fn test_out_of_range_threshold() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"pass_threshold": 140}}"#).unwrap();
        assert!(matches!(
            Settings::load(file.path()),
            Err(ComplianceError::ConfigError(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(Settings::load(Path::new("/nonexistent/pasfoto.json")).is_err());
    }
}
