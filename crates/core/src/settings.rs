//! User settings persistence.
//!
//! This module stores the two persisted values of the application: the
//! API key and the selected image model.

use crate::catalog::is_known_model;
use crate::error::Result;
use directories::ProjectDirs;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// User-configurable settings persisted between sessions.
///
/// Settings are stored as JSON in the user's config directory
/// (e.g., `~/.config/pixel-spark/settings.json` on Linux).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// API key used for image generation.
    #[serde(default)]
    pub api_key: String,
    /// Selected image model, empty when none was chosen.
    #[serde(default)]
    pub model: String,
}

impl Settings {
    /// Returns the path to the settings file.
    pub fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "pixel-spark").map(|dirs| dirs.config_dir().join("settings.json"))
    }

    /// Loads settings from the user's config directory, falling back to defaults.
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Loads settings from `path`, falling back to defaults if missing or unreadable.
    ///
    /// A stored model that is not offered any more is dropped, leaving the
    /// choice to the environment or the built-in default.
    pub fn load_from(path: &Path) -> Self {
        let mut settings: Self = fs::read_to_string(path)
            .ok()
            .and_then(|content| match serde_json::from_str(&content) {
                Ok(s) => Some(s),
                Err(e) => {
                    warn!("ignoring unreadable settings at {}: {}", path.display(), e);
                    None
                }
            })
            .unwrap_or_default();

        if !settings.model.is_empty() && !is_known_model(&settings.model) {
            debug!("stored model {} is not available", settings.model);
            settings.model.clear();
        }
        settings
    }

    /// Persists settings to the user's config directory.
    ///
    /// # Errors
    /// Returns an error if serialization or file writing fails.
    pub fn save(&self) -> Result<()> {
        if let Some(path) = Self::config_path() {
            self.save_to(&path)?;
        }
        Ok(())
    }

    /// Persists settings to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    /// Key with surrounding whitespace removed, or `None` when unset.
    pub fn api_key(&self) -> Option<&str> {
        self.has_api_key().then(|| self.api_key.trim())
    }

    /// Saved model, or `None` when the user never picked one.
    pub fn model(&self) -> Option<&str> {
        let model = self.model.trim();
        (!model.is_empty()).then_some(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::DEFAULT_IMAGE_MODEL;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load_from(&dir.path().join("settings.json"));
        assert_eq!(settings, Settings::default());
        assert!(!settings.has_api_key());
        assert_eq!(settings.model(), None);
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let settings = Settings {
            api_key: "secret".into(),
            model: DEFAULT_IMAGE_MODEL.into(),
        };

        settings.save_to(&path).unwrap();

        assert_eq!(Settings::load_from(&path), settings);
    }

    #[test]
    fn unknown_model_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"api_key":"k","model":"retired-model"}"#).unwrap();

        let settings = Settings::load_from(&path);

        assert_eq!(settings.api_key, "k");
        assert_eq!(settings.model(), None);
    }

    #[test]
    fn known_model_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, format!(r#"{{"model":"{}"}}"#, DEFAULT_IMAGE_MODEL)).unwrap();

        assert_eq!(Settings::load_from(&path).model(), Some(DEFAULT_IMAGE_MODEL));
    }

    #[test]
    fn corrupt_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();

        assert_eq!(Settings::load_from(&path), Settings::default());
    }

    #[test]
    fn blank_key_is_unset() {
        let settings = Settings {
            api_key: "  ".into(),
            ..Settings::default()
        };
        assert_eq!(settings.api_key(), None);
    }
}
