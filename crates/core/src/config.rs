use crate::catalog::DEFAULT_IMAGE_MODEL;
use crate::settings::Settings;
use dotenvy::dotenv;
use std::env;

/// Configuration taken from the environment, with `.env` support.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub gemini_api_key: Option<String>,
    pub model_name: String,
}

impl Config {
    pub fn load() -> Self {
        // Load .env file if it exists, ignore if it doesn't
        let _ = dotenv();

        let gemini_api_key = env::var("GEMINI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty());

        let model_name = env::var("PIXEL_SPARK_MODEL")
            .ok()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_IMAGE_MODEL.to_string());

        Self {
            gemini_api_key,
            model_name,
        }
    }

    /// Overlays persisted settings: a saved key or model wins over the environment.
    pub fn merged_with(mut self, settings: &Settings) -> Self {
        if let Some(key) = settings.api_key() {
            self.gemini_api_key = Some(key.to_string());
        }
        if let Some(model) = settings.model() {
            self.model_name = model.to_string();
        }
        self
    }

    pub fn has_api_key(&self) -> bool {
        self.gemini_api_key.is_some()
    }
}
