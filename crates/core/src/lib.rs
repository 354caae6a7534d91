//! PixelSpark Core Library
//!
//! This library provides the core functionality for PixelSpark: generating
//! candidate images from a text prompt and turning the picks into sets of
//! icon, banner, portrait and cover assets.
//!
//! # Overview
//!
//! - **Generation**: Imagen requests through the Gemini API via [`gemini`]
//! - **Transforms**: center crop to an aspect ratio and exact resize via [`image_processing`]
//! - **Pipeline**: crop once, resize many, per image via [`pipeline`]
//! - **Batches**: selection-wide processing and re-processing via [`batch`]
//! - **Session**: the prompt → selection → finalize flow via [`session`]
//! - **Export**: writing the finished batch to disk via [`export`]
//!
//! # Quick Start
//!
//! ```ignore
//! use pixel_spark_core::PixelSpark;
//!
//! let mut session = PixelSpark::new().session()?;
//! let candidates = session.generate("a red fox", "SQUARE", &["icon_256"]).await?;
//! let ids: Vec<String> = candidates.iter().map(|c| c.id.clone()).collect();
//! session.proceed_with_selection(&ids).await?;
//! ```
//!
//! # Module Structure
//!
//! - [`batch`]: Batch orchestration over selected sources and sizes
//! - [`catalog`]: Aspect ratio, size and model presets
//! - [`config`]: Environment configuration
//! - [`error`]: Error types and result aliases
//! - [`export`]: File naming and writing
//! - [`gemini`]: Image generation client
//! - [`image_processing`]: Crop and resize
//! - [`pipeline`]: Per-image processing
//! - [`probe`]: Image dimension probing
//! - [`session`]: Screen flow state machine
//! - [`settings`]: Persisted API key and model

pub mod batch;
pub mod catalog;
pub mod config;
pub mod error;
pub mod export;
pub mod gemini;
pub mod image_processing;
pub mod pipeline;
pub mod probe;
pub mod session;
pub mod settings;

// Re-export primary types for convenience
pub use batch::BatchOrchestrator;
pub use config::Config;
pub use error::{AppError, Result};
pub use gemini::{GeminiImageClient, ImageGenerator};
pub use pipeline::{ProcessedGroup, ProcessedVariant, SourceImage};
pub use session::Session;
pub use settings::Settings;

/// Main entry point for the PixelSpark application.
///
/// Resolves the effective configuration (environment overlaid with the
/// saved settings) and hands out sessions wired to the Gemini API.
pub struct PixelSpark {
    config: Config,
    settings: Settings,
}

impl PixelSpark {
    /// Loads the environment and the saved settings.
    pub fn new() -> Self {
        Self::with_settings(Settings::load())
    }

    /// Uses the given settings instead of the saved ones.
    pub fn with_settings(settings: Settings) -> Self {
        let config = Config::load().merged_with(&settings);
        Self { config, settings }
    }

    /// Starts a new session against the Gemini API.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be configured.
    pub fn session(&self) -> Result<Session<GeminiImageClient>> {
        Ok(Session::new(GeminiImageClient::new()?, &self.config))
    }

    /// Returns a reference to the effective configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns a mutable reference to the configuration.
    ///
    /// Allows overriding the model or key for this run only.
    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Saves new settings and applies them to the effective configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings file cannot be written.
    pub fn save_settings(&mut self, settings: Settings) -> Result<()> {
        settings.save()?;
        self.config = self.config.clone().merged_with(&settings);
        self.settings = settings;
        Ok(())
    }
}

impl Default for PixelSpark {
    fn default() -> Self {
        Self::new()
    }
}

/// Initializes the library by loading environment variables.
///
/// Call this once at application startup before using any other functions.
/// This loads `.env` files if present.
pub fn init() {
    let _ = dotenvy::dotenv();
}
