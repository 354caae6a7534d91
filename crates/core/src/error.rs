//! Error types for the pixel-spark-core library.
//!
//! This module provides granular error variants for the different failure
//! modes of generation, image processing and the session flow, so the front
//! end can tell a recoverable per-image problem from one the user must fix.

use thiserror::Error;

/// Errors that can occur within the pixel-spark-core library.
///
/// Each variant represents a specific failure mode with contextual information
/// to help diagnose and handle errors appropriately.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors (unreadable values, bad base URL).
    #[error("Configuration error: {0}")]
    Config(String),

    /// No API key is configured, so generation cannot be requested.
    #[error("API Key is missing. Please provide a valid API Key.")]
    MissingCredential,

    /// The API rejected the configured key.
    #[error("Invalid API Key. Please check your API Key in Settings.")]
    InvalidCredential,

    /// The API key has run out of quota.
    #[error("API quota exceeded. Please check your Google Cloud Console or API Key usage.")]
    QuotaExceeded,

    /// The API returned no images for the prompt.
    #[error(
        "The AI could not generate images for this prompt. It might be too restrictive or violate content policies."
    )]
    ContentRejected,

    /// Any other generation failure reported by the API.
    #[error("Failed to generate images: {0}")]
    GeminiApi(String),

    /// Transport-level HTTP failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Input bytes could not be interpreted as an image.
    #[error("Failed to decode image: {0}")]
    Decode(String),

    /// Output image could not be encoded.
    #[error("Failed to encode image: {0}")]
    Encode(String),

    /// A requested output size has a zero dimension.
    #[error("Invalid target dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    /// The crop step failed, so no variant of this source can be produced.
    #[error("Failed to crop image {source_id} to aspect ratio: {reason}")]
    WholeImage { source_id: String, reason: String },

    /// Every selected source failed whole-image processing.
    #[error(
        "Failed to process any of the {attempted} selected image(s). Please try again or select different images."
    )]
    BatchEmpty { attempted: usize },

    /// Generation was requested with a blank prompt.
    #[error("Please enter a prompt describing the image")]
    EmptyPrompt,

    /// None of the chosen ids name a generated image.
    #[error("No images selected")]
    EmptySelection,

    /// The requested aspect ratio key is not in the catalog.
    #[error("Unknown aspect ratio: {0}")]
    UnknownAspectRatio(String),

    /// A session event that makes no sense on the current screen.
    #[error("Cannot {event} from the {screen} screen")]
    InvalidTransition { screen: String, event: String },

    /// A background image task panicked or was cancelled.
    #[error("Image task failed: {0}")]
    Task(String),

    /// Standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The export archive could not be written.
    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AppError {
    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a decode error with the given message.
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Creates an encode error with the given message.
    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode(msg.into())
    }

    /// Creates a Gemini API error with the given message.
    pub fn gemini(msg: impl Into<String>) -> Self {
        Self::GeminiApi(msg.into())
    }

    /// Creates a session transition error.
    pub fn transition(screen: impl Into<String>, event: impl Into<String>) -> Self {
        Self::InvalidTransition {
            screen: screen.into(),
            event: event.into(),
        }
    }

    /// Whether the user has to fix their API key before anything else works.
    pub fn is_credential_problem(&self) -> bool {
        matches!(self, Self::MissingCredential | Self::InvalidCredential)
    }
}

impl From<image::ImageError> for AppError {
    fn from(err: image::ImageError) -> Self {
        match err {
            image::ImageError::Encoding(e) => AppError::Encode(e.to_string()),
            other => AppError::Decode(other.to_string()),
        }
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::Task(err.to_string())
    }
}

/// A convenient alias for Result with [`AppError`].
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_problems_are_flagged() {
        assert!(AppError::MissingCredential.is_credential_problem());
        assert!(AppError::InvalidCredential.is_credential_problem());
        assert!(!AppError::QuotaExceeded.is_credential_problem());
        assert!(!AppError::decode("bad").is_credential_problem());
    }

    #[test]
    fn batch_empty_mentions_count() {
        let msg = AppError::BatchEmpty { attempted: 3 }.to_string();
        assert!(msg.contains("3 selected"));
    }
}
