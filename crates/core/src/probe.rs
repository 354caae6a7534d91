//! Reads image dimensions from the encoded header without a full decode.

use crate::error::{AppError, Result};
use image::ImageReader;
use log::warn;
use serde::Serialize;
use std::io::Cursor;

/// Intrinsic pixel dimensions of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    /// Placeholder for a resolution that could not be read.
    pub const UNKNOWN: Dimensions = Dimensions {
        width: 0,
        height: 0,
    };

    pub fn is_unknown(&self) -> bool {
        *self == Self::UNKNOWN
    }
}

impl std::fmt::Display for Dimensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Reads the width and height of an encoded image.
///
/// # Errors
///
/// Returns [`AppError::Decode`] if the format is not recognised or the
/// header is malformed.
pub fn probe(encoded: &[u8]) -> Result<Dimensions> {
    let (width, height) = ImageReader::new(Cursor::new(encoded))
        .with_guessed_format()
        .map_err(|e| AppError::decode(e.to_string()))?
        .into_dimensions()
        .map_err(|e| AppError::decode(e.to_string()))?;
    Ok(Dimensions { width, height })
}

/// Like [`probe`], but reports failure as [`Dimensions::UNKNOWN`].
///
/// Use this where the resolution is only displayed.
pub fn probe_or_unknown(encoded: &[u8]) -> Dimensions {
    probe(encoded).unwrap_or_else(|e| {
        warn!("could not read image dimensions: {}", e);
        Dimensions::UNKNOWN
    })
}
