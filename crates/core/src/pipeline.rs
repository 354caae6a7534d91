//! Turns one source image into one processed group: crop once, resize many.
//!
//! Failures are isolated at two levels. A failed crop loses the whole
//! source (no sizing can happen without a base image). A failed resize
//! only loses that one size; the remaining sizes are still produced.

use crate::catalog::{AspectRatioSpec, SizeSpec};
use crate::error::{AppError, Result};
use crate::image_processing::ImageProcessor;
use futures::future::join_all;
use log::{debug, warn};
use std::sync::Arc;

/// An unprocessed candidate image. Cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceImage {
    pub id: String,
    pub pixels: Arc<[u8]>,
}

impl SourceImage {
    pub fn new(id: impl Into<String>, pixels: impl Into<Arc<[u8]>>) -> Self {
        Self {
            id: id.into(),
            pixels: pixels.into(),
        }
    }
}

/// One source image rendered at one target size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedVariant {
    pub size_key: String,
    pub size_label: String,
    pub width: u32,
    pub height: u32,
    /// PNG bytes, or `None` when the resize failed.
    pub pixels: Option<Vec<u8>>,
}

impl ProcessedVariant {
    fn succeeded(size: &SizeSpec, pixels: Vec<u8>) -> Self {
        Self {
            size_key: size.key.to_string(),
            size_label: size.label.to_string(),
            width: size.width,
            height: size.height,
            pixels: Some(pixels),
        }
    }

    fn failed(size: &SizeSpec) -> Self {
        Self {
            size_key: size.key.to_string(),
            size_label: format!("{} (Error)", size.label),
            width: size.width,
            height: size.height,
            pixels: None,
        }
    }

    pub fn is_absent(&self) -> bool {
        self.pixels.is_none()
    }
}

/// Every derived variant of one source image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedGroup {
    pub source_id: String,
    pub source_pixels: Arc<[u8]>,
    /// Successful variants in size order.
    pub variants: Vec<ProcessedVariant>,
    /// Sizes whose resize failed, with decorated labels and no pixels.
    pub failed: Vec<ProcessedVariant>,
}

/// Crops `source` to the aspect ratio and resizes it to every target size.
///
/// Square aspect ratios skip the crop and resize the source bytes as is.
/// The resizes for one image run concurrently on the blocking pool and the
/// call returns once all of them have finished.
///
/// # Errors
///
/// Returns [`AppError::WholeImage`] if the crop step fails. Resize
/// failures never fail the call; they end up in [`ProcessedGroup::failed`].
pub async fn process_one(
    source: &SourceImage,
    aspect_ratio: &AspectRatioSpec,
    sizes: &[SizeSpec],
) -> Result<ProcessedGroup> {
    let base: Arc<[u8]> = if aspect_ratio.is_square() {
        Arc::clone(&source.pixels)
    } else {
        crop_base(source, aspect_ratio).await?.into()
    };

    let resizes = sizes.iter().map(|size| {
        let base = Arc::clone(&base);
        let size = *size;
        async move {
            let outcome = tokio::task::spawn_blocking(move || {
                ImageProcessor::resize(&base, size.width, size.height)
            })
            .await
            .map_err(AppError::from)
            .and_then(|r| r);
            (size, outcome)
        }
    });

    let mut variants = Vec::with_capacity(sizes.len());
    let mut failed = Vec::new();
    for (size, outcome) in join_all(resizes).await {
        match outcome {
            Ok(pixels) => variants.push(ProcessedVariant::succeeded(&size, pixels)),
            Err(e) => {
                warn!("failed to resize {} to {}: {}", source.id, size.label, e);
                failed.push(ProcessedVariant::failed(&size));
            }
        }
    }

    debug!(
        "processed {}: {} variant(s), {} failed",
        source.id,
        variants.len(),
        failed.len()
    );

    Ok(ProcessedGroup {
        source_id: source.id.clone(),
        source_pixels: Arc::clone(&source.pixels),
        variants,
        failed,
    })
}

async fn crop_base(source: &SourceImage, aspect_ratio: &AspectRatioSpec) -> Result<Vec<u8>> {
    let pixels = Arc::clone(&source.pixels);
    let (wr, hr) = (aspect_ratio.width_ratio, aspect_ratio.height_ratio);

    tokio::task::spawn_blocking(move || ImageProcessor::crop(&pixels, wr, hr))
        .await
        .map_err(AppError::from)
        .and_then(|r| r)
        .map_err(|e| AppError::WholeImage {
            source_id: source.id.clone(),
            reason: e.to_string(),
        })
}
