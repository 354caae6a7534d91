//! Static aspect ratio, output size and model presets.
//!
//! Sizes are independent presets: nothing checks that a size's own ratio
//! matches the aspect ratio it is listed under.

use serde::Serialize;

/// A target output size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SizeSpec {
    pub key: &'static str,
    pub label: &'static str,
    pub width: u32,
    pub height: u32,
}

/// An aspect ratio together with the output sizes offered for it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AspectRatioSpec {
    pub key: &'static str,
    pub label: &'static str,
    pub width_ratio: f64,
    pub height_ratio: f64,
    pub candidate_sizes: &'static [SizeSpec],
}

/// An image generation model offered in the settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModelSpec {
    pub key: &'static str,
    pub label: &'static str,
}

const fn size(key: &'static str, label: &'static str, width: u32, height: u32) -> SizeSpec {
    SizeSpec {
        key,
        label,
        width,
        height,
    }
}

pub const SQUARE_SIZES: &[SizeSpec] = &[
    size("icon_256", "256x256 px", 256, 256),
    size("icon_128", "128x128 px", 128, 128),
    size("icon_96", "96x96 px", 96, 96),
    size("icon_64", "64x64 px", 64, 64),
    size("icon_48", "48x48 px", 48, 48),
    size("icon_32", "32x32 px", 32, 32),
    size("icon_24", "24x24 px", 24, 24),
    size("icon_16", "16x16 px", 16, 16),
];

pub const BANNER_16_9_SIZES: &[SizeSpec] = &[
    size("banner_1920_1080", "1920x1080 px (Full HD)", 1920, 1080),
    size("banner_1280_720", "1280x720 px (HD)", 1280, 720),
    size("banner_960_540", "960x540 px", 960, 540),
    size("banner_640_360", "640x360 px", 640, 360),
];

pub const PORTRAIT_4_5_SIZES: &[SizeSpec] = &[
    size("portrait_1080_1350", "1080x1350 px (Social)", 1080, 1350),
    size("portrait_800_1000", "800x1000 px", 800, 1000),
    size("portrait_400_500", "400x500 px", 400, 500),
];

pub const COVER_3_1_SIZES: &[SizeSpec] = &[
    size("cover_1500_500", "1500x500 px (Profile Cover)", 1500, 500),
    size("cover_1200_400", "1200x400 px", 1200, 400),
    size("cover_900_300", "900x300 px", 900, 300),
];

/// All aspect ratios, the first one being the default.
pub const ASPECT_RATIOS: &[AspectRatioSpec] = &[
    AspectRatioSpec {
        key: "SQUARE",
        label: "Square (1:1)",
        width_ratio: 1.0,
        height_ratio: 1.0,
        candidate_sizes: SQUARE_SIZES,
    },
    AspectRatioSpec {
        key: "BANNER_16_9",
        label: "Banner (16:9)",
        width_ratio: 16.0,
        height_ratio: 9.0,
        candidate_sizes: BANNER_16_9_SIZES,
    },
    AspectRatioSpec {
        key: "PORTRAIT_4_5",
        label: "Portrait (4:5)",
        width_ratio: 4.0,
        height_ratio: 5.0,
        candidate_sizes: PORTRAIT_4_5_SIZES,
    },
    AspectRatioSpec {
        key: "COVER_3_1",
        label: "Cover (3:1)",
        width_ratio: 3.0,
        height_ratio: 1.0,
        candidate_sizes: COVER_3_1_SIZES,
    },
];

pub const DEFAULT_IMAGE_MODEL: &str = "imagen-3.0-generate-002";

/// Image generation models the settings accept.
pub const AVAILABLE_IMAGE_MODELS: &[ModelSpec] = &[ModelSpec {
    key: DEFAULT_IMAGE_MODEL,
    label: "Imagen 3.0 (Latest & Recommended)",
}];

/// Looks up an aspect ratio by key.
pub fn aspect_ratio(key: &str) -> Option<&'static AspectRatioSpec> {
    ASPECT_RATIOS.iter().find(|ar| ar.key == key)
}

pub fn default_aspect_ratio() -> &'static AspectRatioSpec {
    &ASPECT_RATIOS[0]
}

/// Whether `key` names one of the [`AVAILABLE_IMAGE_MODELS`].
pub fn is_known_model(key: &str) -> bool {
    AVAILABLE_IMAGE_MODELS.iter().any(|m| m.key == key)
}

impl AspectRatioSpec {
    /// Exactly 1:1, in which case the crop step is skipped.
    pub fn is_square(&self) -> bool {
        self.width_ratio == self.height_ratio
    }

    /// Resolves size keys against the candidate sizes.
    ///
    /// The result follows candidate order, not the order of `keys`, and
    /// unknown keys are ignored.
    pub fn resolve_sizes<S: AsRef<str>>(&self, keys: &[S]) -> Vec<SizeSpec> {
        self.candidate_sizes
            .iter()
            .filter(|s| keys.iter().any(|k| k.as_ref() == s.key))
            .copied()
            .collect()
    }

    /// Keys of every candidate size, in order.
    pub fn all_size_keys(&self) -> Vec<String> {
        self.candidate_sizes.iter().map(|s| s.key.to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_key() {
        assert_eq!(aspect_ratio("BANNER_16_9").map(|a| a.width_ratio), Some(16.0));
        assert!(aspect_ratio("NOPE").is_none());
        assert_eq!(default_aspect_ratio().key, "SQUARE");
    }

    #[test]
    fn resolve_keeps_candidate_order_and_drops_unknown() {
        let ar = aspect_ratio("SQUARE").unwrap();
        let sizes = ar.resolve_sizes(&["icon_16", "bogus", "icon_256"]);
        let keys: Vec<_> = sizes.iter().map(|s| s.key).collect();
        assert_eq!(keys, vec!["icon_256", "icon_16"]);
    }

    #[test]
    fn resolve_never_duplicates() {
        let ar = aspect_ratio("COVER_3_1").unwrap();
        let sizes = ar.resolve_sizes(&["cover_900_300", "cover_900_300"]);
        assert_eq!(sizes.len(), 1);
    }

    #[test]
    fn only_square_is_square() {
        let squares: Vec<_> = ASPECT_RATIOS.iter().filter(|a| a.is_square()).collect();
        assert_eq!(squares.len(), 1);
        assert_eq!(squares[0].key, "SQUARE");
    }

    #[test]
    fn default_model_is_known() {
        assert!(is_known_model(DEFAULT_IMAGE_MODEL));
        assert!(!is_known_model("gemini-flash-latest"));
    }
}
