//! Writing a finished batch to disk.
//!
//! Flat layout names files `<prefix>[_<n>]_<w>x<h>.png` and
//! `<prefix>[_<n>]_original.<ext>`, where `<n>` is the 1-based source
//! number and only appears when the batch holds more than one source.
//! The folder and archive layouts put each source of a multi-source batch
//! under `<prefix>_master_<n>/` as `<w>x<h>.png` and `original.<ext>`.
//!
//! Two variants of one source that share a resolution get their size key
//! appended (`<w>x<h>_<key>.png`) so neither file replaces the other.

use crate::error::Result;
use crate::pipeline::{ProcessedGroup, ProcessedVariant};
use crate::probe::{Dimensions, probe_or_unknown};
use log::{debug, info};
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

pub const DEFAULT_PREFIX: &str = "generated_image";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportLayout {
    /// Every file side by side in the output directory.
    #[default]
    Flat,
    /// One folder per source when the batch has several.
    PerSource,
    /// The folder layout packed into `<prefix>_all_images.zip`.
    Zip,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOptions {
    pub prefix: String,
    pub include_originals: bool,
    pub layout: ExportLayout,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            include_originals: true,
            layout: ExportLayout::Flat,
        }
    }
}

fn base_name(prefix: &str, index: Option<usize>) -> String {
    let prefix = match prefix.trim() {
        "" => "image",
        p => p,
    };
    match index {
        Some(i) => format!("{}_{}", prefix, i),
        None => prefix.to_string(),
    }
}

/// File name of a variant. `index` is the 1-based source number.
pub fn variant_file_name(prefix: &str, index: Option<usize>, width: u32, height: u32) -> String {
    format!("{}_{}x{}.png", base_name(prefix, index), width, height)
}

/// File name of an original source.
pub fn original_file_name(prefix: &str, index: Option<usize>, extension: &str) -> String {
    format!("{}_original.{}", base_name(prefix, index), extension)
}

/// File name of the bundle holding the whole batch.
pub fn archive_file_name(prefix: &str) -> String {
    format!("{}_all_images.zip", base_name(prefix, None))
}

/// Extension matching the encoded format, `png` when unknown.
pub fn extension_for(encoded: &[u8]) -> &'static str {
    image::guess_format(encoded)
        .ok()
        .and_then(|f| f.extensions_str().first().copied())
        .unwrap_or("png")
}

/// Claims `name` for a variant, falling back to a key-qualified name when
/// another variant of the same source already took it.
fn claim(used: &mut HashSet<String>, name: String, variant: &ProcessedVariant) -> String {
    if used.insert(name.clone()) {
        return name;
    }
    let stem = name.strip_suffix(".png").unwrap_or(&name);
    let qualified = format!("{}_{}.png", stem, variant.size_key);
    debug!("{} is taken, writing {} instead", name, qualified);
    used.insert(qualified.clone());
    qualified
}

/// Relative path and contents of every file the batch exports.
fn entries<'a>(groups: &'a [ProcessedGroup], options: &ExportOptions) -> Vec<(String, &'a [u8])> {
    let numbered = groups.len() > 1;
    let mut files = Vec::new();

    for (i, group) in groups.iter().enumerate() {
        let index = numbered.then_some(i + 1);
        let ext = extension_for(&group.source_pixels);
        let folder = match (options.layout, index) {
            (ExportLayout::Flat, _) | (_, None) => String::new(),
            (_, Some(n)) => format!("{}_master_{}/", base_name(&options.prefix, None), n),
        };
        let mut used = HashSet::new();

        if options.include_originals {
            let name = match options.layout {
                ExportLayout::Flat => original_file_name(&options.prefix, index, ext),
                _ => format!("original.{}", ext),
            };
            used.insert(name.clone());
            files.push((format!("{}{}", folder, name), &group.source_pixels[..]));
        }
        for v in &group.variants {
            let Some(pixels) = &v.pixels else { continue };
            let name = match options.layout {
                ExportLayout::Flat => variant_file_name(&options.prefix, index, v.width, v.height),
                _ => format!("{}x{}.png", v.width, v.height),
            };
            let name = claim(&mut used, name, v);
            files.push((format!("{}{}", folder, name), pixels.as_slice()));
        }
    }
    files
}

fn write_tree(files: &[(String, &[u8])], dir: &Path) -> Result<Vec<PathBuf>> {
    let mut written = Vec::with_capacity(files.len());
    for (name, bytes) in files {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        debug!("writing {}", path.display());
        fs::write(&path, bytes)?;
        written.push(path);
    }
    Ok(written)
}

fn write_archive(files: &[(String, &[u8])], path: &Path) -> Result<()> {
    let mut zip = ZipWriter::new(File::create(path)?);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for (name, bytes) in files {
        debug!("adding {} to {}", name, path.display());
        zip.start_file(name.as_str(), options)?;
        zip.write_all(bytes)?;
    }
    zip.finish()?;
    Ok(())
}

/// Writes every variant (and optionally every original) of `groups` into `dir`.
///
/// Returns the written paths in batch order; for [`ExportLayout::Zip`] that
/// is the single archive. Variants without pixels are skipped.
pub fn export_groups(
    groups: &[ProcessedGroup],
    dir: &Path,
    options: &ExportOptions,
) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;
    let files = entries(groups, options);

    let written = match options.layout {
        ExportLayout::Zip => {
            let path = dir.join(archive_file_name(&options.prefix));
            write_archive(&files, &path)?;
            info!("packed {} file(s) into {}", files.len(), path.display());
            vec![path]
        }
        ExportLayout::Flat | ExportLayout::PerSource => {
            let written = write_tree(&files, dir)?;
            info!("exported {} file(s) to {}", written.len(), dir.display());
            written
        }
    };
    Ok(written)
}

/// Original resolution of each source in a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionReport {
    pub entries: Vec<(String, Dimensions)>,
}

impl ResolutionReport {
    /// Probes every source; unreadable ones are reported as `0x0`.
    pub fn for_groups(groups: &[ProcessedGroup]) -> Self {
        Self {
            entries: groups
                .iter()
                .map(|g| (g.source_id.clone(), probe_or_unknown(&g.source_pixels)))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_processing::tests::png;
    use std::sync::Arc;

    fn group(id: &str, sizes: &[(u32, u32)]) -> ProcessedGroup {
        ProcessedGroup {
            source_id: id.to_string(),
            source_pixels: Arc::from(png(20, 10)),
            variants: sizes
                .iter()
                .map(|&(w, h)| ProcessedVariant {
                    size_key: format!("k{}", w),
                    size_label: format!("{}x{} px", w, h),
                    width: w,
                    height: h,
                    pixels: Some(vec![1, 2, 3]),
                })
                .collect(),
            failed: Vec::new(),
        }
    }

    fn names(paths: &[PathBuf], root: &Path) -> Vec<String> {
        paths
            .iter()
            .map(|p| p.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/"))
            .collect()
    }

    #[test]
    fn naming_scheme() {
        assert_eq!(variant_file_name("logo", None, 256, 256), "logo_256x256.png");
        assert_eq!(variant_file_name("logo", Some(2), 64, 32), "logo_2_64x32.png");
        assert_eq!(original_file_name("logo", Some(1), "png"), "logo_1_original.png");
        assert_eq!(original_file_name("  ", None, "jpg"), "image_original.jpg");
    }

    #[test]
    fn extension_follows_format() {
        assert_eq!(extension_for(&png(2, 2)), "png");
        assert_eq!(extension_for(b"????"), "png");
    }

    #[test]
    fn single_source_has_no_index() {
        let dir = tempfile::tempdir().unwrap();
        let written = export_groups(
            &[group("a", &[(256, 256), (128, 128)])],
            dir.path(),
            &ExportOptions {
                prefix: "logo".into(),
                ..ExportOptions::default()
            },
        )
        .unwrap();

        assert_eq!(
            names(&written, dir.path()),
            vec!["logo_original.png", "logo_256x256.png", "logo_128x128.png"]
        );
        assert_eq!(fs::read(&written[1]).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn several_sources_are_numbered_and_absent_variants_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut second = group("b", &[(32, 32)]);
        second.variants[0].pixels = None;

        let written = export_groups(
            &[group("a", &[(16, 16)]), second],
            dir.path(),
            &ExportOptions {
                include_originals: false,
                ..ExportOptions::default()
            },
        )
        .unwrap();

        assert_eq!(names(&written, dir.path()), vec!["generated_image_1_16x16.png"]);
    }

    #[test]
    fn per_source_layout_uses_folders() {
        let dir = tempfile::tempdir().unwrap();
        let written = export_groups(
            &[group("a", &[(16, 16)]), group("b", &[(16, 16)])],
            dir.path(),
            &ExportOptions {
                prefix: "icon".into(),
                layout: ExportLayout::PerSource,
                ..ExportOptions::default()
            },
        )
        .unwrap();

        assert_eq!(
            names(&written, dir.path()),
            vec![
                "icon_master_1/original.png",
                "icon_master_1/16x16.png",
                "icon_master_2/original.png",
                "icon_master_2/16x16.png",
            ]
        );
    }

    #[test]
    fn single_source_per_source_layout_has_no_folder() {
        let dir = tempfile::tempdir().unwrap();
        let written = export_groups(
            &[group("a", &[(16, 16)])],
            dir.path(),
            &ExportOptions {
                layout: ExportLayout::PerSource,
                ..ExportOptions::default()
            },
        )
        .unwrap();

        assert_eq!(names(&written, dir.path()), vec!["original.png", "16x16.png"]);
    }

    #[test]
    fn zip_layout_bundles_master_folders() {
        let dir = tempfile::tempdir().unwrap();
        let written = export_groups(
            &[group("a", &[(16, 16)]), group("b", &[(32, 32)])],
            dir.path(),
            &ExportOptions {
                prefix: "icon".into(),
                layout: ExportLayout::Zip,
                ..ExportOptions::default()
            },
        )
        .unwrap();

        assert_eq!(names(&written, dir.path()), vec!["icon_all_images.zip"]);

        let mut archive = zip::ZipArchive::new(File::open(&written[0]).unwrap()).unwrap();
        let mut entries: Vec<String> = archive.file_names().map(str::to_string).collect();
        entries.sort();
        assert_eq!(
            entries,
            vec![
                "icon_master_1/16x16.png",
                "icon_master_1/original.png",
                "icon_master_2/32x32.png",
                "icon_master_2/original.png",
            ]
        );

        let mut bytes = Vec::new();
        std::io::Read::read_to_end(&mut archive.by_name("icon_master_2/32x32.png").unwrap(), &mut bytes)
            .unwrap();
        assert_eq!(bytes, vec![1, 2, 3]);
        assert!(!dir.path().join("icon_master_1").exists());
    }

    #[test]
    fn zip_without_originals_holds_only_variants() {
        let dir = tempfile::tempdir().unwrap();
        let written = export_groups(
            &[group("a", &[(16, 16), (8, 8)])],
            dir.path(),
            &ExportOptions {
                include_originals: false,
                layout: ExportLayout::Zip,
                ..ExportOptions::default()
            },
        )
        .unwrap();

        assert_eq!(names(&written, dir.path()), vec!["generated_image_all_images.zip"]);
        let archive = zip::ZipArchive::new(File::open(&written[0]).unwrap()).unwrap();
        let mut entries: Vec<&str> = archive.file_names().collect();
        entries.sort();
        assert_eq!(entries, vec!["16x16.png", "8x8.png"]);
    }

    #[test]
    fn equal_resolutions_do_not_overwrite_each_other() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = group("a", &[(64, 64), (64, 64)]);
        source.variants[0].size_key = "icon_64".into();
        source.variants[0].pixels = Some(vec![1]);
        source.variants[1].size_key = "favicon_64".into();
        source.variants[1].pixels = Some(vec![2]);

        let written = export_groups(
            &[source],
            dir.path(),
            &ExportOptions {
                prefix: "logo".into(),
                include_originals: false,
                ..ExportOptions::default()
            },
        )
        .unwrap();

        assert_eq!(
            names(&written, dir.path()),
            vec!["logo_64x64.png", "logo_64x64_favicon_64.png"]
        );
        assert_eq!(fs::read(&written[0]).unwrap(), vec![1]);
        assert_eq!(fs::read(&written[1]).unwrap(), vec![2]);
    }

    #[test]
    fn naming_archive() {
        assert_eq!(archive_file_name("logo"), "logo_all_images.zip");
        assert_eq!(archive_file_name(""), "image_all_images.zip");
    }

    #[test]
    fn resolution_report_marks_unreadable_sources() {
        let mut broken = group("b", &[]);
        broken.source_pixels = Arc::from(b"junk".to_vec());

        let report = ResolutionReport::for_groups(&[group("a", &[]), broken]);

        assert_eq!(report.entries[0].1, Dimensions { width: 20, height: 10 });
        assert!(report.entries[1].1.is_unknown());
    }
}
