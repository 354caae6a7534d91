//! Batch orchestration over the selected sources and sizes.
//!
//! The orchestrator owns the processed groups. Sources are processed one
//! after another so results arrive in selection order, and the group list
//! is swapped in only once a pass has finished, so readers always see a
//! complete batch.

use crate::catalog::{AspectRatioSpec, SizeSpec};
use crate::error::{AppError, Result};
use crate::pipeline::{ProcessedGroup, SourceImage, process_one};
use log::{error, info, warn};
use std::collections::BTreeSet;

/// Outcome counts of the last derive pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Sources that produced a group.
    pub processed: usize,
    /// Ids of sources whose crop failed.
    pub failed_sources: Vec<String>,
    /// Variants that failed to resize, across all groups.
    pub failed_variants: usize,
}

/// Drives [`process_one`] across a selection and keeps the derived groups.
#[derive(Debug, Default)]
pub struct BatchOrchestrator {
    selected_sources: Vec<SourceImage>,
    selected_size_keys: BTreeSet<String>,
    aspect_ratio: Option<&'static AspectRatioSpec>,
    groups: Vec<ProcessedGroup>,
    report: BatchReport,
}

impl BatchOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn groups(&self) -> &[ProcessedGroup] {
        &self.groups
    }

    pub fn selected_sources(&self) -> &[SourceImage] {
        &self.selected_sources
    }

    /// Size keys in effect, after any fallback applied by [`Self::derive_all`].
    pub fn selected_size_keys(&self) -> &BTreeSet<String> {
        &self.selected_size_keys
    }

    pub fn report(&self) -> &BatchReport {
        &self.report
    }

    /// Processes every source under the aspect ratio and replaces the groups.
    ///
    /// Unknown size keys are ignored. When none of the keys resolve, every
    /// candidate size of the aspect ratio is used instead.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::BatchEmpty`] when every source failed. The groups
    /// are left empty in that case.
    pub async fn derive_all<S: AsRef<str>>(
        &mut self,
        sources: Vec<SourceImage>,
        aspect_ratio: &'static AspectRatioSpec,
        size_keys: &[S],
    ) -> Result<&[ProcessedGroup]> {
        let mut sizes = aspect_ratio.resolve_sizes(size_keys);
        if sizes.is_empty() && !aspect_ratio.candidate_sizes.is_empty() {
            info!(
                "no known sizes selected for {}, using all {} candidates",
                aspect_ratio.label,
                aspect_ratio.candidate_sizes.len()
            );
            sizes = aspect_ratio.candidate_sizes.to_vec();
        }

        self.selected_sources = dedup_by_id(sources);
        self.selected_size_keys = sizes.iter().map(|s| s.key.to_string()).collect();
        self.aspect_ratio = Some(aspect_ratio);

        self.run(aspect_ratio, &sizes).await?;
        Ok(&self.groups)
    }

    /// Re-derives the current selection with a new set of sizes.
    ///
    /// This is a full replay rather than a patch, so no variant of a
    /// previous size set survives. If none of `new_size_keys` resolve, the
    /// groups are kept but every variant is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::BatchEmpty`] when every source failed.
    pub async fn rederive_on_size_change<S: AsRef<str>>(
        &mut self,
        new_size_keys: &[S],
    ) -> Result<&[ProcessedGroup]> {
        let Some(aspect_ratio) = self.aspect_ratio else {
            self.selected_size_keys = new_size_keys
                .iter()
                .map(|k| k.as_ref().to_string())
                .collect();
            return Ok(&self.groups);
        };

        let sizes = aspect_ratio.resolve_sizes(new_size_keys);
        self.selected_size_keys = sizes.iter().map(|s| s.key.to_string()).collect();

        if self.selected_sources.is_empty() {
            return Ok(&self.groups);
        }

        if sizes.is_empty() && !aspect_ratio.candidate_sizes.is_empty() {
            info!("size selection cleared, dropping all variants");
            self.groups = self
                .groups
                .iter()
                .map(|g| ProcessedGroup {
                    variants: Vec::new(),
                    failed: Vec::new(),
                    ..g.clone()
                })
                .collect();
            self.report.failed_variants = 0;
            return Ok(&self.groups);
        }

        self.run(aspect_ratio, &sizes).await?;
        Ok(&self.groups)
    }

    /// Forgets the selection and every derived group.
    pub fn reset(&mut self) {
        self.selected_sources.clear();
        self.selected_size_keys.clear();
        self.aspect_ratio = None;
        self.groups.clear();
        self.report = BatchReport::default();
    }

    async fn run(&mut self, aspect_ratio: &AspectRatioSpec, sizes: &[SizeSpec]) -> Result<()> {
        let mut groups = Vec::with_capacity(self.selected_sources.len());
        let mut report = BatchReport::default();

        for source in &self.selected_sources {
            match process_one(source, aspect_ratio, sizes).await {
                Ok(group) => {
                    report.failed_variants += group.failed.len();
                    groups.push(group);
                }
                Err(e) => {
                    warn!("skipping {}: {}", source.id, e);
                    report.failed_sources.push(source.id.clone());
                }
            }
        }
        report.processed = groups.len();

        self.groups = groups;
        self.report = report;

        if self.groups.is_empty() && !self.selected_sources.is_empty() {
            error!("all {} selected image(s) failed", self.selected_sources.len());
            return Err(AppError::BatchEmpty {
                attempted: self.selected_sources.len(),
            });
        }

        info!(
            "derived {} group(s) at {} size(s), {} variant(s) failed",
            self.report.processed,
            sizes.len(),
            self.report.failed_variants
        );
        Ok(())
    }
}

/// Keeps the first occurrence of each id.
fn dedup_by_id(sources: Vec<SourceImage>) -> Vec<SourceImage> {
    let mut seen = BTreeSet::new();
    sources
        .into_iter()
        .filter(|s| {
            let first = seen.insert(s.id.clone());
            if !first {
                warn!("source id {} given more than once, keeping the first", s.id);
            }
            first
        })
        .collect()
}
