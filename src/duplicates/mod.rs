//! Duplicate detection.
//!
//! This module provides:
//! - The classification decision ([`classifier`])
//! - Concurrent tree scanning against the index ([`orchestrator`])
//! - Scan results ([`report`])
//!
//! [`build_index`] and [`classify`] are the two entry points the CLI uses;
//! [`check_root`] validates their directories up front.

pub mod classifier;
pub mod orchestrator;
pub mod report;

use std::path::Path;

pub use classifier::{Classification, Classifier, ClassifyError, Policy, Verdict};
pub use orchestrator::{FinderError, ScanConfig, ScanOrchestrator};
pub use report::{ClassificationReport, FileOutcome, MatchedPair, ReportBuilder, ScanMode};

use crate::index::{DuplicateIndex, IndexStats};
use crate::scanner::{Walker, WalkerConfig};

/// Verify that `root` exists and is a directory, before any index is opened.
///
/// # Errors
///
/// Returns [`FinderError::PathNotFound`] or [`FinderError::NotADirectory`].
pub fn check_root(root: &Path) -> Result<(), FinderError> {
    Walker::new(root, WalkerConfig::default())
        .check_root()
        .map_err(FinderError::from_root)
}

/// Ingest `source` into `index` and return the ingest report with the
/// resulting index statistics.
///
/// # Errors
///
/// Returns [`FinderError`] if the source is missing, the scan is
/// interrupted, or the statistics query fails.
pub fn build_index(
    source: &Path,
    index: &DuplicateIndex,
    config: ScanConfig,
) -> Result<(ClassificationReport, IndexStats), FinderError> {
    let report = ScanOrchestrator::new(config).ingest(source, index)?;
    let stats = index.stats()?;
    Ok((report, stats))
}

/// Classify every image under `target` against `index`.
///
/// # Errors
///
/// Returns [`FinderError`] if the target is missing or the scan is interrupted.
pub fn classify(
    target: &Path,
    index: &DuplicateIndex,
    config: ScanConfig,
) -> Result<ClassificationReport, FinderError> {
    ScanOrchestrator::new(config).scan(target, index)
}
