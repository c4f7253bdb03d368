//! Scan orchestration.
//!
//! # Overview
//!
//! [`ScanOrchestrator`] walks a tree once, then runs one unit of work per
//! file on a bounded rayon pool:
//!
//! ```text
//! type check ─► classify ─► (ingest only) insert under the write lock
//! ```
//!
//! Units never share mutable state. Each returns a [`FileOutcome`] and the
//! outcomes are folded by one [`ReportBuilder`] after the pool drains. A unit
//! that fails is logged and counted; it never aborts its siblings.
//!
//! # Ingest
//!
//! A candidate first classified as new is fully fingerprinted outside the
//! lock. The write lock is then taken, the candidate is classified again
//! against the locked connection, and only a second `Migrate` is inserted.
//! Two byte-identical files racing each other therefore yield one row.
//!
//! # Example
//!
//! ```no_run
//! use imgdupe::duplicates::{Policy, ScanConfig, ScanOrchestrator};
//! use imgdupe::index::DuplicateIndex;
//! use std::path::Path;
//!
//! let index = DuplicateIndex::open(Path::new("image_cache.sqlite"), "image_cache").unwrap();
//! let orchestrator = ScanOrchestrator::new(ScanConfig::default().with_policy(Policy::Fast));
//!
//! orchestrator.ingest(Path::new("/photos/library"), &index).unwrap();
//! let report = orchestrator.scan(Path::new("/photos/phone"), &index).unwrap();
//! println!("{} duplicates, {} to migrate", report.duplicate_count(), report.migrate_count());
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;

use super::classifier::{Classification, Classifier, ClassifyError, Policy, Verdict};
use super::report::{ClassificationReport, FileOutcome, ReportBuilder, ScanMode};
use crate::index::{DuplicateIndex, IndexError, NewRecord};
use crate::progress::ProgressCallback;
use crate::scanner::{
    ExtractError, FileEntry, Fingerprint, HashError, IdentityExtractor, ScanError, Walker,
    WalkerConfig,
};

/// Errors that abort a whole scan.
#[derive(thiserror::Error, Debug)]
pub enum FinderError {
    /// The scan was interrupted by user (Ctrl+C or shutdown signal).
    #[error("Scan interrupted by user")]
    Interrupted,

    /// The provided path does not exist.
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    /// The provided path is not a directory.
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// The root could not be read.
    #[error(transparent)]
    Scan(#[from] ScanError),

    /// The index failed outside any single unit of work.
    #[error(transparent)]
    Index(#[from] IndexError),
}

impl FinderError {
    /// Map a failed root check onto the fatal input errors.
    pub(crate) fn from_root(error: ScanError) -> Self {
        match error {
            ScanError::NotFound(p) => Self::PathNotFound(p),
            ScanError::NotADirectory(p) => Self::NotADirectory(p),
            other => Self::Scan(other),
        }
    }
}

/// Configuration for a scan.
#[derive(Clone)]
pub struct ScanConfig {
    /// Worker threads for file I/O and hashing (minimum 1).
    pub io_threads: usize,
    /// Classification policy.
    pub policy: Policy,
    /// Compute perceptual hashes for indexed images.
    pub compute_perceptual: bool,
    /// Directory traversal options.
    pub walker_config: WalkerConfig,
    /// Optional shutdown flag for graceful termination.
    pub shutdown_flag: Option<Arc<AtomicBool>>,
    /// Optional progress callback.
    pub progress_callback: Option<Arc<dyn ProgressCallback>>,
}

impl std::fmt::Debug for ScanConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanConfig")
            .field("io_threads", &self.io_threads)
            .field("policy", &self.policy)
            .field("compute_perceptual", &self.compute_perceptual)
            .field("walker_config", &self.walker_config)
            .field("shutdown_flag", &self.shutdown_flag)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            io_threads: 4,
            policy: Policy::default(),
            compute_perceptual: true,
            walker_config: WalkerConfig::default(),
            shutdown_flag: None,
            progress_callback: None,
        }
    }
}

impl ScanConfig {
    /// Set the number of worker threads.
    #[must_use]
    pub fn with_io_threads(mut self, threads: usize) -> Self {
        self.io_threads = threads.max(1);
        self
    }

    /// Set the classification policy.
    #[must_use]
    pub fn with_policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }

    /// Enable or disable perceptual hashing.
    #[must_use]
    pub fn with_perceptual(mut self, enabled: bool) -> Self {
        self.compute_perceptual = enabled;
        self
    }

    /// Set the walker configuration.
    #[must_use]
    pub fn with_walker_config(mut self, config: WalkerConfig) -> Self {
        self.walker_config = config;
        self
    }

    /// Set the shutdown flag for graceful termination.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    /// Set the progress callback.
    #[must_use]
    pub fn with_progress_callback(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }
}

/// Drives extraction and classification over a directory tree.
#[derive(Debug)]
pub struct ScanOrchestrator {
    config: ScanConfig,
    extractor: IdentityExtractor,
}

impl ScanOrchestrator {
    /// Create an orchestrator.
    #[must_use]
    pub fn new(config: ScanConfig) -> Self {
        let mut extractor = IdentityExtractor::new().with_perceptual(config.compute_perceptual);
        if let Some(ref flag) = config.shutdown_flag {
            extractor = extractor.with_shutdown_flag(Arc::clone(flag));
        }
        Self { config, extractor }
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Add every new image under `root` to `index`.
    ///
    /// Files already represented are recorded as internal duplicates (or
    /// ambiguous, under the fast policy) and not inserted. In the returned
    /// report `migrate` lists the files that were inserted.
    ///
    /// # Errors
    ///
    /// Returns [`FinderError`] if `root` is missing or not a directory, or
    /// the scan is interrupted.
    pub fn ingest(
        &self,
        root: &Path,
        index: &DuplicateIndex,
    ) -> Result<ClassificationReport, FinderError> {
        self.run(root, index, ScanMode::Ingest)
    }

    /// Classify every image under `root` against `index` without modifying it.
    ///
    /// # Errors
    ///
    /// Returns [`FinderError`] if `root` is missing or not a directory, or
    /// the scan is interrupted.
    pub fn scan(
        &self,
        root: &Path,
        index: &DuplicateIndex,
    ) -> Result<ClassificationReport, FinderError> {
        self.run(root, index, ScanMode::Classify)
    }

    fn classifier(&self, mode: ScanMode) -> Classifier {
        Classifier::new(self.config.policy).with_checksum_fallback(mode == ScanMode::Ingest)
    }

    fn run(
        &self,
        root: &Path,
        index: &DuplicateIndex,
        mode: ScanMode,
    ) -> Result<ClassificationReport, FinderError> {
        let start_time = Instant::now();

        let mut walker = Walker::new(root, self.config.walker_config.clone());
        if let Some(ref flag) = self.config.shutdown_flag {
            walker = walker.with_shutdown_flag(Arc::clone(flag));
        }
        walker.check_root().map_err(FinderError::from_root)?;

        if self.config.is_shutdown_requested() {
            return Err(FinderError::Interrupted);
        }

        log::info!(
            "Starting {:?} of {} ({} policy)",
            mode,
            root.display(),
            self.config.policy
        );

        let mut builder = ReportBuilder::new(mode);

        // Walk
        if let Some(ref callback) = self.config.progress_callback {
            callback.on_phase_start("walking", 0);
            callback.on_message(&format!("Walking {}", root.display()));
        }
        let mut files: Vec<FileEntry> = Vec::new();
        for result in walker.walk() {
            match result {
                Ok(file) => files.push(file),
                Err(e) => builder.record(FileOutcome::Failed(e.path().to_path_buf())),
            }
        }
        if let Some(ref callback) = self.config.progress_callback {
            callback.on_phase_end("walking");
        }
        if self.config.is_shutdown_requested() {
            return Err(FinderError::Interrupted);
        }

        log::info!("Found {} files under {}", files.len(), root.display());

        // Extract and classify
        let phase = match mode {
            ScanMode::Ingest => "ingest",
            ScanMode::Classify => "classify",
        };
        if let Some(ref callback) = self.config.progress_callback {
            callback.on_phase_start(phase, files.len());
        }

        let classifier = self.classifier(mode);
        let counter = AtomicUsize::new(0);
        let work = || -> Vec<FileOutcome> {
            files
                .into_par_iter()
                .map(|file| self.process_file(file, index, mode, classifier, &counter))
                .collect()
        };

        let outcomes = match rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.io_threads.max(1))
            .build()
        {
            Ok(pool) => pool.install(work),
            Err(e) => {
                log::warn!(
                    "Failed to create thread pool ({}), using global pool with {} threads",
                    e,
                    rayon::current_num_threads()
                );
                work()
            }
        };

        for outcome in outcomes {
            builder.record(outcome);
        }

        if let Some(ref callback) = self.config.progress_callback {
            callback.on_phase_end(phase);
        }

        if builder.was_interrupted() || self.config.is_shutdown_requested() {
            return Err(FinderError::Interrupted);
        }

        let report = builder.finish(start_time.elapsed());
        log::info!(
            "{:?} complete: {} processed, {} duplicates, {} ambiguous, {} migrate, {} skipped, {} failed in {:.2}s",
            mode,
            report.total_processed,
            report.duplicate_count(),
            report.ambiguous_count(),
            report.migrate_count(),
            report.skipped,
            report.failed_count(),
            report.elapsed_secs()
        );
        Ok(report)
    }

    /// One unit of work. Never panics, never returns an error.
    fn process_file(
        &self,
        file: FileEntry,
        index: &DuplicateIndex,
        mode: ScanMode,
        classifier: Classifier,
        counter: &AtomicUsize,
    ) -> FileOutcome {
        if self.config.is_shutdown_requested() {
            return FileOutcome::Interrupted;
        }

        let current = counter.fetch_add(1, Ordering::Relaxed) + 1;
        if let Some(ref callback) = self.config.progress_callback {
            callback.on_progress(current, file.path.to_string_lossy().as_ref());
        }

        let mut fp = match self.extractor.check_type(&file.path) {
            Ok(fp) => fp,
            Err(e) => {
                log::warn!("Skipping unreadable file {}: {}", file.path.display(), e);
                return FileOutcome::Failed(file.path);
            }
        };
        if !fp.is_image() {
            log::debug!("Skipping non-image {} ({})", file.path.display(), fp.media_type());
            return FileOutcome::Skipped(file.path);
        }

        let result = match mode {
            ScanMode::Classify => classifier.classify(&mut fp, index, &self.extractor),
            ScanMode::Ingest => self.ingest_file(&mut fp, index, classifier),
        };

        match result {
            Ok(classification) => {
                if let Some(ref callback) = self.config.progress_callback {
                    callback.on_item_completed(fp.size());
                }
                log_classification(mode, &fp, &classification);
                FileOutcome::Classified {
                    path: file.path,
                    verdict: classification.verdict,
                    original: classification
                        .matched
                        .map(|record| PathBuf::from(record.full_path)),
                }
            }
            Err(ClassifyError::Extract(ExtractError::Read(HashError::Interrupted(_)))) => {
                FileOutcome::Interrupted
            }
            Err(e) => {
                log::warn!("Skipping {}: {}", file.path.display(), e);
                FileOutcome::Failed(file.path)
            }
        }
    }

    fn ingest_file(
        &self,
        fp: &mut Fingerprint,
        index: &DuplicateIndex,
        classifier: Classifier,
    ) -> Result<Classification, ClassifyError> {
        let first = classifier.classify(fp, index, &self.extractor)?;
        if first.verdict != Verdict::Migrate {
            return Ok(first);
        }

        // All I/O and decoding happens before the lock is taken
        self.extractor.ensure_content_hash(fp)?;
        self.extractor.ensure_perceptual(fp);
        let record = NewRecord::from_fingerprint(fp)?;
        fp.release_content();

        index.with_write_lock(|txn| {
            let second = classifier.classify(fp, txn, &self.extractor)?;
            if second.verdict == Verdict::Migrate {
                txn.insert(&record)?;
            }
            Ok(second)
        })
    }
}

fn log_classification(mode: ScanMode, fp: &Fingerprint, classification: &Classification) {
    let original = classification
        .matched
        .as_ref()
        .map_or("", |record| record.full_path.as_str());

    match (classification.verdict, mode) {
        (Verdict::Duplicate, _) => log::info!(
            "Duplicate image verified: {} already indexed at {}",
            fp.path().display(),
            original
        ),
        (Verdict::Ambiguous, _) => log::warn!(
            "Ambiguous: {} matches indexed file {} on cheap signals only",
            fp.path().display(),
            original
        ),
        (Verdict::Migrate, ScanMode::Ingest) => log::debug!("Indexed {}", fp.path().display()),
        (Verdict::Migrate, ScanMode::Classify) => {
            log::debug!("New image: {}", fp.path().display());
        }
    }
}
