//! Copy images into `<dest>/<year>/<month>/` by capture date.
//!
//! Only the type-check stage of [`IdentityExtractor`] is used here; the
//! duplicate index is never touched. Capture dates come from a
//! [`CaptureDateSource`], by default [`ExifDateSource`].
//!
//! Copies keep the source's permission bits and its access and modification
//! times. Files already present at the destination are left alone.
//!
//! ```no_run
//! use imgdupe::reorganize::Reorganizer;
//! use std::path::Path;
//!
//! let report = Reorganizer::new()
//!     .reorganize(Path::new("/camera/dump"), Path::new("/photos/by-date"))
//!     .unwrap();
//! println!("copied {} images", report.copied.len());
//! ```

use std::fs;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{Datelike, NaiveDateTime};
use exif::{In, Reader, Tag, Value};
use filetime::FileTime;
use serde::Serialize;

use crate::progress::ProgressCallback;
use crate::scanner::{ExtractError, IdentityExtractor, ScanError, Walker, WalkerConfig};

const EXIF_DATE_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

/// Supplies the capture date of an image.
pub trait CaptureDateSource: Send + Sync {
    /// `None` when the file carries no usable date.
    fn capture_date(&self, path: &Path) -> Option<NaiveDateTime>;
}

/// Reads EXIF `DateTimeOriginal`, falling back to `DateTime`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExifDateSource;

impl CaptureDateSource for ExifDateSource {
    fn capture_date(&self, path: &Path) -> Option<NaiveDateTime> {
        let file = fs::File::open(path).ok()?;
        let mut reader = BufReader::new(file);
        let exif = match Reader::new().read_from_container(&mut reader) {
            Ok(exif) => exif,
            Err(e) => {
                log::trace!("No EXIF data in {}: {}", path.display(), e);
                return None;
            }
        };

        [Tag::DateTimeOriginal, Tag::DateTime]
            .into_iter()
            .filter_map(|tag| exif.get_field(tag, In::PRIMARY))
            .find_map(|field| ascii_value(&field.value).and_then(|s| parse_exif_datetime(&s)))
    }
}

fn ascii_value(value: &Value) -> Option<String> {
    match value {
        Value::Ascii(parts) => parts
            .first()
            .map(|raw| String::from_utf8_lossy(raw).trim_end_matches('\0').trim().to_string()),
        _ => None,
    }
}

/// Parse the `YYYY:MM:DD HH:MM:SS` form EXIF uses.
pub fn parse_exif_datetime(text: &str) -> Option<NaiveDateTime> {
    match NaiveDateTime::parse_from_str(text.trim(), EXIF_DATE_FORMAT) {
        Ok(dt) => Some(dt),
        Err(_) => {
            log::debug!("Unparseable EXIF date '{}'", text);
            None
        }
    }
}

/// Destination directory for an image taken at `date`.
#[must_use]
pub fn dated_dir(dest: &Path, date: NaiveDateTime) -> PathBuf {
    dest.join(format!("{:04}", date.year()))
        .join(format!("{:02}", date.month()))
}

/// Reorganize errors.
///
/// The first five abort the run. [`ReorganizeError::TypeCheck`] and
/// [`ReorganizeError::CopyFailed`] only fail one file, which is then listed in
/// [`ReorganizeReport::failed`].
#[derive(thiserror::Error, Debug)]
pub enum ReorganizeError {
    /// Shutdown was requested between files.
    #[error("Reorganize interrupted by user")]
    Interrupted,

    /// The source tree does not exist.
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    /// The source is not a directory.
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// The destination root could not be created.
    #[error("Cannot create destination {path}: {source}")]
    Destination {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The source root could not be read.
    #[error("Scan error: {0}")]
    Scan(#[from] ScanError),

    /// The file header could not be read.
    #[error(transparent)]
    TypeCheck(#[from] ExtractError),

    /// Creating the dated directory or copying into it failed.
    #[error("Cannot copy {from} to {to}: {source}")]
    CopyFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// What happened to each file.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReorganizeReport {
    /// `(source, destination)` of every copy made
    pub copied: Vec<(PathBuf, PathBuf)>,
    /// Files whose content is not a supported image
    pub not_images: Vec<PathBuf>,
    /// Images without a capture date
    pub undated: Vec<PathBuf>,
    /// Destination already existed
    pub existing: Vec<PathBuf>,
    /// Unreadable entries and failed copies
    pub failed: Vec<PathBuf>,
    #[serde(skip)]
    pub elapsed: Duration,
}

enum CopyOutcome {
    Copied(PathBuf),
    NotImage,
    Undated,
    Existing,
}

/// Copies images from a source tree into a date-bucketed destination.
pub struct Reorganizer<D: CaptureDateSource = ExifDateSource> {
    extractor: IdentityExtractor,
    dates: D,
    walker_config: WalkerConfig,
    shutdown_flag: Option<Arc<AtomicBool>>,
    progress_callback: Option<Arc<dyn ProgressCallback>>,
}

impl Default for Reorganizer<ExifDateSource> {
    fn default() -> Self {
        Self::new()
    }
}

impl Reorganizer<ExifDateSource> {
    /// A reorganizer reading EXIF dates.
    #[must_use]
    pub fn new() -> Self {
        Self::with_date_source(ExifDateSource)
    }
}

impl<D: CaptureDateSource> Reorganizer<D> {
    /// A reorganizer using a custom date source.
    pub fn with_date_source(dates: D) -> Self {
        Self {
            extractor: IdentityExtractor::new().with_perceptual(false),
            dates,
            walker_config: WalkerConfig::default(),
            shutdown_flag: None,
            progress_callback: None,
        }
    }

    #[must_use]
    pub fn with_walker_config(mut self, config: WalkerConfig) -> Self {
        self.walker_config = config;
        self
    }

    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.extractor = self.extractor.with_shutdown_flag(Arc::clone(&flag));
        self.shutdown_flag = Some(flag);
        self
    }

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

    /// Copy every dated image under `source` into `dest`.
    ///
    /// Per-file failures are logged and listed in the report.
    ///
    /// # Errors
    ///
    /// Returns [`ReorganizeError`] if `source` is not a readable directory,
    /// `dest` cannot be created, or the run is interrupted.
    pub fn reorganize(&self, source: &Path, dest: &Path) -> Result<ReorganizeReport, ReorganizeError> {
        let start = Instant::now();

        let mut walker = Walker::new(source, self.walker_config.clone());
        if let Some(ref flag) = self.shutdown_flag {
            walker = walker.with_shutdown_flag(Arc::clone(flag));
        }
        walker.check_root().map_err(|e| match e {
            ScanError::NotFound(p) => ReorganizeError::PathNotFound(p),
            ScanError::NotADirectory(p) => ReorganizeError::NotADirectory(p),
            other => ReorganizeError::Scan(other),
        })?;
        fs::create_dir_all(dest).map_err(|source| ReorganizeError::Destination {
            path: dest.to_path_buf(),
            source,
        })?;

        let mut report = ReorganizeReport::default();
        let mut files = Vec::new();
        for entry in walker.walk() {
            match entry {
                Ok(file) => files.push(file.path),
                Err(e) => {
                    log::warn!("{}", e);
                    report.failed.push(e.path().to_path_buf());
                }
            }
        }
        log::info!("Reorganizing {} files from {}", files.len(), source.display());

        if let Some(ref callback) = self.progress_callback {
            callback.on_phase_start("reorganize", files.len());
        }

        for (i, path) in files.into_iter().enumerate() {
            if self.is_shutdown_requested() {
                return Err(ReorganizeError::Interrupted);
            }
            if let Some(ref callback) = self.progress_callback {
                callback.on_progress(i + 1, path.to_string_lossy().as_ref());
            }

            match self.copy_one(&path, dest) {
                Ok(CopyOutcome::Copied(target)) => {
                    log::debug!("Copied {} -> {}", path.display(), target.display());
                    report.copied.push((path, target));
                }
                Ok(CopyOutcome::NotImage) => {
                    log::warn!("Encountered file which is not an image: {}", path.display());
                    report.not_images.push(path);
                }
                Ok(CopyOutcome::Undated) => {
                    log::warn!("No capture date for {}", path.display());
                    report.undated.push(path);
                }
                Ok(CopyOutcome::Existing) => {
                    log::info!("Already present in destination: {}", path.display());
                    report.existing.push(path);
                }
                Err(e) => {
                    log::warn!("Failed to copy {}: {}", path.display(), e);
                    report.failed.push(path);
                }
            }
        }

        if let Some(ref callback) = self.progress_callback {
            callback.on_phase_end("reorganize");
        }

        report.elapsed = start.elapsed();
        log::info!(
            "Reorganize complete: {} copied, {} undated, {} not images, {} existing, {} failed",
            report.copied.len(),
            report.undated.len(),
            report.not_images.len(),
            report.existing.len(),
            report.failed.len()
        );
        Ok(report)
    }

    fn copy_one(&self, path: &Path, dest: &Path) -> Result<CopyOutcome, ReorganizeError> {
        let fp = self.extractor.check_type(path)?;
        if !fp.is_image() {
            return Ok(CopyOutcome::NotImage);
        }
        let Some(date) = self.dates.capture_date(path) else {
            return Ok(CopyOutcome::Undated);
        };
        let Some(name) = path.file_name() else {
            return Ok(CopyOutcome::NotImage);
        };

        let dir = dated_dir(dest, date);
        let target = dir.join(name);
        if target.exists() {
            return Ok(CopyOutcome::Existing);
        }

        fs::create_dir_all(&dir)
            .and_then(|()| copy_preserving_times(path, &target))
            .map_err(|source| ReorganizeError::CopyFailed {
                from: path.to_path_buf(),
                to: target.clone(),
                source,
            })?;
        Ok(CopyOutcome::Copied(target))
    }
}

/// Copy contents and permissions, then restore access and modification times.
///
/// # Errors
///
/// Returns any I/O error from reading metadata, copying or setting times.
pub fn copy_preserving_times(from: &Path, to: &Path) -> std::io::Result<()> {
    let metadata = fs::metadata(from)?;
    fs::copy(from, to)?;
    fs::set_permissions(to, metadata.permissions())?;
    filetime::set_file_times(
        to,
        FileTime::from_last_access_time(&metadata),
        FileTime::from_last_modification_time(&metadata),
    )
}
