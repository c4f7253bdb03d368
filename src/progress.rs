//! Progress reporting using indicatif.
//!
//! [`Progress`] implements [`ProgressCallback`] with a spinner while the
//! tree is walked and a bar while files are ingested, classified or copied.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use bytesize::ByteSize;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

/// Progress callback for scan phases.
///
/// Implement this trait to receive progress updates from the orchestrator
/// and the reorganizer. Callbacks arrive from worker threads.
pub trait ProgressCallback: Send + Sync {
    /// Called when a phase starts.
    ///
    /// # Arguments
    ///
    /// * `phase` - Name of the phase (`walking`, `ingest`, `classify`, `reorganize`)
    /// * `total` - Total number of items to process (0 if unknown)
    fn on_phase_start(&self, phase: &str, total: usize);

    /// Called for each item processed.
    ///
    /// # Arguments
    ///
    /// * `current` - Current item number (1-based)
    /// * `path` - Path being processed
    fn on_progress(&self, current: usize, path: &str);

    /// Called when an item has been processed, providing its size.
    fn on_item_completed(&self, _bytes: u64) {}

    /// Called when a phase completes.
    fn on_phase_end(&self, phase: &str);

    /// Called to update the progress message.
    fn on_message(&self, _message: &str) {}
}

/// Progress reporter using indicatif.
pub struct Progress {
    multi: MultiProgress,
    walking: Mutex<Option<ProgressBar>>,
    work: Mutex<Option<ProgressBar>>,
    bytes: AtomicU64,
    quiet: bool,
}

impl Progress {
    /// Create a new progress reporter. Nothing is drawn when `quiet` is set.
    ///
    /// # Examples
    ///
    /// ```
    /// use imgdupe::progress::Progress;
    ///
    /// let progress = Progress::new(false);
    /// ```
    #[must_use]
    pub fn new(quiet: bool) -> Self {
        Self {
            multi: MultiProgress::new(),
            walking: Mutex::new(None),
            work: Mutex::new(None),
            bytes: AtomicU64::new(0),
            quiet,
        }
    }

    /// Bytes reported through [`ProgressCallback::on_item_completed`].
    #[must_use]
    pub fn bytes_processed(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    fn walking_style() -> ProgressStyle {
        ProgressStyle::with_template("{spinner:.green} {msg} [{elapsed_precise}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
    }

    fn work_style() -> ProgressStyle {
        ProgressStyle::with_template(
            "[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg} (ETA: {eta})",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█>-")
    }

    fn set_slot(slot: &Mutex<Option<ProgressBar>>, pb: Option<ProgressBar>) -> Option<ProgressBar> {
        match slot.lock() {
            Ok(mut guard) => std::mem::replace(&mut *guard, pb),
            Err(_) => None,
        }
    }

    fn with_active(&self, f: impl FnOnce(&ProgressBar)) {
        if let Ok(guard) = self.work.lock() {
            if let Some(ref pb) = *guard {
                f(pb);
                return;
            }
        }
        if let Ok(guard) = self.walking.lock() {
            if let Some(ref pb) = *guard {
                f(pb);
            }
        }
    }
}

impl ProgressCallback for Progress {
    fn on_phase_start(&self, phase: &str, total: usize) {
        if self.quiet {
            return;
        }

        if phase == "walking" {
            let pb = self.multi.add(ProgressBar::new_spinner());
            pb.set_style(Self::walking_style());
            pb.set_message("Walking directory");
            pb.enable_steady_tick(Duration::from_millis(100));
            Self::set_slot(&self.walking, Some(pb));
        } else {
            self.bytes.store(0, Ordering::Relaxed);
            let pb = self.multi.add(ProgressBar::new(total as u64));
            pb.set_style(Self::work_style());
            pb.set_message(phase.to_string());
            Self::set_slot(&self.work, Some(pb));
        }
    }

    fn on_progress(&self, current: usize, path: &str) {
        if self.quiet {
            return;
        }
        let message = truncate_path(path, 30);
        self.with_active(|pb| {
            // Workers finish out of order
            if current as u64 > pb.position() {
                pb.set_position(current as u64);
            }
            pb.set_message(message);
        });
    }

    fn on_item_completed(&self, bytes: u64) {
        self.bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    fn on_phase_end(&self, phase: &str) {
        if self.quiet {
            return;
        }

        if phase == "walking" {
            if let Some(pb) = Self::set_slot(&self.walking, None) {
                pb.finish_with_message("Walking complete");
            }
        } else if let Some(pb) = Self::set_slot(&self.work, None) {
            pb.finish_with_message(format!(
                "{phase} complete ({})",
                ByteSize::b(self.bytes_processed())
            ));
        }
    }

    fn on_message(&self, message: &str) {
        if self.quiet {
            return;
        }
        let message = message.to_string();
        self.with_active(|pb| pb.set_message(message));
    }
}

/// Truncate a path for display in the progress bar.
fn truncate_path(path: &str, max_len: usize) -> String {
    if path.chars().count() <= max_len {
        return path.to_string();
    }

    let file_name = std::path::Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let name_len = file_name.chars().count();
    if name_len >= max_len {
        let tail: String = file_name.chars().skip(name_len + 3 - max_len).collect();
        return format!("...{tail}");
    }

    format!(".../{file_name}")
}
