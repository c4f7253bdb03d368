//! Scan results.
//!
//! Workers never touch a [`ClassificationReport`] directly. Each returns a
//! [`FileOutcome`]; a single [`ReportBuilder`] folds them in once all work
//! has finished, then hands back the finished report.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::classifier::Verdict;

/// Which pass produced a report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanMode {
    /// Building the source index; `migrate` lists files written to the index.
    Ingest,
    /// Classifying a target tree; the index is not modified.
    #[default]
    Classify,
}

/// A candidate together with the indexed file it matched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchedPair {
    /// Path of the indexed record
    pub original: PathBuf,
    /// Path of the candidate
    pub duplicate: PathBuf,
}

/// Result of processing one discovered file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    /// Reached a verdict.
    Classified {
        /// Candidate path
        path: PathBuf,
        /// Decision
        verdict: Verdict,
        /// Indexed path that matched, for duplicate/ambiguous
        original: Option<PathBuf>,
    },
    /// Not a supported image.
    Skipped(PathBuf),
    /// Could not be read, looked up or stored.
    Failed(PathBuf),
    /// Abandoned because shutdown was requested.
    Interrupted,
}

/// Aggregated results of a scan. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    /// Which pass produced the report
    pub mode: ScanMode,
    /// Files already present in the index
    pub duplicates: Vec<PathBuf>,
    /// Files whose identity could not be confirmed
    pub ambiguous: Vec<PathBuf>,
    /// New files (ingest: the files inserted)
    pub migrate: Vec<PathBuf>,
    /// Duplicates with the indexed file they matched
    pub duplicate_matches: Vec<MatchedPair>,
    /// Ambiguous files with the indexed file they matched
    pub ambiguous_matches: Vec<MatchedPair>,
    /// Files that could not be processed
    pub failed: Vec<PathBuf>,
    /// Images that reached a verdict
    pub total_processed: usize,
    /// Non-image files ignored
    pub skipped: usize,
    /// Wall-clock time of the pass
    #[serde(with = "duration_secs")]
    pub elapsed: Duration,
}

impl ClassificationReport {
    /// Number of duplicates.
    #[must_use]
    pub fn duplicate_count(&self) -> usize {
        self.duplicates.len()
    }

    /// Number of ambiguous files.
    #[must_use]
    pub fn ambiguous_count(&self) -> usize {
        self.ambiguous.len()
    }

    /// Number of files to migrate (ingest: inserted).
    #[must_use]
    pub fn migrate_count(&self) -> usize {
        self.migrate.len()
    }

    /// Number of files that failed.
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    /// Elapsed time in seconds.
    #[must_use]
    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }

    /// Verdict recorded for `path`, if any.
    #[must_use]
    pub fn verdict_of(&self, path: &std::path::Path) -> Option<Verdict> {
        if self.duplicates.iter().any(|p| p == path) {
            Some(Verdict::Duplicate)
        } else if self.ambiguous.iter().any(|p| p == path) {
            Some(Verdict::Ambiguous)
        } else if self.migrate.iter().any(|p| p == path) {
            Some(Verdict::Migrate)
        } else {
            None
        }
    }
}

/// Single owner of the counters while a scan is being folded.
#[derive(Debug, Default)]
pub struct ReportBuilder {
    report: ClassificationReport,
    interrupted: bool,
}

impl ReportBuilder {
    /// Start a report for `mode`.
    #[must_use]
    pub fn new(mode: ScanMode) -> Self {
        Self {
            report: ClassificationReport {
                mode,
                ..Default::default()
            },
            interrupted: false,
        }
    }

    /// Fold one outcome in.
    pub fn record(&mut self, outcome: FileOutcome) {
        let report = &mut self.report;
        match outcome {
            FileOutcome::Classified {
                path,
                verdict,
                original,
            } => {
                report.total_processed += 1;
                let (bucket, matches) = match verdict {
                    Verdict::Duplicate => (&mut report.duplicates, Some(&mut report.duplicate_matches)),
                    Verdict::Ambiguous => (&mut report.ambiguous, Some(&mut report.ambiguous_matches)),
                    Verdict::Migrate => (&mut report.migrate, None),
                };
                if let (Some(matches), Some(original)) = (matches, original) {
                    matches.push(MatchedPair {
                        original,
                        duplicate: path.clone(),
                    });
                }
                bucket.push(path);
            }
            FileOutcome::Skipped(_) => report.skipped += 1,
            FileOutcome::Failed(path) => report.failed.push(path),
            FileOutcome::Interrupted => self.interrupted = true,
        }
    }

    /// Whether any outcome reported an interruption.
    #[must_use]
    pub fn was_interrupted(&self) -> bool {
        self.interrupted
    }

    /// Sort every list and stamp the elapsed time.
    #[must_use]
    pub fn finish(mut self, elapsed: Duration) -> ClassificationReport {
        let report = &mut self.report;
        report.duplicates.sort();
        report.ambiguous.sort();
        report.migrate.sort();
        report.failed.sort();
        report.duplicate_matches.sort_by(|a, b| a.duplicate.cmp(&b.duplicate));
        report.ambiguous_matches.sort_by(|a, b| a.duplicate.cmp(&b.duplicate));
        report.elapsed = elapsed;
        self.report
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Ok(Duration::try_from_secs_f64(secs).unwrap_or_default())
    }
}
