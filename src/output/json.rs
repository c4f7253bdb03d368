//! JSON reports written at the end of a run.
//!
//! Two documents exist, one per pass, each written to
//! `<report_dir>/<prefix>_YYYY-MM-DD.json`:
//!
//! ```json
//! // gen_database_2024-05-01.json
//! {
//!   "image_types": 2,
//!   "total_images": 1200,
//!   "average_size": 512000.0,
//!   "total_size": 614400000,
//!   "duplicates": ["/photos/copy/a.png"],
//!   "ambiguous": [],
//!   "process_time": 12.5
//! }
//!
//! // find_dupes_2024-05-01.json
//! {
//!   "duplicates": ["/import/b.png"],
//!   "ambiguous": [],
//!   "migrate": ["/import/new.jpg"],
//!   "process_time": 3.1
//! }
//! ```
//!
//! Both carry a few more fields (matched pairs, failures, exit code).

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::Serialize;

use crate::duplicates::{ClassificationReport, MatchedPair, Policy};
use crate::error::ExitCode;
use crate::index::IndexStats;

/// Which report a file holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    /// Index statistics after building the source index.
    GenDatabase,
    /// Classification of a target tree.
    FindDupes,
}

impl ReportKind {
    #[must_use]
    pub fn prefix(self) -> &'static str {
        match self {
            Self::GenDatabase => "gen_database",
            Self::FindDupes => "find_dupes",
        }
    }

    /// `gen_database_2024-05-01.json` style file name.
    #[must_use]
    pub fn file_name(self, date: NaiveDate) -> String {
        format!("{}_{}.json", self.prefix(), date.format("%Y-%m-%d"))
    }
}

/// A duplicate or ambiguous file with the indexed file it matched.
#[derive(Debug, Clone, Serialize)]
pub struct JsonMatch {
    pub original: String,
    pub duplicate: String,
}

impl From<&MatchedPair> for JsonMatch {
    fn from(pair: &MatchedPair) -> Self {
        Self {
            original: path_string(&pair.original),
            duplicate: path_string(&pair.duplicate),
        }
    }
}

/// Index statistics report.
#[derive(Debug, Clone, Serialize)]
pub struct IndexReport {
    /// Distinct media types in the index
    pub image_types: u64,
    pub total_images: u64,
    /// Mean file size in bytes
    pub average_size: f64,
    pub total_size: u64,
    /// Files seen during ingest that were already indexed
    pub duplicates: Vec<String>,
    /// Files seen during ingest whose checksum matched an indexed file
    pub ambiguous: Vec<String>,
    pub duplicate_matches: Vec<JsonMatch>,
    pub ambiguous_matches: Vec<JsonMatch>,
    /// Rows added by this run
    pub inserted: usize,
    pub failed: Vec<String>,
    /// Seconds spent ingesting
    pub process_time: f64,
    pub exit_code: i32,
    pub exit_code_name: String,
}

impl IndexReport {
    #[must_use]
    pub fn new(report: &ClassificationReport, stats: &IndexStats, exit_code: ExitCode) -> Self {
        Self {
            image_types: stats.image_types,
            total_images: stats.total_images,
            average_size: stats.average_size,
            total_size: stats.total_size,
            duplicates: path_strings(&report.duplicates),
            ambiguous: path_strings(&report.ambiguous),
            duplicate_matches: report.duplicate_matches.iter().map(JsonMatch::from).collect(),
            ambiguous_matches: report.ambiguous_matches.iter().map(JsonMatch::from).collect(),
            inserted: report.migrate_count(),
            failed: path_strings(&report.failed),
            process_time: report.elapsed_secs(),
            exit_code: exit_code.as_i32(),
            exit_code_name: exit_code.code_prefix().to_string(),
        }
    }
}

/// Target classification report.
#[derive(Debug, Clone, Serialize)]
pub struct DupesReport {
    pub policy: Policy,
    pub duplicates: Vec<String>,
    pub ambiguous: Vec<String>,
    pub migrate: Vec<String>,
    pub duplicate_matches: Vec<JsonMatch>,
    pub ambiguous_matches: Vec<JsonMatch>,
    pub failed: Vec<String>,
    pub total_processed: usize,
    /// Non-image files ignored
    pub skipped: usize,
    pub process_time: f64,
    pub exit_code: i32,
    pub exit_code_name: String,
}

impl DupesReport {
    #[must_use]
    pub fn new(report: &ClassificationReport, policy: Policy, exit_code: ExitCode) -> Self {
        Self {
            policy,
            duplicates: path_strings(&report.duplicates),
            ambiguous: path_strings(&report.ambiguous),
            migrate: path_strings(&report.migrate),
            duplicate_matches: report.duplicate_matches.iter().map(JsonMatch::from).collect(),
            ambiguous_matches: report.ambiguous_matches.iter().map(JsonMatch::from).collect(),
            failed: path_strings(&report.failed),
            total_processed: report.total_processed,
            skipped: report.skipped,
            process_time: report.elapsed_secs(),
            exit_code: exit_code.as_i32(),
            exit_code_name: exit_code.code_prefix().to_string(),
        }
    }
}

/// Serialize `value` as pretty JSON into `writer`.
///
/// # Errors
///
/// Returns an error if serialization or writing fails.
pub fn write_json<W: Write, T: Serialize>(writer: &mut W, value: &T) -> Result<(), JsonOutputError> {
    serde_json::to_writer_pretty(&mut *writer, value)?;
    writer.write_all(b"\n")?;
    Ok(())
}

/// Write `value` to `<dir>/<kind prefix>_<date>.json`, creating `dir` if
/// needed. An existing report for the same day is replaced.
///
/// # Errors
///
/// Returns an error if the directory or file cannot be written.
pub fn write_report<T: Serialize>(
    dir: &Path,
    kind: ReportKind,
    date: NaiveDate,
    value: &T,
) -> Result<PathBuf, JsonOutputError> {
    fs::create_dir_all(dir)?;
    let path = dir.join(kind.file_name(date));
    let mut file = fs::File::create(&path)?;
    write_json(&mut file, value)?;
    file.flush()?;
    log::info!("Report written to {}", path.display());
    Ok(path)
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn path_strings(paths: &[PathBuf]) -> Vec<String> {
    paths.iter().map(|p| path_string(p)).collect()
}

/// Errors that can occur while writing a report.
#[derive(thiserror::Error, Debug)]
pub enum JsonOutputError {
    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error while writing report: {0}")]
    Io(#[from] std::io::Error),
}
