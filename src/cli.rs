//! Command-line interface definitions for imgdupe.
//!
//! Global options (verbosity, config file, index location) apply to every
//! subcommand.
//!
//! # Example
//!
//! ```bash
//! # Build the index from the source-of-truth tree and write gen_database_*.json
//! imgdupe index ~/Pictures/library
//!
//! # Rebuild the index, then classify a phone dump against it
//! imgdupe classify --source ~/Pictures/library ~/phone-dump
//!
//! # Classify against an index that is already up to date, using the fast policy
//! imgdupe classify --skip-index --fast ~/phone-dump
//!
//! # Copy images into ~/Pictures/sorted/<year>/<month>/
//! imgdupe reorganize ~/phone-dump ~/Pictures/sorted
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Find duplicate images between a source-of-truth tree and a target tree.
///
/// imgdupe indexes every JPEG, PNG and BMP under a source tree in SQLite,
/// then sorts a target tree's images into duplicates, ambiguous matches and
/// new files worth migrating.
#[derive(Debug, Parser)]
#[command(name = "imgdupe")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Disable progress bars
    #[arg(long, global = true)]
    pub no_progress: bool,

    /// Print fatal errors as JSON on stderr
    #[arg(long, global = true)]
    pub json_errors: bool,

    /// Configuration file (TOML)
    ///
    /// Defaults to config.toml in the platform config directory.
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Index database file
    #[arg(long, value_name = "PATH", global = true)]
    pub database: Option<PathBuf>,

    /// Table inside the index database
    #[arg(long, value_name = "NAME", global = true)]
    pub table: Option<String>,

    /// Worker threads for reading and hashing
    #[arg(long, value_name = "N", global = true, value_parser = clap::value_parser!(u16).range(1..))]
    pub io_threads: Option<u16>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Add every image under a source tree to the index and report statistics
    Index(IndexArgs),
    /// Classify a target tree's images against the index
    Classify(ClassifyArgs),
    /// Copy images into <DEST>/<year>/<month>/ by capture date
    Reorganize(ReorganizeArgs),
}

/// Traversal options shared by every subcommand.
#[derive(Debug, Args, Default)]
pub struct WalkArgs {
    /// Follow symbolic links
    #[arg(long)]
    pub follow_symlinks: bool,

    /// Skip hidden files and directories (starting with .)
    #[arg(long)]
    pub skip_hidden: bool,

    /// Glob patterns to ignore (can be specified multiple times)
    #[arg(short, long = "ignore", value_name = "PATTERN")]
    pub ignore_patterns: Vec<String>,
}

/// Report options for `index` and `classify`.
#[derive(Debug, Args, Default)]
pub struct ReportArgs {
    /// Directory the timestamped JSON report is written to
    #[arg(long, value_name = "DIR")]
    pub report_dir: Option<PathBuf>,

    /// Do not write a JSON report
    #[arg(long, conflicts_with = "report_dir")]
    pub no_report: bool,

    /// List every matched pair in the summary
    #[arg(long)]
    pub detailed: bool,
}

/// Arguments for `index`.
#[derive(Debug, Args)]
pub struct IndexArgs {
    /// Source-of-truth directory
    #[arg(value_name = "SOURCE")]
    pub source: PathBuf,

    /// Match on filename, size and CRC32 instead of the content hash
    #[arg(long)]
    pub fast: bool,

    /// Do not compute perceptual hashes
    #[arg(long)]
    pub no_perceptual: bool,

    #[command(flatten)]
    pub walk: WalkArgs,

    #[command(flatten)]
    pub report: ReportArgs,
}

/// Arguments for `classify`.
#[derive(Debug, Args)]
pub struct ClassifyArgs {
    /// Directory to classify
    #[arg(value_name = "TARGET")]
    pub target: PathBuf,

    /// Source-of-truth directory to (re)index before classifying
    #[arg(long, value_name = "DIR", required_unless_present = "skip_index")]
    pub source: Option<PathBuf>,

    /// Use the existing index as-is
    #[arg(long)]
    pub skip_index: bool,

    /// Match on filename, size and CRC32 instead of the content hash
    ///
    /// A renamed copy of an indexed file is reported as new with this policy.
    #[arg(long)]
    pub fast: bool,

    /// Do not compute perceptual hashes while indexing
    #[arg(long)]
    pub no_perceptual: bool,

    #[command(flatten)]
    pub walk: WalkArgs,

    #[command(flatten)]
    pub report: ReportArgs,
}

/// Arguments for `reorganize`.
#[derive(Debug, Args)]
pub struct ReorganizeArgs {
    /// Directory to copy images from
    #[arg(value_name = "SOURCE")]
    pub source: PathBuf,

    /// Destination root
    #[arg(value_name = "DEST")]
    pub dest: PathBuf,

    #[command(flatten)]
    pub walk: WalkArgs,
}
