//! Report output.
//!
//! - [`json`]: timestamped `gen_database_*.json` / `find_dupes_*.json` files
//! - [`text`]: the summary printed at the end of a run

pub mod json;
pub mod text;

pub use json::{write_report, DupesReport, IndexReport, JsonOutputError, ReportKind};
pub use text::TextSummary;
