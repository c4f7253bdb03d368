//! Process exit codes and the `--json-errors` payload.

use serde::Serialize;

use crate::duplicates::FinderError;
use crate::reorganize::ReorganizeError;

/// Exit codes for imgdupe.
///
/// - 0: completed and something was found (duplicates, ambiguous files, new rows)
/// - 1: unexpected failure
/// - 2: completed but nothing was found
/// - 3: completed but some files failed and were skipped
/// - 130: interrupted by Ctrl+C
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitCode {
    /// Completed with results.
    Success = 0,
    /// Unexpected error.
    GeneralError = 1,
    /// Completed with an empty result.
    NothingFound = 2,
    /// Completed, with per-file failures.
    PartialSuccess = 3,
    /// Interrupted by the user.
    Interrupted = 130,
}

impl ExitCode {
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Machine-readable code used in structured error output.
    #[must_use]
    pub fn code_prefix(self) -> &'static str {
        match self {
            Self::Success => "ID000",
            Self::GeneralError => "ID001",
            Self::NothingFound => "ID002",
            Self::PartialSuccess => "ID003",
            Self::Interrupted => "ID130",
        }
    }

    /// Exit code for an error that escaped `run_app`.
    #[must_use]
    pub fn for_error(err: &anyhow::Error) -> Self {
        let interrupted = err.chain().any(|cause| {
            matches!(cause.downcast_ref::<FinderError>(), Some(FinderError::Interrupted))
                || matches!(
                    cause.downcast_ref::<ReorganizeError>(),
                    Some(ReorganizeError::Interrupted)
                )
        });
        if interrupted {
            Self::Interrupted
        } else {
            Self::GeneralError
        }
    }
}

/// Error payload printed to stderr with `--json-errors`.
#[derive(Debug, Serialize)]
pub struct StructuredError {
    /// Code such as `ID001`
    pub code: String,
    pub exit_code: i32,
    /// Full error chain, outermost first
    pub message: String,
    pub interrupted: bool,
}

impl StructuredError {
    #[must_use]
    pub fn new(err: &anyhow::Error, exit_code: ExitCode) -> Self {
        Self {
            code: exit_code.code_prefix().to_string(),
            exit_code: exit_code.as_i32(),
            message: format!("{err:#}"),
            interrupted: exit_code == ExitCode::Interrupted,
        }
    }
}
