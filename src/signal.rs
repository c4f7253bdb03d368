//! Ctrl+C handling.
//!
//! A single process-wide [`ShutdownHandler`] owns an `AtomicBool`. The walker,
//! the streaming reader and the orchestrator's workers all poll the same
//! flag, so one Ctrl+C stops new work everywhere while inserts already in
//! flight run to completion.
//!
//! ```rust,no_run
//! use imgdupe::duplicates::ScanConfig;
//! use imgdupe::signal::install_handler;
//!
//! let handler = install_handler();
//! let config = ScanConfig::default().with_shutdown_flag(handler.get_flag());
//! ```

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// Shared shutdown flag.
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandler {
    flag: Arc<AtomicBool>,
}

impl ShutdownHandler {
    /// Create a handler with no shutdown requested.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether Ctrl+C was pressed or [`request_shutdown`](Self::request_shutdown) called.
    #[must_use]
    pub fn is_shutdown_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Request shutdown programmatically.
    pub fn request_shutdown(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// The flag to hand to scanners and workers.
    #[must_use]
    pub fn get_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }

    /// Clear the flag.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

static GLOBAL_HANDLER: OnceLock<ShutdownHandler> = OnceLock::new();

/// Install the Ctrl+C hook once per process and return its handler.
///
/// Later calls (for example from tests invoking `run_app` repeatedly) get the
/// same handler back with the flag cleared. If the hook cannot be registered
/// the handler still works for programmatic shutdown.
pub fn install_handler() -> ShutdownHandler {
    let handler = GLOBAL_HANDLER.get_or_init(|| {
        let handler = ShutdownHandler::new();
        let flag = handler.get_flag();

        if let Err(e) = ctrlc::set_handler(move || {
            flag.store(true, Ordering::SeqCst);
            let _ = writeln!(std::io::stderr(), "\nInterrupted. Finishing in-flight files...");
            let _ = std::io::stderr().flush();
            log::info!("Shutdown signal received");
        }) {
            log::debug!("Ctrl+C hook unavailable ({}), using unhooked handler", e);
        }
        handler
    });

    handler.reset();
    handler.clone()
}
