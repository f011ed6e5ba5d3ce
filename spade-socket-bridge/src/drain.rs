//! Drain Controller.
//!
//! Owns the stop flag that SIGINT/SIGTERM set from the signal handler and
//! that the main loop polls between lines: set a flag, let the loop notice,
//! never do I/O inside the handler itself.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;

/// SIGKILL cannot be caught, blocked, or ignored under POSIX — it tears the
/// process down before any handler runs, so there is nothing to register
/// for it.
pub struct DrainController {
    stop: Arc<AtomicBool>,
    wait_for_end: bool,
}

impl DrainController {
    /// Register a SIGINT/SIGTERM handler that only ever sets a flag.
    pub fn install(wait_for_end: bool) -> anyhow::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let handler_flag = Arc::clone(&stop);
        ctrlc::set_handler(move || {
            handler_flag.store(true, Ordering::SeqCst);
        })
        .context("failed to install SIGINT/SIGTERM handler")?;

        Ok(Self { stop, wait_for_end })
    }

    /// Whether the main loop should stop pulling new lines and drain.
    ///
    /// In wait-for-end mode the signal is recorded but ignored here: the
    /// loop keeps running until the input source reaches EOF on its own.
    pub fn should_drain(&self) -> bool {
        !self.wait_for_end && self.stop.load(Ordering::SeqCst)
    }
}
