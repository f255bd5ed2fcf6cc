//! SIGINT handling (spec §5 "Cancellation", §6 "Signals").
//!
//! A single process-wide flag is set by the handler and polled by the
//! main loop once per iteration; `ctrlc` takes care of the
//! platform-specific, signal-safe plumbing so this crate stays
//! `forbid(unsafe_code)`.

use std::sync::atomic::{AtomicBool, Ordering};

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Has an interrupt been observed since the process started?
#[must_use]
pub fn interrupted() -> bool {
    INTERRUPTED.load(Ordering::Relaxed)
}

/// Install the process-wide Ctrl-C handler.
///
/// # Errors
///
/// Returns an error if a handler has already been installed, or if the
/// platform refuses the registration.
pub fn install() -> anyhow::Result<()> {
    ctrlc::set_handler(|| INTERRUPTED.store(true, Ordering::Relaxed))?;
    Ok(())
}
