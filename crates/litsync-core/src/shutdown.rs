//! Graceful shutdown support via atomic flag

use std::sync::atomic::{AtomicBool, Ordering};

/// Global shutdown flag, set by the SIGTERM/SIGINT handler
pub fn shutdown_flag() -> &'static AtomicBool {
    static FLAG: AtomicBool = AtomicBool::new(false);
    &FLAG
}

/// Check if shutdown was requested
pub fn is_shutdown_requested() -> bool {
    shutdown_flag().load(Ordering::Relaxed)
}

/// Request shutdown (for signal handlers and tests)
pub fn request_shutdown() {
    shutdown_flag().store(true, Ordering::Relaxed);
}

/// Register SIGINT/SIGTERM handlers.
///
/// First signal sets the shutdown flag so the running stage stops at its
/// next safe point (partial downloads and the last checkpoint stay valid).
/// A second signal exits immediately with status 130.
pub fn install_signal_handlers() -> std::io::Result<()> {
    for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
        // SAFETY: AtomicBool::swap and process::exit are async-signal-safe
        unsafe {
            signal_hook::low_level::register(signal, || {
                if shutdown_flag().swap(true, Ordering::Relaxed) {
                    std::process::exit(130);
                }
            })?;
        }
    }
    Ok(())
}
