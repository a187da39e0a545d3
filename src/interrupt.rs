//! Operator interrupt tracking.
//!
//! A Ctrl-C while the suite runs must end the run with a failing status rather
//! than being recorded as one more failed test. The handler only flips a flag;
//! the supervisor and dispatcher poll it.

use std::sync::atomic::{AtomicBool, Ordering};

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

#[cfg(unix)]
extern "C" fn on_sigint(_signal: libc::c_int) {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// Installs the SIGINT handler. No-op on non-unix hosts.
pub fn install_handler() {
    #[cfg(unix)]
    unsafe {
        let handler = on_sigint as extern "C" fn(libc::c_int);
        libc::signal(libc::SIGINT, handler as libc::sighandler_t);
    }
}

pub fn is_interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

/// Marks the run as interrupted, as if the operator had pressed Ctrl-C.
pub fn request() {
    INTERRUPTED.store(true, Ordering::SeqCst);
}
