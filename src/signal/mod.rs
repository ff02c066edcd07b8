//! Cooperative cancellation
//!
//! A Ctrl-C must never leave a half-written cache entry looking complete.
//! The handler only flips a flag; the acquisition pipeline polls it at
//! checkpoints between build steps and unwinds through its normal cleanup
//! path when it is set.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Marker for an acquisition cut short by a cancellation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

/// Shared cancellation flag, cloneable across threads.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Return `Err(Cancelled)` once a cancellation has been requested.
    pub fn checkpoint(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Route Ctrl-C to the given token.
pub fn install_ctrlc(token: &CancelToken) -> Result<(), ctrlc::Error> {
    let token = token.clone();
    ctrlc::set_handler(move || {
        eprintln!("\n[signal] interrupt received, cleaning up");
        token.cancel();
    })
}
