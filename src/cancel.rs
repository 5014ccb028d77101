//! Cooperative cancellation shared between a caller and running pipelines.
//!
//! Cancellation is a request, not an interrupt: the pipeline checks the flag
//! at the start of every page and once more before writing, so an in-flight
//! provider call always runs to completion and no partial file is produced.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cloneable handle to one shared cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
