//! Cancellation token for page renders
//!
//! A rasterizer checks the token it was handed between units of work and stops early
//! once the render it belongs to has been superseded or the viewer has closed.

use std::fmt;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Cancellation token for cooperative render cancellation
///
/// Clones share the same underlying state, so the controller keeps one copy and the
/// rasterizer gets another.
///
/// # Example
///
/// ```
/// use pdf_annotator_scheduler::CancellationToken;
///
/// let token = CancellationToken::new();
/// let render_token = token.clone();
///
/// token.cancel();
/// assert!(render_token.is_cancelled());
/// ```
#[derive(Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a token in the non-cancelled state
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Cancel this token and every clone of it. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
