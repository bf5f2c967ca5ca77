//! Per-page render generations
//!
//! Tracks the latest render started for each page. Beginning a render for a page
//! cancels the page's previous render, and only the latest render may finish.

use crate::cancel::CancellationToken;
use log::trace;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Monotonic render counter, shared across all pages
pub type Generation = u64;

/// Handle for one page render
#[derive(Debug, Clone)]
pub struct RenderJob {
    pub page_index: u32,
    pub generation: Generation,

    /// Cancelled when a newer render for the page begins or everything is cancelled
    pub token: CancellationToken,
}

#[derive(Default)]
struct Inner {
    next: Generation,
    active: HashMap<u32, (Generation, CancellationToken)>,
}

/// Registry of the in-flight render for every page; clones share state
#[derive(Clone, Default)]
pub struct PageGenerations {
    inner: Arc<Mutex<Inner>>,
}

impl PageGenerations {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a render for `page_index`, cancelling the one it supersedes
    pub fn begin(&self, page_index: u32) -> RenderJob {
        let mut inner = self.lock();
        inner.next += 1;
        let generation = inner.next;
        let token = CancellationToken::new();

        if let Some((previous, stale)) = inner.active.insert(page_index, (generation, token.clone())) {
            trace!("page {page_index}: render {generation} supersedes {previous}");
            stale.cancel();
        }

        RenderJob { page_index, generation, token }
    }

    /// Whether `job` is still the latest render for its page and not cancelled
    pub fn is_current(&self, job: &RenderJob) -> bool {
        !job.token.is_cancelled()
            && self
                .lock()
                .active
                .get(&job.page_index)
                .is_some_and(|(generation, _)| *generation == job.generation)
    }

    /// Retire `job`; returns `true` only when it was the latest render for its page
    pub fn finish(&self, job: &RenderJob) -> bool {
        let mut inner = self.lock();
        let current = !job.token.is_cancelled()
            && inner
                .active
                .get(&job.page_index)
                .is_some_and(|(generation, _)| *generation == job.generation);

        if current {
            inner.active.remove(&job.page_index);
        }
        current
    }

    /// Cancel the in-flight render of one page, if any
    pub fn cancel_page(&self, page_index: u32) -> bool {
        match self.lock().active.remove(&page_index) {
            Some((_, token)) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every in-flight render; returns how many were cancelled
    pub fn cancel_all(&self) -> usize {
        let mut inner = self.lock();
        let count = inner.active.len();
        for (_, (_, token)) in inner.active.drain() {
            token.cancel();
        }
        count
    }

    /// Number of pages with a render in flight
    pub fn in_flight(&self) -> usize {
        self.lock().active.len()
    }
}
