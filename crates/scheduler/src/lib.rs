//! PDF Annotator Scheduler Library
//!
//! Cooperative cancellation and per-page generation tracking for page renders.
//!
//! Every render request for a page gets a new generation and a fresh cancellation
//! token; starting a newer render for the same page cancels the older one, and a
//! completion is only accepted while its generation is still the page's latest.
//!
//! # Example
//!
//! ```
//! use pdf_annotator_scheduler::PageGenerations;
//!
//! let generations = PageGenerations::new();
//!
//! let first = generations.begin(0);
//! let second = generations.begin(0);
//!
//! // The superseded render observes cancellation and its result is ignored
//! assert!(first.token.is_cancelled());
//! assert!(!generations.finish(&first));
//! assert!(generations.finish(&second));
//! ```

mod cancel;
mod generation;

pub use cancel::CancellationToken;
pub use generation::{Generation, PageGenerations, RenderJob};
