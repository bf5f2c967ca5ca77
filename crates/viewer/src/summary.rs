//! Summaries of highlighted text
//!
//! The viewer does not summarize anything itself. The composition root installs a
//! [`Summarizer`], typically backed by a language-model service, and the viewer feeds
//! it the selected text stored on a highlight.

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SummaryError {
    #[error("annotation not found: {0}")]
    NotFound(String),

    #[error("annotation {0} carries no selected text")]
    NoContent(String),

    #[error("no summarizer configured")]
    Unavailable,

    #[error("summarizer failed: {0}")]
    Failed(String),
}

/// Produces a concise summary of a passage of text
pub trait Summarizer {
    fn summarize(&mut self, text: &str) -> Result<String, SummaryError>;
}

impl<F> Summarizer for F
where
    F: FnMut(&str) -> Result<String, SummaryError>,
{
    fn summarize(&mut self, text: &str) -> Result<String, SummaryError> {
        self(text)
    }
}

/// Placeholder until a real summarizer is installed
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSummarizer;

impl Summarizer for NoSummarizer {
    fn summarize(&mut self, _text: &str) -> Result<String, SummaryError> {
        Err(SummaryError::Unavailable)
    }
}
