//! Error taxonomy for the content pipeline.
//!
//! Only truly invalid input produces a hard failure. Everything routed
//! through an external service degrades gracefully: validation reports
//! carry lower scores and `success: false` flags instead of errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContentError {
    /// Bad caller-supplied parameters (chunk sizes, thresholds).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Input text is empty after whitespace cleaning. Fatal for the
    /// single call; batch operations skip the item and continue.
    #[error("input is empty after cleaning")]
    EmptyInput,

    /// Both embedding providers failed. Carries both underlying messages
    /// so the caller can see why each leg was rejected.
    #[error("all embedding providers failed (primary: {primary}; secondary: {secondary})")]
    EmbeddingUnavailable { primary: String, secondary: String },

    /// Rate limit that survived the retry. Invisible to callers unless
    /// the single retry also failed.
    #[error("embedding provider rate limit exceeded after retry")]
    RateLimited,

    /// The vector index call itself errored. An empty index is a normal
    /// "no results" state and never produces this.
    #[error("vector index unavailable: {0}")]
    IndexUnavailable(String),
}
