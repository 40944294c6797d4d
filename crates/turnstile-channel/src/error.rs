//! Error types for the channel module.

use std::time::Duration;

use thiserror::Error;

/// Errors reported by the messaging and membership collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// The call did not complete within its time bound.
    #[error("{op} timed out after {after:?}")]
    Timeout { op: &'static str, after: Duration },

    /// The platform asked us to slow down.
    #[error("rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    /// Network or platform failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The platform refused the request (blocked bot, unknown chat, ...).
    #[error("rejected: {0}")]
    Rejected(String),
}

impl ChannelError {
    /// Whether retrying later may succeed.
    ///
    /// Timeouts, rate limits and transport failures are transient;
    /// rejections are not.
    pub fn is_transient(&self) -> bool {
        !matches!(self, ChannelError::Rejected(_))
    }
}

/// Result type for channel operations.
pub type Result<T> = std::result::Result<T, ChannelError>;
