use thiserror::Error;

/// Failure classes for the streaming layer.
///
/// Variants carry owned messages so a channel can keep its first failure
/// around (the sticky error) and still hand callers an owned copy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    /// Hash mismatch, out-of-sequence block index, or a terminator block
    /// carrying a non-zero hash.
    #[error("integrity error: {0}")]
    Integrity(String),

    /// Malformed wire data: negative or truncated length fields, short
    /// blocks, bad padding.
    #[error("format error: {0}")]
    Format(String),

    /// Failure reported by the underlying channel.
    #[error("I/O error: {0}")]
    Io(String),

    /// Channel used before initialization or after an earlier failure
    /// without an intervening reset.
    #[error("state error: {0}")]
    State(String),
}

pub type Result<T> = std::result::Result<T, StreamError>;

impl From<std::io::Error> for StreamError {
    fn from(err: std::io::Error) -> Self {
        StreamError::Io(err.to_string())
    }
}

impl StreamError {
    /// Error reported by follow-up calls on a channel whose first failure
    /// was `self`.
    pub(crate) fn as_sticky(&self) -> StreamError {
        StreamError::State(format!("channel unusable after earlier failure: {self}"))
    }
}
