/// Error taxonomy shared by both stores
///
/// Errors are flattened to strings when they are created so that they can
/// live inside `CollectionState` and be broadcast to every observer.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GalleryError {
    /// Network failure or timeout. Retryable.
    #[error("Network error: {0}")]
    Transport(String),

    /// The server answered with something that is not a list of images.
    #[error("Unexpected server response: {0}")]
    Validation(String),

    /// Annotation storage could not be read or written.
    #[error("Storage error: {0}")]
    Persistence(String),

    /// A delete for this image is already in progress.
    #[error("Image {id} is already being deleted")]
    Conflict { id: i64 },

    /// Invalid environment configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl GalleryError {
    /// Only transport failures are worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, GalleryError::Transport(_))
    }
}

/// Join an error and all of its sources into a single line
///
/// `"error sending request: connection refused"`
pub fn describe_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        // reqwest/hyper often repeat the inner message verbatim
        if !message.ends_with(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}

impl From<reqwest::Error> for GalleryError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            GalleryError::Validation(describe_chain(&err))
        } else {
            GalleryError::Transport(describe_chain(&err))
        }
    }
}

impl From<rusqlite::Error> for GalleryError {
    fn from(err: rusqlite::Error) -> Self {
        GalleryError::Persistence(describe_chain(&err))
    }
}

impl From<tokio::time::error::Elapsed> for GalleryError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        GalleryError::Transport("request timed out".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    #[derive(Debug)]
    struct Outer(Inner);

    #[derive(Debug)]
    struct Inner;

    impl fmt::Display for Outer {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "request failed")
        }
    }

    impl fmt::Display for Inner {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "connection refused")
        }
    }

    impl std::error::Error for Outer {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            Some(&self.0)
        }
    }

    impl std::error::Error for Inner {}

    #[test]
    fn test_only_transport_is_retryable() {
        assert!(GalleryError::Transport("reset".into()).is_retryable());
        assert!(!GalleryError::Validation("not an array".into()).is_retryable());
        assert!(!GalleryError::Persistence("disk full".into()).is_retryable());
        assert!(!GalleryError::Conflict { id: 3 }.is_retryable());
    }

    #[test]
    fn test_describe_chain_includes_sources() {
        let err = Outer(Inner);
        assert_eq!(describe_chain(&err), "request failed: connection refused");
    }

    #[test]
    fn test_display_messages() {
        assert_eq!(
            GalleryError::Conflict { id: 7 }.to_string(),
            "Image 7 is already being deleted"
        );
        assert_eq!(
            GalleryError::Transport("request timed out".into()).to_string(),
            "Network error: request timed out"
        );
    }
}
