//! Image acquisition error types.

use thiserror::Error;

/// Terminal failure of an image load.
///
/// `Clone` so a single in-flight fetch can hand the identical outcome to every
/// waiter. [`ImageError::Cancelled`] is a terminal state rather than a fault:
/// it never produces a user-facing message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[allow(missing_docs)]
pub enum ImageError {
    #[error("invalid image identifier: {identifier}")]
    InvalidIdentifier { identifier: String },

    #[error("unexpected HTTP status {code}")]
    HttpStatus { code: u16 },

    #[error("request timed out")]
    Timeout,

    #[error("transport failure: {message}")]
    Transport { message: String },

    #[error("failed to decode image: {message}")]
    Decode { message: String },

    #[error("no images could be loaded")]
    NoData,

    #[error("image load cancelled")]
    Cancelled,
}

impl ImageError {
    /// Creates invalid identifier error.
    #[must_use]
    pub fn invalid_identifier(identifier: impl Into<String>) -> Self {
        Self::InvalidIdentifier {
            identifier: identifier.into(),
        }
    }

    /// Creates transport error.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates decode error.
    #[must_use]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Returns whether the load was cancelled rather than failed.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns whether retrying later may succeed.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        match self {
            Self::Timeout | Self::Transport { .. } => true,
            Self::HttpStatus { code } => *code == 408 || *code == 429 || *code >= 500,
            _ => false,
        }
    }

    /// Human-readable message for display, or `None` when nothing should be
    /// shown (cancellation).
    #[must_use]
    pub fn user_message(&self) -> Option<String> {
        let message = match self {
            Self::Cancelled => return None,
            Self::InvalidIdentifier { .. } => "The image URL is invalid.".to_string(),
            Self::HttpStatus { code: 401 | 403 } => {
                "You are not authorized to view this image.".to_string()
            }
            Self::HttpStatus { code: 408 } | Self::Timeout => "The request timed out.".to_string(),
            Self::HttpStatus { code: 429 } => {
                "Too many requests. Wait a bit and try again.".to_string()
            }
            Self::HttpStatus { code } => {
                format!("Something went wrong. Unexpected status code: {code}.")
            }
            Self::Transport { message } => format!("Request failed: {message}"),
            Self::Decode { .. } => "The image could not be displayed.".to_string(),
            Self::NoData => "No images could be loaded.".to_string(),
        };
        Some(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_cancelled_has_no_user_message() {
        assert!(ImageError::Cancelled.is_cancelled());
        assert_eq!(ImageError::Cancelled.user_message(), None);
    }

    #[test]
    fn test_rate_limit_has_distinct_message() {
        let rate_limited = ImageError::HttpStatus { code: 429 }.user_message();
        let server_error = ImageError::HttpStatus { code: 500 }.user_message();
        assert_ne!(rate_limited, server_error);
        assert!(rate_limited.unwrap().contains("Too many requests"));
        assert!(server_error.unwrap().contains("500"));
    }

    #[test_case(ImageError::Timeout, true ; "timeout")]
    #[test_case(ImageError::transport("reset"), true ; "transport")]
    #[test_case(ImageError::HttpStatus { code: 429 }, true ; "rate_limited")]
    #[test_case(ImageError::HttpStatus { code: 503 }, true ; "server_error")]
    #[test_case(ImageError::HttpStatus { code: 404 }, false ; "not_found")]
    #[test_case(ImageError::decode("bad"), false ; "decode")]
    #[test_case(ImageError::Cancelled, false ; "cancelled")]
    fn test_is_recoverable(error: ImageError, expected: bool) {
        assert_eq!(error.is_recoverable(), expected);
    }

    #[test]
    fn test_status_code_is_retained() {
        let error = ImageError::HttpStatus { code: 418 };
        assert_eq!(error.to_string(), "unexpected HTTP status 418");
    }
}
