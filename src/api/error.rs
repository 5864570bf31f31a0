use thiserror::Error;

/// Transport-level failure taxonomy.
///
/// The split drives retry policy: `Network` and `ServerError` are
/// retryable with backoff, everything else needs user action or a code
/// change. Malformed bodies are not an error here — decoding happens
/// downstream and reports `Decoded::Malformed` as a value.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Unauthorized - token may be expired")]
    Unauthorized,

    #[error("Request rejected ({status}): {body}")]
    ClientError { status: u16, body: String },

    #[error("Server error ({status}): {body}")]
    ServerError { status: u16, body: String },

    #[error("Unexpected response ({status}): {body}")]
    Unexpected { status: u16, body: String },
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl TransportError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            format!(
                "{}... (truncated, {} total bytes)",
                &body[..MAX_ERROR_BODY_LENGTH],
                body.len()
            )
        }
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let truncated = Self::truncate_body(body);
        match status.as_u16() {
            401 => TransportError::Unauthorized,
            s @ 400..=499 => TransportError::ClientError {
                status: s,
                body: truncated,
            },
            s @ 500..=599 => TransportError::ServerError {
                status: s,
                body: truncated,
            },
            s => TransportError::Unexpected {
                status: s,
                body: truncated,
            },
        }
    }

    /// Connection failures and timeouts both classify as `Network`.
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        TransportError::Network(err.to_string())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransportError::Network(_) | TransportError::ServerError { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_from_status_classification() {
        assert!(matches!(
            TransportError::from_status(StatusCode::UNAUTHORIZED, ""),
            TransportError::Unauthorized
        ));
        assert!(matches!(
            TransportError::from_status(StatusCode::NOT_FOUND, "missing"),
            TransportError::ClientError { status: 404, .. }
        ));
        assert!(matches!(
            TransportError::from_status(StatusCode::BAD_GATEWAY, "oops"),
            TransportError::ServerError { status: 502, .. }
        ));
    }

    #[test]
    fn test_retryable_split() {
        assert!(TransportError::Network("timeout".into()).is_retryable());
        assert!(TransportError::ServerError {
            status: 503,
            body: String::new()
        }
        .is_retryable());
        assert!(!TransportError::Unauthorized.is_retryable());
        assert!(!TransportError::ClientError {
            status: 404,
            body: String::new()
        }
        .is_retryable());
    }

    #[test]
    fn test_body_truncation() {
        let long = "x".repeat(2_000);
        let err = TransportError::from_status(StatusCode::INTERNAL_SERVER_ERROR, &long);
        if let TransportError::ServerError { body, .. } = err {
            assert!(body.len() < 600);
            assert!(body.contains("truncated"));
        } else {
            panic!("expected ServerError");
        }
    }
}
