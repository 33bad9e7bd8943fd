//! Error types surfaced by the HTTP client.

/// The URL is not an absolute `http://` or `https://` URL.
///
/// Raised before the connection pool or the transport is touched; never
/// retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidUrlError {
    pub url: String,
}

impl InvalidUrlError {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl std::fmt::Display for InvalidUrlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Only http(s) URLs are supported: {}", self.url)
    }
}

impl std::error::Error for InvalidUrlError {}

/// Why a [`Response`](super::Response) was not acceptable.
///
/// The client itself never returns this; network outcomes are carried inside
/// the response. Use [`Response::error_for_status`](super::Response::error_for_status)
/// to turn a response into a `Result`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseError {
    /// The transport failed (connect, timeout, protocol error).
    Transport {
        code: i32,
        message: String,
        url: String,
    },
    /// The transfer completed with a status outside the acceptable set.
    UnacceptableStatus { status: u16, url: String },
}

impl std::fmt::Display for ResponseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponseError::Transport { code, message, url } => {
                write!(f, "Transport error {} ({}) for {}", code, message, url)
            }
            ResponseError::UnacceptableStatus { status, url } => {
                write!(f, "Unacceptable HTTP status {} for {}", status, url)
            }
        }
    }
}

impl std::error::Error for ResponseError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_url_display() {
        let err = InvalidUrlError::new("ftp://example.com");
        assert_eq!(
            err.to_string(),
            "Only http(s) URLs are supported: ftp://example.com"
        );
    }

    #[test]
    fn test_response_error_display() {
        let err = ResponseError::Transport {
            code: 28,
            message: "Timeout was reached".to_string(),
            url: "http://example.com/".to_string(),
        };
        assert!(err.to_string().contains("Transport error 28"));

        let err = ResponseError::UnacceptableStatus {
            status: 503,
            url: "http://example.com/".to_string(),
        };
        assert!(err.to_string().contains("503"));
    }

    #[test]
    fn test_invalid_url_downcasts_through_anyhow() {
        let err = anyhow::Error::from(InvalidUrlError::new("example.com"));
        assert!(err.downcast_ref::<InvalidUrlError>().is_some());
    }
}
