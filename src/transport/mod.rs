//! Transport abstraction used by the HTTP client.
//!
//! The client never talks to the network directly. It asks a [`Connector`]
//! for a [`Handle`] bound to one origin and drives that handle with a fully
//! populated [`TransferOptions`] on every attempt.
//!
//! # Structure
//!
//! - `native` - reqwest (blocking) implementation of the traits below

mod native;

use std::fmt;
use std::time::Duration;

use crate::http::Origin;

pub use native::{NativeConnector, NativeHandle};

/// HTTP method of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    /// Pre-encoded payload, sent verbatim.
    Text(String),
    /// Key/value pairs, sent `application/x-www-form-urlencoded` by the
    /// native transport. Multipart encoding is not supported.
    Form(Vec<(String, String)>),
}

impl From<&str> for Body {
    fn from(value: &str) -> Self {
        Body::Text(value.to_string())
    }
}

impl From<String> for Body {
    fn from(value: String) -> Self {
        Body::Text(value)
    }
}

impl From<Vec<(String, String)>> for Body {
    fn from(pairs: Vec<(String, String)>) -> Self {
        Body::Form(pairs)
    }
}

impl From<&[(&str, &str)]> for Body {
    fn from(pairs: &[(&str, &str)]) -> Self {
        Body::Form(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }
}

/// Timeout applied to both the whole transfer and the connect phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// Millisecond resolution, chosen for sub-second values.
    Millis(u64),
    /// Whole-second resolution.
    Seconds(u64),
}

/// Longest timeout handed to the transport. Larger values are clamped so
/// deadlines computed from `Instant::now()` cannot overflow.
pub const MAX_TIMEOUT_SECS: u64 = 366 * 24 * 60 * 60;

impl Timeout {
    /// Derives the timeout from a value in seconds.
    ///
    /// Values below one second keep millisecond precision, everything else
    /// is truncated to whole seconds and clamped to [`MAX_TIMEOUT_SECS`].
    /// Negative and NaN values become zero; infinity means no timeout too.
    pub fn from_secs_f64(seconds: f64) -> Self {
        if !seconds.is_finite() || seconds < 0.0 {
            return Timeout::Millis(0);
        }
        if seconds < 1.0 {
            Timeout::Millis((seconds * 1000.0) as u64)
        } else {
            Timeout::Seconds((seconds as u64).min(MAX_TIMEOUT_SECS))
        }
    }

    /// Returns the duration, or `None` when the value is zero (no timeout).
    pub fn duration(&self) -> Option<Duration> {
        let duration = match *self {
            Timeout::Millis(ms) => Duration::from_millis(ms),
            Timeout::Seconds(s) => Duration::from_secs(s),
        };
        (!duration.is_zero()).then(|| duration.min(Duration::from_secs(MAX_TIMEOUT_SECS)))
    }
}

/// Complete option set for one transfer.
///
/// Handles keep state between calls, so the client rebuilds and passes the
/// whole set on every attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferOptions {
    pub method: Method,
    pub url: String,
    pub body: Option<Body>,
    /// Request headers in caller order.
    pub headers: Vec<(String, String)>,
    /// Value of the `Cookie` header, if any cookies were given.
    pub cookie: Option<String>,
    pub timeout: Timeout,
    pub follow_redirects: bool,
    pub max_redirects: usize,
    /// Advertise and transparently decode compressed responses.
    pub compression: bool,
    /// Prefix the payload with the raw response header block.
    pub include_headers: bool,
    pub verbose: bool,
}

impl TransferOptions {
    /// Header lines as they go on the wire, `Name: Value`.
    pub fn header_lines(&self) -> Vec<String> {
        let mut lines: Vec<String> = self
            .headers
            .iter()
            .map(|(name, value)| format!("{}: {}", name, value))
            .collect();
        if let Some(cookie) = &self.cookie {
            lines.push(format!("Cookie: {}", cookie));
        }
        lines
    }
}

/// Failure classes reported by a transport, numbered like libcurl codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    Other,
    FailedInit,
    UrlMalformat,
    CouldntResolveHost,
    CouldntConnect,
    OperationTimedOut,
    TooManyRedirects,
    SendError,
    RecvError,
    BadContentEncoding,
}

impl TransportErrorKind {
    pub fn code(&self) -> i32 {
        match self {
            TransportErrorKind::Other => 1,
            TransportErrorKind::FailedInit => 2,
            TransportErrorKind::UrlMalformat => 3,
            TransportErrorKind::CouldntResolveHost => 6,
            TransportErrorKind::CouldntConnect => 7,
            TransportErrorKind::OperationTimedOut => 28,
            TransportErrorKind::TooManyRedirects => 47,
            TransportErrorKind::SendError => 55,
            TransportErrorKind::RecvError => 56,
            TransportErrorKind::BadContentEncoding => 61,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            TransportErrorKind::Other => "Transfer failed",
            TransportErrorKind::FailedInit => "Failed initialization",
            TransportErrorKind::UrlMalformat => "URL using bad/illegal format",
            TransportErrorKind::CouldntResolveHost => "Couldn't resolve host name",
            TransportErrorKind::CouldntConnect => "Couldn't connect to server",
            TransportErrorKind::OperationTimedOut => "Timeout was reached",
            TransportErrorKind::TooManyRedirects => "Number of redirects hit maximum amount",
            TransportErrorKind::SendError => "Failed sending data to the peer",
            TransportErrorKind::RecvError => "Failure when receiving data from the peer",
            TransportErrorKind::BadContentEncoding => "Unrecognized or bad HTTP Content encoding",
        }
    }
}

/// Error reported by a transport for one transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportFailure {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportFailure {
    pub fn new(kind: TransportErrorKind, detail: impl fmt::Display) -> Self {
        Self {
            kind,
            message: format!("{}: {}", kind.description(), detail),
        }
    }

    pub fn code(&self) -> i32 {
        self.kind.code()
    }
}

impl fmt::Display for TransportFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transport error {}: {}", self.code(), self.message)
    }
}

impl std::error::Error for TransportFailure {}

/// Diagnostics recorded by the transport for the last transfer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferInfo {
    /// Effective URL after redirects.
    pub url: String,
    /// Status code, zero when no response was received.
    pub status: u16,
    /// Length of the header block at the start of the payload.
    pub header_size: usize,
    pub error: Option<TransportFailure>,
}

/// Outcome of one transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    /// Header block followed by the body, `None` when the transfer failed.
    pub payload: Option<Vec<u8>>,
    pub info: TransferInfo,
}

impl Transfer {
    pub fn completed(payload: Vec<u8>, info: TransferInfo) -> Self {
        Self {
            payload: Some(payload),
            info,
        }
    }

    pub fn failed(url: impl Into<String>, status: u16, failure: TransportFailure) -> Self {
        Self {
            payload: None,
            info: TransferInfo {
                url: url.into(),
                status,
                header_size: 0,
                error: Some(failure),
            },
        }
    }
}

/// A reusable transport session bound to one origin.
#[cfg_attr(test, mockall::automock)]
pub trait Handle: Send {
    /// Runs one transfer configured entirely by `options`.
    fn perform(&mut self, options: &TransferOptions) -> Transfer;

    /// Releases the resources held by the handle.
    fn close(&mut self);
}

/// Opens handles for the connection pool.
#[cfg_attr(test, mockall::automock)]
pub trait Connector: Send + Sync {
    fn open(&self, origin: &Origin) -> Box<dyn Handle>;
}
