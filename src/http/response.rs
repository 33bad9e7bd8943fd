//! Normalized result of one request attempt.

use std::borrow::Cow;
use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::error::ResponseError;
use crate::transport::{Transfer, TransportErrorKind};

/// Outcome of one attempt, whether the transfer completed or not.
///
/// `succeeded` only reports that the transport finished the exchange; the
/// status code still has to be checked. A failed response always has empty
/// headers and body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    succeeded: bool,
    error_code: i32,
    error_message: String,
    url: String,
    status_code: u16,
    headers: HashMap<String, String>,
    body: Vec<u8>,
}

impl Response {
    /// Splits the transfer payload into header block and body, using the
    /// header length the transport reported.
    pub fn from_transfer(transfer: Transfer) -> Self {
        let Transfer { payload, info } = transfer;

        match payload {
            Some(mut payload) => {
                let header_size = info.header_size.min(payload.len());
                let body = payload.split_off(header_size);
                let headers = parse_raw_headers(&String::from_utf8_lossy(&payload));
                Self {
                    succeeded: true,
                    error_code: 0,
                    error_message: String::new(),
                    url: info.url,
                    status_code: info.status,
                    headers,
                    body,
                }
            }
            None => {
                let (error_code, error_message) = match info.error {
                    Some(failure) => (failure.code(), failure.message),
                    None => (
                        TransportErrorKind::Other.code(),
                        TransportErrorKind::Other.description().to_string(),
                    ),
                };
                Self {
                    succeeded: false,
                    error_code,
                    error_message,
                    url: info.url,
                    status_code: info.status,
                    headers: HashMap::new(),
                    body: Vec::new(),
                }
            }
        }
    }

    /// True when the transport completed the exchange, regardless of status.
    pub fn succeeded(&self) -> bool {
        self.succeeded
    }

    /// Transport error code, zero on success.
    pub fn error_code(&self) -> i32 {
        self.error_code
    }

    /// Transport error message, empty on success.
    pub fn error_message(&self) -> &str {
        &self.error_message
    }

    /// Effective URL after redirects.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Only meaningful when [`succeeded`](Self::succeeded) is true.
    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    /// Headers keyed by name as parsed from the header block. The native
    /// transport reports names in lowercase (`content-type`), so use
    /// [`header`](Self::header) for lookups that ignore case.
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(name)
            .or_else(|| {
                self.headers
                    .iter()
                    .find(|(key, _)| key.eq_ignore_ascii_case(name))
                    .map(|(_, value)| value)
            })
            .map(String::as_str)
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Body decoded as UTF-8, invalid sequences replaced.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// Decodes the body as JSON. Empty, invalid or `null` bodies give `None`.
    pub fn json(&self) -> Option<Value> {
        serde_json::from_slice::<Value>(&self.body)
            .ok()
            .filter(|value| !value.is_null())
    }

    /// Decodes the body into `T`, `None` if it does not fit.
    pub fn json_as<T: DeserializeOwned>(&self) -> Option<T> {
        serde_json::from_slice(&self.body).ok()
    }

    /// True when the transfer completed with one of the `acceptable` codes.
    pub fn is_acceptable(&self, acceptable: &[u16]) -> bool {
        self.succeeded && acceptable.contains(&self.status_code)
    }

    /// Returns the response if acceptable, otherwise the reason it is not.
    pub fn error_for_status(self, acceptable: &[u16]) -> Result<Self, ResponseError> {
        if !self.succeeded {
            return Err(ResponseError::Transport {
                code: self.error_code,
                message: self.error_message,
                url: self.url,
            });
        }
        if !acceptable.contains(&self.status_code) {
            return Err(ResponseError::UnacceptableStatus {
                status: self.status_code,
                url: self.url,
            });
        }
        Ok(self)
    }
}

/// Parses a raw header block. Each `\r\n`-separated line is split on the
/// first `": "`; lines without one (the status line, blank lines) are
/// skipped and later names overwrite earlier ones.
pub fn parse_raw_headers(raw: &str) -> HashMap<String, String> {
    let mut headers = HashMap::new();
    for line in raw.split("\r\n") {
        if let Some((name, value)) = line.split_once(": ") {
            headers.insert(name.to_string(), value.to_string());
        }
    }
    headers
}
