//! Per-request configuration.

use std::time::Duration;

use super::pool::CallSite;
use super::retry::{DEFAULT_ACCEPTABLE_STATUS, DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY, RetryPolicy};

/// Default timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: f64 = 1.0;

/// Redirect limit used when following redirects.
pub const DEFAULT_MAX_REDIRECTS: usize = 10;

/// Transport switches the caller may set explicitly. `None` keeps the
/// client default; a value always wins over it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferOverrides {
    /// Default: follow.
    pub follow_redirects: Option<bool>,
    /// Default: [`DEFAULT_MAX_REDIRECTS`].
    pub max_redirects: Option<usize>,
    /// Default: on.
    pub compression: Option<bool>,
    /// Default: on. Turning it off leaves [`Response::headers`](super::Response::headers) empty.
    pub include_headers: Option<bool>,
    /// Default: on.
    pub verbose: Option<bool>,
}

/// Options shared by every verb.
///
/// ```
/// use reqkit::http::RequestOptions;
/// use std::time::Duration;
///
/// let options = RequestOptions::new()
///     .timeout(0.5)
///     .header("Accept", "application/json")
///     .cookie("session", "abc")
///     .max_attempts(5)
///     .retry_delay(Duration::from_millis(200))
///     .accept([200, 204]);
/// assert_eq!(options.acceptable, vec![200, 204]);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RequestOptions {
    /// Seconds; values below one use millisecond precision.
    pub timeout: f64,
    pub headers: Vec<(String, String)>,
    pub cookies: Vec<(String, String)>,
    pub overrides: TransferOverrides,
    /// Coerced to at least one.
    pub max_attempts: i32,
    pub retry_delay: Duration,
    pub acceptable: Vec<u16>,
    /// Pool partition; the verb's own call-site when unset.
    pub call_site: Option<CallSite>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout(mut self, seconds: f64) -> Self {
        self.timeout = seconds;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.push((name.into(), value.into()));
        self
    }

    pub fn max_attempts(mut self, attempts: i32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn accept(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.acceptable = codes.into_iter().collect();
        self
    }

    pub fn call_site(mut self, call_site: CallSite) -> Self {
        self.call_site = Some(call_site);
        self
    }

    pub fn follow_redirects(mut self, follow: bool) -> Self {
        self.overrides.follow_redirects = Some(follow);
        self
    }

    pub fn max_redirects(mut self, max: usize) -> Self {
        self.overrides.max_redirects = Some(max);
        self
    }

    pub fn compression(mut self, enabled: bool) -> Self {
        self.overrides.compression = Some(enabled);
        self
    }

    pub fn include_headers(mut self, enabled: bool) -> Self {
        self.overrides.include_headers = Some(enabled);
        self
    }

    pub fn verbose(mut self, enabled: bool) -> Self {
        self.overrides.verbose = Some(enabled);
        self
    }

    /// Cookies joined into one `Cookie` header value, `a=1; b=2`.
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        let pairs: Vec<String> = self
            .cookies
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect();
        Some(pairs.join("; "))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            delay: self.retry_delay,
            acceptable: self.acceptable.clone(),
        }
    }
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT_SECS,
            headers: Vec::new(),
            cookies: Vec::new(),
            overrides: TransferOverrides::default(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
            acceptable: DEFAULT_ACCEPTABLE_STATUS.to_vec(),
            call_site: None,
        }
    }
}
