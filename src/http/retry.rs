//! Retry loop gated on transport success and acceptable status codes.

use std::time::Duration;

use log::{debug, warn};

use super::response::Response;

/// Default number of attempts per request.
pub const DEFAULT_MAX_ATTEMPTS: i32 = 3;

/// Default delay between attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(3);

/// Status codes accepted when the caller does not say otherwise.
pub const DEFAULT_ACCEPTABLE_STATUS: [u16; 1] = [200];

/// Blocks the calling thread between attempts.
#[cfg_attr(test, mockall::automock)]
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// [`Sleeper`] backed by `std::thread::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// When to stop retrying and how long to wait in between.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: i32,
    pub delay: Duration,
    pub acceptable: Vec<u16>,
}

impl RetryPolicy {
    /// Attempt budget, at least one.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1) as u32
    }

    /// A response ends the loop only if the transfer completed with an
    /// acceptable status. An empty acceptable set accepts nothing.
    pub fn accepts(&self, response: &Response) -> bool {
        response.is_acceptable(&self.acceptable)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
            acceptable: DEFAULT_ACCEPTABLE_STATUS.to_vec(),
        }
    }
}

/// Runs `operation` until it yields an acceptable response or the attempt
/// budget is spent, sleeping `policy.delay` between attempts.
///
/// Transport failures and unacceptable statuses are retried alike. The last
/// response is returned either way.
pub fn with_retry<F>(
    operation_name: &str,
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    mut operation: F,
) -> Response
where
    F: FnMut() -> Response,
{
    let attempts = policy.attempts();
    let mut attempt = 1;

    loop {
        let response = operation();
        if policy.accepts(&response) {
            debug!("{}: accepted on attempt {}/{}", operation_name, attempt, attempts);
            return response;
        }

        if attempt >= attempts {
            debug!(
                "{}: giving up after {} attempts ({})",
                operation_name,
                attempts,
                describe(&response)
            );
            return response;
        }

        warn!(
            "{}: attempt {}/{} failed ({}), retrying in {:?}...",
            operation_name,
            attempt,
            attempts,
            describe(&response),
            policy.delay
        );
        sleeper.sleep(policy.delay);
        attempt += 1;
    }
}

fn describe(response: &Response) -> String {
    if response.succeeded() {
        format!("HTTP {}", response.status_code())
    } else {
        format!(
            "error {}: {}",
            response.error_code(),
            response.error_message()
        )
    }
}
