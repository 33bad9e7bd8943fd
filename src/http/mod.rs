//! Requests-style HTTP client: pooled handles, status-gated retries and a
//! uniform response object.

mod client;
mod error;
mod options;
mod pool;
mod response;
pub mod retry;
mod url;

pub use client::{Client, NO_PARAMS};
pub use error::{InvalidUrlError, ResponseError};
pub use options::{DEFAULT_MAX_REDIRECTS, DEFAULT_TIMEOUT_SECS, RequestOptions, TransferOverrides};
pub use pool::{CallSite, ConnectionPool, DEFAULT_POOL_CAPACITY, PoolKey};
pub use response::{Response, parse_raw_headers};
pub use retry::{RetryPolicy, Sleeper, ThreadSleeper};
pub use url::{Origin, merge_query};
