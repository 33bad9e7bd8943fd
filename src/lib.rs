//! Requests-style blocking HTTP client with pooled handles and status-gated
//! retries, plus a dictionary-row CSV reader.

pub mod csv;
pub mod http;
pub mod transport;

pub use http::{Client, ConnectionPool, RequestOptions, Response};
