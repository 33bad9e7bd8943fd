//! Blocking HTTP client with pooled handles and status-gated retries.

use anyhow::Result;
use log::debug;

use super::options::{DEFAULT_MAX_REDIRECTS, RequestOptions};
use super::pool::{CallSite, ConnectionPool, PoolKey};
use super::response::Response;
use super::retry::{Sleeper, ThreadSleeper, with_retry};
use super::url::merge_query;
use crate::transport::{Body, Method, Timeout, TransferOptions};

/// Query parameters for a [`Client::get`] without any.
pub const NO_PARAMS: &[(&str, &str)] = &[];

/// Requests-style client borrowing a [`ConnectionPool`].
///
/// Every call returns a [`Response`] whatever happened on the network; only
/// a URL that is not http(s) is reported as an error.
///
/// ```no_run
/// use reqkit::http::{Client, ConnectionPool, RequestOptions};
///
/// let pool = ConnectionPool::new();
/// let client = Client::new(&pool);
/// let response = client
///     .get("https://example.com/search", &[("q", "rust")], &RequestOptions::new())
///     .unwrap();
/// if response.succeeded() && response.status_code() == 200 {
///     println!("{}", response.text());
/// }
/// ```
pub struct Client<'p> {
    pool: &'p ConnectionPool,
    sleeper: Box<dyn Sleeper>,
}

impl<'p> Client<'p> {
    pub fn new(pool: &'p ConnectionPool) -> Self {
        Self::with_sleeper(pool, ThreadSleeper)
    }

    /// Client whose pauses between attempts go through `sleeper`.
    pub fn with_sleeper(pool: &'p ConnectionPool, sleeper: impl Sleeper + 'static) -> Self {
        Self {
            pool,
            sleeper: Box::new(sleeper),
        }
    }

    pub fn pool(&self) -> &ConnectionPool {
        self.pool
    }

    /// GET `url` with `params` appended to its query string.
    #[tracing::instrument(skip(self, params, options))]
    pub fn get<K, V>(&self, url: &str, params: &[(K, V)], options: &RequestOptions) -> Result<Response>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let url = if params.is_empty() {
            url.to_string()
        } else {
            merge_query(url, params)?
        };
        let call_site = options.call_site.clone().unwrap_or(CallSite::GET);
        self.execute(call_site, Method::Get, &url, None, options)
    }

    /// POST `body` to `url`.
    #[tracing::instrument(skip(self, body, options))]
    pub fn post(
        &self,
        url: &str,
        body: impl Into<Body>,
        options: &RequestOptions,
    ) -> Result<Response> {
        let call_site = options.call_site.clone().unwrap_or(CallSite::POST);
        self.execute(call_site, Method::Post, url, Some(body.into()), options)
    }

    /// Runs the retry loop for one request on the handle pooled under
    /// `(call_site, origin of url)`.
    ///
    /// Stops at the first attempt whose transfer completed with an acceptable
    /// status; otherwise returns the last attempt's response.
    #[tracing::instrument(skip(self, body, options))]
    pub fn execute(
        &self,
        call_site: CallSite,
        method: Method,
        url: &str,
        body: Option<Body>,
        options: &RequestOptions,
    ) -> Result<Response> {
        let url = url.trim();
        let key = PoolKey::new(call_site, url)?;
        let transfer_options = build_transfer_options(method, url, body, options);
        let policy = options.retry_policy();

        debug!(
            "{} {} via {} (attempts: {}, accept: {:?})",
            method,
            url,
            key,
            policy.attempts(),
            policy.acceptable
        );

        let operation = format!("{} {}", method, url);
        let response = with_retry(&operation, &policy, self.sleeper.as_ref(), || {
            let transfer = self
                .pool
                .with_handle(&key, |handle| handle.perform(&transfer_options));
            Response::from_transfer(transfer)
        });

        Ok(response)
    }
}

/// Merges caller options over the defaults: follow redirects, compression,
/// header block in the payload, verbose diagnostics. The timeout is always
/// derived from `options.timeout`.
fn build_transfer_options(
    method: Method,
    url: &str,
    body: Option<Body>,
    options: &RequestOptions,
) -> TransferOptions {
    let overrides = &options.overrides;
    TransferOptions {
        method,
        url: url.to_string(),
        body,
        headers: options.headers.clone(),
        cookie: options.cookie_header(),
        timeout: Timeout::from_secs_f64(options.timeout),
        follow_redirects: overrides.follow_redirects.unwrap_or(true),
        max_redirects: overrides.max_redirects.unwrap_or(DEFAULT_MAX_REDIRECTS),
        compression: overrides.compression.unwrap_or(true),
        include_headers: overrides.include_headers.unwrap_or(true),
        verbose: overrides.verbose.unwrap_or(true),
    }
}
