//! Connection pool keyed by call-site and origin.
//!
//! Handles are reused for every request sharing a key and live until the
//! pool is flushed. There is no per-entry eviction: once the pool is full,
//! opening a handle for a new key closes and discards all of them first.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::debug;

use super::error::InvalidUrlError;
use super::url::Origin;
use crate::transport::{Connector, Handle, NativeConnector};

/// Maximum number of live handles before the pool is flushed.
pub const DEFAULT_POOL_CAPACITY: usize = 100;

/// Logical client function that issued a request.
///
/// Requests from different call-sites never share a handle, even when they
/// target the same origin.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallSite(Cow<'static, str>);

impl CallSite {
    pub const GET: CallSite = CallSite(Cow::Borrowed("get"));
    pub const POST: CallSite = CallSite(Cow::Borrowed("post"));

    pub fn new(name: impl Into<String>) -> Self {
        CallSite(Cow::Owned(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of a pooled handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoolKey {
    pub call_site: CallSite,
    pub origin: Origin,
}

impl PoolKey {
    /// Fails for anything but an http(s) URL.
    pub fn new(call_site: CallSite, url: &str) -> Result<Self, InvalidUrlError> {
        Ok(Self {
            call_site,
            origin: Origin::parse(url)?,
        })
    }
}

impl fmt::Display for PoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.call_site, self.origin)
    }
}

/// Owns every transport handle opened on behalf of the clients borrowing it.
///
/// Access is serialized by an internal lock held for one transfer at a time.
pub struct ConnectionPool {
    connector: Box<dyn Connector>,
    capacity: usize,
    handles: Mutex<HashMap<PoolKey, Box<dyn Handle>>>,
}

impl ConnectionPool {
    /// Pool over the native transport with [`DEFAULT_POOL_CAPACITY`].
    pub fn new() -> Self {
        Self::with_connector(NativeConnector)
    }

    pub fn with_connector(connector: impl Connector + 'static) -> Self {
        Self {
            connector: Box::new(connector),
            capacity: DEFAULT_POOL_CAPACITY,
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// Sets the handle limit, at least one.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn contains(&self, key: &PoolKey) -> bool {
        self.lock().contains_key(key)
    }

    /// Lends the handle stored under `key` to `f`, opening one first if the
    /// key is new. A new key arriving at a full pool flushes it.
    #[tracing::instrument(skip(self, key, f), fields(key = %key))]
    pub fn with_handle<R>(&self, key: &PoolKey, f: impl FnOnce(&mut dyn Handle) -> R) -> R {
        let mut handles = self.lock();

        if !handles.contains_key(key) && handles.len() >= self.capacity {
            debug!(
                "Connection pool holds {} handles (capacity {}), flushing",
                handles.len(),
                self.capacity
            );
            close_all(&mut handles);
        }

        let handle = handles.entry(key.clone()).or_insert_with(|| {
            debug!("Opening pooled handle for {}", key);
            self.connector.open(&key.origin)
        });
        f(&mut **handle)
    }

    /// Closes and discards every handle.
    pub fn flush(&self) {
        close_all(&mut self.lock());
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PoolKey, Box<dyn Handle>>> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ConnectionPool {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConnectionPool {
    fn drop(&mut self) {
        self.flush();
    }
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish()
    }
}

fn close_all(handles: &mut HashMap<PoolKey, Box<dyn Handle>>) {
    for (_, mut handle) in handles.drain() {
        handle.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MockConnector, MockHandle, Transfer, TransferInfo};
    use mockall::predicate::function;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn key(call_site: CallSite, url: &str) -> PoolKey {
        PoolKey::new(call_site, url).unwrap()
    }

    /// Handle that tags its transfers with `id` and counts closes.
    fn tagged_handle(id: u16, closed: Arc<AtomicUsize>) -> Box<dyn Handle> {
        let mut handle = MockHandle::new();
        handle.expect_perform().returning(move |_| {
            Transfer::completed(
                Vec::new(),
                TransferInfo {
                    status: id,
                    ..TransferInfo::default()
                },
            )
        });
        handle.expect_close().returning(move || {
            closed.fetch_add(1, Ordering::SeqCst);
        });
        Box::new(handle)
    }

    /// Connector handing out handles tagged 1, 2, 3, ... in opening order.
    fn counting_connector(opened: Arc<AtomicUsize>, closed: Arc<AtomicUsize>) -> MockConnector {
        let mut connector = MockConnector::new();
        connector.expect_open().returning(move |_| {
            let id = opened.fetch_add(1, Ordering::SeqCst) as u16 + 1;
            tagged_handle(id, closed.clone())
        });
        connector
    }

    fn handle_id(pool: &ConnectionPool, key: &PoolKey) -> u16 {
        pool.with_handle(key, |handle| {
            handle
                .perform(&crate::transport::TransferOptions {
                    method: crate::transport::Method::Get,
                    url: String::new(),
                    body: None,
                    headers: Vec::new(),
                    cookie: None,
                    timeout: crate::transport::Timeout::Seconds(1),
                    follow_redirects: true,
                    max_redirects: 10,
                    compression: true,
                    include_headers: true,
                    verbose: false,
                })
                .info
                .status
        })
    }

    #[test]
    fn test_call_site_labels() {
        assert_eq!(CallSite::GET.as_str(), "get");
        assert_eq!(CallSite::POST.to_string(), "post");
        assert_eq!(CallSite::new("get"), CallSite::GET);
        assert_ne!(CallSite::GET, CallSite::POST);
    }

    #[test]
    fn test_pool_key_rejects_invalid_url() {
        let err = PoolKey::new(CallSite::GET, "ftp://example.com").unwrap_err();
        assert_eq!(err.url, "ftp://example.com");
    }

    #[test]
    fn test_pool_key_uses_origin_only() {
        let a = key(CallSite::GET, "http://example.com/a?x=1");
        let b = key(CallSite::GET, "http://example.com/b");
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "get|http://example.com");
    }

    #[test]
    fn test_same_key_reuses_handle() {
        let opened = Arc::new(AtomicUsize::new(0));
        let closed = Arc::new(AtomicUsize::new(0));
        let pool = ConnectionPool::with_connector(counting_connector(opened.clone(), closed));

        let k = key(CallSite::GET, "http://example.com/one");
        let first = handle_id(&pool, &k);
        let second = handle_id(&pool, &key(CallSite::GET, "http://example.com/two"));

        assert_eq!(first, second);
        assert_eq!(opened.load(Ordering::SeqCst), 1);
        assert_eq!(pool.len(), 1);
        assert!(pool.contains(&k));
    }

    #[test]
    fn test_other_host_or_call_site_gets_new_handle() {
        let opened = Arc::new(AtomicUsize::new(0));
        let closed = Arc::new(AtomicUsize::new(0));
        let pool = ConnectionPool::with_connector(counting_connector(opened.clone(), closed));

        let get_a = handle_id(&pool, &key(CallSite::GET, "http://a.example.com/"));
        let get_b = handle_id(&pool, &key(CallSite::GET, "http://b.example.com/"));
        let post_a = handle_id(&pool, &key(CallSite::POST, "http://a.example.com/"));

        assert_eq!((get_a, get_b, post_a), (1, 2, 3));
        assert_eq!(opened.load(Ordering::SeqCst), 3);
        assert_eq!(pool.len(), 3);
    }

    #[test]
    fn test_new_key_on_full_pool_flushes_everything() {
        let opened = Arc::new(AtomicUsize::new(0));
        let closed = Arc::new(AtomicUsize::new(0));
        let pool = ConnectionPool::with_connector(counting_connector(
            opened.clone(),
            closed.clone(),
        ))
        .with_capacity(2);

        let a = key(CallSite::GET, "http://a.example.com/");
        let b = key(CallSite::GET, "http://b.example.com/");
        let c = key(CallSite::GET, "http://c.example.com/");

        handle_id(&pool, &a);
        handle_id(&pool, &b);
        assert_eq!(pool.len(), 2);
        assert_eq!(closed.load(Ordering::SeqCst), 0);

        // Existing keys never trigger a flush.
        handle_id(&pool, &a);
        assert_eq!(closed.load(Ordering::SeqCst), 0);

        assert_eq!(handle_id(&pool, &c), 3);
        assert_eq!(closed.load(Ordering::SeqCst), 2);
        assert_eq!(pool.len(), 1);
        assert!(!pool.contains(&a));
        assert!(pool.contains(&c));

        // A flushed key opens a fresh handle.
        assert_eq!(handle_id(&pool, &a), 4);
        assert!(pool.len() <= pool.capacity());
    }

    #[test]
    fn test_flush_closes_handles() {
        let opened = Arc::new(AtomicUsize::new(0));
        let closed = Arc::new(AtomicUsize::new(0));
        let pool = ConnectionPool::with_connector(counting_connector(opened, closed.clone()));

        handle_id(&pool, &key(CallSite::GET, "http://a.example.com/"));
        handle_id(&pool, &key(CallSite::POST, "http://a.example.com/"));
        pool.flush();

        assert!(pool.is_empty());
        assert_eq!(closed.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_drop_closes_handles() {
        let opened = Arc::new(AtomicUsize::new(0));
        let closed = Arc::new(AtomicUsize::new(0));
        {
            let pool =
                ConnectionPool::with_connector(counting_connector(opened, closed.clone()));
            handle_id(&pool, &key(CallSite::GET, "https://example.com/"));
        }
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_connector_receives_origin() {
        let mut connector = MockConnector::new();
        connector
            .expect_open()
            .with(function(|origin: &Origin| {
                origin.as_str() == "https://api.example.com:8443"
            }))
            .times(1)
            .returning(|_| tagged_handle(1, Arc::new(AtomicUsize::new(0))));
        let pool = ConnectionPool::with_connector(connector);

        handle_id(&pool, &key(CallSite::GET, "https://api.example.com:8443/v1/items"));
    }

    #[test]
    fn test_capacity_at_least_one() {
        let pool = ConnectionPool::with_connector(MockConnector::new()).with_capacity(0);
        assert_eq!(pool.capacity(), 1);
        assert_eq!(ConnectionPool::new().capacity(), DEFAULT_POOL_CAPACITY);
    }
}
