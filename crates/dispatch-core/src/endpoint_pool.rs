//! Fixed-size pool of exclusive-use compute endpoints.
//!
//! The pool keeps a single FIFO of the endpoints nobody holds. Taking an
//! endpoint *moves* it out of that FIFO under the lock, and the returned
//! [`EndpointLease`] owns it until it is dropped, at which point it is
//! pushed back and one waiter is woken. "Available" and "queued" are the
//! same fact, so two callers can never hold the same endpoint.
//!
//! Waiters sleep on a [`Notify`] instead of polling, and every wait is
//! bounded by a timeout that surfaces as [`DispatchError::PoolExhausted`].

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{DispatchError, Result};

/// Default acquisition bound.
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

/// One exclusive-use backend.
#[derive(Debug, Clone)]
pub struct Endpoint {
    id: usize,
    url: String,
    /// Touched on every acquire and release. Informational only.
    last_used: Instant,
}

impl Endpoint {
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn last_used(&self) -> Instant {
        self.last_used
    }
}

pub struct EndpointPool {
    available: Mutex<VecDeque<Endpoint>>,
    released: Notify,
    size: usize,
}

impl EndpointPool {
    /// Build a pool with one endpoint per URL, ids starting at 1.
    pub fn new<I, S>(urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let now = Instant::now();
        let available: VecDeque<Endpoint> = urls
            .into_iter()
            .enumerate()
            .map(|(i, url)| Endpoint {
                id: i + 1,
                url: url.into(),
                last_used: now,
            })
            .collect();
        let size = available.len();

        EndpointPool {
            available: Mutex::new(available),
            released: Notify::new(),
            size,
        }
    }

    /// Total number of endpoints, held or not.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of endpoints currently free.
    pub fn available(&self) -> usize {
        self.available.lock().len()
    }

    /// Wait up to `timeout` for exclusive use of an endpoint.
    ///
    /// Only the calling task is suspended; other lanes keep running.
    pub async fn acquire(self: &Arc<Self>, timeout: Duration) -> Result<EndpointLease> {
        let deadline = Instant::now() + timeout;

        loop {
            // Register interest before checking, so a release between the
            // check and the await still wakes us.
            let notified = self.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(endpoint) = self.try_take() {
                debug!(endpoint = endpoint.id, "endpoint acquired");
                return Ok(EndpointLease {
                    pool: Arc::clone(self),
                    endpoint,
                });
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    pool_size = self.size,
                    "endpoint pool exhausted"
                );
                return Err(DispatchError::PoolExhausted(timeout));
            }
        }
    }

    fn try_take(&self) -> Option<Endpoint> {
        let mut available = self.available.lock();
        let mut endpoint = available.pop_front()?;
        endpoint.last_used = Instant::now();
        Some(endpoint)
    }

    fn release(&self, mut endpoint: Endpoint) {
        endpoint.last_used = Instant::now();
        debug!(endpoint = endpoint.id, "endpoint released");
        self.available.lock().push_back(endpoint);
        self.released.notify_one();
    }
}

impl fmt::Debug for EndpointPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointPool")
            .field("size", &self.size)
            .field("available", &self.available())
            .finish()
    }
}

/// Exclusive handle on one endpoint.
///
/// Dropping it returns the endpoint to the pool exactly once, whether the
/// holder finished, failed, or was cancelled mid-await.
pub struct EndpointLease {
    pool: Arc<EndpointPool>,
    endpoint: Endpoint,
}

impl EndpointLease {
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn id(&self) -> usize {
        self.endpoint.id
    }

    pub fn url(&self) -> &str {
        &self.endpoint.url
    }
}

impl fmt::Debug for EndpointLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointLease")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl Drop for EndpointLease {
    fn drop(&mut self) {
        // The lease's own copy goes away with it.
        self.pool.release(self.endpoint.clone());
    }
}
