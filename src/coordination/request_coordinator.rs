use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Why a request was not started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Skip {
    /// A request with the same key is still running
    InFlight,
    /// The previous request with this key started less than the minimum interval ago
    TooSoon { elapsed: Duration },
}

/// Result of running a request through the coordinator
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome<T> {
    Completed(T),
    Skipped(Skip),
    Cancelled,
}

impl<T> Outcome<T> {
    pub fn is_completed(&self) -> bool {
        matches!(self, Outcome::Completed(_))
    }
}

struct InFlight {
    id: u64,
    cancel: CancellationToken,
}

/// Keyed single-flight guard
///
/// At most one request per key runs at a time. A key may also be throttled so a
/// new request is refused until `min_interval` has passed since the last start.
/// Running requests can be cancelled by key.
pub struct RequestCoordinator {
    in_flight: DashMap<String, InFlight>,
    last_started: DashMap<String, Instant>,
    min_interval: Duration,
    next_id: AtomicU64,
}

/// Held for the lifetime of one request; releases the key on drop
pub struct RequestGuard<'a> {
    coordinator: &'a RequestCoordinator,
    key: String,
    id: u64,
    cancel: CancellationToken,
}

impl RequestGuard<'_> {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }
}

impl Drop for RequestGuard<'_> {
    fn drop(&mut self) {
        let id = self.id;
        self.coordinator
            .in_flight
            .remove_if(&self.key, |_, entry| entry.id == id);
    }
}

impl RequestCoordinator {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            in_flight: DashMap::new(),
            last_started: DashMap::new(),
            min_interval,
            next_id: AtomicU64::new(1),
        }
    }

    /// Coordinator that only de-duplicates concurrent requests
    pub fn unthrottled() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn try_begin(&self, key: &str) -> Result<RequestGuard<'_>, Skip> {
        self.begin(key, true)
    }

    /// Like [`try_begin`](Self::try_begin) but ignores the minimum interval
    pub fn try_begin_now(&self, key: &str) -> Result<RequestGuard<'_>, Skip> {
        self.begin(key, false)
    }

    fn begin(&self, key: &str, throttled: bool) -> Result<RequestGuard<'_>, Skip> {
        match self.in_flight.entry(key.to_string()) {
            Entry::Occupied(_) => Err(Skip::InFlight),
            Entry::Vacant(vacant) => {
                let now = Instant::now();
                if throttled && !self.min_interval.is_zero() {
                    if let Some(last) = self.last_started.get(key) {
                        let elapsed = now.saturating_duration_since(*last);
                        if elapsed < self.min_interval {
                            return Err(Skip::TooSoon { elapsed });
                        }
                    }
                }

                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let cancel = CancellationToken::new();
                vacant.insert(InFlight {
                    id,
                    cancel: cancel.clone(),
                });
                if !self.min_interval.is_zero() {
                    self.last_started.insert(key.to_string(), now);
                }

                Ok(RequestGuard {
                    coordinator: self,
                    key: key.to_string(),
                    id,
                    cancel,
                })
            }
        }
    }

    /// Run `request` under `key` unless skipped; resolves to `Cancelled` if
    /// [`cancel`](Self::cancel) is called while it is pending
    pub async fn run<F, T>(&self, key: &str, request: F) -> Outcome<T>
    where
        F: Future<Output = T>,
    {
        match self.try_begin(key) {
            Ok(guard) => Self::drive(guard, request).await,
            Err(skip) => {
                debug!(key, ?skip, "Request skipped");
                Outcome::Skipped(skip)
            }
        }
    }

    /// Await `request` while holding `guard`, giving up if the key is cancelled
    pub async fn drive<F, T>(guard: RequestGuard<'_>, request: F) -> Outcome<T>
    where
        F: Future<Output = T>,
    {
        let key = guard.key().to_string();
        let cancel = guard.cancellation().clone();
        let outcome = tokio::select! {
            _ = cancel.cancelled() => {
                debug!(key = %key, "Request cancelled");
                Outcome::Cancelled
            }
            value = request => Outcome::Completed(value),
        };
        drop(guard);
        outcome
    }

    /// Cancel the running request for `key`; returns whether one was running
    pub fn cancel(&self, key: &str) -> bool {
        match self.in_flight.remove(key) {
            Some((_, entry)) => {
                entry.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) {
        self.in_flight.retain(|_, entry| {
            entry.cancel.cancel();
            false
        });
    }

    pub fn is_in_flight(&self, key: &str) -> bool {
        self.in_flight.contains_key(key)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }
}

impl Default for RequestCoordinator {
    fn default() -> Self {
        Self::unthrottled()
    }
}
