//! Result cache with single-flight deduplication
//!
//! `try_begin_or_await` guarantees at most one in-flight execution per
//! fingerprint in this process. The first caller for an uncached fingerprint
//! becomes the leader; callers arriving while it works become followers and
//! receive the leader's published outcome, success or failure, without
//! invoking the tool themselves.
//!
//! The in-flight map is scoped per fingerprint and is never held across an
//! await point. Backing store failures degrade to a miss and a warning.

use crate::cache::fingerprint::Fingerprint;
use crate::cache::store::{CacheEntry, CacheStore};
use crate::errors::StepError;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Default entry lifetime (one hour)
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

type FlightOutcome = Option<Result<Value, StepError>>;
type FlightMap = HashMap<Fingerprint, watch::Receiver<FlightOutcome>>;

/// Result of claiming a fingerprint
#[derive(Debug)]
pub enum Claim {
    /// A live entry exists
    AlreadyCached(Value),

    /// Caller must execute the step and publish the outcome
    Leader(FlightLeader),

    /// Another caller executed the step; this is its outcome
    Follower(Result<Value, StepError>),
}

/// Fingerprint-keyed result cache
pub struct ResultCache {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
    enabled: bool,
    in_flight: Arc<Mutex<FlightMap>>,
}

impl ResultCache {
    pub fn new(store: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            enabled: true,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Keep single-flight deduplication but never read or write the store
    pub fn with_persistence(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn lock_in_flight(&self) -> MutexGuard<'_, FlightMap> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of fingerprints currently being executed
    pub fn in_flight_count(&self) -> usize {
        self.lock_in_flight().len()
    }

    /// Look up a live entry
    pub async fn get(&self, fingerprint: &Fingerprint) -> Option<Value> {
        if !self.enabled {
            return None;
        }

        match self.store.get(fingerprint).await {
            Ok(Some(entry)) if !entry.is_expired() => Some(entry.value),
            Ok(Some(entry)) => {
                // Lazy reclaim; a concurrent rewrite changes expires_at and is kept
                let _ = self
                    .store
                    .remove_if_expired(fingerprint, entry.expires_at)
                    .await;
                None
            }
            Ok(None) => None,
            Err(e) => {
                warn!(fingerprint = %fingerprint, error = %e, "cache lookup failed, treating as miss");
                None
            }
        }
    }

    /// Store a value with the given lifetime
    pub async fn put(&self, fingerprint: &Fingerprint, value: Value, ttl: Duration) {
        if !self.enabled {
            return;
        }

        let entry = CacheEntry::new(fingerprint.clone(), value, ttl);
        if let Err(e) = self.store.set(entry).await {
            warn!(fingerprint = %fingerprint, error = %e, "cache write failed, result not cached");
        }
    }

    /// Remove an entry; returns whether one existed
    pub async fn invalidate(&self, fingerprint: &Fingerprint) -> bool {
        match self.store.remove(fingerprint).await {
            Ok(removed) => removed,
            Err(e) => {
                warn!(fingerprint = %fingerprint, error = %e, "cache invalidation failed");
                false
            }
        }
    }

    /// Claim a fingerprint: cached value, leadership, or a follower's result
    pub async fn try_begin_or_await(&self, fingerprint: &Fingerprint, tool: &str) -> Claim {
        if let Some(value) = self.get(fingerprint).await {
            debug!(tool, fingerprint = %fingerprint, "cache hit");
            return Claim::AlreadyCached(value);
        }

        let follow = {
            let mut in_flight = self.lock_in_flight();
            match in_flight.get(fingerprint) {
                Some(receiver) => Ok(receiver.clone()),
                None => {
                    let (sender, receiver) = watch::channel(None);
                    in_flight.insert(fingerprint.clone(), receiver);
                    Err(FlightLeader {
                        fingerprint: fingerprint.clone(),
                        tool: tool.to_string(),
                        sender: Some(sender),
                        in_flight: self.in_flight.clone(),
                        store: self.store.clone(),
                        ttl: self.ttl,
                        persist: self.enabled,
                    })
                }
            }
        };

        match follow {
            Ok(receiver) => {
                debug!(tool, fingerprint = %fingerprint, "joining in-flight execution");
                Claim::Follower(Self::await_leader(receiver, tool).await)
            }
            Err(leader) => {
                // A previous leader may have published between our lookup and
                // the claim; its entry is already in the store
                if let Some(value) = self.get(fingerprint).await {
                    leader.finish(Ok(value.clone()));
                    return Claim::AlreadyCached(value);
                }
                debug!(tool, fingerprint = %fingerprint, "cache miss, leading execution");
                Claim::Leader(leader)
            }
        }
    }

    async fn await_leader(
        mut receiver: watch::Receiver<FlightOutcome>,
        tool: &str,
    ) -> Result<Value, StepError> {
        let outcome = match receiver.wait_for(Option::is_some).await {
            Ok(published) => published.clone(),
            Err(_) => None,
        };

        outcome.unwrap_or_else(|| {
            Err(StepError::Abandoned {
                tool: tool.to_string(),
            })
        })
    }

    /// Periodically drop expired entries until the cache is dropped
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let cache: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(cache) = cache.upgrade() else {
                    break;
                };
                match cache.store.sweep_expired().await {
                    Ok(0) => {}
                    Ok(removed) => debug!(removed, "swept expired cache entries"),
                    Err(e) => warn!(error = %e, "cache sweep failed"),
                }
            }
        })
    }
}

/// Exclusive right to execute a fingerprint
///
/// Dropping a leader without publishing wakes its followers with
/// `StepError::Abandoned`.
pub struct FlightLeader {
    fingerprint: Fingerprint,
    tool: String,
    sender: Option<watch::Sender<FlightOutcome>>,
    in_flight: Arc<Mutex<FlightMap>>,
    store: Arc<dyn CacheStore>,
    ttl: Duration,
    persist: bool,
}

impl FlightLeader {
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// Cache a success, then hand the outcome to every follower
    pub async fn publish(self, outcome: Result<Value, StepError>) {
        if self.persist {
            if let Ok(value) = &outcome {
                let entry = CacheEntry::new(self.fingerprint.clone(), value.clone(), self.ttl);
                if let Err(e) = self.store.set(entry).await {
                    warn!(
                        tool = %self.tool,
                        fingerprint = %self.fingerprint,
                        error = %e,
                        "cache write failed, result not cached"
                    );
                }
            }
        }
        self.finish(outcome);
    }

    fn finish(mut self, outcome: Result<Value, StepError>) {
        self.release();
        if let Some(sender) = self.sender.take() {
            let _ = sender.send(Some(outcome));
        }
    }

    fn release(&self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.fingerprint);
    }
}

impl Drop for FlightLeader {
    fn drop(&mut self) {
        if self.sender.is_some() {
            self.release();
        }
    }
}

impl std::fmt::Debug for FlightLeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlightLeader")
            .field("fingerprint", &self.fingerprint)
            .field("tool", &self.tool)
            .field("persist", &self.persist)
            .finish()
    }
}

impl std::fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCache")
            .field("ttl", &self.ttl)
            .field("enabled", &self.enabled)
            .field("in_flight", &self.in_flight_count())
            .finish()
    }
}
