//! Per-actor entitlement cache with a bounded staleness window

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::Entitlement;

struct CacheEntry {
    fetched_at: Instant,
    entitlements: Vec<Entitlement>,
}

/// Entries older than `ttl` are never served. A zero TTL disables caching.
///
/// Every invalidation bumps a generation counter. A set computed under an
/// older generation is discarded on insert, so a resolution racing an
/// invalidation cannot repopulate the cache with what was just dropped.
pub struct EntitlementCache {
    ttl: Duration,
    generation: AtomicU64,
    entries: RwLock<HashMap<Uuid, CacheEntry>>,
}

impl EntitlementCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            generation: AtomicU64::new(0),
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Upper bound on how long a revoked or expired grant may still be served
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn get(&self, actor_id: Uuid) -> Option<Vec<Entitlement>> {
        if self.ttl.is_zero() {
            return None;
        }
        let entries = self.entries.read().await;
        entries
            .get(&actor_id)
            .filter(|entry| entry.fetched_at.elapsed() < self.ttl)
            .map(|entry| entry.entitlements.clone())
    }

    /// Snapshot to take before reading the store for a later `insert`
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Store a set computed at `generation`; dropped if an invalidation happened since
    pub async fn insert(&self, actor_id: Uuid, generation: u64, entitlements: Vec<Entitlement>) {
        if self.ttl.is_zero() {
            return;
        }
        let mut entries = self.entries.write().await;
        if self.generation.load(Ordering::Acquire) != generation {
            return;
        }
        // Drop stale entries while we hold the lock
        let ttl = self.ttl;
        entries.retain(|_, entry| entry.fetched_at.elapsed() < ttl);
        entries.insert(
            actor_id,
            CacheEntry {
                fetched_at: Instant::now(),
                entitlements,
            },
        );
    }

    pub async fn invalidate(&self, actor_id: Uuid) {
        let mut entries = self.entries.write().await;
        self.generation.fetch_add(1, Ordering::AcqRel);
        entries.remove(&actor_id);
    }

    pub async fn invalidate_all(&self) {
        let mut entries = self.entries.write().await;
        self.generation.fetch_add(1, Ordering::AcqRel);
        entries.clear();
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}
