//! Short-TTL in-memory cache over the `policies` table.
//!
//! Policy rows (spending limits, routing overrides, operating hours) are
//! read on nearly every dispatch tick but change rarely, so each lookup is
//! cached for a few seconds to keep the hot loop off the datastore.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use crate::store::Store;
use crate::types::{Policy, PolicyType};

struct CacheEntry {
    policy: Option<Policy>,
    cached_at: Instant,
}

#[derive(Clone)]
pub struct PolicyCache {
    ttl: Duration,
    entries: Arc<RwLock<HashMap<PolicyType, CacheEntry>>>,
}

impl PolicyCache {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            ttl: Duration::from_secs(ttl_secs),
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Returns the cached policy if still fresh, otherwise reads through to
    /// the store and repopulates the cache.
    pub async fn get(
        &self,
        store: &Store,
        policy_type: PolicyType,
    ) -> Result<Option<Policy>, crate::error::CoreError> {
        {
            let guard = self.entries.read().await;
            if let Some(entry) = guard.get(&policy_type) {
                if entry.cached_at.elapsed() < self.ttl {
                    return Ok(entry.policy.clone());
                }
            }
        }

        let fetched = store.latest_policy(policy_type).await?;
        let mut guard = self.entries.write().await;
        guard.insert(
            policy_type,
            CacheEntry {
                policy: fetched.clone(),
                cached_at: Instant::now(),
            },
        );
        Ok(fetched)
    }

    /// Drops a cached entry, forcing the next `get` to read through.
    pub async fn invalidate(&self, policy_type: PolicyType) {
        self.entries.write().await.remove(&policy_type);
    }
}

impl std::hash::Hash for PolicyType {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
    }
}
