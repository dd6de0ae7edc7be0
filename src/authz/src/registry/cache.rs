//! TTL cache in front of a registry
//!
//! Role bindings and role policy lists are cached separately, keyed by user
//! id and role id. Errors from the inner registry are never cached. Entries
//! live for at most the configured TTL, so a registry change is visible after
//! at most one TTL even without explicit invalidation.
//!
//! Each cache carries an invalidation epoch. A fetch records the epoch before
//! asking the inner registry and only stores its answer if no invalidation
//! happened in between, so an in-flight fetch cannot resurrect stale data.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use super::{AttachedPolicy, Registry, RolePolicies};
use crate::error::Result;
use crate::types::RoleBinding;

/// Cached value with its insertion time
#[derive(Clone)]
struct CacheEntry<T> {
    value: T,
    cached_at: Instant,
}

impl<T> CacheEntry<T> {
    fn new(value: T) -> Self {
        Self {
            value,
            cached_at: Instant::now(),
        }
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.cached_at.elapsed() > ttl
    }
}

/// Single keyed TTL map with bounded size
struct TtlCache<T> {
    entries: DashMap<String, CacheEntry<T>>,
    epoch: AtomicU64,
    ttl: Duration,
    capacity: usize,
}

enum Lookup<T> {
    Hit(T),
    Expired,
    Miss,
}

impl<T: Clone> TtlCache<T> {
    fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            epoch: AtomicU64::new(0),
            ttl,
            capacity,
        }
    }

    fn get(&self, key: &str) -> Lookup<T> {
        let Some(entry) = self.entries.get(key) else {
            return Lookup::Miss;
        };

        if entry.is_expired(self.ttl) {
            // Release the shard guard before removing
            drop(entry);
            self.entries.remove(key);
            return Lookup::Expired;
        }

        Lookup::Hit(entry.value.clone())
    }

    /// Epoch to hand back to [`TtlCache::put`] once the fetch completes
    fn ticket(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Store `value` unless an invalidation happened since `ticket`
    fn put(&self, key: &str, value: T, ticket: u64) -> bool {
        if self.entries.len() >= self.capacity && !self.entries.contains_key(key) {
            self.evict();
        }

        // The shard lock is held from the epoch check through the insert, and
        // invalidations bump the epoch before removing, so either the insert
        // is removed afterwards or it is skipped here.
        let slot = self.entries.entry(key.to_string());
        if self.epoch.load(Ordering::SeqCst) != ticket {
            return false;
        }
        slot.insert(CacheEntry::new(value));
        true
    }

    /// Drop expired entries, then the oldest tenth if still full
    fn evict(&self) {
        let ttl = self.ttl;
        self.entries.retain(|_, entry| !entry.is_expired(ttl));

        if self.entries.len() < self.capacity {
            return;
        }

        let mut by_age: Vec<(String, Instant)> = self
            .entries
            .iter()
            .map(|e| (e.key().clone(), e.value().cached_at))
            .collect();
        by_age.sort_by_key(|(_, cached_at)| *cached_at);

        let to_remove = (self.capacity / 10).max(1);
        for (key, _) in by_age.into_iter().take(to_remove) {
            self.entries.remove(&key);
        }
    }

    fn invalidate(&self, key: &str) -> bool {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.entries.remove(key).is_some()
    }

    fn invalidate_where(&self, mut stale: impl FnMut(&T) -> bool) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.entries.retain(|_, entry| !stale(&entry.value));
    }

    fn clear(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.entries.clear();
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Registry wrapper that caches lookups for a bounded time
pub struct CachedRegistry {
    inner: Arc<dyn Registry>,
    bindings: TtlCache<Option<Vec<RoleBinding>>>,
    policies: TtlCache<RolePolicies>,
    capacity: usize,
    stats: DashMap<&'static str, usize>,
}

impl CachedRegistry {
    /// Wrap `inner`; `capacity` bounds each of the two caches
    pub fn new(inner: Arc<dyn Registry>, ttl: Duration, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner,
            bindings: TtlCache::new(ttl, capacity),
            policies: TtlCache::new(ttl, capacity),
            capacity,
            stats: DashMap::new(),
        }
    }

    /// Forget the cached bindings of one user
    pub fn invalidate_user(&self, user_id: &str) {
        if self.bindings.invalidate(user_id) {
            debug!("Invalidated cached bindings for user '{}'", user_id);
        }
    }

    /// Forget the cached policy list of one role
    pub fn invalidate_role(&self, role_id: &str) {
        if self.policies.invalidate(role_id) {
            debug!("Invalidated cached policies for role '{}'", role_id);
        }
    }

    /// Forget every cached role policy list that references `policy_id`,
    /// including roles where it was attached but not yet stored
    pub fn invalidate_policy(&self, policy_id: &str) {
        self.policies
            .invalidate_where(|policies| policies.references(policy_id));
        debug!("Invalidated cached roles referencing policy '{}'", policy_id);
    }

    /// Drop everything, including statistics
    pub fn invalidate_all(&self) {
        self.bindings.clear();
        self.policies.clear();
        self.stats.clear();
        debug!("Registry cache cleared");
    }

    /// Current cache statistics
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.get_stat("hits"),
            misses: self.get_stat("misses"),
            expirations: self.get_stat("expirations"),
            entries: self.bindings.len() + self.policies.len(),
            max_entries: self.capacity * 2,
        }
    }

    fn record<T>(&self, lookup: &Lookup<T>) {
        match lookup {
            Lookup::Hit(_) => self.increment_stat("hits"),
            Lookup::Expired => {
                self.increment_stat("expirations");
                self.increment_stat("misses");
            }
            Lookup::Miss => self.increment_stat("misses"),
        }
    }

    fn increment_stat(&self, key: &'static str) {
        self.stats
            .entry(key)
            .and_modify(|count| *count += 1)
            .or_insert(1);
    }

    fn get_stat(&self, key: &str) -> usize {
        self.stats.get(key).map(|v| *v).unwrap_or(0)
    }
}

#[async_trait]
impl Registry for CachedRegistry {
    async fn get_role_bindings(&self, user_id: &str) -> Result<Option<Vec<RoleBinding>>> {
        let lookup = self.bindings.get(user_id);
        self.record(&lookup);
        if let Lookup::Hit(bindings) = lookup {
            trace!("Binding cache hit for user '{}'", user_id);
            return Ok(bindings);
        }

        let ticket = self.bindings.ticket();
        let bindings = self.inner.get_role_bindings(user_id).await?;
        if !self.bindings.put(user_id, bindings.clone(), ticket) {
            debug!("Bindings for '{}' changed during fetch, not caching", user_id);
        }
        Ok(bindings)
    }

    async fn get_policy_documents(&self, role_id: &str) -> Result<Vec<AttachedPolicy>> {
        Ok(self.get_role_policies(role_id).await?.documents)
    }

    async fn get_role_policies(&self, role_id: &str) -> Result<RolePolicies> {
        let lookup = self.policies.get(role_id);
        self.record(&lookup);
        if let Lookup::Hit(policies) = lookup {
            trace!("Policy cache hit for role '{}'", role_id);
            return Ok(policies);
        }

        let ticket = self.policies.ticket();
        let policies = self.inner.get_role_policies(role_id).await?;
        if !self.policies.put(role_id, policies.clone(), ticket) {
            debug!("Policies for role '{}' changed during fetch, not caching", role_id);
        }
        Ok(policies)
    }
}

/// Cache statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    pub expirations: usize,
    pub entries: usize,
    pub max_entries: usize,
}

impl CacheStats {
    /// Fraction of lookups served from the cache
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::InMemoryRegistry;

    #[tokio::test]
    async fn test_hits_and_misses() {
        let inner = Arc::new(InMemoryRegistry::new());
        inner.bind_role("alice", RoleBinding::org_wide("viewer")).await;

        let cached = CachedRegistry::new(inner, Duration::from_secs(60), 100);
        assert!(cached.get_role_bindings("alice").await.unwrap().is_some());
        assert!(cached.get_role_bindings("alice").await.unwrap().is_some());

        let stats = cached.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.hit_rate(), 0.5);
    }

    #[tokio::test]
    async fn test_unknown_user_is_cached_too() {
        let cached = CachedRegistry::new(Arc::new(InMemoryRegistry::new()), Duration::from_secs(60), 100);
        assert_eq!(cached.get_role_bindings("ghost").await.unwrap(), None);
        assert_eq!(cached.get_role_bindings("ghost").await.unwrap(), None);
        assert_eq!(cached.stats().hits, 1);
    }

    #[tokio::test]
    async fn test_expired_entries_are_refetched() {
        let inner = Arc::new(InMemoryRegistry::new());
        inner.add_user("alice").await;

        let cached = CachedRegistry::new(inner.clone(), Duration::from_millis(20), 100);
        assert_eq!(cached.get_role_bindings("alice").await.unwrap(), Some(vec![]));

        inner.bind_role("alice", RoleBinding::org_wide("admin")).await;
        tokio::time::sleep(Duration::from_millis(40)).await;

        let bindings = cached.get_role_bindings("alice").await.unwrap().unwrap();
        assert_eq!(bindings, vec![RoleBinding::org_wide("admin")]);
        assert_eq!(cached.stats().expirations, 1);
    }

    #[tokio::test]
    async fn test_capacity_is_bounded() {
        let inner = Arc::new(InMemoryRegistry::new());
        let cached = CachedRegistry::new(inner, Duration::from_secs(60), 10);

        for i in 0..25 {
            cached.get_role_bindings(&format!("user-{}", i)).await.unwrap();
        }

        assert!(cached.bindings.len() <= 10);
    }

    #[test]
    fn test_put_after_invalidation_is_skipped() {
        let cache: TtlCache<u32> = TtlCache::new(Duration::from_secs(60), 10);

        let ticket = cache.ticket();
        cache.invalidate("k");
        assert!(!cache.put("k", 1, ticket));
        assert!(matches!(cache.get("k"), Lookup::Miss));

        assert!(cache.put("k", 2, cache.ticket()));
        assert!(matches!(cache.get("k"), Lookup::Hit(2)));
    }
}
