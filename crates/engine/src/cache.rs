//! Tiered adaptive cache in front of the storage router.
//!
//! Four tiers, fastest first: `memory`, `ssd`, `hdd`, `network`. The memory
//! tier keeps bytes in RAM; the others keep them in an [`ObjectStore`]
//! (a filesystem directory per tier by default). Each tier has its own
//! async mutex which serializes inserts and evictions, so the sum of
//! resident sizes never exceeds the tier capacity.
//!
//! Evicting an entry only drops the cached copy. The content store is never
//! touched from here.

use crate::metrics;
use bytes::Bytes;
use hoard_core::config::{CacheConfig, EvictionWeights};
use hoard_core::{
    AccessPattern, AccessStatistics, CacheEntry, CacheLevel, CacheMetadata, CacheRecommendation,
    CacheStats, ClientContext, ContentAddress, TierStats,
};
use hoard_storage::{FilesystemBackend, ObjectStore, StorageError};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::instrument;

/// Hit frequencies are measured over at least this many seconds.
const MIN_FREQUENCY_WINDOW_SECS: f64 = 60.0;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("entry of {size} bytes exceeds the {level} tier capacity of {capacity} bytes")]
    ExceedsCapacity {
        level: CacheLevel,
        size: u64,
        capacity: u64,
    },

    #[error("cache storage error: {0}")]
    Storage(#[from] StorageError),
}

pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// A cache hit and the tier that served it.
#[derive(Clone, Debug)]
pub struct CacheHit {
    pub bytes: Bytes,
    pub level: CacheLevel,
}

#[derive(Default)]
struct TierState {
    entries: HashMap<ContentAddress, CacheEntry>,
    /// Bytes for tiers without a backing store.
    resident: HashMap<ContentAddress, Bytes>,
    used_bytes: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
    expirations: u64,
    promotions: u64,
}

struct Tier {
    level: CacheLevel,
    capacity: u64,
    store: Option<Arc<dyn ObjectStore>>,
    state: Mutex<TierState>,
}

impl Tier {
    fn new(level: CacheLevel, capacity: u64, store: Option<Arc<dyn ObjectStore>>) -> Self {
        Self {
            level,
            capacity,
            store,
            state: Mutex::new(TierState::default()),
        }
    }

    fn enabled(&self) -> bool {
        self.capacity > 0
    }

    async fn read(&self, state: &TierState, hash: &ContentAddress) -> CacheResult<Option<Bytes>> {
        match &self.store {
            None => Ok(state.resident.get(hash).cloned()),
            Some(store) => match store.get(&hash.object_key()).await {
                Ok(bytes) => Ok(Some(bytes)),
                Err(e) if e.is_not_found() => Ok(None),
                Err(e) => Err(e.into()),
            },
        }
    }

    async fn write(&self, state: &mut TierState, hash: &ContentAddress, bytes: Bytes) -> CacheResult<()> {
        match &self.store {
            None => {
                state.resident.insert(*hash, bytes);
            }
            Some(store) => store.put(&hash.object_key(), bytes).await?,
        }
        Ok(())
    }

    /// Drop an entry and its bytes. Returns the removed entry.
    async fn discard(&self, state: &mut TierState, hash: &ContentAddress) -> Option<CacheEntry> {
        let entry = state.entries.remove(hash)?;
        state.used_bytes = state.used_bytes.saturating_sub(entry.size_bytes);
        match &self.store {
            None => {
                state.resident.remove(hash);
            }
            Some(store) => {
                if let Err(e) = store.delete(&hash.object_key()).await {
                    tracing::warn!(tier = %self.level, hash = %hash, error = %e, "failed to delete cached copy");
                }
            }
        }
        Some(entry)
    }
}

/// The tiered cache.
pub struct AdaptiveCache {
    tiers: Vec<Tier>,
    promotion_frequency_per_hour: f64,
    recency_half_life_secs: f64,
    eviction_weights: EvictionWeights,
    default_ttl_seconds: u64,
    lookup_hits: AtomicU64,
    lookup_misses: AtomicU64,
}

impl AdaptiveCache {
    /// Cache whose slower tiers live in filesystem directories under
    /// `config.dir`. Tiers with zero capacity are disabled.
    pub async fn new(config: &CacheConfig) -> CacheResult<Self> {
        let mut tiers = Vec::with_capacity(CacheLevel::ALL.len());
        for level in CacheLevel::ALL {
            let capacity = config.capacities.for_level(level);
            let store: Option<Arc<dyn ObjectStore>> = match level {
                CacheLevel::Memory => None,
                _ if capacity == 0 => None,
                _ => Some(Arc::new(
                    FilesystemBackend::new(config.dir.join(level.as_str())).await?,
                )),
            };
            tiers.push(Tier::new(level, capacity, store));
        }
        Ok(Self::from_tiers(config, tiers))
    }

    /// Cache that keeps every tier in RAM.
    pub fn in_memory(config: &CacheConfig) -> Self {
        let tiers = CacheLevel::ALL
            .into_iter()
            .map(|level| Tier::new(level, config.capacities.for_level(level), None))
            .collect();
        Self::from_tiers(config, tiers)
    }

    fn from_tiers(config: &CacheConfig, tiers: Vec<Tier>) -> Self {
        Self {
            tiers,
            promotion_frequency_per_hour: config.promotion_frequency_per_hour,
            recency_half_life_secs: config.recency_half_life_secs.max(1) as f64,
            eviction_weights: config.eviction_weights,
            default_ttl_seconds: config.default_ttl_seconds,
            lookup_hits: AtomicU64::new(0),
            lookup_misses: AtomicU64::new(0),
        }
    }

    fn tier(&self, level: CacheLevel) -> &Tier {
        &self.tiers[level.index()]
    }

    pub fn capacity(&self, level: CacheLevel) -> u64 {
        self.tier(level).capacity
    }

    pub fn default_ttl_seconds(&self) -> u64 {
        self.default_ttl_seconds
    }

    fn recency(&self, last_access_at: OffsetDateTime, now: OffsetDateTime) -> f64 {
        let age = (now - last_access_at).as_seconds_f64().max(0.0);
        0.5_f64.powf(age / self.recency_half_life_secs)
    }

    /// Lower scores are evicted first.
    fn eviction_score(&self, entry: &CacheEntry, capacity: u64, now: OffsetDateTime) -> f64 {
        let w = &self.eviction_weights;
        let size_ratio = if capacity == 0 {
            1.0
        } else {
            (entry.size_bytes as f64 / capacity as f64).min(1.0)
        };
        w.priority * f64::from(entry.priority) / 10.0
            + w.recency * self.recency(entry.last_access_at, now)
            + w.size * (1.0 - size_ratio)
    }

    /// Look `hash` up, fastest tier first.
    ///
    /// A hit may promote the entry one tier up. A miss is counted on every
    /// tier that was checked.
    #[instrument(skip(self), fields(hash = %hash))]
    pub async fn get(&self, hash: &ContentAddress) -> Option<CacheHit> {
        let now = OffsetDateTime::now_utc();
        for tier in self.tiers.iter().filter(|t| t.enabled()) {
            let mut state = tier.state.lock().await;

            let expired = match state.entries.get(hash) {
                None => {
                    state.misses += 1;
                    metrics::CACHE_MISSES.with_label_values(&[tier.level.as_str()]).inc();
                    continue;
                }
                Some(entry) => entry.is_expired(now),
            };
            if expired {
                tier.discard(&mut state, hash).await;
                state.expirations += 1;
                state.misses += 1;
                metrics::CACHE_MISSES.with_label_values(&[tier.level.as_str()]).inc();
                tracing::debug!(tier = %tier.level, "cache entry expired");
                continue;
            }

            let bytes = match tier.read(&state, hash).await {
                Ok(Some(bytes)) => bytes,
                Ok(None) => {
                    // Backing copy vanished underneath us.
                    tier.discard(&mut state, hash).await;
                    state.misses += 1;
                    continue;
                }
                Err(e) => {
                    tracing::warn!(tier = %tier.level, error = %e, "cache read failed");
                    tier.discard(&mut state, hash).await;
                    state.misses += 1;
                    continue;
                }
            };

            state.hits += 1;
            metrics::CACHE_HITS.with_label_values(&[tier.level.as_str()]).inc();
            let Some(entry) = state.entries.get_mut(hash) else {
                continue;
            };
            entry.hit_count += 1;
            entry.last_access_at = now;
            let window = (now - entry.cached_at)
                .as_seconds_f64()
                .max(MIN_FREQUENCY_WINDOW_SECS);
            entry.access_pattern.frequency = entry.hit_count as f64 * 3600.0 / window;
            entry.access_pattern.recency = 1.0;

            let promote_to = tier.level.faster().filter(|faster| {
                entry.access_pattern.frequency >= self.promotion_frequency_per_hour
                    && entry.size_bytes <= self.capacity(*faster)
            });
            let level = tier.level;
            match promote_to {
                None => {
                    drop(state);
                    self.lookup_hits.fetch_add(1, Ordering::Relaxed);
                    return Some(CacheHit { bytes, level });
                }
                Some(faster) => {
                    let snapshot = entry.clone();
                    drop(state);
                    self.lookup_hits.fetch_add(1, Ordering::Relaxed);

                    // The slower copy stays until the faster tier holds one.
                    if let Err(e) = self.admit(faster, snapshot, bytes.clone()).await {
                        tracing::warn!(from = %level, to = %faster, error = %e, "cache promotion failed");
                        return Some(CacheHit { bytes, level });
                    }
                    let mut state = tier.state.lock().await;
                    tier.discard(&mut state, hash).await;
                    state.promotions += 1;
                    tracing::debug!(from = %level, to = %faster, "cache entry promoted");
                    return Some(CacheHit { bytes, level });
                }
            }
        }
        self.lookup_misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Insert `bytes` at the tier named by `metadata`.
    ///
    /// Evicts the lowest-scoring resident entries until the new one fits.
    /// An entry larger than the whole tier is rejected.
    #[instrument(skip(self, bytes, metadata), fields(hash = %hash, level = %metadata.cache_level, size = bytes.len()))]
    pub async fn put(
        &self,
        hash: &ContentAddress,
        bytes: Bytes,
        metadata: &CacheMetadata,
    ) -> CacheResult<()> {
        let now = OffsetDateTime::now_utc();
        let size = bytes.len() as u64;
        let capacity = self.capacity(metadata.cache_level);
        let entry = CacheEntry {
            content_hash: *hash,
            cache_level: metadata.cache_level,
            size_bytes: size,
            hit_count: 0,
            miss_count: 0,
            eviction_count: 0,
            last_access_at: now,
            cached_at: now,
            expires_at: (metadata.ttl_seconds > 0)
                .then(|| now + time::Duration::seconds(i64::try_from(metadata.ttl_seconds).unwrap_or(i64::MAX))),
            ttl_seconds: metadata.ttl_seconds,
            priority: metadata.priority.clamp(1, 10),
            access_pattern: AccessPattern {
                frequency: 0.0,
                recency: 1.0,
                size_factor: if capacity == 0 { 1.0 } else { size as f64 / capacity as f64 },
                geographic_locality: metadata.geographic_locality.clone(),
            },
        };
        self.admit(metadata.cache_level, entry, bytes).await
    }

    async fn admit(&self, level: CacheLevel, mut entry: CacheEntry, bytes: Bytes) -> CacheResult<()> {
        let tier = self.tier(level);
        let size = entry.size_bytes;
        if !tier.enabled() || size > tier.capacity {
            return Err(CacheError::ExceedsCapacity {
                level,
                size,
                capacity: tier.capacity,
            });
        }
        entry.cache_level = level;
        entry.access_pattern.size_factor = size as f64 / tier.capacity as f64;

        let hash = entry.content_hash;
        let mut state = tier.state.lock().await;
        tier.discard(&mut state, &hash).await;

        let now = OffsetDateTime::now_utc();
        while state.used_bytes + size > tier.capacity {
            let victim = state
                .entries
                .values()
                .min_by(|a, b| {
                    self.eviction_score(a, tier.capacity, now)
                        .total_cmp(&self.eviction_score(b, tier.capacity, now))
                        .then_with(|| a.content_hash.cmp(&b.content_hash))
                })
                .map(|e| e.content_hash);
            let Some(victim) = victim else {
                break;
            };
            if let Some(mut evicted) = tier.discard(&mut state, &victim).await {
                evicted.eviction_count += 1;
                state.evictions += 1;
                metrics::CACHE_EVICTIONS.with_label_values(&[level.as_str()]).inc();
                tracing::debug!(
                    tier = %level,
                    hash = %evicted.content_hash,
                    size = evicted.size_bytes,
                    hits = evicted.hit_count,
                    "cache entry evicted"
                );
            }
        }

        tier.write(&mut state, &hash, bytes).await?;
        state.used_bytes += size;
        state.entries.insert(hash, entry);
        Ok(())
    }

    /// Drop `hash` from every tier.
    pub async fn remove(&self, hash: &ContentAddress) -> bool {
        let mut removed = false;
        for tier in &self.tiers {
            let mut state = tier.state.lock().await;
            removed |= tier.discard(&mut state, hash).await.is_some();
        }
        removed
    }

    /// The resident entry for `hash`, if any.
    pub async fn entry(&self, hash: &ContentAddress) -> Option<CacheEntry> {
        for tier in &self.tiers {
            let state = tier.state.lock().await;
            if let Some(entry) = state.entries.get(hash) {
                let mut entry = entry.clone();
                entry.access_pattern.recency =
                    self.recency(entry.last_access_at, OffsetDateTime::now_utc());
                return Some(entry);
            }
        }
        None
    }

    /// Purge every expired entry. Returns how many were dropped.
    pub async fn sweep_expired(&self) -> usize {
        let now = OffsetDateTime::now_utc();
        let mut purged = 0;
        for tier in &self.tiers {
            let mut state = tier.state.lock().await;
            let expired: Vec<ContentAddress> = state
                .entries
                .values()
                .filter(|e| e.is_expired(now))
                .map(|e| e.content_hash)
                .collect();
            for hash in expired {
                if tier.discard(&mut state, &hash).await.is_some() {
                    state.expirations += 1;
                    purged += 1;
                }
            }
        }
        if purged > 0 {
            tracing::debug!(purged, "expired cache entries swept");
        }
        purged
    }

    pub async fn stats(&self) -> CacheStats {
        let mut tiers = Vec::with_capacity(self.tiers.len());
        for tier in &self.tiers {
            let state = tier.state.lock().await;
            tiers.push(TierStats {
                level: Some(tier.level),
                capacity_bytes: tier.capacity,
                used_bytes: state.used_bytes,
                entries: state.entries.len(),
                hits: state.hits,
                misses: state.misses,
                evictions: state.evictions,
                expirations: state.expirations,
                promotions: state.promotions,
            });
        }

        let hits = self.lookup_hits.load(Ordering::Relaxed);
        let misses = self.lookup_misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        let (hit_rate, miss_rate) = if lookups == 0 {
            (0.0, 0.0)
        } else {
            (hits as f64 / lookups as f64, misses as f64 / lookups as f64)
        };
        CacheStats {
            hits,
            misses,
            hit_rate,
            miss_rate,
            total_entries: tiers.iter().map(|t| t.entries).sum(),
            total_bytes: tiers.iter().map(|t| t.used_bytes).sum(),
            tiers,
        }
    }

    pub fn recommend(
        &self,
        access: &AccessStatistics,
        latency_ms: u64,
        client: &ClientContext,
    ) -> CacheRecommendation {
        recommend(access, latency_ms, client)
    }
}

/// Whether a read with this access history and latency is worth caching.
pub fn recommend(
    access: &AccessStatistics,
    latency_ms: u64,
    client: &ClientContext,
) -> CacheRecommendation {
    let frequency = access.access_frequency_per_hour;
    let mut recommendation = if frequency > 10.0 {
        placement(CacheLevel::Memory, 7200, 8, "high-frequency-access")
    } else if frequency > 2.0 {
        placement(CacheLevel::Ssd, 3600, 5, "medium-frequency-access")
    } else if latency_ms > 200 {
        placement(CacheLevel::Ssd, 3600, 4, "high-latency-location")
    } else {
        CacheRecommendation::skip("infrequent-low-latency")
    };

    if recommendation.should_cache && client.network_type.is_mobile() {
        recommendation.ttl_seconds = recommendation.ttl_seconds.max(1800);
    }
    recommendation
}

fn placement(level: CacheLevel, ttl_seconds: u64, priority: u8, reason: &str) -> CacheRecommendation {
    CacheRecommendation {
        should_cache: true,
        cache_level: level,
        ttl_seconds,
        priority,
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hoard_core::NetworkType;
    use hoard_core::config::TierCapacities;

    const MIB: u64 = 1024 * 1024;

    fn config(memory: u64, ssd: u64) -> CacheConfig {
        CacheConfig {
            capacities: TierCapacities {
                memory,
                ssd,
                hdd: 0,
                network: 0,
            },
            ..CacheConfig::default()
        }
    }

    fn blob(seed: u8, len: usize) -> (ContentAddress, Bytes) {
        let bytes = Bytes::from(vec![seed; len]);
        (ContentAddress::compute(&bytes), bytes)
    }

    async fn used(cache: &AdaptiveCache, level: CacheLevel) -> u64 {
        cache.stats().await.tiers[level.index()].used_bytes
    }

    #[tokio::test]
    async fn oversized_entry_is_rejected() {
        let cache = AdaptiveCache::in_memory(&config(10 * MIB, 0));
        let (hash, bytes) = blob(1, (11 * MIB) as usize);

        let err = cache
            .put(&hash, bytes, &CacheMetadata::new(CacheLevel::Memory, 60, 5))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CacheError::ExceedsCapacity { level: CacheLevel::Memory, .. }
        ));
        assert_eq!(used(&cache, CacheLevel::Memory).await, 0);
        assert!(cache.get(&hash).await.is_none());
    }

    #[tokio::test]
    async fn eviction_keeps_capacity_and_prefers_low_priority() {
        let cache = AdaptiveCache::in_memory(&config(300, 0));
        let (low, low_bytes) = blob(1, 100);
        let (high, high_bytes) = blob(2, 100);
        let (mid, mid_bytes) = blob(3, 100);
        let (new, new_bytes) = blob(4, 100);

        cache.put(&low, low_bytes, &CacheMetadata::new(CacheLevel::Memory, 0, 1)).await.unwrap();
        cache.put(&high, high_bytes, &CacheMetadata::new(CacheLevel::Memory, 0, 10)).await.unwrap();
        cache.put(&mid, mid_bytes, &CacheMetadata::new(CacheLevel::Memory, 0, 5)).await.unwrap();
        assert_eq!(used(&cache, CacheLevel::Memory).await, 300);

        cache.put(&new, new_bytes, &CacheMetadata::new(CacheLevel::Memory, 0, 5)).await.unwrap();

        assert_eq!(used(&cache, CacheLevel::Memory).await, 300);
        assert!(cache.entry(&low).await.is_none());
        assert!(cache.entry(&high).await.is_some());
        assert!(cache.entry(&new).await.is_some());
        assert_eq!(cache.stats().await.tiers[0].evictions, 1);
    }

    #[tokio::test]
    async fn capacity_holds_under_concurrent_inserts() {
        let cache = Arc::new(AdaptiveCache::in_memory(&config(1000, 0)));
        let mut handles = Vec::new();
        for seed in 0..32u8 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                let (hash, bytes) = blob(seed, 90 + usize::from(seed));
                cache
                    .put(&hash, bytes, &CacheMetadata::new(CacheLevel::Memory, 0, seed % 10 + 1))
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        let stats = cache.stats().await;
        assert!(stats.tiers[0].used_bytes <= 1000);
        assert_eq!(stats.total_bytes, stats.tiers[0].used_bytes);
    }

    #[tokio::test]
    async fn miss_counts_every_enabled_tier() {
        let cache = AdaptiveCache::in_memory(&config(100, 100));
        let (hash, _) = blob(9, 10);

        assert!(cache.get(&hash).await.is_none());

        let stats = cache.stats().await;
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.tiers[CacheLevel::Memory.index()].misses, 1);
        assert_eq!(stats.tiers[CacheLevel::Ssd.index()].misses, 1);
        assert_eq!(stats.tiers[CacheLevel::Hdd.index()].misses, 0);
    }

    #[tokio::test]
    async fn expired_entry_is_a_miss_and_is_purged() {
        let cache = AdaptiveCache::in_memory(&config(100, 0));
        let (hash, bytes) = blob(5, 10);
        cache.put(&hash, bytes, &CacheMetadata::new(CacheLevel::Memory, 1, 5)).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;

        assert!(cache.get(&hash).await.is_none());
        let stats = cache.stats().await;
        assert_eq!(stats.tiers[0].expirations, 1);
        assert_eq!(stats.tiers[0].used_bytes, 0);
    }

    #[tokio::test]
    async fn sweep_purges_expired_entries() {
        let cache = AdaptiveCache::in_memory(&config(100, 100));
        let (short, short_bytes) = blob(1, 10);
        let (forever, forever_bytes) = blob(2, 10);
        cache.put(&short, short_bytes, &CacheMetadata::new(CacheLevel::Ssd, 1, 5)).await.unwrap();
        cache.put(&forever, forever_bytes, &CacheMetadata::new(CacheLevel::Ssd, 0, 5)).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;

        assert_eq!(cache.sweep_expired().await, 1);
        assert!(cache.entry(&short).await.is_none());
        assert!(cache.entry(&forever).await.is_some());
    }

    #[tokio::test]
    async fn frequent_hits_promote_one_tier() {
        let mut cfg = config(100, 100);
        cfg.promotion_frequency_per_hour = 100.0;
        let cache = AdaptiveCache::in_memory(&cfg);
        let (hash, bytes) = blob(7, 10);
        cache.put(&hash, bytes.clone(), &CacheMetadata::new(CacheLevel::Ssd, 0, 5)).await.unwrap();

        // Within the 60 s floor one hit is 60/h and two are 120/h.
        let first = cache.get(&hash).await.unwrap();
        assert_eq!(first.level, CacheLevel::Ssd);
        assert_eq!(cache.entry(&hash).await.unwrap().cache_level, CacheLevel::Ssd);

        let second = cache.get(&hash).await.unwrap();
        assert_eq!(second.level, CacheLevel::Ssd);
        assert_eq!(second.bytes, bytes);
        assert_eq!(cache.entry(&hash).await.unwrap().cache_level, CacheLevel::Memory);

        let stats = cache.stats().await;
        assert_eq!(stats.tiers[CacheLevel::Ssd.index()].promotions, 1);
        assert_eq!(stats.tiers[CacheLevel::Ssd.index()].used_bytes, 0);
        assert_eq!(stats.tiers[CacheLevel::Memory.index()].used_bytes, 10);

        let third = cache.get(&hash).await.unwrap();
        assert_eq!(third.level, CacheLevel::Memory);
        assert_eq!(cache.stats().await.hits, 3);
    }

    #[tokio::test]
    async fn failed_promotion_keeps_the_slower_copy() {
        let temp = tempfile::tempdir().unwrap();
        let cfg = CacheConfig {
            dir: temp.path().join("cache"),
            capacities: TierCapacities {
                memory: 100,
                ssd: 100,
                hdd: 100,
                network: 0,
            },
            promotion_frequency_per_hour: 100.0,
            ..CacheConfig::default()
        };
        let cache = AdaptiveCache::new(&cfg).await.unwrap();
        let (hash, bytes) = blob(9, 30);
        cache.put(&hash, bytes.clone(), &CacheMetadata::new(CacheLevel::Hdd, 0, 5)).await.unwrap();

        // A plain file where the ssd tier directory was makes every ssd write fail.
        let ssd_dir = temp.path().join("cache/ssd");
        std::fs::remove_dir_all(&ssd_dir).unwrap();
        std::fs::write(&ssd_dir, b"not a directory").unwrap();

        cache.get(&hash).await.unwrap();
        let second = cache.get(&hash).await.unwrap();
        assert_eq!(second.level, CacheLevel::Hdd);
        assert_eq!(second.bytes, bytes);

        assert_eq!(cache.entry(&hash).await.unwrap().cache_level, CacheLevel::Hdd);
        let stats = cache.stats().await;
        assert_eq!(stats.tiers[CacheLevel::Hdd.index()].promotions, 0);
        assert_eq!(stats.tiers[CacheLevel::Hdd.index()].used_bytes, 30);
        assert_eq!(stats.tiers[CacheLevel::Ssd.index()].used_bytes, 0);

        let third = cache.get(&hash).await.unwrap();
        assert_eq!(third.level, CacheLevel::Hdd);
        assert_eq!(third.bytes, bytes);
    }

    #[tokio::test]
    async fn filesystem_tiers_round_trip() {
        let temp = tempfile::tempdir().unwrap();
        let cfg = CacheConfig {
            dir: temp.path().join("cache"),
            ..config(100, 100)
        };
        let cache = AdaptiveCache::new(&cfg).await.unwrap();
        let (hash, bytes) = blob(3, 40);

        cache.put(&hash, bytes.clone(), &CacheMetadata::new(CacheLevel::Ssd, 0, 5)).await.unwrap();
        assert!(temp.path().join("cache/ssd").join(hash.object_key()).exists());

        let hit = cache.get(&hash).await.unwrap();
        assert_eq!(hit.bytes, bytes);
        assert!(cache.remove(&hash).await);
        assert!(!temp.path().join("cache/ssd").join(hash.object_key()).exists());
    }

    #[test]
    fn recommendation_table() {
        let client = ClientContext::default();
        let stats = |freq: f64| AccessStatistics {
            access_frequency_per_hour: freq,
            ..AccessStatistics::default()
        };

        let hot = recommend(&stats(12.0), 10, &client);
        assert_eq!((hot.cache_level, hot.ttl_seconds, hot.priority), (CacheLevel::Memory, 7200, 8));

        let warm = recommend(&stats(3.0), 10, &client);
        assert_eq!((warm.cache_level, warm.ttl_seconds, warm.priority), (CacheLevel::Ssd, 3600, 5));

        let slow = recommend(&stats(0.5), 250, &client);
        assert_eq!((slow.cache_level, slow.ttl_seconds, slow.priority), (CacheLevel::Ssd, 3600, 4));

        assert!(!recommend(&stats(0.5), 50, &client).should_cache);
    }

    #[test]
    fn mobile_clients_keep_entries_longer() {
        let mobile = ClientContext {
            network_type: NetworkType::FourG,
            ..ClientContext::default()
        };
        let stats = AccessStatistics {
            access_frequency_per_hour: 12.0,
            ..AccessStatistics::default()
        };
        assert_eq!(recommend(&stats, 10, &mobile).ttl_seconds, 7200);

        let mut short = recommend(&AccessStatistics::default(), 300, &mobile);
        assert!(short.should_cache);
        assert!(short.ttl_seconds >= 1800);
        short.ttl_seconds = 0;
        assert_eq!(short.metadata().ttl_seconds, 0);
    }
}
