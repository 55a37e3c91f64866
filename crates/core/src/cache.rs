//! Tiered cache data types.

use crate::hash::ContentAddress;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;

/// A cache tier, ordered fastest first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheLevel {
    Memory,
    Ssd,
    Hdd,
    Network,
}

impl CacheLevel {
    /// Every level, fastest first.
    pub const ALL: [CacheLevel; 4] = [
        CacheLevel::Memory,
        CacheLevel::Ssd,
        CacheLevel::Hdd,
        CacheLevel::Network,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Ssd => "ssd",
            Self::Hdd => "hdd",
            Self::Network => "network",
        }
    }

    /// Position in [`CacheLevel::ALL`].
    pub fn index(&self) -> usize {
        *self as usize
    }

    /// The next faster tier, if any.
    pub fn faster(&self) -> Option<CacheLevel> {
        match self {
            Self::Memory => None,
            Self::Ssd => Some(Self::Memory),
            Self::Hdd => Some(Self::Ssd),
            Self::Network => Some(Self::Hdd),
        }
    }
}

impl fmt::Display for CacheLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CacheLevel {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "memory" => Ok(Self::Memory),
            "ssd" | "disk" => Ok(Self::Ssd),
            "hdd" => Ok(Self::Hdd),
            "network" => Ok(Self::Network),
            other => Err(crate::Error::InvalidState(format!(
                "unknown cache level: {other}"
            ))),
        }
    }
}

/// Observed usage of a cache entry.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AccessPattern {
    /// Hits per hour since the entry was cached.
    pub frequency: f64,
    /// 1.0 right after an access, decaying towards 0.
    pub recency: f64,
    /// Entry size relative to its tier capacity.
    pub size_factor: f64,
    pub geographic_locality: Vec<String>,
}

/// One resident cache entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub content_hash: ContentAddress,
    pub cache_level: CacheLevel,
    pub size_bytes: u64,
    pub hit_count: u64,
    pub miss_count: u64,
    pub eviction_count: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub last_access_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub cached_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub expires_at: Option<OffsetDateTime>,
    pub ttl_seconds: u64,
    pub priority: u8,
    pub access_pattern: AccessPattern,
}

impl CacheEntry {
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Placement hints supplied when inserting into the cache.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CacheMetadata {
    pub cache_level: CacheLevel,
    /// Zero disables expiry.
    pub ttl_seconds: u64,
    pub priority: u8,
    #[serde(default)]
    pub geographic_locality: Vec<String>,
}

impl CacheMetadata {
    pub fn new(cache_level: CacheLevel, ttl_seconds: u64, priority: u8) -> Self {
        Self {
            cache_level,
            ttl_seconds,
            priority,
            geographic_locality: Vec::new(),
        }
    }
}

/// Whether and how content should be cached after a read.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CacheRecommendation {
    pub should_cache: bool,
    pub cache_level: CacheLevel,
    pub ttl_seconds: u64,
    pub priority: u8,
    pub reason: String,
}

impl CacheRecommendation {
    pub fn skip(reason: impl Into<String>) -> Self {
        Self {
            should_cache: false,
            cache_level: CacheLevel::Network,
            ttl_seconds: 0,
            priority: 1,
            reason: reason.into(),
        }
    }

    /// Placement hints for inserting per this recommendation.
    pub fn metadata(&self) -> CacheMetadata {
        CacheMetadata::new(self.cache_level, self.ttl_seconds, self.priority)
    }
}

/// Counters for one tier.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TierStats {
    pub level: Option<CacheLevel>,
    pub capacity_bytes: u64,
    pub used_bytes: u64,
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub promotions: u64,
}

/// Aggregate cache statistics.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub miss_rate: f64,
    pub total_entries: usize,
    pub total_bytes: u64,
    pub tiers: Vec<TierStats>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_are_ordered_fastest_first() {
        assert!(CacheLevel::Memory < CacheLevel::Ssd);
        assert!(CacheLevel::Hdd < CacheLevel::Network);
        for (i, level) in CacheLevel::ALL.iter().enumerate() {
            assert_eq!(level.index(), i);
        }
    }

    #[test]
    fn test_faster_walks_up_one_tier() {
        assert_eq!(CacheLevel::Network.faster(), Some(CacheLevel::Hdd));
        assert_eq!(CacheLevel::Ssd.faster(), Some(CacheLevel::Memory));
        assert_eq!(CacheLevel::Memory.faster(), None);
    }

    #[test]
    fn test_disk_alias_maps_to_ssd() {
        assert_eq!("disk".parse::<CacheLevel>().unwrap(), CacheLevel::Ssd);
    }
}
