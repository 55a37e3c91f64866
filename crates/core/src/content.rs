//! Content records: one per content address.

use crate::hash::ContentAddress;
use crate::location::{LocationKind, LocationRef};
use crate::replication::JobStatus;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;

/// MIME type used when the caller does not supply one.
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// Storage temperature of a piece of content.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageTier {
    #[default]
    Hot,
    Warm,
    Cold,
}

impl StorageTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hot => "hot",
            Self::Warm => "warm",
            Self::Cold => "cold",
        }
    }
}

impl fmt::Display for StorageTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageTier {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "hot" => Ok(Self::Hot),
            "warm" => Ok(Self::Warm),
            "cold" => Ok(Self::Cold),
            other => Err(crate::Error::InvalidState(format!(
                "unknown storage tier: {other}"
            ))),
        }
    }
}

/// Access and update counters for a piece of content.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AccessStatistics {
    pub access_count: u64,
    pub update_count: u64,
    /// Reads per hour since the record was created.
    pub access_frequency_per_hour: f64,
    /// Re-stores per day since the record was created.
    pub update_frequency_per_day: f64,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub last_accessed_at: Option<OffsetDateTime>,
}

impl AccessStatistics {
    /// Record one read at `now` for a record created at `created_at`.
    pub fn record_access(&mut self, created_at: OffsetDateTime, now: OffsetDateTime) {
        self.access_count += 1;
        self.last_accessed_at = Some(now);
        self.recompute(created_at, now);
    }

    /// Record one re-store of identical bytes.
    pub fn record_update(&mut self, created_at: OffsetDateTime, now: OffsetDateTime) {
        self.update_count += 1;
        self.recompute(created_at, now);
    }

    fn recompute(&mut self, created_at: OffsetDateTime, now: OffsetDateTime) {
        // Frequencies are measured over at least one hour so a burst right
        // after creation does not look like a sustained rate.
        let hours = ((now - created_at).as_seconds_f64() / 3600.0).max(1.0);
        self.access_frequency_per_hour = self.access_count as f64 / hours;
        self.update_frequency_per_day = self.update_count as f64 / (hours / 24.0).max(1.0);
    }
}

/// The system of record for one content address.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContentRecord {
    pub content_hash: ContentAddress,
    pub size_bytes: u64,
    pub mime_type: String,
    pub storage_tier: StorageTier,
    /// Path (or key) of the local copy, when one exists.
    pub local_path: Option<String>,
    pub locations: Vec<LocationRef>,
    pub replication_status: BTreeMap<LocationKind, JobStatus>,
    pub verification_agents: BTreeSet<String>,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub last_verified_at: Option<OffsetDateTime>,
    pub access_statistics: AccessStatistics,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl ContentRecord {
    /// Create a record for freshly stored content.
    pub fn new(
        content_hash: ContentAddress,
        size_bytes: u64,
        mime_type: impl Into<String>,
        storage_tier: StorageTier,
    ) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            content_hash,
            size_bytes,
            mime_type: mime_type.into(),
            storage_tier,
            local_path: None,
            locations: Vec::new(),
            replication_status: BTreeMap::new(),
            verification_agents: BTreeSet::new(),
            last_verified_at: None,
            access_statistics: AccessStatistics::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// UHRP resolution URL for this content.
    pub fn uhrp_url(&self) -> String {
        self.content_hash.uhrp_url()
    }

    /// Whether a location of `kind` is currently attached.
    pub fn has_location(&self, kind: LocationKind) -> bool {
        self.locations.iter().any(|l| l.kind == kind)
    }
}
