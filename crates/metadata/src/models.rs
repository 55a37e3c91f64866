//! Database models mapping to the metadata schema.
//!
//! Rows mirror the tables one to one. Conversions into the `hoard_core`
//! domain types live next to the rows; they fail with
//! [`MetadataError::Corrupt`] when a column holds text the domain types
//! refuse to parse.

use crate::error::{MetadataError, MetadataResult};
use hoard_core::replication::validate_priority;
use hoard_core::{
    AccessLogEntry, AccessStatistics, Advertisement, CacheRecommendation, ContentAddress,
    ContentRecord, JobStatus, LocationKind, LocationRef, ReplicationJob, RoutingDecision,
    StorageCapability, StorageLocation, StorageTier, VerificationRecord, VerificationType,
};
use sqlx::FromRow;
use std::collections::{BTreeMap, BTreeSet};
use time::OffsetDateTime;
use uuid::Uuid;

pub(crate) fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

pub(crate) fn to_u64(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

/// Milliseconds since the unix epoch, as stored in `*_ms` columns.
pub fn unix_ms(at: OffsetDateTime) -> i64 {
    i64::try_from(at.unix_timestamp_nanos() / 1_000_000).unwrap_or(i64::MAX)
}

fn from_unix_ms(ms: i64) -> MetadataResult<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000)
        .map_err(|e| MetadataError::Corrupt(format!("timestamp {ms}: {e}")))
}

fn parse_hash(text: &str) -> MetadataResult<ContentAddress> {
    Ok(ContentAddress::parse(text)?)
}

fn parse_kind(text: &str) -> MetadataResult<LocationKind> {
    Ok(text.parse::<LocationKind>()?)
}

fn parse_priority(value: i64) -> MetadataResult<u8> {
    let narrow =
        u8::try_from(value).map_err(|_| MetadataError::Corrupt(format!("priority {value}")))?;
    Ok(validate_priority(narrow)?)
}

// =============================================================================
// Content
// =============================================================================

/// One row of `content_records`.
#[derive(Debug, Clone, FromRow)]
pub struct ContentRow {
    pub content_hash: String,
    pub size_bytes: i64,
    pub mime_type: String,
    pub storage_tier: String,
    pub local_path: Option<String>,
    /// JSON array of verifier ids.
    pub verification_agents: String,
    pub last_verified_at: Option<OffsetDateTime>,
    pub access_count: i64,
    pub update_count: i64,
    pub access_frequency_per_hour: f64,
    pub update_frequency_per_day: f64,
    pub last_accessed_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl ContentRow {
    pub fn from_record(record: &ContentRecord) -> MetadataResult<Self> {
        let stats = &record.access_statistics;
        Ok(Self {
            content_hash: record.content_hash.to_string(),
            size_bytes: to_i64(record.size_bytes),
            mime_type: record.mime_type.clone(),
            storage_tier: record.storage_tier.as_str().to_string(),
            local_path: record.local_path.clone(),
            verification_agents: serde_json::to_string(&record.verification_agents)?,
            last_verified_at: record.last_verified_at,
            access_count: to_i64(stats.access_count),
            update_count: to_i64(stats.update_count),
            access_frequency_per_hour: stats.access_frequency_per_hour,
            update_frequency_per_day: stats.update_frequency_per_day,
            last_accessed_at: stats.last_accessed_at,
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }

    pub fn access_statistics(&self) -> AccessStatistics {
        AccessStatistics {
            access_count: to_u64(self.access_count),
            update_count: to_u64(self.update_count),
            access_frequency_per_hour: self.access_frequency_per_hour,
            update_frequency_per_day: self.update_frequency_per_day,
            last_accessed_at: self.last_accessed_at,
        }
    }

    pub fn agents(&self) -> MetadataResult<BTreeSet<String>> {
        Ok(serde_json::from_str(&self.verification_agents)?)
    }

    /// Assemble the full record from this row and its child rows.
    pub fn into_record(
        self,
        locations: &[LocationRow],
        statuses: &[ReplicationStatusRow],
    ) -> MetadataResult<ContentRecord> {
        let mut replication_status = BTreeMap::new();
        for status in statuses {
            replication_status.insert(
                parse_kind(&status.target)?,
                status.status.parse::<JobStatus>()?,
            );
        }
        let locations = locations
            .iter()
            .map(|row| Ok(LocationRef::new(parse_kind(&row.kind)?, row.url.clone())))
            .collect::<MetadataResult<Vec<_>>>()?;

        Ok(ContentRecord {
            content_hash: parse_hash(&self.content_hash)?,
            size_bytes: to_u64(self.size_bytes),
            storage_tier: self.storage_tier.parse::<StorageTier>()?,
            verification_agents: self.agents()?,
            access_statistics: self.access_statistics(),
            mime_type: self.mime_type,
            local_path: self.local_path,
            locations,
            replication_status,
            last_verified_at: self.last_verified_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Aggregate replication coverage over all content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContentCoverage {
    pub total_content: u64,
    /// Content held at two or more locations.
    pub well_replicated: u64,
}

// =============================================================================
// Locations
// =============================================================================

/// One row of `content_locations`, keyed by `(content_hash, kind)`.
#[derive(Debug, Clone, FromRow)]
pub struct LocationRow {
    pub content_hash: String,
    pub kind: String,
    pub url: String,
    pub availability: f64,
    pub latency_ms: i64,
    pub bandwidth_mbps: i64,
    pub cost_per_gb_satoshis: i64,
    /// JSON array of region codes.
    pub geographic_regions: String,
    pub verified_at: Option<OffsetDateTime>,
    pub registered_at: OffsetDateTime,
}

impl LocationRow {
    pub fn from_location(
        hash: &ContentAddress,
        location: &StorageLocation,
        registered_at: OffsetDateTime,
    ) -> MetadataResult<Self> {
        Ok(Self {
            content_hash: hash.to_string(),
            kind: location.kind.as_str().to_string(),
            url: location.url.clone(),
            availability: location.availability,
            latency_ms: to_i64(location.latency_ms),
            bandwidth_mbps: to_i64(location.bandwidth_mbps),
            cost_per_gb_satoshis: to_i64(location.cost_per_gb_satoshis),
            geographic_regions: serde_json::to_string(&location.geographic_regions)?,
            verified_at: location.verified_at,
            registered_at,
        })
    }

    pub fn location_kind(&self) -> MetadataResult<LocationKind> {
        parse_kind(&self.kind)
    }
}

impl TryFrom<LocationRow> for StorageLocation {
    type Error = MetadataError;

    fn try_from(row: LocationRow) -> MetadataResult<Self> {
        Ok(StorageLocation {
            kind: row.location_kind()?,
            geographic_regions: serde_json::from_str(&row.geographic_regions)?,
            url: row.url,
            availability: row.availability,
            latency_ms: to_u64(row.latency_ms),
            bandwidth_mbps: to_u64(row.bandwidth_mbps),
            cost_per_gb_satoshis: to_u64(row.cost_per_gb_satoshis),
            verified_at: row.verified_at,
        })
    }
}

/// Per-target replication state of one piece of content.
#[derive(Debug, Clone, FromRow)]
pub struct ReplicationStatusRow {
    pub content_hash: String,
    pub target: String,
    pub status: String,
    pub updated_at: OffsetDateTime,
}

// =============================================================================
// Replication jobs
// =============================================================================

/// One row of `replication_jobs`.
#[derive(Debug, Clone, FromRow)]
pub struct ReplicationJobRow {
    pub job_id: Uuid,
    pub content_hash: String,
    pub source: String,
    pub target: String,
    pub status: String,
    pub progress_percent: i64,
    pub bytes_replicated: i64,
    pub priority: i64,
    pub retry_count: i64,
    pub max_retries: i64,
    pub last_error: Option<String>,
    /// Claim gate in unix milliseconds.
    pub not_before_ms: Option<i64>,
    pub enqueued_at: OffsetDateTime,
    pub started_at: Option<OffsetDateTime>,
    pub completed_at: Option<OffsetDateTime>,
}

impl From<&ReplicationJob> for ReplicationJobRow {
    fn from(job: &ReplicationJob) -> Self {
        Self {
            job_id: job.job_id,
            content_hash: job.content_hash.to_string(),
            source: job.source.as_str().to_string(),
            target: job.target.as_str().to_string(),
            status: job.status.as_str().to_string(),
            progress_percent: i64::from(job.progress_percent),
            bytes_replicated: to_i64(job.bytes_replicated),
            priority: i64::from(job.priority),
            retry_count: i64::from(job.retry_count),
            max_retries: i64::from(job.max_retries),
            last_error: job.last_error.clone(),
            not_before_ms: job.not_before.map(unix_ms),
            enqueued_at: job.enqueued_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
        }
    }
}

impl TryFrom<ReplicationJobRow> for ReplicationJob {
    type Error = MetadataError;

    fn try_from(row: ReplicationJobRow) -> MetadataResult<Self> {
        let count = |v: i64| u32::try_from(v).unwrap_or(0);
        Ok(ReplicationJob {
            job_id: row.job_id,
            content_hash: parse_hash(&row.content_hash)?,
            source: parse_kind(&row.source)?,
            target: parse_kind(&row.target)?,
            status: row.status.parse::<JobStatus>()?,
            progress_percent: u8::try_from(row.progress_percent.clamp(0, 100)).unwrap_or(0),
            bytes_replicated: to_u64(row.bytes_replicated),
            priority: parse_priority(row.priority)?,
            retry_count: count(row.retry_count),
            max_retries: count(row.max_retries),
            last_error: row.last_error,
            not_before: row.not_before_ms.map(from_unix_ms).transpose()?,
            enqueued_at: row.enqueued_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
        })
    }
}

// =============================================================================
// Verification evidence
// =============================================================================

/// One row of `verification_records`.
#[derive(Debug, Clone, FromRow)]
pub struct VerificationRow {
    pub id: Uuid,
    pub content_hash: String,
    pub location: String,
    pub verifier_id: String,
    pub verification_type: String,
    pub hash_match: bool,
    pub response_time_ms: i64,
    pub content_size: Option<i64>,
    pub error: Option<String>,
    pub verified_at: OffsetDateTime,
}

impl From<&VerificationRecord> for VerificationRow {
    fn from(record: &VerificationRecord) -> Self {
        Self {
            id: record.id,
            content_hash: record.content_hash.to_string(),
            location: record.location.as_str().to_string(),
            verifier_id: record.verifier_id.clone(),
            verification_type: record.verification_type.as_str().to_string(),
            hash_match: record.hash_match,
            response_time_ms: to_i64(record.response_time_ms),
            content_size: record.content_size.map(to_i64),
            error: record.error.clone(),
            verified_at: record.verified_at,
        }
    }
}

impl TryFrom<VerificationRow> for VerificationRecord {
    type Error = MetadataError;

    fn try_from(row: VerificationRow) -> MetadataResult<Self> {
        Ok(VerificationRecord {
            id: row.id,
            content_hash: parse_hash(&row.content_hash)?,
            location: parse_kind(&row.location)?,
            verification_type: row.verification_type.parse::<VerificationType>()?,
            verifier_id: row.verifier_id,
            hash_match: row.hash_match,
            response_time_ms: to_u64(row.response_time_ms),
            content_size: row.content_size.map(to_u64),
            error: row.error,
            verified_at: row.verified_at,
        })
    }
}

// =============================================================================
// Advertisements
// =============================================================================

/// One row of `advertisements`. Capability and list fields are JSON.
#[derive(Debug, Clone, FromRow)]
pub struct AdvertisementRow {
    pub advertisement_id: Uuid,
    pub content_hash: String,
    pub storage_provider: String,
    pub capability: String,
    pub endpoints: String,
    pub geographic_regions: String,
    pub ttl_hours: i64,
    pub published_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
    pub active: bool,
    pub signature: Option<String>,
}

impl AdvertisementRow {
    pub fn from_advertisement(ad: &Advertisement) -> MetadataResult<Self> {
        Ok(Self {
            advertisement_id: ad.advertisement_id,
            content_hash: ad.content_hash.to_string(),
            storage_provider: ad.storage_provider.clone(),
            capability: serde_json::to_string(&ad.capability)?,
            endpoints: serde_json::to_string(&ad.endpoints)?,
            geographic_regions: serde_json::to_string(&ad.geographic_regions)?,
            ttl_hours: i64::from(ad.ttl_hours),
            published_at: ad.published_at,
            expires_at: ad.expires_at,
            active: ad.active,
            signature: ad.signature.clone(),
        })
    }
}

impl TryFrom<AdvertisementRow> for Advertisement {
    type Error = MetadataError;

    fn try_from(row: AdvertisementRow) -> MetadataResult<Self> {
        let capability: StorageCapability = serde_json::from_str(&row.capability)?;
        Ok(Advertisement {
            advertisement_id: row.advertisement_id,
            content_hash: parse_hash(&row.content_hash)?,
            storage_provider: row.storage_provider,
            capability,
            endpoints: serde_json::from_str(&row.endpoints)?,
            geographic_regions: serde_json::from_str(&row.geographic_regions)?,
            ttl_hours: u32::try_from(row.ttl_hours).unwrap_or(0),
            published_at: row.published_at,
            expires_at: row.expires_at,
            active: row.active,
            signature: row.signature,
        })
    }
}

// =============================================================================
// Routing decisions and access logs
// =============================================================================

/// One row of `routing_decisions`.
///
/// `selected` is the JSON of the chosen [`StorageLocation`]; `selected_kind`
/// duplicates its kind so aggregates can group without parsing JSON.
#[derive(Debug, Clone, FromRow)]
pub struct RoutingDecisionRow {
    pub decision_id: Uuid,
    pub content_hash: String,
    pub client_id: Option<String>,
    pub selected_kind: String,
    pub selected: String,
    pub routing_score: f64,
    pub routing_reason: String,
    pub estimated_latency_ms: i64,
    pub estimated_cost_satoshis: f64,
    pub alternatives: String,
    pub cache_recommendation: Option<String>,
    pub actual_latency_ms: Option<i64>,
    pub decided_at: OffsetDateTime,
}

impl RoutingDecisionRow {
    pub fn from_decision(decision: &RoutingDecision) -> MetadataResult<Self> {
        Ok(Self {
            decision_id: decision.decision_id,
            content_hash: decision.content_hash.to_string(),
            client_id: decision.client_id.clone(),
            selected_kind: decision.selected.kind.as_str().to_string(),
            selected: serde_json::to_string(&decision.selected)?,
            routing_score: decision.routing_score,
            routing_reason: serde_json::to_string(&decision.routing_reason)?,
            estimated_latency_ms: to_i64(decision.estimated_latency_ms),
            estimated_cost_satoshis: decision.estimated_cost_satoshis,
            alternatives: serde_json::to_string(&decision.alternatives)?,
            cache_recommendation: decision
                .cache_recommendation
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
            actual_latency_ms: decision.actual_latency_ms.map(to_i64),
            decided_at: decision.decided_at,
        })
    }
}

impl TryFrom<RoutingDecisionRow> for RoutingDecision {
    type Error = MetadataError;

    fn try_from(row: RoutingDecisionRow) -> MetadataResult<Self> {
        let cache_recommendation: Option<CacheRecommendation> = row
            .cache_recommendation
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;
        Ok(RoutingDecision {
            decision_id: row.decision_id,
            content_hash: parse_hash(&row.content_hash)?,
            client_id: row.client_id,
            selected: serde_json::from_str(&row.selected)?,
            routing_score: row.routing_score,
            routing_reason: serde_json::from_str(&row.routing_reason)?,
            estimated_latency_ms: to_u64(row.estimated_latency_ms),
            estimated_cost_satoshis: row.estimated_cost_satoshis,
            alternatives: serde_json::from_str(&row.alternatives)?,
            cache_recommendation,
            actual_latency_ms: row.actual_latency_ms.map(to_u64),
            decided_at: row.decided_at,
        })
    }
}

/// Aggregates over `routing_decisions`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoutingAggregate {
    pub total_decisions: u64,
    pub by_location: Vec<(String, u64)>,
    pub mean_routing_score: f64,
    pub mean_estimated_latency_ms: f64,
    pub mean_actual_latency_ms: Option<f64>,
}

/// One row of `access_logs`.
#[derive(Debug, Clone, FromRow)]
pub struct AccessLogRow {
    pub content_hash: String,
    pub client_id: Option<String>,
    pub location: Option<String>,
    pub response_time_ms: i64,
    pub bytes_served: i64,
    pub cache_hit: bool,
    pub accessed_at: OffsetDateTime,
}

impl From<&AccessLogEntry> for AccessLogRow {
    fn from(entry: &AccessLogEntry) -> Self {
        Self {
            content_hash: entry.content_hash.to_string(),
            client_id: entry.client_id.clone(),
            location: entry.location.map(|k| k.as_str().to_string()),
            response_time_ms: to_i64(entry.response_time_ms),
            bytes_served: to_i64(entry.bytes_served),
            cache_hit: entry.cache_hit,
            accessed_at: entry.accessed_at,
        }
    }
}

impl TryFrom<AccessLogRow> for AccessLogEntry {
    type Error = MetadataError;

    fn try_from(row: AccessLogRow) -> MetadataResult<Self> {
        Ok(AccessLogEntry {
            content_hash: parse_hash(&row.content_hash)?,
            client_id: row.client_id,
            location: row.location.as_deref().map(parse_kind).transpose()?,
            response_time_ms: to_u64(row.response_time_ms),
            bytes_served: to_u64(row.bytes_served),
            cache_hit: row.cache_hit,
            accessed_at: row.accessed_at,
        })
    }
}
