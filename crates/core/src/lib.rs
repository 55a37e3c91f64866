//! Core domain types for the hoard content-addressed storage engine.
//!
//! This crate defines the canonical data model used across all other crates:
//! - Content addresses (`sha256:<hex>`)
//! - Storage locations and their quality metrics
//! - Content records and access statistics
//! - Replication job lifecycle
//! - Verification evidence and quorum decisions
//! - Cache tiers, entries and statistics
//! - Routing inputs, decisions and access logs
//! - Signed storage advertisements
//! - Application configuration

pub mod advertisement;
pub mod cache;
pub mod config;
pub mod content;
pub mod error;
pub mod hash;
pub mod location;
pub mod replication;
pub mod routing;
pub mod verification;

pub use advertisement::{Advertisement, StorageCapability};
pub use cache::{
    AccessPattern, CacheEntry, CacheLevel, CacheMetadata, CacheRecommendation, CacheStats,
    TierStats,
};
pub use content::{AccessStatistics, ContentRecord, DEFAULT_MIME_TYPE, StorageTier};
pub use error::{Error, Result};
pub use hash::ContentAddress;
pub use location::{LocationKind, LocationRef, StorageLocation};
pub use replication::{JobStatus, ReplicationJob, RetryDecision};
pub use routing::{
    AccessLogEntry, ClientContext, NetworkType, PreferredMethod, RoutingDecision, RoutingOptions,
    RoutingStats,
};
pub use verification::{
    IntegrityVerification, LocationProbe, ProbeOutcome, VerificationCondition, VerificationRecord,
    VerificationType,
};
