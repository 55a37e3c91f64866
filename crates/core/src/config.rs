//! Configuration types shared across crates.

use crate::cache::CacheLevel;
use crate::location::LocationKind;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Operational HTTP endpoint configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:9464").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Serve `/metrics` for Prometheus scraping (default: true).
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

fn default_bind() -> String {
    "127.0.0.1:9464".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            metrics_enabled: true,
        }
    }
}

/// Storage backend configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Local filesystem storage.
    Filesystem {
        /// Root directory for storage.
        path: PathBuf,
    },
    /// S3-compatible storage.
    S3 {
        /// Bucket name.
        bucket: String,
        /// Optional endpoint URL (for MinIO, etc.).
        endpoint: Option<String>,
        /// AWS region.
        region: Option<String>,
        /// Optional key prefix.
        prefix: Option<String>,
        /// AWS access key ID. Falls back to the ambient AWS credential chain if not set.
        access_key_id: Option<String>,
        /// AWS secret access key.
        secret_access_key: Option<String>,
        /// Force path-style URLs (required for MinIO and some S3-compatible services).
        #[serde(default)]
        force_path_style: bool,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Filesystem {
            path: PathBuf::from("./data/content"),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            StorageConfig::S3 {
                bucket,
                access_key_id,
                secret_access_key,
                ..
            } => {
                if bucket.is_empty() {
                    return Err("s3 config requires a bucket name".to_string());
                }
                match (access_key_id.as_ref(), secret_access_key.as_ref()) {
                    (Some(_), Some(_)) | (None, None) => Ok(()),
                    _ => Err(
                        "s3 config requires both access_key_id and secret_access_key when either is set"
                            .to_string(),
                    ),
                }
            }
            StorageConfig::Filesystem { .. } => Ok(()),
        }
    }
}

/// Metadata store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetadataConfig {
    /// SQLite database.
    Sqlite {
        /// Database file path. `:memory:` opens a private in-memory database.
        path: PathBuf,
        /// Query timeout in seconds (advisory only; slow queries are logged).
        #[serde(default = "default_sqlite_query_timeout_secs")]
        query_timeout_secs: Option<u64>,
    },
}

fn default_sqlite_query_timeout_secs() -> Option<u64> {
    Some(30)
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/metadata.db"),
            query_timeout_secs: default_sqlite_query_timeout_secs(),
        }
    }
}

/// Static description of one location type: where copies live and the
/// baseline quality figures used until evidence replaces them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocationProfile {
    /// Prefix for URLs of copies held at this location.
    pub base_url: String,
    /// Byte store backing this location. Locations without one are
    /// unreachable from this node.
    #[serde(default)]
    pub storage: Option<StorageConfig>,
    pub availability: f64,
    pub latency_ms: u64,
    pub bandwidth_mbps: u64,
    pub cost_per_gb_satoshis: u64,
    #[serde(default)]
    pub regions: Vec<String>,
}

impl LocationProfile {
    fn new(
        base_url: &str,
        availability: f64,
        latency_ms: u64,
        bandwidth_mbps: u64,
        cost_per_gb_satoshis: u64,
        regions: &[&str],
    ) -> Self {
        Self {
            base_url: base_url.to_string(),
            storage: None,
            availability,
            latency_ms,
            bandwidth_mbps,
            cost_per_gb_satoshis,
            regions: regions.iter().map(|r| r.to_string()).collect(),
        }
    }

    /// URL of the copy of an object with `object_key` at this location.
    pub fn url_for(&self, object_key: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), object_key)
    }
}

/// Profiles for every location type.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LocationsConfig {
    #[serde(default = "default_local_profile")]
    pub local: LocationProfile,
    #[serde(default = "default_overlay_profile")]
    pub overlay_resolution: LocationProfile,
    #[serde(default = "default_object_store_profile")]
    pub object_store: LocationProfile,
    #[serde(default = "default_cdn_profile")]
    pub cdn: LocationProfile,
}

fn default_local_profile() -> LocationProfile {
    LocationProfile::new("file://local", 0.99, 5, 1000, 0, &["local"])
}

fn default_overlay_profile() -> LocationProfile {
    LocationProfile::new("https://overlay.invalid", 0.95, 100, 100, 10, &["US"])
}

fn default_object_store_profile() -> LocationProfile {
    LocationProfile::new("s3://hoard-content", 0.995, 100, 200, 5, &["US"])
}

fn default_cdn_profile() -> LocationProfile {
    LocationProfile::new("https://cdn.invalid", 0.999, 50, 500, 2, &["US", "EU"])
}

impl Default for LocationsConfig {
    fn default() -> Self {
        Self {
            local: default_local_profile(),
            overlay_resolution: default_overlay_profile(),
            object_store: default_object_store_profile(),
            cdn: default_cdn_profile(),
        }
    }
}

impl LocationsConfig {
    pub fn profile(&self, kind: LocationKind) -> &LocationProfile {
        match kind {
            LocationKind::Local => &self.local,
            LocationKind::OverlayResolution => &self.overlay_resolution,
            LocationKind::ObjectStore => &self.object_store,
            LocationKind::Cdn => &self.cdn,
        }
    }

    pub fn profile_mut(&mut self, kind: LocationKind) -> &mut LocationProfile {
        match kind {
            LocationKind::Local => &mut self.local,
            LocationKind::OverlayResolution => &mut self.overlay_resolution,
            LocationKind::ObjectStore => &mut self.object_store,
            LocationKind::Cdn => &mut self.cdn,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        for kind in LocationKind::ALL {
            let profile = self.profile(kind);
            if !(0.0..=1.0).contains(&profile.availability) {
                return Err(format!(
                    "locations.{kind}.availability {} must be within [0, 1]",
                    profile.availability
                ));
            }
            if let Some(storage) = &profile.storage {
                storage
                    .validate()
                    .map_err(|e| format!("locations.{kind}.storage: {e}"))?;
            }
        }
        Ok(())
    }
}

/// Replication coordinator configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReplicationConfig {
    /// Size of the worker pool.
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
    /// Attempts per job before it is marked failed.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Backoff unit; the delay before retry `n` is `n * backoff_base_ms`.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    /// Location types every stored object is copied to.
    #[serde(default = "default_replication_targets")]
    pub default_targets: Vec<LocationKind>,
    #[serde(default = "default_replication_priority")]
    pub default_priority: u8,
    /// How often idle workers look for newly eligible jobs.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Read the copy back from the target and check its hash.
    #[serde(default = "default_true")]
    pub verify_after_put: bool,
}

fn default_max_concurrent_jobs() -> usize {
    4
}

fn default_max_retries() -> u32 {
    crate::replication::DEFAULT_MAX_RETRIES
}

fn default_backoff_base_ms() -> u64 {
    1000
}

fn default_replication_targets() -> Vec<LocationKind> {
    vec![LocationKind::ObjectStore, LocationKind::Cdn]
}

fn default_replication_priority() -> u8 {
    5
}

fn default_poll_interval_ms() -> u64 {
    500
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: default_max_concurrent_jobs(),
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            default_targets: default_replication_targets(),
            default_priority: default_replication_priority(),
            poll_interval_ms: default_poll_interval_ms(),
            verify_after_put: true,
        }
    }
}

impl ReplicationConfig {
    pub fn backoff_base(&self) -> time::Duration {
        time::Duration::milliseconds(i64::try_from(self.backoff_base_ms).unwrap_or(i64::MAX))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_concurrent_jobs == 0 {
            return Err("replication.max_concurrent_jobs must be at least 1".to_string());
        }
        if self.poll_interval_ms == 0 {
            return Err("replication.poll_interval_ms cannot be 0".to_string());
        }
        crate::replication::validate_priority(self.default_priority)
            .map_err(|e| format!("replication.default_priority: {e}"))?;
        if self.default_targets.contains(&LocationKind::Local) {
            return Err("replication.default_targets cannot include the local store".to_string());
        }
        Ok(())
    }
}

/// Integrity verifier configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VerificationConfig {
    /// Fraction of responding locations that must agree.
    #[serde(default = "default_consensus_threshold")]
    pub consensus_threshold: f64,
    #[serde(default = "default_per_location_timeout_ms")]
    pub per_location_timeout_ms: u64,
    /// Deadline for a whole fan-out; stragglers are dropped.
    #[serde(default = "default_overall_timeout_ms")]
    pub overall_timeout_ms: u64,
    #[serde(default)]
    pub default_type: crate::verification::VerificationType,
    /// Number of recent records per location used for rolling availability.
    #[serde(default = "default_evidence_window")]
    pub evidence_window: u32,
    /// Content not verified for this long is picked up by the periodic pass.
    #[serde(default = "default_reverify_after_secs")]
    pub reverify_after_secs: u64,
    #[serde(default = "default_verification_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Maximum content verified per periodic pass.
    #[serde(default = "default_verification_batch_size")]
    pub batch_size: u32,
    /// Identifier recorded on evidence produced by this node.
    #[serde(default = "default_verifier_id")]
    pub verifier_id: String,
}

fn default_consensus_threshold() -> f64 {
    crate::verification::DEFAULT_CONSENSUS_THRESHOLD
}

fn default_per_location_timeout_ms() -> u64 {
    5_000
}

fn default_overall_timeout_ms() -> u64 {
    15_000
}

fn default_evidence_window() -> u32 {
    20
}

fn default_reverify_after_secs() -> u64 {
    6 * 3600
}

fn default_verification_sweep_interval_secs() -> u64 {
    3600
}

fn default_verification_batch_size() -> u32 {
    10
}

fn default_verifier_id() -> String {
    "hoard-verifier".to_string()
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            consensus_threshold: default_consensus_threshold(),
            per_location_timeout_ms: default_per_location_timeout_ms(),
            overall_timeout_ms: default_overall_timeout_ms(),
            default_type: Default::default(),
            evidence_window: default_evidence_window(),
            reverify_after_secs: default_reverify_after_secs(),
            sweep_interval_secs: default_verification_sweep_interval_secs(),
            batch_size: default_verification_batch_size(),
            verifier_id: default_verifier_id(),
        }
    }
}

impl VerificationConfig {
    pub fn per_location_timeout(&self) -> Duration {
        Duration::from_millis(self.per_location_timeout_ms)
    }

    pub fn overall_timeout(&self) -> Duration {
        Duration::from_millis(self.overall_timeout_ms)
    }

    pub fn reverify_after(&self) -> time::Duration {
        time::Duration::seconds(i64::try_from(self.reverify_after_secs).unwrap_or(i64::MAX))
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.consensus_threshold) {
            return Err(format!(
                "verification.consensus_threshold {} must be within [0, 1]",
                self.consensus_threshold
            ));
        }
        if self.per_location_timeout_ms == 0 || self.overall_timeout_ms == 0 {
            return Err("verification timeouts cannot be 0".to_string());
        }
        if self.sweep_interval_secs == 0 {
            return Err("verification.sweep_interval_secs cannot be 0".to_string());
        }
        Ok(())
    }
}

/// Weights of the routing score terms.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingWeights {
    pub latency: f64,
    pub availability: f64,
    pub geographic: f64,
    pub cost: f64,
    pub bandwidth: f64,
}

impl Default for RoutingWeights {
    fn default() -> Self {
        Self {
            latency: 30.0,
            availability: 25.0,
            geographic: 20.0,
            cost: 15.0,
            bandwidth: 10.0,
        }
    }
}

/// Storage router configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RoutingConfig {
    #[serde(default)]
    pub weights: RoutingWeights,
    /// Latency ceiling used when neither the request nor the client sets one.
    #[serde(default = "default_max_latency_ms")]
    pub default_max_latency_ms: u64,
    /// Persist every decision for later comparison with actual latency.
    #[serde(default = "default_true")]
    pub log_decisions: bool,
}

fn default_max_latency_ms() -> u64 {
    1000
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            weights: RoutingWeights::default(),
            default_max_latency_ms: default_max_latency_ms(),
            log_decisions: true,
        }
    }
}

impl RoutingConfig {
    pub fn validate(&self) -> Result<(), String> {
        let w = &self.weights;
        for (name, value) in [
            ("latency", w.latency),
            ("availability", w.availability),
            ("geographic", w.geographic),
            ("cost", w.cost),
            ("bandwidth", w.bandwidth),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(format!(
                    "routing.weights.{name} must be a non-negative number"
                ));
            }
        }
        if w.latency + w.availability + w.geographic + w.cost + w.bandwidth <= 0.0 {
            return Err("routing.weights must not all be zero".to_string());
        }
        if self.default_max_latency_ms == 0 {
            return Err("routing.default_max_latency_ms cannot be 0".to_string());
        }
        Ok(())
    }
}

/// Capacity of each cache tier in bytes. Zero disables a tier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierCapacities {
    #[serde(default = "default_memory_capacity")]
    pub memory: u64,
    #[serde(default = "default_ssd_capacity")]
    pub ssd: u64,
    #[serde(default = "default_hdd_capacity")]
    pub hdd: u64,
    #[serde(default)]
    pub network: u64,
}

fn default_memory_capacity() -> u64 {
    64 * 1024 * 1024
}

fn default_ssd_capacity() -> u64 {
    1024 * 1024 * 1024
}

fn default_hdd_capacity() -> u64 {
    10 * 1024 * 1024 * 1024
}

impl Default for TierCapacities {
    fn default() -> Self {
        Self {
            memory: default_memory_capacity(),
            ssd: default_ssd_capacity(),
            hdd: default_hdd_capacity(),
            network: 0,
        }
    }
}

impl TierCapacities {
    pub fn for_level(&self, level: CacheLevel) -> u64 {
        match level {
            CacheLevel::Memory => self.memory,
            CacheLevel::Ssd => self.ssd,
            CacheLevel::Hdd => self.hdd,
            CacheLevel::Network => self.network,
        }
    }
}

/// Weights of the eviction score terms. Lower scores evict first.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvictionWeights {
    pub priority: f64,
    pub recency: f64,
    pub size: f64,
}

impl Default for EvictionWeights {
    fn default() -> Self {
        Self {
            priority: 0.4,
            recency: 0.4,
            size: 0.2,
        }
    }
}

/// Adaptive cache configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub capacities: TierCapacities,
    /// Directory holding the disk-backed tiers (`ssd/`, `hdd/`, `network/`).
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_cache_ttl_seconds")]
    pub default_ttl_seconds: u64,
    /// Hits per hour at which an entry moves one tier up.
    #[serde(default = "default_promotion_frequency")]
    pub promotion_frequency_per_hour: f64,
    /// Seconds for recency to decay to one half.
    #[serde(default = "default_recency_half_life_secs")]
    pub recency_half_life_secs: u64,
    #[serde(default)]
    pub eviction_weights: EvictionWeights,
    #[serde(default = "default_cache_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("./data/cache")
}

fn default_cache_ttl_seconds() -> u64 {
    3600
}

fn default_promotion_frequency() -> f64 {
    5.0
}

fn default_recency_half_life_secs() -> u64 {
    600
}

fn default_cache_sweep_interval_secs() -> u64 {
    60
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacities: TierCapacities::default(),
            dir: default_cache_dir(),
            default_ttl_seconds: default_cache_ttl_seconds(),
            promotion_frequency_per_hour: default_promotion_frequency(),
            recency_half_life_secs: default_recency_half_life_secs(),
            eviction_weights: EvictionWeights::default(),
            sweep_interval_secs: default_cache_sweep_interval_secs(),
        }
    }
}

impl CacheConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.sweep_interval_secs == 0 {
            return Err("cache.sweep_interval_secs cannot be 0".to_string());
        }
        if self.recency_half_life_secs == 0 {
            return Err("cache.recency_half_life_secs cannot be 0".to_string());
        }
        if self.promotion_frequency_per_hour <= 0.0 {
            return Err("cache.promotion_frequency_per_hour must be positive".to_string());
        }
        Ok(())
    }
}

/// Where signed advertisements are published.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DiscoverySinkConfig {
    /// Emit advertisements as log events.
    #[default]
    Log,
    /// POST advertisements as JSON to a broadcast endpoint.
    Webhook {
        url: String,
        #[serde(default = "default_webhook_timeout_ms")]
        timeout_ms: u64,
    },
    /// Discard advertisements.
    None,
}

fn default_webhook_timeout_ms() -> u64 {
    5_000
}

/// Advertisement publisher configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AdvertisementConfig {
    /// Advertise content right after it is stored.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Public base URL of this provider.
    #[serde(default = "default_advertisement_base_url")]
    pub base_url: String,
    /// Provider identity placed in advertisements.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: u32,
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    #[serde(default = "default_supported_mime_types")]
    pub supported_mime_types: Vec<String>,
    #[serde(default = "default_availability_guarantee")]
    pub availability_guarantee: f64,
    #[serde(default = "default_advertised_bandwidth")]
    pub bandwidth_mbps: u64,
    #[serde(default = "default_advertised_cost")]
    pub cost_per_gb_satoshis: u64,
    #[serde(default = "default_features")]
    pub features: Vec<String>,
    #[serde(default = "default_advertised_regions")]
    pub regions: Vec<String>,
    #[serde(default = "default_expiry_sweep_interval_secs")]
    pub expiry_sweep_interval_secs: u64,
    #[serde(default)]
    pub sink: DiscoverySinkConfig,
}

fn default_advertisement_base_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_provider() -> String {
    "hoard".to_string()
}

fn default_ttl_hours() -> u32 {
    24
}

fn default_max_file_size() -> u64 {
    100 * 1024 * 1024
}

fn default_supported_mime_types() -> Vec<String> {
    vec!["*/*".to_string()]
}

fn default_availability_guarantee() -> f64 {
    0.99
}

fn default_advertised_bandwidth() -> u64 {
    100
}

fn default_advertised_cost() -> u64 {
    10
}

fn default_features() -> Vec<String> {
    vec![
        "content-addressing".to_string(),
        "integrity-verification".to_string(),
        "replication".to_string(),
    ]
}

fn default_advertised_regions() -> Vec<String> {
    vec!["US".to_string()]
}

fn default_expiry_sweep_interval_secs() -> u64 {
    300
}

impl Default for AdvertisementConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: default_advertisement_base_url(),
            provider: default_provider(),
            ttl_hours: default_ttl_hours(),
            max_file_size: default_max_file_size(),
            supported_mime_types: default_supported_mime_types(),
            availability_guarantee: default_availability_guarantee(),
            bandwidth_mbps: default_advertised_bandwidth(),
            cost_per_gb_satoshis: default_advertised_cost(),
            features: default_features(),
            regions: default_advertised_regions(),
            expiry_sweep_interval_secs: default_expiry_sweep_interval_secs(),
            sink: DiscoverySinkConfig::default(),
        }
    }
}

impl AdvertisementConfig {
    /// Endpoints through which advertised content can be fetched.
    pub fn endpoints(&self) -> Vec<String> {
        let base = self.base_url.trim_end_matches('/');
        vec![
            format!("{base}/overlay/data"),
            format!("{base}/storage/uhrp"),
        ]
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.ttl_hours == 0 {
            return Err("advertisement.ttl_hours cannot be 0".to_string());
        }
        if self.expiry_sweep_interval_secs == 0 {
            return Err("advertisement.expiry_sweep_interval_secs cannot be 0".to_string());
        }
        if let DiscoverySinkConfig::Webhook { url, .. } = &self.sink
            && !(url.starts_with("http://") || url.starts_with("https://"))
        {
            return Err(format!("advertisement.sink.url must be http(s): {url}"));
        }
        Ok(())
    }
}

/// Signing configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SigningConfig {
    /// Key name (e.g., "provider.example.com-1").
    pub key_name: String,
    /// Private key source.
    pub private_key: PrivateKeyConfig,
}

/// Private key source configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PrivateKeyConfig {
    /// Key stored in a file.
    File {
        /// Path to the private key file.
        path: PathBuf,
    },
    /// Key stored in environment variable.
    Env {
        /// Environment variable name.
        var: String,
    },
    /// Key provided directly as a value (NOT recommended for production).
    Value {
        /// The signing key in `name:base64` format.
        key: String,
    },
    /// Generate a new key (for development only).
    Generate,
}

/// Complete application configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    /// Local content store.
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub metadata: MetadataConfig,
    #[serde(default)]
    pub locations: LocationsConfig,
    #[serde(default)]
    pub replication: ReplicationConfig,
    #[serde(default)]
    pub verification: VerificationConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub advertisement: AdvertisementConfig,
    /// Signing configuration (optional). Without it advertisements fail.
    #[serde(default)]
    pub signing: Option<SigningConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            metadata: MetadataConfig::default(),
            locations: LocationsConfig::default(),
            replication: ReplicationConfig::default(),
            verification: VerificationConfig::default(),
            routing: RoutingConfig::default(),
            cache: CacheConfig::default(),
            advertisement: AdvertisementConfig::default(),
            signing: None,
        }
    }
}

impl AppConfig {
    /// Create a test configuration rooted at `dir`.
    ///
    /// **For testing only.** Every location type is backed by its own
    /// filesystem directory, metadata lives in SQLite under `dir`, and a
    /// signing key is generated on startup.
    pub fn for_testing(dir: &Path) -> Self {
        let mut config = Self {
            storage: StorageConfig::Filesystem {
                path: dir.join("content"),
            },
            metadata: MetadataConfig::Sqlite {
                path: dir.join("metadata.db"),
                query_timeout_secs: default_sqlite_query_timeout_secs(),
            },
            cache: CacheConfig {
                dir: dir.join("cache"),
                ..CacheConfig::default()
            },
            signing: Some(SigningConfig {
                key_name: "test-provider-1".to_string(),
                private_key: PrivateKeyConfig::Generate,
            }),
            ..Self::default()
        };
        for kind in [
            LocationKind::OverlayResolution,
            LocationKind::ObjectStore,
            LocationKind::Cdn,
        ] {
            config.locations.profile_mut(kind).storage = Some(StorageConfig::Filesystem {
                path: dir.join("locations").join(kind.as_str()),
            });
        }
        config.replication.backoff_base_ms = 10;
        config.replication.poll_interval_ms = 20;
        config
    }

    /// Validate every section, returning the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        self.storage.validate()?;
        self.locations.validate()?;
        self.replication.validate()?;
        self.verification.validate()?;
        self.routing.validate()?;
        self.cache.validate()?;
        self.advertisement.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn test_empty_document_yields_defaults() {
        let config: AppConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.verification.consensus_threshold, 0.6);
        assert_eq!(config.replication.max_retries, 3);
        assert_eq!(
            config.replication.default_targets,
            vec![LocationKind::ObjectStore, LocationKind::Cdn]
        );
        assert_eq!(config.routing.weights, RoutingWeights::default());
        assert_eq!(config.advertisement.ttl_hours, 24);
        assert_eq!(config.locations.cdn.regions, vec!["US", "EU"]);
        assert_eq!(config.locations.local.latency_ms, 5);
    }

    #[test]
    fn test_partial_weights_keep_other_defaults() {
        let json = r#"{"weights": {"latency": 50.0}}"#;
        let config: RoutingConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.weights.latency, 50.0);
        assert_eq!(config.weights.availability, 25.0);
        assert_eq!(config.weights.bandwidth, 10.0);
    }

    #[test]
    fn test_threshold_out_of_range_rejected() {
        let config = VerificationConfig {
            consensus_threshold: 1.5,
            ..VerificationConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_local_replication_target_rejected() {
        let config = ReplicationConfig {
            default_targets: vec![LocationKind::Local],
            ..ReplicationConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_advertisement_endpoints() {
        let config = AdvertisementConfig {
            base_url: "https://node.example/".to_string(),
            ..AdvertisementConfig::default()
        };
        assert_eq!(
            config.endpoints(),
            vec![
                "https://node.example/overlay/data".to_string(),
                "https://node.example/storage/uhrp".to_string()
            ]
        );
    }

    #[test]
    fn test_webhook_sink_requires_http_url() {
        let config = AdvertisementConfig {
            sink: DiscoverySinkConfig::Webhook {
                url: "ftp://x".to_string(),
                timeout_ms: 100,
            },
            ..AdvertisementConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_storage_config_s3_validate_partial_credentials() {
        let invalid = StorageConfig::S3 {
            bucket: "bucket".to_string(),
            endpoint: None,
            region: None,
            prefix: None,
            access_key_id: Some("access-key".to_string()),
            secret_access_key: None,
            force_path_style: false,
        };
        assert!(invalid.validate().is_err());
    }

    #[test]
    fn test_for_testing_backs_remote_locations() {
        let dir = std::path::Path::new("/tmp/hoard-test");
        let config = AppConfig::for_testing(dir);
        assert!(config.locations.cdn.storage.is_some());
        assert!(config.locations.local.storage.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_location_url_for() {
        let profile = LocationsConfig::default().cdn;
        assert_eq!(
            profile.url_for("content/ab/cd/x.bin"),
            "https://cdn.invalid/content/ab/cd/x.bin"
        );
    }
}
