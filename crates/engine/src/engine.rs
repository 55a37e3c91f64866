//! The engine facade and its lifecycle.

use crate::advertiser::AdvertisementPublisher;
use crate::cache::AdaptiveCache;
use crate::content::{ContentStore, StoreRequest};
use crate::discovery::DiscoverySink;
use crate::error::{EngineError, EngineResult};
use crate::maintenance;
use crate::metrics;
use crate::registry::LocationRegistry;
use crate::replication::ReplicationCoordinator;
use crate::router::StorageRouter;
use crate::transport::LocationTransport;
use crate::verifier::IntegrityVerifier;
use bytes::Bytes;
use hoard_core::config::AppConfig;
use hoard_core::{
    AccessLogEntry, Advertisement, CacheLevel, CacheStats, ClientContext, ContentAddress,
    ContentRecord, IntegrityVerification, JobStatus, LocationKind, ReplicationJob,
    RoutingDecision, RoutingOptions, RoutingStats, VerificationType,
};
use hoard_metadata::MetadataStore;
use hoard_metadata::models::AccessLogRow;
use hoard_metadata::repos::{ContentRepo, RoutingRepo};
use hoard_signer::Signer;
use hoard_storage::ObjectStore;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::instrument;
use uuid::Uuid;

/// Collaborators the engine is built from.
pub struct EngineContext {
    pub config: AppConfig,
    pub metadata: Arc<dyn MetadataStore>,
    /// The local content store.
    pub local: Arc<dyn ObjectStore>,
    pub transport: Arc<dyn LocationTransport>,
    /// Without a signer, advertising fails with `AdvertisementFailed`.
    pub signer: Option<Arc<dyn Signer>>,
    pub discovery: Arc<dyn DiscoverySink>,
}

/// Per-read options.
#[derive(Clone, Debug, Default)]
pub struct ResolveOptions {
    pub routing: RoutingOptions,
    /// Run a quorum verification before serving.
    pub verify: bool,
    /// Skip the cache lookup. Fetched bytes may still be written back.
    pub bypass_cache: bool,
}

/// Where resolved bytes came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "source", content = "name", rename_all = "snake_case")]
pub enum ServedFrom {
    Cache(CacheLevel),
    Location(LocationKind),
}

/// A served read.
#[derive(Clone, Debug)]
pub struct Resolution {
    pub bytes: Bytes,
    pub content_hash: ContentAddress,
    pub served_from: ServedFrom,
    /// Absent for cache hits.
    pub decision: Option<RoutingDecision>,
    /// A quorum verification ran for this read and reached consensus.
    pub integrity_verified: bool,
    pub resolution_time_ms: u64,
}

/// Replication coverage across all stored content.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NetworkReport {
    pub total_content: u64,
    /// Content with at least two registered locations.
    pub well_replicated: u64,
    pub network_integrity_score: f64,
    pub replication_jobs: Vec<(JobStatus, u64)>,
    pub recommendations: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub generated_at: OffsetDateTime,
}

fn report_recommendations(score: f64, failed_jobs: u64) -> Vec<String> {
    let mut recommendations = Vec::new();
    if score < 0.8 {
        recommendations.push("Increase replication factor".to_string());
        recommendations.push("Add more storage agents".to_string());
    }
    if score < 0.9 {
        recommendations.push("Enable more frequent verification".to_string());
        recommendations.push("Add geographic redundancy".to_string());
    }
    if failed_jobs > 0 {
        recommendations.push("Review failed replication jobs".to_string());
    }
    recommendations
}

/// Content-addressed storage with replication, quorum verification,
/// scored routing and a tiered cache.
pub struct Engine {
    config: AppConfig,
    metadata: Arc<dyn MetadataStore>,
    transport: Arc<dyn LocationTransport>,
    registry: Arc<LocationRegistry>,
    content: ContentStore,
    replication: Arc<ReplicationCoordinator>,
    verifier: Arc<IntegrityVerifier>,
    router: StorageRouter,
    cache: Arc<AdaptiveCache>,
    advertiser: Arc<AdvertisementPublisher>,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Engine {
    pub async fn new(ctx: EngineContext) -> EngineResult<Self> {
        let EngineContext {
            config,
            metadata,
            local,
            transport,
            signer,
            discovery,
        } = ctx;
        config.validate().map_err(EngineError::Config)?;
        metrics::register_metrics();

        let shutdown = CancellationToken::new();
        let registry = Arc::new(LocationRegistry::new(
            Arc::clone(&metadata),
            config.locations.clone(),
            config.verification.evidence_window,
        ));
        let replication = Arc::new(ReplicationCoordinator::new(
            Arc::clone(&metadata),
            Arc::clone(&transport),
            Arc::clone(&registry),
            config.replication.clone(),
            shutdown.child_token(),
        ));
        let verifier = Arc::new(IntegrityVerifier::new(
            Arc::clone(&metadata),
            Arc::clone(&transport),
            Arc::clone(&registry),
            config.verification.clone(),
        ));
        let router = StorageRouter::new(
            Arc::clone(&metadata),
            Arc::clone(&registry),
            config.routing.clone(),
        );
        let cache = Arc::new(
            AdaptiveCache::new(&config.cache)
                .await
                .map_err(|e| EngineError::IoFailure(format!("cache setup: {e}")))?,
        );
        let advertiser = Arc::new(AdvertisementPublisher::new(
            Arc::clone(&metadata),
            signer,
            discovery,
            config.advertisement.clone(),
        ));
        let content = ContentStore::new(
            local,
            Arc::clone(&metadata),
            Arc::clone(&registry),
            Arc::clone(&replication),
            Some(Arc::clone(&advertiser)),
        );

        Ok(Self {
            config,
            metadata,
            transport,
            registry,
            content,
            replication,
            verifier,
            router,
            cache,
            advertiser,
            shutdown,
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Check that the metadata store and the local content store answer.
    pub async fn health_check(&self) -> EngineResult<()> {
        self.metadata.health_check().await?;
        self.content.health_check().await
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn registry(&self) -> &LocationRegistry {
        &self.registry
    }

    pub fn cache(&self) -> &AdaptiveCache {
        &self.cache
    }

    /// Spawn the replication dispatcher and the periodic maintenance tasks.
    pub async fn start(&self) {
        let mut tasks = self.tasks.lock().await;
        if !tasks.is_empty() {
            tracing::debug!("engine already started");
            return;
        }
        tasks.push(Arc::clone(&self.replication).spawn_dispatcher());
        tasks.push(maintenance::spawn_cache_sweep(
            Arc::clone(&self.cache),
            self.config.cache.sweep_interval(),
            self.shutdown.child_token(),
        ));
        tasks.push(maintenance::spawn_advertisement_expiry(
            Arc::clone(&self.advertiser),
            Duration::from_secs(self.config.advertisement.expiry_sweep_interval_secs),
            self.shutdown.child_token(),
        ));
        tasks.push(maintenance::spawn_verification_pass(
            Arc::clone(&self.verifier),
            Duration::from_secs(self.config.verification.sweep_interval_secs),
            self.shutdown.child_token(),
        ));
        tracing::info!(tasks = tasks.len(), "engine started");
    }

    /// Stop background tasks and wait for them to finish.
    ///
    /// In-flight replication transfers are interrupted and their jobs put
    /// back to pending.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.content.flush_advertisements().await;
        let tasks: Vec<_> = self.tasks.lock().await.drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "background task ended abnormally");
            }
        }
        tracing::info!("engine stopped");
    }

    pub async fn store(&self, data: Bytes, request: StoreRequest) -> EngineResult<ContentRecord> {
        self.content.store(data, request).await
    }

    /// Wait for the background advertisements of earlier stores.
    pub async fn flush_advertisements(&self) {
        self.content.flush_advertisements().await
    }

    pub async fn content_record(&self, hash: &ContentAddress) -> EngineResult<Option<ContentRecord>> {
        self.content.record(hash).await
    }

    /// Serve `hash`: cache first, then the routed location with fall-through
    /// to every other ranked location.
    #[instrument(skip(self, hash, client, options), fields(hash = %hash))]
    pub async fn resolve(
        &self,
        hash: &ContentAddress,
        client: &ClientContext,
        options: &ResolveOptions,
    ) -> EngineResult<Resolution> {
        let started = Instant::now();
        if !self.content.contains(hash).await? {
            return Err(EngineError::ContentNotFound(hash.to_string()));
        }

        let integrity_verified = if options.verify {
            self.verifier.verify(hash).await?.consensus_achieved
        } else {
            false
        };

        if !options.bypass_cache
            && let Some(hit) = self.cache.get(hash).await
        {
            let resolution_time_ms = started.elapsed().as_millis() as u64;
            self.record_read(hash, client, None, resolution_time_ms, hit.bytes.len(), true)
                .await?;
            metrics::RESOLVE_DURATION.observe(started.elapsed().as_secs_f64());
            return Ok(Resolution {
                bytes: hit.bytes,
                content_hash: *hash,
                served_from: ServedFrom::Cache(hit.level),
                decision: None,
                integrity_verified,
                resolution_time_ms,
            });
        }

        let plan = self.router.plan(hash, client, &options.routing).await?;

        let mut served = None;
        for location in plan.candidates() {
            let fetch_started = Instant::now();
            match self.transport.fetch(&location, hash).await {
                Ok(bytes) => {
                    let actual = ContentAddress::compute(&bytes);
                    if actual == *hash {
                        served = Some((location.kind, bytes, fetch_started.elapsed().as_millis() as u64));
                        break;
                    }
                    tracing::warn!(location = %location.kind, actual = %actual, "location served corrupt bytes; trying next");
                }
                Err(e) => {
                    tracing::warn!(location = %location.kind, error = %e, "fetch failed; trying next");
                }
            }
        }
        let Some((kind, bytes, fetch_ms)) = served else {
            return Err(EngineError::NoLocationsAvailable(hash.to_string()));
        };

        let decision = plan.decision;
        if let Some(recommendation) = &decision.cache_recommendation
            && recommendation.should_cache
            && let Err(e) = self
                .cache
                .put(hash, bytes.clone(), &recommendation.metadata())
                .await
        {
            tracing::debug!(error = %e, "cache write-back skipped");
        }

        self.record_read(hash, client, Some(kind), fetch_ms, bytes.len(), false)
            .await?;
        if let Err(e) = self.registry.refresh_metrics(hash).await {
            tracing::debug!(error = %e, "failed to refresh location metrics after read");
        }

        metrics::RESOLVE_DURATION.observe(started.elapsed().as_secs_f64());
        Ok(Resolution {
            bytes,
            content_hash: *hash,
            served_from: ServedFrom::Location(kind),
            decision: Some(decision),
            integrity_verified,
            resolution_time_ms: started.elapsed().as_millis() as u64,
        })
    }

    async fn record_read(
        &self,
        hash: &ContentAddress,
        client: &ClientContext,
        location: Option<LocationKind>,
        response_time_ms: u64,
        bytes_served: usize,
        cache_hit: bool,
    ) -> EngineResult<()> {
        let now = OffsetDateTime::now_utc();
        let entry = AccessLogEntry {
            content_hash: *hash,
            client_id: client.client_id.clone(),
            location,
            response_time_ms,
            bytes_served: bytes_served as u64,
            cache_hit,
            accessed_at: now,
        };
        self.metadata
            .insert_access_log(&AccessLogRow::from(&entry))
            .await?;
        self.metadata
            .record_content_access(&hash.to_string(), now)
            .await?;
        Ok(())
    }

    pub async fn verify(&self, hash: &ContentAddress) -> EngineResult<IntegrityVerification> {
        self.verifier.verify(hash).await
    }

    pub async fn verify_with(
        &self,
        hash: &ContentAddress,
        verification_type: VerificationType,
    ) -> EngineResult<IntegrityVerification> {
        self.verifier.verify_with(hash, verification_type).await
    }

    /// One pass over content that is due for re-verification.
    pub async fn verify_due(&self) -> EngineResult<usize> {
        self.verifier.verify_due().await
    }

    pub async fn advertise(&self, hash: &ContentAddress) -> EngineResult<Advertisement> {
        self.advertiser.advertise(hash).await
    }

    pub async fn revoke_advertisement(&self, advertisement_id: Uuid) -> EngineResult<bool> {
        self.advertiser.revoke(advertisement_id).await
    }

    pub async fn active_advertisements(&self, hash: &ContentAddress) -> EngineResult<Vec<Advertisement>> {
        self.advertiser.active_for(hash).await
    }

    pub async fn expire_advertisements(&self) -> EngineResult<u64> {
        self.advertiser.expire_stale().await
    }

    pub async fn schedule_replication(
        &self,
        hash: &ContentAddress,
        source: LocationKind,
        target: LocationKind,
        priority: u8,
    ) -> EngineResult<ReplicationJob> {
        self.replication.schedule(hash, source, target, priority).await
    }

    pub async fn cancel_replication(&self, job_id: Uuid) -> EngineResult<bool> {
        self.replication.cancel(job_id).await
    }

    pub async fn replication_job(&self, job_id: Uuid) -> EngineResult<ReplicationJob> {
        self.replication.job(job_id).await
    }

    pub async fn replication_jobs(&self, hash: &ContentAddress) -> EngineResult<Vec<ReplicationJob>> {
        self.replication.jobs_for(hash).await
    }

    /// Drain eligible replication jobs in the calling task.
    pub async fn run_replication_once(&self) -> EngineResult<usize> {
        self.replication.run_once().await
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    /// Pick a location for `hash` without fetching it.
    pub async fn route(
        &self,
        hash: &ContentAddress,
        client: &ClientContext,
        options: &RoutingOptions,
    ) -> EngineResult<RoutingDecision> {
        self.router.select(hash, client, options).await
    }

    pub async fn routing_stats(&self) -> EngineResult<RoutingStats> {
        self.router.stats().await
    }

    pub async fn routing_decision(&self, decision_id: Uuid) -> EngineResult<Option<RoutingDecision>> {
        self.router.decision(decision_id).await
    }

    /// Attach the latency a client observed to a logged decision.
    pub async fn record_actual_latency(&self, decision_id: Uuid, latency_ms: u64) -> EngineResult<bool> {
        self.router.record_actual_latency(decision_id, latency_ms).await
    }

    pub async fn network_report(&self) -> EngineResult<NetworkReport> {
        let coverage = self.metadata.content_coverage().await?;
        let replication_jobs = self.replication.status_counts().await?;

        let network_integrity_score = if coverage.total_content == 0 {
            1.0
        } else {
            coverage.well_replicated as f64 / coverage.total_content as f64
        };
        let failed_jobs = replication_jobs
            .iter()
            .filter(|(status, _)| *status == JobStatus::Failed)
            .map(|(_, n)| *n)
            .sum();

        Ok(NetworkReport {
            total_content: coverage.total_content,
            well_replicated: coverage.well_replicated,
            network_integrity_score,
            recommendations: report_recommendations(network_integrity_score, failed_jobs),
            replication_jobs,
            generated_at: OffsetDateTime::now_utc(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn healthy_network_has_no_recommendations() {
        assert!(report_recommendations(1.0, 0).is_empty());
    }

    #[test]
    fn recommendations_follow_score_bands() {
        assert_eq!(
            report_recommendations(0.85, 0),
            vec!["Enable more frequent verification", "Add geographic redundancy"]
        );
        let low = report_recommendations(0.5, 2);
        assert_eq!(low.len(), 5);
        assert_eq!(low[0], "Increase replication factor");
        assert_eq!(low[4], "Review failed replication jobs");
    }
}
