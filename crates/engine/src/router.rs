//! Choosing which location serves a read.

use crate::cache;
use crate::error::{EngineError, EngineResult};
use crate::metrics;
use crate::registry::LocationRegistry;
use hoard_core::config::{RoutingConfig, RoutingWeights};
use hoard_core::{
    ClientContext, ContentAddress, LocationKind, LocationRef, RoutingDecision, RoutingOptions,
    RoutingStats, StorageLocation,
};
use hoard_metadata::MetadataStore;
use hoard_metadata::models::RoutingDecisionRow;
use hoard_metadata::repos::{ContentRepo, RoutingRepo};
use std::cmp::Ordering;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::instrument;
use uuid::Uuid;

/// Number of runner-up locations kept on a decision.
const ALTERNATIVES: usize = 2;

const BYTES_PER_GB: f64 = 1_000_000_000.0;

/// Weighted contribution of each scoring term.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScoreBreakdown {
    pub latency: f64,
    pub availability: f64,
    pub geographic: f64,
    pub cost: f64,
    pub bandwidth: f64,
}

impl ScoreBreakdown {
    pub fn compute(
        location: &StorageLocation,
        weights: &RoutingWeights,
        max_latency_ms: u64,
        geographic_preference: &[String],
    ) -> Self {
        let max_latency = max_latency_ms.max(1) as f64;
        let latency = ((max_latency - location.latency_ms as f64) / max_latency).max(0.0);
        let geographic = if location.serves_any_region(geographic_preference) {
            1.0
        } else {
            0.0
        };
        let cost = ((100.0 - location.cost_per_gb_satoshis as f64) / 100.0).clamp(0.0, 1.0);
        let bandwidth = (location.bandwidth_mbps as f64 / 100.0).min(1.0);

        Self {
            latency: weights.latency * latency,
            availability: weights.availability * location.availability.clamp(0.0, 1.0),
            geographic: weights.geographic * geographic,
            cost: weights.cost * cost,
            bandwidth: weights.bandwidth * bandwidth,
        }
    }

    pub fn total(&self) -> f64 {
        self.latency + self.availability + self.geographic + self.cost + self.bandwidth
    }

    fn terms(&self, weights: &RoutingWeights) -> [(&'static str, f64, f64); 5] {
        [
            ("low-latency", self.latency, weights.latency),
            ("high-availability", self.availability, weights.availability),
            ("geographic-match", self.geographic, weights.geographic),
            ("low-cost", self.cost, weights.cost),
            ("high-bandwidth", self.bandwidth, weights.bandwidth),
        ]
    }

    /// Terms that earned at least half their weight, or the single largest
    /// term when none did.
    pub fn dominant_terms(&self, weights: &RoutingWeights) -> Vec<String> {
        let terms = self.terms(weights);
        let strong: Vec<String> = terms
            .iter()
            .filter(|(_, value, weight)| *weight > 0.0 && *value >= weight * 0.5)
            .map(|(name, _, _)| name.to_string())
            .collect();
        if !strong.is_empty() {
            return strong;
        }
        terms
            .iter()
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(name, _, _)| vec![name.to_string()])
            .unwrap_or_default()
    }
}

/// A candidate with its score.
#[derive(Clone, Debug)]
pub struct RankedLocation {
    pub location: StorageLocation,
    pub score: ScoreBreakdown,
}

fn compare_ranked(a: &RankedLocation, b: &RankedLocation) -> Ordering {
    b.score
        .total()
        .total_cmp(&a.score.total())
        .then_with(|| a.location.latency_ms.cmp(&b.location.latency_ms))
        .then_with(|| a.location.url.cmp(&b.location.url))
}

/// A decision plus every other candidate, best first.
///
/// The decision only records the top runners-up; a read falls through the
/// whole list.
#[derive(Clone, Debug)]
pub struct RoutePlan {
    pub decision: RoutingDecision,
    pub fallbacks: Vec<LocationRef>,
}

impl RoutePlan {
    /// The selected location followed by the fallbacks.
    pub fn candidates(&self) -> impl Iterator<Item = LocationRef> + '_ {
        std::iter::once(self.decision.selected.location_ref())
            .chain(self.fallbacks.iter().cloned())
    }
}

/// Scores candidate locations and logs the decisions it makes.
pub struct StorageRouter {
    metadata: Arc<dyn MetadataStore>,
    registry: Arc<LocationRegistry>,
    config: RoutingConfig,
}

impl StorageRouter {
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        registry: Arc<LocationRegistry>,
        config: RoutingConfig,
    ) -> Self {
        Self {
            metadata,
            registry,
            config,
        }
    }

    /// Latency ceiling used by the latency term.
    pub fn max_latency_ms(&self, client: &ClientContext, options: &RoutingOptions) -> u64 {
        options
            .max_latency_ms
            .or(client.latency_tolerance_ms)
            .unwrap_or(self.config.default_max_latency_ms)
    }

    /// Candidates ordered best first. Pure: no I/O and no randomness.
    pub fn rank(
        &self,
        candidates: &[StorageLocation],
        client: &ClientContext,
        options: &RoutingOptions,
    ) -> Vec<RankedLocation> {
        let max_latency = self.max_latency_ms(client, options);
        let mut ranked: Vec<RankedLocation> = candidates
            .iter()
            .map(|location| RankedLocation {
                score: ScoreBreakdown::compute(
                    location,
                    &self.config.weights,
                    max_latency,
                    &options.geographic_preference,
                ),
                location: location.clone(),
            })
            .collect();
        ranked.sort_by(compare_ranked);
        ranked
    }

    /// Pick the location that should serve `hash` for `client`.
    pub async fn select(
        &self,
        hash: &ContentAddress,
        client: &ClientContext,
        options: &RoutingOptions,
    ) -> EngineResult<RoutingDecision> {
        Ok(self.plan(hash, client, options).await?.decision)
    }

    /// Like [`select`](Self::select), keeping the full ranking for fall-through.
    #[instrument(skip(self, client, options), fields(hash = %hash))]
    pub async fn plan(
        &self,
        hash: &ContentAddress,
        client: &ClientContext,
        options: &RoutingOptions,
    ) -> EngineResult<RoutePlan> {
        let content = self
            .metadata
            .get_content(&hash.to_string())
            .await?
            .ok_or_else(|| EngineError::ContentNotFound(hash.to_string()))?;

        let candidates = self.registry.locations_for(hash).await?;
        let mut ranked = self.rank(&candidates, client, options);
        if ranked.is_empty() {
            return Err(EngineError::NoLocationsAvailable(hash.to_string()));
        }

        let preferred = options
            .preferred_method
            .kind()
            .and_then(|kind| ranked.iter().position(|r| r.location.kind == kind));
        let (selected, mut routing_reason) = match preferred {
            Some(index) => (ranked.remove(index), vec!["user-preference".to_string()]),
            None => {
                let best = ranked.remove(0);
                let reasons = best.score.dominant_terms(&self.config.weights);
                (best, reasons)
            }
        };
        if client.network_type.is_mobile() {
            routing_reason.push("mobile-client".to_string());
        }

        let estimated_latency_ms =
            (selected.location.latency_ms as f64 * client.network_type.latency_multiplier()).round()
                as u64;
        let estimated_cost_satoshis = selected.location.cost_per_gb_satoshis as f64
            * content.size_bytes.max(0) as f64
            / BYTES_PER_GB;
        let cache_recommendation = Some(cache::recommend(
            &content.access_statistics(),
            selected.location.latency_ms,
            client,
        ));

        let fallbacks: Vec<LocationRef> = ranked.iter().map(|r| r.location.location_ref()).collect();
        let decision = RoutingDecision {
            decision_id: Uuid::new_v4(),
            content_hash: *hash,
            client_id: client.client_id.clone(),
            routing_score: selected.score.total(),
            routing_reason,
            estimated_latency_ms,
            estimated_cost_satoshis,
            alternatives: fallbacks.iter().take(ALTERNATIVES).cloned().collect(),
            cache_recommendation,
            actual_latency_ms: None,
            decided_at: OffsetDateTime::now_utc(),
            selected: selected.location,
        };

        if self.config.log_decisions {
            self.metadata
                .insert_decision(&RoutingDecisionRow::from_decision(&decision)?)
                .await?;
        }
        metrics::ROUTING_DECISIONS
            .with_label_values(&[decision.selected.kind.as_str()])
            .inc();
        tracing::debug!(
            decision_id = %decision.decision_id,
            location = %decision.selected.kind,
            score = decision.routing_score,
            reasons = ?decision.routing_reason,
            "routing decision"
        );
        Ok(RoutePlan {
            decision,
            fallbacks,
        })
    }

    /// Attach the observed latency to a logged decision. Only the first
    /// report is kept.
    pub async fn record_actual_latency(&self, decision_id: Uuid, latency_ms: u64) -> EngineResult<bool> {
        let latency = i64::try_from(latency_ms).unwrap_or(i64::MAX);
        Ok(self.metadata.set_actual_latency(decision_id, latency).await?)
    }

    pub async fn decision(&self, decision_id: Uuid) -> EngineResult<Option<RoutingDecision>> {
        let row = self.metadata.get_decision(decision_id).await?;
        Ok(row.map(RoutingDecision::try_from).transpose()?)
    }

    pub async fn stats(&self) -> EngineResult<RoutingStats> {
        let aggregate = self.metadata.routing_aggregate().await?;
        let by_location = aggregate
            .by_location
            .into_iter()
            .filter_map(|(kind, n)| match kind.parse::<LocationKind>() {
                Ok(kind) => Some((kind, n)),
                Err(e) => {
                    tracing::warn!(kind = %kind, error = %e, "skipping unknown location kind in routing stats");
                    None
                }
            })
            .collect();
        Ok(RoutingStats {
            total_decisions: aggregate.total_decisions,
            by_location,
            mean_routing_score: aggregate.mean_routing_score,
            mean_estimated_latency_ms: aggregate.mean_estimated_latency_ms,
            mean_actual_latency_ms: aggregate.mean_actual_latency_ms,
        })
    }
}
