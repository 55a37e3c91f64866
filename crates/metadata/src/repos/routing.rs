//! Routing decision and access log repository.

use crate::error::MetadataResult;
use crate::models::{AccessLogRow, RoutingAggregate, RoutingDecisionRow};
use async_trait::async_trait;
use uuid::Uuid;

#[async_trait]
pub trait RoutingRepo: Send + Sync {
    /// Log an immutable routing decision.
    async fn insert_decision(&self, row: &RoutingDecisionRow) -> MetadataResult<()>;

    async fn get_decision(&self, decision_id: Uuid) -> MetadataResult<Option<RoutingDecisionRow>>;

    /// Fill in the observed latency. Only the first report is kept; returns
    /// `false` if the decision is unknown or already has one.
    async fn set_actual_latency(&self, decision_id: Uuid, latency_ms: i64) -> MetadataResult<bool>;

    /// Aggregates over all logged decisions.
    async fn routing_aggregate(&self) -> MetadataResult<RoutingAggregate>;

    /// Append one access log entry.
    async fn insert_access_log(&self, row: &AccessLogRow) -> MetadataResult<()>;

    /// Mean response time of the newest `window` reads served from a location.
    async fn mean_response_time(
        &self,
        content_hash: &str,
        location: &str,
        window: u32,
    ) -> MetadataResult<Option<f64>>;

    /// The newest `limit` access log entries for a hash, newest first.
    async fn access_logs_for(
        &self,
        content_hash: &str,
        limit: u32,
    ) -> MetadataResult<Vec<AccessLogRow>>;
}
