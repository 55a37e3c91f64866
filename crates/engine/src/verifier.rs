//! Quorum integrity verification across every known copy.

use crate::error::{EngineError, EngineResult};
use crate::metrics;
use crate::registry::LocationRegistry;
use crate::transport::{LocationTransport, TransportError};
use futures::stream::{FuturesUnordered, StreamExt};
use hoard_core::config::VerificationConfig;
use hoard_core::verification::consensus;
use hoard_core::{
    ContentAddress, IntegrityVerification, LocationProbe, LocationRef, ProbeOutcome,
    VerificationCondition, VerificationRecord, VerificationType,
};
use hoard_metadata::MetadataStore;
use hoard_metadata::models::VerificationRow;
use hoard_metadata::repos::{ContentRepo, VerificationRepo};
use std::sync::Arc;
use std::time::Instant;
use time::OffsetDateTime;
use tokio::time::{timeout, timeout_at};
use tracing::instrument;
use uuid::Uuid;

/// Outcome of one location check, with the object size when it was read.
struct Checked {
    outcome: ProbeOutcome,
    content_size: Option<u64>,
}

impl Checked {
    fn new(outcome: ProbeOutcome) -> Self {
        Self {
            outcome,
            content_size: None,
        }
    }
}

fn transport_outcome(e: TransportError) -> ProbeOutcome {
    match e {
        TransportError::Unreachable { message, .. } => ProbeOutcome::Unreachable { message },
        TransportError::NotFound(key) => ProbeOutcome::Error {
            message: format!("not found: {key}"),
        },
        TransportError::Remote(message) => ProbeOutcome::Error { message },
    }
}

pub struct IntegrityVerifier {
    metadata: Arc<dyn MetadataStore>,
    transport: Arc<dyn LocationTransport>,
    registry: Arc<LocationRegistry>,
    config: VerificationConfig,
}

impl IntegrityVerifier {
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        transport: Arc<dyn LocationTransport>,
        registry: Arc<LocationRegistry>,
        config: VerificationConfig,
    ) -> Self {
        Self {
            metadata,
            transport,
            registry,
            config,
        }
    }

    pub async fn verify(&self, hash: &ContentAddress) -> EngineResult<IntegrityVerification> {
        self.verify_with(hash, self.config.default_type).await
    }

    /// Probe every registered location of `hash` and decide by quorum.
    ///
    /// Locations that cannot be reached, and locations still running when
    /// the overall deadline passes, are left out of the ratio. A location
    /// that answers wrongly, answers with an error or exceeds its own
    /// timeout counts against it.
    #[instrument(skip(self, hash), fields(hash = %hash, %verification_type))]
    pub async fn verify_with(
        &self,
        hash: &ContentAddress,
        verification_type: VerificationType,
    ) -> EngineResult<IntegrityVerification> {
        let key = hash.to_string();
        let content = self
            .metadata
            .get_content(&key)
            .await?
            .ok_or_else(|| EngineError::ContentNotFound(key.clone()))?;
        let expected_size = u64::try_from(content.size_bytes).unwrap_or_default();

        let locations = self.registry.locations_for(hash).await?;
        let started = Instant::now();
        let deadline = tokio::time::Instant::now() + self.config.overall_timeout();

        let mut pending: FuturesUnordered<_> = locations
            .iter()
            .map(|location| self.probe(location.location_ref(), hash, verification_type, expected_size))
            .collect();

        let mut results: Vec<(LocationProbe, Option<u64>)> = Vec::with_capacity(locations.len());
        let mut partial = false;
        loop {
            match timeout_at(deadline, pending.next()).await {
                Ok(Some(result)) => results.push(result),
                Ok(None) => break,
                Err(_) => {
                    partial = true;
                    break;
                }
            }
        }
        drop(pending);

        let elapsed_ms = started.elapsed().as_millis() as u64;
        for location in &locations {
            if !results.iter().any(|(probe, _)| probe.location == location.kind) {
                results.push((
                    LocationProbe {
                        location: location.kind,
                        url: location.url.clone(),
                        outcome: ProbeOutcome::NoResponse,
                        response_time_ms: elapsed_ms,
                    },
                    None,
                ));
            }
        }
        results.sort_by_key(|(probe, _)| probe.location);

        let verified_at = OffsetDateTime::now_utc();
        for (probe, content_size) in &results {
            let record = VerificationRecord {
                id: Uuid::new_v4(),
                content_hash: *hash,
                location: probe.location,
                verifier_id: self.config.verifier_id.clone(),
                verification_type,
                hash_match: probe.outcome.is_match(),
                response_time_ms: probe.response_time_ms,
                content_size: *content_size,
                error: probe.outcome.error_text(),
                verified_at,
            };
            self.metadata
                .insert_verification(&VerificationRow::from(&record))
                .await?;
        }

        let probes: Vec<LocationProbe> = results.into_iter().map(|(probe, _)| probe).collect();
        let responding = probes.iter().filter(|p| p.outcome.is_response()).count();
        let matching = probes.iter().filter(|p| p.outcome.is_match()).count();
        let threshold = self.config.consensus_threshold;

        let (agreement_ratio, consensus_achieved, condition) =
            match consensus(matching, responding, threshold) {
                Some((ratio, true)) => (ratio, true, VerificationCondition::ConsensusAchieved),
                Some((ratio, false)) => (ratio, false, VerificationCondition::ConsensusNotAchieved),
                None => (0.0, false, VerificationCondition::NoLocationsReachable),
            };

        self.metadata
            .add_verification_agent(&key, &self.config.verifier_id, verified_at)
            .await?;
        self.registry.refresh_metrics(hash).await?;

        let outcome = match condition {
            VerificationCondition::ConsensusAchieved => "achieved",
            VerificationCondition::ConsensusNotAchieved => "not_achieved",
            VerificationCondition::NoLocationsReachable => "unreachable",
        };
        metrics::VERIFICATION_RUNS.with_label_values(&[outcome]).inc();

        if consensus_achieved {
            tracing::info!(matching, responding, agreement_ratio, partial, "integrity verified");
        } else {
            tracing::warn!(matching, responding, agreement_ratio, partial, ?condition, "integrity consensus not reached");
        }

        Ok(IntegrityVerification {
            content_hash: *hash,
            verification_type,
            probes,
            matching_locations: matching,
            responding_locations: responding,
            agreement_ratio,
            consensus_threshold: threshold,
            consensus_achieved,
            condition,
            partial,
            verified_at,
        })
    }

    async fn probe(
        &self,
        location: LocationRef,
        hash: &ContentAddress,
        verification_type: VerificationType,
        expected_size: u64,
    ) -> (LocationProbe, Option<u64>) {
        let started = Instant::now();
        let checked = match timeout(
            self.config.per_location_timeout(),
            self.check(&location, hash, verification_type, expected_size),
        )
        .await
        {
            Ok(checked) => checked,
            Err(_) => Checked::new(ProbeOutcome::TimedOut),
        };
        let response_time_ms = started.elapsed().as_millis() as u64;

        if let Some(message) = checked.outcome.error_text() {
            tracing::debug!(location = %location.kind, error = %message, "probe did not match");
        }
        (
            LocationProbe {
                location: location.kind,
                url: location.url,
                outcome: checked.outcome,
                response_time_ms,
            },
            checked.content_size,
        )
    }

    async fn check(
        &self,
        location: &LocationRef,
        hash: &ContentAddress,
        verification_type: VerificationType,
        expected_size: u64,
    ) -> Checked {
        match verification_type {
            VerificationType::Hash => match self.transport.digest(location, hash).await {
                Ok(actual) if actual == *hash => Checked::new(ProbeOutcome::Match),
                Ok(actual) => Checked::new(ProbeOutcome::Mismatch {
                    actual: actual.to_string(),
                }),
                Err(e) => Checked::new(transport_outcome(e)),
            },
            VerificationType::Availability => match self.transport.exists(location, hash).await {
                Ok(true) => Checked::new(ProbeOutcome::Match),
                Ok(false) => Checked::new(ProbeOutcome::Error {
                    message: "object not present".to_string(),
                }),
                Err(e) => Checked::new(transport_outcome(e)),
            },
            VerificationType::Integrity | VerificationType::Full => {
                let data = match self.transport.fetch(location, hash).await {
                    Ok(data) => data,
                    Err(e) => return Checked::new(transport_outcome(e)),
                };
                let size = data.len() as u64;
                let actual = ContentAddress::compute(&data);
                let outcome = if actual != *hash {
                    ProbeOutcome::Mismatch {
                        actual: actual.to_string(),
                    }
                } else if verification_type == VerificationType::Full && size != expected_size {
                    ProbeOutcome::Error {
                        message: format!("size mismatch: expected {expected_size}, got {size}"),
                    }
                } else {
                    ProbeOutcome::Match
                };
                Checked {
                    outcome,
                    content_size: Some(size),
                }
            }
        }
    }

    /// Verify content that has not been verified within `reverify_after`.
    ///
    /// Returns the number of content items verified.
    pub async fn verify_due(&self) -> EngineResult<usize> {
        let cutoff = OffsetDateTime::now_utc() - self.config.reverify_after();
        let due = self
            .metadata
            .content_due_for_verification(cutoff, self.config.batch_size)
            .await?;

        let mut verified = 0;
        for key in due {
            let hash = ContentAddress::parse(&key)?;
            match self.verify(&hash).await {
                Ok(_) => verified += 1,
                Err(e) => tracing::warn!(hash = %hash, error = %e, "periodic verification failed"),
            }
        }
        if verified > 0 {
            tracing::info!(count = verified, "periodic verification pass finished");
        }
        Ok(verified)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportResult;
    use async_trait::async_trait;
    use bytes::Bytes;
    use hoard_core::config::LocationsConfig;
    use hoard_core::{ContentRecord, LocationKind, StorageTier};
    use hoard_metadata::SqliteStore;
    use hoard_metadata::models::ContentRow;
    use std::collections::HashMap;
    use std::time::Duration;

    #[derive(Clone)]
    enum Behaviour {
        Serve(Bytes),
        Missing,
        Unreachable,
        Hang,
    }

    struct ScriptedTransport {
        behaviour: HashMap<LocationKind, Behaviour>,
    }

    #[async_trait]
    impl LocationTransport for ScriptedTransport {
        async fn fetch(&self, location: &LocationRef, _hash: &ContentAddress) -> TransportResult<Bytes> {
            match self.behaviour.get(&location.kind).cloned() {
                Some(Behaviour::Serve(data)) => Ok(data),
                Some(Behaviour::Missing) | None => Err(TransportError::NotFound(location.url.clone())),
                Some(Behaviour::Unreachable) => Err(TransportError::Unreachable {
                    kind: location.kind,
                    message: "connection refused".to_string(),
                }),
                Some(Behaviour::Hang) => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Err(TransportError::Remote("hung".to_string()))
                }
            }
        }

        async fn put(
            &self,
            kind: LocationKind,
            _hash: &ContentAddress,
            _data: Bytes,
        ) -> TransportResult<LocationRef> {
            Err(TransportError::Unreachable {
                kind,
                message: "read only".to_string(),
            })
        }
    }

    const DATA: &[u8] = b"quorum content";

    async fn verifier(
        behaviour: Vec<(LocationKind, Behaviour)>,
        config: VerificationConfig,
    ) -> (IntegrityVerifier, Arc<SqliteStore>, ContentAddress, tempfile::TempDir) {
        let temp = tempfile::tempdir().unwrap();
        let store = Arc::new(SqliteStore::new(temp.path().join("m.db"), None).await.unwrap());
        let hash = ContentAddress::compute(DATA);
        let record = ContentRecord::new(hash, DATA.len() as u64, "text/plain", StorageTier::Hot);
        store
            .insert_content(&ContentRow::from_record(&record).unwrap())
            .await
            .unwrap();

        let registry = Arc::new(LocationRegistry::new(store.clone(), LocationsConfig::default(), 20));
        for (kind, _) in &behaviour {
            let location = LocationRef::new(*kind, registry.url_for(*kind, &hash));
            registry.register_location(&hash, &location).await.unwrap();
        }
        let transport = ScriptedTransport {
            behaviour: behaviour.into_iter().collect(),
        };
        let verifier = IntegrityVerifier::new(store.clone(), Arc::new(transport), registry, config);
        (verifier, store, hash, temp)
    }

    fn good() -> Behaviour {
        Behaviour::Serve(Bytes::from_static(DATA))
    }

    fn corrupt() -> Behaviour {
        Behaviour::Serve(Bytes::from_static(b"quorum c0ntent"))
    }

    #[tokio::test]
    async fn two_of_three_reaches_default_threshold() {
        let (verifier, store, hash, _temp) = verifier(
            vec![
                (LocationKind::Local, good()),
                (LocationKind::ObjectStore, good()),
                (LocationKind::Cdn, corrupt()),
            ],
            VerificationConfig::default(),
        )
        .await;

        let result = verifier.verify(&hash).await.unwrap();
        assert_eq!(result.responding_locations, 3);
        assert_eq!(result.matching_locations, 2);
        assert!(result.consensus_achieved);
        assert_eq!(result.condition, VerificationCondition::ConsensusAchieved);
        assert!(!result.partial);

        let evidence = store.verifications_for(&hash.to_string(), 10).await.unwrap();
        assert_eq!(evidence.len(), 3);
        let row = store.get_content(&hash.to_string()).await.unwrap().unwrap();
        assert!(row.agents().unwrap().contains("hoard-verifier"));
        assert!(row.last_verified_at.is_some());
    }

    #[tokio::test]
    async fn stricter_threshold_rejects_two_of_three() {
        let config = VerificationConfig {
            consensus_threshold: 0.67,
            ..VerificationConfig::default()
        };
        let (verifier, _store, hash, _temp) = verifier(
            vec![
                (LocationKind::Local, good()),
                (LocationKind::ObjectStore, good()),
                (LocationKind::Cdn, corrupt()),
            ],
            config,
        )
        .await;

        let result = verifier.verify(&hash).await.unwrap();
        assert!(!result.consensus_achieved);
        assert_eq!(result.condition, VerificationCondition::ConsensusNotAchieved);
    }

    #[tokio::test]
    async fn unreachable_locations_are_excluded() {
        let (verifier, _store, hash, _temp) = verifier(
            vec![
                (LocationKind::Local, good()),
                (LocationKind::Cdn, Behaviour::Unreachable),
            ],
            VerificationConfig::default(),
        )
        .await;

        let result = verifier.verify(&hash).await.unwrap();
        assert_eq!(result.responding_locations, 1);
        assert_eq!(result.agreement_ratio, 1.0);
        assert!(result.consensus_achieved);
    }

    #[tokio::test]
    async fn not_found_counts_against_consensus() {
        let (verifier, _store, hash, _temp) = verifier(
            vec![
                (LocationKind::Local, good()),
                (LocationKind::Cdn, Behaviour::Missing),
            ],
            VerificationConfig::default(),
        )
        .await;

        let result = verifier.verify(&hash).await.unwrap();
        assert_eq!(result.responding_locations, 2);
        assert_eq!(result.agreement_ratio, 0.5);
        assert!(!result.consensus_achieved);
    }

    #[tokio::test]
    async fn nothing_reachable_is_a_condition_not_an_error() {
        let (verifier, _store, hash, _temp) = verifier(
            vec![(LocationKind::Cdn, Behaviour::Unreachable)],
            VerificationConfig::default(),
        )
        .await;

        let result = verifier.verify(&hash).await.unwrap();
        assert_eq!(result.responding_locations, 0);
        assert!(!result.consensus_achieved);
        assert_eq!(result.condition, VerificationCondition::NoLocationsReachable);
    }

    #[tokio::test]
    async fn per_location_timeout_counts_as_non_matching() {
        let config = VerificationConfig {
            per_location_timeout_ms: 50,
            overall_timeout_ms: 5_000,
            ..VerificationConfig::default()
        };
        let (verifier, _store, hash, _temp) = verifier(
            vec![
                (LocationKind::Local, good()),
                (LocationKind::Cdn, Behaviour::Hang),
            ],
            config,
        )
        .await;

        let result = verifier.verify(&hash).await.unwrap();
        assert_eq!(result.responding_locations, 2);
        assert_eq!(result.matching_locations, 1);
        assert!(!result.partial);
        let cdn = result
            .probes
            .iter()
            .find(|p| p.location == LocationKind::Cdn)
            .unwrap();
        assert_eq!(cdn.outcome, ProbeOutcome::TimedOut);
    }

    #[tokio::test]
    async fn overall_deadline_drops_stragglers() {
        let config = VerificationConfig {
            per_location_timeout_ms: 60_000,
            overall_timeout_ms: 100,
            ..VerificationConfig::default()
        };
        let (verifier, _store, hash, _temp) = verifier(
            vec![
                (LocationKind::Local, good()),
                (LocationKind::Cdn, Behaviour::Hang),
            ],
            config,
        )
        .await;

        let result = verifier.verify(&hash).await.unwrap();
        assert!(result.partial);
        assert_eq!(result.responding_locations, 1);
        assert!(result.consensus_achieved);
        assert_eq!(result.probes.len(), 2);
        let cdn = result
            .probes
            .iter()
            .find(|p| p.location == LocationKind::Cdn)
            .unwrap();
        assert_eq!(cdn.outcome, ProbeOutcome::NoResponse);
    }

    #[tokio::test]
    async fn verification_types_check_different_things() {
        let (verifier, _store, hash, _temp) = verifier(
            vec![
                (LocationKind::Local, good()),
                (LocationKind::Cdn, corrupt()),
            ],
            VerificationConfig::default(),
        )
        .await;

        // Presence only: the corrupt copy still counts.
        let availability = verifier
            .verify_with(&hash, VerificationType::Availability)
            .await
            .unwrap();
        assert_eq!(availability.matching_locations, 2);

        for verification_type in [VerificationType::Hash, VerificationType::Full] {
            let result = verifier.verify_with(&hash, verification_type).await.unwrap();
            assert_eq!(result.matching_locations, 1);
            assert_eq!(result.verification_type, verification_type);
        }
    }

    #[tokio::test]
    async fn verify_due_picks_unverified_content() {
        let (verifier, _store, hash, _temp) = verifier(
            vec![(LocationKind::Local, good())],
            VerificationConfig::default(),
        )
        .await;

        assert_eq!(verifier.verify_due().await.unwrap(), 1);
        // Just verified, so nothing is due.
        assert_eq!(verifier.verify_due().await.unwrap(), 0);
        assert!(verifier.verify(&hash).await.unwrap().consensus_achieved);
    }
}
