//! Content, location, evidence and advertisement repos against SQLite.

mod common;

use common::{open_store, seed_content};
use hoard_core::{
    Advertisement, ContentAddress, ContentRecord, LocationKind, StorageCapability,
    StorageLocation, StorageTier, VerificationRecord, VerificationType,
};
use hoard_metadata::models::{AdvertisementRow, ContentRow, LocationRow, VerificationRow};
use hoard_metadata::repos::{AdvertisementRepo, ContentRepo, LocationRepo, VerificationRepo};
use std::collections::BTreeSet;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

fn location(kind: LocationKind, url: &str) -> StorageLocation {
    StorageLocation {
        kind,
        url: url.to_string(),
        availability: 0.95,
        latency_ms: 100,
        bandwidth_mbps: 100,
        cost_per_gb_satoshis: 10,
        geographic_regions: BTreeSet::from(["US".to_string()]),
        verified_at: None,
    }
}

#[tokio::test]
async fn test_content_insert_is_idempotent() {
    let (store, _dir) = open_store().await;
    let hash = ContentAddress::compute(b"twice");
    let record = ContentRecord::new(hash, 5, "text/plain", StorageTier::Hot);
    let row = ContentRow::from_record(&record).unwrap();

    assert!(store.insert_content(&row).await.unwrap());
    assert!(!store.insert_content(&row).await.unwrap());

    let updated = store
        .record_content_update(&hash.to_string(), OffsetDateTime::now_utc())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.update_count, 1);
    assert_eq!(updated.size_bytes, 5);
}

#[tokio::test]
async fn test_access_statistics_accumulate() {
    let (store, _dir) = open_store().await;
    let hash = seed_content(&store, b"popular").await;
    let now = OffsetDateTime::now_utc();

    for _ in 0..4 {
        store
            .record_content_access(&hash.to_string(), now)
            .await
            .unwrap();
    }
    let row = store.get_content(&hash.to_string()).await.unwrap().unwrap();
    let stats = row.access_statistics();
    assert_eq!(stats.access_count, 4);
    // Window floors at one hour.
    assert!((stats.access_frequency_per_hour - 4.0).abs() < 1e-9);
    assert!(stats.last_accessed_at.is_some());

    assert!(
        store
            .record_content_access("sha256:missing", now)
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_location_registration_is_idempotent_per_kind() {
    let (store, _dir) = open_store().await;
    let hash = seed_content(&store, b"located").await;
    let now = OffsetDateTime::now_utc();

    let first = LocationRow::from_location(&hash, &location(LocationKind::Cdn, "https://a"), now)
        .unwrap();
    let second = LocationRow::from_location(&hash, &location(LocationKind::Cdn, "https://b"), now)
        .unwrap();
    assert!(store.register_location(&first).await.unwrap());
    assert!(!store.register_location(&second).await.unwrap());

    let rows = store.locations_for(&hash.to_string()).await.unwrap();
    assert_eq!(rows.len(), 1);
    let loc = StorageLocation::try_from(rows[0].clone()).unwrap();
    assert_eq!(loc.url, "https://a");
    assert!(loc.geographic_regions.contains("US"));

    assert!(store.remove_location(&hash.to_string(), "cdn").await.unwrap());
    assert!(!store.remove_location(&hash.to_string(), "cdn").await.unwrap());
}

#[tokio::test]
async fn test_location_metrics_update_clamps_availability() {
    let (store, _dir) = open_store().await;
    let hash = seed_content(&store, b"metrics").await;
    let now = OffsetDateTime::now_utc();
    let row = LocationRow::from_location(
        &hash,
        &location(LocationKind::ObjectStore, "s3://bucket/x"),
        now,
    )
    .unwrap();
    store.register_location(&row).await.unwrap();

    store
        .update_location_metrics(&hash.to_string(), "object-store", 1.7, 42, Some(now))
        .await
        .unwrap();
    let row = store
        .get_location(&hash.to_string(), "object-store")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.availability, 1.0);
    assert_eq!(row.latency_ms, 42);
    assert!(row.verified_at.is_some());
}

#[tokio::test]
async fn test_coverage_counts_well_replicated_content() {
    let (store, _dir) = open_store().await;
    let now = OffsetDateTime::now_utc();
    let single = seed_content(&store, b"single").await;
    let double = seed_content(&store, b"double").await;

    for (hash, kinds) in [
        (single, vec![LocationKind::Local]),
        (double, vec![LocationKind::Local, LocationKind::Cdn]),
    ] {
        for kind in kinds {
            let row = LocationRow::from_location(&hash, &location(kind, "u"), now).unwrap();
            store.register_location(&row).await.unwrap();
        }
    }

    let coverage = store.content_coverage().await.unwrap();
    assert_eq!(coverage.total_content, 2);
    assert_eq!(coverage.well_replicated, 1);
}

#[tokio::test]
async fn test_verification_agents_and_due_list() {
    let (store, _dir) = open_store().await;
    let fresh = seed_content(&store, b"fresh").await;
    let stale = seed_content(&store, b"stale").await;
    let now = OffsetDateTime::now_utc();

    store
        .add_verification_agent(&fresh.to_string(), "verifier-a", now)
        .await
        .unwrap();
    store
        .add_verification_agent(&fresh.to_string(), "verifier-a", now)
        .await
        .unwrap();
    store
        .add_verification_agent(&stale.to_string(), "verifier-b", now - Duration::days(2))
        .await
        .unwrap();

    let row = store.get_content(&fresh.to_string()).await.unwrap().unwrap();
    assert_eq!(row.agents().unwrap().len(), 1);

    let due = store
        .content_due_for_verification(now - Duration::hours(6), 10)
        .await
        .unwrap();
    assert_eq!(due, vec![stale.to_string()]);
}

#[tokio::test]
async fn test_recent_verifications_are_newest_first_and_windowed() {
    let (store, _dir) = open_store().await;
    let hash = seed_content(&store, b"evidence").await;

    for i in 0..5u64 {
        let record = VerificationRecord {
            id: Uuid::new_v4(),
            content_hash: hash,
            location: LocationKind::Cdn,
            verifier_id: "v".to_string(),
            verification_type: VerificationType::Integrity,
            hash_match: i % 2 == 0,
            response_time_ms: i,
            content_size: Some(8),
            error: None,
            verified_at: OffsetDateTime::now_utc(),
        };
        store
            .insert_verification(&VerificationRow::from(&record))
            .await
            .unwrap();
    }

    let recent = store
        .recent_verifications(&hash.to_string(), "cdn", 3)
        .await
        .unwrap();
    let times: Vec<i64> = recent.iter().map(|r| r.response_time_ms).collect();
    assert_eq!(times, vec![4, 3, 2]);

    let back = VerificationRecord::try_from(recent[0].clone()).unwrap();
    assert!(back.hash_match);
    assert_eq!(back.content_size, Some(8));
}

fn advertisement(hash: ContentAddress, published_at: OffsetDateTime) -> Advertisement {
    Advertisement::new(
        hash,
        "provider.example",
        StorageCapability {
            max_file_size: 1 << 30,
            supported_mime_types: vec!["*/*".to_string()],
            availability_guarantee: 0.99,
            bandwidth_mbps: 100,
            cost_per_gb_satoshis: 10,
            features: BTreeSet::from(["uhrp".to_string()]),
        },
        vec!["https://provider.example/overlay/data".to_string()],
        BTreeSet::from(["US".to_string()]),
        24,
        published_at,
    )
}

#[tokio::test]
async fn test_advertisement_lifecycle() {
    let (store, _dir) = open_store().await;
    let hash = seed_content(&store, b"advertised").await;
    let now = OffsetDateTime::now_utc();

    let live = advertisement(hash, now);
    let stale = advertisement(hash, now - Duration::hours(48));
    for ad in [&live, &stale] {
        store
            .insert_advertisement(&AdvertisementRow::from_advertisement(ad).unwrap())
            .await
            .unwrap();
    }

    let active = store
        .active_advertisements(&hash.to_string(), now)
        .await
        .unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].advertisement_id, live.advertisement_id);

    assert_eq!(store.expire_advertisements(now).await.unwrap(), 1);
    assert_eq!(store.expire_advertisements(now).await.unwrap(), 0);

    assert!(
        store
            .deactivate_advertisement(live.advertisement_id)
            .await
            .unwrap()
    );
    assert!(
        !store
            .deactivate_advertisement(live.advertisement_id)
            .await
            .unwrap()
    );

    let row = store
        .get_advertisement(live.advertisement_id)
        .await
        .unwrap()
        .unwrap();
    let restored = Advertisement::try_from(row).unwrap();
    assert!(!restored.active);
    assert_eq!(restored.capability.features.len(), 1);
}
