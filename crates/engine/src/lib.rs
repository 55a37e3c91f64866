//! The hoard storage engine.
//!
//! - [`content::ContentStore`]: hashes and persists bytes, then schedules
//!   replication and advertising
//! - [`registry::LocationRegistry`]: which locations hold a copy, with metrics
//!   derived from evidence
//! - [`replication::ReplicationCoordinator`]: durable copy jobs on a bounded
//!   worker pool
//! - [`verifier::IntegrityVerifier`]: quorum verification across locations
//! - [`router::StorageRouter`]: weighted location scoring for reads
//! - [`cache::AdaptiveCache`]: tiered cache in front of the router
//! - [`advertiser::AdvertisementPublisher`]: signed storage advertisements
//!
//! [`Engine`] wires these together and owns the background tasks.

pub mod advertiser;
pub mod cache;
pub mod content;
pub mod discovery;
pub mod engine;
pub mod error;
mod maintenance;
pub mod metrics;
pub mod registry;
pub mod replication;
pub mod router;
pub mod transport;
pub mod verifier;

pub use cache::{AdaptiveCache, CacheError, CacheHit};
pub use content::StoreRequest;
pub use discovery::{DiscoverySink, LogSink, NullSink, WebhookSink};
pub use engine::{Engine, EngineContext, NetworkReport, Resolution, ResolveOptions, ServedFrom};
pub use error::{EngineError, EngineResult};
pub use transport::{LocationTransport, ObjectStoreTransport, TransportError, TransportResult};
