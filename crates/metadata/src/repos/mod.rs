//! Repository traits for metadata operations.

pub mod advertisements;
pub mod content;
pub mod locations;
pub mod replication;
pub mod routing;
pub mod verification;

pub use advertisements::AdvertisementRepo;
pub use content::ContentRepo;
pub use locations::LocationRepo;
pub use replication::ReplicationRepo;
pub use routing::RoutingRepo;
pub use verification::VerificationRepo;
