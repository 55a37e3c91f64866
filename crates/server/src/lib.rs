//! The hoard daemon.
//!
//! - Configuration loading and engine assembly
//! - The operational HTTP endpoint (`/health`, `/metrics`)

pub mod bootstrap;
pub mod error;
pub mod metrics;
pub mod routes;
pub mod state;

pub use bootstrap::{build_engine, load_config};
pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
