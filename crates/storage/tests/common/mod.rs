pub mod fixtures;

#[allow(unused_imports)]
pub use fixtures::{content_key, seeded_bytes};
