//! Everything persisted between runs: caches, reports and staged plans.

pub mod art_cache;
pub mod db;
pub mod error;
pub mod plans;
pub mod reports;
pub(crate) mod schema;
pub mod snapshot_cache;
