//! The reconciliation core: diffing, report filtering and album aggregation.

pub mod albums;
pub mod diff;
pub mod filter;
