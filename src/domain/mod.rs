pub mod plan;
pub mod snapshot;
pub mod track;
