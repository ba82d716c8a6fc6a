use crate::cli::run;

pub mod apply;
pub mod cli;
pub mod config;
pub mod domain;
pub mod http;
pub mod normalize;
pub mod operations;
pub mod providers;
pub mod reconcile;
pub mod storage;

fn main() -> anyhow::Result<()> {
    run()
}
