use std::path::Path;

use anyhow::anyhow;
use chrono::{DateTime, Local, Utc};
use rusqlite::Connection;

use crate::{
    config::Database,
    storage::{error::StorageError, schema},
};

pub type SecondsSinceUnix = i64;

fn open_in_memory() -> Result<rusqlite::Connection, rusqlite::Error> {
    Connection::open_in_memory()
}

fn open_from_file(path: &Path) -> Result<rusqlite::Connection, StorageError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(Connection::open(path)?)
}

/// Opens the plan database. Without an explicit path it lives at `default_path`.
pub fn open(config: &Database, default_path: &Path) -> Result<rusqlite::Connection, StorageError> {
    let db = if config.in_memory {
        open_in_memory()?
    } else {
        open_from_file(config.path.as_deref().unwrap_or(default_path))?
    };
    schema::init(&db)?;
    Ok(db)
}

pub fn now_seconds() -> SecondsSinceUnix {
    Utc::now().timestamp()
}

/// converts number of seconds since unix epoch to local date time
pub fn i64_seconds_to_local_time(since_unix: i64) -> anyhow::Result<DateTime<Local>> {
    let datetime = DateTime::from_timestamp(since_unix, 0).ok_or(anyhow!(
        "failed to convert {since_unix} s timestamp to datetime"
    ))?;

    Ok(DateTime::from(datetime))
}
