//! On-disk copy of the last liked-songs snapshot.
//!
//! Only favorites are cached. A playlist is always fetched fresh.

use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::{
    domain::{
        snapshot::{FAVORITES_NAME, Snapshot, SyncMode},
        track::Track,
    },
    storage::error::StorageError,
};

pub struct SnapshotCache {
    path: PathBuf,
}

impl SnapshotCache {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Returns the cached snapshot only when it can stand in for a live fetch.
    ///
    /// Any unreadable, unparsable, empty, outdated-schema or wrong-length
    /// cache is a miss, never an error.
    pub fn load(&self, mode: &SyncMode, live_total_count: usize, force: bool) -> Option<Snapshot> {
        if force {
            info!("Forced refetch, ignoring snapshot cache");
            return None;
        }
        if mode.is_playlist() {
            return None;
        }

        let contents = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) => {
                debug!("No snapshot cache at {}: {e}", self.path.to_string_lossy());
                return None;
            }
        };

        // records lacking the current schema fields fail to deserialize
        let tracks: Vec<Track> = match serde_json::from_str(&contents) {
            Ok(tracks) => tracks,
            Err(e) => {
                info!("Snapshot cache is unreadable or outdated, refetching: {e}");
                return None;
            }
        };

        if tracks.is_empty() {
            debug!("Snapshot cache is empty");
            return None;
        }

        if tracks.len() != live_total_count {
            info!(
                "Snapshot cache is stale ({} cached, {} live), refetching",
                tracks.len(),
                live_total_count
            );
            return None;
        }

        info!("Using cached snapshot of {} liked songs", tracks.len());
        Some(Snapshot {
            tracks,
            total_count: live_total_count,
            mode: SyncMode::Favorites,
            name: FAVORITES_NAME.to_string(),
        })
    }

    /// Overwrites the cache with a freshly fetched favorites snapshot.
    pub fn save(&self, snapshot: &Snapshot) -> Result<(), StorageError> {
        if snapshot.mode.is_playlist() {
            debug!("Playlist snapshots are not cached");
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(&snapshot.tracks)?)?;
        Ok(())
    }
}
