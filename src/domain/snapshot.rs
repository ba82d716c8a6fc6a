use std::fmt::Display;

use serde::{Deserialize, Serialize};

use super::track::Track;

/// Which source collection a run reconciles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncMode {
    /// liked songs mirrored onto starred songs
    Favorites,
    /// one source playlist projected onto a target playlist of the same name
    Playlist { id: String },
}

impl SyncMode {
    pub fn is_playlist(&self) -> bool {
        matches!(self, SyncMode::Playlist { .. })
    }
}

impl Display for SyncMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncMode::Favorites => write!(f, "favorites"),
            SyncMode::Playlist { id } => write!(f, "playlist({id})"),
        }
    }
}

/// Normalized, ordered capture of a source collection at fetch time.
///
/// Never mutated in place; a refetch replaces it.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub tracks: Vec<Track>,
    /// total reported by the provider when the snapshot was taken
    pub total_count: usize,
    pub mode: SyncMode,
    /// display name of the collection ("Liked Songs" or the playlist name)
    pub name: String,
}

impl Snapshot {
    pub fn is_fresh(&self) -> bool {
        self.tracks.len() == self.total_count
    }
}

pub const FAVORITES_NAME: &str = "Liked Songs";
