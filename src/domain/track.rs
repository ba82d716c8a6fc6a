use std::fmt::Display;

use serde::{Deserialize, Serialize};

pub const SINGLE_ALBUM_TYPE: &str = "single";

fn default_album_type() -> String {
    "album".to_string()
}

/// Represent a music track, either from the source library or from the target server.
///
/// The field names are part of the on-disk snapshot cache format.
/// `genre` and `album_url` have no serde default: a cached record without them
/// belongs to an older schema and must not deserialize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    #[serde(default)]
    pub id: Option<String>,
    pub title: String,
    pub artist: String,
    pub album: String,
    #[serde(default = "default_album_type")]
    pub album_type: String,
    pub album_url: String,
    /// comma-joined genres of the primary artist, possibly empty
    pub genre: String,
    #[serde(default)]
    pub added_at: String,
}

impl Track {
    pub fn key(&self) -> CanonicalKey {
        CanonicalKey::new(&self.artist, &self.title)
    }

    /// query sent to the target's search index
    pub fn search_query(&self) -> String {
        format!("{} {}", self.artist, self.title)
    }
}

/// `lowercase(artist) || lowercase(title)`
///
/// Only letter case is folded. Whitespace and punctuation are compared as-is.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CanonicalKey(String);

impl CanonicalKey {
    pub fn new(artist: &str, title: &str) -> Self {
        Self(format!("{}||{}", artist.to_lowercase(), title.to_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for CanonicalKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A track as seen by the target server, with its favorite flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSong {
    pub track: Track,
    pub starred: bool,
}

#[cfg(test)]
pub fn mock_track(artist: &str, title: &str) -> Track {
    Track {
        id: None,
        title: title.to_string(),
        artist: artist.to_string(),
        album: format!("{title} album"),
        album_type: "album".to_string(),
        album_url: String::new(),
        genre: String::new(),
        added_at: "2024-01-01T00:00:00Z".to_string(),
    }
}
