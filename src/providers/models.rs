//! Raw records as returned by the source library, before normalization.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ExternalUrls {
    #[serde(default)]
    pub spotify: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawArtist {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawAlbum {
    pub name: String,
    #[serde(default)]
    pub album_type: Option<String>,
    #[serde(default)]
    pub external_urls: ExternalUrls,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawTrack {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub album: Option<RawAlbum>,
    #[serde(default)]
    pub artists: Vec<RawArtist>,
}

/// One entry of a saved-tracks or playlist page.
///
/// `track` is null for entries the provider marks unavailable.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawSavedItem {
    #[serde(default)]
    pub added_at: Option<String>,
    #[serde(default)]
    pub track: Option<RawTrack>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SavedTracksPage {
    pub items: Vec<RawSavedItem>,
    pub total: usize,
}

#[derive(Debug, Clone)]
pub struct PlaylistInfo {
    pub name: String,
    pub total: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawArtistDetails {
    pub id: String,
    #[serde(default)]
    pub genres: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawImage {
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct RawAlbumDetails {
    /// canonical album url, the art cache key
    pub url: String,
    pub images: Vec<RawImage>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistRef {
    pub id: String,
    pub name: String,
}
