//! Network collaborators: the source streaming library and the target media server.
//!
//! The reconciliation core only talks to these traits, so tests swap in
//! the in-memory fakes from [`fake`].

use thiserror::Error;

use crate::domain::track::TargetSong;

pub mod models;
pub mod spotify;
pub mod subsonic;

#[cfg(test)]
pub mod fake;

pub use models::*;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("api error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("unexpected response: {0}")]
    Decode(String),
}

/// Source library capabilities (Spotify).
pub trait SourceLibrary: Send {
    /// one page of liked songs, newest addition first, plus the library total
    fn list_saved_tracks(&self, offset: usize, limit: usize)
    -> Result<SavedTracksPage, ProviderError>;

    fn list_playlist_tracks(
        &self,
        playlist_id: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<RawSavedItem>, ProviderError>;

    fn get_playlist_info(&self, playlist_id: &str) -> Result<PlaylistInfo, ProviderError>;

    /// at most [`ARTIST_BATCH_SIZE`] ids per call
    fn get_artists(&self, ids: &[String]) -> Result<Vec<RawArtistDetails>, ProviderError>;

    /// at most [`ALBUM_BATCH_SIZE`] ids per call
    fn get_albums(&self, ids: &[String]) -> Result<Vec<RawAlbumDetails>, ProviderError>;
}

/// Target library capabilities (a Subsonic compatible server).
pub trait TargetLibrary: Send {
    fn ping(&self) -> Result<(), ProviderError>;

    /// best ranked song for the query, if any
    fn search_top1(&self, query: &str) -> Result<Option<TargetSong>, ProviderError>;

    fn list_starred(&self) -> Result<Vec<TargetSong>, ProviderError>;

    fn star(&self, ids: &[String]) -> Result<(), ProviderError>;

    fn unstar(&self, ids: &[String]) -> Result<(), ProviderError>;

    fn list_playlists(&self) -> Result<Vec<PlaylistRef>, ProviderError>;

    fn delete_playlist(&self, id: &str) -> Result<(), ProviderError>;

    fn create_playlist(&self, name: &str, track_ids: &[String]) -> Result<(), ProviderError>;
}

pub const ARTIST_BATCH_SIZE: usize = 50;
pub const ALBUM_BATCH_SIZE: usize = 20;
pub const SAVED_TRACKS_PAGE: usize = 50;
pub const PLAYLIST_TRACKS_PAGE: usize = 100;
