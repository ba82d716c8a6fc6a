//! Turns raw source records into canonical [`Track`]s and fetches whole snapshots.

use std::collections::{HashMap, HashSet};

use log::{info, warn};

use crate::{
    domain::{
        snapshot::{FAVORITES_NAME, Snapshot, SyncMode},
        track::Track,
    },
    providers::{
        ARTIST_BATCH_SIZE, PLAYLIST_TRACKS_PAGE, ProviderError, RawSavedItem, SAVED_TRACKS_PAGE,
        SourceLibrary,
    },
};

/// Normalizes raw items, resolving the primary artist genre of each track.
///
/// Items without a track body, an album or any artist are unavailable
/// entries and are dropped. Output order follows input order.
pub fn normalize(source: &dyn SourceLibrary, items: &[RawSavedItem]) -> Vec<Track> {
    let genres = resolve_genres(source, items);

    items
        .iter()
        .filter_map(|item| {
            let track = item.track.as_ref()?;
            let album = track.album.as_ref()?;
            let primary = track.artists.first()?;

            let genre = primary
                .id
                .as_ref()
                .and_then(|id| genres.get(id))
                .cloned()
                .unwrap_or_default();

            Some(Track {
                id: track.id.clone(),
                title: track.name.clone(),
                artist: primary.name.clone(),
                album: album.name.clone(),
                album_type: album
                    .album_type
                    .clone()
                    .unwrap_or_else(|| "album".to_string()),
                album_url: album.external_urls.spotify.clone().unwrap_or_default(),
                genre,
                added_at: item.added_at.clone().unwrap_or_default(),
            })
        })
        .collect()
}

/// primary artist id -> comma-joined genres
///
/// A failed batch leaves its artists without genre.
fn resolve_genres(source: &dyn SourceLibrary, items: &[RawSavedItem]) -> HashMap<String, String> {
    let mut seen = HashSet::new();
    let artist_ids = items
        .iter()
        .filter_map(|item| item.track.as_ref()?.artists.first()?.id.clone())
        .filter(|id| seen.insert(id.clone()))
        .collect::<Vec<_>>();

    let mut genres = HashMap::new();
    for batch in artist_ids.chunks(ARTIST_BATCH_SIZE) {
        match source.get_artists(batch) {
            Ok(artists) => {
                for artist in artists {
                    genres.insert(artist.id, artist.genres.join(", "));
                }
            }
            Err(e) => warn!(
                "Failed to fetch genres for {} artists, continuing without them: {e}",
                batch.len()
            ),
        }
    }
    genres
}

/// Fetches all liked songs. The result is ordered oldest addition first.
pub fn fetch_favorites(source: &dyn SourceLibrary) -> Result<Snapshot, ProviderError> {
    let mut raw = Vec::new();
    let total = loop {
        let page = source.list_saved_tracks(raw.len(), SAVED_TRACKS_PAGE)?;
        if page.items.is_empty() {
            break page.total;
        }
        raw.extend(page.items);
        info!("Fetched {} of {} liked songs", raw.len(), page.total);
    };

    let mut tracks = normalize(source, &raw);
    // provider pages are newest first
    tracks.reverse();

    let snapshot = Snapshot {
        tracks,
        total_count: total,
        mode: SyncMode::Favorites,
        name: FAVORITES_NAME.to_string(),
    };
    if !snapshot.is_fresh() {
        warn!(
            "{} of {} liked songs are unavailable; the cache will not be reused",
            total.saturating_sub(snapshot.tracks.len()),
            total
        );
    }
    Ok(snapshot)
}

/// Fetches a playlist in playlist order.
pub fn fetch_playlist(
    source: &dyn SourceLibrary,
    playlist_id: &str,
) -> Result<Snapshot, ProviderError> {
    let playlist = source.get_playlist_info(playlist_id)?;
    info!(
        "Fetching playlist '{}' ({} tracks)",
        playlist.name, playlist.total
    );

    let mut raw = Vec::new();
    loop {
        let items = source.list_playlist_tracks(playlist_id, raw.len(), PLAYLIST_TRACKS_PAGE)?;
        if items.is_empty() {
            break;
        }
        raw.extend(items);
    }

    Ok(Snapshot {
        tracks: normalize(source, &raw),
        total_count: playlist.total,
        mode: SyncMode::Playlist {
            id: playlist_id.to_string(),
        },
        name: playlist.name,
    })
}

/// Accepts a playlist share url or a bare id.
pub fn playlist_id_from_url(url: &str) -> String {
    let last = url.trim().trim_end_matches('/').rsplit('/').next().unwrap_or_default();
    last.split('?').next().unwrap_or_default().to_string()
}
