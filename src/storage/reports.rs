//! CSV reports of content missing from the target library.

use std::{
    collections::{BTreeMap, HashSet},
    path::Path,
};

use serde::{Deserialize, Serialize};

use crate::{domain::track::Track, reconcile::albums::MissingAlbum, storage::error::StorageError};

pub const SONGS_HEADER: [&str; 5] = ["Title", "Artist", "Album", "Genre", "Date Added"];
/// "Spotify URL" is kept for compatibility with tools reading older reports
pub const ALBUMS_HEADER: [&str; 4] = ["Artist", "Album", "Genre", "Spotify URL"];

/// A row of the missing-albums report as read back from disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlbumRow {
    #[serde(rename = "Artist")]
    pub artist: String,
    #[serde(rename = "Album")]
    pub album: String,
    #[serde(rename = "Genre")]
    pub genre: String,
    #[serde(rename = "Spotify URL")]
    pub url: String,
}

impl From<&MissingAlbum> for AlbumRow {
    fn from(album: &MissingAlbum) -> Self {
        Self {
            artist: album.artist.clone(),
            album: album.album.clone(),
            genre: album.genre.clone(),
            url: album.album_url.clone(),
        }
    }
}

fn writer(path: &Path) -> Result<csv::Writer<std::fs::File>, StorageError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(csv::Writer::from_path(path)?)
}

/// One row per track, in the given order.
pub fn write_missing_songs(path: &Path, tracks: &[Track]) -> Result<(), StorageError> {
    let mut w = writer(path)?;
    w.write_record(SONGS_HEADER)?;
    for t in tracks {
        w.write_record([&t.title, &t.artist, &t.album, &t.genre, &t.added_at])?;
    }
    w.flush()?;
    Ok(())
}

pub fn write_missing_albums(path: &Path, rows: &[AlbumRow]) -> Result<(), StorageError> {
    let mut w = writer(path)?;
    w.write_record(ALBUMS_HEADER)?;
    for row in rows {
        w.write_record([&row.artist, &row.album, &row.genre, &row.url])?;
    }
    w.flush()?;
    Ok(())
}

/// An absent report reads as empty.
pub fn read_album_rows(path: &Path) -> Result<Vec<AlbumRow>, StorageError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let mut reader = csv::Reader::from_path(path)?;
    Ok(reader.deserialize().collect::<Result<Vec<AlbumRow>, _>>()?)
}

/// Drops the rows with the given urls; returns how many were removed.
pub fn delete_albums(path: &Path, urls: &[String]) -> Result<usize, StorageError> {
    if !path.exists() {
        return Ok(0);
    }
    let urls = urls.iter().collect::<HashSet<_>>();
    let rows = read_album_rows(path)?;
    let before = rows.len();
    let kept = rows
        .into_iter()
        .filter(|row| !urls.contains(&row.url))
        .collect::<Vec<_>>();
    write_missing_albums(path, &kept)?;
    Ok(before - kept.len())
}

/// The rows with the given urls as a standalone CSV document.
pub fn export_selected(path: &Path, urls: &[String]) -> Result<String, StorageError> {
    let urls = urls.iter().collect::<HashSet<_>>();
    let mut w = csv::Writer::from_writer(Vec::new());
    w.write_record(ALBUMS_HEADER)?;
    for row in read_album_rows(path)? {
        if urls.contains(&row.url) {
            w.write_record([&row.artist, &row.album, &row.genre, &row.url])?;
        }
    }
    let bytes = w
        .into_inner()
        .map_err(|e| StorageError::Internal(anyhow::anyhow!("csv buffer: {e}")))?;
    String::from_utf8(bytes).map_err(|e| StorageError::Internal(e.into()))
}

/// lowercased genre -> number of rows carrying it
pub fn genre_counts<'a>(rows: impl IntoIterator<Item = &'a AlbumRow>) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for row in rows {
        for genre in row
            .genre
            .split(',')
            .map(|g| g.trim().to_lowercase())
            .filter(|g| !g.is_empty())
        {
            *counts.entry(genre).or_default() += 1;
        }
    }
    counts
}
