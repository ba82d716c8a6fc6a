//! Grow-only album url -> cover image url map.

use std::{
    collections::{BTreeMap, HashSet},
    path::{Path, PathBuf},
};

use log::{info, warn};

use crate::{
    providers::{ALBUM_BATCH_SIZE, SourceLibrary},
    storage::error::StorageError,
};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RefreshOutcome {
    /// albums that had no cached art
    pub requested: usize,
    /// new cache entries
    pub added: usize,
}

pub struct ArtCache {
    path: PathBuf,
    /// sorted so equal contents serialize to equal bytes
    entries: BTreeMap<String, String>,
}

impl ArtCache {
    /// A missing or corrupt cache file starts an empty cache.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let entries = match std::fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                warn!(
                    "Album art cache {} is corrupt, starting empty: {e}",
                    path.to_string_lossy()
                );
                BTreeMap::new()
            }),
            Err(_) => BTreeMap::new(),
        };
        Self { path, entries }
    }

    pub fn get(&self, album_url: &str) -> Option<&str> {
        self.entries.get(album_url).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// non-empty urls without cached art, deduplicated, in input order
    pub fn pending_urls<'a>(&self, urls: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        let mut seen = HashSet::new();
        urls.into_iter()
            .filter(|url| !url.is_empty() && !self.entries.contains_key(*url))
            .filter(|url| seen.insert(*url))
            .map(str::to_string)
            .collect()
    }

    /// Looks up art for the uncached urls in batches.
    ///
    /// Existing keys are never replaced. A failed batch is skipped and
    /// retried on a later run.
    pub fn refresh<'a>(
        &mut self,
        source: &dyn SourceLibrary,
        urls: impl IntoIterator<Item = &'a str>,
    ) -> RefreshOutcome {
        let pending = self.pending_urls(urls);
        if pending.is_empty() {
            info!("Album art cache is up to date");
            return RefreshOutcome::default();
        }
        info!("Found {} new album arts to fetch", pending.len());

        let ids = pending
            .iter()
            .map(|url| album_id_from_url(url))
            .collect::<Vec<_>>();

        let mut added = 0;
        for batch in ids.chunks(ALBUM_BATCH_SIZE) {
            let albums = match source.get_albums(batch) {
                Ok(albums) => albums,
                Err(e) => {
                    warn!("Failed to fetch a batch of {} album arts: {e}", batch.len());
                    continue;
                }
            };
            for album in albums {
                let Some(image) = album.images.first() else {
                    continue;
                };
                if !self.entries.contains_key(&album.url) {
                    self.entries.insert(album.url, image.url.clone());
                    added += 1;
                }
            }
        }

        RefreshOutcome {
            requested: pending.len(),
            added,
        }
    }

    pub fn save(&self) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(&self.entries)?)?;
        Ok(())
    }
}

/// `https://open.spotify.com/album/<id>?si=...` -> `<id>`
pub fn album_id_from_url(url: &str) -> String {
    let last = url.rsplit('/').next().unwrap_or_default();
    last.split('?').next().unwrap_or_default().to_string()
}
