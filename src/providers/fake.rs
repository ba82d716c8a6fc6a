//! In-memory collaborators for tests.

use std::{
    collections::{HashMap, HashSet},
    sync::Mutex,
};

use crate::{
    domain::track::{TargetSong, Track},
    providers::{
        ExternalUrls, PlaylistInfo, PlaylistRef, ProviderError, RawAlbum, RawAlbumDetails,
        RawArtist, RawArtistDetails, RawImage, RawSavedItem, RawTrack, SavedTracksPage,
        SourceLibrary, TargetLibrary,
    },
};

fn unavailable() -> ProviderError {
    ProviderError::Api {
        status: 503,
        message: "unavailable".to_string(),
    }
}

pub fn raw_item(artist: &str, title: &str, added_at: &str) -> RawSavedItem {
    let artist_id = format!("id-{}", artist.to_lowercase().replace(' ', "-"));
    RawSavedItem {
        added_at: Some(added_at.to_string()),
        track: Some(RawTrack {
            id: Some(format!("sp-{title}")),
            name: title.to_string(),
            album: Some(RawAlbum {
                name: format!("{title} album"),
                album_type: Some("album".to_string()),
                external_urls: ExternalUrls {
                    spotify: Some(format!("https://open.spotify.com/album/{title}")),
                },
            }),
            artists: vec![RawArtist {
                id: Some(artist_id),
                name: artist.to_string(),
            }],
        }),
    }
}

#[derive(Default)]
pub struct FakeSource {
    /// newest first, like the provider
    pub saved: Vec<RawSavedItem>,
    /// overrides the reported total when set
    pub saved_total: Option<usize>,
    pub playlists: HashMap<String, (String, Vec<RawSavedItem>)>,
    pub genres: HashMap<String, Vec<String>>,
    /// album id -> image urls
    pub album_images: HashMap<String, Vec<String>>,
    pub fail_albums: bool,
    pub fail_artists: bool,
    pub saved_calls: Mutex<usize>,
    pub album_calls: Mutex<Vec<Vec<String>>>,
}

impl SourceLibrary for FakeSource {
    fn list_saved_tracks(
        &self,
        offset: usize,
        limit: usize,
    ) -> Result<SavedTracksPage, ProviderError> {
        *self.saved_calls.lock().unwrap() += 1;
        Ok(SavedTracksPage {
            items: self.saved.iter().skip(offset).take(limit).cloned().collect(),
            total: self.saved_total.unwrap_or(self.saved.len()),
        })
    }

    fn list_playlist_tracks(
        &self,
        playlist_id: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<RawSavedItem>, ProviderError> {
        let (_, items) = self.playlists.get(playlist_id).ok_or_else(unavailable)?;
        Ok(items.iter().skip(offset).take(limit).cloned().collect())
    }

    fn get_playlist_info(&self, playlist_id: &str) -> Result<PlaylistInfo, ProviderError> {
        let (name, items) = self.playlists.get(playlist_id).ok_or_else(unavailable)?;
        Ok(PlaylistInfo {
            name: name.clone(),
            total: items.len(),
        })
    }

    fn get_artists(&self, ids: &[String]) -> Result<Vec<RawArtistDetails>, ProviderError> {
        if self.fail_artists {
            return Err(unavailable());
        }
        Ok(ids
            .iter()
            .filter_map(|id| {
                self.genres.get(id).map(|genres| RawArtistDetails {
                    id: id.clone(),
                    genres: genres.clone(),
                })
            })
            .collect())
    }

    fn get_albums(&self, ids: &[String]) -> Result<Vec<RawAlbumDetails>, ProviderError> {
        self.album_calls.lock().unwrap().push(ids.to_vec());
        if self.fail_albums {
            return Err(unavailable());
        }
        Ok(ids
            .iter()
            .filter_map(|id| {
                self.album_images.get(id).map(|images| RawAlbumDetails {
                    url: format!("https://open.spotify.com/album/{id}"),
                    images: images.iter().map(|url| RawImage { url: url.clone() }).collect(),
                })
            })
            .collect())
    }
}

/// Target server whose search index matches `"{artist} {title}"` exactly.
#[derive(Default)]
pub struct FakeTarget {
    pub songs: Mutex<Vec<TargetSong>>,
    pub playlists: Mutex<Vec<(PlaylistRef, Vec<String>)>>,
    pub failing_queries: HashSet<String>,
    pub failing_ids: HashSet<String>,
    pub down: bool,
    pub searches: Mutex<Vec<String>>,
}

impl FakeTarget {
    pub fn with_songs(songs: Vec<(&str, &str, &str, bool)>) -> Self {
        let songs = songs
            .into_iter()
            .map(|(id, artist, title, starred)| TargetSong {
                track: Track {
                    id: Some(id.to_string()),
                    ..crate::domain::track::mock_track(artist, title)
                },
                starred,
            })
            .collect();
        Self {
            songs: Mutex::new(songs),
            ..Default::default()
        }
    }

    pub fn is_starred(&self, id: &str) -> bool {
        self.songs
            .lock()
            .unwrap()
            .iter()
            .any(|s| s.starred && s.track.id.as_deref() == Some(id))
    }

    fn set_starred(&self, ids: &[String], starred: bool) -> Result<(), ProviderError> {
        if self.down || ids.iter().any(|id| self.failing_ids.contains(id)) {
            return Err(unavailable());
        }
        for song in self.songs.lock().unwrap().iter_mut() {
            if let Some(id) = &song.track.id {
                if ids.contains(id) {
                    song.starred = starred;
                }
            }
        }
        Ok(())
    }
}

impl TargetLibrary for FakeTarget {
    fn ping(&self) -> Result<(), ProviderError> {
        if self.down { Err(unavailable()) } else { Ok(()) }
    }

    fn search_top1(&self, query: &str) -> Result<Option<TargetSong>, ProviderError> {
        self.searches.lock().unwrap().push(query.to_string());
        if self.down || self.failing_queries.contains(query) {
            return Err(unavailable());
        }
        Ok(self
            .songs
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.track.search_query() == query)
            .cloned())
    }

    fn list_starred(&self) -> Result<Vec<TargetSong>, ProviderError> {
        if self.down {
            return Err(unavailable());
        }
        Ok(self
            .songs
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.starred)
            .cloned()
            .collect())
    }

    fn star(&self, ids: &[String]) -> Result<(), ProviderError> {
        self.set_starred(ids, true)
    }

    fn unstar(&self, ids: &[String]) -> Result<(), ProviderError> {
        self.set_starred(ids, false)
    }

    fn list_playlists(&self) -> Result<Vec<PlaylistRef>, ProviderError> {
        Ok(self
            .playlists
            .lock()
            .unwrap()
            .iter()
            .map(|(p, _)| p.clone())
            .collect())
    }

    fn delete_playlist(&self, id: &str) -> Result<(), ProviderError> {
        self.playlists.lock().unwrap().retain(|(p, _)| p.id != id);
        Ok(())
    }

    fn create_playlist(&self, name: &str, track_ids: &[String]) -> Result<(), ProviderError> {
        if self.down {
            return Err(unavailable());
        }
        let mut playlists = self.playlists.lock().unwrap();
        let id = format!("pl-{}", playlists.len() + 1);
        playlists.push((
            PlaylistRef {
                id,
                name: name.to_string(),
            },
            track_ids.to_vec(),
        ));
        Ok(())
    }
}
