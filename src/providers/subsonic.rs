//! Blocking client for Subsonic compatible servers (Navidrome).

use std::time::Duration;

use log::debug;
use rand::Rng;
use reqwest::blocking::Client;
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::{Map, Value};

use crate::{
    config::NavidromeConfig,
    domain::track::{TargetSong, Track},
    providers::{PlaylistRef, ProviderError, TargetLibrary},
};

const API_VERSION: &str = "1.16.1";
const CLIENT_NAME: &str = "navisync";

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "subsonic-response")]
    response: SubsonicResponse,
}

#[derive(Deserialize)]
struct SubsonicResponse {
    status: String,
    #[serde(default)]
    error: Option<SubsonicErrorBody>,
    #[serde(flatten)]
    body: Map<String, Value>,
}

#[derive(Deserialize)]
struct SubsonicErrorBody {
    code: u16,
    #[serde(default)]
    message: String,
}

#[derive(Deserialize, Default)]
struct SongList {
    #[serde(default)]
    song: Vec<Song>,
}

#[derive(Deserialize, Default)]
struct PlaylistList {
    #[serde(default)]
    playlist: Vec<PlaylistEntry>,
}

#[derive(Deserialize)]
struct PlaylistEntry {
    id: String,
    name: String,
}

#[derive(Deserialize)]
struct Song {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    artist: String,
    #[serde(default)]
    album: String,
    #[serde(default)]
    genre: Option<String>,
    #[serde(default)]
    starred: Option<String>,
    #[serde(default)]
    created: Option<String>,
}

impl From<Song> for TargetSong {
    fn from(song: Song) -> Self {
        TargetSong {
            starred: song.starred.is_some(),
            track: Track {
                id: Some(song.id),
                title: song.title,
                artist: song.artist,
                album: song.album,
                album_type: "album".to_string(),
                album_url: String::new(),
                genre: song.genre.unwrap_or_default(),
                added_at: song.created.unwrap_or_default(),
            },
        }
    }
}

pub struct SubsonicClient {
    client: Client,
    config: NavidromeConfig,
}

impl SubsonicClient {
    pub fn new(config: NavidromeConfig, timeout: Duration) -> Result<Self, ProviderError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, config })
    }

    /// token authentication: `t = md5(password + salt)`, a fresh salt per request
    fn auth_params(&self) -> Vec<(&'static str, String)> {
        let salt = format!("{:016x}", rand::rng().random::<u64>());
        let token = format!("{:x}", md5::compute(format!("{}{}", self.config.password, salt)));
        vec![
            ("u", self.config.user.clone()),
            ("t", token),
            ("s", salt),
            ("v", API_VERSION.to_string()),
            ("c", CLIENT_NAME.to_string()),
            ("f", "json".to_string()),
        ]
    }

    fn call(
        &self,
        method: &str,
        params: &[(&'static str, String)],
    ) -> Result<Map<String, Value>, ProviderError> {
        let url = format!("{}/rest/{}", self.config.url.trim_end_matches('/'), method);
        debug!("GET {url} {params:?}");

        let response = self
            .client
            .get(&url)
            .query(&self.auth_params())
            .query(params)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .unwrap_or_else(|_| "Could not read error body".to_string());
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message: text,
            });
        }

        let envelope: Envelope = response
            .json()
            .map_err(|e| ProviderError::Decode(format!("JSON parse error: {e}")))?;
        let body = envelope.response;

        if body.status != "ok" {
            return Err(match body.error {
                Some(err) => ProviderError::Api {
                    status: err.code,
                    message: err.message,
                },
                None => ProviderError::Decode(format!("status {}", body.status)),
            });
        }
        Ok(body.body)
    }

    /// extracts an optional element of the response body, absent means default
    fn element<T: DeserializeOwned + Default>(
        mut body: Map<String, Value>,
        key: &str,
    ) -> Result<T, ProviderError> {
        match body.remove(key) {
            Some(value) => serde_json::from_value(value)
                .map_err(|e| ProviderError::Decode(format!("{key}: {e}"))),
            None => Ok(T::default()),
        }
    }

    fn id_params(ids: &[String]) -> Vec<(&'static str, String)> {
        ids.iter().map(|id| ("id", id.clone())).collect()
    }
}

impl TargetLibrary for SubsonicClient {
    fn ping(&self) -> Result<(), ProviderError> {
        self.call("ping", &[]).map(|_| ())
    }

    fn search_top1(&self, query: &str) -> Result<Option<TargetSong>, ProviderError> {
        let body = self.call(
            "search3",
            &[
                ("query", query.to_string()),
                ("songCount", "1".to_string()),
                ("artistCount", "0".to_string()),
                ("albumCount", "0".to_string()),
            ],
        )?;
        let result: SongList = Self::element(body, "searchResult3")?;
        Ok(result.song.into_iter().next().map(TargetSong::from))
    }

    fn list_starred(&self) -> Result<Vec<TargetSong>, ProviderError> {
        let body = self.call("getStarred2", &[])?;
        let starred: SongList = Self::element(body, "starred2")?;
        Ok(starred
            .song
            .into_iter()
            .map(|song| TargetSong {
                starred: true,
                ..TargetSong::from(song)
            })
            .collect())
    }

    fn star(&self, ids: &[String]) -> Result<(), ProviderError> {
        self.call("star", &Self::id_params(ids)).map(|_| ())
    }

    fn unstar(&self, ids: &[String]) -> Result<(), ProviderError> {
        self.call("unstar", &Self::id_params(ids)).map(|_| ())
    }

    fn list_playlists(&self) -> Result<Vec<PlaylistRef>, ProviderError> {
        let body = self.call("getPlaylists", &[])?;
        let playlists: PlaylistList = Self::element(body, "playlists")?;
        Ok(playlists
            .playlist
            .into_iter()
            .map(|p| PlaylistRef {
                id: p.id,
                name: p.name,
            })
            .collect())
    }

    fn delete_playlist(&self, id: &str) -> Result<(), ProviderError> {
        self.call("deletePlaylist", &[("id", id.to_string())])
            .map(|_| ())
    }

    fn create_playlist(&self, name: &str, track_ids: &[String]) -> Result<(), ProviderError> {
        let mut params = vec![("name", name.to_string())];
        params.extend(track_ids.iter().map(|id| ("songId", id.clone())));
        self.call("createPlaylist", &params).map(|_| ())
    }
}
