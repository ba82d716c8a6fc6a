//! Blocking Spotify Web API client.
//!
//! Authenticates with the refresh-token grant; the refresh token itself is
//! obtained once, out of band, through the authorization code flow with the
//! `user-library-read playlist-read-private` scopes.

use std::{sync::Mutex, time::Duration};

use chrono::{DateTime, Utc};
use log::{debug, info};
use reqwest::blocking::{Client, Response};
use serde::{Deserialize, de::DeserializeOwned};

use crate::{
    config::SpotifyConfig,
    providers::{
        ExternalUrls, PlaylistInfo, ProviderError, RawAlbumDetails, RawArtistDetails, RawImage,
        RawSavedItem, SavedTracksPage, SourceLibrary,
    },
};

/// refresh this long before the provider-reported expiry
const EXPIRY_MARGIN_SECS: i64 = 60;

struct AccessToken {
    value: String,
    expires_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Deserialize)]
struct PlaylistResponse {
    name: String,
    tracks: PlaylistTotal,
}

#[derive(Deserialize)]
struct PlaylistTotal {
    total: usize,
}

#[derive(Deserialize)]
struct PlaylistItemsResponse {
    items: Vec<RawSavedItem>,
}

#[derive(Deserialize)]
struct ArtistsResponse {
    artists: Vec<Option<RawArtistDetails>>,
}

#[derive(Deserialize)]
struct AlbumsResponse {
    albums: Vec<Option<AlbumObject>>,
}

#[derive(Deserialize)]
struct AlbumObject {
    #[serde(default)]
    external_urls: ExternalUrls,
    #[serde(default)]
    images: Vec<RawImage>,
}

pub struct SpotifyClient {
    client: Client,
    config: SpotifyConfig,
    token: Mutex<Option<AccessToken>>,
}

impl SpotifyClient {
    pub fn new(config: SpotifyConfig, timeout: Duration) -> Result<Self, ProviderError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            config,
            token: Mutex::new(None),
        })
    }

    fn access_token(&self) -> Result<String, ProviderError> {
        let mut token = self
            .token
            .lock()
            .map_err(|e| ProviderError::Auth(format!("token lock poisoned: {e}")))?;

        if let Some(current) = token.as_ref() {
            if current.expires_at > Utc::now() + chrono::Duration::seconds(EXPIRY_MARGIN_SECS) {
                return Ok(current.value.clone());
            }
        }

        let fresh = self.refresh_access_token()?;
        let value = fresh.value.clone();
        *token = Some(fresh);
        Ok(value)
    }

    fn refresh_access_token(&self) -> Result<AccessToken, ProviderError> {
        let url = format!("{}/api/token", self.config.auth_base.trim_end_matches('/'));
        debug!("POST {url}");

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", self.config.refresh_token.as_str()),
            ])
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .unwrap_or_else(|_| "Could not read error body".to_string());
            return Err(ProviderError::Auth(format!("{status}: {text}")));
        }

        let body: TokenResponse = response
            .json()
            .map_err(|e| ProviderError::Decode(format!("token response: {e}")))?;
        info!("Spotify access token refreshed");

        Ok(AccessToken {
            value: body.access_token,
            expires_at: Utc::now() + chrono::Duration::seconds(body.expires_in),
        })
    }

    fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ProviderError> {
        let url = format!("{}/{}", self.config.api_base.trim_end_matches('/'), path);
        debug!("GET {url} {query:?}");

        let response = self
            .client
            .get(&url)
            .bearer_auth(self.access_token()?)
            .query(query)
            .send()?;
        Self::handle_response(response)
    }

    fn handle_response<T: DeserializeOwned>(response: Response) -> Result<T, ProviderError> {
        let status = response.status();
        if status.is_success() {
            response
                .json()
                .map_err(|e| ProviderError::Decode(format!("JSON parse error: {e}")))
        } else {
            let text = response
                .text()
                .unwrap_or_else(|_| "Could not read error body".to_string());
            Err(ProviderError::Api {
                status: status.as_u16(),
                message: text,
            })
        }
    }
}

impl SourceLibrary for SpotifyClient {
    fn list_saved_tracks(
        &self,
        offset: usize,
        limit: usize,
    ) -> Result<SavedTracksPage, ProviderError> {
        self.get(
            "me/tracks",
            &[("limit", limit.to_string()), ("offset", offset.to_string())],
        )
    }

    fn list_playlist_tracks(
        &self,
        playlist_id: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<RawSavedItem>, ProviderError> {
        let page: PlaylistItemsResponse = self.get(
            &format!("playlists/{playlist_id}/tracks"),
            &[("limit", limit.to_string()), ("offset", offset.to_string())],
        )?;
        Ok(page.items)
    }

    fn get_playlist_info(&self, playlist_id: &str) -> Result<PlaylistInfo, ProviderError> {
        let playlist: PlaylistResponse = self.get(
            &format!("playlists/{playlist_id}"),
            &[("fields", "name,tracks.total".to_string())],
        )?;
        Ok(PlaylistInfo {
            name: playlist.name,
            total: playlist.tracks.total,
        })
    }

    fn get_artists(&self, ids: &[String]) -> Result<Vec<RawArtistDetails>, ProviderError> {
        let response: ArtistsResponse = self.get("artists", &[("ids", ids.join(","))])?;
        Ok(response.artists.into_iter().flatten().collect())
    }

    fn get_albums(&self, ids: &[String]) -> Result<Vec<RawAlbumDetails>, ProviderError> {
        let response: AlbumsResponse = self.get("albums", &[("ids", ids.join(","))])?;
        Ok(response
            .albums
            .into_iter()
            .flatten()
            .filter_map(|album| {
                album.external_urls.spotify.map(|url| RawAlbumDetails {
                    url,
                    images: album.images,
                })
            })
            .collect())
    }
}
