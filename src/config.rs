use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::reconcile::{diff::MatchPolicy, filter::FilterSettings};

#[derive(Debug, Deserialize)]
pub struct Config {
    pub version: u32,
    pub spotify: SpotifyConfig,
    pub navidrome: NavidromeConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub database: Database,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub http_client: HttpClientConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    /// ignore lists every run starts from
    #[serde(default)]
    pub filter: FilterSettings,
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Config> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.to_string_lossy()))?;
        toml::from_str(&contents).with_context(|| "Failed to parse config TOML")
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SpotifyConfig {
    pub client_id: String,
    pub client_secret: String,
    /// long lived token obtained once through the authorization code flow
    pub refresh_token: String,
    #[serde(default = "default_spotify_api_base")]
    pub api_base: String,
    #[serde(default = "default_spotify_auth_base")]
    pub auth_base: String,
}

fn default_spotify_api_base() -> String {
    "https://api.spotify.com/v1".to_string()
}

fn default_spotify_auth_base() -> String {
    "https://accounts.spotify.com".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct NavidromeConfig {
    pub url: String,
    pub user: String,
    pub password: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("output"),
        }
    }
}

impl OutputConfig {
    pub fn favorites_cache(&self) -> PathBuf {
        self.dir.join("spotify_favorites.json")
    }

    pub fn missing_songs(&self) -> PathBuf {
        self.dir.join("missing_songs.csv")
    }

    pub fn missing_albums(&self) -> PathBuf {
        self.dir.join("missing_albums.csv")
    }

    pub fn art_cache(&self) -> PathBuf {
        self.dir.join("album_art_cache.json")
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct Database {
    #[serde(default)]
    pub in_memory: bool,
    pub path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    pub bind_addr: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1".to_string(),
            port: 5001,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpClientConfig {
    pub timeout_secs: u64,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SyncConfig {
    #[serde(default)]
    pub policy: MatchPolicy,
}
