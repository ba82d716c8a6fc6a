//! Removes ignored artists and genres from the missing-content report.
//!
//! Only the report is filtered; the add/remove plan is never touched.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::domain::track::Track;

/// Ignore lists for one request or CLI session.
///
/// Passed by value into each run; nothing here is process-global.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSettings {
    #[serde(default)]
    pub ignored_artists: Vec<String>,
    #[serde(default)]
    pub ignored_genres: Vec<String>,
}

impl FilterSettings {
    /// parses comma-separated form fields, dropping blank entries
    pub fn from_lists(artists: &str, genres: &str) -> Self {
        let split = |s: &str| {
            s.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>()
        };
        Self {
            ignored_artists: split(artists),
            ignored_genres: split(genres),
        }
    }

    pub fn ignore_artist(&mut self, artist: &str) {
        push_unique(&mut self.ignored_artists, artist);
    }

    pub fn ignore_genre(&mut self, genre: &str) {
        push_unique(&mut self.ignored_genres, genre);
    }

    /// settings from both, without duplicates
    pub fn merged(&self, other: &FilterSettings) -> FilterSettings {
        let mut merged = self.clone();
        for artist in &other.ignored_artists {
            merged.ignore_artist(artist);
        }
        for genre in &other.ignored_genres {
            merged.ignore_genre(genre);
        }
        merged
    }

    pub fn is_empty(&self) -> bool {
        self.ignored_artists.is_empty() && self.ignored_genres.is_empty()
    }
}

fn push_unique(list: &mut Vec<String>, value: &str) {
    let value = value.trim();
    let lower = value.to_lowercase();
    if !value.is_empty() && !list.iter().any(|v| v.to_lowercase() == lower) {
        list.push(value.to_string());
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IgnoreStats {
    /// excluded tracks
    pub tracks: usize,
    /// distinct (artist, album) pairs touched
    pub albums: BTreeSet<(String, String)>,
}

impl IgnoreStats {
    fn record(&mut self, track: &Track) {
        self.tracks += 1;
        self.albums
            .insert((track.artist.clone(), track.album.clone()));
    }
}

/// Per-rule exclusion counts, keyed by the lowercased ignored artist or genre.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilterSummary {
    pub artists: BTreeMap<String, IgnoreStats>,
    pub genres: BTreeMap<String, IgnoreStats>,
}

impl FilterSummary {
    pub fn excluded(&self) -> usize {
        self.artists.values().map(|s| s.tracks).sum::<usize>()
            + self.genres.values().map(|s| s.tracks).sum::<usize>()
    }
}

enum Exclusion {
    Artist(String),
    Genre(String),
}

pub struct FilterEngine {
    artists: Vec<String>,
    genres: Vec<String>,
    summary: FilterSummary,
}

impl FilterEngine {
    pub fn new(settings: &FilterSettings) -> Self {
        let lower = |v: &[String]| {
            v.iter()
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
        };
        Self {
            artists: lower(&settings.ignored_artists),
            genres: lower(&settings.ignored_genres),
            summary: FilterSummary::default(),
        }
    }

    /// Artist rule first: exact, case-insensitive.
    /// Genre rule second: an ignored genre that is a substring of any
    /// comma-split, trimmed genre token of the track.
    fn exclusion(&self, track: &Track) -> Option<Exclusion> {
        let artist = track.artist.to_lowercase();
        if self.artists.contains(&artist) {
            return Some(Exclusion::Artist(artist));
        }

        if self.genres.is_empty() {
            return None;
        }
        let tokens = track
            .genre
            .split(',')
            .map(|g| g.trim().to_lowercase())
            .collect::<Vec<_>>();
        self.genres
            .iter()
            .find(|ignored| tokens.iter().any(|token| token.contains(ignored.as_str())))
            .map(|ignored| Exclusion::Genre(ignored.clone()))
    }

    /// Keeps tracks matching no rule, in order, and records what was excluded.
    pub fn apply(&mut self, missing: &[Track]) -> Vec<Track> {
        let mut kept = Vec::with_capacity(missing.len());
        for track in missing {
            match self.exclusion(track) {
                Some(Exclusion::Artist(artist)) => {
                    self.summary.artists.entry(artist).or_default().record(track)
                }
                Some(Exclusion::Genre(genre)) => {
                    self.summary.genres.entry(genre).or_default().record(track)
                }
                None => kept.push(track.clone()),
            }
        }
        kept
    }

    pub fn summary(&self) -> &FilterSummary {
        &self.summary
    }

    pub fn into_summary(self) -> FilterSummary {
        self.summary
    }
}
