//! Computes what to add, remove and report for one run.
//!
//! Matching against the target is a single top-1 text search per source
//! track (`"{artist} {title}"`), with no album or duration check. It can
//! match the wrong song when titles collide and can miss the right one when
//! it ranks below first place.

use std::collections::HashSet;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::{
    domain::{
        snapshot::{Snapshot, SyncMode},
        track::{CanonicalKey, TargetSong, Track},
    },
    providers::{ProviderError, TargetLibrary},
};

/// How favorites are matched against the target library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum MatchPolicy {
    /// Probe the target search index once per source track.
    ///
    /// Distinguishes "exists but not starred" (`to_add`) from
    /// "does not exist at all" (`missing`); `missing` is disjoint from `to_add`.
    #[default]
    Search,
    /// Pure key set difference between source and starred target tracks.
    ///
    /// Cannot tell absent songs from unstarred ones, so `missing == to_add`
    /// and `to_add` holds source tracks without target ids.
    StarredMap,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffResult {
    /// target tracks to star, or the ordered contents of the new playlist
    pub to_add: Vec<Track>,
    /// starred target tracks with no source counterpart
    pub to_remove: Vec<Track>,
    /// source tracks with no match in the target library
    pub missing: Vec<Track>,
}

impl DiffResult {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty() && self.missing.is_empty()
    }
}

pub struct Reconciler {
    policy: MatchPolicy,
}

impl Reconciler {
    pub fn new(policy: MatchPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> MatchPolicy {
        self.policy
    }

    /// Fails only when the target cannot list its starred songs;
    /// individual search failures are routed to `missing`.
    pub fn reconcile(
        &self,
        source: &Snapshot,
        target: &dyn TargetLibrary,
    ) -> Result<DiffResult, ProviderError> {
        info!(
            "Reconciling {} source tracks ({}, policy {:?})",
            source.tracks.len(),
            source.mode,
            self.policy
        );
        match (&source.mode, self.policy) {
            (SyncMode::Favorites, MatchPolicy::Search) => {
                favorites_by_search(&source.tracks, target)
            }
            (SyncMode::Favorites, MatchPolicy::StarredMap) => {
                favorites_by_key(&source.tracks, target)
            }
            (SyncMode::Playlist { .. }, _) => Ok(project_playlist(&source.tracks, target)),
        }
    }
}

enum SearchOutcome {
    Found(TargetSong),
    NotFound,
}

fn search(target: &dyn TargetLibrary, track: &Track) -> SearchOutcome {
    match target.search_top1(&track.search_query()) {
        Ok(Some(hit)) => SearchOutcome::Found(hit),
        Ok(None) => SearchOutcome::NotFound,
        Err(e) => {
            warn!(
                "Search failed for '{} - {}', reporting it as missing: {e}",
                track.artist, track.title
            );
            SearchOutcome::NotFound
        }
    }
}

fn favorites_by_search(
    tracks: &[Track],
    target: &dyn TargetLibrary,
) -> Result<DiffResult, ProviderError> {
    let source_keys = tracks.iter().map(Track::key).collect::<HashSet<_>>();
    let mut matched_ids = HashSet::new();
    let mut diff = DiffResult::default();

    for (i, track) in tracks.iter().enumerate() {
        debug!(
            "Analyzing song {}/{}: {} - {}",
            i + 1,
            tracks.len(),
            track.artist,
            track.title
        );
        match search(target, track) {
            SearchOutcome::Found(hit) => {
                if let Some(id) = &hit.track.id {
                    if !matched_ids.insert(id.clone()) {
                        // another source track already resolved to this song
                        continue;
                    }
                }
                if !hit.starred {
                    diff.to_add.push(hit.track);
                }
            }
            SearchOutcome::NotFound => diff.missing.push(track.clone()),
        }
    }

    // a starred song survives if the search pass landed on it,
    // or if its key matches a source track the search could not resolve
    for song in target.list_starred()? {
        let matched = song
            .track
            .id
            .as_ref()
            .is_some_and(|id| matched_ids.contains(id));
        if !matched && !source_keys.contains(&song.track.key()) {
            diff.to_remove.push(song.track);
        }
    }

    Ok(diff)
}

fn favorites_by_key(
    tracks: &[Track],
    target: &dyn TargetLibrary,
) -> Result<DiffResult, ProviderError> {
    let starred = target
        .list_starred()?
        .into_iter()
        .map(|song| song.track)
        .collect::<Vec<_>>();

    let source_keys = tracks.iter().map(Track::key).collect::<HashSet<_>>();
    let target_keys = starred.iter().map(Track::key).collect::<HashSet<_>>();

    // source ids mean nothing to the target
    let to_add = difference(tracks, &target_keys)
        .into_iter()
        .map(|track| Track { id: None, ..track })
        .collect::<Vec<_>>();
    let to_remove = difference(&starred, &source_keys);

    Ok(DiffResult {
        missing: to_add.clone(),
        to_add,
        to_remove,
    })
}

/// tracks whose key is not in `other`, one per key, first seen wins
fn difference(tracks: &[Track], other: &HashSet<CanonicalKey>) -> Vec<Track> {
    let mut seen = HashSet::new();
    tracks
        .iter()
        .filter(|t| {
            let key = t.key();
            !other.contains(&key) && seen.insert(key)
        })
        .cloned()
        .collect()
}

fn project_playlist(tracks: &[Track], target: &dyn TargetLibrary) -> DiffResult {
    let mut diff = DiffResult::default();
    for track in tracks {
        match search(target, track) {
            SearchOutcome::Found(hit) => diff.to_add.push(hit.track),
            SearchOutcome::NotFound => diff.missing.push(track.clone()),
        }
    }
    diff
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{snapshot::FAVORITES_NAME, track::mock_track},
        providers::fake::FakeTarget,
    };

    fn favorites(tracks: Vec<Track>) -> Snapshot {
        Snapshot {
            total_count: tracks.len(),
            tracks,
            mode: SyncMode::Favorites,
            name: FAVORITES_NAME.to_string(),
        }
    }

    fn titles(tracks: &[Track]) -> Vec<&str> {
        tracks.iter().map(|t| t.title.as_str()).collect()
    }

    /// stars `to_add` and unstars `to_remove` directly on the fake
    fn apply(target: &FakeTarget, diff: &DiffResult) {
        let ids = |tracks: &[Track]| tracks.iter().filter_map(|t| t.id.clone()).collect::<Vec<_>>();
        target.star(&ids(&diff.to_add)).unwrap();
        target.unstar(&ids(&diff.to_remove)).unwrap();
    }

    #[test]
    fn test_scenario_found_unstarred_and_not_found() {
        let target = FakeTarget::with_songs(vec![("nd-a", "Artist X", "Song A", false)]);
        let source = favorites(vec![
            mock_track("Artist X", "Song A"),
            mock_track("Artist Y", "Song B"),
        ]);

        let diff = Reconciler::new(MatchPolicy::Search)
            .reconcile(&source, &target)
            .unwrap();

        assert_eq!(titles(&diff.to_add), vec!["Song A"]);
        assert_eq!(diff.to_add[0].id.as_deref(), Some("nd-a"));
        assert_eq!(titles(&diff.missing), vec!["Song B"]);
        assert!(diff.to_remove.is_empty());
    }

    #[test]
    fn test_already_starred_is_neither_added_nor_missing() {
        let target = FakeTarget::with_songs(vec![("nd-a", "Artist X", "Song A", true)]);
        let source = favorites(vec![mock_track("Artist X", "Song A")]);

        let diff = Reconciler::new(MatchPolicy::Search)
            .reconcile(&source, &target)
            .unwrap();

        assert!(diff.is_empty());
    }

    #[test]
    fn test_stale_starred_track_only_in_to_remove() {
        let target = FakeTarget::with_songs(vec![
            ("nd-a", "Artist X", "Song A", true),
            ("nd-old", "Artist Old", "Gone", true),
        ]);
        let source = favorites(vec![mock_track("Artist X", "Song A")]);

        let diff = Reconciler::new(MatchPolicy::Search)
            .reconcile(&source, &target)
            .unwrap();

        assert_eq!(titles(&diff.to_remove), vec!["Gone"]);
        assert!(diff.to_add.is_empty());
        assert!(diff.missing.is_empty());
    }

    #[test]
    fn test_search_failure_routes_track_to_missing() {
        let mut target = FakeTarget::with_songs(vec![("nd-a", "Artist X", "Song A", false)]);
        target.failing_queries.insert("Artist X Song A".to_string());
        let source = favorites(vec![
            mock_track("Artist X", "Song A"),
            mock_track("Artist Y", "Song B"),
        ]);

        let diff = Reconciler::new(MatchPolicy::Search)
            .reconcile(&source, &target)
            .unwrap();

        assert!(diff.to_add.is_empty());
        assert_eq!(titles(&diff.missing), vec!["Song A", "Song B"]);
        assert_eq!(target.searches.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_unreachable_target_is_fatal() {
        let target = FakeTarget {
            down: true,
            ..Default::default()
        };
        let source = favorites(vec![mock_track("Artist X", "Song A")]);

        let result = Reconciler::new(MatchPolicy::Search).reconcile(&source, &target);

        assert!(result.is_err());
    }

    #[test]
    fn test_reconcile_twice_is_idempotent() {
        let target = FakeTarget::with_songs(vec![
            ("nd-a", "Artist X", "Song A", false),
            ("nd-c", "Artist Z", "Song C", true),
            ("nd-old", "Artist Old", "Gone", true),
        ]);
        let source = favorites(vec![
            mock_track("Artist X", "Song A"),
            mock_track("Artist Y", "Song B"),
            mock_track("Artist Z", "Song C"),
        ]);

        for policy in [MatchPolicy::Search, MatchPolicy::StarredMap] {
            let reconciler = Reconciler::new(policy);
            let first = reconciler.reconcile(&source, &target).unwrap();
            apply(&target, &first);

            let second = reconciler.reconcile(&source, &target).unwrap();
            if policy == MatchPolicy::Search {
                assert!(second.to_add.is_empty());
                assert_eq!(second.missing, first.missing);
            }
            assert!(second.to_remove.is_empty(), "{policy:?}");
        }
    }

    #[test]
    fn test_starred_map_partition() {
        let cases: Vec<(Vec<&str>, Vec<&str>)> = vec![
            (vec![], vec![]),
            (vec!["a", "b"], vec![]),
            (vec![], vec!["a", "b"]),
            (vec!["a", "b", "c"], vec!["b", "c", "d"]),
            (vec!["a", "b"], vec!["a", "b"]),
        ];

        for (s, t) in cases {
            let songs = t
                .iter()
                .map(|title| (*title, "Artist", *title, true))
                .collect::<Vec<_>>();
            let target = FakeTarget::with_songs(songs);
            let source = favorites(s.iter().map(|title| mock_track("Artist", title)).collect());

            let diff = Reconciler::new(MatchPolicy::StarredMap)
                .reconcile(&source, &target)
                .unwrap();

            let expected_add = s.iter().filter(|k| !t.contains(k)).copied().collect::<Vec<_>>();
            let expected_remove = t.iter().filter(|k| !s.contains(k)).copied().collect::<Vec<_>>();
            assert_eq!(titles(&diff.to_add), expected_add);
            assert_eq!(titles(&diff.to_remove), expected_remove);
            assert_eq!(diff.missing, diff.to_add);
            // starred-map never searches
            assert!(target.searches.lock().unwrap().is_empty());
        }
    }

    #[test]
    fn test_starred_map_drops_source_ids() {
        let target = FakeTarget::with_songs(vec![("nd-old", "Artist Old", "Gone", true)]);
        let source = favorites(vec![Track {
            id: Some("sp-a".to_string()),
            ..mock_track("Artist X", "Song A")
        }]);

        let diff = Reconciler::new(MatchPolicy::StarredMap)
            .reconcile(&source, &target)
            .unwrap();

        assert_eq!(titles(&diff.to_add), vec!["Song A"]);
        assert!(diff.to_add.iter().all(|t| t.id.is_none()));
        assert!(diff.missing.iter().all(|t| t.id.is_none()));
        assert_eq!(diff.to_remove[0].id.as_deref(), Some("nd-old"));
    }

    #[test]
    fn test_case_differences_still_match() {
        let target = FakeTarget::with_songs(vec![("nd-a", "Artist X", "Song A", true)]);
        let source = favorites(vec![mock_track("ARTIST X", "song a")]);

        let diff = Reconciler::new(MatchPolicy::StarredMap)
            .reconcile(&source, &target)
            .unwrap();
        assert!(diff.is_empty());

        // search misses the differently cased query, but the starred song is kept
        let diff = Reconciler::new(MatchPolicy::Search)
            .reconcile(&source, &target)
            .unwrap();
        assert!(diff.to_remove.is_empty());
        assert_eq!(diff.missing.len(), 1);
    }

    #[test]
    fn test_playlist_projection_keeps_source_order() {
        let target = FakeTarget::with_songs(vec![
            ("nd-b", "B", "second", true),
            ("nd-a", "A", "first", false),
        ]);
        let source = Snapshot {
            tracks: vec![
                mock_track("A", "first"),
                mock_track("C", "absent"),
                mock_track("B", "second"),
            ],
            total_count: 3,
            mode: SyncMode::Playlist {
                id: "pl".to_string(),
            },
            name: "Road trip".to_string(),
        };

        let diff = Reconciler::new(MatchPolicy::Search)
            .reconcile(&source, &target)
            .unwrap();

        let ids = diff
            .to_add
            .iter()
            .map(|t| t.id.as_deref().unwrap())
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["nd-a", "nd-b"]);
        assert_eq!(titles(&diff.missing), vec!["absent"]);
        assert!(diff.to_remove.is_empty());
    }

    #[test]
    fn test_policy_is_exposed() {
        assert_eq!(Reconciler::new(MatchPolicy::StarredMap).policy(), MatchPolicy::StarredMap);
        assert_eq!(MatchPolicy::default(), MatchPolicy::Search);
    }
}
