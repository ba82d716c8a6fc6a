use std::{collections::BTreeMap, time::Duration};

use log::{info, warn};
use serde::Serialize;
use thiserror::Error;

use crate::{
    apply::{ApplyError, ApplyReport, ApplyStage, Selection},
    config::{Config, OutputConfig},
    domain::{
        plan::StagedPlan,
        snapshot::{Snapshot, SyncMode},
    },
    normalize,
    providers::{
        ProviderError, SourceLibrary, TargetLibrary, spotify::SpotifyClient,
        subsonic::SubsonicClient,
    },
    reconcile::{
        albums,
        diff::{MatchPolicy, Reconciler},
        filter::{FilterEngine, FilterSettings, FilterSummary},
    },
    storage::{
        art_cache::{ArtCache, RefreshOutcome},
        db,
        error::StorageError,
        plans::PlanStore,
        reports::{self, AlbumRow},
        snapshot_cache::SnapshotCache,
    },
};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Apply(#[from] ApplyError),

    #[error("no plan is awaiting confirmation")]
    NoPendingPlan,
}

/// What one analysis run should look at.
#[derive(Debug, Clone)]
pub struct SyncRequest {
    pub mode: SyncMode,
    pub force_refetch: bool,
    /// added on top of the configured ignore lists
    pub filter: FilterSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accept(Selection),
    Decline,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Applied(ApplyReport),
    Cancelled,
}

#[derive(Debug)]
pub struct Resolution {
    pub plan: StagedPlan,
    pub outcome: Outcome,
}

#[derive(Debug, Default)]
pub struct ReportSummary {
    /// rows in the missing-songs report
    pub songs: usize,
    pub albums: Vec<AlbumRow>,
    pub filter: FilterSummary,
}

/// An album report row joined with its cached cover.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlbumArt {
    pub artist: String,
    pub album: String,
    pub genre: String,
    pub url: String,
    pub image_url: String,
}

#[derive(Debug, Default, Serialize)]
pub struct AlbumBrowser {
    pub albums: Vec<AlbumArt>,
    pub genre_counts: BTreeMap<String, usize>,
}

/// Main structure that drives a run: fetch, diff, stage, confirm, report.
pub struct Syncer {
    source: Box<dyn SourceLibrary>,
    target: Box<dyn TargetLibrary>,
    pub(crate) plans: PlanStore,
    output: OutputConfig,
    reconciler: Reconciler,
    default_filter: FilterSettings,
}

impl Syncer {
    /// Builds the network clients and opens the plan database.
    ///
    /// No network call happens here; the target is probed when a run starts.
    pub fn new(cfg: &Config) -> Result<Self, SyncError> {
        let timeout = Duration::from_secs(cfg.http_client.timeout_secs);
        let source = SpotifyClient::new(cfg.spotify.clone(), timeout)?;
        let target = SubsonicClient::new(cfg.navidrome.clone(), timeout)?;
        let plans = PlanStore::new(&cfg.database, &cfg.output.dir.join("navisync.db"))?;

        Ok(Self::from_parts(
            Box::new(source),
            Box::new(target),
            plans,
            cfg.output.clone(),
            cfg.sync.policy,
            cfg.filter.clone(),
        ))
    }

    pub fn from_parts(
        source: Box<dyn SourceLibrary>,
        target: Box<dyn TargetLibrary>,
        plans: PlanStore,
        output: OutputConfig,
        policy: MatchPolicy,
        default_filter: FilterSettings,
    ) -> Self {
        Self {
            source,
            target,
            plans,
            output,
            reconciler: Reconciler::new(policy),
            default_filter,
        }
    }

    pub fn policy(&self) -> MatchPolicy {
        self.reconciler.policy()
    }

    /// Uses the cached favorites when they still match the live total.
    fn load_source(&self, mode: &SyncMode, force_refetch: bool) -> Result<Snapshot, SyncError> {
        match mode {
            SyncMode::Favorites => {
                let cache = SnapshotCache::new(self.output.favorites_cache());
                let live_total = self.source.list_saved_tracks(0, 1)?.total;
                if let Some(snapshot) = cache.load(mode, live_total, force_refetch) {
                    return Ok(snapshot);
                }

                let snapshot = normalize::fetch_favorites(self.source.as_ref())?;
                if let Err(e) = cache.save(&snapshot) {
                    warn!("Failed to write the favorites cache: {e}");
                }
                Ok(snapshot)
            }
            SyncMode::Playlist { id } => Ok(normalize::fetch_playlist(self.source.as_ref(), id)?),
        }
    }

    /// Fetches both sides, computes the plan and stages it for `session`.
    ///
    /// Any connection failure aborts before anything is staged.
    pub fn analyze(&mut self, session: &str, request: SyncRequest) -> Result<StagedPlan, SyncError> {
        self.target.ping()?;
        let snapshot = self.load_source(&request.mode, request.force_refetch)?;
        let diff = self.reconciler.reconcile(&snapshot, self.target.as_ref())?;

        let mut stage = ApplyStage::planned(StagedPlan {
            session: session.to_string(),
            target_name: snapshot.name,
            mode: request.mode,
            filter: self.default_filter.merged(&request.filter),
            diff,
            created_at: db::now_seconds(),
        });
        stage.await_confirmation(&mut self.plans)?;
        Ok(stage.into_plan())
    }

    pub fn pending(&self, session: &str) -> Result<Option<StagedPlan>, SyncError> {
        Ok(self.plans.pending(session)?)
    }

    pub fn resolve(&mut self, session: &str, decision: Decision) -> Result<Resolution, SyncError> {
        let mut stage =
            ApplyStage::resume(&self.plans, session)?.ok_or(SyncError::NoPendingPlan)?;

        let outcome = match decision {
            Decision::Accept(selection) => Outcome::Applied(stage.confirm(
                &mut self.plans,
                self.target.as_ref(),
                selection,
            )?),
            Decision::Decline => {
                stage.cancel(&mut self.plans)?;
                Outcome::Cancelled
            }
        };

        Ok(Resolution {
            plan: stage.into_plan(),
            outcome,
        })
    }

    /// Writes both reports from the filtered `missing` set.
    pub fn write_reports(&self, plan: &StagedPlan) -> Result<ReportSummary, SyncError> {
        let mut engine = FilterEngine::new(&plan.filter);
        let missing = engine.apply(&plan.diff.missing);
        let rows = albums::aggregate(&missing)
            .iter()
            .map(AlbumRow::from)
            .collect::<Vec<_>>();

        reports::write_missing_songs(&self.output.missing_songs(), &missing)?;
        reports::write_missing_albums(&self.output.missing_albums(), &rows)?;
        info!(
            "Reports written to {}: {} songs, {} albums, {} ignored",
            self.output.dir.to_string_lossy(),
            missing.len(),
            rows.len(),
            engine.summary().excluded()
        );

        Ok(ReportSummary {
            songs: missing.len(),
            albums: rows,
            filter: engine.into_summary(),
        })
    }

    /// Looks up covers for report rows that have none cached yet.
    pub fn refresh_artwork(&self, rows: &[AlbumRow]) -> Result<RefreshOutcome, SyncError> {
        let mut cache = ArtCache::load(self.output.art_cache());
        let outcome = cache.refresh(self.source.as_ref(), rows.iter().map(|r| r.url.as_str()));
        if outcome.requested > 0 {
            cache.save()?;
            info!(
                "Album art cache updated: {} of {} found, {} cached in total",
                outcome.added,
                outcome.requested,
                cache.len()
            );
        }
        Ok(outcome)
    }

    /// Album report rows that have a cover, fetching art that is still missing.
    ///
    /// Rows without cached art are left out of both the list and the genre counts.
    pub fn albums_with_art(&self) -> Result<AlbumBrowser, SyncError> {
        let rows = reports::read_album_rows(&self.output.missing_albums())?;
        self.refresh_artwork(&rows)?;
        let cache = ArtCache::load(self.output.art_cache());

        let covered = rows
            .into_iter()
            .filter_map(|row| Some((cache.get(&row.url)?.to_string(), row)))
            .collect::<Vec<_>>();

        Ok(AlbumBrowser {
            genre_counts: reports::genre_counts(covered.iter().map(|(_, row)| row)),
            albums: covered
                .into_iter()
                .map(|(image_url, row)| AlbumArt {
                    artist: row.artist,
                    album: row.album,
                    genre: row.genre,
                    url: row.url,
                    image_url,
                })
                .collect(),
        })
    }

    pub fn delete_albums(&self, urls: &[String]) -> Result<usize, SyncError> {
        let removed = reports::delete_albums(&self.output.missing_albums(), urls)?;
        info!("Removed {removed} albums from the report");
        Ok(removed)
    }

    pub fn export_selected(&self, urls: &[String]) -> Result<String, SyncError> {
        Ok(reports::export_selected(&self.output.missing_albums(), urls)?)
    }

    pub fn output(&self) -> &OutputConfig {
        &self.output
    }
}

#[cfg(test)]
pub fn test_syncer(
    source: crate::providers::fake::FakeSource,
    target: crate::providers::fake::FakeTarget,
    output: &std::path::Path,
) -> Syncer {
    Syncer::from_parts(
        Box::new(source),
        Box::new(target),
        crate::storage::plans::in_memory_store(),
        OutputConfig {
            dir: output.to_path_buf(),
        },
        MatchPolicy::Search,
        FilterSettings::default(),
    )
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use tempfile::tempdir;

    use super::*;
    use crate::providers::fake::{FakeSource, FakeTarget, raw_item};

    /// liked songs newest first: Song B was liked after Song A
    fn scenario_source() -> FakeSource {
        FakeSource {
            saved: vec![
                raw_item("Artist Y", "Song B", "2024-02-01T00:00:00Z"),
                raw_item("Artist X", "Song A", "2024-01-01T00:00:00Z"),
            ],
            genres: HashMap::from([("id-artist-y".to_string(), vec!["k-pop".to_string()])]),
            album_images: HashMap::from([("Song B".to_string(), vec!["b.jpg".to_string()])]),
            ..Default::default()
        }
    }

    fn favorites() -> SyncRequest {
        SyncRequest {
            mode: SyncMode::Favorites,
            force_refetch: false,
            filter: FilterSettings::default(),
        }
    }

    #[test]
    fn test_analyze_stages_plan() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let target = FakeTarget::with_songs(vec![("nd-a", "Artist X", "Song A", false)]);
        let mut syncer = test_syncer(scenario_source(), target, dir.path());

        let plan = syncer.analyze("s", favorites())?;

        assert_eq!(plan.target_name, "Liked Songs");
        assert_eq!(plan.diff.to_add.len(), 1);
        assert_eq!(plan.diff.to_add[0].id.as_deref(), Some("nd-a"));
        assert_eq!(plan.diff.missing.len(), 1);
        assert_eq!(plan.diff.missing[0].title, "Song B");
        assert_eq!(syncer.pending("s")?, Some(plan));
        assert!(dir.path().join("spotify_favorites.json").exists());
        Ok(())
    }

    #[test]
    fn test_unreachable_target_stages_nothing() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let target = FakeTarget {
            down: true,
            ..Default::default()
        };
        let mut syncer = test_syncer(scenario_source(), target, dir.path());

        let err = syncer.analyze("s", favorites()).unwrap_err();

        assert!(matches!(err, SyncError::Provider(_)));
        assert_eq!(syncer.pending("s")?, None);
        Ok(())
    }

    #[test]
    fn test_cached_favorites_are_reused() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let mut syncer = test_syncer(scenario_source(), FakeTarget::default(), dir.path());
        syncer.analyze("s", favorites())?;

        // a cache with the live length stands in for the fetch
        let path = dir.path().join("spotify_favorites.json");
        let cached = std::fs::read_to_string(&path)?.replace("Song A", "Cached A");
        std::fs::write(&path, cached)?;
        let plan = syncer.analyze("s", favorites())?;
        assert_eq!(plan.diff.missing[0].title, "Cached A");

        let plan = syncer.analyze(
            "s",
            SyncRequest {
                force_refetch: true,
                ..favorites()
            },
        )?;
        assert_eq!(plan.diff.missing[0].title, "Song A");
        Ok(())
    }

    #[test]
    fn test_accept_applies_and_clears() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let target = FakeTarget::with_songs(vec![
            ("nd-a", "Artist X", "Song A", false),
            ("nd-old", "Old", "Gone", true),
        ]);
        let mut syncer = test_syncer(scenario_source(), target, dir.path());
        syncer.analyze("s", favorites())?;

        let resolution = syncer.resolve("s", Decision::Accept(Selection::default()))?;

        let Outcome::Applied(report) = resolution.outcome else {
            panic!("expected the plan to be applied");
        };
        assert_eq!(report.starred, 1);
        assert_eq!(report.unstarred, 1);
        assert_eq!(syncer.pending("s")?, None);

        // nothing left to confirm
        let err = syncer
            .resolve("s", Decision::Accept(Selection::default()))
            .unwrap_err();
        assert!(matches!(err, SyncError::NoPendingPlan));

        // converged: a second analysis has nothing to change
        let again = syncer.analyze("s", favorites())?;
        assert!(again.diff.to_add.is_empty());
        assert!(again.diff.to_remove.is_empty());
        assert_eq!(again.diff.missing, resolution.plan.diff.missing);
        Ok(())
    }

    #[test]
    fn test_starred_map_never_stars_source_ids() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let source = FakeSource {
            saved: vec![raw_item("Artist X", "Song A", "2024-01-01T00:00:00Z")],
            ..Default::default()
        };
        let target = FakeTarget::with_songs(vec![("nd-a", "Artist X", "Song A", false)]);
        let mut syncer = Syncer::from_parts(
            Box::new(source),
            Box::new(target),
            crate::storage::plans::in_memory_store(),
            OutputConfig {
                dir: dir.path().to_path_buf(),
            },
            MatchPolicy::StarredMap,
            FilterSettings::default(),
        );

        let plan = syncer.analyze("s", favorites())?;
        assert_eq!(plan.diff.to_add.len(), 1);
        assert_eq!(plan.diff.to_add[0].id, None);

        let resolution = syncer.resolve("s", Decision::Accept(Selection::default()))?;
        let Outcome::Applied(report) = resolution.outcome else {
            panic!("expected the plan to be applied");
        };
        assert_eq!(report.starred, 0);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.failed, 0);

        // nothing was starred, so the same plan comes back
        let again = syncer.analyze("s", favorites())?;
        assert_eq!(again.diff, resolution.plan.diff);
        Ok(())
    }

    #[test]
    fn test_decline_still_allows_reports() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let mut syncer = test_syncer(scenario_source(), FakeTarget::default(), dir.path());
        syncer.analyze("s", favorites())?;

        let resolution = syncer.resolve("s", Decision::Decline)?;
        assert_eq!(resolution.outcome, Outcome::Cancelled);
        let summary = syncer.write_reports(&resolution.plan)?;

        assert_eq!(summary.songs, 2);
        assert_eq!(summary.albums.len(), 2);
        let songs = std::fs::read_to_string(dir.path().join("missing_songs.csv"))?;
        // oldest liked first
        let titles = songs
            .lines()
            .skip(1)
            .map(|l| l.split(',').next().unwrap_or_default())
            .collect::<Vec<_>>();
        assert_eq!(titles, vec!["Song A", "Song B"]);
        Ok(())
    }

    #[test]
    fn test_reports_apply_ignore_lists() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let mut syncer = test_syncer(scenario_source(), FakeTarget::default(), dir.path());
        let plan = syncer.analyze(
            "s",
            SyncRequest {
                filter: FilterSettings::from_lists("", "pop"),
                ..favorites()
            },
        )?;

        let summary = syncer.write_reports(&plan)?;

        assert_eq!(summary.songs, 1);
        assert_eq!(summary.albums[0].artist, "Artist X");
        assert_eq!(summary.filter.genres["pop"].tracks, 1);
        // the plan itself is untouched by the ignore lists
        assert_eq!(plan.diff.missing.len(), 2);
        Ok(())
    }

    #[test]
    fn test_album_browser_fetches_missing_art() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let mut source = scenario_source();
        source
            .genres
            .insert("id-artist-x".to_string(), vec!["rock".to_string()]);
        let mut syncer = test_syncer(source, FakeTarget::default(), dir.path());
        let plan = syncer.analyze("s", favorites())?;
        syncer.write_reports(&plan)?;

        let browser = syncer.albums_with_art()?;

        // Song A has no cover, so it is neither listed nor counted
        assert_eq!(browser.albums.len(), 1);
        let song_b = &browser.albums[0];
        assert_eq!(song_b.artist, "Artist Y");
        assert_eq!(song_b.image_url, "b.jpg");
        assert_eq!(browser.genre_counts.get("k-pop"), Some(&1));
        assert_eq!(browser.genre_counts.get("rock"), None);

        let url = song_b.url.clone();
        assert_eq!(syncer.delete_albums(&[url.clone()])?, 1);
        assert!(syncer.albums_with_art()?.albums.is_empty());
        assert!(!syncer.export_selected(&[url])?.contains("Artist Y"));
        // the uncovered row is still in the report
        let song_a = "https://open.spotify.com/album/Song A".to_string();
        assert!(syncer.export_selected(&[song_a])?.contains("Artist X"));
        Ok(())
    }

    #[test]
    fn test_playlist_run() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let source = FakeSource {
            playlists: HashMap::from([(
                "pl1".to_string(),
                (
                    "Road trip".to_string(),
                    vec![raw_item("Artist X", "Song A", "t"), raw_item("Artist Y", "Song B", "t")],
                ),
            )]),
            ..Default::default()
        };
        let target = FakeTarget::with_songs(vec![("nd-a", "Artist X", "Song A", false)]);
        let mut syncer = test_syncer(source, target, dir.path());

        let plan = syncer.analyze(
            "web",
            SyncRequest {
                mode: SyncMode::Playlist {
                    id: "pl1".to_string(),
                },
                ..favorites()
            },
        )?;
        assert_eq!(plan.target_name, "Road trip");

        let resolution = syncer.resolve("web", Decision::Accept(Selection::default()))?;
        let Outcome::Applied(report) = resolution.outcome else {
            panic!("expected the plan to be applied");
        };
        assert!(report.playlist_created);
        assert!(!dir.path().join("spotify_favorites.json").exists());
        Ok(())
    }
}
