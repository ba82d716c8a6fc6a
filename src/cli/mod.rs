use anyhow::Context;
use clap::{Parser, Subcommand};
use log::{info, warn};
use std::io::{BufRead, Write};
use std::path::PathBuf;

use crate::apply::Selection;
use crate::config;
use crate::domain::plan::StagedPlan;
use crate::domain::snapshot::SyncMode;
use crate::domain::track::Track;
use crate::http::server::HttpServer;
use crate::normalize::playlist_id_from_url;
use crate::operations::{Decision, Outcome, Resolution, SyncRequest, Syncer};
use crate::reconcile::diff::MatchPolicy;
use crate::reconcile::filter::{FilterEngine, FilterSettings, FilterSummary};
use crate::storage::db::i64_seconds_to_local_time;

/// Plans staged from the command line share one fixed session.
const CLI_SESSION: &str = "cli";

#[derive(Parser)]
#[command(name = "navisync")]
#[command(version = "0.1")]
#[command(about = "Mirror Spotify liked songs and playlists into Navidrome")]
pub struct Cli {
    /// Path to the config TOML file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compare Spotify with Navidrome and apply the changes after confirmation
    Sync {
        /// Sync this playlist instead of the liked songs
        #[arg(long)]
        playlist: Option<String>,
        /// Ignore the cached liked songs
        #[arg(long)]
        force_refetch: bool,
        /// Leave this artist out of the missing reports (repeatable)
        #[arg(long = "ignore-artist")]
        ignore_artists: Vec<String>,
        /// Leave genres containing this text out of the missing reports (repeatable)
        #[arg(long = "ignore-genre")]
        ignore_genres: Vec<String>,
        /// Override the configured matching policy
        #[arg(long, value_enum)]
        policy: Option<MatchPolicy>,
        /// Apply without asking
        #[arg(short, long)]
        yes: bool,
        /// Only stage the plan; resolve it later with `apply` or `cancel`
        #[arg(long, conflicts_with = "yes")]
        plan_only: bool,
    },
    /// Apply the staged plan
    Apply {
        /// Do not star tracks or recreate the playlist
        #[arg(long)]
        no_add: bool,
        /// Do not unstar tracks
        #[arg(long)]
        no_remove: bool,
    },
    /// Drop the staged plan without changing anything
    Cancel,
    /// Show the staged plan
    Status,
    /// List missing albums with their cover art
    Albums,
    /// Run the web front end
    Serve,
}

#[derive(Debug, PartialEq, Eq)]
enum Answer {
    Yes,
    No,
    IgnoreArtist(String),
    Unknown,
}

fn parse_answer(line: &str) -> Answer {
    let line = line.trim();
    let (word, rest) = line
        .split_once(char::is_whitespace)
        .map(|(w, r)| (w, r.trim()))
        .unwrap_or((line, ""));
    match word.to_lowercase().as_str() {
        "y" | "yes" => Answer::Yes,
        "n" | "no" => Answer::No,
        "i" | "ignore" if !rest.is_empty() => Answer::IgnoreArtist(rest.to_string()),
        _ => Answer::Unknown,
    }
}

/// Entrypoint for CLI
pub fn run() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let mut cfg = config::Config::load(&cli.config)?;

    match cli.command {
        Commands::Sync {
            playlist,
            force_refetch,
            ignore_artists,
            ignore_genres,
            policy,
            yes,
            plan_only,
        } => {
            if let Some(policy) = policy {
                cfg.sync.policy = policy;
            }
            let mut syncer = Syncer::new(&cfg)?;
            info!("Matching with the {:?} policy", syncer.policy());

            let mut filter = FilterSettings::default();
            ignore_artists.iter().for_each(|a| filter.ignore_artist(a));
            ignore_genres.iter().for_each(|g| filter.ignore_genre(g));
            let request = SyncRequest {
                mode: match playlist {
                    Some(url) => SyncMode::Playlist {
                        id: playlist_id_from_url(&url),
                    },
                    None => SyncMode::Favorites,
                },
                force_refetch,
                filter,
            };

            let plan = syncer
                .analyze(CLI_SESSION, request)
                .context("Analysis failed, nothing was changed")?;
            print_plan(&plan);

            if plan_only {
                println!("Plan staged. Run \"apply\" or \"cancel\" to resolve it.");
                return Ok(());
            }

            let mut filter = plan.filter.clone();
            let decision = if yes {
                Decision::Accept(Selection::default())
            } else {
                prompt(&plan, &mut filter)?
            };

            let mut resolution = syncer.resolve(CLI_SESSION, decision)?;
            resolution.plan.filter = filter;
            finish(&syncer, resolution)?;
        }

        Commands::Apply { no_add, no_remove } => {
            let mut syncer = Syncer::new(&cfg)?;
            let selection = Selection {
                add: !no_add,
                remove: !no_remove,
            };
            let resolution = syncer
                .resolve(CLI_SESSION, Decision::Accept(selection))
                .context("Run \"sync --plan-only\" first")?;
            finish(&syncer, resolution)?;
        }

        Commands::Cancel => {
            let mut syncer = Syncer::new(&cfg)?;
            let resolution = syncer
                .resolve(CLI_SESSION, Decision::Decline)
                .context("Nothing to cancel")?;
            finish(&syncer, resolution)?;
        }

        Commands::Status => {
            let syncer = Syncer::new(&cfg)?;
            match syncer.pending(CLI_SESSION)? {
                Some(plan) => {
                    println!(
                        "Plan for '{}' staged {}",
                        plan.target_name,
                        i64_seconds_to_local_time(plan.created_at)?
                    );
                    print_plan(&plan);
                }
                None => println!("No plan is staged"),
            }
        }

        Commands::Albums => {
            let syncer = Syncer::new(&cfg)?;
            let browser = syncer.albums_with_art()?;
            println!("Missing albums with cover art ({}):", browser.albums.len());
            for album in &browser.albums {
                println!("  {} - {} [{}]", album.artist, album.album, album.genre);
                println!("    {}", album.url);
                println!("    cover: {}", album.image_url);
            }
        }

        Commands::Serve => {
            println!("Starting HTTP server...");

            let syncer = Syncer::new(&cfg)?;
            let http_server = HttpServer::new(syncer, cfg.http.clone());

            println!(
                "HTTP server running at http://{}:{}",
                http_server.config.bind_addr, http_server.config.port
            );
            http_server.run();
        }
    }

    Ok(())
}

fn print_tracks(marker: &str, tracks: &[Track]) {
    for track in tracks {
        println!("    {marker} {} - {}", track.artist, track.title);
    }
}

fn print_plan(plan: &StagedPlan) {
    let diff = &plan.diff;
    match plan.mode {
        SyncMode::Favorites => {
            println!("  To star ({}):", diff.to_add.len());
            print_tracks("+", &diff.to_add);
            println!("  To unstar ({}):", diff.to_remove.len());
            print_tracks("-", &diff.to_remove);
        }
        SyncMode::Playlist { .. } => {
            println!(
                "  Playlist '{}' will be replaced with {} tracks:",
                plan.target_name,
                diff.to_add.len()
            );
            print_tracks("+", &diff.to_add);
        }
    }
    println!("  Not found in Navidrome ({}):", diff.missing.len());
    print_tracks("?", &diff.missing);
}

/// Asks until the user decides; ignored artists are added to `filter` on the way.
fn prompt(plan: &StagedPlan, filter: &mut FilterSettings) -> anyhow::Result<Decision> {
    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("Apply these changes? [y]es / [n]o / [i] <artist> to ignore an artist: ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next() else {
            warn!("No answer on stdin, not applying");
            return Ok(Decision::Decline);
        };
        match parse_answer(&line?) {
            Answer::Yes => return Ok(Decision::Accept(Selection::default())),
            Answer::No => return Ok(Decision::Decline),
            Answer::IgnoreArtist(artist) => {
                filter.ignore_artist(&artist);
                let remaining = FilterEngine::new(filter).apply(&plan.diff.missing);
                println!(
                    "Ignoring '{artist}', {} tracks left in the missing report",
                    remaining.len()
                );
            }
            Answer::Unknown => println!("Please answer y, n or i <artist>"),
        }
    }
}

fn print_filter_summary(summary: &FilterSummary) {
    for (artist, stats) in &summary.artists {
        println!(
            "  ignored artist '{artist}': {} tracks, {} albums",
            stats.tracks,
            stats.albums.len()
        );
    }
    for (genre, stats) in &summary.genres {
        println!(
            "  ignored genre '{genre}': {} tracks, {} albums",
            stats.tracks,
            stats.albums.len()
        );
    }
}

/// Prints the outcome, then writes the reports and refreshes album art.
fn finish(syncer: &Syncer, resolution: Resolution) -> anyhow::Result<()> {
    match &resolution.outcome {
        Outcome::Applied(report) => {
            if report.playlist_created {
                println!("Playlist '{}' created", resolution.plan.target_name);
            }
            println!(
                "Applied: {} starred, {} unstarred, {} failed, {} skipped",
                report.starred, report.unstarred, report.failed, report.skipped
            );
        }
        Outcome::Cancelled => println!("No changes applied"),
    }

    let summary = syncer
        .write_reports(&resolution.plan)
        .context("Failed to write the missing reports")?;
    println!(
        "Reports written to {}: {} songs, {} albums",
        syncer.output().dir.to_string_lossy(),
        summary.songs,
        summary.albums.len()
    );
    print_filter_summary(&summary.filter);

    let art = syncer.refresh_artwork(&summary.albums)?;
    if art.requested > 0 {
        println!("Album art: {} of {} new covers found", art.added, art.requested);
    }
    Ok(())
}
