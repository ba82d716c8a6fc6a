use anyhow::anyhow;
use log::{info, warn};
use rouille::{Request, Response};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::{
    apply::Selection,
    config::HttpConfig,
    domain::{plan::StagedPlan, snapshot::SyncMode, track::Track},
    http::error::ApiError,
    normalize::playlist_id_from_url,
    operations::{Decision, Outcome, SyncError, SyncRequest, Syncer},
    reconcile::filter::FilterSettings,
    storage::error::StorageError,
};

const SESSION_COOKIE: &str = "navisync_session";
const SESSION_TIMEOUT_SECS: u64 = 60 * 60;

/// Report files that can be downloaded by name.
const REPORT_FILES: [&str; 2] = ["missing_songs.csv", "missing_albums.csv"];

pub struct HttpServer {
    syncer: Arc<Mutex<Syncer>>,
    pub config: HttpConfig,
}

#[derive(Deserialize)]
struct AlbumUrls {
    album_urls: Vec<String>,
}

#[derive(Serialize, Deserialize)]
struct DeleteResponse {
    removed: usize,
}

impl HttpServer {
    pub fn new(syncer: Syncer, config: HttpConfig) -> Self {
        Self {
            syncer: Arc::new(Mutex::new(syncer)),
            config,
        }
    }

    pub fn run(self) {
        let addr = format!("{}:{}", self.config.bind_addr, self.config.port);
        rouille::start_server(addr, move |request| self.handle_request(request));
    }

    fn handle_request(&self, request: &Request) -> Response {
        Self::log_request(request);

        // plans are staged per browser session
        let response =
            rouille::session::session(request, SESSION_COOKIE, SESSION_TIMEOUT_SECS, |session| {
                self.route(request, session.id())
            });

        info!("Response: {} {}", request.method(), response.status_code);
        response
    }

    fn route(&self, request: &Request, session: &str) -> Response {
        let result = rouille::router!(request,
            (GET) (/) => {
                Ok(Response::html(include_str!("../../html/index.html")))
            },
            (POST) (/run-sync) => {
                self.handle_run_sync(request, session)
            },
            (GET) (/preview) => {
                self.handle_preview(session)
            },
            (POST) (/apply-changes) => {
                self.handle_apply_changes(request, session)
            },
            (GET) (/report) => {
                Ok(Response::html(include_str!("../../html/report.html")))
            },
            (GET) (/api/albums) => {
                self.handle_albums()
            },
            (POST) (/api/delete-albums) => {
                self.handle_delete_albums(request)
            },
            (POST) (/export-selected) => {
                self.handle_export_selected(request)
            },
            (GET) (/reports/{name: String}) => {
                self.handle_download_report(&name)
            },
            _ => Ok(Response::empty_404())
        );

        result.unwrap_or_else(ApiError::into_response)
    }

    fn log_request(request: &Request) {
        info!("{} {}", request.method(), request.url());
    }

    fn lock(&self) -> Result<MutexGuard<'_, Syncer>, ApiError> {
        self.syncer.lock().map_err(|e| {
            StorageError::Internal(anyhow!("Could not access navisync state under lock: {e}"))
                .into()
        })
    }

    fn handle_run_sync(&self, request: &Request, session: &str) -> Result<Response, ApiError> {
        let form = rouille::post_input!(request, {
            playlist_url: Option<String>,
            ignore_artists: Option<String>,
            ignore_genres: Option<String>,
            force_refetch: Option<String>,
        })
        .map_err(|e| ApiError::BadRequest(format!("invalid form: {e}")))?;

        let mode = match form.playlist_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => SyncMode::Playlist {
                id: playlist_id_from_url(url),
            },
            _ => SyncMode::Favorites,
        };
        let sync_request = SyncRequest {
            mode,
            force_refetch: form.force_refetch.is_some(),
            filter: FilterSettings::from_lists(
                form.ignore_artists.as_deref().unwrap_or_default(),
                form.ignore_genres.as_deref().unwrap_or_default(),
            ),
        };

        self.lock()?.analyze(session, sync_request)?;
        Ok(Response::redirect_303("/preview"))
    }

    fn handle_preview(&self, session: &str) -> Result<Response, ApiError> {
        match self.lock()?.pending(session)? {
            Some(plan) => Ok(Response::html(render_preview(&plan))),
            None => Ok(Response::redirect_303("/")),
        }
    }

    fn handle_apply_changes(&self, request: &Request, session: &str) -> Result<Response, ApiError> {
        let form = rouille::post_input!(request, {
            apply_add: Option<String>,
            apply_remove: Option<String>,
            decision: Option<String>,
        })
        .map_err(|e| ApiError::BadRequest(format!("invalid form: {e}")))?;

        let decision = if form.decision.as_deref() == Some("cancel") {
            Decision::Decline
        } else {
            Decision::Accept(Selection {
                add: form.apply_add.is_some(),
                remove: form.apply_remove.is_some(),
            })
        };

        let mut syncer = self.lock()?;
        let resolution = match syncer.resolve(session, decision) {
            Ok(resolution) => resolution,
            Err(SyncError::NoPendingPlan) => {
                warn!("No staged plan for this session, back to planning");
                return Ok(Response::redirect_303("/"));
            }
            Err(e) => return Err(e.into()),
        };
        if let Outcome::Applied(report) = &resolution.outcome {
            info!(
                "'{}': {} starred, {} unstarred, {} failed",
                resolution.plan.target_name, report.starred, report.unstarred, report.failed
            );
        }

        let summary = syncer.write_reports(&resolution.plan)?;
        if let Err(e) = syncer.refresh_artwork(&summary.albums) {
            warn!("Album art refresh failed: {e}");
        }
        Ok(Response::redirect_303("/report"))
    }

    fn handle_albums(&self) -> Result<Response, ApiError> {
        Ok(Response::json(&self.lock()?.albums_with_art()?))
    }

    fn handle_delete_albums(&self, request: &Request) -> Result<Response, ApiError> {
        let body: AlbumUrls = rouille::input::json_input(request)
            .map_err(|e| ApiError::BadRequest(format!("invalid json: {e}")))?;
        let removed = self.lock()?.delete_albums(&body.album_urls)?;
        Ok(Response::json(&DeleteResponse { removed }))
    }

    fn handle_export_selected(&self, request: &Request) -> Result<Response, ApiError> {
        let body: AlbumUrls = rouille::input::json_input(request)
            .map_err(|e| ApiError::BadRequest(format!("invalid json: {e}")))?;
        let csv = self.lock()?.export_selected(&body.album_urls)?;
        Ok(Response::from_data("text/csv; charset=utf-8", csv)
            .with_content_disposition_attachment("selected_albums.csv"))
    }

    fn handle_download_report(&self, name: &str) -> Result<Response, ApiError> {
        if !REPORT_FILES.contains(&name) {
            return Err(ApiError::NotFound(format!("no report named {name}")));
        }
        let path = self.lock()?.output().dir.join(name);
        let file = match std::fs::File::open(&path) {
            Ok(file) => file,
            Err(_) => return Err(ApiError::NotFound(format!("{name} has not been generated yet"))),
        };
        let mime = mime_guess::from_path(&path).first_or_octet_stream();
        Ok(Response::from_file(mime.to_string(), file).with_content_disposition_attachment(name))
    }
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

fn track_rows(tracks: &[Track]) -> String {
    if tracks.is_empty() {
        return r#"<tr><td colspan="3" class="empty">nothing</td></tr>"#.to_string();
    }
    tracks
        .iter()
        .map(|t| {
            format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td></tr>",
                escape_html(&t.artist),
                escape_html(&t.title),
                escape_html(&t.album)
            )
        })
        .collect()
}

fn render_preview(plan: &StagedPlan) -> String {
    let (add_label, remove_label) = match plan.mode {
        SyncMode::Favorites => ("Star", "Unstar"),
        SyncMode::Playlist { .. } => ("Replace playlist with", "Remove"),
    };
    include_str!("../../html/preview.html")
        .replace("{{TARGET}}", &escape_html(&plan.target_name))
        .replace("{{ADD_LABEL}}", add_label)
        .replace("{{REMOVE_LABEL}}", remove_label)
        .replace("{{ADD_COUNT}}", &plan.diff.to_add.len().to_string())
        .replace("{{REMOVE_COUNT}}", &plan.diff.to_remove.len().to_string())
        .replace("{{MISSING_COUNT}}", &plan.diff.missing.len().to_string())
        .replace("{{ADD_ROWS}}", &track_rows(&plan.diff.to_add))
        .replace("{{REMOVE_ROWS}}", &track_rows(&plan.diff.to_remove))
        .replace("{{MISSING_ROWS}}", &track_rows(&plan.diff.missing))
}

#[cfg(test)]
pub fn parse_json_response<T: serde::de::DeserializeOwned>(
    response: rouille::Response,
) -> anyhow::Result<T> {
    Ok(serde_json::from_reader(
        response.data.into_reader_and_size().0,
    )?)
}
