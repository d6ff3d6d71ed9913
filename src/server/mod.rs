//! HTTP front end.
//!
//! | Path | Description |
//! |------|-------------|
//! | `GET /` | Submission form, optionally showing a previous result |
//! | `POST /process_video` | Run the pipeline for form field `url` |
//! | `GET /static/{filename}` | Serve a published video |
//!
//! Renders block for as long as the pipeline runs; each one runs on the
//! blocking thread pool so other requests keep being served.

pub mod page;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, LazyLock};

use anyhow::{Context, Result};
use axum::{
    Form, Router,
    extract::{Path, Query, Request, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use regex::Regex;
use serde::Deserialize;
use tower::ServiceExt;
use tower_http::services::ServeFile;

use crate::config::AppConfig;
use crate::pipeline::Pipeline;
use page::PageView;

static STATIC_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").unwrap());

/// State shared by all routes.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub static_dir: Arc<PathBuf>,
}

#[derive(Debug, Deserialize)]
pub struct IndexQuery {
    video_url: Option<String>,
    processing_time: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct ProcessForm {
    url: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/process_video", post(process_video))
        .route("/static/:filename", get(serve_static))
        .with_state(state)
}

/// Bind and serve until the process is stopped.
pub async fn serve(config: &AppConfig, pipeline: Pipeline) -> Result<()> {
    config
        .ensure_dirs()
        .context("Failed to create static/work directories")?;

    let state = AppState {
        pipeline: Arc::new(pipeline),
        static_dir: Arc::new(config.server.static_dir.clone()),
    };

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| {
            format!(
                "Invalid listen address {}:{}",
                config.server.host, config.server.port
            )
        })?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    log::info!("Listening on http://{}", addr);

    axum::serve(listener, router(state))
        .await
        .context("Server terminated unexpectedly")
}

async fn index(Query(query): Query<IndexQuery>) -> Html<String> {
    Html(page::render(&PageView {
        video_url: query.video_url.as_deref(),
        processing_time: query.processing_time,
        ..PageView::default()
    }))
}

async fn process_video(State(state): State<AppState>, Form(form): Form<ProcessForm>) -> Response {
    let url = form.url.trim().to_string();
    log::info!("Render requested for {}", url);

    let pipeline = Arc::clone(&state.pipeline);
    let result = tokio::task::spawn_blocking(move || pipeline.run(&url)).await;

    match result {
        Ok(Ok(outcome)) => {
            let video_url = outcome.video_url();
            Html(page::render(&PageView {
                video_url: Some(&video_url),
                processing_time: Some(outcome.elapsed_secs),
                title: outcome.title.as_deref(),
                uploader: outcome.uploader.as_deref(),
                source_duration: outcome.source_duration_secs,
                rendered_at: Some(outcome.finished_at),
                ..PageView::default()
            }))
            .into_response()
        }
        Ok(Err(e)) => {
            match e.stage() {
                Some(stage) => log::error!("Render failed while {}: {}", stage, e),
                None => log::error!("Render failed: {}", e),
            }
            failure_page()
        }
        Err(e) => {
            log::error!("Render task panicked: {}", e);
            failure_page()
        }
    }
}

fn failure_page() -> Response {
    let html = page::render(&PageView {
        error: Some("Sorry, that video could not be processed."),
        rendered_at: Some(Utc::now()),
        ..PageView::default()
    });
    (StatusCode::INTERNAL_SERVER_ERROR, Html(html)).into_response()
}

/// GET /static/:filename — serve a file from the static directory.
///
/// The name is checked before anything touches the filesystem; `ServeFile`
/// handles content types, `Range` and conditional requests.
async fn serve_static(
    Path(filename): Path<String>,
    State(state): State<AppState>,
    request: Request,
) -> Response {
    if !is_safe_filename(&filename) {
        log::warn!("Rejected suspicious static path {:?}", filename);
        return (StatusCode::BAD_REQUEST, "Invalid filename").into_response();
    }

    let path = state.static_dir.join(&filename);
    match ServeFile::new(path).oneshot(request).await {
        Ok(resp) => resp.into_response(),
        Err(never) => match never {},
    }
}

fn is_safe_filename(name: &str) -> bool {
    STATIC_NAME_RE.is_match(name) && !name.contains("..")
}
