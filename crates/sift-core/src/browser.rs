//! Read-only web file browser confined to one base directory.
//!
//! `GET /` renders a plain listing page, `GET /api/list?path=` returns JSON and
//! `GET /files/*path` serves raw bytes. Every requested path must resolve (after `..`
//! and symlinks) to the base directory or something inside it.

use std::io;
use std::net::SocketAddr;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use axum::extract::{Path as UrlPath, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

#[derive(Clone)]
struct BrowserState {
    base: Arc<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct ListParams {
    #[serde(default)]
    path: String,
}

/// One row of a directory listing. `path` is relative to the base, `/`-separated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Entry {
    pub name: String,
    pub path: String,
    pub is_dir: bool,
    pub size: u64,
    pub modified: Option<String>,
}

/// Builds the browser routes for `base`. The base is canonicalized once here.
pub fn router(base: &Path) -> Result<Router, BrowseError> {
    let base = base.canonicalize().map_err(BrowseError::Base)?;
    if !base.is_dir() {
        return Err(BrowseError::Base(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("not a directory: {}", base.display()),
        )));
    }
    let state = BrowserState {
        base: Arc::new(base),
    };
    Ok(Router::new()
        .route("/", get(index_page))
        .route("/api/list", get(list_entries))
        .route("/files/*path", get(serve_file))
        .with_state(state))
}

/// Binds `addr` and serves until the process ends.
pub async fn serve(base: &Path, addr: SocketAddr) -> Result<(), BrowseError> {
    let app = router(base)?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(BrowseError::Bind)?;
    tracing::info!(%addr, base = %base.display(), "file browser listening");
    axum::serve(listener, app).await.map_err(BrowseError::Bind)
}

/// Resolves `requested` (relative to `base`) and checks it stays inside `base`.
/// `base` must already be canonical.
pub fn resolve_confined(base: &Path, requested: &str) -> Result<PathBuf, BrowseError> {
    let requested = Path::new(requested);
    let mut depth: usize = 0;
    for component in requested.components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::ParentDir => {
                depth = depth.checked_sub(1).ok_or(BrowseError::Denied)?;
            }
            Component::RootDir | Component::Prefix(_) => return Err(BrowseError::Denied),
        }
    }
    let resolved = base.join(requested).canonicalize().map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => BrowseError::NotFound,
        _ => BrowseError::Io(e),
    })?;
    if !resolved.starts_with(base) {
        return Err(BrowseError::Denied);
    }
    Ok(resolved)
}

/// Lists a confined directory, sorted by name. Unreadable entries are skipped.
pub async fn list_dir(base: &Path, requested: &str) -> Result<Vec<Entry>, BrowseError> {
    let dir = resolve_confined(base, requested)?;
    if !dir.is_dir() {
        return Err(BrowseError::NotADirectory);
    }
    let mut reader = tokio::fs::read_dir(&dir).await.map_err(BrowseError::from_io)?;
    let mut entries = Vec::new();
    while let Some(item) = reader.next_entry().await.map_err(BrowseError::from_io)? {
        let meta = match item.metadata().await {
            Ok(m) => m,
            Err(e) => {
                tracing::debug!(path = %item.path().display(), error = %e, "skipping entry");
                continue;
            }
        };
        let full = item.path();
        let rel = full.strip_prefix(base).unwrap_or(&full);
        entries.push(Entry {
            name: item.file_name().to_string_lossy().into_owned(),
            path: relative_url_path(rel),
            is_dir: meta.is_dir(),
            size: if meta.is_dir() { 0 } else { meta.len() },
            modified: meta
                .modified()
                .ok()
                .map(|t| DateTime::<Local>::from(t).to_rfc3339()),
        });
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

fn relative_url_path(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

async fn list_entries(
    State(state): State<BrowserState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Entry>>, BrowseError> {
    Ok(Json(list_dir(&state.base, &params.path).await?))
}

async fn serve_file(
    State(state): State<BrowserState>,
    UrlPath(path): UrlPath<String>,
) -> Result<Response, BrowseError> {
    let file = resolve_confined(&state.base, &path)?;
    if !file.is_file() {
        return Err(BrowseError::NotFound);
    }
    let bytes = tokio::fs::read(&file).await.map_err(BrowseError::from_io)?;
    let mime = image::ImageFormat::from_path(&file)
        .map(|f| f.to_mime_type())
        .unwrap_or("application/octet-stream");
    Ok(([(header::CONTENT_TYPE, mime)], bytes).into_response())
}

async fn index_page(
    State(state): State<BrowserState>,
    Query(params): Query<ListParams>,
) -> Result<Html<String>, BrowseError> {
    let entries = list_dir(&state.base, &params.path).await?;
    let mut rows = String::new();
    for e in &entries {
        let href = if e.is_dir {
            format!("/?path={}", url::form_urlencoded::byte_serialize(e.path.as_bytes()).collect::<String>())
        } else {
            file_href(&e.path)
        };
        let label = if e.is_dir { format!("{}/", e.name) } else { e.name.clone() };
        rows.push_str(&format!(
            "<li><a href=\"{}\">{}</a></li>\n",
            escape_html(&href),
            escape_html(&label)
        ));
    }
    let title = if params.path.is_empty() { "/" } else { params.path.as_str() };
    Ok(Html(format!(
        "<!doctype html>\n<html><head><meta charset=\"utf-8\"><title>Sift: {t}</title></head>\n\
         <body><h1>{t}</h1>\n<ul>\n{rows}</ul></body></html>\n",
        t = escape_html(title),
    )))
}

/// `/files/<segments>` with each segment percent-encoded.
fn file_href(rel: &str) -> String {
    let Ok(mut url) = url::Url::parse("http://localhost/files/") else {
        return String::from("/files/");
    };
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.pop_if_empty().extend(rel.split('/'));
    }
    url.path().to_string()
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[derive(Debug, thiserror::Error)]
pub enum BrowseError {
    #[error("access denied")]
    Denied,
    #[error("not found")]
    NotFound,
    #[error("not a directory")]
    NotADirectory,
    #[error("io error: {0}")]
    Io(io::Error),
    #[error("invalid base directory: {0}")]
    Base(io::Error),
    #[error("server error: {0}")]
    Bind(io::Error),
}

impl BrowseError {
    fn from_io(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::NotFound => BrowseError::NotFound,
            io::ErrorKind::PermissionDenied => BrowseError::Denied,
            _ => BrowseError::Io(e),
        }
    }
}

impl IntoResponse for BrowseError {
    fn into_response(self) -> Response {
        let status = match self {
            BrowseError::Denied => StatusCode::FORBIDDEN,
            BrowseError::NotFound => StatusCode::NOT_FOUND,
            BrowseError::NotADirectory => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::warn!(error = %self, "browser request failed");
        }
        let message = match self {
            BrowseError::Denied => "Access denied".to_string(),
            other => other.to_string(),
        };
        (status, message).into_response()
    }
}
