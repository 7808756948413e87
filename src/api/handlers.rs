//! API Handlers
//!
//! HTTP request handlers for each cache server endpoint.

use std::sync::Arc;
use tokio::sync::RwLock;

use axum::{
    extract::{multipart::MultipartError, Multipart, Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use tracing::{info, warn};

use crate::cache::{validate_key, BackendKind, CacheEngine, MetadataStore};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::models::{EntryResponse, HealthResponse, PutResponse, StatusResponse};
use crate::tasks::with_engine;

/// Multipart field carrying the uploaded file
const UPLOAD_FIELD: &str = "file";

/// Application state shared across all handlers.
///
/// The engine sits behind a single lock: uploads and downloads take the
/// write lock for their whole duration and run on the blocking pool, the
/// status page takes the read lock.
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<RwLock<CacheEngine>>,
    /// Cache capacity, used to size the request body limit
    pub max_size: u64,
}

impl AppState {
    /// Creates a new AppState around an opened engine.
    pub fn new(cache: CacheEngine) -> Self {
        let max_size = cache.status().max_size;
        Self {
            cache: Arc::new(RwLock::new(cache)),
            max_size,
        }
    }

    /// Opens the configured backend and metadata store and builds the engine.
    ///
    /// Fails fast on an unknown backend name. Orphaned blobs left by an
    /// earlier crash are reclaimed before the state is returned.
    pub fn from_config(config: &Config) -> Result<Self> {
        let kind: BackendKind = config.backend.parse()?;
        info!(
            "Opening {} backend at {}",
            kind,
            config.storage_location.display()
        );
        let backend = kind.create(&config.storage_location)?;

        // Blobs of the memory backend do not survive a restart, so neither may their metadata
        let metadata = match kind {
            BackendKind::InMemory => MetadataStore::in_memory(),
            BackendKind::Filesystem => MetadataStore::open(&config.metadata_path),
        }
        .map_err(|e| {
            CacheError::MetadataReadFailure(format!(
                "cannot open {}: {}",
                config.metadata_path.display(),
                e
            ))
        })?;

        let mut engine = CacheEngine::open(config.max_cache_size, metadata, backend)?;
        match engine.sweep_orphans() {
            Ok(0) => {}
            Ok(reclaimed) => info!("Reclaimed {} orphaned blobs at startup", reclaimed),
            Err(e) => warn!("Startup orphan sweep failed: {}", e),
        }

        Ok(Self::new(engine))
    }
}

/// Handler for POST /:key
///
/// Stores the multipart `file` field under `key`. The part's file name is
/// kept as the display name returned on download.
pub async fn put_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<PutResponse>> {
    // Reject bad keys before reading the body
    validate_key(&key)?;

    let mut upload = None;
    let max_size = state.max_size;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, max_size))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let display_name = field
            .file_name()
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| key.clone());
        let content = field
            .bytes()
            .await
            .map_err(|e| multipart_error(e, max_size))?;
        upload = Some((display_name, content));
        break;
    }

    let Some((display_name, content)) = upload else {
        return Err(CacheError::InvalidRequest(format!(
            "Missing multipart field '{}'",
            UPLOAD_FIELD
        )));
    };

    let stored_key = key.clone();
    let remaining = with_engine(&state.cache, move |cache| {
        cache.put(&stored_key, &content, &display_name)
    })
    .await?;

    Ok(Json(PutResponse::new(key, remaining)))
}

/// Handler for GET /:key
///
/// Returns the stored bytes as an attachment named after the display name.
pub async fn get_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Response> {
    // Write lock: a read bumps recency and access time
    let (display_name, content) =
        with_engine(&state.cache, move |cache| cache.get(&key)).await?;

    Ok((
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/octet-stream"),
            ),
            (header::CONTENT_DISPOSITION, attachment(&display_name)),
        ],
        content,
    )
        .into_response())
}

/// Handler for GET /
///
/// Returns occupancy, counters and the entry listing.
pub async fn status_handler(State(state): State<AppState>) -> Json<StatusResponse> {
    let cache = state.cache.read().await;
    let entries = cache
        .entries()
        .into_iter()
        .map(EntryResponse::from)
        .collect();

    Json(StatusResponse::new(cache.status(), &cache.stats(), entries))
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

/// Maps multipart read errors; hitting the body limit is an oversized upload.
fn multipart_error(e: MultipartError, max_size: u64) -> CacheError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        CacheError::UploadTooLarge { max_size }
    } else {
        CacheError::InvalidRequest(e.body_text())
    }
}

/// Builds a Content-Disposition value, replacing characters that cannot
/// appear inside a quoted ASCII header parameter.
fn attachment(display_name: &str) -> HeaderValue {
    let safe: String = display_name
        .chars()
        .map(|c| {
            if c == ' ' || (c.is_ascii_graphic() && c != '"' && c != '\\') {
                c
            } else {
                '_'
            }
        })
        .collect();
    HeaderValue::from_str(&format!("attachment; filename=\"{}\"", safe))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}
