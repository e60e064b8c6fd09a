//! Handlers for manifest and BIF retrieval.
//!
//! A cache miss answers 503 while generation runs in the background; the
//! client is expected to back off and ask again.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header;
use axum::http::StatusCode;
use axum::response::Response;
use axum::Json;
use tokio_util::io::ReaderStream;
use trickplay_core::error::CoreError;
use trickplay_core::manifest::Manifest;
use trickplay_core::types::{ItemId, Width};
use trickplay_pipeline::serving::ServeOutcome;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// GET /manifest/{item_id}
pub async fn get_manifest(
    State(state): State<AppState>,
    Path(item_id): Path<String>,
) -> AppResult<Json<Manifest>> {
    let id = parse_item_id(&item_id)?;
    match state.trickplay.get_manifest(id).await? {
        ServeOutcome::Ready(manifest) => Ok(Json(manifest)),
        ServeOutcome::NotReady => Err(AppError::NotReady),
        ServeOutcome::NotFound => Err(not_found("Manifest", item_id)),
    }
}

/// GET /bif/{item_id}/{width}
///
/// Streams the artifact as `application/octet-stream`.
pub async fn get_bif(
    State(state): State<AppState>,
    Path((item_id, width)): Path<(String, Width)>,
) -> AppResult<Response> {
    let id = parse_item_id(&item_id)?;
    let path = match state.trickplay.get_artifact(id, width).await? {
        ServeOutcome::Ready(path) => path,
        ServeOutcome::NotReady => return Err(AppError::NotReady),
        ServeOutcome::NotFound => return Err(not_found("Bif", format!("{item_id}/{width}"))),
    };

    // The artifact can vanish between resolve and open (bulk delete).
    let file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(not_found("Bif", format!("{item_id}/{width}")));
        }
        Err(e) => return Err(AppError::InternalError(e.to_string())),
    };
    let len = file
        .metadata()
        .await
        .map_err(|e| AppError::InternalError(e.to_string()))?
        .len();

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CONTENT_LENGTH, len.to_string())
        .body(Body::from_stream(ReaderStream::new(file)))
        .map_err(|e| AppError::InternalError(e.to_string()))
}

fn parse_item_id(raw: &str) -> AppResult<ItemId> {
    raw.parse()
        .map_err(|_| AppError::BadRequest(format!("'{raw}' is not a valid item id")))
}

fn not_found(entity: &'static str, id: impl Into<String>) -> AppError {
    AppError::Core(CoreError::NotFound {
        entity,
        id: id.into(),
    })
}
