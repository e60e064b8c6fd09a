pub mod health;
pub mod jobs;
pub mod trickplay;

use axum::Router;

use crate::state::AppState;

/// Build the trickplay route tree.
///
/// ```text
/// /manifest/{item_id}          GET  manifest (503 while generating)
/// /bif/{item_id}/{width}       GET  BIF stream (503 while generating)
///
/// /convert/all                 POST start legacy conversion
/// /delete/all                  POST start artifact deletion
/// /convert/log                 GET  job log (?type=convert|delete)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(trickplay::router())
        .merge(jobs::router())
}
