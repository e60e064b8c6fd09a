use axum::routing::{get, post};
use axum::Router;

use crate::handlers::jobs;
use crate::state::AppState;

/// ```text
/// POST /convert/all   -> convert_all
/// POST /delete/all    -> delete_all
/// GET  /convert/log   -> get_log (?type=convert|delete)
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/convert/all", post(jobs::convert_all))
        .route("/delete/all", post(jobs::delete_all))
        .route("/convert/log", get(jobs::get_log))
}
