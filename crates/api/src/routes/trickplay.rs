use axum::routing::get;
use axum::Router;

use crate::handlers::trickplay;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/manifest/{item_id}", get(trickplay::get_manifest))
        .route("/bif/{item_id}/{width}", get(trickplay::get_bif))
}
