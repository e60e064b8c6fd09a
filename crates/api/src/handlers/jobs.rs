//! Handlers for the convert / delete bulk jobs.

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use trickplay_pipeline::bulk::JobKind;
use trickplay_pipeline::job_log::LogLine;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct JobStarted {
    /// `false` when another job was already running; the refusal is in
    /// the requested job's log.
    pub started: bool,
}

#[derive(Debug, Deserialize)]
pub struct LogQuery {
    #[serde(rename = "type")]
    pub kind: Option<JobKind>,
}

/// POST /convert/all
pub async fn convert_all(State(state): State<AppState>) -> Json<JobStarted> {
    start(&state, JobKind::Convert)
}

/// POST /delete/all
pub async fn delete_all(State(state): State<AppState>) -> Json<JobStarted> {
    start(&state, JobKind::Delete)
}

/// GET /convert/log?type=convert|delete
///
/// Lines from the most recent run of the job; `convert` when omitted.
pub async fn get_log(
    State(state): State<AppState>,
    Query(query): Query<LogQuery>,
) -> Json<Vec<LogLine>> {
    let kind = query.kind.unwrap_or(JobKind::Convert);
    Json(state.jobs.log(kind).snapshot())
}

fn start(state: &AppState, kind: JobKind) -> Json<JobStarted> {
    let started = state.jobs.start(kind);
    tracing::info!(?kind, started, "Bulk job requested");
    Json(JobStarted { started })
}
