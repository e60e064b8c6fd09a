use std::sync::Arc;

use trickplay_pipeline::bulk::BulkJobs;
use trickplay_pipeline::serving::TrickplayService;

use crate::config::ServerConfig;

/// Shared application state available to all handlers via `State<AppState>`.
///
/// Cheap to clone; everything lives behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    /// Manifest/artifact lookups with on-demand generation.
    pub trickplay: Arc<TrickplayService>,
    /// Convert and delete jobs plus their logs.
    pub jobs: Arc<BulkJobs>,
}
