use std::time::Duration;

use trickplay_core::error::CoreError;

/// Wait after a "not ready" answer before asking again.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(60);

/// Largest share of the effective screen width a preview may take.
pub const DEFAULT_WIDTH_FRACTION: f64 = 0.2;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server root, without a trailing slash.
    pub base_url: String,
    pub retry_backoff: Duration,
    pub width_fraction: f64,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            width_fraction: DEFAULT_WIDTH_FRACTION,
        }
    }

    /// | Env Var                     | Default                  |
    /// |-----------------------------|--------------------------|
    /// | `TRICKPLAY_SERVER_URL`      | `http://localhost:8096`  |
    /// | `TRICKPLAY_RETRY_SECS`      | `60`                     |
    pub fn from_env() -> Result<Self, CoreError> {
        let base_url = std::env::var("TRICKPLAY_SERVER_URL")
            .unwrap_or_else(|_| "http://localhost:8096".into());
        let mut config = Self::new(base_url);
        if let Ok(raw) = std::env::var("TRICKPLAY_RETRY_SECS") {
            let secs: u64 = raw.trim().parse().map_err(|_| {
                CoreError::Validation(format!("TRICKPLAY_RETRY_SECS: '{raw}' is not a number"))
            })?;
            config.retry_backoff = Duration::from_secs(secs);
        }
        Ok(config)
    }
}
