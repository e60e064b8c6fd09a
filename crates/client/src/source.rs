//! Where the session gets manifests and BIFs from.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;
use trickplay_core::manifest::Manifest;
use trickplay_core::types::{ItemId, Width};

use crate::config::ClientConfig;
use crate::error::ClientError;

/// Server answer for one fetch, following the serving retry contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome<T> {
    Ready(T),
    /// Generation is running; retry after the backoff.
    NotReady,
    NotFound,
}

#[async_trait]
pub trait TrickplaySource: Send + Sync {
    async fn fetch_manifest(&self, item: ItemId) -> Result<FetchOutcome<Manifest>, ClientError>;

    async fn fetch_bif(&self, item: ItemId, width: Width) -> Result<FetchOutcome<Bytes>, ClientError>;
}

/// [`TrickplaySource`] over the HTTP endpoints.
pub struct HttpSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSource {
    pub fn new(config: &ClientConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    /// Reuse an existing [`reqwest::Client`] and its connection pool.
    pub fn with_client(client: reqwest::Client, config: &ClientConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.clone(),
        }
    }

    async fn get(&self, url: String) -> Result<FetchOutcome<reqwest::Response>, ClientError> {
        tracing::debug!(%url, "Requesting trickplay resource");
        let response = self.client.get(&url).send().await?;
        match response.status() {
            status if status.is_success() => Ok(FetchOutcome::Ready(response)),
            StatusCode::SERVICE_UNAVAILABLE => Ok(FetchOutcome::NotReady),
            StatusCode::NOT_FOUND => Ok(FetchOutcome::NotFound),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(ClientError::UnexpectedStatus {
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }
}

#[async_trait]
impl TrickplaySource for HttpSource {
    async fn fetch_manifest(&self, item: ItemId) -> Result<FetchOutcome<Manifest>, ClientError> {
        Ok(match self.get(format!("{}/manifest/{item}", self.base_url)).await? {
            FetchOutcome::Ready(response) => FetchOutcome::Ready(response.json().await?),
            FetchOutcome::NotReady => FetchOutcome::NotReady,
            FetchOutcome::NotFound => FetchOutcome::NotFound,
        })
    }

    async fn fetch_bif(&self, item: ItemId, width: Width) -> Result<FetchOutcome<Bytes>, ClientError> {
        Ok(match self.get(format!("{}/bif/{item}/{width}", self.base_url)).await? {
            FetchOutcome::Ready(response) => FetchOutcome::Ready(response.bytes().await?),
            FetchOutcome::NotReady => FetchOutcome::NotReady,
            FetchOutcome::NotFound => FetchOutcome::NotFound,
        })
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use axum::extract::Path;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::{Json, Router};
    use trickplay_core::bif;

    use super::*;

    const READY: &str = "0000000000000000000000000000000a";
    const PENDING: &str = "0000000000000000000000000000000b";
    const BROKEN: &str = "0000000000000000000000000000000c";

    async fn manifest(Path(id): Path<String>) -> Result<Json<Manifest>, StatusCode> {
        match id.as_str() {
            READY => Ok(Json(Manifest::with_widths([160, 320]))),
            PENDING => Err(StatusCode::SERVICE_UNAVAILABLE),
            BROKEN => Err(StatusCode::INTERNAL_SERVER_ERROR),
            _ => Err(StatusCode::NOT_FOUND),
        }
    }

    async fn bif_file(Path((id, width)): Path<(String, u32)>) -> Result<Vec<u8>, StatusCode> {
        match (id.as_str(), width) {
            (READY, 320) => Ok(bif::encode(&[b"frame".as_slice()], 1_000).unwrap()),
            (PENDING, _) => Err(StatusCode::SERVICE_UNAVAILABLE),
            _ => Err(StatusCode::NOT_FOUND),
        }
    }

    async fn serve() -> HttpSource {
        let app = Router::new()
            .route("/manifest/{id}", get(manifest))
            .route("/bif/{id}/{width}", get(bif_file));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        HttpSource::new(&ClientConfig::new(format!("http://{addr}/")))
    }

    fn id(raw: &str) -> ItemId {
        raw.parse().unwrap()
    }

    #[tokio::test]
    async fn maps_statuses_to_outcomes() {
        let source = serve().await;

        assert_matches!(
            source.fetch_manifest(id(READY)).await.unwrap(),
            FetchOutcome::Ready(m) if m.widths() == vec![160, 320]
        );
        assert_eq!(
            source.fetch_manifest(id(PENDING)).await.unwrap(),
            FetchOutcome::NotReady
        );
        assert_eq!(
            source.fetch_manifest(id("0000000000000000000000000000000d")).await.unwrap(),
            FetchOutcome::NotFound
        );

        let bytes = match source.fetch_bif(id(READY), 320).await.unwrap() {
            FetchOutcome::Ready(bytes) => bytes,
            other => panic!("expected bytes, got {other:?}"),
        };
        assert_eq!(bif::Bif::decode(bytes).unwrap().len(), 1);
        assert_eq!(
            source.fetch_bif(id(READY), 640).await.unwrap(),
            FetchOutcome::NotFound
        );
    }

    #[tokio::test]
    async fn other_statuses_are_errors() {
        let source = serve().await;
        assert_matches!(
            source.fetch_manifest(id(BROKEN)).await,
            Err(ClientError::UnexpectedStatus { status: 500, .. })
        );
    }
}
