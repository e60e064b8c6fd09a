//! Shared fixtures for the API integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use trickplay_api::config::ServerConfig;
use trickplay_api::router::build_app_router;
use trickplay_api::state::AppState;
use trickplay_core::config::TrickplayConfig;
use trickplay_core::media::{MediaItem, VideoType};
use trickplay_core::types::{ItemId, Timestamp};
use trickplay_pipeline::bulk::BulkJobs;
use trickplay_pipeline::generator::TrickplayGenerator;
use trickplay_pipeline::library::InMemoryLibrary;
use trickplay_pipeline::monitor::TracingMonitor;
use trickplay_pipeline::serving::TrickplayService;

pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:8096".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
    }
}

/// A router over an in-memory library holding one eligible video, with a
/// shell script standing in for ffmpeg.
pub struct TestApp {
    pub dir: tempfile::TempDir,
    pub app: Router,
    pub trickplay: Arc<TrickplayService>,
    pub jobs: Arc<BulkJobs>,
    pub library: Arc<InMemoryLibrary>,
    pub item: MediaItem,
    pub calls: PathBuf,
}

pub fn build_test_app(tweak: impl FnOnce(&mut TrickplayConfig)) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let calls = dir.path().join("calls");
    let ffmpeg = fake_ffmpeg(dir.path(), &calls, &[100, 150, 120]);

    let mut trickplay_config = TrickplayConfig {
        widths: vec![320],
        stall_poll: Duration::from_secs(5),
        process_niceness: 0,
        ffmpeg_path: ffmpeg,
        media_root: dir.path().join("media"),
        data_dir: dir.path().join("data"),
        ..TrickplayConfig::default()
    };
    tweak(&mut trickplay_config);
    let trickplay_config = Arc::new(trickplay_config);

    let item = media_item(dir.path(), "feature");
    let library = Arc::new(InMemoryLibrary::new([item.clone()]));
    let generator = Arc::new(TrickplayGenerator::new(
        Arc::clone(&trickplay_config),
        Arc::new(TracingMonitor),
    ));
    let shutdown = CancellationToken::new();
    let trickplay = Arc::new(TrickplayService::new(
        Arc::clone(&trickplay_config),
        library.clone(),
        Arc::clone(&generator),
        shutdown.child_token(),
    ));
    let jobs = Arc::new(BulkJobs::new(generator, library.clone(), shutdown));

    let config = test_config();
    let state = AppState {
        config: Arc::new(config.clone()),
        trickplay: Arc::clone(&trickplay),
        jobs: Arc::clone(&jobs),
    };

    TestApp {
        app: build_app_router(state, &config),
        dir,
        trickplay,
        jobs,
        library,
        item,
        calls,
    }
}

/// Eligible two-minute video backed by a real file under `dir/media`.
pub fn media_item(dir: &Path, name: &str) -> MediaItem {
    let media = dir.join("media");
    std::fs::create_dir_all(&media).unwrap();
    let path = media.join(format!("{name}.mkv"));
    std::fs::write(&path, b"stand-in source").unwrap();
    let id = ItemId::from_path(&path);
    MediaItem {
        id,
        name: name.to_string(),
        path,
        container: None,
        video_type: VideoType::File,
        is_shortcut: false,
        is_virtual: false,
        runtime: Some(Duration::from_secs(300)),
        date_modified: Timestamp::from_timestamp(1_700_000_000, 0).unwrap(),
        metadata_dir: dir.join("data").join("metadata").join(id.to_string()),
    }
}

/// Script that records each run in `calls` and writes one frame per entry
/// of `frame_sizes` next to its output pattern (the last argument).
pub fn fake_ffmpeg(dir: &Path, calls: &Path, frame_sizes: &[usize]) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let mut body = format!(
        "#!/bin/sh\necho run >> '{}'\nfor last; do :; done\nout=$(dirname \"$last\")\n",
        calls.display()
    );
    for (i, size) in frame_sizes.iter().enumerate() {
        body.push_str(&format!(
            "head -c {size} /dev/zero > \"$out/img_{:08}.jpg\"\n",
            i + 1
        ));
    }
    let path = dir.join("ffmpeg.sh");
    std::fs::write(&path, body).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

pub fn call_count(calls: &Path) -> usize {
    std::fs::read_to_string(calls)
        .map(|s| s.lines().count())
        .unwrap_or(0)
}

pub async fn send(app: &Router, method: Method, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.clone().oneshot(request).await.unwrap()
}

pub async fn get(app: &Router, uri: &str) -> Response<Body> {
    send(app, Method::GET, uri).await
}

pub async fn post(app: &Router, uri: &str) -> Response<Body> {
    send(app, Method::POST, uri).await
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}
