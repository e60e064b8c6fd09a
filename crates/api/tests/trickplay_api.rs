//! Manifest and BIF endpoints: cache hits, on-demand generation and the
//! 503 / 404 split.

mod common;

use axum::http::{header, StatusCode};
use common::{body_bytes, body_json, build_test_app, call_count, get};
use trickplay_core::bif::{self, Bif};
use trickplay_core::cache::{ArtifactResolver, StoragePolicy};

#[tokio::test]
async fn manifest_miss_is_503_then_200() {
    let t = build_test_app(|_| {});
    let uri = format!("/manifest/{}", t.item.id);

    let response = get(&t.app, &uri).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(response).await["code"], "NOT_READY");

    t.trickplay.wait_idle().await;

    let response = get(&t.app, &uri).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["widthResolutions"], serde_json::json!([320]));
    assert!(json["version"].is_string());
}

#[tokio::test]
async fn bif_is_streamed_as_octet_stream() {
    let t = build_test_app(|_| {});
    let uri = format!("/bif/{}/320", t.item.id);

    assert_eq!(get(&t.app, &uri).await.status(), StatusCode::SERVICE_UNAVAILABLE);
    t.trickplay.wait_idle().await;

    let response = get(&t.app, &uri).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/octet-stream"
    );
    let bytes = body_bytes(response).await;
    // 64-byte header, 4 index entries, 370 bytes of frames.
    assert_eq!(bytes.len(), 466);
    let decoded = Bif::decode(bytes).unwrap();
    assert_eq!(decoded.len(), 3);
    assert_eq!(decoded.interval_ms(), 10_000);
    assert_eq!(call_count(&t.calls), 1);
}

#[tokio::test]
async fn existing_artifact_is_served_without_extraction() {
    let t = build_test_app(|_| {});
    let path = ArtifactResolver::artifact_path(StoragePolicy::Internal, &t.item, 320);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let stored = bif::encode(&[b"one".as_slice(), b"two".as_slice()], 1_000).unwrap();
    std::fs::write(&path, &stored).unwrap();

    let response = get(&t.app, &format!("/bif/{}/320", t.item.id)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, stored);
    assert_eq!(call_count(&t.calls), 0);
}

#[tokio::test]
async fn unconfigured_width_is_404() {
    let t = build_test_app(|_| {});
    let response = get(&t.app, &format!("/bif/{}/1280", t.item.id)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["code"], "NOT_FOUND");
}

#[tokio::test]
async fn unknown_item_is_404() {
    let t = build_test_app(|_| {});
    let response = get(&t.app, "/manifest/00000000000000000000000000000000").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_item_id_is_400() {
    let t = build_test_app(|_| {});
    let response = get(&t.app, "/manifest/not-an-id").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn on_demand_disabled_is_404() {
    let t = build_test_app(|c| c.on_demand_generation = false);
    let response = get(&t.app, &format!("/manifest/{}", t.item.id)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    t.trickplay.wait_idle().await;
    assert_eq!(call_count(&t.calls), 0);
}
