//! Integration tests for the drum-hit estimation server

mod common;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
};
use tower::ServiceExt;

use common::*;

#[tokio::test]
async fn test_health_check() {
    let dir = tempfile::tempdir().unwrap();
    let app = create_test_app(&test_config(dir.path()));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(body, "ok");
}

#[tokio::test]
async fn test_health_check_api_prefix() {
    let dir = tempfile::tempdir().unwrap();
    let app = create_test_app(&test_config(dir.path()));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_upload_audio_success() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let app = create_test_app(&config);

    let body = multipart_body("file", "clicks.wav", &click_wav_bytes(4.0));

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/upload-audio")
                .header("content-type", multipart_content_type())
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(json["file"], "clicks.wav");
    assert!(json["message"].is_string());
    assert!(json["estimated_hits"].is_number());
    assert!(json["estimated_hits"].as_u64().unwrap() > 0);

    let plot_url = json["plot_url"].as_str().unwrap();
    assert!(plot_url.starts_with("/plots/"));
    assert!(plot_url.ends_with("_plot.png"));

    // The plot must be served back
    let response = app
        .oneshot(
            Request::builder()
                .uri(plot_url)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "image/png"
    );
    let png = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&png[..4], &[0x89, b'P', b'N', b'G']);
}

#[tokio::test]
async fn test_upload_persists_audio_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let app = create_test_app(&config);

    let body = multipart_body("file", "clicks.wav", &click_wav_bytes(2.0));

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/upload-audio")
                .header("content-type", multipart_content_type())
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let uploads: Vec<_> = std::fs::read_dir(&config.upload_dir)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(uploads.len(), 1);
    let stored = uploads[0].file_name().into_string().unwrap();
    assert!(stored.ends_with("clicks.wav"));

    let plots: Vec<_> = std::fs::read_dir(&config.plot_dir)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(plots.len(), 1);
}

#[tokio::test]
async fn test_upload_rejects_bad_extension() {
    let dir = tempfile::tempdir().unwrap();
    let app = create_test_app(&test_config(dir.path()));

    let body = multipart_body("file", "notes.txt", b"not audio");

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/upload-audio")
                .header("content-type", multipart_content_type())
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert!(json["error"].is_string());
    assert_eq!(json["code"], 400);
}

#[tokio::test]
async fn test_upload_rejects_oversized_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = server::config::ServerConfig {
        max_upload_bytes: 1024,
        ..test_config(dir.path())
    };
    let app = create_test_app(&config);

    let body = multipart_body("file", "big.wav", &vec![0u8; 4096]);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/upload-audio")
                .header("content-type", multipart_content_type())
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_upload_rejects_missing_file_field() {
    let dir = tempfile::tempdir().unwrap();
    let app = create_test_app(&test_config(dir.path()));

    let body = multipart_body("other", "clicks.wav", &click_wav_bytes(1.0));

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/upload-audio")
                .header("content-type", multipart_content_type())
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_upload_rejects_corrupt_audio() {
    let dir = tempfile::tempdir().unwrap();
    let app = create_test_app(&test_config(dir.path()));

    let body = multipart_body("file", "broken.wav", b"definitely not a wav file");

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/upload-audio")
                .header("content-type", multipart_content_type())
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["code"], 500);
}

#[tokio::test]
async fn test_process_link_rejects_invalid_url() {
    let dir = tempfile::tempdir().unwrap();
    let app = create_test_app(&test_config(dir.path()));

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/process-link")
                .header("content-type", "application/x-www-form-urlencoded")
                .body(Body::from("link=not%20a%20url"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_process_link_rejects_empty_link() {
    let dir = tempfile::tempdir().unwrap();
    let app = create_test_app(&test_config(dir.path()));

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/process-link")
                .header("content-type", "application/x-www-form-urlencoded")
                .body(Body::from("link="))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_get_plot_unknown_name() {
    let dir = tempfile::tempdir().unwrap();
    let app = create_test_app(&test_config(dir.path()));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/plots/nope_plot.png")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let dir = tempfile::tempdir().unwrap();
    let app = create_test_app(&test_config(dir.path()));

    // One successful upload so the counters move
    let body = multipart_body("file", "clicks.wav", &click_wav_bytes(1.0));
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/upload-audio")
                .header("content-type", multipart_content_type())
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

    assert!(json["system"]["memory_total_mb"].is_number());
    assert_eq!(json["upload"]["request_count"], 1);
    assert_eq!(json["analysis"]["clips_analyzed"], 1);
}

#[tokio::test]
async fn test_not_found_endpoint() {
    let dir = tempfile::tempdir().unwrap();
    let app = create_test_app(&test_config(dir.path()));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/nonexistent")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
