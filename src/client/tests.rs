use super::*;
use crate::types::JobStatus;
use serde_json::json;
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::timeout;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_feeds(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/downloads/my"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "downloads": [{
                "id": "j1",
                "status": "completed",
                "video_info": {"title": "Sintel"},
                "download_url": "/downloads/j1.mp4",
                "error_message": null,
                "created_at": "2024-05-01T12:00:00"
            }],
            "total": 1,
            "page": 1,
            "per_page": 10
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/downloads/global"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "activity": [{"video_title": "Sintel", "created_at": "2024-05-01T12:00:00"}],
            "total": 1,
            "page": 1,
            "per_page": 10
        })))
        .mount(server)
        .await;
}

async fn client_for(server: &MockServer, dir: &TempDir) -> JobClient {
    let mut config = Config::default();
    config.server.base_url = server.uri();
    config.materialize.download_dir = dir.path().to_path_buf();
    config.polling.mine_interval = Duration::from_secs(60);
    config.polling.global_interval = Duration::from_secs(60);
    config.cleanup.teardown_grace = Duration::from_millis(200);
    JobClient::new(config).await.unwrap()
}

async fn requests_to(server: &MockServer, http_method: &str, route: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.method.as_str() == http_method && r.url.path() == route)
        .count()
}

/// Poll the mock server until `route` has seen `count` requests
async fn wait_for_requests(server: &MockServer, http_method: &str, route: &str, count: usize) {
    for _ in 0..100 {
        if requests_to(server, http_method, route).await >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("{} {} never reached {} requests", http_method, route, count);
}

#[tokio::test]
async fn new_client_publishes_both_feeds() {
    let server = MockServer::start().await;
    mount_feeds(&server).await;
    let dir = TempDir::new().unwrap();

    let client = client_for(&server, &dir).await;
    let mut mine = client.mine().subscribe();
    let mut global = client.global().subscribe();

    if mine.borrow().is_none() {
        timeout(Duration::from_secs(2), mine.changed()).await.unwrap().unwrap();
    }
    if global.borrow().is_none() {
        timeout(Duration::from_secs(2), global.changed()).await.unwrap().unwrap();
    }

    let page = client.mine().snapshot().unwrap();
    assert_eq!(page.items[0].status, JobStatus::Completed);
    assert_eq!(
        client.global().snapshot().unwrap().items[0].video_title.as_deref(),
        Some("Sintel")
    );

    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn create_job_resyncs_session_feed() {
    let server = MockServer::start().await;
    mount_feeds(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/download"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "j2",
            "status": "pending",
            "created_at": "2024-05-01T12:01:00"
        })))
        .mount(&server)
        .await;
    let dir = TempDir::new().unwrap();

    let client = client_for(&server, &dir).await;
    wait_for_requests(&server, "GET", "/api/downloads/my", 1).await;

    let job = client
        .create_job(&DownloadRequest::new("https://youtu.be/x"))
        .await
        .unwrap();
    assert_eq!(job.id.as_str(), "j2");

    wait_for_requests(&server, "GET", "/api/downloads/my", 2).await;
    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn release_and_shutdown_signals_server_and_stops_feeds() {
    let server = MockServer::start().await;
    mount_feeds(&server).await;
    Mock::given(method("DELETE"))
        .and(path("/api/downloads/cleanup-user"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(20)))
        .mount(&server)
        .await;
    let dir = TempDir::new().unwrap();

    let client = client_for(&server, &dir).await;
    let mut events = client.subscribe();

    crate::release_and_shutdown(&client).await.unwrap();

    // pre-unload request and unload beacon both reach the server
    wait_for_requests(&server, "DELETE", "/api/downloads/cleanup-user", 2).await;
    assert!(client.is_shut_down());
    assert!(matches!(client.mine().refresh(), Err(Error::ShuttingDown)));

    let mut saw_shutdown = false;
    let mut abandoned = false;
    while let Ok(event) = events.try_recv() {
        saw_shutdown |= matches!(event, Event::Shutdown);
        abandoned |= matches!(event, Event::CleanupSignalFailed { .. });
    }
    assert!(saw_shutdown);
    assert!(!abandoned, "pre-unload signal should finish before teardown");

    // second shutdown is harmless
    client.shutdown().await.unwrap();
}

#[tokio::test]
async fn download_file_uses_direct_route() {
    let server = MockServer::start().await;
    mount_feeds(&server).await;
    Mock::given(method("GET"))
        .and(path("/api/download/j1/file"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-disposition", "attachment; filename=\"sintel.mp4\"")
                .set_body_bytes(b"bytes".to_vec()),
        )
        .expect(1)
        .mount(&server)
        .await;
    let dir = TempDir::new().unwrap();

    let client = client_for(&server, &dir).await;
    let saved = client.download_file(&JobId::new("j1"), None).await.unwrap();

    assert_eq!(saved.path, dir.path().join("sintel.mp4"));
    client.shutdown().await.unwrap();
}
