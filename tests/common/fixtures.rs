//! Wire payloads and mock routes of the job service

use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// One job as the service serializes it
pub fn job(id: &str, status: &str, title: Option<&str>, download_url: Option<&str>) -> Value {
    json!({
        "id": id,
        "status": status,
        "video_info": title.map(|t| json!({"title": t, "duration": 52})),
        "download_url": download_url,
        "error_message": if status == "failed" { json!("conversion failed") } else { Value::Null },
        "created_at": "2024-05-01T12:00:00"
    })
}

/// Body of `GET /downloads/my`
pub fn mine_page(jobs: Vec<Value>, total: u64, page: u32) -> Value {
    json!({"downloads": jobs, "total": total, "page": page, "per_page": 10})
}

/// Body of `GET /downloads/global`
pub fn global_page(titles: &[&str], total: u64, page: u32) -> Value {
    let activity: Vec<Value> = titles
        .iter()
        .map(|t| json!({"video_title": t, "created_at": "2024-05-01T12:00:00Z"}))
        .collect();
    json!({"activity": activity, "total": total, "page": page, "per_page": 10})
}

/// Serve an empty global feed so only the session feed matters
pub async fn mount_empty_global(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/downloads/global"))
        .respond_with(ResponseTemplate::new(200).set_body_json(global_page(&[], 0, 1)))
        .mount(server)
        .await;
}

/// Serve `body` on the session feed
pub async fn mount_mine(server: &MockServer, body: Value) {
    Mock::given(method("GET"))
        .and(path("/api/downloads/my"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// Accept the lifecycle release signal
pub async fn mount_release(server: &MockServer) {
    Mock::given(method("DELETE"))
        .and(path("/api/downloads/cleanup-user"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "ok"})))
        .mount(server)
        .await;
}
