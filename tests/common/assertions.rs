//! Waiting helpers for asynchronous client state

use jobwatch::{Event, FeedHandle, FeedPage};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use wiremock::MockServer;

/// Wait until the feed publishes a snapshot satisfying `pred`
pub async fn wait_for_snapshot<T, F>(
    feed: &FeedHandle<T>,
    timeout: Duration,
    pred: F,
) -> Option<Arc<FeedPage<T>>>
where
    F: Fn(&FeedPage<T>) -> bool,
{
    let mut snapshots = feed.subscribe();
    tokio::time::timeout(timeout, async {
        loop {
            let current = snapshots.borrow_and_update().clone();
            if let Some(page) = current
                && pred(&page)
            {
                return Some(page);
            }
            if snapshots.changed().await.is_err() {
                return None;
            }
        }
    })
    .await
    .ok()
    .flatten()
}

/// Wait until the feed reports an error
pub async fn wait_for_error<T>(feed: &FeedHandle<T>, timeout: Duration) -> Option<String> {
    let mut errors = feed.errors();
    tokio::time::timeout(timeout, async {
        loop {
            let current = errors.borrow_and_update().clone();
            if let Some(message) = current {
                return Some(message);
            }
            if errors.changed().await.is_err() {
                return None;
            }
        }
    })
    .await
    .ok()
    .flatten()
}

/// Wait for the first event matching `pred`
pub async fn wait_for_event<F>(
    events: &mut broadcast::Receiver<Event>,
    timeout: Duration,
    pred: F,
) -> Option<Event>
where
    F: Fn(&Event) -> bool,
{
    tokio::time::timeout(timeout, async {
        loop {
            match events.recv().await {
                Ok(event) if pred(&event) => return Some(event),
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
    .await
    .ok()
    .flatten()
}

/// Number of requests `server` received for `http_method` on `route`
pub async fn request_count(server: &MockServer, http_method: &str, route: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.method.as_str() == http_method && r.url.path() == route)
        .count()
}

/// Wait until `route` has received at least `count` requests
pub async fn wait_for_requests(
    server: &MockServer,
    http_method: &str,
    route: &str,
    count: usize,
    timeout: Duration,
) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if request_count(server, http_method, route).await >= count {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
