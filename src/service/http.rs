//! reqwest-backed [`JobQueue`] implementation.

use crate::cleanup::CleanupTransport;
use crate::config::Config;
use crate::error::{Error, ErrorBody, Result};
use crate::types::{
    CleanupReport, DownloadRequest, FeedPage, GlobalActivity, JobId, JobRecord, JobStatusReport,
    VideoInfo,
};
use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::JobQueue;

/// Detached cleanup beacons allowed in flight at once
pub const MAX_PENDING_BEACONS: usize = 4;

/// Wire shape of `GET /downloads/my`
#[derive(Deserialize)]
struct JobPageWire {
    downloads: Vec<JobRecord>,
    total: u64,
    page: u32,
    per_page: u32,
}

/// Wire shape of `GET /downloads/global`
#[derive(Deserialize)]
struct ActivityPageWire {
    activity: Vec<GlobalActivity>,
    total: u64,
    page: u32,
    per_page: u32,
}

impl From<JobPageWire> for FeedPage<JobRecord> {
    fn from(wire: JobPageWire) -> Self {
        Self {
            items: wire.downloads,
            total: wire.total,
            page: wire.page,
            per_page: wire.per_page,
        }
    }
}

impl From<ActivityPageWire> for FeedPage<GlobalActivity> {
    fn from(wire: ActivityPageWire) -> Self {
        Self {
            items: wire.activity,
            total: wire.total,
            page: wire.page,
            per_page: wire.per_page,
        }
    }
}

/// Job queue client over HTTP (cloneable - the reqwest client and config are shared)
#[derive(Clone)]
pub struct HttpJobQueue {
    client: reqwest::Client,
    config: Arc<Config>,
    pending_beacons: Arc<AtomicUsize>,
}

impl HttpJobQueue {
    /// Build a client with a session cookie store, the configured timeout and user agent
    pub fn new(config: Arc<Config>) -> Result<Self> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(config.server.request_timeout)
            .user_agent(config.server.user_agent.clone())
            .build()?;
        Ok(Self {
            client,
            config,
            pending_beacons: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Underlying HTTP client (shares the session cookie store)
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Configuration this client was built with
    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    async fn get_page<T: DeserializeOwned>(&self, path: &str, page: u32, per_page: u32) -> Result<T> {
        let url = self.config.api_url(path)?;
        let response = self
            .client
            .get(url)
            .query(&[("page", page.max(1)), ("per_page", per_page.max(1))])
            .send()
            .await?;
        decode(response).await
    }

    async fn delete_session(&self, timeout: Option<Duration>) -> Result<()> {
        let url = self.config.api_url("/downloads/cleanup-user")?;
        let mut request = self.client.delete(url);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        let response = request.send().await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(error_from_response(response).await)
        }
    }
}

#[async_trait]
impl JobQueue for HttpJobQueue {
    async fn create_job(&self, request: &DownloadRequest) -> Result<JobRecord> {
        if request.url.trim().is_empty() {
            return Err(Error::InvalidUrl("source URL is empty".to_string()));
        }
        let url = self.config.api_url("/download")?;
        let response = self.client.post(url).json(request).send().await?;
        decode(response).await
    }

    async fn my_jobs(&self, page: u32, per_page: u32) -> Result<FeedPage<JobRecord>> {
        let wire: JobPageWire = self.get_page("/downloads/my", page, per_page).await?;
        Ok(wire.into())
    }

    async fn global_activity(
        &self,
        page: u32,
        per_page: u32,
    ) -> Result<FeedPage<GlobalActivity>> {
        let wire: ActivityPageWire = self.get_page("/downloads/global", page, per_page).await?;
        Ok(wire.into())
    }

    async fn job_status(&self, id: &JobId) -> Result<JobStatusReport> {
        let path = format!("/download/{}/status", urlencoding::encode(id.as_str()));
        let url = self.config.api_url(&path)?;
        let response = self.client.get(url).send().await?;
        decode(response).await
    }

    async fn video_info(&self, url: &str) -> Result<VideoInfo> {
        let endpoint = self.config.api_url("/video/info")?;
        let response = self
            .client
            .post(endpoint)
            .json(&serde_json::json!({ "url": url }))
            .send()
            .await?;
        decode(response).await
    }

    async fn release_session(&self) -> Result<()> {
        self.delete_session(None).await
    }

    async fn cleanup(&self) -> Result<CleanupReport> {
        let url = self.config.api_url("/downloads/cleanup")?;
        let response = self.client.post(url).send().await?;
        decode(response).await
    }
}

#[async_trait]
impl CleanupTransport for HttpJobQueue {
    async fn send_signal(&self) -> Result<()> {
        self.delete_session(None).await
    }

    /// Refused without a runtime, or while [`MAX_PENDING_BEACONS`] are still in flight
    fn send_beacon(&self) -> bool {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return false;
        };
        let reserved = self
            .pending_beacons
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < MAX_PENDING_BEACONS).then_some(n + 1)
            })
            .is_ok();
        if !reserved {
            tracing::debug!(limit = MAX_PENDING_BEACONS, "cleanup beacon budget exhausted");
            return false;
        }

        let queue = self.clone();
        let timeout = self.config.cleanup.signal_timeout;
        handle.spawn(async move {
            let result = queue.delete_session(Some(timeout)).await;
            queue.pending_beacons.fetch_sub(1, Ordering::SeqCst);
            match result {
                Ok(()) => tracing::debug!("cleanup beacon delivered"),
                Err(e) => tracing::warn!(error = %e, "cleanup beacon failed"),
            }
        });
        true
    }
}

/// Decode a success body, or turn a failure into an [`Error`]
async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    if response.status().is_success() {
        Ok(response.json::<T>().await?)
    } else {
        Err(error_from_response(response).await)
    }
}

/// Build an error from a non-success response
///
/// A `{"detail": ...}` body becomes [`Error::Api`]; anything else becomes
/// [`Error::Http`] with the canonical reason phrase.
pub(crate) async fn error_from_response(response: reqwest::Response) -> Error {
    let status = response.status();
    let reason = status.canonical_reason().unwrap_or("Unknown").to_string();

    match response.bytes().await {
        Ok(body) => match serde_json::from_slice::<ErrorBody>(&body) {
            Ok(body) => Error::Api {
                status: status.as_u16(),
                detail: body.detail,
            },
            Err(_) => Error::Http {
                status: status.as_u16(),
                reason,
            },
        },
        Err(_) => Error::Http {
            status: status.as_u16(),
            reason,
        },
    }
}
