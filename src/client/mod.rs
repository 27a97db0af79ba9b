//! Client façade tying the components together.
//!
//! The `JobClient` struct owns:
//! - the HTTP job queue (session cookies live in its reqwest client)
//! - one [`FeedSynchronizer`] per feed ("mine" every 5s, "global" every 10s by default)
//! - the [`CleanupDispatcher`] for lifecycle and manual cleanup
//! - the [`Materializer`] for saving artifacts
//!
//! Startup and shutdown live in [`lifecycle`].

mod lifecycle;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use crate::cleanup::CleanupDispatcher;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::materialize::{DirectoryTarget, Materializer, SavedFile};
use crate::service::{HttpJobQueue, JobQueue};
use crate::sync::{FeedHandle, FeedSynchronizer, GlobalFeed, MineFeed, SyncOptions};
use crate::types::{
    CleanupReport, DownloadRequest, Event, FeedKind, GlobalActivity, JobId, JobRecord,
    JobStatusReport, VideoInfo,
};
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Capacity of the event broadcast channel
const EVENT_BUFFER: usize = 1000;

/// Job service client (cloneable - all fields are shared)
#[derive(Clone)]
pub struct JobClient {
    /// Configuration
    pub(crate) config: Arc<Config>,
    /// Job queue service
    pub(crate) queue: Arc<HttpJobQueue>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: broadcast::Sender<Event>,
    /// Session-scoped feed
    pub(crate) mine: FeedHandle<JobRecord>,
    /// Cross-client activity feed
    pub(crate) global: FeedHandle<GlobalActivity>,
    /// Lifecycle and manual cleanup
    pub(crate) cleanup: CleanupDispatcher,
    /// Artifact saving
    pub(crate) materializer: Materializer,
    /// Stops both feed synchronizers
    pub(crate) shutdown_token: CancellationToken,
    /// Synchronizer tasks, awaited on shutdown
    pub(crate) tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl JobClient {
    /// Create a client and start polling both feeds
    ///
    /// - Validates the configuration
    /// - Creates the download directory
    /// - Builds the HTTP client with a session cookie store
    /// - Spawns the "mine" and "global" synchronizers (first fetch is immediate)
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;

        tokio::fs::create_dir_all(&config.materialize.download_dir)
            .await
            .map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create download directory '{}': {}",
                        config.materialize.download_dir.display(),
                        e
                    ),
                ))
            })?;

        let config = Arc::new(config);
        let queue = Arc::new(HttpJobQueue::new(config.clone())?);
        let (event_tx, _rx) = broadcast::channel(EVENT_BUFFER);
        let shutdown_token = CancellationToken::new();
        let per_page = config.polling.effective_per_page();

        let (mine, mine_task) = FeedSynchronizer::spawn(
            MineFeed::new(queue.clone()),
            SyncOptions {
                interval: config.polling.interval(FeedKind::Mine),
                per_page,
            },
            event_tx.clone(),
            shutdown_token.child_token(),
        );
        let (global, global_task) = FeedSynchronizer::spawn(
            GlobalFeed::new(queue.clone()),
            SyncOptions {
                interval: config.polling.interval(FeedKind::Global),
                per_page,
            },
            event_tx.clone(),
            shutdown_token.child_token(),
        );

        let cleanup = CleanupDispatcher::new(
            queue.clone(),
            queue.clone(),
            config.cleanup.signal_timeout,
            event_tx.clone(),
        )
        .with_mine_feed(mine.clone());

        let materializer = Materializer::new(
            queue.client().clone(),
            config.origin()?,
            Arc::new(DirectoryTarget::new(config.materialize.download_dir.clone())),
            config.materialize.default_file_name.clone(),
            event_tx.clone(),
        );

        info!(base_url = %config.server.base_url, per_page, "job client started");

        Ok(Self {
            config,
            queue,
            event_tx,
            mine,
            global,
            cleanup,
            materializer,
            shutdown_token,
            tasks: Arc::new(Mutex::new(vec![mine_task, global_task])),
        })
    }

    /// Subscribe to client events
    ///
    /// Each subscriber receives all events independently. A subscriber that
    /// falls more than 1000 events behind gets `RecvError::Lagged`.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Configuration the client was built with
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Session-scoped feed
    pub fn mine(&self) -> &FeedHandle<JobRecord> {
        &self.mine
    }

    /// Cross-client activity feed
    pub fn global(&self) -> &FeedHandle<GlobalActivity> {
        &self.global
    }

    /// Cleanup dispatcher; wire host lifecycle events to its `on_*` methods
    pub fn cleanup(&self) -> &CleanupDispatcher {
        &self.cleanup
    }

    /// Artifact materializer
    pub fn materializer(&self) -> &Materializer {
        &self.materializer
    }

    /// Request a conversion job
    ///
    /// On success the session feed is re-synchronized so the new job shows up
    /// without waiting for the next tick. Failures are returned as-is (classify
    /// them with [`classify_error`](crate::classify::classify_error)); nothing
    /// is retried.
    pub async fn create_job(&self, request: &DownloadRequest) -> Result<JobRecord> {
        match self.queue.create_job(request).await {
            Ok(job) => {
                info!(job_id = %job.id, status = %job.status, "job created");
                if let Err(e) = self.mine.resync().await {
                    warn!(error = %e, "could not re-synchronize session feed after job creation");
                }
                Ok(job)
            }
            Err(e) => {
                warn!(url = %request.url, error = %e, "job creation failed");
                Err(e)
            }
        }
    }

    /// Status probe of a single job
    pub async fn job_status(&self, id: &JobId) -> Result<JobStatusReport> {
        self.queue.job_status(id).await
    }

    /// Source metadata lookup
    pub async fn video_info(&self, url: &str) -> Result<VideoInfo> {
        self.queue.video_info(url).await
    }

    /// User-initiated cleanup; see [`CleanupDispatcher::manual_cleanup`]
    pub async fn manual_cleanup(&self) -> Result<CleanupReport> {
        self.cleanup.manual_cleanup().await
    }

    /// Save a completed job's artifact into the download directory
    pub async fn download(&self, job: &JobRecord) -> Result<SavedFile> {
        self.materializer.materialize_job(job).await
    }

    /// Save a job's artifact through the direct file route (`GET /download/{id}/file`)
    pub async fn download_file(&self, id: &JobId, fallback_name: Option<&str>) -> Result<SavedFile> {
        let path = format!("/download/{}/file", urlencoding::encode(id.as_str()));
        let url = self.config.api_url(&path)?;
        self.materializer.materialize(url.as_str(), fallback_name).await
    }
}
