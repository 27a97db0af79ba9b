//! Job queue service access
//!
//! [`JobQueue`] is the seam between the synchronization core and the server.
//! [`HttpJobQueue`] is the reqwest-backed implementation; tests substitute
//! their own implementations to script timing and failures.

mod http;


pub use http::{HttpJobQueue, MAX_PENDING_BEACONS};
pub(crate) use http::error_from_response;

use crate::error::Result;
use crate::types::{
    CleanupReport, DownloadRequest, FeedPage, GlobalActivity, JobId, JobRecord, JobStatusReport,
    VideoInfo,
};
use async_trait::async_trait;

/// Operations offered by the job queue service
///
/// Session credentials travel implicitly with every call (cookies held by the
/// implementation); callers never pass them.
#[async_trait]
pub trait JobQueue: Send + Sync + 'static {
    /// Request a new conversion job (`POST /download`)
    ///
    /// Rejections come back as [`Error::Api`](crate::Error::Api) for the caller
    /// to classify; they are never retried.
    async fn create_job(&self, request: &DownloadRequest) -> Result<JobRecord>;

    /// One page of the calling session's jobs (`GET /downloads/my`)
    async fn my_jobs(&self, page: u32, per_page: u32) -> Result<FeedPage<JobRecord>>;

    /// One page of cross-client activity (`GET /downloads/global`)
    async fn global_activity(&self, page: u32, per_page: u32)
    -> Result<FeedPage<GlobalActivity>>;

    /// Status probe of a single job (`GET /download/{id}/status`)
    async fn job_status(&self, id: &JobId) -> Result<JobStatusReport>;

    /// Resolve source metadata without creating a job (`POST /video/info`)
    async fn video_info(&self, url: &str) -> Result<VideoInfo>;

    /// Ask the server to reclaim everything held for this session
    /// (`DELETE /downloads/cleanup-user`)
    ///
    /// Idempotent on the server; the response body is ignored.
    async fn release_session(&self) -> Result<()>;

    /// User-initiated reclamation (`POST /downloads/cleanup`)
    async fn cleanup(&self) -> Result<CleanupReport>;
}
