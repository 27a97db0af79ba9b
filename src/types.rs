//! Core types for jobwatch

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Server-assigned job identifier
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Create a new JobId
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for JobId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for JobId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Job status as reported by the job service
///
/// Transitions only move forward. `Failed` and `Expired` are terminal;
/// `Completed` can only be superseded by `Expired` once the artifact is reclaimed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Accepted, not yet started
    Pending,
    /// Being converted
    Processing,
    /// Artifact produced
    Completed,
    /// Conversion failed
    Failed,
    /// Artifact reclaimed by the server
    Expired,
    /// Status string this client does not know; rendered like `Processing`
    #[serde(other)]
    Unknown,
}

impl JobStatus {
    /// Whether no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Failed | JobStatus::Expired)
    }

    fn rank(&self) -> u8 {
        match self {
            JobStatus::Pending => 0,
            JobStatus::Processing | JobStatus::Unknown => 1,
            JobStatus::Completed | JobStatus::Failed => 2,
            JobStatus::Expired => 3,
        }
    }

    /// Whether a later snapshot may legitimately report `next` after `self`
    ///
    /// Staying in the same status is always allowed.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        if *self == next {
            return true;
        }
        match self {
            JobStatus::Failed | JobStatus::Expired => false,
            JobStatus::Completed => next == JobStatus::Expired,
            _ => next.rank() > self.rank(),
        }
    }

    /// Short human-readable label
    pub fn label(&self) -> &'static str {
        match self {
            JobStatus::Pending => "Pending",
            JobStatus::Processing => "Processing",
            JobStatus::Completed => "Completed",
            JobStatus::Failed => "Failed",
            JobStatus::Expired => "Expired",
            JobStatus::Unknown => "Unknown",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Expired => "expired",
            JobStatus::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Descriptive metadata of the source video, resolved by the server
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    /// Source video identifier
    #[serde(default)]
    pub video_id: Option<String>,
    /// Title
    pub title: String,
    /// Description
    #[serde(default)]
    pub description: Option<String>,
    /// Duration in seconds
    #[serde(default)]
    pub duration: Option<u64>,
    /// Thumbnail URL
    #[serde(default)]
    pub thumbnail: Option<String>,
    /// Channel name
    #[serde(default)]
    pub channel_name: Option<String>,
    /// View count
    #[serde(default)]
    pub view_count: Option<u64>,
    /// Formats the source offers (opaque, passed through)
    #[serde(default)]
    pub available_formats: Vec<serde_json::Value>,
}

/// Snapshot of one asynchronous conversion job
///
/// Clients never construct these outside of tests; they only observe server snapshots.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Server-assigned identifier
    pub id: JobId,
    /// Current status
    pub status: JobStatus,
    /// Source metadata, once resolved
    #[serde(default)]
    pub video_info: Option<VideoInfo>,
    /// Locator of the produced artifact (completed and retained only)
    #[serde(default, rename = "download_url")]
    pub resource_url: Option<String>,
    /// Failure reason (failed only)
    #[serde(default)]
    pub error_message: Option<String>,
    /// Creation time
    #[serde(with = "crate::utils::timestamp")]
    pub created_at: DateTime<Utc>,
}

impl JobRecord {
    /// Status to render
    ///
    /// A `completed` record without a resource locator is inconsistent and is
    /// shown as still processing.
    pub fn effective_status(&self) -> JobStatus {
        match (self.status, &self.resource_url) {
            (JobStatus::Completed, None) => JobStatus::Processing,
            (JobStatus::Unknown, _) => JobStatus::Processing,
            (status, _) => status,
        }
    }

    /// Artifact locator, only when the record is consistently completed
    pub fn downloadable_url(&self) -> Option<&str> {
        match self.status {
            JobStatus::Completed => self.resource_url.as_deref(),
            _ => None,
        }
    }

    /// Failure reason, only when the record is failed
    pub fn failure_reason(&self) -> Option<&str> {
        match self.status {
            JobStatus::Failed => self.error_message.as_deref(),
            _ => None,
        }
    }

    /// Source title, if the server has resolved it
    pub fn title(&self) -> Option<&str> {
        self.video_info.as_ref().map(|info| info.title.as_str())
    }
}

/// Privacy-reduced entry of the global activity feed
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GlobalActivity {
    /// Title of the requested video (absent until resolved)
    #[serde(default)]
    pub video_title: Option<String>,
    /// Request time
    #[serde(with = "crate::utils::timestamp")]
    pub created_at: DateTime<Utc>,
}

/// One page of a feed, in server order
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeedPage<T> {
    /// Items in server order
    pub items: Vec<T>,
    /// Total number of items across all pages
    pub total: u64,
    /// 1-based page number
    pub page: u32,
    /// Page size used by the server
    pub per_page: u32,
}

impl<T> FeedPage<T> {
    /// An empty first page
    pub fn empty(per_page: u32) -> Self {
        Self {
            items: Vec::new(),
            total: 0,
            page: 1,
            per_page: per_page.max(1),
        }
    }

    /// Number of pages implied by `total` and `per_page` (at least 1)
    pub fn page_count(&self) -> u32 {
        let per_page = u64::from(self.per_page.max(1));
        let pages = self.total.div_ceil(per_page).max(1);
        u32::try_from(pages).unwrap_or(u32::MAX)
    }
}

/// Which paginated feed a synchronizer keeps fresh
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedKind {
    /// Jobs of the calling session
    Mine,
    /// Cross-client activity
    Global,
}

impl std::fmt::Display for FeedKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeedKind::Mine => f.write_str("mine"),
            FeedKind::Global => f.write_str("global"),
        }
    }
}

/// Output format of a conversion job
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// MP4 video
    #[default]
    VideoMp4,
    /// WebM video
    VideoWebm,
    /// MP3 audio
    AudioMp3,
    /// AAC audio
    AudioAac,
}

impl OutputFormat {
    /// Whether this format carries audio only
    pub fn is_audio(&self) -> bool {
        matches!(self, OutputFormat::AudioMp3 | OutputFormat::AudioAac)
    }
}

/// Body of `POST /download`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DownloadRequest {
    /// Source URL
    pub url: String,
    /// Output format
    #[serde(default)]
    pub format: OutputFormat,
    /// Quality hint ("best", "1080p", "720p", ...)
    #[serde(default = "default_quality")]
    pub quality: String,
    /// Extract audio only
    #[serde(default)]
    pub audio_only: bool,
}

fn default_quality() -> String {
    "best".to_string()
}

impl DownloadRequest {
    /// Request with default format and quality
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            format: OutputFormat::default(),
            quality: default_quality(),
            audio_only: false,
        }
    }

    /// Set the output format; audio formats also set `audio_only`
    pub fn format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self.audio_only = self.audio_only || format.is_audio();
        self
    }

    /// Set the quality hint
    pub fn quality(mut self, quality: impl Into<String>) -> Self {
        self.quality = quality.into();
        self
    }
}

/// Response of `GET /download/{id}/status`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobStatusReport {
    /// Job identifier
    pub id: JobId,
    /// Current status
    pub status: JobStatus,
    /// Progress in percent
    #[serde(default)]
    pub progress: Option<f64>,
    /// Failure reason
    #[serde(default)]
    pub error_message: Option<String>,
    /// Produced file name
    #[serde(default)]
    pub file_name: Option<String>,
    /// Produced file size in MB
    #[serde(default)]
    pub file_size: Option<f64>,
    /// Artifact locator
    #[serde(default)]
    pub download_url: Option<String>,
}

/// Response of `POST /downloads/cleanup`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    /// Number of jobs whose resources were reclaimed
    pub cleaned_count: u64,
}

/// Host visibility state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// In the foreground
    Visible,
    /// Backgrounded or suspended
    Hidden,
}

/// What fired a cleanup signal
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleTrigger {
    /// Pre-unload warning
    BeforeUnload,
    /// Visibility became hidden
    VisibilityHidden,
    /// Final unload
    Unload,
}

impl std::fmt::Display for LifecycleTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleTrigger::BeforeUnload => f.write_str("before_unload"),
            LifecycleTrigger::VisibilityHidden => f.write_str("visibility_hidden"),
            LifecycleTrigger::Unload => f.write_str("unload"),
        }
    }
}

/// How a lifecycle cleanup signal left the client
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Delivery {
    /// Ordinary request, abortable by teardown
    Ordinary,
    /// Fire-and-forget beacon
    Beacon,
    /// Detached request that outlives teardown (beacon fallback)
    KeepAlive,
    /// Nothing was sent (trigger did not apply, or no transport could take it)
    NotSent,
}

/// Event emitted while synchronizing feeds and dispatching actions
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A feed published a new snapshot
    SnapshotUpdated {
        /// Feed
        feed: FeedKind,
        /// Page of the snapshot
        page: u32,
        /// Items on the page
        items: usize,
        /// Total items on the server
        total: u64,
    },

    /// A feed fetch failed; the previous snapshot was kept
    FeedError {
        /// Feed
        feed: FeedKind,
        /// Page that was requested
        page: u32,
        /// Presentable message
        message: String,
    },

    /// A fetch result arrived for a page that is no longer wanted
    StaleResultDiscarded {
        /// Feed
        feed: FeedKind,
        /// Page the result was for
        page: u32,
    },

    /// A lifecycle cleanup signal was issued
    CleanupSignalSent {
        /// Trigger
        trigger: LifecycleTrigger,
        /// Channel used
        delivery: Delivery,
    },

    /// A lifecycle cleanup signal failed or was abandoned by teardown (logged only)
    CleanupSignalFailed {
        /// Trigger
        trigger: LifecycleTrigger,
        /// Error message
        error: String,
    },

    /// Manual cleanup finished
    CleanupCompleted {
        /// Reclaimed job count
        cleaned_count: u64,
    },

    /// A file was saved locally
    FileSaved {
        /// Final path
        path: PathBuf,
        /// Size in bytes
        size_bytes: u64,
    },

    /// Client is shutting down
    Shutdown,
}
