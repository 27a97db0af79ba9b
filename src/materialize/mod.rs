//! Local saving of completed job artifacts
//!
//! [`Materializer::materialize`] fetches a resource, picks a file name and hands
//! the bytes to a [`SaveTarget`]. The target stages the bytes, commits them to
//! their final location and then releases the staged object. Release runs
//! exactly once per invocation, whether or not the commit succeeded.
//!
//! File name precedence: `Content-Disposition` (`filename*` over `filename`),
//! then the caller's fallback, then the configured default.


use crate::error::{Error, Result};
use crate::service::error_from_response;
use crate::types::{Event, JobRecord};
use crate::utils::{content_disposition_filename, get_unique_path, resolve_url, sanitize_file_name};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use url::Url;

/// Extension assumed for a job artifact whose locator has none
const DEFAULT_EXTENSION: &str = "mp4";

/// Bytes staged by a [`SaveTarget`], waiting to be committed
///
/// Not `Clone`: [`SaveTarget::release`] consumes it, so each staged object is
/// released at most once.
#[derive(Debug)]
pub struct StagedFile {
    /// Where the staged bytes live
    pub path: PathBuf,
    /// Number of staged bytes
    pub size_bytes: u64,
}

/// Destination of materialized artifacts
#[async_trait]
pub trait SaveTarget: Send + Sync + 'static {
    /// Store `content` in a transient location
    async fn stage(&self, content: &[u8]) -> Result<StagedFile>;

    /// Make the staged bytes permanent under `file_name`; returns the final path
    async fn commit(&self, staged: &StagedFile, file_name: &str) -> Result<PathBuf>;

    /// Drop whatever is left of the staged object
    async fn release(&self, staged: StagedFile);
}

/// Saves into a directory, staging as hidden part-files next to the destination
#[derive(Clone, Debug)]
pub struct DirectoryTarget {
    dir: PathBuf,
}

impl DirectoryTarget {
    /// Target writing into `dir` (created on first use)
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Destination directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl SaveTarget for DirectoryTarget {
    async fn stage(&self, content: &[u8]) -> Result<StagedFile> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self
            .dir
            .join(format!(".jobwatch-{:016x}.part", rand::random::<u64>()));
        let written = tokio::fs::write(&path, content).await;
        discard_partial(&path, written).await?;
        Ok(StagedFile {
            path,
            size_bytes: content.len() as u64,
        })
    }

    async fn commit(&self, staged: &StagedFile, file_name: &str) -> Result<PathBuf> {
        let destination = get_unique_path(&self.dir.join(file_name))?;
        tokio::fs::rename(&staged.path, &destination).await?;
        Ok(destination)
    }

    async fn release(&self, staged: StagedFile) {
        remove_part_file(&staged.path).await;
    }
}

/// Remove a part-file left behind by a failed write, then pass the failure on
async fn discard_partial(path: &Path, written: std::io::Result<()>) -> Result<()> {
    if let Err(e) = written {
        warn!(path = %path.display(), error = %e, "staging failed");
        remove_part_file(path).await;
        return Err(e.into());
    }
    Ok(())
}

async fn remove_part_file(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "removed staged file"),
        // committed, or never created
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove staged file"),
    }
}

/// Outcome of a successful materialization
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SavedFile {
    /// Final location
    pub path: PathBuf,
    /// Name chosen for the file (before collision renaming)
    pub file_name: String,
    /// Size in bytes
    pub size_bytes: u64,
}

/// Fetches artifacts and saves them through a [`SaveTarget`]
#[derive(Clone)]
pub struct Materializer {
    client: reqwest::Client,
    origin: Url,
    target: Arc<dyn SaveTarget>,
    default_name: String,
    event_tx: broadcast::Sender<Event>,
}

impl Materializer {
    /// Create a materializer
    ///
    /// `client` should share the session's cookie store so protected
    /// resources are reachable; relative locators resolve against `origin`.
    pub fn new(
        client: reqwest::Client,
        origin: Url,
        target: Arc<dyn SaveTarget>,
        default_name: impl Into<String>,
        event_tx: broadcast::Sender<Event>,
    ) -> Self {
        Self {
            client,
            origin,
            target,
            default_name: default_name.into(),
            event_tx,
        }
    }

    /// Fetch `url` and save it locally
    ///
    /// A non-success response is returned as an error; nothing is retried.
    pub async fn materialize(&self, url: &str, fallback_name: Option<&str>) -> Result<SavedFile> {
        let url = resolve_url(&self.origin, url)?;
        debug!(%url, "fetching artifact");

        let response = self.client.get(url.clone()).send().await?;
        if !response.status().is_success() {
            let err = error_from_response(response).await;
            warn!(%url, error = %err, "artifact fetch failed");
            return Err(err);
        }

        let header_name = response
            .headers()
            .get(reqwest::header::CONTENT_DISPOSITION)
            .and_then(|value| value.to_str().ok())
            .and_then(content_disposition_filename);
        let file_name = choose_file_name(header_name, fallback_name, &self.default_name);

        let content = response.bytes().await?;
        let staged = self.target.stage(&content).await?;
        let size_bytes = staged.size_bytes;

        let committed = self.target.commit(&staged, &file_name).await;
        self.target.release(staged).await;
        let path = committed?;

        info!(path = %path.display(), size_bytes, "artifact saved");
        self.event_tx
            .send(Event::FileSaved {
                path: path.clone(),
                size_bytes,
            })
            .ok();

        Ok(SavedFile {
            path,
            file_name,
            size_bytes,
        })
    }

    /// Save the artifact of a completed job, named after its title
    pub async fn materialize_job(&self, job: &JobRecord) -> Result<SavedFile> {
        let Some(url) = job.downloadable_url() else {
            return Err(Error::NotReady {
                id: job.id.clone(),
                status: job.effective_status(),
            });
        };
        let fallback = job.title().map(|title| titled_name(title, url));
        self.materialize(url, fallback.as_deref()).await
    }
}

fn choose_file_name(header: Option<String>, fallback: Option<&str>, default: &str) -> String {
    header
        .or_else(|| fallback.and_then(sanitize_file_name))
        .or_else(|| sanitize_file_name(default))
        .unwrap_or_else(|| "download".to_string())
}

/// `"{title}.{ext}"`, taking the extension from the locator's path
fn titled_name(title: &str, locator: &str) -> String {
    let path = locator.split(['?', '#']).next().unwrap_or_default();
    let extension = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .unwrap_or(DEFAULT_EXTENSION);
    format!("{}.{}", title.replace(['/', '\\'], "_"), extension)
}
