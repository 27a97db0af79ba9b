//! # jobwatch
//!
//! Client-side job lifecycle synchronization and best-effort resource
//! reclamation for media conversion services.
//!
//! ## Design Philosophy
//!
//! jobwatch is designed to be:
//! - **Eventually consistent** - Two independently paginated feeds are polled,
//!   and each publishes whole snapshots that are never mixed across pages
//! - **Best-effort on teardown** - Several redundant cleanup signals are sent.
//!   The server is idempotent, so none of them needs to be acknowledged
//! - **Library-first** - No UI; a presentation layer renders snapshots and invokes actions
//! - **Event-driven** - Consumers may subscribe to events instead of watching handles
//!
//! ## Quick Start
//!
//! ```no_run
//! use jobwatch::{Config, DownloadRequest, JobClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.server.base_url = "http://localhost:8000".to_string();
//!
//!     let client = JobClient::new(config).await?;
//!
//!     // Watch the session feed
//!     let mut snapshots = client.mine().subscribe();
//!     tokio::spawn(async move {
//!         while snapshots.changed().await.is_ok() {
//!             if let Some(page) = snapshots.borrow().clone() {
//!                 println!("{} of {} jobs", page.items.len(), page.total);
//!             }
//!         }
//!     });
//!
//!     client
//!         .create_job(&DownloadRequest::new("https://youtu.be/aqz-KE-bpKQ"))
//!         .await?;
//!
//!     // Release server-side resources when the process is told to stop
//!     jobwatch::run_with_shutdown(client).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Failure classification into presentable messages
pub mod classify;
/// Lifecycle and manual cleanup signals
pub mod cleanup;
/// Client façade
pub mod client;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Local saving of job artifacts
pub mod materialize;
/// Job queue service access
pub mod service;
/// Feed polling and snapshot publication
pub mod sync;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use classify::{FALLBACK_MESSAGE, classify_error};
pub use cleanup::{CleanupDispatcher, CleanupTransport};
pub use client::JobClient;
pub use config::{CleanupConfig, Config, MaterializeConfig, PollingConfig, ServerConfig};
pub use error::{Error, ErrorDetail, IsRetryable, RateLimitDetail, Result};
pub use materialize::{DirectoryTarget, Materializer, SaveTarget, SavedFile};
pub use service::{HttpJobQueue, JobQueue};
pub use sync::{FeedHandle, FeedSource, FeedSynchronizer, Snapshot, SyncOptions};
pub use types::{
    CleanupReport, Delivery, DownloadRequest, Event, FeedKind, FeedPage, GlobalActivity, JobId,
    JobRecord, JobStatus, JobStatusReport, LifecycleTrigger, OutputFormat, VideoInfo, Visibility,
};

/// Run the client until the process is told to stop, then release the session.
///
/// Waits for a termination signal and then:
/// 1. fires the pre-unload cleanup signal (ordinary request)
/// 2. fires the final-unload cleanup signal (beacon)
/// 3. gives the pre-unload request up to `cleanup.teardown_grace` to finish
/// 4. calls the client's `shutdown()`, abandoning that request if still pending
/// 5. waits `cleanup.teardown_grace` so detached signals can leave the process
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use jobwatch::{Config, JobClient, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = JobClient::new(Config::default()).await?;
///
///     // Run with automatic signal handling
///     run_with_shutdown(client).await?;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(client: JobClient) -> Result<()> {
    wait_for_signal().await;
    release_and_shutdown(&client).await
}

/// Teardown sequence run once a termination signal arrived
pub(crate) async fn release_and_shutdown(client: &JobClient) -> Result<()> {
    let cleanup = client.cleanup();
    cleanup.on_before_unload();
    cleanup.on_unload();
    let grace = client.config().cleanup.teardown_grace;
    cleanup.settle(grace).await;

    let result = client.shutdown().await;
    tokio::time::sleep(grace).await;
    result
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{Signal, SignalKind, signal};

    async fn recv_or_pending(listener: &mut Option<Signal>) {
        match listener {
            Some(listener) => {
                listener.recv().await;
            }
            None => std::future::pending().await,
        }
    }

    // Registration may fail in restricted environments (containers, tests)
    let mut sigterm = signal(SignalKind::terminate())
        .inspect_err(|e| tracing::warn!(error = %e, "Could not register SIGTERM handler"))
        .ok();
    let mut sigint = signal(SignalKind::interrupt())
        .inspect_err(|e| tracing::warn!(error = %e, "Could not register SIGINT handler"))
        .ok();

    if sigterm.is_none() && sigint.is_none() {
        tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
        tokio::signal::ctrl_c().await.ok();
        return;
    }

    tokio::select! {
        _ = recv_or_pending(&mut sigterm) => tracing::info!("Received SIGTERM signal"),
        _ = recv_or_pending(&mut sigint) => tracing::info!("Received SIGINT signal (Ctrl+C)"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
