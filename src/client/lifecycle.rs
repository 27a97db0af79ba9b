//! Shutdown coordination.

use crate::error::Result;
use crate::types::Event;
use std::time::Duration;

use super::JobClient;

/// Upper bound on waiting for the synchronizer tasks to stop
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

impl JobClient {
    /// Gracefully shut down the client
    ///
    /// 1. Stops both feed synchronizers (in-flight fetches are dropped on arrival)
    /// 2. Tears down the cleanup dispatcher: ordinary signals still in flight are
    ///    abandoned, beacons and keep-alive signals carry on until their timeout
    /// 3. Waits for the synchronizer tasks, bounded by a timeout
    /// 4. Emits [`Event::Shutdown`]
    ///
    /// Calling it again is harmless.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        self.shutdown_token.cancel();
        self.cleanup.teardown();

        let tasks: Vec<_> = self.tasks.lock().await.drain(..).collect();
        let count = tasks.len();
        let wait = async {
            for task in tasks {
                if let Err(e) = task.await {
                    tracing::warn!(error = %e, "feed synchronizer task ended abnormally");
                }
            }
        };

        match tokio::time::timeout(SHUTDOWN_TIMEOUT, wait).await {
            Ok(()) => tracing::debug!(count, "feed synchronizers stopped"),
            Err(_) => {
                tracing::warn!("Timeout waiting for feed synchronizers, proceeding with shutdown")
            }
        }

        self.event_tx.send(Event::Shutdown).ok();

        tracing::info!("Graceful shutdown complete");
        Ok(())
    }

    /// Whether [`shutdown`](Self::shutdown) has been called
    pub fn is_shut_down(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }
}
