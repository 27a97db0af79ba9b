//! The two feeds served by the job queue service.

use crate::error::Result;
use crate::service::JobQueue;
use crate::types::{FeedKind, FeedPage, GlobalActivity, JobRecord};
use async_trait::async_trait;
use std::sync::Arc;

use super::FeedSource;

/// Jobs of the calling session
pub struct MineFeed {
    queue: Arc<dyn JobQueue>,
}

impl MineFeed {
    /// Feed backed by `queue`
    pub fn new(queue: Arc<dyn JobQueue>) -> Self {
        Self { queue }
    }
}

#[async_trait]
impl FeedSource for MineFeed {
    type Item = JobRecord;

    fn kind(&self) -> FeedKind {
        FeedKind::Mine
    }

    async fn fetch(&self, page: u32, per_page: u32) -> Result<FeedPage<JobRecord>> {
        self.queue.my_jobs(page, per_page).await
    }
}

/// Privacy-reduced activity of all clients
pub struct GlobalFeed {
    queue: Arc<dyn JobQueue>,
}

impl GlobalFeed {
    /// Feed backed by `queue`
    pub fn new(queue: Arc<dyn JobQueue>) -> Self {
        Self { queue }
    }
}

#[async_trait]
impl FeedSource for GlobalFeed {
    type Item = GlobalActivity;

    fn kind(&self) -> FeedKind {
        FeedKind::Global
    }

    async fn fetch(&self, page: u32, per_page: u32) -> Result<FeedPage<GlobalActivity>> {
        self.queue.global_activity(page, per_page).await
    }
}
