//! Feed polling and snapshot publication
//!
//! Each feed gets its own driver task, spawned by [`FeedSynchronizer::spawn`].
//! The driver is the only writer of that feed's page, snapshot and error
//! state; everything else talks to it through a [`FeedHandle`].
//!
//! - At most one fetch per feed is in flight. A timer tick or manual refresh
//!   that arrives meanwhile is dropped; a page change or re-sync is remembered
//!   and fetched once the in-flight call resolves.
//! - Every fetch is tagged with the page and a sequence number. A result is
//!   applied only if its page is still the wanted page and it is newer than
//!   the last applied result; anything else is discarded on arrival.
//! - Snapshots are published whole (`Arc<FeedPage<_>>` swapped in a watch
//!   channel). A failed fetch keeps the previous snapshot and sets the error
//!   side channel; polling carries on at the same interval.

mod feeds;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use feeds::{GlobalFeed, MineFeed};

use crate::classify::classify_error;
use crate::error::{Error, IsRetryable, Result};
use crate::types::{Event, FeedKind, FeedPage};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Capacity of a feed's command channel
const COMMAND_BUFFER: usize = 16;

/// Source of one paginated feed
#[async_trait]
pub trait FeedSource: Send + Sync + 'static {
    /// Item type of the feed
    type Item: Send + Sync + 'static;

    /// Which feed this is
    fn kind(&self) -> FeedKind;

    /// Fetch one page
    async fn fetch(&self, page: u32, per_page: u32) -> Result<FeedPage<Self::Item>>;
}

/// Published snapshot of a feed (`None` until the first successful fetch)
pub type Snapshot<T> = Option<Arc<FeedPage<T>>>;

/// Settings of one synchronizer
#[derive(Clone, Copy, Debug)]
pub struct SyncOptions {
    /// Time between poll ticks
    pub interval: Duration,
    /// Page size
    pub per_page: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Refresh,
    SetPage(u32),
    Resync,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Tick,
    Refresh,
    PageChange,
    Resync,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchState {
    Idle,
    InFlight,
    /// In flight, and the wanted state changed since it was issued
    InFlightSuperseded,
}

struct Completion<T> {
    seq: u64,
    page: u32,
    result: Result<FeedPage<T>>,
}

/// Handle to a running synchronizer (cloneable)
pub struct FeedHandle<T> {
    kind: FeedKind,
    commands: mpsc::Sender<Command>,
    snapshot: watch::Receiver<Snapshot<T>>,
    error: watch::Receiver<Option<String>>,
    page: watch::Receiver<u32>,
    fetching: watch::Receiver<bool>,
}

impl<T> Clone for FeedHandle<T> {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            commands: self.commands.clone(),
            snapshot: self.snapshot.clone(),
            error: self.error.clone(),
            page: self.page.clone(),
            fetching: self.fetching.clone(),
        }
    }
}

impl<T> FeedHandle<T> {
    /// Which feed this handle drives
    pub fn kind(&self) -> FeedKind {
        self.kind
    }

    /// Latest accepted snapshot
    pub fn snapshot(&self) -> Snapshot<T> {
        self.snapshot.borrow().clone()
    }

    /// Watch snapshot replacements
    pub fn subscribe(&self) -> watch::Receiver<Snapshot<T>> {
        self.snapshot.clone()
    }

    /// Message of the most recent failed fetch, cleared by the next success
    pub fn last_error(&self) -> Option<String> {
        self.error.borrow().clone()
    }

    /// Watch the error side channel
    pub fn errors(&self) -> watch::Receiver<Option<String>> {
        self.error.clone()
    }

    /// Page the synchronizer currently wants (updated once a page change is processed)
    pub fn page(&self) -> u32 {
        *self.page.borrow()
    }

    /// Whether a fetch is in flight
    pub fn is_fetching(&self) -> bool {
        *self.fetching.borrow()
    }

    /// Fetch now instead of waiting for the next tick
    ///
    /// A no-op while a fetch is in flight.
    pub fn refresh(&self) -> Result<()> {
        match self.commands.try_send(Command::Refresh) {
            Ok(()) | Err(mpsc::error::TrySendError::Full(_)) => Ok(()),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(Error::ShuttingDown),
        }
    }

    /// Switch to another page (pages below 1 are treated as 1)
    ///
    /// The new page is fetched immediately, or as soon as the in-flight fetch
    /// resolves; the old page's result is then discarded.
    pub async fn set_page(&self, page: u32) -> Result<()> {
        self.commands
            .send(Command::SetPage(page.max(1)))
            .await
            .map_err(|_| Error::ShuttingDown)
    }

    /// Fetch the current page again, after any in-flight fetch resolves
    pub async fn resync(&self) -> Result<()> {
        self.commands
            .send(Command::Resync)
            .await
            .map_err(|_| Error::ShuttingDown)
    }
}

/// Driver of one feed
pub struct FeedSynchronizer<S: FeedSource> {
    source: Arc<S>,
    options: SyncOptions,
    commands: mpsc::Receiver<Command>,
    snapshot_tx: watch::Sender<Snapshot<S::Item>>,
    error_tx: watch::Sender<Option<String>>,
    page_tx: watch::Sender<u32>,
    fetching_tx: watch::Sender<bool>,
    event_tx: broadcast::Sender<Event>,
    shutdown: CancellationToken,

    state: FetchState,
    desired_page: u32,
    next_seq: u64,
    applied_seq: u64,
}

impl<S: FeedSource> FeedSynchronizer<S> {
    /// Spawn the driver task and return its handle
    ///
    /// The first fetch is issued immediately. The task ends when `shutdown` is
    /// cancelled or every handle has been dropped.
    pub fn spawn(
        source: S,
        options: SyncOptions,
        event_tx: broadcast::Sender<Event>,
        shutdown: CancellationToken,
    ) -> (FeedHandle<S::Item>, JoinHandle<()>) {
        let kind = source.kind();
        let (command_tx, commands) = mpsc::channel(COMMAND_BUFFER);
        let (snapshot_tx, snapshot) = watch::channel(None);
        let (error_tx, error) = watch::channel(None);
        let (page_tx, page) = watch::channel(1);
        let (fetching_tx, fetching) = watch::channel(false);

        let handle = FeedHandle {
            kind,
            commands: command_tx,
            snapshot,
            error,
            page,
            fetching,
        };

        let synchronizer = Self {
            source: Arc::new(source),
            options: SyncOptions {
                interval: options.interval,
                per_page: options.per_page.max(1),
            },
            commands,
            snapshot_tx,
            error_tx,
            page_tx,
            fetching_tx,
            event_tx,
            shutdown,
            state: FetchState::Idle,
            desired_page: 1,
            next_seq: 0,
            applied_seq: 0,
        };

        (handle, tokio::spawn(synchronizer.run()))
    }

    fn kind(&self) -> FeedKind {
        self.source.kind()
    }

    async fn run(mut self) {
        let feed = self.kind();
        info!(%feed, interval = ?self.options.interval, "feed synchronizer started");

        let (done_tx, mut done_rx) = mpsc::channel::<Completion<S::Item>>(COMMAND_BUFFER);
        let mut interval = tokio::time::interval(self.options.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = interval.tick() => self.request(Trigger::Tick, &done_tx),
                command = self.commands.recv() => match command {
                    Some(Command::Refresh) => self.request(Trigger::Refresh, &done_tx),
                    Some(Command::SetPage(page)) => {
                        self.desired_page = page;
                        self.page_tx.send_replace(page);
                        self.request(Trigger::PageChange, &done_tx);
                    }
                    Some(Command::Resync) => self.request(Trigger::Resync, &done_tx),
                    None => break,
                },
                Some(done) = done_rx.recv() => self.complete(done, &done_tx),
            }
        }

        info!(%feed, "feed synchronizer stopped");
    }

    fn request(&mut self, trigger: Trigger, done_tx: &mpsc::Sender<Completion<S::Item>>) {
        match (self.state, trigger) {
            (FetchState::Idle, _) => self.start_fetch(done_tx),
            (FetchState::InFlight, Trigger::Tick | Trigger::Refresh) => {
                debug!(feed = %self.kind(), ?trigger, "fetch in flight, skipping");
            }
            (FetchState::InFlight, Trigger::PageChange | Trigger::Resync) => {
                debug!(feed = %self.kind(), ?trigger, "fetch in flight, re-fetching once it resolves");
                self.state = FetchState::InFlightSuperseded;
            }
            (FetchState::InFlightSuperseded, _) => {}
        }
    }

    fn start_fetch(&mut self, done_tx: &mpsc::Sender<Completion<S::Item>>) {
        self.next_seq += 1;
        let seq = self.next_seq;
        let page = self.desired_page;
        let per_page = self.options.per_page;
        self.state = FetchState::InFlight;
        self.fetching_tx.send_replace(true);

        debug!(feed = %self.kind(), page, seq, "fetching feed page");

        let source = self.source.clone();
        let done_tx = done_tx.clone();
        tokio::spawn(async move {
            let result = source.fetch(page, per_page).await;
            done_tx.send(Completion { seq, page, result }).await.ok();
        });
    }

    fn complete(
        &mut self,
        done: Completion<S::Item>,
        done_tx: &mpsc::Sender<Completion<S::Item>>,
    ) {
        let feed = self.kind();
        let superseded = self.state == FetchState::InFlightSuperseded;
        self.state = FetchState::Idle;
        self.fetching_tx.send_replace(false);

        if done.page != self.desired_page || done.seq <= self.applied_seq {
            debug!(%feed, page = done.page, seq = done.seq, "discarding stale feed result");
            self.event_tx
                .send(Event::StaleResultDiscarded {
                    feed,
                    page: done.page,
                })
                .ok();
        } else {
            match done.result {
                Ok(page) => {
                    self.applied_seq = done.seq;
                    let event = Event::SnapshotUpdated {
                        feed,
                        page: page.page,
                        items: page.items.len(),
                        total: page.total,
                    };
                    self.snapshot_tx.send_replace(Some(Arc::new(page)));
                    self.error_tx.send_if_modified(|error| error.take().is_some());
                    self.event_tx.send(event).ok();
                }
                Err(e) => {
                    warn!(%feed, page = done.page, error = %e, retryable = e.is_retryable(), "feed fetch failed, keeping previous snapshot");
                    let message = classify_error(&e);
                    self.error_tx.send_replace(Some(message.clone()));
                    self.event_tx
                        .send(Event::FeedError {
                            feed,
                            page: done.page,
                            message,
                        })
                        .ok();
                }
            }
        }

        if superseded {
            self.start_fetch(done_tx);
        }
    }
}
