//! Cleanup signal dispatch
//!
//! The host never reliably announces that a session is ending; it only emits a
//! handful of racing, partially overlapping lifecycle events. The dispatcher
//! answers each of them with an independent, best-effort "release my
//! resources" signal. The server treats repeated signals for one session as a
//! no-op and expires anything that is never signalled, so a lost signal only
//! delays reclamation.
//!
//! | Trigger | Channel |
//! |---|---|
//! | [`on_before_unload`](CleanupDispatcher::on_before_unload) | ordinary request, aborted by teardown |
//! | [`on_visibility_change`](CleanupDispatcher::on_visibility_change) (hidden) | beacon, falling back to a keep-alive request |
//! | [`on_unload`](CleanupDispatcher::on_unload) | beacon only |
//!
//! Lifecycle handlers are synchronous, never await the server, and never
//! propagate a failure (including a panicking transport) to the caller.
//! [`manual_cleanup`](CleanupDispatcher::manual_cleanup) is the user-invoked
//! variant: it awaits the server and reports errors.


use crate::error::Result;
use crate::service::JobQueue;
use crate::sync::FeedHandle;
use crate::types::{CleanupReport, Delivery, Event, JobRecord, LifecycleTrigger, Visibility};
use async_trait::async_trait;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Outbound channel for lifecycle cleanup signals
#[async_trait]
pub trait CleanupTransport: Send + Sync + 'static {
    /// Send the release signal as an ordinary request and wait for the outcome
    async fn send_signal(&self) -> Result<()>;

    /// Hand the release signal to a fire-and-forget channel that survives teardown
    ///
    /// Returns `false` if the channel could not accept it, for instance when
    /// its budget of detached sends is exhausted or no runtime is available.
    /// A refused beacon on visibility loss falls back to a keep-alive
    /// [`send_signal`](Self::send_signal); that fallback needs a runtime too.
    fn send_beacon(&self) -> bool;
}

/// Issues best-effort and manual cleanup signals (cloneable - all fields are shared)
#[derive(Clone)]
pub struct CleanupDispatcher {
    transport: Arc<dyn CleanupTransport>,
    queue: Arc<dyn JobQueue>,
    mine: Option<FeedHandle<JobRecord>>,
    teardown: CancellationToken,
    /// Ordinary signals spawned but not yet finished
    pending: Arc<watch::Sender<usize>>,
    signal_timeout: Duration,
    event_tx: broadcast::Sender<Event>,
}

impl CleanupDispatcher {
    /// Create a dispatcher
    ///
    /// `queue` serves manual cleanup; `transport` carries lifecycle signals.
    pub fn new(
        transport: Arc<dyn CleanupTransport>,
        queue: Arc<dyn JobQueue>,
        signal_timeout: Duration,
        event_tx: broadcast::Sender<Event>,
    ) -> Self {
        Self {
            transport,
            queue,
            mine: None,
            teardown: CancellationToken::new(),
            pending: Arc::new(watch::Sender::new(0)),
            signal_timeout,
            event_tx,
        }
    }

    /// Re-synchronize this feed after a successful manual cleanup
    pub fn with_mine_feed(mut self, mine: FeedHandle<JobRecord>) -> Self {
        self.mine = Some(mine);
        self
    }

    /// Token cancelled when the execution context is torn down
    pub fn teardown_token(&self) -> CancellationToken {
        self.teardown.clone()
    }

    /// Wait until every ordinary signal in flight has finished, at most `grace`
    ///
    /// Returns `true` if nothing was left in flight.
    pub async fn settle(&self, grace: Duration) -> bool {
        let mut pending = self.pending.subscribe();
        let settled = tokio::time::timeout(grace, pending.wait_for(|n| *n == 0))
            .await
            .is_ok();
        if !settled {
            let in_flight = *pending.borrow();
            debug!(grace = ?grace, in_flight, "ordinary cleanup signals still in flight");
        }
        settled
    }

    /// Signal that the execution context is being torn down
    ///
    /// In-flight ordinary signals are abandoned; beacons and keep-alive
    /// requests carry on until their own timeout.
    pub fn teardown(&self) {
        self.teardown.cancel();
    }

    /// Pre-unload warning: ordinary request, may be cut short by teardown
    pub fn on_before_unload(&self) -> Delivery {
        let trigger = LifecycleTrigger::BeforeUnload;
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(%trigger, "no runtime available, cleanup signal dropped");
            return Delivery::NotSent;
        };

        let transport = self.transport.clone();
        let teardown = self.teardown.clone();
        let event_tx = self.event_tx.clone();
        let in_flight = InFlight::enter(self.pending.clone());
        handle.spawn(async move {
            let _in_flight = in_flight;
            tokio::select! {
                _ = teardown.cancelled() => {
                    warn!(%trigger, "cleanup signal abandoned by teardown");
                    event_tx
                        .send(Event::CleanupSignalFailed {
                            trigger,
                            error: "abandoned by teardown".to_string(),
                        })
                        .ok();
                }
                result = transport.send_signal() => {
                    report_outcome(&event_tx, trigger, result);
                }
            }
        });

        self.sent(trigger, Delivery::Ordinary)
    }

    /// Visibility change: when hidden, beacon first, keep-alive request if the beacon is refused
    pub fn on_visibility_change(&self, visibility: Visibility) -> Delivery {
        if visibility != Visibility::Hidden {
            return Delivery::NotSent;
        }
        let trigger = LifecycleTrigger::VisibilityHidden;

        if self.try_beacon(trigger) {
            return self.sent(trigger, Delivery::Beacon);
        }

        debug!(%trigger, "beacon refused, falling back to keep-alive request");
        self.keep_alive(trigger)
    }

    /// Final unload: beacon only
    pub fn on_unload(&self) -> Delivery {
        let trigger = LifecycleTrigger::Unload;
        if self.try_beacon(trigger) {
            self.sent(trigger, Delivery::Beacon)
        } else {
            warn!(%trigger, "beacon refused, cleanup signal dropped");
            Delivery::NotSent
        }
    }

    /// User-initiated cleanup
    ///
    /// Waits for the server, re-synchronizes the session feed on success and
    /// returns the reclaimed count. Errors are returned for the caller to show;
    /// invoking again is the retry.
    pub async fn manual_cleanup(&self) -> Result<CleanupReport> {
        match self.queue.cleanup().await {
            Ok(report) => {
                info!(cleaned_count = report.cleaned_count, "manual cleanup completed");
                self.event_tx
                    .send(Event::CleanupCompleted {
                        cleaned_count: report.cleaned_count,
                    })
                    .ok();
                if let Some(mine) = &self.mine
                    && let Err(e) = mine.resync().await
                {
                    warn!(error = %e, "could not re-synchronize session feed after cleanup");
                }
                Ok(report)
            }
            Err(e) => {
                warn!(error = %e, "manual cleanup failed");
                Err(e)
            }
        }
    }

    fn try_beacon(&self, trigger: LifecycleTrigger) -> bool {
        match catch_unwind(AssertUnwindSafe(|| self.transport.send_beacon())) {
            Ok(accepted) => accepted,
            Err(_) => {
                warn!(%trigger, "beacon transport panicked");
                false
            }
        }
    }

    fn keep_alive(&self, trigger: LifecycleTrigger) -> Delivery {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(%trigger, "no runtime available, cleanup signal dropped");
            return Delivery::NotSent;
        };

        let transport = self.transport.clone();
        let timeout = self.signal_timeout;
        let event_tx = self.event_tx.clone();
        handle.spawn(async move {
            match tokio::time::timeout(timeout, transport.send_signal()).await {
                Ok(result) => report_outcome(&event_tx, trigger, result),
                Err(_) => {
                    warn!(%trigger, timeout = ?timeout, "keep-alive cleanup signal timed out");
                    event_tx
                        .send(Event::CleanupSignalFailed {
                            trigger,
                            error: format!("timed out after {:?}", timeout),
                        })
                        .ok();
                }
            }
        });

        self.sent(trigger, Delivery::KeepAlive)
    }

    fn sent(&self, trigger: LifecycleTrigger, delivery: Delivery) -> Delivery {
        debug!(%trigger, ?delivery, "cleanup signal issued");
        self.event_tx
            .send(Event::CleanupSignalSent { trigger, delivery })
            .ok();
        delivery
    }
}

/// Counts one ordinary signal as in flight until dropped
struct InFlight(Arc<watch::Sender<usize>>);

impl InFlight {
    fn enter(pending: Arc<watch::Sender<usize>>) -> Self {
        pending.send_modify(|n| *n += 1);
        Self(pending)
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.send_modify(|n| *n = n.saturating_sub(1));
    }
}

fn report_outcome(
    event_tx: &broadcast::Sender<Event>,
    trigger: LifecycleTrigger,
    result: Result<()>,
) {
    match result {
        Ok(()) => debug!(%trigger, "cleanup signal delivered"),
        Err(e) => {
            warn!(%trigger, error = %e, "cleanup signal failed");
            event_tx
                .send(Event::CleanupSignalFailed {
                    trigger,
                    error: e.to_string(),
                })
                .ok();
        }
    }
}
