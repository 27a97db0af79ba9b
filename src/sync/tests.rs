use super::*;
use crate::classify::FALLBACK_MESSAGE;
use crate::error::ErrorDetail;
use tokio::sync::oneshot;
use tokio::time::timeout;

/// A fetch the test has to answer
struct PendingFetch {
    page: u32,
    reply: oneshot::Sender<Result<FeedPage<u32>>>,
}

impl PendingFetch {
    fn answer(self, result: Result<FeedPage<u32>>) {
        self.reply.send(result).ok();
    }
}

/// Source whose fetches resolve only when the test answers them
struct ScriptedSource {
    calls: mpsc::UnboundedSender<PendingFetch>,
}

#[async_trait]
impl FeedSource for ScriptedSource {
    type Item = u32;

    fn kind(&self) -> FeedKind {
        FeedKind::Mine
    }

    async fn fetch(&self, page: u32, _per_page: u32) -> Result<FeedPage<u32>> {
        let (reply, rx) = oneshot::channel();
        self.calls
            .send(PendingFetch { page, reply })
            .map_err(|_| Error::Other("test dropped".to_string()))?;
        rx.await
            .map_err(|_| Error::Other("reply dropped".to_string()))?
    }
}

struct Harness {
    handle: FeedHandle<u32>,
    calls: mpsc::UnboundedReceiver<PendingFetch>,
    events: broadcast::Receiver<Event>,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

fn start() -> Harness {
    let (calls_tx, calls) = mpsc::unbounded_channel();
    let (event_tx, events) = broadcast::channel(64);
    let shutdown = CancellationToken::new();
    let (handle, task) = FeedSynchronizer::spawn(
        ScriptedSource { calls: calls_tx },
        SyncOptions {
            interval: Duration::from_secs(5),
            per_page: 10,
        },
        event_tx,
        shutdown.clone(),
    );
    Harness {
        handle,
        calls,
        events,
        shutdown,
        task,
    }
}

fn page_of(page: u32, items: &[u32]) -> FeedPage<u32> {
    FeedPage {
        items: items.to_vec(),
        total: 30,
        page,
        per_page: 10,
    }
}

/// Next fetch, issued without any timer having to fire
async fn next_call(calls: &mut mpsc::UnboundedReceiver<PendingFetch>) -> PendingFetch {
    timeout(Duration::from_millis(10), calls.recv())
        .await
        .expect("expected a fetch to be issued")
        .expect("source dropped")
}

async fn expect_no_call(calls: &mut mpsc::UnboundedReceiver<PendingFetch>) {
    assert!(
        timeout(Duration::from_millis(10), calls.recv()).await.is_err(),
        "no fetch should have been issued"
    );
}

async fn next_snapshot(snapshots: &mut watch::Receiver<Snapshot<u32>>) -> Arc<FeedPage<u32>> {
    timeout(Duration::from_millis(10), snapshots.changed())
        .await
        .expect("expected a snapshot")
        .unwrap();
    snapshots.borrow().clone().expect("snapshot published")
}

#[tokio::test(start_paused = true)]
async fn first_fetch_publishes_snapshot() {
    let mut h = start();
    let mut snapshots = h.handle.subscribe();

    let call = next_call(&mut h.calls).await;
    assert_eq!(call.page, 1);
    assert!(h.handle.is_fetching());
    assert!(h.handle.snapshot().is_none());

    call.answer(Ok(page_of(1, &[1, 2, 3])));
    let snap = next_snapshot(&mut snapshots).await;
    assert_eq!(snap.items, vec![1, 2, 3]);
    assert_eq!(snap.page, 1);
    assert!(!h.handle.is_fetching());

    match h.events.recv().await.unwrap() {
        Event::SnapshotUpdated {
            feed, page, items, ..
        } => {
            assert_eq!(feed, FeedKind::Mine);
            assert_eq!((page, items), (1, 3));
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn ticks_are_skipped_while_fetch_in_flight() {
    let mut h = start();
    let mut snapshots = h.handle.subscribe();

    let call = next_call(&mut h.calls).await;

    // two ticks (5s, 10s) pass while the fetch is outstanding
    tokio::time::sleep(Duration::from_secs(12)).await;
    expect_no_call(&mut h.calls).await;

    call.answer(Ok(page_of(1, &[1])));
    next_snapshot(&mut snapshots).await;
    expect_no_call(&mut h.calls).await;

    // polling resumes on the same cadence
    let call = timeout(Duration::from_secs(6), h.calls.recv())
        .await
        .expect("next tick should fetch")
        .unwrap();
    assert_eq!(call.page, 1);
}

#[tokio::test(start_paused = true)]
async fn manual_refresh_during_fetch_is_not_queued() {
    let mut h = start();
    let mut snapshots = h.handle.subscribe();

    let call = next_call(&mut h.calls).await;
    h.handle.refresh().unwrap();
    expect_no_call(&mut h.calls).await;

    call.answer(Ok(page_of(1, &[1])));
    next_snapshot(&mut snapshots).await;
    expect_no_call(&mut h.calls).await;

    h.handle.refresh().unwrap();
    let call = next_call(&mut h.calls).await;
    assert_eq!(call.page, 1);
}

#[tokio::test(start_paused = true)]
async fn page_change_during_fetch_discards_old_page() {
    let mut h = start();
    let mut snapshots = h.handle.subscribe();

    let page1 = next_call(&mut h.calls).await;
    h.handle.set_page(2).await.unwrap();
    expect_no_call(&mut h.calls).await;

    // slow page-1 result lands after the page change
    page1.answer(Ok(page_of(1, &[1, 2])));
    let page2 = next_call(&mut h.calls).await;
    assert_eq!(page2.page, 2);
    assert!(h.handle.snapshot().is_none(), "stale page must not be applied");
    assert_eq!(h.handle.page(), 2);

    match h.events.recv().await.unwrap() {
        Event::StaleResultDiscarded { page, .. } => assert_eq!(page, 1),
        other => panic!("unexpected event {:?}", other),
    }

    page2.answer(Ok(page_of(2, &[11, 12])));
    let snap = next_snapshot(&mut snapshots).await;
    assert_eq!(snap.page, 2);
    assert_eq!(snap.items, vec![11, 12]);
}

#[tokio::test(start_paused = true)]
async fn page_change_while_idle_fetches_immediately_and_replaces() {
    let mut h = start();
    let mut snapshots = h.handle.subscribe();

    next_call(&mut h.calls).await.answer(Ok(page_of(1, &[1, 2, 3])));
    next_snapshot(&mut snapshots).await;

    h.handle.set_page(3).await.unwrap();
    let call = next_call(&mut h.calls).await;
    assert_eq!(call.page, 3);
    call.answer(Ok(page_of(3, &[21])));

    let snap = next_snapshot(&mut snapshots).await;
    assert_eq!(snap.page, 3);
    assert_eq!(snap.items, vec![21], "pages replace, never merge");
}

#[tokio::test(start_paused = true)]
async fn failed_fetch_keeps_previous_snapshot() {
    let mut h = start();
    let mut snapshots = h.handle.subscribe();
    let mut errors = h.handle.errors();

    next_call(&mut h.calls).await.answer(Ok(page_of(1, &[7, 8])));
    next_snapshot(&mut snapshots).await;

    h.handle.refresh().unwrap();
    next_call(&mut h.calls).await.answer(Err(Error::Api {
        status: 503,
        detail: ErrorDetail::Message("database busy".to_string()),
    }));
    timeout(Duration::from_millis(10), errors.changed())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(h.handle.last_error().as_deref(), Some("database busy"));
    assert_eq!(h.handle.snapshot().unwrap().items, vec![7, 8]);

    // a transport failure surfaces the generic message
    h.handle.refresh().unwrap();
    next_call(&mut h.calls).await.answer(Err(Error::Http {
        status: 502,
        reason: "Bad Gateway".to_string(),
    }));
    timeout(Duration::from_millis(10), errors.changed())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(h.handle.last_error().as_deref(), Some(FALLBACK_MESSAGE));

    // next success clears the error
    h.handle.refresh().unwrap();
    next_call(&mut h.calls).await.answer(Ok(page_of(1, &[9])));
    let snap = next_snapshot(&mut snapshots).await;
    assert_eq!(snap.items, vec![9]);
    assert_eq!(h.handle.last_error(), None);
}

#[tokio::test(start_paused = true)]
async fn resync_during_fetch_refetches_after_it_resolves() {
    let mut h = start();
    let mut snapshots = h.handle.subscribe();

    let first = next_call(&mut h.calls).await;
    h.handle.resync().await.unwrap();
    expect_no_call(&mut h.calls).await;

    first.answer(Ok(page_of(1, &[1])));
    let snap = next_snapshot(&mut snapshots).await;
    assert_eq!(snap.items, vec![1]);

    let second = next_call(&mut h.calls).await;
    assert_eq!(second.page, 1);
    second.answer(Ok(page_of(1, &[1, 2])));
    let snap = next_snapshot(&mut snapshots).await;
    assert_eq!(snap.items, vec![1, 2]);
}

#[tokio::test(start_paused = true)]
async fn page_zero_is_treated_as_first_page() {
    let mut h = start();
    let mut snapshots = h.handle.subscribe();

    next_call(&mut h.calls).await.answer(Ok(page_of(1, &[1])));
    next_snapshot(&mut snapshots).await;

    h.handle.set_page(0).await.unwrap();
    assert_eq!(next_call(&mut h.calls).await.page, 1);
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_the_driver() {
    let mut h = start();
    let call = next_call(&mut h.calls).await;

    h.shutdown.cancel();
    h.task.await.unwrap();

    // late result goes nowhere
    call.answer(Ok(page_of(1, &[1])));
    assert!(h.handle.snapshot().is_none());
    assert!(matches!(h.handle.refresh(), Err(Error::ShuttingDown)));
    assert!(matches!(
        h.handle.set_page(2).await,
        Err(Error::ShuttingDown)
    ));
}
