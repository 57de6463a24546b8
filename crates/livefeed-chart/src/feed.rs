/*
[INPUT]:  (market, interval) activations, a KlineSource, a BarSink
[OUTPUT]: Seeded history + polled/pushed bar updates for the active series
[POS]:    Orchestration layer - snapshot bootstrap and incremental loop
[UPDATE]: When changing activation, polling cadence or stale-response handling
*/

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use livefeed_adapter::{Interval, RawBarRecord, SnapshotClient};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bars::{BarBuilder, BarUpdate, SeriesKey};
use crate::error::{ChartError, Result};
use crate::sink::BarSink;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Where bar records come from. One call per snapshot or poll tick.
#[async_trait]
pub trait KlineSource: Send + Sync {
    async fn fetch_bars(
        &self,
        market: &str,
        interval: Interval,
        start_ms: i64,
        end_ms: i64,
    ) -> livefeed_adapter::Result<Vec<RawBarRecord>>;
}

#[async_trait]
impl KlineSource for SnapshotClient {
    async fn fetch_bars(
        &self,
        market: &str,
        interval: Interval,
        start_ms: i64,
        end_ms: i64,
    ) -> livefeed_adapter::Result<Vec<RawBarRecord>> {
        self.get_klines(market, interval, start_ms, end_ms).await
    }
}

pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

struct FeedShared {
    source: Arc<dyn KlineSource>,
    sink: Arc<dyn BarSink>,
    /// Lock order: `builder` is held while the generation is bumped or checked,
    /// so a result is either applied before a deactivation returns or not at all.
    builder: Mutex<BarBuilder>,
    generation: AtomicU64,
}

impl FeedShared {
    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::Acquire) == generation
    }

    fn bump_generation(&self) -> u64 {
        let _builder = self.builder.lock();
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    fn seed_if_current(
        &self,
        key: &SeriesKey,
        generation: u64,
        records: &[RawBarRecord],
        now_ms: i64,
    ) -> bool {
        let mut builder = self.builder.lock();
        if !self.is_current(generation) {
            return false;
        }
        let bars = builder.seed(key, records, now_ms);
        self.sink.set_history(key, bars);
        true
    }

    fn cursor_if_current(&self, key: &SeriesKey, generation: u64) -> Option<i64> {
        let builder = self.builder.lock();
        if !self.is_current(generation) {
            return None;
        }
        builder.cursor(key)
    }

    /// Returns `None` when the generation moved on and nothing was applied.
    fn apply_if_current(
        &self,
        key: &SeriesKey,
        generation: u64,
        records: &[RawBarRecord],
    ) -> Option<Vec<BarUpdate>> {
        let mut builder = self.builder.lock();
        if !self.is_current(generation) {
            return None;
        }
        let mut updates = Vec::new();
        for record in records {
            if let Some(update) = builder.apply_incremental(key, record) {
                self.sink.update(key, &update);
                updates.push(update);
            }
        }
        Some(updates)
    }
}

struct ActiveSeries {
    key: SeriesKey,
    generation: u64,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

/// Drives one chart series at a time: snapshot on activation, then polling.
///
/// Switching series is `activate` again; the previous loop is cancelled and any of
/// its responses still in flight are discarded.
pub struct FeedCoordinator {
    shared: Arc<FeedShared>,
    poll_interval: Duration,
    shutdown: CancellationToken,
    active: Mutex<Option<ActiveSeries>>,
}

impl FeedCoordinator {
    pub fn new(
        source: Arc<dyn KlineSource>,
        sink: Arc<dyn BarSink>,
        poll_interval: Duration,
    ) -> Self {
        Self::with_shutdown(source, sink, poll_interval, CancellationToken::new())
    }

    /// Poll loops run on child tokens of `shutdown`.
    pub fn with_shutdown(
        source: Arc<dyn KlineSource>,
        sink: Arc<dyn BarSink>,
        poll_interval: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            shared: Arc::new(FeedShared {
                source,
                sink,
                builder: Mutex::new(BarBuilder::new()),
                generation: AtomicU64::new(0),
            }),
            poll_interval,
            shutdown,
            active: Mutex::new(None),
        }
    }

    pub fn active_series(&self) -> Option<SeriesKey> {
        self.active.lock().as_ref().map(|active| active.key.clone())
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Bars committed for `key`; empty once the series is deactivated.
    pub fn bars(&self, key: &SeriesKey) -> Vec<crate::bars::Bar> {
        self.shared.builder.lock().bars(key).to_vec()
    }

    pub fn cursor(&self, key: &SeriesKey) -> Option<i64> {
        self.shared.builder.lock().cursor(key)
    }

    /// Bootstrap `market` at `interval` and start polling.
    ///
    /// Fails with `Snapshot` when the fetch fails and `Superseded` when another
    /// activation or a deactivation happened while it was in flight.
    pub async fn activate(&self, market: &str, interval: Interval) -> Result<()> {
        let key = SeriesKey::new(market, interval);
        let (generation, cancel) = self.begin(key.clone());

        let end_ms = now_ms();
        let start_ms = end_ms - interval.lookback().as_millis() as i64;
        info!(series = %key, generation, start_ms, end_ms, "activating series");

        let fetched = self
            .shared
            .source
            .fetch_bars(&key.market, interval, start_ms, end_ms)
            .await;

        if !self.shared.is_current(generation) {
            debug!(series = %key, generation, "snapshot arrived after supersession; discarded");
            return Err(ChartError::Superseded(key));
        }

        let records = match fetched {
            Ok(records) => records,
            Err(err) => {
                warn!(series = %key, error = %err, "snapshot fetch failed");
                self.end_if(generation);
                return Err(ChartError::Snapshot(err));
            }
        };

        if !self.shared.seed_if_current(&key, generation, &records, end_ms) {
            return Err(ChartError::Superseded(key));
        }

        let handle = tokio::spawn(poll_loop(
            Arc::clone(&self.shared),
            key.clone(),
            generation,
            cancel,
            self.poll_interval,
        ));

        let mut active = self.active.lock();
        match active.as_mut() {
            Some(current) if current.generation == generation => current.handle = Some(handle),
            // Deactivated between seeding and here; the loop exits on its first check.
            _ => handle.abort(),
        }
        Ok(())
    }

    /// Stop the active series. In-flight responses for it are discarded.
    pub fn deactivate(&self) {
        let previous = self.active.lock().take();
        self.shared.bump_generation();
        if let Some(previous) = previous {
            previous.cancel.cancel();
            self.shared.builder.lock().clear(&previous.key);
            info!(series = %previous.key, "series deactivated");
        }
    }

    /// Apply a pushed record to the active series.
    pub fn ingest(&self, record: &RawBarRecord) -> Option<BarUpdate> {
        let (key, generation) = {
            let active = self.active.lock();
            let active = active.as_ref()?;
            (active.key.clone(), active.generation)
        };
        self.shared
            .apply_if_current(&key, generation, std::slice::from_ref(record))?
            .pop()
    }

    /// Deactivate and wait (bounded) for the poll loop to exit.
    pub async fn shutdown(&self) {
        let previous = self.active.lock().take();
        self.shared.bump_generation();
        let Some(mut previous) = previous else {
            return;
        };
        previous.cancel.cancel();
        self.shared.builder.lock().clear(&previous.key);

        if let Some(handle) = previous.handle.take() {
            match tokio::time::timeout(SHUTDOWN_TIMEOUT, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => warn!(series = %previous.key, error = %join_err, "poll loop join error"),
                Err(_) => warn!(series = %previous.key, "poll loop did not stop in time"),
            }
        }
        info!(series = %previous.key, "series shut down");
    }

    fn begin(&self, key: SeriesKey) -> (u64, CancellationToken) {
        let mut active = self.active.lock();
        let generation = self.shared.bump_generation();
        if let Some(previous) = active.take() {
            previous.cancel.cancel();
            if previous.key != key {
                self.shared.builder.lock().clear(&previous.key);
            }
        }
        let cancel = self.shutdown.child_token();
        *active = Some(ActiveSeries {
            key,
            generation,
            cancel: cancel.clone(),
            handle: None,
        });
        (generation, cancel)
    }

    fn end_if(&self, generation: u64) {
        let mut active = self.active.lock();
        if active.as_ref().is_some_and(|current| current.generation == generation) {
            *active = None;
        }
    }
}

impl Drop for FeedCoordinator {
    fn drop(&mut self) {
        if let Some(active) = self.active.get_mut().take() {
            active.cancel.cancel();
        }
    }
}

async fn poll_loop(
    shared: Arc<FeedShared>,
    key: SeriesKey,
    generation: u64,
    cancel: CancellationToken,
    period: Duration,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // First tick completes immediately; the snapshot just covered it.
    ticker.tick().await;

    debug!(series = %key, generation, period_ms = period.as_millis() as u64, "poll loop started");
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let Some(cursor) = shared.cursor_if_current(&key, generation) else {
            break;
        };
        let now = now_ms();

        // Not raced against `cancel`: a late response is discarded by the generation check.
        let fetched = shared
            .source
            .fetch_bars(&key.market, key.interval, cursor, now)
            .await;

        match fetched {
            Ok(records) => match shared.apply_if_current(&key, generation, &records) {
                Some(updates) => {
                    debug!(series = %key, records = records.len(), updates = updates.len(), "poll applied")
                }
                None => {
                    debug!(series = %key, generation, "poll response discarded after deactivation");
                    break;
                }
            },
            Err(err) => warn!(series = %key, error = %err, "poll fetch failed"),
        }
    }
    debug!(series = %key, generation, "poll loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bars::Bar;
    use livefeed_adapter::FeedError;
    use std::collections::VecDeque;
    use tokio::sync::{Notify, oneshot};

    #[derive(Default)]
    struct RecordingSink {
        history: Mutex<Vec<(SeriesKey, Vec<Bar>)>>,
        updates: Mutex<Vec<(SeriesKey, BarUpdate)>>,
    }

    impl BarSink for RecordingSink {
        fn set_history(&self, key: &SeriesKey, bars: &[Bar]) {
            self.history.lock().push((key.clone(), bars.to_vec()));
        }

        fn update(&self, key: &SeriesKey, update: &BarUpdate) {
            self.updates.lock().push((key.clone(), *update));
        }
    }

    type Reply = livefeed_adapter::Result<Vec<RawBarRecord>>;

    /// Each fetch takes the next scripted reply; a `Gate` reply waits for release.
    enum Step {
        Ready(Reply),
        Gate(oneshot::Receiver<Reply>),
    }

    #[derive(Default)]
    struct ScriptedSource {
        steps: Mutex<VecDeque<Step>>,
        calls: Mutex<Vec<(String, Interval, i64, i64)>>,
        called: Notify,
    }

    impl ScriptedSource {
        fn push(&self, reply: Reply) {
            self.steps.lock().push_back(Step::Ready(reply));
        }

        fn gate(&self) -> oneshot::Sender<Reply> {
            let (tx, rx) = oneshot::channel();
            self.steps.lock().push_back(Step::Gate(rx));
            tx
        }
    }

    #[async_trait]
    impl KlineSource for ScriptedSource {
        async fn fetch_bars(
            &self,
            market: &str,
            interval: Interval,
            start_ms: i64,
            end_ms: i64,
        ) -> livefeed_adapter::Result<Vec<RawBarRecord>> {
            self.calls
                .lock()
                .push((market.to_string(), interval, start_ms, end_ms));
            self.called.notify_waiters();
            let step = self.steps.lock().pop_front();
            match step {
                Some(Step::Ready(reply)) => reply,
                Some(Step::Gate(rx)) => rx
                    .await
                    .unwrap_or_else(|_| Err(FeedError::InvalidResponse("gate dropped".into()))),
                None => Ok(Vec::new()),
            }
        }
    }

    fn record(ts: i64, close: &str) -> RawBarRecord {
        RawBarRecord {
            close: Some(close.into()),
            start: Some(ts.into()),
            ..RawBarRecord::default()
        }
    }

    fn minute_bucket(offset: i64) -> i64 {
        Interval::OneMinute.bucket_start(now_ms()).expect("bucket") + offset * 60_000
    }

    fn coordinator(
        source: &Arc<ScriptedSource>,
        sink: &Arc<RecordingSink>,
    ) -> FeedCoordinator {
        FeedCoordinator::new(source.clone(), sink.clone(), Duration::from_secs(3600))
    }

    #[tokio::test]
    async fn activation_seeds_history_over_lookback() {
        let source = Arc::new(ScriptedSource::default());
        let sink = Arc::new(RecordingSink::default());
        source.push(Ok(vec![record(minute_bucket(-1), "2"), record(minute_bucket(-2), "1")]));

        let feed = coordinator(&source, &sink);
        tokio_test::assert_ok!(feed.activate("SOL_USDC", Interval::OneMinute).await);

        let key = SeriesKey::new("SOL_USDC", Interval::OneMinute);
        assert_eq!(feed.active_series(), Some(key.clone()));
        let history = sink.history.lock().clone();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].1.iter().map(|b| b.close).collect::<Vec<_>>(), vec![1.0, 2.0]);

        let (market, interval, start, end) = source.calls.lock()[0].clone();
        assert_eq!((market.as_str(), interval), ("SOL_USDC", Interval::OneMinute));
        assert_eq!(end - start, 60 * 60 * 1_000);
        feed.shutdown().await;
    }

    #[tokio::test]
    async fn snapshot_error_is_returned() {
        let source = Arc::new(ScriptedSource::default());
        let sink = Arc::new(RecordingSink::default());
        source.push(Err(FeedError::Api { code: 500, message: "down".into() }));

        let feed = coordinator(&source, &sink);
        let err = feed
            .activate("SOL_USDC", Interval::OneHour)
            .await
            .expect_err("should fail");
        assert!(matches!(err, ChartError::Snapshot(FeedError::Api { code: 500, .. })));
        assert!(feed.active_series().is_none());
        assert!(sink.history.lock().is_empty());
    }

    #[tokio::test]
    async fn stale_snapshot_is_not_applied_after_switch() {
        let source = Arc::new(ScriptedSource::default());
        let sink = Arc::new(RecordingSink::default());
        let release_old = source.gate();
        source.push(Ok(vec![record(minute_bucket(-1), "20")]));

        let feed = Arc::new(coordinator(&source, &sink));
        let called = source.called.notified();
        let old = tokio::spawn({
            let feed = feed.clone();
            async move { feed.activate("OLD_USDC", Interval::OneMinute).await }
        });
        called.await;

        // Switch markets while the old snapshot is still in flight.
        feed.deactivate();
        tokio_test::assert_ok!(feed.activate("NEW_USDC", Interval::OneMinute).await);

        let _ = release_old.send(Ok(vec![record(minute_bucket(-1), "10")]));
        let old_result = tokio_test::assert_ok!(old.await);
        assert!(matches!(old_result, Err(ChartError::Superseded(ref key)) if key.market == "OLD_USDC"));

        let new_key = SeriesKey::new("NEW_USDC", Interval::OneMinute);
        let old_key = SeriesKey::new("OLD_USDC", Interval::OneMinute);
        assert_eq!(feed.active_series(), Some(new_key.clone()));
        assert_eq!(feed.bars(&new_key).iter().map(|b| b.close).collect::<Vec<_>>(), vec![20.0]);
        assert!(feed.bars(&old_key).is_empty());
        assert!(sink.history.lock().iter().all(|(key, _)| key == &new_key));
        feed.shutdown().await;
    }

    #[tokio::test]
    async fn stale_poll_response_is_discarded() {
        let source = Arc::new(ScriptedSource::default());
        let sink = Arc::new(RecordingSink::default());
        source.push(Ok(vec![record(minute_bucket(-1), "1")]));
        let release_poll = source.gate();

        let feed = FeedCoordinator::new(source.clone(), sink.clone(), Duration::from_millis(10));
        tokio_test::assert_ok!(feed.activate("SOL_USDC", Interval::OneMinute).await);

        // Wait until the poll loop is blocked inside its first fetch.
        while source.calls.lock().len() < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        feed.deactivate();

        let _ = release_poll.send(Ok(vec![record(minute_bucket(1), "99")]));
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(sink.updates.lock().is_empty());
        assert!(feed.active_series().is_none());
    }

    #[tokio::test]
    async fn stale_poll_response_is_not_applied_after_switch() {
        let source = Arc::new(ScriptedSource::default());
        let sink = Arc::new(RecordingSink::default());
        let seed_ts = minute_bucket(-1);
        source.push(Ok(vec![record(seed_ts, "1")]));
        let release_old_poll = source.gate();
        source.push(Ok(vec![record(seed_ts, "20")]));
        // Later NEW polls fall through to empty replies.

        let feed = FeedCoordinator::new(source.clone(), sink.clone(), Duration::from_millis(10));
        tokio_test::assert_ok!(feed.activate("OLD_USDC", Interval::OneMinute).await);
        while source.calls.lock().len() < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        feed.deactivate();
        tokio_test::assert_ok!(feed.activate("NEW_USDC", Interval::OneMinute).await);
        let new_key = SeriesKey::new("NEW_USDC", Interval::OneMinute);
        let new_cursor = feed.cursor(&new_key);
        assert_eq!(new_cursor, Some(seed_ts));

        // Newer than NEW's cursor, so it would start a candle if it leaked through.
        let _ = release_old_poll.send(Ok(vec![record(seed_ts + 3 * 60_000, "99")]));
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(feed.active_series(), Some(new_key.clone()));
        assert_eq!(feed.bars(&new_key).iter().map(|b| b.close).collect::<Vec<_>>(), vec![20.0]);
        assert_eq!(feed.cursor(&new_key), new_cursor);
        assert!(feed.bars(&SeriesKey::new("OLD_USDC", Interval::OneMinute)).is_empty());
        let updates = sink.updates.lock().clone();
        assert!(updates.iter().all(|(key, update)| key == &new_key && update.bar.close != 99.0));
        feed.shutdown().await;
    }

    #[tokio::test]
    async fn poll_applies_newer_records_from_cursor() {
        let source = Arc::new(ScriptedSource::default());
        let sink = Arc::new(RecordingSink::default());
        let seed_ts = minute_bucket(-1);
        source.push(Ok(vec![record(seed_ts, "1")]));
        source.push(Ok(vec![record(seed_ts, "1.5"), record(minute_bucket(0), "2")]));

        let feed = FeedCoordinator::new(source.clone(), sink.clone(), Duration::from_millis(10));
        tokio_test::assert_ok!(feed.activate("SOL_USDC", Interval::OneMinute).await);

        while sink.updates.lock().len() < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let updates: Vec<(f64, bool)> = sink
            .updates
            .lock()
            .iter()
            .map(|(_, update)| (update.bar.close, update.new_period))
            .collect();
        assert_eq!(updates[..2], [(1.5, false), (2.0, true)]);
        assert_eq!(source.calls.lock()[1].2, seed_ts);
        feed.shutdown().await;
    }

    #[tokio::test]
    async fn ingest_targets_only_active_series() {
        let source = Arc::new(ScriptedSource::default());
        let sink = Arc::new(RecordingSink::default());
        let feed = coordinator(&source, &sink);

        assert!(feed.ingest(&record(minute_bucket(0), "1")).is_none());

        source.push(Ok(Vec::new()));
        tokio_test::assert_ok!(feed.activate("SOL_USDC", Interval::OneMinute).await);
        let update = feed.ingest(&record(minute_bucket(0), "3")).expect("update");
        assert!(update.new_period);
        assert_eq!(sink.updates.lock().len(), 1);
        feed.shutdown().await;
    }
}
