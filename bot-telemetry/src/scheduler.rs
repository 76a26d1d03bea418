//! Poll scheduler: one independent timer task per registered source.
//!
//! - A tick that fires while the previous fetch is still in flight is skipped,
//!   not queued.
//! - Rescoping a source aborts its in-flight fetch, invalidates the old ticket
//!   in the store, fetches immediately and restarts the interval from there.
//! - Stopping a source cancels the timer and the in-flight fetch; a response
//!   that still arrives is discarded by the store's ticket check.

use crate::error::{ConfigError, FetchError};
use crate::source::{HttpFetch, Outcome, SourceAdapter, SourceSpec};
use crate::store::{ApplyOutcome, SourceId, Ticket, ViewStore};
use crate::types::Scope;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Per-source polling bookkeeping. Owned by the scheduler; callers get clones.
#[derive(Debug, Clone, PartialEq)]
pub struct PollState {
    pub spec: SourceSpec,
    pub interval: Duration,
    pub last_fetch_started_at: Option<Instant>,
    pub in_flight: bool,
    pub last_error: Option<FetchError>,
    pub fetches_started: u64,
    pub ticks_skipped: u64,
}

#[derive(Debug)]
struct SourceShared {
    state: PollState,
    /// Sequence number and abort handle of the fetch currently in flight.
    in_flight: Option<(u64, AbortHandle)>,
}

#[derive(Debug)]
struct SourceHandle {
    control: watch::Sender<SourceSpec>,
    shared: Arc<Mutex<SourceShared>>,
    task: JoinHandle<()>,
}

/// Drives every registered source on its own cadence.
pub struct PollScheduler<F> {
    adapter: Arc<SourceAdapter<F>>,
    store: Arc<ViewStore>,
    sources: HashMap<SourceId, SourceHandle>,
}

impl<F> PollScheduler<F>
where
    F: HttpFetch + 'static,
{
    pub fn new(adapter: Arc<SourceAdapter<F>>, store: Arc<ViewStore>) -> Self {
        Self {
            adapter,
            store,
            sources: HashMap::new(),
        }
    }

    pub fn store(&self) -> &Arc<ViewStore> {
        &self.store
    }

    /// Start polling `spec` every `every` under `id`, replacing any source
    /// already registered under that id. The first fetch starts immediately.
    ///
    /// Must be called from within a tokio runtime. A zero interval is rejected
    /// and leaves any source already registered under `id` untouched.
    pub fn register(
        &mut self,
        id: impl Into<SourceId>,
        spec: SourceSpec,
        every: Duration,
    ) -> Result<(), ConfigError> {
        let id = id.into();
        if every.is_zero() {
            warn!(source = %id, "refusing to register source with zero poll interval");
            return Err(ConfigError::ZeroInterval(id));
        }
        self.stop(&id);

        info!(source = %id, key = %spec.key(), ?every, "registering source");
        self.store.activate(&id, spec.key());

        let shared = Arc::new(Mutex::new(SourceShared {
            state: PollState {
                spec: spec.clone(),
                interval: every,
                last_fetch_started_at: None,
                in_flight: false,
                last_error: None,
                fetches_started: 0,
                ticks_skipped: 0,
            },
            in_flight: None,
        }));

        let (control, control_rx) = watch::channel(spec);
        let task = tokio::spawn(
            SourceTask {
                id: id.clone(),
                adapter: Arc::clone(&self.adapter),
                store: Arc::clone(&self.store),
                shared: Arc::clone(&shared),
                every,
            }
            .run(control_rx),
        );

        self.sources.insert(
            id,
            SourceHandle {
                control,
                shared,
                task,
            },
        );
        Ok(())
    }

    /// Change the scope of a registered source. Returns `false` if the source
    /// is unknown or already on that scope.
    pub fn rescope(&mut self, id: &str, scope: Scope) -> bool {
        let Some(current) = self
            .sources
            .get(id)
            .map(|handle| handle.control.borrow().clone())
        else {
            return false;
        };

        if current.scope == scope {
            return false;
        }
        self.reconfigure(id, current.with_scope(scope))
    }

    /// Replace the full spec of a registered source (scope, limit or kind).
    pub fn reconfigure(&mut self, id: &str, spec: SourceSpec) -> bool {
        let Some(handle) = self.sources.get(id) else {
            return false;
        };

        info!(source = id, key = %spec.key(), "rescoping source");
        // Invalidate before waking the task so a response racing the change
        // is already stale when it lands.
        self.store.activate(id, spec.key());
        handle.shared.lock().state.spec = spec.clone();
        handle.control.send_replace(spec);
        true
    }

    /// Fetch a registered source now, out of cycle, keeping its scope.
    pub fn refresh(&self, id: &str) -> bool {
        match self.sources.get(id) {
            Some(handle) => {
                handle.control.send_modify(|_| {});
                true
            }
            None => false,
        }
    }

    /// Stop polling `id`. Any in-flight response is discarded.
    pub fn stop(&mut self, id: &str) {
        let Some(handle) = self.sources.remove(id) else {
            return;
        };

        self.store.deactivate(id);
        handle.task.abort();
        if let Some((_, in_flight)) = handle.shared.lock().in_flight.take() {
            in_flight.abort();
        }
        debug!(source = id, "source stopped");
    }

    /// Stop every source.
    pub fn shutdown(&mut self) {
        let ids: Vec<SourceId> = self.sources.keys().cloned().collect();
        for id in ids {
            self.stop(&id);
        }
    }

    pub fn poll_state(&self, id: &str) -> Option<PollState> {
        self.sources
            .get(id)
            .map(|handle| handle.shared.lock().state.clone())
    }

    pub fn source_ids(&self) -> impl Iterator<Item = &SourceId> {
        self.sources.keys()
    }

    /// Current spec of a registered source.
    pub fn spec(&self, id: &str) -> Option<SourceSpec> {
        self.sources
            .get(id)
            .map(|handle| handle.control.borrow().clone())
    }
}

impl<F> Drop for PollScheduler<F> {
    fn drop(&mut self) {
        for handle in self.sources.values() {
            handle.task.abort();
            if let Some((_, in_flight)) = handle.shared.lock().in_flight.take() {
                in_flight.abort();
            }
        }
    }
}

struct SourceTask<F> {
    id: SourceId,
    adapter: Arc<SourceAdapter<F>>,
    store: Arc<ViewStore>,
    shared: Arc<Mutex<SourceShared>>,
    every: Duration,
}

impl<F> SourceTask<F>
where
    F: HttpFetch + 'static,
{
    async fn run(self, mut control: watch::Receiver<SourceSpec>) {
        let mut timer = tokio::time::interval(self.every);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    let spec = control.borrow().clone();
                    self.launch(spec, false);
                }
                changed = control.changed() => {
                    if changed.is_err() {
                        debug!(source = %self.id, "control channel closed, stopping poll loop");
                        break;
                    }
                    let spec = control.borrow_and_update().clone();
                    self.launch(spec, true);
                    timer.reset();
                }
            }
        }
    }

    /// Start a fetch unless one is already in flight. `preempt` aborts the
    /// in-flight fetch instead of skipping.
    fn launch(&self, spec: SourceSpec, preempt: bool) {
        let mut shared = self.shared.lock();

        if let Some((seq, handle)) = shared.in_flight.take() {
            if preempt {
                debug!(source = %self.id, seq, "aborting in-flight fetch");
                handle.abort();
            } else {
                shared.in_flight = Some((seq, handle));
                shared.state.ticks_skipped += 1;
                debug!(source = %self.id, seq, "previous fetch still in flight, skipping tick");
                return;
            }
        }

        let Some(ticket) = self.store.ticket(&self.id) else {
            debug!(source = %self.id, "source inactive, not fetching");
            shared.state.in_flight = false;
            return;
        };

        // A tick between store activation and spec publication must not pair
        // the old spec with the new ticket.
        if ticket.key != spec.key() {
            debug!(source = %self.id, ticket = %ticket.key, spec = %spec.key(), "spec not yet published, skipping");
            shared.state.in_flight = false;
            return;
        }

        shared.state.fetches_started += 1;
        shared.state.last_fetch_started_at = Some(Instant::now());
        shared.state.in_flight = true;
        let seq = shared.state.fetches_started;

        let fetch = tokio::spawn(fetch_and_apply(
            Arc::clone(&self.adapter),
            Arc::clone(&self.store),
            Arc::clone(&self.shared),
            spec,
            ticket,
            seq,
        ));
        shared.in_flight = Some((seq, fetch.abort_handle()));
    }
}

async fn fetch_and_apply<F>(
    adapter: Arc<SourceAdapter<F>>,
    store: Arc<ViewStore>,
    shared: Arc<Mutex<SourceShared>>,
    spec: SourceSpec,
    ticket: Ticket,
    seq: u64,
) where
    F: HttpFetch + 'static,
{
    let result = adapter.fetch(&spec).await;
    let error = match &result.outcome {
        Outcome::Error(error) => Some(error.clone()),
        Outcome::Success | Outcome::Empty => None,
    };

    let applied = store.apply_ticketed(&ticket, result);

    let mut shared = shared.lock();
    if shared
        .in_flight
        .as_ref()
        .is_some_and(|(current, _)| *current == seq)
    {
        shared.in_flight = None;
        shared.state.in_flight = false;
    }

    match applied {
        ApplyOutcome::Discarded => {}
        ApplyOutcome::Retained => {
            warn!(source = %ticket.source, key = %ticket.key, "keeping last snapshot after failed fetch");
            shared.state.last_error = error;
        }
        ApplyOutcome::Replaced => shared.state.last_error = None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::fake::{FakeFetcher, FakeResponse};
    use crate::store::SlotStatus;
    use crate::types::{BotIdentity, DataKind, ScopeKey};
    use serde_json::json;
    use url::Url;

    fn scheduler(fetcher: Arc<FakeFetcher>) -> PollScheduler<Arc<FakeFetcher>> {
        let adapter = SourceAdapter::new(fetcher, Url::parse("http://bots.local/").unwrap());
        PollScheduler::new(Arc::new(adapter), Arc::new(ViewStore::new()))
    }

    fn equity_spec(identity: BotIdentity) -> SourceSpec {
        SourceSpec::new(DataKind::Equity, Scope::bot(identity), 100)
    }

    fn equity_body(values: &[f64]) -> serde_json::Value {
        json!({
            "data": values.iter().map(|equity| json!({"equity": equity})).collect::<Vec<_>>(),
            "count": values.len()
        })
    }

    fn equity_key(identity: BotIdentity) -> ScopeKey {
        ScopeKey::new(DataKind::Equity, Scope::bot(identity))
    }

    async fn advance(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_skipped_while_in_flight() {
        let fetcher = Arc::new(FakeFetcher::new().route(
            "/bots/5m/equity",
            vec![FakeResponse::ok(equity_body(&[100.0])).after(Duration::from_millis(250))],
        ));
        let mut scheduler = scheduler(Arc::clone(&fetcher));

        scheduler
            .register(
                "equity",
                equity_spec(BotIdentity::FiveMinute),
                Duration::from_millis(100),
            )
            .unwrap();
        // ticks at 0..=600ms; fetches start at 0, 300 and 600
        advance(650).await;

        assert_eq!(fetcher.calls(), 3);
        let state = scheduler.poll_state("equity").unwrap();
        assert_eq!(state.fetches_started, 3);
        assert!(state.ticks_skipped >= 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rescope_discards_late_response() {
        let fetcher = Arc::new(
            FakeFetcher::new()
                .route(
                    "/bots/5m/equity",
                    vec![FakeResponse::ok(equity_body(&[1.0, 2.0, 3.0]))
                        .after(Duration::from_millis(300))],
                )
                .route(
                    "/bots/1h/equity",
                    vec![FakeResponse::ok(equity_body(&[7.0])).after(Duration::from_millis(10))],
                ),
        );
        let mut scheduler = scheduler(Arc::clone(&fetcher));
        let store = Arc::clone(scheduler.store());

        scheduler
            .register(
                "equity",
                equity_spec(BotIdentity::FiveMinute),
                Duration::from_secs(10),
            )
            .unwrap();
        advance(50).await;
        assert!(scheduler.rescope("equity", Scope::bot(BotIdentity::OneHour)));
        advance(500).await;

        assert_eq!(fetcher.calls(), 2);
        assert_eq!(store.get(&equity_key(BotIdentity::FiveMinute)).status, SlotStatus::Loading);

        let active = store.get_active("equity").unwrap();
        assert_eq!(active.status, SlotStatus::Ready);
        assert_eq!(active.payload.as_equity().unwrap().derived.latest_equity, Some(7.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rescope_to_same_scope_is_noop() {
        let fetcher = Arc::new(FakeFetcher::new().route(
            "/bots/5m/equity",
            vec![FakeResponse::ok(equity_body(&[1.0]))],
        ));
        let mut scheduler = scheduler(Arc::clone(&fetcher));

        scheduler
            .register(
                "equity",
                equity_spec(BotIdentity::FiveMinute),
                Duration::from_secs(10),
            )
            .unwrap();
        advance(10).await;
        assert!(!scheduler.rescope("equity", Scope::bot(BotIdentity::FiveMinute)));
        assert!(!scheduler.rescope("unknown", Scope::bot(BotIdentity::FiveMinute)));
        advance(10).await;

        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_keeps_snapshot_and_schedule() {
        let fetcher = Arc::new(FakeFetcher::new().route(
            "/bots/12h/equity",
            vec![
                FakeResponse::ok(equity_body(&[500.0, 510.0])),
                FakeResponse::status(500),
            ],
        ));
        let mut scheduler = scheduler(Arc::clone(&fetcher));
        let store = Arc::clone(scheduler.store());
        let key = equity_key(BotIdentity::TwelveHour);

        scheduler
            .register(
                "equity",
                equity_spec(BotIdentity::TwelveHour),
                Duration::from_millis(100),
            )
            .unwrap();
        advance(50).await;
        assert_eq!(store.get(&key).status, SlotStatus::Ready);

        advance(100).await;
        let slot = store.get(&key);
        assert_eq!(slot.status, SlotStatus::Stale);
        assert_eq!(slot.payload.len(), 2);
        assert_eq!(
            scheduler.poll_state("equity").unwrap().last_error,
            Some(FetchError::Status { status: 500 })
        );

        advance(200).await;
        assert_eq!(fetcher.calls(), 4);
        assert_eq!(store.get(&key).payload.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_discards_in_flight() {
        let fetcher = Arc::new(FakeFetcher::new().route(
            "/bots/24h/equity",
            vec![FakeResponse::ok(equity_body(&[1.0])).after(Duration::from_millis(200))],
        ));
        let mut scheduler = scheduler(Arc::clone(&fetcher));
        let store = Arc::clone(scheduler.store());

        scheduler
            .register(
                "equity",
                equity_spec(BotIdentity::TwentyFourHour),
                Duration::from_millis(100),
            )
            .unwrap();
        advance(50).await;
        scheduler.stop("equity");
        advance(500).await;

        assert_eq!(fetcher.calls(), 1);
        assert_eq!(
            store.get(&equity_key(BotIdentity::TwentyFourHour)).status,
            SlotStatus::Loading
        );
        assert!(scheduler.poll_state("equity").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rescope_restarts_interval() {
        let fetcher = Arc::new(
            FakeFetcher::new()
                .route("/bots/5m/equity", vec![FakeResponse::ok(equity_body(&[1.0]))])
                .route("/bots/1h/equity", vec![FakeResponse::ok(equity_body(&[2.0]))]),
        );
        let mut scheduler = scheduler(Arc::clone(&fetcher));

        scheduler
            .register(
                "equity",
                equity_spec(BotIdentity::FiveMinute),
                Duration::from_millis(1000),
            )
            .unwrap();
        advance(400).await;
        scheduler.rescope("equity", Scope::bot(BotIdentity::OneHour));

        // regular tick would have been at 1000ms; after the reset it is at 1400ms
        advance(800).await;
        assert_eq!(fetcher.calls(), 2);

        advance(250).await;
        assert_eq!(fetcher.calls(), 3);
        assert!(fetcher.requests().last().unwrap().path().ends_with("/1h/equity"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sources_poll_independently() {
        let fetcher = Arc::new(
            FakeFetcher::new()
                .route("/bots/5m/equity", vec![FakeResponse::ok(equity_body(&[1.0]))])
                .route(
                    "/bots/5m/executions",
                    vec![FakeResponse::ok(json!({"data": [{"price": 1.0}]}))],
                ),
        );
        let mut scheduler = scheduler(Arc::clone(&fetcher));

        scheduler
            .register(
                "equity",
                equity_spec(BotIdentity::FiveMinute),
                Duration::from_millis(300),
            )
            .unwrap();
        scheduler
            .register(
                "executions",
                SourceSpec::new(DataKind::Executions, Scope::bot(BotIdentity::FiveMinute), 50),
                Duration::from_millis(100),
            )
            .unwrap();
        advance(350).await;

        assert_eq!(scheduler.poll_state("equity").unwrap().fetches_started, 2);
        assert_eq!(scheduler.poll_state("executions").unwrap().fetches_started, 4);

        scheduler.shutdown();
        assert_eq!(scheduler.source_ids().count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_fetches_out_of_cycle() {
        let fetcher = Arc::new(FakeFetcher::new().route(
            "/bots/1h/equity",
            vec![FakeResponse::ok(equity_body(&[1.0]))],
        ));
        let mut scheduler = scheduler(Arc::clone(&fetcher));

        scheduler
            .register(
                "equity",
                equity_spec(BotIdentity::OneHour),
                Duration::from_secs(60),
            )
            .unwrap();
        advance(10).await;
        assert!(scheduler.refresh("equity"));
        advance(10).await;

        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_rejected() {
        let fetcher = Arc::new(FakeFetcher::new().route(
            "/bots/5m/equity",
            vec![FakeResponse::ok(equity_body(&[1.0]))],
        ));
        let mut scheduler = scheduler(Arc::clone(&fetcher));

        let err = scheduler
            .register("signals", equity_spec(BotIdentity::FiveMinute), Duration::ZERO)
            .unwrap_err();
        assert_eq!(err, ConfigError::ZeroInterval("signals".to_string()));
        assert!(scheduler.poll_state("signals").is_none());

        scheduler
            .register(
                "equity",
                equity_spec(BotIdentity::FiveMinute),
                Duration::from_millis(100),
            )
            .unwrap();
        assert!(
            scheduler
                .register("equity", equity_spec(BotIdentity::OneHour), Duration::ZERO)
                .is_err()
        );
        advance(150).await;

        // the running source keeps its spec and cadence
        assert_eq!(fetcher.calls(), 2);
        assert_eq!(
            scheduler.spec("equity").unwrap().key(),
            equity_key(BotIdentity::FiveMinute)
        );
        assert_eq!(
            scheduler.store().get(&equity_key(BotIdentity::FiveMinute)).status,
            SlotStatus::Ready
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_launch_skips_spec_behind_ticket() {
        let fetcher = Arc::new(FakeFetcher::new().route(
            "/bots/5m/equity",
            vec![FakeResponse::ok(equity_body(&[1.0]))],
        ));
        let adapter = Arc::new(SourceAdapter::new(
            Arc::clone(&fetcher),
            Url::parse("http://bots.local/").unwrap(),
        ));
        let store = Arc::new(ViewStore::new());
        let old = equity_spec(BotIdentity::FiveMinute);
        let shared = Arc::new(Mutex::new(SourceShared {
            state: PollState {
                spec: old.clone(),
                interval: Duration::from_secs(10),
                last_fetch_started_at: None,
                in_flight: false,
                last_error: None,
                fetches_started: 0,
                ticks_skipped: 0,
            },
            in_flight: None,
        }));
        let task = SourceTask {
            id: "equity".to_string(),
            adapter,
            store: Arc::clone(&store),
            shared: Arc::clone(&shared),
            every: Duration::from_secs(10),
        };

        // store already moved to 1h, the task still holds the 5m spec
        store.activate("equity", equity_key(BotIdentity::OneHour));
        task.launch(old, false);
        advance(50).await;

        assert_eq!(fetcher.calls(), 0);
        assert_eq!(shared.lock().state.fetches_started, 0);
        assert_eq!(store.get(&equity_key(BotIdentity::OneHour)).status, SlotStatus::Loading);
        assert_eq!(store.get(&equity_key(BotIdentity::FiveMinute)).status, SlotStatus::Loading);
    }
}
