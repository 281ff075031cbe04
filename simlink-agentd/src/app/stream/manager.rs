use crate::app::dispatch::{CommandDispatcher, DispatchHandle};
use crate::error::{CoreError, CoreResult};
use crate::ports::engine::SimulationEngine;
use crate::telemetry::BridgeMetrics;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

/// Floor applied to every subscription interval.
pub const MIN_STREAM_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubscriptionState {
    Active,
    Cancelled,
    Completed,
}

#[derive(Clone, Debug)]
pub struct SubscriptionSpec {
    pub label: String,
    pub interval: Duration,
}

impl SubscriptionSpec {
    pub fn new(label: impl Into<String>, interval: Duration) -> Self {
        Self {
            label: label.into(),
            interval: interval.max(MIN_STREAM_INTERVAL),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SubscriptionStats {
    pub ticks: u64,
    pub submitted: u64,
    pub delivered: u64,
    pub skipped_in_flight: u64,
    pub skipped_backpressure: u64,
    pub dropped_frames: u64,
    /// Highest number of this subscription's tasks outstanding at once.
    pub max_outstanding: u64,
}

#[derive(Default)]
struct Counters {
    ticks: AtomicU64,
    submitted: AtomicU64,
    delivered: AtomicU64,
    skipped_in_flight: AtomicU64,
    skipped_backpressure: AtomicU64,
    dropped_frames: AtomicU64,
    outstanding: AtomicU64,
    max_outstanding: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> SubscriptionStats {
        SubscriptionStats {
            ticks: self.ticks.load(Ordering::Relaxed),
            submitted: self.submitted.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            skipped_in_flight: self.skipped_in_flight.load(Ordering::Relaxed),
            skipped_backpressure: self.skipped_backpressure.load(Ordering::Relaxed),
            dropped_frames: self.dropped_frames.load(Ordering::Relaxed),
            max_outstanding: self.max_outstanding.load(Ordering::Relaxed),
        }
    }

    fn task_started(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
        let now = self.outstanding.fetch_add(1, Ordering::AcqRel) + 1;
        self.max_outstanding.fetch_max(now, Ordering::AcqRel);
    }

    fn task_finished(&self) {
        self.outstanding.fetch_sub(1, Ordering::AcqRel);
    }
}

#[derive(Clone, Debug)]
pub struct SubscriptionInfo {
    pub id: SubscriptionId,
    pub label: String,
    pub interval: Duration,
}

struct Entry {
    info: SubscriptionInfo,
    cancel: CancellationToken,
}

type Registry = Arc<Mutex<HashMap<SubscriptionId, Entry>>>;

/// Caller-side view of one running subscription.
pub struct SubscriptionHandle {
    id: SubscriptionId,
    cancel: CancellationToken,
    state: watch::Receiver<SubscriptionState>,
    counters: Arc<Counters>,
}

impl SubscriptionHandle {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn state(&self) -> SubscriptionState {
        *self.state.borrow()
    }

    pub fn stats(&self) -> SubscriptionStats {
        self.counters.snapshot()
    }

    /// Resolves once the loop has stopped, with its final state.
    pub async fn join(&mut self) -> SubscriptionState {
        let finished = self
            .state
            .wait_for(|state| *state != SubscriptionState::Active)
            .await
            .map(|state| *state);
        finished.unwrap_or_else(|_| *self.state.borrow())
    }
}

/// Runs one cancellable periodic snapshot loop per streaming call.
pub struct StreamManager {
    dispatcher: Arc<CommandDispatcher>,
    root: CancellationToken,
    tracker: TaskTracker,
    subscriptions: Registry,
    next_id: AtomicU64,
    metrics: Option<Arc<BridgeMetrics>>,
}

impl StreamManager {
    pub fn new(dispatcher: Arc<CommandDispatcher>, metrics: Option<Arc<BridgeMetrics>>) -> Self {
        Self {
            dispatcher,
            root: CancellationToken::new(),
            tracker: TaskTracker::new(),
            subscriptions: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
            metrics,
        }
    }

    /// Starts a loop that, every `spec.interval`, runs `snapshot` on the
    /// engine and pushes the result into `sink`. Must be called from within
    /// a tokio runtime.
    pub fn subscribe<T, F>(
        &self,
        spec: SubscriptionSpec,
        snapshot: F,
        sink: mpsc::Sender<CoreResult<T>>,
    ) -> CoreResult<SubscriptionHandle>
    where
        T: Send + 'static,
        F: Fn(&mut dyn SimulationEngine) -> CoreResult<T> + Send + Sync + 'static,
    {
        if self.root.is_cancelled() {
            return Err(CoreError::unavailable("stream manager is shut down"));
        }
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let spec = SubscriptionSpec::new(spec.label, spec.interval);
        let cancel = self.root.child_token();
        let counters = Arc::new(Counters::default());
        let (state_tx, state_rx) = watch::channel(SubscriptionState::Active);

        self.subscriptions.lock().insert(
            id,
            Entry {
                info: SubscriptionInfo {
                    id,
                    label: spec.label.clone(),
                    interval: spec.interval,
                },
                cancel: cancel.clone(),
            },
        );
        info!(subscription = %id, label = %spec.label, interval_ms = spec.interval.as_millis() as u64, "stream started");

        let run = SubscriptionLoop {
            id,
            spec,
            snapshot: Arc::new(snapshot),
            sink,
            dispatcher: self.dispatcher.clone(),
            cancel: cancel.clone(),
            counters: counters.clone(),
            metrics: self.metrics.clone(),
        };
        let registry = self.subscriptions.clone();
        self.tracker.spawn(async move {
            let final_state = run.drive().await;
            registry.lock().remove(&id);
            let _ = state_tx.send(final_state);
        });

        Ok(SubscriptionHandle {
            id,
            cancel,
            state: state_rx,
            counters,
        })
    }

    pub fn cancel(&self, id: SubscriptionId) -> bool {
        match self.subscriptions.lock().get(&id) {
            Some(entry) => {
                entry.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn active(&self) -> Vec<SubscriptionInfo> {
        let mut infos: Vec<_> = self
            .subscriptions
            .lock()
            .values()
            .map(|entry| entry.info.clone())
            .collect();
        infos.sort_by_key(|info| info.id);
        infos
    }

    pub fn len(&self) -> usize {
        self.subscriptions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cancels every subscription and waits up to `grace` for the loops to
    /// exit. Returns whether they all did.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        let running = self.len();
        self.root.cancel();
        self.tracker.close();
        let finished = tokio::time::timeout(grace, self.tracker.wait())
            .await
            .is_ok();
        info!(subscriptions = running, finished, "stream manager stopped");
        finished
    }
}

struct SubscriptionLoop<T, F> {
    id: SubscriptionId,
    spec: SubscriptionSpec,
    snapshot: Arc<F>,
    sink: mpsc::Sender<CoreResult<T>>,
    dispatcher: Arc<CommandDispatcher>,
    cancel: CancellationToken,
    counters: Arc<Counters>,
    metrics: Option<Arc<BridgeMetrics>>,
}

impl<T, F> SubscriptionLoop<T, F>
where
    T: Send + 'static,
    F: Fn(&mut dyn SimulationEngine) -> CoreResult<T> + Send + Sync + 'static,
{
    async fn drive(self) -> SubscriptionState {
        let mut ticker = tokio::time::interval(self.spec.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut in_flight: Option<DispatchHandle<T>> = None;

        let (state, reason) = loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    break (SubscriptionState::Cancelled, "cancelled");
                }
                _ = self.sink.closed() => {
                    break (SubscriptionState::Cancelled, "client disconnected");
                }
                result = next_result(&mut in_flight) => {
                    in_flight = None;
                    self.counters.task_finished();
                    match result {
                        Ok(frame) => {
                            if let Some(reason) = self.deliver(frame) {
                                break (SubscriptionState::Cancelled, reason);
                            }
                        }
                        Err(err) => {
                            debug!(subscription = %self.id, error = %err, "snapshot failed");
                            let _ = self.sink.try_send(Err(err));
                            break (SubscriptionState::Completed, "snapshot failed");
                        }
                    }
                }
                _ = ticker.tick() => {
                    self.counters.ticks.fetch_add(1, Ordering::Relaxed);
                    if in_flight.is_some() {
                        self.skip(&self.counters.skipped_in_flight, "in_flight");
                        continue;
                    }
                    let snapshot = self.snapshot.clone();
                    match self.dispatcher.submit(move |engine| (*snapshot)(engine)) {
                        Ok(handle) => {
                            self.counters.task_started();
                            in_flight = Some(handle);
                        }
                        Err(CoreError::ResourceExhausted(_)) => {
                            self.skip(&self.counters.skipped_backpressure, "backpressure");
                        }
                        Err(err) => {
                            let _ = self.sink.try_send(Err(err));
                            break (SubscriptionState::Completed, "dispatcher unavailable");
                        }
                    }
                }
            }
        };

        if in_flight.is_some() {
            self.counters.task_finished();
        }
        info!(subscription = %self.id, label = %self.spec.label, reason, "stream stopped");
        state
    }

    /// Pushes one frame without waiting; a slow client loses frames rather
    /// than building a backlog. Returns a stop reason if the client is gone.
    fn deliver(&self, frame: T) -> Option<&'static str> {
        match self.sink.try_send(Ok(frame)) {
            Ok(()) => {
                self.counters.delivered.fetch_add(1, Ordering::Relaxed);
                None
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.counters.dropped_frames.fetch_add(1, Ordering::Relaxed);
                if let Some(metrics) = &self.metrics {
                    metrics.record_stream_tick_skipped("client_slow");
                }
                None
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Some("client disconnected"),
        }
    }

    fn skip(&self, counter: &AtomicU64, reason: &'static str) {
        counter.fetch_add(1, Ordering::Relaxed);
        if let Some(metrics) = &self.metrics {
            metrics.record_stream_tick_skipped(reason);
        }
    }
}

async fn next_result<T>(slot: &mut Option<DispatchHandle<T>>) -> CoreResult<T> {
    match slot {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}
