use crate::config::DispatcherConfig;
use crate::error::{CoreError, CoreResult};
use crate::ports::engine::SimulationEngine;
use crate::telemetry::BridgeMetrics;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TrySendError};
use parking_lot::Mutex;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

#[derive(Clone, Debug)]
pub struct DispatcherOptions {
    pub queue_capacity: usize,
    pub call_timeout: Duration,
    pub thread_name: String,
}

impl From<&DispatcherConfig> for DispatcherOptions {
    fn from(config: &DispatcherConfig) -> Self {
        Self {
            queue_capacity: config.queue_capacity,
            call_timeout: Duration::from_millis(config.call_timeout_ms),
            thread_name: "simlink-engine".into(),
        }
    }
}

impl Default for DispatcherOptions {
    fn default() -> Self {
        Self::from(&DispatcherConfig::default())
    }
}

enum TaskOutcome {
    Completed,
    Faulted,
    Aborted,
}

type Job = Box<dyn FnOnce(&mut dyn SimulationEngine, bool) -> TaskOutcome + Send>;

struct Task {
    seq: u64,
    job: Job,
}

#[derive(Default)]
struct WorkerShared {
    abort: AtomicBool,
    executed: AtomicU64,
    faulted: AtomicU64,
    aborted: AtomicU64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub submitted: u64,
    pub executed: u64,
    pub rejected: u64,
    pub faulted: u64,
    pub aborted: u64,
    pub queue_depth: usize,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Queue emptied within the grace period.
    pub drained: bool,
    /// Worker thread exited and was joined.
    pub worker_joined: bool,
    /// Tasks answered with `Unavailable` instead of running.
    pub aborted_tasks: u64,
    pub elapsed_ms: u64,
}

struct WorkerThread {
    handle: JoinHandle<Box<dyn SimulationEngine>>,
    /// Disconnects when the worker thread exits, panicking or not.
    exited: Receiver<()>,
}

impl WorkerThread {
    fn wait_exit(&self, deadline: Instant) -> bool {
        !matches!(self.exited.recv_deadline(deadline), Err(RecvTimeoutError::Timeout))
    }
}

struct Submitter {
    sender: Option<Sender<Task>>,
    next_seq: u64,
}

/// Serializes every engine operation onto one dedicated thread.
///
/// Submissions are totally ordered: a sequence number is assigned and the
/// task enqueued under one lock, and the worker drains the queue FIFO.
pub struct CommandDispatcher {
    submitter: Mutex<Submitter>,
    worker: Mutex<Option<WorkerThread>>,
    shared: Arc<WorkerShared>,
    submitted: AtomicU64,
    rejected: AtomicU64,
    options: DispatcherOptions,
    metrics: Option<Arc<BridgeMetrics>>,
}

impl CommandDispatcher {
    pub fn start(
        engine: Box<dyn SimulationEngine>,
        options: DispatcherOptions,
        metrics: Option<Arc<BridgeMetrics>>,
    ) -> CoreResult<Self> {
        if options.queue_capacity == 0 {
            return Err(CoreError::invalid("dispatcher queue capacity must be positive"));
        }
        let (tx, rx) = channel::bounded::<Task>(options.queue_capacity);
        let shared = Arc::new(WorkerShared::default());

        let (exit_tx, exited) = channel::bounded::<()>(0);
        let worker_shared = shared.clone();
        let worker_metrics = metrics.clone();
        let handle = thread::Builder::new()
            .name(options.thread_name.clone())
            .spawn(move || {
                let _exit = exit_tx;
                worker_loop(rx, engine, worker_shared, worker_metrics)
            })
            .map_err(|err| CoreError::internal(format!("spawning dispatcher worker: {err}")))?;

        info!(
            queue_capacity = options.queue_capacity,
            thread = %options.thread_name,
            "dispatcher started"
        );

        Ok(Self {
            submitter: Mutex::new(Submitter {
                sender: Some(tx),
                next_seq: 0,
            }),
            worker: Mutex::new(Some(WorkerThread { handle, exited })),
            shared,
            submitted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            options,
            metrics,
        })
    }

    pub fn call_timeout(&self) -> Duration {
        self.options.call_timeout
    }

    /// Enqueues `op` without waiting for it. Fails fast with
    /// `ResourceExhausted` when the queue is at capacity.
    pub fn submit<T, F>(&self, op: F) -> CoreResult<DispatchHandle<T>>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn SimulationEngine) -> CoreResult<T> + Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job: Job = Box::new(move |engine: &mut dyn SimulationEngine, aborted: bool| {
            if aborted {
                let _ = reply_tx.send(Err(CoreError::unavailable("dispatcher shutting down")));
                return TaskOutcome::Aborted;
            }
            match catch_unwind(AssertUnwindSafe(|| op(engine))) {
                Ok(result) => {
                    let _ = reply_tx.send(result);
                    TaskOutcome::Completed
                }
                Err(payload) => {
                    let _ = reply_tx.send(Err(CoreError::from_panic(payload)));
                    TaskOutcome::Faulted
                }
            }
        });

        let mut submitter = self.submitter.lock();
        let seq = submitter.next_seq;
        let sent = match submitter.sender.as_ref() {
            Some(sender) => sender.try_send(Task { seq, job }).map_err(Some),
            None => Err(None),
        };
        if sent.is_ok() {
            submitter.next_seq += 1;
        }
        drop(submitter);

        match sent {
            Ok(()) => {
                self.submitted.fetch_add(1, Ordering::Relaxed);
                Ok(DispatchHandle { seq, rx: reply_rx })
            }
            Err(Some(TrySendError::Full(_))) => {
                self.reject("queue_full");
                debug!(capacity = self.options.queue_capacity, "dispatch queue full");
                Err(CoreError::ResourceExhausted(format!(
                    "dispatcher queue is full ({} pending)",
                    self.options.queue_capacity
                )))
            }
            Err(Some(TrySendError::Disconnected(_))) | Err(None) => {
                self.reject("stopped");
                Err(CoreError::unavailable("dispatcher is stopped"))
            }
        }
    }

    /// Submits and parks the calling thread until the worker has run `op`.
    /// Must not be called from inside an async runtime.
    pub fn submit_blocking<T, F>(&self, op: F) -> CoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn SimulationEngine) -> CoreResult<T> + Send + 'static,
    {
        self.submit(op)?.blocking_wait()
    }

    /// Submits and awaits the result, giving up after the call timeout.
    /// A timed-out task may still run later; its result is discarded.
    pub async fn execute<T, F>(&self, op: F) -> CoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn SimulationEngine) -> CoreResult<T> + Send + 'static,
    {
        let handle = self.submit(op)?;
        let seq = handle.seq();
        let started = Instant::now();
        let result = tokio::time::timeout(self.options.call_timeout, handle).await;
        if let Some(metrics) = &self.metrics {
            metrics.record_dispatch_latency(started.elapsed().as_secs_f64() * 1000.0);
        }
        match result {
            Ok(result) => result,
            Err(_) => {
                warn!(seq, timeout_ms = self.options.call_timeout.as_millis() as u64, "dispatch call timed out");
                Err(CoreError::unavailable("engine did not respond in time"))
            }
        }
    }

    pub fn queue_depth(&self) -> usize {
        self.submitter
            .lock()
            .sender
            .as_ref()
            .map(Sender::len)
            .unwrap_or(0)
    }

    pub fn is_running(&self) -> bool {
        self.submitter.lock().sender.is_some()
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            submitted: self.submitted.load(Ordering::Relaxed),
            executed: self.shared.executed.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            faulted: self.shared.faulted.load(Ordering::Relaxed),
            aborted: self.shared.aborted.load(Ordering::Relaxed),
            queue_depth: self.queue_depth(),
        }
    }

    fn reject(&self, reason: &'static str) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
        if let Some(metrics) = &self.metrics {
            metrics.record_dispatch_rejection(reason);
        }
    }

    /// Stops accepting work, lets queued tasks drain for up to `grace`, then
    /// answers whatever is left with `Unavailable`. If the worker is stuck in
    /// a task past a second grace window it is detached.
    pub fn shutdown(&self, grace: Duration) -> ShutdownReport {
        let start = Instant::now();
        let Some(worker) = self.worker.lock().take() else {
            return ShutdownReport {
                drained: true,
                worker_joined: true,
                aborted_tasks: 0,
                elapsed_ms: 0,
            };
        };

        // Dropping the only sender lets the worker exit once the queue is empty.
        self.submitter.lock().sender = None;
        info!(grace_ms = grace.as_millis() as u64, "dispatcher draining");

        let drained = worker.wait_exit(start + grace);
        if !drained {
            warn!("dispatcher grace period elapsed, aborting queued tasks");
            self.shared.abort.store(true, Ordering::Release);
        }

        let worker_joined = if drained || worker.wait_exit(Instant::now() + grace) {
            match worker.handle.join() {
                Ok(_engine) => true,
                Err(_) => {
                    error!("dispatcher worker panicked outside a task");
                    false
                }
            }
        } else {
            warn!("dispatcher worker still busy, detaching");
            false
        };

        let report = ShutdownReport {
            drained,
            worker_joined,
            aborted_tasks: self.shared.aborted.load(Ordering::Relaxed),
            elapsed_ms: start.elapsed().as_millis() as u64,
        };
        info!(
            drained = report.drained,
            joined = report.worker_joined,
            aborted = report.aborted_tasks,
            elapsed_ms = report.elapsed_ms,
            "dispatcher stopped"
        );
        report
    }
}

fn worker_loop(
    rx: Receiver<Task>,
    mut engine: Box<dyn SimulationEngine>,
    shared: Arc<WorkerShared>,
    metrics: Option<Arc<BridgeMetrics>>,
) -> Box<dyn SimulationEngine> {
    debug!("dispatcher worker running");
    while let Ok(task) = rx.recv() {
        let aborted = shared.abort.load(Ordering::Acquire);
        match (task.job)(engine.as_mut(), aborted) {
            TaskOutcome::Completed => {
                shared.executed.fetch_add(1, Ordering::Relaxed);
            }
            TaskOutcome::Faulted => {
                shared.executed.fetch_add(1, Ordering::Relaxed);
                shared.faulted.fetch_add(1, Ordering::Relaxed);
                error!(seq = task.seq, "dispatched operation faulted");
                if let Some(metrics) = &metrics {
                    metrics.record_task_fault();
                }
            }
            TaskOutcome::Aborted => {
                shared.aborted.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
    debug!("dispatcher worker exiting");
    engine
}

/// Completion of one dispatched task. Awaiting it yields the task's result;
/// dropping it discards the result once the worker delivers it.
#[derive(Debug)]
pub struct DispatchHandle<T> {
    seq: u64,
    rx: oneshot::Receiver<CoreResult<T>>,
}

impl<T> DispatchHandle<T> {
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn blocking_wait(self) -> CoreResult<T> {
        self.rx.blocking_recv().unwrap_or_else(|_| Err(lost_reply()))
    }
}

impl<T> Future for DispatchHandle<T> {
    type Output = CoreResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|reply| reply.unwrap_or_else(|_| Err(lost_reply())))
    }
}

fn lost_reply() -> CoreError {
    CoreError::unavailable("dispatcher stopped before completing the task")
}
