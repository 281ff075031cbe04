pub mod adapters;
pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod ports;
pub mod telemetry;

use adapters::engine::SandboxWorld;
use adapters::grpc::{
    CallGuard, GrpcAgentService, GrpcEnvironmentService, GrpcInventoryService, GrpcPlayerService,
};
use anyhow::Context;
use app::dispatch::{CommandDispatcher, DispatcherOptions, ShutdownReport};
use app::gatekeeper::{AdmissionPolicy, Gatekeeper};
use app::sessions::{SessionPolicy, SessionRegistry};
use app::stream::StreamManager;
use app::world::{EnvironmentService, InventoryService, PlayerService};
use config::SimlinkConfig;
use error::CoreResult;
use parking_lot::Mutex;
use ports::clock::{Clock, SystemClock};
use ports::engine::SimulationEngine;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use telemetry::BridgeMetrics;
use tokio::net::TcpListener;
use tokio::signal::ctrl_c;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::transport::server::Router;
use tonic::transport::Server;
use tracing::{debug, info, warn};

/// Everything a running bridge owns. Built once at startup and torn down with
/// [`SimlinkContext::shutdown`].
pub struct SimlinkContext {
    config: SimlinkConfig,
    registry: Arc<SessionRegistry>,
    gatekeeper: Arc<Gatekeeper>,
    dispatcher: Arc<CommandDispatcher>,
    streams: Arc<StreamManager>,
    environment: Arc<EnvironmentService>,
    player: Arc<PlayerService>,
    inventory: Arc<InventoryService>,
    sweep_cancel: CancellationToken,
    sweep_task: Mutex<Option<JoinHandle<()>>>,
}

impl SimlinkContext {
    /// Spawns the engine worker thread and, when configured, the expiry
    /// sweep. Must be called from within a tokio runtime.
    pub fn start(
        config: SimlinkConfig,
        engine: Box<dyn SimulationEngine>,
        clock: Arc<dyn Clock>,
        metrics: Option<Arc<BridgeMetrics>>,
    ) -> CoreResult<Self> {
        let registry = Arc::new(SessionRegistry::new(
            SessionPolicy::from(&config.agent),
            clock,
            metrics.clone(),
        ));
        let gatekeeper = Arc::new(Gatekeeper::new(
            &AdmissionPolicy::from(&config.security),
            metrics.clone(),
        ));
        let dispatcher = Arc::new(CommandDispatcher::start(
            engine,
            DispatcherOptions::from(&config.dispatcher),
            metrics.clone(),
        )?);
        let streams = Arc::new(StreamManager::new(dispatcher.clone(), metrics));

        let environment = Arc::new(EnvironmentService::new(
            dispatcher.clone(),
            streams.clone(),
            config.environment.clone(),
        ));
        let player = Arc::new(PlayerService::new(
            dispatcher.clone(),
            streams.clone(),
            config.player.clone(),
        ));
        let inventory = Arc::new(InventoryService::new(dispatcher.clone()));

        let sweep_cancel = CancellationToken::new();
        let sweep_task = match config.agent.sweep_interval_ms {
            0 => None,
            interval_ms => Some(tokio::spawn(run_sweep(
                registry.clone(),
                gatekeeper.clone(),
                Duration::from_millis(interval_ms),
                sweep_cancel.clone(),
            ))),
        };

        Ok(Self {
            config,
            registry,
            gatekeeper,
            dispatcher,
            streams,
            environment,
            player,
            inventory,
            sweep_cancel,
            sweep_task: Mutex::new(sweep_task),
        })
    }

    pub fn config(&self) -> &SimlinkConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn dispatcher(&self) -> &Arc<CommandDispatcher> {
        &self.dispatcher
    }

    pub fn streams(&self) -> &Arc<StreamManager> {
        &self.streams
    }

    pub fn environment(&self) -> &Arc<EnvironmentService> {
        &self.environment
    }

    pub fn player(&self) -> &Arc<PlayerService> {
        &self.player
    }

    pub fn inventory(&self) -> &Arc<InventoryService> {
        &self.inventory
    }

    /// The four services mounted on one tonic router.
    pub fn router(&self) -> Router {
        let guard = CallGuard::new(self.gatekeeper.clone(), self.registry.clone());
        let keepalive = match self.config.grpc.keepalive_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        // Oversized frames are refused while decoding, before any handler runs.
        let max_message = self.config.security.max_request_size_bytes;
        Server::builder()
            .http2_keepalive_interval(keepalive)
            .tcp_keepalive(keepalive)
            .add_service(
                GrpcAgentService::new(guard.clone())
                    .into_server()
                    .max_decoding_message_size(max_message),
            )
            .add_service(
                GrpcEnvironmentService::new(guard.clone(), self.environment.clone())
                    .into_server()
                    .max_decoding_message_size(max_message),
            )
            .add_service(
                GrpcPlayerService::new(guard.clone(), self.player.clone())
                    .into_server()
                    .max_decoding_message_size(max_message),
            )
            .add_service(
                GrpcInventoryService::new(guard, self.inventory.clone())
                    .into_server()
                    .max_decoding_message_size(max_message),
            )
    }

    /// Serves on `listener` until `signal` resolves.
    pub async fn serve<S>(&self, listener: TcpListener, signal: S) -> anyhow::Result<()>
    where
        S: Future<Output = ()> + Send,
    {
        self.router()
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), signal)
            .await
            .context("gRPC server failed")
    }

    /// Cancels every stream, stops the sweep and drains the dispatcher.
    pub async fn shutdown(&self) -> ShutdownReport {
        let grace = Duration::from_millis(self.config.grpc.shutdown_grace_ms);
        if !self.streams.shutdown(grace).await {
            warn!("some streams did not stop within the grace period");
        }

        self.sweep_cancel.cancel();
        let sweep = self.sweep_task.lock().take();
        if let Some(task) = sweep {
            if let Err(err) = task.await {
                warn!(%err, "sweep task join error");
            }
        }

        let dispatcher = self.dispatcher.clone();
        match tokio::task::spawn_blocking(move || dispatcher.shutdown(grace)).await {
            Ok(report) => {
                info!("bridge stopped");
                report
            }
            Err(err) => {
                warn!(%err, "dispatcher shutdown task failed");
                ShutdownReport::default()
            }
        }
    }
}

async fn run_sweep(
    registry: Arc<SessionRegistry>,
    gatekeeper: Arc<Gatekeeper>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let expired = registry.sweep_expired();
                gatekeeper.prune();
                if expired > 0 {
                    debug!(expired, "expiry sweep");
                }
            }
        }
    }
}

/// Runs the daemon against the built-in sandbox world until Ctrl-C.
pub async fn run(config: SimlinkConfig) -> anyhow::Result<()> {
    let (metrics, provider) = match &config.telemetry.otlp_endpoint {
        Some(endpoint) => {
            let (provider, metrics) =
                telemetry::init_metrics(Some(endpoint.clone()), "simlink-agentd")?;
            (Some(Arc::new(metrics)), Some(provider))
        }
        None => (None, None),
    };

    let listen = config.grpc.listen;
    let context = SimlinkContext::start(
        config,
        Box::new(SandboxWorld::new()),
        Arc::new(SystemClock),
        metrics,
    )?;

    let listener = TcpListener::bind(listen)
        .await
        .with_context(|| format!("binding {listen}"))?;
    info!(%listen, "simlink-agentd started");

    let served = context.serve(listener, shutdown_signal()).await;
    context.shutdown().await;

    if let Some(provider) = provider {
        if let Err(err) = telemetry::shutdown_metrics(provider) {
            warn!(%err, "failed to shut down telemetry");
        }
    }
    served
}

async fn shutdown_signal() {
    let _ = ctrl_c().await;
    info!("shutdown signal received");
}
