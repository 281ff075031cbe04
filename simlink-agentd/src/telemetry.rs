use anyhow::{Context, Result};
use opentelemetry::{
    global,
    metrics::{Counter, Histogram, Meter},
    KeyValue,
};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{metrics::SdkMeterProvider, Resource};
use std::time::Duration;
use tracing::info;

/// Bridge metrics. Components hold an `Option<Arc<BridgeMetrics>>` and skip
/// recording when it is absent.
pub struct BridgeMetrics {
    dispatch_latency: Histogram<f64>,
    dispatch_rejections: Counter<u64>,
    task_faults: Counter<u64>,
    stream_ticks_skipped: Counter<u64>,
    rate_limited: Counter<u64>,
    sessions_expired: Counter<u64>,
}

impl BridgeMetrics {
    pub fn new(meter: &Meter) -> Self {
        Self {
            dispatch_latency: meter
                .f64_histogram("simlink.dispatch.latency_ms")
                .with_description("Engine task round-trip latency in milliseconds")
                .build(),
            dispatch_rejections: meter
                .u64_counter("simlink.dispatch.rejections")
                .with_description("Tasks refused by the dispatcher")
                .build(),
            task_faults: meter
                .u64_counter("simlink.dispatch.faults")
                .with_description("Engine tasks that panicked")
                .build(),
            stream_ticks_skipped: meter
                .u64_counter("simlink.stream.ticks_skipped")
                .with_description("Stream ticks that produced no snapshot")
                .build(),
            rate_limited: meter
                .u64_counter("simlink.gatekeeper.rate_limited")
                .with_description("Requests rejected by the rate limiter")
                .build(),
            sessions_expired: meter
                .u64_counter("simlink.sessions.expired")
                .with_description("Agent sessions evicted after timeout")
                .build(),
        }
    }

    pub fn record_dispatch_latency(&self, duration_ms: f64) {
        self.dispatch_latency.record(duration_ms, &[]);
    }

    pub fn record_dispatch_rejection(&self, reason: &'static str) {
        self.dispatch_rejections
            .add(1, &[KeyValue::new("reason", reason)]);
    }

    pub fn record_task_fault(&self) {
        self.task_faults.add(1, &[]);
    }

    pub fn record_stream_tick_skipped(&self, reason: &'static str) {
        self.stream_ticks_skipped
            .add(1, &[KeyValue::new("reason", reason)]);
    }

    pub fn record_rate_limited(&self) {
        self.rate_limited.add(1, &[]);
    }

    pub fn record_sessions_expired(&self, count: u64) {
        if count > 0 {
            self.sessions_expired.add(count, &[]);
        }
    }
}

/// Installs a periodic OTLP/HTTP metrics pipeline and returns the provider
/// together with the bridge instruments.
pub fn init_metrics(
    endpoint: Option<String>,
    service_name: &str,
) -> Result<(SdkMeterProvider, BridgeMetrics)> {
    let endpoint = endpoint.unwrap_or_else(|| "http://localhost:4318".to_string());
    info!(%endpoint, "initializing OTLP metrics");

    let export_config = opentelemetry_otlp::ExportConfig {
        endpoint: Some(endpoint),
        timeout: Duration::from_secs(10),
        ..Default::default()
    };

    let exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_http()
        .with_export_config(export_config)
        .build()
        .context("building OTLP metric exporter")?;

    let reader = opentelemetry_sdk::metrics::PeriodicReader::builder(
        exporter,
        opentelemetry_sdk::runtime::Tokio,
    )
    .with_interval(Duration::from_secs(30))
    .build();

    let resource = Resource::new(vec![
        KeyValue::new("service.name", service_name.to_string()),
        KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
    ]);

    let provider = SdkMeterProvider::builder()
        .with_reader(reader)
        .with_resource(resource)
        .build();

    global::set_meter_provider(provider.clone());
    let metrics = BridgeMetrics::new(&global::meter("simlink-agentd"));
    Ok((provider, metrics))
}

pub fn shutdown_metrics(provider: SdkMeterProvider) -> Result<()> {
    info!("shutting down metrics");
    provider
        .shutdown()
        .context("shutting down meter provider")?;
    Ok(())
}
