//! Logging, tracing and metrics setup, plus the process-wide error sink.
//!
//! Logs always go to stderr. With an OTLP endpoint, spans, metrics and
//! log records are exported there as well.

pub mod metrics;
pub mod sync;

use opentelemetry::KeyValue;
use opentelemetry_sdk::logs::SdkLoggerProvider;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::trace::SdkTracerProvider;

use crate::error::{Error, Result};

/// Report an error nobody is waiting on.
///
/// Per-key failures never propagate out of a worker; they end up here so
/// they are logged and counted instead of lost.
pub fn handle_error(context: &'static str, error: &Error) {
    tracing::error!(context, error = %error, "unhandled error");
    metrics::errors_handled().add(1, &[KeyValue::new("context", context)]);
}

pub struct TelemetryConfig {
    /// OTLP gRPC collector, e.g. `http://localhost:4317`.
    pub endpoint: Option<String>,
    pub service_name: String,
    /// Fallback filter directive when `RUST_LOG` is unset (e.g. "info").
    pub log_level: String,
}

/// OTLP providers, present only when an endpoint is configured.
struct Pipelines {
    tracer: SdkTracerProvider,
    meter: SdkMeterProvider,
    logger: SdkLoggerProvider,
}

impl Pipelines {
    fn connect(endpoint: &str, service_name: String) -> Result<Self> {
        use opentelemetry_otlp::{LogExporter, MetricExporter, SpanExporter, WithExportConfig as _};

        let resource = opentelemetry_sdk::Resource::builder()
            .with_service_name(service_name)
            .build();

        let spans = SpanExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .build()
            .map_err(|e| exporter_error("span", endpoint, e))?;
        let metrics = MetricExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .build()
            .map_err(|e| exporter_error("metric", endpoint, e))?;
        let logs = LogExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .build()
            .map_err(|e| exporter_error("log", endpoint, e))?;

        Ok(Self {
            tracer: SdkTracerProvider::builder()
                .with_batch_exporter(spans)
                .with_resource(resource.clone())
                .build(),
            meter: SdkMeterProvider::builder()
                .with_periodic_exporter(metrics)
                .with_resource(resource.clone())
                .build(),
            logger: SdkLoggerProvider::builder()
                .with_batch_exporter(logs)
                .with_resource(resource)
                .build(),
        })
    }
}

fn exporter_error(signal: &str, endpoint: &str, e: impl std::fmt::Display) -> Error {
    Error::Config(format!("OTLP {signal} exporter for {endpoint}: {e}"))
}

/// Flushes and shuts down the OTLP pipelines when dropped. Hold it for the
/// life of the process.
pub struct TelemetryGuard {
    pipelines: Option<Pipelines>,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(pipelines) = self.pipelines.take() {
            let _ = pipelines.logger.shutdown();
            let _ = pipelines.meter.shutdown();
            let _ = pipelines.tracer.shutdown();
        }
    }
}

/// Install the global subscriber, and the OTLP pipelines if configured.
///
/// # Errors
///
/// Fails if an exporter cannot be built or a global subscriber is already
/// installed.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard> {
    use opentelemetry::trace::TracerProvider as _;
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::layer::SubscriberExt as _;
    use tracing_subscriber::util::SubscriberInitExt as _;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let pipelines = config
        .endpoint
        .as_deref()
        .map(|endpoint| Pipelines::connect(endpoint, config.service_name.clone()))
        .transpose()?;

    let trace_layer = pipelines.as_ref().map(|p| {
        tracing_opentelemetry::layer().with_tracer(p.tracer.tracer("stu-controller"))
    });
    let log_layer = pipelines.as_ref().map(|p| {
        opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge::new(&p.logger)
    });
    if let Some(p) = &pipelines {
        opentelemetry::global::set_meter_provider(p.meter.clone());
    }

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().compact())
        .with(trace_layer)
        .with(log_layer)
        .try_init()
        .map_err(|e| Error::Config(format!("tracing subscriber: {e}")))?;

    Ok(TelemetryGuard { pipelines })
}
