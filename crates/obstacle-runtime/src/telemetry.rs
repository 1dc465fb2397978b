//! Logging and trace export setup.
//!
//! Call [`init_tracing`] once at process startup and keep the returned guard
//! alive until exit.
//!
//! # Environment variables
//!
//! | Variable | Effect |
//! |---|---|
//! | `RUST_LOG` | Log filter (default `"info"`). |
//! | `OBSTACLE_LOG_FORMAT=json` | Newline-delimited JSON logs instead of the compact console format. |
//! | `OTEL_EXPORTER_OTLP_ENDPOINT` | OTLP/HTTP collector base URL.  When set, spans are exported as well as logged. |
//!
//! # Example
//!
//! ```rust,no_run
//! let _guard = obstacle_runtime::telemetry::init_tracing("obstacle-visualizer");
//! ```

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    Resource,
    trace::{SdkTracer, SdkTracerProvider},
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Console log layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl LogFormat {
    /// Read `OBSTACLE_LOG_FORMAT`; anything other than `json` is compact.
    pub fn from_env() -> Self {
        Self::parse(std::env::var("OBSTACLE_LOG_FORMAT").ok().as_deref())
    }

    fn parse(value: Option<&str>) -> Self {
        match value {
            Some(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Compact,
        }
    }
}

/// Install the global subscriber.
///
/// If a subscriber is already installed (tests, embedding applications) the
/// call leaves it in place.
pub fn init_tracing(service_name: &str) -> TracerProviderGuard {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let provider = build_provider(service_name);

    let otel = provider
        .as_ref()
        .map(|p| tracing_opentelemetry::layer().with_tracer(service_tracer(p, service_name)));
    let (json, compact) = match LogFormat::from_env() {
        LogFormat::Json => (Some(fmt::layer().json()), None),
        LogFormat::Compact => (None, Some(fmt::layer().compact())),
    };

    if let Err(e) = tracing_subscriber::registry()
        .with(filter)
        .with(otel)
        .with(json)
        .with(compact)
        .try_init()
    {
        eprintln!("[obstacle-visualizer] tracing already initialised: {e}");
    }

    TracerProviderGuard(provider)
}

/// Flushes and shuts down the span exporter when dropped.
pub struct TracerProviderGuard(Option<SdkTracerProvider>);

impl Drop for TracerProviderGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.0.take() {
            if let Err(e) = provider.shutdown() {
                eprintln!("[obstacle-visualizer] OpenTelemetry shutdown error: {e}");
            }
        }
    }
}

/// Spans are attributed to the same service name as the resource.
fn service_tracer(provider: &SdkTracerProvider, service_name: &str) -> SdkTracer {
    provider.tracer(service_name.to_string())
}

/// `None` unless `OTEL_EXPORTER_OTLP_ENDPOINT` is set and the exporter
/// builds.
fn build_provider(service_name: &str) -> Option<SdkTracerProvider> {
    let endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok()?;

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| eprintln!("[obstacle-visualizer] OTLP exporter init failed: {e}"))
        .ok()?;

    // The simple exporter needs no running Tokio runtime, and the CLI builds
    // its runtime only after tracing is up.
    Some(
        SdkTracerProvider::builder()
            .with_resource(
                Resource::builder()
                    .with_service_name(service_name.to_string())
                    .build(),
            )
            .with_simple_exporter(exporter)
            .build(),
    )
}
