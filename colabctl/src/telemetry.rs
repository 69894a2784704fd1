//! Tracing setup: console output plus optional OpenTelemetry export.
//!
//! Console logging through the `fmt` layer is always on and filtered by `RUST_LOG`
//! (default `info`). Setting `enable_otel_export: true` in the config additionally
//! ships spans over OTLP/HTTP. The exporter is configured from the standard
//! environment variables:
//!
//! - `OTEL_EXPORTER_OTLP_ENDPOINT` (default `http://localhost:4318`)
//! - `OTEL_EXPORTER_OTLP_PROTOCOL`: `http/protobuf` (default) or `http/json`
//! - `OTEL_EXPORTER_OTLP_HEADERS`: comma separated `key=value` pairs, `%20` decodes to a space
//! - `OTEL_SERVICE_NAME` (default `colabctl`)
//!
//! If the exporter cannot be built the service still starts with console logging only.

use std::collections::HashMap;
use std::sync::OnceLock;

use opentelemetry::KeyValue;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::{Protocol, WithExportConfig, WithHttpConfig};
use opentelemetry_sdk::trace::{SdkTracerProvider, Tracer};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const DEFAULT_SERVICE_NAME: &str = "colabctl";
const DEFAULT_OTLP_ENDPOINT: &str = "http://localhost:4318";

/// Kept so pending spans can be flushed on shutdown; the tracing layer only holds a tracer.
static TRACER_PROVIDER: OnceLock<SdkTracerProvider> = OnceLock::new();

/// Install the global tracing subscriber.
pub fn init_telemetry(enable_otel_export: bool) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (tracer, otlp_error) = if enable_otel_export {
        match create_otlp_tracer() {
            Ok(tracer) => (Some(tracer), None),
            Err(e) => (None, Some(e)),
        }
    } else {
        (None, None)
    };
    let otel_layer = tracer.map(|tracer| tracing_opentelemetry::layer().with_tracer(tracer));
    let exporting = otel_layer.is_some();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(otel_layer)
        .try_init()?;

    match otlp_error {
        Some(e) => warn!("OTLP export requested but unavailable, logging to console only: {e:#}"),
        None => info!(otlp_export = exporting, "Telemetry initialized"),
    }
    Ok(())
}

fn create_otlp_tracer() -> anyhow::Result<Tracer> {
    let service_name = std::env::var("OTEL_SERVICE_NAME").unwrap_or_else(|_| DEFAULT_SERVICE_NAME.to_string());
    let endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").unwrap_or_else(|_| DEFAULT_OTLP_ENDPOINT.to_string());
    let headers = std::env::var("OTEL_EXPORTER_OTLP_HEADERS")
        .map(|raw| parse_otlp_headers(&raw))
        .unwrap_or_default();
    let protocol = parse_protocol(std::env::var("OTEL_EXPORTER_OTLP_PROTOCOL").ok().as_deref());

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(&endpoint)
        .with_protocol(protocol)
        .with_headers(headers)
        .build()?;

    let provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(
            opentelemetry_sdk::Resource::builder()
                .with_attribute(KeyValue::new("service.name", service_name.clone()))
                .build(),
        )
        .build();

    let tracer = provider.tracer(service_name);
    let _ = TRACER_PROVIDER.set(provider);
    Ok(tracer)
}

/// Parse `OTEL_EXPORTER_OTLP_HEADERS`. Malformed pairs are skipped.
fn parse_otlp_headers(raw: &str) -> HashMap<String, String> {
    raw.replace("%20", " ")
        .split(',')
        .filter_map(|pair| pair.split_once('='))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .filter(|(key, _)| !key.is_empty())
        .collect()
}

fn parse_protocol(raw: Option<&str>) -> Protocol {
    match raw {
        Some("http/json") => Protocol::HttpJson,
        _ => Protocol::HttpBinary,
    }
}

/// Flush and stop the OTLP exporter, if one was started.
pub fn shutdown_telemetry() {
    if let Some(provider) = TRACER_PROVIDER.get()
        && let Err(e) = provider.shutdown()
    {
        tracing::error!("Failed to shutdown tracer provider: {}", e);
    }
}
