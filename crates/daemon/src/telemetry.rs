//! Telemetry setup for OpenTelemetry integration
//!
//! # Environment Variables
//!
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (e.g., http://localhost:4317)
//! - `OTEL_SERVICE_NAME`: Service name (default: conduit-bridge)
//!
//! # Example
//!
//! ```text
//! OTEL_EXPORTER_OTLP_ENDPOINT=http://localhost:4317 \
//! OTEL_SERVICE_NAME=conduit-dev \
//!     ./conduit-bridge
//! ```

use crate::logging::BoxedLayer;
use anyhow::Result;

/// OpenTelemetry tracing layer, if an endpoint is configured
pub fn layer() -> Result<Option<BoxedLayer>> {
    // Check if OpenTelemetry is configured
    let Ok(endpoint) = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT") else {
        return Ok(None);
    };

    #[cfg(feature = "telemetry")]
    let layer = layer_impl(&endpoint).map(Some);

    #[cfg(not(feature = "telemetry"))]
    let layer = Err(anyhow::anyhow!(
        "OTLP endpoint {} set but feature 'telemetry' not enabled (rebuild with --features telemetry)",
        endpoint
    ));

    layer
}

#[cfg(feature = "telemetry")]
fn layer_impl(endpoint: &str) -> Result<BoxedLayer> {
    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry::KeyValue;
    use opentelemetry_otlp::{SpanExporter, WithExportConfig};
    use opentelemetry_sdk::trace::TracerProvider;
    use opentelemetry_sdk::Resource;
    use tracing_subscriber::Layer;

    let service_name =
        std::env::var("OTEL_SERVICE_NAME").unwrap_or_else(|_| "conduit-bridge".to_string());

    let exporter = SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()?;
    let provider = TracerProvider::builder()
        .with_batch_exporter(exporter, opentelemetry_sdk::runtime::Tokio)
        .with_resource(Resource::new(vec![KeyValue::new(
            "service.name",
            service_name.clone(),
        )]))
        .build();
    let tracer = provider.tracer(service_name);
    opentelemetry::global::set_tracer_provider(provider);

    Ok(tracing_opentelemetry::layer().with_tracer(tracer).boxed())
}
