//! Logging setup
//!
//! Console output is JSON or pretty (`CONDUIT_LOG_FORMAT`), filtered by
//! `RUST_LOG` (default `conduit=info`). With a log directory configured, a
//! daily rolling JSON file is written as well.

use anyhow::{Context, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::Layered;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

const DEFAULT_FILTER: &str = "conduit=info";
const LOG_FILE_PREFIX: &str = "conduit-bridge.log";

/// Subscriber every output layer is stacked on
pub type LogSubscriber = Layered<EnvFilter, Registry>;
pub type BoxedLayer = Box<dyn Layer<LogSubscriber> + Send + Sync>;

/// Install the global subscriber
///
/// The returned guard flushes the file writer and must live as long as the
/// process.
pub fn init(log_format: &str, log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(DEFAULT_FILTER))
        .context("Failed to create env filter")?;

    let mut layers: Vec<BoxedLayer> = Vec::new();
    match log_format {
        // Production: JSON structured logging
        "json" => layers.push(fmt::layer().json().boxed()),
        // Development: Pretty formatting with colors
        _ => layers.push(fmt::layer().pretty().boxed()),
    }

    let guard = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            layers.push(
                fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_ansi(false)
                    .boxed(),
            );
            Some(guard)
        }
        None => None,
    };

    // Exporter failures are reported once the subscriber is up
    let telemetry = crate::telemetry::layer();
    let telemetry_error = match telemetry {
        Ok(Some(layer)) => {
            layers.push(layer);
            None
        }
        Ok(None) => None,
        Err(e) => Some(e),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(layers)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    if let Some(e) = telemetry_error {
        tracing::warn!(error = ?e, "Failed to initialize OpenTelemetry (continuing without it)");
    }
    if let Some(dir) = log_dir {
        tracing::info!(log_dir = %dir.display(), "File logging enabled");
    }
    Ok(guard)
}
