use anyhow::Context;
use common::{Environment, TelemetryGuard};
use tokio::runtime::Runtime;

/// Keeps span export alive for the process lifetime.
///
/// Field order matters: the telemetry guard flushes on drop and needs the runtime.
pub struct LoggingGuard {
    _telemetry: Option<TelemetryGuard>,
    _runtime: Option<Runtime>,
}

/// Install the tracing subscriber, exporting spans over OTLP when an endpoint is set.
pub fn init_logging(
    service_name: &str,
    environment: Environment,
    otel_endpoint: Option<&str>,
) -> anyhow::Result<LoggingGuard> {
    let Some(endpoint) = otel_endpoint else {
        common::setup_logging(environment);
        return Ok(LoggingGuard {
            _telemetry: None,
            _runtime: None,
        });
    };

    // the batch exporter runs on Tokio
    let runtime = Runtime::new().context("Failed to create Tokio runtime")?;
    let guard =
        runtime.block_on(async { TelemetryGuard::init(service_name, endpoint, environment) })?;

    Ok(LoggingGuard {
        _telemetry: Some(guard),
        _runtime: Some(runtime),
    })
}
