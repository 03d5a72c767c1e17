use crate::{
    Environment,
    logging::{console_layer, env_filter},
};
use opentelemetry::{KeyValue, global, trace::TracerProvider};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    Resource,
    propagation::TraceContextPropagator,
    trace::{Sampler, SdkTracerProvider},
};
use std::env;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Fraction of root traces kept, from `OTEL_TRACES_SAMPLER_ARG`.
///
/// Every frame opens a span, so long runs usually want well under 1.0.
pub fn sampling_ratio_from_env() -> f64 {
    env::var("OTEL_TRACES_SAMPLER_ARG")
        .ok()
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|r| (0.0..=1.0).contains(r))
        .unwrap_or(1.0)
}

/// OTLP span export plus console logging. Flushes pending spans on drop.
///
/// The batch exporter runs on Tokio: create the guard inside a runtime that
/// outlives it.
///
/// ```ignore
/// let rt = tokio::runtime::Runtime::new()?;
/// let _telemetry = rt.block_on(async {
///     TelemetryGuard::init("infer", "http://localhost:4317", Environment::Production)
/// })?;
/// ```
pub struct TelemetryGuard {
    tracer_provider: SdkTracerProvider,
}

impl TelemetryGuard {
    pub fn init(
        service_name: &str,
        endpoint: &str,
        environment: Environment,
    ) -> anyhow::Result<Self> {
        global::set_text_map_propagator(TraceContextPropagator::new());

        let resource = Resource::builder()
            .with_attributes([
                KeyValue::new(
                    opentelemetry_semantic_conventions::attribute::SERVICE_NAME,
                    service_name.to_string(),
                ),
                KeyValue::new("deployment.environment.name", environment.as_str()),
            ])
            .build();

        let span_exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(endpoint)
            .build()?;

        let ratio = sampling_ratio_from_env();
        let tracer_provider = SdkTracerProvider::builder()
            .with_resource(resource)
            .with_sampler(Sampler::ParentBased(Box::new(Sampler::TraceIdRatioBased(
                ratio,
            ))))
            .with_batch_exporter(span_exporter)
            .build();

        global::set_tracer_provider(tracer_provider.clone());
        let tracer = tracer_provider.tracer(service_name.to_string());

        tracing_subscriber::registry()
            .with(env_filter())
            .with(tracing_opentelemetry::layer().with_tracer(tracer))
            .with(console_layer(environment))
            .init();

        tracing::info!(endpoint, sampling_ratio = ratio, "Exporting spans over OTLP");
        Ok(Self { tracer_provider })
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Err(e) = self.tracer_provider.shutdown() {
            eprintln!("Failed to flush spans: {e:?}");
        }
    }
}

/// Enter an info-level span for the rest of the scope.
#[macro_export]
macro_rules! span {
    ($name:literal) => {
        tracing::info_span!($name).entered()
    };
}
