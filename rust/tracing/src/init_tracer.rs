//! Global subscriber setup.  Log lines always go to stderr so stdout stays free for reports;
//! spans and metrics are exported over OTLP when an endpoint is configured.

use opentelemetry::trace::TracerProvider as _;
use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::TracerProvider;
use opentelemetry_sdk::{runtime, Resource};
use serde::{Deserialize, Serialize};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

use crate::filter::{directives, LogFilter};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;
type SetupError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TracingConfig {
    #[serde(default = "TracingConfig::default_service_name")]
    pub service_name: String,
    #[serde(default)]
    pub otel_endpoint: Option<String>,
    #[serde(default)]
    pub filters: Vec<LogFilter>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        TracingConfig {
            service_name: TracingConfig::default_service_name(),
            otel_endpoint: None,
            filters: vec![],
        }
    }
}

impl TracingConfig {
    fn default_service_name() -> String {
        "raftkv-load".to_string()
    }

    /// Install the global subscriber and panic hook.  An exporter that cannot be built is
    /// reported and skipped; local logging still comes up.
    pub fn init(&self) {
        let mut layers = vec![filter_layer(&self.filters), stderr_layer()];
        let mut export_failure = None;
        if let Some(endpoint) = self.otel_endpoint.as_ref() {
            match otel_layer(&self.service_name, endpoint) {
                Ok(layer) => layers.push(layer),
                Err(err) => export_failure = Some(err),
            }
        }
        install(layers);
        install_panic_hook();
        match (self.otel_endpoint.as_ref(), export_failure) {
            (Some(endpoint), Some(err)) => {
                tracing::warn!(endpoint = %endpoint, error = %err, "OTLP export disabled")
            }
            (Some(endpoint), None) => {
                tracing::info!(
                    service = %self.service_name,
                    endpoint = %endpoint,
                    "exporting spans and metrics"
                )
            }
            (None, _) => {}
        }
    }
}

/// `RUST_LOG` replaces the configured directives wholesale.
fn filter_layer(overrides: &[LogFilter]) -> BoxedLayer {
    let directives = std::env::var("RUST_LOG").unwrap_or_else(|_| directives(overrides));
    EnvFilter::new(directives).boxed()
}

fn stderr_layer() -> BoxedLayer {
    fmt::layer()
        .compact()
        .with_target(false)
        .with_writer(std::io::stderr)
        .boxed()
}

fn otel_layer(service_name: &str, endpoint: &str) -> Result<BoxedLayer, SetupError> {
    let resource = Resource::new(vec![
        KeyValue::new("service.name", service_name.to_string()),
        KeyValue::new(
            "service.pod_name",
            std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string()),
        ),
    ]);

    let span_exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()?;
    let tracer_provider = TracerProvider::builder()
        .with_batch_exporter(span_exporter, runtime::Tokio)
        .with_resource(resource.clone())
        .build();
    let tracer = tracer_provider.tracer(service_name.to_string());

    let metrics_endpoint = std::env::var("OTEL_EXPORTER_OTLP_METRICS_ENDPOINT")
        .unwrap_or_else(|_| endpoint.to_string());
    let metric_exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_endpoint(metrics_endpoint)
        .build()?;
    let meter_provider = SdkMeterProvider::builder()
        .with_reader(PeriodicReader::builder(metric_exporter, runtime::Tokio).build())
        .with_resource(resource)
        .build();
    opentelemetry::global::set_meter_provider(meter_provider);

    Ok(tracing_opentelemetry::OpenTelemetryLayer::new(tracer).boxed())
}

/// The filter layer must come first: it gates every layer stacked after it.
fn install(layers: Vec<BoxedLayer>) {
    opentelemetry::global::set_text_map_propagator(TraceContextPropagator::new());
    let Some(stack) = layers.into_iter().reduce(|a, b| a.and_then(b).boxed()) else {
        return;
    };
    let subscriber = tracing_subscriber::registry().with(stack);
    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("tracing subscriber already installed: {}", err);
    }
}

fn install_panic_hook() {
    let prev_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let payload = panic_info.payload();
        let payload = payload
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| payload.downcast_ref::<String>().map(String::as_str));
        tracing::error!(
            panic.payload = payload,
            panic.location = panic_info.location().map(|l| l.to_string()),
            panic.backtrace = tracing::field::display(std::backtrace::Backtrace::capture()),
            "panic"
        );
        prev_hook(panic_info);
    }));
}
