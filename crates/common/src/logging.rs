use crate::config::Environment;
use tracing::Subscriber;
use tracing_subscriber::{
    EnvFilter, Layer, layer::SubscriberExt, registry::LookupSpan, util::SubscriberInitExt,
};

/// Filter from `RUST_LOG`, falling back to `info`.
pub(crate) fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// JSON lines in production, pretty ANSI output in development.
pub(crate) fn fmt_layer<S>(environment: Environment) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    match environment {
        Environment::Production => tracing_subscriber::fmt::layer()
            .json()
            .with_level(true)
            .boxed(),
        Environment::Development => tracing_subscriber::fmt::layer()
            .pretty()
            .with_ansi(true)
            .boxed(),
    }
}

/// Install the global tracing subscriber without an exporter.
///
/// The OpenTelemetry layer is still registered so spans pick up a global
/// tracer provider if one was set elsewhere. Call at most once per process.
pub fn setup_logging(environment: Environment) {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_opentelemetry::layer())
        .with(fmt_layer(environment))
        .init();
}
