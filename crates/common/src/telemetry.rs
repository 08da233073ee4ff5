use opentelemetry::global;
use opentelemetry_sdk::propagation::TraceContextPropagator;
use std::str::FromStr;
use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LogConfig;

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("unknown log level: {0}")]
    UnknownLevel(String),

    #[error("failed to install Jaeger pipeline: {0}")]
    Jaeger(#[from] opentelemetry::trace::TraceError),

    #[error("failed to install tracing subscriber: {0}")]
    Init(String),
}

/// Telemetry configuration
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub log_level: String,
    pub json: bool,
    pub jaeger_endpoint: Option<String>,
    pub enable_jaeger: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "order-persistor".to_string(),
            log_level: "info".to_string(),
            json: true,
            jaeger_endpoint: None,
            enable_jaeger: false,
        }
    }
}

impl From<&LogConfig> for TelemetryConfig {
    fn from(log: &LogConfig) -> Self {
        Self {
            service_name: log.service_name.clone(),
            log_level: log.level.clone(),
            json: log.json,
            jaeger_endpoint: log.jaeger_endpoint.clone(),
            enable_jaeger: log.enable_jaeger,
        }
    }
}

/// Only the plain level names are accepted in configuration; `RUST_LOG` can
/// still carry full directives.
pub fn parse_level(level: &str) -> Result<tracing::Level, TelemetryError> {
    match level.to_ascii_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => tracing::Level::from_str(level)
            .map_err(|_| TelemetryError::UnknownLevel(level.to_string())),
        _ => Err(TelemetryError::UnknownLevel(level.to_string())),
    }
}

/// Initialize tracing/logging for the application with optional Jaeger support
pub fn init_telemetry(config: TelemetryConfig) -> Result<(), TelemetryError> {
    let level = parse_level(&config.log_level)?;

    global::set_text_map_propagator(TraceContextPropagator::new());

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_ascii_lowercase()));

    let json_layer = config.json.then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_level(true)
            .with_thread_ids(true)
            .json()
    });
    let plain_layer = (!config.json).then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_level(true)
    });

    let telemetry_layer = if config.enable_jaeger {
        let tracer = opentelemetry_jaeger::new_agent_pipeline()
            .with_service_name(&config.service_name)
            .with_endpoint(
                config
                    .jaeger_endpoint
                    .clone()
                    .unwrap_or_else(|| "localhost:6831".to_string()),
            )
            .install_batch(opentelemetry_sdk::runtime::Tokio)?;
        Some(tracing_opentelemetry::layer().with_tracer(tracer))
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(plain_layer)
        .with(telemetry_layer)
        .try_init()
        .map_err(|e| TelemetryError::Init(e.to_string()))?;

    tracing::info!(
        service = %config.service_name,
        jaeger = config.enable_jaeger,
        "Telemetry initialized"
    );

    Ok(())
}

/// Initialize plain logging at the given level, ignoring a subscriber that is
/// already installed (tests and tools).
pub fn init_basic_telemetry(log_level: &str) {
    let config = TelemetryConfig {
        log_level: log_level.to_string(),
        json: false,
        ..TelemetryConfig::default()
    };

    let _ = init_telemetry(config);
}

/// Shutdown telemetry gracefully
pub fn shutdown_telemetry() {
    global::shutdown_tracer_provider();
}
