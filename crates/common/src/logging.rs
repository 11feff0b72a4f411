//! Provides utilities to initialize logging and OpenTelemetry tracing for swapline services.
use std::env;

use opentelemetry::{trace::TracerProvider, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::Resource;
use tracing::*;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

/// Environment variable holding the OTLP collector endpoint.
pub const OTLP_URL_ENVVAR: &str = "SWAPLINE_OTLP_URL";

/// Environment variable name for the service label, which is appended to the whoami string.
pub const SVC_LABEL_ENVVAR: &str = "SWAPLINE_SVC_LABEL";

/// Environment variable that enables file names in log lines when set to `1`.
pub const LOG_FILE_ENVVAR: &str = "SWAPLINE_LOG_FILE";

/// Environment variable that enables line numbers in log lines when set to `1`.
pub const LOG_LINE_NUM_ENVVAR: &str = "SWAPLINE_LOG_LINE_NUM";

/// Configuration for the logger.
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    /// Identifies the service in logs and in exported traces.
    whoami: String,

    /// The OpenTelemetry URL for exporting traces.
    otel_url: Option<String>,
}

impl LoggerConfig {
    /// Creates a new instance with whoami set and no trace export.
    pub const fn new(whoami: String) -> Self {
        Self {
            whoami,
            otel_url: None,
        }
    }

    /// Creates a new instance whose whoami string is derived from `s` and the service label.
    pub fn with_base_name(s: &str) -> Self {
        Self::new(get_whoami_string(s))
    }

    /// Creates a new instance from `s` and picks up the OTLP endpoint from the environment, if
    /// any.
    pub fn from_env(s: &str) -> Self {
        let mut config = Self::with_base_name(s);
        if let Some(url) = get_otlp_url_from_env() {
            config.set_otlp_url(url);
        }
        config
    }

    /// Sets the opentelemetry URL to the provided string.
    pub fn set_otlp_url(&mut self, url: String) {
        self.otel_url = Some(url);
    }

    /// Returns the whoami string.
    pub fn whoami(&self) -> &str {
        &self.whoami
    }
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self::with_base_name("(swapline)")
    }
}

/// Initializes the logging subsystem with the provided config.
///
/// Calling this more than once is harmless: only the first subscriber is installed, which keeps
/// tests that each call `init` from panicking.
pub fn init(config: LoggerConfig) {
    let filt = tracing_subscriber::EnvFilter::from_default_env();

    let log_file = env::var(LOG_FILE_ENVVAR).is_ok_and(|v| v == "1");
    let log_line_num = env::var(LOG_LINE_NUM_ENVVAR).is_ok_and(|v| v == "1");

    // Stdout logging.
    let stdout_sub = tracing_subscriber::fmt::layer()
        .compact()
        .event_format(
            tracing_subscriber::fmt::format()
                .with_file(log_file)
                .with_line_number(log_line_num),
        )
        .with_filter(filt);

    // OpenTelemetry output.
    let installed = if let Some(otel_url) = &config.otel_url {
        let resource = Resource::builder()
            .with_attribute(KeyValue::new("service.name", config.whoami.clone()))
            .build();

        let exporter = match opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(otel_url)
            .build()
        {
            Ok(exporter) => exporter,
            Err(e) => {
                // Fall back to stdout only.
                let installed = tracing_subscriber::registry()
                    .with(stdout_sub)
                    .try_init()
                    .is_ok();
                warn!(%e, %otel_url, "could not build OTLP exporter, exporting to stdout only");
                if installed {
                    info!(whoami = %config.whoami, "logging started");
                }
                return;
            }
        };

        let tp = opentelemetry_sdk::trace::SdkTracerProvider::builder()
            .with_resource(resource)
            .with_batch_exporter(exporter)
            .build();

        let tracer = tp.tracer("swapline");

        let otel_sub = tracing_opentelemetry::layer().with_tracer(tracer);

        tracing_subscriber::registry()
            .with(stdout_sub)
            .with(otel_sub)
            .try_init()
            .is_ok()
    } else {
        tracing_subscriber::registry()
            .with(stdout_sub)
            .try_init()
            .is_ok()
    };

    if installed {
        info!(whoami = %config.whoami, "logging started");
    }
}

/// Gets the OTLP URL from the standard envvar.
pub fn get_otlp_url_from_env() -> Option<String> {
    env::var(OTLP_URL_ENVVAR).ok()
}

/// Gets the service label from the standard envvar, which should be included in the whoami
/// string.
pub fn get_service_label_from_env() -> Option<String> {
    env::var(SVC_LABEL_ENVVAR).ok()
}

/// Computes a standard whoami string.
pub fn get_whoami_string(base: &str) -> String {
    match get_service_label_from_env() {
        Some(label) => format!("{base}%{label}"),
        None => base.to_owned(),
    }
}
