//! # Logging
//!
//! Installs the process-wide `tracing` subscriber for the offline media
//! core and provides helpers that keep source URLs and local paths out of
//! log output.
//!
//! Events pass one [`EnvFilter`] and are then written by a single fmt
//! layer in the configured [`LogFormat`]. When the host supplies a
//! [`LoggerSink`], every event is also mirrored into it as a
//! [`LogEntry`] so it can reach `os_log`, Logcat or a log file.
//!
//! ```ignore
//! use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
//! use bridge_traits::time::LogLevel;
//!
//! init_logging(
//!     LoggingConfig::default()
//!         .with_format(LogFormat::Compact)
//!         .with_level(LogLevel::Debug),
//! )?;
//! tracing::info!(item_id = %id, "Transfer started");
//! ```
//!
//! Sink-bound field values are redacted by default: credential-like
//! fields are masked and URLs lose their query, since media URLs are
//! often pre-signed.

use crate::error::{Error, Result};
use bridge_traits::time::{LogEntry, LogLevel, LoggerSink};
use std::fmt;
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::{LookupSpan, Registry};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

/// Crates whose events follow the configured level. Everything else is
/// held at `warn`.
const WORKSPACE_TARGETS: &[&str] = &[
    "offline_media_workspace",
    "core_runtime",
    "core_library",
    "core_download",
    "core_playback",
    "core_service",
    "bridge_desktop",
];

const REDACTED: &str = "[REDACTED]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line, colored; for development
    Pretty,
    /// One JSON object per event
    Json,
    /// Single line per event
    Compact,
}

impl Default for LogFormat {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            LogFormat::Pretty
        } else {
            LogFormat::Json
        }
    }
}

#[derive(Clone)]
pub struct LoggingConfig {
    pub format: LogFormat,
    pub level: LogLevel,
    /// Full `EnvFilter` directive; replaces the per-crate default
    pub filter: Option<String>,
    pub logger_sink: Option<Arc<dyn LoggerSink>>,
    /// Redact field values before they reach the sink
    pub redact: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: LogLevel::Info,
            filter: None,
            logger_sink: None,
            redact: true,
        }
    }
}

impl LoggingConfig {
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn with_logger_sink(mut self, sink: Arc<dyn LoggerSink>) -> Self {
        self.logger_sink = Some(sink);
        self
    }

    pub fn with_redaction(mut self, redact: bool) -> Self {
        self.redact = redact;
        self
    }
}

/// Install the global subscriber.
///
/// # Errors
/// Returns [`Error::Config`] if the filter directive is invalid or a
/// global subscriber is already installed.
pub fn init_logging(config: LoggingConfig) -> Result<()> {
    let filter = build_filter(&config)?;

    let fmt_layer: Box<dyn Layer<Registry> + Send + Sync> = match config.format {
        LogFormat::Pretty => tracing_subscriber::fmt::layer().pretty().boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .boxed(),
        LogFormat::Compact => tracing_subscriber::fmt::layer().compact().boxed(),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(filter)
        .with(config.logger_sink.map(|sink| SinkLayer::new(sink, config.redact)))
        .try_init()
        .map_err(|e| Error::Config(format!("Failed to initialize logging: {}", e)))
}

fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    let directive = match &config.filter {
        Some(custom) => custom.clone(),
        None => {
            let level = level_name(config.level);
            let mut parts = vec!["warn".to_string()];
            parts.extend(WORKSPACE_TARGETS.iter().map(|t| format!("{}={}", t, level)));
            parts.join(",")
        }
    };

    EnvFilter::try_new(directive).map_err(|e| Error::Config(format!("Invalid log filter: {}", e)))
}

fn level_name(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Trace => "trace",
        LogLevel::Debug => "debug",
        LogLevel::Info => "info",
        LogLevel::Warn => "warn",
        LogLevel::Error => "error",
    }
}

fn log_level(level: &Level) -> LogLevel {
    match *level {
        Level::TRACE => LogLevel::Trace,
        Level::DEBUG => LogLevel::Debug,
        Level::INFO => LogLevel::Info,
        Level::WARN => LogLevel::Warn,
        Level::ERROR => LogLevel::Error,
    }
}

/// Mirrors events into a host [`LoggerSink`].
struct SinkLayer {
    sink: Arc<dyn LoggerSink>,
    redact: bool,
}

impl SinkLayer {
    fn new(sink: Arc<dyn LoggerSink>, redact: bool) -> Self {
        Self { sink, redact }
    }
}

impl<S> Layer<S> for SinkLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let level = log_level(metadata.level());
        if level < self.sink.min_level() {
            return;
        }

        let mut fields = EntryFields {
            message: None,
            entry: LogEntry::new(level, metadata.target(), String::new()),
            redact: self.redact,
        };
        event.record(&mut fields);

        let mut entry = fields.entry;
        entry.message = fields.message.unwrap_or_else(|| metadata.name().to_string());
        if let Some(span) = ctx.lookup_current() {
            entry = entry.with_span_id(span.name());
        }

        let sink = Arc::clone(&self.sink);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(err) = sink.log(entry).await {
                        eprintln!("LoggerSink error: {}", err);
                    }
                });
            }
            Err(_) => {
                if let Err(err) = futures::executor::block_on(sink.log(entry)) {
                    eprintln!("LoggerSink error: {}", err);
                }
            }
        }
    }
}

struct EntryFields {
    message: Option<String>,
    entry: LogEntry,
    redact: bool,
}

impl Visit for EntryFields {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
            return;
        }
        let value = if self.redact {
            redact_if_sensitive(field.name(), value)
        } else {
            value.to_string()
        };
        self.entry.fields.insert(field.name().to_string(), value);
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.record_str(field, &format!("{:?}", value));
    }
}

/// Mask credential-like fields and drop URL queries.
pub fn redact_if_sensitive(field_name: &str, value: &str) -> String {
    const SENSITIVE: &[&str] = &["token", "password", "secret", "authorization", "cookie", "signature"];

    let name = field_name.to_ascii_lowercase();
    if SENSITIVE.iter().any(|s| name.contains(s)) {
        REDACTED.to_string()
    } else if value.contains("://") {
        redact_url(value)
    } else {
        value.to_string()
    }
}

/// Drop the query string and fragment of a URL.
pub fn redact_url(url: &str) -> String {
    match url.find(['?', '#']) {
        Some(pos) => format!("{}?{}", &url[..pos], REDACTED),
        None => url.to_string(),
    }
}

/// Basename of a Unix or Windows path.
pub fn strip_path(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}
