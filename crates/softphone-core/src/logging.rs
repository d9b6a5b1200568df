//! Tracing subscriber bootstrap for hosts without their own
//!
//! Hosts that already install a `tracing` subscriber can skip this module;
//! the core only emits records. The host-facing diagnostic log callback
//! ([`crate::events::SoftphoneEventHandler::on_log`]) is separate and does not
//! depend on a subscriber being installed.

use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{ClientError, ClientResult};

/// Configuration for the logging system
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// The log level to use
    pub level: Level,
    /// Whether to enable JSON formatting
    pub json: bool,
    /// Whether to include file and line information
    pub file_info: bool,
    /// Whether to log spans
    pub log_spans: bool,
    /// Application name printed by [`log_welcome`]
    pub app_name: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: Level::INFO,
            json: false,
            file_info: false,
            log_spans: false,
            app_name: "softphone".to_string(),
        }
    }
}

impl LoggingConfig {
    pub fn new(level: Level, app_name: impl Into<String>) -> Self {
        LoggingConfig { level, app_name: app_name.into(), ..Default::default() }
    }

    pub fn with_json(mut self) -> Self {
        self.json = true;
        self
    }

    pub fn with_file_info(mut self) -> Self {
        self.file_info = true;
        self
    }

    pub fn with_spans(mut self) -> Self {
        self.log_spans = true;
        self
    }
}

/// Install a global `fmt` subscriber
///
/// `RUST_LOG` directives apply first, then the configured level. Fails with
/// [`ClientError::InvalidConfiguration`] if a global subscriber is already set.
pub fn setup_logging(config: LoggingConfig) -> ClientResult<()> {
    let filter = EnvFilter::from_default_env().add_directive(config.level.into());

    let span_events = if config.log_spans { FmtSpan::ACTIVE } else { FmtSpan::NONE };

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_span_events(span_events)
        .with_file(config.file_info)
        .with_line_number(config.file_info);

    let result = if config.json {
        subscriber.with_writer(std::io::stdout).json().try_init()
    } else {
        subscriber.try_init()
    };

    result.map_err(|e| ClientError::invalid_configuration("logging", e.to_string()))?;
    log_welcome(&config.app_name, crate::VERSION);
    Ok(())
}

/// Parse a log level from a host-supplied string
pub fn parse_log_level(level: &str) -> ClientResult<Level> {
    Level::from_str(level)
        .map_err(|_| ClientError::invalid_configuration("logging.level", format!("Invalid log level: {level}")))
}

/// Log a welcome message with version info
pub fn log_welcome(app_name: &str, version: &str) {
    tracing::info!("Starting {} v{}", app_name, version);
}
