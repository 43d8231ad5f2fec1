//! Logging initialization.
//!
//! Logs go to stderr so `--json` output on stdout stays machine readable.

use anyhow::{Result, anyhow};
use strand_core::app::{LogFormat, LoggingConfig};
use strand_core::domain::EventRecord;
use strand_core::ports::EventSink;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// `RUST_LOG` wins over both the configured level and `-v`.
pub fn init_logging(config: &LoggingConfig, verbose: u8) -> Result<()> {
    let level = match verbose {
        0 => config.level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let fmt_layer = match config.format {
        LogFormat::Pretty => fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_writer(std::io::stderr)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to install tracing subscriber: {e}"))?;

    tracing::debug!(target: "strand::init", level, format = ?config.format, "logging initialized");
    Ok(())
}

/// Forwards run events to `tracing` under the `strand::events` target.
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, record: &EventRecord) {
        tracing::debug!(target: "strand::events", seq = record.seq, event = ?record.event);
    }
}
