//! Tracing pipeline: level filter, rotating file sink and optional console mirror

use logvault_core::ConfigModel;
use tracing::Subscriber;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{LogError, Result};
use crate::writer::LogWriter;

/// Owns the file sink of the installed pipeline
pub struct LoggingHandle {
    writer: LogWriter,
}

impl LoggingHandle {
    pub fn writer(&self) -> &LogWriter {
        &self.writer
    }

    /// Flush, fsync and close the active file
    pub fn shutdown(self) -> Result<()> {
        self.writer.close()
    }
}

/// Build the subscriber without installing it.
///
/// `RUST_LOG` overrides `level` when set.
pub fn build_subscriber(
    level: &str,
    console: bool,
    writer: &LogWriter,
) -> Result<impl Subscriber + Send + Sync + 'static> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level)
            .map_err(|e| LogError::init(format!("invalid level '{}': {}", level, e)))?,
    };

    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_target(true)
        .log_internal_errors(true)
        .with_writer(writer.clone());

    let console_layer = console.then(|| {
        fmt::layer()
            .with_ansi(atty::is(atty::Stream::Stdout))
            .with_target(true)
            .with_writer(std::io::stdout)
    });

    Ok(tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer))
}

/// Open the active file and install the pipeline as the global default
pub fn init(config: &ConfigModel) -> Result<LoggingHandle> {
    let writer = LogWriter::open(config)?;
    build_subscriber(&config.level, config.console, &writer)?
        .try_init()
        .map_err(|e| LogError::init(e.to_string()))?;
    Ok(LoggingHandle { writer })
}
