//! Stderr logging for the command line tool
//!
//! The library logs through the `log` facade; [`init`] forwards those records
//! into a `tracing` fmt subscriber. `RUST_LOG` overrides the default level.

use thiserror::Error;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S,%3f";

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to forward log records: {0}")]
    Bridge(#[from] log::SetLoggerError),

    #[error("failed to install subscriber: {0}")]
    Subscriber(#[from] tracing::subscriber::SetGlobalDefaultError),
}

fn subscriber<W>(filter: EnvFilter, writer: W) -> impl tracing::Subscriber + Send + Sync + 'static
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_timer(ChronoLocal::new(TIME_FORMAT.to_string()))
        .with_ansi(false)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .finish()
}

/// Install the global subscriber; `verbose` makes debug the default level
pub fn init(verbose: bool) -> Result<(), LoggingError> {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_log::LogTracer::init()?;
    tracing::subscriber::set_global_default(subscriber(filter, std::io::stderr))?;
    Ok(())
}
