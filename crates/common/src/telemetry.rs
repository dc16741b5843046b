use crate::prelude::Result;
use tracing::subscriber::set_global_default;
use tracing::{Level, Subscriber};
use tracing_log::LogTracer;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{EnvFilter, fmt::MakeWriter};

/// Composes the subscriber used for deployment progress output.
///
/// Long-running waits are wrapped in spans, so span `NEW` and `CLOSE` events
/// mark the start and the end of every wait, while the events emitted inside
/// show the observed progress.
///
/// # Arguments
///
/// * `max_level`: Default maximum level of logs if the `RUST_LOG`
///   environment variable is not set.
/// * `sink`: Destination where logs will be written to.
///
pub fn get_subscriber<Sink>(max_level: Level, sink: Sink) -> impl Subscriber + Sync + Send
where
    Sink: for<'a> MakeWriter<'a> + Sync + Send + 'static,
{
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_error| EnvFilter::new(max_level.as_str()));

    // Compact logs for the operator in debug builds, JSON for the host
    // framework in release builds.
    #[cfg(debug_assertions)]
    let subscriber_builder = tracing_subscriber::fmt().compact();
    #[cfg(not(debug_assertions))]
    let subscriber_builder = tracing_subscriber::fmt().json().with_current_span(true);

    subscriber_builder
        .with_env_filter(env_filter)
        .with_target(true)
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
        .with_writer(sink)
        .finish()
}

/// Registers a subscriber as the global default.
///
/// # Warning
///
/// This function should only be called **once** in the process lifetime.
///
pub fn init_subscriber(subscriber: impl Subscriber + Sync + Send) -> Result<()> {
    LogTracer::init()?;

    set_global_default(subscriber)?;
    Ok(())
}

/// Maps the number of `-v` flags to a log level.
///
pub fn level_from_verbosity(verbosity: u8) -> Level {
    match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    }
}
