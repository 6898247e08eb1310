//! Utilities for logging.

use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::SubscriberBuilder;

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    HumanReadable,
    Json,
}

/// Install a global subscriber writing to stderr.
///
/// `RUST_LOG` takes precedence over `default_level` when set. Calling this
/// more than once is a no-op.
pub fn configure_global_logger(default_level: Level, format: LogFormat) {
    let filter = env_filter(default_level);
    let builder = SubscriberBuilder::default()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let _ = match format {
        LogFormat::HumanReadable => builder.with_target(false).try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}

/// Install a subscriber that writes through the test harness so output is
/// captured per test.
pub fn init_test() {
    let _ = SubscriberBuilder::default()
        .with_env_filter(env_filter(Level::DEBUG))
        .with_test_writer()
        .try_init();
}

fn env_filter(default_level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.as_str().to_ascii_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configure_twice_is_noop() {
        configure_global_logger(Level::INFO, LogFormat::Json);
        configure_global_logger(Level::DEBUG, LogFormat::HumanReadable);
        init_test();
        tracing::info!("logger configured");
    }

    #[test]
    fn default_format_is_human_readable() {
        assert_eq!(LogFormat::HumanReadable, LogFormat::default());
    }
}
