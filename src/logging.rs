//! Tracing subscriber setup shared by the binaries.

use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Install the global subscriber, writing to stdout.
///
/// `RUST_LOG` wins over the configured level. Calling this twice is harmless:
/// the second call leaves the first subscriber in place.
pub fn init(config: &LoggingConfig) {
    install(config, BoxMakeWriter::new(std::io::stdout));
}

/// Install the global subscriber, writing to stderr.
///
/// For tools whose stdout carries their output.
pub fn init_stderr(config: &LoggingConfig) {
    install(config, BoxMakeWriter::new(std::io::stderr));
}

fn install(config: &LoggingConfig, writer: BoxMakeWriter) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let result = if config.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(writer)
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(writer)
            .try_init()
    };

    if result.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice() {
        let config = LoggingConfig::default();
        init(&config);
        init(&LoggingConfig {
            json: true,
            ..config.clone()
        });
        init_stderr(&config);
    }
}
