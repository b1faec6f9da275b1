use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::commands::Verbosity;

/// Default filter for a verbosity level, `RUST_LOG` takes precedence.
pub(crate) fn log_filter(verbosity: Verbosity) -> &'static str {
    match verbosity {
        // Show only errors
        Verbosity::Quiet => "off,shoppo=error",
        // Show warnings, e.g. failed fetches
        Verbosity::Verbose(0) => "off,shoppo=warn,shoppo_sdk=warn,shoppo_catalog=warn",
        // Show our own info logs
        Verbosity::Verbose(1) => "off,shoppo=info,shoppo_sdk=info,shoppo_catalog=info",
        // Also show debug from our libraries
        Verbosity::Verbose(2) => "off,shoppo=debug,shoppo_sdk=debug,shoppo_catalog=debug",
        Verbosity::Verbose(3) => "off,shoppo=trace,shoppo_sdk=trace,shoppo_catalog=trace",
        // Also show debug from dependencies
        Verbosity::Verbose(4) => "debug,shoppo=trace,shoppo_sdk=trace,shoppo_catalog=trace",
        Verbosity::Verbose(_) => "trace",
    }
}

/// Log to stderr, so results written to stdout can be piped.
pub(crate) fn init_logger(verbosity: Verbosity) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_filter(verbosity)))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(filter);

    // a subscriber may already be installed, e.g. in tests
    let _ = tracing_subscriber::registry().with(stderr_layer).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_verbosity_yields_a_valid_filter() {
        for verbosity in [
            Verbosity::Quiet,
            Verbosity::Verbose(0),
            Verbosity::Verbose(1),
            Verbosity::Verbose(2),
            Verbosity::Verbose(3),
            Verbosity::Verbose(4),
            Verbosity::Verbose(9),
        ] {
            assert!(EnvFilter::try_new(log_filter(verbosity)).is_ok());
        }
    }
}
