use std::sync::Once;
use tracing_subscriber::EnvFilter;

/// Environment variable holding a `tracing` filter directive.
pub const LOG_ENV: &str = "EXPANDO_LOG";

static INIT: Once = Once::new();

/// Install the global subscriber. `EXPANDO_LOG` wins; otherwise `info`,
/// or `debug` when `verbose` is set.
pub fn init_logging(verbose: bool) {
    INIT.call_once(|| {
        let default = if verbose { "debug" } else { "info" };
        let filter =
            EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));

        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(verbose)
            .with_writer(std::io::stderr)
            .init();
    });
}
