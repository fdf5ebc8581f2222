//! Process logging. Everything goes to stderr so streamed replies on stdout
//! stay clean.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_DIRECTIVE: &str = "warn";
const VERBOSE_DIRECTIVE: &str = "debug";

/// `CHATCTL_LOG` wins over `--verbose`.
pub fn filter_directive(env_filter: Option<&str>, verbose: bool) -> String {
    match env_filter {
        Some(directive) => directive.to_string(),
        None if verbose => VERBOSE_DIRECTIVE.to_string(),
        None => DEFAULT_DIRECTIVE.to_string(),
    }
}

/// Install the global subscriber. Later calls are no-ops.
pub fn init(env_filter: Option<&str>, verbose: bool) {
    let directive = filter_directive(env_filter, verbose);
    let filter =
        EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .try_init()
        .ok();
}
