//! Logging setup for the `brno-ci` binary.
//!
//! Logs go to stderr so that step output and `--dry-run` recipes on stdout
//! stay machine-readable.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Install the global subscriber; `RUST_LOG` overrides `level`.
///
/// Returns `false` when a subscriber was already installed.
pub fn init_tracing(json: bool, level: Level) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    let output = fmt::layer().with_target(false).with_writer(std::io::stderr);
    let output = if json {
        output.json().boxed()
    } else {
        output.boxed()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(output)
        .try_init()
        .is_ok()
}
