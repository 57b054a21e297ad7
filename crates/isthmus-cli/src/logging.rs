//! Log output for the CLI

use std::io::IsTerminal;
use tracing_subscriber::{fmt, EnvFilter};

/// Install a stderr subscriber filtered by `filter`.
///
/// An unparsable filter falls back to the default level with a warning.
pub fn init(filter: &str) {
    let env_filter = EnvFilter::try_new(filter).unwrap_or_else(|err| {
        eprintln!("warning: invalid log filter '{}': {}", filter, err);
        EnvFilter::new(isthmus_config::loader::DEFAULT_LOG_LEVEL)
    });
    let use_ansi = std::env::var_os("NO_COLOR").is_none() && std::io::stderr().is_terminal();

    let subscriber = fmt::fmt()
        .with_env_filter(env_filter)
        .with_ansi(use_ansi)
        .with_writer(std::io::stderr)
        .with_target(true)
        .compact()
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}
