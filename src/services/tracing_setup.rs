//! Tracing subscriber setup
//!
//! The shell shares its terminal with the jobs it runs, so logs only ever go
//! to a file.

use std::fs::File;
use std::io;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the global tracing subscriber, logging to `log_file_path`.
pub fn init_global(log_file_path: &Path) -> io::Result<()> {
    let log_file = File::create(log_file_path)?;
    build_subscriber(log_file)
        .try_init()
        .map_err(|e| io::Error::other(e.to_string()))
}

/// Build a subscriber with file logging.
///
/// Filtering comes from `RUST_LOG`, with DEBUG as the floor for anything
/// it does not mention.
pub fn build_subscriber(log_file: File) -> impl tracing::Subscriber + Send + Sync {
    let env_filter = EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into());

    let fmt_layer = fmt::layer()
        .with_writer(Arc::new(log_file))
        .with_ansi(false);

    tracing_subscriber::registry().with(fmt_layer).with(env_filter)
}
