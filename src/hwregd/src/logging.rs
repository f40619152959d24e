// SPDX-License-Identifier: Apache-2.0

//! Thin wrapper over `tracing`/`tracing-subscriber` so the rest of the
//! broker never touches subscriber setup directly, and every log line a
//! connection produces carries its connection id without threading one
//! through every function signature.

use tracing::Span;
use tracing_subscriber::EnvFilter;

/// Installs the global `tracing_subscriber` registry. Call exactly once,
/// from the supervisor, before anything else logs.
///
/// `RUST_LOG`, when set, takes precedence over `verbosity`; this matches
/// the convention of every other `tracing`-based crate in this lineage.
/// Absent `RUST_LOG`, `verbosity` selects a base level: `0` = warn, `1` =
/// info, `2+` = debug.
pub fn init(verbosity: u8) {
    let default_level = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// A span identifying one connection's worth of log output; the service
/// process enters this for the connection's entire lifetime.
#[must_use]
pub fn connection_span(connection_id: &str) -> Span {
    tracing::info_span!("connection", id = connection_id)
}
