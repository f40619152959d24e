// SPDX-License-Identifier: Apache-2.0

//! The top-level error type for the supervisor process: every module-scoped
//! error that can abort startup or the accept loop converges here. `main`
//! matches on this, logs it, and exits non-zero; it is never unwound
//! through a panic in normal operation.

use std::path::PathBuf;

/// Everything that can end the supervisor outside of a terminal signal.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// The host's microarchitecture has no known allow-list.
    #[error(transparent)]
    Bootstrap(#[from] hwreg_topology::UnsupportedProcessor),
    /// Binding the rendezvous socket failed, most often because a stale
    /// socket file from an earlier run is still present.
    #[error("failed to bind rendezvous socket at {path}: {source}")]
    Bind {
        /// Path the supervisor tried to bind.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// `chmod` on the freshly bound socket failed.
    #[error("failed to set rendezvous socket permissions: {0}")]
    Permissions(#[source] std::io::Error),
    /// A `nix` system call used for signal handling, forking, or reaping
    /// failed.
    #[error("system call failed: {0}")]
    Nix(#[from] nix::errno::Errno),
}
