// SPDX-License-Identifier: Apache-2.0

//! Command-line surface: a rendezvous socket path, a lock-file path, and a
//! verbosity flag. Nothing else is configurable (see the crate's top-level
//! docs for why).

use std::path::PathBuf;

use clap::Parser;

/// Compiled-in rendezvous socket path, used when `--socket-path` is absent.
pub const DEFAULT_SOCKET_PATH: &str = "/var/run/hwregd-d";
/// Compiled-in lock-file path, used when `--lock-file` is absent.
pub const DEFAULT_LOCK_FILE: &str = "/var/run/hwregd.lock";

/// Hardware register access broker.
#[derive(Debug, Parser)]
#[command(version, about)]
pub struct Cli {
    /// Path of the Unix domain socket clients connect to.
    #[arg(long, default_value = DEFAULT_SOCKET_PATH)]
    pub socket_path: PathBuf,

    /// Path whose mere existence refuses all register access.
    #[arg(long, default_value = DEFAULT_LOCK_FILE)]
    pub lock_file: PathBuf,

    /// Raise log verbosity; repeat for more (`-v` = info, `-vv` = debug).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_with_no_arguments() {
        let cli = Cli::parse_from(["hwregd"]);
        assert_eq!(cli.socket_path, PathBuf::from(DEFAULT_SOCKET_PATH));
        assert_eq!(cli.lock_file, PathBuf::from(DEFAULT_LOCK_FILE));
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn repeated_v_flags_accumulate() {
        let cli = Cli::parse_from(["hwregd", "-vv"]);
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn explicit_paths_override_defaults() {
        let cli = Cli::parse_from([
            "hwregd",
            "--socket-path",
            "/tmp/custom-d",
            "--lock-file",
            "/tmp/custom.lock",
        ]);
        assert_eq!(cli.socket_path, PathBuf::from("/tmp/custom-d"));
        assert_eq!(cli.lock_file, PathBuf::from("/tmp/custom.lock"));
    }
}
