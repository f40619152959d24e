// SPDX-License-Identifier: Apache-2.0

//! The forked service process: one per accepted connection. Bootstraps its
//! own topology view, then serves the connection to completion through
//! [`hwreg_core::serve`].

use std::os::unix::net::UnixStream;
use std::path::Path;

use hwreg_core::{LockFile, ServiceContext, TopologyPciKinds, DEFAULT_PCI_ROOT};
use hwreg_topology::UnsupportedProcessor;
use nix::sys::signal::{SigSet, Signal};
use tracing::error;

use crate::cli::Cli;

#[cfg(target_arch = "x86_64")]
type CpuSource = hwreg_topology::HostCpuId;

#[cfg(not(target_arch = "x86_64"))]
type CpuSource = hwreg_topology::FixedCpuId;

/// Runs one connection to completion and returns the process exit code.
///
/// Unlike the supervisor, which never touches hardware, this runs the
/// topology bootstrap (§4.5 order: identify, select policy, open MSR
/// files, probe PCI) fresh for this connection, matching the original
/// per-child bootstrap.
pub fn run(mut stream: UnixStream, cli: &Cli) -> i32 {
    unblock_shutdown_signals();

    let connection_id = std::process::id().to_string();
    let span = crate::logging::connection_span(&connection_id);
    let _guard = span.enter();

    let cpu = CpuSource::default();
    let host = match hwreg_topology::identify(&cpu) {
        Ok(host) => host,
        Err(err) => return log_and_fail(&err),
    };

    let cpu_count = available_cpu_count();
    let mut ctx = match ServiceContext::bootstrap(&cpu, cpu_count, Path::new(DEFAULT_PCI_ROOT)) {
        Ok(ctx) => ctx,
        Err(err) => return log_and_fail(&err),
    };

    let lock = LockFile::new(cli.lock_file.clone());
    let devices = hwreg_topology::devices_for(host.microarch).unwrap_or(&[]);
    let kinds = TopologyPciKinds::new(devices);

    match hwreg_core::serve(&mut stream, &mut ctx, &lock, &kinds) {
        Ok(()) => 0,
        Err(err) => {
            error!(error = %err, "connection ended with a fatal error");
            1
        }
    }
}

fn log_and_fail(err: &UnsupportedProcessor) -> i32 {
    error!(error = %err, "service process cannot start");
    1
}

/// Unblocks `SIGTERM` and `SIGPIPE`, inherited as blocked from the
/// supervisor's signal mask; restoring their default (terminating)
/// disposition is how this process "shuts down" on either signal.
fn unblock_shutdown_signals() {
    let mut mask = SigSet::empty();
    mask.add(Signal::SIGTERM);
    mask.add(Signal::SIGPIPE);
    let _ = mask.thread_unblock();
}

#[allow(clippy::cast_possible_truncation)]
fn available_cpu_count() -> u32 {
    std::thread::available_parallelism().map_or(1, |n| n.get() as u32)
}
