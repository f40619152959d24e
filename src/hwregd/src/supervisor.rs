// SPDX-License-Identifier: Apache-2.0

//! The parent process: binds the rendezvous socket, blocks signals, and
//! forks one service process per accepted connection. Never itself touches
//! an MSR or PCI file; that only happens in the forked child, which runs
//! its own topology bootstrap before entering the dispatcher loop.

use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::Path;

use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::sys::signal::{SigSet, Signal};
use nix::sys::signalfd::{SfdFlags, SignalFd};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{fork, ForkResult};
use tracing::{debug, error, info, warn};

use crate::cli::Cli;
use crate::error::BrokerError;

/// Runs the supervisor to completion: binds the socket, serves connections,
/// and returns once a shutdown signal is received.
///
/// # Errors
/// Any failure binding the socket, setting its permissions, or performing
/// the signal-handling setup required before the accept loop can start.
pub fn run(cli: &Cli) -> Result<(), BrokerError> {
    if cli.lock_file.exists() {
        warn!(path = %cli.lock_file.display(), "lock file present at startup, refusing to start");
        return Ok(());
    }

    let _ = std::fs::remove_file(&cli.socket_path);
    let listener = UnixListener::bind(&cli.socket_path).map_err(|source| BrokerError::Bind {
        path: cli.socket_path.clone(),
        source,
    })?;
    shrink_backlog_to_one(&listener).map_err(|source| BrokerError::Bind {
        path: cli.socket_path.clone(),
        source,
    })?;
    set_world_read_write(&cli.socket_path).map_err(BrokerError::Permissions)?;
    info!(socket = %cli.socket_path.display(), "rendezvous socket ready");

    let mut mask = SigSet::empty();
    mask.add(Signal::SIGINT);
    mask.add(Signal::SIGQUIT);
    mask.add(Signal::SIGTERM);
    mask.add(Signal::SIGCHLD);
    mask.thread_block()?;
    let mut signal_fd = SignalFd::with_flags(&mask, SfdFlags::SFD_CLOEXEC)?;

    accept_loop(cli, &listener, &mut signal_fd)
}

/// Multiplexes on the signal handle and the listening socket until a
/// terminal signal arrives.
fn accept_loop(
    cli: &Cli,
    listener: &UnixListener,
    signal_fd: &mut SignalFd,
) -> Result<(), BrokerError> {
    loop {
        let mut fds = [
            PollFd::new(borrow_fd(signal_fd.as_raw_fd()), PollFlags::POLLIN),
            PollFd::new(borrow_fd(listener.as_raw_fd()), PollFlags::POLLIN),
        ];
        poll(&mut fds, PollTimeout::NONE)?;

        let signal_ready = fds[0]
            .revents()
            .is_some_and(|e| e.contains(PollFlags::POLLIN));
        let accept_ready = fds[1]
            .revents()
            .is_some_and(|e| e.contains(PollFlags::POLLIN));

        if signal_ready {
            if let ShutdownDecision::Shutdown = handle_signal(signal_fd, &cli.socket_path)? {
                return Ok(());
            }
        }

        if accept_ready {
            match listener.accept() {
                Ok((stream, _addr)) => fork_service_process(cli, stream)?,
                Err(err) => warn!(error = %err, "accept failed"),
            }
        }
    }
}

enum ShutdownDecision {
    Continue,
    Shutdown,
}

fn handle_signal(
    signal_fd: &mut SignalFd,
    socket_path: &Path,
) -> Result<ShutdownDecision, BrokerError> {
    let Some(siginfo) = signal_fd.read_signal()? else {
        return Ok(ShutdownDecision::Continue);
    };
    #[allow(clippy::cast_possible_wrap)]
    let signal = Signal::try_from(siginfo.ssi_signo as i32).ok();
    match signal {
        Some(Signal::SIGCHLD) => {
            reap_children();
            Ok(ShutdownDecision::Continue)
        }
        Some(Signal::SIGINT | Signal::SIGQUIT | Signal::SIGTERM) => {
            info!("shutdown signal received");
            let _ = std::fs::remove_file(socket_path);
            Ok(ShutdownDecision::Shutdown)
        }
        _ => Ok(ShutdownDecision::Continue),
    }
}

fn reap_children() {
    loop {
        match waitpid(None, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) => break,
            Ok(status) => debug!(?status, "reaped service process"),
            Err(nix::errno::Errno::ECHILD) => break,
            Err(err) => {
                warn!(error = %err, "waitpid failed");
                break;
            }
        }
    }
}

/// Forks a service process for `stream`. The parent returns immediately
/// after dropping its copy of the connection; the child runs the dispatcher
/// loop to completion and exits.
fn fork_service_process(cli: &Cli, stream: UnixStream) -> Result<(), BrokerError> {
    // SAFETY: this process is single-threaded, so the child inherits no
    // other thread's held locks; it calls only ordinary safe Rust between
    // fork and its eventual `std::process::exit`.
    match unsafe { fork() }? {
        ForkResult::Parent { child, .. } => {
            debug!(pid = %child, "forked service process");
            drop(stream);
            Ok(())
        }
        ForkResult::Child => {
            let exit_code = crate::service::run(stream, cli);
            std::process::exit(exit_code);
        }
    }
}

/// `std::os::unix::net::UnixListener::bind` always listens with a large
/// kernel-default backlog; re-issuing `listen(2)` on the same socket lowers
/// it to one, matching the original daemon's one-broker-one-client model
/// (SPEC_FULL §4.4, §9).
fn shrink_backlog_to_one(listener: &UnixListener) -> std::io::Result<()> {
    // SAFETY: `listener.as_raw_fd()` is a valid, open socket fd for the
    // duration of this call; `listen` has no other preconditions.
    let rc = unsafe { libc::listen(listener.as_raw_fd(), 1) };
    if rc == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

fn set_world_read_write(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o666))
}

fn borrow_fd(fd: RawFd) -> std::os::fd::BorrowedFd<'static> {
    // SAFETY: the referenced socket/signalfd outlives every poll call made
    // with this borrow; both are owned locals of `run` for its whole body.
    unsafe { std::os::fd::BorrowedFd::borrow_raw(fd) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn lock_file_present_returns_without_binding_a_socket() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join("hwregd.lock");
        std::fs::write(&lock_path, b"").unwrap();
        let socket_path = dir.path().join("hwregd-d");

        let cli = Cli::parse_from([
            "hwregd",
            "--socket-path",
            socket_path.to_str().unwrap(),
            "--lock-file",
            lock_path.to_str().unwrap(),
        ]);

        assert!(run(&cli).is_ok());
        assert!(!socket_path.exists());
    }
}
