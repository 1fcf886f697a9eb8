// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg(unix)]

//! Launching and reaping the session process.
//!
//! Fork happens before any tokio runtime exists; the child drops privilege,
//! reparents its channel end onto the well-known fd and execs the session
//! binary, so no runtime state ever crosses the fork.

use crate::constants::{KEEPALIVED_USER, PATH_KEEPALIVED_SESSION};
use keepalive_common::exec::PreparedExec;
use keepalive_common::privdrop;
use keepalive_ipc::{socketpair, SESSION_FD};
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{fork, ForkResult, Pid};
use std::os::fd::{AsRawFd, OwnedFd};
use std::path::PathBuf;
use std::process;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("socketpair: {0}")]
    Socketpair(#[source] nix::Error),
    #[error("fork: {0}")]
    Fork(#[source] nix::Error),
}

/// The session child, owned by the supervisor until [`SessionProcess::reap`].
pub struct SessionProcess {
    pid: Pid,
}

/// Create the channel socketpair and fork the session process.
///
/// Returns the supervisor's channel end and the child handle. Must be
/// called while the process is still single-threaded.
pub fn spawn_session() -> Result<(OwnedFd, SessionProcess), SpawnError> {
    let (supervisor_end, session_end) = socketpair().map_err(SpawnError::Socketpair)?;

    // SAFETY: no threads have been spawned yet, and the child branch only
    // calls async-signal-safe operations before exec.
    match unsafe { fork() }.map_err(SpawnError::Fork)? {
        ForkResult::Child => {
            drop(supervisor_end);
            exec_session(session_end)
        }
        ForkResult::Parent { child } => {
            drop(session_end);
            Ok((supervisor_end, SessionProcess { pid: child }))
        }
    }
}

fn exec_session(channel_end: OwnedFd) -> ! {
    if let Err(e) = privdrop::drop_privileges(KEEPALIVED_USER, None) {
        eprintln!("keepalived: {e}");
        process::exit(1);
    }

    // dup2 clears close-on-exec on the new descriptor.
    // SAFETY: both descriptors are valid; dup2 is async-signal-safe.
    if unsafe { libc::dup2(channel_end.as_raw_fd(), SESSION_FD) } == -1 {
        eprintln!("keepalived: dup2: {}", std::io::Error::last_os_error());
        process::exit(1);
    }

    let path = session_binary_path();
    match PreparedExec::new(&path, &["keepalived-session"]) {
        Ok(prepared) => {
            let errno = prepared.exec();
            eprintln!("keepalived: exec {}: {errno}", path.display());
        }
        Err(e) => eprintln!("keepalived: {}: {e}", path.display()),
    }
    process::exit(1);
}

/// Prefer a session binary installed next to the running supervisor, fall
/// back to the libexec path.
fn session_binary_path() -> PathBuf {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            let sibling = dir.join("keepalived-session");
            if sibling.exists() {
                return sibling;
            }
        }
    }
    PathBuf::from(PATH_KEEPALIVED_SESSION)
}

impl SessionProcess {
    /// Interrupt the session if it is still running and collect its status.
    /// A nonzero exit is reported but never propagated: whether to shut the
    /// host down was decided by the time we get here.
    pub fn reap(self) {
        let _ = kill(self.pid, Signal::SIGINT);
        match waitpid(self.pid, None) {
            Ok(WaitStatus::Exited(_, 0)) => {}
            Ok(WaitStatus::Exited(_, status)) => {
                warn!(status, "session process exited with nonzero status");
            }
            Ok(status) => warn!(?status, "session process ended abnormally"),
            Err(e) => warn!("waitpid: {e}"),
        }
    }
}
