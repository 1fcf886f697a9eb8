// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The unprivileged session half of keepalived. Not meant to be run by
//! hand: the supervisor execs it with the channel already at the well-known
//! fd, after dropping its identity.

#[cfg(not(unix))]
fn main() {
    eprintln!("keepalived-session only runs on unix");
    std::process::exit(1);
}

#[cfg(unix)]
fn main() -> std::process::ExitCode {
    use keepalive_common::sandbox::{self, Promises};
    use keepalive_ipc::SESSION_FD;
    use std::os::fd::{FromRawFd, OwnedFd};
    use std::process::ExitCode;
    use tracing::error;

    keepalived::init_logging();

    if let Err(e) = sandbox::pledge(Promises::StdioInet) {
        error!("pledge: {e}");
        return ExitCode::FAILURE;
    }

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(async {
        // SAFETY: the supervisor reparented our channel end onto SESSION_FD
        // before exec; nothing else in this process owns it.
        let fd = unsafe { OwnedFd::from_raw_fd(SESSION_FD) };
        let channel = keepalive_ipc::channel_from_owned_fd(fd)?;
        keepalived::session::run(channel).await.map_err(anyhow::Error::from)
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
