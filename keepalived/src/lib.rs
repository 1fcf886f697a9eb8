// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0
#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]

//! The keepalive watchdog daemon.
//!
//! Two processes: a supervisor that keeps just enough privilege to exec the
//! shutdown binary, and an unprivileged session that owns the UDP listeners
//! and the inactivity timer. They share nothing but an `AF_UNIX` socketpair
//! carrying the records in [`keepalive_ipc::SessionMsg`].

pub mod config;
pub mod constants;
#[cfg(unix)]
pub mod session;
#[cfg(unix)]
pub mod spawn;
#[cfg(unix)]
pub mod supervisor;

use tracing_subscriber::EnvFilter;

/// Install the stderr subscriber. Warnings are the daemon's only
/// observability surface.
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}
