// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg(unix)]

use nix::unistd::{setgroups, setresgid, setresuid, Group, Uid, User};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum PrivDropError {
    #[error("no such user: {0}")]
    NoSuchUser(String),
    #[error("no such group: {0}")]
    NoSuchGroup(String),
    #[error("{0}: {1}")]
    Sys(&'static str, #[source] nix::Error),
}

/// Drop the process identity to `user`, reducing the supplementary group
/// list to `group` when given, otherwise to the user's own primary group.
///
/// Order matters: groups first, then gid, then uid; once the uid is gone the
/// rest would fail. A non-root caller has nothing left to drop, so the call
/// is skipped rather than failed, which keeps the daemon runnable in
/// development.
pub fn drop_privileges(user: &str, group: Option<&str>) -> Result<(), PrivDropError> {
    if !Uid::effective().is_root() {
        debug!(user, "not running as root, leaving process identity unchanged");
        return Ok(());
    }

    let pwd = User::from_name(user)
        .map_err(|e| PrivDropError::Sys("getpwnam", e))?
        .ok_or_else(|| PrivDropError::NoSuchUser(user.to_string()))?;

    let supplementary = match group {
        Some(name) => Group::from_name(name)
            .map_err(|e| PrivDropError::Sys("getgrnam", e))?
            .ok_or_else(|| PrivDropError::NoSuchGroup(name.to_string()))?
            .gid,
        None => pwd.gid,
    };

    setgroups(&[supplementary]).map_err(|e| PrivDropError::Sys("setgroups", e))?;
    setresgid(pwd.gid, pwd.gid, pwd.gid).map_err(|e| PrivDropError::Sys("setresgid", e))?;
    setresuid(pwd.uid, pwd.uid, pwd.uid).map_err(|e| PrivDropError::Sys("setresuid", e))?;

    Ok(())
}
