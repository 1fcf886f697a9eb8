// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Capability reduction at fixed lifecycle points.
//!
//! On OpenBSD these map to pledge(2) and unveil(2). On other platforms the
//! calls are logged no-ops; the call sites still mark the same phases, so
//! the reduction schedule stays auditable everywhere.

use std::io;
use std::path::Path;
#[cfg(not(target_os = "openbsd"))]
use tracing::debug;

/// Promise sets used by the two processes, one per lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Promises {
    /// Client before resolving its targets.
    StdioInetDns,
    /// Session at startup: may bind UDP sockets, nothing else.
    StdioInet,
    /// Session after the listener set is locked.
    Stdio,
    /// Supervisor that may still exec the shutdown binary.
    StdioProcExec,
    /// Supervisor in pretend mode: exec withheld.
    StdioProc,
}

impl Promises {
    pub fn as_str(self) -> &'static str {
        match self {
            Promises::StdioInetDns => "stdio inet dns",
            Promises::StdioInet => "stdio inet",
            Promises::Stdio => "stdio",
            Promises::StdioProcExec => "stdio proc exec",
            Promises::StdioProc => "stdio proc",
        }
    }
}

/// Restrict the process to the given promise set.
#[cfg(target_os = "openbsd")]
pub fn pledge(promises: Promises) -> io::Result<()> {
    use std::ffi::CString;

    let promises = CString::new(promises.as_str()).map_err(io::Error::other)?;
    // SAFETY: promises is a valid NUL-terminated string; execpromises NULL
    // leaves the exec pledge unchanged.
    if unsafe { libc::pledge(promises.as_ptr(), std::ptr::null()) } == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(target_os = "openbsd"))]
pub fn pledge(promises: Promises) -> io::Result<()> {
    debug!(promises = promises.as_str(), "pledge unsupported on this platform, skipping");
    Ok(())
}

/// Whitelist `path` for execution; all other filesystem access is revoked
/// once the first unveil lands.
#[cfg(target_os = "openbsd")]
pub fn unveil_exec(path: &Path) -> io::Result<()> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let path = CString::new(path.as_os_str().as_bytes()).map_err(io::Error::other)?;
    let perms = CString::new("x").map_err(io::Error::other)?;
    // SAFETY: both arguments are valid NUL-terminated strings.
    if unsafe { libc::unveil(path.as_ptr(), perms.as_ptr()) } == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(target_os = "openbsd"))]
pub fn unveil_exec(path: &Path) -> io::Result<()> {
    debug!(path = %path.display(), "unveil unsupported on this platform, skipping");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn promise_strings() {
        assert_eq!(Promises::StdioInetDns.as_str(), "stdio inet dns");
        assert_eq!(Promises::StdioInet.as_str(), "stdio inet");
        assert_eq!(Promises::Stdio.as_str(), "stdio");
        assert_eq!(Promises::StdioProcExec.as_str(), "stdio proc exec");
        assert_eq!(Promises::StdioProc.as_str(), "stdio proc");
    }

    #[cfg(not(target_os = "openbsd"))]
    #[test]
    fn fallback_is_a_no_op() {
        pledge(Promises::Stdio).unwrap();
        unveil_exec(Path::new("/sbin/shutdown")).unwrap();
    }
}
