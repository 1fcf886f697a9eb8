// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg(unix)]

use nix::errno::Errno;
use std::ffi::{CString, NulError};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

// The args_cstrings field is just storage. Even though it's unreferenced,
// it's a necessary part of the struct: args_ptrs points into it.
#[allow(dead_code)]
pub struct PreparedExec {
    binary_path: CString,
    args_cstrings: Vec<CString>,
    args_ptrs: Vec<*const libc::c_char>,
}

impl PreparedExec {
    /// Prepare an argv for `execv`. The environment is inherited.
    pub fn new(binary_path: &Path, args: &[&str]) -> Result<Self, NulError> {
        let binary_path = CString::new(binary_path.as_os_str().as_bytes())?;

        let args_cstrings: Vec<CString> = args
            .iter()
            .map(|s| CString::new(*s))
            .collect::<Result<_, _>>()?;
        let args_ptrs: Vec<*const libc::c_char> = args_cstrings
            .iter()
            .map(|arg| arg.as_ptr())
            .chain(std::iter::once(std::ptr::null())) // Adds a null pointer to the end of the list
            .collect();

        Ok(Self {
            binary_path,
            args_cstrings,
            args_ptrs,
        })
    }

    /// Calls `execv` on the prepared arguments. Returns only on failure.
    pub fn exec(&self) -> Errno {
        // SAFETY: the only way to make one of these is through `new`, which
        // ensures that everything is well-formed.
        unsafe {
            libc::execv(self.binary_path.as_ptr(), self.args_ptrs.as_ptr());
        }
        Errno::last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_embedded_nul() {
        assert!(PreparedExec::new(Path::new("/sbin/shutdown"), &["bad\0arg"]).is_err());
    }

    #[test]
    fn exec_of_missing_binary_reports_errno() {
        let prepared =
            PreparedExec::new(Path::new("/nonexistent/binary"), &["binary"]).unwrap();
        assert_eq!(prepared.exec(), Errno::ENOENT);
    }
}
