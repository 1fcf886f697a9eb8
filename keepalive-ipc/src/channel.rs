// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::codec::SessionCodec;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;

#[cfg(unix)]
use std::io;
#[cfg(unix)]
use std::os::fd::{OwnedFd, RawFd};

/// The channel as seen by either process: a `Sink` of outgoing records and a
/// `Stream` of incoming ones. `feed` buffers without I/O, `flush` drives the
/// send buffer, `next` reads and deframes; `None` from `next` is an orderly
/// peer close, and a close that strands a partial record surfaces as an
/// error.
pub type SessionChannel<T> = Framed<T, SessionCodec>;

pub fn channel<T: AsyncRead + AsyncWrite>(io: T) -> SessionChannel<T> {
    Framed::new(io, SessionCodec)
}

/// Fd at which the supervisor leaves the session's channel end before exec.
#[cfg(unix)]
pub const SESSION_FD: RawFd = 3;

/// The supervisor/session socketpair: non-blocking, close-on-exec. The
/// child's end loses close-on-exec when it is dup'd onto [`SESSION_FD`].
#[cfg(unix)]
pub fn socketpair() -> nix::Result<(OwnedFd, OwnedFd)> {
    use nix::sys::socket::{socketpair, AddressFamily, SockFlag, SockType};

    socketpair(
        AddressFamily::Unix,
        SockType::Stream,
        None,
        SockFlag::SOCK_NONBLOCK | SockFlag::SOCK_CLOEXEC,
    )
}

/// Wrap one end of the socketpair for use inside a tokio runtime.
#[cfg(unix)]
pub fn channel_from_owned_fd(
    fd: OwnedFd,
) -> io::Result<SessionChannel<tokio::net::UnixStream>> {
    let stream = std::os::unix::net::UnixStream::from(fd);
    stream.set_nonblocking(true)?;
    Ok(channel(tokio::net::UnixStream::from_std(stream)?))
}
