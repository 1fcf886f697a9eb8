// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0
#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]

//! The framed message channel between the keepalive supervisor and its
//! session process.
//!
//! Records are a `u32` little-endian length prefix followed by a
//! bincode-encoded [`SessionMsg`]; the variant index is the record's type
//! tag. The codec is transport-agnostic so it can be unit tested against an
//! in-memory duplex; the real transport is one end of an `AF_UNIX` stream
//! socketpair, which the session child adopts from [`SESSION_FD`].

pub mod channel;
pub mod codec;
pub mod wire;

pub use channel::{channel, SessionChannel};
#[cfg(unix)]
pub use channel::{channel_from_owned_fd, socketpair, SESSION_FD};
pub use codec::{IpcError, SessionCodec, MAX_FRAME_LEN};
pub use wire::SessionMsg;
