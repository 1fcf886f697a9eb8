// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::codec::{IpcError, MAX_FRAME_LEN};
use bincode::Options;
use keepalive_common::Endpoint;
use serde::{Deserialize, Serialize};

/// One record on the supervisor/session channel.
///
/// The tag space is shared between the two directions; direction legality is
/// a dispatch rule, not a framing rule. The supervisor only ever sends the
/// first four, the session only ever sends [`SessionMsg::Timer`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SessionMsg {
    /// Append one entry to the session's client whitelist.
    Client { addr: Endpoint },
    /// Bind a UDP listener; only legal while the session is configuring.
    Listener { addr: Endpoint },
    /// Lock the listener set and start polling it.
    ListenerDone,
    /// Arm the inactivity timer.
    Timeout { seconds: u64 },
    /// The inactivity timer expired.
    Timer,
}

/// Fixed-int little-endian bodies, capped at the frame limit, trailing
/// bytes rejected (a wrong-length payload is a decode error).
fn options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_limit(MAX_FRAME_LEN as u64)
        .reject_trailing_bytes()
}

pub(crate) fn encode(msg: &SessionMsg) -> Result<Vec<u8>, IpcError> {
    options().serialize(msg).map_err(IpcError::Encode)
}

pub(crate) fn decode(body: &[u8]) -> Result<SessionMsg, IpcError> {
    options().deserialize(body).map_err(IpcError::Decode)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_every_variant() {
        let msgs = [
            SessionMsg::Client {
                addr: "10.0.0.1".parse().unwrap(),
            },
            SessionMsg::Listener {
                addr: "[::]:9000".parse().unwrap(),
            },
            SessionMsg::ListenerDone,
            SessionMsg::Timeout { seconds: 300 },
            SessionMsg::Timer,
        ];
        for msg in msgs {
            let body = encode(&msg).unwrap();
            assert_eq!(decode(&body).unwrap(), msg);
        }
    }

    #[test]
    fn tag_is_the_leading_u32() {
        let body = encode(&SessionMsg::ListenerDone).unwrap();
        assert_eq!(body, 2u32.to_le_bytes());
        let body = encode(&SessionMsg::Timer).unwrap();
        assert_eq!(body, 4u32.to_le_bytes());
    }

    #[test]
    fn unknown_tag_is_an_error() {
        let body = 255u32.to_le_bytes();
        assert!(matches!(decode(&body), Err(IpcError::Decode(_))));
    }

    #[test]
    fn trailing_bytes_are_an_error() {
        let mut body = encode(&SessionMsg::Timer).unwrap();
        body.push(0);
        assert!(matches!(decode(&body), Err(IpcError::Decode(_))));
    }

    #[test]
    fn truncated_payload_is_an_error() {
        let mut body = encode(&SessionMsg::Timeout { seconds: 300 }).unwrap();
        body.truncate(body.len() - 1);
        assert!(matches!(decode(&body), Err(IpcError::Decode(_))));
    }
}
