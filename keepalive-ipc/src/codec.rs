// Copyright 2021-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::wire::{self, SessionMsg};
use bytes::{Buf, BufMut, BytesMut};
use std::io;
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

/// Upper bound on a record body. Every message has a small fixed-width
/// payload; anything bigger is a framing error, not a large message.
pub const MAX_FRAME_LEN: usize = 128;

const LEN_PREFIX: usize = 4;

#[derive(Debug, Error)]
pub enum IpcError {
    #[error("channel i/o: {0}")]
    Io(#[from] io::Error),
    #[error("frame of {0} bytes exceeds the {MAX_FRAME_LEN} byte cap")]
    FrameTooLarge(usize),
    #[error("malformed record: {0}")]
    Decode(#[source] bincode::Error),
    #[error("unencodable record: {0}")]
    Encode(#[source] bincode::Error),
}

/// `u32` little-endian length prefix, bincode body. See [`crate::wire`].
#[derive(Debug, Default)]
pub struct SessionCodec;

impl Decoder for SessionCodec {
    type Item = SessionMsg;
    type Error = IpcError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<SessionMsg>, IpcError> {
        if src.len() < LEN_PREFIX {
            return Ok(None);
        }
        let mut len_bytes = [0u8; LEN_PREFIX];
        len_bytes.copy_from_slice(&src[..LEN_PREFIX]);
        let len = u32::from_le_bytes(len_bytes) as usize;
        if len > MAX_FRAME_LEN {
            return Err(IpcError::FrameTooLarge(len));
        }
        if src.len() < LEN_PREFIX + len {
            src.reserve(LEN_PREFIX + len - src.len());
            return Ok(None);
        }
        src.advance(LEN_PREFIX);
        let body = src.split_to(len);
        wire::decode(&body).map(Some)
    }
}

impl Encoder<SessionMsg> for SessionCodec {
    type Error = IpcError;

    fn encode(&mut self, msg: SessionMsg, dst: &mut BytesMut) -> Result<(), IpcError> {
        let body = wire::encode(&msg)?;
        if body.len() > MAX_FRAME_LEN {
            return Err(IpcError::FrameTooLarge(body.len()));
        }
        dst.reserve(LEN_PREFIX + body.len());
        dst.put_u32_le(body.len() as u32);
        dst.extend_from_slice(&body);
        Ok(())
    }
}
