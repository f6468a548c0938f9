//! Length-prefixed frame codec
//!
//! ```text
//! {u32 length}{u8 packet_id}{payload}
//! ```
//!
//! `length` covers the whole frame, header included. Frames are split and
//! joined here; turning a payload into a [`Packet`](crate::Packet) needs the
//! packet id table and happens one layer up.

use bytes::{Buf, BufMut, BytesMut};
use krelay_core::RelayError;
use tokio_util::codec::{Decoder, Encoder};

/// Size of the `{u32 length}{u8 id}` header
pub const FRAME_HEADER_LEN: usize = 5;

/// Default upper bound for a single frame
pub const DEFAULT_MAX_FRAME_LEN: usize = 1024 * 1024;

/// One undecoded frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub id: u8,
    pub payload: BytesMut,
}

impl RawFrame {
    pub fn new(id: u8, payload: BytesMut) -> Self {
        Self { id, payload }
    }
}

/// Splits a byte stream into [`RawFrame`]s and back
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    max_frame_len: usize,
}

impl FrameCodec {
    pub fn new(max_frame_len: usize) -> Self {
        Self { max_frame_len }
    }

    pub fn max_frame_len(&self) -> usize {
        self.max_frame_len
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_LEN)
    }
}

impl Decoder for FrameCodec {
    type Item = RawFrame;
    type Error = RelayError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<RawFrame>, RelayError> {
        if src.len() < 4 {
            return Ok(None);
        }

        let len = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
        if len < FRAME_HEADER_LEN {
            return Err(RelayError::Protocol(format!("Frame length {} is below the header size", len)));
        }
        if len > self.max_frame_len {
            return Err(RelayError::Protocol(format!(
                "Frame length {} exceeds limit {}",
                len, self.max_frame_len
            )));
        }

        if src.len() < len {
            src.reserve(len - src.len());
            return Ok(None);
        }

        let mut frame = src.split_to(len);
        frame.advance(4);
        let id = frame.get_u8();
        Ok(Some(RawFrame { id, payload: frame }))
    }
}

impl Encoder<RawFrame> for FrameCodec {
    type Error = RelayError;

    fn encode(&mut self, frame: RawFrame, dst: &mut BytesMut) -> Result<(), RelayError> {
        let len = FRAME_HEADER_LEN + frame.payload.len();
        if len > self.max_frame_len {
            return Err(RelayError::Protocol(format!(
                "Outgoing frame length {} exceeds limit {}",
                len, self.max_frame_len
            )));
        }

        dst.reserve(len);
        dst.put_u32(len as u32);
        dst.put_u8(frame.id);
        dst.put_slice(&frame.payload);
        Ok(())
    }
}
