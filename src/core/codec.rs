//! Stream framing for tagged session frames.
//!
//! A TCP stream has no message boundaries, so every frame travels inside a
//! small envelope:
//!
//! ```text
//! [Length(4, u32 LE)] [Tag(1)] [Payload(Length - 1)]
//! ```
//!
//! `Length` covers the tag and the payload. The decoder rejects oversized
//! envelopes before reserving memory for them.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::config::MAX_FRAME_SIZE;
use crate::error::{constants, Result, SessionError};

/// Size of the length prefix
pub const LENGTH_PREFIX: usize = 4;

/// A tag plus its still-encoded payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub tag: u8,
    pub payload: Bytes,
}

impl RawFrame {
    pub fn new(tag: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            tag,
            payload: payload.into(),
        }
    }

    /// Envelope size on the wire
    pub fn wire_len(&self) -> usize {
        LENGTH_PREFIX + 1 + self.payload.len()
    }
}

/// tokio-util codec that delimits [`RawFrame`]s on a byte stream.
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    max_frame_size: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(MAX_FRAME_SIZE)
    }
}

impl FrameCodec {
    pub fn new(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }
}

impl Decoder for FrameCodec {
    type Item = RawFrame;
    type Error = SessionError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<RawFrame>> {
        if src.len() < LENGTH_PREFIX {
            return Ok(None);
        }

        let mut len_bytes = [0u8; LENGTH_PREFIX];
        len_bytes.copy_from_slice(&src[..LENGTH_PREFIX]);
        let len = u32::from_le_bytes(len_bytes) as usize;

        if len == 0 {
            return Err(SessionError::malformed(constants::ERR_EMPTY_ENVELOPE));
        }
        if len > self.max_frame_size {
            return Err(SessionError::OversizedFrame(len));
        }

        if src.len() < LENGTH_PREFIX + len {
            src.reserve(LENGTH_PREFIX + len - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_PREFIX);
        let mut body = src.split_to(len);
        let tag = body.get_u8();
        Ok(Some(RawFrame {
            tag,
            payload: body.freeze(),
        }))
    }
}

impl Encoder<RawFrame> for FrameCodec {
    type Error = SessionError;

    fn encode(&mut self, frame: RawFrame, dst: &mut BytesMut) -> Result<()> {
        let len = frame.payload.len() + 1;
        if len > self.max_frame_size {
            return Err(SessionError::OversizedFrame(len));
        }
        dst.reserve(LENGTH_PREFIX + len);
        // bounded by max_frame_size above
        dst.put_u32_le(len as u32);
        dst.put_u8(frame.tag);
        dst.put_slice(&frame.payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn test_partial_envelope_waits_for_more() {
        let mut codec = FrameCodec::default();
        let mut buf = BytesMut::from(&[6u8, 0, 0, 0, 0x01, 0xAA][..]);
        assert!(codec.decode(&mut buf).expect("no error").is_none());
        assert_eq!(buf.len(), 6);
    }

    #[test]
    fn test_two_envelopes_in_one_read() {
        let mut codec = FrameCodec::default();
        let mut buf = BytesMut::new();
        codec.encode(RawFrame::new(1, vec![1, 2, 3, 4]), &mut buf).unwrap();
        codec.encode(RawFrame::new(5, vec![9, 0, 0, 0]), &mut buf).unwrap();

        let first = codec.decode(&mut buf).unwrap().expect("first frame");
        let second = codec.decode(&mut buf).unwrap().expect("second frame");
        assert_eq!(first.tag, 1);
        assert_eq!(&first.payload[..], &[1, 2, 3, 4]);
        assert_eq!(second.tag, 5);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_zero_length_rejected() {
        let mut codec = FrameCodec::default();
        let mut buf = BytesMut::from(&[0u8, 0, 0, 0][..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(SessionError::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_oversized_rejected_before_payload_arrives() {
        let mut codec = FrameCodec::new(16);
        let mut buf = BytesMut::from(&100u32.to_le_bytes()[..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(SessionError::OversizedFrame(100))
        ));
    }

    #[test]
    fn test_encode_refuses_oversized_payload() {
        let mut codec = FrameCodec::new(8);
        let mut buf = BytesMut::new();
        let result = codec.encode(RawFrame::new(2, vec![0u8; 8]), &mut buf);
        assert!(matches!(result, Err(SessionError::OversizedFrame(9))));
        assert!(buf.is_empty());
    }
}
