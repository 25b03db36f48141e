use std::ops::Deref;

use anyhow::Context;
use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

use swim_core::ext::read_u32;

/// Upper bound for a single stream frame. A full push-pull state of a large
/// cluster fits comfortably; anything above is treated as a corrupt length.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Packet {
    pub body: Bytes,
}

impl Packet {
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self { body: body.into() }
    }
}

impl Deref for Packet {
    type Target = Bytes;

    fn deref(&self) -> &Self::Target {
        &self.body
    }
}

/// Length prefixed framing used on stream connections: a big endian `u32`
/// body length followed by the body.
#[derive(Debug, Clone, Copy)]
pub struct PacketCodec {
    max_frame_len: usize,
}

impl Default for PacketCodec {
    fn default() -> Self {
        Self {
            max_frame_len: MAX_FRAME_LEN,
        }
    }
}

impl PacketCodec {
    pub fn with_max_frame_len(max_frame_len: usize) -> Self {
        Self { max_frame_len }
    }
}

#[derive(Debug, Error)]
pub enum PacketCodecError {
    #[error("codec packet error anyhow {0:#}")]
    Anyhow(#[from] anyhow::Error),
    #[error("codec packet error io {0}")]
    Io(#[from] std::io::Error),
    #[error("frame of {0} bytes exceeds the limit of {1} bytes")]
    FrameTooLarge(usize, usize),
}

impl Encoder<Packet> for PacketCodec {
    type Error = PacketCodecError;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let len = item.len();
        if len > self.max_frame_len {
            return Err(PacketCodecError::FrameTooLarge(len, self.max_frame_len));
        }
        let len = u32::try_from(len).context("packet too large")?;
        dst.reserve(4 + item.len());
        dst.put_u32(len);
        dst.put_slice(&item);
        Ok(())
    }
}

impl Decoder for PacketCodec {
    type Item = Packet;
    type Error = PacketCodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let buf_len = src.len();
        if buf_len < 4 {
            return Ok(None);
        }
        let body_len = read_u32(src, 0) as usize;
        if body_len > self.max_frame_len {
            return Err(PacketCodecError::FrameTooLarge(body_len, self.max_frame_len));
        }
        if body_len > buf_len - 4 {
            src.reserve(4 + body_len - buf_len);
            Ok(None)
        } else {
            let mut frame = src.split_to(4 + body_len);
            let body = frame.split_off(4).freeze();
            Ok(Some(Packet::new(body)))
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::{BufMut, BytesMut};
    use tokio_util::codec::{Decoder, Encoder};

    use crate::codec::{Packet, PacketCodec, PacketCodecError};

    #[test]
    fn decode_waits_for_complete_frame() -> anyhow::Result<()> {
        let mut codec = PacketCodec::default();
        let mut buf = BytesMut::new();
        codec.encode(Packet::new(&b"push-pull"[..]), &mut buf)?;
        let mut partial = buf.split_to(6);
        assert!(codec.decode(&mut partial)?.is_none());
        partial.unsplit(buf);
        let packet = codec.decode(&mut partial)?.expect("complete frame");
        assert_eq!(&packet.body[..], b"push-pull");
        assert!(partial.is_empty());
        Ok(())
    }

    #[test]
    fn decode_back_to_back_frames() -> anyhow::Result<()> {
        let mut codec = PacketCodec::default();
        let mut buf = BytesMut::new();
        codec.encode(Packet::new(&b"a"[..]), &mut buf)?;
        codec.encode(Packet::new(&b"bc"[..]), &mut buf)?;
        assert_eq!(&codec.decode(&mut buf)?.expect("first").body[..], b"a");
        assert_eq!(&codec.decode(&mut buf)?.expect("second").body[..], b"bc");
        assert!(codec.decode(&mut buf)?.is_none());
        Ok(())
    }

    #[test]
    fn reject_oversized_length_prefix() {
        let mut codec = PacketCodec::with_max_frame_len(16);
        let mut buf = BytesMut::new();
        buf.put_u32(17);
        buf.put_slice(&[0u8; 17]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(PacketCodecError::FrameTooLarge(17, 16))
        ));
        assert!(codec.encode(Packet::new(vec![0u8; 17]), &mut BytesMut::new()).is_err());
    }
}
