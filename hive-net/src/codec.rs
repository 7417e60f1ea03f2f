//! Length-delimited frame codec for the session byte stream.

use std::io;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Frames are a little-endian `u32` payload length followed by the payload.
/// The decoder withholds bytes until a complete frame is available, which is
/// what sessions rely on when partial delivery is disabled.
pub struct FrameCodec {
    expected_len: Option<usize>,
    max_frame: usize,
}

impl FrameCodec {
    pub fn new(max_frame: usize) -> Self {
        Self {
            expected_len: None,
            max_frame,
        }
    }
}

impl Decoder for FrameCodec {
    type Item = Bytes;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> io::Result<Option<Bytes>> {
        let len = match self.expected_len {
            Some(len) => len,
            None => {
                if src.len() < 4 {
                    return Ok(None);
                }
                let mut prefix = [0u8; 4];
                prefix.copy_from_slice(&src[..4]);
                let len = u32::from_le_bytes(prefix) as usize;
                if len > self.max_frame {
                    return Err(io::Error::new(io::ErrorKind::InvalidData, "frame too large"));
                }
                src.advance(4);
                self.expected_len = Some(len);
                len
            }
        };

        if src.len() < len {
            src.reserve(len - src.len());
            return Ok(None);
        }

        self.expected_len = None;
        Ok(Some(src.split_to(len).freeze()))
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = io::Error;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> io::Result<()> {
        if item.len() > self.max_frame {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "frame too large"));
        }
        dst.reserve(4 + item.len());
        dst.put_u32_le(item.len() as u32);
        dst.extend_from_slice(&item);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let mut codec = FrameCodec::new(1024);
        let mut buf = BytesMut::new();
        codec
            .encode(Bytes::from_static(b"hello"), &mut buf)
            .unwrap();
        codec.encode(Bytes::from_static(b"world"), &mut buf).unwrap();

        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().as_ref(), b"hello");
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().as_ref(), b"world");
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_withholds_incomplete_frames() {
        let mut codec = FrameCodec::new(1024);
        let mut buf = BytesMut::new();

        buf.extend_from_slice(&5u32.to_le_bytes());
        buf.extend_from_slice(b"he");
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b"llo");
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().as_ref(), b"hello");
    }

    #[test]
    fn test_oversize_frame_is_an_error() {
        let mut codec = FrameCodec::new(4);
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&100u32.to_le_bytes());
        assert!(codec.decode(&mut buf).is_err());
    }
}
