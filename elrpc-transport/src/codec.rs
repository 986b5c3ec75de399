use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io;
use tokio_util::codec::{Decoder, Encoder};

/// Largest payload the 6-hex-digit length prefix can describe.
pub const MAX_PAYLOAD_SIZE: usize = 0xFF_FFFF;

const HEADER_LEN: usize = 6;

/// Codec for EPC frames: every message is exactly six lowercase hex
/// digits of payload byte length, zero-padded, followed by that many
/// payload bytes. No separators before, between, or after.
pub struct EpcCodec {
    max_payload_size: usize,
}

impl EpcCodec {
    pub fn new() -> Self {
        Self {
            max_payload_size: MAX_PAYLOAD_SIZE,
        }
    }

    /// Tighten the payload limit below the protocol maximum.
    pub fn with_max_payload_size(max_payload_size: usize) -> Self {
        Self {
            max_payload_size: max_payload_size.min(MAX_PAYLOAD_SIZE),
        }
    }
}

impl Default for EpcCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for EpcCodec {
    type Item = Bytes;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        let header = &src[..HEADER_LEN];
        let header_str = std::str::from_utf8(header)
            .map_err(|_| CodecError::InvalidLength(format!("{:?}", header)))?;
        let payload_len = usize::from_str_radix(header_str, 16)
            .map_err(|_| CodecError::InvalidLength(header_str.to_string()))?;

        if payload_len > self.max_payload_size {
            return Err(CodecError::FrameTooLarge(payload_len));
        }

        if src.len() < HEADER_LEN + payload_len {
            src.reserve(HEADER_LEN + payload_len - src.len());
            return Ok(None);
        }

        src.advance(HEADER_LEN);
        Ok(Some(src.split_to(payload_len).freeze()))
    }
}

impl Encoder<Bytes> for EpcCodec {
    type Error = CodecError;

    fn encode(&mut self, payload: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if payload.len() > self.max_payload_size {
            return Err(CodecError::FrameTooLarge(payload.len()));
        }
        dst.reserve(HEADER_LEN + payload.len());
        dst.put_slice(format!("{:06x}", payload.len()).as_bytes());
        dst.put_slice(&payload);
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The six header bytes did not parse as hex. Fatal to the peer.
    #[error("invalid frame length header: {0}")]
    InvalidLength(String),

    #[error("frame too large: {0} bytes")]
    FrameTooLarge(usize),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(payload: &[u8]) -> BytesMut {
        let mut codec = EpcCodec::new();
        let mut buf = BytesMut::new();
        codec
            .encode(Bytes::copy_from_slice(payload), &mut buf)
            .unwrap();
        buf
    }

    #[test]
    fn encode_prefixes_zero_padded_hex() {
        let buf = frame(b"(return 7 nil)");
        assert_eq!(&buf[..], b"00000e(return 7 nil)");
    }

    #[test]
    fn decode_round_trips_any_payload() {
        let mut codec = EpcCodec::new();
        let big = vec![0u8; 4096];
        let payloads: Vec<&[u8]> = vec![b"", b"x", b"(call 1 \"echo\" (\"a b\"))", &big];
        for payload in payloads {
            let mut buf = frame(payload);
            let decoded = codec.decode(&mut buf).unwrap().unwrap();
            assert_eq!(&decoded[..], payload);
            assert!(buf.is_empty());
        }
    }

    #[test]
    fn decode_waits_for_complete_header() {
        let mut codec = EpcCodec::new();
        let mut buf = BytesMut::from(&b"0000"[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn decode_waits_for_complete_payload() {
        let mut codec = EpcCodec::new();
        let mut buf = BytesMut::from(&b"00000eincompl"[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(b"ete pay");
        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&decoded[..], b"incomplete pay");
    }

    #[test]
    fn decode_handles_back_to_back_frames() {
        let mut codec = EpcCodec::new();
        let mut buf = frame(b"(return 1 t)");
        buf.extend_from_slice(&frame(b"(return 2 nil)"));
        assert_eq!(&codec.decode(&mut buf).unwrap().unwrap()[..], b"(return 1 t)");
        assert_eq!(&codec.decode(&mut buf).unwrap().unwrap()[..], b"(return 2 nil)");
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn malformed_length_header_is_an_error() {
        let mut codec = EpcCodec::new();
        let mut buf = BytesMut::from(&b"00zz00payload"[..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(CodecError::InvalidLength(_))
        ));
    }

    #[test]
    fn oversize_payload_is_rejected_on_encode() {
        let mut codec = EpcCodec::with_max_payload_size(16);
        let mut buf = BytesMut::new();
        let err = codec
            .encode(Bytes::from(vec![b'x'; 32]), &mut buf)
            .unwrap_err();
        assert!(matches!(err, CodecError::FrameTooLarge(32)));
    }

    #[test]
    fn oversize_payload_is_rejected_on_decode() {
        let mut codec = EpcCodec::with_max_payload_size(4);
        let mut buf = BytesMut::from(&b"000010abcdefghijklmnop"[..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(CodecError::FrameTooLarge(16))
        ));
    }
}
