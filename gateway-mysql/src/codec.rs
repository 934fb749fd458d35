//! Wire primitives (C2): length-encoded integers/strings, fixed-width
//! little-endian integers, and capability-flag composition. Grounded on
//! the teacher's `protocol/packets.rs` lenenc helpers, extended to cover
//! the full encoding range spec.md §4.1 requires (3-byte and 8-byte
//! lengths) and to read from an already-captured payload buffer only —
//! never the underlying stream (§9 two-stage decode).

use crate::error::{ProtoError, Result};
use bytes::{Buf, BufMut, BytesMut};

pub const NULL_MARKER: u8 = 0xfb;

/// Length-encoded integer (§4.1): `<251` one byte; `0xFC` + 2 bytes;
/// `0xFD` + 3 bytes; `0xFE` + 8 bytes; `0xFB` is reserved for NULL and
/// must never be produced by this encoder.
pub fn read_lenenc_int(src: &mut BytesMut) -> Result<u64> {
    if src.is_empty() {
        return Err(ProtoError::Protocol("truncated length-encoded integer".into()));
    }
    let first = src[0];
    match first {
        0..=250 => {
            src.advance(1);
            Ok(first as u64)
        }
        0xfc => {
            if src.len() < 3 {
                return Err(ProtoError::Protocol("truncated lenenc-int (2B)".into()));
            }
            src.advance(1);
            Ok(src.get_u16_le() as u64)
        }
        0xfd => {
            if src.len() < 4 {
                return Err(ProtoError::Protocol("truncated lenenc-int (3B)".into()));
            }
            src.advance(1);
            let b0 = src.get_u8() as u64;
            let b1 = src.get_u8() as u64;
            let b2 = src.get_u8() as u64;
            Ok(b0 | (b1 << 8) | (b2 << 16))
        }
        0xfe => {
            if src.len() < 9 {
                return Err(ProtoError::Protocol("truncated lenenc-int (8B)".into()));
            }
            src.advance(1);
            Ok(src.get_u64_le())
        }
        NULL_MARKER => Err(ProtoError::Protocol("lenenc-int read on a NULL marker".into())),
        other => Err(ProtoError::Protocol(format!("invalid length-encoded integer prefix: {other:#x}"))),
    }
}

pub fn write_lenenc_int(dst: &mut BytesMut, val: u64) {
    if val < 251 {
        dst.put_u8(val as u8);
    } else if val <= 0xffff {
        dst.put_u8(0xfc);
        dst.put_u16_le(val as u16);
    } else if val <= 0xffffff {
        dst.put_u8(0xfd);
        dst.put_u8((val & 0xff) as u8);
        dst.put_u8(((val >> 8) & 0xff) as u8);
        dst.put_u8(((val >> 16) & 0xff) as u8);
    } else {
        dst.put_u8(0xfe);
        dst.put_u64_le(val);
    }
}

/// Length-encoded string: a lenenc-int length followed by that many bytes.
pub fn read_lenenc_str(src: &mut BytesMut) -> Result<String> {
    let len = read_lenenc_int(src)? as usize;
    if src.len() < len {
        return Err(ProtoError::Protocol("truncated length-encoded string".into()));
    }
    Ok(String::from_utf8_lossy(&src.split_to(len)).to_string())
}

pub fn write_lenenc_str(dst: &mut BytesMut, s: &str) {
    write_lenenc_int(dst, s.len() as u64);
    dst.put_slice(s.as_bytes());
}

/// Null-terminated string.
pub fn read_null_str(src: &mut BytesMut) -> Result<String> {
    let pos = src
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| ProtoError::Protocol("unterminated string".into()))?;
    let bytes = src.split_to(pos);
    src.advance(1);
    Ok(String::from_utf8_lossy(&bytes).to_string())
}

pub fn write_null_str(dst: &mut BytesMut, s: &str) {
    dst.put_slice(s.as_bytes());
    dst.put_u8(0);
}

/// "Rest of packet" string: everything remaining in the buffer.
pub fn read_rest_str(src: &mut BytesMut) -> String {
    let bytes = src.split_to(src.len());
    String::from_utf8_lossy(&bytes).to_string()
}

/// Composes the server's 32-bit capability mask from its low/high 16-bit
/// halves (§4.1).
pub fn compose_capabilities(low: u16, high: u16) -> u32 {
    (low as u32) | ((high as u32) << 16)
}

pub fn capability_halves(caps: u32) -> (u16, u16) {
    (caps as u16, (caps >> 16) as u16)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn lenenc_int_round_trips_boundary_values() {
        for &n in &[0u64, 250, 251, 65535, 65536, 16777215, 16777216, u64::MAX] {
            let mut buf = BytesMut::new();
            write_lenenc_int(&mut buf, n);
            assert_eq!(read_lenenc_int(&mut buf).unwrap(), n, "round trip failed for {n}");
        }
    }

    #[test]
    fn lenenc_str_round_trips() {
        let mut buf = BytesMut::new();
        write_lenenc_str(&mut buf, "hello world");
        assert_eq!(read_lenenc_str(&mut buf).unwrap(), "hello world");
    }

    #[test]
    fn null_str_round_trips() {
        let mut buf = BytesMut::new();
        write_null_str(&mut buf, "root");
        buf.extend_from_slice(b"trailing");
        assert_eq!(read_null_str(&mut buf).unwrap(), "root");
        assert_eq!(read_rest_str(&mut buf), "trailing");
    }

    #[test]
    fn capability_halves_compose_and_split() {
        let caps = compose_capabilities(0x1234, 0x5678);
        assert_eq!(caps, 0x5678_1234);
        assert_eq!(capability_halves(caps), (0x1234, 0x5678));
    }

    proptest! {
        #[test]
        fn lenenc_int_round_trips_any_value(n: u64) {
            let mut buf = BytesMut::new();
            write_lenenc_int(&mut buf, n);
            prop_assert_eq!(read_lenenc_int(&mut buf).unwrap(), n);
        }

        #[test]
        fn lenenc_str_round_trips_any_ascii(s in "[ -~]{0,200}") {
            let mut buf = BytesMut::new();
            write_lenenc_str(&mut buf, &s);
            prop_assert_eq!(read_lenenc_str(&mut buf).unwrap(), s);
        }
    }
}
