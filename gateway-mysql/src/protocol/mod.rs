//! Packet types & connection state machine (C3): framing, handshake,
//! OK/ERR/EOF, column definitions, row encoding, command parsing.
//! Grounded on the teacher's `protocol/mod.rs` (`MySQLProtocol::read_packet`
//! / `write_packet`), extended to split the 2²⁴−1-byte continuation case
//! spec.md §4.1 names as an edge case.

pub mod auth;
pub mod handshake;
pub mod packets;

pub use handshake::HandshakeV10;
pub use packets::{Command, ColumnDefinition, EOFPacket, ERRPacket, OKPacket, TextRow};

use crate::error::{ProtoError, Result};
use bytes::{Buf, BufMut, BytesMut};

/// Largest payload a single packet may carry before it must be split into
/// a continuation packet (§4.1: "packets larger than 2²⁴−1 bytes are
/// split into continuation packets with incrementing IDs").
pub const MAX_PACKET_PAYLOAD: usize = 0xff_ffff;

#[derive(Debug, Clone)]
pub struct Packet {
    pub seq_id: u8,
    pub payload: BytesMut,
}

/// Reads one complete packet from `src`, consuming the 4-byte header and
/// exactly `length` payload bytes. Returns `Ok(None)` when `src` doesn't
/// yet hold a full packet (the caller should read more from the socket).
///
/// This is stage one of the two-stage decode (§4.1/§9): the returned
/// `payload` is the ONLY buffer later decoders may read from. A decoder
/// that instead reads further bytes from the connection's socket buffer
/// has reintroduced the single largest documented source of protocol bugs.
pub fn read_packet(src: &mut BytesMut) -> Result<Option<Packet>> {
    if src.len() < 4 {
        return Ok(None);
    }
    let len = (src[0] as usize) | ((src[1] as usize) << 8) | ((src[2] as usize) << 16);
    let seq_id = src[3];
    if src.len() < 4 + len {
        return Ok(None);
    }
    src.advance(4);
    let payload = src.split_to(len);
    Ok(Some(Packet { seq_id, payload }))
}

/// Writes `payload` as one or more wire packets, splitting at
/// [`MAX_PACKET_PAYLOAD`] and incrementing `seq_id` across continuations
/// (including the always-present zero-length terminator when the payload
/// length is an exact multiple of the max).
pub fn write_packet(payload: &[u8], seq_id: &mut u8, dst: &mut BytesMut) {
    let mut offset = 0;
    loop {
        let remaining = payload.len() - offset;
        let chunk_len = remaining.min(MAX_PACKET_PAYLOAD);
        dst.reserve(4 + chunk_len);
        dst.put_u8((chunk_len & 0xff) as u8);
        dst.put_u8(((chunk_len >> 8) & 0xff) as u8);
        dst.put_u8(((chunk_len >> 16) & 0xff) as u8);
        dst.put_u8(*seq_id);
        dst.put_slice(&payload[offset..offset + chunk_len]);
        *seq_id = seq_id.wrapping_add(1);
        offset += chunk_len;
        if chunk_len < MAX_PACKET_PAYLOAD {
            break;
        }
        if offset == payload.len() {
            // Exact multiple: MySQL still emits a zero-length continuation
            // so the reader knows the previous chunk wasn't truncated.
            dst.reserve(4);
            dst.put_u8(0);
            dst.put_u8(0);
            dst.put_u8(0);
            dst.put_u8(*seq_id);
            *seq_id = seq_id.wrapping_add(1);
            break;
        }
    }
}

pub fn err_payload(error_code: u16, sql_state: &str, message: &str) -> Result<BytesMut> {
    if sql_state.len() != 5 {
        return Err(ProtoError::Internal(format!("sql_state must be 5 chars, got {sql_state:?}")));
    }
    let mut buf = BytesMut::new();
    ERRPacket {
        error_code,
        sql_state: sql_state.to_string(),
        error_message: message.to_string(),
    }
    .write(&mut buf);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn read_packet_waits_for_full_payload() {
        let mut buf = BytesMut::from(&b"\x05\x00\x00\x00hel"[..]);
        assert!(read_packet(&mut buf).unwrap().is_none());
        buf.extend_from_slice(b"lo");
        let packet = read_packet(&mut buf).unwrap().unwrap();
        assert_eq!(packet.seq_id, 0);
        assert_eq!(&packet.payload[..], b"hello");
    }

    #[test]
    fn write_packet_increments_seq_id() {
        let mut seq = 0u8;
        let mut buf = BytesMut::new();
        write_packet(b"abc", &mut seq, &mut buf);
        write_packet(b"def", &mut seq, &mut buf);
        assert_eq!(seq, 2);
        // first packet header: len=3 seq=0
        assert_eq!(&buf[0..4], &[3, 0, 0, 0]);
        assert_eq!(&buf[4..7], b"abc");
        // second packet header: len=3 seq=1
        assert_eq!(&buf[7..11], &[3, 0, 0, 1]);
    }

    #[test]
    fn write_packet_splits_oversized_payload() {
        let payload = vec![0u8; MAX_PACKET_PAYLOAD + 10];
        let mut seq = 0u8;
        let mut buf = BytesMut::new();
        write_packet(&payload, &mut seq, &mut buf);
        assert_eq!(seq, 2);
        assert_eq!(&buf[0..4], &[0xff, 0xff, 0xff, 0]);
        let second_header_offset = 4 + MAX_PACKET_PAYLOAD;
        assert_eq!(buf[second_header_offset + 3], 1);
    }

    proptest! {
        // §8: packet codec round-trip, for payloads under a single frame
        // (the split-frame case is covered by `write_packet_splits_oversized_payload`).
        #[test]
        fn single_frame_packet_round_trips(payload in prop::collection::vec(any::<u8>(), 0..4096)) {
            let mut seq = 0u8;
            let mut buf = BytesMut::new();
            write_packet(&payload, &mut seq, &mut buf);
            let packet = read_packet(&mut buf).unwrap().unwrap();
            prop_assert_eq!(&packet.payload[..], &payload[..]);
            prop_assert_eq!(packet.seq_id, 0);
        }

        // §8: sequence IDs start at 0 and increment by 1 per packet written
        // within one response, regardless of how many packets it takes.
        #[test]
        fn write_packet_sequence_increments_by_one_per_call(n in 1usize..20) {
            let mut seq = 0u8;
            let mut buf = BytesMut::new();
            for _ in 0..n {
                write_packet(b"x", &mut seq, &mut buf);
            }
            prop_assert_eq!(seq, n as u8);
        }
    }
}
