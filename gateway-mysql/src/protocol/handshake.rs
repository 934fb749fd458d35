//! `HandshakeV10` / `HandshakeResponse41` (§4.2). Grounded on the
//! teacher's `protocol/handshake.rs`, with the auth-plugin-data and
//! reserved-byte layout corrected to match the documented wire shape
//! exactly (proto=10, 8+12-byte salt split, 10 reserved bytes, not 23).

use crate::codec::{read_lenenc_int, read_null_str, write_lenenc_int, write_null_str};
use crate::error::{ProtoError, Result};
use bytes::{Buf, BufMut, BytesMut};

pub const CLIENT_LONG_PASSWORD: u32 = 0x0000_0001;
pub const CLIENT_FOUND_ROWS: u32 = 0x0000_0002;
pub const CLIENT_LONG_FLAG: u32 = 0x0000_0004;
pub const CLIENT_CONNECT_WITH_DB: u32 = 0x0000_0008;
pub const CLIENT_NO_SCHEMA: u32 = 0x0000_0010;
pub const CLIENT_COMPRESS: u32 = 0x0000_0020;
pub const CLIENT_ODBC: u32 = 0x0000_0040;
pub const CLIENT_LOCAL_FILES: u32 = 0x0000_0080;
pub const CLIENT_IGNORE_SPACE: u32 = 0x0000_0100;
pub const CLIENT_PROTOCOL_41: u32 = 0x0000_0200;
pub const CLIENT_INTERACTIVE: u32 = 0x0000_0400;
pub const CLIENT_SSL: u32 = 0x0000_0800;
pub const CLIENT_IGNORE_SIGPIPE: u32 = 0x0000_1000;
pub const CLIENT_TRANSACTIONS: u32 = 0x0000_2000;
pub const CLIENT_RESERVED: u32 = 0x0000_4000;
pub const CLIENT_SECURE_CONNECTION: u32 = 0x0000_8000;
pub const CLIENT_MULTI_STATEMENTS: u32 = 0x0001_0000;
pub const CLIENT_MULTI_RESULTS: u32 = 0x0002_0000;
pub const CLIENT_PS_MULTI_RESULTS: u32 = 0x0004_0000;
pub const CLIENT_PLUGIN_AUTH: u32 = 0x0008_0000;
pub const CLIENT_CONNECT_ATTRS: u32 = 0x0010_0000;
pub const CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA: u32 = 0x0020_0000;
pub const CLIENT_SESSION_TRACK: u32 = 0x0080_0000;
pub const CLIENT_DEPRECATE_EOF: u32 = 0x0100_0000;

/// Server capabilities negotiated with every client. MariaDB-specific
/// extended capabilities are intentionally not advertised — an open
/// question in the source spec, resolved here in favor of a vanilla
/// MySQL 5.7/8.0-compatible surface so the wire format stays a single
/// well-understood dialect (see DESIGN.md).
pub const SERVER_CAPABILITIES: u32 = CLIENT_PROTOCOL_41
    | CLIENT_SECURE_CONNECTION
    | CLIENT_PLUGIN_AUTH
    | CLIENT_CONNECT_WITH_DB
    | CLIENT_TRANSACTIONS
    | CLIENT_MULTI_RESULTS;

pub const AUTH_PLUGIN_NAME: &str = "mysql_native_password";

pub struct HandshakeV10 {
    pub server_version: String,
    pub connection_id: u32,
    pub auth_plugin_data: [u8; 20],
    pub capabilities: u32,
    pub character_set: u8,
    pub status_flags: u16,
}

impl HandshakeV10 {
    pub fn new(connection_id: u32, salt: [u8; 20], server_version: &str) -> Self {
        Self {
            server_version: server_version.to_string(),
            connection_id,
            auth_plugin_data: salt,
            capabilities: SERVER_CAPABILITIES,
            character_set: 45, // utf8mb4_general_ci
            status_flags: 0x0002,
        }
    }

    pub fn write(&self, dst: &mut BytesMut) {
        let (cap_low, cap_high) = crate::codec::capability_halves(self.capabilities);
        dst.put_u8(10); // protocol_version
        write_null_str(dst, &self.server_version);
        dst.put_u32_le(self.connection_id);
        dst.put_slice(&self.auth_plugin_data[0..8]);
        dst.put_u8(0); // filler
        dst.put_u16_le(cap_low);
        dst.put_u8(self.character_set);
        dst.put_u16_le(self.status_flags);
        dst.put_u16_le(cap_high);
        dst.put_u8(21); // length of auth-plugin-data (20 salt bytes + null terminator)
        dst.put_slice(&[0u8; 10]); // reserved
        dst.put_slice(&self.auth_plugin_data[8..20]);
        dst.put_u8(0); // terminator for auth-plugin-data-part-2
        write_null_str(dst, AUTH_PLUGIN_NAME);
    }
}

pub struct HandshakeResponse41 {
    pub capabilities: u32,
    pub max_packet_size: u32,
    pub character_set: u8,
    pub username: String,
    pub auth_response: Vec<u8>,
    pub database: Option<String>,
    pub auth_plugin_name: Option<String>,
}

impl HandshakeResponse41 {
    /// Parses a client's handshake response from its already-captured
    /// packet payload (never the socket — see two-stage decode).
    pub fn parse(mut src: BytesMut) -> Result<Self> {
        if src.len() < 32 {
            return Err(ProtoError::Protocol("handshake response too short".into()));
        }
        let capabilities = src.get_u32_le();
        let max_packet_size = src.get_u32_le();
        let character_set = src.get_u8();
        src.advance(23); // reserved

        let username = read_null_str(&mut src)?;
        if username.len() > 255 {
            return Err(ProtoError::Auth("username too long".into()));
        }

        let auth_response = if capabilities & CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA != 0 {
            let len = read_lenenc_int(&mut src)? as usize;
            if src.len() < len {
                return Err(ProtoError::Protocol("truncated auth response".into()));
            }
            src.split_to(len).to_vec()
        } else if capabilities & CLIENT_SECURE_CONNECTION != 0 {
            if src.is_empty() {
                return Err(ProtoError::Protocol("missing auth response length".into()));
            }
            let len = src.get_u8() as usize;
            if len > 255 {
                return Err(ProtoError::Auth("auth response too long".into()));
            }
            if src.len() < len {
                return Err(ProtoError::Protocol("truncated auth response".into()));
            }
            src.split_to(len).to_vec()
        } else {
            read_null_str(&mut src)?.into_bytes()
        };

        let database = if capabilities & CLIENT_CONNECT_WITH_DB != 0 && !src.is_empty() {
            Some(read_null_str(&mut src)?)
        } else {
            None
        };

        let auth_plugin_name = if capabilities & CLIENT_PLUGIN_AUTH != 0 && !src.is_empty() {
            Some(read_null_str(&mut src)?)
        } else {
            None
        };

        Ok(Self {
            capabilities,
            max_packet_size,
            character_set,
            username,
            auth_response,
            database,
            auth_plugin_name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_v10_writes_expected_layout() {
        let salt = [7u8; 20];
        let hs = HandshakeV10::new(42, salt, "8.0.35-sqlexec");
        let mut buf = BytesMut::new();
        hs.write(&mut buf);
        assert_eq!(buf[0], 10);
        // server_version + null terminator
        let version_end = 1 + "8.0.35-sqlexec".len();
        assert_eq!(buf[version_end], 0);
        assert!(buf.len() > 40);
    }

    #[test]
    fn handshake_response_round_trips_through_write_then_parse() {
        let mut payload = BytesMut::new();
        let caps = CLIENT_PROTOCOL_41 | CLIENT_SECURE_CONNECTION | CLIENT_CONNECT_WITH_DB | CLIENT_PLUGIN_AUTH;
        payload.put_u32_le(caps);
        payload.put_u32_le(16777216);
        payload.put_u8(45);
        payload.extend_from_slice(&[0u8; 23]);
        write_null_str(&mut payload, "root");
        payload.put_u8(4);
        payload.put_slice(b"resp");
        write_null_str(&mut payload, "test_db");
        write_null_str(&mut payload, "mysql_native_password");

        let parsed = HandshakeResponse41::parse(payload).unwrap();
        assert_eq!(parsed.username, "root");
        assert_eq!(parsed.auth_response, b"resp");
        assert_eq!(parsed.database.as_deref(), Some("test_db"));
        assert_eq!(parsed.auth_plugin_name.as_deref(), Some("mysql_native_password"));
    }
}
