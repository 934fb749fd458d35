//! OK/ERR/EOF, column definitions, row encoding, and command parsing
//! (§4.2). Grounded on the teacher's `protocol/packets.rs`, extended to
//! the full command-byte table spec.md §4.2 enumerates.

use crate::codec::{write_lenenc_int, write_lenenc_str, NULL_MARKER};
use bytes::{BufMut, BytesMut};

/// A parsed client command (§4.2's command-byte table).
#[derive(Debug, Clone)]
pub enum Command {
    Sleep,
    Quit,
    InitDb { schema: String },
    Query { sql: String },
    FieldList { table: String },
    Refresh,
    Shutdown,
    Statistics,
    ProcessKill { connection_id: u32 },
    Debug,
    Ping,
    SetOption { option: u16 },
    Unknown { byte: u8 },
}

impl Command {
    pub fn parse(payload: &[u8]) -> Option<Self> {
        if payload.is_empty() {
            return None;
        }
        let data = &payload[1..];
        Some(match payload[0] {
            0x00 => Command::Sleep,
            0x01 => Command::Quit,
            0x02 => Command::InitDb {
                schema: String::from_utf8_lossy(data).to_string(),
            },
            0x03 => Command::Query {
                sql: String::from_utf8_lossy(data).to_string(),
            },
            0x04 => Command::FieldList {
                table: String::from_utf8_lossy(data.split(|&b| b == 0).next().unwrap_or(data)).to_string(),
            },
            0x07 => Command::Refresh,
            0x08 => Command::Shutdown,
            0x09 => Command::Statistics,
            0x0c => Command::ProcessKill {
                connection_id: if data.len() >= 4 {
                    u32::from_le_bytes([data[0], data[1], data[2], data[3]])
                } else {
                    0
                },
            },
            0x0d => Command::Debug,
            0x0e => Command::Ping,
            0x1a => Command::SetOption {
                option: if data.len() >= 2 { u16::from_le_bytes([data[0], data[1]]) } else { 0 },
            },
            other => Command::Unknown { byte: other },
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct OKPacket {
    pub affected_rows: u64,
    pub last_insert_id: u64,
    pub status_flags: u16,
    pub warnings: u16,
    pub info: String,
}

impl OKPacket {
    pub fn write(&self, dst: &mut BytesMut) {
        dst.put_u8(0x00);
        write_lenenc_int(dst, self.affected_rows);
        write_lenenc_int(dst, self.last_insert_id);
        dst.put_u16_le(self.status_flags);
        dst.put_u16_le(self.warnings);
        dst.put_slice(self.info.as_bytes());
    }
}

#[derive(Debug, Clone)]
pub struct ERRPacket {
    pub error_code: u16,
    pub sql_state: String,
    pub error_message: String,
}

impl ERRPacket {
    pub fn write(&self, dst: &mut BytesMut) {
        dst.put_u8(0xff);
        dst.put_u16_le(self.error_code);
        dst.put_u8(b'#');
        dst.put_slice(self.sql_state.as_bytes());
        dst.put_slice(self.error_message.as_bytes());
    }
}

#[derive(Debug, Clone)]
pub struct EOFPacket {
    pub warnings: u16,
    pub status_flags: u16,
}

impl EOFPacket {
    pub fn write(&self, dst: &mut BytesMut) {
        dst.put_u8(0xfe);
        dst.put_u16_le(self.warnings);
        dst.put_u16_le(self.status_flags);
    }
}

/// `{catalog="def", schema, table, org_table, name, org_name, charset,
/// max_length, mysql_type, flags, decimals}` (§3).
#[derive(Debug, Clone)]
pub struct ColumnDefinition {
    pub catalog: String,
    pub schema: String,
    pub table: String,
    pub org_table: String,
    pub name: String,
    pub org_name: String,
    pub charset: u16,
    pub column_length: u32,
    pub column_type: u8,
    pub flags: u16,
    pub decimals: u8,
}

impl ColumnDefinition {
    pub fn from_descriptor(d: &gateway_core::ColumnDescriptor) -> Self {
        Self {
            catalog: d.catalog.clone(),
            schema: d.schema.clone(),
            table: d.table.clone(),
            org_table: d.org_table.clone(),
            name: d.name.clone(),
            org_name: d.org_name.clone(),
            charset: d.charset,
            column_length: d.max_length,
            column_type: d.mysql_type,
            flags: d.flags,
            decimals: d.decimals,
        }
    }

    pub fn write(&self, dst: &mut BytesMut) {
        write_lenenc_str(dst, &self.catalog);
        write_lenenc_str(dst, &self.schema);
        write_lenenc_str(dst, &self.table);
        write_lenenc_str(dst, &self.org_table);
        write_lenenc_str(dst, &self.name);
        write_lenenc_str(dst, &self.org_name);
        write_lenenc_int(dst, 0x0c); // length of fixed fields below
        dst.put_u16_le(self.charset);
        dst.put_u32_le(self.column_length);
        dst.put_u8(self.column_type);
        dst.put_u16_le(self.flags);
        dst.put_u8(self.decimals);
        dst.put_slice(&[0u8; 2]); // filler
    }
}

/// Text-protocol row: each cell is a length-encoded string, `NULL` = 0xFB.
pub struct TextRow {
    pub values: Vec<Option<String>>,
}

impl TextRow {
    pub fn write(&self, dst: &mut BytesMut) {
        for val in &self.values {
            match val {
                Some(s) => write_lenenc_str(dst, s),
                None => dst.put_u8(NULL_MARKER),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_query_command() {
        let payload = b"\x03SELECT 1";
        match Command::parse(payload).unwrap() {
            Command::Query { sql } => assert_eq!(sql, "SELECT 1"),
            _ => panic!("expected Query"),
        }
    }

    #[test]
    fn parses_ping_and_quit() {
        assert!(matches!(Command::parse(&[0x0e]).unwrap(), Command::Ping));
        assert!(matches!(Command::parse(&[0x01]).unwrap(), Command::Quit));
    }

    #[test]
    fn unknown_command_byte_is_tagged_not_dropped() {
        match Command::parse(&[0x99]).unwrap() {
            Command::Unknown { byte } => assert_eq!(byte, 0x99),
            _ => panic!("expected Unknown"),
        }
    }

    #[test]
    fn ok_packet_serializes_header_and_counts() {
        let mut buf = BytesMut::new();
        OKPacket {
            affected_rows: 1,
            last_insert_id: 12345,
            status_flags: 2,
            warnings: 0,
            info: String::new(),
        }
        .write(&mut buf);
        assert_eq!(buf[0], 0x00);
        assert_eq!(buf[1], 1);
        assert_eq!(buf[2], 0xfc);
    }

    #[test]
    fn err_packet_layout_matches_spec() {
        let mut buf = BytesMut::new();
        ERRPacket {
            error_code: 1146,
            sql_state: "42S02".into(),
            error_message: "Table 'x' doesn't exist".into(),
        }
        .write(&mut buf);
        assert_eq!(buf[0], 0xff);
        assert_eq!(u16::from_le_bytes([buf[1], buf[2]]), 1146);
        assert_eq!(buf[3], b'#');
        assert_eq!(&buf[4..9], b"42S02");
    }

    #[test]
    fn text_row_encodes_null_as_marker_byte() {
        let mut buf = BytesMut::new();
        TextRow {
            values: vec![Some("a".into()), None],
        }
        .write(&mut buf);
        assert_eq!(buf[0], 1); // lenenc length of "a"
        assert_eq!(buf[1], b'a');
        assert_eq!(buf[2], NULL_MARKER);
    }
}
