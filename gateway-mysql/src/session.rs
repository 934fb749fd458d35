//! Per-connection session state (§3 Session, §9 sequence-ID discipline).
//! Grounded in spec.md's Session data-model entry; the teacher keeps an
//! equivalent `seq_id: u8` cursor directly on `MySQLProtocol`
//! (`protocol/mod.rs`) but spec.md requires it be per-connection, not
//! shared, so it lives on this struct instead.

use gateway_core::Catalog;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Sequence IDs are per-connection (§9). The spec mandates resetting to a
/// sentinel after the handshake's final OK so the first post-handshake
/// increment yields 0 for the first command — [`Session::begin_command`]
/// is the single place that reset happens.
pub struct SequenceCursor {
    next: u8,
}

impl SequenceCursor {
    pub fn new() -> Self {
        // 255 so that the handshake's wrapping +1 lands on 0 for the
        // first command packet, matching the spec's explicit sentinel.
        Self { next: 255 }
    }

    pub fn next(&mut self) -> u8 {
        let id = self.next;
        self.next = self.next.wrapping_add(1);
        id
    }

    pub fn observe(&mut self, seq_id: u8) {
        self.next = seq_id.wrapping_add(1);
    }

    /// Resets the cursor to 0 before the first response byte of a new
    /// command invocation (§4.3).
    pub fn reset(&mut self) {
        self.next = 0;
    }
}

impl Default for SequenceCursor {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Session {
    pub id: u64,
    pub user: String,
    pub current_db: Option<String>,
    pub capabilities: u32,
    pub charset: u8,
    pub seq: SequenceCursor,
    pub created_at: Instant,
    pub last_command_at: Instant,
    pub vars: HashMap<String, String>,
    pub catalog: Arc<Catalog>,
    pub cancel: CancellationToken,
}

impl Session {
    pub fn new(user: String, current_db: Option<String>, capabilities: u32, charset: u8, catalog: Arc<Catalog>) -> Self {
        let now = Instant::now();
        Self {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            user,
            current_db,
            capabilities,
            charset,
            seq: SequenceCursor::new(),
            created_at: now,
            last_command_at: now,
            vars: HashMap::new(),
            catalog,
            cancel: CancellationToken::new(),
        }
    }

    /// Resets the sequence cursor for a new command invocation and
    /// stamps `last_command_at` (§4.3).
    pub fn begin_command(&mut self) {
        self.seq.reset();
        self.last_command_at = Instant::now();
    }

    pub fn idle_for(&self) -> std::time::Duration {
        self.last_command_at.elapsed()
    }

    pub fn deprecates_eof(&self) -> bool {
        self.capabilities & crate::protocol::handshake::CLIENT_DEPRECATE_EOF != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_cursor_wraps_to_zero_after_handshake_sentinel() {
        let mut seq = SequenceCursor::new();
        assert_eq!(seq.next(), 255);
        assert_eq!(seq.next(), 0);
    }

    #[test]
    fn begin_command_resets_cursor_to_zero() {
        let mut seq = SequenceCursor::new();
        seq.next();
        seq.next();
        seq.reset();
        assert_eq!(seq.next(), 0);
        assert_eq!(seq.next(), 1);
    }

    #[test]
    fn observe_sets_next_from_an_incoming_packets_seq_id() {
        let mut seq = SequenceCursor::new();
        seq.observe(5);
        assert_eq!(seq.next(), 6);
    }
}
