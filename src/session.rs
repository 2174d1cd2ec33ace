//! Per-session streaming-read state (§4.5, §6).
//!
//! A session is the unit `stream_read` is called against, repeatedly, to
//! walk the used list from wherever the previous call left off. Sessions
//! are registered so that `invalidate` can patch a cursor that is sitting
//! on the block being pulled out of the used list, without either side
//! holding the other's lock across a block I/O.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::concurrency::GraceBarrier;
use crate::param::NIL;

pub type SessionId = u64;

/// A single stream-read cursor. Every field here is private to the owning
/// session except through the registry's patch methods, which take the
/// per-session lock.
#[derive(Debug, Clone, Copy)]
pub struct Cursor {
    /// Index of the block the next `stream_read` call should resume from,
    /// or `NIL` once the walk has reached the end of the used list.
    pub next_block_index: i32,
    /// Byte offset, in the concatenated-payload stream, at which
    /// `next_block_index`'s payload begins. Compared against the caller's
    /// `file_offset` to detect a backward seek, which forces a
    /// reinitialization of the walk from `Used.first`.
    pub stream_cursor: u64,
    /// Whether any call has happened yet in this session.
    pub started: bool,
}

impl Cursor {
    fn fresh() -> Self {
        Cursor { next_block_index: NIL, stream_cursor: 0, started: false }
    }
}

struct SessionEntry {
    cursor: Mutex<Cursor>,
}

/// Tracks every open session's cursor and provides the grace-period barrier
/// `invalidate` must drain before it can safely conclude no cursor still
/// points at the block it just pulled off the used list.
pub struct SessionRegistry {
    next_id: AtomicU64,
    sessions: Mutex<HashMap<SessionId, SessionEntry>>,
    pub barrier: GraceBarrier,
}

impl SessionRegistry {
    pub fn new() -> Self {
        SessionRegistry {
            next_id: AtomicU64::new(1),
            sessions: Mutex::new(HashMap::new()),
            barrier: GraceBarrier::new(),
        }
    }

    pub fn open(&self) -> SessionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.sessions.lock().insert(id, SessionEntry { cursor: Mutex::new(Cursor::fresh()) });
        id
    }

    /// Removes `id`'s cursor. Waits out a grace period on the same barrier
    /// `stream_read`/`invalidate` use for this registry first, so a
    /// `stream_read` call already in flight against this session finishes
    /// reading its cursor before the entry disappears out from under it.
    pub fn close(&self, id: SessionId) {
        let _ = self.barrier.wait_grace();
        self.sessions.lock().remove(&id);
    }

    /// Runs `f` with exclusive access to `id`'s cursor. Returns `None` if
    /// the session has been closed.
    pub fn with_cursor<R>(&self, id: SessionId, f: impl FnOnce(&mut Cursor) -> R) -> Option<R> {
        let sessions = self.sessions.lock();
        let entry = sessions.get(&id)?;
        let mut cursor = entry.cursor.lock();
        Some(f(&mut cursor))
    }

    /// Called by `invalidate` before it moves a block out of the used list:
    /// every open cursor currently pointing at `block_index` is advanced to
    /// `replacement` (the block's former `next`, or `NIL` if it was the
    /// tail). `stream_cursor` is bumped by `block_data_size` — the
    /// invalidated block's full contribution to the stream, whether or not
    /// any of it had already been read — so it still names the logical
    /// offset at which `next_block_index` begins. Skipping this bump would
    /// leave a cursor parked mid-block believing its successor starts where
    /// the invalidated block started, and wrongly skip the successor.
    pub fn patch_cursors_pointing_at(&self, block_index: i32, replacement: i32, block_data_size: u64) {
        let sessions = self.sessions.lock();
        for entry in sessions.values() {
            let mut cursor = entry.cursor.lock();
            if cursor.next_block_index == block_index {
                cursor.next_block_index = replacement;
                cursor.stream_cursor += block_data_size;
            }
        }
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_close_round_trip() {
        let reg = SessionRegistry::new();
        let id = reg.open();
        assert!(reg.with_cursor(id, |_| ()).is_some());
        reg.close(id);
        assert!(reg.with_cursor(id, |_| ()).is_none());
    }

    #[test]
    fn patch_redirects_matching_cursors_only() {
        let reg = SessionRegistry::new();
        let a = reg.open();
        let b = reg.open();
        reg.with_cursor(a, |c| {
            c.next_block_index = 5;
            c.stream_cursor = 10;
        });
        reg.with_cursor(b, |c| c.next_block_index = 9);

        reg.patch_cursors_pointing_at(5, 7, 6);

        assert_eq!(reg.with_cursor(a, |c| c.next_block_index).unwrap(), 7);
        assert_eq!(reg.with_cursor(a, |c| c.stream_cursor).unwrap(), 16);
        assert_eq!(reg.with_cursor(b, |c| c.next_block_index).unwrap(), 9);
    }
}
