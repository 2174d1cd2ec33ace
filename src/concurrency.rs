//! SRCU-style grace-period coordination (§5, Design Notes).
//!
//! Two independent [`GraceBarrier`]s are kept: one guarding block-list
//! traversal (`fetch`/`invalidate`/`stream_read`'s list walks versus
//! `place`'s moves) and one guarding the session/cursor list (`stream_read`'s
//! cursor lookups versus `invalidate`'s cursor patching). A reader that
//! began before a writer's `wait_grace` call is guaranteed to finish before
//! the writer rewrites the block it is, or might be, looking at; a reader
//! that begins after sees the writer's new state. There is no reader
//! starvation of the writer: only one grace period is ever awaited per
//! `wait_grace` call and readers never block other readers.
//!
//! Modeled on the teacher's sleepable-lock pattern (a spinlock-shaped
//! mutex paired with a wait channel) rather than any literal epoch
//! reclaimer, since reference ref-counted arenas here (`rcpool`) do not.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Condvar, Mutex};

use crate::error::{Error, Result};

struct GraceState {
    epoch: usize,
    /// Count of readers that entered each of the two epoch slots.
    counts: [u64; 2],
}

/// A two-slot epoch barrier. `begin_read`/`end_read` bracket a single
/// traversal; `wait_grace` blocks until every reader that began before the
/// call has called `end_read`.
pub struct GraceBarrier {
    state: Mutex<GraceState>,
    drained: Condvar,
    cancelled: AtomicBool,
}

/// Proof that a read section is open; must be passed back to `end_read`.
#[derive(Debug, Clone, Copy)]
pub struct ReadToken(usize);

impl GraceBarrier {
    pub fn new() -> Self {
        GraceBarrier {
            state: Mutex::new(GraceState { epoch: 0, counts: [0, 0] }),
            drained: Condvar::new(),
            cancelled: AtomicBool::new(false),
        }
    }

    /// Marks a read section as entered. Never blocks.
    pub fn begin_read(&self) -> ReadToken {
        let mut st = self.state.lock();
        let slot = st.epoch % 2;
        st.counts[slot] += 1;
        ReadToken(st.epoch)
    }

    /// Marks the read section named by `token` as exited. Wakes a writer
    /// that may be waiting in `wait_grace` for this slot to drain.
    pub fn end_read(&self, token: ReadToken) {
        let mut st = self.state.lock();
        let slot = token.0 % 2;
        debug_assert!(st.counts[slot] > 0);
        st.counts[slot] -= 1;
        if st.counts[slot] == 0 {
            self.drained.notify_all();
        }
    }

    /// Flips the epoch and blocks until every reader that was in the old
    /// epoch's slot has called `end_read`. Readers that call `begin_read`
    /// after the flip land in the new slot and do not delay this call.
    ///
    /// Returns `Err(Error::Interrupted)` if [`Self::cancel`] is called while
    /// waiting (used to unstick a grace wait during forced unmount).
    pub fn wait_grace(&self) -> Result<()> {
        let mut st = self.state.lock();
        let old_slot = st.epoch % 2;
        st.epoch = st.epoch.wrapping_add(1);
        while st.counts[old_slot] != 0 {
            if self.cancelled.load(Ordering::Acquire) {
                return Err(Error::Interrupted);
            }
            self.drained.wait(&mut st);
        }
        Ok(())
    }

    /// Unsticks any in-progress `wait_grace` call. Used once, during forced
    /// unmount, to bound shutdown latency in the presence of a wedged reader.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        self.drained.notify_all();
    }
}

impl Default for GraceBarrier {
    fn default() -> Self {
        Self::new()
    }
}

/// Enforces the single-writer rule (§5: "place/invalidate/checkpoint/mount
/// structural mutations are serialized"). A thin wrapper over a mutex so the
/// intent reads clearly at call sites instead of a bare `Mutex<()>`.
pub struct WriterLock {
    inner: Mutex<()>,
}

impl WriterLock {
    pub fn new() -> Self {
        WriterLock { inner: Mutex::new(()) }
    }

    pub fn lock(&self) -> parking_lot::MutexGuard<'_, ()> {
        self.inner.lock()
    }
}

impl Default for WriterLock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn grace_waits_for_outstanding_reader() {
        let barrier = Arc::new(GraceBarrier::new());
        let token = barrier.begin_read();

        let barrier2 = Arc::clone(&barrier);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            barrier2.end_read(token);
        });

        barrier.wait_grace().expect("not cancelled");
        handle.join().unwrap();
    }

    #[test]
    fn grace_returns_immediately_with_no_readers() {
        let barrier = GraceBarrier::new();
        barrier.wait_grace().expect("not cancelled");
    }

    #[test]
    fn new_reader_in_next_epoch_does_not_block_current_wait() {
        let barrier = GraceBarrier::new();
        let t1 = barrier.begin_read();
        // A reader that begins after the epoch flip belongs to the new slot.
        barrier.end_read(t1);
        barrier.wait_grace().expect("not cancelled");
        let t2 = barrier.begin_read();
        barrier.end_read(t2);
    }
}
