//! The service surface (§4.4, §4.5): `place`, `fetch`, `invalidate`,
//! `stream_read`, plus the `checkpoint` and mount-time `scrub` that keep the
//! superblock's list heads trustworthy across crashes.

use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, trace, warn};

use crate::block::Block;
use crate::concurrency::{GraceBarrier, WriterLock};
use crate::config::MountConfig;
use crate::error::{Error, Result};
use crate::list_manager::{ListKind, ListManager};
use crate::param::{NIL, RESERVED_BLOCKS};
use crate::session::{SessionId, SessionRegistry};
use crate::store::BlockStore;
use crate::superblock::{ListHeads, Superblock};

/// Ties the block store, the free/used lists, and session tracking together
/// behind the four primitives callers actually use. One `BlockLayer` is
/// built per mount; `mount::Mount` owns its lifecycle.
pub struct BlockLayer {
    store: BlockStore,
    lists: ListManager,
    list_barrier: GraceBarrier,
    sessions: SessionRegistry,
    writer: WriterLock,
    degraded: AtomicBool,
}

impl BlockLayer {
    pub(crate) fn new(store: BlockStore, lists: ListHeads) -> Self {
        BlockLayer {
            store,
            lists: ListManager::new(lists),
            list_barrier: GraceBarrier::new(),
            sessions: SessionRegistry::new(),
            writer: WriterLock::new(),
            degraded: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &MountConfig {
        self.store.config()
    }

    fn check_healthy(&self) -> Result<()> {
        if self.degraded.load(Ordering::Acquire) {
            return Err(Error::Degraded);
        }
        Ok(())
    }

    fn mark_degraded_if(&self, err: Error) -> Error {
        if matches!(err, Error::Degraded) {
            self.degraded.store(true, Ordering::Release);
            warn!("block layer entering degraded state after failed rollback");
        }
        err
    }

    /// Appends `data` to the used list, returning the index of the block it
    /// now occupies. Fails with [`Error::NoSpace`] if the free list is
    /// empty, or [`Error::PayloadTooLarge`] if `data` exceeds the
    /// configured block capacity.
    pub fn place(&self, data: &[u8]) -> Result<u32> {
        self.check_healthy()?;
        let capacity = self.config().data_capacity();
        if data.len() > capacity {
            return Err(Error::PayloadTooLarge { size: data.len(), capacity });
        }

        let _writer = self.writer.lock();
        let index = self.lists.peek_first(ListKind::Free).ok_or(Error::NoSpace)?;

        self.lists
            .move_block_with(&self.store, &self.list_barrier, index, ListKind::Free, ListKind::Used, |b| {
                b.stage_payload(data);
            })
            .map_err(|e| self.mark_degraded_if(e))?;

        self.checkpoint()?;
        trace!("placed {} bytes into block {}", data.len(), index);
        Ok(index)
    }

    /// Returns the payload currently stored at `index`. Fails with
    /// [`Error::NoData`] if the block is not on the used list.
    pub fn fetch(&self, index: u32) -> Result<Vec<u8>> {
        self.check_healthy()?;
        let token = self.list_barrier.begin_read();
        let result = self.store.read_block(index);
        self.list_barrier.end_read(token);

        let block = result?;
        if !block.is_valid() {
            return Err(Error::NoData { index: index as i64 });
        }
        Ok(block.payload[..block.data_size].to_vec())
    }

    /// Moves the block at `index` from the used list back to the free
    /// list. Any open session whose cursor is sitting on `index` is
    /// advanced past it first, so `stream_read` never returns a block that
    /// is no longer in the used list.
    pub fn invalidate(&self, index: u32) -> Result<()> {
        self.check_healthy()?;
        if index < RESERVED_BLOCKS {
            return Err(Error::OutOfRange { index: index as i64, nr_blocks: self.config().nr_blocks as u32 });
        }
        let _writer = self.writer.lock();

        let block = self.store.read_block(index)?;
        if !block.is_valid() {
            return Err(Error::NoData { index: index as i64 });
        }

        let outcome = self
            .lists
            .move_block(&self.store, &self.list_barrier, index, ListKind::Used, ListKind::Free)
            .map_err(|e| self.mark_degraded_if(e))?;

        // Patch cursors only after the grace period inside move_block has
        // already elapsed for the block-list barrier; draining the session
        // barrier here additionally ensures no in-flight stream_read call
        // is still reading the old linkage off of a stale cursor value.
        // `block.data_size` is B's full contribution to the stream as it
        // stood before this call, so a cursor parked on B is treated as
        // having consumed all of it, partially-read or not.
        self.sessions.patch_cursors_pointing_at(index as i32, outcome.old_next, block.data_size as u64);
        self.sessions.barrier.wait_grace()?;

        self.checkpoint()?;
        trace!("invalidated block {}", index);
        Ok(())
    }

    /// Opens a new streaming-read session positioned before the head of
    /// the used list.
    pub fn open_session(&self) -> SessionId {
        self.sessions.open()
    }

    pub fn close_session(&self, id: SessionId) {
        self.sessions.close(id);
    }

    /// Presents the concatenation of every currently-`Valid` block's
    /// payload, in used-list order, as a byte stream, copying into `out`
    /// starting at `*file_offset` and advancing it by the number of bytes
    /// copied. Returns that count; `0` means the walk reached the end of
    /// the used list with nothing left to deliver.
    ///
    /// `*file_offset` moving backward relative to the session's last call
    /// reinitializes the walk from `Used.first`; moving forward within the
    /// same call is handled by skipping whole blocks that lie entirely
    /// before it. Grounded on the reference reader's cursor/stream-offset
    /// state machine.
    pub fn stream_read(&self, session: SessionId, out: &mut [u8], file_offset: &mut u64) -> Result<usize> {
        self.check_healthy()?;
        let token = self.sessions.barrier.begin_read();
        let outcome = self.stream_read_locked(session, out, file_offset);
        self.sessions.barrier.end_read(token);
        outcome
    }

    fn stream_read_locked(&self, session: SessionId, out: &mut [u8], file_offset: &mut u64) -> Result<usize> {
        let (mut next_index, mut stream_cursor) = self
            .sessions
            .with_cursor(session, |cursor| {
                let seeked_backward = cursor.started && *file_offset < cursor.stream_cursor;
                if !cursor.started || seeked_backward {
                    cursor.started = true;
                    cursor.next_block_index = self.lists.peek_first(ListKind::Used).map(|i| i as i32).unwrap_or(NIL);
                    cursor.stream_cursor = 0;
                }
                (cursor.next_block_index, cursor.stream_cursor)
            })
            .ok_or(Error::NotMounted)?;

        let mut bytes_read = 0usize;

        while bytes_read < out.len() && next_index != NIL {
            let list_token = self.list_barrier.begin_read();
            let block = self.store.read_block(next_index as u32);
            self.list_barrier.end_read(list_token);
            let block = match block {
                Ok(b) => b,
                // A block I/O fault ends the read early with whatever has
                // already been copied, per the no-structural-failure rule.
                Err(_) => break,
            };

            if !block.is_valid() {
                // The cursor outran a concurrent invalidation that has not
                // yet patched it (the patch always wins the race once the
                // writer's grace period elapses); stop here rather than
                // guess at stale linkage.
                break;
            }

            let block_start = stream_cursor;
            let block_end = block_start + block.data_size as u64;

            if block_end <= *file_offset {
                // Entirely before the requested offset: contributes no
                // bytes, but still advances the walk.
                stream_cursor = block_end;
                next_index = block.next;
                continue;
            }

            let skip_in_block = file_offset.saturating_sub(block_start) as usize;
            let available = block.data_size - skip_in_block;
            let want = out.len() - bytes_read;
            let take = available.min(want);

            out[bytes_read..bytes_read + take].copy_from_slice(&block.payload[skip_in_block..skip_in_block + take]);
            bytes_read += take;
            *file_offset += take as u64;

            if skip_in_block + take == block.data_size {
                stream_cursor = block_end;
                next_index = block.next;
            }
            // else: out was exhausted mid-block; stay on this block so the
            // next call resumes where this one left off.
        }

        self.sessions.with_cursor(session, |cursor| {
            cursor.next_block_index = next_index;
            cursor.stream_cursor = stream_cursor;
        });

        Ok(bytes_read)
    }

    /// Rewrites the superblock with the current in-memory list heads.
    /// Called after every structural mutation; always flushes regardless
    /// of durability policy so a crash never sees a superblock older than
    /// the lists it describes diverge from by more than one unflushed move.
    pub fn checkpoint(&self) -> Result<()> {
        let mut sb_block = self.store.read_block(crate::param::SUPERBLOCK_INDEX)?;
        let superblock = Superblock::new(self.config().nr_blocks as u32, self.lists.heads());
        superblock.encode(&mut sb_block.payload);
        sb_block.data_size = sb_block.payload.len();
        self.store.write_block(&sb_block)?;
        self.store.flush()
    }

    /// Walks every block on the device and rebuilds the free/used lists
    /// from each block's own `state`, ignoring whatever the stored
    /// superblock claims, and rewrites every block's `prev`/`next` to match
    /// the rebuilt chain order (a torn move can leave stale links even
    /// though `state` itself is always set atomically with the rest of a
    /// block's header). Used at mount time when the superblock is missing
    /// or its magic does not match — the signature of a crash that landed
    /// between two sub-writes of a move.
    pub fn scrub(store: &BlockStore) -> Result<ListHeads> {
        let nr_blocks = store.nr_blocks();
        let mut blocks: Vec<Block> = Vec::with_capacity(nr_blocks as usize);
        for index in RESERVED_BLOCKS..nr_blocks {
            blocks.push(store.read_block(index)?);
        }

        let mut free_chain: Vec<i32> = Vec::new();
        let mut used_chain: Vec<i32> = Vec::new();
        for block in &blocks {
            if block.is_valid() {
                used_chain.push(block.index as i32);
            } else {
                free_chain.push(block.index as i32);
            }
        }

        for block in &mut blocks {
            let chain = if block.is_valid() { &used_chain } else { &free_chain };
            let pos = chain.iter().position(|&i| i == block.index as i32).expect("block listed in its own chain");
            block.prev = if pos == 0 { NIL } else { chain[pos - 1] };
            block.next = chain.get(pos + 1).copied().unwrap_or(NIL);
            store.write_block(block)?;
        }

        let heads = ListHeads {
            free_first: free_chain.first().copied().unwrap_or(NIL),
            free_last: free_chain.last().copied().unwrap_or(NIL),
            used_first: used_chain.first().copied().unwrap_or(NIL),
            used_last: used_chain.last().copied().unwrap_or(NIL),
        };
        debug!(
            "scrub rebuilt lists: free=[{},{}] used=[{},{}]",
            heads.free_first, heads.free_last, heads.used_first, heads.used_last
        );
        Ok(heads)
    }
}
