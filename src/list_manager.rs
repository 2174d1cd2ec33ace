//! The free/used doubly-linked lists and the block-move algorithm (§4.3).
//!
//! Lists are stored entirely inside the blocks themselves (`prev`/`next`
//! fields) plus two head/tail pointer pairs kept in memory and checkpointed
//! into the superblock. A "move" takes a block out of one list and appends
//! it to the tail of the other; it is the only structural mutation in the
//! whole crate, and every one of `place`, `invalidate` and `format` goes
//! through it.

use parking_lot::Mutex;

use crate::block::Block;
use crate::concurrency::GraceBarrier;
use crate::error::{Error, Result};
use crate::param::NIL;
use crate::store::BlockStore;
use crate::superblock::ListHeads;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    Free,
    Used,
}

/// Outcome of a move, handed back to the caller so it can patch any
/// session cursor sitting on the moved block (§4.5) before it commits to
/// the new linkage.
pub struct MoveOutcome {
    /// The block's `next` pointer before the move (`NIL` if it was the
    /// list tail). This is what a cursor pointed at `index` must advance
    /// to so it keeps walking the list the block just left.
    pub old_next: i32,
}

pub struct ListManager {
    heads: Mutex<ListHeads>,
}

/// Accumulates pre-mutation snapshots of every block touched so far, in
/// write order, so a failure partway through a move can be undone by
/// replaying them in reverse.
struct Rollback(Vec<Block>);

impl Rollback {
    fn new() -> Self {
        Rollback(Vec::new())
    }

    fn record(&mut self, original: &Block) {
        self.0.push(original.clone());
    }

    /// Best-effort restore of every recorded snapshot, most-recent first.
    /// Returns `Ok(())` only if every write succeeded; a failure here means
    /// the on-disk state is of unknown consistency and the layer must stop
    /// accepting further structural mutations.
    fn undo(&self, store: &BlockStore) -> Result<()> {
        for snapshot in self.0.iter().rev() {
            store.write_block(snapshot)?;
        }
        Ok(())
    }
}

impl ListManager {
    pub fn new(heads: ListHeads) -> Self {
        ListManager { heads: Mutex::new(heads) }
    }

    pub fn heads(&self) -> ListHeads {
        *self.heads.lock()
    }

    fn heads_for(state: &ListHeads, kind: ListKind) -> (i32, i32) {
        match kind {
            ListKind::Free => (state.free_first, state.free_last),
            ListKind::Used => (state.used_first, state.used_last),
        }
    }

    fn set_heads_for(state: &mut ListHeads, kind: ListKind, first: i32, last: i32) {
        match kind {
            ListKind::Free => {
                state.free_first = first;
                state.free_last = last;
            }
            ListKind::Used => {
                state.used_first = first;
                state.used_last = last;
            }
        }
    }

    /// Returns the index at the head of `kind`'s list, if any, without
    /// removing it.
    pub fn peek_first(&self, kind: ListKind) -> Option<u32> {
        let (first, _) = Self::heads_for(&self.heads.lock(), kind);
        if first == NIL { None } else { Some(first as u32) }
    }

    /// Writes `block`, recording its pre-mutation form (`before`) into
    /// `rollback` first. On failure, unwinds everything recorded so far and
    /// returns either the original fault or [`Error::Degraded`] if the
    /// unwind itself could not complete.
    fn write_tracked(store: &BlockStore, rollback: &mut Rollback, before: &Block, after: &Block) -> Result<()> {
        rollback.record(before);
        if let Err(fault) = store.write_block(after) {
            return Err(match rollback.undo(store) {
                Ok(()) => fault,
                Err(_) => Error::Degraded,
            });
        }
        Ok(())
    }

    /// Moves the block at `index` (currently linked into `from`) to the
    /// tail of `to`. Blocks until any reader whose traversal began before
    /// the call has finished (`grace.wait_grace`), so no reader ever
    /// observes the block half-relinked.
    ///
    /// On an I/O fault partway through, attempts to restore every block
    /// already rewritten to its pre-move contents; if that rollback write
    /// also fails the layer reports [`Error::Degraded`] rather than leave
    /// an unknown-consistency list on disk.
    pub fn move_block(
        &self,
        store: &BlockStore,
        grace: &GraceBarrier,
        index: u32,
        from: ListKind,
        to: ListKind,
    ) -> Result<MoveOutcome> {
        self.move_block_with(store, grace, index, from, to, |_| {})
    }

    /// Same as [`Self::move_block`], but `mutate` runs on the block's new
    /// linkage just before the single rewrite in step 4 — the hook `place`
    /// uses to stage the caller's payload into the same write that moves
    /// the block onto the used list, and `invalidate` uses to clear it.
    pub fn move_block_with(
        &self,
        store: &BlockStore,
        grace: &GraceBarrier,
        index: u32,
        from: ListKind,
        to: ListKind,
        mutate: impl FnOnce(&mut Block),
    ) -> Result<MoveOutcome> {
        let block = store.read_block(index)?;
        let (prev, next) = (block.prev, block.next);
        let mut rollback = Rollback::new();

        // Steps 1-2: unlink B from `from` by updating its neighbors (or the
        // list head/tail, patched into memory further down).
        if prev != NIL {
            let p = store.read_block(prev as u32)?;
            let mut updated = p.clone();
            updated.next = next;
            Self::write_tracked(store, &mut rollback, &p, &updated)?;
        }
        if next != NIL {
            let n = store.read_block(next as u32)?;
            let mut updated = n.clone();
            updated.prev = prev;
            Self::write_tracked(store, &mut rollback, &n, &updated)?;
        }

        let mut heads = self.heads.lock();
        let (from_first, from_last) = Self::heads_for(&heads, from);
        let new_from_first = if from_first == index as i32 { next } else { from_first };
        let new_from_last = if from_last == index as i32 { prev } else { from_last };

        // Step 3: wait for readers that might still be mid-traversal
        // through B's old linkage before B itself changes shape.
        if let Err(e) = grace.wait_grace() {
            drop(heads);
            let _ = rollback.undo(store);
            return Err(e);
        }

        // Step 4: rewrite B onto the tail of `to`.
        let (to_first, to_last) = Self::heads_for(&heads, to);
        let mut moved = block.clone();
        moved.prev = to_last;
        moved.next = NIL;
        if to == ListKind::Free {
            moved.clear_payload();
        }
        mutate(&mut moved);
        Self::write_tracked(store, &mut rollback, &block, &moved)?;

        // Step 5: link the old tail of `to` forward to B.
        if to_last != NIL {
            let old_tail = store.read_block(to_last as u32)?;
            let mut updated = old_tail.clone();
            updated.next = index as i32;
            Self::write_tracked(store, &mut rollback, &old_tail, &updated)?;
        }

        let new_to_first = if to_first == NIL { index as i32 } else { to_first };
        let new_to_last = index as i32;

        Self::set_heads_for(&mut heads, from, new_from_first, new_from_last);
        Self::set_heads_for(&mut heads, to, new_to_first, new_to_last);

        Ok(MoveOutcome { old_next: next })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DurabilityPolicy, MountConfig};
    use crate::device::MemoryDevice;

    const BLOCK_SIZE: usize = 128;
    const NR_BLOCKS: usize = 8;

    fn fresh_store() -> BlockStore {
        let config = MountConfig { block_size: BLOCK_SIZE, nr_blocks: NR_BLOCKS, durability: DurabilityPolicy::WriteBack };
        let store = BlockStore::new(Box::new(MemoryDevice::new(BLOCK_SIZE, NR_BLOCKS)), config);
        // Lay out a 4-block chain [2,3,4,5] on the free list, 2 reserved.
        let capacity = config.data_capacity();
        let chain: Vec<(u32, i32, i32)> = vec![(2, NIL, 3), (3, 2, 4), (4, 3, 5), (5, 4, NIL)];
        for (index, prev, next) in chain {
            let block = Block::new_free(index, capacity, prev, next);
            store.write_block(&block).unwrap();
        }
        store
    }

    #[test]
    fn moves_middle_block_from_free_to_used() {
        let store = fresh_store();
        let grace = GraceBarrier::new();
        let lists = ListManager::new(ListHeads { free_first: 2, free_last: 5, used_first: NIL, used_last: NIL });

        let outcome = lists.move_block(&store, &grace, 3, ListKind::Free, ListKind::Used).unwrap();
        assert_eq!(outcome.old_next, 4);

        let p = store.read_block(2).unwrap();
        assert_eq!(p.next, 4);
        let n = store.read_block(4).unwrap();
        assert_eq!(n.prev, 2);

        let moved = store.read_block(3).unwrap();
        assert_eq!(moved.prev, NIL);
        assert_eq!(moved.next, NIL);

        let heads = lists.heads();
        assert_eq!(heads.free_first, 2);
        assert_eq!(heads.free_last, 5);
        assert_eq!(heads.used_first, 3);
        assert_eq!(heads.used_last, 3);
    }

    #[test]
    fn moves_head_block_and_updates_list_head() {
        let store = fresh_store();
        let grace = GraceBarrier::new();
        let lists = ListManager::new(ListHeads { free_first: 2, free_last: 5, used_first: NIL, used_last: NIL });

        lists.move_block(&store, &grace, 2, ListKind::Free, ListKind::Used).unwrap();

        let heads = lists.heads();
        assert_eq!(heads.free_first, 3);
        let new_head = store.read_block(3).unwrap();
        assert_eq!(new_head.prev, NIL);
    }

    #[test]
    fn appends_to_nonempty_target_tail() {
        let store = fresh_store();
        let grace = GraceBarrier::new();
        let lists = ListManager::new(ListHeads { free_first: 2, free_last: 5, used_first: NIL, used_last: NIL });

        lists.move_block(&store, &grace, 2, ListKind::Free, ListKind::Used).unwrap();
        lists.move_block(&store, &grace, 3, ListKind::Free, ListKind::Used).unwrap();

        let first_used = store.read_block(2).unwrap();
        assert_eq!(first_used.next, 3);
        let second_used = store.read_block(3).unwrap();
        assert_eq!(second_used.prev, 2);

        let heads = lists.heads();
        assert_eq!(heads.used_first, 2);
        assert_eq!(heads.used_last, 3);
    }
}
