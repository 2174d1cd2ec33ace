//! The superblock (§3, §4.6): block 0's checkpoint of the four list heads.
//!
//! Re-derivable at mount time by a full scan if the stored copy is missing
//! or stale (see [`crate::block_layer::BlockLayer::scrub`]), so this layout
//! carries only what a scrub cannot cheaply reconstruct on its own: the
//! magic number used to tell a formatted device from an unformatted one.

use zerocopy::{AsBytes, FromBytes};

use crate::param::{NIL, SUPERBLOCK_MAGIC};

/// Byte-exact layout stamped into block 0's payload.
#[repr(C)]
#[derive(Debug, Clone, Copy, AsBytes, FromBytes)]
pub struct RawSuperblock {
    pub magic: u64,
    pub nr_blocks: u32,
    _reserved: u32,
    pub free_first: i32,
    pub free_last: i32,
    pub used_first: i32,
    pub used_last: i32,
}

/// In-memory view of the four list heads the list manager mutates and the
/// superblock checkpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListHeads {
    pub free_first: i32,
    pub free_last: i32,
    pub used_first: i32,
    pub used_last: i32,
}

impl ListHeads {
    pub fn empty() -> Self {
        ListHeads { free_first: NIL, free_last: NIL, used_first: NIL, used_last: NIL }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Superblock {
    pub nr_blocks: u32,
    pub lists: ListHeads,
}

impl Superblock {
    pub fn new(nr_blocks: u32, lists: ListHeads) -> Self {
        Superblock { nr_blocks, lists }
    }

    /// Writes this superblock's fields into `payload`'s prefix. `payload`
    /// must be at least `size_of::<RawSuperblock>()` bytes (the block
    /// store's data capacity, which is always far larger).
    pub fn encode(&self, payload: &mut [u8]) {
        let raw = RawSuperblock {
            magic: SUPERBLOCK_MAGIC,
            nr_blocks: self.nr_blocks,
            _reserved: 0,
            free_first: self.lists.free_first,
            free_last: self.lists.free_last,
            used_first: self.lists.used_first,
            used_last: self.lists.used_last,
        };
        let wrote = raw.write_to_prefix(payload);
        debug_assert!(wrote.is_some(), "payload too small for RawSuperblock");
    }

    /// Decodes a superblock from `payload`, returning `None` if the magic
    /// number does not match (an unformatted or corrupt device) — the
    /// signal that callers should fall back to [`crate::block_layer::BlockLayer::scrub`].
    pub fn decode(payload: &[u8]) -> Option<Self> {
        let raw = RawSuperblock::read_from_prefix(payload)?;
        if raw.magic != SUPERBLOCK_MAGIC {
            return None;
        }
        Some(Superblock {
            nr_blocks: raw.nr_blocks,
            lists: ListHeads {
                free_first: raw.free_first,
                free_last: raw.free_last,
                used_first: raw.used_first,
                used_last: raw.used_last,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let sb = Superblock::new(128, ListHeads { free_first: 2, free_last: 127, used_first: NIL, used_last: NIL });
        let mut buf = vec![0u8; 64];
        sb.encode(&mut buf);
        let back = Superblock::decode(&buf).expect("valid magic");
        assert_eq!(back.nr_blocks, 128);
        assert_eq!(back.lists.free_first, 2);
        assert_eq!(back.lists.free_last, 127);
        assert_eq!(back.lists.used_first, NIL);
    }

    #[test]
    fn rejects_bad_magic() {
        let buf = vec![0u8; 64];
        assert!(Superblock::decode(&buf).is_none());
    }
}
