//! Crate-wide constants describing the fixed on-disk layout.

/// Sentinel marking "no block" in a `prev`/`next` link or a list head.
pub const NIL: i32 = -1;

/// Block 0 always holds the superblock.
pub const SUPERBLOCK_INDEX: u32 = 0;

/// Block 1 always holds the host single-file inode metadata. Opaque to the
/// block layer; reserved so it is never handed out by `place`.
pub const INODE_BLOCK_INDEX: u32 = 1;

/// Number of blocks reserved at the head of the device (superblock + inode).
pub const RESERVED_BLOCKS: u32 = 2;

/// Magic number stamped into the superblock at format time.
pub const SUPERBLOCK_MAGIC: u64 = 0x4242_4242;
