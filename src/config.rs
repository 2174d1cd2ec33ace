//! In-process configuration surface.
//!
//! Parsing these values out of a config file or CLI flags is the job of the
//! host collaborator; this crate only accepts the already-validated result.

use static_assertions::const_assert;

use crate::param::RESERVED_BLOCKS;

/// Fixed-size header written by the codec ahead of every block's payload.
/// See [`crate::codec`] for the exact field layout this accounts for.
pub const HEADER_SIZE: usize = core::mem::size_of::<crate::block::RawHeader>();

// A block must have room for the header plus at least one payload byte;
// `MountConfig::validate` re-checks this against the caller's actual
// `block_size` at runtime, but the header layout itself should never grow
// past a sane static bound regardless of configuration.
const_assert!(HEADER_SIZE <= 64);

/// Whether block-store writes are flushed to the backing device immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurabilityPolicy {
    /// Flush only at checkpoint boundaries and on unmount. Faster; relies on
    /// the mandatory mount-time scrub to repair any torn writes left by a
    /// crash between a move's sub-writes.
    WriteBack,
    /// Flush the device after every single block write. Slower; tightens
    /// the window in which a crash can leave an inconsistent list.
    WriteThrough,
}

impl Default for DurabilityPolicy {
    /// `WriteThrough` when the crate is built with the `write-through`
    /// feature (e.g. a future FFI binding with no runtime config surface to
    /// pass a `MountConfig` through), `WriteBack` otherwise. An in-process
    /// caller that builds its own `MountConfig` should set this field
    /// explicitly rather than rely on the feature default.
    fn default() -> Self {
        cfg_if::cfg_if! {
            if #[cfg(feature = "write-through")] {
                DurabilityPolicy::WriteThrough
            } else {
                DurabilityPolicy::WriteBack
            }
        }
    }
}

/// Geometry and policy needed to mount a block layer.
#[derive(Debug, Clone, Copy)]
pub struct MountConfig {
    /// Bytes per block, header included.
    pub block_size: usize,
    /// Total number of blocks on the device, including the two reserved
    /// blocks (superblock + inode).
    pub nr_blocks: usize,
    /// Durability policy for block-store writes.
    pub durability: DurabilityPolicy,
}

impl MountConfig {
    /// Validates geometry before it is handed to `mount`/`format`.
    ///
    /// Does not touch the device; it only checks internal consistency of the
    /// numbers themselves.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.block_size <= HEADER_SIZE {
            return Err("block_size must exceed the fixed header size");
        }
        if self.nr_blocks <= RESERVED_BLOCKS as usize {
            return Err("nr_blocks must leave room for at least one data block");
        }
        Ok(())
    }

    /// Bytes of payload a block can hold.
    pub fn data_capacity(&self) -> usize {
        self.block_size - HEADER_SIZE
    }
}
