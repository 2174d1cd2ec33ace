//! The mount/format/unmount lifecycle (§4.6).
//!
//! A device is either unformatted bytes, or a formatted-but-unmounted
//! image, or mounted and live behind a [`BlockLayer`]. This module is the
//! only place that state machine is enforced; once mounted, callers reach
//! `place`/`fetch`/`invalidate`/`stream_read` through [`Mount::layer`].

use std::sync::atomic::{AtomicBool, Ordering};

use log::info;
use parking_lot::RwLock;

use crate::block::Block;
use crate::block_layer::BlockLayer;
use crate::config::MountConfig;
use crate::device::BackingDevice;
use crate::error::{Error, Result};
use crate::param::{INODE_BLOCK_INDEX, NIL, RESERVED_BLOCKS, SUPERBLOCK_INDEX};
use crate::store::BlockStore;
use crate::superblock::{ListHeads, Superblock};

/// Owns the mount state machine. Exactly one `BlockLayer` exists while
/// mounted; `mount`/`unmount` swap it in and out under a write lock so
/// concurrent service calls only ever take the cheaper read lock.
pub struct Mount {
    layer: RwLock<Option<BlockLayer>>,
    mounting: AtomicBool,
}

impl Mount {
    pub fn new() -> Self {
        Mount { layer: RwLock::new(None), mounting: AtomicBool::new(false) }
    }

    /// Writes a fresh superblock, a zeroed inode block, and a fully linked
    /// free list spanning every remaining block. Does not mount; call
    /// `mount` afterward to start serving requests. Safe to call against
    /// an already-formatted device — prior contents are discarded.
    pub fn format(device: &dyn BackingDevice, config: MountConfig) -> Result<()> {
        config.validate().map_err(Error::InvalidConfig)?;
        if device.block_size() != config.block_size || device.nr_blocks() != config.nr_blocks {
            return Err(Error::InvalidConfig("device geometry does not match MountConfig"));
        }

        let capacity = config.data_capacity();
        let nr_blocks = config.nr_blocks as u32;

        let inode = Block::new_free(INODE_BLOCK_INDEX, capacity, NIL, NIL);
        let mut inode_buf = vec![0u8; config.block_size];
        crate::codec::serialize(&inode, &mut inode_buf);
        device.write_block(INODE_BLOCK_INDEX as usize, &inode_buf).map_err(|source| Error::IoFault { index: INODE_BLOCK_INDEX as i64, source })?;

        let first_data = RESERVED_BLOCKS;
        let last_data = nr_blocks - 1;
        for index in first_data..nr_blocks {
            let prev = if index == first_data { NIL } else { (index - 1) as i32 };
            let next = if index == last_data { NIL } else { (index + 1) as i32 };
            let block = Block::new_free(index, capacity, prev, next);
            let mut buf = vec![0u8; config.block_size];
            crate::codec::serialize(&block, &mut buf);
            device.write_block(index as usize, &buf).map_err(|source| Error::IoFault { index: index as i64, source })?;
        }

        let lists = if nr_blocks > first_data {
            ListHeads { free_first: first_data as i32, free_last: last_data as i32, used_first: NIL, used_last: NIL }
        } else {
            ListHeads::empty()
        };

        let superblock = Superblock::new(nr_blocks, lists);
        let mut sb_block = Block::new_free(SUPERBLOCK_INDEX, capacity, NIL, NIL);
        superblock.encode(&mut sb_block.payload);
        sb_block.data_size = sb_block.payload.len();
        let mut sb_buf = vec![0u8; config.block_size];
        crate::codec::serialize(&sb_block, &mut sb_buf);
        device.write_block(SUPERBLOCK_INDEX as usize, &sb_buf).map_err(|source| Error::IoFault { index: SUPERBLOCK_INDEX as i64, source })?;

        device.flush().map_err(|source| Error::IoFault { index: -1, source })?;
        info!("formatted device: {} blocks, {} bytes each", nr_blocks, config.block_size);
        Ok(())
    }

    /// Brings a previously formatted device online. Reads the superblock;
    /// if its magic does not match (unformatted device, or a crash that
    /// landed mid-checkpoint-write), falls back to [`BlockLayer::scrub`] to
    /// rebuild the lists from each block's own state.
    pub fn mount(&self, device: Box<dyn BackingDevice>, config: MountConfig) -> Result<()> {
        config.validate().map_err(Error::InvalidConfig)?;

        if self.mounting.swap(true, Ordering::AcqRel) {
            return Err(Error::AlreadyMounted);
        }
        // Reset the latch on any early return; the success path below
        // defuses the guard instead of letting it run.
        let latch = scopeguard::guard(&self.mounting, |mounting| {
            mounting.store(false, Ordering::Release);
        });
        let result = self.mount_inner(device, config)?;
        scopeguard::ScopeGuard::into_inner(latch);
        Ok(result)
    }

    fn mount_inner(&self, device: Box<dyn BackingDevice>, config: MountConfig) -> Result<()> {
        let mut slot = self.layer.write();
        if slot.is_some() {
            return Err(Error::AlreadyMounted);
        }

        let store = BlockStore::new(device, config);
        let sb_block = store.read_block(SUPERBLOCK_INDEX)?;
        let lists = match Superblock::decode(&sb_block.payload) {
            Some(sb) if sb.nr_blocks == config.nr_blocks as u32 => sb.lists,
            _ => {
                log::warn!("superblock missing or stale at mount; scrubbing");
                BlockLayer::scrub(&store)?
            }
        };

        *slot = Some(BlockLayer::new(store, lists));
        info!("mounted: {} blocks, {} bytes each", config.nr_blocks, config.block_size);
        Ok(())
    }

    /// Drains the layer (no new calls start once `unmount` begins; callers
    /// already in flight finish normally since this only takes a write
    /// lock after the prior read-lock holders release it) and writes a
    /// final checkpoint before tearing it down.
    pub fn unmount(&self) -> Result<()> {
        let mut slot = self.layer.write();
        let layer = slot.take().ok_or(Error::NotMounted)?;
        let result = layer.checkpoint();
        self.mounting.store(false, Ordering::Release);
        info!("unmounted");
        result
    }

    /// Runs `f` against the live layer. Returns [`Error::NotMounted`] if
    /// nothing is currently mounted.
    pub fn with_layer<R>(&self, f: impl FnOnce(&BlockLayer) -> Result<R>) -> Result<R> {
        let slot = self.layer.read();
        let layer = slot.as_ref().ok_or(Error::NotMounted)?;
        f(layer)
    }
}

impl Default for Mount {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DurabilityPolicy;
    use crate::device::MemoryDevice;

    fn config() -> MountConfig {
        MountConfig { block_size: 128, nr_blocks: 8, durability: DurabilityPolicy::WriteBack }
    }

    #[test]
    fn format_then_mount_then_place_and_fetch() {
        let device = MemoryDevice::new(128, 8);
        Mount::format(&device, config()).unwrap();

        let mount = Mount::new();
        mount.mount(Box::new(device), config()).unwrap();

        let index = mount.with_layer(|layer| layer.place(b"payload")).unwrap();
        let back = mount.with_layer(|layer| layer.fetch(index)).unwrap();
        assert_eq!(back, b"payload");
    }

    #[test]
    fn double_mount_rejected() {
        let device = MemoryDevice::new(128, 8);
        Mount::format(&device, config()).unwrap();
        let device2 = MemoryDevice::new(128, 8);
        Mount::format(&device2, config()).unwrap();

        let mount = Mount::new();
        mount.mount(Box::new(device), config()).unwrap();
        let err = mount.mount(Box::new(device2), config()).unwrap_err();
        assert!(matches!(err, Error::AlreadyMounted));
    }

    #[test]
    fn operations_before_mount_fail() {
        let mount = Mount::new();
        let err = mount.with_layer(|layer| layer.fetch(2)).unwrap_err();
        assert!(matches!(err, Error::NotMounted));
    }

    #[test]
    fn remounting_after_clean_unmount_preserves_data() {
        use crate::device::FileDevice;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device.img");
        let cfg = config();

        {
            let device = FileDevice::create(&path, cfg.block_size, cfg.nr_blocks).unwrap();
            Mount::format(&device, cfg).unwrap();
        }

        let index = {
            let device = FileDevice::open(&path, cfg.block_size, cfg.nr_blocks).unwrap();
            let mount = Mount::new();
            mount.mount(Box::new(device), cfg).unwrap();
            let index = mount.with_layer(|layer| layer.place(b"durable")).unwrap();
            mount.unmount().unwrap();
            index
        };

        let device = FileDevice::open(&path, cfg.block_size, cfg.nr_blocks).unwrap();
        let mount = Mount::new();
        mount.mount(Box::new(device), cfg).unwrap();
        let back = mount.with_layer(|layer| layer.fetch(index)).unwrap();
        assert_eq!(back, b"durable");
    }
}
