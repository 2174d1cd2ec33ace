//! The block store (§4.2): bounds-checked, codec-aware access to the
//! backing device.
//!
//! `BlockStore` owns the device and knows nothing about free/used lists or
//! sessions — it is purely "read block N, write block N", with the one
//! piece of policy the rest of the layer relies on: honoring the
//! configured [`DurabilityPolicy`].

use crate::block::Block;
use crate::config::{DurabilityPolicy, MountConfig};
use crate::device::BackingDevice;
use crate::error::{Error, Result};

pub struct BlockStore {
    device: Box<dyn BackingDevice>,
    config: MountConfig,
}

impl BlockStore {
    pub fn new(device: Box<dyn BackingDevice>, config: MountConfig) -> Self {
        BlockStore { device, config }
    }

    pub fn config(&self) -> &MountConfig {
        &self.config
    }

    pub fn nr_blocks(&self) -> u32 {
        self.config.nr_blocks as u32
    }

    fn check_range(&self, index: u32) -> Result<()> {
        if index as usize >= self.config.nr_blocks {
            return Err(Error::OutOfRange {
                index: index as i64,
                nr_blocks: self.config.nr_blocks as u32,
            });
        }
        Ok(())
    }

    /// Reads and decodes the block at `index`.
    pub fn read_block(&self, index: u32) -> Result<Block> {
        self.check_range(index)?;
        let mut buf = vec![0u8; self.config.block_size];
        self.device
            .read_block(index as usize, &mut buf)
            .map_err(|source| Error::IoFault { index: index as i64, source })?;
        Ok(crate::codec::deserialize(&buf, self.config.data_capacity()))
    }

    /// Encodes and writes `block` back to its own index, flushing
    /// immediately if the durability policy is [`DurabilityPolicy::WriteThrough`].
    pub fn write_block(&self, block: &Block) -> Result<()> {
        self.check_range(block.index)?;
        let mut buf = vec![0u8; self.config.block_size];
        crate::codec::serialize(block, &mut buf);
        self.device
            .write_block(block.index as usize, &buf)
            .map_err(|source| Error::IoFault { index: block.index as i64, source })?;
        if self.config.durability == DurabilityPolicy::WriteThrough {
            self.flush()?;
        }
        Ok(())
    }

    /// Unconditional flush, used at checkpoint boundaries and on unmount
    /// regardless of durability policy.
    pub fn flush(&self) -> Result<()> {
        self.device
            .flush()
            .map_err(|source| Error::IoFault { index: -1, source })
    }
}
