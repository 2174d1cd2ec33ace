//! The in-memory block representation and its fixed on-disk header.
//!
//! `RawHeader` is the byte-exact layout the codec (§4.1) reads and writes;
//! `Block` is the transient, owned snapshot handed to and returned from
//! callers. Mutating a `Block` never touches the device — only
//! `BlockStore::write_block` does that.

use zerocopy::{AsBytes, FromBytes};

use crate::param::NIL;

/// Whether a block currently carries payload a caller asked us to keep, or
/// is sitting on the free list waiting to be reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockState {
    Invalid,
    Valid,
}

impl BlockState {
    fn to_u8(self) -> u8 {
        match self {
            BlockState::Invalid => 0,
            BlockState::Valid => 1,
        }
    }

    /// Any value other than the `Valid` tag is treated as `Invalid`, per the
    /// data model's rule that an unset post-format state reads as invalid.
    fn from_u8(v: u8) -> Self {
        if v == 1 {
            BlockState::Valid
        } else {
            BlockState::Invalid
        }
    }
}

/// Byte-exact header layout, written in this field order ahead of the
/// payload. Field widths and host endianness are fixed; the device is never
/// shared across architectures.
#[repr(C)]
#[derive(Debug, Clone, Copy, AsBytes, FromBytes)]
pub struct RawHeader {
    pub data_size: u64,
    pub data_capacity: u64,
    pub header_size: u64,
    pub index: i64,
    pub state: u8,
    _reserved: [u8; 7],
    pub prev: i32,
    pub next: i32,
}

/// A deserialized snapshot of one block: header fields plus payload bytes.
///
/// This is a value type. Obtaining one via `BlockStore::read_block` does not
/// lock anything; writing it back is a separate, explicit call.
#[derive(Debug, Clone)]
pub struct Block {
    pub index: u32,
    pub state: BlockState,
    pub prev: i32,
    pub next: i32,
    pub data_capacity: usize,
    pub data_size: usize,
    /// Always `data_capacity` bytes long; only `payload[..data_size]` is
    /// semantically meaningful.
    pub payload: Vec<u8>,
}

impl Block {
    /// A freshly formatted, empty, free block at `index` with the given
    /// list linkage.
    pub fn new_free(index: u32, data_capacity: usize, prev: i32, next: i32) -> Self {
        Block {
            index,
            state: BlockState::Invalid,
            prev,
            next,
            data_capacity,
            data_size: 0,
            payload: vec![0u8; data_capacity],
        }
    }

    pub fn is_valid(&self) -> bool {
        self.state == BlockState::Valid
    }

    pub fn is_first(&self) -> bool {
        self.prev == NIL
    }

    pub fn is_last(&self) -> bool {
        self.next == NIL
    }

    /// Copies `data[..size]` into the payload buffer and marks the block
    /// valid. Caller must have already checked `size <= data_capacity`.
    pub fn stage_payload(&mut self, data: &[u8]) {
        debug_assert!(data.len() <= self.data_capacity);
        self.payload[..data.len()].copy_from_slice(data);
        self.data_size = data.len();
        self.state = BlockState::Valid;
    }

    /// Clears payload bookkeeping and marks the block invalid, ready to
    /// rejoin the free list. The payload bytes themselves are left as-is
    /// (only `data_size` gates what is meaningful).
    pub fn clear_payload(&mut self) {
        self.data_size = 0;
        self.state = BlockState::Invalid;
    }

    pub(crate) fn header(&self) -> RawHeader {
        RawHeader {
            data_size: self.data_size as u64,
            data_capacity: self.data_capacity as u64,
            header_size: crate::config::HEADER_SIZE as u64,
            index: self.index as i64,
            state: self.state.to_u8(),
            _reserved: [0; 7],
            prev: self.prev,
            next: self.next,
        }
    }

    pub(crate) fn from_header_and_payload(header: &RawHeader, payload: Vec<u8>) -> Self {
        Block {
            index: header.index as u32,
            state: BlockState::from_u8(header.state),
            prev: header.prev,
            next: header.next,
            data_capacity: header.data_capacity as usize,
            data_size: (header.data_size as usize).min(payload.len()),
            payload,
        }
    }
}
