//! The persistence shim (§6): a blocking, synchronous abstraction over
//! fixed-size block I/O on a backing device.
//!
//! This is the one seam the out-of-scope collaborators (kernel block-driver
//! shim, VFS bindings) would plug into; everything above this trait is
//! agnostic to where the bytes actually live.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Mutex;

/// A fixed-size, index-addressed block device.
///
/// Implementations must guarantee that a single `write_block` call is
/// atomic at block granularity — a property the list manager's move
/// algorithm (§4.3) relies on for crash safety.
pub trait BackingDevice: Send + Sync {
    fn block_size(&self) -> usize;
    fn nr_blocks(&self) -> usize;

    /// Reads exactly `block_size()` bytes from block `index`.
    fn read_block(&self, index: usize, out: &mut [u8]) -> io::Result<()>;

    /// Writes exactly `block_size()` bytes to block `index`.
    fn write_block(&self, index: usize, data: &[u8]) -> io::Result<()>;

    /// Flushes any buffered writes to stable storage.
    fn flush(&self) -> io::Result<()>;
}

/// An in-memory backing device. Used by tests and by any caller that wants
/// a throwaway block array with no filesystem footprint.
pub struct MemoryDevice {
    block_size: usize,
    blocks: Mutex<Vec<u8>>,
}

impl MemoryDevice {
    pub fn new(block_size: usize, nr_blocks: usize) -> Self {
        MemoryDevice {
            block_size,
            blocks: Mutex::new(vec![0u8; block_size * nr_blocks]),
        }
    }
}

impl BackingDevice for MemoryDevice {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn nr_blocks(&self) -> usize {
        self.blocks.lock().unwrap().len() / self.block_size
    }

    fn read_block(&self, index: usize, out: &mut [u8]) -> io::Result<()> {
        let blocks = self.blocks.lock().unwrap();
        let start = index * self.block_size;
        let end = start + self.block_size;
        if end > blocks.len() {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "block index past end of device"));
        }
        out.copy_from_slice(&blocks[start..end]);
        Ok(())
    }

    fn write_block(&self, index: usize, data: &[u8]) -> io::Result<()> {
        let mut blocks = self.blocks.lock().unwrap();
        let start = index * self.block_size;
        let end = start + self.block_size;
        if end > blocks.len() {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "block index past end of device"));
        }
        blocks[start..end].copy_from_slice(data);
        Ok(())
    }

    fn flush(&self) -> io::Result<()> {
        Ok(())
    }
}

/// A file-backed device using positioned reads/writes against a single
/// pre-sized host file — the "single file" the VFS collaborator mounts.
pub struct FileDevice {
    block_size: usize,
    nr_blocks: usize,
    file: Mutex<File>,
}

impl FileDevice {
    /// Opens an existing, already-sized backing file.
    pub fn open(path: impl AsRef<Path>, block_size: usize, nr_blocks: usize) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(FileDevice {
            block_size,
            nr_blocks,
            file: Mutex::new(file),
        })
    }

    /// Creates a new backing file of exactly `block_size * nr_blocks` bytes,
    /// zero-filled, ready for `format` to stamp a superblock onto.
    pub fn create(path: impl AsRef<Path>, block_size: usize, nr_blocks: usize) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len((block_size * nr_blocks) as u64)?;
        Ok(FileDevice {
            block_size,
            nr_blocks,
            file: Mutex::new(file),
        })
    }
}

impl BackingDevice for FileDevice {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn nr_blocks(&self) -> usize {
        self.nr_blocks
    }

    fn read_block(&self, index: usize, out: &mut [u8]) -> io::Result<()> {
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start((index * self.block_size) as u64))?;
        file.read_exact(out)
    }

    fn write_block(&self, index: usize, data: &[u8]) -> io::Result<()> {
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start((index * self.block_size) as u64))?;
        file.write_all(data)
    }

    fn flush(&self) -> io::Result<()> {
        self.file.lock().unwrap().sync_data()
    }
}
