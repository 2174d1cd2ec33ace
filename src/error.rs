//! Crate-wide error taxonomy.
//!
//! Every fallible operation in the block layer returns one of these variants.
//! The mapping to the errno-flavored `abi` module lives in [`crate::abi`].

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;

/// The failure modes a mounted [`crate::block_layer::BlockLayer`] can report.
#[derive(Debug, Error)]
pub enum Error {
    /// A block index fell outside `[0, nr_blocks)`, or a reserved index was
    /// targeted by an operation that does not accept one.
    #[error("block index {index} is out of range (nr_blocks = {nr_blocks})")]
    OutOfRange { index: i64, nr_blocks: u32 },

    /// `fetch`/`invalidate` targeted a block that is currently `Invalid`.
    #[error("block {index} holds no valid data")]
    NoData { index: i64 },

    /// `place` found no block in the `Free` list.
    #[error("no free blocks available")]
    NoSpace,

    /// `place` was asked to store more bytes than `data_capacity`.
    #[error("payload of {size} bytes exceeds block capacity of {capacity} bytes")]
    PayloadTooLarge { size: usize, capacity: usize },

    /// A read or write against the backing device failed.
    #[error("I/O fault on block {index}: {source}")]
    IoFault {
        index: i64,
        #[source]
        source: std::io::Error,
    },

    /// A service primitive was invoked while the layer was not in the
    /// `Mounted` state.
    #[error("block layer is not mounted")]
    NotMounted,

    /// `mount` was called while a mount was already active.
    #[error("block layer is already mounted")]
    AlreadyMounted,

    /// `mount`/`format` was given a [`crate::config::MountConfig`] that
    /// fails its own internal consistency check.
    #[error("invalid mount configuration: {0}")]
    InvalidConfig(&'static str),

    /// A blocking wait (writer mutex, grace period, unmount drain) was
    /// interrupted before it could complete.
    #[error("operation was interrupted")]
    Interrupted,

    /// A move could not be rolled back after a transient I/O fault; the
    /// layer refuses further structural mutation until unmount.
    #[error("block layer is degraded after a failed rollback and refuses further writes")]
    Degraded,
}

impl Error {
    /// `true` for errors that leave every invariant of §3 intact and the
    /// state unchanged (validation, exhaustion, logical, lifecycle errors).
    pub fn is_stateless(&self) -> bool {
        !matches!(self, Error::IoFault { .. } | Error::Degraded)
    }
}
