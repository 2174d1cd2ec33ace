//! A persistent, crash-safe block layer over a fixed array of fixed-size
//! blocks, with free and used blocks linked into two doubly-linked lists
//! stored inside the blocks themselves.
//!
//! The service surface is four primitives — [`block_layer::BlockLayer::place`],
//! [`block_layer::BlockLayer::fetch`], [`block_layer::BlockLayer::invalidate`]
//! and [`block_layer::BlockLayer::stream_read`] — reached through a
//! [`mount::Mount`] once a device has been [`mount::Mount::format`]ted.
//! A single writer mutates the lists at a time; any number of readers may
//! traverse them concurrently, coordinated by an SRCU-style grace-period
//! barrier ([`concurrency::GraceBarrier`]) rather than a shared lock.

pub mod abi;
pub mod block;
pub mod block_layer;
pub mod codec;
pub mod concurrency;
pub mod config;
pub mod device;
pub mod error;
pub mod list_manager;
pub mod mount;
pub mod param;
pub mod session;
pub mod store;
pub mod superblock;

pub use error::{Error, Result};
pub use mount::Mount;
