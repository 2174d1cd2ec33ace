//! Serialize/deserialize a [`Block`] to and from a fixed-size byte buffer.
//!
//! Layout is header-then-payload, header fields in declared order at their
//! native width and the host's endianness — the device is never shared
//! across architectures, so there is no wire-format negotiation here.
//!
//! Errors: never. The codec operates on buffers whose size is fixed by the
//! caller (the block store); `data_size > data_capacity` is a programmer
//! error caught at the one call site that accepts caller-supplied sizes
//! (`BlockLayer::place`), not here.

use zerocopy::{AsBytes, FromBytes};

use crate::block::{Block, RawHeader};

/// Writes `block`'s header and payload into `out`, which must be exactly
/// `block_size` bytes. Any capacity bytes beyond `data_size` are written
/// as-is from the in-memory payload buffer.
pub fn serialize(block: &Block, out: &mut [u8]) {
    debug_assert_eq!(out.len(), crate::config::HEADER_SIZE + block.data_capacity);

    let header = block.header();
    let wrote = header.write_to_prefix(out);
    debug_assert!(wrote.is_some(), "header buffer too small for RawHeader");

    let payload_at = crate::config::HEADER_SIZE;
    out[payload_at..payload_at + block.data_capacity].copy_from_slice(&block.payload);
}

/// Reads a block out of `bytes`, which must be exactly `block_size` bytes
/// produced by a prior `serialize` (or by `format`). `data_capacity` is the
/// block store's configured capacity, used to size the payload slice.
pub fn deserialize(bytes: &[u8], data_capacity: usize) -> Block {
    let header = RawHeader::read_from_prefix(bytes).expect("buffer too small for RawHeader");

    let payload_at = crate::config::HEADER_SIZE;
    let payload = bytes[payload_at..payload_at + data_capacity].to_vec();

    Block::from_header_and_payload(&header, payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_header_and_payload() {
        let capacity = 64;
        let block_size = crate::config::HEADER_SIZE + capacity;
        let mut block = Block::new_free(5, capacity, 1, 3);
        block.stage_payload(b"hello");

        let mut buf = vec![0u8; block_size];
        serialize(&block, &mut buf);
        let back = deserialize(&buf, capacity);

        assert_eq!(back.index, 5);
        assert_eq!(back.prev, 1);
        assert_eq!(back.next, 3);
        assert_eq!(back.data_size, 5);
        assert!(back.is_valid());
        assert_eq!(&back.payload[..5], b"hello");
    }

    #[test]
    fn preserves_invalid_state_by_default() {
        let capacity = 16;
        let block_size = crate::config::HEADER_SIZE + capacity;
        let block = Block::new_free(0, capacity, -1, -1);

        let mut buf = vec![0u8; block_size];
        serialize(&block, &mut buf);
        let back = deserialize(&buf, capacity);

        assert!(!back.is_valid());
        assert_eq!(back.data_size, 0);
    }
}
