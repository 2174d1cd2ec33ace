//! errno-flavored entry points (§6).
//!
//! A thin translation layer over [`crate::mount::Mount`] for callers that
//! want C-style `i32` return codes instead of `Result<_, Error>` — the
//! shape the out-of-scope syscall/ioctl registration glue would bind to.
//! Everything here is a direct wrapper; no logic lives in this module.

use crate::error::Error;
use crate::mount::Mount;
use crate::session::SessionId;

pub const SUCCESS: i32 = 0;
pub const E_NOSPC: i32 = -28;
pub const E_NODATA: i32 = -61;
pub const E_INVAL: i32 = -22;
pub const E_INTR: i32 = -4;
pub const E_BUSY: i32 = -16;
pub const E_NODEV: i32 = -19;

fn to_errno(err: &Error) -> i32 {
    match err {
        Error::OutOfRange { .. } => E_INVAL,
        Error::NoData { .. } => E_NODATA,
        Error::NoSpace => E_NOSPC,
        Error::PayloadTooLarge { .. } => E_INVAL,
        Error::IoFault { .. } => E_NODEV,
        Error::NotMounted => E_INVAL,
        Error::AlreadyMounted => E_BUSY,
        Error::InvalidConfig(_) => E_INVAL,
        Error::Interrupted => E_INTR,
        Error::Degraded => E_NODEV,
    }
}

/// Stores `data`, returning the new block's index on success or a negative
/// errno.
pub fn place(mount: &Mount, data: &[u8]) -> i32 {
    match mount.with_layer(|layer| layer.place(data)) {
        Ok(index) => index as i32,
        Err(e) => to_errno(&e),
    }
}

/// Writes `index`'s payload into `out`, returning the number of bytes
/// written or a negative errno. `-EINVAL` if `out` is smaller than the
/// stored payload.
pub fn fetch(mount: &Mount, index: u32, out: &mut [u8]) -> i32 {
    match mount.with_layer(|layer| layer.fetch(index)) {
        Ok(payload) => {
            if payload.len() > out.len() {
                return E_INVAL;
            }
            out[..payload.len()].copy_from_slice(&payload);
            payload.len() as i32
        }
        Err(e) => to_errno(&e),
    }
}

/// Removes `index` from the used list, returning `0` or a negative errno.
pub fn invalidate(mount: &Mount, index: u32) -> i32 {
    match mount.with_layer(|layer| layer.invalidate(index)) {
        Ok(()) => SUCCESS,
        Err(e) => to_errno(&e),
    }
}

/// Opens a streaming-read session, returning its id (always non-negative)
/// or a negative errno if nothing is mounted.
pub fn open_session(mount: &Mount) -> i64 {
    match mount.with_layer(|layer| Ok(layer.open_session())) {
        Ok(id) => id as i64,
        Err(e) => to_errno(&e) as i64,
    }
}

pub fn close_session(mount: &Mount, session: SessionId) -> i32 {
    match mount.with_layer(|layer| {
        layer.close_session(session);
        Ok(())
    }) {
        Ok(()) => SUCCESS,
        Err(e) => to_errno(&e),
    }
}

/// Copies the next slice of the used-list byte stream into `out`, starting
/// at `*file_offset` and advancing it by the return value. `0` means the
/// walk reached the end of the used list with nothing left to deliver.
pub fn stream_read(mount: &Mount, session: SessionId, out: &mut [u8], file_offset: &mut u64) -> i32 {
    match mount.with_layer(|layer| layer.stream_read(session, out, file_offset)) {
        Ok(n) => n as i32,
        Err(e) => to_errno(&e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DurabilityPolicy, MountConfig};
    use crate::device::MemoryDevice;

    fn mounted() -> Mount {
        let cfg = MountConfig { block_size: 128, nr_blocks: 8, durability: DurabilityPolicy::WriteBack };
        let device = MemoryDevice::new(128, 8);
        Mount::format(&device, cfg).unwrap();
        let mount = Mount::new();
        mount.mount(Box::new(device), cfg).unwrap();
        mount
    }

    #[test]
    fn place_fetch_round_trip_via_errno_layer() {
        let mount = mounted();
        let index = place(&mount, b"abi");
        assert!(index >= 0);

        let mut buf = [0u8; 16];
        let n = fetch(&mount, index as u32, &mut buf);
        assert_eq!(n, 3);
        assert_eq!(&buf[..3], b"abi");
    }

    #[test]
    fn fetch_of_unused_index_reports_nodata() {
        let mount = mounted();
        let mut buf = [0u8; 16];
        let rc = fetch(&mount, 2, &mut buf);
        assert_eq!(rc, E_NODATA);
    }

    #[test]
    fn unmounted_layer_reports_einval() {
        let mount = Mount::new();
        let rc = place(&mount, b"x");
        assert_eq!(rc, E_INVAL);
    }
}
