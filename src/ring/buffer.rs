// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 ringmem-ipc contributors
//
// Lock-free ring of fixed-size nodes overlaid on a `MmapRegion` (component
// C3, `CircularBuffer`). One logical writer, one logical reader per
// instance; multiple threads of one process sharing an instance must
// serialize through `NamedSpin` (see `spin.rs`) before calling `write`/
// `read` concurrently — this type itself performs no in-process locking.

use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use crate::error::IpcError;
use crate::mmap::{MmapRegion, ShmOpenMode};
use crate::ring::header::{RingHeader, HEADER_SIZE, RING_MAGIC, RING_VERSION};

const RETRY_SLEEP: Duration = Duration::from_millis(1);

/// A shared-memory circular byte buffer: N fixed-size nodes, one header,
/// cross-process atomic cursors. See `ring::header` for the wire layout.
pub struct CircularBuffer {
    region: MmapRegion,
    header: RingHeader,
    node_base: *mut u8,
    node_count: u32,
    node_size: u32,
    name: String,
    is_owner: bool,
}

// Safety: all cross-process mutation goes through `RingHeader`'s atomics;
// node bytes are touched only while the caller holds the relevant
// direction's `NamedSpin`, matching invariant I3.
unsafe impl Send for CircularBuffer {}
unsafe impl Sync for CircularBuffer {}

impl CircularBuffer {
    /// Open an existing named ring, or create one with `node_count` nodes
    /// of `node_size` bytes each if it does not yet exist.
    ///
    /// On open, `node_count`/`node_size` are whatever the instance reports
    /// via its header accessors thereafter — the caller's parameters are
    /// only used if this call creates the region.
    pub fn open_or_create(name: &str, node_count: u32, node_size: u32) -> Result<Self, IpcError> {
        if node_count < 2 {
            return Err(IpcError::Incompatible {
                name: name.to_string(),
                expected_magic: RING_MAGIC,
                expected_version: RING_VERSION,
                found_magic: 0,
                found_version: 0,
            });
        }
        let total_size = HEADER_SIZE + node_count as usize * node_size as usize;
        let region = MmapRegion::open(name, total_size, ShmOpenMode::CreateOrOpen).map_err(|e| {
            IpcError::Io {
                name: name.to_string(),
                source: e,
            }
        })?;

        let base = region.as_mut_ptr();
        let header = unsafe { RingHeader::at(base) };

        if region.is_owner() {
            RingHeader::init(base, node_count, node_size);
            debug!(ring = name, node_count, node_size, "created ring");
        } else {
            if header.magic() != RING_MAGIC || header.version() != RING_VERSION {
                return Err(IpcError::Incompatible {
                    name: name.to_string(),
                    expected_magic: RING_MAGIC,
                    expected_version: RING_VERSION,
                    found_magic: header.magic(),
                    found_version: header.version(),
                });
            }
            trace!(
                ring = name,
                node_count = header.node_count(),
                node_size = header.node_size(),
                "joined existing ring"
            );
        }

        let node_base = unsafe { base.add(HEADER_SIZE) };
        let is_owner = region.is_owner();
        Ok(Self {
            region,
            header,
            node_base,
            node_count: header.node_count(),
            node_size: header.node_size(),
            name: name.to_string(),
            is_owner,
        })
    }

    fn node_ptr(&self, idx: u32) -> *mut u8 {
        unsafe { self.node_base.add(idx as usize * self.node_size as usize) }
    }

    fn closed_err(&self) -> IpcError {
        IpcError::Closed {
            name: self.name.clone(),
        }
    }

    /// Copy as many bytes of `src` as fit into currently free nodes, one
    /// node per internal iteration, until all of `src` is written, the ring
    /// reports closed, or `timeout_ms` elapses with zero progress.
    pub fn write(&self, src: &[u8], timeout_ms: u64) -> Result<u32, IpcError> {
        if self.header.is_shutting_down() {
            return Err(self.closed_err());
        }
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        let mut written = 0usize;

        while written < src.len() {
            if self.header.is_shutting_down() {
                return if written == 0 {
                    Err(self.closed_err())
                } else {
                    Ok(written as u32)
                };
            }

            let w = self.header.write_index();
            let r = self.header.read_index();
            let n = self.node_count as i64;
            let free = ((r as i64 - w as i64 - 1).rem_euclid(n)) as u32;

            if free == 0 {
                if Instant::now() >= deadline {
                    return if written == 0 {
                        Err(IpcError::Timeout {
                            name: self.name.clone(),
                            timeout_ms,
                        })
                    } else {
                        Ok(written as u32)
                    };
                }
                thread::sleep(RETRY_SLEEP);
                continue;
            }

            let remaining = src.len() - written;
            let to_write = remaining.min(self.node_size as usize);
            unsafe {
                std::ptr::copy_nonoverlapping(
                    src[written..].as_ptr(),
                    self.node_ptr(w),
                    to_write,
                );
            }
            let next_w = (w + 1) % self.node_count;
            self.header.set_write_index(next_w);
            self.header.dec_free_nodes();
            written += to_write;
        }
        Ok(written as u32)
    }

    /// Symmetric to [`write`](Self::write): fills `dst` from occupied nodes.
    /// Returning 0 bytes from an open ring is legal ("no data yet"); the
    /// caller (`MessageStream`) loops.
    pub fn read(&self, dst: &mut [u8], timeout_ms: u64) -> Result<u32, IpcError> {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        let mut read_so_far = 0usize;

        while read_so_far < dst.len() {
            let w = self.header.write_index();
            let r = self.header.read_index();

            if w == r {
                if self.header.is_shutting_down() {
                    return if read_so_far == 0 {
                        Err(self.closed_err())
                    } else {
                        Ok(read_so_far as u32)
                    };
                }
                if Instant::now() >= deadline {
                    return if read_so_far == 0 {
                        Err(IpcError::Timeout {
                            name: self.name.clone(),
                            timeout_ms,
                        })
                    } else {
                        Ok(read_so_far as u32)
                    };
                }
                thread::sleep(RETRY_SLEEP);
                continue;
            }

            let remaining = dst.len() - read_so_far;
            let to_read = remaining.min(self.node_size as usize);
            unsafe {
                std::ptr::copy_nonoverlapping(
                    self.node_ptr(r),
                    dst[read_so_far..].as_mut_ptr(),
                    to_read,
                );
            }
            let next_r = (r + 1) % self.node_count;
            self.header.set_read_index(next_r);
            self.header.inc_free_nodes();
            read_so_far += to_read;
        }
        Ok(read_so_far as u32)
    }

    /// Advisory free-node count, recomputed from cursors (I2).
    pub fn free_node_count(&self) -> u32 {
        let w = self.header.write_index();
        let r = self.header.read_index();
        let n = self.node_count as i64;
        ((r as i64 - w as i64 - 1).rem_euclid(n)) as u32
    }

    /// `true` if at least one node is available to read without blocking.
    pub fn has_node_to_read(&self) -> bool {
        self.header.write_index() != self.header.read_index()
    }

    pub fn node_count(&self) -> u32 {
        self.node_count
    }

    pub fn node_size(&self) -> u32 {
        self.node_size
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_owner(&self) -> bool {
        self.is_owner
    }

    /// Sets `shutting_down = 1` (I4, sticky); if this instance is the
    /// owner, the backing region's destruction is deferred to the host
    /// until the last handle across all processes drops.
    pub fn close(&self) {
        if self.header.is_shutting_down() {
            return;
        }
        self.header.mark_shutting_down();
        warn!(ring = self.name, "ring closed");
    }

    pub fn is_closed(&self) -> bool {
        self.header.is_shutting_down()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique_name(prefix: &str) -> String {
        use std::sync::atomic::{AtomicUsize, Ordering};
        static COUNTER: AtomicUsize = AtomicUsize::new(0);
        format!(
            "/ringmem_test_{prefix}_{}_{}",
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::Relaxed)
        )
    }

    #[test]
    fn create_then_write_read_round_trip() {
        let name = unique_name("buf1");
        let buf = CircularBuffer::open_or_create(&name, 8, 16).unwrap();
        assert!(buf.is_owner());
        let n = buf.write(b"hello", 100).unwrap();
        assert_eq!(n, 5);
        let mut dst = [0u8; 5];
        let n = buf.read(&mut dst, 100).unwrap();
        assert_eq!(n, 5);
        assert_eq!(&dst, b"hello");
        buf.close();
    }

    #[test]
    fn free_node_count_matches_invariant_p2() {
        let name = unique_name("buf2");
        let buf = CircularBuffer::open_or_create(&name, 4, 8).unwrap();
        assert_eq!(buf.free_node_count(), 3);
        buf.write(b"abcdefgh", 100).unwrap(); // exactly one node
        assert_eq!(buf.free_node_count(), 2);
        let mut dst = [0u8; 8];
        buf.read(&mut dst, 100).unwrap();
        assert_eq!(buf.free_node_count(), 3);
        buf.close();
    }

    #[test]
    fn read_on_empty_ring_is_timeout_with_zero_progress() {
        let name = unique_name("buf3");
        let buf = CircularBuffer::open_or_create(&name, 4, 8).unwrap();
        let mut dst = [0u8; 4];
        let err = buf.read(&mut dst, 5).unwrap_err();
        assert!(matches!(err, IpcError::Timeout { .. }));
        buf.close();
    }

    #[test]
    fn close_is_sticky_and_rejects_new_writes() {
        let name = unique_name("buf4");
        let buf = CircularBuffer::open_or_create(&name, 4, 8).unwrap();
        buf.close();
        assert!(buf.is_closed());
        let err = buf.write(b"x", 10).unwrap_err();
        assert!(matches!(err, IpcError::Closed { .. }));
    }

    #[test]
    fn multi_node_payload_spans_wrap_correctly() {
        let name = unique_name("buf5");
        let buf = CircularBuffer::open_or_create(&name, 512, 32).unwrap();
        let payload: Vec<u8> = (0..74u32).map(|i| (i % 251) as u8).collect();
        let n = buf.write(&payload, 1000).unwrap();
        assert_eq!(n as usize, payload.len());
        let mut dst = vec![0u8; payload.len()];
        let n = buf.read(&mut dst, 1000).unwrap();
        assert_eq!(n as usize, payload.len());
        assert_eq!(dst, payload);
        buf.close();
    }
}
