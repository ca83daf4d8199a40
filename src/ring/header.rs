// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 ringmem-ipc contributors
//
// Fixed-layout ring metadata (component C2, `RingHeader`) living at region
// offset 0. Field order and sizes mirror the shape of the teacher's
// `proto::shm_ring::Header`, but this header is byte-array-node oriented
// rather than typed-slot oriented, and every field is exactly as named in
// the data model: magic, version, node_count, node_size, read_index,
// write_index, free_nodes, owner_pid, shutting_down, then cache-line pad.

use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};

/// Magic value stamped into every region this crate creates.
pub const RING_MAGIC: u32 = 0x5249_4E47; // "RING"
/// Wire/header format version. Bump on incompatible layout changes.
pub const RING_VERSION: u32 = 1;

const CACHE_LINE: usize = 64;
const FIELDS_SIZE: usize = 4 * 9; // 9 u32-sized fields, see RingHeaderLayout
const PAD_SIZE: usize = CACHE_LINE - FIELDS_SIZE;

/// Raw, `#[repr(C)]` byte layout of the header as it actually sits in the
/// mapped region. Never constructed directly outside of a raw pointer cast
/// onto mapped memory — see [`RingHeader::at`].
#[repr(C)]
pub struct RingHeaderLayout {
    magic: AtomicU32,
    version: AtomicU32,
    node_count: AtomicU32,
    node_size: AtomicU32,
    read_index: AtomicU32,
    write_index: AtomicU32,
    free_nodes: AtomicI32,
    owner_pid: AtomicU32,
    shutting_down: AtomicU32,
    _pad: [u8; PAD_SIZE],
}

const _: () = assert!(std::mem::size_of::<RingHeaderLayout>() == CACHE_LINE);

/// The byte footprint of the header, rounded to a cache line.
pub const HEADER_SIZE: usize = std::mem::size_of::<RingHeaderLayout>();

/// A view over a `RingHeaderLayout` living at the start of a mapped region.
///
/// All accessors use acquire/release atomics on the cursor and shutdown
/// words (invariants I1, I4); `free_nodes` is updated with relaxed atomic
/// arithmetic since it is advisory only (I2).
#[derive(Clone, Copy)]
pub struct RingHeader {
    ptr: *const RingHeaderLayout,
}

// Safety: every method that touches shared fields goes through atomics;
// the header never exposes a `&mut` reference to its own memory.
unsafe impl Send for RingHeader {}
unsafe impl Sync for RingHeader {}

impl RingHeader {
    /// Construct a view over the header at the start of `base`.
    ///
    /// # Safety
    /// `base` must point to at least `HEADER_SIZE` bytes of valid, mapped
    /// memory for the lifetime of every `RingHeader` derived from it.
    pub unsafe fn at(base: *mut u8) -> Self {
        Self {
            ptr: base as *const RingHeaderLayout,
        }
    }

    fn layout(&self) -> &RingHeaderLayout {
        unsafe { &*self.ptr }
    }

    /// Stamp a freshly-created region: magic/version, zeroed cursors,
    /// `free_nodes = node_count - 1`, `owner_pid = self`, not shutting down.
    pub fn init(base: *mut u8, node_count: u32, node_size: u32) {
        let layout = base as *const RingHeaderLayout;
        let h = unsafe { &*layout };
        h.magic.store(RING_MAGIC, Ordering::Relaxed);
        h.version.store(RING_VERSION, Ordering::Relaxed);
        h.node_count.store(node_count, Ordering::Relaxed);
        h.node_size.store(node_size, Ordering::Relaxed);
        h.read_index.store(0, Ordering::Relaxed);
        h.write_index.store(0, Ordering::Relaxed);
        h.free_nodes
            .store(node_count as i32 - 1, Ordering::Relaxed);
        h.owner_pid.store(current_pid(), Ordering::Relaxed);
        h.shutting_down.store(0, Ordering::Release);
    }

    pub fn magic(&self) -> u32 {
        self.layout().magic.load(Ordering::Relaxed)
    }

    pub fn version(&self) -> u32 {
        self.layout().version.load(Ordering::Relaxed)
    }

    pub fn node_count(&self) -> u32 {
        self.layout().node_count.load(Ordering::Relaxed)
    }

    pub fn node_size(&self) -> u32 {
        self.layout().node_size.load(Ordering::Relaxed)
    }

    pub fn owner_pid(&self) -> u32 {
        self.layout().owner_pid.load(Ordering::Relaxed)
    }

    /// Acquire-load of `read_index` (I1).
    pub fn read_index(&self) -> u32 {
        self.layout().read_index.load(Ordering::Acquire)
    }

    /// Release-store of `read_index` (I1).
    pub fn set_read_index(&self, v: u32) {
        self.layout().read_index.store(v, Ordering::Release);
    }

    /// Acquire-load of `write_index` (I1).
    pub fn write_index(&self) -> u32 {
        self.layout().write_index.load(Ordering::Acquire)
    }

    /// Release-store of `write_index` (I1).
    pub fn set_write_index(&self, v: u32) {
        self.layout().write_index.store(v, Ordering::Release);
    }

    /// Advisory free-node counter (I2); never authoritative.
    pub fn free_nodes(&self) -> i32 {
        self.layout().free_nodes.load(Ordering::Relaxed)
    }

    pub fn dec_free_nodes(&self) {
        self.layout().free_nodes.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn inc_free_nodes(&self) {
        self.layout().free_nodes.fetch_add(1, Ordering::Relaxed);
    }

    /// `true` iff `shutting_down` has been observed set (I4, sticky).
    pub fn is_shutting_down(&self) -> bool {
        self.layout().shutting_down.load(Ordering::Acquire) != 0
    }

    /// Sets `shutting_down = 1`. Sticky: never cleared once set.
    pub fn mark_shutting_down(&self) {
        self.layout().shutting_down.store(1, Ordering::Release);
    }
}

fn current_pid() -> u32 {
    std::process::id()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_size_is_one_cache_line() {
        assert_eq!(HEADER_SIZE, 64);
    }

    #[test]
    fn init_then_read_round_trips() {
        let mut buf = vec![0u8; HEADER_SIZE];
        RingHeader::init(buf.as_mut_ptr(), 8, 16);
        let h = unsafe { RingHeader::at(buf.as_mut_ptr()) };
        assert_eq!(h.magic(), RING_MAGIC);
        assert_eq!(h.version(), RING_VERSION);
        assert_eq!(h.node_count(), 8);
        assert_eq!(h.node_size(), 16);
        assert_eq!(h.read_index(), 0);
        assert_eq!(h.write_index(), 0);
        assert_eq!(h.free_nodes(), 7);
        assert!(!h.is_shutting_down());
    }

    #[test]
    fn shutdown_is_sticky() {
        let mut buf = vec![0u8; HEADER_SIZE];
        RingHeader::init(buf.as_mut_ptr(), 4, 8);
        let h = unsafe { RingHeader::at(buf.as_mut_ptr()) };
        assert!(!h.is_shutting_down());
        h.mark_shutting_down();
        assert!(h.is_shutting_down());
    }

    #[test]
    fn free_nodes_arithmetic() {
        let mut buf = vec![0u8; HEADER_SIZE];
        RingHeader::init(buf.as_mut_ptr(), 4, 8);
        let h = unsafe { RingHeader::at(buf.as_mut_ptr()) };
        assert_eq!(h.free_nodes(), 3);
        h.dec_free_nodes();
        assert_eq!(h.free_nodes(), 2);
        h.inc_free_nodes();
        assert_eq!(h.free_nodes(), 3);
    }
}
