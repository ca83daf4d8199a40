// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 ringmem-ipc contributors
//
// Cross-platform named, fixed-size, process-shared byte region (component
// C1, `MmapRegion`). Delegates the actual syscalls to platform::PlatformShm;
// this module only owns the open-mode mapping and the thin create/open/map/
// flush/close surface the rest of the crate builds on.

use std::io;

use crate::platform::PlatformShm;

/// Open mode for a named shared region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShmOpenMode {
    /// Create exclusively — fail if the name already exists.
    Create,
    /// Open an existing region — fail if it does not exist.
    Open,
    /// Create if missing, open if already present (the common `CircularBuffer` path).
    CreateOrOpen,
}

/// A named, fixed-size, byte-addressable region shared by every process that
/// opens the same name. Exactly one process is the *owner* (it created the
/// region); others are joiners. The region is destroyed once the last handle
/// across all processes drops (host-managed reference counting).
pub struct MmapRegion {
    inner: PlatformShm,
    name: String,
    is_owner: bool,
}

impl MmapRegion {
    /// Create or open a named region of `size` user-visible bytes.
    ///
    /// `is_owner()` reports whether this call was the one that created the
    /// backing object (the ref count observed before our own increment was
    /// zero).
    pub fn open(name: &str, size: usize, mode: ShmOpenMode) -> io::Result<Self> {
        #[cfg(unix)]
        let platform_mode = match mode {
            ShmOpenMode::Create => crate::platform::posix::ShmMode::Create,
            ShmOpenMode::Open => crate::platform::posix::ShmMode::Open,
            ShmOpenMode::CreateOrOpen => crate::platform::posix::ShmMode::CreateOrOpen,
        };
        #[cfg(windows)]
        let platform_mode = match mode {
            ShmOpenMode::Create => crate::platform::windows::ShmMode::Create,
            ShmOpenMode::Open => crate::platform::windows::ShmMode::Open,
            ShmOpenMode::CreateOrOpen => crate::platform::windows::ShmMode::CreateOrOpen,
        };

        let inner = PlatformShm::acquire(name, size, platform_mode)?;
        let is_owner = inner.prev_ref_count_or_zero() == 0;
        Ok(Self {
            inner,
            name: name.to_string(),
            is_owner,
        })
    }

    /// Pointer to the start of the user-visible region.
    pub fn as_ptr(&self) -> *const u8 {
        self.inner.as_ptr()
    }

    /// Mutable pointer to the start of the user-visible region.
    pub fn as_mut_ptr(&self) -> *mut u8 {
        self.inner.as_mut_ptr()
    }

    /// Size in bytes of the user-visible region (excludes the trailing
    /// ref-counter word kept by the platform layer).
    pub fn user_size(&self) -> usize {
        self.inner.user_size()
    }

    /// The name this region was opened under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `true` if this handle was the one that created the backing object.
    pub fn is_owner(&self) -> bool {
        self.is_owner
    }

    /// Number of live handles (across all processes) mapping this region.
    pub fn ref_count(&self) -> i32 {
        self.inner.ref_count()
    }

    /// `flush` is a no-op: the ring advances cursors with every node write,
    /// there is no separate dirty-page bookkeeping to force out.
    pub fn flush(&self) {}

    /// Force-remove the backing kernel object regardless of outstanding refs.
    pub fn unlink(&self) {
        self.inner.unlink();
    }

    /// Remove a named region's backing storage without needing an open handle.
    pub fn unlink_by_name(name: &str) {
        PlatformShm::unlink_by_name(name);
    }
}

// `unmap` happens implicitly: PlatformShm::drop munmaps/unmaps and unlinks
// if this was the last reference, matching "close unmaps" from the data model.
