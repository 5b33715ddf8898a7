// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Volatile register window over memory the caller already mapped.

#![allow(unsafe_code)]

use core::ptr::NonNull;

use crate::Bus;

/// Volatile register window over an existing mapping.
pub struct MmioWindow {
    base: NonNull<u32>,
    len: usize,
}

// SAFETY: the window only performs volatile word accesses; the device serializes them.
unsafe impl Send for MmioWindow {}
// SAFETY: see above, no interior state besides the mapping itself.
unsafe impl Sync for MmioWindow {}

impl MmioWindow {
    /// Wraps `len` bytes of mapped registers starting at `base`.
    ///
    /// # Safety
    /// `base` must be 4-byte aligned and valid for volatile reads and writes of
    /// `len` bytes for as long as the returned window lives.
    pub unsafe fn new(base: NonNull<u32>, len: usize) -> Self {
        Self { base, len }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn slot(&self, offset: usize) -> *mut u32 {
        assert!(offset + 4 <= self.len, "register offset {offset:#x} outside window");
        // SAFETY: bounds asserted above; `new` guarantees the mapping.
        unsafe { self.base.as_ptr().add(offset >> 2) }
    }
}

impl Bus for MmioWindow {
    fn read(&self, offset: usize) -> u32 {
        // SAFETY: `slot` returns an in-bounds, aligned register pointer.
        unsafe { core::ptr::read_volatile(self.slot(offset)) }
    }

    fn write(&self, offset: usize, value: u32) {
        // SAFETY: `slot` returns an in-bounds, aligned register pointer.
        unsafe { core::ptr::write_volatile(self.slot(offset), value) }
    }
}
