// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: `/dev/mem` backed platform for running against real hardware
//! OWNERS: @runtime
//! STATUS: Functional (Linux, requires CAP_SYS_RAWIO)
//!
//! SECURITY INVARIANTS:
//!   - Only the driver service process may construct a [`DevMemPlatform`]
//!   - Every mapping is unmapped when its owner is dropped

#![allow(unsafe_code)]

use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::ptr::NonNull;

use crate::{Bus, DmaBuffer, HalError, MmioWindow, Platform, WINDOW_SIZE};

/// One `mmap` of `/dev/mem`, unmapped on drop.
struct Mapping {
    ptr: NonNull<u8>,
    len: usize,
}

// SAFETY: the mapping is plain shared memory; accesses go through volatile ops.
unsafe impl Send for Mapping {}
// SAFETY: see above.
unsafe impl Sync for Mapping {}

impl Mapping {
    fn new(dev: &File, phys: u64, len: usize) -> Result<Self, HalError> {
        if len == 0 {
            return Err(HalError::Empty { base: phys });
        }
        // SAFETY: fresh shared mapping of the device file; the kernel validates the range.
        let ptr = unsafe {
            libc::mmap(
                core::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                dev.as_raw_fd(),
                phys as libc::off_t,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(HalError::Map {
                base: phys,
                len,
                reason: std::io::Error::last_os_error().to_string(),
            });
        }
        let ptr = NonNull::new(ptr.cast::<u8>()).ok_or_else(|| HalError::Map {
            base: phys,
            len,
            reason: "mmap returned null".into(),
        })?;
        Ok(Self { ptr, len })
    }
}

impl Drop for Mapping {
    fn drop(&mut self) {
        // SAFETY: `ptr`/`len` come from a successful mmap that nothing else unmaps.
        unsafe {
            libc::munmap(self.ptr.as_ptr().cast(), self.len);
        }
    }
}

/// Register window mapped from `/dev/mem`.
pub struct DevMemWindow {
    regs: MmioWindow,
    // Keeps `regs` backed; unmapped after it.
    _map: Mapping,
}

impl DevMemWindow {
    fn new(map: Mapping) -> Self {
        // SAFETY: the mapping is page aligned, `len` bytes long and owned by
        // the window, so it outlives `regs`.
        let regs = unsafe { MmioWindow::new(map.ptr.cast::<u32>(), map.len) };
        Self { regs, _map: map }
    }
}

impl Bus for DevMemWindow {
    fn read(&self, offset: usize) -> u32 {
        self.regs.read(offset)
    }

    fn write(&self, offset: usize, value: u32) {
        self.regs.write(offset, value)
    }
}

/// DMA memory region mapped from `/dev/mem`.
pub struct DevMemRegion {
    phys: u64,
    map: Mapping,
}

impl DmaBuffer for DevMemRegion {
    fn phys_addr(&self) -> u64 {
        self.phys
    }

    fn len(&self) -> usize {
        self.map.len
    }

    fn read_at(&self, offset: usize, out: &mut [u8]) {
        assert!(offset + out.len() <= self.map.len, "read outside DMA region");
        for (i, byte) in out.iter_mut().enumerate() {
            // SAFETY: bounds asserted above.
            *byte = unsafe { core::ptr::read_volatile(self.map.ptr.as_ptr().add(offset + i)) };
        }
    }

    fn write_at(&self, offset: usize, data: &[u8]) {
        assert!(offset + data.len() <= self.map.len, "write outside DMA region");
        for (i, byte) in data.iter().enumerate() {
            // SAFETY: bounds asserted above.
            unsafe { core::ptr::write_volatile(self.map.ptr.as_ptr().add(offset + i), *byte) };
        }
    }
}

/// Platform that maps hardware through `/dev/mem` with `O_SYNC` (uncached).
pub struct DevMemPlatform {
    dev: File,
}

impl DevMemPlatform {
    pub fn open() -> Result<Self, HalError> {
        let dev = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_SYNC)
            .open("/dev/mem")
            .map_err(|err| HalError::Map { base: 0, len: 0, reason: format!("/dev/mem: {err}") })?;
        Ok(Self { dev })
    }
}

impl Platform for DevMemPlatform {
    type Window = DevMemWindow;
    type Region = DevMemRegion;

    fn map_window(&self, base: u64) -> Result<DevMemWindow, HalError> {
        Mapping::new(&self.dev, base, WINDOW_SIZE).map(DevMemWindow::new)
    }

    fn map_region(&self, phys: u64, len: usize) -> Result<DevMemRegion, HalError> {
        Ok(DevMemRegion { phys, map: Mapping::new(&self.dev, phys, len)? })
    }
}
