// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Register and DMA-memory access layer shared by the DMA driver and its service
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Stable
//! TEST_COVERAGE: Unit tests per module + tests/bus.rs
//!
//! PUBLIC API:
//!   - Bus: raw 32-bit register read/write at a byte offset into a device window
//!   - DmaBuffer: physically addressed memory region the engine reads or writes
//!   - Platform: acquires device windows and DMA regions (released on drop)
//!   - Clock: time source for bounded polling loops
//!
//! Out-of-range offsets are a caller fault, exactly like a stray MMIO access:
//! implementations panic instead of reporting an error.

#![deny(unsafe_code)]

use std::sync::Arc;

pub mod clock;
#[cfg(all(feature = "devmem", target_os = "linux"))]
pub mod devmem;
pub mod memory;
pub mod window;

pub use clock::{duration_to_ns, Clock, HostClock, StepClock};
pub use memory::{PhysMemory, RamRegion};
pub use window::MmioWindow;

/// Size in bytes of one DMA engine's register window.
pub const WINDOW_SIZE: usize = 0x1_0000;

/// Basic bus access trait shared by user drivers.
///
/// Every write is visible to the device immediately and every read returns the
/// current device-visible value; implementations never cache.
pub trait Bus {
    fn read(&self, offset: usize) -> u32;
    fn write(&self, offset: usize, value: u32);
}

impl<T: Bus + ?Sized> Bus for &T {
    fn read(&self, offset: usize) -> u32 {
        (**self).read(offset)
    }

    fn write(&self, offset: usize, value: u32) {
        (**self).write(offset, value)
    }
}

impl<T: Bus + ?Sized> Bus for Arc<T> {
    fn read(&self, offset: usize) -> u32 {
        (**self).read(offset)
    }

    fn write(&self, offset: usize, value: u32) {
        (**self).write(offset, value)
    }
}

impl<T: Bus + ?Sized> Bus for Box<T> {
    fn read(&self, offset: usize) -> u32 {
        (**self).read(offset)
    }

    fn write(&self, offset: usize, value: u32) {
        (**self).write(offset, value)
    }
}

/// Physically contiguous memory a DMA channel can be pointed at.
pub trait DmaBuffer {
    /// Bus address programmed into the engine's address register.
    fn phys_addr(&self) -> u64;
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies `out.len()` bytes starting at `offset` into `out`.
    fn read_at(&self, offset: usize, out: &mut [u8]);

    /// Copies `data` into the region starting at `offset`.
    fn write_at(&self, offset: usize, data: &[u8]);
}

impl<T: DmaBuffer + ?Sized> DmaBuffer for Arc<T> {
    fn phys_addr(&self) -> u64 {
        (**self).phys_addr()
    }

    fn len(&self) -> usize {
        (**self).len()
    }

    fn read_at(&self, offset: usize, out: &mut [u8]) {
        (**self).read_at(offset, out)
    }

    fn write_at(&self, offset: usize, data: &[u8]) {
        (**self).write_at(offset, data)
    }
}

/// Source of device windows and DMA regions.
///
/// Mappings are scoped resources: dropping the returned value releases it.
pub trait Platform {
    type Window: Bus + Send + Sync;
    type Region: DmaBuffer + Send + Sync;

    /// Maps the [`WINDOW_SIZE`] register window of the engine at `base`.
    fn map_window(&self, base: u64) -> Result<Self::Window, HalError>;

    /// Maps `len` bytes of DMA-capable memory at physical address `phys`.
    fn map_region(&self, phys: u64, len: usize) -> Result<Self::Region, HalError>;
}

impl<P: Platform + ?Sized> Platform for Arc<P> {
    type Window = P::Window;
    type Region = P::Region;

    fn map_window(&self, base: u64) -> Result<Self::Window, HalError> {
        (**self).map_window(base)
    }

    fn map_region(&self, phys: u64, len: usize) -> Result<Self::Region, HalError> {
        (**self).map_region(phys, len)
    }
}

/// Errors raised while acquiring hardware resources.
#[derive(Debug, thiserror::Error)]
pub enum HalError {
    #[error("failed to map {len:#x} bytes at {base:#x}: {reason}")]
    Map { base: u64, len: usize, reason: String },
    #[error("region {base:#x}+{len:#x} overlaps an existing mapping")]
    Overlap { base: u64, len: usize },
    #[error("zero-length mapping at {base:#x}")]
    Empty { base: u64 },
}
