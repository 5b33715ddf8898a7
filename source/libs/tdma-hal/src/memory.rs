// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Host-memory DMA regions and a physical address map for simulated devices.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::{DmaBuffer, HalError};

/// DMA region backed by host memory, tagged with the bus address it stands for.
///
/// Clones share the same bytes.
#[derive(Clone)]
pub struct RamRegion {
    phys: u64,
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl RamRegion {
    /// Allocates a zeroed region of `len` bytes at bus address `phys`.
    pub fn new(phys: u64, len: usize) -> Self {
        Self { phys, bytes: Arc::new(Mutex::new(vec![0; len])) }
    }

    /// Returns a copy of the whole region.
    pub fn snapshot(&self) -> Vec<u8> {
        self.bytes.lock().clone()
    }

    fn contains(&self, phys: u64, len: usize) -> bool {
        let end = self.phys + self.bytes.lock().len() as u64;
        phys >= self.phys && phys.saturating_add(len as u64) <= end
    }

    fn overlaps(&self, phys: u64, len: usize) -> bool {
        let end = self.phys + self.bytes.lock().len() as u64;
        phys < end && self.phys < phys.saturating_add(len as u64)
    }
}

impl DmaBuffer for RamRegion {
    fn phys_addr(&self) -> u64 {
        self.phys
    }

    fn len(&self) -> usize {
        self.bytes.lock().len()
    }

    fn read_at(&self, offset: usize, out: &mut [u8]) {
        let bytes = self.bytes.lock();
        out.copy_from_slice(&bytes[offset..offset + out.len()]);
    }

    fn write_at(&self, offset: usize, data: &[u8]) {
        let mut bytes = self.bytes.lock();
        bytes[offset..offset + data.len()].copy_from_slice(data);
    }
}

/// Registry of host regions keyed by bus address.
///
/// Simulated bus masters resolve the addresses programmed into their registers
/// here, the same way real hardware would hit physical memory.
#[derive(Default)]
pub struct PhysMemory {
    regions: Mutex<Vec<RamRegion>>,
}

impl PhysMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the region at `phys`, allocating it on first use.
    ///
    /// Requesting an existing base again yields the same bytes as long as the
    /// requested length fits; partial overlaps are rejected.
    pub fn region(&self, phys: u64, len: usize) -> Result<RamRegion, HalError> {
        if len == 0 {
            return Err(HalError::Empty { base: phys });
        }
        let mut regions = self.regions.lock();
        if let Some(existing) = regions.iter().find(|r| r.phys == phys) {
            if existing.len() >= len {
                return Ok(existing.clone());
            }
            return Err(HalError::Overlap { base: phys, len });
        }
        if regions.iter().any(|r| r.overlaps(phys, len)) {
            return Err(HalError::Overlap { base: phys, len });
        }
        let region = RamRegion::new(phys, len);
        regions.push(region.clone());
        Ok(region)
    }

    /// Reads `out.len()` bytes at `phys`. Returns `false` when the range is unmapped.
    pub fn read(&self, phys: u64, out: &mut [u8]) -> bool {
        match self.find(phys, out.len()) {
            Some(region) => {
                region.read_at((phys - region.phys) as usize, out);
                true
            }
            None => false,
        }
    }

    /// Writes `data` at `phys`. Returns `false` when the range is unmapped.
    pub fn write(&self, phys: u64, data: &[u8]) -> bool {
        match self.find(phys, data.len()) {
            Some(region) => {
                region.write_at((phys - region.phys) as usize, data);
                true
            }
            None => false,
        }
    }

    fn find(&self, phys: u64, len: usize) -> Option<RamRegion> {
        self.regions.lock().iter().find(|r| r.contains(phys, len)).cloned()
    }
}
