// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Simulated AXI DMA engine for host builds.
//!
//! [`SimEngine`] answers register accesses the way the hardware does in direct
//! register mode and behaves as a passthrough accelerator: MM2S copies the
//! source bytes into an internal stream, S2MM drains that stream into the
//! destination address. Addresses resolve through a shared [`PhysMemory`].

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tdma_hal::{duration_to_ns, Bus, Clock, HalError, PhysMemory, Platform, RamRegion};

use crate::{regs, Channel, Control, Status};

/// How the simulated engine acknowledges a started transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Ack {
    /// IOC and IDLE are set as soon as the length register is written.
    Immediate,
    /// IOC and IDLE become visible once the clock has moved past the delay.
    Delayed(Duration),
    /// IOC is raised but the channel never reports idle.
    NeverIdle,
    /// Neither bit is ever raised.
    NeverComplete,
}

#[derive(Clone, Copy, Default)]
struct ChannelModel {
    control: u32,
    status: u32,
    address: u32,
    length: u32,
    complete_at: Option<u64>,
}

impl ChannelModel {
    fn after_reset() -> Self {
        Self { status: Status::HALTED.bits(), ..Self::default() }
    }
}

struct SimState {
    channels: [ChannelModel; 2],
    stream: VecDeque<u8>,
    writes: Vec<(usize, u32)>,
    ack: Ack,
}

/// Register-accurate passthrough model of one engine instance.
pub struct SimEngine {
    memory: Arc<PhysMemory>,
    clock: Arc<dyn Clock + Send + Sync>,
    state: Mutex<SimState>,
}

fn slot(channel: Channel) -> usize {
    match channel {
        Channel::HostToDevice => 0,
        Channel::DeviceToHost => 1,
    }
}

impl SimEngine {
    pub fn new(memory: Arc<PhysMemory>, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        Self {
            memory,
            clock,
            state: Mutex::new(SimState {
                channels: [ChannelModel::after_reset(); 2],
                stream: VecDeque::new(),
                writes: Vec::new(),
                ack: Ack::Immediate,
            }),
        }
    }

    pub fn set_ack(&self, ack: Ack) {
        self.state.lock().ack = ack;
    }

    /// Every register write seen so far, in order.
    pub fn writes(&self) -> Vec<(usize, u32)> {
        self.state.lock().writes.clone()
    }

    pub fn clear_writes(&self) {
        self.state.lock().writes.clear();
    }

    /// Bytes sent by MM2S and not yet drained by S2MM.
    pub fn pending_stream(&self) -> usize {
        self.state.lock().stream.len()
    }

    fn now(&self) -> u64 {
        self.clock.now_ns().unwrap_or(0)
    }

    fn control_write(&self, st: &mut SimState, channel: Channel, value: u32) {
        let model = &mut st.channels[slot(channel)];
        let control = Control::from_bits_retain(value);
        if control.contains(Control::RESET) {
            *model = ChannelModel::after_reset();
            return;
        }
        model.control = value;
        if control.contains(Control::RUN) {
            model.status &= !Status::HALTED.bits();
        } else {
            model.status |= Status::HALTED.bits();
            model.complete_at = None;
        }
    }

    fn length_write(&self, st: &mut SimState, channel: Channel, len: u32) {
        let idx = slot(channel);
        st.channels[idx].length = len;
        let model = st.channels[idx];
        if model.control & Control::RUN.bits() == 0 || len == 0 {
            return;
        }
        let addr = u64::from(model.address);
        let moved = match channel {
            Channel::HostToDevice => {
                let mut bytes = vec![0u8; len as usize];
                let ok = self.memory.read(addr, &mut bytes);
                if ok {
                    st.stream.extend(bytes);
                }
                ok
            }
            Channel::DeviceToHost => {
                let take = (len as usize).min(st.stream.len());
                let bytes: Vec<u8> = st.stream.iter().take(take).copied().collect();
                let ok = self.memory.write(addr, &bytes);
                if ok {
                    st.stream.drain(..take);
                }
                ok
            }
        };

        let ack = st.ack;
        let now = self.now();
        let model = &mut st.channels[idx];
        if !moved {
            model.status |= (Status::HALTED | Status::DMA_DECODE_ERR | Status::ERR_IRQ).bits();
            return;
        }
        model.status &= !Status::IDLE.bits();
        match ack {
            Ack::Immediate => model.status |= Status::COMPLETE.bits(),
            Ack::Delayed(delay) => {
                model.complete_at = Some(now.saturating_add(duration_to_ns(delay)))
            }
            Ack::NeverIdle => model.status |= Status::IOC_IRQ.bits(),
            Ack::NeverComplete => {}
        }
    }

    fn status_read(&self, st: &mut SimState, channel: Channel) -> u32 {
        let now = self.now();
        let model = &mut st.channels[slot(channel)];
        if let Some(at) = model.complete_at {
            if now >= at {
                model.status |= Status::COMPLETE.bits();
                model.complete_at = None;
            }
        }
        model.status
    }
}

impl Bus for SimEngine {
    fn read(&self, offset: usize) -> u32 {
        let mut st = self.state.lock();
        let Some((channel, reg)) = Channel::decode(offset) else {
            return 0;
        };
        match reg {
            regs::STATUS => self.status_read(&mut st, channel),
            regs::CONTROL => st.channels[slot(channel)].control,
            regs::ADDRESS => st.channels[slot(channel)].address,
            _ => st.channels[slot(channel)].length,
        }
    }

    fn write(&self, offset: usize, value: u32) {
        let mut st = self.state.lock();
        st.writes.push((offset, value));
        let Some((channel, reg)) = Channel::decode(offset) else {
            return;
        };
        match reg {
            regs::CONTROL => self.control_write(&mut st, channel, value),
            regs::ADDRESS => st.channels[slot(channel)].address = value,
            regs::LENGTH => self.length_write(&mut st, channel, value),
            // Status is read-only in direct register mode.
            _ => {}
        }
    }
}

/// [`Platform`] handing out [`SimEngine`] windows and host-memory regions.
pub struct SimPlatform {
    memory: Arc<PhysMemory>,
    clock: Arc<dyn Clock + Send + Sync>,
    engines: Mutex<HashMap<u64, Arc<SimEngine>>>,
}

impl SimPlatform {
    pub fn new(clock: Arc<dyn Clock + Send + Sync>) -> Self {
        Self { memory: Arc::new(PhysMemory::new()), clock, engines: Mutex::new(HashMap::new()) }
    }

    pub fn memory(&self) -> &Arc<PhysMemory> {
        &self.memory
    }

    /// Returns the engine at `base`, creating it on first use.
    pub fn engine(&self, base: u64) -> Arc<SimEngine> {
        let mut engines = self.engines.lock();
        Arc::clone(engines.entry(base).or_insert_with(|| {
            Arc::new(SimEngine::new(Arc::clone(&self.memory), Arc::clone(&self.clock)))
        }))
    }

    /// True while some caller still holds the window mapped at `base`.
    pub fn is_mapped(&self, base: u64) -> bool {
        self.engines.lock().get(&base).is_some_and(|engine| Arc::strong_count(engine) > 1)
    }
}

impl Platform for SimPlatform {
    type Window = Arc<SimEngine>;
    type Region = RamRegion;

    fn map_window(&self, base: u64) -> Result<Arc<SimEngine>, HalError> {
        Ok(self.engine(base))
    }

    fn map_region(&self, phys: u64, len: usize) -> Result<RamRegion, HalError> {
        self.memory.region(phys, len)
    }
}
