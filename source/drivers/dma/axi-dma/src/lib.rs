// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: AXI DMA (direct register mode) channel controller
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Stable
//! TEST_COVERAGE: 11 unit tests (+ sim module tests)
//!
//! PUBLIC API:
//!   - DmaChannel: one direction of an engine (reset/halt/irq/address/length/run/status/synchronize)
//!   - AxiDma: both channels of one engine instance over a shared register window
//!   - Status/Control: register bitfields
//!   - DmaError: synchronization failures
//!
//! DEPENDENCIES:
//!   - tdma-hal::{Bus, Clock}: register access and bounded polling
//!
//! INVARIANTS:
//!   - Completion is IOC_IRQ and IDLE observed in the same status read
//!   - `synchronize` always terminates within its timeout
//!   - Register writes are unconditional; only synchronization can fail

#![forbid(unsafe_code)]

use core::fmt;
use core::time::Duration;

use bitflags::bitflags;
use log::{debug, warn};
use tdma_hal::{duration_to_ns, Bus, Clock};

#[cfg(feature = "sim")]
pub mod sim;

/// Register offsets relative to a channel base.
pub mod regs {
    /// Channel base of the MM2S (host-to-device) register bank.
    pub const MM2S_BASE: usize = 0x00;
    /// Channel base of the S2MM (device-to-host) register bank.
    pub const S2MM_BASE: usize = 0x30;

    pub const CONTROL: usize = 0x00;
    pub const STATUS: usize = 0x04;
    /// MM2S source address / S2MM destination address.
    pub const ADDRESS: usize = 0x18;
    /// MM2S transfer length / S2MM buffer length. Writing it starts the transfer.
    pub const LENGTH: usize = 0x28;
}

/// Transfer direction of one channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Memory-mapped to stream (MM2S): the engine reads host memory.
    HostToDevice,
    /// Stream to memory-mapped (S2MM): the engine writes host memory.
    DeviceToHost,
}

impl Channel {
    pub const ALL: [Channel; 2] = [Channel::HostToDevice, Channel::DeviceToHost];

    pub const fn base(self) -> usize {
        match self {
            Self::HostToDevice => regs::MM2S_BASE,
            Self::DeviceToHost => regs::S2MM_BASE,
        }
    }

    pub const fn control_offset(self) -> usize {
        self.base() + regs::CONTROL
    }

    pub const fn status_offset(self) -> usize {
        self.base() + regs::STATUS
    }

    pub const fn address_offset(self) -> usize {
        self.base() + regs::ADDRESS
    }

    pub const fn length_offset(self) -> usize {
        self.base() + regs::LENGTH
    }

    /// Decodes the wire value used by the service commands (`1` = write, `0` = read).
    pub const fn from_value(value: u32) -> Option<Self> {
        match value {
            1 => Some(Self::HostToDevice),
            0 => Some(Self::DeviceToHost),
            _ => None,
        }
    }

    pub const fn value(self) -> u32 {
        match self {
            Self::HostToDevice => 1,
            Self::DeviceToHost => 0,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::HostToDevice => "MM2S",
            Self::DeviceToHost => "S2MM",
        }
    }

    /// Resolves a register offset inside the window to its channel and
    /// channel-relative register.
    pub const fn decode(offset: usize) -> Option<(Self, usize)> {
        let (channel, reg) = if offset >= regs::S2MM_BASE {
            (Self::DeviceToHost, offset - regs::S2MM_BASE)
        } else {
            (Self::HostToDevice, offset)
        };
        match reg {
            regs::CONTROL | regs::STATUS | regs::ADDRESS | regs::LENGTH => Some((channel, reg)),
            _ => None,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

bitflags! {
    /// Channel control register.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct Control: u32 {
        const RUN = 1 << 0;
        const RESET = 1 << 2;
        const IOC_IRQ_EN = 1 << 12;
        const DLY_IRQ_EN = 1 << 13;
        const ERR_IRQ_EN = 1 << 14;
        const ALL_IRQ_EN = Self::IOC_IRQ_EN.bits() | Self::DLY_IRQ_EN.bits() | Self::ERR_IRQ_EN.bits();
    }
}

impl Control {
    /// The all-zero halt pattern.
    pub const HALT: Control = Control::empty();
}

bitflags! {
    /// Channel status register.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct Status: u32 {
        const HALTED = 1 << 0;
        const IDLE = 1 << 1;
        const SG_INCLUDED = 1 << 3;
        const DMA_INTERNAL_ERR = 1 << 4;
        const DMA_SLAVE_ERR = 1 << 5;
        const DMA_DECODE_ERR = 1 << 6;
        const SG_INTERNAL_ERR = 1 << 8;
        const SG_SLAVE_ERR = 1 << 9;
        const SG_DECODE_ERR = 1 << 10;
        const IOC_IRQ = 1 << 12;
        const DLY_IRQ = 1 << 13;
        const ERR_IRQ = 1 << 14;
    }
}

impl Status {
    /// Completion predicate: both bits must be set.
    pub const COMPLETE: Status = Status::IOC_IRQ.union(Status::IDLE);

    pub const ERRORS: Status = Status::DMA_INTERNAL_ERR
        .union(Status::DMA_SLAVE_ERR)
        .union(Status::DMA_DECODE_ERR)
        .union(Status::SG_INTERNAL_ERR)
        .union(Status::SG_SLAVE_ERR)
        .union(Status::SG_DECODE_ERR);

    pub fn is_complete(self) -> bool {
        self.contains(Self::COMPLETE)
    }

    pub fn has_error(self) -> bool {
        self.intersects(Self::ERRORS)
    }
}

const STATUS_NAMES: [(Status, &str); 11] = [
    (Status::IDLE, "idle"),
    (Status::SG_INCLUDED, "sg-included"),
    (Status::DMA_INTERNAL_ERR, "dma-internal-err"),
    (Status::DMA_SLAVE_ERR, "dma-slave-err"),
    (Status::DMA_DECODE_ERR, "dma-decode-err"),
    (Status::SG_INTERNAL_ERR, "sg-internal-err"),
    (Status::SG_SLAVE_ERR, "sg-slave-err"),
    (Status::SG_DECODE_ERR, "sg-decode-err"),
    (Status::IOC_IRQ, "ioc-irq"),
    (Status::DLY_IRQ, "dly-irq"),
    (Status::ERR_IRQ, "err-irq"),
];

impl fmt::Display for Status {
    /// Renders `0x00001002 running [idle ioc-irq]`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let run = if self.contains(Self::HALTED) { "halted" } else { "running" };
        write!(f, "{:#010x} {run} [", self.bits())?;
        let mut first = true;
        for (flag, name) in STATUS_NAMES {
            if self.contains(flag) {
                if !first {
                    f.write_str(" ")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        f.write_str("]")
    }
}

/// Software view of where a channel is in its transfer sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelState {
    /// Reset written, or nothing programmed yet through this handle.
    Reset,
    Halted,
    /// Address or length programmed, not running.
    Configured,
    Running,
    Completed,
    /// Synchronization gave up. The engine still has RUN set.
    TimedOut,
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Reset => "reset",
            Self::Halted => "halted",
            Self::Configured => "configured",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::TimedOut => "timed-out",
        };
        f.write_str(name)
    }
}

/// Error type for channel synchronization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "DMA errors must be handled"]
pub enum DmaError {
    /// Completion was not observed before the deadline.
    Timeout { channel: Channel, last: Status },
    /// The clock could not provide a timestamp, so no deadline can be enforced.
    ClockUnavailable,
}

impl fmt::Display for DmaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout { channel, last } => {
                write!(f, "{channel} transfer timed out (status {last})")
            }
            Self::ClockUnavailable => write!(f, "clock unavailable"),
        }
    }
}

/// One direction of an AXI DMA engine.
pub struct DmaChannel<B: Bus> {
    bus: B,
    channel: Channel,
    state: ChannelState,
}

impl<B: Bus> DmaChannel<B> {
    /// Creates a controller for `channel` of the engine behind `bus`.
    ///
    /// Nothing is written to the device until the first operation.
    pub fn new(bus: B, channel: Channel) -> Self {
        Self { bus, channel, state: ChannelState::Reset }
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Writes the reset bit. Does not wait for the engine to come out of reset.
    pub fn reset(&mut self) {
        self.write_control(Control::RESET);
        self.state = ChannelState::Reset;
    }

    pub fn halt(&mut self) {
        self.write_control(Control::HALT);
        self.state = ChannelState::Halted;
    }

    /// Enables completion, delay and error interrupts. Also clears RUN.
    pub fn enable_all_interrupts(&mut self) {
        self.write_control(Control::ALL_IRQ_EN);
    }

    pub fn set_memory_address(&mut self, addr: u32) {
        self.bus.write(self.channel.address_offset(), addr);
        self.mark_configured();
    }

    pub fn set_transfer_length(&mut self, len: u32) {
        self.bus.write(self.channel.length_offset(), len);
        self.mark_configured();
    }

    pub fn run(&mut self) {
        self.write_control(Control::RUN);
        self.state = ChannelState::Running;
    }

    pub fn read_status(&self) -> Status {
        Status::from_bits_retain(self.bus.read(self.channel.status_offset()))
    }

    /// Busy-polls the status register until completion or until `timeout` elapses.
    ///
    /// Each iteration performs exactly one status read; success requires
    /// IOC_IRQ and IDLE in that same read.
    pub fn synchronize(
        &mut self,
        timeout: Duration,
        clock: &impl Clock,
    ) -> Result<Status, DmaError> {
        let start = clock.now_ns().ok_or(DmaError::ClockUnavailable)?;
        let deadline = start.saturating_add(duration_to_ns(timeout));
        loop {
            let status = self.read_status();
            if status.is_complete() {
                self.state = ChannelState::Completed;
                debug!("dma-axi: {} complete status={status}", self.channel);
                return Ok(status);
            }
            let now = clock.now_ns().ok_or(DmaError::ClockUnavailable)?;
            if now >= deadline {
                self.state = ChannelState::TimedOut;
                warn!("dma-axi: {} timed out after {timeout:?} status={status}", self.channel);
                return Err(DmaError::Timeout { channel: self.channel, last: status });
            }
            clock.relax();
        }
    }

    /// reset → halt → enable-all-interrupts. Leaves the channel `Halted`.
    pub fn prepare(&mut self) {
        self.reset();
        self.halt();
        self.enable_all_interrupts();
    }

    /// set-address → run → set-length; the length write starts the engine.
    pub fn start(&mut self, addr: u32, len: u32) {
        self.set_memory_address(addr);
        self.run();
        self.set_transfer_length(len);
        debug!("dma-axi: {} started addr={addr:#x} len={len}", self.channel);
    }

    /// halt, then reset.
    pub fn teardown(&mut self) {
        self.halt();
        self.reset();
    }

    fn write_control(&self, value: Control) {
        self.bus.write(self.channel.control_offset(), value.bits());
    }

    fn mark_configured(&mut self) {
        if self.state != ChannelState::Running {
            self.state = ChannelState::Configured;
        }
    }
}

/// Both channels of one engine instance.
pub struct AxiDma<B: Bus> {
    mm2s: DmaChannel<B>,
    s2mm: DmaChannel<B>,
}

impl<B: Bus + Clone> AxiDma<B> {
    pub fn new(bus: B) -> Self {
        Self {
            mm2s: DmaChannel::new(bus.clone(), Channel::HostToDevice),
            s2mm: DmaChannel::new(bus, Channel::DeviceToHost),
        }
    }
}

impl<B: Bus> AxiDma<B> {
    pub fn channel(&self, channel: Channel) -> &DmaChannel<B> {
        match channel {
            Channel::HostToDevice => &self.mm2s,
            Channel::DeviceToHost => &self.s2mm,
        }
    }

    pub fn channel_mut(&mut self, channel: Channel) -> &mut DmaChannel<B> {
        match channel {
            Channel::HostToDevice => &mut self.mm2s,
            Channel::DeviceToHost => &mut self.s2mm,
        }
    }

    /// Returns `(HostToDevice, DeviceToHost)`; the two register banks are disjoint.
    pub fn split_mut(&mut self) -> (&mut DmaChannel<B>, &mut DmaChannel<B>) {
        (&mut self.mm2s, &mut self.s2mm)
    }

    pub fn bus(&self) -> &B {
        self.mm2s.bus()
    }
}
