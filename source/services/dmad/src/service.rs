// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Restricted driver service: the only holder of DMA engine mappings.
//!
//! SECURITY INVARIANTS:
//!   - A request with the wrong signature never reaches a register
//!   - Transfer payloads and read-back bytes are never logged
//!   - Caller buffers are staged through service-owned regions; the caller
//!     never supplies a physical address

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dma_axi::{AxiDma, Channel, ChannelState, DmaError};
use log::{debug, error, info, warn};
use tdma_abi::{Error, Param, Params, Result, Session};
use tdma_hal::{Clock, DmaBuffer, Platform};

use crate::config::{EngineConfig, ServiceConfig};
use crate::request::{Request, Target};

/// One mapped engine: its register window and its two DMA regions.
struct Engine<P: Platform> {
    dma: AxiDma<Arc<P::Window>>,
    source: P::Region,
    dest: P::Region,
}

impl<P: Platform> Engine<P> {
    fn map(platform: &P, layout: &EngineConfig) -> core::result::Result<Self, tdma_hal::HalError> {
        let window = Arc::new(platform.map_window(layout.base)?);
        let source = platform.map_region(layout.source_addr, layout.region_len)?;
        let dest = platform.map_region(layout.dest_addr, layout.region_len)?;
        Ok(Self { dma: AxiDma::new(window), source, dest })
    }
}

/// Command handler over the engines described by a [`ServiceConfig`].
///
/// Engines are mapped on their first INIT and stay mapped until
/// [`DriverService::shutdown`] or drop.
pub struct DriverService<P: Platform, C: Clock> {
    platform: P,
    clock: C,
    sync_timeout: Duration,
    layouts: Vec<EngineConfig>,
    engines: HashMap<u32, Engine<P>>,
}

impl<P: Platform, C: Clock> DriverService<P, C> {
    pub fn new(platform: P, clock: C, config: &ServiceConfig) -> Self {
        Self {
            platform,
            clock,
            sync_timeout: config.sync_timeout(),
            layouts: config.engines.clone(),
            engines: HashMap::new(),
        }
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    /// Dispatches one command. On success `params` comes back with its output
    /// slots filled.
    pub fn handle(&mut self, cmd: u32, mut params: Params) -> Result<Params> {
        let request = Request::parse(cmd, &mut params).map_err(|err| {
            debug!("dmad: rejected cmd={cmd:#06x}: {err}");
            err
        })?;
        match request {
            Request::Init(target) => self.init(target)?,
            Request::Transfer { target, data } => self.transfer(target, &data)?,
            Request::Sync(target) => self.sync(target)?,
            Request::Read { engine, len } => {
                let data = self.read(engine, len)?;
                params.set(1, Param::BufferOut(data));
            }
        }
        Ok(params)
    }

    /// Software state of a channel, if its engine is mapped.
    pub fn channel_state(&self, engine: u32, channel: Channel) -> Option<ChannelState> {
        self.engines.get(&engine).map(|e| e.dma.channel(channel).state())
    }

    pub fn is_mapped(&self, engine: u32) -> bool {
        self.engines.contains_key(&engine)
    }

    /// Halts every mapped engine and releases its window and regions.
    pub fn shutdown(&mut self) {
        for (id, mut engine) in self.engines.drain() {
            let (tx, rx) = engine.dma.split_mut();
            tx.teardown();
            rx.teardown();
            info!("dmad: engine {id} unmapped");
        }
    }

    fn init(&mut self, target: Target) -> Result<()> {
        let layout = self.layout(target.engine)?;
        if !self.engines.contains_key(&target.engine) {
            let engine = Engine::map(&self.platform, &layout).map_err(|err| {
                error!("dmad: engine {} map failed: {err}", target.engine);
                Error::Generic
            })?;
            info!("dmad: engine {} mapped window={:#x}", target.engine, layout.base);
            self.engines.insert(target.engine, engine);
        }
        let engine = self.engine_mut(target.engine)?;
        engine.dma.channel_mut(target.channel).prepare();
        debug!("dmad: engine {} {} prepared", target.engine, target.channel);
        Ok(())
    }

    fn transfer(&mut self, target: Target, data: &[u8]) -> Result<()> {
        self.layout(target.engine)?;
        let engine = self.engine_mut(target.engine)?;
        let state = engine.dma.channel(target.channel).state();
        if state != ChannelState::Halted {
            warn!("dmad: engine {} {} not initialised ({state})", target.engine, target.channel);
            return Err(Error::BadState);
        }
        let region = match target.channel {
            Channel::HostToDevice => &engine.source,
            Channel::DeviceToHost => &engine.dest,
        };
        if data.is_empty() || data.len() > region.len() {
            return Err(Error::BadParameters);
        }
        if target.channel == Channel::HostToDevice {
            region.write_at(0, data);
        }
        let addr = u32::try_from(region.phys_addr()).map_err(|_| Error::Generic)?;
        let len = u32::try_from(data.len()).map_err(|_| Error::BadParameters)?;
        engine.dma.channel_mut(target.channel).start(addr, len);
        Ok(())
    }

    fn sync(&mut self, target: Target) -> Result<()> {
        self.layout(target.engine)?;
        let timeout = self.sync_timeout;
        let clock = &self.clock;
        let engine = self.engines.get_mut(&target.engine).ok_or(Error::BadState)?;
        match engine.dma.channel_mut(target.channel).synchronize(timeout, clock) {
            Ok(_) => Ok(()),
            Err(err @ DmaError::Timeout { .. }) => {
                warn!("dmad: engine {}: {err}", target.engine);
                Err(Error::Timeout)
            }
            Err(err @ DmaError::ClockUnavailable) => {
                error!("dmad: engine {}: {err}", target.engine);
                Err(Error::Generic)
            }
        }
    }

    fn read(&mut self, engine: u32, len: usize) -> Result<Vec<u8>> {
        self.layout(engine)?;
        let engine = self.engine_mut(engine)?;
        if len > engine.dest.len() {
            return Err(Error::BadParameters);
        }
        let mut out = vec![0; len];
        engine.dest.read_at(0, &mut out);
        Ok(out)
    }

    fn layout(&self, engine: u32) -> Result<EngineConfig> {
        self.layouts.iter().find(|l| l.id == engine).cloned().ok_or(Error::BadParameters)
    }

    fn engine_mut(&mut self, engine: u32) -> Result<&mut Engine<P>> {
        self.engines.get_mut(&engine).ok_or(Error::BadState)
    }
}

impl<P: Platform, C: Clock> Session for DriverService<P, C> {
    fn invoke(&mut self, cmd: u32, params: Params) -> Result<Params> {
        self.handle(cmd, params).map(Params::into_reply)
    }
}
