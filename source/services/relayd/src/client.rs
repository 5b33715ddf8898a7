// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

use dma_axi::Channel;
use tdma_abi::{relay, Error, Param, Params, Result, Session};

use crate::dispatcher::TransferReport;

/// Typed caller-side view of the relay protocol.
pub struct RelayClient<S> {
    session: S,
    engine: u32,
}

impl<S: Session> RelayClient<S> {
    /// Binds `session` to one engine instance.
    pub fn new(session: S, engine: u32) -> Self {
        Self { session, engine }
    }

    /// Engine every call targets.
    pub fn engine(&self) -> u32 {
        self.engine
    }

    /// Moves `data` through the engine in `direction` and fetches the report
    /// of the INIT and SYNC steps.
    pub fn transfer(&mut self, direction: Channel, data: &[u8]) -> Result<TransferReport> {
        let params = Params::from_slots([
            Param::BufferIn(data.to_vec()),
            Param::value(direction.value(), self.engine),
        ]);
        self.session.invoke(relay::TRANSFER, params)?;
        self.last_report(direction)
    }

    /// Report of the last transfer on `direction`. Another caller driving the
    /// same channel replaces it.
    pub fn last_report(&mut self, direction: Channel) -> Result<TransferReport> {
        let params =
            Params::from_slots([Param::value(direction.value(), self.engine), Param::value_out()]);
        let reply = self.session.invoke(relay::REPORT, params)?;
        match reply.get(1) {
            Param::ValueOut { a, b } => Ok(TransferReport::from_codes(*a, *b)),
            _ => Err(Error::Communication),
        }
    }

    /// Reads `len` bytes of the engine's destination region.
    pub fn read_output(&mut self, len: usize) -> Result<Vec<u8>> {
        let wire_len = u32::try_from(len).map_err(|_| Error::BadParameters)?;
        let params = Params::from_slots([Param::value(wire_len, self.engine), Param::buffer_out(len)]);
        let mut reply = self.session.invoke(relay::READ_OUTPUT, params)?;
        match reply.take(1) {
            Param::BufferOut(data) => Ok(data),
            _ => Err(Error::Communication),
        }
    }
}
