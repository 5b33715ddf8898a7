// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Typed driver-service requests.
//!
//! Every command re-validates its own exact signature; nothing validated by an
//! earlier command is trusted.

use dma_axi::Channel;
use tdma_abi::ParamType::{BufferIn, BufferOut, None as Empty, ValueIn};
use tdma_abi::{dmad, Error, Param, ParamTypes, Params, Result};

pub const INIT_SIG: ParamTypes = ParamTypes::new(ValueIn, Empty, Empty, Empty);
pub const TRANSFER_SIG: ParamTypes = ParamTypes::new(BufferIn, ValueIn, Empty, Empty);
pub const SYNC_SIG: ParamTypes = ParamTypes::new(ValueIn, Empty, Empty, Empty);
pub const READ_SIG: ParamTypes = ParamTypes::new(ValueIn, BufferOut, Empty, Empty);

/// One channel of one engine instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Target {
    pub engine: u32,
    pub channel: Channel,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Request {
    Init(Target),
    Transfer { target: Target, data: Vec<u8> },
    Sync(Target),
    /// Copy `len` bytes of the destination region into output slot 1.
    Read { engine: u32, len: usize },
}

impl Request {
    /// Validates `params` against the signature of `cmd` and extracts the request.
    ///
    /// Input buffers are moved out of `params`.
    pub fn parse(cmd: u32, params: &mut Params) -> Result<Self> {
        match cmd {
            dmad::INIT => {
                params.expect(INIT_SIG)?;
                Ok(Self::Init(target(params, 0)?))
            }
            dmad::TRANSFER => {
                params.expect(TRANSFER_SIG)?;
                let target = target(params, 1)?;
                let Param::BufferIn(data) = params.take(0) else {
                    return Err(Error::BadParameters);
                };
                Ok(Self::Transfer { target, data })
            }
            dmad::SYNC => {
                params.expect(SYNC_SIG)?;
                Ok(Self::Sync(target(params, 0)?))
            }
            dmad::READ => {
                params.expect(READ_SIG)?;
                let (len, engine) = params.value(0).ok_or(Error::BadParameters)?;
                let capacity = params.buffer(1).map_or(0, <[u8]>::len);
                let len = len as usize;
                if len > capacity {
                    return Err(Error::BadParameters);
                }
                Ok(Self::Read { engine, len })
            }
            _ => Err(Error::NotSupported),
        }
    }

    pub fn engine(&self) -> u32 {
        match self {
            Self::Init(target) | Self::Sync(target) | Self::Transfer { target, .. } => {
                target.engine
            }
            Self::Read { engine, .. } => *engine,
        }
    }
}

fn target(params: &Params, slot: usize) -> Result<Target> {
    let (channel, engine) = params.value(slot).ok_or(Error::BadParameters)?;
    let channel = Channel::from_value(channel).ok_or(Error::BadParameters)?;
    Ok(Target { engine, channel })
}
