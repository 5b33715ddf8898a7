// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Invocation model shared by the DMA driver service, the relay and their callers
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Stable
//! TEST_COVERAGE: Unit tests per module + tests/wire.rs (proptest)
//!
//! PUBLIC API:
//!   - Param/Params/ParamType/ParamTypes: four-slot tagged parameter blocks
//!   - Error/Result: result codes carried across every hop
//!   - Session: "invoke a command on an opaque session" contract
//!   - wire: versioned request/reply frames
//!   - dmad/relay: command identifiers
//!
//! INVARIANTS:
//!   - Parameter signatures are compared as whole words, never slot by slot
//!   - Decoders never panic on untrusted input

#![forbid(unsafe_code)]

mod error;
mod params;
mod session;
pub mod wire;

pub use error::{check, code_of, Error, Result, SUCCESS};
pub use params::{Param, ParamType, ParamTypes, Params, MAX_PARAMS};
pub use session::Session;

/// Commands served by the restricted driver service.
pub mod dmad {
    /// `(ValueIn{a=channel, b=engine})`
    pub const INIT: u32 = 0x0100;
    /// `(BufferIn, ValueIn{a=channel, b=engine})`
    pub const TRANSFER: u32 = 0x0101;
    /// `(ValueIn{a=channel, b=engine})`
    pub const SYNC: u32 = 0x0102;
    /// `(ValueIn{a=length, b=engine}, BufferOut)`
    pub const READ: u32 = 0x0103;
}

/// Caller-facing commands served by the relay.
pub mod relay {
    /// `(BufferIn, ValueIn{a=direction, b=engine})`
    pub const TRANSFER: u32 = 0;
    /// `(ValueIn{a=length, b=engine}, BufferOut)`
    pub const READ_OUTPUT: u32 = 1;
    /// `(ValueIn{a=direction, b=engine}, ValueOut{a=init code, b=sync code})`
    ///
    /// Outcome of the last TRANSFER on that channel.
    pub const REPORT: u32 = 2;
}
