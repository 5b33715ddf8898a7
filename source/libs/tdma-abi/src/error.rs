// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

/// Result code of a successful invocation.
pub const SUCCESS: u32 = 0x0000_0000;

/// Failure of an invocation, carried on the wire as a 32-bit result code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum Error {
    #[error("generic failure")]
    Generic,
    #[error("bad parameters")]
    BadParameters,
    #[error("bad state")]
    BadState,
    #[error("not supported")]
    NotSupported,
    #[error("busy")]
    Busy,
    #[error("communication failure")]
    Communication,
    #[error("malformed frame")]
    Malformed,
    #[error("timeout")]
    Timeout,
    /// A non-zero code this build does not know.
    #[error("unknown result code {0:#010x}")]
    Unknown(u32),
}

pub type Result<T> = core::result::Result<T, Error>;

impl Error {
    pub const fn code(self) -> u32 {
        match self {
            Self::Generic => 0xFFFF_0000,
            Self::Malformed => 0xFFFF_0005,
            Self::BadParameters => 0xFFFF_0006,
            Self::BadState => 0xFFFF_0007,
            Self::NotSupported => 0xFFFF_000A,
            Self::Busy => 0xFFFF_000D,
            Self::Communication => 0xFFFF_000E,
            Self::Timeout => 0xFFFF_3001,
            Self::Unknown(code) => code,
        }
    }

    /// Maps a non-zero result code back to an error.
    pub const fn from_code(code: u32) -> Self {
        match code {
            0xFFFF_0000 => Self::Generic,
            0xFFFF_0005 => Self::Malformed,
            0xFFFF_0006 => Self::BadParameters,
            0xFFFF_0007 => Self::BadState,
            0xFFFF_000A => Self::NotSupported,
            0xFFFF_000D => Self::Busy,
            0xFFFF_000E => Self::Communication,
            0xFFFF_3001 => Self::Timeout,
            other => Self::Unknown(other),
        }
    }
}

/// Converts a wire result code into a `Result`.
pub fn check(code: u32) -> Result<()> {
    if code == SUCCESS {
        Ok(())
    } else {
        Err(Error::from_code(code))
    }
}

/// Wire result code of an outcome.
pub fn code_of<T>(result: &Result<T>) -> u32 {
    match result {
        Ok(_) => SUCCESS,
        Err(err) => err.code(),
    }
}
