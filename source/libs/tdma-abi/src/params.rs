// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Four-slot tagged parameter blocks and their packed type signatures.

use core::fmt;

use crate::{Error, Result};

/// Number of parameter slots in every invocation.
pub const MAX_PARAMS: usize = 4;

/// Kind of one parameter slot. The discriminant is the 4-bit wire encoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ParamType {
    None = 0,
    ValueIn = 1,
    ValueOut = 2,
    ValueInOut = 3,
    BufferIn = 5,
    BufferOut = 6,
    BufferInOut = 7,
}

impl ParamType {
    pub const fn from_nibble(nibble: u8) -> Option<Self> {
        match nibble {
            0 => Some(Self::None),
            1 => Some(Self::ValueIn),
            2 => Some(Self::ValueOut),
            3 => Some(Self::ValueInOut),
            5 => Some(Self::BufferIn),
            6 => Some(Self::BufferOut),
            7 => Some(Self::BufferInOut),
            _ => None,
        }
    }

    pub const fn is_output(self) -> bool {
        matches!(self, Self::ValueOut | Self::ValueInOut | Self::BufferOut | Self::BufferInOut)
    }

    /// Type the slot has in a reply: input-only slots are dropped.
    pub const fn reply_type(self) -> Self {
        if self.is_output() {
            self
        } else {
            Self::None
        }
    }

    const fn label(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::ValueIn => "value-in",
            Self::ValueOut => "value-out",
            Self::ValueInOut => "value-inout",
            Self::BufferIn => "buffer-in",
            Self::BufferOut => "buffer-out",
            Self::BufferInOut => "buffer-inout",
        }
    }
}

/// Packed signature: slot `i` lives in bits `4i..4i+3`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ParamTypes(u32);

impl ParamTypes {
    pub const NONE: ParamTypes = ParamTypes(0);

    pub const fn new(t0: ParamType, t1: ParamType, t2: ParamType, t3: ParamType) -> Self {
        Self((t0 as u32) | (t1 as u32) << 4 | (t2 as u32) << 8 | (t3 as u32) << 12)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Validates a signature received from the wire.
    pub fn from_raw(raw: u32) -> Result<Self> {
        if raw >> 16 != 0 {
            return Err(Error::Malformed);
        }
        for slot in 0..MAX_PARAMS {
            if ParamType::from_nibble(((raw >> (slot * 4)) & 0xF) as u8).is_none() {
                return Err(Error::Malformed);
            }
        }
        Ok(Self(raw))
    }

    pub fn get(self, slot: usize) -> ParamType {
        ParamType::from_nibble(((self.0 >> (slot * 4)) & 0xF) as u8).unwrap_or(ParamType::None)
    }
}

impl fmt::Display for ParamTypes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {}, {})",
            self.get(0).label(),
            self.get(1).label(),
            self.get(2).label(),
            self.get(3).label()
        )
    }
}

/// One parameter slot.
///
/// Value slots carry two 32-bit words. An output buffer is sized by the caller;
/// the callee fills it and may shrink it to the number of bytes produced.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Param {
    #[default]
    None,
    ValueIn { a: u32, b: u32 },
    ValueOut { a: u32, b: u32 },
    ValueInOut { a: u32, b: u32 },
    BufferIn(Vec<u8>),
    BufferOut(Vec<u8>),
    BufferInOut(Vec<u8>),
}

impl Param {
    pub fn value(a: u32, b: u32) -> Self {
        Self::ValueIn { a, b }
    }

    /// Output value slot, zero until the callee fills it.
    pub fn value_out() -> Self {
        Self::ValueOut { a: 0, b: 0 }
    }

    /// Output buffer of `capacity` zeroed bytes.
    pub fn buffer_out(capacity: usize) -> Self {
        Self::BufferOut(vec![0; capacity])
    }

    pub fn kind(&self) -> ParamType {
        match self {
            Self::None => ParamType::None,
            Self::ValueIn { .. } => ParamType::ValueIn,
            Self::ValueOut { .. } => ParamType::ValueOut,
            Self::ValueInOut { .. } => ParamType::ValueInOut,
            Self::BufferIn(_) => ParamType::BufferIn,
            Self::BufferOut(_) => ParamType::BufferOut,
            Self::BufferInOut(_) => ParamType::BufferInOut,
        }
    }
}

/// The four slots of one invocation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Params([Param; MAX_PARAMS]);

impl Params {
    pub fn new(slots: [Param; MAX_PARAMS]) -> Self {
        Self(slots)
    }

    /// Fills the leading slots from `slots`; the rest stay `None`.
    pub fn from_slots(slots: impl IntoIterator<Item = Param>) -> Self {
        let mut params = Self::default();
        for (dst, src) in params.0.iter_mut().zip(slots) {
            *dst = src;
        }
        params
    }

    pub fn types(&self) -> ParamTypes {
        ParamTypes::new(self.0[0].kind(), self.0[1].kind(), self.0[2].kind(), self.0[3].kind())
    }

    /// Exact signature match.
    pub fn expect(&self, expected: ParamTypes) -> Result<()> {
        if self.types() == expected {
            Ok(())
        } else {
            Err(Error::BadParameters)
        }
    }

    pub fn get(&self, slot: usize) -> &Param {
        &self.0[slot]
    }

    pub fn get_mut(&mut self, slot: usize) -> &mut Param {
        &mut self.0[slot]
    }

    pub fn set(&mut self, slot: usize, param: Param) {
        self.0[slot] = param;
    }

    pub fn take(&mut self, slot: usize) -> Param {
        core::mem::take(&mut self.0[slot])
    }

    pub fn slots(&self) -> &[Param; MAX_PARAMS] {
        &self.0
    }

    /// `(a, b)` of an input-bearing value slot.
    pub fn value(&self, slot: usize) -> Option<(u32, u32)> {
        match self.0[slot] {
            Param::ValueIn { a, b } | Param::ValueInOut { a, b } => Some((a, b)),
            _ => None,
        }
    }

    /// Contents of any buffer slot.
    pub fn buffer(&self, slot: usize) -> Option<&[u8]> {
        match &self.0[slot] {
            Param::BufferIn(data) | Param::BufferOut(data) | Param::BufferInOut(data) => {
                Some(data)
            }
            _ => None,
        }
    }

    /// Reply form: input-only slots are cleared, outputs are kept.
    pub fn into_reply(self) -> Self {
        Self(self.0.map(|param| if param.kind().is_output() { param } else { Param::None }))
    }
}

impl From<[Param; MAX_PARAMS]> for Params {
    fn from(slots: [Param; MAX_PARAMS]) -> Self {
        Self(slots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRANSFER: ParamTypes = ParamTypes::new(
        ParamType::BufferIn,
        ParamType::ValueIn,
        ParamType::None,
        ParamType::None,
    );

    #[test]
    fn signature_packs_nibbles() {
        assert_eq!(TRANSFER.raw(), 0x0015);
        assert_eq!(TRANSFER.get(0), ParamType::BufferIn);
        assert_eq!(TRANSFER.get(1), ParamType::ValueIn);
        assert_eq!(TRANSFER.to_string(), "(buffer-in, value-in, none, none)");
    }

    #[test]
    fn from_raw_rejects_reserved_encodings() {
        assert!(ParamTypes::from_raw(0x6001).is_ok());
        assert_eq!(ParamTypes::from_raw(0x0004), Err(Error::Malformed));
        assert_eq!(ParamTypes::from_raw(0x0008), Err(Error::Malformed));
        assert_eq!(ParamTypes::from_raw(0x1_0000), Err(Error::Malformed));
    }

    #[test]
    fn expect_is_exact() {
        let params = Params::from_slots([Param::BufferIn(vec![1]), Param::value(1, 0)]);
        assert!(params.expect(TRANSFER).is_ok());

        // Same kinds in a different order.
        let swapped = Params::from_slots([Param::value(1, 0), Param::BufferIn(vec![1])]);
        assert_eq!(swapped.expect(TRANSFER), Err(Error::BadParameters));

        // Output where an input is expected.
        let coerced = Params::from_slots([Param::BufferInOut(vec![1]), Param::value(1, 0)]);
        assert_eq!(coerced.expect(TRANSFER), Err(Error::BadParameters));

        // Extra trailing slot.
        let extra =
            Params::from_slots([Param::BufferIn(vec![1]), Param::value(1, 0), Param::value_out()]);
        assert_eq!(extra.expect(TRANSFER), Err(Error::BadParameters));
    }

    #[test]
    fn reply_keeps_only_outputs() {
        let params = Params::from_slots([
            Param::BufferIn(vec![1, 2]),
            Param::value(3, 4),
            Param::ValueOut { a: 5, b: 6 },
            Param::BufferOut(vec![7]),
        ]);
        let reply = params.into_reply();
        assert_eq!(reply.get(0), &Param::None);
        assert_eq!(reply.get(1), &Param::None);
        assert_eq!(reply.get(2), &Param::ValueOut { a: 5, b: 6 });
        assert_eq!(reply.buffer(3), Some(&[7u8][..]));
        assert_eq!(reply.types().get(2), ParamType::ValueOut.reply_type());
        assert_eq!(ParamType::BufferIn.reply_type(), ParamType::None);
    }
}
