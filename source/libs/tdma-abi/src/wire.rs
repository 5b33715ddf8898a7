// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Invocation wire protocol v1 (versioned byte frames; bounded inputs)
//!
//! Request: `[T, D, ver, 0x00, cmd:u32le, nonce:u32le, types:u32le, slots...]`
//! Reply:   `[T, D, ver, 0x80, cmd:u32le, nonce:u32le, code:u32le, types:u32le, slots...]`
//!
//! Slot payloads in a request: value-in/inout `a:u32le b:u32le`, buffer-in/inout
//! `len:u32le bytes`, buffer-out `capacity:u32le`, value-out nothing.
//! In a reply only output slots are present: values as `a b`, buffers as `len bytes`.

use crate::{Error, Param, ParamType, ParamTypes, Params, Result, MAX_PARAMS};

pub const MAGIC0: u8 = b'T';
pub const MAGIC1: u8 = b'D';
pub const VERSION: u8 = 1;

pub const KIND_REQUEST: u8 = 0x00;
pub const KIND_REPLY: u8 = 0x80;

/// Largest buffer a single slot may carry.
pub const MAX_BUFFER_LEN: usize = 64 * 1024;

pub const REQUEST_HEADER_LEN: usize = 16;
pub const REPLY_HEADER_LEN: usize = 20;

/// A decoded request frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Request {
    pub cmd: u32,
    pub nonce: u32,
    pub params: Params,
}

/// A decoded reply frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reply {
    pub cmd: u32,
    pub nonce: u32,
    pub code: u32,
    pub params: Params,
}

impl Reply {
    /// Builds the reply to `request` from the handler's outcome.
    pub fn to(cmd: u32, nonce: u32, outcome: Result<Params>) -> Self {
        match outcome {
            Ok(params) => Self { cmd, nonce, code: crate::SUCCESS, params: params.into_reply() },
            Err(err) => Self { cmd, nonce, code: err.code(), params: Params::default() },
        }
    }

    pub fn into_result(self) -> Result<Params> {
        crate::check(self.code).map(|()| self.params)
    }
}

pub fn encode_request(req: &Request) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(REQUEST_HEADER_LEN + 16);
    out.extend_from_slice(&[MAGIC0, MAGIC1, VERSION, KIND_REQUEST]);
    out.extend_from_slice(&req.cmd.to_le_bytes());
    out.extend_from_slice(&req.nonce.to_le_bytes());
    out.extend_from_slice(&req.params.types().raw().to_le_bytes());
    for param in req.params.slots() {
        match param {
            Param::None | Param::ValueOut { .. } => {}
            Param::ValueIn { a, b } | Param::ValueInOut { a, b } => put_value(&mut out, *a, *b),
            Param::BufferIn(data) | Param::BufferInOut(data) => put_buffer(&mut out, data)?,
            Param::BufferOut(data) => put_len(&mut out, data.len())?,
        }
    }
    Ok(out)
}

pub fn decode_request(frame: &[u8]) -> Result<Request> {
    let mut rd = Reader::new(frame);
    rd.header(KIND_REQUEST)?;
    let cmd = rd.u32()?;
    let nonce = rd.u32()?;
    let types = ParamTypes::from_raw(rd.u32()?)?;
    let mut params = Params::default();
    for slot in 0..MAX_PARAMS {
        let param = match types.get(slot) {
            ParamType::None => Param::None,
            ParamType::ValueOut => Param::value_out(),
            ParamType::ValueIn => {
                let (a, b) = rd.value()?;
                Param::ValueIn { a, b }
            }
            ParamType::ValueInOut => {
                let (a, b) = rd.value()?;
                Param::ValueInOut { a, b }
            }
            ParamType::BufferIn => Param::BufferIn(rd.buffer()?),
            ParamType::BufferInOut => Param::BufferInOut(rd.buffer()?),
            ParamType::BufferOut => Param::buffer_out(rd.len()?),
        };
        params.set(slot, param);
    }
    rd.finish()?;
    Ok(Request { cmd, nonce, params })
}

pub fn encode_reply(reply: &Reply) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(REPLY_HEADER_LEN + 16);
    out.extend_from_slice(&[MAGIC0, MAGIC1, VERSION, KIND_REPLY]);
    out.extend_from_slice(&reply.cmd.to_le_bytes());
    out.extend_from_slice(&reply.nonce.to_le_bytes());
    out.extend_from_slice(&reply.code.to_le_bytes());
    let params = reply.params.clone().into_reply();
    out.extend_from_slice(&params.types().raw().to_le_bytes());
    for param in params.slots() {
        match param {
            Param::ValueOut { a, b } | Param::ValueInOut { a, b } => put_value(&mut out, *a, *b),
            Param::BufferOut(data) | Param::BufferInOut(data) => put_buffer(&mut out, data)?,
            _ => {}
        }
    }
    Ok(out)
}

pub fn decode_reply(frame: &[u8]) -> Result<Reply> {
    let mut rd = Reader::new(frame);
    rd.header(KIND_REPLY)?;
    let cmd = rd.u32()?;
    let nonce = rd.u32()?;
    let code = rd.u32()?;
    let types = ParamTypes::from_raw(rd.u32()?)?;
    let mut params = Params::default();
    for slot in 0..MAX_PARAMS {
        let param = match types.get(slot) {
            ParamType::None => Param::None,
            ParamType::ValueOut => {
                let (a, b) = rd.value()?;
                Param::ValueOut { a, b }
            }
            ParamType::ValueInOut => {
                let (a, b) = rd.value()?;
                Param::ValueInOut { a, b }
            }
            ParamType::BufferOut => Param::BufferOut(rd.buffer()?),
            ParamType::BufferInOut => Param::BufferInOut(rd.buffer()?),
            ParamType::ValueIn | ParamType::BufferIn => return Err(Error::Malformed),
        };
        params.set(slot, param);
    }
    rd.finish()?;
    Ok(Reply { cmd, nonce, code, params })
}

/// Reads `(cmd, nonce)` from a request frame whose body may be invalid, so the
/// caller can still be told why its request was refused.
pub fn peek_request_header(frame: &[u8]) -> Option<(u32, u32)> {
    let mut rd = Reader::new(frame);
    rd.header(KIND_REQUEST).ok()?;
    Some((rd.u32().ok()?, rd.u32().ok()?))
}

fn put_value(out: &mut Vec<u8>, a: u32, b: u32) {
    out.extend_from_slice(&a.to_le_bytes());
    out.extend_from_slice(&b.to_le_bytes());
}

fn put_len(out: &mut Vec<u8>, len: usize) -> Result<()> {
    if len > MAX_BUFFER_LEN {
        return Err(Error::BadParameters);
    }
    out.extend_from_slice(&(len as u32).to_le_bytes());
    Ok(())
}

fn put_buffer(out: &mut Vec<u8>, data: &[u8]) -> Result<()> {
    put_len(out, data.len())?;
    out.extend_from_slice(data);
    Ok(())
}

struct Reader<'a> {
    frame: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(frame: &'a [u8]) -> Self {
        Self { frame, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(n).ok_or(Error::Malformed)?;
        let bytes = self.frame.get(self.pos..end).ok_or(Error::Malformed)?;
        self.pos = end;
        Ok(bytes)
    }

    fn header(&mut self, kind: u8) -> Result<()> {
        match self.take(4)? {
            [MAGIC0, MAGIC1, VERSION, k] if *k == kind => Ok(()),
            _ => Err(Error::Malformed),
        }
    }

    fn u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn value(&mut self) -> Result<(u32, u32)> {
        Ok((self.u32()?, self.u32()?))
    }

    fn len(&mut self) -> Result<usize> {
        let len = self.u32()? as usize;
        if len > MAX_BUFFER_LEN {
            return Err(Error::Malformed);
        }
        Ok(len)
    }

    fn buffer(&mut self) -> Result<Vec<u8>> {
        let len = self.len()?;
        Ok(self.take(len)?.to_vec())
    }

    fn finish(&self) -> Result<()> {
        if self.pos == self.frame.len() {
            Ok(())
        } else {
            Err(Error::Malformed)
        }
    }
}
