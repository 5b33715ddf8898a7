// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Frame-level server loop shared by the DMA services.

use log::{debug, error, warn};
use tdma_abi::wire::{self, Reply};
use tdma_abi::Params;
use thiserror::Error;

use crate::{IpcError, Server, Wait};

/// Transport abstraction used by the service loops.
pub trait Transport {
    /// Error surfaced by the transport implementation.
    type Error: Into<TransportError>;

    /// Receives the next frame, or `None` once the peer is gone.
    fn recv(&mut self) -> core::result::Result<Option<Vec<u8>>, Self::Error>;

    /// Sends a response frame back to the caller.
    fn send(&mut self, frame: &[u8]) -> core::result::Result<(), Self::Error>;
}

/// Transport backed by a [`Server`] endpoint.
pub struct IpcTransport<T> {
    server: T,
}

impl<T> IpcTransport<T> {
    /// Wraps the provided server handle.
    pub fn new(server: T) -> Self {
        Self { server }
    }
}

impl<T: Server> Transport for IpcTransport<T> {
    type Error = IpcError;

    fn recv(&mut self) -> core::result::Result<Option<Vec<u8>>, Self::Error> {
        match self.server.recv(Wait::Blocking) {
            Ok(frame) => Ok(Some(frame)),
            Err(IpcError::Disconnected) => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn send(&mut self, frame: &[u8]) -> core::result::Result<(), Self::Error> {
        self.server.send(frame, Wait::Blocking)
    }
}

/// Transport level failures surfaced by [`Transport`].
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection closed by the peer.
    #[error("transport closed")]
    Closed,
    /// Transport unsupported on this platform.
    #[error("transport unsupported")]
    Unsupported,
    /// Any other failure category.
    #[error("transport error: {0}")]
    Other(String),
}

impl From<IpcError> for TransportError {
    fn from(value: IpcError) -> Self {
        match value {
            IpcError::Disconnected => Self::Closed,
            IpcError::Unsupported => Self::Unsupported,
            IpcError::WouldBlock | IpcError::Timeout => {
                Self::Other("operation timed out".to_string())
            }
        }
    }
}

/// Serves invocation frames from `transport` until the peer disconnects.
///
/// Each request is decoded and handed to `handler`. Its outcome goes back as a
/// reply with the same command and nonce. A request whose header is readable
/// but whose body is not gets a `Malformed` reply. Anything else is dropped.
pub fn serve<T, H>(name: &str, transport: &mut T, mut handler: H) -> Result<(), TransportError>
where
    T: Transport,
    H: FnMut(u32, Params) -> tdma_abi::Result<Params>,
{
    while let Some(frame) = transport.recv().map_err(Into::<TransportError>::into)? {
        if frame.is_empty() {
            continue;
        }
        let reply = match wire::decode_request(&frame) {
            Ok(request) => {
                let outcome = handler(request.cmd, request.params);
                debug!(
                    "{name}: cmd={:#06x} nonce={} -> {:#010x}",
                    request.cmd,
                    request.nonce,
                    tdma_abi::code_of(&outcome)
                );
                Reply::to(request.cmd, request.nonce, outcome)
            }
            Err(err) => match wire::peek_request_header(&frame) {
                Some((cmd, nonce)) => {
                    warn!("{name}: rejecting request cmd={cmd:#06x}: {err}");
                    Reply::to(cmd, nonce, Err(err))
                }
                None => {
                    error!("{name}: dropping undecodable frame ({} bytes)", frame.len());
                    continue;
                }
            },
        };
        let encoded = wire::encode_reply(&reply).or_else(|err| {
            error!("{name}: reply to cmd={:#06x} not encodable: {err}", reply.cmd);
            wire::encode_reply(&Reply::to(reply.cmd, reply.nonce, Err(err)))
        });
        match encoded {
            Ok(bytes) => transport.send(&bytes).map_err(Into::<TransportError>::into)?,
            Err(err) => error!("{name}: dropping reply: {err}"),
        }
    }
    Ok(())
}
