// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: IPC runtime for the DMA relay services
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Stable
//! TEST_COVERAGE: Unit tests per module
//!
//! PUBLIC API:
//!   - Client trait: Client-side IPC interface
//!   - Server trait: Server-side IPC interface
//!   - Wait enum: Wait behavior for operations
//!   - IpcError: IPC error types
//!   - loopback_channel(): in-process client/server pair
//!   - IpcSession: `tdma_abi::Session` over a [`Client`]
//!   - Transport/IpcTransport/serve(): frame-level server loop
//!
//! DEPENDENCIES:
//!   - std::sync::mpsc: Host backend channels
//!   - tdma-abi: invocation frames carried by the transport

#![forbid(unsafe_code)]
#![deny(clippy::all, missing_docs)]

use core::fmt;
use core::time::Duration;

mod host;
mod serve;
mod session;

pub use host::{loopback_channel, LoopbackClient, LoopbackServer};
pub use serve::{serve, IpcTransport, Transport, TransportError};
pub use session::IpcSession;

/// Result type returned by IPC operations.
pub type Result<T> = core::result::Result<T, IpcError>;

/// Behaviour of a blocking call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Wait {
    /// Block until the operation completes.
    Blocking,
    /// Return immediately if no progress can be made.
    NonBlocking,
    /// Block until either the operation completes or the timeout expires.
    Timeout(Duration),
}

impl Wait {
    /// Returns `true` when the caller requested a non-blocking attempt.
    pub const fn is_non_blocking(self) -> bool {
        matches!(self, Self::NonBlocking)
    }

    /// Converts a [`Wait::Timeout`] variant into its [`Duration`].
    pub const fn timeout(self) -> Option<Duration> {
        match self {
            Self::Timeout(duration) => Some(duration),
            Self::Blocking | Self::NonBlocking => None,
        }
    }
}

/// Errors produced by the IPC runtime.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IpcError {
    /// Operation could not progress without blocking.
    WouldBlock,
    /// The caller exceeded the requested timeout.
    Timeout,
    /// The opposite endpoint disconnected.
    Disconnected,
    /// IPC is not available under the current build.
    Unsupported,
}

impl fmt::Display for IpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WouldBlock => write!(f, "operation would block"),
            Self::Timeout => write!(f, "operation timed out"),
            Self::Disconnected => write!(f, "peer disconnected"),
            Self::Unsupported => write!(f, "ipc not supported for this configuration"),
        }
    }
}

impl std::error::Error for IpcError {}

/// Client side of an IPC channel sending requests and receiving replies.
pub trait Client {
    /// Sends a request frame to the server.
    fn send(&self, frame: &[u8], wait: Wait) -> Result<()>;

    /// Receives a response frame from the server.
    fn recv(&self, wait: Wait) -> Result<Vec<u8>>;
}

/// Server side of an IPC channel receiving requests and delivering replies.
pub trait Server {
    /// Receives the next request frame.
    fn recv(&self, wait: Wait) -> Result<Vec<u8>>;

    /// Sends a response frame back to the caller.
    fn send(&self, frame: &[u8], wait: Wait) -> Result<()>;
}
