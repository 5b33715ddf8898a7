// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: In-process IPC emulation: one bidirectional frame channel per connection
//!
//! OWNERS: @runtime
//!
//! SECURITY INVARIANTS:
//!   - Frame boundaries are preserved
//!   - Timeouts bound every blocking receive
//!
//! ERROR CONDITIONS:
//!   - IpcError::Disconnected: peer dropped its end
//!   - IpcError::WouldBlock: nothing queued in non-blocking mode
//!   - IpcError::Timeout: nothing arrived before the deadline

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};

use parking_lot::Mutex;

use crate::{Client, IpcError, Result, Server, Wait};

/// Creates a loopback client/server pair backed by in-memory channels.
pub fn loopback_channel() -> (LoopbackClient, LoopbackServer) {
    let (req_tx, req_rx) = mpsc::channel::<Vec<u8>>();
    let (rsp_tx, rsp_rx) = mpsc::channel::<Vec<u8>>();
    (
        LoopbackClient { request_tx: req_tx, response_rx: Mutex::new(rsp_rx) },
        LoopbackServer { request_rx: Mutex::new(req_rx), response_tx: rsp_tx },
    )
}

fn recv_frame(receiver: &Receiver<Vec<u8>>, wait: Wait) -> Result<Vec<u8>> {
    let poll = |receiver: &Receiver<Vec<u8>>| {
        receiver.try_recv().map_err(|err| match err {
            TryRecvError::Empty => IpcError::WouldBlock,
            TryRecvError::Disconnected => IpcError::Disconnected,
        })
    };
    match wait {
        Wait::Blocking => receiver.recv().map_err(|_| IpcError::Disconnected),
        Wait::NonBlocking => poll(receiver),
        Wait::Timeout(timeout) if timeout.is_zero() => poll(receiver),
        Wait::Timeout(timeout) => receiver.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => IpcError::Timeout,
            RecvTimeoutError::Disconnected => IpcError::Disconnected,
        }),
    }
}

/// Caller end of a loopback connection.
pub struct LoopbackClient {
    request_tx: Sender<Vec<u8>>,
    response_rx: Mutex<Receiver<Vec<u8>>>,
}

impl Client for LoopbackClient {
    fn send(&self, frame: &[u8], _wait: Wait) -> Result<()> {
        self.request_tx.send(frame.to_vec()).map_err(|_| IpcError::Disconnected)
    }

    fn recv(&self, wait: Wait) -> Result<Vec<u8>> {
        recv_frame(&self.response_rx.lock(), wait)
    }
}

/// Service end of a loopback connection.
pub struct LoopbackServer {
    request_rx: Mutex<Receiver<Vec<u8>>>,
    response_tx: Sender<Vec<u8>>,
}

impl Server for LoopbackServer {
    fn recv(&self, wait: Wait) -> Result<Vec<u8>> {
        recv_frame(&self.request_rx.lock(), wait)
    }

    fn send(&self, frame: &[u8], _wait: Wait) -> Result<()> {
        self.response_tx.send(frame.to_vec()).map_err(|_| IpcError::Disconnected)
    }
}
