// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

use core::time::Duration;
use std::time::Instant;

use log::warn;
use tdma_abi::wire::{self, Request};
use tdma_abi::{Error, Params, Session};

use crate::{Client, IpcError, Wait};

/// [`Session`] that frames each invocation over an IPC [`Client`].
///
/// Replies are matched by nonce; a late reply to an earlier call that timed
/// out is discarded.
pub struct IpcSession<C> {
    client: C,
    wait: Wait,
    nonce: u32,
}

impl<C: Client> IpcSession<C> {
    /// Opens a session whose calls block until the peer answers.
    pub fn new(client: C) -> Self {
        Self { client, wait: Wait::Blocking, nonce: 0 }
    }

    /// Bounds every receive by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.wait = Wait::Timeout(timeout);
        self
    }

    /// Underlying client handle.
    pub fn client(&self) -> &C {
        &self.client
    }
}

fn link_error(err: IpcError) -> Error {
    warn!("ipc-session: link failure: {err}");
    Error::Communication
}

/// Wait for the next receive of a call that must finish by `deadline`.
fn remaining(wait: Wait, deadline: Option<Instant>) -> Wait {
    match deadline {
        Some(deadline) => Wait::Timeout(deadline.saturating_duration_since(Instant::now())),
        None => wait,
    }
}

impl<C: Client> Session for IpcSession<C> {
    /// The configured timeout bounds the whole call, including any stale
    /// replies skipped on the way.
    fn invoke(&mut self, cmd: u32, params: Params) -> tdma_abi::Result<Params> {
        let deadline = self.wait.timeout().and_then(|timeout| Instant::now().checked_add(timeout));
        self.nonce = self.nonce.wrapping_add(1);
        let nonce = self.nonce;
        let frame = wire::encode_request(&Request { cmd, nonce, params })?;
        self.client.send(&frame, remaining(self.wait, deadline)).map_err(link_error)?;
        loop {
            let bytes = self.client.recv(remaining(self.wait, deadline)).map_err(link_error)?;
            let reply = wire::decode_reply(&bytes).map_err(|_| Error::Communication)?;
            if reply.nonce != nonce || reply.cmd != cmd {
                warn!("ipc-session: discarding stale reply nonce={} cmd={:#06x}", reply.nonce, reply.cmd);
                if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                    return Err(link_error(IpcError::Timeout));
                }
                continue;
            }
            return reply.into_result();
        }
    }
}
