// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use log::{error, info};
use tdma_abi::Session;
use tdma_ipc::{Client, IpcSession, Transport, TransportError};
use thiserror::Error;

use crate::config::{ConfigError, RelayConfig};
use crate::dispatcher::Dispatcher;

/// Result alias used by the service.
pub type Result<T> = core::result::Result<T, ServerError>;

/// Errors surfaced while serving callers.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Transport level failure on a caller connection.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    /// Configuration could not be loaded.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    /// A connection worker could not be started.
    #[error("failed to spawn connection worker: {0}")]
    Spawn(#[from] std::io::Error),
    /// A connection worker panicked.
    #[error("connection worker {0} panicked")]
    Worker(usize),
}

/// Notifies init once the service reports readiness.
pub struct ReadyNotifier(Box<dyn FnOnce() + Send>);

impl ReadyNotifier {
    /// Creates a notifier from the provided closure.
    pub fn new<F>(func: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self(Box::new(func))
    }

    /// Signals readiness to the caller.
    pub fn notify(self) {
        (self.0)();
    }
}

/// Opens the downstream driver-service session described by `config`.
pub fn downstream<C: Client>(config: &RelayConfig, client: C) -> IpcSession<C> {
    let session = IpcSession::new(client);
    match config.call_timeout() {
        Some(timeout) => session.with_timeout(timeout),
        None => session,
    }
}

/// Serves one caller connection until it disconnects.
pub fn serve_connection<T, S>(transport: &mut T, dispatcher: &Dispatcher<S>) -> Result<()>
where
    T: Transport,
    S: Session,
{
    tdma_ipc::serve("relayd", transport, |cmd, params| dispatcher.handle(cmd, params))?;
    Ok(())
}

/// Serves every connection on its own worker until all of them disconnect.
///
/// All workers share `dispatcher`, so overlapping requests on one channel from
/// different callers are answered with `Busy`.
pub fn service_main_loop<S, T, I>(
    dispatcher: Arc<Dispatcher<S>>,
    connections: I,
    notifier: ReadyNotifier,
) -> Result<()>
where
    S: Session + Send + 'static,
    T: Transport + Send + 'static,
    I: IntoIterator<Item = T>,
{
    let mut workers = Vec::new();
    for (idx, mut transport) in connections.into_iter().enumerate() {
        let dispatcher = dispatcher.clone();
        let worker = std::thread::Builder::new()
            .name(format!("relayd-conn{idx}"))
            .spawn(move || serve_connection(&mut transport, &dispatcher))?;
        workers.push(worker);
    }
    notifier.notify();
    info!("relayd: ready ({} connections)", workers.len());

    let mut outcome = Ok(());
    for (idx, worker) in workers.into_iter().enumerate() {
        let result = worker.join().unwrap_or(Err(ServerError::Worker(idx)));
        if let Err(err) = result {
            error!("relayd: connection {idx} failed: {err}");
            if outcome.is_ok() {
                outcome = Err(err);
            }
        }
    }
    info!("relayd: stopped");
    outcome
}
