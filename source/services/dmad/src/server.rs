// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use dma_axi::sim::SimPlatform;
use log::info;
use tdma_hal::{Clock, HalError, HostClock, Platform};
use tdma_ipc::{Transport, TransportError};
use thiserror::Error;

use crate::config::{Backend, ConfigError, ServiceConfig};
use crate::service::DriverService;

/// Errors from the dmad service.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("hardware unavailable: {0}")]
    Hardware(#[from] HalError),
    #[error("backend {0:?} is not built into this binary")]
    BackendUnavailable(Backend),
}

pub type DmadResult<T> = Result<T, ServerError>;

/// Notifies init once the service reports readiness.
pub struct ReadyNotifier(Box<dyn FnOnce() + Send>);

impl ReadyNotifier {
    pub fn new<F>(func: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self(Box::new(func))
    }

    pub fn notify(self) {
        (self.0)();
    }
}

/// Serves `transport` with `service` until the peer disconnects, then
/// releases every mapping.
pub fn service_main_loop<T, P, C>(
    transport: &mut T,
    service: &mut DriverService<P, C>,
    notifier: ReadyNotifier,
) -> DmadResult<()>
where
    T: Transport,
    P: Platform,
    C: Clock,
{
    notifier.notify();
    info!("dmad: ready");
    let served = tdma_ipc::serve("dmad", transport, |cmd, params| service.handle(cmd, params));
    service.shutdown();
    info!("dmad: stopped");
    served.map_err(ServerError::from)
}

/// Builds the backend named by `config` and serves `transport` with it.
pub fn run<T: Transport>(
    config: &ServiceConfig,
    transport: &mut T,
    notifier: ReadyNotifier,
) -> DmadResult<()> {
    config.validate()?;
    match config.backend {
        Backend::Sim => {
            let clock = Arc::new(HostClock::new());
            let mut service =
                DriverService::new(SimPlatform::new(clock.clone()), clock, config);
            service_main_loop(transport, &mut service, notifier)
        }
        Backend::DevMem => run_devmem(config, transport, notifier),
    }
}

/// Brings the configured backend up with no callers attached, then shuts it
/// down. Host binaries have no kernel IPC endpoint to serve, so this is how
/// they surface backend failures.
pub fn self_check(config: &ServiceConfig) -> DmadResult<()> {
    let (client, server) = tdma_ipc::loopback_channel();
    drop(client);
    run(config, &mut tdma_ipc::IpcTransport::new(server), ReadyNotifier::new(|| {}))
}

#[cfg(all(feature = "devmem", target_os = "linux"))]
fn run_devmem<T: Transport>(
    config: &ServiceConfig,
    transport: &mut T,
    notifier: ReadyNotifier,
) -> DmadResult<()> {
    let platform = tdma_hal::devmem::DevMemPlatform::open()?;
    let mut service = DriverService::new(platform, HostClock::new(), config);
    service_main_loop(transport, &mut service, notifier)
}

#[cfg(not(all(feature = "devmem", target_os = "linux")))]
fn run_devmem<T: Transport>(
    _config: &ServiceConfig,
    _transport: &mut T,
    _notifier: ReadyNotifier,
) -> DmadResult<()> {
    Err(ServerError::BackendUnavailable(Backend::DevMem))
}
