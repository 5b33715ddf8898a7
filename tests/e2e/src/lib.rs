// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Host harness running relayd and dmad on threads over loopback IPC, with
//! simulated engines standing in for the hardware.

#![forbid(unsafe_code)]

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use dma_axi::sim::{SimEngine, SimPlatform};
use dmad::{DriverService, EngineConfig, ServiceConfig};
use relayd::{Dispatcher, RelayClient, RelayConfig};
use tdma_hal::{Clock, StepClock};
use tdma_ipc::{loopback_channel, IpcSession, IpcTransport, LoopbackClient};

/// Register window of the ciphertext engine on the reference board.
pub const CT_ENGINE_BASE: u64 = 0x4040_0000;
/// Register window of the key engine on the reference board.
pub const KEY_ENGINE_BASE: u64 = 0x4041_0000;

/// Raw caller connection to relayd.
pub type Caller = IpcSession<LoopbackClient>;

/// Typed relay client for `engine` over `caller`.
pub fn client(caller: Caller, engine: u32) -> RelayClient<Caller> {
    RelayClient::new(caller, engine)
}

/// Installs the test logger once per process.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Default dmad config plus the two reference-board engines as ids 1 and 2.
pub fn board_config(sync_timeout: Duration) -> ServiceConfig {
    let mut config = ServiceConfig {
        sync_timeout_us: sync_timeout.as_micros() as u64,
        ..ServiceConfig::default()
    };
    config.engines.push(EngineConfig {
        id: 1,
        base: CT_ENGINE_BASE,
        source_addr: 0x4100_0000,
        dest_addr: 0x3100_0000,
        region_len: 0x1000,
    });
    config.engines.push(EngineConfig {
        id: 2,
        base: KEY_ENGINE_BASE,
        source_addr: 0x4200_0000,
        dest_addr: 0x3200_0000,
        region_len: 0x1000,
    });
    config
}

/// Deterministic clock: 10 µs per poll.
pub fn step_clock() -> Arc<StepClock> {
    Arc::new(StepClock::new(Duration::from_micros(10)))
}

/// Both services running on their own threads.
pub struct Stack {
    platform: Arc<SimPlatform>,
    dmad: JoinHandle<dmad::DmadResult<()>>,
    relayd: JoinHandle<relayd::Result<()>>,
}

impl Stack {
    /// Starts dmad and relayd and returns `callers` relay connections.
    pub fn start(
        service: ServiceConfig,
        relay: RelayConfig,
        clock: Arc<dyn Clock + Send + Sync>,
        callers: usize,
    ) -> (Self, Vec<Caller>) {
        init_logging();
        let platform = Arc::new(SimPlatform::new(clock.clone()));

        let (dmad_client, dmad_server) = loopback_channel();
        let dmad = {
            let platform = platform.clone();
            thread::spawn(move || {
                let mut service = DriverService::new(platform, clock, &service);
                dmad::service_main_loop(
                    &mut IpcTransport::new(dmad_server),
                    &mut service,
                    dmad::ReadyNotifier::new(|| {}),
                )
            })
        };

        let mut clients = Vec::with_capacity(callers);
        let mut transports = Vec::with_capacity(callers);
        for _ in 0..callers {
            let (client, server) = loopback_channel();
            clients.push(IpcSession::new(client));
            transports.push(IpcTransport::new(server));
        }
        let relayd = thread::spawn(move || {
            let downstream = relayd::downstream(&relay, dmad_client);
            let dispatcher = Arc::new(Dispatcher::new(downstream, relay.strict_sync));
            relayd::service_main_loop(dispatcher, transports, relayd::ReadyNotifier::new(|| {}))
        });

        (Self { platform, dmad, relayd }, clients)
    }

    /// Simulated engine behind the window at `base`.
    pub fn engine(&self, base: u64) -> Arc<SimEngine> {
        self.platform.engine(base)
    }

    pub fn platform(&self) -> &SimPlatform {
        &self.platform
    }

    /// Waits for both services after every caller has been dropped.
    pub fn join(self) {
        self.relayd.join().expect("relayd thread").expect("relayd exits cleanly");
        self.dmad.join().expect("dmad thread").expect("dmad exits cleanly");
    }
}
