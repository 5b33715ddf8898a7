// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: DMA driver daemon: sole owner of the AXI DMA register windows
//! OWNERS: @runtime @security
//! STATUS: Functional
//! API_STABILITY: Stable (v1.0)
//! TEST_COVERAGE: Unit tests per module + tdma-e2e
//!
//! PUBLIC API: DriverService, Request, ServiceConfig, service_main_loop(), run(), self_check(), ReadyNotifier
//! DEPENDS_ON: tdma_abi, tdma_hal, tdma_ipc, dma_axi
//!
//! SECURITY INVARIANTS:
//!   - Parameter signatures are checked before any register access
//!   - Callers never name physical addresses; regions come from config
//!   - Payload bytes MUST NOT be logged

#![forbid(unsafe_code)]

pub mod config;
pub mod request;
mod server;
mod service;

pub use config::{Backend, ConfigError, EngineConfig, ServiceConfig};
pub use request::{Request, Target};
pub use server::{run, self_check, service_main_loop, DmadResult, ReadyNotifier, ServerError};
pub use service::DriverService;
