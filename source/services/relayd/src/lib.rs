// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]
#![deny(clippy::all, missing_docs)]

//! Unprivileged-facing DMA relay: turns one caller transfer into the
//! INIT/TRANSFER/SYNC sequence of the driver service.

mod client;
pub mod config;
mod dispatcher;
mod server;

pub use client::RelayClient;
pub use config::{ConfigError, RelayConfig};
pub use dispatcher::{Dispatcher, TransferReport, READ_OUTPUT_SIG, REPORT_SIG, TRANSFER_SIG};
pub use server::{
    downstream, serve_connection, service_main_loop, ReadyNotifier, Result, ServerError,
};
