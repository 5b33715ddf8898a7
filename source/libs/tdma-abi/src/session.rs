// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::{Params, Result};

/// An open session with a command handler.
///
/// The same contract is served in-process (a handler called directly) and
/// across a hop (an IPC client that frames the call). On success the returned
/// block is the reply form of the parameters: output slots filled, input slots
/// cleared.
pub trait Session {
    fn invoke(&mut self, cmd: u32, params: Params) -> Result<Params>;
}

impl<S: Session + ?Sized> Session for &mut S {
    fn invoke(&mut self, cmd: u32, params: Params) -> Result<Params> {
        (**self).invoke(cmd, params)
    }
}

impl<S: Session + ?Sized> Session for Box<S> {
    fn invoke(&mut self, cmd: u32, params: Params) -> Result<Params> {
        (**self).invoke(cmd, params)
    }
}
