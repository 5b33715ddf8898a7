// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Caller-facing relay: one logical transfer becomes INIT, TRANSFER and SYNC
//! calls into the driver service.
//!
//! SECURITY INVARIANTS:
//!   - Caller parameters are re-validated here before anything goes downstream
//!   - At most one sequence per (engine, channel) is in flight
//!   - Payload bytes MUST NOT be logged

use std::collections::{HashMap, HashSet};

use dma_axi::Channel;
use log::{debug, warn};
use parking_lot::Mutex;
use tdma_abi::ParamType::{BufferIn, BufferOut, None as Empty, ValueIn, ValueOut};
use tdma_abi::{check, code_of, dmad, relay, Error, Param, ParamTypes, Params, Result, Session};

/// Signature of [`relay::TRANSFER`].
pub const TRANSFER_SIG: ParamTypes = ParamTypes::new(BufferIn, ValueIn, Empty, Empty);
/// Signature of [`relay::READ_OUTPUT`].
pub const READ_OUTPUT_SIG: ParamTypes = ParamTypes::new(ValueIn, BufferOut, Empty, Empty);
/// Signature of [`relay::REPORT`].
pub const REPORT_SIG: ParamTypes = ParamTypes::new(ValueIn, ValueOut, Empty, Empty);

/// Outcome of the lenient steps of one relayed transfer.
///
/// The TRANSFER step itself either succeeded or the whole operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferReport {
    /// Result of the INIT step.
    pub init: Result<()>,
    /// Result of the SYNC step.
    pub sync: Result<()>,
}

impl TransferReport {
    /// Wire form: `(init code, sync code)`.
    pub fn codes(&self) -> (u32, u32) {
        (code_of(&self.init), code_of(&self.sync))
    }

    /// Rebuilds a report from its wire form.
    pub fn from_codes(init: u32, sync: u32) -> Self {
        Self { init: check(init), sync: check(sync) }
    }

    /// Both lenient steps succeeded.
    pub fn is_clean(&self) -> bool {
        self.init.is_ok() && self.sync.is_ok()
    }
}

/// Relay dispatcher over a downstream driver-service session.
///
/// The session is locked per downstream call, so sequences on different
/// channels interleave call by call. Sequences on the same channel never
/// overlap: the second one is rejected with [`Error::Busy`].
///
/// The report of the last sequence that reached its TRANSFER step is kept per
/// channel and served by [`relay::REPORT`].
pub struct Dispatcher<S> {
    downstream: Mutex<S>,
    gates: Mutex<HashSet<(u32, Channel)>>,
    reports: Mutex<HashMap<(u32, Channel), TransferReport>>,
    strict_sync: bool,
}

/// Held for the duration of one sequence on one channel.
struct Gate<'a> {
    gates: &'a Mutex<HashSet<(u32, Channel)>>,
    key: (u32, Channel),
}

impl Drop for Gate<'_> {
    fn drop(&mut self) {
        self.gates.lock().remove(&self.key);
    }
}

impl<S: Session> Dispatcher<S> {
    /// Wraps `downstream`. With `strict_sync` a failed SYNC fails the transfer.
    pub fn new(downstream: S, strict_sync: bool) -> Self {
        Self {
            downstream: Mutex::new(downstream),
            gates: Mutex::new(HashSet::new()),
            reports: Mutex::new(HashMap::new()),
            strict_sync,
        }
    }

    /// Decodes and runs one caller command.
    pub fn handle(&self, cmd: u32, mut params: Params) -> Result<Params> {
        match cmd {
            relay::TRANSFER => {
                params.expect(TRANSFER_SIG)?;
                let (direction, engine) = channel_of(&params, 1)?;
                let Param::BufferIn(data) = params.take(0) else {
                    return Err(Error::BadParameters);
                };
                self.transfer(direction, engine, data)?;
                Ok(params)
            }
            relay::REPORT => {
                params.expect(REPORT_SIG)?;
                let (direction, engine) = channel_of(&params, 0)?;
                let (a, b) = self.last_report(direction, engine).ok_or(Error::BadState)?.codes();
                params.set(1, Param::ValueOut { a, b });
                Ok(params)
            }
            relay::READ_OUTPUT => {
                params.expect(READ_OUTPUT_SIG)?;
                let (len, engine) = params.value(0).ok_or(Error::BadParameters)?;
                let capacity = params.buffer(1).map_or(0, <[u8]>::len);
                if len as usize > capacity {
                    return Err(Error::BadParameters);
                }
                params.set(1, Param::BufferOut(self.read_output(engine, len as usize)?));
                Ok(params)
            }
            _ => Err(Error::NotSupported),
        }
    }

    /// Runs INIT, TRANSFER and SYNC for `direction` on `engine`.
    ///
    /// INIT and SYNC failures are reported, not raised, unless the dispatcher
    /// was built with `strict_sync`. A TRANSFER failure always fails the call.
    pub fn transfer(&self, direction: Channel, engine: u32, data: Vec<u8>) -> Result<TransferReport> {
        let _gate = self.acquire(engine, direction)?;
        let target = Param::value(direction.value(), engine);

        let init = self.call(dmad::INIT, Params::from_slots([target.clone()])).map(drop);
        if let Err(err) = init {
            warn!("relayd: engine {engine} {direction} init failed ({err}), continuing");
        }

        let len = data.len();
        self.call(dmad::TRANSFER, Params::from_slots([Param::BufferIn(data), target.clone()]))?;
        debug!("relayd: engine {engine} {direction} started {len} bytes");

        let sync = self.call(dmad::SYNC, Params::from_slots([target])).map(drop);
        let report = TransferReport { init, sync };
        self.reports.lock().insert((engine, direction), report);
        if let Err(err) = sync {
            if self.strict_sync {
                warn!("relayd: engine {engine} {direction} sync failed ({err})");
                return Err(err);
            }
            warn!("relayd: engine {engine} {direction} sync failed ({err}), continuing");
        }
        Ok(report)
    }

    /// Report of the last sequence on `direction` of `engine` that reached its
    /// TRANSFER step.
    pub fn last_report(&self, direction: Channel, engine: u32) -> Option<TransferReport> {
        self.reports.lock().get(&(engine, direction)).copied()
    }

    /// Copies `len` bytes of the engine's destination region.
    pub fn read_output(&self, engine: u32, len: usize) -> Result<Vec<u8>> {
        let wire_len = u32::try_from(len).map_err(|_| Error::BadParameters)?;
        let mut reply = self.call(
            dmad::READ,
            Params::from_slots([Param::value(wire_len, engine), Param::buffer_out(len)]),
        )?;
        match reply.take(1) {
            Param::BufferOut(data) if data.len() == len => Ok(data),
            _ => Err(Error::Communication),
        }
    }

    fn acquire(&self, engine: u32, channel: Channel) -> Result<Gate<'_>> {
        let key = (engine, channel);
        if !self.gates.lock().insert(key) {
            debug!("relayd: engine {engine} {channel} busy");
            return Err(Error::Busy);
        }
        Ok(Gate { gates: &self.gates, key })
    }

    fn call(&self, cmd: u32, params: Params) -> Result<Params> {
        self.downstream.lock().invoke(cmd, params)
    }
}

fn channel_of(params: &Params, slot: usize) -> Result<(Channel, u32)> {
    let (direction, engine) = params.value(slot).ok_or(Error::BadParameters)?;
    Ok((Channel::from_value(direction).ok_or(Error::BadParameters)?, engine))
}

impl<S: Session> Session for &Dispatcher<S> {
    fn invoke(&mut self, cmd: u32, params: Params) -> Result<Params> {
        self.handle(cmd, params).map(Params::into_reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::sync::Arc;

    type Calls = Arc<Mutex<Vec<(u32, ParamTypes)>>>;

    /// Records every downstream call and answers from a fixed table.
    #[derive(Default)]
    struct FakeDriver {
        calls: Calls,
        fail: Vec<(u32, Error)>,
        output: Vec<u8>,
    }

    impl Session for FakeDriver {
        fn invoke(&mut self, cmd: u32, mut params: Params) -> Result<Params> {
            self.calls.lock().push((cmd, params.types()));
            if let Some((_, err)) = self.fail.iter().find(|(c, _)| *c == cmd) {
                return Err(*err);
            }
            if cmd == dmad::READ {
                let (len, _) = params.value(0).unwrap();
                params.set(1, Param::BufferOut(self.output[..len as usize].to_vec()));
            }
            Ok(params.into_reply())
        }
    }

    fn transfer_params(direction: u32, data: &[u8]) -> Params {
        Params::from_slots([Param::BufferIn(data.to_vec()), Param::value(direction, 0)])
    }

    fn report_params(direction: u32) -> Params {
        Params::from_slots([Param::value(direction, 0), Param::value_out()])
    }

    fn failing(fail: Vec<(u32, Error)>) -> (Calls, FakeDriver) {
        let driver = FakeDriver { fail, ..FakeDriver::default() };
        (driver.calls.clone(), driver)
    }

    #[test]
    fn transfer_runs_init_transfer_sync() {
        let (calls, driver) = failing(Vec::new());
        let dispatcher = Dispatcher::new(driver, false);
        let mut relay = &dispatcher;
        let reply = relay.invoke(relay::TRANSFER, transfer_params(1, b"abc")).unwrap();
        assert_eq!(reply, Params::default());
        let cmds: Vec<u32> = calls.lock().iter().map(|(cmd, _)| *cmd).collect();
        assert_eq!(cmds, vec![dmad::INIT, dmad::TRANSFER, dmad::SYNC]);

        let report = relay.invoke(relay::REPORT, report_params(1)).unwrap();
        assert_eq!(report.get(1), &Param::ValueOut { a: 0, b: 0 });
        // REPORT is answered locally.
        assert_eq!(calls.lock().len(), 3);
    }

    #[test]
    fn report_carries_lenient_failures_per_channel() {
        let (_, driver) = failing(vec![(dmad::SYNC, Error::Timeout)]);
        let relay = Dispatcher::new(driver, false);
        assert_eq!(relay.handle(relay::REPORT, report_params(1)), Err(Error::BadState));

        relay.handle(relay::TRANSFER, transfer_params(1, b"abc")).unwrap();
        let reply = relay.handle(relay::REPORT, report_params(1)).unwrap();
        assert_eq!(reply.get(1), &Param::ValueOut { a: 0, b: 0xFFFF_3001 });
        // The other direction has no sequence yet.
        assert_eq!(relay.handle(relay::REPORT, report_params(0)), Err(Error::BadState));
        assert_eq!(
            relay.last_report(Channel::HostToDevice, 0),
            Some(TransferReport { init: Ok(()), sync: Err(Error::Timeout) })
        );
    }

    #[test]
    fn init_and_sync_failures_are_lenient() {
        let (_, driver) = failing(vec![(dmad::INIT, Error::Generic), (dmad::SYNC, Error::Timeout)]);
        let relay = Dispatcher::new(driver, false);
        let report = relay.transfer(Channel::HostToDevice, 0, vec![1; 8]).unwrap();
        assert_eq!(report.init, Err(Error::Generic));
        assert_eq!(report.sync, Err(Error::Timeout));
        assert!(!report.is_clean());
        assert_eq!(report.codes(), (0xFFFF_0000, 0xFFFF_3001));
        assert_eq!(TransferReport::from_codes(0xFFFF_0000, 0xFFFF_3001), report);
    }

    #[test]
    fn strict_sync_fails_the_transfer() {
        let (_, driver) = failing(vec![(dmad::SYNC, Error::Timeout)]);
        let relay = Dispatcher::new(driver, true);
        assert_eq!(relay.handle(relay::TRANSFER, transfer_params(1, b"x")), Err(Error::Timeout));
        assert_eq!(relay.last_report(Channel::HostToDevice, 0).map(|r| r.sync), Some(Err(Error::Timeout)));
    }

    #[test]
    fn transfer_step_failure_is_fatal() {
        let (calls, driver) = failing(vec![(dmad::TRANSFER, Error::BadState)]);
        let relay = Dispatcher::new(driver, false);
        assert_eq!(relay.transfer(Channel::DeviceToHost, 0, vec![0; 4]), Err(Error::BadState));
        // SYNC is never attempted after a failed TRANSFER.
        assert_eq!(calls.lock().len(), 2);
    }

    #[test]
    fn bad_signatures_never_reach_the_driver() {
        let (calls, driver) = failing(Vec::new());
        let relay = Dispatcher::new(driver, false);
        // Trailing output slot.
        let long = Params::from_slots([Param::BufferIn(vec![1]), Param::value(1, 0), Param::value_out()]);
        assert_eq!(relay.handle(relay::TRANSFER, long), Err(Error::BadParameters));
        // Slots swapped.
        let swapped = Params::from_slots([Param::value(1, 0), Param::BufferIn(vec![1])]);
        assert_eq!(relay.handle(relay::TRANSFER, swapped), Err(Error::BadParameters));
        // REPORT without its output slot.
        let report = Params::from_slots([Param::value(1, 0)]);
        assert_eq!(relay.handle(relay::REPORT, report), Err(Error::BadParameters));
        // Direction out of range.
        assert_eq!(relay.handle(relay::TRANSFER, transfer_params(2, b"x")), Err(Error::BadParameters));
        // Read length beyond the caller's buffer.
        let read = Params::from_slots([Param::value(8, 0), Param::buffer_out(4)]);
        assert_eq!(relay.handle(relay::READ_OUTPUT, read), Err(Error::BadParameters));
        assert_eq!(relay.handle(9, Params::default()), Err(Error::NotSupported));
        assert!(calls.lock().is_empty());
    }

    #[test]
    fn read_output_copies_destination() {
        let driver = FakeDriver { output: b"0123456789".to_vec(), ..FakeDriver::default() };
        let calls = driver.calls.clone();
        let dispatcher = Dispatcher::new(driver, false);
        let mut relay = &dispatcher;
        let reply = relay
            .invoke(relay::READ_OUTPUT, Params::from_slots([Param::value(4, 0), Param::buffer_out(16)]))
            .unwrap();
        assert_eq!(reply.buffer(1), Some(&b"0123"[..]));
        assert_eq!(reply.get(0), &Param::None);
        assert_eq!(*calls.lock(), vec![(dmad::READ, READ_OUTPUT_SIG)]);
    }

    /// Blocks inside SYNC until released, so a second caller can observe the gate.
    struct BlockingDriver {
        entered: mpsc::Sender<()>,
        release: mpsc::Receiver<()>,
    }

    impl Session for BlockingDriver {
        fn invoke(&mut self, cmd: u32, params: Params) -> Result<Params> {
            if cmd == dmad::SYNC {
                self.entered.send(()).unwrap();
                self.release.recv().unwrap();
            }
            Ok(params.into_reply())
        }
    }

    #[test]
    fn overlapping_request_on_one_channel_is_busy() {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let relay = Arc::new(Dispatcher::new(
            BlockingDriver { entered: entered_tx, release: release_rx },
            false,
        ));

        let first = {
            let relay = relay.clone();
            std::thread::spawn(move || relay.transfer(Channel::HostToDevice, 0, vec![1; 4]))
        };
        entered_rx.recv().unwrap();

        // Same channel: rejected without touching the driver.
        assert_eq!(relay.transfer(Channel::HostToDevice, 0, vec![2; 4]), Err(Error::Busy));

        release_tx.send(()).unwrap();
        assert!(first.join().unwrap().unwrap().is_clean());

        // The gate is released once the sequence returns.
        let again = {
            let relay = relay.clone();
            std::thread::spawn(move || relay.transfer(Channel::HostToDevice, 0, vec![3; 4]))
        };
        entered_rx.recv().unwrap();
        release_tx.send(()).unwrap();
        assert!(again.join().unwrap().is_ok());
    }
}
