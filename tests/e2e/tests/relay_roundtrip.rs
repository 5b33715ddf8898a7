//! CONTEXT: relayd -> dmad end-to-end loopback tests
//! INTENT: Drive full caller transfers through both services against simulated engines
//! DEPS: relayd, dmad, dma-axi (sim)
//! READINESS: Host backend; both services run on threads over loopback IPC
//! TESTS: Delayed ack success, never-idle timeout, bad parameters without register writes,
//!        raw two-slot TRANSFER plus REPORT, passthrough round trip, per-channel Busy,
//!        back-to-back init, independent engines
// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use dma_axi::sim::Ack;
use dma_axi::{Channel, Control, Status};
use dmad::config::DEFAULT_WINDOW_BASE;
use relayd::RelayConfig;
use tdma_abi::{relay, Error, Param, Params, Session};
use tdma_e2e::{board_config, client, step_clock, Stack, CT_ENGINE_BASE, KEY_ENGINE_BASE};
use tdma_hal::{Bus, HostClock};

const MM2S_CONTROL: usize = 0x00;
const MM2S_STATUS: usize = 0x04;
const MM2S_LENGTH: usize = 0x28;

fn start(sync_timeout: Duration, relay: RelayConfig, callers: usize) -> (Stack, Vec<tdma_e2e::Caller>, Arc<tdma_hal::StepClock>) {
    let clock = step_clock();
    let (stack, callers) = Stack::start(board_config(sync_timeout), relay, clock.clone(), callers);
    (stack, callers, clock)
}

#[test]
fn delayed_ack_completes_within_bound() {
    let (stack, mut callers, clock) = start(Duration::from_secs(3), RelayConfig::default(), 1);
    let engine = stack.engine(DEFAULT_WINDOW_BASE);
    engine.set_ack(Ack::Delayed(Duration::from_micros(1_000)));

    let mut caller = client(callers.remove(0), 0);
    let report = caller.transfer(Channel::HostToDevice, &[0x5a; 48]).expect("transfer");
    assert!(report.is_clean(), "unexpected report {report:?}");

    let status = Status::from_bits_retain(engine.read(MM2S_STATUS));
    assert!(status.contains(Status::IDLE | Status::IOC_IRQ), "status {status}");
    assert!(clock.elapsed() >= Duration::from_micros(1_000));
    assert!(clock.elapsed() < Duration::from_secs(3));
    assert!(engine.writes().contains(&(MM2S_LENGTH, 48)));

    drop(caller);
    stack.join();
}

#[test]
fn never_idle_times_out_and_leaves_channel_running() {
    let (stack, mut callers, clock) = start(Duration::from_secs(3), RelayConfig::default(), 1);
    let engine = stack.engine(DEFAULT_WINDOW_BASE);
    engine.set_ack(Ack::NeverIdle);

    let mut caller = client(callers.remove(0), 0);
    let report = caller.transfer(Channel::HostToDevice, &[1; 48]).expect("transfer step succeeds");
    assert_eq!(report.init, Ok(()));
    assert_eq!(report.sync, Err(Error::Timeout));
    assert_eq!(clock.elapsed(), Duration::from_secs(3));

    let status = Status::from_bits_retain(engine.read(MM2S_STATUS));
    assert!(status.contains(Status::IOC_IRQ) && !status.contains(Status::IDLE));
    assert_ne!(engine.read(MM2S_CONTROL) & Control::RUN.bits(), 0);

    drop(caller);
    stack.join();
}

#[test]
fn strict_sync_turns_timeout_into_failure() {
    let relay = RelayConfig { strict_sync: true, ..RelayConfig::default() };
    let (stack, mut callers, _clock) = start(Duration::from_micros(500), relay, 1);
    stack.engine(DEFAULT_WINDOW_BASE).set_ack(Ack::NeverComplete);

    let mut caller = client(callers.remove(0), 0);
    assert_eq!(caller.transfer(Channel::HostToDevice, b"strict"), Err(Error::Timeout));

    drop(caller);
    stack.join();
}

#[test]
fn bad_parameters_never_touch_registers() {
    let (stack, mut callers, _clock) = start(Duration::from_secs(3), RelayConfig::default(), 1);
    let mut caller = callers.remove(0);

    // TRANSFER with a trailing output slot.
    let long =
        Params::from_slots([Param::BufferIn(vec![1; 16]), Param::value(1, 0), Param::value_out()]);
    assert_eq!(caller.invoke(relay::TRANSFER, long), Err(Error::BadParameters));
    // TRANSFER with its slots swapped.
    let swapped = Params::from_slots([Param::value(1, 0), Param::BufferIn(vec![1; 16])]);
    assert_eq!(caller.invoke(relay::TRANSFER, swapped), Err(Error::BadParameters));
    // Direction outside {0, 1}.
    let bad_direction = Params::from_slots([Param::BufferIn(vec![1; 16]), Param::value(7, 0)]);
    assert_eq!(caller.invoke(relay::TRANSFER, bad_direction), Err(Error::BadParameters));

    // Engine id the driver service does not know: the lenient INIT fails, the
    // TRANSFER step fails the whole call.
    let mut unknown = client(caller, 9);
    assert_eq!(unknown.transfer(Channel::HostToDevice, &[1; 16]), Err(Error::BadParameters));

    for base in [DEFAULT_WINDOW_BASE, CT_ENGINE_BASE, KEY_ENGINE_BASE] {
        assert!(stack.engine(base).writes().is_empty(), "writes on {base:#x}");
        assert!(!stack.platform().is_mapped(base));
    }

    drop(unknown);
    stack.join();
}

#[test]
fn raw_two_slot_transfer_is_accepted() {
    let (stack, mut callers, _clock) = start(Duration::from_secs(3), RelayConfig::default(), 1);
    let mut caller = callers.remove(0);

    let transfer = Params::from_slots([Param::BufferIn(vec![0x5a; 48]), Param::value(1, 0)]);
    assert_eq!(caller.invoke(relay::TRANSFER, transfer), Ok(Params::default()));
    assert!(stack.engine(DEFAULT_WINDOW_BASE).writes().contains(&(MM2S_LENGTH, 48)));

    let report = caller
        .invoke(relay::REPORT, Params::from_slots([Param::value(1, 0), Param::value_out()]))
        .unwrap();
    assert_eq!(report.get(1), &Param::ValueOut { a: 0, b: 0 });

    drop(caller);
    stack.join();
}

#[test]
fn oversized_transfer_never_starts_the_engine() {
    let (stack, mut callers, _clock) = start(Duration::from_secs(3), RelayConfig::default(), 1);
    let mut caller = client(callers.remove(0), 1);

    // Engine 1 has a 4 KiB staging region.
    assert_eq!(caller.transfer(Channel::HostToDevice, &[0; 0x1001]), Err(Error::BadParameters));
    let writes = stack.engine(CT_ENGINE_BASE).writes();
    assert_eq!(writes, vec![(0x00, 4), (0x00, 0), (0x00, 0x7000)]);

    drop(caller);
    stack.join();
}

#[test]
fn passthrough_round_trip_reads_back_bit_for_bit() {
    let (stack, mut callers, _clock) = start(Duration::from_secs(3), RelayConfig::default(), 1);
    let mut caller = client(callers.remove(0), 1);
    let payload: Vec<u8> = (0..=255u8).cycle().take(90).collect();

    assert!(caller.transfer(Channel::HostToDevice, &payload).unwrap().is_clean());
    assert_eq!(stack.engine(CT_ENGINE_BASE).pending_stream(), payload.len());

    // The DeviceToHost buffer only sets the receive length.
    assert!(caller.transfer(Channel::DeviceToHost, &vec![0; payload.len()]).unwrap().is_clean());
    assert_eq!(stack.engine(CT_ENGINE_BASE).pending_stream(), 0);

    assert_eq!(caller.read_output(payload.len()).unwrap(), payload);
    assert_eq!(caller.read_output(16).unwrap(), &payload[..16]);

    drop(caller);
    stack.join();
}

#[test]
fn back_to_back_transfers_reinitialise_the_channel() {
    let (stack, mut callers, _clock) = start(Duration::from_secs(3), RelayConfig::default(), 1);
    let mut caller = client(callers.remove(0), 0);

    for round in 0..3u8 {
        let report = caller.transfer(Channel::HostToDevice, &[round; 32]).unwrap();
        assert!(report.is_clean(), "round {round}: {report:?}");
    }
    let resets = stack
        .engine(DEFAULT_WINDOW_BASE)
        .writes()
        .iter()
        .filter(|&&write| write == (MM2S_CONTROL, Control::RESET.bits()))
        .count();
    assert_eq!(resets, 3);

    drop(caller);
    stack.join();
}

#[test]
fn overlapping_request_on_one_channel_is_busy() {
    // Real time, so the first sequence really sits in SYNC for a while.
    let clock = Arc::new(HostClock::new());
    let (stack, mut callers) =
        Stack::start(board_config(Duration::from_secs(1)), RelayConfig::default(), clock, 2);
    let engine = stack.engine(DEFAULT_WINDOW_BASE);
    engine.set_ack(Ack::NeverComplete);

    let mut first = client(callers.remove(0), 0);
    let mut second = client(callers.remove(0), 0);
    let worker = thread::spawn(move || {
        let outcome = first.transfer(Channel::HostToDevice, &[3; 64]);
        (first, outcome)
    });

    // Once the length register is written the first sequence is inside SYNC.
    let deadline = Instant::now() + Duration::from_secs(5);
    while !engine.writes().contains(&(MM2S_LENGTH, 64)) {
        assert!(Instant::now() < deadline, "first transfer never started");
        thread::sleep(Duration::from_millis(1));
    }
    assert_eq!(second.transfer(Channel::HostToDevice, &[4; 64]), Err(Error::Busy));

    let (first, outcome) = worker.join().unwrap();
    assert_eq!(outcome.unwrap().sync, Err(Error::Timeout));

    // The gate is free again once the first sequence has returned.
    engine.set_ack(Ack::Immediate);
    assert!(second.transfer(Channel::HostToDevice, &[5; 64]).unwrap().is_clean());

    drop(first);
    drop(second);
    stack.join();
}

#[test]
fn engines_run_independently() {
    let (stack, callers, _clock) = start(Duration::from_secs(3), RelayConfig::default(), 2);
    let workers: Vec<_> = callers
        .into_iter()
        .zip([1u32, 2])
        .map(|(caller, engine)| {
            thread::spawn(move || {
                let mut caller = client(caller, engine);
                let data = vec![engine as u8; 24];
                let report = caller.transfer(Channel::HostToDevice, &data).unwrap();
                caller.transfer(Channel::DeviceToHost, &data).unwrap();
                (report, caller.read_output(data.len()).unwrap() == data)
            })
        })
        .collect();
    for worker in workers {
        let (report, round_trip) = worker.join().unwrap();
        assert!(report.is_clean());
        assert!(round_trip);
    }
    assert!(stack.engine(CT_ENGINE_BASE).writes().contains(&(MM2S_LENGTH, 24)));
    assert!(stack.engine(KEY_ENGINE_BASE).writes().contains(&(MM2S_LENGTH, 24)));
    assert!(stack.engine(DEFAULT_WINDOW_BASE).writes().is_empty());

    stack.join();
}
