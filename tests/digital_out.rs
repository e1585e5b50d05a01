// tests/digital_out.rs
// Configured pins driven by queued host updates, watchdog expiry and the
// shutdown/clear/reset cycle around them.

mod common;

use common::*;
use knp_mcu::{Mcu, MessageType, ShutdownReason, ShutdownStatus};

const PIN: u32 = 5;

fn shutdown_now(out: &[Response]) -> Option<Vec<u32>> {
    out.iter().find(|r| r.is(MessageType::ShutdownNow)).map(|r| r.args())
}

fn configure(mcu: &mut Mcu<'_, FakeBoard>, host: &mut Host, max_duration: u32) {
    drain(mcu);
    let out = exchange(
        mcu,
        &host.block(&[
            (MessageType::AllocateOids, &[2]),
            (MessageType::ConfigDigitalOut, &[1, PIN, 0, 0, max_duration]),
            (MessageType::FinalizeConfig, &[0xabcd]),
        ]),
    );
    assert_eq!(out.len(), 1, "{:?}", out);
    assert_eq!(count_acks(&out), 1);
}

#[test]
fn test_queued_updates_apply_at_their_clock() {
    let mut mem = [0u8; 2048];
    let mut mcu = new_mcu(&mut mem, 0);
    let mut host = Host::new();
    configure(&mut mcu, &mut host, 0);

    let out = exchange(&mut mcu, &host.block(&[(MessageType::GetConfig, &[])]));
    let config = out[0].args();
    assert_eq!(config[0], 1);
    assert_eq!(config[1], 0xabcd);
    assert!(config[2] > 0);
    assert_eq!(config[3], 0);

    let out = exchange(
        &mut mcu,
        &host.block(&[
            (MessageType::ScheduleDigitalOut, &[1, 10_000, 1]),
            (MessageType::ScheduleDigitalOut, &[1, 20_000, 0]),
            (MessageType::ScheduleDigitalOut, &[1, 30_000, 1]),
        ]),
    );
    assert_eq!(count_acks(&out), 1);
    assert!(mcu.board().writes.is_empty());

    advance_to(&mut mcu, 15_000);
    assert_eq!(mcu.board().writes, [(10_000, PIN, true)]);
    advance_to(&mut mcu, 40_000);
    assert_eq!(
        mcu.board().writes,
        [(10_000, PIN, true), (20_000, PIN, false), (30_000, PIN, true)]
    );
    assert_eq!(mcu.shutdown_status(), ShutdownStatus::Normal);
}

#[test]
fn test_update_writes_immediately() {
    let mut mem = [0u8; 2048];
    let mut mcu = new_mcu(&mut mem, 0);
    let mut host = Host::new();
    configure(&mut mcu, &mut host, 0);
    mcu.board_mut().now = 500;
    exchange(&mut mcu, &host.block(&[(MessageType::UpdateDigitalOut, &[1, 1])]));
    assert_eq!(mcu.board().writes, [(500, PIN, true)]);
}

#[test]
fn test_watchdog_expiry_shuts_down() {
    let mut mem = [0u8; 2048];
    let mut mcu = new_mcu(&mut mem, 0);
    let mut host = Host::new();
    configure(&mut mcu, &mut host, 50_000);

    exchange(&mut mcu, &host.block(&[(MessageType::ScheduleDigitalOut, &[1, 10_000, 1])]));
    advance_to(&mut mcu, 55_000);
    assert_eq!(mcu.board().pins[&PIN], true);
    assert_eq!(mcu.shutdown_status(), ShutdownStatus::Normal);

    advance_to(&mut mcu, 70_000);
    let out = exchange(&mut mcu, &[]);
    let args = shutdown_now(&out).expect("no shutdown reported");
    assert_eq!(args[1], ShutdownReason::MissedPinEvent.code() as u32);
    assert_eq!(mcu.shutdown_status(), ShutdownStatus::Shutdown);
    assert_eq!(mcu.board().pins[&PIN], false);
}

#[test]
fn test_watchdog_fed_by_new_events() {
    let mut mem = [0u8; 2048];
    let mut mcu = new_mcu(&mut mem, 0);
    let mut host = Host::new();
    configure(&mut mcu, &mut host, 50_000);

    exchange(&mut mcu, &host.block(&[(MessageType::ScheduleDigitalOut, &[1, 10_000, 1])]));
    advance_to(&mut mcu, 40_000);
    exchange(&mut mcu, &host.block(&[(MessageType::ScheduleDigitalOut, &[1, 50_000, 0])]));
    advance_to(&mut mcu, 200_000);
    let out = exchange(&mut mcu, &[]);
    assert!(shutdown_now(&out).is_none());
    assert_eq!(mcu.board().pins[&PIN], false);
}

#[test]
fn test_schedule_in_the_past_is_timer_too_close() {
    let mut mem = [0u8; 2048];
    let mut mcu = new_mcu(&mut mem, 0);
    let mut host = Host::new();
    configure(&mut mcu, &mut host, 0);
    advance_to(&mut mcu, 50_000);

    let out = exchange(&mut mcu, &host.block(&[(MessageType::ScheduleDigitalOut, &[1, 40_000, 1])]));
    // The block is acknowledged before the shutdown is reported.
    assert!(out[0].is(MessageType::Ack));
    assert_eq!(shutdown_now(&out).unwrap(), [50_000, ShutdownReason::CloseTimer.code() as u32]);
}

#[test]
fn test_commands_refused_while_shut_down() {
    let mut mem = [0u8; 2048];
    let mut mcu = new_mcu(&mut mem, 0);
    let mut host = Host::new();
    configure(&mut mcu, &mut host, 0);

    let out = exchange(&mut mcu, &host.block(&[(MessageType::EmergencyStop, &[])]));
    assert_eq!(shutdown_now(&out).unwrap()[1], ShutdownReason::CommandRequest.code() as u32);

    let out = exchange(
        &mut mcu,
        &host.block(&[
            (MessageType::ScheduleDigitalOut, &[1, 90_000, 1]),
            (MessageType::GetClock, &[]),
        ]),
    );
    let msgs = messages(&out);
    assert_eq!(msgs.len(), 2);
    assert!(msgs[0].is(MessageType::ShutdownLast));
    assert_eq!(msgs[0].args(), [ShutdownReason::CommandRequest.code() as u32]);
    assert!(msgs[1].is(MessageType::GetClock));
    // Only the teardown wrote the pin.
    assert_eq!(mcu.board().writes, [(0, PIN, false)]);

    exchange(&mut mcu, &host.block(&[(MessageType::ClearShutdown, &[])]));
    assert_eq!(mcu.shutdown_status(), ShutdownStatus::Normal);
    mcu.board_mut().writes.clear();

    // The object survives a clear and accepts new events.
    exchange(&mut mcu, &host.block(&[(MessageType::ScheduleDigitalOut, &[1, 90_000, 1])]));
    advance_to(&mut mcu, 95_000);
    assert_eq!(mcu.board().writes, [(90_000, PIN, true)]);
}

#[test]
fn test_fault_while_shut_down_keeps_first_reason() {
    let mut mem = [0u8; 2048];
    let mut mcu = new_mcu(&mut mem, 0);
    let mut host = Host::new();
    configure(&mut mcu, &mut host, 0);

    exchange(&mut mcu, &host.block(&[(MessageType::UpdateDigitalOut, &[1, 1])]));
    assert_eq!(mcu.board().pins[&PIN], true);
    advance_to(&mut mcu, 1000);
    let out = exchange(&mut mcu, &host.block(&[(MessageType::EmergencyStop, &[])]));
    assert_eq!(shutdown_now(&out).unwrap(), [1000, ShutdownReason::CommandRequest.code() as u32]);
    assert_eq!(mcu.board().pins[&PIN], false);

    // identify with its arguments missing fails to parse
    let out = exchange(&mut mcu, &host.block_raw(&[MessageType::Identify.code()]));
    assert_eq!(shutdown_now(&out).unwrap()[1], ShutdownReason::CommandRequest.code() as u32);
    assert_eq!(mcu.shutdown_reason(), ShutdownReason::CommandRequest);

    exchange(&mut mcu, &host.block(&[(MessageType::ClearShutdown, &[])]));
    assert_eq!(mcu.shutdown_status(), ShutdownStatus::Normal);
    let out = exchange(&mut mcu, &host.block(&[(MessageType::ClearShutdown, &[])]));
    assert_eq!(shutdown_now(&out).unwrap()[1], ShutdownReason::AlreadyCleared.code() as u32);
    assert_eq!(mcu.shutdown_reason(), ShutdownReason::AlreadyCleared);
}

#[test]
fn test_config_reset_only_when_shut_down() {
    let mut mem = [0u8; 2048];
    let mut mcu = new_mcu(&mut mem, 0);
    let mut host = Host::new();
    configure(&mut mcu, &mut host, 0);

    let out = exchange(&mut mcu, &host.block(&[(MessageType::ConfigReset, &[])]));
    assert_eq!(shutdown_now(&out).unwrap()[1], ShutdownReason::NotShutdown.code() as u32);

    let out = exchange(
        &mut mcu,
        &host.block(&[(MessageType::ConfigReset, &[]), (MessageType::GetConfig, &[])]),
    );
    assert_eq!(mcu.shutdown_status(), ShutdownStatus::Normal);
    let config = messages(&out)[0].args();
    assert_eq!(config, [0, 0, 0, 0]);

    // A fresh configuration is accepted after the reset.
    configure(&mut mcu, &mut host, 0);
}
