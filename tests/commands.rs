// tests/commands.rs
// Command dispatch: invalid bytes, identify, echo, uptime and the object id
// rules enforced while configuring.

mod common;

use common::*;
use knp_mcu::cmds::base::IDENTIFY_DATA;
use knp_mcu::vlq;
use knp_mcu::{MessageType, ShutdownReason, ShutdownStatus};

fn shutdown_code(out: &[Response]) -> Option<u32> {
    out.iter()
        .find(|r| r.is(MessageType::ShutdownNow))
        .map(|r| r.args()[1])
}

/// Run one block against a freshly booted MCU and report the shutdown code,
/// if any.
fn fault_of(cmds: &[(MessageType, &[u32])]) -> Option<u32> {
    let mut mem = [0u8; 1024];
    let mut mcu = new_mcu(&mut mem, 0);
    drain(&mut mcu);
    let out = exchange(&mut mcu, &Host::new().block(cmds));
    shutdown_code(&out)
}

#[test]
fn test_invalid_command_reported_and_block_skipped() {
    let mut mem = [0u8; 1024];
    let mut mcu = new_mcu(&mut mem, 0);
    drain(&mut mcu);
    let mut host = Host::new();

    let mut payload = encode_cmds(&[(MessageType::GetClock, &[])]);
    payload.push(200);
    payload.extend(encode_cmds(&[(MessageType::GetClock, &[])]));
    let out = exchange(&mut mcu, &host.block_raw(&payload));

    assert_eq!(out.len(), 3);
    assert!(out[0].is(MessageType::GetClock));
    assert!(out[1].is(MessageType::Unknown));
    assert_eq!(out[1].args(), [200]);
    assert!(out[2].is(MessageType::Ack));
    assert_eq!(mcu.shutdown_status(), ShutdownStatus::Normal);

    // Raw memory access is not served.
    let out = exchange(&mut mcu, &host.block(&[(MessageType::DebugRead, &[2, 0x2000_0000])]));
    assert_eq!(out[0].args(), [MessageType::DebugRead.code() as u32]);
}

#[test]
fn test_identify_returns_whole_dictionary_in_windows() {
    let mut mem = [0u8; 1024];
    let mut mcu = new_mcu(&mut mem, 0);
    drain(&mut mcu);
    let mut host = Host::new();

    let mut dict = Vec::new();
    loop {
        let offset = dict.len() as u32;
        let out = exchange(&mut mcu, &host.block(&[(MessageType::Identify, &[offset, 100])]));
        let resp = &out[0];
        assert!(resp.is(MessageType::Identify));
        let (echo, used) = vlq::decode(&resp.payload[1..]).unwrap();
        assert_eq!(echo, offset);
        let rest = &resp.payload[1 + used..];
        let (len, used) = vlq::decode(rest).unwrap();
        assert!(len <= 40);
        if len == 0 {
            break;
        }
        dict.extend_from_slice(&rest[used..used + len as usize]);
    }
    assert_eq!(dict, IDENTIFY_DATA);
}

#[test]
fn test_ping_echoes_bytes() {
    let mut mem = [0u8; 1024];
    let mut mcu = new_mcu(&mut mem, 0);
    drain(&mut mcu);
    let mut host = Host::new();

    let mut payload = vec![MessageType::DebugPing.code(), 5];
    payload.extend_from_slice(b"hello");
    let out = exchange(&mut mcu, &host.block_raw(&payload));
    assert_eq!(out[0].payload, payload);
    assert!(out[1].is(MessageType::Ack));
}

#[test]
fn test_uptime_counts_clock_wraps() {
    let mut mem = [0u8; 1024];
    let mut mcu = new_mcu(&mut mem, 0xffff_ff00);
    drain(&mut mcu);
    let mut host = Host::new();

    let out = exchange(&mut mcu, &host.block(&[(MessageType::GetUptime, &[])]));
    assert_eq!(out[0].args(), [0, 0xffff_ff00]);
    advance_to(&mut mcu, 0x100);
    let out = exchange(&mut mcu, &host.block(&[(MessageType::GetUptime, &[])]));
    let msgs = messages(&out);
    assert_eq!(msgs[0].args(), [1, 0x100]);
}

#[test]
fn test_repeated_stop_reruns_teardown() {
    let mut mem = [0u8; 1024];
    let mut mcu = new_mcu(&mut mem, 0);
    drain(&mut mcu);
    let mut host = Host::new();

    let out = exchange(&mut mcu, &host.block(&[(MessageType::EmergencyStop, &[])]));
    assert!(out[0].is(MessageType::Ack));
    assert!(out[1].is(MessageType::ShutdownNow));
    let out = exchange(&mut mcu, &host.block(&[(MessageType::EmergencyStop, &[])]));
    assert_eq!(shutdown_code(&out), Some(ShutdownReason::CommandRequest.code() as u32));
    assert_eq!(mcu.shutdown_status(), ShutdownStatus::Shutdown);
}

#[test]
fn test_oid_allocation_rules() {
    let code = |r: ShutdownReason| Some(r.code() as u32);

    assert_eq!(
        fault_of(&[(MessageType::AllocateOids, &[2]), (MessageType::AllocateOids, &[2])]),
        code(ShutdownReason::OidsAlreadyAllocated)
    );
    assert_eq!(
        fault_of(&[
            (MessageType::FinalizeConfig, &[1]),
            (MessageType::AllocateOids, &[4]),
            (MessageType::GetConfig, &[]),
        ]),
        code(ShutdownReason::OidsAlreadyAllocated)
    );
    assert_eq!(
        fault_of(&[
            (MessageType::AllocateOids, &[2]),
            (MessageType::ConfigDigitalOut, &[2, 5, 0, 0, 0]),
        ]),
        code(ShutdownReason::OidCantAssign)
    );
    assert_eq!(
        fault_of(&[
            (MessageType::AllocateOids, &[2]),
            (MessageType::ConfigDigitalOut, &[0, 5, 0, 0, 0]),
            (MessageType::ConfigPwmOut, &[0, 6, 1000, 0, 0, 0]),
        ]),
        code(ShutdownReason::OidCantAssign)
    );
    assert_eq!(
        fault_of(&[
            (MessageType::AllocateOids, &[2]),
            (MessageType::FinalizeConfig, &[0]),
            (MessageType::ConfigDigitalOut, &[0, 5, 0, 0, 0]),
        ]),
        code(ShutdownReason::OidCantAssign)
    );
    assert_eq!(
        fault_of(&[
            (MessageType::AllocateOids, &[2]),
            (MessageType::ConfigPwmOut, &[1, 6, 1000, 0, 0, 0]),
            (MessageType::FinalizeConfig, &[0]),
            (MessageType::ScheduleDigitalOut, &[1, 5000, 1]),
        ]),
        code(ShutdownReason::OidInvalid)
    );
    assert_eq!(
        fault_of(&[(MessageType::FinalizeConfig, &[0]), (MessageType::FinalizeConfig, &[0])]),
        code(ShutdownReason::AlreadyFinal)
    );
    assert_eq!(
        fault_of(&[
            (MessageType::AllocateOids, &[1]),
            (MessageType::ConfigDigitalOut, &[0, INVALID_PIN, 0, 0, 0]),
        ]),
        code(ShutdownReason::PinOutInvalid)
    );
    assert_eq!(
        fault_of(&[(MessageType::SetPwmOut, &[INVALID_PIN, 1000, 5])]),
        code(ShutdownReason::PinPwmInvalid)
    );
    assert_eq!(fault_of(&[(MessageType::AllocateOids, &[4]), (MessageType::GetConfig, &[])]), None);
}

#[test]
fn test_schedule_before_finalize_has_no_slots() {
    assert_eq!(
        fault_of(&[
            (MessageType::AllocateOids, &[1]),
            (MessageType::ConfigDigitalOut, &[0, 5, 0, 0, 0]),
            (MessageType::ScheduleDigitalOut, &[0, 5000, 1]),
        ]),
        Some(ShutdownReason::MoveQueueEmpty.code() as u32)
    );
}

#[test]
fn test_pwm_output_follows_schedule() {
    let mut mem = [0u8; 1024];
    let mut mcu = new_mcu(&mut mem, 0);
    drain(&mut mcu);
    let mut host = Host::new();
    exchange(
        &mut mcu,
        &host.block(&[
            (MessageType::AllocateOids, &[1]),
            (MessageType::ConfigPwmOut, &[0, 6, 1000, 0, 0, 0]),
            (MessageType::FinalizeConfig, &[0]),
            (MessageType::SchedulePwmOut, &[0, 2000, 0x4000]),
            (MessageType::SchedulePwmOut, &[0, 3000, 0xffff]),
        ]),
    );
    advance_to(&mut mcu, 2500);
    assert_eq!(mcu.board().pwm[&6], 0x4000);
    advance_to(&mut mcu, 3500);
    assert_eq!(mcu.board().pwm[&6], 0xffff);

    exchange(&mut mcu, &host.block(&[(MessageType::EmergencyStop, &[])]));
    assert_eq!(mcu.board().pwm[&6], 0);
}
