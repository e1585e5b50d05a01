// src/command.rs
// Decoding of host commands. Each invocation inside a block is one type byte
// followed by its VLQ encoded arguments.

use bitflags::bitflags;

use crate::protocol::{MessageType, ShutdownReason};
use crate::vlq::Reader;

bitflags! {
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct CommandFlags: u8 {
        /// May run while the MCU is shut down.
        const IN_SHUTDOWN = 1 << 0;
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command<'a> {
    Noop,
    Identify { offset: u32, count: u8 },
    AllocateOids { count: u8 },
    GetConfig,
    FinalizeConfig { crc: u32 },
    GetClock,
    GetUptime,
    EmergencyStop,
    ClearShutdown,
    ConfigReset,
    StartGroup { clock: u32 },
    EndGroup,
    DebugNop,
    DebugPing { data: &'a [u8] },
    ConfigDigitalOut { oid: u8, pin: u32, value: u8, default_value: u8, max_duration: u32 },
    ScheduleDigitalOut { oid: u8, clock: u32, value: u8 },
    UpdateDigitalOut { oid: u8, value: u8 },
    SetDigitalOut { pin: u32, value: u8 },
    ConfigPwmOut { oid: u8, pin: u32, cycle_time: u32, value: u16, default_value: u16, max_duration: u32 },
    SchedulePwmOut { oid: u8, clock: u32, value: u16 },
    SetPwmOut { pin: u32, cycle_time: u32, value: u16 },
}

/// One decoded invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decoded<'a> {
    Command(Command<'a>),
    /// Type byte with no handler in this firmware. The rest of the block
    /// cannot be parsed past it.
    Invalid(u8),
}

impl<'a> Command<'a> {
    /// Decode the next invocation from `r`. Truncated arguments are a fault.
    pub fn parse(r: &mut Reader<'a>) -> Result<Decoded<'a>, ShutdownReason> {
        let byte = r.read_byte()?;
        let Some(ty) = MessageType::from_code(byte) else {
            return Ok(Decoded::Invalid(byte));
        };
        let cmd = match ty {
            MessageType::Noop => Command::Noop,
            MessageType::Identify => Command::Identify {
                offset: r.read_u32()?,
                count: r.read_u8()?,
            },
            MessageType::AllocateOids => Command::AllocateOids { count: r.read_u8()? },
            MessageType::GetConfig => Command::GetConfig,
            MessageType::FinalizeConfig => Command::FinalizeConfig { crc: r.read_u32()? },
            MessageType::GetClock => Command::GetClock,
            MessageType::GetUptime => Command::GetUptime,
            MessageType::EmergencyStop => Command::EmergencyStop,
            MessageType::ClearShutdown => Command::ClearShutdown,
            MessageType::ConfigReset => Command::ConfigReset,
            MessageType::StartGroup => Command::StartGroup { clock: r.read_u32()? },
            MessageType::EndGroup => Command::EndGroup,
            MessageType::DebugNop => Command::DebugNop,
            MessageType::DebugPing => Command::DebugPing { data: r.read_bytes()? },
            MessageType::ConfigDigitalOut => Command::ConfigDigitalOut {
                oid: r.read_u8()?,
                pin: r.read_u32()?,
                value: r.read_u8()?,
                default_value: r.read_u8()?,
                max_duration: r.read_u32()?,
            },
            MessageType::ScheduleDigitalOut => Command::ScheduleDigitalOut {
                oid: r.read_u8()?,
                clock: r.read_u32()?,
                value: r.read_u8()?,
            },
            MessageType::UpdateDigitalOut => Command::UpdateDigitalOut {
                oid: r.read_u8()?,
                value: r.read_u8()?,
            },
            MessageType::SetDigitalOut => Command::SetDigitalOut {
                pin: r.read_u32()?,
                value: r.read_u8()?,
            },
            MessageType::ConfigPwmOut => Command::ConfigPwmOut {
                oid: r.read_u8()?,
                pin: r.read_u32()?,
                cycle_time: r.read_u32()?,
                value: r.read_u16()?,
                default_value: r.read_u16()?,
                max_duration: r.read_u32()?,
            },
            MessageType::SchedulePwmOut => Command::SchedulePwmOut {
                oid: r.read_u8()?,
                clock: r.read_u32()?,
                value: r.read_u16()?,
            },
            MessageType::SetPwmOut => Command::SetPwmOut {
                pin: r.read_u32()?,
                cycle_time: r.read_u32()?,
                value: r.read_u16()?,
            },
            // Responses, raw memory access and driver bytes served elsewhere.
            _ => return Ok(Decoded::Invalid(byte)),
        };
        Ok(Decoded::Command(cmd))
    }

    pub fn flags(&self) -> CommandFlags {
        match self {
            Command::Noop
            | Command::Identify { .. }
            | Command::GetConfig
            | Command::GetClock
            | Command::GetUptime
            | Command::EmergencyStop
            | Command::ClearShutdown
            | Command::ConfigReset
            | Command::DebugNop
            | Command::DebugPing { .. } => CommandFlags::IN_SHUTDOWN,
            _ => CommandFlags::empty(),
        }
    }
}
