// src/protocol.rs
// Message type bytes and shutdown reason codes shared with the host.

use core::fmt;

/// Single byte selecting a command (host to MCU) or response (MCU to host).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum MessageType {
    Unknown = 0,
    Noop = 1,
    Start = 2,
    Ack = 3,
    Nack = 4,
    ShutdownNow = 5,
    ShutdownLast = 6,
    Identify = 7,
    AllocateOids = 8,
    GetConfig = 9,
    FinalizeConfig = 10,
    GetClock = 11,
    GetUptime = 12,
    EmergencyStop = 13,
    ClearShutdown = 14,
    Stats = 15,
    ConfigReset = 16,
    StartGroup = 17,
    EndGroup = 18,
    DebugNop = 19,
    DebugPing = 20,
    DebugRead = 21,
    DebugWrite = 22,
    ConfigDigitalOut = 23,
    ScheduleDigitalOut = 24,
    UpdateDigitalOut = 25,
    SetDigitalOut = 26,
    ConfigSoftPwm = 27,
    ScheduleSoftPwm = 28,
    ConfigPwmOut = 29,
    SchedulePwmOut = 30,
    SetPwmOut = 31,
    AdcConfig = 32,
    AdcQuery = 33,
    AdcState = 34,
    I2cConfig = 35,
    I2cModbits = 36,
    I2cRead = 37,
    I2cWrite = 38,
    SpiConfig = 39,
    SpiConfigNoCs = 40,
    SpiSet = 41,
    SpiTransfer = 42,
    SpiSend = 43,
    SpiShutdown = 44,
}

impl MessageType {
    /// Number of assigned type bytes.
    pub const COUNT: u8 = 45;

    pub const fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        use MessageType::*;
        const TABLE: [MessageType; MessageType::COUNT as usize] = [
            Unknown, Noop, Start, Ack, Nack, ShutdownNow, ShutdownLast, Identify,
            AllocateOids, GetConfig, FinalizeConfig, GetClock, GetUptime, EmergencyStop,
            ClearShutdown, Stats, ConfigReset, StartGroup, EndGroup, DebugNop, DebugPing,
            DebugRead, DebugWrite, ConfigDigitalOut, ScheduleDigitalOut, UpdateDigitalOut,
            SetDigitalOut, ConfigSoftPwm, ScheduleSoftPwm, ConfigPwmOut, SchedulePwmOut,
            SetPwmOut, AdcConfig, AdcQuery, AdcState, I2cConfig, I2cModbits, I2cRead,
            I2cWrite, SpiConfig, SpiConfigNoCs, SpiSet, SpiTransfer, SpiSend, SpiShutdown,
        ];
        TABLE.get(code as usize).copied()
    }
}

macro_rules! shutdown_reasons {
    ($($name:ident = $code:literal => $text:literal,)*) => {
        /// Why the MCU entered the shutdown state. The numeric codes are part
        /// of the wire protocol and never change.
        #[derive(Copy, Clone, Debug, PartialEq, Eq)]
        #[cfg_attr(feature = "defmt", derive(defmt::Format))]
        #[repr(u8)]
        pub enum ShutdownReason {
            $($name = $code,)*
        }

        impl ShutdownReason {
            pub const fn code(self) -> u8 {
                self as u8
            }

            pub fn from_code(code: u8) -> Option<Self> {
                match code {
                    $($code => Some(ShutdownReason::$name),)*
                    _ => None,
                }
            }

            /// Human readable text, as printed by the host.
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(ShutdownReason::$name => $text,)*
                }
            }
        }
    };
}

shutdown_reasons! {
    Unknown = 0 => "Unknown error",
    Generic = 1 => "Generic error",
    AlreadyCleared = 2 => "Shutdown cleared when not shutdown",
    CloseTimer = 3 => "Timer too close",
    SentinelTimer = 4 => "Sentinel timer called",
    InvalidCommand = 5 => "Invalid command",
    MessageEncode = 6 => "Message encode error",
    CommandParse = 7 => "Command parser error",
    CommandRequest = 8 => "Command request",
    NotShutdown = 9 => "config_reset only available when shutdown",
    OidsAlreadyAllocated = 10 => "oids already allocated",
    OidCantAssign = 11 => "Can't assign oid",
    OidInvalid = 12 => "Invalid oid type",
    AlreadyFinal = 13 => "Already finalized",
    InvalidMoveSize = 14 => "Invalid move request size",
    MoveQueueEmpty = 15 => "Move queue empty",
    ChunksFail = 16 => "alloc_chunks failed",
    ChunkFail = 17 => "alloc_chunk failed",
    MissedEvent = 18 => "Missed scheduling of next event",
    NextPwmExtends = 19 => "next soft pwm extends existing pwm",
    MissedPwmEvent = 20 => "Missed scheduling of next pwm event",
    MissedPinEvent = 21 => "Missed scheduling of next digital out event",
    StepperActiveCantReset = 22 => "Can't reset time when stepper active",
    InvalidCountParam = 23 => "Invalid count parameter",
    StepperTooOld = 24 => "Stepper too far in past",
    NoNextStep = 25 => "No next step",
    PastMaxCount = 26 => "Timer past max count",
    AdcOutOfRange = 27 => "ADC out of range",
    SpiConfigInvalid = 28 => "Invalid spi config",
    TcoupleReadFail = 29 => "Thermocouple reader fault",
    TcoupleAdcOutOfRange = 30 => "Thermocouple ADC out of range",
    TcoupleInvalid = 31 => "Invalid thermocouple chip type",
    I2cModifyBits = 32 => "i2c_modify_bits: Odd number of bits!",
    PwmMissedEvent = 33 => "Missed scheduling of next hard pwm event",
    ButtonsRetransmitInvalid = 34 => "Invalid buttons retransmit count",
    ButtonPastMaxCount = 35 => "Set button past maximum button count",
    ButtonsMax = 36 => "Max of 8 buttons",
    TmcuartLargeData = 37 => "tmcuart data too large",
    TimerReschedPast = 38 => "Rescheduled timer in the past",
    PinInInvalid = 39 => "Not a valid input pin",
    PinOutInvalid = 40 => "Not an output pin",
    PinAdcInvalid = 41 => "Not a valid ADC pin",
    SpiSetupInvalid = 42 => "Invalid spi_setup parameters",
    I2cStartFail = 43 => "i2c start failed",
    I2cTimeout = 44 => "i2c timeout",
    I2cBusInvalid = 45 => "Unsupported i2c bus",
    PwmAlreadyProgrammed = 46 => "PWM already programmed at different speed",
    Timer1NotPwm = 47 => "timer1 not available for pwm",
    PinPwmInvalid = 48 => "Not a valid PWM pin",
    WatchdogExpire = 49 => "Watchdog timer!",
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.as_str(), self.code())
    }
}
