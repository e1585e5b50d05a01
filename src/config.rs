// src/config.rs
// Compile-time protocol limits and the runtime MCU configuration.

/// Largest encoded block on the wire, trailing sync byte included.
pub const MESSAGE_MAX: usize = 256;
/// COBS code byte + sequence byte.
pub const MESSAGE_HEADER_SIZE: usize = 2;
/// CRC high + CRC low + sync byte.
pub const MESSAGE_TRAILER_SIZE: usize = 3;
pub const MESSAGE_MIN: usize = MESSAGE_HEADER_SIZE + MESSAGE_TRAILER_SIZE;
/// Largest payload the transmit path accepts. One byte of headroom keeps a
/// body below the 254-byte COBS run so it can be stuffed in place.
pub const MESSAGE_PAYLOAD_MAX: usize = MESSAGE_MAX - MESSAGE_MIN - 1;

pub const MESSAGE_SYNC: u8 = 0x7E;
pub const MESSAGE_SEQ_MASK: u8 = 0x0f;
pub const MESSAGE_DEST: u8 = 0x10;

pub const RX_BUFFER_SIZE: usize = MESSAGE_MAX * 2;
pub const TX_BUFFER_SIZE: usize = MESSAGE_MAX + MESSAGE_MAX / 2;

/// Timer slots: the builtin timers plus one per configured timed object.
pub const MAX_TIMERS: usize = 64;
/// Upper bound on move-queue slots carved at finalize time.
pub const MOVE_QUEUE_MAX_ITEMS: usize = 1024;

pub const PERIODIC_INTERVAL_US: u32 = 100_000;
pub const STATS_INTERVAL_US: u32 = 5_000_000;
/// A timer this far behind "now" when deferred means dispatch cannot keep up.
pub const TIMER_RESCHED_LIMIT_US: u32 = 1_000;

// Timer fairness budgets, in microseconds of MCU time.
pub const TIMER_IDLE_REPEAT_US: u32 = 500;
pub const TIMER_REPEAT_US: u32 = 190;
pub const TIMER_DEFER_REPEAT_US: u32 = 16;

/// Runtime parameters of one MCU instance.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct McuConfig {
    /// Tick rate of the free running 32-bit clock.
    pub clock_freq: u32,
}

impl Default for McuConfig {
    fn default() -> Self {
        Self { clock_freq: 50_000_000 }
    }
}

impl McuConfig {
    pub fn ticks_from_us(&self, us: u32) -> u32 {
        crate::utils::timer_from_us(us, self.clock_freq)
    }
}
