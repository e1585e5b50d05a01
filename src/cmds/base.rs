// src/cmds/base.rs
// Configuration, clock and statistics commands every build carries.

use crate::config::STATS_INTERVAL_US;
use crate::hal::Board;
use crate::mcu::Mcu;
use crate::protocol::{MessageType, ShutdownReason};
use crate::utils::{div_round_up, timer_is_before};

/// Static identify dictionary served in windows by `identify`.
pub const IDENTIFY_DATA: &[u8] = concat!(
    "{\"app\":\"",
    env!("CARGO_PKG_NAME"),
    "\",\"version\":\"",
    env!("CARGO_PKG_VERSION"),
    "\",\"config\":{\"MESSAGE_MAX\":256,\"MESSAGE_MIN\":5,\"MOVE_QUEUE_MAX\":1024},",
    "\"commands\":{\"identify\":7,\"allocate_oids\":8,\"get_config\":9,\"finalize_config\":10,",
    "\"get_clock\":11,\"get_uptime\":12,\"emergency_stop\":13,\"clear_shutdown\":14,",
    "\"config_reset\":16,\"start_group\":17,\"end_group\":18,\"debug_nop\":19,\"debug_ping\":20,",
    "\"config_digital_out\":23,\"schedule_digital_out\":24,\"update_digital_out\":25,",
    "\"set_digital_out\":26,\"config_pwm_out\":29,\"schedule_pwm_out\":30,\"set_pwm_out\":31}}"
)
.as_bytes();

/// Largest identify window returned per request.
const IDENTIFY_CHUNK_MAX: usize = 40;

const SUMSQ_BASE: u32 = 256;

/// Task loop timing accumulators.
#[derive(Debug, Clone, Copy)]
pub struct Stats {
    count: u32,
    sum: u32,
    sumsq: u32,
    last_send: u32,
    /// Number of times the clock wrapped, as seen at send points.
    high: u32,
}

impl Stats {
    pub fn new(now: u32) -> Self {
        Self {
            count: 0,
            sum: 0,
            sumsq: 0,
            last_send: now,
            high: 0,
        }
    }

    /// Fold one task round of `cur - start` ticks into the accumulators.
    /// Returns `(count, sum, sumsq)` when `interval` ticks have passed since
    /// the last report.
    fn update(&mut self, start: u32, cur: u32, interval: u32) -> Option<(u32, u32, u32)> {
        let diff = cur.wrapping_sub(start);
        self.count = self.count.wrapping_add(1);
        self.sum = self.sum.wrapping_add(diff);
        let next = if diff <= 0xffff {
            self.sumsq.checked_add(div_round_up(diff * diff, SUMSQ_BASE))
        } else if diff <= 0xfffff {
            div_round_up(diff, SUMSQ_BASE)
                .checked_mul(diff)
                .and_then(|sq| self.sumsq.checked_add(sq))
        } else {
            None
        };
        self.sumsq = next.unwrap_or(u32::MAX);

        if timer_is_before(cur, self.last_send.wrapping_add(interval)) {
            return None;
        }
        let report = (self.count, self.sum, self.sumsq);
        if cur < self.last_send {
            self.high = self.high.wrapping_add(1);
        }
        self.last_send = cur;
        self.count = 0;
        self.sum = 0;
        self.sumsq = 0;
        Some(report)
    }

    /// High word of the 64-bit uptime at time `cur`.
    fn uptime_high(&self, cur: u32) -> u32 {
        self.high.wrapping_add((cur < self.last_send) as u32)
    }
}

pub(crate) fn stats_update<B: Board>(mcu: &mut Mcu<'_, B>, start: u32, cur: u32) {
    let interval = mcu.config.ticks_from_us(STATS_INTERVAL_US);
    if let Some((count, sum, sumsq)) = mcu.stats.update(start, cur, interval) {
        mcu.send(MessageType::Stats, &[count, sum, sumsq]);
    }
}

pub(crate) fn identify<B: Board>(mcu: &mut Mcu<'_, B>, offset: u32, count: u8) {
    let start = (offset as usize).min(IDENTIFY_DATA.len());
    let end = (start + (count as usize).min(IDENTIFY_CHUNK_MAX)).min(IDENTIFY_DATA.len());
    mcu.send_with_bytes(MessageType::Identify, &[offset], Some(&IDENTIFY_DATA[start..end]));
}

pub(crate) fn allocate_oids<B: Board>(mcu: &mut Mcu<'_, B>, count: u8) -> Result<(), ShutdownReason> {
    mcu.oids.allocate(&mut mcu.arena, count)
}

pub(crate) fn get_config<B: Board>(mcu: &mut Mcu<'_, B>) {
    let args = [
        mcu.move_queue.is_finalized() as u32,
        mcu.config_crc,
        mcu.move_queue.count() as u32,
        mcu.shutdown.is_shutdown() as u32,
    ];
    mcu.send(MessageType::GetConfig, &args);
}

pub(crate) fn finalize_config<B: Board>(mcu: &mut Mcu<'_, B>, crc: u32) -> Result<(), ShutdownReason> {
    mcu.move_queue.finalize(&mut mcu.arena)?;
    mcu.oids.finalize();
    mcu.config_crc = crc;
    log::info!(
        "config finalized: crc {:#010x}, {} move slots, arena {}/{} bytes",
        crc,
        mcu.move_queue.count(),
        mcu.arena.used(),
        mcu.arena.capacity()
    );
    Ok(())
}

pub(crate) fn get_clock<B: Board>(mcu: &mut Mcu<'_, B>) {
    let now = mcu.board.read_time();
    mcu.send(MessageType::GetClock, &[now]);
}

pub(crate) fn get_uptime<B: Board>(mcu: &mut Mcu<'_, B>) {
    let cur = mcu.board.read_time();
    let high = mcu.stats.uptime_high(cur);
    mcu.send(MessageType::GetUptime, &[high, cur]);
}

/// Drop all configuration. Only allowed once shut down.
pub(crate) fn config_reset<B: Board>(mcu: &mut Mcu<'_, B>) -> Result<(), ShutdownReason> {
    if !mcu.shutdown.is_shutdown() {
        return Err(ShutdownReason::NotShutdown);
    }
    mcu.config_crc = 0;
    mcu.oids.reset();
    mcu.move_queue.clear();
    mcu.arena.reset();
    mcu.sched.reset();
    mcu.sched.free_timers();
    mcu.shutdown.clear()?;
    log::info!("config reset");
    Ok(())
}
