// src/utils.rs
// Checksum and clock helpers shared by the framer, scheduler and stats code.

/// Implement the standard crc "ccitt" algorithm on the given buffer
pub fn crc16_ccitt(buf: &[u8]) -> u16 {
    let mut crc: u16 = 0xffff;
    for &byte in buf {
        let mut data = byte ^ (crc & 0xff) as u8;
        data ^= data << 4;
        crc = (((data as u16) << 8) | (crc >> 8)) ^ (data >> 4) as u16 ^ ((data as u16) << 3);
    }
    crc
}

// timer_is_before(t1, t2) -> t1 < t2 (considering wraparound for u32 timers)
pub fn timer_is_before(time1: u32, time2: u32) -> bool {
    // Assumes a difference of up to 2^31 ticks in either direction.
    (time1.wrapping_sub(time2) as i32) < 0
}

/// Convert microseconds to clock ticks at the given clock frequency.
pub fn timer_from_us(us: u32, clock_freq: u32) -> u32 {
    (us as u64 * clock_freq as u64 / 1_000_000) as u32
}

pub(crate) fn div_round_up(n: u32, d: u32) -> u32 {
    n.div_ceil(d)
}
