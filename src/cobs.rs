// src/cobs.rs
// Consistent overhead byte stuffing with the sync byte as the removed value.
//
// A group is a code byte N followed by N-1 literal bytes; an implied sync byte
// follows the group unless N is 0xFF or the group ends the block. Code bytes
// travel XOR'ed with the sync value so that no code can ever look like the
// block terminator. Literals travel unmodified.

use crate::config::MESSAGE_SYNC;

/// Code value of a full group without an implied sync byte.
const RUN_MAX: u8 = 0xFF;

/// Longest body that `encode_in_place` accepts.
pub const IN_PLACE_MAX: usize = RUN_MAX as usize - 1;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CobsError {
    /// Output does not fit in the destination.
    Overflow,
    /// A code byte announced more literals than the block holds.
    Truncated,
    /// A zero code, which no encoder produces.
    BadCode,
}

/// Encode `buf[1..]` in place; `buf[0]` is scratch space for the first code
/// byte. The body may not exceed `IN_PLACE_MAX` bytes, which guarantees that
/// no group needs the 0xFF form and the output length equals `buf.len()`.
pub fn encode_in_place(buf: &mut [u8]) -> Result<(), CobsError> {
    if buf.is_empty() || buf.len() - 1 > IN_PLACE_MAX {
        return Err(CobsError::Overflow);
    }
    let mut code_pos = 0;
    for i in 1..buf.len() {
        if buf[i] == MESSAGE_SYNC {
            buf[code_pos] = (i - code_pos) as u8 ^ MESSAGE_SYNC;
            code_pos = i;
        }
    }
    buf[code_pos] = (buf.len() - code_pos) as u8 ^ MESSAGE_SYNC;
    Ok(())
}

/// Decode an encoded block (trailing sync excluded) in place, returning the
/// decoded length. Output is written from the start of `buf`.
pub fn decode_in_place(buf: &mut [u8]) -> Result<usize, CobsError> {
    let end = buf.len();
    let mut rd = 0;
    let mut wr = 0;
    while rd < end {
        let code = buf[rd] ^ MESSAGE_SYNC;
        if code == 0 {
            return Err(CobsError::BadCode);
        }
        rd += 1;
        let run = code as usize - 1;
        if rd + run > end {
            return Err(CobsError::Truncated);
        }
        buf.copy_within(rd..rd + run, wr);
        wr += run;
        rd += run;
        if code != RUN_MAX && rd < end {
            buf[wr] = MESSAGE_SYNC;
            wr += 1;
        }
    }
    Ok(wr)
}
