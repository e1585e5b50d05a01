// src/serial.rs
// Block framing on top of the byte stream: receive buffer, transmit buffer and
// the sequence/CRC state machine that validates incoming blocks.

use core::ops::Range;

use bitflags::bitflags;

use crate::cobs;
use crate::config::{
    MESSAGE_DEST, MESSAGE_MAX, MESSAGE_MIN, MESSAGE_PAYLOAD_MAX, MESSAGE_SEQ_MASK, MESSAGE_SYNC,
    RX_BUFFER_SIZE, TX_BUFFER_SIZE,
};
use crate::utils::crc16_ccitt;

bitflags! {
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    struct SyncState: u8 {
        /// Discarding input up to the next sync byte.
        const NEED_SYNC = 1 << 0;
        /// An error was reported and no valid block has been seen since.
        const NEED_VALID = 1 << 1;
    }
}

/// Result of scanning the receive buffer for one block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    /// No complete block yet; leave the buffer alone.
    NeedMoreData,
    /// A valid, in-sequence block. The payload range indexes the (now
    /// decoded) receive buffer and must be consumed before `pop` bytes are
    /// removed.
    Accept { pop: usize, payload: Range<usize> },
    /// Drop `pop` bytes; queue a NACK first when `nack` is set.
    Discard { pop: usize, nack: bool },
}

/// Write one framed block for `payload` into `dst` and return its length.
/// The block is `[code][seq][payload][crc_hi][crc_lo][sync]` after stuffing.
pub fn write_frame(dst: &mut [u8], seq: u8, payload: &[u8]) -> Option<usize> {
    if payload.len() > MESSAGE_PAYLOAD_MAX {
        return None;
    }
    let len = payload.len() + MESSAGE_MIN;
    let block = dst.get_mut(..len)?;
    block[1] = seq;
    block[2..2 + payload.len()].copy_from_slice(payload);
    let crc_pos = 2 + payload.len();
    let crc = crc16_ccitt(&block[1..crc_pos]);
    block[crc_pos..crc_pos + 2].copy_from_slice(&crc.to_be_bytes());
    cobs::encode_in_place(&mut block[..len - 1]).ok()?;
    block[len - 1] = MESSAGE_SYNC;
    Some(len)
}

/// Sequence tracking and block validation for the receive direction.
#[derive(Debug)]
pub struct Framer {
    next_sequence: u8,
    sync_state: SyncState,
}

impl Default for Framer {
    fn default() -> Self {
        Self::new()
    }
}

impl Framer {
    pub const fn new() -> Self {
        Self {
            next_sequence: MESSAGE_DEST,
            sync_state: SyncState::empty(),
        }
    }

    /// Sequence byte expected on the next host block; also stamped on every
    /// outgoing block as the acknowledgement position.
    pub fn next_sequence(&self) -> u8 {
        self.next_sequence
    }

    /// Look for one complete block at the front of `buf`. Accepted and
    /// corrupt blocks are COBS-decoded in place.
    pub fn find_block(&mut self, buf: &mut [u8]) -> FrameOutcome {
        if self.sync_state.contains(SyncState::NEED_SYNC) {
            return self.resync(buf);
        }
        if buf.is_empty() {
            return FrameOutcome::NeedMoreData;
        }
        if buf[0] == MESSAGE_SYNC {
            // Stray sync bytes between blocks are not errors.
            return FrameOutcome::Discard { pop: 1, nack: false };
        }
        let Some(end) = buf.iter().position(|&b| b == MESSAGE_SYNC) else {
            if buf.len() >= MESSAGE_MAX {
                self.sync_state.insert(SyncState::NEED_SYNC);
                return self.resync(buf);
            }
            return FrameOutcome::NeedMoreData;
        };
        let msglen = end + 1;
        if !(MESSAGE_MIN..=MESSAGE_MAX).contains(&msglen) {
            return self.reject(msglen);
        }
        let Ok(body_len) = cobs::decode_in_place(&mut buf[..end]) else {
            return self.reject(msglen);
        };
        if body_len < MESSAGE_MIN - 2 {
            return self.reject(msglen);
        }
        let seq = buf[0];
        if seq & !MESSAGE_SEQ_MASK != MESSAGE_DEST {
            return self.reject(msglen);
        }
        let crc_pos = body_len - 2;
        let crc = u16::from_be_bytes([buf[crc_pos], buf[crc_pos + 1]]);
        if crc != crc16_ccitt(&buf[..crc_pos]) {
            return self.reject(msglen);
        }
        self.sync_state.remove(SyncState::NEED_VALID);
        if seq != self.next_sequence {
            // Lost or repeated block; drop until the host retransmits.
            log::debug!("sequence mismatch: got {:#04x}, expected {:#04x}", seq, self.next_sequence);
            return FrameOutcome::Discard { pop: msglen, nack: true };
        }
        self.next_sequence = (seq.wrapping_add(1) & MESSAGE_SEQ_MASK) | MESSAGE_DEST;
        FrameOutcome::Accept {
            pop: msglen,
            payload: 1..crc_pos,
        }
    }

    fn reject(&mut self, pop: usize) -> FrameOutcome {
        FrameOutcome::Discard { pop, nack: self.note_error() }
    }

    fn resync(&mut self, buf: &[u8]) -> FrameOutcome {
        let pop = match buf.iter().position(|&b| b == MESSAGE_SYNC) {
            Some(pos) => {
                self.sync_state.remove(SyncState::NEED_SYNC);
                pos + 1
            }
            None => buf.len(),
        };
        if pop == 0 {
            return FrameOutcome::NeedMoreData;
        }
        FrameOutcome::Discard { pop, nack: self.note_error() }
    }

    /// Returns true for the first error of a streak.
    fn note_error(&mut self) -> bool {
        if self.sync_state.contains(SyncState::NEED_VALID) {
            return false;
        }
        self.sync_state.insert(SyncState::NEED_VALID);
        true
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

/// Receive side byte store. Filled one byte at a time from interrupt context.
#[derive(Debug)]
pub struct RxBuffer {
    buf: [u8; RX_BUFFER_SIZE],
    len: usize,
}

impl Default for RxBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl RxBuffer {
    pub const fn new() -> Self {
        Self {
            buf: [0; RX_BUFFER_SIZE],
            len: 0,
        }
    }

    /// Store one received byte. Returns true when the byte may complete a
    /// block. Bytes beyond the buffer capacity are dropped; the CRC check then
    /// forces a retransmit.
    pub fn push(&mut self, byte: u8) -> bool {
        if self.len >= self.buf.len() {
            return false;
        }
        self.buf[self.len] = byte;
        self.len += 1;
        byte == MESSAGE_SYNC
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.buf[..self.len]
    }

    /// Remove `count` bytes from the front.
    pub fn pop(&mut self, count: usize) {
        let count = count.min(self.len);
        self.buf.copy_within(count..self.len, 0);
        self.len -= count;
    }
}

/// Transmit side byte store. Blocks are appended whole and drained byte by
/// byte by the transmit interrupt.
#[derive(Debug)]
pub struct TxBuffer {
    buf: [u8; TX_BUFFER_SIZE],
    head: usize,
    tail: usize,
}

impl Default for TxBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl TxBuffer {
    pub const fn new() -> Self {
        Self {
            buf: [0; TX_BUFFER_SIZE],
            head: 0,
            tail: 0,
        }
    }

    pub fn pending(&self) -> usize {
        self.tail - self.head
    }

    /// Frame `payload` onto the end of the buffer. Returns false when there is
    /// no room even after compaction; the message is dropped.
    pub fn push_frame(&mut self, seq: u8, payload: &[u8]) -> bool {
        let need = payload.len() + MESSAGE_MIN;
        if self.tail + need > self.buf.len() {
            self.compact();
            if self.tail + need > self.buf.len() {
                return false;
            }
        }
        match write_frame(&mut self.buf[self.tail..], seq, payload) {
            Some(len) => {
                self.tail += len;
                true
            }
            None => false,
        }
    }

    /// Next byte for the wire, if any.
    pub fn next_byte(&mut self) -> Option<u8> {
        if self.head >= self.tail {
            return None;
        }
        let b = self.buf[self.head];
        self.head += 1;
        if self.head == self.tail {
            self.head = 0;
            self.tail = 0;
        }
        Some(b)
    }

    /// Slide unsent bytes to the front of the buffer.
    fn compact(&mut self) {
        if self.head == 0 {
            return;
        }
        self.buf.copy_within(self.head..self.tail, 0);
        self.tail -= self.head;
        self.head = 0;
    }
}
