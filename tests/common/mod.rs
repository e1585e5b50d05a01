// tests/common/mod.rs
// Recording board double and a host side encoder/decoder for driving a whole
// `Mcu` over its byte interface.
#![allow(dead_code)]

use std::collections::BTreeMap;

use knp_mcu::cobs;
use knp_mcu::config::{MESSAGE_MAX, MESSAGE_SYNC};
use knp_mcu::serial::write_frame;
use knp_mcu::utils::{crc16_ccitt, timer_is_before};
use knp_mcu::vlq::{self, Writer};
use knp_mcu::{Board, Mcu, McuConfig, MessageType, PinError};

pub const INVALID_PIN: u32 = 999;

#[derive(Debug, Default)]
pub struct FakeBoard {
    pub now: u32,
    pub kicks: u32,
    pub pins: BTreeMap<u32, bool>,
    pub pwm: BTreeMap<u32, u16>,
    /// Every digital write as `(time, pin, value)`.
    pub writes: Vec<(u32, u32, bool)>,
}

impl Board for FakeBoard {
    fn read_time(&self) -> u32 {
        self.now
    }

    fn timer_kick(&mut self) {
        self.kicks += 1;
    }

    fn enable_tx_irq(&mut self) {}

    fn gpio_out_setup(&mut self, pin: u32, value: bool) -> Result<(), PinError> {
        if pin == INVALID_PIN {
            return Err(PinError::InvalidPin);
        }
        self.pins.insert(pin, value);
        Ok(())
    }

    fn gpio_out_write(&mut self, pin: u32, value: bool) {
        self.writes.push((self.now, pin, value));
        self.pins.insert(pin, value);
    }

    fn pwm_setup(&mut self, pin: u32, _cycle_time: u32, value: u16) -> Result<(), PinError> {
        if pin == INVALID_PIN {
            return Err(PinError::NotPwm);
        }
        self.pwm.insert(pin, value);
        Ok(())
    }

    fn pwm_write(&mut self, pin: u32, value: u16) {
        self.pwm.insert(pin, value);
    }
}

/// One block received from the MCU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub seq: u8,
    pub payload: Vec<u8>,
}

impl Response {
    pub fn msg_type(&self) -> u8 {
        self.payload[0]
    }

    pub fn is(&self, ty: MessageType) -> bool {
        self.msg_type() == ty.code()
    }

    /// Integer arguments following the type byte.
    pub fn args(&self) -> Vec<u32> {
        let mut out = Vec::new();
        let mut rest = &self.payload[1..];
        while let Some((v, used)) = vlq::decode(rest) {
            out.push(v);
            rest = &rest[used..];
        }
        out
    }
}

/// Host side of the link: numbers blocks and encodes commands.
pub struct Host {
    seq: u8,
}

impl Host {
    pub fn new() -> Self {
        Self { seq: 0 }
    }

    pub fn seq_byte(&self) -> u8 {
        0x10 | (self.seq & 0x0f)
    }

    /// Frame a raw payload with the current sequence number and advance it.
    pub fn block_raw(&mut self, payload: &[u8]) -> Vec<u8> {
        let out = frame(self.seq_byte(), payload);
        self.seq = self.seq.wrapping_add(1);
        out
    }

    /// Frame one block holding the given invocations.
    pub fn block(&mut self, cmds: &[(MessageType, &[u32])]) -> Vec<u8> {
        self.block_raw(&encode_cmds(cmds))
    }
}

pub fn encode_cmds(cmds: &[(MessageType, &[u32])]) -> Vec<u8> {
    let mut buf = [0u8; MESSAGE_MAX];
    let mut w = Writer::new(&mut buf);
    for (ty, args) in cmds {
        w.put_byte(ty.code()).unwrap();
        for &a in args.iter() {
            w.put_u32(a).unwrap();
        }
    }
    w.as_slice().to_vec()
}

pub fn frame(seq: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = [0u8; MESSAGE_MAX];
    let n = write_frame(&mut out, seq, payload).unwrap();
    out[..n].to_vec()
}

pub fn new_mcu(mem: &mut [u8], now: u32) -> Mcu<'_, FakeBoard> {
    let board = FakeBoard { now, ..FakeBoard::default() };
    Mcu::new(board, McuConfig { clock_freq: 1_000_000 }, mem)
}

/// Deliver bytes, run the task loop until idle and collect every block sent.
pub fn exchange(mcu: &mut Mcu<'_, FakeBoard>, bytes: &[u8]) -> Vec<Response> {
    for &b in bytes {
        mcu.rx_byte(b);
    }
    while mcu.run_tasks() {}
    drain(mcu)
}

/// Collect and decode everything in the transmit buffer.
pub fn drain(mcu: &mut Mcu<'_, FakeBoard>) -> Vec<Response> {
    let mut raw = Vec::new();
    while let Some(b) = mcu.tx_next_byte() {
        raw.push(b);
    }
    raw.split(|&b| b == MESSAGE_SYNC)
        .filter(|seg| !seg.is_empty())
        .map(|seg| {
            let mut body = seg.to_vec();
            let n = cobs::decode_in_place(&mut body).expect("mcu sent bad stuffing");
            body.truncate(n);
            let crc_pos = n - 2;
            let crc = u16::from_be_bytes([body[crc_pos], body[crc_pos + 1]]);
            assert_eq!(crc, crc16_ccitt(&body[..crc_pos]), "mcu sent bad crc");
            Response {
                seq: body[0],
                payload: body[1..crc_pos].to_vec(),
            }
        })
        .collect()
}

/// Move the clock to `to`, firing every timer that falls due on the way.
pub fn advance_to(mcu: &mut Mcu<'_, FakeBoard>, to: u32) {
    loop {
        let wake = mcu.next_waketime();
        if timer_is_before(to, wake) {
            break;
        }
        mcu.board_mut().now = wake;
        mcu.timer_irq();
    }
    mcu.board_mut().now = to;
}

/// Payloads of the responses that are not acks.
pub fn messages(responses: &[Response]) -> Vec<&Response> {
    responses.iter().filter(|r| !r.is(MessageType::Ack)).collect()
}

pub fn count_acks(responses: &[Response]) -> usize {
    responses.iter().filter(|r| r.is(MessageType::Ack)).count()
}
