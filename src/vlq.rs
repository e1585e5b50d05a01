// src/vlq.rs
// Variable length quantity integer packing plus the argument cursors command
// handlers use to read requests and write responses.

use crate::protocol::ShutdownReason;

/// Longest encoding of a 32-bit value.
pub const VLQ_MAX_LEN: usize = 5;

/// Number of bytes `encode` will use for `v`.
pub fn encoded_len(v: u32) -> usize {
    let sv = v as i32;
    if (-(1 << 5)..(3 << 5)).contains(&sv) {
        1
    } else if (-(1 << 12)..(3 << 12)).contains(&sv) {
        2
    } else if (-(1 << 19)..(3 << 19)).contains(&sv) {
        3
    } else if (-(1 << 26)..(3 << 26)).contains(&sv) {
        4
    } else {
        5
    }
}

/// Encode `v` into the front of `out`, returning the number of bytes written.
/// `out` must hold at least `encoded_len(v)` bytes.
pub fn encode(v: u32, out: &mut [u8]) -> Option<usize> {
    let len = encoded_len(v);
    let dst = out.get_mut(..len)?;
    for (i, byte) in dst.iter_mut().enumerate() {
        let shift = 7 * (len - 1 - i);
        let bits = (v >> shift) as u8 & 0x7f;
        *byte = if i + 1 == len { bits } else { bits | 0x80 };
    }
    Some(len)
}

/// Decode one value from the front of `buf`: `(value, bytes consumed)`.
pub fn decode(buf: &[u8]) -> Option<(u32, usize)> {
    let mut iter = buf.iter();
    let mut c = *iter.next()?;
    let mut v = (c & 0x7f) as u32;
    if c & 0x60 == 0x60 {
        v |= (-0x20i32) as u32;
    }
    let mut used = 1;
    while c & 0x80 != 0 {
        c = *iter.next()?;
        v = (v << 7) | (c & 0x7f) as u32;
        used += 1;
    }
    Some((v, used))
}

/// Cursor over a decoded command payload.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    /// Skip whatever is left of the payload.
    pub fn skip_rest(&mut self) {
        self.pos = self.buf.len();
    }

    pub fn read_byte(&mut self) -> Result<u8, ShutdownReason> {
        let b = *self.buf.get(self.pos).ok_or(ShutdownReason::CommandParse)?;
        self.pos += 1;
        Ok(b)
    }

    pub fn read_u32(&mut self) -> Result<u32, ShutdownReason> {
        let (v, used) = decode(&self.buf[self.pos..]).ok_or(ShutdownReason::CommandParse)?;
        self.pos += used;
        Ok(v)
    }

    pub fn read_u16(&mut self) -> Result<u16, ShutdownReason> {
        self.read_u32().map(|v| v as u16)
    }

    pub fn read_u8(&mut self) -> Result<u8, ShutdownReason> {
        self.read_u32().map(|v| v as u8)
    }

    /// Byte buffer argument: a VLQ length followed by that many raw bytes.
    pub fn read_bytes(&mut self) -> Result<&'a [u8], ShutdownReason> {
        let len = self.read_u32()? as usize;
        let end = self.pos.checked_add(len).ok_or(ShutdownReason::CommandParse)?;
        let data = self.buf.get(self.pos..end).ok_or(ShutdownReason::CommandParse)?;
        self.pos = end;
        Ok(data)
    }
}

/// Cursor used to build a response payload.
#[derive(Debug)]
pub struct Writer<'a> {
    buf: &'a mut [u8],
    len: usize,
}

impl<'a> Writer<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, len: 0 }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub fn put_byte(&mut self, b: u8) -> Result<(), ShutdownReason> {
        let slot = self.buf.get_mut(self.len).ok_or(ShutdownReason::MessageEncode)?;
        *slot = b;
        self.len += 1;
        Ok(())
    }

    pub fn put_u32(&mut self, v: u32) -> Result<(), ShutdownReason> {
        let used = encode(v, &mut self.buf[self.len..]).ok_or(ShutdownReason::MessageEncode)?;
        self.len += used;
        Ok(())
    }

    pub fn put_bytes(&mut self, data: &[u8]) -> Result<(), ShutdownReason> {
        self.put_u32(data.len() as u32)?;
        let dst = self
            .buf
            .get_mut(self.len..self.len + data.len())
            .ok_or(ShutdownReason::MessageEncode)?;
        dst.copy_from_slice(data);
        self.len += data.len();
        Ok(())
    }
}
