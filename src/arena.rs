// src/arena.rs
// Bump allocator over a caller supplied byte region. Allocations are handed
// out as offset/length handles and only released all at once by `reset`.

use core::mem::align_of;

use crate::protocol::ShutdownReason;

const ALIGN: usize = align_of::<usize>();

/// Handle to a region of arena memory.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Chunk {
    pub offset: u32,
    pub len: u32,
}

impl Chunk {
    pub const EMPTY: Chunk = Chunk { offset: 0, len: 0 };

    fn range(&self) -> core::ops::Range<usize> {
        self.offset as usize..(self.offset + self.len) as usize
    }

    /// Sub-chunk `index` of a chunk carved into `stride`-byte slots.
    pub fn slot(&self, stride: u32, index: u32) -> Chunk {
        Chunk {
            offset: self.offset + stride * index,
            len: stride,
        }
    }
}

/// Fixed-size value stored in arena memory as little endian bytes.
pub trait Record: Sized {
    const SIZE: usize;
    fn decode(bytes: &[u8]) -> Self;
    fn encode(&self, bytes: &mut [u8]);
}

pub struct Arena<'m> {
    mem: &'m mut [u8],
    used: usize,
}

impl<'m> Arena<'m> {
    pub fn new(mem: &'m mut [u8]) -> Self {
        Self { mem, used: 0 }
    }

    pub fn capacity(&self) -> usize {
        self.mem.len()
    }

    pub fn used(&self) -> usize {
        self.used
    }

    pub fn remaining(&self) -> usize {
        self.mem.len() - self.used
    }

    /// Allocate `size` zeroed bytes, rounded up to pointer alignment.
    pub fn alloc(&mut self, size: usize) -> Result<Chunk, ShutdownReason> {
        let size = round_up(size);
        if size > self.remaining() {
            return Err(ShutdownReason::ChunkFail);
        }
        let chunk = Chunk {
            offset: self.used as u32,
            len: size as u32,
        };
        self.mem[chunk.range()].fill(0);
        self.used += size;
        Ok(chunk)
    }

    /// Allocate up to `max_count` slots of `size` bytes, as many as fit.
    /// Returns the covering chunk and the number of slots.
    pub fn alloc_chunks(&mut self, size: usize, max_count: usize) -> Result<(Chunk, usize), ShutdownReason> {
        let size = round_up(size);
        if size == 0 {
            return Err(ShutdownReason::ChunksFail);
        }
        let count = (self.remaining() / size).min(max_count);
        if count == 0 {
            return Err(ShutdownReason::ChunksFail);
        }
        let chunk = self.alloc(size * count).map_err(|_| ShutdownReason::ChunksFail)?;
        Ok((chunk, count))
    }

    pub fn reset(&mut self) {
        self.used = 0;
    }

    pub fn bytes(&self, chunk: Chunk) -> &[u8] {
        &self.mem[chunk.range()]
    }

    pub fn bytes_mut(&mut self, chunk: Chunk) -> &mut [u8] {
        &mut self.mem[chunk.range()]
    }

    pub fn read<T: Record>(&self, chunk: Chunk) -> T {
        T::decode(&self.bytes(chunk)[..T::SIZE])
    }

    pub fn write<T: Record>(&mut self, chunk: Chunk, value: &T) {
        value.encode(&mut self.bytes_mut(chunk)[..T::SIZE]);
    }
}

fn round_up(size: usize) -> usize {
    (size + ALIGN - 1) & !(ALIGN - 1)
}

// Little endian field helpers for `Record` impls.

pub(crate) fn get_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

pub(crate) fn get_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

pub(crate) fn put_u16(bytes: &mut [u8], at: usize, v: u16) {
    bytes[at..at + 2].copy_from_slice(&v.to_le_bytes());
}

pub(crate) fn put_u32(bytes: &mut [u8], at: usize, v: u32) {
    bytes[at..at + 4].copy_from_slice(&v.to_le_bytes());
}
