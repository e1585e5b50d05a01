// src/move_queue.rs
// Pool of equal sized records carved from the arena when the configuration is
// finalized. Free slots are chained through their first two bytes so that the
// real-time paths can allocate and release without touching the arena.

use crate::arena::{self, Arena, Chunk};
use crate::config::MOVE_QUEUE_MAX_ITEMS;
use crate::protocol::ShutdownReason;

/// Index of a slot in the move queue.
pub type MoveSlot = u16;

/// Terminates the free chain and empty FIFOs built from slots.
pub const NO_SLOT: MoveSlot = MoveSlot::MAX;

const LINK_SIZE: usize = 2;

#[derive(Debug)]
pub struct MoveQueue {
    item_size: usize,
    slots: Option<Chunk>,
    stride: u32,
    count: u16,
    free_head: MoveSlot,
}

impl Default for MoveQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MoveQueue {
    pub const fn new() -> Self {
        Self {
            item_size: 0,
            slots: None,
            stride: 0,
            count: 0,
            free_head: NO_SLOT,
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.slots.is_some()
    }

    /// Number of slots carved at finalize time.
    pub fn count(&self) -> u16 {
        self.count
    }

    pub fn item_size(&self) -> usize {
        self.item_size
    }

    /// Grow the slot size to fit a record of `size` bytes. Only valid before
    /// the queue is finalized.
    pub fn request_size(&mut self, size: usize) -> Result<(), ShutdownReason> {
        if self.is_finalized() || size > u16::MAX as usize {
            return Err(ShutdownReason::InvalidMoveSize);
        }
        self.item_size = self.item_size.max(size);
        Ok(())
    }

    /// Carve as many slots as the remaining arena allows (up to the ceiling)
    /// and put them all on the free list.
    pub fn finalize(&mut self, arena: &mut Arena<'_>) -> Result<(), ShutdownReason> {
        if self.is_finalized() {
            return Err(ShutdownReason::AlreadyFinal);
        }
        self.request_size(LINK_SIZE)?;
        let (chunk, count) = arena.alloc_chunks(self.item_size, MOVE_QUEUE_MAX_ITEMS)?;
        self.stride = chunk.len / count as u32;
        self.count = count as u16;
        self.slots = Some(chunk);
        self.reset(arena);
        log::debug!("move queue finalized: {} slots of {} bytes", self.count, self.stride);
        Ok(())
    }

    /// Return every slot to the free list.
    pub fn reset(&mut self, arena: &mut Arena<'_>) {
        if self.count == 0 {
            self.free_head = NO_SLOT;
            return;
        }
        for i in 0..self.count {
            let next = if i + 1 == self.count { NO_SLOT } else { i + 1 };
            self.set_link(arena, i, next);
        }
        self.free_head = 0;
    }

    pub fn alloc(&mut self, arena: &mut Arena<'_>) -> Result<MoveSlot, ShutdownReason> {
        if self.free_head == NO_SLOT {
            return Err(ShutdownReason::MoveQueueEmpty);
        }
        let slot = self.free_head;
        self.free_head = self.link(arena, slot);
        Ok(slot)
    }

    pub fn free(&mut self, arena: &mut Arena<'_>, slot: MoveSlot) {
        self.set_link(arena, slot, self.free_head);
        self.free_head = slot;
    }

    /// Storage of an allocated slot.
    pub fn chunk(&self, slot: MoveSlot) -> Chunk {
        match self.slots {
            Some(slots) if slot < self.count => slots.slot(self.stride, slot as u32),
            _ => Chunk::EMPTY,
        }
    }

    /// Number of slots currently on the free list.
    pub fn free_count(&self, arena: &Arena<'_>) -> usize {
        let mut n = 0;
        let mut cur = self.free_head;
        while cur != NO_SLOT {
            n += 1;
            cur = self.link(arena, cur);
        }
        n
    }

    /// Drop the configuration; used by a full config reset.
    pub fn clear(&mut self) {
        *self = Self::new();
    }

    fn link(&self, arena: &Arena<'_>, slot: MoveSlot) -> MoveSlot {
        arena::get_u16(arena.bytes(self.chunk(slot)), 0)
    }

    fn set_link(&self, arena: &mut Arena<'_>, slot: MoveSlot, next: MoveSlot) {
        arena::put_u16(arena.bytes_mut(self.chunk(slot)), 0, next);
    }
}
