// src/cmds/mod.rs
// Command handlers and the per-object event FIFOs built on the move queue.

pub mod base;
pub mod debug;
pub mod gpio;
pub mod pwm;

use crate::arena::{self, Arena, Record};
use crate::command::Command;
use crate::hal::Board;
use crate::mcu::Mcu;
use crate::move_queue::{MoveQueue, MoveSlot, NO_SLOT};
use crate::protocol::ShutdownReason;

/// Route one decoded command to its handler.
pub(crate) fn execute<B: Board>(mcu: &mut Mcu<'_, B>, cmd: Command<'_>) -> Result<(), ShutdownReason> {
    match cmd {
        Command::Noop | Command::DebugNop => Ok(()),
        Command::Identify { offset, count } => {
            base::identify(mcu, offset, count);
            Ok(())
        }
        Command::AllocateOids { count } => base::allocate_oids(mcu, count),
        Command::GetConfig => {
            base::get_config(mcu);
            Ok(())
        }
        Command::FinalizeConfig { crc } => base::finalize_config(mcu, crc),
        Command::GetClock => {
            base::get_clock(mcu);
            Ok(())
        }
        Command::GetUptime => {
            base::get_uptime(mcu);
            Ok(())
        }
        Command::EmergencyStop => Err(ShutdownReason::CommandRequest),
        Command::ClearShutdown => mcu.shutdown.clear(),
        Command::ConfigReset => base::config_reset(mcu),
        Command::StartGroup { clock } => debug::start_group(mcu, clock),
        Command::EndGroup => {
            debug::end_group(mcu);
            Ok(())
        }
        Command::DebugPing { data } => {
            debug::ping(mcu, data);
            Ok(())
        }
        Command::ConfigDigitalOut { oid, pin, value, default_value, max_duration } => {
            gpio::config_digital_out(mcu, oid, pin, value, default_value, max_duration)
        }
        Command::ScheduleDigitalOut { oid, clock, value } => gpio::schedule_digital_out(mcu, oid, clock, value),
        Command::UpdateDigitalOut { oid, value } => gpio::update_digital_out(mcu, oid, value),
        Command::SetDigitalOut { pin, value } => gpio::set_digital_out(mcu, pin, value),
        Command::ConfigPwmOut { oid, pin, cycle_time, value, default_value, max_duration } => {
            pwm::config_pwm_out(mcu, oid, pin, cycle_time, value, default_value, max_duration)
        }
        Command::SchedulePwmOut { oid, clock, value } => pwm::schedule_pwm_out(mcu, oid, clock, value),
        Command::SetPwmOut { pin, cycle_time, value } => pwm::set_pwm_out(mcu, pin, cycle_time, value),
    }
}

/// A pin update waiting in a move-queue slot.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct QueuedEvent {
    next: MoveSlot,
    pub value: u16,
    pub waketime: u32,
}

impl Record for QueuedEvent {
    const SIZE: usize = 8;

    fn decode(bytes: &[u8]) -> Self {
        QueuedEvent {
            next: arena::get_u16(bytes, 0),
            value: arena::get_u16(bytes, 2),
            waketime: arena::get_u32(bytes, 4),
        }
    }

    fn encode(&self, bytes: &mut [u8]) {
        arena::put_u16(bytes, 0, self.next);
        arena::put_u16(bytes, 2, self.value);
        arena::put_u32(bytes, 4, self.waketime);
    }
}

/// FIFO of queued events, linked through move-queue slots.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct EventQueue {
    head: MoveSlot,
    tail: MoveSlot,
}

impl EventQueue {
    pub const EMPTY: EventQueue = EventQueue { head: NO_SLOT, tail: NO_SLOT };

    pub fn is_empty(&self) -> bool {
        self.head == NO_SLOT
    }

    /// Append an event. Returns true when the queue was empty, meaning the
    /// owner's timer must be armed for it.
    pub fn push(
        &mut self,
        mq: &mut MoveQueue,
        arena: &mut Arena<'_>,
        waketime: u32,
        value: u16,
    ) -> Result<bool, ShutdownReason> {
        let slot = mq.alloc(arena)?;
        arena.write(mq.chunk(slot), &QueuedEvent { next: NO_SLOT, value, waketime });
        if self.is_empty() {
            self.head = slot;
            self.tail = slot;
            return Ok(true);
        }
        let tail_chunk = mq.chunk(self.tail);
        let mut tail: QueuedEvent = arena.read(tail_chunk);
        tail.next = slot;
        arena.write(tail_chunk, &tail);
        self.tail = slot;
        Ok(false)
    }

    /// Remove the oldest event and release its slot.
    pub fn pop(&mut self, mq: &mut MoveQueue, arena: &mut Arena<'_>) -> Option<QueuedEvent> {
        if self.is_empty() {
            return None;
        }
        let slot = self.head;
        let event: QueuedEvent = arena.read(mq.chunk(slot));
        self.head = event.next;
        if self.head == NO_SLOT {
            self.tail = NO_SLOT;
        }
        mq.free(arena, slot);
        Some(event)
    }

    pub fn peek(&self, mq: &MoveQueue, arena: &Arena<'_>) -> Option<QueuedEvent> {
        if self.is_empty() {
            return None;
        }
        Some(arena.read(mq.chunk(self.head)))
    }

    /// Release every queued event.
    pub fn clear(&mut self, mq: &mut MoveQueue, arena: &mut Arena<'_>) {
        while self.pop(mq, arena).is_some() {}
    }
}

pub(crate) fn get_queue(bytes: &[u8], at: usize) -> EventQueue {
    EventQueue {
        head: arena::get_u16(bytes, at),
        tail: arena::get_u16(bytes, at + 2),
    }
}

pub(crate) fn put_queue(bytes: &mut [u8], at: usize, queue: EventQueue) {
    arena::put_u16(bytes, at, queue.head);
    arena::put_u16(bytes, at + 2, queue.tail);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_queue_fifo_order() {
        let mut mem = [0u8; 256];
        let mut arena = Arena::new(&mut mem);
        let mut mq = MoveQueue::new();
        mq.request_size(QueuedEvent::SIZE).unwrap();
        mq.finalize(&mut arena).unwrap();
        let total = mq.free_count(&arena);

        let mut q = EventQueue::EMPTY;
        assert_eq!(q.push(&mut mq, &mut arena, 100, 1), Ok(true));
        assert_eq!(q.push(&mut mq, &mut arena, 200, 0), Ok(false));
        assert_eq!(q.push(&mut mq, &mut arena, 300, 1), Ok(false));
        assert_eq!(mq.free_count(&arena), total - 3);

        assert_eq!(q.peek(&mq, &arena).map(|e| e.waketime), Some(100));
        let times: std::vec::Vec<u32> = core::iter::from_fn(|| q.pop(&mut mq, &mut arena))
            .map(|e| e.waketime)
            .collect();
        assert_eq!(times, [100, 200, 300]);
        assert!(q.is_empty());
        assert_eq!(mq.free_count(&arena), total);
    }

    #[test]
    fn test_event_queue_clear_returns_slots() {
        let mut mem = [0u8; 128];
        let mut arena = Arena::new(&mut mem);
        let mut mq = MoveQueue::new();
        mq.request_size(QueuedEvent::SIZE).unwrap();
        mq.finalize(&mut arena).unwrap();
        let total = mq.free_count(&arena);
        let mut q = EventQueue::EMPTY;
        for t in 0..3 {
            q.push(&mut mq, &mut arena, t, 0).unwrap();
        }
        q.clear(&mut mq, &mut arena);
        assert!(q.is_empty());
        assert_eq!(mq.free_count(&arena), total);
    }
}
