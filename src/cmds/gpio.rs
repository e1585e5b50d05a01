// src/cmds/gpio.rs
// Digital output pins with a queue of timed updates and an optional
// max_duration watchdog.

use super::{get_queue, put_queue, EventQueue};
use crate::arena::{self, Record};
use crate::hal::Board;
use crate::mcu::Mcu;
use crate::oid::{ObjectKind, OidObject};
use crate::protocol::ShutdownReason;
use crate::sched::{TimerAction, TimerEvent, TimerId};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct DigitalOut {
    pin: u32,
    max_duration: u32,
    queue: EventQueue,
    timer: TimerId,
    value: u8,
    default_value: u8,
}

impl Record for DigitalOut {
    const SIZE: usize = 16;

    fn decode(bytes: &[u8]) -> Self {
        DigitalOut {
            pin: arena::get_u32(bytes, 0),
            max_duration: arena::get_u32(bytes, 4),
            queue: get_queue(bytes, 8),
            timer: bytes[12],
            value: bytes[13],
            default_value: bytes[14],
        }
    }

    fn encode(&self, bytes: &mut [u8]) {
        arena::put_u32(bytes, 0, self.pin);
        arena::put_u32(bytes, 4, self.max_duration);
        put_queue(bytes, 8, self.queue);
        bytes[12] = self.timer;
        bytes[13] = self.value;
        bytes[14] = self.default_value;
        bytes[15] = 0;
    }
}

impl OidObject for DigitalOut {
    const KIND: ObjectKind = ObjectKind::DigitalOut;
}

impl DigitalOut {
    /// Timer action once the queue is drained: a watchdog while the pin is
    /// away from its default.
    fn idle_action(&self, from: u32) -> TimerAction {
        if self.value != self.default_value && self.max_duration != 0 {
            TimerAction::Reschedule(from.wrapping_add(self.max_duration))
        } else {
            TimerAction::Done
        }
    }
}

pub(crate) fn config_digital_out<B: Board>(
    mcu: &mut Mcu<'_, B>,
    oid: u8,
    pin: u32,
    value: u8,
    default_value: u8,
    max_duration: u32,
) -> Result<(), ShutdownReason> {
    mcu.board
        .gpio_out_setup(pin, value != 0)
        .map_err(|e| e.into_gpio_reason())?;
    let chunk = mcu.oids.assign::<DigitalOut>(&mut mcu.arena, oid)?;
    let timer = mcu.sched.alloc_timer(TimerEvent::DigitalOut(oid))?;
    let d = DigitalOut {
        pin,
        max_duration,
        queue: EventQueue::EMPTY,
        timer,
        value,
        default_value,
    };
    mcu.arena.write(chunk, &d);
    mcu.move_queue.request_size(super::QueuedEvent::SIZE)
}

pub(crate) fn schedule_digital_out<B: Board>(
    mcu: &mut Mcu<'_, B>,
    oid: u8,
    clock: u32,
    value: u8,
) -> Result<(), ShutdownReason> {
    let chunk = mcu.oids.lookup::<DigitalOut>(&mcu.arena, oid)?;
    let mut d: DigitalOut = mcu.arena.read(chunk);
    let was_empty = d.queue.push(&mut mcu.move_queue, &mut mcu.arena, clock, value as u16)?;
    mcu.arena.write(chunk, &d);
    if was_empty {
        mcu.add_timer(d.timer, clock)?;
    }
    Ok(())
}

/// Timer handler: apply the oldest queued value.
pub(crate) fn digital_out_event<B: Board>(
    mcu: &mut Mcu<'_, B>,
    id: TimerId,
    oid: u8,
) -> Result<TimerAction, ShutdownReason> {
    let chunk = mcu.oids.lookup::<DigitalOut>(&mcu.arena, oid)?;
    let mut d: DigitalOut = mcu.arena.read(chunk);
    debug_assert_eq!(d.timer, id);
    // An empty queue means the watchdog expired.
    let event = d
        .queue
        .pop(&mut mcu.move_queue, &mut mcu.arena)
        .ok_or(ShutdownReason::MissedPinEvent)?;
    d.value = event.value as u8;
    mcu.board.gpio_out_write(d.pin, d.value != 0);
    let action = match d.queue.peek(&mcu.move_queue, &mcu.arena) {
        Some(next) => TimerAction::Reschedule(next.waketime),
        None => d.idle_action(event.waketime),
    };
    mcu.arena.write(chunk, &d);
    Ok(action)
}

/// Drop pending updates and write `value` now.
pub(crate) fn update_digital_out<B: Board>(mcu: &mut Mcu<'_, B>, oid: u8, value: u8) -> Result<(), ShutdownReason> {
    let chunk = mcu.oids.lookup::<DigitalOut>(&mcu.arena, oid)?;
    let mut d: DigitalOut = mcu.arena.read(chunk);
    d.queue.clear(&mut mcu.move_queue, &mut mcu.arena);
    mcu.sched.delete_timer(d.timer);
    d.value = value;
    mcu.board.gpio_out_write(d.pin, value != 0);
    mcu.arena.write(chunk, &d);
    if let TimerAction::Reschedule(waketime) = d.idle_action(mcu.board.read_time()) {
        mcu.add_timer(d.timer, waketime)?;
    }
    Ok(())
}

pub(crate) fn set_digital_out<B: Board>(mcu: &mut Mcu<'_, B>, pin: u32, value: u8) -> Result<(), ShutdownReason> {
    mcu.board
        .gpio_out_setup(pin, value != 0)
        .map_err(|e| e.into_gpio_reason())
}

/// Teardown: every output back to its default. The move queue has already
/// been reset so queued slots are simply forgotten.
pub(crate) fn digital_out_shutdown<B: Board>(mcu: &mut Mcu<'_, B>) {
    let mut cursor = None;
    while let Some((oid, chunk)) = mcu.oids.next_of_kind(&mcu.arena, ObjectKind::DigitalOut, cursor) {
        cursor = Some(oid);
        let mut d: DigitalOut = mcu.arena.read(chunk);
        d.queue = EventQueue::EMPTY;
        d.value = d.default_value;
        mcu.arena.write(chunk, &d);
        mcu.board.gpio_out_write(d.pin, d.default_value != 0);
    }
}
