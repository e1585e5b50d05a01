// src/cmds/pwm.rs
// Hardware PWM outputs. Same queueing model as the digital outputs with a
// 16-bit duty value.

use super::{get_queue, put_queue, EventQueue, QueuedEvent};
use crate::arena::{self, Record};
use crate::hal::Board;
use crate::mcu::Mcu;
use crate::oid::{ObjectKind, OidObject};
use crate::protocol::ShutdownReason;
use crate::sched::{TimerAction, TimerEvent, TimerId};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct PwmOut {
    pin: u32,
    cycle_time: u32,
    max_duration: u32,
    value: u16,
    default_value: u16,
    queue: EventQueue,
    timer: TimerId,
}

impl Record for PwmOut {
    const SIZE: usize = 24;

    fn decode(bytes: &[u8]) -> Self {
        PwmOut {
            pin: arena::get_u32(bytes, 0),
            cycle_time: arena::get_u32(bytes, 4),
            max_duration: arena::get_u32(bytes, 8),
            value: arena::get_u16(bytes, 12),
            default_value: arena::get_u16(bytes, 14),
            queue: get_queue(bytes, 16),
            timer: bytes[20],
        }
    }

    fn encode(&self, bytes: &mut [u8]) {
        arena::put_u32(bytes, 0, self.pin);
        arena::put_u32(bytes, 4, self.cycle_time);
        arena::put_u32(bytes, 8, self.max_duration);
        arena::put_u16(bytes, 12, self.value);
        arena::put_u16(bytes, 14, self.default_value);
        put_queue(bytes, 16, self.queue);
        bytes[20] = self.timer;
        bytes[21..24].fill(0);
    }
}

impl OidObject for PwmOut {
    const KIND: ObjectKind = ObjectKind::PwmOut;
}

pub(crate) fn config_pwm_out<B: Board>(
    mcu: &mut Mcu<'_, B>,
    oid: u8,
    pin: u32,
    cycle_time: u32,
    value: u16,
    default_value: u16,
    max_duration: u32,
) -> Result<(), ShutdownReason> {
    mcu.board
        .pwm_setup(pin, cycle_time, value)
        .map_err(|e| e.into_pwm_reason())?;
    let chunk = mcu.oids.assign::<PwmOut>(&mut mcu.arena, oid)?;
    let timer = mcu.sched.alloc_timer(TimerEvent::PwmOut(oid))?;
    mcu.arena.write(
        chunk,
        &PwmOut {
            pin,
            cycle_time,
            max_duration,
            value,
            default_value,
            queue: EventQueue::EMPTY,
            timer,
        },
    );
    mcu.move_queue.request_size(QueuedEvent::SIZE)
}

pub(crate) fn schedule_pwm_out<B: Board>(
    mcu: &mut Mcu<'_, B>,
    oid: u8,
    clock: u32,
    value: u16,
) -> Result<(), ShutdownReason> {
    let chunk = mcu.oids.lookup::<PwmOut>(&mcu.arena, oid)?;
    let mut p: PwmOut = mcu.arena.read(chunk);
    let was_empty = p.queue.push(&mut mcu.move_queue, &mut mcu.arena, clock, value)?;
    mcu.arena.write(chunk, &p);
    if was_empty {
        mcu.add_timer(p.timer, clock)?;
    }
    Ok(())
}

pub(crate) fn pwm_out_event<B: Board>(
    mcu: &mut Mcu<'_, B>,
    id: TimerId,
    oid: u8,
) -> Result<TimerAction, ShutdownReason> {
    let chunk = mcu.oids.lookup::<PwmOut>(&mcu.arena, oid)?;
    let mut p: PwmOut = mcu.arena.read(chunk);
    debug_assert_eq!(p.timer, id);
    let event = p
        .queue
        .pop(&mut mcu.move_queue, &mut mcu.arena)
        .ok_or(ShutdownReason::MissedPwmEvent)?;
    p.value = event.value;
    mcu.board.pwm_write(p.pin, p.value);
    let action = match p.queue.peek(&mcu.move_queue, &mcu.arena) {
        Some(next) => TimerAction::Reschedule(next.waketime),
        None if p.value != p.default_value && p.max_duration != 0 => {
            TimerAction::Reschedule(event.waketime.wrapping_add(p.max_duration))
        }
        None => TimerAction::Done,
    };
    mcu.arena.write(chunk, &p);
    Ok(action)
}

pub(crate) fn set_pwm_out<B: Board>(
    mcu: &mut Mcu<'_, B>,
    pin: u32,
    cycle_time: u32,
    value: u16,
) -> Result<(), ShutdownReason> {
    mcu.board
        .pwm_setup(pin, cycle_time, value)
        .map_err(|e| e.into_pwm_reason())
}

pub(crate) fn pwm_out_shutdown<B: Board>(mcu: &mut Mcu<'_, B>) {
    let mut cursor = None;
    while let Some((oid, chunk)) = mcu.oids.next_of_kind(&mcu.arena, ObjectKind::PwmOut, cursor) {
        cursor = Some(oid);
        let mut p: PwmOut = mcu.arena.read(chunk);
        p.queue = EventQueue::EMPTY;
        p.value = p.default_value;
        mcu.arena.write(chunk, &p);
        mcu.board.pwm_write(p.pin, p.default_value);
    }
}
