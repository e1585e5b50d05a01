// src/cmds/debug.rs
// Group deadline timer and echo commands.

use crate::hal::Board;
use crate::mcu::Mcu;
use crate::protocol::{MessageType, ShutdownReason};
use crate::sched::{TimerAction, GROUP_TIMER};

/// Arm the group deadline; `end_group` must arrive before `clock`.
pub(crate) fn start_group<B: Board>(mcu: &mut Mcu<'_, B>, clock: u32) -> Result<(), ShutdownReason> {
    mcu.add_timer(GROUP_TIMER, clock)
}

pub(crate) fn end_group<B: Board>(mcu: &mut Mcu<'_, B>) {
    mcu.sched.delete_timer(GROUP_TIMER);
}

pub(crate) fn group_end_event<B: Board>(_mcu: &mut Mcu<'_, B>) -> Result<TimerAction, ShutdownReason> {
    Err(ShutdownReason::MissedEvent)
}

pub(crate) fn ping<B: Board>(mcu: &mut Mcu<'_, B>, data: &[u8]) {
    mcu.send_with_bytes(MessageType::DebugPing, &[], Some(data));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::McuConfig;
    use crate::hal::testing::MockBoard;

    #[test]
    fn test_group_timer_armed_and_cancelled() {
        let mut mem = [0u8; 64];
        let mut mcu = Mcu::new(MockBoard::new(), McuConfig { clock_freq: 1_000_000 }, &mut mem);
        start_group(&mut mcu, 300).unwrap();
        assert!(mcu.sched.is_pending(GROUP_TIMER));
        end_group(&mut mcu);
        assert!(!mcu.sched.is_pending(GROUP_TIMER));
        assert_eq!(group_end_event(&mut mcu), Err(ShutdownReason::MissedEvent));
    }
}
