// src/sched.rs
// Timer list and task wake state. The list lives in a fixed slab of timers
// linked by index, sorted ascending by wake time, and always ends with the
// periodic and sentinel timers.

use heapless::Vec;

use crate::config::{
    McuConfig, MAX_TIMERS, PERIODIC_INTERVAL_US, TIMER_DEFER_REPEAT_US, TIMER_IDLE_REPEAT_US,
    TIMER_REPEAT_US, TIMER_RESCHED_LIMIT_US,
};
use crate::protocol::ShutdownReason;
use crate::utils::timer_is_before;

pub type TimerId = u8;

pub const PERIODIC_TIMER: TimerId = 0;
pub const SENTINEL_TIMER: TimerId = 1;
/// Stands in for a deleted list head until the dispatcher moves past it.
pub const TOMBSTONE_TIMER: TimerId = 2;
pub const GROUP_TIMER: TimerId = 3;
const BUILTIN_TIMERS: usize = 4;
const NO_TIMER: TimerId = TimerId::MAX;

/// What to run when a timer fires.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerEvent {
    Periodic,
    Sentinel,
    Tombstone,
    /// Debug group deadline.
    Group,
    DigitalOut(u8),
    PwmOut(u8),
}

/// Returned by a timer handler.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerAction {
    Done,
    /// Run again at the given wake time.
    Reschedule(u32),
}

#[derive(Copy, Clone, Debug)]
struct Timer {
    waketime: u32,
    event: TimerEvent,
    next: TimerId,
    linked: bool,
}

impl Timer {
    const fn new(event: TimerEvent) -> Self {
        Self {
            waketime: 0,
            event,
            next: NO_TIMER,
            linked: false,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TaskStatus {
    Idle,
    Requested,
    Running,
}

pub struct SchedulerState {
    timers: Vec<Timer, MAX_TIMERS>,
    head: TimerId,
    tasks: TaskStatus,
    repeat_until: u32,
    periodic_ticks: u32,
    idle_repeat_ticks: u32,
    repeat_ticks: u32,
    defer_ticks: u32,
    resched_limit_ticks: u32,
}

impl SchedulerState {
    /// Build the timer list with the periodic timer due at `now`.
    pub fn new(config: &McuConfig, now: u32) -> Self {
        let mut timers = Vec::new();
        for event in [TimerEvent::Periodic, TimerEvent::Sentinel, TimerEvent::Tombstone, TimerEvent::Group] {
            // Capacity is far above the builtin count.
            let _ = timers.push(Timer::new(event));
        }
        let mut sched = Self {
            timers,
            head: PERIODIC_TIMER,
            tasks: TaskStatus::Idle,
            repeat_until: now,
            periodic_ticks: config.ticks_from_us(PERIODIC_INTERVAL_US),
            idle_repeat_ticks: config.ticks_from_us(TIMER_IDLE_REPEAT_US),
            repeat_ticks: config.ticks_from_us(TIMER_REPEAT_US),
            defer_ticks: config.ticks_from_us(TIMER_DEFER_REPEAT_US),
            resched_limit_ticks: config.ticks_from_us(TIMER_RESCHED_LIMIT_US),
        };
        sched.timers[PERIODIC_TIMER as usize].waketime = now;
        sched.timers[SENTINEL_TIMER as usize].waketime = now.wrapping_add(0x8000_0000);
        sched.reset();
        sched
    }

    /// Reserve a timer slot for `event`.
    pub fn alloc_timer(&mut self, event: TimerEvent) -> Result<TimerId, ShutdownReason> {
        let id = self.timers.len() as TimerId;
        self.timers.push(Timer::new(event)).map_err(|_| ShutdownReason::ChunkFail)?;
        Ok(id)
    }

    /// Release every timer slot handed out by `alloc_timer`. Call `reset`
    /// first so that none of them is still linked.
    pub fn free_timers(&mut self) {
        self.timers.truncate(BUILTIN_TIMERS);
    }

    pub fn is_pending(&self, id: TimerId) -> bool {
        self.timer(id).is_some_and(|t| t.linked)
    }

    pub fn waketime(&self, id: TimerId) -> u32 {
        self.timers[id as usize].waketime
    }

    /// Wake time of the list head; the hardware timer should fire then.
    pub fn next_waketime(&self) -> u32 {
        self.timers[self.head as usize].waketime
    }

    /// Insert timer `id` to fire at `waketime`. Returns true when it became
    /// the new head and the hardware timer must be re-armed. A new head that
    /// is not in the future means dispatch could never keep up.
    pub fn add_timer(&mut self, id: TimerId, waketime: u32, now: u32) -> Result<bool, ShutdownReason> {
        if self.is_pending(id) {
            self.delete_timer(id);
        }
        let head = self.head;
        if timer_is_before(waketime, self.timers[head as usize].waketime) {
            if !timer_is_before(now, waketime) {
                return Err(ShutdownReason::CloseTimer);
            }
            let next = if head == TOMBSTONE_TIMER {
                self.timers[TOMBSTONE_TIMER as usize].linked = false;
                self.timers[TOMBSTONE_TIMER as usize].next
            } else {
                head
            };
            let t = &mut self.timers[id as usize];
            t.waketime = waketime;
            t.next = next;
            t.linked = true;
            self.head = id;
            return Ok(true);
        }
        self.insert_after(head, id, waketime);
        Ok(false)
    }

    /// Unlink timer `id` if it is pending. A deleted head is replaced by the
    /// tombstone so the dispatcher keeps a valid head.
    pub fn delete_timer(&mut self, id: TimerId) {
        if !self.is_pending(id) {
            return;
        }
        let (waketime, next) = {
            let t = &mut self.timers[id as usize];
            t.linked = false;
            (t.waketime, t.next)
        };
        if self.head == id {
            let tomb = &mut self.timers[TOMBSTONE_TIMER as usize];
            tomb.waketime = waketime;
            tomb.next = next;
            tomb.linked = true;
            self.head = TOMBSTONE_TIMER;
            return;
        }
        let mut pos = self.head;
        while pos != NO_TIMER {
            if self.timers[pos as usize].next == id {
                self.timers[pos as usize].next = next;
                return;
            }
            pos = self.timers[pos as usize].next;
        }
    }

    /// The timer due next: its id and event.
    pub fn head(&self) -> (TimerId, TimerEvent) {
        let id = self.head;
        (id, self.timers[id as usize].event)
    }

    /// Retire or reinsert the head timer after its handler ran. Returns the
    /// wake time of the new head.
    pub fn finish(&mut self, action: TimerAction) -> u32 {
        let id = self.head;
        let next = self.timers[id as usize].next;
        match action {
            TimerAction::Done => {
                self.timers[id as usize].linked = false;
                self.head = next;
            }
            TimerAction::Reschedule(waketime) => {
                self.timers[id as usize].waketime = waketime;
                if timer_is_before(waketime, self.timers[next as usize].waketime) {
                    return waketime;
                }
                self.head = next;
                self.insert_after(next, id, waketime);
            }
        }
        self.next_waketime()
    }

    /// Handler of the periodic timer: wake the task loop and move both
    /// sentinels forward.
    pub fn periodic_event(&mut self) -> TimerAction {
        self.wake_tasks();
        let waketime = self.timers[PERIODIC_TIMER as usize].waketime.wrapping_add(self.periodic_ticks);
        self.timers[SENTINEL_TIMER as usize].waketime = waketime.wrapping_add(0x8000_0000);
        TimerAction::Reschedule(waketime)
    }

    /// Decide what to do after a dispatch step whose next head is due at
    /// `next`. Returns the time to program the hardware timer for, or None to
    /// keep dispatching. Repeated back-to-back timers are cut short when tasks
    /// are waiting.
    pub fn check_repeat(&mut self, next: u32, now: u32) -> Result<Option<u32>, ShutdownReason> {
        let diff = next.wrapping_sub(now) as i32;
        if diff > 0 {
            return Ok(Some(next));
        }
        if timer_is_before(self.repeat_until, now) {
            if diff < -(self.resched_limit_ticks as i32) {
                return Err(ShutdownReason::TimerReschedPast);
            }
            if self.tasks_busy() {
                self.repeat_until = now.wrapping_add(self.repeat_ticks);
                return Ok(Some(now.wrapping_add(self.defer_ticks)));
            }
            self.repeat_until = now.wrapping_add(self.idle_repeat_ticks);
        }
        Ok(None)
    }

    /// Drop every timer except the periodic and sentinel ones.
    pub fn reset(&mut self) {
        for t in self.timers.iter_mut() {
            t.linked = false;
        }
        let periodic_wake = self.timers[PERIODIC_TIMER as usize].waketime;
        {
            let tomb = &mut self.timers[TOMBSTONE_TIMER as usize];
            tomb.waketime = periodic_wake;
            tomb.next = PERIODIC_TIMER;
            tomb.linked = true;
        }
        {
            let periodic = &mut self.timers[PERIODIC_TIMER as usize];
            periodic.next = SENTINEL_TIMER;
            periodic.linked = true;
        }
        {
            let sentinel = &mut self.timers[SENTINEL_TIMER as usize];
            sentinel.next = NO_TIMER;
            sentinel.linked = true;
        }
        self.head = TOMBSTONE_TIMER;
    }

    pub fn wake_tasks(&mut self) {
        self.tasks = TaskStatus::Requested;
    }

    pub fn tasks_busy(&self) -> bool {
        self.tasks != TaskStatus::Idle
    }

    pub fn tasks_requested(&self) -> bool {
        self.tasks == TaskStatus::Requested
    }

    /// Enter a task round if one was requested.
    pub fn begin_tasks(&mut self) -> bool {
        if self.tasks != TaskStatus::Requested {
            return false;
        }
        self.tasks = TaskStatus::Running;
        true
    }

    /// Leave a task round; a wake that arrived meanwhile stays requested.
    pub fn end_tasks(&mut self) {
        if self.tasks == TaskStatus::Running {
            self.tasks = TaskStatus::Idle;
        }
    }

    fn timer(&self, id: TimerId) -> Option<&Timer> {
        self.timers.get(id as usize)
    }

    /// Link `id` into the list somewhere after `pos`. The scan stops at the
    /// sentinel, which stays last.
    fn insert_after(&mut self, mut pos: TimerId, id: TimerId, waketime: u32) {
        loop {
            let prev = pos;
            pos = self.timers[prev as usize].next;
            if pos == NO_TIMER
                || pos == SENTINEL_TIMER
                || timer_is_before(waketime, self.timers[pos as usize].waketime)
            {
                let t = &mut self.timers[id as usize];
                t.waketime = waketime;
                t.next = pos;
                t.linked = true;
                self.timers[prev as usize].next = id;
                return;
            }
        }
    }
}
