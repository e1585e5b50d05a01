// src/mcu.rs
// Owned MCU state and its entry points. A board driver calls `rx_byte`,
// `tx_next_byte` and `timer_irq` from its interrupt (or poll) context and
// `run_tasks` from the main loop.

use crate::arena::Arena;
use crate::cmds::{self, base::Stats, debug, gpio, pwm};
use crate::command::{Command, CommandFlags, Decoded};
use crate::config::{McuConfig, MESSAGE_MAX, MESSAGE_PAYLOAD_MAX};
use crate::hal::Board;
use crate::move_queue::MoveQueue;
use crate::oid::OidTable;
use crate::protocol::{MessageType, ShutdownReason};
use crate::sched::{SchedulerState, TimerAction, TimerEvent, TimerId};
use crate::serial::{FrameOutcome, Framer, RxBuffer, TxBuffer};
use crate::shutdown::{ShutdownControl, ShutdownStatus};
use crate::vlq::{Reader, Writer};

pub struct Mcu<'m, B: Board> {
    pub(crate) board: B,
    pub(crate) config: McuConfig,
    pub(crate) arena: Arena<'m>,
    pub(crate) oids: OidTable,
    pub(crate) move_queue: MoveQueue,
    pub(crate) sched: SchedulerState,
    pub(crate) shutdown: ShutdownControl,
    pub(crate) stats: Stats,
    pub(crate) config_crc: u32,
    framer: Framer,
    rx: RxBuffer,
    tx: TxBuffer,
}

impl<'m, B: Board> Mcu<'m, B> {
    /// Boot: the periodic timer is due immediately and a `start` message is
    /// queued for the host.
    pub fn new(board: B, config: McuConfig, memory: &'m mut [u8]) -> Self {
        let now = board.read_time();
        let mut mcu = Self {
            board,
            config,
            arena: Arena::new(memory),
            oids: OidTable::new(),
            move_queue: MoveQueue::new(),
            sched: SchedulerState::new(&config, now),
            shutdown: ShutdownControl::new(),
            stats: Stats::new(now),
            config_crc: 0,
            framer: Framer::new(),
            rx: RxBuffer::new(),
            tx: TxBuffer::new(),
        };
        log::info!(
            "mcu starting: clock {} Hz, arena {} bytes",
            config.clock_freq,
            mcu.arena.capacity()
        );
        mcu.send(MessageType::Start, &[]);
        mcu
    }

    pub fn board(&self) -> &B {
        &self.board
    }

    pub fn board_mut(&mut self) -> &mut B {
        &mut self.board
    }

    pub fn config(&self) -> &McuConfig {
        &self.config
    }

    pub fn shutdown_status(&self) -> ShutdownStatus {
        self.shutdown.status()
    }

    pub fn shutdown_reason(&self) -> ShutdownReason {
        self.shutdown.reason()
    }

    /// Wake time the hardware timer should be armed for.
    pub fn next_waketime(&self) -> u32 {
        self.sched.next_waketime()
    }

    /// The task loop has work; the caller must not idle.
    pub fn tasks_pending(&self) -> bool {
        self.sched.tasks_requested() || self.shutdown.has_pending()
    }

    /*
     * Interrupt context
     */

    /// A byte arrived on the serial line.
    pub fn rx_byte(&mut self, byte: u8) {
        if self.rx.push(byte) {
            self.sched.wake_tasks();
        }
    }

    /// Next byte to put on the serial line.
    pub fn tx_next_byte(&mut self) -> Option<u8> {
        self.tx.next_byte()
    }

    /// Run every due timer. Returns the time the hardware timer should fire
    /// next.
    pub fn timer_irq(&mut self) -> u32 {
        loop {
            let (id, event) = self.sched.head();
            let action = match self.run_timer(id, event) {
                Ok(action) => action,
                Err(reason) => {
                    self.timer_fault(reason);
                    return self.sched.next_waketime();
                }
            };
            let next = self.sched.finish(action);
            let now = self.board.read_time();
            match self.sched.check_repeat(next, now) {
                Ok(Some(waketime)) => return waketime,
                Ok(None) => {}
                Err(reason) => {
                    if self.shutdown.try_shutdown(reason).is_err() {
                        self.timer_fault(reason);
                        return self.sched.next_waketime();
                    }
                }
            }
        }
    }

    fn run_timer(&mut self, id: TimerId, event: TimerEvent) -> Result<TimerAction, ShutdownReason> {
        match event {
            TimerEvent::Periodic => Ok(self.sched.periodic_event()),
            TimerEvent::Sentinel => Err(ShutdownReason::SentinelTimer),
            TimerEvent::Tombstone => Ok(TimerAction::Done),
            TimerEvent::Group => debug::group_end_event(self),
            TimerEvent::DigitalOut(oid) => gpio::digital_out_event(self, id, oid),
            TimerEvent::PwmOut(oid) => pwm::pwm_out_event(self, id, oid),
        }
    }

    /// Park a fault raised in interrupt context; the task loop runs the
    /// shutdown sequence. Timers stop immediately.
    fn timer_fault(&mut self, reason: ShutdownReason) {
        self.shutdown.raise(reason);
        self.sched.reset();
        self.sched.wake_tasks();
    }

    /*
     * Task context
     */

    /// Run one round of tasks if any were requested. Returns false when the
    /// caller may idle until the next interrupt.
    pub fn run_tasks(&mut self) -> bool {
        if let Some(reason) = self.shutdown.take_pending() {
            self.run_shutdown(reason);
        }
        if !self.sched.begin_tasks() {
            return false;
        }
        let start = self.board.read_time();
        if let Err(reason) = self.console_task() {
            self.run_shutdown(reason);
            if !self.rx.is_empty() {
                self.sched.wake_tasks();
            }
        }
        let cur = self.board.read_time();
        cmds::base::stats_update(self, start, cur);
        self.sched.end_tasks();
        true
    }

    /// Process every complete block in the receive buffer.
    fn console_task(&mut self) -> Result<(), ShutdownReason> {
        loop {
            match self.framer.find_block(self.rx.data_mut()) {
                FrameOutcome::NeedMoreData => return Ok(()),
                FrameOutcome::Discard { pop, nack } => {
                    self.rx.pop(pop);
                    if nack {
                        log::debug!("nack, expecting seq {:#04x}", self.framer.next_sequence());
                        self.send_raw(&[MessageType::Nack.code()]);
                    }
                }
                FrameOutcome::Accept { pop, payload } => {
                    let mut block = [0u8; MESSAGE_MAX];
                    let len = payload.len();
                    block[..len].copy_from_slice(&self.rx.data_mut()[payload]);
                    self.rx.pop(pop);
                    let res = self.dispatch_block(&block[..len]);
                    self.send_raw(&[MessageType::Ack.code()]);
                    res?;
                }
            }
        }
    }

    fn dispatch_block(&mut self, payload: &[u8]) -> Result<(), ShutdownReason> {
        let mut reader = Reader::new(payload);
        while !reader.is_empty() {
            let cmd = match Command::parse(&mut reader)? {
                Decoded::Command(cmd) => cmd,
                Decoded::Invalid(byte) => {
                    log::warn!("invalid command byte {}", byte);
                    self.send(MessageType::Unknown, &[byte as u32]);
                    reader.skip_rest();
                    continue;
                }
            };
            if self.shutdown.is_shutdown() && !cmd.flags().contains(CommandFlags::IN_SHUTDOWN) {
                self.send(MessageType::ShutdownLast, &[self.shutdown.reason().code() as u32]);
                continue;
            }
            cmds::execute(self, cmd)?;
        }
        Ok(())
    }

    /// Record the first fault, stop all timers and run the teardown
    /// callbacks in their fixed order, then tell the host.
    pub(crate) fn run_shutdown(&mut self, reason: ShutdownReason) {
        if !self.shutdown.enter(reason) {
            return;
        }
        let reason = self.shutdown.reason();
        log::error!("shutdown: {}", reason);
        self.sched.reset();
        self.board.timer_kick();

        self.move_queue.reset(&mut self.arena);
        gpio::digital_out_shutdown(self);
        pwm::pwm_out_shutdown(self);

        self.shutdown.complete();
        let now = self.board.read_time();
        self.send(MessageType::ShutdownNow, &[now, reason.code() as u32]);
    }

    /*
     * Helpers for command handlers
     */

    /// Arm timer `id`, kicking the hardware timer when it became the head.
    pub(crate) fn add_timer(&mut self, id: TimerId, waketime: u32) -> Result<(), ShutdownReason> {
        let now = self.board.read_time();
        if self.sched.add_timer(id, waketime, now)? {
            self.board.timer_kick();
        }
        Ok(())
    }

    /// Queue a response made of a type byte and integer arguments.
    pub(crate) fn send(&mut self, ty: MessageType, args: &[u32]) {
        self.send_with_bytes(ty, args, None);
    }

    /// Queue a response whose last argument is a byte buffer.
    pub(crate) fn send_with_bytes(&mut self, ty: MessageType, args: &[u32], data: Option<&[u8]>) {
        let mut buf = [0u8; MESSAGE_PAYLOAD_MAX];
        match encode_response(&mut buf, ty, args, data) {
            Ok(len) => self.send_raw(&buf[..len]),
            Err(_) => log::warn!("response {:?} too large, dropped", ty),
        }
    }

    fn send_raw(&mut self, payload: &[u8]) {
        if self.tx.push_frame(self.framer.next_sequence(), payload) {
            self.board.enable_tx_irq();
        } else {
            log::warn!(
                "transmit buffer full ({} bytes pending), dropped message type {}",
                self.tx.pending(),
                payload[0]
            );
        }
    }
}

fn encode_response(buf: &mut [u8], ty: MessageType, args: &[u32], data: Option<&[u8]>) -> Result<usize, ShutdownReason> {
    let mut w = Writer::new(buf);
    w.put_byte(ty.code())?;
    for &arg in args {
        w.put_u32(arg)?;
    }
    if let Some(data) = data {
        w.put_bytes(data)?;
    }
    Ok(w.len())
}
