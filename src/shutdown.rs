// src/shutdown.rs
// Shutdown state machine. Faults travel as `Err(ShutdownReason)` up to the task
// loop, which calls `enter`, runs teardown and then `complete`. Faults raised in
// interrupt context are parked with `raise` and escalated at the next task round.

use crate::protocol::ShutdownReason;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ShutdownStatus {
    Normal,
    /// Teardown callbacks are running.
    ShuttingDown,
    Shutdown,
}

#[derive(Debug)]
pub struct ShutdownControl {
    status: ShutdownStatus,
    reason: ShutdownReason,
    pending: Option<ShutdownReason>,
}

impl Default for ShutdownControl {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownControl {
    pub const fn new() -> Self {
        Self {
            status: ShutdownStatus::Normal,
            reason: ShutdownReason::Unknown,
            pending: None,
        }
    }

    pub fn status(&self) -> ShutdownStatus {
        self.status
    }

    pub fn is_shutdown(&self) -> bool {
        self.status != ShutdownStatus::Normal
    }

    /// Reason of the first fault of the current (or last) shutdown.
    pub fn reason(&self) -> ShutdownReason {
        self.reason
    }

    /// Escalate `reason` unless a shutdown is already in progress or done.
    pub fn try_shutdown(&self, reason: ShutdownReason) -> Result<(), ShutdownReason> {
        if self.is_shutdown() {
            Ok(())
        } else {
            Err(reason)
        }
    }

    /// Interrupt-context fault. The first one wins until it is taken.
    pub fn raise(&mut self, reason: ShutdownReason) {
        if self.pending.is_none() && !self.is_shutdown() {
            self.pending = Some(reason);
        }
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn take_pending(&mut self) -> Option<ShutdownReason> {
        self.pending.take()
    }

    /// Start teardown. Returns false when teardown is already running, in which
    /// case the caller must not run it again.
    pub fn enter(&mut self, reason: ShutdownReason) -> bool {
        match self.status {
            ShutdownStatus::ShuttingDown => false,
            ShutdownStatus::Normal => {
                self.reason = reason;
                self.status = ShutdownStatus::ShuttingDown;
                true
            }
            ShutdownStatus::Shutdown => {
                self.status = ShutdownStatus::ShuttingDown;
                true
            }
        }
    }

    pub fn complete(&mut self) {
        self.status = ShutdownStatus::Shutdown;
        self.pending = None;
    }

    /// Host acknowledged the shutdown. Clearing while teardown still runs is
    /// ignored; clearing while not shut down is itself a fault.
    pub fn clear(&mut self) -> Result<(), ShutdownReason> {
        match self.status {
            ShutdownStatus::Normal => Err(ShutdownReason::AlreadyCleared),
            ShutdownStatus::ShuttingDown => Ok(()),
            ShutdownStatus::Shutdown => {
                self.status = ShutdownStatus::Normal;
                Ok(())
            }
        }
    }
}
