// knp_linux_mcu/src/board.rs
// Board implementation backed by the process clock. Pins are simulated: every
// write is logged and the last value kept per pin.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use knp_mcu::{Board, PinError};
use log::{debug, info};

/// Pins numbered at or above this do not exist.
pub const PIN_COUNT: u32 = 256;

pub struct LinuxBoard {
    start: Instant,
    clock_freq: u32,
    kicked: bool,
    tx_ready: bool,
    pins: HashMap<u32, bool>,
    pwm: HashMap<u32, (u32, u16)>,
}

impl LinuxBoard {
    pub fn new(clock_freq: u32) -> Self {
        Self {
            start: Instant::now(),
            clock_freq,
            kicked: false,
            tx_ready: false,
            pins: HashMap::new(),
            pwm: HashMap::new(),
        }
    }

    /// Whether a timer was queued ahead of the armed wake time since the
    /// last call.
    pub fn take_kick(&mut self) -> bool {
        std::mem::take(&mut self.kicked)
    }

    pub fn take_tx_ready(&mut self) -> bool {
        std::mem::take(&mut self.tx_ready)
    }

    /// Wall time left until the clock reaches `waketime`.
    pub fn time_until(&self, waketime: u32) -> Duration {
        let ticks = waketime.wrapping_sub(self.read_time()) as i32;
        if ticks <= 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(ticks as u64 * 1_000_000_000 / self.clock_freq as u64)
    }

    fn check_pin(pin: u32) -> Result<(), PinError> {
        if pin >= PIN_COUNT {
            return Err(PinError::InvalidPin);
        }
        Ok(())
    }
}

impl Board for LinuxBoard {
    fn read_time(&self) -> u32 {
        let nanos = self.start.elapsed().as_nanos();
        (nanos * self.clock_freq as u128 / 1_000_000_000) as u32
    }

    fn timer_kick(&mut self) {
        self.kicked = true;
    }

    fn enable_tx_irq(&mut self) {
        self.tx_ready = true;
    }

    fn gpio_out_setup(&mut self, pin: u32, value: bool) -> Result<(), PinError> {
        Self::check_pin(pin)?;
        if self.pwm.contains_key(&pin) {
            return Err(PinError::PinUnavailable);
        }
        debug!("gpio {} configured as output, initial {}", pin, value as u8);
        self.pins.insert(pin, value);
        Ok(())
    }

    fn gpio_out_write(&mut self, pin: u32, value: bool) {
        if self.pins.insert(pin, value) != Some(value) {
            info!("gpio {} -> {}", pin, value as u8);
        }
    }

    fn pwm_setup(&mut self, pin: u32, cycle_time: u32, value: u16) -> Result<(), PinError> {
        Self::check_pin(pin)?;
        if self.pins.contains_key(&pin) {
            return Err(PinError::PinUnavailable);
        }
        if cycle_time == 0 {
            return Err(PinError::ConfigurationError);
        }
        if let Some(&(existing, _)) = self.pwm.get(&pin) {
            if existing != cycle_time {
                return Err(PinError::ConfigurationError);
            }
        }
        debug!("pwm {} configured: cycle {} ticks, initial {}", pin, cycle_time, value);
        self.pwm.insert(pin, (cycle_time, value));
        Ok(())
    }

    fn pwm_write(&mut self, pin: u32, value: u16) {
        if let Some(entry) = self.pwm.get_mut(&pin) {
            if entry.1 != value {
                info!("pwm {} -> {}", pin, value);
            }
            entry.1 = value;
        }
    }
}
