// src/hal.rs
// Hardware boundary. A board supplies the free running clock, the interrupt
// side channels and the pin drivers; everything above it is target neutral.

use crate::protocol::ShutdownReason;

/// Errors reported by pin driver setup.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PinError {
    /// The pin does not exist or cannot drive an output.
    InvalidPin,
    /// The pin exists but has no PWM capability.
    NotPwm,
    /// The pin is claimed by a different function.
    PinUnavailable,
    ConfigurationError,
}

impl PinError {
    pub(crate) fn into_gpio_reason(self) -> ShutdownReason {
        ShutdownReason::PinOutInvalid
    }

    pub(crate) fn into_pwm_reason(self) -> ShutdownReason {
        match self {
            PinError::NotPwm | PinError::InvalidPin => ShutdownReason::PinPwmInvalid,
            PinError::PinUnavailable | PinError::ConfigurationError => ShutdownReason::PwmAlreadyProgrammed,
        }
    }
}

pub trait Board {
    /// Current value of the 32-bit free running tick counter.
    fn read_time(&self) -> u32;

    /// A timer was added ahead of the programmed wake time; the timer
    /// interrupt should run as soon as possible.
    fn timer_kick(&mut self);

    /// Bytes are waiting in the transmit buffer.
    fn enable_tx_irq(&mut self);

    fn gpio_out_setup(&mut self, pin: u32, value: bool) -> Result<(), PinError>;

    fn gpio_out_write(&mut self, pin: u32, value: bool);

    fn pwm_setup(&mut self, pin: u32, cycle_time: u32, value: u16) -> Result<(), PinError>;

    fn pwm_write(&mut self, pin: u32, value: u16);
}
