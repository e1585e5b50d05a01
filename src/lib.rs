#![cfg_attr(not(test), no_std)]
//! Communication and execution core of a printer controller MCU: framed
//! host link, timer scheduler, shutdown handling and arena backed objects.
//!
//! A board crate implements [`Board`], owns one [`Mcu`] and forwards its
//! interrupts (or poll results) to it.

// --- Public Modules ---
pub mod arena;
pub mod cmds;
pub mod cobs;
pub mod command;
pub mod config;
pub mod hal;
pub mod mcu;
pub mod move_queue;
pub mod oid;
pub mod protocol;
pub mod sched;
pub mod serial;
pub mod shutdown;
pub mod utils; // crc, clock comparisons
pub mod vlq;

// --- Re-exports ---
pub use config::McuConfig;
pub use hal::{Board, PinError};
pub use mcu::Mcu;
pub use protocol::{MessageType, ShutdownReason};
pub use shutdown::ShutdownStatus;
