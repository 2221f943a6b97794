#![no_std]
#![deny(missing_docs)]
//! # embedded-onewire
//! A no-std implementation of the 1-Wire bus master protocol.
//!
//! The [OneWire] trait is the transport contract: reset/presence, bit slots and byte transfers.
//! Anything that can produce those time slots (a bridge chip, a serial line driver, a GPIO
//! bit-banger, or the [sim] test bench) implements it.
//!
//! On top of the trait the crate provides the protocol engine:
//! - [OneWireSearch], the binary-tree ROM search that enumerates every device on the bus,
//! - [RomAddress], the 64-bit device address with its CRC8 check,
//! - [OneWireCrc] and [OneWireCrc16], the two checksums used by 1-Wire devices,
//! - [presence], which turns a reset into a [Presence] result.

#[cfg(any(test, feature = "sim"))]
extern crate std;

pub mod consts;
mod error;
mod rom;
mod search;
#[cfg(any(test, feature = "sim"))]
pub mod sim;
mod traits;
mod utils;

pub use error::OneWireError;
pub use rom::{ParseRomError, RomAddress};
pub use search::{OneWireSearch, OneWireSearchKind};
pub use traits::{OneWire, OneWireStatus, Presence, TransportFault, presence};
pub use utils::{OneWireCrc, OneWireCrc16};

/// Result of 1-Wire operations.
pub type OneWireResult<T, E> = Result<T, OneWireError<E>>;
