#![no_std]
#![deny(missing_docs)]
//! # onewire-devices
//! Command sets for 1-Wire slave devices, usable over any [`OneWire`](embedded_onewire::OneWire)
//! transport.
//!
//! Devices are grouped by what they can do rather than by part number:
//! - [`Thermometer`] covers the DS18S20, DS1822, DS18B20, DS1825, DS28EA00 and the
//!   DS1921 Thermochron,
//! - [`Eeprom`] covers the DS2423, DS2433 and DS2431 memories and the DS1921 SRAM,
//! - [`Switch`] covers the DS2413 and the PIO pins of the DS28EA00.
//!
//! [`Family::lookup`] maps a family code to its part name, [`Capabilities`] and the
//! per-capability parameters these drivers need.

#[cfg(any(test, feature = "sim"))]
extern crate std;

mod error;
mod family;
mod memory;
#[cfg(any(test, feature = "sim"))]
pub mod sim;
mod switch;
mod thermometer;

pub use error::DeviceError;
pub use family::{Capabilities, FAMILIES, Family, MemoryLayout, SwitchLayout, ThermometerKind};
pub use memory::Eeprom;
pub use switch::{PioStatus, Switch, SwitchState};
pub use thermometer::{Resolution, Scratchpad, Temperature, TemperatureConfig, Thermometer};

/// Result of device operations over a transport with bus error `E`.
pub type DeviceResult<T, E> = Result<T, DeviceError<E>>;
