//! # owbus
//! A 1-Wire bus master for DS2480B based adapters.
//!
//! [`open_bus`] connects to a serial, USB-serial or TCP tunnelled adapter and returns a
//! [`Bus`]. The bus enumerates its devices with the ROM search of `embedded-onewire`,
//! keeps them in a [`DeviceRegistry`], and answers [`Bus::scan_devices`] from a
//! [`ScanCache`] while the last scan is fresh. Devices are read and written with typed
//! [`Command`]s, dispatched to the family drivers of `onewire-devices`.
//!
//! Every bus operation runs in a [`Transaction`] holding the bus exclusively. Errors carry
//! the port, address and operation they happened on, and [`Error::is_retryable`] tells
//! whether trying again can help. [`RetryPolicy`] does that for callers who want it.
//!
//! Any [`OneWire`](embedded_onewire::OneWire) implementation with classified errors can
//! stand in for the adapter, see [`Bus::new`]. The DS2482 I2C bridges of the `ds2482`
//! crate plug in that way, on a `linux_embedded_hal::I2cdev` or any other I2C bus.

mod bus;
mod cache;
mod command;
mod config;
mod error;
mod registry;
mod retry;
mod stats;
mod transaction;
mod transport;

pub use bus::Bus;
pub use cache::ScanCache;
pub use command::{Command, Reading};
pub use config::{BusConfig, TransportMode};
pub use error::{BoxError, DeviceFault, Error, Result};
pub use registry::{DeviceRecord, DeviceRegistry, RefreshDiff};
pub use retry::RetryPolicy;
pub use stats::StatsSnapshot;
pub use transaction::{Transaction, Transport};
pub use transport::{Adapter, SerialLink, TcpLink, open_adapter, open_bus, select_usb_port};

pub use embedded_onewire::{Presence, RomAddress};
pub use onewire_devices::{
    Capabilities, Family, Resolution, SwitchState, Temperature, TemperatureConfig,
};
