//! Typed device commands.
//!
//! [`Bus::read_device`] and [`Bus::write_device`] look the device up in the registry, check
//! that its family supports the command, and run the family's command set inside one
//! transaction.

use crate::{Bus, DeviceFault, DeviceRecord, Error, Result, Transport};
use embedded_hal::delay::DelayNs;
use embedded_onewire::RomAddress;
use log::debug;
use onewire_devices::{
    Capabilities, Eeprom, Switch, SwitchState, Temperature, TemperatureConfig, Thermometer,
};

/// A device command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Temperature in °C. Written as `[TH, TL]` or `[TH, TL, CONFIG]`.
    Temperature,
    /// Alarm limits and resolution. Written like [`Command::Temperature`].
    TemperatureConfig,
    /// `len` bytes of memory from `offset`. Written with exactly `len` bytes.
    Memory {
        /// First byte.
        offset: u16,
        /// Number of bytes.
        len: u16,
    },
    /// PIO state of a switch. Written as one byte of latch bits (bit 0 = A, bit 1 = B).
    Switch,
}

impl Command {
    /// Name used in errors and logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Temperature => "temperature",
            Self::TemperatureConfig => "temperature config",
            Self::Memory { .. } => "memory",
            Self::Switch => "switch",
        }
    }

    /// Capability a device needs for this command.
    pub fn capability(&self) -> Capabilities {
        match self {
            Self::Temperature | Self::TemperatureConfig => Capabilities::TEMPERATURE,
            Self::Memory { .. } => Capabilities::EEPROM_STORAGE,
            Self::Switch => Capabilities::SWITCH_CONTROL,
        }
    }
}

/// Result of a [`Command`] read.
#[derive(Debug, Clone, PartialEq)]
pub enum Reading {
    /// Converted temperature.
    Temperature(Temperature),
    /// Alarm limits and resolution.
    TemperatureConfig(TemperatureConfig),
    /// Memory content.
    Memory(Vec<u8>),
    /// PIO levels and latches.
    Switch(SwitchState),
}

enum Driver {
    Thermometer(Thermometer),
    Eeprom(Eeprom),
    Switch(Switch),
}

fn fault(address: RomAddress, operation: &'static str, fault: DeviceFault) -> Error {
    Error::Device {
        address,
        operation,
        fault,
    }
}

impl Driver {
    fn for_command(record: &DeviceRecord, command: Command, operation: &'static str) -> Result<Self> {
        let address = record.address;
        let driver = if record.supports(command.capability()) {
            match command {
                Command::Temperature | Command::TemperatureConfig => {
                    Thermometer::new(address).map(Self::Thermometer)
                }
                Command::Memory { .. } => Eeprom::new(address).map(Self::Eeprom),
                Command::Switch => Switch::new(address).map(Self::Switch),
            }
        } else {
            None
        };
        driver.ok_or_else(|| {
            debug!("{address}: {} has no {operation} command", record.name());
            fault(address, operation, DeviceFault::Unsupported)
        })
    }
}

fn check_payload(address: RomAddress, command: Command, payload: &[u8]) -> Result<()> {
    let valid = match command {
        Command::Temperature | Command::TemperatureConfig => matches!(payload.len(), 2 | 3),
        Command::Memory { len, .. } => payload.len() == len as usize,
        Command::Switch => payload.len() == 1,
    };
    if valid {
        Ok(())
    } else {
        Err(fault(address, command.name(), DeviceFault::OutOfRange))
    }
}

impl<T: Transport, D: DelayNs> Bus<T, D> {
    /// Reads from a device found by an earlier scan.
    ///
    /// # Errors
    /// [`Error::NotFound`] if the address is not in the registry, [`Error::Device`] with
    /// [`DeviceFault::Unsupported`] if the family has no such command, and any bus or
    /// device error of the exchange.
    pub fn read_device(&self, address: RomAddress, command: Command) -> Result<Reading> {
        let operation = command.name();
        let record = self.lookup(address)?;
        let driver = Driver::for_command(&record, command, operation)?;
        let mut tx = self.transaction()?;
        let reading = match (driver, command) {
            (Driver::Thermometer(sensor), Command::TemperatureConfig) => tx
                .run(address, operation, |bus, _| sensor.read_config(bus))
                .map(Reading::TemperatureConfig),
            (Driver::Thermometer(sensor), _) => tx
                .run(address, operation, |bus, delay| sensor.read_temperature(bus, delay))
                .map(Reading::Temperature),
            (Driver::Eeprom(eeprom), Command::Memory { offset, len }) => tx
                .run(address, operation, |bus, _| {
                    let mut buf = vec![0; len as usize];
                    eeprom.read(bus, offset, &mut buf).map(|()| buf)
                })
                .map(Reading::Memory),
            (Driver::Eeprom(_), _) => Err(fault(address, operation, DeviceFault::Unsupported)),
            (Driver::Switch(switch), _) => tx
                .run(address, operation, |bus, _| switch.read(bus))
                .map(Reading::Switch),
        }?;
        tx.commit();
        Ok(reading)
    }

    /// Writes to a device found by an earlier scan.
    ///
    /// The payload layout depends on the command, see [`Command`]. A payload of the wrong
    /// length fails with [`DeviceFault::OutOfRange`] before the bus is touched.
    pub fn write_device(&self, address: RomAddress, command: Command, payload: &[u8]) -> Result<()> {
        let operation = command.name();
        let record = self.lookup(address)?;
        let driver = Driver::for_command(&record, command, operation)?;
        check_payload(address, command, payload)?;
        let mut tx = self.transaction()?;
        match (driver, command) {
            (Driver::Thermometer(sensor), _) => tx.run(address, operation, |bus, delay| {
                sensor.write_config(bus, delay, payload)
            }),
            (Driver::Eeprom(eeprom), Command::Memory { offset, .. }) => {
                tx.run(address, operation, |bus, delay| {
                    eeprom.write(bus, delay, offset, payload)
                })
            }
            (Driver::Eeprom(_), _) => Err(fault(address, operation, DeviceFault::Unsupported)),
            (Driver::Switch(switch), _) => tx
                .run(address, operation, |bus, _| switch.write(bus, payload[0]))
                .map(|state| debug!("{address}: switch now {state:?}")),
        }?;
        tx.commit();
        Ok(())
    }
}
