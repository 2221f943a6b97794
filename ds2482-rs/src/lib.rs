#![no_std]
#![deny(missing_docs)]

/*! # DS2482
 *
 * Driver for the DS2482-100 and DS2482-800 I2C to 1-Wire bridges. The DS2484 understands
 * the same 1-Wire commands and works with the single channel setup.
 *
 * The bridge generates the 1-Wire time slots itself, including the search triplet, and
 * reports their outcome in its status register. The driver implements [`OneWire`], so
 * everything in `embedded-onewire` works on top of it.
 */

#[cfg(test)]
extern crate std;

pub use embedded_onewire::{OneWire, OneWireError, OneWireResult};
mod error;
mod onewire;
mod registers;

pub use error::Ds2482Error;
pub use registers::{DeviceConfiguration, DeviceStatus};

use embedded_hal::{
    delay::DelayNs,
    i2c::{I2c, SevenBitAddress},
};
use log::{debug, trace};
use registers::{
    CHANNEL_CODES, CHANNEL_REGISTER, CHANNEL_SELECT, CONFIG_REGISTER, DEVICE_RESET,
    SET_READ_POINTER, STATUS_REGISTER, WRITE_CONFIG,
};

/// Results of DS2482-specific function calls.
pub type Ds2482Result<T, E> = Result<T, Ds2482Error<E>>;

/// I2C address with both address pins low.
pub const BASE_ADDRESS: u8 = 0x18;
const POLL_INTERVAL_US: u32 = 100;

/// A DS2482 I2C to 1-Wire bridge.
///
/// Takes ownership of an I2C bus (implementing [`I2c`]) and a timer implementing
/// [`DelayNs`], used between status polls.
pub struct Ds2482<I, D> {
    pub(crate) i2c: I,
    pub(crate) addr: u8,
    pub(crate) delay: D,
    pub(crate) retries: u8,
    pub(crate) config: DeviceConfiguration,
    pub(crate) channel: Option<u8>,
    /// Register the next plain read returns.
    pub(crate) pointer: u8,
}

/// Builder for creating a [`Ds2482`] instance with custom configuration.
pub struct Ds2482Builder {
    addr: u8,
    retries: u8,
    config: DeviceConfiguration,
    channel: Option<u8>,
}

impl Default for Ds2482Builder {
    fn default() -> Self {
        Ds2482Builder {
            addr: BASE_ADDRESS,
            retries: 100,
            config: DeviceConfiguration::new(),
            channel: None,
        }
    }
}

impl Ds2482Builder {
    /// Sets the I2C address, `0x18` to `0x1b` for the DS2482-100 and up to `0x1f` for the
    /// DS2482-800.
    pub fn with_address(mut self, addr: u8) -> Self {
        self.addr = addr;
        self
    }

    /// Sets the number of status polls before a busy bridge is reported.
    pub fn with_retries(mut self, retries: u8) -> Self {
        self.retries = retries;
        self
    }

    /// Sets the device configuration.
    pub fn with_config(mut self, config: DeviceConfiguration) -> Self {
        self.config = config;
        self
    }

    /// Selects one of the eight 1-Wire channels of a DS2482-800.
    pub fn with_channel(mut self, channel: u8) -> Self {
        self.channel = Some(channel);
        self
    }

    /// Resets the bridge, writes the configuration and selects the channel.
    pub fn build<I: I2c<SevenBitAddress>, D: DelayNs>(
        self,
        i2c: I,
        delay: D,
    ) -> Ds2482Result<Ds2482<I, D>, I::Error> {
        let mut dev = Ds2482 {
            i2c,
            addr: self.addr,
            delay,
            retries: self.retries,
            config: self.config,
            channel: None,
            pointer: STATUS_REGISTER,
        };
        dev.device_reset()?;
        dev.configure(self.config)?;
        if let Some(channel) = self.channel {
            dev.select_channel(channel)?;
        }
        debug!("ds2482 {:#04x}: bridge ready", dev.addr);
        Ok(dev)
    }
}

impl<I, D> Ds2482<I, D> {
    /// I2C address of the bridge.
    pub fn address(&self) -> u8 {
        self.addr
    }

    /// Configuration last written.
    pub fn config(&self) -> DeviceConfiguration {
        self.config
    }

    /// Selected channel of a DS2482-800.
    pub fn channel(&self) -> Option<u8> {
        self.channel
    }

    /// Gives the I2C bus and the timer back.
    pub fn release(self) -> (I, D) {
        (self.i2c, self.delay)
    }
}

impl<I: I2c<SevenBitAddress>, D: DelayNs> Ds2482<I, D> {
    /// Resets the bridge.
    ///
    /// Terminates any ongoing 1-Wire communication and clears the configuration, which has
    /// to be written again before the next 1-Wire command.
    pub fn device_reset(&mut self) -> Ds2482Result<DeviceStatus, I::Error> {
        self.i2c.write(self.addr, &[DEVICE_RESET])?;
        self.pointer = STATUS_REGISTER;
        self.channel = None;
        for _ in 0..=self.retries {
            let status = self.read_register()?;
            if status.device_reset() {
                return Ok(status);
            }
            self.delay.delay_us(POLL_INTERVAL_US);
        }
        Err(Ds2482Error::RetriesExceeded)
    }

    /// Reads the status register.
    pub fn status(&mut self) -> Ds2482Result<DeviceStatus, I::Error> {
        self.point_at(STATUS_REGISTER)?;
        self.read_register()
    }

    /// Writes the configuration register and checks the bridge took it.
    pub fn configure(&mut self, config: DeviceConfiguration) -> Ds2482Result<(), I::Error> {
        self.wait()?;
        let mut read = [0u8; 1];
        self.i2c
            .write_read(self.addr, &[WRITE_CONFIG, config.to_register()], &mut read)?;
        self.pointer = CONFIG_REGISTER;
        let wrote = config.into_bits() & 0x0f;
        if read[0] != wrote {
            return Err(Ds2482Error::Config {
                wrote,
                read: read[0],
            });
        }
        trace!("ds2482 {:#04x}: configuration {wrote:#04x}", self.addr);
        self.config = config;
        Ok(())
    }

    /// Switches a DS2482-800 to `channel`. Single channel bridges refuse this.
    pub fn select_channel(&mut self, channel: u8) -> Ds2482Result<(), I::Error> {
        let Some(&(code, confirm)) = CHANNEL_CODES.get(channel as usize) else {
            return Err(Ds2482Error::Channel { channel, read: 0 });
        };
        self.wait()?;
        let mut read = [0u8; 1];
        self.i2c.write_read(self.addr, &[CHANNEL_SELECT, code], &mut read)?;
        self.pointer = CHANNEL_REGISTER;
        if read[0] != confirm {
            return Err(Ds2482Error::Channel {
                channel,
                read: read[0],
            });
        }
        debug!("ds2482 {:#04x}: channel {channel}", self.addr);
        self.channel = Some(channel);
        Ok(())
    }

    /// Polls the status register until the running 1-Wire command is done.
    pub(crate) fn wait(&mut self) -> Ds2482Result<DeviceStatus, I::Error> {
        self.point_at(STATUS_REGISTER)?;
        for _ in 0..=self.retries {
            let status = self.read_register()?;
            if !status.onewire_busy() {
                return Ok(status);
            }
            self.delay.delay_us(POLL_INTERVAL_US);
        }
        Err(Ds2482Error::RetriesExceeded)
    }

    pub(crate) fn point_at(&mut self, register: u8) -> Ds2482Result<(), I::Error> {
        if self.pointer != register {
            self.i2c.write(self.addr, &[SET_READ_POINTER, register])?;
            self.pointer = register;
        }
        Ok(())
    }

    fn read_register(&mut self) -> Ds2482Result<DeviceStatus, I::Error> {
        let mut buf = [0u8; 1];
        self.i2c.read(self.addr, &mut buf)?;
        Ok(DeviceStatus::from_bits(buf[0]))
    }
}
