#![deny(missing_docs)]

/*! # DS2480B
 *
 * Driver for the DS2480B serial 1-Wire line driver and the adapters built around it
 * (DS9097U, LinkUSB and similar USB-serial dongles, or any of those exposed through a
 * TCP serial tunnel).
 *
 * The chip is driven over a byte link implementing [`Link`]: a serial port, a USB-serial
 * bridge or a socket. The driver implements [`OneWire`], so everything in
 * `embedded-onewire` (search, addressing, CRC checks) works on top of it.
 */

pub use embedded_onewire::{OneWire, OneWireError, OneWireResult};
mod commands;
mod error;
mod onewire;
mod traits;

pub use commands::{CommandByte, ResetResponse, Speed};
pub use error::Ds2480bError;
pub use traits::Link;

use commands::{CALIBRATION_RESET, CONFIG_DETECT, CONFIG_DETECT_RESPONSE, MODE_COMMAND, MODE_DATA};
use log::{debug, trace};
use std::{thread, time::Duration};

/// Time the chip needs to finish answering before its input can be dropped.
const SETTLE: Duration = Duration::from_millis(5);

/// Results of DS2480B-specific function calls.
pub type Ds2480bResult<T> = Result<T, Ds2480bError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    Command,
    Data,
}

/// A DS2480B serial 1-Wire line driver.
///
/// Takes ownership of a byte link implementing [`Link`].
pub struct Ds2480b<L> {
    pub(crate) link: L,
    pub(crate) mode: Mode,
    pub(crate) speed: Speed,
    /// A read timed out, answers to it may still arrive.
    pub(crate) desynced: bool,
}

/// Builder for creating a [`Ds2480b`] instance with custom configuration.
pub struct Ds2480bBuilder {
    pub(crate) line_break: bool,
    pub(crate) speed: Speed,
}

impl Default for Ds2480bBuilder {
    fn default() -> Self {
        Ds2480bBuilder {
            line_break: true,
            speed: Speed::Flexible,
        }
    }
}

impl Ds2480bBuilder {
    /// Sends a line break before detection to put the chip back into its power-up state.
    ///
    /// Links that cannot signal a break (TCP tunnels) ignore it.
    pub fn with_line_break(mut self, line_break: bool) -> Self {
        self.line_break = line_break;
        self
    }

    /// Sets the 1-Wire timing used for resets and bit slots.
    pub fn with_speed(mut self, speed: Speed) -> Self {
        self.speed = speed;
        self
    }

    /// Detects the chip on `link` and returns a driver ready for 1-Wire traffic.
    ///
    /// Detection sends the timing calibration reset, then the slew rate, write-1 low time
    /// and sample offset configuration, reads back the baud rate and performs a single
    /// bit slot. Every answer must match what a DS2480B sends.
    pub fn build<L: Link>(self, link: L) -> Ds2480bResult<Ds2480b<L>> {
        let mut dev = Ds2480b {
            link,
            mode: Mode::Command,
            speed: self.speed,
            desynced: false,
        };
        dev.detect(self.line_break)?;
        Ok(dev)
    }
}

impl<L> Ds2480b<L> {
    /// Speed used for resets and bit slots.
    pub fn speed(&self) -> Speed {
        self.speed
    }

    /// Gives the link back.
    pub fn release(self) -> L {
        self.link
    }
}

impl<L: Link> Ds2480b<L> {
    /// Re-runs detection on the same link, e.g. after the adapter was power cycled.
    pub fn redetect(&mut self, line_break: bool) -> Ds2480bResult<()> {
        self.detect(line_break)
    }

    fn detect(&mut self, line_break: bool) -> Ds2480bResult<()> {
        if line_break {
            self.link.line_break()?;
        }
        // The first reset after power-up calibrates the chip's timing and is not answered.
        self.link.write_all(&[CALIBRATION_RESET])?;
        self.link.flush()?;
        thread::sleep(SETTLE);
        self.link.discard_input()?;
        self.mode = Mode::Command;
        self.desynced = false;

        self.link.write_all(&CONFIG_DETECT)?;
        self.link.flush()?;
        let mut response = [0u8; CONFIG_DETECT.len()];
        self.link.read_exact(&mut response)?;
        trace!("ds2480b: detect response {response:02x?}");
        if response != CONFIG_DETECT_RESPONSE {
            return Err(Ds2480bError::NotDetected { response });
        }
        debug!("ds2480b: line driver detected");
        Ok(())
    }

    /// Drops answers that arrived after a timed out read, so the next exchange reads its own.
    pub(crate) fn resync(&mut self) -> Ds2480bResult<()> {
        if self.desynced {
            thread::sleep(SETTLE);
            self.link.discard_input()?;
            self.desynced = false;
            debug!("ds2480b: dropped late input after a timeout");
        }
        Ok(())
    }

    pub(crate) fn enter(&mut self, mode: Mode) -> Ds2480bResult<()> {
        if self.mode != mode {
            let switch = match mode {
                Mode::Command => MODE_COMMAND,
                Mode::Data => MODE_DATA,
            };
            self.link.write_all(&[switch])?;
            self.mode = mode;
        }
        Ok(())
    }

    /// Sends one byte and reads the single byte the chip answers with.
    pub(crate) fn exchange(&mut self, byte: u8) -> Ds2480bResult<u8> {
        self.link.write_all(&[byte])?;
        self.link.flush()?;
        let mut response = [0u8; 1];
        self.link.read_exact(&mut response)?;
        Ok(response[0])
    }
}
