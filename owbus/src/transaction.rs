use crate::{Bus, DeviceFault, Error, Result, bus::Line};
use embedded_hal::delay::DelayNs;
use embedded_onewire::{
    OneWire, OneWireError, OneWireSearch, OneWireSearchKind, Presence, RomAddress, TransportFault,
    consts::ONEWIRE_SKIP_ROM_CMD, presence,
};
use log::{debug, error, warn};
use onewire_devices::DeviceError;
use parking_lot::MutexGuard;

/// Transports a [`Bus`] can drive: any [`OneWire`] whose errors can be classified and
/// reported.
pub trait Transport:
    OneWire<BusError: TransportFault + std::error::Error + Send + Sync + 'static>
{
}

impl<T> Transport for T
where
    T: OneWire,
    T::BusError: TransportFault + std::error::Error + Send + Sync + 'static,
{
}

/// Exclusive access to a bus for one sequence of operations.
///
/// The bus lock is held until the transaction is dropped. A transaction dropped without
/// [`commit`](Transaction::commit), whether by an error, a timeout or unwinding, leaves
/// the line in an unknown state, and the next transaction starts with a reset.
pub struct Transaction<'a, T, D> {
    pub(crate) bus: &'a Bus<T, D>,
    pub(crate) line: MutexGuard<'a, Line<T, D>>,
    committed: bool,
}

impl<'a, T: Transport, D: DelayNs> Transaction<'a, T, D> {
    pub(crate) fn begin(bus: &'a Bus<T, D>, line: MutexGuard<'a, Line<T, D>>) -> Result<Self> {
        if line.transport.is_none() {
            return Err(Error::InvalidHandle);
        }
        bus.stats.transactions(1);
        let mut tx = Self {
            bus,
            line,
            committed: false,
        };
        if tx.line.unsettled {
            warn!("{}: previous transaction did not complete, resetting the bus", bus.port);
            bus.stats.forced_resets(1);
            tx.reset()?;
            tx.line.unsettled = false;
        }
        Ok(tx)
    }

    fn transport(&mut self) -> Result<&mut T> {
        self.line.transport.as_mut().ok_or(Error::InvalidHandle)
    }

    /// Transport and delay provider, for device drivers.
    fn parts(&mut self) -> Result<(&mut T, &mut D)> {
        let line = &mut *self.line;
        match line.transport.as_mut() {
            Some(transport) => Ok((transport, &mut line.delay)),
            None => Err(Error::InvalidHandle),
        }
    }

    /// Converts a bus error, invalidating the bus when the transport is gone.
    pub(crate) fn lift(
        &mut self,
        err: OneWireError<T::BusError>,
        operation: &'static str,
        address: Option<RomAddress>,
    ) -> Error {
        self.bus.cache.invalidate();
        match err {
            OneWireError::Other(e) if e.is_fatal() => {
                error!("{}: {operation} failed, invalidating bus: {e}", self.bus.port);
                self.bus.stats.transport_errors(1);
                self.line.transport = None;
                Error::Transport {
                    port: self.bus.port.clone(),
                    source: Box::new(e),
                }
            }
            OneWireError::Other(_) | OneWireError::Timeout => {
                self.bus.stats.timeouts(1);
                Error::Timeout { operation, address }
            }
            OneWireError::ShortCircuit => Error::ShortCircuit,
            OneWireError::NoDevicePresent => match address {
                Some(address) => Error::Device {
                    address,
                    operation,
                    fault: DeviceFault::NoResponse,
                },
                None => Error::BusSearch {
                    reason: "no presence pulse".into(),
                },
            },
            OneWireError::InvalidCrc => self.fault(operation, address, DeviceFault::Crc),
            OneWireError::Unimplemented => {
                self.fault(operation, address, DeviceFault::Unsupported)
            }
        }
    }

    fn fault(
        &mut self,
        operation: &'static str,
        address: Option<RomAddress>,
        fault: DeviceFault,
    ) -> Error {
        match address {
            Some(address) => {
                self.bus.stats.device_errors(1);
                Error::Device {
                    address,
                    operation,
                    fault,
                }
            }
            None => Error::BusSearch {
                reason: format!("{operation}: {fault}"),
            },
        }
    }

    /// Converts a device command error.
    pub(crate) fn device_error(
        &mut self,
        err: DeviceError<T::BusError>,
        operation: &'static str,
        address: RomAddress,
    ) -> Error {
        match err {
            DeviceError::Bus(e) => self.lift(e, operation, Some(address)),
            other => {
                debug!("{}: {operation} on {address} failed: {other:?}", self.bus.port);
                self.bus.stats.device_errors(1);
                self.bus.cache.invalidate();
                Error::Device {
                    address,
                    operation,
                    fault: other.into(),
                }
            }
        }
    }

    /// Runs a device driver against the bus and attributes its failures to `address`.
    ///
    /// `f` gets the transport and the delay provider and is expected to select the device
    /// itself, as the drivers of `onewire_devices` do.
    pub fn run<R>(
        &mut self,
        address: RomAddress,
        operation: &'static str,
        f: impl FnOnce(&mut T, &mut D) -> std::result::Result<R, DeviceError<T::BusError>>,
    ) -> Result<R> {
        let result = {
            let (transport, delay) = self.parts()?;
            f(transport, delay)
        };
        result.map_err(|e| self.device_error(e, operation, address))
    }

    /// Reset pulse and presence detection.
    pub fn reset(&mut self) -> Result<Presence> {
        self.bus.stats.resets(1);
        let result = presence(self.transport()?);
        result.map_err(|e| self.lift(e, "reset", None))
    }

    /// Resets the bus and selects one device with Match ROM.
    pub fn select(&mut self, address: RomAddress) -> Result<()> {
        let result = self.transport()?.address(Some(address));
        result.map_err(|e| self.lift(e, "select", Some(address)))
    }

    /// Resets the bus and addresses every device with Skip ROM.
    ///
    /// Nothing is sent after the reset when no device answers it.
    pub fn skip(&mut self) -> Result<Presence> {
        if self.reset()? == Presence::NoDevices {
            return Ok(Presence::NoDevices);
        }
        self.write(&[ONEWIRE_SKIP_ROM_CMD])?;
        Ok(Presence::DevicesPresent)
    }

    /// Writes bytes to the bus.
    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let result = self.transport()?.write_bytes(bytes);
        result.map_err(|e| self.lift(e, "write", None))
    }

    /// Fills `buf` from the bus.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<()> {
        let result = self.transport()?.read_bytes(buf);
        result.map_err(|e| self.lift(e, "read", None))
    }

    /// Waits, holding the bus.
    pub fn delay_ms(&mut self, ms: u32) {
        self.line.delay.delay_ms(ms);
    }

    /// Runs a complete ROM search and returns the addresses in search order.
    ///
    /// Addresses with a bad CRC are dropped by the search and only counted.
    pub fn search(&mut self, kind: OneWireSearchKind) -> Result<Vec<RomAddress>> {
        self.bus.stats.searches(1);
        let transport = self.line.transport.as_mut().ok_or(Error::InvalidHandle)?;
        let mut search = OneWireSearch::new(transport, kind);
        let mut found = Vec::new();
        let outcome = loop {
            match search.next() {
                Ok(Some(rom)) => found.push(rom),
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            }
        };
        let discarded = search.discarded();
        self.bus.stats.crc_discards(discarded as u64);
        match outcome {
            Ok(()) => {
                self.bus.stats.devices_found(found.len() as u64);
                debug!("{}: search found {} devices", self.bus.port, found.len());
                Ok(found)
            }
            Err(e) => Err(match self.lift(e, "search", None) {
                Error::Timeout { .. } => Error::BusSearch {
                    reason: "transport timeout during search".into(),
                },
                other => other,
            }),
        }
    }

    /// Checks that `address` still answers, with a search forced down its branch.
    pub fn verify(&mut self, address: RomAddress) -> Result<bool> {
        let result =
            OneWireSearch::new(self.transport()?, OneWireSearchKind::Normal).verify(address);
        result.map_err(|e| self.lift(e, "verify", Some(address)))
    }

    /// Marks the sequence as completed. The next transaction does not need a reset.
    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl<T, D> Drop for Transaction<'_, T, D> {
    fn drop(&mut self) {
        if !self.committed {
            self.line.unsettled = true;
        }
    }
}
