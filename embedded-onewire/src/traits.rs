use crate::{
    OneWireError, OneWireResult, RomAddress,
    consts::{ONEWIRE_MATCH_ROM_CMD, ONEWIRE_SKIP_ROM_CMD},
};

/// Trait for 1-Wire communication.
/// This trait defines the basic operations required for 1-Wire communication, such as resetting the bus,
/// writing and reading bytes, and writing and reading bits.
///
/// Implementations must keep bit and byte ordering exact: every call completes its time
/// slots on the wire before returning, whatever the latency of the underlying medium.
pub trait OneWire {
    /// The status type returned by the reset operation.
    /// This type must implement the [OneWireStatus] trait.
    type Status: OneWireStatus;
    /// The error type returned by the operations of this trait.
    /// This type is used to indicate errors in the underlying hardware or communication.
    type BusError;

    /// Resets the 1-Wire bus and returns the status of the bus.
    ///
    /// A bus without devices is not an error here: the returned status reports
    /// `presence() == false`.
    ///
    /// # Errors
    /// This method returns an error if the reset operation fails.
    fn reset(&mut self) -> OneWireResult<Self::Status, Self::BusError>;

    /// Writes a byte to the 1-Wire bus, least significant bit first.
    fn write_byte(&mut self, byte: u8) -> OneWireResult<(), Self::BusError>;

    /// Reads a byte from the 1-Wire bus, least significant bit first.
    fn read_byte(&mut self) -> OneWireResult<u8, Self::BusError>;

    /// Writes a single bit time slot.
    fn write_bit(&mut self, bit: bool) -> OneWireResult<(), Self::BusError>;

    /// Reads a single bit time slot.
    fn read_bit(&mut self) -> OneWireResult<bool, Self::BusError>;

    /// # Note: Not intended for public API use.
    /// Generates three time slots: two read time slots and one write time slot at the 1-Wire line.
    /// This is one step of the [1-wire search ROM sequence](https://www.analog.com/en/resources/app-notes/1wire-search-algorithm.html).
    ///
    /// If the read time slots are both 0 the write slot carries `direction`.
    /// If they are 0 and 1 a write-zero slot follows, if they are 1 and 0 a write-one slot follows.
    /// If they are both 1 (nobody answered) the write slot is a write-one.
    ///
    /// # Returns
    /// The id bit, the complement bit and the direction that was written.
    ///
    /// # Errors
    /// The default implementation returns [`OneWireError::Unimplemented`], and the search falls
    /// back to [`read_bit`](OneWire::read_bit) and [`write_bit`](OneWire::write_bit).
    fn read_triplet(&mut self, _direction: bool) -> OneWireResult<(bool, bool, bool), Self::BusError> {
        Err(OneWireError::Unimplemented)
    }

    /// Writes a sequence of bits in order.
    fn write_bits(&mut self, bits: &[bool]) -> OneWireResult<(), Self::BusError> {
        for &bit in bits {
            self.write_bit(bit)?;
        }
        Ok(())
    }

    /// Fills `bits` with consecutive read time slots.
    fn read_bits(&mut self, bits: &mut [bool]) -> OneWireResult<(), Self::BusError> {
        for bit in bits.iter_mut() {
            *bit = self.read_bit()?;
        }
        Ok(())
    }

    /// Writes a sequence of bytes in order.
    fn write_bytes(&mut self, bytes: &[u8]) -> OneWireResult<(), Self::BusError> {
        for &byte in bytes {
            self.write_byte(byte)?;
        }
        Ok(())
    }

    /// Fills `buf` with consecutive bytes read from the bus.
    fn read_bytes(&mut self, buf: &mut [u8]) -> OneWireResult<(), Self::BusError> {
        for byte in buf.iter_mut() {
            *byte = self.read_byte()?;
        }
        Ok(())
    }

    /// Addresses devices on the 1-Wire bus.
    /// Resets the bus, then sends Match ROM with the address, or Skip ROM when `rom` is [`None`].
    ///
    /// Note: reads after a Skip ROM return garbage on a bus with more than one device.
    ///
    /// # Errors
    /// [`OneWireError::NoDevicePresent`] if nothing answers the reset, [`OneWireError::ShortCircuit`]
    /// if the line is shorted.
    fn address(&mut self, rom: Option<RomAddress>) -> OneWireResult<(), Self::BusError> {
        if presence(self)? == Presence::NoDevices {
            return Err(OneWireError::NoDevicePresent);
        }
        match rom {
            Some(rom) => {
                self.write_byte(ONEWIRE_MATCH_ROM_CMD)?;
                self.write_bytes(&rom.to_bytes())
            }
            None => self.write_byte(ONEWIRE_SKIP_ROM_CMD),
        }
    }
}

/// Classifies transport errors by whether the transport survives them.
pub trait TransportFault {
    /// The transport is gone (unplugged, closed, out of sync) and must be reopened.
    fn is_fatal(&self) -> bool {
        true
    }
}

/// Status reported by a 1-Wire bus reset.
pub trait OneWireStatus {
    /// At least one device answered the reset with a presence pulse.
    fn presence(&self) -> bool;

    /// The line was held low past the presence window.
    fn shortcircuit(&self) -> bool;

    /// The presence pulse signalled an alarm, when the transport can tell.
    fn alarm(&self) -> bool {
        false
    }

    /// Logic level of the line when the status was sampled, if known.
    fn logic_level(&self) -> Option<bool> {
        None
    }
}

/// Outcome of a reset/presence cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    /// Nothing answered the reset pulse.
    NoDevices,
    /// At least one device sent a presence pulse.
    DevicesPresent,
}

/// Issues a reset pulse and samples for a presence pulse.
///
/// # Errors
/// [`OneWireError::ShortCircuit`] when the adapter reports a shorted line.
pub fn presence<O: OneWire + ?Sized>(bus: &mut O) -> OneWireResult<Presence, O::BusError> {
    let status = bus.reset()?;
    if status.shortcircuit() {
        return Err(OneWireError::ShortCircuit);
    }
    Ok(if status.presence() {
        Presence::DevicesPresent
    } else {
        Presence::NoDevices
    })
}
