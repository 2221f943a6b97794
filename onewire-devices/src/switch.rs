use crate::{DeviceError, DeviceResult, Family, SwitchLayout};
use bitfield_struct::bitfield;
use embedded_onewire::{OneWire, RomAddress};
use log::{debug, trace};

const PIO_READ: u8 = 0xf5;
const PIO_CONFIRM: u8 = 0xaa;
/// Unused output bits must be written as ones.
const PIO_UNUSED: u8 = 0xfc;

/// # PIO status byte
///
/// Returned by PIO Access Read and after a PIO Access Write. The upper nibble is the
/// complement of the lower one.
#[bitfield(u8)]
pub struct PioStatus {
    /// Logic level sensed on PIO A.
    pub pio_a: bool,
    /// PIO A output latch; set means the output transistor is off.
    pub latch_a: bool,
    /// Logic level sensed on PIO B.
    pub pio_b: bool,
    /// PIO B output latch.
    pub latch_b: bool,
    /// Complement of the four bits above.
    #[bits(4)]
    pub complement: u8,
}

impl PioStatus {
    /// A status with the complement nibble filled in.
    pub fn from_state(state: SwitchState) -> Self {
        let low = PioStatus::new()
            .with_pio_a(state.pio_a)
            .with_latch_a(state.latch_a)
            .with_pio_b(state.pio_b)
            .with_latch_b(state.latch_b)
            .into_bits();
        PioStatus::from_bits(low | (!low << 4))
    }

    /// The upper nibble is the complement of the lower nibble.
    pub fn is_consistent(&self) -> bool {
        let bits = self.into_bits();
        bits >> 4 == !bits & 0x0f
    }

    /// Pin and latch states.
    pub fn state(&self) -> SwitchState {
        SwitchState {
            pio_a: self.pio_a(),
            latch_a: self.latch_a(),
            pio_b: self.pio_b(),
            latch_b: self.latch_b(),
        }
    }
}

/// Decoded PIO status of a two channel switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SwitchState {
    /// Logic level on PIO A.
    pub pio_a: bool,
    /// PIO A latch (`true` = output off, pin released).
    pub latch_a: bool,
    /// Logic level on PIO B.
    pub pio_b: bool,
    /// PIO B latch.
    pub latch_b: bool,
}

/// A two channel addressable switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Switch {
    rom: RomAddress,
    layout: SwitchLayout,
}

impl Switch {
    /// A switch at `rom`, if its family has PIO outputs.
    pub fn new(rom: RomAddress) -> Option<Self> {
        let layout = Family::lookup(rom.family_code())?.switch?;
        Some(Self { rom, layout })
    }

    /// Device address.
    pub fn rom(&self) -> RomAddress {
        self.rom
    }

    fn status<E>(&self, byte: u8) -> DeviceResult<SwitchState, E> {
        let status = PioStatus::from_bits(byte);
        if byte == 0xff {
            return Err(DeviceError::NoResponse);
        }
        if !status.is_consistent() {
            debug!("{}: inconsistent PIO status {byte:#04x}", self.rom);
            return Err(DeviceError::UnexpectedResponse);
        }
        Ok(status.state())
    }

    /// Reads the pin and latch states.
    pub fn read<O: OneWire>(&self, bus: &mut O) -> DeviceResult<SwitchState, O::BusError> {
        bus.address(Some(self.rom))?;
        bus.write_byte(PIO_READ)?;
        let byte = bus.read_byte()?;
        trace!("{}: PIO status {byte:#04x}", self.rom);
        self.status(byte)
    }

    /// Sets the output latches from bit 0 (PIO A) and bit 1 (PIO B) of `latches` and
    /// returns the status the device reports afterwards.
    pub fn write<O: OneWire>(&self, bus: &mut O, latches: u8) -> DeviceResult<SwitchState, O::BusError> {
        let value = PIO_UNUSED | (latches & !PIO_UNUSED);
        bus.address(Some(self.rom))?;
        bus.write_bytes(&[self.layout.write_cmd, value, !value])?;
        let mut answer = [0u8; 2];
        bus.read_bytes(&mut answer)?;
        let [confirm, status] = answer;
        if confirm != PIO_CONFIRM {
            debug!("{}: PIO write not confirmed ({confirm:#04x})", self.rom);
            return Err(if confirm == 0xff {
                DeviceError::NoResponse
            } else {
                DeviceError::VerifyFailed
            });
        }
        let state = self.status(status)?;
        if (state.latch_a, state.latch_b) != (value & 0x01 != 0, value & 0x02 != 0) {
            return Err(DeviceError::VerifyFailed);
        }
        Ok(state)
    }
}
