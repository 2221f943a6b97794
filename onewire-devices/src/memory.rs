use crate::{DeviceError, DeviceResult, Family, MemoryLayout};
use embedded_hal::delay::DelayNs;
use embedded_onewire::{OneWire, OneWireCrc16, RomAddress};
use log::{debug, trace};

const WRITE_SCRATCH: u8 = 0x0f;
const READ_SCRATCH: u8 = 0xaa;
const READ_MEMORY: u8 = 0xf0;
/// Largest scratchpad of the supported families.
const MAX_PAGE: usize = 32;
/// Partial byte flag in the E/S byte.
const ES_PARTIAL: u8 = 0x20;

/// An EEPROM (or battery-backed RAM) device on the bus.
///
/// Writes go through the scratchpad one page at a time: write scratchpad, read it back,
/// then copy it to memory with the authorization bytes the device just reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Eeprom {
    rom: RomAddress,
    layout: MemoryLayout,
}

impl Eeprom {
    /// An EEPROM at `rom`, if its family has user memory.
    pub fn new(rom: RomAddress) -> Option<Self> {
        let layout = Family::lookup(rom.family_code())?.memory?;
        Some(Self { rom, layout })
    }

    /// Device address.
    pub fn rom(&self) -> RomAddress {
        self.rom
    }

    /// Memory layout.
    pub fn layout(&self) -> MemoryLayout {
        self.layout
    }

    fn check_range<E>(&self, offset: u16, len: usize) -> DeviceResult<(), E> {
        match (offset as usize).checked_add(len) {
            Some(end) if end <= self.layout.size as usize => Ok(()),
            _ => Err(DeviceError::OutOfRange),
        }
    }

    /// Reads `buf.len()` bytes starting at `offset`. Reads are not limited to a page.
    pub fn read<O: OneWire>(&self, bus: &mut O, offset: u16, buf: &mut [u8]) -> DeviceResult<(), O::BusError> {
        self.check_range(offset, buf.len())?;
        if buf.is_empty() {
            return Ok(());
        }
        let [ta1, ta2] = offset.to_le_bytes();
        bus.address(Some(self.rom))?;
        bus.write_bytes(&[READ_MEMORY, ta1, ta2])?;
        bus.read_bytes(buf)?;
        trace!("{}: read {} bytes at {offset:#06x}", self.rom, buf.len());
        Ok(())
    }

    /// Writes `data` starting at `offset`, one scratchpad page at a time.
    pub fn write<O: OneWire, D: DelayNs>(
        &self,
        bus: &mut O,
        delay: &mut D,
        offset: u16,
        data: &[u8],
    ) -> DeviceResult<(), O::BusError> {
        self.check_range(offset, data.len())?;
        let page = self.layout.page as usize;
        let mut address = offset as usize;
        let mut rest = data;
        while !rest.is_empty() {
            let room = page - address % page;
            let (chunk, tail) = rest.split_at(room.min(rest.len()));
            if self.layout.whole_pages && chunk.len() != page {
                self.write_partial_page(bus, delay, address as u16, chunk)?;
            } else {
                self.write_page(bus, delay, address as u16, chunk)?;
            }
            address += chunk.len();
            rest = tail;
        }
        debug!("{}: wrote {} bytes at {offset:#06x}", self.rom, data.len());
        Ok(())
    }

    /// Pads a partial row with the bytes already in memory.
    fn write_partial_page<O: OneWire, D: DelayNs>(
        &self,
        bus: &mut O,
        delay: &mut D,
        address: u16,
        chunk: &[u8],
    ) -> DeviceResult<(), O::BusError> {
        let page = self.layout.page as usize;
        let base = address - address % self.layout.page;
        let mut row = [0u8; MAX_PAGE];
        let row = &mut row[..page];
        self.read(bus, base, row)?;
        let start = (address - base) as usize;
        row[start..start + chunk.len()].copy_from_slice(chunk);
        self.write_page(bus, delay, base, row)
    }

    /// Scratchpad cycle for data that does not cross a page boundary.
    fn write_page<O: OneWire, D: DelayNs>(
        &self,
        bus: &mut O,
        delay: &mut D,
        address: u16,
        chunk: &[u8],
    ) -> DeviceResult<(), O::BusError> {
        let page = self.layout.page as usize;
        let [ta1, ta2] = address.to_le_bytes();
        let header = [WRITE_SCRATCH, ta1, ta2];

        bus.address(Some(self.rom))?;
        bus.write_bytes(&header)?;
        bus.write_bytes(chunk)?;
        if (address as usize + chunk.len()) % page == 0 {
            let mut inverted = [0u8; 2];
            bus.read_bytes(&mut inverted)?;
            let mut crc = OneWireCrc16::default();
            header.iter().chain(chunk).for_each(|&b| crc.update(b));
            if crc.value() != !u16::from_le_bytes(inverted) {
                debug!("{}: scratchpad write CRC16 mismatch at {address:#06x}", self.rom);
                return Err(DeviceError::Crc);
            }
        }

        bus.address(Some(self.rom))?;
        bus.write_byte(READ_SCRATCH)?;
        let mut status = [0u8; 3];
        bus.read_bytes(&mut status)?;
        let [rta1, rta2, es] = status;
        let mut readback = [0u8; MAX_PAGE];
        let readback = &mut readback[..chunk.len()];
        bus.read_bytes(readback)?;
        if self.layout.whole_pages {
            let mut inverted = [0u8; 2];
            bus.read_bytes(&mut inverted)?;
            let mut crc = OneWireCrc16::default();
            [READ_SCRATCH, rta1, rta2, es]
                .iter()
                .chain(readback.iter())
                .for_each(|&b| crc.update(b));
            if crc.value() != !u16::from_le_bytes(inverted) {
                return Err(DeviceError::Crc);
            }
        }
        if status == [0xff; 3] {
            return Err(DeviceError::NoResponse);
        }
        let end = ((address as usize + chunk.len() - 1) % page) as u8;
        if [rta1, rta2] != [ta1, ta2] || es & (page - 1) as u8 != end || es & ES_PARTIAL != 0 {
            debug!("{}: scratchpad status {status:02x?} for {address:#06x}", self.rom);
            return Err(DeviceError::UnexpectedResponse);
        }
        if readback != chunk {
            return Err(DeviceError::VerifyFailed);
        }

        bus.address(Some(self.rom))?;
        bus.write_bytes(&[self.layout.copy_cmd, ta1, ta2, es])?;
        delay.delay_ms(self.layout.program_ms);
        match bus.read_byte()? {
            0xaa | 0x55 => Ok(()),
            other => {
                debug!("{}: copy at {address:#06x} not confirmed ({other:#04x})", self.rom);
                Err(DeviceError::VerifyFailed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimEeprom;
    use embedded_hal_mock::eh1::delay::NoopDelay;
    use embedded_onewire::sim::{SimBus, SimEvent};
    use std::{vec, vec::Vec};

    fn setup(family: u8) -> (SimBus, Eeprom) {
        let rom = RomAddress::new(family, [0x10, 0x20, 0x30, 0x40, 0x50, 0x60]);
        let bus = SimBus::new();
        bus.attach(SimEeprom::new(rom));
        (bus, Eeprom::new(rom).unwrap())
    }

    /// Function commands sent to `eeprom`: the byte right after its Match ROM sequence.
    fn commands(trace: &[SimEvent], eeprom: &Eeprom, cmd: u8) -> usize {
        let mut selected = vec![SimEvent::Write(0x55)];
        selected.extend(eeprom.rom().to_bytes().map(SimEvent::Write));
        selected.push(SimEvent::Write(cmd));
        trace.windows(selected.len()).filter(|w| *w == &selected[..]).count()
    }

    #[test]
    fn only_memory_families() {
        assert!(Eeprom::new(RomAddress::new(0x23, [1, 0, 0, 0, 0, 0])).is_some());
        assert!(Eeprom::new(RomAddress::new(0x28, [1, 0, 0, 0, 0, 0])).is_none());
    }

    #[test]
    fn write_spanning_pages() {
        let (mut bus, eeprom) = setup(0x23);
        let data: Vec<u8> = (0..70u8).collect();
        eeprom.write(&mut bus, &mut NoopDelay::new(), 20, &data).unwrap();
        let mut back = [0u8; 70];
        eeprom.read(&mut bus, 20, &mut back).unwrap();
        assert_eq!(&back[..], &data[..]);
        let mut before = [0u8; 20];
        eeprom.read(&mut bus, 0, &mut before).unwrap();
        assert_eq!(before, [0u8; 20]);
    }

    #[test]
    fn page_split_count() {
        let (mut bus, eeprom) = setup(0x23);
        let data = [0x5a; 40];
        bus.clear_trace();
        eeprom.write(&mut bus, &mut NoopDelay::new(), 30, &data).unwrap();
        // 30..32, 32..64, 64..70
        assert_eq!(commands(&bus.trace(), &eeprom, WRITE_SCRATCH), 3);
        assert_eq!(commands(&bus.trace(), &eeprom, 0x55), 3);
    }

    #[test]
    fn thermochron_sram() {
        let (mut bus, eeprom) = setup(0x21);
        assert_eq!(eeprom.layout().copy_cmd, 0x55);
        bus.clear_trace();
        eeprom.write(&mut bus, &mut NoopDelay::new(), 500, &[1, 2, 3, 4]).unwrap();
        assert_eq!(commands(&bus.trace(), &eeprom, 0x55), 1);
        let mut back = [0u8; 4];
        eeprom.read(&mut bus, 500, &mut back).unwrap();
        assert_eq!(back, [1, 2, 3, 4]);
    }

    #[test]
    fn row_device_read_modify_write() {
        let (mut bus, eeprom) = setup(0x2d);
        let mut delay = NoopDelay::new();
        eeprom.write(&mut bus, &mut delay, 0, &[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        eeprom.write(&mut bus, &mut delay, 3, &[0xa0, 0xa1, 0xa2, 0xa3, 0xa4, 0xa5, 0xa6]).unwrap();
        let mut back = [0u8; 16];
        eeprom.read(&mut bus, 0, &mut back).unwrap();
        assert_eq!(
            back,
            [1, 2, 3, 0xa0, 0xa1, 0xa2, 0xa3, 0xa4, 0xa5, 0xa6, 0, 0, 0, 0, 0, 0]
        );
    }

    #[test]
    fn rows_are_copied_whole() {
        let (mut bus, eeprom) = setup(0x2d);
        bus.clear_trace();
        eeprom.write(&mut bus, &mut NoopDelay::new(), 6, &[9; 4]).unwrap();
        assert_eq!(commands(&bus.trace(), &eeprom, 0x55), 2);
    }

    #[test]
    fn out_of_range() {
        let (mut bus, eeprom) = setup(0x2d);
        let mut buf = [0u8; 2];
        assert!(matches!(eeprom.read(&mut bus, 127, &mut buf), Err(DeviceError::OutOfRange)));
        assert!(matches!(
            eeprom.write(&mut bus, &mut NoopDelay::new(), 0xffff, &[1, 2]),
            Err(DeviceError::OutOfRange)
        ));
        assert!(bus.trace().is_empty());
        eeprom.read(&mut bus, 126, &mut buf).unwrap();
    }

    #[test]
    fn scratchpad_corruption_detected() {
        let rom = RomAddress::new(0x23, [1, 1, 1, 1, 1, 1]);
        let mut bus = SimBus::new();
        bus.attach(SimEeprom::new(rom).with_corrupt_scratchpad(true));
        let eeprom = Eeprom::new(rom).unwrap();
        assert!(matches!(
            eeprom.write(&mut bus, &mut NoopDelay::new(), 0, &[1, 2, 3]),
            Err(DeviceError::VerifyFailed)
        ));
        let mut back = [0xffu8; 3];
        eeprom.read(&mut bus, 0, &mut back).unwrap();
        assert_eq!(back, [0, 0, 0]);
    }

    #[test]
    fn crc16_checked_on_full_page() {
        let rom = RomAddress::new(0x2d, [2, 2, 2, 2, 2, 2]);
        let mut bus = SimBus::new();
        bus.attach(SimEeprom::new(rom).with_corrupt_crc(true));
        let eeprom = Eeprom::new(rom).unwrap();
        assert!(matches!(
            eeprom.write(&mut bus, &mut NoopDelay::new(), 8, &[7; 8]),
            Err(DeviceError::Crc)
        ));
    }
}
