//! Device models for the [`SimBus`](embedded_onewire::sim::SimBus) test bench.
//!
//! Each model implements the function command layer of its part closely enough to run
//! the drivers of this crate against it, including the scratchpad handshakes, CRCs and
//! confirmation bytes. Fault switches corrupt specific responses.

use crate::{
    Family, MemoryLayout, PioStatus, Resolution, SwitchState, Temperature, ThermometerKind,
    family::DS2433_MEMORY,
    thermometer::{MISSION_IN_PROGRESS, THERMOCHRON_STATUS, THERMOCHRON_TEMPERATURE, ThermochronVersion},
};
use embedded_onewire::{OneWireCrc, OneWireCrc16, RomAddress, sim::SimDevice};
use std::{vec, vec::Vec};

const PIO_READ: u8 = 0xf5;

/// Output latches of a two channel switch. Pins follow their latch (no external load).
#[derive(Debug, Clone, Copy)]
struct Pio {
    latches: u8,
    corrupt: bool,
}

#[derive(Debug, Clone, Copy)]
enum PioOp {
    Read,
    Write { value: Option<u8> },
    Confirmed { sent: usize },
    Rejected,
}

impl Pio {
    fn new() -> Self {
        Self {
            latches: 0b11,
            corrupt: false,
        }
    }

    fn status(&self) -> u8 {
        let a = self.latches & 0x01 != 0;
        let b = self.latches & 0x02 != 0;
        let status = PioStatus::from_state(SwitchState {
            pio_a: a,
            latch_a: a,
            pio_b: b,
            latch_b: b,
        })
        .into_bits();
        if self.corrupt { status ^ 0x10 } else { status }
    }

    fn write(&mut self, op: PioOp, byte: u8) -> PioOp {
        match op {
            PioOp::Write { value: None } => PioOp::Write { value: Some(byte) },
            PioOp::Write { value: Some(value) } if byte == !value => {
                self.latches = value & 0x03;
                PioOp::Confirmed { sent: 0 }
            }
            PioOp::Write { .. } => PioOp::Rejected,
            other => other,
        }
    }

    fn read(&self, op: PioOp) -> (PioOp, u8) {
        match op {
            PioOp::Read => (op, self.status()),
            PioOp::Confirmed { sent: 0 } => (PioOp::Confirmed { sent: 1 }, 0xaa),
            PioOp::Confirmed { sent } => (PioOp::Confirmed { sent: sent + 1 }, self.status()),
            PioOp::Write { .. } | PioOp::Rejected => (op, 0xff),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum ThermOp {
    Idle,
    ReadScratch(usize),
    WriteScratch(usize),
    Pio(PioOp),
}

/// A DS18S20, DS1822, DS18B20, DS1825 or DS28EA00, chosen by the family code of the ROM.
pub struct SimThermometer {
    rom: RomAddress,
    kind: ThermometerKind,
    temperature: Temperature,
    register: i16,
    remain: u8,
    scratch: [u8; 3],
    eeprom: [u8; 3],
    pio: Option<Pio>,
    alarmed: bool,
    corrupt_crc: bool,
    op: ThermOp,
}

impl SimThermometer {
    /// A thermometer at `rom`, reading 85 °C until the first conversion.
    ///
    /// Families without a scratchpad thermometer are modelled as programmable parts.
    pub fn new(rom: RomAddress) -> Self {
        let family = Family::lookup(rom.family_code());
        let (kind, register) = match family.and_then(|f| f.thermometer) {
            Some(ThermometerKind::HalfDegree) => (ThermometerKind::HalfDegree, 0x00aa),
            _ => (ThermometerKind::Programmable, 0x0550),
        };
        let remain = 0x0c;
        let eeprom = [0x4b, 0x46, Resolution::Bits12.config()];
        Self {
            rom,
            kind,
            temperature: Temperature::from_num(25),
            register,
            remain,
            scratch: eeprom,
            eeprom,
            pio: family.and_then(|f| f.switch).map(|_| Pio::new()),
            alarmed: false,
            corrupt_crc: false,
            op: ThermOp::Idle,
        }
    }

    /// Temperature the next conversion measures.
    pub fn with_temperature(mut self, temperature: Temperature) -> Self {
        self.temperature = temperature;
        self
    }

    /// Sets the alarm flag seen by conditional searches.
    pub fn with_alarm(mut self, alarmed: bool) -> Self {
        self.alarmed = alarmed;
        self
    }

    /// Sends a scratchpad with a wrong CRC byte.
    pub fn with_corrupt_crc(mut self, corrupt: bool) -> Self {
        self.corrupt_crc = corrupt;
        self
    }

    fn convert(&mut self) {
        let bits = self.temperature.to_bits();
        match self.kind {
            ThermometerKind::HalfDegree => {
                let degrees = (bits + 4).div_euclid(16);
                self.register = degrees * 2;
                self.remain = (12 - (bits - degrees * 16)) as u8;
            }
            _ => {
                let resolution = Resolution::from_config(self.scratch[2]);
                self.register = bits & !resolution.undefined_bits();
            }
        }
    }

    fn scratchpad(&self) -> [u8; 9] {
        let [t0, t1] = self.register.to_le_bytes();
        let [th, tl, cfg] = self.scratch;
        let mut pad = match self.kind {
            ThermometerKind::HalfDegree => [t0, t1, th, tl, 0xff, 0xff, self.remain, 0x10, 0],
            _ => [t0, t1, th, tl, cfg, 0xff, 0x0c, 0x10, 0],
        };
        pad[8] = OneWireCrc::compute(&pad[..8]);
        if self.corrupt_crc {
            pad[8] ^= 0x01;
        }
        pad
    }
}

impl SimDevice for SimThermometer {
    fn rom(&self) -> RomAddress {
        self.rom
    }

    fn alarmed(&self) -> bool {
        self.alarmed
    }

    fn reset(&mut self) {
        self.op = ThermOp::Idle;
    }

    fn write_byte(&mut self, byte: u8) {
        self.op = match self.op {
            ThermOp::Idle => match byte {
                0x44 => {
                    self.convert();
                    ThermOp::Idle
                }
                0xbe => ThermOp::ReadScratch(0),
                0x4e => ThermOp::WriteScratch(0),
                0x48 => {
                    self.eeprom = self.scratch;
                    ThermOp::Idle
                }
                0xb8 => {
                    self.scratch = self.eeprom;
                    ThermOp::Idle
                }
                PIO_READ if self.pio.is_some() => ThermOp::Pio(PioOp::Read),
                0xa5 if self.pio.is_some() => ThermOp::Pio(PioOp::Write { value: None }),
                _ => ThermOp::Idle,
            },
            ThermOp::WriteScratch(index) => {
                let limit = match self.kind {
                    ThermometerKind::HalfDegree => 2,
                    _ => 3,
                };
                match index {
                    0 | 1 => self.scratch[index] = byte,
                    2 if index < limit => self.scratch[2] = (byte & 0x60) | 0x1f,
                    _ => {}
                }
                ThermOp::WriteScratch(index + 1)
            }
            ThermOp::Pio(op) => match self.pio.as_mut() {
                Some(pio) => ThermOp::Pio(pio.write(op, byte)),
                None => ThermOp::Idle,
            },
            op => op,
        };
    }

    fn read_byte(&mut self) -> u8 {
        match self.op {
            ThermOp::ReadScratch(index) => {
                self.op = ThermOp::ReadScratch(index + 1);
                self.scratchpad().get(index).copied().unwrap_or(0xff)
            }
            ThermOp::Pio(op) => match self.pio {
                Some(pio) => {
                    let (op, byte) = pio.read(op);
                    self.op = ThermOp::Pio(op);
                    byte
                }
                None => 0xff,
            },
            _ => 0xff,
        }
    }
}

#[derive(Debug, Clone)]
enum MemOp {
    Idle,
    Header { cmd: u8, bytes: [u8; 2], count: usize },
    WriteData { offset: usize, crc: OneWireCrc16, full: bool, crc_sent: usize },
    Output { bytes: Vec<u8>, index: usize },
    CopyAuth { bytes: [u8; 3], count: usize },
    Copied,
    ReadMemory { address: usize },
}

/// A DS2423, DS2433, DS2431 or DS1921 memory, chosen by the family code of the ROM.
///
/// Memory starts out zeroed.
pub struct SimEeprom {
    rom: RomAddress,
    layout: MemoryLayout,
    memory: Vec<u8>,
    scratch: Vec<u8>,
    ta: u16,
    es: u8,
    corrupt_scratchpad: bool,
    corrupt_crc: bool,
    op: MemOp,
}

impl SimEeprom {
    /// An EEPROM at `rom`. Families without memory get a DS2433 layout.
    pub fn new(rom: RomAddress) -> Self {
        let layout = Family::lookup(rom.family_code())
            .and_then(|f| f.memory)
            .unwrap_or(DS2433_MEMORY);
        Self {
            rom,
            layout,
            memory: vec![0; layout.size as usize],
            scratch: vec![0xff; layout.page as usize],
            ta: 0,
            es: 0,
            corrupt_scratchpad: false,
            corrupt_crc: false,
            op: MemOp::Idle,
        }
    }

    /// Flips a bit of the first data byte sent by Read Scratchpad.
    pub fn with_corrupt_scratchpad(mut self, corrupt: bool) -> Self {
        self.corrupt_scratchpad = corrupt;
        self
    }

    /// Sends wrong CRC16 bytes.
    pub fn with_corrupt_crc(mut self, corrupt: bool) -> Self {
        self.corrupt_crc = corrupt;
        self
    }

    fn mask(&self) -> usize {
        self.layout.page as usize - 1
    }

    fn inverted(&self, crc: u16) -> [u8; 2] {
        let mut bytes = (!crc).to_le_bytes();
        if self.corrupt_crc {
            bytes[0] ^= 0x01;
        }
        bytes
    }

    fn scratchpad_output(&self) -> Vec<u8> {
        let [ta1, ta2] = self.ta.to_le_bytes();
        let start = self.ta as usize & self.mask();
        let end = (self.es as usize & self.mask()).max(start);
        let mut out = vec![ta1, ta2, self.es];
        out.extend_from_slice(&self.scratch[start..=end]);
        if self.layout.whole_pages {
            let mut bytes = vec![0xaa];
            bytes.extend_from_slice(&out);
            let crc = OneWireCrc16::compute(&bytes);
            out.extend_from_slice(&self.inverted(crc));
        }
        if self.corrupt_scratchpad {
            out[3] ^= 0x01;
        }
        out
    }
}

impl SimDevice for SimEeprom {
    fn rom(&self) -> RomAddress {
        self.rom
    }

    fn reset(&mut self) {
        self.op = MemOp::Idle;
    }

    fn write_byte(&mut self, byte: u8) {
        let op = core::mem::replace(&mut self.op, MemOp::Idle);
        self.op = match op {
            MemOp::Idle => match byte {
                0x0f | 0xf0 => MemOp::Header {
                    cmd: byte,
                    bytes: [0; 2],
                    count: 0,
                },
                0xaa => MemOp::Output {
                    bytes: self.scratchpad_output(),
                    index: 0,
                },
                cmd if cmd == self.layout.copy_cmd => MemOp::CopyAuth {
                    bytes: [0; 3],
                    count: 0,
                },
                _ => MemOp::Idle,
            },
            MemOp::Header { cmd, mut bytes, count } => {
                bytes[count] = byte;
                if count == 0 {
                    MemOp::Header { cmd, bytes, count: 1 }
                } else if cmd == 0xf0 {
                    MemOp::ReadMemory {
                        address: u16::from_le_bytes(bytes) as usize,
                    }
                } else {
                    self.ta = u16::from_le_bytes(bytes);
                    self.es = (self.ta as usize & self.mask()) as u8;
                    let mut crc = OneWireCrc16::default();
                    [0x0f, bytes[0], bytes[1]].iter().for_each(|&b| crc.update(b));
                    MemOp::WriteData {
                        offset: self.ta as usize & self.mask(),
                        crc,
                        full: false,
                        crc_sent: 0,
                    }
                }
            }
            MemOp::WriteData { offset, mut crc, full, crc_sent } if !full => {
                self.scratch[offset] = byte;
                self.es = offset as u8;
                crc.update(byte);
                let full = offset == self.mask();
                MemOp::WriteData {
                    offset: if full { offset } else { offset + 1 },
                    crc,
                    full,
                    crc_sent,
                }
            }
            MemOp::CopyAuth { mut bytes, count } => {
                bytes[count] = byte;
                if count < 2 {
                    MemOp::CopyAuth { bytes, count: count + 1 }
                } else if bytes == [self.ta.to_le_bytes()[0], self.ta.to_le_bytes()[1], self.es] {
                    let start = self.ta as usize & self.mask();
                    let end = self.es as usize & self.mask();
                    let base = self.ta as usize - start;
                    if end >= start && base + end < self.memory.len() {
                        self.memory[base + start..=base + end].copy_from_slice(&self.scratch[start..=end]);
                        self.es |= 0x80;
                    }
                    MemOp::Copied
                } else {
                    MemOp::Idle
                }
            }
            other => other,
        };
    }

    fn read_byte(&mut self) -> u8 {
        let op = core::mem::replace(&mut self.op, MemOp::Idle);
        let (op, byte) = match op {
            MemOp::WriteData { offset, crc, full: true, crc_sent } => {
                let byte = self.inverted(crc.value()).get(crc_sent).copied().unwrap_or(0xff);
                (
                    MemOp::WriteData {
                        offset,
                        crc,
                        full: true,
                        crc_sent: crc_sent + 1,
                    },
                    byte,
                )
            }
            MemOp::Output { bytes, index } => {
                let byte = bytes.get(index).copied().unwrap_or(0xff);
                (MemOp::Output { bytes, index: index + 1 }, byte)
            }
            MemOp::Copied => (MemOp::Copied, 0xaa),
            MemOp::ReadMemory { address } => {
                let byte = self.memory.get(address).copied().unwrap_or(0xff);
                (MemOp::ReadMemory { address: address + 1 }, byte)
            }
            other => (other, 0xff),
        };
        self.op = op;
        byte
    }
}

/// A DS1921 Thermochron: its SRAM, and the temperature and status registers of the
/// register page. No mission is running unless asked for.
pub struct SimThermochron {
    memory: SimEeprom,
    temperature: Temperature,
}

impl SimThermochron {
    /// A Thermochron at `rom`, measuring 25 °C.
    ///
    /// The version, and with it the register scale, comes from the serial number.
    pub fn new(rom: RomAddress) -> Self {
        let mut memory = SimEeprom::new(rom);
        memory.memory.resize(THERMOCHRON_STATUS as usize + 0x0c, 0);
        Self {
            memory,
            temperature: Temperature::from_num(25),
        }
    }

    /// Temperature the next conversion measures.
    pub fn with_temperature(mut self, temperature: Temperature) -> Self {
        self.temperature = temperature;
        self
    }

    /// Sets the mission in progress flag of the status register.
    pub fn with_mission(mut self, running: bool) -> Self {
        let status = &mut self.memory.memory[THERMOCHRON_STATUS as usize];
        if running {
            *status |= MISSION_IN_PROGRESS;
        } else {
            *status &= !MISSION_IN_PROGRESS;
        }
        self
    }

    fn convert(&mut self) {
        let Some(version) = ThermochronVersion::of(self.memory.rom) else {
            return;
        };
        let steps = (self.temperature.to_bits() - version.lowest) / version.step;
        self.memory.memory[THERMOCHRON_TEMPERATURE as usize] = steps.clamp(0, 0xff) as u8;
    }
}

impl SimDevice for SimThermochron {
    fn rom(&self) -> RomAddress {
        self.memory.rom
    }

    fn reset(&mut self) {
        self.memory.reset();
    }

    fn write_byte(&mut self, byte: u8) {
        if byte == 0x44 && matches!(self.memory.op, MemOp::Idle) {
            self.convert();
        } else {
            self.memory.write_byte(byte);
        }
    }

    fn read_byte(&mut self) -> u8 {
        self.memory.read_byte()
    }
}

/// A DS2413 dual channel switch with both outputs off.
pub struct SimSwitch {
    rom: RomAddress,
    pio: Pio,
    op: Option<PioOp>,
}

impl SimSwitch {
    /// A switch at `rom`.
    pub fn new(rom: RomAddress) -> Self {
        Self {
            rom,
            pio: Pio::new(),
            op: None,
        }
    }

    /// Sends status bytes whose complement nibble is wrong.
    pub fn with_corrupt_status(mut self, corrupt: bool) -> Self {
        self.pio.corrupt = corrupt;
        self
    }
}

impl SimDevice for SimSwitch {
    fn rom(&self) -> RomAddress {
        self.rom
    }

    fn reset(&mut self) {
        self.op = None;
    }

    fn write_byte(&mut self, byte: u8) {
        self.op = match self.op {
            None => match byte {
                PIO_READ => Some(PioOp::Read),
                0x5a => Some(PioOp::Write { value: None }),
                _ => None,
            },
            Some(op) => Some(self.pio.write(op, byte)),
        };
    }

    fn read_byte(&mut self) -> u8 {
        match self.op {
            Some(op) => {
                let (op, byte) = self.pio.read(op);
                self.op = Some(op);
                byte
            }
            None => 0xff,
        }
    }
}
