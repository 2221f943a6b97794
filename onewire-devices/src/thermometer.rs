use crate::{DeviceError, DeviceResult, Family, ThermometerKind};
use embedded_hal::delay::DelayNs;
use embedded_onewire::{OneWire, OneWireCrc, RomAddress};
use fixed::types::I12F4;
use log::{debug, trace};

const READ_SCRATCH: u8 = 0xbe;
const WRITE_SCRATCH: u8 = 0x4e;
const COPY_SCRATCH: u8 = 0x48;
const START_CONV: u8 = 0x44;
const READ_MEMORY: u8 = 0xf0;
/// EEPROM write time of Copy Scratchpad.
const COPY_MS: u32 = 10;
/// Range of the DS18S20 register in half degrees, -55 to +125 °C.
const HALF_DEGREE_RANGE: core::ops::RangeInclusive<i16> = -110..=250;

/// Temperature register of the DS1921.
pub(crate) const THERMOCHRON_TEMPERATURE: u16 = 0x0211;
/// Status register of the DS1921.
pub(crate) const THERMOCHRON_STATUS: u16 = 0x0214;
/// Mission in progress flag of the status register.
pub(crate) const MISSION_IN_PROGRESS: u8 = 1 << 5;

/// Temperature in °C with 1/16 °C resolution.
pub type Temperature = I12F4;

/// Conversion resolution of programmable thermometers.
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum Resolution {
    /// 0.5 °C, 93.75 ms conversion.
    Bits9 = 0x1f,
    /// 0.25 °C, 187.5 ms conversion.
    Bits10 = 0x3f,
    /// 0.125 °C, 375 ms conversion.
    Bits11 = 0x5f,
    /// 0.0625 °C, 750 ms conversion.
    #[default]
    Bits12 = 0x7f,
}

impl Resolution {
    /// Decodes the R1/R0 bits of a configuration register. The other bits are ignored.
    pub fn from_config(config: u8) -> Self {
        match (config >> 5) & 0x03 {
            0 => Self::Bits9,
            1 => Self::Bits10,
            2 => Self::Bits11,
            _ => Self::Bits12,
        }
    }

    /// Configuration register value selecting this resolution.
    pub fn config(self) -> u8 {
        self as u8
    }

    /// Worst case conversion time in microseconds.
    pub fn conversion_us(self) -> u32 {
        match self {
            Self::Bits9 => 93_750,
            Self::Bits10 => 187_500,
            Self::Bits11 => 375_000,
            Self::Bits12 => 750_000,
        }
    }

    /// Low bits of the temperature register that are undefined at this resolution.
    pub(crate) fn undefined_bits(self) -> i16 {
        match self {
            Self::Bits9 => 0b111,
            Self::Bits10 => 0b11,
            Self::Bits11 => 0b1,
            Self::Bits12 => 0,
        }
    }
}

/// Scale and conversion time of one DS1921 version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ThermochronVersion {
    /// Serial number bits 44 to 55.
    pub(crate) id: u16,
    /// Temperature of register value 0, in 1/16 °C.
    pub(crate) lowest: i16,
    /// Register step, in 1/16 °C.
    pub(crate) step: i16,
    pub(crate) conversion_ms: u32,
}

const fn version(id: u16, lowest: i16, step: i16, conversion_ms: u32) -> ThermochronVersion {
    ThermochronVersion {
        id,
        lowest,
        step,
        conversion_ms,
    }
}

/// Known versions, ordered by id: G, the four L ranges, Z and H.
static THERMOCHRON_VERSIONS: &[ThermochronVersion] = &[
    version(0x000, -640, 8, 90),
    version(0x064, -640, 8, 300),
    version(0x15c, -640, 8, 300),
    version(0x254, -640, 8, 300),
    version(0x34c, -640, 8, 300),
    version(0x3b2, -88, 2, 360),
    version(0x4f2, 232, 2, 360),
];

impl ThermochronVersion {
    /// The version of the DS1921 at `rom`, if it is a known one.
    pub(crate) fn of(rom: RomAddress) -> Option<Self> {
        let bytes = rom.to_bytes();
        let id = (bytes[5] >> 4) as u16 | (bytes[6] as u16) << 4;
        THERMOCHRON_VERSIONS
            .binary_search_by_key(&id, |v| v.id)
            .ok()
            .map(|index| THERMOCHRON_VERSIONS[index])
    }

    pub(crate) fn decode(self, raw: u8) -> Temperature {
        Temperature::from_bits(self.lowest + raw as i16 * self.step)
    }
}

/// Alarm limits and resolution held in the scratchpad.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemperatureConfig {
    /// Upper alarm limit (TH), °C.
    pub high: i8,
    /// Lower alarm limit (TL), °C.
    pub low: i8,
    /// Conversion resolution; `None` for fixed resolution parts.
    pub resolution: Option<Resolution>,
}

/// The 9 byte scratchpad of a thermometer, CRC already checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scratchpad([u8; 9]);

impl Scratchpad {
    /// Wraps raw scratchpad bytes after checking their CRC8.
    pub fn new<E>(bytes: [u8; 9]) -> DeviceResult<Self, E> {
        if bytes.iter().all(|&b| b == 0xff) {
            return Err(DeviceError::NoResponse);
        }
        if !OneWireCrc::validate(&bytes) {
            return Err(DeviceError::Crc);
        }
        Ok(Self(bytes))
    }

    /// Raw bytes, CRC included.
    pub fn bytes(&self) -> &[u8; 9] {
        &self.0
    }

    /// Raw temperature register.
    pub fn raw_temperature(&self) -> i16 {
        i16::from_le_bytes([self.0[0], self.0[1]])
    }

    /// Decodes the temperature register according to the register layout.
    pub fn temperature(&self, kind: ThermometerKind) -> Temperature {
        let raw = self.raw_temperature();
        match kind {
            ThermometerKind::HalfDegree => {
                let remain = self.0[6] as i16;
                let per_c = self.0[7] as i16;
                if per_c == 0 {
                    return Temperature::from_bits(raw.wrapping_mul(8));
                }
                // T = TEMP_READ - 0.25 + (COUNT_PER_C - COUNT_REMAIN) / COUNT_PER_C
                let fraction = (per_c - remain) * 16 / per_c;
                let sixteenths = (raw & !1).wrapping_mul(8).wrapping_sub(4).wrapping_add(fraction);
                Temperature::from_bits(sixteenths)
            }
            ThermometerKind::Programmable | ThermometerKind::Thermochron => {
                let resolution = Resolution::from_config(self.0[4]);
                Temperature::from_bits(raw & !resolution.undefined_bits())
            }
        }
    }

    /// Alarm limits and resolution.
    pub fn config(&self, kind: ThermometerKind) -> TemperatureConfig {
        TemperatureConfig {
            high: self.0[2] as i8,
            low: self.0[3] as i8,
            resolution: match kind {
                ThermometerKind::HalfDegree | ThermometerKind::Thermochron => None,
                ThermometerKind::Programmable => Some(Resolution::from_config(self.0[4])),
            },
        }
    }
}

/// A temperature sensor on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thermometer {
    rom: RomAddress,
    kind: ThermometerKind,
}

impl Thermometer {
    /// A thermometer at `rom`, if its family measures temperature.
    pub fn new(rom: RomAddress) -> Option<Self> {
        let kind = Family::lookup(rom.family_code())?.thermometer?;
        Some(Self { rom, kind })
    }

    /// Device address.
    pub fn rom(&self) -> RomAddress {
        self.rom
    }

    /// Register layout.
    pub fn kind(&self) -> ThermometerKind {
        self.kind
    }

    /// Reads and checks the scratchpad.
    pub fn read_scratchpad<O: OneWire>(&self, bus: &mut O) -> DeviceResult<Scratchpad, O::BusError> {
        bus.address(Some(self.rom))?;
        bus.write_byte(READ_SCRATCH)?;
        let mut buf = [0u8; 9];
        bus.read_bytes(&mut buf)?;
        trace!("{}: scratchpad {buf:02x?}", self.rom);
        Scratchpad::new(buf)
    }

    /// Current alarm limits and resolution. The DS1921 has neither.
    pub fn read_config<O: OneWire>(&self, bus: &mut O) -> DeviceResult<TemperatureConfig, O::BusError> {
        if self.kind == ThermometerKind::Thermochron {
            return Err(DeviceError::Unsupported);
        }
        Ok(self.read_scratchpad(bus)?.config(self.kind))
    }

    /// Runs a conversion and reads the result.
    ///
    /// The scratchpad is read first to learn the configured resolution, which sets how
    /// long the conversion takes. A DS1921 is refused while a mission runs.
    pub fn read_temperature<O: OneWire, D: DelayNs>(
        &self,
        bus: &mut O,
        delay: &mut D,
    ) -> DeviceResult<Temperature, O::BusError> {
        let wait_us = match self.kind {
            ThermometerKind::HalfDegree => Resolution::Bits12.conversion_us(),
            ThermometerKind::Programmable => {
                Resolution::from_config(self.read_scratchpad(bus)?.bytes()[4]).conversion_us()
            }
            ThermometerKind::Thermochron => return self.read_thermochron(bus, delay),
        };
        bus.address(Some(self.rom))?;
        bus.write_byte(START_CONV)?;
        delay.delay_us(wait_us);
        let scratchpad = self.read_scratchpad(bus)?;
        if self.kind == ThermometerKind::HalfDegree
            && !HALF_DEGREE_RANGE.contains(&scratchpad.raw_temperature())
        {
            debug!("{}: register {:#06x} out of range", self.rom, scratchpad.raw_temperature());
            return Err(DeviceError::UnexpectedResponse);
        }
        let temperature = scratchpad.temperature(self.kind);
        debug!("{}: {temperature} °C", self.rom);
        Ok(temperature)
    }

    fn read_thermochron<O: OneWire, D: DelayNs>(
        &self,
        bus: &mut O,
        delay: &mut D,
    ) -> DeviceResult<Temperature, O::BusError> {
        let Some(version) = ThermochronVersion::of(self.rom) else {
            debug!("{}: unknown DS1921 version", self.rom);
            return Err(DeviceError::Unsupported);
        };
        match self.read_register(bus, THERMOCHRON_STATUS)? {
            0xff => return Err(DeviceError::NoResponse),
            status if status & MISSION_IN_PROGRESS != 0 => return Err(DeviceError::Busy),
            _ => {}
        }
        bus.address(Some(self.rom))?;
        bus.write_byte(START_CONV)?;
        delay.delay_ms(version.conversion_ms);
        let raw = self.read_register(bus, THERMOCHRON_TEMPERATURE)?;
        let temperature = version.decode(raw);
        debug!("{}: {temperature} °C", self.rom);
        Ok(temperature)
    }

    fn read_register<O: OneWire>(&self, bus: &mut O, address: u16) -> DeviceResult<u8, O::BusError> {
        let [ta1, ta2] = address.to_le_bytes();
        bus.address(Some(self.rom))?;
        bus.write_bytes(&[READ_MEMORY, ta1, ta2])?;
        Ok(bus.read_byte()?)
    }

    /// Writes alarm limits (and resolution) and stores them in EEPROM.
    ///
    /// `payload` is `[TH, TL]` or `[TH, TL, CONFIG]`. Half degree parts have no
    /// configuration register and only take the two byte form. When the configuration
    /// byte is left out of a programmable part, the current one is kept.
    pub fn write_config<O: OneWire, D: DelayNs>(
        &self,
        bus: &mut O,
        delay: &mut D,
        payload: &[u8],
    ) -> DeviceResult<(), O::BusError> {
        let (limits, config) = match (self.kind, payload) {
            (ThermometerKind::Thermochron, _) => return Err(DeviceError::Unsupported),
            (_, &[th, tl]) => ([th, tl], None),
            (ThermometerKind::Programmable, &[th, tl, cfg]) => {
                ([th, tl], Some(Resolution::from_config(cfg).config()))
            }
            (_, &[_, _, _]) => return Err(DeviceError::Unsupported),
            _ => return Err(DeviceError::OutOfRange),
        };
        let config = match (self.kind, config) {
            (ThermometerKind::Programmable, None) => Some(self.read_scratchpad(bus)?.bytes()[4]),
            (_, config) => config,
        };

        bus.address(Some(self.rom))?;
        bus.write_byte(WRITE_SCRATCH)?;
        bus.write_bytes(&limits)?;
        if let Some(config) = config {
            bus.write_byte(config)?;
        }

        let readback = self.read_scratchpad(bus)?;
        let written = &readback.bytes()[2..4];
        if written != limits || config.is_some_and(|c| readback.bytes()[4] != c) {
            debug!("{}: scratchpad write not taken ({written:02x?})", self.rom);
            return Err(DeviceError::VerifyFailed);
        }

        bus.address(Some(self.rom))?;
        bus.write_byte(COPY_SCRATCH)?;
        delay.delay_ms(COPY_MS);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimThermochron, SimThermometer};
    use embedded_hal_mock::eh1::delay::NoopDelay;
    use embedded_onewire::sim::SimBus;

    fn scratchpad(mut bytes: [u8; 9]) -> Scratchpad {
        bytes[8] = OneWireCrc::compute(&bytes[..8]);
        Scratchpad::new::<()>(bytes).unwrap()
    }

    #[test]
    fn decode_programmable() {
        // Datasheet examples: +25.0625 °C and -10.125 °C at 12 bit.
        let pad = scratchpad([0x91, 0x01, 0x4b, 0x46, 0x7f, 0xff, 0x0f, 0x10, 0]);
        assert_eq!(pad.temperature(ThermometerKind::Programmable), Temperature::from_num(25.0625));
        let pad = scratchpad([0x5e, 0xff, 0x4b, 0x46, 0x7f, 0xff, 0x0f, 0x10, 0]);
        assert_eq!(pad.temperature(ThermometerKind::Programmable), Temperature::from_num(-10.125));
    }

    #[test]
    fn undefined_bits_masked_at_low_resolution() {
        let pad = scratchpad([0x97, 0x01, 0x4b, 0x46, 0x1f, 0xff, 0x0f, 0x10, 0]);
        assert_eq!(pad.temperature(ThermometerKind::Programmable), Temperature::from_num(25.0));
        assert_eq!(
            pad.config(ThermometerKind::Programmable).resolution,
            Some(Resolution::Bits9)
        );
    }

    #[test]
    fn decode_half_degree() {
        // 25.5 °C register, COUNT_REMAIN 12: 25.0 - 0.25 + 4/16 = 25.0
        let pad = scratchpad([0x33, 0x00, 0x4b, 0x46, 0xff, 0xff, 0x0c, 0x10, 0]);
        assert_eq!(pad.temperature(ThermometerKind::HalfDegree), Temperature::from_num(25.0));
        // -0.5 °C register, COUNT_REMAIN 4: -1.0 - 0.25 + 12/16 = -0.5
        let pad = scratchpad([0xff, 0xff, 0x4b, 0x46, 0xff, 0xff, 0x04, 0x10, 0]);
        assert_eq!(pad.temperature(ThermometerKind::HalfDegree), Temperature::from_num(-0.5));
        assert_eq!(pad.config(ThermometerKind::HalfDegree).resolution, None);
    }

    #[test]
    fn half_degree_register_outside_the_range() {
        for raw in [0x7fff_u16, 0x8000, 0x7ffe] {
            let [t0, t1] = raw.to_le_bytes();
            let pad = scratchpad([t0, t1, 0x4b, 0x46, 0xff, 0xff, 0x00, 0x10, 0]);
            pad.temperature(ThermometerKind::HalfDegree);
        }
    }

    #[test]
    fn implausible_half_degree_reading_is_rejected() {
        let rom = RomAddress::new(0x10, [3, 2, 1, 3, 2, 1]);
        let mut bus = SimBus::new();
        bus.attach(SimThermometer::new(rom).with_temperature(Temperature::from_num(200)));
        let therm = Thermometer::new(rom).unwrap();
        assert!(matches!(
            therm.read_temperature(&mut bus, &mut NoopDelay::new()),
            Err(DeviceError::UnexpectedResponse)
        ));
    }

    #[test]
    fn scratchpad_checks() {
        assert!(matches!(Scratchpad::new::<()>([0xff; 9]), Err(DeviceError::NoResponse)));
        let mut bytes = *scratchpad([0x91, 0x01, 0x4b, 0x46, 0x7f, 0xff, 0x0f, 0x10, 0]).bytes();
        bytes[0] ^= 0x01;
        assert!(matches!(Scratchpad::new::<()>(bytes), Err(DeviceError::Crc)));
    }

    #[test]
    fn only_temperature_families() {
        assert!(Thermometer::new(RomAddress::new(0x28, [1, 0, 0, 0, 0, 0])).is_some());
        assert!(Thermometer::new(RomAddress::new(0x42, [1, 0, 0, 0, 0, 0])).is_some());
        assert!(Thermometer::new(RomAddress::new(0x23, [1, 0, 0, 0, 0, 0])).is_none());
    }

    #[test]
    fn convert_and_read() {
        let rom = RomAddress::new(0x28, [1, 2, 3, 4, 5, 6]);
        let mut bus = SimBus::new();
        bus.attach(SimThermometer::new(rom).with_temperature(Temperature::from_num(21.5)));
        let therm = Thermometer::new(rom).unwrap();
        let t = therm.read_temperature(&mut bus, &mut NoopDelay::new()).unwrap();
        assert_eq!(t, Temperature::from_num(21.5));
    }

    #[test]
    fn convert_and_read_half_degree() {
        let rom = RomAddress::new(0x10, [1, 2, 3, 4, 5, 6]);
        let mut bus = SimBus::new();
        bus.attach(SimThermometer::new(rom).with_temperature(Temperature::from_num(-3.1875)));
        let therm = Thermometer::new(rom).unwrap();
        let t = therm.read_temperature(&mut bus, &mut NoopDelay::new()).unwrap();
        assert_eq!(t, Temperature::from_num(-3.1875));
    }

    #[test]
    fn write_config_round_trip() {
        let rom = RomAddress::new(0x28, [9, 9, 9, 9, 9, 9]);
        let mut bus = SimBus::new();
        bus.attach(SimThermometer::new(rom));
        let therm = Thermometer::new(rom).unwrap();
        let mut delay = NoopDelay::new();
        therm.write_config(&mut bus, &mut delay, &[30, 0xf6, 0x3f]).unwrap();
        assert_eq!(
            therm.read_config(&mut bus).unwrap(),
            TemperatureConfig {
                high: 30,
                low: -10,
                resolution: Some(Resolution::Bits10)
            }
        );
        therm.write_config(&mut bus, &mut delay, &[40, 5]).unwrap();
        let config = therm.read_config(&mut bus).unwrap();
        assert_eq!((config.high, config.low), (40, 5));
        assert_eq!(config.resolution, Some(Resolution::Bits10));
    }

    #[test]
    fn write_config_rejects_bad_payloads() {
        let mut bus = SimBus::new();
        let mut delay = NoopDelay::new();
        let s20 = Thermometer::new(RomAddress::new(0x10, [1, 1, 1, 1, 1, 1])).unwrap();
        assert!(matches!(
            s20.write_config(&mut bus, &mut delay, &[1, 2, 3]),
            Err(DeviceError::Unsupported)
        ));
        let b20 = Thermometer::new(RomAddress::new(0x28, [1, 1, 1, 1, 1, 1])).unwrap();
        assert!(matches!(
            b20.write_config(&mut bus, &mut delay, &[1]),
            Err(DeviceError::OutOfRange)
        ));
        assert!(bus.trace().is_empty());
    }

    #[test]
    fn thermochron_versions() {
        let g = RomAddress::new(0x21, [1, 2, 3, 4, 0x05, 0x00]);
        let z = RomAddress::new(0x21, [1, 2, 3, 4, 0x20, 0x3b]);
        let h = RomAddress::new(0x21, [1, 2, 3, 4, 0x2f, 0x4f]);
        assert_eq!(ThermochronVersion::of(g).map(|v| v.conversion_ms), Some(90));
        assert_eq!(ThermochronVersion::of(z).map(|v| v.decode(0)), Some(Temperature::from_num(-5.5)));
        assert_eq!(ThermochronVersion::of(z).map(|v| v.decode(4)), Some(Temperature::from_num(-5.0)));
        assert_eq!(ThermochronVersion::of(h).map(|v| v.decode(0)), Some(Temperature::from_num(14.5)));
        assert!(ThermochronVersion::of(RomAddress::new(0x21, [0, 0, 0, 0, 0, 0x7f])).is_none());
    }

    #[test]
    fn thermochron_reads_its_register_page() {
        let mut bus = SimBus::new();
        let g = RomAddress::new(0x21, [1, 2, 3, 4, 0x05, 0x00]);
        let z = RomAddress::new(0x21, [5, 6, 7, 8, 0x20, 0x3b]);
        bus.attach(SimThermochron::new(g).with_temperature(Temperature::from_num(-12.5)));
        bus.attach(SimThermochron::new(z).with_temperature(Temperature::from_num(21.375)));
        let mut delay = NoopDelay::new();
        let therm = Thermometer::new(g).unwrap();
        assert_eq!(therm.kind(), ThermometerKind::Thermochron);
        assert_eq!(therm.read_temperature(&mut bus, &mut delay).unwrap(), Temperature::from_num(-12.5));
        let therm = Thermometer::new(z).unwrap();
        assert_eq!(therm.read_temperature(&mut bus, &mut delay).unwrap(), Temperature::from_num(21.375));
    }

    #[test]
    fn thermochron_refuses_during_a_mission() {
        let rom = RomAddress::new(0x21, [1, 2, 3, 4, 0x05, 0x00]);
        let mut bus = SimBus::new();
        bus.attach(SimThermochron::new(rom).with_mission(true));
        let therm = Thermometer::new(rom).unwrap();
        assert!(matches!(
            therm.read_temperature(&mut bus, &mut NoopDelay::new()),
            Err(DeviceError::Busy)
        ));
        let unknown = Thermometer::new(RomAddress::new(0x21, [0, 0, 0, 0, 0, 0x7f])).unwrap();
        assert!(matches!(
            unknown.read_temperature(&mut bus, &mut NoopDelay::new()),
            Err(DeviceError::Unsupported)
        ));
    }

    #[test]
    fn thermochron_has_no_alarm_scratchpad() {
        let rom = RomAddress::new(0x21, [1, 2, 3, 4, 0x05, 0x00]);
        let mut bus = SimBus::new();
        bus.attach(SimThermochron::new(rom));
        let therm = Thermometer::new(rom).unwrap();
        assert!(matches!(therm.read_config(&mut bus), Err(DeviceError::Unsupported)));
        assert!(matches!(
            therm.write_config(&mut bus, &mut NoopDelay::new(), &[30, 10]),
            Err(DeviceError::Unsupported)
        ));
        assert!(bus.trace().is_empty());
    }

    #[test]
    fn absent_device() {
        let rom = RomAddress::new(0x28, [1, 2, 3, 4, 5, 6]);
        let mut bus = SimBus::new();
        bus.attach(SimThermometer::new(RomAddress::new(0x28, [6, 5, 4, 3, 2, 1])));
        let therm = Thermometer::new(rom).unwrap();
        assert!(matches!(therm.read_scratchpad(&mut bus), Err(DeviceError::NoResponse)));
        let mut empty = SimBus::new();
        assert!(matches!(therm.read_scratchpad(&mut empty), Err(DeviceError::NoResponse)));
    }

    #[test]
    fn corrupted_scratchpad() {
        let rom = RomAddress::new(0x22, [1, 2, 3, 4, 5, 6]);
        let mut bus = SimBus::new();
        bus.attach(SimThermometer::new(rom).with_corrupt_crc(true));
        let therm = Thermometer::new(rom).unwrap();
        assert!(matches!(therm.read_config(&mut bus), Err(DeviceError::Crc)));
    }
}
