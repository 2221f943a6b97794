use bitfield_struct::bitfield;
use embedded_onewire::OneWireStatus;

pub(crate) const DEVICE_RESET: u8 = 0xf0;
pub(crate) const SET_READ_POINTER: u8 = 0xe1;
pub(crate) const WRITE_CONFIG: u8 = 0xd2;
pub(crate) const CHANNEL_SELECT: u8 = 0xc3;
pub(crate) const ONEWIRE_RESET: u8 = 0xb4;
pub(crate) const ONEWIRE_SINGLE_BIT: u8 = 0x87;
pub(crate) const ONEWIRE_WRITE_BYTE: u8 = 0xa5;
pub(crate) const ONEWIRE_READ_BYTE: u8 = 0x96;
pub(crate) const ONEWIRE_TRIPLET: u8 = 0x78;

/// Read pointer codes.
pub(crate) const STATUS_REGISTER: u8 = 0xf0;
pub(crate) const DATA_REGISTER: u8 = 0xe1;
pub(crate) const CHANNEL_REGISTER: u8 = 0xd2;
pub(crate) const CONFIG_REGISTER: u8 = 0xc3;

/// Channel select codes of the DS2482-800: the byte written and the byte read back.
pub(crate) const CHANNEL_CODES: [(u8, u8); 8] = [
    (0xf0, 0xb8),
    (0xe1, 0xb1),
    (0xd2, 0xaa),
    (0xc3, 0xa3),
    (0xb4, 0x9c),
    (0xa5, 0x95),
    (0x96, 0x8e),
    (0x87, 0x87),
];

/// Status register of the bridge.
///
/// Every 1-Wire command and the device reset leave the read pointer on this register, so
/// polling it needs a single byte read.
#[bitfield(u8)]
#[derive(PartialEq, Eq)]
pub struct DeviceStatus {
    /// A 1-Wire command is still running.
    pub onewire_busy: bool,
    /// A presence pulse was seen during the last 1-Wire reset.
    presence_pulse_detect: bool,
    /// The line was held low during the last 1-Wire reset.
    short_detect: bool,
    /// Line state sampled when the register was read.
    pub logic_level: bool,
    /// The bridge went through a power-on or commanded reset and awaits its configuration.
    pub device_reset: bool,
    /// Line state sampled in the single bit slot, or the first bit of a triplet.
    pub single_bit_result: bool,
    /// Second bit of a triplet.
    pub triplet_second_bit: bool,
    /// Direction written by a triplet.
    pub branch_dir_taken: bool,
}

impl OneWireStatus for DeviceStatus {
    fn presence(&self) -> bool {
        self.presence_pulse_detect()
    }

    fn shortcircuit(&self) -> bool {
        self.short_detect()
    }

    fn logic_level(&self) -> Option<bool> {
        Some(self.logic_level())
    }
}

/// Device configuration register.
///
/// The register reads 00h after a device reset. Strong pullup clears itself after the next
/// 1-Wire reset, the other bits hold until rewritten.
#[bitfield(u8)]
#[derive(PartialEq, Eq)]
pub struct DeviceConfiguration {
    /// Drive the rising edges with the low impedance pullup instead of the resistor.
    pub active_pullup: bool,
    /// Presence pulse masking. Not present on every part of the family.
    pub presence_pulse_masking: bool,
    /// Strong pullup after the next byte or bit command, for parasite powered devices.
    pub strong_pullup: bool,
    /// Overdrive timing.
    pub overdrive: bool,
    #[bits(4)]
    __: u8,
}

impl DeviceConfiguration {
    /// Register write form: the upper nibble carries the complement of the lower one.
    pub(crate) fn to_register(self) -> u8 {
        let bits = self.into_bits() & 0x0f;
        bits | (!bits << 4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_carries_its_complement() {
        assert_eq!(DeviceConfiguration::new().to_register(), 0xf0);
        let cfg = DeviceConfiguration::new().with_active_pullup(true).with_overdrive(true);
        assert_eq!(cfg.to_register(), 0x69);
    }

    #[test]
    fn status_bits() {
        let status = DeviceStatus::from_bits(0x9a);
        assert!(status.presence());
        assert!(!status.shortcircuit());
        assert_eq!(OneWireStatus::logic_level(&status), Some(true));
        assert!(status.device_reset());
        assert!(status.branch_dir_taken());
        assert!(!status.onewire_busy());
    }
}
