use crate::OneWireCrc;
use core::{fmt, str::FromStr};

/// 64-bit 1-Wire device address (ROM code).
///
/// | Bit | Description |
/// |-----|-------------|
/// | 0-7 | Family code (e.g., 0x28 for DS18B20) |
/// | 8-55 | 48-bit serial number |
/// | 56-63 | CRC-8 (`0b1_0001_1001` poly) of bits 0-55 |
///
/// The integer value is the little-endian reading of the 8 bytes in the order they
/// travel on the wire, so bit `n` of [`raw`](RomAddress::raw) is the `n`-th bit the
/// device transmits during a search.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RomAddress(u64);

impl RomAddress {
    /// Number of bits in a ROM code.
    pub const BITS: u8 = 64;

    /// Wraps a raw ROM value without checking its CRC.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Builds an address from the 8 bytes in wire order, without checking the CRC.
    pub const fn from_bytes(bytes: [u8; 8]) -> Self {
        Self(u64::from_le_bytes(bytes))
    }

    /// Builds a valid address from a family code and serial number, appending the CRC.
    pub fn new(family: u8, serial: [u8; 6]) -> Self {
        let mut bytes = [family, serial[0], serial[1], serial[2], serial[3], serial[4], serial[5], 0];
        bytes[7] = OneWireCrc::compute(&bytes[..7]);
        Self::from_bytes(bytes)
    }

    /// The raw 64-bit value.
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// The 8 bytes in wire order.
    pub const fn to_bytes(self) -> [u8; 8] {
        self.0.to_le_bytes()
    }

    /// Family code, the first byte on the wire.
    pub const fn family_code(self) -> u8 {
        self.0 as u8
    }

    /// 48-bit serial number in wire order.
    pub fn serial_number(self) -> [u8; 6] {
        let b = self.to_bytes();
        [b[1], b[2], b[3], b[4], b[5], b[6]]
    }

    /// Transmitted CRC byte.
    pub const fn crc(self) -> u8 {
        (self.0 >> 56) as u8
    }

    /// `true` if the trailing CRC byte matches the CRC-8 of the preceding 56 bits.
    pub fn is_valid(self) -> bool {
        OneWireCrc::validate(&self.to_bytes())
    }

    /// Bit `n` in transmission order.
    pub const fn bit(self, n: u8) -> bool {
        (self.0 >> n) & 1 == 1
    }

    /// Key that orders addresses the way a search emits them: transmission bit 0 is the
    /// most significant.
    pub const fn search_key(self) -> u64 {
        self.0.reverse_bits()
    }
}

impl From<RomAddress> for u64 {
    fn from(rom: RomAddress) -> Self {
        rom.0
    }
}

impl fmt::Display for RomAddress {
    /// owfs notation, `FF.SSSSSSSSSSSS.CC`, bytes in wire order.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.to_bytes();
        write!(
            f,
            "{:02X}.{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}.{:02X}",
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]
        )
    }
}

impl fmt::Debug for RomAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RomAddress({self})")
    }
}

/// Reasons a textual ROM address is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseRomError {
    /// Not 14 or 16 hex digits.
    Length,
    /// A character is neither a hex digit nor a `.` separator.
    Digit,
    /// The explicit CRC byte does not match the address.
    Crc,
}

impl fmt::Display for ParseRomError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Length => "expected 14 or 16 hex digits",
            Self::Digit => "invalid character in ROM address",
            Self::Crc => "ROM address CRC mismatch",
        })
    }
}

impl FromStr for RomAddress {
    type Err = ParseRomError;

    /// Accepts `28.FF4C61911604.CC`, `28.FF4C61911604` (CRC appended) or the bare hex digits,
    /// bytes in wire order.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 8];
        let mut nibbles = 0usize;
        for c in s.chars() {
            if c == '.' {
                continue;
            }
            let digit = c.to_digit(16).ok_or(ParseRomError::Digit)? as u8;
            if nibbles >= 16 {
                return Err(ParseRomError::Length);
            }
            bytes[nibbles / 2] |= if nibbles % 2 == 0 { digit << 4 } else { digit };
            nibbles += 1;
        }
        match nibbles {
            14 => {
                bytes[7] = OneWireCrc::compute(&bytes[..7]);
                Ok(Self::from_bytes(bytes))
            }
            16 => {
                let rom = Self::from_bytes(bytes);
                if rom.is_valid() {
                    Ok(rom)
                } else {
                    Err(ParseRomError::Crc)
                }
            }
            _ => Err(ParseRomError::Length),
        }
    }
}

#[cfg(test)]
mod tests {
    extern crate std;
    use super::*;
    use std::{format, string::ToString};

    #[test]
    fn fields_follow_wire_order() {
        let rom = RomAddress::new(0x28, [0xff, 0x4c, 0x61, 0x91, 0x16, 0x04]);
        assert_eq!(rom.family_code(), 0x28);
        assert_eq!(rom.serial_number(), [0xff, 0x4c, 0x61, 0x91, 0x16, 0x04]);
        assert_eq!(rom.to_bytes()[0], 0x28);
        assert!(rom.is_valid());
        assert!(!RomAddress::from_raw(rom.raw() ^ (1 << 60)).is_valid());
    }

    #[test]
    fn display_and_parse_agree() {
        let rom = RomAddress::new(0x10, [0x67, 0xc6, 0x69, 0x73, 0x51, 0xff]);
        let text = rom.to_string();
        assert!(text.starts_with("10.67C6697351FF."));
        assert_eq!(text.parse::<RomAddress>(), Ok(rom));
        assert_eq!("10.67C6697351FF".parse::<RomAddress>(), Ok(rom));
        assert_eq!("1067c6697351ff".parse::<RomAddress>(), Ok(rom));
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert_eq!("10.67C6".parse::<RomAddress>(), Err(ParseRomError::Length));
        assert_eq!("10.67C6697351FG".parse::<RomAddress>(), Err(ParseRomError::Digit));
        let rom = RomAddress::new(0x10, [0x67, 0xc6, 0x69, 0x73, 0x51, 0xff]);
        let bad = format!("10.67C6697351FF.{:02X}", rom.crc() ^ 0x01);
        assert_eq!(bad.parse::<RomAddress>(), Err(ParseRomError::Crc));
    }

    #[test]
    fn search_key_puts_first_transmitted_bit_on_top() {
        let a = RomAddress::from_raw(0b10);
        let b = RomAddress::from_raw(0b01);
        assert!(a.search_key() < b.search_key());
    }
}
