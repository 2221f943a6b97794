#[derive(Debug, Default, Clone, Copy)]
/// Calculate CRC-8 used in 1-Wire communications.
///
/// Dallas/Maxim polynomial x^8 + x^5 + x^4 + 1, processed least significant bit first.
pub struct OneWireCrc(u8);

#[cfg(feature = "crc-table")]
const CRC8_TABLE: [u8; 256] = {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x1 == 0x1 {
                (crc >> 1) ^ 0x8c
            } else {
                crc >> 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
};

impl OneWireCrc {
    /// Get the current CRC value
    pub fn value(&self) -> u8 {
        self.0
    }

    /// Update the CRC with the incoming byte.
    #[cfg(feature = "crc-table")]
    pub fn update(&mut self, byte: u8) {
        self.0 = CRC8_TABLE[(self.0 ^ byte) as usize];
    }

    /// Update the CRC with the incoming byte.
    #[cfg(not(feature = "crc-table"))]
    pub fn update(&mut self, byte: u8) {
        let mut crc = self.0 ^ byte; // XOR the byte with the current CRC value
        for _ in 0..8 {
            if crc & 0x1 == 0x1 {
                crc = (crc >> 1) ^ 0x8c; // Polynomial for CRC-8
            } else {
                crc >>= 1;
            }
        }
        self.0 = crc;
    }

    /// CRC-8 of `data`.
    pub fn compute(data: &[u8]) -> u8 {
        let mut crc = OneWireCrc(0);
        for &byte in data {
            crc.update(byte);
        }
        crc.0
    }

    /// Validate a sequence of bytes where the last byte is the 1-Wire CRC of
    /// the previous bytes.
    pub fn validate(sequence: &[u8]) -> bool {
        match sequence.split_last() {
            Some((&crc, payload)) => Self::compute(payload) == crc,
            None => false,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
/// Calculate CRC-16 used by 1-Wire memory devices.
///
/// Polynomial x^16 + x^15 + x^2 + 1, least significant bit first. Devices transmit the
/// inverted CRC, low byte first.
pub struct OneWireCrc16(u16);

impl OneWireCrc16 {
    /// Get the current CRC value
    pub fn value(&self) -> u16 {
        self.0
    }

    /// Update the CRC with the incoming byte.
    pub fn update(&mut self, byte: u8) {
        let mut crc = self.0 ^ byte as u16;
        for _ in 0..8 {
            if crc & 0x1 == 0x1 {
                crc = (crc >> 1) ^ 0xa001;
            } else {
                crc >>= 1;
            }
        }
        self.0 = crc;
    }

    /// CRC-16 of `data`.
    pub fn compute(data: &[u8]) -> u16 {
        let mut crc = OneWireCrc16(0);
        for &byte in data {
            crc.update(byte);
        }
        crc.0
    }

    /// Check `data` against the inverted CRC-16 a device sent after it.
    pub fn validate(data: &[u8], inverted: [u8; 2]) -> bool {
        Self::compute(data) == !u16::from_le_bytes(inverted)
    }
}
