use bitfield_struct::bitfield;
use embedded_onewire::OneWireStatus;

/// Switches the chip to data mode: following bytes are sent on the 1-Wire line.
pub(crate) const MODE_DATA: u8 = 0xe1;
/// Switches the chip back to command mode. Sent twice in data mode to transmit it as data.
pub(crate) const MODE_COMMAND: u8 = 0xe3;
/// Reset at regular speed; the first one after power-up only calibrates the chip.
pub(crate) const CALIBRATION_RESET: u8 = 0xc1;

/// Detection sequence: pull-down slew rate 1.37 V/us, write-1 low time 10 us, data sample
/// offset 8 us, read baud rate, single write-1 bit slot.
pub(crate) const CONFIG_DETECT: [u8; 5] = [0x17, 0x45, 0x5b, 0x0f, 0x91];
/// What a DS2480B answers to [`CONFIG_DETECT`].
pub(crate) const CONFIG_DETECT_RESPONSE: [u8; 5] = [0x16, 0x44, 0x5a, 0x00, 0x93];

const FUNCTION_SINGLE_BIT: u8 = 0b00;
const FUNCTION_RESET: u8 = 0b10;
const COMMAND_TAIL: u8 = 0b01;

/// 1-Wire timing used by the line driver.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Speed {
    /// Standard speed with fixed slew rates.
    Regular = 0b00,
    /// Standard speed with the slew rate and timing set during detection. Better on long lines.
    #[default]
    Flexible = 0b01,
    /// Overdrive speed.
    Overdrive = 0b10,
}

/// # Command mode byte
///
/// In command mode every byte with the top bit set is a command. The layout of the
/// reset and single bit commands is shared: a function code, a data bit, the speed
/// and a fixed `01` tail.
#[bitfield(u8)]
pub struct CommandByte {
    /// Always `0b01` for reset and bit commands.
    #[bits(2)]
    pub tail: u8,
    /// Speed selection, see [`Speed`].
    #[bits(2)]
    pub speed: u8,
    /// Bit value to write for single bit commands.
    pub data: bool,
    /// Function: `00` single bit, `01` search accelerator, `10` reset, `11` pulse.
    #[bits(2)]
    pub function: u8,
    /// Set for commands, clear for configuration bytes.
    pub command: bool,
}

/// Reset command at `speed`.
pub(crate) fn reset_command(speed: Speed) -> CommandByte {
    CommandByte::new()
        .with_command(true)
        .with_function(FUNCTION_RESET)
        .with_speed(speed as u8)
        .with_tail(COMMAND_TAIL)
}

/// Single bit time slot writing `bit` at `speed`. Writing a 1 samples the line.
pub(crate) fn bit_command(speed: Speed, bit: bool) -> CommandByte {
    CommandByte::new()
        .with_command(true)
        .with_function(FUNCTION_SINGLE_BIT)
        .with_data(bit)
        .with_speed(speed as u8)
        .with_tail(COMMAND_TAIL)
}

/// The answer to a single bit command echoes its upper six bits; the two low bits both
/// carry the sampled line state.
pub(crate) fn bit_response_matches(command: CommandByte, response: u8) -> bool {
    command.into_bits() & 0xfc == response & 0xfc
}

/// # Reset response
///
/// Byte returned after a reset command. The top three bits are `110`, the chip revision
/// sits in the middle, and the low two bits report what happened on the line.
#[bitfield(u8)]
pub struct ResetResponse {
    /// `00` short, `01` presence pulse, `10` alarming presence pulse, `11` no presence.
    #[bits(2)]
    pub result: u8,
    /// Chip revision (`011` for the DS2480B).
    #[bits(3)]
    pub revision: u8,
    /// Always `110`.
    #[bits(3)]
    pub marker: u8,
}

impl ResetResponse {
    pub(crate) const MARKER: u8 = 0b110;

    /// `true` if the byte has the shape of a reset response.
    pub fn is_well_formed(&self) -> bool {
        self.marker() == Self::MARKER
    }
}

impl OneWireStatus for ResetResponse {
    fn presence(&self) -> bool {
        matches!(self.result(), 0b01 | 0b10)
    }

    fn shortcircuit(&self) -> bool {
        self.result() == 0b00
    }

    fn alarm(&self) -> bool {
        self.result() == 0b10
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_bytes_match_datasheet() {
        assert_eq!(reset_command(Speed::Regular).into_bits(), 0xc1);
        assert_eq!(reset_command(Speed::Flexible).into_bits(), 0xc5);
        assert_eq!(bit_command(Speed::Regular, true).into_bits(), 0x91);
        assert_eq!(bit_command(Speed::Regular, false).into_bits(), 0x81);
        assert_eq!(bit_command(Speed::Flexible, true).into_bits(), 0x95);
        assert_eq!(CALIBRATION_RESET, reset_command(Speed::Regular).into_bits());
    }

    #[test]
    fn reset_response_decoding() {
        let present = ResetResponse::from_bits(0xcd);
        assert!(present.is_well_formed());
        assert!(present.presence());
        assert!(!present.shortcircuit());
        assert_eq!(present.revision(), 0b011);

        let empty = ResetResponse::from_bits(0xcf);
        assert!(!empty.presence());

        let alarm = ResetResponse::from_bits(0xce);
        assert!(alarm.presence() && alarm.alarm());

        let short = ResetResponse::from_bits(0xcc);
        assert!(short.shortcircuit());

        assert!(!ResetResponse::from_bits(0x16).is_well_formed());
    }

    #[test]
    fn bit_response_echo() {
        let cmd = bit_command(Speed::Regular, true);
        assert!(bit_response_matches(cmd, 0x93));
        assert!(bit_response_matches(cmd, 0x90));
        assert!(!bit_response_matches(cmd, 0x83));
    }
}
