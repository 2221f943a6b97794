//! ROM command constants for 1-Wire communication.
//!
//! ROM commands are the first byte sent after a reset pulse. They decide which
//! devices take part in the function commands that follow.

/// Command to match a specific ROM address; followed by the 8 address bytes.
pub const ONEWIRE_MATCH_ROM_CMD: u8 = 0x55;

/// Command to skip ROM addressing and talk to every device on the bus at once.
pub const ONEWIRE_SKIP_ROM_CMD: u8 = 0xcc;

/// Command to read the ROM of the only device on a single-drop bus.
pub const ONEWIRE_READ_ROM_CMD: u8 = 0x33;

/// Command to search for devices on the 1-Wire bus
pub const ONEWIRE_SEARCH_CMD: u8 = 0xf0;

/// Command to search for devices in alarm state on the 1-Wire bus
pub const ONEWIRE_CONDITIONAL_SEARCH_CMD: u8 = 0xec;
