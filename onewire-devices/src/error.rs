use core::fmt;
use embedded_onewire::OneWireError;

/// Device command errors.
#[derive(Debug)]
pub enum DeviceError<E> {
    /// The bus itself failed.
    Bus(OneWireError<E>),
    /// A device response failed its CRC8 or CRC16 check.
    Crc,
    /// The device answered, but not the way the command set says it should.
    UnexpectedResponse,
    /// Memory access or payload outside what the device supports.
    OutOfRange,
    /// The family has no such command.
    Unsupported,
    /// Data read back after a write differs from what was written.
    VerifyFailed,
    /// Nothing drove the line while the device was expected to answer.
    NoResponse,
    /// The device is running a mission and refuses the command until it ends.
    Busy,
}

impl<E> From<OneWireError<E>> for DeviceError<E> {
    fn from(value: OneWireError<E>) -> Self {
        match value {
            OneWireError::NoDevicePresent => Self::NoResponse,
            OneWireError::InvalidCrc => Self::Crc,
            other => Self::Bus(other),
        }
    }
}

impl<E: fmt::Display> fmt::Display for DeviceError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bus(e) => write!(f, "{e}"),
            Self::Crc => f.write_str("CRC mismatch in device response"),
            Self::UnexpectedResponse => f.write_str("unexpected device response"),
            Self::OutOfRange => f.write_str("access out of range"),
            Self::Unsupported => f.write_str("command not supported by this family"),
            Self::VerifyFailed => f.write_str("read-back after write does not match"),
            Self::NoResponse => f.write_str("device did not respond"),
            Self::Busy => f.write_str("device is busy with a mission"),
        }
    }
}
