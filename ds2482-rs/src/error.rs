use core::fmt;
use embedded_onewire::TransportFault;

#[derive(Debug)]
/// DS2482 bridge errors
pub enum Ds2482Error<E> {
    /// I2C bus errors.
    I2c(E),
    /// The bridge stayed busy for every status poll.
    RetriesExceeded,
    /// The configuration register did not take the value written.
    Config {
        /// Configuration bits written.
        wrote: u8,
        /// Configuration register read back.
        read: u8,
    },
    /// A channel switch was not confirmed. Single channel bridges refuse every switch.
    Channel {
        /// Requested channel.
        channel: u8,
        /// Channel selection register read back.
        read: u8,
    },
}

impl<E> From<E> for Ds2482Error<E> {
    fn from(value: E) -> Self {
        Self::I2c(value)
    }
}

impl<E: fmt::Debug> fmt::Display for Ds2482Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::I2c(e) => write!(f, "I2C error: {e:?}"),
            Self::RetriesExceeded => write!(f, "bridge still busy after every status poll"),
            Self::Config { wrote, read } => {
                write!(f, "configuration {wrote:#04x} written, {read:#04x} read back")
            }
            Self::Channel { channel, read } => {
                write!(f, "channel {channel} not selected (read back {read:#04x})")
            }
        }
    }
}

impl<E: fmt::Debug> core::error::Error for Ds2482Error<E> {}

impl<E> TransportFault for Ds2482Error<E> {
    fn is_fatal(&self) -> bool {
        !matches!(self, Self::RetriesExceeded)
    }
}
