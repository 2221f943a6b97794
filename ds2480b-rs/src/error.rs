use embedded_onewire::TransportFault;
use std::{fmt, io};

#[derive(Debug)]
/// DS2480B line driver errors
pub enum Ds2480bError {
    /// The byte link failed (serial port, USB bridge or socket).
    Io(io::Error),
    /// The chip answered with something other than the echo of the byte sent.
    Echo {
        /// Byte sent to the chip.
        sent: u8,
        /// Byte the chip answered with.
        received: u8,
    },
    /// The detection sequence did not get a DS2480B answer.
    NotDetected {
        /// Bytes received in place of the expected configuration echo.
        response: [u8; 5],
    },
}

impl From<io::Error> for Ds2480bError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl Ds2480bError {
    /// The link did not deliver the answer in time. The line driver may still be usable.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Io(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock))
    }
}

impl fmt::Display for Ds2480bError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "link error: {e}"),
            Self::Echo { sent, received } => {
                write!(f, "sent {sent:#04x}, line driver answered {received:#04x}")
            }
            Self::NotDetected { response } => {
                write!(f, "no DS2480B on the link (detect answer {response:02x?})")
            }
        }
    }
}

impl std::error::Error for Ds2480bError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl TransportFault for Ds2480bError {
    fn is_fatal(&self) -> bool {
        !self.is_timeout()
    }
}
