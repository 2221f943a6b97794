use core::fmt;

/// One wire communication error type.
#[derive(Debug)]
pub enum OneWireError<E> {
    /// Encapsulates the error type from the underlying transport.
    Other(E),
    /// The transport did not answer within its response window.
    Timeout,
    /// Indicates that no device is present on the bus.
    NoDevicePresent,
    /// Indicates that a short circuit was detected on the bus.
    ShortCircuit,
    /// Indicates that the operation is not implemented, such as reading a triplet when not supported.
    Unimplemented,
    /// Computed CRC of a ROM or a device response is invalid.
    InvalidCrc,
}

impl<E> From<E> for OneWireError<E> {
    fn from(other: E) -> Self {
        Self::Other(other)
    }
}

impl<E> OneWireError<E> {
    /// Converts the transport error with `f`, keeping every protocol-level variant.
    pub fn map_other<F, E2>(self, f: F) -> OneWireError<E2>
    where
        F: FnOnce(E) -> E2,
    {
        match self {
            Self::Other(e) => OneWireError::Other(f(e)),
            Self::Timeout => OneWireError::Timeout,
            Self::NoDevicePresent => OneWireError::NoDevicePresent,
            Self::ShortCircuit => OneWireError::ShortCircuit,
            Self::Unimplemented => OneWireError::Unimplemented,
            Self::InvalidCrc => OneWireError::InvalidCrc,
        }
    }
}

impl<E: fmt::Display> fmt::Display for OneWireError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Other(e) => write!(f, "transport error: {e}"),
            Self::Timeout => f.write_str("no response within the transport timeout"),
            Self::NoDevicePresent => f.write_str("no presence pulse on the bus"),
            Self::ShortCircuit => f.write_str("1-Wire line is shorted"),
            Self::Unimplemented => f.write_str("operation not supported by the transport"),
            Self::InvalidCrc => f.write_str("CRC mismatch"),
        }
    }
}
