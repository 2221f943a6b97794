//! Error taxonomy of the bus master.
//!
//! Every failure carries enough context (port, address, operation) for the caller to
//! decide whether to retry, back off, or reopen the bus.

use embedded_onewire::{OneWireError, RomAddress};
use onewire_devices::DeviceError;
use std::time::Duration;
use thiserror::Error;

/// Transport error type carried by [`Error::Transport`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// What went wrong in a device command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceFault {
    /// A response failed its CRC check.
    Crc,
    /// Wrong length, echo, complement or confirmation byte.
    UnexpectedResponse,
    /// Memory offset, length or payload out of range.
    OutOfRange,
    /// The family has no such command.
    Unsupported,
    /// Read-back after a write differs.
    VerifyFailed,
    /// The device did not answer.
    NoResponse,
    /// The device is busy with a mission of its own.
    Busy,
}

impl std::fmt::Display for DeviceFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Crc => "CRC mismatch",
            Self::UnexpectedResponse => "unexpected response",
            Self::OutOfRange => "out of range",
            Self::Unsupported => "unsupported command",
            Self::VerifyFailed => "verification failed",
            Self::NoResponse => "no response",
            Self::Busy => "device busy",
        })
    }
}

/// Main error type for bus operations.
#[derive(Error, Debug)]
pub enum Error {
    /// The transport failed for good. The bus is invalidated until reopened.
    #[error("transport error on {port}: {source}")]
    Transport {
        /// Port or address of the transport.
        port: String,
        /// Underlying transport error.
        #[source]
        source: BoxError,
    },

    /// No response within the transport timeout. The next transaction resets the bus first.
    #[error("timeout during {operation}{}", .address.map(|a| format!(" on {a}")).unwrap_or_default())]
    Timeout {
        /// Operation in progress.
        operation: &'static str,
        /// Device addressed, if any.
        address: Option<RomAddress>,
    },

    /// A ROM search was aborted. Retry with a fresh reset.
    #[error("bus search aborted: {reason}")]
    BusSearch {
        /// Why the search stopped.
        reason: String,
    },

    /// A device command failed. The bus stays usable.
    #[error("{operation} on {address}: {fault}")]
    Device {
        /// Device addressed.
        address: RomAddress,
        /// Operation in progress.
        operation: &'static str,
        /// What went wrong.
        fault: DeviceFault,
    },

    /// Another transaction held the bus for the whole acquire timeout.
    #[error("bus busy for {waited:?}")]
    BusBusy {
        /// How long acquisition was attempted.
        waited: Duration,
    },

    /// The device is not in the registry.
    #[error("device {0} not found")]
    NotFound(RomAddress),

    /// The adapter reports a shorted 1-Wire line.
    #[error("1-Wire line is shorted")]
    ShortCircuit,

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// The bus was invalidated by an earlier transport error and not reopened.
    #[error("bus handle invalidated, reopen required")]
    InvalidHandle,
}

impl Error {
    /// Whether the same call may succeed if simply retried (after backing off).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::BusSearch { .. } | Self::BusBusy { .. }
        )
    }

    /// The bus must be reopened before further use.
    pub fn needs_reopen(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::InvalidHandle)
    }
}

/// Convenience type alias for Results using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

impl<E> From<DeviceError<E>> for DeviceFault {
    fn from(value: DeviceError<E>) -> Self {
        match value {
            DeviceError::Crc => Self::Crc,
            DeviceError::UnexpectedResponse => Self::UnexpectedResponse,
            DeviceError::OutOfRange => Self::OutOfRange,
            DeviceError::Unsupported => Self::Unsupported,
            DeviceError::VerifyFailed => Self::VerifyFailed,
            DeviceError::Busy => Self::Busy,
            DeviceError::NoResponse | DeviceError::Bus(OneWireError::NoDevicePresent) => Self::NoResponse,
            DeviceError::Bus(OneWireError::InvalidCrc) => Self::Crc,
            DeviceError::Bus(_) => Self::UnexpectedResponse,
        }
    }
}
