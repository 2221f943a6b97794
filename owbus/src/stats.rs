use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters kept per bus.
#[derive(Debug, Default)]
pub(crate) struct BusStats {
    transactions: AtomicU64,
    forced_resets: AtomicU64,
    resets: AtomicU64,
    searches: AtomicU64,
    devices_found: AtomicU64,
    crc_discards: AtomicU64,
    timeouts: AtomicU64,
    busy: AtomicU64,
    device_errors: AtomicU64,
    transport_errors: AtomicU64,
    cache_hits: AtomicU64,
}

/// Point-in-time copy of the bus counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    /// Transactions that acquired the bus.
    pub transactions: u64,
    /// Resets issued because the previous transaction did not complete.
    pub forced_resets: u64,
    /// Reset pulses issued through [`Transaction::reset`](crate::Transaction::reset).
    pub resets: u64,
    /// ROM searches run.
    pub searches: u64,
    /// Addresses returned by searches.
    pub devices_found: u64,
    /// Search results dropped for a bad CRC or family code.
    pub crc_discards: u64,
    /// Transport timeouts.
    pub timeouts: u64,
    /// Acquisitions that gave up with [`Error::BusBusy`](crate::Error::BusBusy).
    pub busy: u64,
    /// Failed device commands.
    pub device_errors: u64,
    /// Fatal transport errors.
    pub transport_errors: u64,
    /// Scans answered from the cache.
    pub cache_hits: u64,
}

macro_rules! counters {
    ($($name:ident),* $(,)?) => {
        impl BusStats {
            $(
                pub(crate) fn $name(&self, n: u64) {
                    self.$name.fetch_add(n, Ordering::Relaxed);
                }
            )*

            pub(crate) fn snapshot(&self) -> StatsSnapshot {
                StatsSnapshot {
                    $($name: self.$name.load(Ordering::Relaxed),)*
                }
            }
        }
    };
}

counters!(
    transactions,
    forced_resets,
    resets,
    searches,
    devices_found,
    crc_discards,
    timeouts,
    busy,
    device_errors,
    transport_errors,
    cache_hits,
);
