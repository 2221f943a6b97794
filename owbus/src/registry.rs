//! Devices known on a bus.

use crate::{Error, Result, Transaction, Transport};
use embedded_hal::delay::DelayNs;
use embedded_onewire::{OneWireSearchKind, RomAddress};
use log::{debug, warn};
use onewire_devices::{Capabilities, Family};
use parking_lot::RwLock;
use std::{collections::HashMap, time::Instant};

/// A device seen by the last search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRecord {
    /// Device address.
    pub address: RomAddress,
    /// Family descriptor, `None` for families without a known command set.
    pub family: Option<&'static Family>,
    /// What the device can do.
    pub capabilities: Capabilities,
    /// When the device first appeared in a search.
    pub first_seen: Instant,
    /// When the device last answered a search.
    pub last_seen: Instant,
}

impl DeviceRecord {
    /// A record for a device seen for the first time at `now`.
    pub fn new(address: RomAddress, now: Instant) -> Self {
        let family = Family::lookup(address.family_code());
        Self {
            address,
            family,
            capabilities: family.map_or(Capabilities::empty(), |f| f.capabilities),
            first_seen: now,
            last_seen: now,
        }
    }

    /// Part name of the family.
    pub fn name(&self) -> &'static str {
        self.family.map_or("unknown", |f| f.name)
    }

    /// Family code.
    pub fn family_code(&self) -> u8 {
        self.address.family_code()
    }

    /// `true` if the device has every capability in `capabilities`.
    pub fn supports(&self, capabilities: Capabilities) -> bool {
        self.capabilities.contains(capabilities)
    }
}

/// Changes made to the registry by one refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshDiff {
    /// Devices seen for the first time, in search order.
    pub added: Vec<RomAddress>,
    /// Devices no longer answering, in search order.
    pub removed: Vec<RomAddress>,
}

impl RefreshDiff {
    /// Nothing changed.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Registry of the devices found on one bus.
///
/// Refreshes run a full search inside one [`Transaction`], so concurrent refreshes of the
/// same bus serialize on the bus lock.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    records: RwLock<HashMap<RomAddress, DeviceRecord>>,
}

impl DeviceRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Searches the bus and brings the registry in line with what answered.
    ///
    /// Returns the records in search order and what changed.
    pub fn refresh<T: Transport, D: DelayNs>(
        &self,
        tx: &mut Transaction<'_, T, D>,
    ) -> Result<(Vec<DeviceRecord>, RefreshDiff)> {
        let found = tx.search(OneWireSearchKind::Normal)?;
        Ok(self.apply(&found, Instant::now()))
    }

    /// Replaces the registry content with `found`, keeping `first_seen` of survivors.
    pub(crate) fn apply(&self, found: &[RomAddress], now: Instant) -> (Vec<DeviceRecord>, RefreshDiff) {
        let mut records = self.records.write();
        let mut next = HashMap::with_capacity(found.len());
        let mut diff = RefreshDiff::default();
        let mut seen = Vec::with_capacity(found.len());
        for &address in found {
            if !address.is_valid() || next.contains_key(&address) {
                warn!("registry: refusing address {address}");
                continue;
            }
            let record = match records.remove(&address) {
                Some(mut record) => {
                    record.last_seen = now;
                    record
                }
                None => {
                    diff.added.push(address);
                    DeviceRecord::new(address, now)
                }
            };
            seen.push(record.clone());
            next.insert(address, record);
        }
        diff.removed = records.keys().copied().collect();
        diff.removed.sort_by_key(|address| address.search_key());
        *records = next;
        if !diff.is_empty() {
            debug!(
                "registry: {} added, {} removed, {} present",
                diff.added.len(),
                diff.removed.len(),
                seen.len()
            );
        }
        (seen, diff)
    }

    /// The record of `address`.
    pub fn lookup(&self, address: RomAddress) -> Result<DeviceRecord> {
        self.records
            .read()
            .get(&address)
            .cloned()
            .ok_or(Error::NotFound(address))
    }

    /// Every record, in search order.
    pub fn records(&self) -> Vec<DeviceRecord> {
        let mut records: Vec<_> = self.records.read().values().cloned().collect();
        records.sort_by_key(|record| record.address.search_key());
        records
    }

    /// Number of known devices.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// No device known.
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Forgets every device.
    pub fn clear(&self) {
        self.records.write().clear();
    }
}
