use crate::{
    BusConfig, DeviceRecord, DeviceRegistry, Error, RefreshDiff, Result, ScanCache,
    StatsSnapshot, Transaction, Transport, stats::BusStats,
};
use embedded_hal::delay::DelayNs;
use embedded_onewire::{OneWireSearchKind, Presence, RomAddress};
use linux_embedded_hal::Delay;
use log::{debug, info};
use parking_lot::Mutex;
use std::{sync::Arc, time::Duration};

const DEFAULT_PORT_NAME: &str = "onewire";

/// State guarded by the bus lock.
pub(crate) struct Line<T, D> {
    /// `None` once a fatal transport error invalidated the bus.
    pub(crate) transport: Option<T>,
    pub(crate) delay: D,
    /// The last transaction ended without [`Transaction::commit`].
    pub(crate) unsettled: bool,
}

/// An open 1-Wire bus.
///
/// The bus owns its transport and serializes access to it: every operation runs inside a
/// [`Transaction`], and at most one transaction exists at a time. A `Bus` can be shared
/// between threads through `&Bus` or an [`Arc`].
///
/// A fatal transport error invalidates the bus. Every later call fails with
/// [`Error::InvalidHandle`] until the transport is replaced with
/// [`reopen_with`](Bus::reopen_with) (or `reopen` for buses opened from a [`BusConfig`]).
pub struct Bus<T, D = Delay> {
    pub(crate) port: String,
    pub(crate) config: Option<BusConfig>,
    line: Mutex<Line<T, D>>,
    registry: DeviceRegistry,
    pub(crate) cache: ScanCache,
    pub(crate) stats: BusStats,
    acquire_timeout: Duration,
}

impl<T, D> Bus<T, D> {
    /// Wraps a ready transport.
    pub fn new(transport: T, delay: D) -> Self {
        let defaults = BusConfig::default();
        Self {
            port: DEFAULT_PORT_NAME.into(),
            config: None,
            line: Mutex::new(Line {
                transport: Some(transport),
                delay,
                unsettled: false,
            }),
            registry: DeviceRegistry::new(),
            cache: ScanCache::new(defaults.cache_ttl()),
            stats: BusStats::default(),
            acquire_timeout: defaults.acquire_timeout(),
        }
    }

    /// Sets how long callers wait for the bus before [`Error::BusBusy`].
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Sets how long a scan is served from the cache. Zero disables the cache.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache = ScanCache::new(ttl);
        self
    }

    /// Sets the name used in logs and [`Error::Transport`].
    pub fn with_port_name(mut self, port: impl Into<String>) -> Self {
        self.port = port.into();
        self
    }

    pub(crate) fn with_config(mut self, config: BusConfig) -> Self {
        self.port = config.port.clone();
        self.acquire_timeout = config.acquire_timeout();
        self.cache = ScanCache::new(config.cache_ttl());
        self.config = Some(config);
        self
    }

    /// Name of the port.
    pub fn port(&self) -> &str {
        &self.port
    }

    /// Configuration the bus was opened from.
    pub fn config(&self) -> Option<&BusConfig> {
        self.config.as_ref()
    }

    /// Devices found by the last search.
    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    /// Counters since the bus was created.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// `false` once a fatal transport error invalidated the bus.
    pub fn is_valid(&self) -> bool {
        self.line.lock().transport.is_some()
    }

    /// Closes the bus and hands back the transport, if it is still usable.
    pub fn close(self) -> Option<T> {
        info!("{}: closing bus", self.port);
        self.line.into_inner().transport
    }

    /// Installs a new transport on an invalidated (or working) bus.
    ///
    /// The first transaction afterwards starts with a reset, and the scan cache is dropped.
    pub fn reopen_with(&self, transport: T) -> Result<()> {
        let mut line = self.line.try_lock_for(self.acquire_timeout).ok_or_else(|| {
            self.stats.busy(1);
            Error::BusBusy {
                waited: self.acquire_timeout,
            }
        })?;
        line.transport = Some(transport);
        line.unsettled = true;
        self.cache.invalidate();
        info!("{}: transport reopened", self.port);
        Ok(())
    }
}

impl<T: Transport, D: DelayNs> Bus<T, D> {
    /// Acquires the bus for a sequence of raw operations.
    ///
    /// # Errors
    /// [`Error::BusBusy`] if another transaction holds the bus for longer than the acquire
    /// timeout, [`Error::InvalidHandle`] if the bus was invalidated. The forced reset after
    /// an unfinished transaction may fail like [`Transaction::reset`].
    pub fn transaction(&self) -> Result<Transaction<'_, T, D>> {
        let Some(line) = self.line.try_lock_for(self.acquire_timeout) else {
            self.stats.busy(1);
            debug!("{}: bus busy after {:?}", self.port, self.acquire_timeout);
            return Err(Error::BusBusy {
                waited: self.acquire_timeout,
            });
        };
        Transaction::begin(self, line)
    }

    /// Reset pulse and presence detection.
    pub fn reset(&self) -> Result<Presence> {
        let mut tx = self.transaction()?;
        let presence = tx.reset()?;
        tx.commit();
        Ok(presence)
    }

    /// Devices on the bus, in search order.
    ///
    /// Served from the scan cache while it is fresh, otherwise the bus is searched.
    pub fn scan_devices(&self) -> Result<Arc<[DeviceRecord]>> {
        if let Some(records) = self.cache.get() {
            self.stats.cache_hits(1);
            return Ok(records);
        }
        self.rescan().map(|(records, _)| records)
    }

    /// Searches the bus, bypassing the cache, and reports what changed since the last search.
    pub fn rescan(&self) -> Result<(Arc<[DeviceRecord]>, RefreshDiff)> {
        self.cache.invalidate();
        let mut tx = self.transaction()?;
        let (records, diff) = self.registry.refresh(&mut tx)?;
        tx.commit();
        for address in &diff.added {
            info!("{}: device {address} appeared", self.port);
        }
        for address in &diff.removed {
            info!("{}: device {address} left", self.port);
        }
        let records: Arc<[DeviceRecord]> = records.into();
        self.cache.store(Arc::clone(&records));
        Ok((records, diff))
    }

    /// Addresses of the devices in alarm state, in search order.
    ///
    /// The registry and the scan cache are left as they are.
    pub fn scan_alarms(&self) -> Result<Vec<RomAddress>> {
        let mut tx = self.transaction()?;
        let alarmed = tx.search(OneWireSearchKind::Alarmed)?;
        tx.commit();
        Ok(alarmed)
    }

    /// `true` if the device with `address` answers a search forced down its address.
    pub fn verify_device(&self, address: RomAddress) -> Result<bool> {
        let mut tx = self.transaction()?;
        let present = tx.verify(address)?;
        tx.commit();
        Ok(present)
    }

    /// Record of a device found by an earlier scan.
    pub fn lookup(&self, address: RomAddress) -> Result<DeviceRecord> {
        self.registry.lookup(address)
    }
}
