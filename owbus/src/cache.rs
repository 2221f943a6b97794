use crate::DeviceRecord;
use log::trace;
use parking_lot::Mutex;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};

/// Last successful scan of a bus, reused while younger than its time to live.
///
/// The cache is never authoritative: dropping it only costs a search.
#[derive(Debug)]
pub struct ScanCache {
    ttl: Duration,
    snapshot: Mutex<Option<(Instant, Arc<[DeviceRecord]>)>>,
}

impl ScanCache {
    /// A cache keeping scans for `ttl`. A zero `ttl` keeps nothing.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            snapshot: Mutex::new(None),
        }
    }

    /// Time to live of a snapshot.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The cached scan, if still fresh.
    pub fn get(&self) -> Option<Arc<[DeviceRecord]>> {
        self.get_at(Instant::now())
    }

    pub(crate) fn get_at(&self, now: Instant) -> Option<Arc<[DeviceRecord]>> {
        let mut snapshot = self.snapshot.lock();
        let fresh = snapshot
            .as_ref()
            .filter(|(taken, _)| now.saturating_duration_since(*taken) < self.ttl)
            .map(|(_, records)| Arc::clone(records));
        if fresh.is_none() && snapshot.is_some() {
            trace!("scan cache expired");
            *snapshot = None;
        }
        fresh
    }

    /// Replaces the snapshot.
    pub fn store(&self, records: Arc<[DeviceRecord]>) {
        if !self.ttl.is_zero() {
            *self.snapshot.lock() = Some((Instant::now(), records));
        }
    }

    /// Drops the snapshot; the next scan searches the bus.
    pub fn invalidate(&self) {
        self.snapshot.lock().take();
    }
}
