use crate::{
    OneWire, OneWireError, OneWireResult, Presence, RomAddress,
    consts::{ONEWIRE_CONDITIONAL_SEARCH_CMD, ONEWIRE_SEARCH_CMD},
    presence,
};
use log::{debug, trace};

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Type of search performed using [`OneWireSearch`].
pub enum OneWireSearchKind {
    /// Normal search
    Normal = ONEWIRE_SEARCH_CMD,
    /// Search only for devices with alarm
    Alarmed = ONEWIRE_CONDITIONAL_SEARCH_CMD,
}

/// A partial address: bits `0..forced` of `prefix` are fixed for the next pass.
#[derive(Debug, Clone, Copy, Default)]
struct Branch {
    prefix: u64,
    forced: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Fresh,
    Running,
    Done,
}

enum Pass {
    /// 64 bits were read; the address still has to pass its CRC check.
    Found(RomAddress),
    /// Nobody answered somewhere along the forced path.
    Dead,
    /// The reset saw no presence pulse.
    Empty,
}

/// A structure for searching devices on a 1-Wire bus.
///
/// Implements the [1-Wire search algorithm](https://www.analog.com/en/resources/app-notes/1wire-search-algorithm.html)
/// as a depth-first walk of the address tree. Every conflict bit (two devices disagreeing)
/// is recorded on an explicit stack of partial addresses; the walk takes the 0-branch first
/// and a later pass forces the recorded prefix to explore the 1-branch. Since pending
/// branches sit at strictly increasing bit positions the stack never holds more than 64
/// entries.
///
/// Addresses come out in ascending transmission-bit order (see [`RomAddress::search_key`]).
/// Addresses that fail their CRC are discarded and counted, never returned.
pub struct OneWireSearch<'a, T> {
    onewire: &'a mut T,
    cmd: u8,
    family: Option<u8>,
    pending: [Branch; 64],
    depth: usize,
    state: State,
    discarded: u32,
}

impl<'a, T> OneWireSearch<'a, T> {
    /// Creates a new [`OneWireSearch`] instance.
    ///
    /// # Arguments
    /// * `onewire` - A mutable reference to a type that implements the `OneWire` trait.
    /// * `kind` - Normal search, or search restricted to devices in alarm state.
    pub fn new(onewire: &'a mut T, kind: OneWireSearchKind) -> Self {
        Self {
            onewire,
            cmd: kind as _,
            family: None,
            pending: [Branch::default(); 64],
            depth: 0,
            state: State::Fresh,
            discarded: 0,
        }
    }

    /// Creates a new [`OneWireSearch`] instance restricted to one family code.
    ///
    /// The first 8 bits of every pass are forced to `family`, so devices of other
    /// families are never walked.
    pub fn with_family(onewire: &'a mut T, kind: OneWireSearchKind, family: u8) -> Self {
        let mut search = Self::new(onewire, kind);
        search.family = Some(family);
        search
    }

    /// Forgets all progress; the next call to `next` starts over with a fresh reset.
    pub fn restart(&mut self) {
        self.depth = 0;
        self.state = State::Fresh;
        self.discarded = 0;
    }

    /// `true` once the search has returned its last address (or failed).
    pub fn is_finished(&self) -> bool {
        self.state == State::Done
    }

    /// Number of addresses dropped for a bad CRC or a null family code since the last restart.
    pub fn discarded(&self) -> u32 {
        self.discarded
    }

    fn root(&self) -> Branch {
        match self.family {
            Some(family) => Branch {
                prefix: family as u64,
                forced: 8,
            },
            None => Branch::default(),
        }
    }

    fn push(&mut self, branch: Branch) {
        debug_assert!(self.depth < self.pending.len());
        if let Some(slot) = self.pending.get_mut(self.depth) {
            *slot = branch;
            self.depth += 1;
        }
    }

    fn pop(&mut self) -> Option<Branch> {
        if self.depth == 0 {
            return None;
        }
        self.depth -= 1;
        Some(self.pending[self.depth])
    }
}

impl<'a, T: OneWire> OneWireSearch<'a, T> {
    /// Finds the next device on the 1-Wire bus.
    ///
    /// Each call performs at most as many bus passes as it takes to reach a valid
    /// address: reset, search command, then 64 id/complement/direction triplets.
    ///
    /// # Returns
    /// `Ok(None)` once every branch has been walked, or right after the first reset
    /// if no device answers it.
    ///
    /// # Errors
    /// Any transport error aborts the search; it must be restarted (with a fresh reset)
    /// to be retried. [`OneWireError::ShortCircuit`] if the adapter reports a shorted line.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> OneWireResult<Option<RomAddress>, T::BusError> {
        loop {
            let branch = match self.state {
                State::Done => return Ok(None),
                State::Fresh => {
                    self.state = State::Running;
                    self.root()
                }
                State::Running => match self.pop() {
                    Some(branch) => branch,
                    None => {
                        self.state = State::Done;
                        return Ok(None);
                    }
                },
            };
            match self.pass(branch) {
                Ok(Pass::Found(rom)) if rom.is_valid() && rom.family_code() != 0 => {
                    return Ok(Some(rom));
                }
                Ok(Pass::Found(rom)) => {
                    self.discarded += 1;
                    debug!("search: discarding {rom}, CRC or family invalid");
                }
                Ok(Pass::Dead) => {
                    trace!("search: branch at bit {} went silent", branch.forced);
                }
                Ok(Pass::Empty) => {
                    self.state = State::Done;
                    return Ok(None);
                }
                Err(e) => {
                    self.state = State::Done;
                    return Err(e);
                }
            }
        }
    }

    /// Verifies if the device with the given ROM code is present on the 1-Wire bus.
    ///
    /// Runs a single pass with all 64 bits forced to `rom`. Pending search state is left
    /// untouched.
    pub fn verify(&mut self, rom: RomAddress) -> OneWireResult<bool, T::BusError> {
        let branch = Branch {
            prefix: rom.raw(),
            forced: RomAddress::BITS,
        };
        Ok(matches!(self.pass(branch)?, Pass::Found(found) if found == rom))
    }

    /// Borrows the search as an iterator that stops after the first error.
    pub fn devices(&mut self) -> SearchIter<'_, 'a, T> {
        SearchIter { search: self }
    }

    fn pass(&mut self, branch: Branch) -> OneWireResult<Pass, T::BusError> {
        if presence(&mut *self.onewire)? == Presence::NoDevices {
            return Ok(Pass::Empty);
        }
        self.onewire.write_byte(self.cmd)?;
        let mut rom = 0u64;
        for bit in 0..RomAddress::BITS {
            let forced = bit < branch.forced;
            let wanted = (branch.prefix >> bit) & 1 == 1;
            let (id_bit, complement_bit, taken) = self.triplet(forced && wanted)?;
            match (id_bit, complement_bit) {
                (true, true) => return Ok(Pass::Dead),
                (false, false) if !forced => self.push(Branch {
                    prefix: rom | 1 << bit,
                    forced: bit + 1,
                }),
                (false, false) => {}
                (id_bit, _) if forced && id_bit != wanted => return Ok(Pass::Dead),
                _ => {}
            }
            if taken {
                rom |= 1 << bit;
            }
        }
        Ok(Pass::Found(RomAddress::from_raw(rom)))
    }

    /// Reads the id bit and its complement and writes the chosen direction.
    fn triplet(&mut self, direction: bool) -> OneWireResult<(bool, bool, bool), T::BusError> {
        match self.onewire.read_triplet(direction) {
            Err(OneWireError::Unimplemented) => {}
            other => return other,
        }
        let id_bit = self.onewire.read_bit()?;
        let complement_bit = self.onewire.read_bit()?;
        let taken = match (id_bit, complement_bit) {
            (true, true) => return Ok((true, true, true)),
            (false, false) => direction,
            (id_bit, _) => id_bit,
        };
        self.onewire.write_bit(taken)?;
        Ok((id_bit, complement_bit, taken))
    }
}

/// Iterator over the remaining devices of a [`OneWireSearch`].
pub struct SearchIter<'s, 'a, T> {
    search: &'s mut OneWireSearch<'a, T>,
}

impl<T: OneWire> Iterator for SearchIter<'_, '_, T> {
    type Item = OneWireResult<RomAddress, T::BusError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.search.next().transpose()
    }
}
