//! A simulated 1-Wire bus.
//!
//! [`SimBus`] models the wired-AND line shared by any number of [`SimDevice`]s and
//! implements the ROM layer (Match ROM, Skip ROM, Read ROM, normal and conditional
//! search) itself. Function commands are forwarded to whichever devices are selected, so
//! a device model only has to implement its own command set.
//!
//! The bus is a cheap handle: clones share the same line, which lets a test keep a handle
//! to change the topology while another copy is owned by the code under test.

use crate::{
    OneWire, OneWireError, OneWireResult, OneWireStatus, RomAddress, TransportFault,
    consts::{
        ONEWIRE_CONDITIONAL_SEARCH_CMD, ONEWIRE_MATCH_ROM_CMD, ONEWIRE_READ_ROM_CMD,
        ONEWIRE_SEARCH_CMD, ONEWIRE_SKIP_ROM_CMD,
    },
};
use core::fmt;
use std::{
    boxed::Box,
    sync::{Arc, Mutex, MutexGuard},
    thread,
    time::Duration,
    vec::Vec,
};

/// Behaviour of one device on a [`SimBus`].
pub trait SimDevice: Send {
    /// The device address.
    fn rom(&self) -> RomAddress;

    /// Whether the device answers a conditional (alarm) search.
    fn alarmed(&self) -> bool {
        false
    }

    /// A reset pulse aborted whatever function command was in progress.
    fn reset(&mut self) {}

    /// Byte written by the master while this device is selected.
    fn write_byte(&mut self, _byte: u8) {}

    /// Byte the device drives when the master reads; `0xff` leaves the line released.
    fn read_byte(&mut self) -> u8 {
        0xff
    }

    /// Single read slot while selected.
    fn read_bit(&mut self) -> bool {
        true
    }
}

/// A device that only has a ROM, like a DS2401 serial number chip.
#[derive(Debug, Clone, Copy)]
pub struct SimRom {
    rom: RomAddress,
    alarmed: bool,
}

impl SimRom {
    /// A device answering to `rom`. The address is used as is, valid CRC or not.
    pub fn new(rom: RomAddress) -> Self {
        Self { rom, alarmed: false }
    }

    /// Sets the alarm flag seen by conditional searches.
    pub fn alarmed(mut self, alarmed: bool) -> Self {
        self.alarmed = alarmed;
        self
    }
}

impl SimDevice for SimRom {
    fn rom(&self) -> RomAddress {
        self.rom
    }

    fn alarmed(&self) -> bool {
        self.alarmed
    }
}

/// Bus traffic recorded by a [`SimBus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimEvent {
    /// Reset pulse.
    Reset,
    /// Byte written by the master.
    Write(u8),
    /// Byte read by the master.
    Read(u8),
    /// Single bit written by the master.
    WriteBit(bool),
    /// Single bit read by the master.
    ReadBit(bool),
}

/// Failure injected with [`SimBus::fail_after`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimError {
    /// The simulated adapter went away.
    Disconnected,
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("simulated adapter disconnected")
    }
}

impl std::error::Error for SimError {}

impl TransportFault for SimError {}

/// Reset status of a [`SimBus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimStatus {
    presence: bool,
    short: bool,
    alarm: bool,
}

impl OneWireStatus for SimStatus {
    fn presence(&self) -> bool {
        self.presence
    }

    fn shortcircuit(&self) -> bool {
        self.short
    }

    fn alarm(&self) -> bool {
        self.alarm
    }
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Idle,
    RomCommand,
    MatchRom { bytes: [u8; 8], count: usize },
    ReadRom { index: usize },
    Search { bit: u8, slot: u8 },
    Function,
}

struct Line {
    devices: Vec<Box<dyn SimDevice>>,
    active: Vec<bool>,
    phase: Phase,
    trace: Vec<SimEvent>,
    latency: Duration,
    fail_after: Option<usize>,
    ops: usize,
    shorted: bool,
    triplets: bool,
}

impl Default for Line {
    fn default() -> Self {
        Self {
            devices: Vec::new(),
            active: Vec::new(),
            phase: Phase::Idle,
            trace: Vec::new(),
            latency: Duration::ZERO,
            fail_after: None,
            ops: 0,
            shorted: false,
            triplets: false,
        }
    }
}

impl Line {
    fn tick(&mut self) -> OneWireResult<(), SimError> {
        self.ops += 1;
        match self.fail_after {
            Some(limit) if self.ops > limit => Err(OneWireError::Other(SimError::Disconnected)),
            _ => Ok(()),
        }
    }

    fn select_all(&mut self) {
        self.active = self.devices.iter().map(|_| true).collect();
    }

    fn wired_and(&self, f: impl Fn(&dyn SimDevice) -> bool) -> bool {
        self.devices
            .iter()
            .zip(self.active.iter())
            .filter(|(_, active)| **active)
            .all(|(dev, _)| f(dev.as_ref()))
    }

    fn reset(&mut self) -> SimStatus {
        for dev in self.devices.iter_mut() {
            dev.reset();
        }
        self.select_all();
        self.phase = Phase::RomCommand;
        SimStatus {
            presence: !self.devices.is_empty() || self.shorted,
            short: self.shorted,
            alarm: self.devices.iter().any(|dev| dev.alarmed()),
        }
    }

    fn write_byte(&mut self, byte: u8) {
        self.phase = match self.phase {
            Phase::RomCommand => match byte {
                ONEWIRE_MATCH_ROM_CMD => Phase::MatchRom {
                    bytes: [0; 8],
                    count: 0,
                },
                ONEWIRE_SKIP_ROM_CMD => Phase::Function,
                ONEWIRE_READ_ROM_CMD => Phase::ReadRom { index: 0 },
                ONEWIRE_SEARCH_CMD => Phase::Search { bit: 0, slot: 0 },
                ONEWIRE_CONDITIONAL_SEARCH_CMD => {
                    for (dev, active) in self.devices.iter().zip(self.active.iter_mut()) {
                        *active = dev.alarmed();
                    }
                    Phase::Search { bit: 0, slot: 0 }
                }
                _ => Phase::Idle,
            },
            Phase::MatchRom { mut bytes, count } => {
                bytes[count] = byte;
                if count + 1 < bytes.len() {
                    Phase::MatchRom {
                        bytes,
                        count: count + 1,
                    }
                } else {
                    let target = RomAddress::from_bytes(bytes);
                    for (dev, active) in self.devices.iter().zip(self.active.iter_mut()) {
                        *active = dev.rom() == target;
                    }
                    Phase::Function
                }
            }
            Phase::Function => {
                for (dev, active) in self.devices.iter_mut().zip(self.active.iter()) {
                    if *active {
                        dev.write_byte(byte);
                    }
                }
                Phase::Function
            }
            Phase::Search { .. } | Phase::ReadRom { .. } | Phase::Idle => Phase::Idle,
        };
    }

    fn read_byte(&mut self) -> u8 {
        match self.phase {
            Phase::Function => {
                let mut value = 0xff;
                for (dev, active) in self.devices.iter_mut().zip(self.active.iter()) {
                    if *active {
                        value &= dev.read_byte();
                    }
                }
                value
            }
            Phase::ReadRom { index } if index < 8 => {
                self.phase = Phase::ReadRom { index: index + 1 };
                let mut value = 0xff;
                for (dev, active) in self.devices.iter().zip(self.active.iter()) {
                    if *active {
                        value &= dev.rom().to_bytes()[index];
                    }
                }
                value
            }
            _ => 0xff,
        }
    }

    fn write_bit(&mut self, value: bool) {
        match self.phase {
            Phase::Search { bit, slot: 2 } => {
                for (dev, active) in self.devices.iter().zip(self.active.iter_mut()) {
                    *active &= dev.rom().bit(bit) == value;
                }
                self.phase = if bit + 1 == RomAddress::BITS {
                    Phase::Function
                } else {
                    Phase::Search {
                        bit: bit + 1,
                        slot: 0,
                    }
                };
            }
            Phase::Function => {}
            _ => self.phase = Phase::Idle,
        }
    }

    fn read_bit(&mut self) -> bool {
        match self.phase {
            Phase::Search { bit, slot: 0 } => {
                self.phase = Phase::Search { bit, slot: 1 };
                self.wired_and(|dev| dev.rom().bit(bit))
            }
            Phase::Search { bit, slot: 1 } => {
                self.phase = Phase::Search { bit, slot: 2 };
                self.wired_and(|dev| !dev.rom().bit(bit))
            }
            Phase::Function => {
                let mut value = true;
                for (dev, active) in self.devices.iter_mut().zip(self.active.iter()) {
                    if *active {
                        value &= dev.read_bit();
                    }
                }
                value
            }
            _ => true,
        }
    }
}

/// Shared handle to a simulated 1-Wire line.
#[derive(Clone, Default)]
pub struct SimBus {
    line: Arc<Mutex<Line>>,
}

impl fmt::Debug for SimBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimBus").field("devices", &self.devices()).finish()
    }
}

impl SimBus {
    /// An empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    fn line(&self) -> MutexGuard<'_, Line> {
        self.line.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Connects a device. It takes part from the next reset on.
    pub fn attach(&self, device: impl SimDevice + 'static) {
        let mut line = self.line();
        line.devices.push(Box::new(device));
        line.active.push(false);
    }

    /// Disconnects every device answering to `rom`. Returns `true` if one was removed.
    pub fn detach(&self, rom: RomAddress) -> bool {
        let mut line = self.line();
        let before = line.devices.len();
        let Line { devices, active, .. } = &mut *line;
        let mut keep = devices.iter().map(|dev| dev.rom() != rom);
        active.retain(|_| keep.next().unwrap_or(true));
        devices.retain(|dev| dev.rom() != rom);
        line.devices.len() != before
    }

    /// Addresses of the connected devices, in attach order.
    pub fn devices(&self) -> Vec<RomAddress> {
        self.line().devices.iter().map(|dev| dev.rom()).collect()
    }

    /// Traffic recorded since the bus was created or the trace was cleared.
    pub fn trace(&self) -> Vec<SimEvent> {
        self.line().trace.clone()
    }

    /// Returns and clears the recorded traffic.
    pub fn take_trace(&self) -> Vec<SimEvent> {
        core::mem::take(&mut self.line().trace)
    }

    /// Clears the recorded traffic.
    pub fn clear_trace(&self) {
        self.line().trace.clear();
    }

    /// Number of bus operations performed so far.
    pub fn operations(&self) -> usize {
        self.line().ops
    }

    /// Sleeps this long before each bus operation.
    pub fn set_latency(&self, latency: Duration) {
        self.line().latency = latency;
    }

    /// Every operation after the next `ops` fails with [`SimError::Disconnected`].
    pub fn fail_after(&self, ops: usize) {
        let mut line = self.line();
        line.fail_after = Some(line.ops + ops);
    }

    /// Clears an injected failure.
    pub fn restore(&self) {
        self.line().fail_after = None;
    }

    /// Holds the line low: resets report a short circuit.
    pub fn set_shorted(&self, shorted: bool) {
        self.line().shorted = shorted;
    }

    /// Makes the adapter offer hardware search triplets.
    pub fn set_triplets(&self, triplets: bool) {
        self.line().triplets = triplets;
    }

    fn operate<R>(
        &mut self,
        f: impl FnOnce(&mut Line) -> R,
    ) -> OneWireResult<R, SimError> {
        let latency = self.line().latency;
        if !latency.is_zero() {
            thread::sleep(latency);
        }
        let mut line = self.line();
        line.tick()?;
        Ok(f(&mut line))
    }
}

impl OneWire for SimBus {
    type Status = SimStatus;

    type BusError = SimError;

    fn reset(&mut self) -> OneWireResult<Self::Status, Self::BusError> {
        self.operate(|line| {
            line.trace.push(SimEvent::Reset);
            line.reset()
        })
    }

    fn write_byte(&mut self, byte: u8) -> OneWireResult<(), Self::BusError> {
        self.operate(|line| {
            line.trace.push(SimEvent::Write(byte));
            line.write_byte(byte)
        })
    }

    fn read_byte(&mut self) -> OneWireResult<u8, Self::BusError> {
        self.operate(|line| {
            let byte = line.read_byte();
            line.trace.push(SimEvent::Read(byte));
            byte
        })
    }

    fn write_bit(&mut self, bit: bool) -> OneWireResult<(), Self::BusError> {
        self.operate(|line| {
            line.trace.push(SimEvent::WriteBit(bit));
            line.write_bit(bit)
        })
    }

    fn read_bit(&mut self) -> OneWireResult<bool, Self::BusError> {
        self.operate(|line| {
            let bit = line.read_bit();
            line.trace.push(SimEvent::ReadBit(bit));
            bit
        })
    }

    fn read_triplet(&mut self, direction: bool) -> OneWireResult<(bool, bool, bool), Self::BusError> {
        if !self.line().triplets {
            return Err(OneWireError::Unimplemented);
        }
        let id_bit = self.read_bit()?;
        let complement_bit = self.read_bit()?;
        let taken = if id_bit == complement_bit {
            direction || id_bit
        } else {
            id_bit
        };
        self.write_bit(taken)?;
        Ok((id_bit, complement_bit, taken))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn match_rom_selects_one_device() {
        struct Echo(RomAddress, u8);
        impl SimDevice for Echo {
            fn rom(&self) -> RomAddress {
                self.0
            }
            fn write_byte(&mut self, byte: u8) {
                self.1 = byte;
            }
            fn read_byte(&mut self) -> u8 {
                self.1
            }
        }
        let a = RomAddress::new(0x3a, [1, 2, 3, 4, 5, 6]);
        let b = RomAddress::new(0x3a, [6, 5, 4, 3, 2, 1]);
        let mut bus = SimBus::new();
        bus.attach(Echo(a, 0));
        bus.attach(Echo(b, 0));
        bus.address(Some(a)).unwrap();
        bus.write_byte(0x0f).unwrap();
        assert_eq!(bus.read_byte().unwrap(), 0x0f);
        bus.address(Some(b)).unwrap();
        assert_eq!(bus.read_byte().unwrap(), 0x00);
    }

    #[test]
    fn read_rom_on_single_drop_bus() {
        let rom = RomAddress::new(0x01, [0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);
        let mut bus = SimBus::new();
        bus.attach(SimRom::new(rom));
        bus.reset().unwrap();
        bus.write_byte(ONEWIRE_READ_ROM_CMD).unwrap();
        let mut bytes = [0u8; 8];
        bus.read_bytes(&mut bytes).unwrap();
        assert_eq!(RomAddress::from_bytes(bytes), rom);
    }

    #[test]
    fn short_and_failure_injection() {
        let mut bus = SimBus::new();
        bus.set_shorted(true);
        assert!(bus.reset().unwrap().shortcircuit());
        bus.set_shorted(false);
        bus.fail_after(1);
        assert!(bus.reset().is_ok());
        assert!(matches!(bus.reset(), Err(OneWireError::Other(SimError::Disconnected))));
        bus.restore();
        assert!(bus.reset().is_ok());
    }
}
