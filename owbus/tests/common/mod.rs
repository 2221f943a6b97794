#![allow(dead_code)]

use embedded_hal_mock::eh1::delay::NoopDelay;
use embedded_onewire::sim::SimBus;
use owbus::{Bus, RomAddress};
use rand::{Rng, SeedableRng, rngs::StdRng};
use std::collections::HashSet;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn rom(family: u8, n: u8) -> RomAddress {
    RomAddress::new(family, [n, 0x10, 0x20, 0x30, 0x40, 0x50])
}

/// `count` distinct addresses drawn from `families`.
pub fn random_roms(seed: u64, count: usize, families: &[u8]) -> Vec<RomAddress> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut seen = HashSet::new();
    while seen.len() < count {
        let family = families[rng.random_range(0..families.len())];
        seen.insert(RomAddress::new(family, rng.random()));
    }
    seen.into_iter().collect()
}

pub fn sim_bus() -> (SimBus, Bus<SimBus, NoopDelay>) {
    init_logger();
    let sim = SimBus::new();
    let bus = Bus::new(sim.clone(), NoopDelay).with_port_name("sim");
    (sim, bus)
}
