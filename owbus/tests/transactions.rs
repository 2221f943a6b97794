mod common;

use common::{rom, sim_bus};
use embedded_hal_mock::eh1::delay::NoopDelay;
use embedded_onewire::sim::{SimBus, SimEvent, SimRom};
use owbus::{Bus, Error, Presence, RetryPolicy};
use std::{sync::Arc, thread, time::Duration};

#[test]
fn second_caller_gets_bus_busy() {
    let (sim, bus) = sim_bus();
    sim.attach(SimRom::new(rom(0x28, 1)));
    let bus = bus.with_acquire_timeout(Duration::from_millis(20));
    let tx = bus.transaction().unwrap();
    thread::scope(|s| {
        let waiter = s.spawn(|| bus.reset());
        match waiter.join().unwrap() {
            Err(Error::BusBusy { waited }) => assert_eq!(waited, Duration::from_millis(20)),
            other => panic!("expected BusBusy, got {other:?}"),
        }
    });
    tx.commit();
    assert_eq!(bus.reset().unwrap(), Presence::DevicesPresent);
    assert_eq!(bus.stats().busy, 1);
}

#[test]
fn busy_bus_can_be_retried() {
    let (sim, bus) = sim_bus();
    sim.attach(SimRom::new(rom(0x28, 1)));
    let bus = bus.with_acquire_timeout(Duration::from_millis(10));
    let policy = RetryPolicy::default()
        .with_attempts(50)
        .with_backoff(Duration::from_millis(10), 1);
    thread::scope(|s| {
        let tx = bus.transaction().unwrap();
        let waiter = s.spawn(|| policy.run(|| bus.reset()));
        thread::sleep(Duration::from_millis(50));
        tx.commit();
        assert_eq!(waiter.join().unwrap().unwrap(), Presence::DevicesPresent);
    });
    assert!(bus.stats().busy >= 1);
}

#[test]
fn transactions_never_interleave() {
    let (sim, bus) = sim_bus();
    let roms: Vec<_> = (1..=4).map(|n| rom(0x3a, n)).collect();
    for &address in &roms {
        sim.attach(SimRom::new(address));
    }
    sim.set_latency(Duration::from_micros(200));
    let bus = Arc::new(bus.with_acquire_timeout(Duration::from_secs(30)));
    let workers: Vec<_> = roms
        .iter()
        .enumerate()
        .map(|(i, &address)| {
            let bus = Arc::clone(&bus);
            thread::spawn(move || {
                for _ in 0..5 {
                    let mut tx = bus.transaction().unwrap();
                    tx.select(address).unwrap();
                    tx.write(&[0xb0 + i as u8]).unwrap();
                    tx.commit();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    let trace = sim.take_trace();
    let sessions: Vec<&[SimEvent]> = trace
        .split(|event| *event == SimEvent::Reset)
        .filter(|s| !s.is_empty())
        .collect();
    assert_eq!(sessions.len(), 20);
    for session in sessions {
        let bytes: Vec<u8> = session
            .iter()
            .map(|event| match event {
                SimEvent::Write(byte) => *byte,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(bytes.len(), 10);
        assert_eq!(bytes[0], 0x55);
        let i = (bytes[9] - 0xb0) as usize;
        assert_eq!(&bytes[1..9], &roms[i].to_bytes());
    }
}

#[test]
fn dropped_transaction_forces_reset() {
    let (sim, bus) = sim_bus();
    sim.attach(SimRom::new(rom(0x28, 1)));
    {
        let mut tx = bus.transaction().unwrap();
        tx.select(rom(0x28, 1)).unwrap();
    }
    sim.clear_trace();
    let mut tx = bus.transaction().unwrap();
    assert_eq!(sim.trace(), vec![SimEvent::Reset]);
    assert_eq!(tx.skip().unwrap(), Presence::DevicesPresent);
    tx.commit();
    assert_eq!(bus.stats().forced_resets, 1);
}

#[test]
fn skip_on_empty_bus_sends_nothing() {
    let (sim, bus) = sim_bus();
    let mut tx = bus.transaction().unwrap();
    assert_eq!(tx.skip().unwrap(), Presence::NoDevices);
    tx.commit();
    assert_eq!(sim.take_trace(), vec![SimEvent::Reset]);
}

#[test]
fn lock_released_on_panic() {
    let (sim, bus) = sim_bus();
    sim.attach(SimRom::new(rom(0x28, 1)));
    let bus = bus.with_acquire_timeout(Duration::from_millis(100));
    let unwound = thread::scope(|s| {
        s.spawn(|| {
            let _tx = bus.transaction().unwrap();
            panic!("caller bug");
        })
        .join()
    });
    assert!(unwound.is_err());
    assert_eq!(bus.reset().unwrap(), Presence::DevicesPresent);
    assert_eq!(bus.stats().forced_resets, 1);
}

#[test]
fn bus_is_shareable() {
    fn assert_sync<T: Send + Sync>() {}
    assert_sync::<Bus<SimBus, NoopDelay>>();
}
