use crate::{
    Ds2482, Ds2482Error,
    registers::{
        DATA_REGISTER, DeviceStatus, ONEWIRE_READ_BYTE, ONEWIRE_RESET, ONEWIRE_SINGLE_BIT,
        ONEWIRE_TRIPLET, ONEWIRE_WRITE_BYTE, STATUS_REGISTER,
    },
};
use embedded_hal::{
    delay::DelayNs,
    i2c::{I2c, SevenBitAddress},
};
use embedded_onewire::{OneWire, OneWireError, OneWireResult, OneWireStatus};
use log::trace;

/// A bridge that stays busy is reported as a timeout, the next reset may recover it.
fn lift<E>(e: Ds2482Error<E>) -> OneWireError<Ds2482Error<E>> {
    match e {
        Ds2482Error::RetriesExceeded => OneWireError::Timeout,
        e => OneWireError::Other(e),
    }
}

impl<I: I2c<SevenBitAddress>, D: DelayNs> Ds2482<I, D> {
    /// Starts a 1-Wire command and waits for the bridge to finish it.
    fn run(&mut self, command: &[u8]) -> OneWireResult<DeviceStatus, Ds2482Error<I::Error>> {
        self.i2c
            .write(self.addr, command)
            .map_err(|e| OneWireError::Other(Ds2482Error::I2c(e)))?;
        self.pointer = STATUS_REGISTER;
        self.wait().map_err(lift)
    }
}

impl<I: I2c<SevenBitAddress>, D: DelayNs> OneWire for Ds2482<I, D> {
    type Status = DeviceStatus;
    type BusError = Ds2482Error<I::Error>;

    fn reset(&mut self) -> OneWireResult<Self::Status, Self::BusError> {
        // A command cut short by a timeout may still be running.
        self.wait().map_err(lift)?;
        let status = self.run(&[ONEWIRE_RESET])?;
        trace!(
            "ds2482 {:#04x}: reset -> presence {} short {}",
            self.addr,
            status.presence(),
            status.shortcircuit()
        );
        Ok(status)
    }

    fn write_byte(&mut self, byte: u8) -> OneWireResult<(), Self::BusError> {
        self.run(&[ONEWIRE_WRITE_BYTE, byte])?;
        Ok(())
    }

    fn read_byte(&mut self) -> OneWireResult<u8, Self::BusError> {
        self.run(&[ONEWIRE_READ_BYTE])?;
        self.point_at(DATA_REGISTER).map_err(lift)?;
        let mut val = [0u8; 1];
        self.i2c
            .read(self.addr, &mut val)
            .map_err(|e| OneWireError::Other(Ds2482Error::I2c(e)))?;
        Ok(val[0])
    }

    fn write_bit(&mut self, bit: bool) -> OneWireResult<(), Self::BusError> {
        self.run(&[ONEWIRE_SINGLE_BIT, if bit { 0x80 } else { 0x00 }])?;
        Ok(())
    }

    fn read_bit(&mut self) -> OneWireResult<bool, Self::BusError> {
        Ok(self.run(&[ONEWIRE_SINGLE_BIT, 0x80])?.single_bit_result())
    }

    fn read_triplet(&mut self, direction: bool) -> OneWireResult<(bool, bool, bool), Self::BusError> {
        let status = self.run(&[ONEWIRE_TRIPLET, if direction { 0xff } else { 0x00 }])?;
        Ok((
            status.single_bit_result(),
            status.triplet_second_bit(),
            status.branch_dir_taken(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        Ds2482Error,
        registers::{SET_READ_POINTER, STATUS_REGISTER},
        tests::{ADDR, built},
    };
    use embedded_hal_mock::eh1::i2c::Transaction;
    use embedded_onewire::{
        OneWire, OneWireError, OneWireSearch, OneWireSearchKind, OneWireStatus, RomAddress,
    };
    use std::{vec, vec::Vec};

    #[test]
    fn reset_polls_until_idle() {
        let (mut dev, mut i2c) = built(&[
            Transaction::write(ADDR, vec![SET_READ_POINTER, STATUS_REGISTER]),
            Transaction::read(ADDR, vec![0x00]),
            Transaction::write(ADDR, vec![0xb4]),
            Transaction::read(ADDR, vec![0x01]),
            Transaction::read(ADDR, vec![0x03]),
            Transaction::read(ADDR, vec![0x0a]),
        ]);
        let status = dev.reset().unwrap();
        assert!(status.presence());
        assert!(!status.shortcircuit());
        i2c.done();
    }

    #[test]
    fn read_byte_moves_the_pointer_and_back() {
        let (mut dev, mut i2c) = built(&[
            Transaction::write(ADDR, vec![0x96]),
            Transaction::read(ADDR, vec![0x00]),
            Transaction::write(ADDR, vec![SET_READ_POINTER, 0xe1]),
            Transaction::read(ADDR, vec![0xbe]),
            Transaction::write(ADDR, vec![0xa5, 0x44]),
            Transaction::read(ADDR, vec![0x00]),
        ]);
        assert_eq!(dev.read_byte().unwrap(), 0xbe);
        dev.write_byte(0x44).unwrap();
        i2c.done();
    }

    #[test]
    fn bit_slots() {
        let (mut dev, mut i2c) = built(&[
            Transaction::write(ADDR, vec![0x87, 0x80]),
            Transaction::read(ADDR, vec![0x20]),
            Transaction::write(ADDR, vec![0x87, 0x00]),
            Transaction::read(ADDR, vec![0x00]),
        ]);
        assert!(dev.read_bit().unwrap());
        dev.write_bit(false).unwrap();
        i2c.done();
    }

    #[test]
    fn triplet_reports_all_three_bits() {
        let (mut dev, mut i2c) = built(&[
            Transaction::write(ADDR, vec![0x78, 0xff]),
            Transaction::read(ADDR, vec![0x80]),
            Transaction::write(ADDR, vec![0x78, 0x00]),
            Transaction::read(ADDR, vec![0xe0]),
        ]);
        assert_eq!(dev.read_triplet(true).unwrap(), (false, false, true));
        assert_eq!(dev.read_triplet(false).unwrap(), (true, true, true));
        i2c.done();
    }

    #[test]
    fn stuck_bridge_times_out() {
        let mut busy = vec![Transaction::write(ADDR, vec![0xa5, 0x00])];
        busy.extend((0..=100).map(|_| Transaction::read(ADDR, vec![0x01])));
        let (mut dev, mut i2c) = built(&busy);
        assert!(matches!(dev.write_byte(0x00), Err(OneWireError::Timeout)));
        i2c.done();
    }

    #[test]
    fn i2c_failure_is_a_bus_error() {
        let (mut dev, mut i2c) = built(&[Transaction::write(ADDR, vec![0xa5, 0x12])
            .with_error(embedded_hal::i2c::ErrorKind::Other)]);
        assert!(matches!(dev.write_byte(0x12), Err(OneWireError::Other(Ds2482Error::I2c(_)))));
        i2c.done();
    }

    #[test]
    fn search_uses_the_hardware_triplet() {
        // One device: every id bit read back as sent, so the bridge always reports (b, !b, b).
        let rom = RomAddress::new(0x28, [0x11, 0x22, 0x33, 0x44, 0x55, 0x66]);
        let mut expected = vec![
            Transaction::write(ADDR, vec![SET_READ_POINTER, STATUS_REGISTER]),
            Transaction::read(ADDR, vec![0x00]),
            Transaction::write(ADDR, vec![0xb4]),
            Transaction::read(ADDR, vec![0x02]),
            Transaction::write(ADDR, vec![0xa5, 0xf0]),
            Transaction::read(ADDR, vec![0x00]),
        ];
        for byte in rom.to_bytes() {
            for i in 0..8 {
                let bit = (byte >> i) & 1 == 1;
                let status = if bit { 0xa0 } else { 0x40 };
                expected.push(Transaction::write(ADDR, vec![0x78, 0x00]));
                expected.push(Transaction::read(ADDR, vec![status]));
            }
        }
        let (mut dev, mut i2c) = built(&expected);
        let found: Vec<RomAddress> = OneWireSearch::new(&mut dev, OneWireSearchKind::Normal)
            .devices()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(found, [rom]);
        i2c.done();
    }

    #[test]
    fn timeout_then_reset_recovers() {
        let (mut dev, mut i2c) = built(&[
            Transaction::write(ADDR, vec![0xa5, 0x00]),
            Transaction::read(ADDR, vec![0x01]),
            Transaction::read(ADDR, vec![0x01]),
            Transaction::read(ADDR, vec![0x00]),
            Transaction::write(ADDR, vec![0xb4]),
            Transaction::read(ADDR, vec![0x02]),
        ]);
        dev.retries = 1;
        assert!(matches!(dev.write_byte(0x00), Err(OneWireError::Timeout)));
        assert!(dev.reset().unwrap().presence());
        assert_eq!(dev.pointer, STATUS_REGISTER);
        i2c.done();
    }
}
