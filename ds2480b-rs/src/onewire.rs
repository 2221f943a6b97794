use crate::{
    Ds2480b, Ds2480bError, Link, Mode,
    commands::{MODE_COMMAND, ResetResponse, bit_command, bit_response_matches, reset_command},
};
use embedded_onewire::{OneWire, OneWireError, OneWireResult, OneWireStatus};
use log::trace;

/// Data mode payload for `bytes`: the mode switch byte goes out twice to be sent as data.
fn escape(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len() + 1);
    for &byte in bytes {
        out.push(byte);
        if byte == MODE_COMMAND {
            out.push(byte);
        }
    }
    out
}

impl<L: Link> Ds2480b<L> {
    /// Timeouts of the link become [`OneWireError::Timeout`], everything else stays a bus error.
    ///
    /// After a timeout the chip's answer may still be on its way, so it is dropped before
    /// the next command.
    fn lift(&mut self, e: Ds2480bError) -> OneWireError<Ds2480bError> {
        if e.is_timeout() {
            self.desynced = true;
            OneWireError::Timeout
        } else {
            OneWireError::Other(e)
        }
    }

    /// Sends `bytes` on the 1-Wire line and returns what was sampled during each byte.
    fn transfer(&mut self, bytes: &[u8], sampled: &mut [u8]) -> OneWireResult<(), Ds2480bError> {
        self.resync().map_err(|e| self.lift(e))?;
        self.enter(Mode::Data).map_err(|e| self.lift(e))?;
        let payload = escape(bytes);
        let sent = self
            .link
            .write_all(&payload)
            .and_then(|_| self.link.flush())
            .and_then(|_| self.link.read_exact(sampled));
        sent.map_err(|e| self.lift(e.into()))
    }

    fn bit_slot(&mut self, bit: bool) -> OneWireResult<bool, Ds2480bError> {
        self.resync().map_err(|e| self.lift(e))?;
        self.enter(Mode::Command).map_err(|e| self.lift(e))?;
        let cmd = bit_command(self.speed, bit);
        let response = self.exchange(cmd.into_bits()).map_err(|e| self.lift(e))?;
        if !bit_response_matches(cmd, response) {
            return Err(OneWireError::Other(Ds2480bError::Echo {
                sent: cmd.into_bits(),
                received: response,
            }));
        }
        Ok(response & 0x01 == 0x01)
    }
}

impl<L: Link> OneWire for Ds2480b<L> {
    type Status = ResetResponse;
    type BusError = Ds2480bError;

    fn reset(&mut self) -> OneWireResult<Self::Status, Self::BusError> {
        self.resync().map_err(|e| self.lift(e))?;
        self.enter(Mode::Command).map_err(|e| self.lift(e))?;
        let cmd = reset_command(self.speed).into_bits();
        let response = self.exchange(cmd).map_err(|e| self.lift(e))?;
        let response = ResetResponse::from_bits(response);
        if !response.is_well_formed() {
            return Err(OneWireError::Other(Ds2480bError::Echo {
                sent: cmd,
                received: response.into_bits(),
            }));
        }
        trace!(
            "ds2480b: reset -> presence {} short {} alarm {}",
            response.presence(),
            response.shortcircuit(),
            response.alarm()
        );
        Ok(response)
    }

    fn write_byte(&mut self, byte: u8) -> OneWireResult<(), Self::BusError> {
        self.write_bytes(&[byte])
    }

    fn read_byte(&mut self) -> OneWireResult<u8, Self::BusError> {
        let mut buf = [0u8; 1];
        self.read_bytes(&mut buf)?;
        Ok(buf[0])
    }

    fn write_bit(&mut self, bit: bool) -> OneWireResult<(), Self::BusError> {
        self.bit_slot(bit).map(|_| ())
    }

    fn read_bit(&mut self) -> OneWireResult<bool, Self::BusError> {
        self.bit_slot(true)
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> OneWireResult<(), Self::BusError> {
        if bytes.is_empty() {
            return Ok(());
        }
        let mut echo = vec![0u8; bytes.len()];
        self.transfer(bytes, &mut echo)?;
        if let Some((&sent, &received)) = bytes.iter().zip(echo.iter()).find(|(a, b)| a != b) {
            return Err(OneWireError::Other(Ds2480bError::Echo { sent, received }));
        }
        Ok(())
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> OneWireResult<(), Self::BusError> {
        if buf.is_empty() {
            return Ok(());
        }
        let fill = vec![0xffu8; buf.len()];
        self.transfer(&fill, buf)
    }
}

#[cfg(test)]
mod tests {
    use crate::{Ds2480b, Ds2480bBuilder, Ds2480bError, Link, Mode, Speed};
    use embedded_onewire::{OneWire, OneWireError, OneWireStatus, RomAddress};
    use std::{
        collections::VecDeque,
        io::{self, Read, Write},
    };

    const DETECT_ANSWER: [u8; 5] = [0x16, 0x44, 0x5a, 0x00, 0x93];

    /// Records what the driver writes and answers from a queue.
    #[derive(Default)]
    struct Scripted {
        written: Vec<u8>,
        answers: VecDeque<u8>,
        breaks: usize,
    }

    impl Scripted {
        fn answering(answers: &[u8]) -> Self {
            Scripted {
                answers: answers.iter().copied().collect(),
                ..Default::default()
            }
        }
    }

    impl Read for Scripted {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let mut n = 0;
            while n < buf.len() {
                match self.answers.pop_front() {
                    Some(b) => {
                        buf[n] = b;
                        n += 1;
                    }
                    None => break,
                }
            }
            if n == 0 && !buf.is_empty() {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "no answer"));
            }
            Ok(n)
        }
    }

    impl Write for Scripted {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Link for Scripted {
        fn line_break(&mut self) -> io::Result<()> {
            self.breaks += 1;
            Ok(())
        }
    }

    fn detected(answers: &[u8]) -> Ds2480b<Scripted> {
        let mut script = DETECT_ANSWER.to_vec();
        script.extend_from_slice(answers);
        let mut dev = Ds2480bBuilder::default()
            .with_speed(Speed::Regular)
            .build(Scripted::answering(&script))
            .unwrap();
        dev.link.written.clear();
        dev
    }

    #[test]
    fn detection_sequence() {
        let dev = Ds2480bBuilder::default()
            .build(Scripted::answering(&DETECT_ANSWER))
            .unwrap();
        let link = dev.release();
        assert_eq!(link.breaks, 1);
        assert_eq!(link.written, [0xc1, 0x17, 0x45, 0x5b, 0x0f, 0x91]);
    }

    #[test]
    fn detection_rejects_other_chips() {
        let res = Ds2480bBuilder::default()
            .with_line_break(false)
            .build(Scripted::answering(&[0x16, 0x44, 0x5a, 0x00, 0x00]));
        assert!(matches!(
            res,
            Err(Ds2480bError::NotDetected { response: [0x16, 0x44, 0x5a, 0x00, 0x00] })
        ));
    }

    #[test]
    fn silent_link_is_not_detected() {
        let res = Ds2480bBuilder::default().build(Scripted::default());
        assert!(matches!(res, Err(ref e) if e.is_timeout()));
    }

    #[test]
    fn reset_reports_presence() {
        let mut dev = detected(&[0xcd, 0xcf, 0xcc]);
        assert!(dev.reset().unwrap().presence());
        assert!(!dev.reset().unwrap().presence());
        assert!(dev.reset().unwrap().shortcircuit());
        assert_eq!(dev.link.written, [0xc1, 0xc1, 0xc1]);
    }

    #[test]
    fn bytes_go_out_in_data_mode() {
        let rom = RomAddress::new(0x28, [1, 2, 3, 4, 5, 6]);
        let mut answers = vec![0xcd, 0x55];
        answers.extend_from_slice(&rom.to_bytes());
        let mut dev = detected(&answers);
        dev.address(Some(rom)).unwrap();
        let mut expected = vec![0xc1, 0xe1, 0x55];
        expected.extend_from_slice(&rom.to_bytes());
        assert_eq!(dev.link.written, expected);
    }

    #[test]
    fn mode_switch_byte_is_doubled() {
        let mut dev = detected(&[0xe3, 0x12]);
        dev.write_bytes(&[0xe3, 0x12]).unwrap();
        assert_eq!(dev.link.written, [0xe1, 0xe3, 0xe3, 0x12]);
    }

    #[test]
    fn read_sends_all_ones() {
        let mut dev = detected(&[0xbe, 0x7f]);
        let mut buf = [0u8; 2];
        dev.read_bytes(&mut buf).unwrap();
        assert_eq!(buf, [0xbe, 0x7f]);
        assert_eq!(dev.link.written, [0xe1, 0xff, 0xff]);
    }

    #[test]
    fn bit_slots_switch_back_to_command_mode() {
        let mut dev = detected(&[0x00, 0x93, 0x80]);
        dev.write_byte(0x00).unwrap();
        assert!(dev.read_bit().unwrap());
        dev.write_bit(false).unwrap();
        assert_eq!(dev.link.written, [0xe1, 0x00, 0xe3, 0x91, 0x81]);
    }

    #[test]
    fn echo_mismatch_is_an_error() {
        let mut dev = detected(&[0x54]);
        assert!(matches!(
            dev.write_byte(0x55),
            Err(OneWireError::Other(Ds2480bError::Echo { sent: 0x55, received: 0x54 }))
        ));
    }

    #[test]
    fn missing_answer_is_a_timeout() {
        let mut dev = detected(&[]);
        assert!(matches!(dev.reset(), Err(OneWireError::Timeout)));
        assert!(matches!(dev.read_byte(), Err(OneWireError::Timeout)));
    }

    #[test]
    fn garbage_reset_answer_is_rejected() {
        let mut dev = detected(&[0x12]);
        assert!(matches!(dev.reset(), Err(OneWireError::Other(Ds2480bError::Echo { .. }))));
    }

    /// A link whose answers show up only after the read waiting for them gave up.
    ///
    /// Each reset command is answered with a presence pulse.
    #[derive(Default)]
    struct Late {
        written: Vec<u8>,
        received: VecDeque<u8>,
        in_flight: Vec<u8>,
        discards: usize,
    }

    impl Read for Late {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.received.pop_front() {
                Some(b) if !buf.is_empty() => {
                    buf[0] = b;
                    Ok(1)
                }
                _ => {
                    self.received.extend(self.in_flight.drain(..));
                    Err(io::Error::new(io::ErrorKind::TimedOut, "answer late"))
                }
            }
        }
    }

    impl Write for Late {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.extend_from_slice(buf);
            if buf == [0xc1] {
                self.received.push_back(0xcd);
            }
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Link for Late {
        fn discard_input(&mut self) -> io::Result<()> {
            self.discards += 1;
            self.received.clear();
            Ok(())
        }
    }

    fn late(in_flight: &[u8]) -> Ds2480b<Late> {
        Ds2480b {
            link: Late {
                in_flight: in_flight.to_vec(),
                ..Default::default()
            },
            mode: Mode::Command,
            speed: Speed::Regular,
            desynced: false,
        }
    }

    #[test]
    fn late_echo_is_dropped_before_the_next_reset() {
        let mut dev = late(&[0x55]);
        assert!(matches!(dev.write_byte(0x55), Err(OneWireError::Timeout)));
        let status = dev.reset().unwrap();
        assert!(status.presence());
        assert_eq!(dev.link.discards, 1);
        assert_eq!(dev.link.written, [0xe1, 0x55, 0xe3, 0xc1]);
    }

    #[test]
    fn late_bit_answer_is_dropped_before_the_next_slot() {
        let mut dev = late(&[0x93]);
        assert!(matches!(dev.read_bit(), Err(OneWireError::Timeout)));
        assert!(dev.reset().unwrap().presence());
        assert!(dev.reset().unwrap().presence());
        assert_eq!(dev.link.discards, 1);
    }

    #[test]
    fn input_is_kept_without_a_timeout() {
        let mut dev = late(&[]);
        assert!(dev.reset().unwrap().presence());
        assert_eq!(dev.link.discards, 0);
    }
}
