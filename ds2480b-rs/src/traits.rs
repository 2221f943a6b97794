use std::io::{self, Read, Write};

/// Byte link to a DS2480B.
///
/// Anything that moves bytes both ways can carry the chip: a serial port, a USB-serial
/// bridge or a TCP tunnel to a remote serial server. Reads must honour a timeout and
/// report it as [`io::ErrorKind::TimedOut`] or [`io::ErrorKind::WouldBlock`].
pub trait Link: Read + Write {
    /// Holds the line in the break state long enough to reset the chip.
    ///
    /// Links without a break condition do nothing.
    fn line_break(&mut self) -> io::Result<()> {
        Ok(())
    }

    /// Drops bytes received but not read yet.
    fn discard_input(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<L: Link + ?Sized> Link for &mut L {
    fn line_break(&mut self) -> io::Result<()> {
        (**self).line_break()
    }

    fn discard_input(&mut self) -> io::Result<()> {
        (**self).discard_input()
    }
}

impl<L: Link + ?Sized> Link for Box<L> {
    fn line_break(&mut self) -> io::Result<()> {
        (**self).line_break()
    }

    fn discard_input(&mut self) -> io::Result<()> {
        (**self).discard_input()
    }
}
