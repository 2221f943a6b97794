//! Opening DS2480B adapters over serial ports, USB-serial bridges and TCP tunnels.

use crate::{Bus, BusConfig, Error, Result, TransportMode};
use ds2480b::{Ds2480b, Ds2480bBuilder, Link};
use linux_embedded_hal::Delay;
use log::{debug, info};
use serialport::{
    ClearBuffer, DataBits, FlowControl, Parity, SerialPort, SerialPortInfo, SerialPortType,
    StopBits,
};
use std::{
    io::{self, Read, Write},
    net::{TcpStream, ToSocketAddrs},
    thread,
    time::Duration,
};

/// The DS2480B talks 9600 baud until told otherwise.
const BAUD_RATE: u32 = 9600;
const BREAK_TIME: Duration = Duration::from_millis(2);

/// A DS2480B behind any of the supported links.
pub type Adapter = Ds2480b<Box<dyn Link + Send>>;

/// Serial port link, 9600 baud 8N1 without flow control.
pub struct SerialLink {
    port: Box<dyn SerialPort>,
}

impl SerialLink {
    /// Opens `path` with the given read timeout.
    pub fn open(path: &str, timeout: Duration) -> io::Result<Self> {
        let port = serialport::new(path, BAUD_RATE)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(timeout)
            .open()?;
        Ok(Self { port })
    }
}

impl Read for SerialLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }
}

impl Write for SerialLink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }
}

impl Link for SerialLink {
    fn line_break(&mut self) -> io::Result<()> {
        self.port.set_break()?;
        thread::sleep(BREAK_TIME);
        self.port.clear_break()?;
        Ok(())
    }

    fn discard_input(&mut self) -> io::Result<()> {
        self.port.clear(ClearBuffer::Input)?;
        Ok(())
    }
}

/// Raw TCP byte tunnel to a serial server (ser2net and similar).
///
/// A socket cannot carry a line break, so [`Link::line_break`] does nothing.
pub struct TcpLink {
    stream: TcpStream,
}

impl TcpLink {
    /// Connects to `address` (`host:port`). `timeout` bounds the connection attempt and
    /// every read and write.
    pub fn connect(address: &str, timeout: Duration) -> io::Result<Self> {
        let mut last = None;
        for addr in address.to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => {
                    stream.set_read_timeout(Some(timeout))?;
                    stream.set_write_timeout(Some(timeout))?;
                    stream.set_nodelay(true)?;
                    return Ok(Self { stream });
                }
                Err(e) => {
                    debug!("{address}: connecting to {addr} failed: {e}");
                    last = Some(e);
                }
            }
        }
        Err(last.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("{address} resolves to nothing"))
        }))
    }
}

impl Read for TcpLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }
}

impl Write for TcpLink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

impl Link for TcpLink {
    fn discard_input(&mut self) -> io::Result<()> {
        self.stream.set_nonblocking(true)?;
        let mut buf = [0u8; 64];
        let drained = loop {
            match self.stream.read(&mut buf) {
                Ok(0) => {
                    break Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "serial server closed the connection",
                    ));
                }
                Ok(_) => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break Ok(()),
                Err(e) => break Err(e),
            }
        };
        self.stream.set_nonblocking(false)?;
        drained
    }
}

fn parse_vid_pid(selector: &str) -> Option<(u16, u16)> {
    let (vid, pid) = selector.split_once(':')?;
    if vid.len() != 4 || pid.len() != 4 {
        return None;
    }
    Some((
        u16::from_str_radix(vid, 16).ok()?,
        u16::from_str_radix(pid, 16).ok()?,
    ))
}

/// Picks the port matching `selector` among `ports`.
///
/// `selector` is a port name, a `VID:PID` pair in hex or a USB serial number.
pub fn select_usb_port(ports: &[SerialPortInfo], selector: &str) -> Option<String> {
    if let Some(port) = ports.iter().find(|port| port.port_name == selector) {
        return Some(port.port_name.clone());
    }
    let ids = parse_vid_pid(selector);
    ports
        .iter()
        .find(|port| match (&port.port_type, ids) {
            (SerialPortType::UsbPort(usb), Some((vid, pid))) => usb.vid == vid && usb.pid == pid,
            (SerialPortType::UsbPort(usb), None) => usb
                .serial_number
                .as_deref()
                .is_some_and(|serial| serial.eq_ignore_ascii_case(selector)),
            _ => false,
        })
        .map(|port| port.port_name.clone())
}

fn resolve_usb(selector: &str) -> Result<String> {
    let ports = serialport::available_ports().map_err(|e| Error::Transport {
        port: selector.into(),
        source: Box::new(e),
    })?;
    match select_usb_port(&ports, selector) {
        Some(path) => Ok(path),
        None if selector.contains('/') || selector.starts_with("COM") => Ok(selector.into()),
        None => Err(Error::Config(format!("no USB adapter matches {selector:?}"))),
    }
}

fn transport_error(port: &str, source: impl std::error::Error + Send + Sync + 'static) -> Error {
    Error::Transport {
        port: port.into(),
        source: Box::new(source),
    }
}

/// Opens the link named by `config` and detects the line driver on it.
pub fn open_adapter(config: &BusConfig) -> Result<Adapter> {
    config.validate()?;
    let port = config.port.as_str();
    let (link, line_break): (Box<dyn Link + Send>, bool) = match config.mode {
        TransportMode::Serial => (
            Box::new(SerialLink::open(port, config.timeout()).map_err(|e| transport_error(port, e))?),
            config.line_break,
        ),
        TransportMode::Usb => {
            let path = resolve_usb(port)?;
            debug!("{port}: using {path}");
            (
                Box::new(
                    SerialLink::open(&path, config.timeout())
                        .map_err(|e| transport_error(port, e))?,
                ),
                config.line_break,
            )
        }
        TransportMode::Network => (
            Box::new(TcpLink::connect(port, config.timeout()).map_err(|e| transport_error(port, e))?),
            false,
        ),
    };
    Ds2480bBuilder::default()
        .with_line_break(line_break)
        .build(link)
        .map_err(|e| transport_error(port, e))
}

/// Opens the bus described by `config`.
///
/// # Errors
/// [`Error::Config`] for an invalid configuration, [`Error::Transport`] if the link
/// cannot be opened or no DS2480B answers on it.
pub fn open_bus(config: &BusConfig) -> Result<Bus<Adapter>> {
    let adapter = open_adapter(config)?;
    info!("{}: {:?} bus open", config.port, config.mode);
    Ok(Bus::new(adapter, Delay).with_config(config.clone()))
}

impl Bus<Adapter> {
    /// Opens the link again from the stored configuration and installs it.
    pub fn reopen(&self) -> Result<()> {
        let config = self
            .config()
            .ok_or_else(|| Error::Config("bus was not opened from a configuration".into()))?;
        let adapter = open_adapter(config)?;
        self.reopen_with(adapter)
    }
}
