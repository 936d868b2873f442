//! Thorlabs Elliptec ELL14 rotation mount.
//!
//! ASCII protocol at 9600 baud, 8N1. Commands are `{address}{cmd}{data}`;
//! replies are `{address}{code}{data}\r\n`. A move absolute is
//! `{address}ma{pulses:08X}`, answered by `PO{pulses}` once the move has
//! finished or `GS{status}` when the device refuses it.

use std::io::{BufRead, BufReader, Read, Write};
use std::time::Duration;

use tracing::{debug, info, trace};

use crate::device::Actuator;
use crate::error::{AppError, ErrorKind};

/// 143360 pulses per revolution.
pub const DEFAULT_PULSES_PER_DEGREE: f64 = 398.222_222_22;

const BAUD_RATE: u32 = 9600;
const STATUS_OK: u8 = 0;
const STATUS_BUSY: u8 = 9;

/// Human readable `GS` status codes.
pub fn status_description(code: u8) -> &'static str {
    match code {
        0 => "ok",
        1 => "communication timeout",
        2 => "mechanical timeout",
        3 => "command error or not supported",
        4 => "value out of range",
        5 => "module isolated",
        6 => "module out of isolation",
        7 => "initializing error",
        8 => "thermal error",
        9 => "busy",
        10 => "sensor error",
        11 => "motor error",
        12 => "out of range",
        13 => "over current error",
        _ => "reserved",
    }
}

pub struct Ell14Rotator<T: Read + Write> {
    port: BufReader<T>,
    address: char,
    pulses_per_degree: f64,
    name: String,
}

impl Ell14Rotator<Box<dyn serialport::SerialPort>> {
    /// Open the mount on a serial port (`/dev/ttyUSB0`, `COM3`, ...).
    pub fn open(port: &str, address: char, pulses_per_degree: f64, timeout: Duration) -> Result<Self, AppError> {
        let serial = serialport::new(port, BAUD_RATE)
            .timeout(timeout)
            .open()
            .map_err(|e| {
                let kind = match e.kind() {
                    serialport::ErrorKind::NoDevice => ErrorKind::DeviceNotFound,
                    serialport::ErrorKind::Io(std::io::ErrorKind::NotFound) => ErrorKind::DeviceNotFound,
                    _ => ErrorKind::DeviceIo,
                };
                AppError::new(kind, format!("Failed to open ELL14 port '{port}': {e}"))
            })?;
        info!(port, %address, "opened ELL14 rotation mount");
        Ok(Self::new(serial, address, pulses_per_degree, port))
    }
}

impl<T: Read + Write> Ell14Rotator<T> {
    pub fn new(transport: T, address: char, pulses_per_degree: f64, name: impl Into<String>) -> Self {
        Self {
            port: BufReader::new(transport),
            address,
            pulses_per_degree,
            name: name.into(),
        }
    }

    pub fn pulses_for(&self, angle_deg: i32) -> i32 {
        (f64::from(angle_deg) * self.pulses_per_degree).round() as i32
    }

    fn send(&mut self, command: &str) -> Result<(), AppError> {
        let packet = format!("{}{command}", self.address);
        trace!(port = %self.name, packet = %packet, "ell14 write");
        let port = self.port.get_mut();
        port.write_all(packet.as_bytes())
            .and_then(|_| port.flush())
            .map_err(|e| AppError::device_io(format!("{}: ELL14 write failed: {e}", self.name)))
    }

    fn read_reply(&mut self) -> Result<String, AppError> {
        let mut line = String::new();
        let n = self
            .port
            .read_line(&mut line)
            .map_err(|e| AppError::device_io(format!("{}: ELL14 read failed: {e}", self.name)))?;
        if n == 0 {
            return Err(AppError::device_io(format!("{}: ELL14 returned no reply.", self.name)));
        }
        let reply = line.trim().to_string();
        trace!(port = %self.name, reply = %reply, "ell14 read");

        if !reply.starts_with(self.address) {
            return Err(AppError::device_io(format!(
                "{}: reply '{reply}' is not from address {}.",
                self.name, self.address
            )));
        }
        Ok(reply)
    }

    /// Send a move and wait for its `PO` reply.
    fn move_absolute(&mut self, pulses: i32) -> Result<(), AppError> {
        self.send(&format!("ma{pulses:08X}"))?;

        loop {
            let reply = self.read_reply()?;
            let body = &reply[self.address.len_utf8()..];

            if body.starts_with("PO") {
                return Ok(());
            }
            if let Some(hex) = body.strip_prefix("GS") {
                let code = u8::from_str_radix(hex.trim(), 16).map_err(|e| {
                    AppError::device_io(format!("{}: bad status '{reply}': {e}", self.name))
                })?;
                match code {
                    STATUS_OK => return Ok(()),
                    STATUS_BUSY => continue,
                    _ => {
                        return Err(AppError::device_io(format!(
                            "{}: ELL14 status {code}: {}.",
                            self.name,
                            status_description(code)
                        )));
                    }
                }
            }
            return Err(AppError::device_io(format!(
                "{}: unexpected ELL14 reply '{reply}'.",
                self.name
            )));
        }
    }

    pub fn into_inner(self) -> T {
        self.port.into_inner()
    }
}

impl<T: Read + Write> Actuator for Ell14Rotator<T> {
    fn rotate_to(&mut self, angle_deg: i32) -> Result<(), AppError> {
        let pulses = self.pulses_for(angle_deg);
        debug!(port = %self.name, angle_deg, pulses, "rotating");
        self.move_absolute(pulses)
    }
}
