//! SCPI optical power meter (Thorlabs PM100 command set).
//!
//! Commands are newline-terminated ASCII; queries return one line. The meter is
//! generic over any `Read + Write` transport so the same code drives:
//!
//! - `TCPIP::<host>::<port>::SOCKET` (raw socket, read/write timeouts applied)
//! - `/dev/usbtmcN` (Linux USBTMC character device; timeout set by the driver)
//! - `USB0::<vid>::<pid>::<serial>::0::INSTR` (resolved by scanning `/dev/usbtmc*`
//!   and matching the serial number in `*IDN?`)

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, trace};

use crate::device::PowerSensor;
use crate::domain::SensorConfig;
use crate::error::{AppError, ErrorKind};

const USBTMC_DIR: &str = "/dev";
const USBTMC_PREFIX: &str = "usbtmc";

/// A parsed instrument resource string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
    Tcp { host: String, port: u16 },
    DevicePath(PathBuf),
    Usb { vendor: u16, product: u16, serial: String },
}

/// Parse a VISA-style resource string (or a plain device path).
pub fn parse_resource(resource: &str) -> Result<Resource, AppError> {
    let resource = resource.trim();
    if resource.starts_with('/') {
        return Ok(Resource::DevicePath(PathBuf::from(resource)));
    }

    let parts: Vec<&str> = resource.split("::").collect();
    let head = parts.first().copied().unwrap_or_default().to_ascii_uppercase();

    if head.starts_with("TCPIP") {
        if let [_, host, port, kind] = parts.as_slice() {
            if kind.eq_ignore_ascii_case("SOCKET") {
                let port = port
                    .parse::<u16>()
                    .map_err(|e| AppError::usage(format!("Invalid port in resource '{resource}': {e}")))?;
                return Ok(Resource::Tcp {
                    host: host.to_string(),
                    port,
                });
            }
        }
    } else if head.starts_with("USB") && parts.len() >= 4 {
        return Ok(Resource::Usb {
            vendor: parse_usb_id(parts[1], resource)?,
            product: parse_usb_id(parts[2], resource)?,
            serial: parts[3].to_string(),
        });
    }

    Err(AppError::usage(format!(
        "Unsupported sensor resource '{resource}'. Use TCPIP::<host>::<port>::SOCKET, \
         USB0::<vid>::<pid>::<serial>::0::INSTR, a /dev/usbtmc path, or 'sim'."
    )))
}

fn parse_usb_id(raw: &str, resource: &str) -> Result<u16, AppError> {
    let parsed = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => raw.parse::<u16>(),
    };
    parsed.map_err(|e| AppError::usage(format!("Invalid USB id '{raw}' in resource '{resource}': {e}")))
}

/// Line-oriented SCPI power meter.
pub struct ScpiPowerMeter<T: Read + Write> {
    port: BufReader<T>,
    resource: String,
}

impl<T: Read + Write> ScpiPowerMeter<T> {
    pub fn new(transport: T, resource: impl Into<String>) -> Self {
        Self {
            port: BufReader::new(transport),
            resource: resource.into(),
        }
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Send a command that produces no response.
    pub fn write(&mut self, command: &str) -> Result<(), AppError> {
        trace!(resource = %self.resource, command, "scpi write");
        let port = self.port.get_mut();
        port.write_all(command.as_bytes())
            .and_then(|_| port.write_all(b"\n"))
            .and_then(|_| port.flush())
            .map_err(|e| AppError::device_io(format!("{}: failed to send '{command}': {e}", self.resource)))
    }

    /// Send a query and read its one-line response.
    pub fn query(&mut self, command: &str) -> Result<String, AppError> {
        self.write(command)?;

        let mut line = String::new();
        let n = self
            .port
            .read_line(&mut line)
            .map_err(|e| AppError::device_io(format!("{}: no response to '{command}': {e}", self.resource)))?;
        if n == 0 {
            return Err(AppError::device_io(format!(
                "{}: connection closed while waiting for '{command}'.",
                self.resource
            )));
        }

        let response = line.trim().to_string();
        trace!(resource = %self.resource, command, response = %response, "scpi query");
        Ok(response)
    }

    pub fn into_inner(self) -> T {
        self.port.into_inner()
    }
}

impl<T: Read + Write> PowerSensor for ScpiPowerMeter<T> {
    fn configure(&mut self, config: &SensorConfig) -> Result<(), AppError> {
        // Wavelength selects the sensor's responsivity calibration point.
        self.write(&format!("SENS:CORR:WAV {}", config.wavelength_nm))?;
        self.write(&format!("SENS:POW:UNIT {}", config.unit.scpi_token()))?;
        self.write(&format!("SENS:AVER:COUN {}", config.averaging_count))?;
        debug!(
            resource = %self.resource,
            wavelength_nm = config.wavelength_nm,
            unit = config.unit.scpi_token(),
            averaging = config.averaging_count,
            "sensor configured"
        );
        Ok(())
    }

    fn measure_power(&mut self) -> Result<f64, AppError> {
        let raw = self.query("MEAS:POW?")?;
        raw.parse::<f64>()
            .map_err(|e| AppError::device_io(format!("{}: unparsable power reading '{raw}': {e}", self.resource)))
    }

    fn identify(&mut self) -> Result<String, AppError> {
        self.query("*IDN?")
    }

    fn beep(&mut self) -> Result<(), AppError> {
        self.write("SYST:BEEP")
    }

    fn close(&mut self) -> Result<(), AppError> {
        self.port
            .get_mut()
            .flush()
            .map_err(|e| AppError::device_io(format!("{}: flush on close failed: {e}", self.resource)))
    }
}

/// Open the power meter named by `config.resource`.
pub fn open_scpi_meter(config: &SensorConfig) -> Result<Box<dyn PowerSensor>, AppError> {
    let resource = parse_resource(&config.resource)?;
    match resource {
        Resource::Tcp { host, port } => {
            let stream = connect_tcp(&host, port, config.timeout)?;
            Ok(Box::new(ScpiPowerMeter::new(stream, config.resource.clone())))
        }
        Resource::DevicePath(path) => {
            let file = open_usbtmc(&path)?;
            Ok(Box::new(ScpiPowerMeter::new(file, path.display().to_string())))
        }
        Resource::Usb { serial, .. } => {
            let meter = find_usbtmc_by_serial(&serial)?;
            Ok(Box::new(meter))
        }
    }
}

fn connect_tcp(host: &str, port: u16, timeout: Duration) -> Result<TcpStream, AppError> {
    let not_found = |msg: String| AppError::new(ErrorKind::DeviceNotFound, msg);

    let addr = (host, port)
        .to_socket_addrs()
        .map_err(|e| not_found(format!("Cannot resolve sensor host '{host}:{port}': {e}")))?
        .next()
        .ok_or_else(|| not_found(format!("Sensor host '{host}:{port}' resolved to no address.")))?;

    let stream = TcpStream::connect_timeout(&addr, timeout)
        .map_err(|e| not_found(format!("No sensor answering at {addr}: {e}")))?;
    stream
        .set_read_timeout(Some(timeout))
        .and_then(|_| stream.set_write_timeout(Some(timeout)))
        .map_err(|e| AppError::device_io(format!("Failed to set sensor timeouts: {e}")))?;

    info!(%addr, "connected to sensor");
    Ok(stream)
}

fn open_usbtmc(path: &Path) -> Result<File, AppError> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(|e| {
            let kind = match e.kind() {
                std::io::ErrorKind::NotFound => ErrorKind::DeviceNotFound,
                _ => ErrorKind::DeviceIo,
            };
            AppError::new(kind, format!("Failed to open sensor '{}': {e}", path.display()))
        })
}

fn find_usbtmc_by_serial(serial: &str) -> Result<ScpiPowerMeter<File>, AppError> {
    let mut candidates: Vec<PathBuf> = std::fs::read_dir(USBTMC_DIR)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter(|e| e.file_name().to_string_lossy().starts_with(USBTMC_PREFIX))
                .map(|e| e.path())
                .collect()
        })
        .unwrap_or_default();
    candidates.sort();

    for path in candidates {
        let file = match open_usbtmc(&path) {
            Ok(f) => f,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "skipping usbtmc device");
                continue;
            }
        };
        let mut meter = ScpiPowerMeter::new(file, path.display().to_string());
        match meter.identify() {
            Ok(idn) if idn.contains(serial) => {
                info!(path = %path.display(), idn = %idn, "matched sensor by serial");
                return Ok(meter);
            }
            Ok(idn) => debug!(path = %path.display(), idn = %idn, "serial does not match"),
            Err(e) => debug!(path = %path.display(), error = %e, "identify failed"),
        }
    }

    Err(AppError::new(
        ErrorKind::DeviceNotFound,
        format!("No power meter with serial '{serial}' found under {USBTMC_DIR}/{USBTMC_PREFIX}*."),
    ))
}
