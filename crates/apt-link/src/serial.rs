use std::io::{self, Read, Write};
use std::thread;
use std::time::Duration;

use serialport::{SerialPort, SerialPortType};

use crate::{
    FrameSink, LinkError, PortInfo, RequestResponseChannel, Result, EXTENDED_FLAG, HEADER_LEN,
};

/// Port settings for [`SerialLink`].
#[derive(Clone, Copy, Debug)]
pub struct SerialSettings {
    pub baud_rate: u32,
    /// Delay after every transfer; the controller drops frames that arrive back to back.
    pub pacing: Duration,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            baud_rate: 115_200,
            pacing: Duration::from_millis(15),
        }
    }
}

/// APT link over a serial or USB-CDC port.
pub struct SerialLink {
    path: String,
    port: Box<dyn SerialPort>,
    settings: SerialSettings,
}

impl SerialLink {
    pub fn open(path: &str) -> Result<Self> {
        Self::open_with(path, SerialSettings::default())
    }

    pub fn open_with(path: &str, settings: SerialSettings) -> Result<Self> {
        let port = serialport::new(path, settings.baud_rate)
            .timeout(Duration::from_millis(200))
            .open()
            .map_err(|e| match e.kind() {
                serialport::ErrorKind::NoDevice => LinkError::PortNotFound(path.to_string()),
                _ => LinkError::Io(e.to_string()),
            })?;
        tracing::info!(port = path, baud = settings.baud_rate, "serial link open");
        Ok(Self {
            path: path.to_string(),
            port,
            settings,
        })
    }

    pub fn list() -> Result<Vec<PortInfo>> {
        let mut out = Vec::new();
        for p in serialport::available_ports().map_err(|e| LinkError::Io(e.to_string()))? {
            let driver = match p.port_type {
                SerialPortType::UsbPort(_) => "usb-serial",
                _ => "serial",
            };
            out.push(PortInfo {
                name: p.port_name,
                driver: driver.to_string(),
            });
        }
        Ok(out)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.port
            .write_all(bytes)
            .map_err(|e| LinkError::Io(e.to_string()))?;
        self.port.flush().map_err(|e| LinkError::Io(e.to_string()))?;
        if !self.settings.pacing.is_zero() {
            thread::sleep(self.settings.pacing);
        }
        Ok(())
    }

    /// Read one whole frame. `None` if the header did not start arriving within `timeout`.
    fn read_frame(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>> {
        self.port
            .set_timeout(timeout)
            .map_err(|e| LinkError::Io(e.to_string()))?;
        let mut header = [0u8; HEADER_LEN];
        match self.port.read_exact(&mut header) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::TimedOut => return Ok(None),
            Err(e) => return Err(LinkError::Io(e.to_string())),
        }
        let mut frame = header.to_vec();
        if header[4] & EXTENDED_FLAG != 0 {
            let len = usize::from(u16::from_le_bytes([header[2], header[3]]));
            let mut payload = vec![0u8; len];
            self.port.read_exact(&mut payload).map_err(|e| {
                if e.kind() == io::ErrorKind::TimedOut {
                    LinkError::Malformed("payload truncated")
                } else {
                    LinkError::Io(e.to_string())
                }
            })?;
            frame.extend_from_slice(&payload);
        }
        Ok(Some(frame))
    }
}

impl FrameSink for SerialLink {
    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.write_all(bytes)
    }
}

impl RequestResponseChannel for SerialLink {
    fn receive(&mut self) -> Result<Vec<u8>> {
        loop {
            if let Some(frame) = self.read_frame(Duration::from_secs(1))? {
                return Ok(frame);
            }
        }
    }

    fn receive_timeout(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>> {
        self.read_frame(timeout)
    }
}
