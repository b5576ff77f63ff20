//! Synchronous serial port implementation.
//!
//! Wraps the `serialport` crate's `SerialPort` trait with our own `SerialPortAdapter`
//! trait for dependency injection and testing.

use super::error::PortError;
use super::traits::{PortSettings, SerialPortAdapter};
use std::io::{Read, Write};
use std::time::Duration;

/// Synchronous serial port implementation wrapping `serialport::SerialPort`.
pub struct SyncSerialPort {
    /// The underlying serial port implementation.
    port: Box<dyn serialport::SerialPort>,
    /// The port name/path for identification.
    name: String,
}

impl SyncSerialPort {
    /// Open a serial port with the given line settings.
    ///
    /// # Arguments
    /// * `port_name` - The system path to the serial port (e.g., "/dev/ttyUSB0" or "COM3")
    /// * `settings` - Line parameters for the port
    ///
    /// # Example
    /// ```no_run
    /// use gcs_serial_link::port::{PortSettings, SyncSerialPort};
    ///
    /// let port = SyncSerialPort::open("/dev/ttyUSB0", &PortSettings::default())?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn open(port_name: &str, settings: &PortSettings) -> Result<Self, PortError> {
        let port = serialport::new(port_name, settings.baud_rate)
            .data_bits(settings.data_bits.into())
            .flow_control(settings.flow_control.into())
            .parity(settings.parity.try_into()?)
            .stop_bits(settings.stop_bits.try_into()?)
            .timeout(settings.timeout)
            .open()
            .map_err(|e| match e.kind() {
                serialport::ErrorKind::NoDevice => PortError::not_found(port_name),
                serialport::ErrorKind::InvalidInput => PortError::config(e.to_string()),
                _ => PortError::Serial(e),
            })?;

        Ok(Self {
            port,
            name: port_name.to_string(),
        })
    }
}

impl SerialPortAdapter for SyncSerialPort {
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError> {
        self.port.write(data).map_err(PortError::Io)
    }

    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, PortError> {
        self.port.read(buffer).map_err(PortError::Io)
    }

    fn flush(&mut self) -> Result<(), PortError> {
        self.port.flush().map_err(PortError::Io)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), PortError> {
        self.port.set_timeout(timeout).map_err(PortError::Serial)
    }

    fn apply_settings(&mut self, settings: &PortSettings) -> Result<(), PortError> {
        self.port.set_baud_rate(settings.baud_rate)?;
        self.port.set_data_bits(settings.data_bits.into())?;
        self.port.set_flow_control(settings.flow_control.into())?;
        self.port.set_parity(settings.parity.try_into()?)?;
        self.port.set_stop_bits(settings.stop_bits.try_into()?)?;
        self.port.set_timeout(settings.timeout)?;
        Ok(())
    }

    fn set_data_terminal_ready(&mut self, level: bool) -> Result<(), PortError> {
        self.port
            .write_data_terminal_ready(level)
            .map_err(PortError::Serial)
    }

    fn set_request_to_send(&mut self, level: bool) -> Result<(), PortError> {
        self.port
            .write_request_to_send(level)
            .map_err(PortError::Serial)
    }

    fn clear_input(&mut self) -> Result<(), PortError> {
        self.port
            .clear(serialport::ClearBuffer::Input)
            .map_err(PortError::Serial)
    }

    fn try_clone_adapter(&self) -> Result<Box<dyn SerialPortAdapter>, PortError> {
        let port = self.port.try_clone()?;
        Ok(Box::new(Self {
            port,
            name: self.name.clone(),
        }))
    }
}

impl std::fmt::Debug for SyncSerialPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncSerialPort")
            .field("name", &self.name)
            .field("baud_rate", &self.port.baud_rate())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::Parity;

    #[test]
    fn test_port_not_found_error() {
        let result = SyncSerialPort::open("/dev/nonexistent_port_12345", &PortSettings::default());

        match result {
            Err(e) => assert!(e.is_unavailable(), "unexpected error: {e:?}"),
            Ok(port) => panic!("Expected open to fail, got: {port:?}"),
        }
    }

    #[test]
    fn test_unsupported_parity_fails_before_open() {
        let settings = PortSettings {
            parity: Parity::Mark,
            ..PortSettings::default()
        };
        let result = SyncSerialPort::open("/dev/nonexistent_port_12345", &settings);
        assert!(matches!(result, Err(PortError::Config(_))));
    }
}
