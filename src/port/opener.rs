//! Port factories.
//!
//! A link never calls `serialport::new` itself; it asks a [`PortOpener`] for
//! a handle. The system opener goes to the OS, the mock opener hands out
//! simulated devices registered by tests.

use super::error::PortError;
use super::mock::MockSerialPort;
use super::sync_port::SyncSerialPort;
use super::traits::{PortSettings, SerialPortAdapter};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

/// USB identification of an attached device, as far as the OS reports it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortIdentity {
    pub port_name: String,
    pub vid: Option<u16>,
    pub pid: Option<u16>,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
}

/// Opens serial ports and answers identification queries.
pub trait PortOpener: Send + Sync {
    /// Open `port_name` with the given line settings.
    fn open(
        &self,
        port_name: &str,
        settings: &PortSettings,
    ) -> Result<Box<dyn SerialPortAdapter>, PortError>;

    /// Look up what the OS knows about `port_name`.
    fn identify(&self, port_name: &str) -> Option<PortIdentity>;
}

/// Opens real ports through the `serialport` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPortOpener;

impl PortOpener for SystemPortOpener {
    fn open(
        &self,
        port_name: &str,
        settings: &PortSettings,
    ) -> Result<Box<dyn SerialPortAdapter>, PortError> {
        let port = SyncSerialPort::open(port_name, settings)?;
        Ok(Box::new(port))
    }

    fn identify(&self, port_name: &str) -> Option<PortIdentity> {
        let ports = match serialport::available_ports() {
            Ok(ports) => ports,
            Err(e) => {
                debug!("Port enumeration failed: {}", e);
                return None;
            }
        };

        ports
            .into_iter()
            .find(|p| p.port_name.trim() == port_name.trim())
            .map(|p| match p.port_type {
                serialport::SerialPortType::UsbPort(usb) => PortIdentity {
                    port_name: p.port_name,
                    vid: Some(usb.vid),
                    pid: Some(usb.pid),
                    manufacturer: usb.manufacturer,
                    product: usb.product,
                },
                _ => PortIdentity {
                    port_name: p.port_name,
                    ..PortIdentity::default()
                },
            })
    }
}

/// Hands out registered [`MockSerialPort`] devices.
///
/// Opening a name that was never registered, or whose device is unplugged,
/// fails the same way a missing tty does.
#[derive(Debug, Default)]
pub struct MockPortOpener {
    devices: Mutex<HashMap<String, (MockSerialPort, Option<PortIdentity>)>>,
    opens: AtomicUsize,
}

impl MockPortOpener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a simulated device under its own name.
    pub fn register(&self, device: MockSerialPort) {
        let name = device.name().to_string();
        self.devices.lock().insert(name, (device, None));
    }

    /// Register a simulated device that reports USB identification.
    pub fn register_with_identity(&self, device: MockSerialPort, identity: PortIdentity) {
        let name = device.name().to_string();
        self.devices.lock().insert(name, (device, Some(identity)));
    }

    /// How many successful opens have happened so far.
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

impl PortOpener for MockPortOpener {
    fn open(
        &self,
        port_name: &str,
        settings: &PortSettings,
    ) -> Result<Box<dyn SerialPortAdapter>, PortError> {
        let devices = self.devices.lock();
        let (device, _) = devices
            .get(port_name)
            .ok_or_else(|| PortError::not_found(port_name))?;
        if device.is_unplugged() {
            return Err(PortError::not_found(port_name));
        }

        let mut port = device.clone();
        port.apply_settings(settings)?;
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(port))
    }

    fn identify(&self, port_name: &str) -> Option<PortIdentity> {
        self.devices
            .lock()
            .get(port_name)
            .and_then(|(_, identity)| identity.clone())
    }
}
