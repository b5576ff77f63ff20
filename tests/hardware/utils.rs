//! Helpers for hardware tests: device selection from the environment.

use gcs_serial_link::link::DEFAULT_BAUD;
use gcs_serial_link::{LinkManager, LinkOptions, SerialConfiguration};
use serialport::{available_ports, SerialPortType};
use std::env;
use std::time::Duration;

/// Test device taken from the environment.
pub struct TestPortConfig {
    pub port_name: String,
    pub baud_rate: u32,
    pub loopback_enabled: bool,
}

impl TestPortConfig {
    /// `None` when `TEST_PORT` is unset.
    pub fn from_env() -> Option<Self> {
        let port_name = env::var("TEST_PORT").ok()?;
        let baud_rate = env::var("TEST_BAUD")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_BAUD);
        let loopback_enabled = env::var("TEST_LOOPBACK").ok().as_deref() == Some("1");

        Some(Self {
            port_name,
            baud_rate,
            loopback_enabled,
        })
    }

    pub fn configuration(&self, name: &str) -> SerialConfiguration {
        SerialConfiguration::for_port(name, &self.port_name, self.baud_rate)
            .expect("TEST_PORT/TEST_BAUD do not form a valid configuration")
    }
}

/// Like [`TestPortConfig::from_env`], printing why a test is skipped.
pub fn skip_without_hardware() -> Option<TestPortConfig> {
    let config = TestPortConfig::from_env();
    if config.is_none() {
        println!("Skipping hardware test: TEST_PORT not set");
    }
    config
}

pub fn hardware_manager() -> LinkManager {
    LinkManager::with_system_ports(LinkOptions {
        read_timeout: Duration::from_millis(100),
        ..LinkOptions::default()
    })
}

pub fn print_available_ports() {
    let ports = available_ports().unwrap_or_default();
    if ports.is_empty() {
        println!("No serial ports detected on this system");
        return;
    }
    println!("Available serial ports ({}):", ports.len());
    for port in ports {
        match port.port_type {
            SerialPortType::UsbPort(usb) => println!(
                "  {} USB {:04x}:{:04x} {}",
                port.port_name,
                usb.vid,
                usb.pid,
                usb.product.unwrap_or_default()
            ),
            _ => println!("  {}", port.port_name),
        }
    }
}
