//! Serial transport for ground-station to vehicle links.
//!
//! A [`LinkManager`] owns a set of [`SerialLink`]s, each described by a
//! [`SerialConfiguration`]. A connected link runs one background I/O thread
//! that reads the port and publishes [`LinkEvent`]s; any thread may write.
//!
//! # Modules
//!
//! - `link`: configuration, link lifecycle, events and the registry
//! - `port`: serial port abstraction over `serialport`, plus a mock device
//! - `config`: TOML configuration with environment overrides
//! - `logging`: `tracing` subscriber setup
//! - `error`: link error taxonomy
//!
//! # Example
//!
//! ```rust,no_run
//! use gcs_serial_link::{LinkEvent, LinkManager, LinkOptions, SerialConfiguration};
//!
//! let manager = LinkManager::with_system_ports(LinkOptions::default());
//! let link = manager.create_link(SerialConfiguration::for_port("radio", "/dev/ttyUSB0", 57600)?)?;
//! let events = link.subscribe();
//! manager.connect_link("radio")?;
//! link.write_bytes(b"PING")?;
//! if let Ok(LinkEvent::Bytes(bytes)) = events.recv() {
//!     println!("{} bytes", bytes.len());
//! }
//! # Ok::<(), gcs_serial_link::LinkError>(())
//! ```

pub mod config;
pub mod error;
pub mod link;
pub mod logging;
pub mod port;

pub use config::{Config, ConfigError, ConfigLoader, ConfigResult};
pub use error::{LinkError, LinkErrorCode, LinkResult};
pub use link::{
    supported_baud_rates, LinkEvent, LinkManager, LinkOptions, LinkState, SerialConfiguration,
    SerialLink, SettingsStore,
};
pub use port::{
    DataBits, FlowControl, MockPortOpener, MockSerialPort, Parity, PortError, PortIdentity,
    PortOpener, PortSettings, SerialPortAdapter, StopBits, SystemPortOpener,
};
