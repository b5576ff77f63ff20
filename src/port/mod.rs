//! Port abstraction layer for serial communication.
//!
//! Provides the adapter trait, the real `serialport`-backed implementation,
//! a mock device for tests, and the factories a link opens ports through.

pub mod error;
pub mod mock;
pub mod opener;
pub mod sync_port;
pub mod traits;

pub use error::{ErrorSeverity, PortError};
pub use mock::MockSerialPort;
pub use opener::{MockPortOpener, PortIdentity, PortOpener, SystemPortOpener};
pub use sync_port::*;
pub use traits::*;
