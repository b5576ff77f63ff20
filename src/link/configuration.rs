//! Serial link configuration.
//!
//! A [`SerialConfiguration`] describes how to open one serial link. Every
//! setter validates its input and leaves the previous value in place on
//! failure, so a configuration that has only been touched through setters is
//! always usable except for a missing port name.

use crate::error::{LinkError, LinkResult};
use crate::link::settings::{settings_key, SettingsStore};
use crate::port::{DataBits, FlowControl, Parity, PortError, PortSettings, StopBits};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Baud rate a fresh configuration starts with.
pub const DEFAULT_BAUD: u32 = 57600;

static SUPPORTED_BAUD_RATES: Lazy<Vec<u32>> = Lazy::new(|| {
    let rates = vec![
        1200, 2400, 4800, 9600, 19200, 38400, 57600, 115200, 230400, 460800, 921600,
    ];
    debug!("Initialised {} supported baud rates", rates.len());
    rates
});

/// Ordered list of baud rates a configuration will accept.
///
/// Built once on first use.
pub fn supported_baud_rates() -> &'static [u32] {
    &SUPPORTED_BAUD_RATES
}

/// Parameters needed to open a serial link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialConfiguration {
    name: String,
    port_name: String,
    baud: u32,
    data_bits: DataBits,
    parity: Parity,
    stop_bits: StopBits,
    flow_control: FlowControl,
}

impl SerialConfiguration {
    /// A configuration with 57600 8N1, no flow control and no port yet.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            port_name: String::new(),
            baud: DEFAULT_BAUD,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            flow_control: FlowControl::None,
        }
    }

    /// Convenience constructor for the common 8N1 case.
    pub fn for_port(name: impl Into<String>, port_name: &str, baud: u32) -> LinkResult<Self> {
        let mut config = Self::new(name);
        config.set_port_name(port_name)?;
        config.set_baud(baud)?;
        Ok(config)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    pub fn baud(&self) -> u32 {
        self.baud
    }

    pub fn data_bits(&self) -> DataBits {
        self.data_bits
    }

    pub fn parity(&self) -> Parity {
        self.parity
    }

    pub fn stop_bits(&self) -> StopBits {
        self.stop_bits
    }

    pub fn flow_control(&self) -> FlowControl {
        self.flow_control
    }

    pub fn set_name(&mut self, name: impl Into<String>) -> LinkResult<()> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(LinkError::invalid("name", "link name must not be empty"));
        }
        self.name = name;
        Ok(())
    }

    pub fn set_port_name(&mut self, port_name: &str) -> LinkResult<()> {
        let trimmed = port_name.trim();
        if trimmed.is_empty() {
            return Err(LinkError::invalid("port_name", "port name must not be empty"));
        }
        self.port_name = trimmed.to_string();
        Ok(())
    }

    pub fn set_baud(&mut self, baud: u32) -> LinkResult<()> {
        if !supported_baud_rates().contains(&baud) {
            return Err(LinkError::invalid(
                "baud",
                format!("{baud} is not a supported baud rate"),
            ));
        }
        self.baud = baud;
        Ok(())
    }

    pub fn set_data_bits(&mut self, data_bits: DataBits) -> LinkResult<()> {
        check_framing(data_bits, self.stop_bits)?;
        self.data_bits = data_bits;
        Ok(())
    }

    /// Same as [`set_data_bits`](Self::set_data_bits) for a raw bit count.
    pub fn set_data_bits_raw(&mut self, bits: u8) -> LinkResult<()> {
        let data_bits =
            DataBits::try_from(bits).map_err(|e| LinkError::invalid("data_bits", e.to_string()))?;
        self.set_data_bits(data_bits)
    }

    pub fn set_parity(&mut self, parity: Parity) -> LinkResult<()> {
        self.parity = parity;
        Ok(())
    }

    pub fn set_stop_bits(&mut self, stop_bits: StopBits) -> LinkResult<()> {
        check_framing(self.data_bits, stop_bits)?;
        self.stop_bits = stop_bits;
        Ok(())
    }

    pub fn set_flow_control(&mut self, flow_control: FlowControl) -> LinkResult<()> {
        self.flow_control = flow_control;
        Ok(())
    }

    /// Deep-copy every field of `other`, the name included.
    pub fn copy_from(&mut self, other: &SerialConfiguration) {
        self.clone_from(other);
    }

    /// Check every field against its domain.
    pub fn validate(&self) -> LinkResult<()> {
        if self.name.trim().is_empty() {
            return Err(LinkError::invalid("name", "link name must not be empty"));
        }
        if self.port_name.is_empty() {
            return Err(LinkError::invalid("port_name", "no serial port selected"));
        }
        if !supported_baud_rates().contains(&self.baud) {
            return Err(LinkError::invalid(
                "baud",
                format!("{} is not a supported baud rate", self.baud),
            ));
        }
        check_framing(self.data_bits, self.stop_bits)
    }

    /// [`validate`](Self::validate), plus the limits of the `serialport`
    /// backend: no mark/space parity and no 1.5 stop bits.
    pub fn validate_for_backend(&self) -> LinkResult<()> {
        self.validate()?;
        serialport::Parity::try_from(self.parity)
            .map_err(|e| LinkError::invalid("parity", e.to_string()))?;
        serialport::StopBits::try_from(self.stop_bits)
            .map_err(|e| LinkError::invalid("stop_bits", e.to_string()))?;
        Ok(())
    }

    /// Line settings for the port layer.
    pub fn port_settings(&self, timeout: Duration) -> PortSettings {
        PortSettings {
            baud_rate: self.baud,
            data_bits: self.data_bits,
            flow_control: self.flow_control,
            parity: self.parity,
            stop_bits: self.stop_bits,
            timeout,
        }
    }

    /// Store every field under `root`.
    ///
    /// A configuration without a name is refused, since it could not be
    /// loaded back.
    pub fn save_settings(&self, store: &mut SettingsStore, root: &str) -> LinkResult<()> {
        if self.name.trim().is_empty() {
            return Err(LinkError::invalid("name", "link name must not be empty"));
        }
        store.set_str(settings_key(root, "name"), self.name.clone());
        store.set_str(settings_key(root, "port_name"), self.port_name.clone());
        store.set_int(settings_key(root, "baud"), i64::from(self.baud));
        store.set_int(
            settings_key(root, "data_bits"),
            i64::from(self.data_bits.bits()),
        );
        store.set_str(settings_key(root, "parity"), self.parity.to_string());
        store.set_str(settings_key(root, "stop_bits"), self.stop_bits.to_string());
        store.set_str(
            settings_key(root, "flow_control"),
            self.flow_control.to_string(),
        );
        Ok(())
    }

    /// Load fields stored under `root`.
    ///
    /// Keys that are absent keep their current value. If any stored value is
    /// invalid, nothing is changed and the error names the offending field.
    pub fn load_settings(&mut self, store: &SettingsStore, root: &str) -> LinkResult<()> {
        let mut next = self.clone();

        if let Some(name) = store.get_str(&settings_key(root, "name")) {
            next.set_name(name)?;
        }
        if let Some(port) = store.get_str(&settings_key(root, "port_name")) {
            // An empty port name is a legal "not chosen yet" state on disk.
            if port.trim().is_empty() {
                next.port_name.clear();
            } else {
                next.set_port_name(&port)?;
            }
        }
        if let Some(baud) = store.get_int(&settings_key(root, "baud"))? {
            let baud = u32::try_from(baud)
                .map_err(|_| LinkError::invalid("baud", format!("{baud} is out of range")))?;
            next.set_baud(baud)?;
        }
        // Data bits and stop bits are checked together below.
        if let Some(bits) = store.get_int(&settings_key(root, "data_bits"))? {
            let bits = u8::try_from(bits)
                .map_err(|_| LinkError::invalid("data_bits", format!("{bits} is out of range")))?;
            next.data_bits = DataBits::try_from(bits)
                .map_err(|e| LinkError::invalid("data_bits", e.to_string()))?;
        }
        if let Some(stop) = store.get_str(&settings_key(root, "stop_bits")) {
            next.stop_bits = stop
                .parse()
                .map_err(|e: PortError| LinkError::invalid("stop_bits", e.to_string()))?;
        }
        check_framing(next.data_bits, next.stop_bits)?;
        if let Some(parity) = store.get_str(&settings_key(root, "parity")) {
            next.parity = parity
                .parse()
                .map_err(|e: PortError| LinkError::invalid("parity", e.to_string()))?;
        }
        if let Some(flow) = store.get_str(&settings_key(root, "flow_control")) {
            next.flow_control = flow.parse().map_err(|e: PortError| {
                LinkError::invalid("flow_control", e.to_string())
            })?;
        }

        *self = next;
        Ok(())
    }
}

/// UART framing rule: 1.5 stop bits exist only with 5 data bits, and 5 data
/// bits cannot be paired with 2 stop bits.
fn check_framing(data_bits: DataBits, stop_bits: StopBits) -> LinkResult<()> {
    match (data_bits, stop_bits) {
        (DataBits::Five, StopBits::Two) => Err(LinkError::invalid(
            "stop_bits",
            "2 stop bits cannot be used with 5 data bits",
        )),
        (bits, StopBits::OnePointFive) if bits != DataBits::Five => Err(LinkError::invalid(
            "stop_bits",
            "1.5 stop bits require 5 data bits",
        )),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LinkErrorCode;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = SerialConfiguration::new("telemetry");
        assert_eq!(config.name(), "telemetry");
        assert_eq!(config.baud(), 57600);
        assert_eq!(config.data_bits(), DataBits::Eight);
        assert_eq!(config.parity(), Parity::None);
        assert_eq!(config.stop_bits(), StopBits::One);
        assert_eq!(config.flow_control(), FlowControl::None);
        assert_eq!(config.port_name(), "");
    }

    #[test]
    fn test_baud_rates_are_sorted_and_cached() {
        let first = supported_baud_rates();
        let second = supported_baud_rates();
        assert!(std::ptr::eq(first, second));
        assert!(first.windows(2).all(|w| w[0] < w[1]));
        assert!(first.contains(&57600));
    }

    #[test]
    fn test_invalid_baud_keeps_previous_value() {
        let mut config = SerialConfiguration::new("t");
        config.set_baud(115200).unwrap();

        let err = config.set_baud(12345).unwrap_err();
        assert_eq!(err.code(), LinkErrorCode::InvalidConfiguration);
        assert_eq!(config.baud(), 115200);
    }

    #[test]
    fn test_port_name_is_trimmed() {
        let mut config = SerialConfiguration::new("t");
        config.set_port_name("  /dev/ttyUSB0\n").unwrap();
        assert_eq!(config.port_name(), "/dev/ttyUSB0");
        assert!(config.set_port_name("   ").is_err());
        assert_eq!(config.port_name(), "/dev/ttyUSB0");
    }

    #[test]
    fn test_framing_rules() {
        let mut config = SerialConfiguration::new("t");
        assert!(config.set_stop_bits(StopBits::OnePointFive).is_err());
        assert_eq!(config.stop_bits(), StopBits::One);

        config.set_data_bits(DataBits::Five).unwrap();
        config.set_stop_bits(StopBits::OnePointFive).unwrap();
        assert!(config.set_stop_bits(StopBits::Two).is_err());
        // Going back to 8 data bits would leave 1.5 stop bits dangling.
        assert!(config.set_data_bits(DataBits::Eight).is_err());
        assert_eq!(config.data_bits(), DataBits::Five);

        assert!(config.set_data_bits_raw(9).is_err());
    }

    #[test]
    fn test_validate_requires_port() {
        let mut config = SerialConfiguration::new("t");
        assert!(config.validate().is_err());
        config.set_port_name("COM3").unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_backend_rejects_mark_parity() {
        let mut config = SerialConfiguration::for_port("t", "COM3", 9600).unwrap();
        config.set_parity(Parity::Mark).unwrap();
        assert!(config.validate().is_ok());
        let err = config.validate_for_backend().unwrap_err();
        assert!(matches!(
            err,
            LinkError::InvalidConfiguration { field: "parity", .. }
        ));
    }

    #[test]
    fn test_copy_from_is_deep() {
        let mut original = SerialConfiguration::for_port("a", "COM1", 9600).unwrap();
        let mut snapshot = SerialConfiguration::new("b");
        snapshot.copy_from(&original);
        original.set_baud(115200).unwrap();

        assert_eq!(snapshot.name(), "a");
        assert_eq!(snapshot.baud(), 9600);
    }

    #[test]
    fn test_settings_round_trip() {
        let mut config = SerialConfiguration::for_port("radio", "/dev/ttyUSB1", 921600).unwrap();
        config.set_parity(Parity::Even).unwrap();
        config.set_flow_control(FlowControl::Hardware).unwrap();
        config.set_stop_bits(StopBits::Two).unwrap();

        let mut store = SettingsStore::new();
        config.save_settings(&mut store, "Links/Link0").unwrap();

        let mut loaded = SerialConfiguration::new("placeholder");
        loaded.load_settings(&store, "Links/Link0").unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_unnamed_configuration_is_not_saved() {
        let mut store = SettingsStore::new();
        for name in ["", "   "] {
            let config = SerialConfiguration::new(name);
            let err = config.save_settings(&mut store, "Links/Link0").unwrap_err();
            assert!(matches!(
                err,
                LinkError::InvalidConfiguration { field: "name", .. }
            ));
        }
        assert!(store.is_empty());
    }

    #[test]
    fn test_bad_stored_value_changes_nothing() {
        let mut store = SettingsStore::new();
        store.set_int("root/baud", 115200);
        store.set_str("root/parity", "sideways");

        let mut config = SerialConfiguration::new("t");
        let err = config.load_settings(&store, "root").unwrap_err();
        assert!(matches!(
            err,
            LinkError::InvalidConfiguration { field: "parity", .. }
        ));
        assert_eq!(config.baud(), DEFAULT_BAUD);
    }

    #[test]
    fn test_missing_keys_keep_current_values() {
        let mut store = SettingsStore::new();
        store.set_int("root/baud", 9600);

        let mut config = SerialConfiguration::for_port("t", "COM7", 57600).unwrap();
        config.load_settings(&store, "root").unwrap();
        assert_eq!(config.baud(), 9600);
        assert_eq!(config.port_name(), "COM7");
    }
}
