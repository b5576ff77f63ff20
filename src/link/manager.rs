//! Registry of serial links.
//!
//! The manager is the only place links are built and the only holder of a
//! [`LinkToken`], so it alone decides when a link opens or closes its port.

use super::configuration::SerialConfiguration;
use super::serial::{LinkOptions, SerialLink};
use super::settings::{settings_key, SettingsStore};
use crate::error::{LinkError, LinkResult};
use crate::port::{PortOpener, SystemPortOpener};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Settings namespace for persisted link configurations.
pub const SETTINGS_ROOT: &str = "LinkConfigurations";

/// Capability to connect and disconnect links.
///
/// Only code inside the `link` module can mint one.
#[derive(Debug)]
pub struct LinkToken(());

impl LinkToken {
    pub(in crate::link) fn new() -> Self {
        Self(())
    }
}

/// Owns every link and drives their lifecycle.
pub struct LinkManager {
    opener: Arc<dyn PortOpener>,
    options: LinkOptions,
    links: RwLock<Vec<Arc<SerialLink>>>,
    token: LinkToken,
}

impl LinkManager {
    pub fn new(opener: Arc<dyn PortOpener>, options: LinkOptions) -> Self {
        Self {
            opener,
            options,
            links: RwLock::new(Vec::new()),
            token: LinkToken::new(),
        }
    }

    /// A manager that opens real OS serial ports.
    pub fn with_system_ports(options: LinkOptions) -> Self {
        Self::new(Arc::new(SystemPortOpener), options)
    }

    pub fn options(&self) -> &LinkOptions {
        &self.options
    }

    /// Register a new link. Names must be unique, and the configuration must
    /// be one the port backend can open.
    pub fn create_link(&self, config: SerialConfiguration) -> LinkResult<Arc<SerialLink>> {
        config.validate_for_backend()?;

        let mut links = self.links.write();
        if links.iter().any(|l| l.name() == config.name()) {
            return Err(LinkError::DuplicateLink(config.name().to_string()));
        }

        debug!(link = %config.name(), port = %config.port_name(), "Creating link");
        let link = Arc::new(SerialLink::new(
            config,
            Arc::clone(&self.opener),
            self.options.clone(),
        ));
        links.push(Arc::clone(&link));
        Ok(link)
    }

    pub fn link(&self, name: &str) -> Option<Arc<SerialLink>> {
        self.links.read().iter().find(|l| l.name() == name).cloned()
    }

    /// Link names in creation order.
    pub fn link_names(&self) -> Vec<String> {
        self.links.read().iter().map(|l| l.name()).collect()
    }

    pub fn connect_link(&self, name: &str) -> LinkResult<()> {
        self.require(name)?.connect(&self.token)
    }

    pub fn disconnect_link(&self, name: &str) -> LinkResult<()> {
        self.require(name)?.disconnect(&self.token)
    }

    /// Disconnect a link and drop it from the registry.
    pub fn remove_link(&self, name: &str) -> LinkResult<()> {
        let link = {
            let mut links = self.links.write();
            let index = links
                .iter()
                .position(|l| l.name() == name)
                .ok_or_else(|| LinkError::UnknownLink(name.to_string()))?;
            links.remove(index)
        };
        link.disconnect(&self.token)?;
        info!(link = %name, "Link removed");
        Ok(())
    }

    /// Write every link configuration into `store`, replacing what was
    /// there before. On error `store` is left untouched.
    pub fn save_configurations(&self, store: &mut SettingsStore) -> LinkResult<()> {
        let mut next = store.clone();
        next.remove_group(SETTINGS_ROOT);

        let links = self.links.read();
        next.set_int(settings_key(SETTINGS_ROOT, "count"), links.len() as i64);
        for (i, link) in links.iter().enumerate() {
            let root = settings_key(SETTINGS_ROOT, &format!("Link{i}"));
            link.configuration().save_settings(&mut next, &root)?;
        }

        *store = next;
        debug!("Saved {} link configurations", links.len());
        Ok(())
    }

    /// Create links for every configuration found in `store`.
    ///
    /// Entries that fail to load, or whose name is already registered, are
    /// skipped with a warning. Returns how many links were created.
    pub fn load_configurations(&self, store: &SettingsStore) -> LinkResult<usize> {
        let count = store
            .get_int(&settings_key(SETTINGS_ROOT, "count"))?
            .unwrap_or(0)
            .max(0);

        let mut created = 0;
        for i in 0..count {
            let root = settings_key(SETTINGS_ROOT, &format!("Link{i}"));
            let mut config = SerialConfiguration::new(format!("Link{i}"));
            if let Err(e) = config.load_settings(store, &root) {
                warn!("Skipping stored link {}: {}", root, e);
                continue;
            }
            match self.create_link(config) {
                Ok(_) => created += 1,
                Err(e) => warn!("Skipping stored link {}: {}", root, e),
            }
        }
        info!("Loaded {} of {} stored link configurations", created, count);
        Ok(created)
    }

    fn require(&self, name: &str) -> LinkResult<Arc<SerialLink>> {
        self.link(name)
            .ok_or_else(|| LinkError::UnknownLink(name.to_string()))
    }
}

impl Drop for LinkManager {
    fn drop(&mut self) {
        for link in self.links.get_mut().drain(..) {
            if let Err(e) = link.disconnect(&self.token) {
                warn!(link = %link.name(), "Disconnect on shutdown failed: {}", e);
            }
        }
    }
}

impl std::fmt::Debug for LinkManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkManager")
            .field("options", &self.options)
            .field("links", &self.link_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::{DataBits, MockPortOpener, MockSerialPort, Parity, StopBits};
    use pretty_assertions::assert_eq;

    fn manager_with(devices: &[&str]) -> LinkManager {
        let opener = MockPortOpener::new();
        for name in devices {
            opener.register(MockSerialPort::new(*name));
        }
        LinkManager::new(Arc::new(opener), LinkOptions::default())
    }

    #[test]
    fn test_duplicate_names_are_rejected() {
        let manager = manager_with(&["COM1"]);
        manager
            .create_link(SerialConfiguration::for_port("radio", "COM1", 57600).unwrap())
            .unwrap();
        let err = manager
            .create_link(SerialConfiguration::for_port("radio", "COM2", 9600).unwrap())
            .unwrap_err();
        assert!(matches!(err, LinkError::DuplicateLink(ref n) if n == "radio"));
    }

    #[test]
    fn test_unconfigured_link_is_rejected() {
        let manager = manager_with(&[]);
        let err = manager
            .create_link(SerialConfiguration::new("blank"))
            .unwrap_err();
        assert!(matches!(err, LinkError::InvalidConfiguration { field: "port_name", .. }));
    }

    #[test]
    fn test_framing_the_backend_cannot_open_is_refused() {
        let manager = manager_with(&["COM1"]);

        let mut mark = SerialConfiguration::for_port("mark", "COM1", 57600).unwrap();
        mark.set_parity(Parity::Mark).unwrap();
        let err = manager.create_link(mark).unwrap_err();
        assert!(matches!(err, LinkError::InvalidConfiguration { field: "parity", .. }));

        let mut short = SerialConfiguration::for_port("short", "COM1", 57600).unwrap();
        short.set_data_bits(DataBits::Five).unwrap();
        short.set_stop_bits(StopBits::OnePointFive).unwrap();
        let err = manager.create_link(short).unwrap_err();
        assert!(matches!(err, LinkError::InvalidConfiguration { field: "stop_bits", .. }));

        assert!(manager.link_names().is_empty());
    }

    #[test]
    fn test_unknown_link() {
        let manager = manager_with(&[]);
        assert!(matches!(
            manager.connect_link("nope"),
            Err(LinkError::UnknownLink(_))
        ));
        assert!(matches!(
            manager.remove_link("nope"),
            Err(LinkError::UnknownLink(_))
        ));
    }

    #[test]
    fn test_remove_disconnects() {
        let manager = manager_with(&["COM1"]);
        let link = manager
            .create_link(SerialConfiguration::for_port("radio", "COM1", 57600).unwrap())
            .unwrap();
        manager.connect_link("radio").unwrap();
        assert!(link.is_connected());

        manager.remove_link("radio").unwrap();
        assert!(!link.is_connected());
        assert!(manager.link("radio").is_none());
    }

    #[test]
    fn test_drop_disconnects_every_link() {
        let manager = manager_with(&["COM1", "COM2"]);
        let a = manager
            .create_link(SerialConfiguration::for_port("a", "COM1", 57600).unwrap())
            .unwrap();
        let b = manager
            .create_link(SerialConfiguration::for_port("b", "COM2", 115200).unwrap())
            .unwrap();
        manager.connect_link("a").unwrap();
        manager.connect_link("b").unwrap();

        drop(manager);
        assert!(!a.is_connected());
        assert!(!b.is_connected());
    }

    #[test]
    fn test_configurations_survive_save_and_load() {
        let manager = manager_with(&[]);
        manager
            .create_link(SerialConfiguration::for_port("radio", "/dev/ttyUSB0", 57600).unwrap())
            .unwrap();
        manager
            .create_link(SerialConfiguration::for_port("fmu", "/dev/ttyACM0", 115200).unwrap())
            .unwrap();

        let mut store = SettingsStore::new();
        manager.save_configurations(&mut store).unwrap();
        assert_eq!(store.get_int("LinkConfigurations/count").unwrap(), Some(2));
        assert_eq!(
            store.get_str("LinkConfigurations/Link1/port_name").as_deref(),
            Some("/dev/ttyACM0")
        );

        let restored = manager_with(&[]);
        assert_eq!(restored.load_configurations(&store).unwrap(), 2);
        assert_eq!(restored.link_names(), vec!["radio", "fmu"]);
        assert_eq!(
            restored.link("fmu").unwrap().configuration(),
            manager.link("fmu").unwrap().configuration()
        );
    }

    #[test]
    fn test_load_skips_bad_entries() {
        let mut store = SettingsStore::new();
        store.set_int("LinkConfigurations/count", 2);
        store.set_str("LinkConfigurations/Link0/name", "good");
        store.set_str("LinkConfigurations/Link0/port_name", "COM3");
        store.set_str("LinkConfigurations/Link1/name", "bad");
        store.set_str("LinkConfigurations/Link1/port_name", "COM4");
        store.set_int("LinkConfigurations/Link1/baud", 12345);

        let manager = manager_with(&[]);
        assert_eq!(manager.load_configurations(&store).unwrap(), 1);
        assert_eq!(manager.link_names(), vec!["good"]);
    }
}
