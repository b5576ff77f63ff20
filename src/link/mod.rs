//! Serial links and their registry.

pub mod configuration;
pub mod events;
pub mod manager;
pub mod serial;
pub mod settings;
pub mod state;

pub use configuration::{supported_baud_rates, SerialConfiguration, DEFAULT_BAUD};
pub use events::{EventBus, LinkEvent};
pub use manager::{LinkManager, LinkToken, SETTINGS_ROOT};
pub use serial::{LinkOptions, SerialLink};
pub use settings::{settings_key, SettingValue, SettingsStore};
pub use state::{AtomicLinkState, LinkState};
