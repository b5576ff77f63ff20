//! Shared test utilities for link tests.
//!
//! Builds a [`LinkManager`] over a [`MockPortOpener`] with short timeouts,
//! and helpers for waiting on link events.

#![allow(dead_code)]

use crossbeam_channel::Receiver;
use gcs_serial_link::{
    LinkEvent, LinkManager, LinkOptions, MockPortOpener, MockSerialPort, SerialConfiguration,
    SerialLink,
};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// How long a test waits for an event before failing.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(2);

pub const LINK_NAME: &str = "vehicle";

/// Link options with short timeouts so tests stay fast.
pub fn test_options() -> LinkOptions {
    LinkOptions {
        read_timeout: Duration::from_millis(20),
        write_retry_limit: 8,
        reset_pulse: Duration::from_millis(5),
        read_chunk_size: 64,
    }
}

/// A manager with one registered link on one simulated device.
pub struct Rig {
    pub manager: LinkManager,
    pub opener: Arc<MockPortOpener>,
    pub device: MockSerialPort,
    pub link: Arc<SerialLink>,
}

impl Rig {
    pub fn connect(&self) {
        self.manager
            .connect_link(LINK_NAME)
            .expect("connect failed");
    }

    pub fn disconnect(&self) {
        self.manager
            .disconnect_link(LINK_NAME)
            .expect("disconnect failed");
    }
}

/// Build a rig around `device` with an 8N1 configuration at 57600 baud.
pub fn rig(device: MockSerialPort) -> Rig {
    let config = SerialConfiguration::for_port(LINK_NAME, &device_name(&device), 57600)
        .expect("valid configuration");
    rig_with(device, config)
}

/// Build a rig around `device` using `config` as is.
pub fn rig_with(device: MockSerialPort, config: SerialConfiguration) -> Rig {
    let opener = Arc::new(MockPortOpener::new());
    opener.register(device.clone());
    let manager = LinkManager::new(opener.clone(), test_options());
    let link = manager.create_link(config).expect("create link");
    Rig {
        manager,
        opener,
        device,
        link,
    }
}

fn device_name(device: &MockSerialPort) -> String {
    use gcs_serial_link::SerialPortAdapter;
    device.name().to_string()
}

pub fn next_event(rx: &Receiver<LinkEvent>) -> LinkEvent {
    rx.recv_timeout(RECV_TIMEOUT).expect("timed out waiting for event")
}

/// Gather `Bytes` events until at least `n` bytes have arrived.
pub fn collect_bytes(rx: &Receiver<LinkEvent>, n: usize) -> Vec<u8> {
    let mut out = Vec::new();
    while out.len() < n {
        if let LinkEvent::Bytes(bytes) = next_event(rx) {
            out.extend_from_slice(&bytes);
        }
    }
    out
}

/// Receive events until `Disconnected`, inclusive.
pub fn events_until_disconnected(rx: &Receiver<LinkEvent>) -> Vec<LinkEvent> {
    let mut events = Vec::new();
    loop {
        let event = next_event(rx);
        let done = event == LinkEvent::Disconnected;
        events.push(event);
        if done {
            return events;
        }
    }
}

/// Everything that arrives within `settle`.
pub fn drain_for(rx: &Receiver<LinkEvent>, settle: Duration) -> Vec<LinkEvent> {
    let deadline = Instant::now() + settle;
    let mut events = Vec::new();
    while let Some(left) = deadline.checked_duration_since(Instant::now()) {
        match rx.recv_timeout(left) {
            Ok(event) => events.push(event),
            Err(_) => break,
        }
    }
    events
}

/// Poll `cond` until it holds or `timeout` passes.
pub fn wait_for(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    cond()
}
