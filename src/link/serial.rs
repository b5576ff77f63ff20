//! Serial link: one physical port, one background reader, thread-safe writes.
//!
//! # Locking
//!
//! ```text
//! lifecycle ──> write guard ──> data guard
//! ```
//!
//! * `lifecycle` serialises connect / disconnect / reconfigure and owns the
//!   I/O thread handle. The I/O thread never takes it.
//! * The write guard owns the write handle and the transmit buffer.
//! * The data guard owns the read handle and is held only for one bounded
//!   read at a time.
//!
//! When both guards are needed they are taken in that order. Events are
//! published with no guard held.

use super::configuration::SerialConfiguration;
use super::events::{EventBus, LinkEvent};
use super::manager::LinkToken;
use super::state::{AtomicLinkState, LinkState};
use crate::error::{LinkError, LinkErrorCode, LinkResult};
use crate::port::{PortError, PortIdentity, PortOpener, SerialPortAdapter};
use crossbeam_channel::Receiver;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// Tunables shared by every link a manager creates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkOptions {
    /// Upper bound on a single blocking read; also bounds how long
    /// disconnect waits for the I/O thread.
    pub read_timeout: Duration,
    /// How many stalled or transiently failing write attempts are tolerated
    /// before a write is reported as failed.
    pub write_retry_limit: u32,
    /// How long DTR/RTS are held low during a reset.
    pub reset_pulse: Duration,
    /// Size of the I/O thread's read buffer.
    pub read_chunk_size: usize,
}

impl Default for LinkOptions {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_millis(50),
            write_retry_limit: 8,
            reset_pulse: Duration::from_millis(250),
            read_chunk_size: 1024,
        }
    }
}

#[derive(Debug, Default)]
struct Transmitter {
    port: Option<Box<dyn SerialPortAdapter>>,
    buffer: Vec<u8>,
}

/// State shared between the link handle and its I/O thread.
struct LinkShared {
    config: RwLock<SerialConfiguration>,
    opener: Arc<dyn PortOpener>,
    options: LinkOptions,
    state: AtomicLinkState,
    /// Data guard.
    reader: Mutex<Option<Box<dyn SerialPortAdapter>>>,
    /// Write guard.
    writer: Mutex<Transmitter>,
    stop: AtomicBool,
    reset_requested: AtomicBool,
    bytes_read: AtomicU64,
    bytes_written: AtomicU64,
    events: EventBus,
}

/// A serial link to one remote endpoint.
///
/// Links are created and connected only through
/// [`LinkManager`](super::LinkManager); `connect` and `disconnect` demand a
/// [`LinkToken`] that nothing outside the manager can construct.
pub struct SerialLink {
    shared: Arc<LinkShared>,
    lifecycle: Mutex<Option<JoinHandle<()>>>,
}

impl SerialLink {
    pub(crate) fn new(
        config: SerialConfiguration,
        opener: Arc<dyn PortOpener>,
        options: LinkOptions,
    ) -> Self {
        Self {
            shared: Arc::new(LinkShared {
                config: RwLock::new(config),
                opener,
                options,
                state: AtomicLinkState::default(),
                reader: Mutex::new(None),
                writer: Mutex::new(Transmitter::default()),
                stop: AtomicBool::new(false),
                reset_requested: AtomicBool::new(false),
                bytes_read: AtomicU64::new(0),
                bytes_written: AtomicU64::new(0),
                events: EventBus::new(),
            }),
            lifecycle: Mutex::new(None),
        }
    }

    /// The link's registered name.
    pub fn name(&self) -> String {
        self.shared.config.read().name().to_string()
    }

    /// Snapshot of the configuration currently applied to this link.
    pub fn configuration(&self) -> SerialConfiguration {
        self.shared.config.read().clone()
    }

    /// Current lifecycle state. May be stale by the time the caller looks.
    pub fn state(&self) -> LinkState {
        self.shared.state.load()
    }

    /// `true` only while the port is open and the I/O thread is running.
    pub fn is_connected(&self) -> bool {
        self.state() == LinkState::Connected
    }

    /// Logical throughput estimate: the configured baud rate.
    pub fn connection_speed(&self) -> u64 {
        u64::from(self.shared.config.read().baud())
    }

    /// Bytes delivered by the I/O thread since the link was created.
    pub fn bytes_read(&self) -> u64 {
        self.shared.bytes_read.load(Ordering::Relaxed)
    }

    /// Bytes accepted by the port, summed over every connection.
    pub fn bytes_written(&self) -> u64 {
        self.shared.bytes_written.load(Ordering::Relaxed)
    }

    /// Poll interval of the I/O thread, which also bounds how long
    /// [`disconnect`](Self::disconnect) waits for it.
    pub fn read_timeout(&self) -> Duration {
        self.shared.options.read_timeout
    }

    /// Receive this link's events from now on.
    pub fn subscribe(&self) -> Receiver<LinkEvent> {
        self.shared.events.subscribe()
    }

    /// Ask the I/O thread to pulse DTR/RTS and flush stale input before its
    /// next read. If the link is closed, the reset runs right after the next
    /// connect.
    pub fn request_reset(&self) {
        debug!(link = %self.name(), "Reset requested");
        self.shared.reset_requested.store(true, Ordering::Release);
    }

    /// Open the port and start the I/O thread.
    ///
    /// Connecting an already connected link does nothing and succeeds.
    pub fn connect(&self, _token: &LinkToken) -> LinkResult<()> {
        let mut io_thread = self.lifecycle.lock();
        if self.is_connected() {
            debug!(link = %self.name(), "Already connected");
            return Ok(());
        }
        // A thread that stopped itself after a fatal error is still joinable.
        if let Some(handle) = io_thread.take() {
            join_io_thread(handle);
        }

        let config = self.configuration();
        if let Err(e) = config.validate_for_backend() {
            self.shared.report(&e);
            return Err(e);
        }

        self.shared.state.store(LinkState::Connecting);
        if let Err(e) = self.shared.open_port(&config) {
            self.shared.state.store(LinkState::Disconnected);
            warn!(link = %config.name(), port = %config.port_name(), "Connect failed: {}", e);
            self.shared.report(&e);
            return Err(e);
        }

        self.shared.stop.store(false, Ordering::Release);
        self.shared.state.store(LinkState::Connected);

        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name(format!("serial-link-{}", config.name()))
            .spawn(move || shared.run_reader());
        match spawned {
            Ok(handle) => *io_thread = Some(handle),
            Err(e) => {
                self.shared.close_port();
                self.shared.state.store(LinkState::Disconnected);
                let err = LinkError::HardwareError(format!("failed to start I/O thread: {e}"));
                self.shared.report(&err);
                return Err(err);
            }
        }

        info!(
            link = %config.name(),
            port = %config.port_name(),
            baud = config.baud(),
            "Serial link connected"
        );
        self.shared.events.publish(LinkEvent::Connected);
        Ok(())
    }

    /// Stop the I/O thread and close the port.
    ///
    /// Returns once the I/O thread has exited, which takes at most one read
    /// timeout (plus a reset pulse if one is in progress). Disconnecting a
    /// closed link does nothing.
    pub fn disconnect(&self, _token: &LinkToken) -> LinkResult<()> {
        self.shutdown();
        Ok(())
    }

    fn shutdown(&self) {
        let mut io_thread = self.lifecycle.lock();
        let owns_teardown = self
            .shared
            .state
            .transition(LinkState::Connected, LinkState::Disconnecting);
        if owns_teardown {
            self.shared.events.publish(LinkEvent::AboutToClose);
        }

        self.shared.stop.store(true, Ordering::Release);
        if let Some(handle) = io_thread.take() {
            join_io_thread(handle);
        }

        if owns_teardown {
            self.shared.close_port();
            self.shared.state.store(LinkState::Disconnected);
            info!(link = %self.name(), "Serial link disconnected");
            self.shared.events.publish(LinkEvent::Disconnected);
        } else {
            debug!(link = %self.name(), state = %self.state(), "Disconnect on a closed link");
        }
    }

    /// Write `data` to the port.
    ///
    /// Safe to call from any number of threads. Each call's bytes reach the
    /// wire contiguously and calls are transmitted in the order they took
    /// the write guard. Partial writes are retried; a write either sends
    /// every byte or returns an error.
    pub fn write_bytes(&self, data: &[u8]) -> LinkResult<usize> {
        if !self.is_connected() {
            return Err(LinkError::NotConnected);
        }

        let mut tx = self.shared.writer.lock();
        let Transmitter { port, buffer } = &mut *tx;
        let port = port.as_mut().ok_or(LinkError::NotConnected)?;

        buffer.extend_from_slice(data);
        match drain(&mut **port, buffer, self.shared.options.write_retry_limit) {
            Ok(()) => {
                self.shared
                    .bytes_written
                    .fetch_add(data.len() as u64, Ordering::Relaxed);
                trace!(bytes = data.len(), "Wrote to serial link");
                Ok(data.len())
            }
            Err(e) => {
                // Never resend a failed write as part of a later one.
                buffer.clear();
                warn!(link = %self.name(), "Write failed: {}", e);
                Err(e)
            }
        }
    }

    /// Replace the configuration. A connected link has the new line
    /// parameters applied to its open port; moving it to a different port
    /// is refused until it is disconnected.
    pub fn update_configuration(&self, config: SerialConfiguration) -> LinkResult<()> {
        let _io_thread = self.lifecycle.lock();
        config.validate_for_backend()?;
        if config.name() != self.shared.config.read().name() {
            return Err(LinkError::invalid(
                "name",
                "a link cannot be renamed while registered",
            ));
        }
        if self.is_connected() && config.port_name() != self.shared.config.read().port_name() {
            return Err(LinkError::invalid(
                "port_name",
                "disconnect before moving a link to another port",
            ));
        }

        *self.shared.config.write() = config.clone();
        if self.is_connected() {
            self.shared.apply_settings(&config)?;
            info!(link = %config.name(), baud = config.baud(), "Applied new configuration");
        }
        Ok(())
    }

    /// Whether the attached device identifies itself as a bootloader.
    ///
    /// Informational only: no identity, or no match, is `false`.
    pub fn is_bootloader(&self) -> bool {
        let port_name = self.shared.config.read().port_name().to_string();
        match self.shared.opener.identify(&port_name) {
            Some(identity) => identity_is_bootloader(&identity),
            None => {
                debug!(port = %port_name, "No identity reported for port");
                false
            }
        }
    }

    /// Whether the protocol layer has to kick the device into streaming
    /// after connect. Bootloaders never stream.
    pub fn requires_usb_mavlink_start(&self) -> bool {
        !self.is_connected() || !self.is_bootloader()
    }
}

impl Drop for SerialLink {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for SerialLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialLink")
            .field("config", &*self.shared.config.read())
            .field("state", &self.state())
            .field("bytes_read", &self.bytes_read())
            .field("bytes_written", &self.bytes_written())
            .finish()
    }
}

impl LinkShared {
    fn name(&self) -> String {
        self.config.read().name().to_string()
    }

    /// Open the device and split it into a read and a write handle.
    fn open_port(&self, config: &SerialConfiguration) -> LinkResult<()> {
        let settings = config.port_settings(self.options.read_timeout);
        let port_name = config.port_name();

        let mut tx = self.writer.lock();
        let mut reader = self.reader.lock();

        let write_half = self
            .opener
            .open(port_name, &settings)
            .map_err(|e| LinkError::from_open(port_name, e))?;
        let mut read_half = write_half
            .try_clone_adapter()
            .map_err(|e| LinkError::from_open(port_name, e))?;
        read_half
            .set_timeout(self.options.read_timeout)
            .map_err(|e| LinkError::from_open(port_name, e))?;
        if let Err(e) = read_half.clear_input() {
            debug!(port = %port_name, "Could not discard stale input: {}", e);
        }

        *reader = Some(read_half);
        tx.port = Some(write_half);
        tx.buffer.clear();
        Ok(())
    }

    fn close_port(&self) {
        let mut tx = self.writer.lock();
        let mut reader = self.reader.lock();
        tx.port = None;
        tx.buffer.clear();
        *reader = None;
    }

    fn apply_settings(&self, config: &SerialConfiguration) -> LinkResult<()> {
        let settings = config.port_settings(self.options.read_timeout);
        let mut tx = self.writer.lock();
        let mut reader = self.reader.lock();

        if let Some(port) = tx.port.as_mut() {
            port.apply_settings(&settings).map_err(LinkError::from_io)?;
        }
        if let Some(port) = reader.as_mut() {
            port.set_timeout(self.options.read_timeout)
                .map_err(LinkError::from_io)?;
        }
        Ok(())
    }

    fn report(&self, err: &LinkError) {
        self.events.publish(LinkEvent::Error {
            code: err.code(),
            message: err.to_string(),
        });
    }

    /// Body of the I/O thread.
    fn run_reader(self: Arc<Self>) {
        let mut buffer = vec![0u8; self.options.read_chunk_size.max(1)];
        debug!(link = %self.name(), "I/O thread started");

        while !self.stop.load(Ordering::Acquire) {
            if self.reset_requested.swap(false, Ordering::AcqRel) {
                match self.hardware_reset() {
                    Ok(()) => info!(link = %self.name(), "Hardware reset complete"),
                    Err(e) if e.is_fatal() => {
                        self.fail(e);
                        return;
                    }
                    Err(e) => warn!(link = %self.name(), "Hardware reset incomplete: {}", e),
                }
                continue;
            }

            let result = {
                let mut reader = self.reader.lock();
                match reader.as_mut() {
                    Some(port) => port.read_bytes(&mut buffer),
                    None => break,
                }
            };

            match result {
                Ok(0) => {}
                Ok(n) => {
                    self.bytes_read.fetch_add(n as u64, Ordering::Relaxed);
                    trace!(bytes = n, "Read from serial link");
                    self.events.publish(LinkEvent::Bytes(buffer[..n].to_vec()));
                }
                Err(e) if !e.is_fatal() => trace!("Transient read error: {}", e),
                Err(e) => {
                    self.fail(e);
                    return;
                }
            }
        }

        debug!(link = %self.name(), "I/O thread stopped");
    }

    /// Tear the link down after a fatal port error, unless a disconnect
    /// already claimed the teardown.
    fn fail(&self, err: PortError) {
        if !self
            .state
            .transition(LinkState::Connected, LinkState::Erroring)
        {
            debug!("Port error during shutdown ignored: {}", err);
            return;
        }

        let message = format!("Link {} lost: {}", self.name(), err);
        error!("{}", message);
        self.close_port();
        self.state.store(LinkState::Disconnected);
        self.events.publish(LinkEvent::Error {
            code: LinkErrorCode::HardwareError,
            message,
        });
        self.events.publish(LinkEvent::Disconnected);
    }

    fn hardware_reset(&self) -> Result<(), PortError> {
        self.set_control_lines(false)?;
        thread::sleep(self.options.reset_pulse);
        self.set_control_lines(true)?;

        let mut reader = self.reader.lock();
        reader.as_mut().ok_or(PortError::NotOpen)?.clear_input()
    }

    fn set_control_lines(&self, level: bool) -> Result<(), PortError> {
        let mut tx = self.writer.lock();
        let port = tx.port.as_mut().ok_or(PortError::NotOpen)?;
        port.set_data_terminal_ready(level)?;
        port.set_request_to_send(level)
    }
}

/// Push the whole transmit buffer into the port.
fn drain(
    port: &mut dyn SerialPortAdapter,
    buffer: &mut Vec<u8>,
    retry_limit: u32,
) -> LinkResult<()> {
    let mut stalls = 0u32;
    while !buffer.is_empty() {
        match port.write_bytes(buffer) {
            Ok(0) => {
                stalls += 1;
                if stalls > retry_limit {
                    return Err(LinkError::TransientIo(format!(
                        "device accepted no data after {retry_limit} retries"
                    )));
                }
            }
            Ok(n) => {
                buffer.drain(..n);
                stalls = 0;
            }
            Err(e) if !e.is_fatal() => {
                stalls += 1;
                if stalls > retry_limit {
                    return Err(LinkError::from_io(e));
                }
            }
            Err(e) => return Err(LinkError::from_io(e)),
        }
    }
    port.flush().map_err(LinkError::from_io)
}

fn join_io_thread(handle: JoinHandle<()>) {
    if handle.join().is_err() {
        error!("Serial I/O thread panicked");
    }
}

/// Bootloaders announce themselves in the USB product string, e.g.
/// "PX4 BL FMU v2.x" or "SiK Radio Bootloader".
fn identity_is_bootloader(identity: &PortIdentity) -> bool {
    let Some(product) = identity.product.as_deref() else {
        return false;
    };
    let product = product.to_ascii_lowercase();
    product.contains("bootloader")
        || product
            .split(|c: char| !c.is_ascii_alphanumeric())
            .any(|word| word == "bl")
}
