//! Mock serial port implementation for testing.
//!
//! Provides a `MockSerialPort` that simulates serial port behavior without
//! requiring actual hardware. Clones share one simulated device, so a test
//! can keep a handle, hand another to a link, and then inject data, turn on
//! echo, or pull the plug while the link is running.

use super::error::PortError;
use super::traits::{PortSettings, SerialPortAdapter};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Inner state of the simulated device.
#[derive(Debug, Default)]
struct MockPortState {
    /// Queue of bytes to be returned by read operations.
    read_queue: VecDeque<u8>,
    /// Log of all write calls that reached the device.
    write_log: Vec<Vec<u8>>,
    /// When set, written bytes are queued for reading as well.
    echo: bool,
    /// When set, the device behaves as if it had been unplugged.
    removed: bool,
    /// Number of transient read errors still to inject.
    pending_read_glitches: usize,
    /// Upper bound on bytes accepted per write call (partial writes).
    max_write_chunk: Option<usize>,
    /// Configured timeout duration.
    timeout: Duration,
    /// Settings most recently applied through `apply_settings`.
    applied_settings: Option<PortSettings>,
    /// Every DTR/RTS change, in order: ("DTR" | "RTS", level).
    control_lines: Vec<(&'static str, bool)>,
    /// Number of times the input buffer was cleared.
    input_clears: usize,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<MockPortState>,
    readable: Condvar,
}

/// Mock serial port implementation for testing.
///
/// This implementation allows you to:
/// - Enqueue data to be returned by read operations
/// - Inspect what data was written
/// - Loop written bytes back as a simple echo device
/// - Simulate transient glitches and device removal
///
/// # Example
/// ```
/// use gcs_serial_link::port::{MockSerialPort, SerialPortAdapter};
///
/// let mut port = MockSerialPort::new("MOCK0");
///
/// // Enqueue data to be read
/// port.enqueue_read(b"Hello, World!");
///
/// // Perform a read
/// let mut buffer = [0u8; 13];
/// let n = port.read_bytes(&mut buffer).unwrap();
/// assert_eq!(&buffer[..n], b"Hello, World!");
///
/// // Write some data and verify what was written
/// port.write_bytes(b"Response").unwrap();
/// assert_eq!(port.get_write_log(), vec![b"Response".to_vec()]);
/// ```
#[derive(Clone)]
pub struct MockSerialPort {
    /// The port name/identifier.
    name: String,
    shared: Arc<Shared>,
}

impl MockSerialPort {
    /// Create a new mock serial port with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        let shared = Shared::default();
        shared.state.lock().timeout = Duration::from_millis(50);
        Self {
            name: name.into(),
            shared: Arc::new(shared),
        }
    }

    /// Create a mock device that loops every write back to the reader.
    pub fn echo(name: impl Into<String>) -> Self {
        let port = Self::new(name);
        port.set_echo(true);
        port
    }

    /// Enqueue bytes to be returned by subsequent read operations.
    pub fn enqueue_read(&self, data: &[u8]) {
        let mut state = self.shared.state.lock();
        state.read_queue.extend(data);
        self.shared.readable.notify_all();
    }

    pub fn set_echo(&self, echo: bool) {
        self.shared.state.lock().echo = echo;
    }

    /// Simulate the device being unplugged. Every later read, write or
    /// control-line call fails with a broken pipe.
    pub fn unplug(&self) {
        let mut state = self.shared.state.lock();
        state.removed = true;
        self.shared.readable.notify_all();
    }

    /// Undo [`unplug`](Self::unplug).
    pub fn replug(&self) {
        self.shared.state.lock().removed = false;
    }

    pub fn is_unplugged(&self) -> bool {
        self.shared.state.lock().removed
    }

    /// Make the next `count` reads fail with a recoverable data error.
    pub fn inject_read_glitches(&self, count: usize) {
        let mut state = self.shared.state.lock();
        state.pending_read_glitches += count;
        self.shared.readable.notify_all();
    }

    /// Accept at most `limit` bytes per write call.
    pub fn set_max_write_chunk(&self, limit: Option<usize>) {
        self.shared.state.lock().max_write_chunk = limit;
    }

    /// Get a copy of all data written to the port, one entry per write call.
    pub fn get_write_log(&self) -> Vec<Vec<u8>> {
        self.shared.state.lock().write_log.clone()
    }

    /// All written bytes concatenated in wire order.
    pub fn written_bytes(&self) -> Vec<u8> {
        self.shared.state.lock().write_log.concat()
    }

    /// Clear the write log.
    pub fn clear_write_log(&self) {
        self.shared.state.lock().write_log.clear();
    }

    pub fn applied_settings(&self) -> Option<PortSettings> {
        self.shared.state.lock().applied_settings.clone()
    }

    pub fn control_line_log(&self) -> Vec<(&'static str, bool)> {
        self.shared.state.lock().control_lines.clone()
    }

    pub fn input_clears(&self) -> usize {
        self.shared.state.lock().input_clears
    }

    /// Get the number of bytes available to read.
    pub fn available_bytes(&self) -> usize {
        self.shared.state.lock().read_queue.len()
    }

    fn removed_error() -> PortError {
        PortError::Io(io::Error::new(
            io::ErrorKind::BrokenPipe,
            "device has been removed",
        ))
    }
}

impl SerialPortAdapter for MockSerialPort {
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError> {
        let mut state = self.shared.state.lock();
        if state.removed {
            return Err(Self::removed_error());
        }

        let accepted = state
            .max_write_chunk
            .map_or(data.len(), |limit| limit.min(data.len()));
        let chunk = data[..accepted].to_vec();

        if state.echo {
            state.read_queue.extend(&chunk);
            self.shared.readable.notify_all();
        }
        state.write_log.push(chunk);

        Ok(accepted)
    }

    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, PortError> {
        let mut state = self.shared.state.lock();
        let deadline = Instant::now() + state.timeout;

        loop {
            if state.removed {
                return Err(Self::removed_error());
            }
            if state.pending_read_glitches > 0 {
                state.pending_read_glitches -= 1;
                return Err(PortError::Io(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "simulated framing error",
                )));
            }
            if !state.read_queue.is_empty() {
                break;
            }
            if self
                .shared
                .readable
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                if state.read_queue.is_empty() && !state.removed {
                    return Err(PortError::Io(io::Error::new(
                        io::ErrorKind::TimedOut,
                        "Operation timed out",
                    )));
                }
            }
        }

        let mut bytes_read = 0;
        for byte in buffer.iter_mut() {
            match state.read_queue.pop_front() {
                Some(queued) => {
                    *byte = queued;
                    bytes_read += 1;
                }
                None => break,
            }
        }
        Ok(bytes_read)
    }

    fn flush(&mut self) -> Result<(), PortError> {
        if self.shared.state.lock().removed {
            return Err(Self::removed_error());
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), PortError> {
        self.shared.state.lock().timeout = timeout;
        Ok(())
    }

    fn apply_settings(&mut self, settings: &PortSettings) -> Result<(), PortError> {
        let mut state = self.shared.state.lock();
        if state.removed {
            return Err(Self::removed_error());
        }
        state.timeout = settings.timeout;
        state.applied_settings = Some(settings.clone());
        Ok(())
    }

    fn set_data_terminal_ready(&mut self, level: bool) -> Result<(), PortError> {
        let mut state = self.shared.state.lock();
        if state.removed {
            return Err(Self::removed_error());
        }
        state.control_lines.push(("DTR", level));
        Ok(())
    }

    fn set_request_to_send(&mut self, level: bool) -> Result<(), PortError> {
        let mut state = self.shared.state.lock();
        if state.removed {
            return Err(Self::removed_error());
        }
        state.control_lines.push(("RTS", level));
        Ok(())
    }

    fn clear_input(&mut self) -> Result<(), PortError> {
        let mut state = self.shared.state.lock();
        state.read_queue.clear();
        state.input_clears += 1;
        Ok(())
    }

    fn try_clone_adapter(&self) -> Result<Box<dyn SerialPortAdapter>, PortError> {
        Ok(Box::new(self.clone()))
    }
}

impl std::fmt::Debug for MockSerialPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockSerialPort")
            .field("name", &self.name)
            .field("available_bytes", &self.available_bytes())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enqueue_and_read() {
        let mut port = MockSerialPort::new("MOCK0");
        port.enqueue_read(b"Hello");

        let mut buffer = [0u8; 10];
        let n = port.read_bytes(&mut buffer).unwrap();
        assert_eq!(n, 5);
        assert_eq!(&buffer[..n], b"Hello");
    }

    #[test]
    fn test_write_logging() {
        let mut port = MockSerialPort::new("MOCK0");
        port.write_bytes(b"Test1").unwrap();
        port.write_bytes(b"Test2").unwrap();

        let log = port.get_write_log();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0], b"Test1");
        assert_eq!(log[1], b"Test2");
    }

    #[test]
    fn test_empty_read_times_out() {
        let mut port = MockSerialPort::new("MOCK0");
        port.set_timeout(Duration::from_millis(10)).unwrap();

        let started = Instant::now();
        let mut buffer = [0u8; 10];
        let err = port.read_bytes(&mut buffer).unwrap_err();
        assert!(!err.is_fatal());
        assert!(started.elapsed() >= Duration::from_millis(10));
    }

    #[test]
    fn test_echo_loops_writes_back() {
        let mut port = MockSerialPort::echo("MOCK0");
        port.write_bytes(b"PING").unwrap();

        let mut buffer = [0u8; 8];
        let n = port.read_bytes(&mut buffer).unwrap();
        assert_eq!(&buffer[..n], b"PING");
    }

    #[test]
    fn test_partial_writes() {
        let mut port = MockSerialPort::new("MOCK0");
        port.set_max_write_chunk(Some(3));
        assert_eq!(port.write_bytes(b"Hello").unwrap(), 3);
        assert_eq!(port.written_bytes(), b"Hel");
    }

    #[test]
    fn test_unplug_is_fatal_for_every_operation() {
        let mut port = MockSerialPort::new("MOCK0");
        port.enqueue_read(b"stale");
        port.unplug();

        let mut buffer = [0u8; 10];
        assert!(port.read_bytes(&mut buffer).unwrap_err().is_fatal());
        assert!(port.write_bytes(b"x").unwrap_err().is_fatal());
        assert!(port.set_data_terminal_ready(true).is_err());
    }

    #[test]
    fn test_glitches_are_transient() {
        let mut port = MockSerialPort::new("MOCK0");
        port.inject_read_glitches(1);
        port.enqueue_read(b"ok");

        let mut buffer = [0u8; 10];
        assert!(!port.read_bytes(&mut buffer).unwrap_err().is_fatal());
        assert_eq!(port.read_bytes(&mut buffer).unwrap(), 2);
    }

    #[test]
    fn test_clones_share_the_device() {
        let port = MockSerialPort::new("MOCK0");
        let mut clone = port.try_clone_adapter().unwrap();
        clone.write_bytes(b"shared").unwrap();
        assert_eq!(port.written_bytes(), b"shared");
    }

    #[test]
    fn test_clear_input() {
        let mut port = MockSerialPort::new("MOCK0");
        port.enqueue_read(b"Should be cleared");

        port.clear_input().unwrap();
        assert_eq!(port.input_clears(), 1);
        assert_eq!(port.available_bytes(), 0);
    }
}
