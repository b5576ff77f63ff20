//! Link connection state.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Where a link is in its connect/disconnect cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LinkState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
    Disconnecting = 3,
    Erroring = 4,
}

impl LinkState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Connecting,
            2 => Self::Connected,
            3 => Self::Disconnecting,
            4 => Self::Erroring,
            _ => Self::Disconnected,
        }
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnecting => "disconnecting",
            Self::Erroring => "erroring",
        };
        f.write_str(s)
    }
}

/// Lock-free holder for a [`LinkState`].
///
/// Readers never block; writers that race each other (the I/O thread on a
/// fatal error and a caller on disconnect) settle it through
/// [`transition`](Self::transition).
#[derive(Debug)]
pub struct AtomicLinkState(AtomicU8);

impl AtomicLinkState {
    pub fn new(state: LinkState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub fn load(&self) -> LinkState {
        LinkState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn store(&self, state: LinkState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Move from `from` to `to`. Returns false if the state was not `from`.
    pub fn transition(&self, from: LinkState, to: LinkState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl Default for AtomicLinkState {
    fn default() -> Self {
        Self::new(LinkState::Disconnected)
    }
}
