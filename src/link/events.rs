//! Notifications a link publishes to its subscribers.
//!
//! Events are pushed into `crossbeam-channel` queues, so the I/O thread
//! never waits on a consumer and a consumer never runs on the I/O thread.

use crate::error::LinkErrorCode;
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;

/// Something that happened on a link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// The link finished connecting.
    Connected,
    /// A chunk of raw bytes, in the order the hardware delivered them.
    Bytes(Vec<u8>),
    /// The link is about to close its port.
    AboutToClose,
    /// The link is closed.
    Disconnected,
    /// A classified error with a human-readable message.
    Error { code: LinkErrorCode, message: String },
}

/// Fan-out of events to any number of subscribers.
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<Sender<LinkEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<LinkEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Deliver `event` to every live subscriber, dropping the ones whose
    /// receiver has gone away.
    pub fn publish(&self, event: LinkEvent) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_subscriber_gets_every_event() {
        let bus = EventBus::new();
        let a = bus.subscribe();
        let b = bus.subscribe();

        bus.publish(LinkEvent::Connected);
        bus.publish(LinkEvent::Bytes(b"abc".to_vec()));

        for rx in [a, b] {
            assert_eq!(rx.try_recv().unwrap(), LinkEvent::Connected);
            assert_eq!(rx.try_recv().unwrap(), LinkEvent::Bytes(b"abc".to_vec()));
        }
    }

    #[test]
    fn test_dropped_subscribers_are_pruned() {
        let bus = EventBus::new();
        let keep = bus.subscribe();
        drop(bus.subscribe());

        bus.publish(LinkEvent::Disconnected);
        assert_eq!(bus.subscribers.lock().len(), 1);
        assert_eq!(keep.try_recv().unwrap(), LinkEvent::Disconnected);
    }
}
