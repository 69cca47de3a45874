//! In-process event bus for island lifecycle events.
//!
//! Events are serialised once at publish time and fanned out to every
//! subscriber as raw JSON bytes, so consumers (metrics, audit, a network
//! bridge) decode only what they care about. See [`crate::protocol`] for the
//! subject table.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::protocol::IslandEvent;

#[derive(Debug, Clone)]
pub struct BusMessage {
    pub subject: &'static str,
    pub payload: Bytes,
}

#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<BusMessage>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BusMessage> {
        self.sender.subscribe()
    }

    /// Serialise `payload` in an [`IslandEvent`] envelope and publish it.
    ///
    /// Errors are logged and swallowed. Having no subscribers is normal.
    pub fn publish<T: Serialize>(&self, subject: &'static str, at: DateTime<Utc>, payload: T) {
        let event = IslandEvent::new(at, payload);
        match serde_json::to_vec(&event) {
            Ok(bytes) => {
                let _ = self.sender.send(BusMessage {
                    subject,
                    payload: Bytes::from(bytes),
                });
            }
            Err(e) => log::warn!("Failed to serialise event for {}: {}", subject, e),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{subjects, IslandReset};
    use crate::types::{IslandId, ProfileId};

    #[test]
    fn publish_without_subscribers_is_silent() {
        let bus = EventBus::default();
        bus.publish(
            subjects::ISLAND_RESET,
            Utc::now(),
            IslandReset {
                island_id: IslandId::new(),
                profile_id: ProfileId::new(),
            },
        );
    }

    #[test]
    fn subscriber_receives_envelope() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        let island_id = IslandId::new();
        bus.publish(
            subjects::ISLAND_RESET,
            Utc::now(),
            IslandReset {
                island_id,
                profile_id: ProfileId::new(),
            },
        );

        let msg = rx.try_recv().unwrap();
        assert_eq!(msg.subject, subjects::ISLAND_RESET);
        let decoded: IslandEvent<IslandReset> = serde_json::from_slice(&msg.payload).unwrap();
        assert_eq!(decoded.payload.island_id, island_id);
    }
}
