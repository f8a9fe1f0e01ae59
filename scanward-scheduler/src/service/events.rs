//! Domain event bus
//!
//! Publishing never blocks and never fails: without subscribers the message
//! is dropped, slow subscribers miss the oldest messages.

use chrono::Utc;
use scanward_core::domain::event::{DomainMessage, EventPayload, MessageId};
use scanward_core::sequence::SequenceGenerator;
use tokio::sync::broadcast;
use tracing::debug;

const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug)]
pub struct EventBus {
    sender: broadcast::Sender<DomainMessage>,
    sequence: SequenceGenerator,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            sequence: SequenceGenerator::new(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainMessage> {
        self.sender.subscribe()
    }

    /// Publishes a message and returns its sequence number
    pub fn publish(&self, message_id: MessageId, payload: EventPayload) -> u64 {
        let message = DomainMessage {
            message_id,
            sequence: self.sequence.next_value(),
            occurred_at: Utc::now(),
            payload,
        };
        let sequence = message.sequence;

        if self.sender.send(message).is_err() {
            debug!(?message_id, sequence, "No subscriber for domain message");
        }

        sequence
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
