//! Notification fan-out over a broadcast channel
//!
//! Messaging collaborators subscribe and receive every decision event. A
//! slow subscriber that falls more than `channel_capacity` events behind
//! skips ahead; the engine never waits on it.

use crate::Result;
use crate::config::NotifyConfig;
use crate::publish::event::{DecisionEvent, DecisionEventSink};
use tokio::sync::broadcast;

pub struct DecisionNotifier {
    sender: broadcast::Sender<DecisionEvent>,
}

impl DecisionNotifier {
    pub fn new(config: &NotifyConfig) -> Self {
        let (sender, _) = broadcast::channel(config.channel_capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DecisionEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl DecisionEventSink for DecisionNotifier {
    fn name(&self) -> &str {
        "notifier"
    }

    fn accept(&self, event: &DecisionEvent) -> Result<()> {
        // Sending with no subscribers is not a failure
        match self.sender.send(event.clone()) {
            Ok(delivered) => {
                tracing::debug!(
                    "📨 Decision event broadcast: round={}, subscribers={}",
                    event.round_id,
                    delivered
                );
            }
            Err(_) => {
                tracing::debug!("📭 No subscribers for round {}", event.round_id);
            }
        }
        Ok(())
    }
}
