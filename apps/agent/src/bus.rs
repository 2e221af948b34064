//! Typed message channel between foreground pages and the agent.

use tokio::sync::{broadcast, mpsc};

use fieldops_core::push::{PushPayload, PushPreferenceSnapshot};

/// Messages a foreground page sends to the agent.
#[derive(Debug, Clone, PartialEq)]
pub enum PageMessage {
    /// Apply the new background-context version now: drop stale caches.
    ForceActivateUpdate,
    /// Wholesale replacement of the cached notification preferences.
    PushPreferencesUpdate(PushPreferenceSnapshot),
}

/// Messages the agent broadcasts to every open page.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentMessage {
    PushReceived(PushPayload),
    PushNavigate(String),
}

/// Both directions of the page<->agent protocol.
#[derive(Clone)]
pub struct AgentBus {
    agent_tx: broadcast::Sender<AgentMessage>,
    page_tx: mpsc::UnboundedSender<PageMessage>,
}

impl AgentBus {
    /// Returns the bus plus the agent-side receiver for page messages.
    pub fn new(capacity: usize) -> (Self, mpsc::UnboundedReceiver<PageMessage>) {
        let (agent_tx, _) = broadcast::channel(capacity);
        let (page_tx, page_rx) = mpsc::unbounded_channel();
        (Self { agent_tx, page_tx }, page_rx)
    }

    /// A page attaching to the agent.
    pub fn subscribe(&self) -> broadcast::Receiver<AgentMessage> {
        self.agent_tx.subscribe()
    }

    /// Broadcast to every open page; returns how many pages received it.
    /// Zero open pages is not an error.
    pub fn publish(&self, message: AgentMessage) -> usize {
        self.agent_tx.send(message).unwrap_or(0)
    }

    /// Page-side sender for the agent inbox.
    pub fn page_sender(&self) -> mpsc::UnboundedSender<PageMessage> {
        self.page_tx.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn broadcast_reaches_every_open_page() {
        let (bus, _page_rx) = AgentBus::new(8);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        let payload = PushPayload::normalize(&json!({ "eventType": "new_message" }));
        let delivered = bus.publish(AgentMessage::PushReceived(payload.clone()));

        assert_eq!(delivered, 2);
        assert_eq!(first.recv().await.expect("recv"), AgentMessage::PushReceived(payload.clone()));
        assert_eq!(second.recv().await.expect("recv"), AgentMessage::PushReceived(payload));
    }

    #[tokio::test]
    async fn publish_without_pages_is_not_an_error() {
        let (bus, _page_rx) = AgentBus::new(8);
        assert_eq!(bus.publish(AgentMessage::PushNavigate("/quotes/1".into())), 0);
    }

    #[tokio::test]
    async fn page_messages_arrive_typed() {
        let (bus, mut page_rx) = AgentBus::new(8);
        let sender = bus.page_sender();
        sender.send(PageMessage::ForceActivateUpdate).expect("send");

        assert_eq!(page_rx.recv().await, Some(PageMessage::ForceActivateUpdate));
    }
}
