use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum InvalidationKind {
    Manifest,
    Health,
    ModuleContext,
}

/// A `service-registry:invalidate` pub/sub message (spec §4.F "Invalidation
/// bus").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvalidationMessage {
    pub kind: InvalidationKind,
    pub reason: String,
    pub slug: Option<String>,
    pub module_id: Option<String>,
}

/// In-process stand-in for the `service-registry:invalidate` channel
/// (`tokio::sync::broadcast` takes the place of the cross-process pub/sub
/// client, spec §4.F: "local publishers and subscribers both receive them").
/// Remote subscribers are an out-of-scope collaborator (spec §1), so this
/// bus is the complete implementation for this core.
pub struct InvalidationBus {
    sender: broadcast::Sender<InvalidationMessage>,
}

impl InvalidationBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<InvalidationMessage> {
        self.sender.subscribe()
    }

    /// Publishing with no subscribers is not an error (spec §4.F "Inline
    /// mode skips the broadcast" — here, no subscribers is the degenerate
    /// equivalent).
    pub fn publish(&self, message: InvalidationMessage) {
        let _ = self.sender.send(message);
    }
}

impl Default for InvalidationBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_published_messages() {
        let bus = InvalidationBus::new(16);
        let mut rx = bus.subscribe();
        bus.publish(InvalidationMessage {
            kind: InvalidationKind::Manifest,
            reason: "test".to_string(),
            slug: Some("foo".to_string()),
            module_id: None,
        });
        let received = rx.recv().await.unwrap();
        assert_eq!(received.kind, InvalidationKind::Manifest);
        assert_eq!(received.slug.as_deref(), Some("foo"));
    }

    #[test]
    fn publishing_with_no_subscribers_does_not_panic() {
        let bus = InvalidationBus::new(16);
        bus.publish(InvalidationMessage {
            kind: InvalidationKind::Health,
            reason: "no one is listening".to_string(),
            slug: None,
            module_id: None,
        });
    }
}
