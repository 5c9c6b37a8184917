//! In-process message fabric: point-to-point delivery between agents,
//! addressed by agent id.
//!
//! This is the stand-in for the hosting platform's transport. Per-pair
//! ordering follows from each recipient owning a single queue; delivery is
//! asynchronous and a send never blocks the sender.

use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::protocol::Envelope;

/// Routes envelopes to per-agent mailboxes.
#[derive(Debug, Default)]
pub struct Router {
    mailboxes: DashMap<String, mpsc::UnboundedSender<Envelope>>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create (or replace) the mailbox for `id`, returning the receiving
    /// half. Replacing drops any undelivered messages of the previous
    /// registration.
    pub fn register(&self, id: &str) -> mpsc::UnboundedReceiver<Envelope> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.mailboxes.insert(id.to_string(), tx);
        rx
    }

    /// Remove the mailbox for `id`.
    pub fn unregister(&self, id: &str) {
        self.mailboxes.remove(id);
    }

    /// Deliver an envelope to its recipient's mailbox. A missing or closed
    /// mailbox is logged and the envelope dropped; senders never fail.
    pub fn send(&self, envelope: Envelope) {
        match self.mailboxes.get(&envelope.to) {
            Some(tx) => {
                if tx.send(envelope.clone()).is_err() {
                    log::warn!(
                        "mailbox for {} is closed, dropping {} from {}",
                        envelope.to,
                        envelope.message,
                        envelope.from
                    );
                }
            }
            None => {
                log::warn!(
                    "no mailbox for {}, dropping {} from {}",
                    envelope.to,
                    envelope.message,
                    envelope.from
                );
            }
        }
    }

    /// Ids with a registered mailbox.
    pub fn registered(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.mailboxes.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Message;

    #[test]
    fn test_delivery_preserves_sender_order() {
        let router = Router::new();
        let mut rx = router.register("Robot1");
        for clock in 1..=3 {
            router.send(Envelope {
                from: "Robot2".into(),
                to: "Robot1".into(),
                message: Message::Grant { clock },
            });
        }
        for clock in 1..=3 {
            let env = rx.try_recv().unwrap();
            assert_eq!(env.message, Message::Grant { clock });
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_send_to_unknown_recipient_is_dropped() {
        let router = Router::new();
        // Must not panic or block.
        router.send(Envelope {
            from: "Robot1".into(),
            to: "Ghost".into(),
            message: Message::Grant { clock: 1 },
        });
        assert!(router.registered().is_empty());
    }
}
