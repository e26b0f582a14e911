use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use quorum_models::BusMessage;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// In-process topic-addressed publish/subscribe.
///
/// Each subscription owns an unbounded FIFO queue created at subscribe time,
/// so every subscriber sees every message published after it subscribed.
/// Topics are created lazily and never removed.
pub struct MessageBus<M = BusMessage> {
    topics: RwLock<HashMap<String, Vec<UnboundedSender<M>>>>,
}

impl<M: Clone + Send + 'static> MessageBus<M> {
    pub fn new() -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
        }
    }

    /// Fan a message out to every current subscriber of `topic`.
    /// Never blocks; returns the number of subscribers reached.
    pub fn publish(&self, topic: &str, message: M) -> usize {
        let (delivered, closed, known) = {
            let topics = self.topics.read().unwrap_or_else(PoisonError::into_inner);
            match topics.get(topic) {
                Some(subscribers) => {
                    let mut delivered = 0;
                    let mut closed = 0;
                    for tx in subscribers {
                        if tx.send(message.clone()).is_ok() {
                            delivered += 1;
                        } else {
                            closed += 1;
                        }
                    }
                    (delivered, closed, true)
                }
                None => (0, 0, false),
            }
        };

        if !known {
            self.ensure_topic(topic);
        }

        if closed > 0 {
            let mut topics = self.topics.write().unwrap_or_else(PoisonError::into_inner);
            if let Some(subscribers) = topics.get_mut(topic) {
                subscribers.retain(|tx| !tx.is_closed());
            }
        }

        tracing::trace!(topic, delivered, "Published");
        delivered
    }

    /// Register a new subscription. Messages published before this call are
    /// not redelivered.
    pub fn subscribe(&self, topic: &str) -> Subscription<M> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut topics = self.topics.write().unwrap_or_else(PoisonError::into_inner);
        topics.entry(topic.to_string()).or_default().push(tx);
        Subscription {
            topic: topic.to_string(),
            rx,
        }
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        let topics = self.topics.read().unwrap_or_else(PoisonError::into_inner);
        topics
            .get(topic)
            .map(|subs| subs.iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }

    pub fn has_topic(&self, topic: &str) -> bool {
        let topics = self.topics.read().unwrap_or_else(PoisonError::into_inner);
        topics.contains_key(topic)
    }

    fn ensure_topic(&self, topic: &str) {
        let mut topics = self.topics.write().unwrap_or_else(PoisonError::into_inner);
        topics.entry(topic.to_string()).or_default();
    }
}

impl<M: Clone + Send + 'static> Default for MessageBus<M> {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving end of one subscription.
pub struct Subscription<M = BusMessage> {
    topic: String,
    rx: UnboundedReceiver<M>,
}

impl<M> Subscription<M> {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Wait up to `timeout` for the next message. `None` on timeout.
    pub async fn receive(&mut self, timeout: Duration) -> Option<M> {
        tokio::time::timeout(timeout, self.rx.recv())
            .await
            .ok()
            .flatten()
    }

    /// Next message if one is already queued.
    pub fn try_receive(&mut self) -> Option<M> {
        self.rx.try_recv().ok()
    }
}
