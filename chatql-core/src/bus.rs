//! In-process notification bus
//!
//! Every subscriber owns an unbounded queue, so a slow reader falls behind
//! but never loses an event. There is no persistence: a subscriber only sees
//! events published after it subscribed.

use crate::model::MessageId;
use futures::Stream;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::debug;

/// Named event streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// A message was persisted; the payload is its id
    Messages,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::Messages => "messages",
        }
    }
}

type Subscribers = HashMap<u64, (Topic, mpsc::UnboundedSender<MessageId>)>;

#[derive(Debug, Default)]
struct Registry {
    next_id: AtomicU64,
    subscribers: Mutex<Subscribers>,
}

impl Registry {
    fn lock(&self) -> MutexGuard<'_, Subscribers> {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Fan-out of message events to live subscribers
#[derive(Debug, Default)]
pub struct NotificationBus {
    registry: Arc<Registry>,
}

impl NotificationBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish to every current subscriber of `topic`
    ///
    /// Returns how many subscribers the event reached. Having none is not an
    /// error.
    pub fn publish(&self, topic: Topic, payload: MessageId) -> usize {
        let mut delivered = 0;
        self.registry.lock().retain(|id, (subscribed, sender)| {
            if *subscribed != topic {
                return true;
            }
            if sender.send(payload).is_ok() {
                delivered += 1;
                true
            } else {
                debug!(topic = topic.as_str(), subscriber = id, "Pruning closed subscriber");
                false
            }
        });
        delivered
    }

    /// Subscribe to events published on `topic` from now on
    pub fn subscribe(&self, topic: Topic) -> Subscription {
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry.lock().insert(id, (topic, sender));

        Subscription {
            id,
            registry: Arc::clone(&self.registry),
            inner: UnboundedReceiverStream::new(receiver),
        }
    }

    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.registry
            .lock()
            .values()
            .filter(|(subscribed, _)| *subscribed == topic)
            .count()
    }
}

/// A live stream of payloads for one topic
///
/// Never ends on its own. Dropping the subscription unsubscribes.
pub struct Subscription {
    id: u64,
    registry: Arc<Registry>,
    inner: UnboundedReceiverStream<MessageId>,
}

impl Stream for Subscription {
    type Item = MessageId;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.registry.lock().remove(&self.id);
    }
}
