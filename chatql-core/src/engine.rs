//! Wiring of the core components over one store and one bus

use crate::bus::{NotificationBus, Topic};
use crate::channels::ChannelResolver;
use crate::messaging::{authorized_feed, MessageQueryEngine, MessageWriter};
use crate::model::{Message, UserId};
use crate::store::ChatStore;
use crate::users::UserDirectory;
use futures::stream::BoxStream;
use std::future::Future;
use std::sync::Arc;

/// Every core component, sharing one store and one notification bus
#[derive(Clone)]
pub struct ChatEngine {
    pub store: Arc<dyn ChatStore>,
    pub bus: Arc<NotificationBus>,
    pub users: UserDirectory,
    pub channels: ChannelResolver,
    pub writer: Arc<MessageWriter>,
    pub query: MessageQueryEngine,
}

impl ChatEngine {
    pub fn new(store: Arc<dyn ChatStore>, bus: Arc<NotificationBus>) -> Self {
        Self {
            users: UserDirectory::new(store.clone()),
            channels: ChannelResolver::new(store.clone()),
            writer: Arc::new(MessageWriter::new(store.clone(), bus.clone())),
            query: MessageQueryEngine::new(store.clone()),
            store,
            bus,
        }
    }

    /// Live feed of new messages visible to `user_id` until `session_end` resolves
    ///
    /// The bus subscription is taken before this returns, so every message
    /// created afterwards is considered.
    pub fn live_messages<F>(&self, user_id: UserId, session_end: F) -> BoxStream<'static, Message>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let subscription = self.bus.subscribe(Topic::Messages);
        authorized_feed(subscription, self.query.clone(), user_id, session_end)
    }
}
