//! Message creation
//!
//! A message takes its sequence from the shared counter. Claiming a value
//! and persisting the message are retried together: a lost counter race and
//! a sequence already taken by a committed message are both conflicts.

use crate::bus::{NotificationBus, Topic};
use crate::channels::{ChannelError, ChannelResolver};
use crate::model::{Channel, ChannelId, CounterKind, Message, User, UserId};
use crate::retry::{retry, RetryError};
use crate::sequencer::Sequencer;
use crate::store::{ChatStore, StoreError};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Attempts at claiming a sequence and persisting a message
pub const MAX_CREATE_MESSAGE_ATTEMPTS: u32 = 10;

/// Where a message goes
#[derive(Debug, Clone)]
pub enum Recipient {
    /// An existing channel
    Channel(Channel),
    /// The channel made of these users plus the sender, created on demand
    Members(Vec<User>),
}

#[derive(Debug, Error)]
pub enum SendError {
    #[error("sender {sender} is not a member of channel {channel}")]
    SenderNotInChannel { sender: UserId, channel: ChannelId },

    #[error("no free sequence number after {attempts} attempts")]
    SequenceExhausted {
        attempts: u32,
        #[source]
        last: StoreError,
    },

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct MessageWriter {
    store: Arc<dyn ChatStore>,
    sequencer: Sequencer,
    resolver: ChannelResolver,
    bus: Arc<NotificationBus>,
}

impl MessageWriter {
    pub fn new(store: Arc<dyn ChatStore>, bus: Arc<NotificationBus>) -> Self {
        Self {
            sequencer: Sequencer::new(store.clone()),
            resolver: ChannelResolver::new(store.clone()),
            store,
            bus,
        }
    }

    /// Resolve the target channel, check the sender belongs to it, then create the message
    pub async fn send(
        &self,
        sender: &User,
        content: &str,
        recipient: Recipient,
    ) -> Result<Message, SendError> {
        let channel = match recipient {
            Recipient::Channel(channel) => channel,
            Recipient::Members(mut members) => {
                members.push(sender.clone());
                self.resolver.get_or_create(members).await?
            }
        };

        if !channel.has_member(&sender.id) {
            return Err(SendError::SenderNotInChannel {
                sender: sender.id,
                channel: channel.id,
            });
        }

        self.create_message(sender, &channel, content).await
    }

    /// Persist a message with a fresh sequence and announce it on the bus
    pub async fn create_message(
        &self,
        sender: &User,
        channel: &Channel,
        content: &str,
    ) -> Result<Message, SendError> {
        let persisted = retry(MAX_CREATE_MESSAGE_ATTEMPTS, StoreError::is_conflict, |attempt| {
            async move {
                let sequence = self.sequencer.claim_next(CounterKind::MessageSequence).await?;
                let message = Message::new(sender.clone(), channel.clone(), content, sequence);
                self.store.insert_message(&message).await?;

                if attempt > 1 {
                    debug!(attempt, sequence, "Message persisted after retry");
                }
                Ok::<_, StoreError>(message)
            }
        })
        .await;

        let message = match persisted {
            Ok(message) => message,
            Err(RetryError::Exhausted { attempts, last }) => {
                warn!(channel_id = %channel.id, attempts, error = %last, "Sequence contention exhausted retries");
                return Err(SendError::SequenceExhausted { attempts, last });
            }
            Err(RetryError::Aborted(err)) => return Err(err.into()),
        };

        info!(
            message_id = %message.id,
            channel_id = %channel.id,
            sequence = message.sequence,
            "Created message"
        );

        let delivered = self.bus.publish(Topic::Messages, message.id);
        debug!(message_id = %message.id, delivered, "Published message event");

        Ok(message)
    }
}
