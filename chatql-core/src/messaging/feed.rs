//! Live message feed for one user
//!
//! Bus events carry only a message id. Each one is re-fetched through the
//! query engine as the subscribing user, so events for channels the user
//! does not belong to never reach them.

use super::query::MessageQueryEngine;
use crate::bus::Subscription;
use crate::model::{Message, UserId};
use futures::stream::{BoxStream, StreamExt};
use std::future::Future;
use tracing::warn;

/// Turn a bus subscription into the messages `user_id` may see
///
/// The stream ends when `session_end` resolves or when it is dropped.
pub fn authorized_feed<F>(
    subscription: Subscription,
    query: MessageQueryEngine,
    user_id: UserId,
    session_end: F,
) -> BoxStream<'static, Message>
where
    F: Future<Output = ()> + Send + 'static,
{
    subscription
        .then(move |message_id| {
            let query = query.clone();
            async move {
                match query.get_message(&message_id, &user_id).await {
                    Ok(message) => message,
                    Err(err) => {
                        warn!(message_id = %message_id, user_id = %user_id, error = %err, "Dropping feed event");
                        None
                    }
                }
            }
        })
        .filter_map(|message| async move { message })
        .take_until(session_end)
        .boxed()
}
