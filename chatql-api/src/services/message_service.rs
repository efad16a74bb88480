use super::user_service::UserService;
use crate::error::{ApiError, ApiResponse, ErrorCode, ServiceError, ServiceResult};
use crate::session::CallContext;
use crate::views::{ChannelView, MessageView};
use chatql_core::messaging::{MessageQuery, Recipient, SendError};
use chatql_core::ChatEngine;
use futures::stream::{BoxStream, StreamExt};
use serde::Deserialize;
use std::future::Future;
use tracing::debug;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMessageInput {
    pub content: String,
    pub channel_id: Option<String>,
    pub channel_member_ids: Option<Vec<String>>,
}

impl CreateMessageInput {
    /// Check content and resolve the recipient, collecting every problem
    pub async fn validate(
        &self,
        engine: &ChatEngine,
    ) -> Result<(Vec<ApiError>, Option<Recipient>), ServiceError> {
        let mut errors = Vec::new();

        if self.content.is_empty() {
            errors.push(
                ApiError::new(ErrorCode::FieldRequired, "Message content required")
                    .at_pointer("/content"),
            );
        }

        let recipient = match self.resolve_recipient(engine).await? {
            Ok(recipient) => Some(recipient),
            Err(error) => {
                errors.push(error);
                None
            }
        };

        Ok((errors, recipient))
    }

    async fn resolve_recipient(
        &self,
        engine: &ChatEngine,
    ) -> Result<Result<Recipient, ApiError>, ServiceError> {
        if let Some(channel_id) = self.channel_id.as_deref().filter(|id| !id.is_empty()) {
            return Ok(engine
                .channels
                .find(channel_id)
                .await?
                .map(Recipient::Channel)
                .ok_or_else(|| {
                    ApiError::new(ErrorCode::ChannelNotFound, "Channel not found")
                        .at_pointer("/channelId")
                }));
        }

        let member_ids = self.channel_member_ids.as_deref().unwrap_or_default();
        if member_ids.is_empty() {
            return Ok(Err(ApiError::new(ErrorCode::FieldRequired, "Recipient required")
                .at_pointer("/channelId")));
        }

        let mut members = Vec::with_capacity(member_ids.len());
        for member_id in member_ids {
            match engine.users.find(member_id).await? {
                Some(user) => members.push(user),
                None => {
                    return Ok(Err(ApiError::new(
                        ErrorCode::UserNotFound,
                        "Recipient user not found",
                    )
                    .at_pointer("/channelMemberIds")))
                }
            }
        }

        Ok(Ok(Recipient::Members(members)))
    }
}

#[derive(Clone)]
pub struct MessageService {
    engine: ChatEngine,
    users: UserService,
}

impl MessageService {
    pub fn new(engine: ChatEngine, users: UserService) -> Self {
        Self { engine, users }
    }

    pub async fn get_channels(&self, context: &CallContext) -> ServiceResult<Vec<ChannelView>> {
        let user = match self.users.caller(context).await? {
            Ok(user) => user,
            Err(error) => return Ok(ApiResponse::failed(vec![error])),
        };

        let channels = self.engine.channels.channels_for(&user.id).await?;
        Ok(ApiResponse::ok(channels.iter().map(ChannelView::from).collect()))
    }

    pub async fn get_messages(
        &self,
        context: &CallContext,
        query: &MessageQuery,
    ) -> ServiceResult<Vec<MessageView>> {
        let user = match self.users.caller(context).await? {
            Ok(user) => user,
            Err(error) => return Ok(ApiResponse::failed(vec![error])),
        };

        let messages = self.engine.query.list_messages(&user.id, query).await?;
        Ok(ApiResponse::ok(messages.iter().map(MessageView::from).collect()))
    }

    pub async fn create_message(
        &self,
        context: &CallContext,
        input: CreateMessageInput,
    ) -> ServiceResult<MessageView> {
        let (mut errors, recipient) = input.validate(&self.engine).await?;
        let sender = match self.users.caller(context).await? {
            Ok(user) => Some(user),
            Err(error) => {
                errors.push(error);
                None
            }
        };

        let (sender, recipient) = match (sender, recipient) {
            (Some(sender), Some(recipient)) if errors.is_empty() => (sender, recipient),
            _ => return Ok(ApiResponse::failed(errors)),
        };

        match self.engine.writer.send(&sender, &input.content, recipient).await {
            Ok(message) => Ok(ApiResponse::ok(MessageView::from(&message))),
            Err(SendError::SenderNotInChannel { sender, channel }) => {
                debug!(user_id = %sender, channel_id = %channel, "Sender outside target channel");
                Ok(ApiResponse::failed(vec![ApiError::new(
                    ErrorCode::MessageSenderNotInChannel,
                    "Sender is not part of selected channel",
                )]))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// New messages visible to the caller until `session_end` resolves
    pub fn subscribe<F>(&self, context: &CallContext, session_end: F) -> BoxStream<'static, MessageView>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.engine
            .live_messages(context.user_id, session_end)
            .map(|message| MessageView::from(&message))
            .boxed()
    }
}
