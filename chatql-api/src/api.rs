//! The operations offered to clients
//!
//! Session-only operations pass through the [`SessionGate`] first; a caller
//! without a valid access token gets a single `UNAUTHORIZED` error and the
//! operation body never runs.

use crate::auth::{Credentials, LinkDelivery, TokenCodec};
use crate::error::{ApiError, ApiResponse, ServiceResult};
use crate::services::{
    AuthService, AuthenticateInput, CreateMessageInput, MessageService, RefreshTokenInput,
    UserService,
};
use crate::session::SessionGate;
use crate::views::{ChannelView, MessageView, UserView};
use chatql_core::config::AuthConfig;
use chatql_core::messaging::MessageQuery;
use chatql_core::ChatEngine;
use futures::stream::BoxStream;
use std::future::Future;
use std::sync::Arc;

macro_rules! login_required {
    ($gate:expr, $authorization:expr) => {
        match $gate.authorize($authorization) {
            Ok(context) => context,
            Err(error) => return Ok(ApiResponse::failed(vec![error])),
        }
    };
}

#[derive(Clone)]
pub struct ChatApi {
    gate: SessionGate,
    auth: Arc<AuthService>,
    users: UserService,
    messages: MessageService,
}

impl ChatApi {
    pub fn new(engine: ChatEngine, config: &AuthConfig, delivery: Arc<dyn LinkDelivery>) -> Self {
        let codec = Arc::new(TokenCodec::from_config(config));
        let users = UserService::new(engine.users.clone());

        Self {
            gate: SessionGate::new(codec.clone()),
            auth: Arc::new(AuthService::new(
                engine.users.clone(),
                codec,
                delivery,
                config.allowed_origins.clone(),
            )),
            messages: MessageService::new(engine, users.clone()),
            users,
        }
    }

    pub fn health_check(&self) -> ApiResponse<()> {
        ApiResponse::empty()
    }

    pub async fn authenticate_user(&self, email: &str, token_url: &str) -> ServiceResult<String> {
        self.auth
            .authenticate_user(AuthenticateInput {
                email: email.to_string(),
                token_url: token_url.to_string(),
            })
            .await
    }

    pub async fn refresh_token(&self, refresh_token: &str) -> ServiceResult<Credentials> {
        self.auth
            .refresh_token(RefreshTokenInput {
                refresh_token: refresh_token.to_string(),
            })
            .await
    }

    pub async fn get_users(&self, authorization: Option<&str>) -> ServiceResult<Vec<UserView>> {
        let _context = login_required!(self.gate, authorization);
        self.users.get_users().await
    }

    pub async fn get_user(
        &self,
        authorization: Option<&str>,
        user_id: &str,
    ) -> ServiceResult<UserView> {
        let _context = login_required!(self.gate, authorization);
        self.users.get_user(user_id).await
    }

    pub async fn get_channels(&self, authorization: Option<&str>) -> ServiceResult<Vec<ChannelView>> {
        let context = login_required!(self.gate, authorization);
        self.messages.get_channels(&context).await
    }

    pub async fn get_messages(
        &self,
        authorization: Option<&str>,
        query: &MessageQuery,
    ) -> ServiceResult<Vec<MessageView>> {
        let context = login_required!(self.gate, authorization);
        self.messages.get_messages(&context, query).await
    }

    pub async fn create_message(
        &self,
        authorization: Option<&str>,
        input: CreateMessageInput,
    ) -> ServiceResult<MessageView> {
        let context = login_required!(self.gate, authorization);
        self.messages.create_message(&context, input).await
    }

    /// Live feed of new messages in the caller's channels
    ///
    /// The feed ends when `session_end` resolves or when it is dropped.
    pub fn subscribe_new_message<F>(
        &self,
        authorization: Option<&str>,
        session_end: F,
    ) -> Result<BoxStream<'static, MessageView>, ApiError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let context = self.gate.authorize(authorization)?;
        Ok(self.messages.subscribe(&context, session_end))
    }
}
