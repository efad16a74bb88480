//! JSON over HTTP, with the live feed as Server-Sent Events
//!
//! Every route answers with the response envelope. Caller errors travel
//! inside it with status 200; systemic failures become a 500.

use crate::api::ChatApi;
use crate::auth::Credentials;
use crate::error::{ApiResponse, ServiceError};
use crate::services::{AuthenticateInput, CreateMessageInput, RefreshTokenInput};
use crate::views::{ChannelView, MessageView, UserView};
use axum::{
    extract::{Path, Query, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use chatql_core::messaging::{MessageQuery, MAX_PAGE_SIZE};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::error;

/// Shared handler state
pub struct AppState {
    pub api: ChatApi,
    shutdown: watch::Sender<bool>,
}

impl AppState {
    pub fn new(api: ChatApi) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self { api, shutdown }
    }

    /// End every open live feed
    pub fn begin_shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    fn shutdown_signal(&self) -> impl std::future::Future<Output = ()> + Send + 'static {
        let mut stopped = self.shutdown.subscribe();
        async move {
            while !*stopped.borrow_and_update() {
                if stopped.changed().await.is_err() {
                    break;
                }
            }
        }
    }
}

pub struct HttpError(ServiceError);

impl From<ServiceError> for HttpError {
    fn from(err: ServiceError) -> Self {
        HttpError(err)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        error!(error = %self.0, "Request failed");
        let body = ErrorBody {
            error: self.0.to_string(),
        };
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}

type HttpResult<T> = Result<Json<ApiResponse<T>>, HttpError>;

/// Query string of `GET /messages`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagesParams {
    pub limit: Option<i64>,
    pub channel_id: Option<String>,
    pub sender_id: Option<String>,
    pub content: Option<String>,
    pub before_sequence: Option<i64>,
}

impl From<MessagesParams> for MessageQuery {
    fn from(params: MessagesParams) -> Self {
        MessageQuery {
            limit: params.limit.unwrap_or(MAX_PAGE_SIZE),
            channel_id: params.channel_id,
            sender_id: params.sender_id,
            content: params.content,
            before_sequence: params.before_sequence,
        }
    }
}

/// Build the router with all endpoints
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/auth/authenticate", post(authenticate_user))
        .route("/auth/refresh", post(refresh_token))
        .route("/users", get(get_users))
        .route("/users/:id", get(get_user))
        .route("/channels", get(get_channels))
        .route("/messages", get(get_messages).post(create_message))
        .route("/messages/subscribe", get(subscribe_new_message))
        .with_state(state)
}

fn authorization(headers: &HeaderMap) -> Option<&str> {
    headers.get(AUTHORIZATION).and_then(|value| value.to_str().ok())
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<ApiResponse<()>> {
    Json(state.api.health_check())
}

async fn authenticate_user(
    State(state): State<Arc<AppState>>,
    Json(input): Json<AuthenticateInput>,
) -> HttpResult<String> {
    Ok(Json(
        state.api.authenticate_user(&input.email, &input.token_url).await?,
    ))
}

async fn refresh_token(
    State(state): State<Arc<AppState>>,
    Json(input): Json<RefreshTokenInput>,
) -> HttpResult<Credentials> {
    Ok(Json(state.api.refresh_token(&input.refresh_token).await?))
}

async fn get_users(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> HttpResult<Vec<UserView>> {
    Ok(Json(state.api.get_users(authorization(&headers)).await?))
}

async fn get_user(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> HttpResult<UserView> {
    Ok(Json(state.api.get_user(authorization(&headers), &user_id).await?))
}

async fn get_channels(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> HttpResult<Vec<ChannelView>> {
    Ok(Json(state.api.get_channels(authorization(&headers)).await?))
}

async fn get_messages(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<MessagesParams>,
) -> HttpResult<Vec<MessageView>> {
    let query = MessageQuery::from(params);
    Ok(Json(
        state.api.get_messages(authorization(&headers), &query).await?,
    ))
}

async fn create_message(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(input): Json<CreateMessageInput>,
) -> HttpResult<MessageView> {
    Ok(Json(
        state.api.create_message(authorization(&headers), input).await?,
    ))
}

/// GET /messages/subscribe: one `newMessage` event per visible message
async fn subscribe_new_message(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Response {
    let feed = match state
        .api
        .subscribe_new_message(authorization(&headers), state.shutdown_signal())
    {
        Ok(feed) => feed,
        Err(error) => return Json(ApiResponse::<()>::failed(vec![error])).into_response(),
    };

    let events = feed.map(|message| Event::default().event("newMessage").json_data(message));
    Sse::new(events)
        .keep_alive(KeepAlive::default())
        .into_response()
}
