//! Shared fixtures for the API integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chatql_api::auth::{Claims, LinkDelivery, TokenCodec, TokenKind};
use chatql_api::ChatApi;
use chatql_core::bus::NotificationBus;
use chatql_core::config::AuthConfig;
use chatql_core::model::{User, UserId};
use chatql_core::store::SqlChatStore;
use chatql_core::ChatEngine;
use std::sync::{Arc, Mutex};

pub const ORIGIN: &str = "http://localhost:3000";

/// Keeps every delivered link instead of sending it
#[derive(Default)]
pub struct RecordingDelivery {
    pub links: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl LinkDelivery for RecordingDelivery {
    async fn deliver(&self, user: &User, link: &str) -> anyhow::Result<()> {
        self.links
            .lock()
            .unwrap()
            .push((user.email.clone(), link.to_string()));
        Ok(())
    }
}

pub struct Harness {
    pub api: ChatApi,
    pub engine: ChatEngine,
    pub delivery: Arc<RecordingDelivery>,
    pub codec: TokenCodec,
}

pub struct Session {
    pub user_id: UserId,
    pub access_token: String,
    pub refresh_token: String,
    bearer: String,
}

impl Session {
    /// `Authorization` header value for this session
    pub fn auth(&self) -> Option<&str> {
        Some(self.bearer.as_str())
    }
}

pub fn auth_config() -> AuthConfig {
    AuthConfig {
        secret_key: "integration-secret".to_string(),
        allowed_origins: vec![ORIGIN.to_string()],
        ..AuthConfig::default()
    }
}

pub fn harness() -> Harness {
    let store = SqlChatStore::memory().expect("memory store");
    let engine = ChatEngine::new(Arc::new(store), Arc::new(NotificationBus::new()));
    let delivery = Arc::new(RecordingDelivery::default());
    let config = auth_config();

    Harness {
        api: ChatApi::new(engine.clone(), &config, delivery.clone()),
        engine,
        delivery,
        codec: TokenCodec::from_config(&config),
    }
}

/// Pull a query parameter out of a delivered link
pub fn link_param(link: &str, name: &str) -> Option<String> {
    let (_, query) = link.split_once('?')?;
    query.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key == name).then(|| value.to_string())
    })
}

impl Harness {
    /// Authenticate `email` and return the credentials from its sign-in link
    pub async fn sign_in(&self, email: &str) -> Session {
        let response = self
            .api
            .authenticate_user(email, &format!("{}/auth", ORIGIN))
            .await
            .unwrap();
        assert!(response.success(), "sign-in failed: {:?}", response.errors);

        let (_, link) = self.delivery.links.lock().unwrap().last().cloned().unwrap();
        let access_token = link_param(&link, "accessToken").unwrap();
        let refresh_token = link_param(&link, "refreshToken").unwrap();
        let user_id = self
            .codec
            .verify(&access_token, TokenKind::AccessToken)
            .unwrap();

        Session {
            user_id,
            bearer: format!("Bearer {}", access_token),
            access_token,
            refresh_token,
        }
    }

    /// A correctly signed token of `kind` that expired an hour ago
    pub fn expired_token(&self, user_id: &UserId, kind: TokenKind) -> String {
        self.codec
            .encode(&Claims {
                user_id: user_id.to_string(),
                exp: (chrono::Utc::now().timestamp() - 3600) as u64,
                kind,
            })
            .unwrap()
    }
}
