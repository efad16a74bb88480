//! Signed credentials and out-of-band link delivery
//!
//! Credentials are HS256 JWTs carrying `{userId, exp, type}`. Access tokens
//! open a session, refresh tokens only buy a new pair.

use crate::error::{ApiError, ErrorCode};
use async_trait::async_trait;
use chatql_core::config::AuthConfig;
use chatql_core::model::{User, UserId};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// What a token may be used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenKind {
    AccessToken,
    RefreshToken,
}

/// JWT claims
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(rename = "userId")]
    pub user_id: String,
    /// Expiry, seconds since the Unix epoch
    pub exp: u64,
    #[serde(rename = "type")]
    pub kind: TokenKind,
}

/// An access/refresh pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("authorization header is not a bearer credential")]
    NotBearer,

    #[error("token is malformed or its signature does not verify")]
    Invalid,

    #[error("token has expired")]
    Expired,

    #[error("expected {expected:?}, got {found:?}")]
    IncorrectKind { expected: TokenKind, found: TokenKind },
}

impl TokenError {
    pub fn code(&self) -> ErrorCode {
        match self {
            TokenError::NotBearer | TokenError::Invalid => ErrorCode::InvalidToken,
            TokenError::Expired => ErrorCode::ExpiredToken,
            TokenError::IncorrectKind { .. } => ErrorCode::IncorrectTokenType,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            TokenError::NotBearer => "Invalid authentication header",
            TokenError::Invalid => "Invalid token",
            TokenError::Expired => "Expired token",
            TokenError::IncorrectKind { .. } => "Incorrect token type",
        }
    }

    pub fn to_api_error(&self) -> ApiError {
        ApiError::new(self.code(), self.title())
    }
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            _ => TokenError::Invalid,
        }
    }
}

/// Issues and verifies credentials with one shared secret
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenCodec {
    pub fn new(secret: &[u8], access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation: Validation::new(Algorithm::HS256),
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(
            config.secret_key.as_bytes(),
            config.access_token_ttl,
            config.refresh_token_ttl,
        )
    }

    fn ttl(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::AccessToken => self.access_ttl,
            TokenKind::RefreshToken => self.refresh_ttl,
        }
    }

    /// Sign arbitrary claims
    pub fn encode(&self, claims: &Claims) -> Result<String, jsonwebtoken::errors::Error> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
    }

    pub fn issue(
        &self,
        user_id: &UserId,
        kind: TokenKind,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let now = chrono::Utc::now().timestamp().max(0) as u64;
        self.encode(&Claims {
            user_id: user_id.to_string(),
            exp: now + self.ttl(kind).as_secs(),
            kind,
        })
    }

    pub fn issue_pair(&self, user_id: &UserId) -> Result<Credentials, jsonwebtoken::errors::Error> {
        Ok(Credentials {
            access_token: self.issue(user_id, TokenKind::AccessToken)?,
            refresh_token: self.issue(user_id, TokenKind::RefreshToken)?,
        })
    }

    /// Check signature and expiry, returning the claims
    pub fn decode(&self, token: &str) -> Result<Claims, TokenError> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation)?;
        Ok(data.claims)
    }

    /// Decode a token of the `expected` kind down to the user it names
    pub fn verify(&self, token: &str, expected: TokenKind) -> Result<UserId, TokenError> {
        let claims = self.decode(token)?;
        if claims.kind != expected {
            return Err(TokenError::IncorrectKind {
                expected,
                found: claims.kind,
            });
        }
        UserId::parse(&claims.user_id).ok_or(TokenError::Invalid)
    }
}

/// Out-of-band channel for the sign-in link
#[async_trait]
pub trait LinkDelivery: Send + Sync {
    async fn deliver(&self, user: &User, link: &str) -> anyhow::Result<()>;
}

/// Writes the sign-in link to the log instead of mailing it
#[derive(Debug, Default)]
pub struct LoggingLinkDelivery;

#[async_trait]
impl LinkDelivery for LoggingLinkDelivery {
    async fn deliver(&self, user: &User, link: &str) -> anyhow::Result<()> {
        info!(user_id = %user.id, email = %user.email, link = %link, "Sign-in link issued");
        Ok(())
    }
}
