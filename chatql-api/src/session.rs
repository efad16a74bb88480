//! Login gate in front of session-only operations

use crate::auth::{TokenCodec, TokenError, TokenKind};
use crate::error::{ApiError, ErrorCode};
use chatql_core::model::UserId;
use std::sync::Arc;
use tracing::debug;

pub const AUTHORIZATION_HEADER: &str = "Authorization";

/// Identity of the caller, resolved before an operation body runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallContext {
    pub user_id: UserId,
}

#[derive(Clone)]
pub struct SessionGate {
    codec: Arc<TokenCodec>,
}

impl SessionGate {
    pub fn new(codec: Arc<TokenCodec>) -> Self {
        Self { codec }
    }

    /// Resolve an `Authorization` header value to the user it authenticates
    pub fn validate(&self, header: &str) -> Result<UserId, TokenError> {
        let token = header.strip_prefix("Bearer ").ok_or(TokenError::NotBearer)?;
        self.codec.verify(token.trim(), TokenKind::AccessToken)
    }

    /// Any failure collapses into one `UNAUTHORIZED` error naming the header
    pub fn authorize(&self, header: Option<&str>) -> Result<CallContext, ApiError> {
        match self.validate(header.unwrap_or_default()) {
            Ok(user_id) => Ok(CallContext { user_id }),
            Err(err) => {
                debug!(error = %err, "Rejected session credential");
                Err(ApiError::new(ErrorCode::Unauthorized, "Login required")
                    .with_detail(err.title())
                    .at_header(AUTHORIZATION_HEADER))
            }
        }
    }
}
