use crate::auth::{Credentials, LinkDelivery, TokenCodec, TokenKind};
use crate::error::{ApiError, ApiResponse, ErrorCode, ServiceError, ServiceResult};
use crate::validation::{is_allowed_origin, is_valid_email, is_valid_url};
use chatql_core::users::UserDirectory;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

pub const AUTHENTICATION_SENT: &str = "Authentication email sent successfully";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticateInput {
    pub email: String,
    /// Where the client wants the sign-in link to point
    pub token_url: String,
}

impl AuthenticateInput {
    pub fn validate(&self, allowed_origins: &[String]) -> Vec<ApiError> {
        let mut errors = Vec::new();

        if !is_valid_email(&self.email) {
            errors.push(
                ApiError::new(ErrorCode::InvalidEmailAddress, "Invalid email address")
                    .at_pointer("/email"),
            );
        }

        let allowed = is_allowed_origin(&self.token_url, allowed_origins);
        if !allowed && !is_valid_url(&self.token_url) {
            errors.push(ApiError::new(ErrorCode::InvalidUrl, "Invalid URL").at_pointer("/tokenUrl"));
        } else if !allowed {
            errors.push(
                ApiError::new(ErrorCode::UrlNotSupported, "URL not supported by API")
                    .at_pointer("/tokenUrl"),
            );
        }

        errors
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenInput {
    pub refresh_token: String,
}

pub struct AuthService {
    users: UserDirectory,
    codec: Arc<TokenCodec>,
    delivery: Arc<dyn LinkDelivery>,
    allowed_origins: Vec<String>,
}

impl AuthService {
    pub fn new(
        users: UserDirectory,
        codec: Arc<TokenCodec>,
        delivery: Arc<dyn LinkDelivery>,
        allowed_origins: Vec<String>,
    ) -> Self {
        Self {
            users,
            codec,
            delivery,
            allowed_origins,
        }
    }

    /// Register the e-mail on first contact and send it a link carrying fresh credentials
    pub async fn authenticate_user(&self, input: AuthenticateInput) -> ServiceResult<String> {
        let errors = input.validate(&self.allowed_origins);
        if !errors.is_empty() {
            return Ok(ApiResponse::failed(errors));
        }

        let user = self.users.get_or_create(&input.email).await?;
        let credentials = self.codec.issue_pair(&user.id)?;
        let link = format!(
            "{}?accessToken={}&refreshToken={}",
            input.token_url, credentials.access_token, credentials.refresh_token
        );

        self.delivery
            .deliver(&user, &link)
            .await
            .map_err(ServiceError::Delivery)?;

        info!(user_id = %user.id, "Authentication link sent");
        Ok(ApiResponse::ok(AUTHENTICATION_SENT.to_string()))
    }

    /// Trade a refresh token for a new pair
    pub async fn refresh_token(&self, input: RefreshTokenInput) -> ServiceResult<Credentials> {
        let user_id = match self.codec.verify(&input.refresh_token, TokenKind::RefreshToken) {
            Ok(user_id) => user_id,
            Err(err) => {
                return Ok(ApiResponse::failed(vec![
                    err.to_api_error().at_pointer("/refreshToken")
                ]))
            }
        };

        Ok(ApiResponse::ok(self.codec.issue_pair(&user_id)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(email: &str, url: &str) -> AuthenticateInput {
        AuthenticateInput {
            email: email.into(),
            token_url: url.into(),
        }
    }

    fn codes(errors: &[ApiError]) -> Vec<ErrorCode> {
        errors.iter().map(|e| e.code).collect()
    }

    #[test]
    fn test_validation_collects_every_error() {
        let origins = vec!["http://localhost:3000".to_string()];

        assert!(input("a@example.com", "http://localhost:3000/cb").validate(&origins).is_empty());
        assert_eq!(
            codes(&input("nope", "not a url").validate(&origins)),
            vec![ErrorCode::InvalidEmailAddress, ErrorCode::InvalidUrl]
        );
        assert_eq!(
            codes(&input("a@example.com", "https://elsewhere.example.com").validate(&origins)),
            vec![ErrorCode::UrlNotSupported]
        );
        assert_eq!(
            codes(&input("a@example.com", "http://[::1]:8080/cb").validate(&origins)),
            vec![ErrorCode::UrlNotSupported]
        );
    }

    #[test]
    fn test_validation_pointers() {
        let errors = input("bad", "https://elsewhere.example.com").validate(&[]);
        let pointers: Vec<_> = errors
            .iter()
            .map(|e| e.source.as_ref().and_then(|s| s.pointer.clone()).unwrap())
            .collect();
        assert_eq!(pointers, vec!["/email", "/tokenUrl"]);
    }
}
