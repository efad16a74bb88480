//! Response envelope and error types
//!
//! Every operation answers with an [`ApiResponse`]: optional `data`, a list
//! of [`ApiError`]s, and a `success` flag derived from the absence of
//! errors. Error objects follow the JSON:API error shape. Failures that are
//! not the caller's fault travel outside the envelope as [`ServiceError`].

use chatql_core::channels::ChannelError;
use chatql_core::messaging::SendError;
use chatql_core::store::StoreError;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;
use uuid::Uuid;

/// Machine-readable error kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ChannelNotFound,
    ExpiredToken,
    FieldRequired,
    IncorrectTokenType,
    InvalidEmailAddress,
    InvalidToken,
    InvalidUrl,
    MessageSenderNotInChannel,
    Unauthorized,
    UrlNotSupported,
    UserNotFound,
}

/// Where in the request an error originated
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorSource {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pointer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameter: Option<String>,
}

impl ApiErrorSource {
    pub fn pointer(pointer: impl Into<String>) -> Self {
        Self {
            pointer: Some(pointer.into()),
            ..Default::default()
        }
    }

    pub fn header(header: impl Into<String>) -> Self {
        Self {
            header: Some(header.into()),
            ..Default::default()
        }
    }
}

/// One error object
///
/// `id` is fresh per instance so a client report can be matched to a log line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub id: Uuid,
    pub code: ErrorCode,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<ApiErrorSource>,
}

impl ApiError {
    pub fn new(code: ErrorCode, title: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            code,
            title: title.into(),
            detail: None,
            source: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_source(mut self, source: ApiErrorSource) -> Self {
        self.source = Some(source);
        self
    }

    /// Point at a field of the request body, e.g. `/content`
    pub fn at_pointer(self, pointer: &str) -> Self {
        self.with_source(ApiErrorSource::pointer(pointer))
    }

    /// Blame a request header, e.g. `Authorization`
    pub fn at_header(self, header: &str) -> Self {
        self.with_source(ApiErrorSource::header(header))
    }
}

/// Result envelope of every operation
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse<T> {
    pub data: Option<T>,
    pub errors: Vec<ApiError>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            data: Some(data),
            errors: Vec::new(),
        }
    }

    /// Successful response without data
    pub fn empty() -> Self {
        Self {
            data: None,
            errors: Vec::new(),
        }
    }

    pub fn failed(errors: Vec<ApiError>) -> Self {
        Self { data: None, errors }
    }

    pub fn success(&self) -> bool {
        self.errors.is_empty()
    }

    /// Error codes in order, mostly useful in assertions
    pub fn codes(&self) -> Vec<ErrorCode> {
        self.errors.iter().map(|e| e.code).collect()
    }
}

impl<T: Serialize> Serialize for ApiResponse<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ApiResponse", 3)?;
        state.serialize_field("success", &self.success())?;
        state.serialize_field("data", &self.data)?;
        let errors = if self.errors.is_empty() {
            None
        } else {
            Some(&self.errors)
        };
        state.serialize_field("errors", &errors)?;
        state.end()
    }
}

/// Systemic failure, reported outside the envelope
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("storage failure: {0}")]
    Store(#[from] StoreError),

    #[error("channel resolution failed: {0}")]
    Channel(#[from] ChannelError),

    #[error("message creation failed: {0}")]
    Send(#[from] SendError),

    #[error("token signing failed: {0}")]
    TokenSigning(#[from] jsonwebtoken::errors::Error),

    #[error("link delivery failed: {0}")]
    Delivery(anyhow::Error),
}

pub type ServiceResult<T> = Result<ApiResponse<T>, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_codes_serialize_screaming_snake() {
        assert_eq!(
            serde_json::to_value(ErrorCode::MessageSenderNotInChannel).unwrap(),
            json!("MESSAGE_SENDER_NOT_IN_CHANNEL")
        );
        assert_eq!(serde_json::to_value(ErrorCode::InvalidUrl).unwrap(), json!("INVALID_URL"));
    }

    #[test]
    fn test_success_derived_from_errors() {
        let ok = ApiResponse::ok(5);
        assert!(ok.success());

        let failed: ApiResponse<i32> =
            ApiResponse::failed(vec![ApiError::new(ErrorCode::UserNotFound, "User not found")]);
        assert!(!failed.success());
        assert!(ApiResponse::<()>::empty().success());
    }

    #[test]
    fn test_envelope_json_shape() {
        let body = serde_json::to_value(ApiResponse::ok("hi")).unwrap();
        assert_eq!(body, json!({ "success": true, "data": "hi", "errors": null }));

        let error = ApiError::new(ErrorCode::FieldRequired, "Message content required")
            .at_pointer("/content");
        let id = error.id;
        let body = serde_json::to_value(ApiResponse::<()>::failed(vec![error])).unwrap();
        assert_eq!(
            body,
            json!({
                "success": false,
                "data": null,
                "errors": [{
                    "id": id,
                    "code": "FIELD_REQUIRED",
                    "title": "Message content required",
                    "source": { "pointer": "/content" }
                }]
            })
        );
    }

    #[test]
    fn test_error_ids_are_unique() {
        let a = ApiError::new(ErrorCode::InvalidToken, "Invalid token");
        let b = ApiError::new(ErrorCode::InvalidToken, "Invalid token");
        assert_ne!(a.id, b.id);
    }
}
