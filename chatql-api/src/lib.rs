//! ChatQL API
//!
//! The client-facing operations over [`chatql_core`]: sign-in links and
//! token refresh, user and channel listings, message history and creation,
//! and the live message feed. [`http`] maps them onto axum routes.

pub mod api;
pub mod auth;
pub mod error;
pub mod http;
pub mod services;
pub mod session;
pub mod validation;
pub mod views;

pub use api::ChatApi;
pub use error::{ApiError, ApiErrorSource, ApiResponse, ErrorCode, ServiceError};
