pub mod auth_service;
pub mod message_service;
pub mod user_service;

pub use auth_service::{AuthService, AuthenticateInput, RefreshTokenInput, AUTHENTICATION_SENT};
pub use message_service::{CreateMessageInput, MessageService};
pub use user_service::UserService;
