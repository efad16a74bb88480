use crate::error::{ApiError, ApiResponse, ErrorCode, ServiceError, ServiceResult};
use crate::session::{CallContext, AUTHORIZATION_HEADER};
use crate::views::UserView;
use chatql_core::model::User;
use chatql_core::users::UserDirectory;

#[derive(Clone)]
pub struct UserService {
    users: UserDirectory,
}

impl UserService {
    pub fn new(users: UserDirectory) -> Self {
        Self { users }
    }

    pub async fn get_users(&self) -> ServiceResult<Vec<UserView>> {
        let users = self.users.list().await?;
        Ok(ApiResponse::ok(users.iter().map(UserView::from).collect()))
    }

    pub async fn get_user(&self, user_id: &str) -> ServiceResult<UserView> {
        match self.users.find(user_id).await? {
            Some(user) => Ok(ApiResponse::ok(UserView::from(&user))),
            None => Ok(ApiResponse::failed(vec![user_not_found().at_pointer("/userId")])),
        }
    }

    /// Load the caller named by a verified token
    ///
    /// The token may outlive its user, so absence is a caller error blamed on
    /// the `Authorization` header.
    pub async fn caller(&self, context: &CallContext) -> Result<Result<User, ApiError>, ServiceError> {
        Ok(self
            .users
            .get(&context.user_id)
            .await?
            .ok_or_else(|| user_not_found().at_header(AUTHORIZATION_HEADER)))
    }
}

fn user_not_found() -> ApiError {
    ApiError::new(ErrorCode::UserNotFound, "User not found")
}
