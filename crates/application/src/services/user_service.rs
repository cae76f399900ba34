use std::sync::Arc;

use domain::{DomainError, User, UserDraft, UserId, UserRole, Username};

use crate::{clock::Clock, error::ApplicationError, repository::UserRepository};

#[derive(Debug, Clone)]
pub struct RegisterUserRequest {
    pub username: String,
    pub role: UserRole,
}

pub struct UserServiceDependencies {
    pub user_repository: Arc<dyn UserRepository>,
    pub clock: Arc<dyn Clock>,
}

pub struct UserService {
    deps: UserServiceDependencies,
}

impl UserService {
    pub fn new(deps: UserServiceDependencies) -> Self {
        Self { deps }
    }

    /// 注册匿名昵称。昵称全平台唯一，角色注册后不可更改。
    pub async fn register(&self, request: RegisterUserRequest) -> Result<User, ApplicationError> {
        let username = Username::parse(request.username)?;

        if self
            .deps
            .user_repository
            .find_by_username(username.as_str())
            .await?
            .is_some()
        {
            return Err(DomainError::UsernameTaken.into());
        }

        let now = self.deps.clock.now();
        let stored = self
            .deps
            .user_repository
            .create(UserDraft::new(username, request.role, now))
            .await?;

        tracing::info!(user_id = %stored.id, role = ?stored.role, "用户已注册");
        Ok(stored)
    }

    /// 按 ID 查用户。WebSocket 认证用这个区分"不存在"与故障。
    pub async fn get_user(&self, user_id: UserId) -> Result<Option<User>, ApplicationError> {
        let user = self.deps.user_repository.find_by_id(user_id).await?;
        Ok(user)
    }
}
