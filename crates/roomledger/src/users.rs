//! User accounts, login, and the legacy token scheme.
//!
//! Passwords are compared in plaintext and tokens are unsigned
//! `username_millis_nonce` strings with a seven-day lifetime. Both are
//! kept for compatibility with the data this system inherited; neither
//! is an endorsement.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Page, PageParams, User, UserId, UserRole, UserStatus};
use crate::error::ServiceError;
use crate::store::Store;

static USER_SEQUENCE: AtomicU64 = AtomicU64::new(1);
static TOKEN_NONCE: AtomicU64 = AtomicU64::new(1);

const TOKEN_LIFETIME_MS: i64 = 7 * 24 * 60 * 60 * 1000;

fn next_user_id() -> UserId {
    let id = USER_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    UserId(format!("user-{id:06}"))
}

#[derive(Debug, Deserialize)]
pub struct LoginParams {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyTokenParams {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordParams {
    pub username: String,
    #[serde(rename = "oldPassword")]
    pub old_password: String,
    #[serde(rename = "newPassword")]
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct UserIdParams {
    #[serde(rename = "userId")]
    pub user_id: UserId,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserParams {
    pub username: String,
    pub password: String,
    pub name: String,
    #[serde(default = "CreateUserParams::default_role")]
    pub role: UserRole,
}

impl CreateUserParams {
    fn default_role() -> UserRole {
        UserRole::User
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserParams {
    #[serde(rename = "userId")]
    pub user_id: UserId,
    pub name: Option<String>,
    pub role: Option<UserRole>,
    pub status: Option<UserStatus>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UserQuery {
    pub role: Option<UserRole>,
    pub status: Option<UserStatus>,
    #[serde(flatten)]
    pub page: PageParams,
}

/// User row without the password field. Everything the handlers return
/// goes through this.
#[derive(Debug, Clone, Serialize)]
pub struct UserInfo {
    pub id: UserId,
    pub username: String,
    pub name: String,
    pub role: UserRole,
    pub status: UserStatus,
    pub create_date: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_login_time: Option<DateTime<Utc>>,
}

impl From<User> for UserInfo {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            name: user.name,
            role: user.role,
            status: user.status,
            create_date: user.create_date,
            last_login_time: user.last_login_time,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LoginResult {
    #[serde(rename = "userInfo")]
    pub user_info: UserInfo,
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct VerifiedToken {
    #[serde(rename = "userInfo")]
    pub user_info: UserInfo,
}

#[derive(Debug, Serialize)]
pub struct CreatedUser {
    #[serde(rename = "userId")]
    pub user_id: UserId,
}

pub struct UserService<S> {
    store: Arc<S>,
}

impl<S: Store> UserService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    fn active_user(&self, username: &str) -> Result<User, ServiceError> {
        self.store
            .user_by_username(username)?
            .filter(|user| user.status == UserStatus::Active)
            .ok_or_else(|| ServiceError::validation("用户不存在或已禁用"))
    }

    pub fn login(&self, params: LoginParams) -> Result<LoginResult, ServiceError> {
        if params.username.is_empty() || params.password.is_empty() {
            return Err(ServiceError::validation("用户名和密码不能为空"));
        }

        let mut user = self.active_user(&params.username)?;
        if user.password != params.password {
            return Err(ServiceError::validation("密码错误"));
        }

        let now = Utc::now();
        let token = issue_token(&user.username, now);
        user.last_login_time = Some(now);
        user.update_date = now;
        self.store.update_user(&user)?;

        Ok(LoginResult {
            user_info: user.into(),
            token,
        })
    }

    pub fn verify_token(
        &self,
        params: VerifyTokenParams,
        now: DateTime<Utc>,
    ) -> Result<VerifiedToken, ServiceError> {
        if params.token.is_empty() {
            return Err(ServiceError::validation("Token不能为空"));
        }

        let parts: Vec<&str> = params.token.split('_').collect();
        if parts.len() < 3 {
            return Err(ServiceError::validation("Token格式错误"));
        }
        let username = parts[0];
        let issued_ms: i64 = parts[1]
            .parse()
            .map_err(|_| ServiceError::validation("Token格式错误"))?;

        if now.timestamp_millis() - issued_ms > TOKEN_LIFETIME_MS {
            return Err(ServiceError::validation("Token已过期"));
        }

        let user = self.active_user(username)?;
        Ok(VerifiedToken {
            user_info: user.into(),
        })
    }

    pub fn change_password(&self, params: ChangePasswordParams) -> Result<(), ServiceError> {
        if params.username.is_empty()
            || params.old_password.is_empty()
            || params.new_password.is_empty()
        {
            return Err(ServiceError::validation("参数不完整"));
        }
        if params.new_password.chars().count() < 6 {
            return Err(ServiceError::validation("新密码长度至少6位"));
        }

        let mut user = self.active_user(&params.username)?;
        if user.password != params.old_password {
            return Err(ServiceError::validation("当前密码错误"));
        }
        if params.old_password == params.new_password {
            return Err(ServiceError::validation("新密码不能与当前密码相同"));
        }

        let now = Utc::now();
        user.password = params.new_password;
        user.password_update_date = Some(now);
        user.update_date = now;
        self.store.update_user(&user)?;
        Ok(())
    }

    pub fn get_user_info(&self, user_id: &UserId) -> Result<UserInfo, ServiceError> {
        let user = self
            .store
            .user(user_id)?
            .ok_or_else(|| ServiceError::not_found("用户不存在"))?;
        Ok(user.into())
    }

    pub fn create_user(&self, params: CreateUserParams) -> Result<CreatedUser, ServiceError> {
        if params.username.is_empty() || params.password.is_empty() || params.name.is_empty() {
            return Err(ServiceError::validation("用户名、密码和姓名不能为空"));
        }
        if params.password.chars().count() < 6 {
            return Err(ServiceError::validation("密码长度至少6位"));
        }
        if self.store.user_by_username(&params.username)?.is_some() {
            return Err(ServiceError::validation("用户名已存在"));
        }

        let now = Utc::now();
        let user = User {
            id: next_user_id(),
            username: params.username,
            password: params.password,
            name: params.name,
            role: params.role,
            status: UserStatus::Active,
            last_login_time: None,
            password_update_date: None,
            create_date: now,
            update_date: now,
        };
        let user = self.store.insert_user(user)?;

        Ok(CreatedUser { user_id: user.id })
    }

    /// Password and id are never updatable through this path.
    pub fn update_user(&self, params: UpdateUserParams) -> Result<(), ServiceError> {
        let mut user = self
            .store
            .user(&params.user_id)?
            .ok_or_else(|| ServiceError::not_found("用户不存在"))?;

        if let Some(name) = params.name {
            user.name = name;
        }
        if let Some(role) = params.role {
            user.role = role;
        }
        if let Some(status) = params.status {
            user.status = status;
        }
        user.update_date = Utc::now();

        self.store.update_user(&user)?;
        Ok(())
    }

    /// Soft delete: the row stays but can no longer log in.
    pub fn delete_user(&self, user_id: &UserId) -> Result<(), ServiceError> {
        let mut user = self
            .store
            .user(user_id)?
            .ok_or_else(|| ServiceError::not_found("用户不存在"))?;
        user.status = UserStatus::Inactive;
        user.update_date = Utc::now();
        self.store.update_user(&user)?;
        Ok(())
    }

    pub fn get_users(&self, query: UserQuery) -> Result<Page<UserInfo>, ServiceError> {
        let mut users = self.store.users()?;
        if let Some(role) = query.role {
            users.retain(|user| user.role == role);
        }
        if let Some(status) = query.status {
            users.retain(|user| user.status == status);
        }
        users.sort_by(|a, b| b.create_date.cmp(&a.create_date));

        let infos: Vec<UserInfo> = users.into_iter().map(UserInfo::from).collect();
        Ok(Page::slice(infos, query.page))
    }
}

fn issue_token(username: &str, now: DateTime<Utc>) -> String {
    let nonce = TOKEN_NONCE.fetch_add(1, Ordering::Relaxed);
    format!("{}_{}_{:x}", username, now.timestamp_millis(), nonce)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::Duration;

    fn service() -> UserService<MemoryStore> {
        UserService::new(Arc::new(MemoryStore::new()))
    }

    fn create(service: &UserService<MemoryStore>, username: &str) -> UserId {
        service
            .create_user(CreateUserParams {
                username: username.to_string(),
                password: "secret123".to_string(),
                name: "管理员".to_string(),
                role: UserRole::Admin,
            })
            .expect("create user")
            .user_id
    }

    #[test]
    fn login_issues_token_and_records_time() {
        let service = service();
        create(&service, "admin");

        let result = service
            .login(LoginParams {
                username: "admin".to_string(),
                password: "secret123".to_string(),
            })
            .expect("login");
        assert!(result.token.starts_with("admin_"));
        assert!(result.user_info.last_login_time.is_some());

        let verified = service
            .verify_token(
                VerifyTokenParams {
                    token: result.token,
                },
                Utc::now(),
            )
            .expect("verify");
        assert_eq!(verified.user_info.username, "admin");
    }

    #[test]
    fn wrong_password_is_rejected() {
        let service = service();
        create(&service, "admin");
        let err = service
            .login(LoginParams {
                username: "admin".to_string(),
                password: "nope".to_string(),
            })
            .expect_err("wrong password");
        assert!(err.to_string().contains("密码错误"));
    }

    #[test]
    fn expired_token_is_rejected() {
        let service = service();
        create(&service, "admin");
        let result = service
            .login(LoginParams {
                username: "admin".to_string(),
                password: "secret123".to_string(),
            })
            .expect("login");

        let err = service
            .verify_token(
                VerifyTokenParams {
                    token: result.token,
                },
                Utc::now() + Duration::days(8),
            )
            .expect_err("expired");
        assert!(err.to_string().contains("Token已过期"));

        let err = service
            .verify_token(
                VerifyTokenParams {
                    token: "garbage".to_string(),
                },
                Utc::now(),
            )
            .expect_err("malformed");
        assert!(err.to_string().contains("Token格式错误"));
    }

    #[test]
    fn deleted_user_cannot_log_in() {
        let service = service();
        let user_id = create(&service, "admin");
        service.delete_user(&user_id).expect("delete");

        let err = service
            .login(LoginParams {
                username: "admin".to_string(),
                password: "secret123".to_string(),
            })
            .expect_err("disabled user");
        assert!(err.to_string().contains("用户不存在或已禁用"));
    }

    #[test]
    fn change_password_requires_a_new_value() {
        let service = service();
        create(&service, "admin");

        let err = service
            .change_password(ChangePasswordParams {
                username: "admin".to_string(),
                old_password: "secret123".to_string(),
                new_password: "secret123".to_string(),
            })
            .expect_err("same password");
        assert!(err.to_string().contains("新密码不能与当前密码相同"));

        service
            .change_password(ChangePasswordParams {
                username: "admin".to_string(),
                old_password: "secret123".to_string(),
                new_password: "secret456".to_string(),
            })
            .expect("change");
        service
            .login(LoginParams {
                username: "admin".to_string(),
                password: "secret456".to_string(),
            })
            .expect("login with new password");
    }

    #[test]
    fn listing_never_exposes_passwords() {
        let service = service();
        create(&service, "admin");
        let page = service.get_users(UserQuery::default()).expect("list");
        assert_eq!(page.total, 1);
        let json = serde_json::to_value(&page.list[0]).expect("serialize");
        assert!(json.get("password").is_none());
    }
}
