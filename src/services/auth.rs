//! Account registration, login and user management.

use tracing::{debug, info};

use crate::auth::{hash_password, verify_password, TokenService};
use crate::db::{now_timestamp, DbPool, Page, PageQuery, User, UserPatch, UserRole};

use super::{unique_violation, ServiceError, ServiceResult};

#[derive(Debug, Clone)]
pub struct AuthService {
    db: DbPool,
    tokens: TokenService,
}

impl AuthService {
    pub fn new(db: DbPool, tokens: TokenService) -> Self {
        Self { db, tokens }
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    /// Create an account. The username is checked before the email.
    pub async fn register(
        &self,
        username: &str,
        password: &str,
        email: &str,
        role: UserRole,
    ) -> ServiceResult<User> {
        if self.find_by_username(username).await?.is_some() {
            return Err(ServiceError::DuplicateUsername);
        }
        if self.email_taken(email, None).await? {
            return Err(ServiceError::DuplicateEmail);
        }

        let password_hash = hash_password(password)?;
        let now = now_timestamp();

        let result = sqlx::query(
            "INSERT INTO users (username, email, password_hash, role, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(username)
        .bind(email)
        .bind(&password_hash)
        .bind(role.as_str())
        .bind(&now)
        .bind(&now)
        .execute(&self.db)
        .await
        .map_err(map_user_conflict)?;

        info!(username = %username, role = %role, "User registered");
        self.get_user(result.last_insert_rowid()).await
    }

    /// Check credentials and issue an access token for the account
    pub async fn login(&self, username: &str, password: &str) -> ServiceResult<(String, User)> {
        let user = self
            .find_by_username(username)
            .await?
            .ok_or(ServiceError::UserNotFound)?;

        if !verify_password(password, &user.password_hash) {
            debug!(username = %username, "Login rejected: wrong password");
            return Err(ServiceError::InvalidPassword);
        }

        let token = self.tokens.issue(user.id)?;
        info!(user_id = user.id, "User logged in");
        Ok((token, user))
    }

    /// Offset pagination in insertion order
    pub async fn get_users(&self, query: &PageQuery) -> ServiceResult<Page<User>> {
        let (page, per_page) = query.resolve();
        let offset = (page - 1) * per_page;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.db)
            .await?;

        let items = sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY id ASC LIMIT ? OFFSET ?")
            .bind(per_page)
            .bind(offset)
            .fetch_all(&self.db)
            .await?;

        Ok(Page {
            items,
            total,
            page,
            per_page,
        })
    }

    /// Apply a partial update, re-checking username and email uniqueness
    /// against every other account.
    pub async fn update_user(&self, id: i64, patch: UserPatch) -> ServiceResult<User> {
        let mut user = self.get_user(id).await?;

        if let Some(username) = patch.username {
            if self.username_taken(&username, Some(id)).await? {
                return Err(ServiceError::DuplicateUsername);
            }
            user.username = username;
        }

        if let Some(email) = patch.email {
            if self.email_taken(&email, Some(id)).await? {
                return Err(ServiceError::DuplicateEmail);
            }
            user.email = email;
        }

        if let Some(role) = patch.role {
            user.role = role.as_str().to_string();
        }

        if let Some(password) = patch.password {
            user.password_hash = hash_password(&password)?;
        }

        user.updated_at = now_timestamp();

        sqlx::query(
            "UPDATE users SET username = ?, email = ?, role = ?, password_hash = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.role)
        .bind(&user.password_hash)
        .bind(&user.updated_at)
        .bind(id)
        .execute(&self.db)
        .await
        .map_err(map_user_conflict)?;

        info!(user_id = id, "User updated");
        Ok(user)
    }

    pub async fn get_user(&self, id: i64) -> ServiceResult<User> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or(ServiceError::UserNotFound)
    }

    pub async fn find_by_username(&self, username: &str) -> ServiceResult<Option<User>> {
        Ok(sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.db)
            .await?)
    }

    /// Create the configured admin account unless an admin already exists.
    ///
    /// Returns the created account, or `None` when nothing was done.
    pub async fn ensure_admin(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> ServiceResult<Option<User>> {
        let admins: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE role = ?")
            .bind(UserRole::Admin.as_str())
            .fetch_one(&self.db)
            .await?;
        if admins > 0 {
            debug!("Admin account already present");
            return Ok(None);
        }

        let admin = self
            .register(username, password, email, UserRole::Admin)
            .await?;
        info!(username = %admin.username, "Created admin account");
        Ok(Some(admin))
    }

    async fn username_taken(&self, username: &str, except: Option<i64>) -> ServiceResult<bool> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE username = ? AND id != ?")
                .bind(username)
                .bind(except.unwrap_or(0))
                .fetch_one(&self.db)
                .await?;
        Ok(count > 0)
    }

    async fn email_taken(&self, email: &str, except: Option<i64>) -> ServiceResult<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE email = ? AND id != ?")
            .bind(email)
            .bind(except.unwrap_or(0))
            .fetch_one(&self.db)
            .await?;
        Ok(count > 0)
    }
}

/// Map a UNIQUE violation that slipped past the pre-checks to the matching
/// duplicate error.
fn map_user_conflict(err: sqlx::Error) -> ServiceError {
    match unique_violation(&err) {
        Some(msg) if msg.contains("users.email") => ServiceError::DuplicateEmail,
        Some(_) => ServiceError::DuplicateUsername,
        None => ServiceError::Database(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    async fn service() -> AuthService {
        let db = crate::db::init_in_memory().await.unwrap();
        AuthService::new(db, TokenService::new("test-secret", Duration::hours(1)))
    }

    #[tokio::test]
    async fn test_register_and_login() {
        let auth = service().await;
        let user = auth
            .register("alice", "wonderland", "alice@example.com", UserRole::User)
            .await
            .unwrap();
        assert_eq!(user.username, "alice");
        assert_eq!(user.role, "user");
        assert_ne!(user.password_hash, "wonderland");

        let (token, logged_in) = auth.login("alice", "wonderland").await.unwrap();
        assert_eq!(logged_in.id, user.id);
        let claims = auth.tokens().verify(&token).unwrap();
        assert_eq!(claims.user_id().unwrap(), user.id);
    }

    #[tokio::test]
    async fn test_register_duplicates() {
        let auth = service().await;
        auth.register("alice", "pw", "alice@example.com", UserRole::User)
            .await
            .unwrap();

        let err = auth
            .register("alice", "pw", "other@example.com", UserRole::User)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::DuplicateUsername));

        let err = auth
            .register("bob", "pw", "alice@example.com", UserRole::User)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::DuplicateEmail));

        // Username wins when both collide
        let err = auth
            .register("alice", "pw", "alice@example.com", UserRole::User)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::DuplicateUsername));
    }

    #[tokio::test]
    async fn test_login_failures() {
        let auth = service().await;
        auth.register("alice", "pw", "alice@example.com", UserRole::User)
            .await
            .unwrap();

        assert!(matches!(
            auth.login("alice", "wrong").await,
            Err(ServiceError::InvalidPassword)
        ));
        assert!(matches!(
            auth.login("nobody", "pw").await,
            Err(ServiceError::UserNotFound)
        ));
    }

    #[tokio::test]
    async fn test_get_users_pagination() {
        let auth = service().await;
        for i in 0..5 {
            auth.register(&format!("user{i}"), "pw", &format!("user{i}@example.com"), UserRole::User)
                .await
                .unwrap();
        }

        let page = auth
            .get_users(&PageQuery {
                page: Some(2),
                per_page: Some(2),
            })
            .await
            .unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.page, 2);
        assert_eq!(page.per_page, 2);
        let names: Vec<_> = page.items.iter().map(|u| u.username.as_str()).collect();
        assert_eq!(names, vec!["user2", "user3"]);

        let past_end = auth
            .get_users(&PageQuery {
                page: Some(9),
                per_page: Some(2),
            })
            .await
            .unwrap();
        assert!(past_end.items.is_empty());
        assert_eq!(past_end.total, 5);
    }

    #[tokio::test]
    async fn test_update_user() {
        let auth = service().await;
        let alice = auth
            .register("alice", "pw", "alice@example.com", UserRole::User)
            .await
            .unwrap();
        auth.register("bob", "pw", "bob@example.com", UserRole::User)
            .await
            .unwrap();

        let err = auth
            .update_user(
                alice.id,
                UserPatch {
                    username: Some("bob".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::DuplicateUsername));

        let err = auth
            .update_user(
                alice.id,
                UserPatch {
                    email: Some("bob@example.com".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::DuplicateEmail));

        // Keeping one's own username is not a conflict
        let updated = auth
            .update_user(
                alice.id,
                UserPatch {
                    username: Some("alice".to_string()),
                    role: Some(UserRole::Admin),
                    password: Some("new-password".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(updated.is_admin());
        assert_eq!(updated.email, "alice@example.com");

        assert!(auth.login("alice", "new-password").await.is_ok());
        assert!(matches!(
            auth.login("alice", "pw").await,
            Err(ServiceError::InvalidPassword)
        ));

        let stored = auth.get_user(alice.id).await.unwrap();
        assert_eq!(stored.role, "admin");
    }

    #[tokio::test]
    async fn test_update_missing_user() {
        let auth = service().await;
        let err = auth.update_user(404, UserPatch::default()).await.unwrap_err();
        assert!(matches!(err, ServiceError::UserNotFound));
    }

    #[tokio::test]
    async fn test_ensure_admin_runs_once() {
        let auth = service().await;
        let created = auth
            .ensure_admin("admin", "admin@example.com", "admin123")
            .await
            .unwrap();
        assert!(created.is_some_and(|u| u.is_admin()));

        let again = auth
            .ensure_admin("admin2", "admin2@example.com", "admin123")
            .await
            .unwrap();
        assert!(again.is_none());
    }
}
