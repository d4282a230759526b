//! Business logic. Services own every read and write of users, devices and
//! device grants; HTTP handlers only translate requests into service calls.

pub mod auth;
pub mod devices;

pub use auth::AuthService;
pub use devices::{BatchOutcome, DeviceService};

use crate::auth::TokenError;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Username already exists")]
    DuplicateUsername,
    #[error("Email already exists")]
    DuplicateEmail,
    #[error("User not found")]
    UserNotFound,
    #[error("Invalid password")]
    InvalidPassword,
    #[error("Device not found")]
    DeviceNotFound,
    #[error("Device already authorized for this user")]
    AlreadyAuthorized,
    #[error("Failed to hash password: {0}")]
    PasswordHash(String),
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl From<argon2::password_hash::Error> for ServiceError {
    fn from(err: argon2::password_hash::Error) -> Self {
        ServiceError::PasswordHash(err.to_string())
    }
}

/// Return the constraint message when `err` is a UNIQUE violation
pub(crate) fn unique_violation(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            Some(db_err.message().to_string())
        }
        _ => None,
    }
}
