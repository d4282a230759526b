use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
    Extension,
};
use std::sync::Arc;

use crate::auth::TokenError;
use crate::db::{
    LoginRequest, LoginResponse, Page, PageQuery, RegisterRequest, UpdateUserRequest, User,
    UserPatch, UserResponse, UserRole,
};
use crate::services::ServiceError;
use crate::AppState;

use super::error::{ApiError, ValidationErrorBuilder};
use super::extract::{ApiJson, ApiPath, ApiQuery};
use super::response::ApiResponse;
use super::validation::{validate_email, validate_password, validate_username};

/// The authenticated account, attached to the request by `require_auth`
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

/// Register endpoint
pub async fn register(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> Result<ApiResponse<UserResponse>, ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    let username = errors.require("username", req.username);
    let email = errors.require("email", req.email);
    let password = errors.require("password", req.password);

    if let Some(ref username) = username {
        errors.check("username", validate_username(username));
    }
    if let Some(ref email) = email {
        errors.check("email", validate_email(email));
    }
    if let Some(ref password) = password {
        errors.check("password", validate_password(password));
    }
    let role = match req.role.as_deref() {
        None => UserRole::default(),
        Some(role) => match role.parse::<UserRole>() {
            Ok(role) => role,
            Err(e) => {
                errors.add("role", e);
                UserRole::default()
            }
        },
    };

    let (Some(username), Some(email), Some(password)) = (username, email, password) else {
        return Err(errors.build().unwrap_or_else(|| ApiError::bad_request("Invalid request")));
    };
    errors.finish()?;

    let user = state
        .auth
        .register(&username, &password, &email, role)
        .await?;

    Ok(ApiResponse::ok(UserResponse::from(user)).message("Registration successful"))
}

/// Login endpoint
pub async fn login(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<ApiResponse<LoginResponse>, ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    let username = errors.require("username", req.username);
    let password = errors.require("password", req.password);

    let (Some(username), Some(password)) = (username, password) else {
        return Err(errors.build().unwrap_or_else(|| ApiError::bad_request("Invalid request")));
    };

    let (token, user) = state
        .auth
        .login(&username, &password)
        .await
        .map_err(|err| match err {
            ServiceError::UserNotFound | ServiceError::InvalidPassword => {
                tracing::debug!(username = %username, "Login failed: {}", err);
                ApiError::unauthorized("Invalid credentials")
            }
            other => ApiError::from(other),
        })?;

    Ok(ApiResponse::ok(LoginResponse {
        token,
        user: UserResponse::from(user),
    })
    .message("Login successful"))
}

/// List all users, paginated (admin only)
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> Result<ApiResponse<Page<UserResponse>>, ApiError> {
    let page = state.auth.get_users(&query).await?;
    Ok(ApiResponse::ok(page.map(UserResponse::from)))
}

/// Partially update a user (admin only)
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<UpdateUserRequest>,
) -> Result<ApiResponse<UserResponse>, ApiError> {
    if req.is_empty() {
        return Err(ApiError::validation_field("body", "No update data provided"));
    }

    let mut errors = ValidationErrorBuilder::new();
    if let Some(ref username) = req.username {
        errors.check("username", validate_username(username));
    }
    if let Some(ref email) = req.email {
        errors.check("email", validate_email(email));
    }
    if let Some(ref password) = req.password {
        errors.check("password", validate_password(password));
    }
    let role = match req.role.as_deref().map(str::parse::<UserRole>) {
        Some(Ok(role)) => Some(role),
        Some(Err(e)) => {
            errors.add("role", e);
            None
        }
        None => None,
    };
    errors.finish()?;

    let user = state
        .auth
        .update_user(
            id,
            UserPatch {
                username: req.username,
                email: req.email,
                role,
                password: req.password,
            },
        )
        .await?;

    Ok(ApiResponse::ok(UserResponse::from(user)).message("User updated"))
}

/// The authenticated user's own account
pub async fn profile(
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> ApiResponse<UserResponse> {
    ApiResponse::ok(UserResponse::from(user))
}

/// Resolve the bearer token to an account and attach it as `CurrentUser`
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_token(request.headers())
        .ok_or_else(|| ApiError::unauthorized("Missing authorization token"))?;

    let claims = state
        .auth
        .tokens()
        .verify(&token)
        .map_err(|err| match err {
            TokenError::Expired => ApiError::unauthorized("Token has expired"),
            _ => ApiError::unauthorized("Invalid token"),
        })?;
    let user_id = claims
        .user_id()
        .map_err(|_| ApiError::unauthorized("Invalid token"))?;

    let user = match state.auth.get_user(user_id).await {
        Ok(user) => user,
        Err(ServiceError::UserNotFound) => return Err(ApiError::unauthorized("User not found")),
        Err(err) => return Err(err.into()),
    };

    request.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(request).await)
}

/// Reject non-admin accounts. Must run inside `require_auth`.
pub async fn require_admin(request: Request, next: Next) -> Result<Response, ApiError> {
    let is_admin = request
        .extensions()
        .get::<CurrentUser>()
        .is_some_and(|CurrentUser(user)| user.is_admin());

    if !is_admin {
        return Err(ApiError::forbidden("Admin privileges required"));
    }
    Ok(next.run(request).await)
}

/// Extract the bearer token from request headers
fn extract_token(headers: &HeaderMap) -> Option<String> {
    let header = headers.get("Authorization").and_then(|h| h.to_str().ok())?;
    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(|token| token.to_string())
}
