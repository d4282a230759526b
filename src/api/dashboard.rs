use axum::{extract::State, Extension};
use std::sync::Arc;

use crate::db::DeviceStatistics;
use crate::AppState;

use super::auth::CurrentUser;
use super::error::ApiError;
use super::response::ApiResponse;

/// Device counters scoped to what the caller can see
pub async fn statistics(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<ApiResponse<DeviceStatistics>, ApiError> {
    let stats = state.devices.statistics(user.id, user.is_admin()).await?;
    Ok(ApiResponse::ok(stats))
}
