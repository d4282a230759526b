use axum::{extract::State, Extension};
use std::sync::Arc;

use crate::db::{
    AuthorizeDeviceRequest, BatchAuthorizeRequest, BatchAuthorizeResponse, CreateDeviceRequest,
    DevicePatch, DeviceResponse, DeviceStatus, NewDevice, PermissionType, UpdateDeviceRequest,
};
use crate::AppState;

use super::auth::CurrentUser;
use super::error::{ApiError, ValidationErrorBuilder};
use super::extract::{ApiJson, ApiPath};
use super::response::ApiResponse;
use super::validation::{
    validate_description, validate_device_name, validate_ip_address, validate_mac_address,
    validate_tags,
};

/// Parse an optional enum field, recording a validation error on failure
fn parse_field<T: std::str::FromStr<Err = String>>(
    errors: &mut ValidationErrorBuilder,
    field: &str,
    value: Option<&str>,
) -> Option<T> {
    match value.map(str::parse::<T>) {
        Some(Ok(parsed)) => Some(parsed),
        Some(Err(e)) => {
            errors.add(field, e);
            None
        }
        None => None,
    }
}

fn validate_create_request(req: CreateDeviceRequest) -> Result<NewDevice, ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    let name = errors.require("name", req.name);
    let ip_address = errors.require("ip_address", req.ip_address);
    let mac_address = errors.require("mac_address", req.mac_address);

    if let Some(ref name) = name {
        errors.check("name", validate_device_name(name));
    }
    if let Some(ref ip) = ip_address {
        errors.check("ip_address", validate_ip_address(ip));
    }
    if let Some(ref mac) = mac_address {
        errors.check("mac_address", validate_mac_address(mac));
    }
    if let Some(ref description) = req.description {
        errors.check("description", validate_description(description));
    }
    if let Some(ref tags) = req.tags {
        errors.check("tags", validate_tags(tags));
    }
    let status = parse_field::<DeviceStatus>(&mut errors, "status", req.status.as_deref());

    match (name, ip_address, mac_address) {
        (Some(name), Some(ip_address), Some(mac_address)) if errors.is_empty() => Ok(NewDevice {
            name,
            ip_address,
            mac_address,
            description: req.description.unwrap_or_default(),
            tags: req.tags.unwrap_or_default(),
            status: status.unwrap_or_default(),
        }),
        _ => Err(errors
            .build()
            .unwrap_or_else(|| ApiError::bad_request("Invalid device"))),
    }
}

fn validate_update_request(req: UpdateDeviceRequest) -> Result<DevicePatch, ApiError> {
    if req.is_empty() {
        return Err(ApiError::validation_field("body", "No update data provided"));
    }

    let mut errors = ValidationErrorBuilder::new();

    if let Some(ref name) = req.name {
        errors.check("name", validate_device_name(name));
    }
    if let Some(ref ip) = req.ip_address {
        errors.check("ip_address", validate_ip_address(ip));
    }
    if let Some(ref mac) = req.mac_address {
        errors.check("mac_address", validate_mac_address(mac));
    }
    if let Some(ref description) = req.description {
        errors.check("description", validate_description(description));
    }
    if let Some(ref tags) = req.tags {
        errors.check("tags", validate_tags(tags));
    }
    let status = parse_field::<DeviceStatus>(&mut errors, "status", req.status.as_deref());

    errors.finish()?;

    Ok(DevicePatch {
        name: req.name,
        ip_address: req.ip_address,
        mac_address: req.mac_address,
        description: req.description,
        tags: req.tags,
        status,
    })
}

/// Register a new device (admin only)
pub async fn create_device(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<CreateDeviceRequest>,
) -> Result<ApiResponse<DeviceResponse>, ApiError> {
    let device = validate_create_request(req)?;
    let device = state.devices.create_device(device).await?;
    Ok(ApiResponse::ok(DeviceResponse::from(device)).message("Device created"))
}

/// Devices visible to the caller: all of them for admins, granted ones otherwise
pub async fn list_devices(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<ApiResponse<Vec<DeviceResponse>>, ApiError> {
    let devices = state.devices.get_devices(user.id, user.is_admin()).await?;
    Ok(ApiResponse::ok(
        devices.into_iter().map(DeviceResponse::from).collect(),
    ))
}

pub async fn update_device(
    State(state): State<Arc<AppState>>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<UpdateDeviceRequest>,
) -> Result<ApiResponse<DeviceResponse>, ApiError> {
    let patch = validate_update_request(req)?;
    let device = state
        .devices
        .update_device(id, patch)
        .await?
        .ok_or_else(|| ApiError::not_found("Device not found"))?;
    Ok(ApiResponse::ok(DeviceResponse::from(device)).message("Device updated"))
}

/// Grant one user access to one device
pub async fn authorize_device(
    State(state): State<Arc<AppState>>,
    ApiPath(device_id): ApiPath<i64>,
    ApiJson(req): ApiJson<AuthorizeDeviceRequest>,
) -> Result<ApiResponse<()>, ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    let user_id = errors.require("user_id", req.user_id);
    let permission =
        parse_field::<PermissionType>(&mut errors, "permission_type", req.permission_type.as_deref());

    let Some(user_id) = user_id.filter(|_| errors.is_empty()) else {
        return Err(errors
            .build()
            .unwrap_or_else(|| ApiError::bad_request("Invalid request")));
    };

    state
        .devices
        .authorize_device(device_id, user_id, permission.unwrap_or_default())
        .await?;

    Ok(ApiResponse::empty("Device authorized"))
}

/// Grant one user access to every device matching any of the given tags.
///
/// The device id in the path is accepted but not used.
pub async fn batch_authorize(
    State(state): State<Arc<AppState>>,
    ApiPath(_device_id): ApiPath<i64>,
    ApiJson(req): ApiJson<BatchAuthorizeRequest>,
) -> Result<ApiResponse<BatchAuthorizeResponse>, ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    let tags = errors.require("tags", req.tags);
    let user_id = errors.require("user_id", req.user_id);
    let permission =
        parse_field::<PermissionType>(&mut errors, "permission_type", req.permission_type.as_deref());

    if let Some(ref tags) = tags {
        if tags.is_empty() {
            errors.add("tags", "At least one tag is required");
        } else {
            errors.check("tags", validate_tags(tags));
        }
    }

    let (Some(tags), Some(user_id)) = (tags, user_id) else {
        return Err(errors
            .build()
            .unwrap_or_else(|| ApiError::bad_request("Invalid request")));
    };
    errors.finish()?;

    let outcome = state
        .devices
        .batch_authorize_by_tags(&tags, user_id, permission.unwrap_or_default())
        .await?;

    let count = outcome.created.len();
    Ok(ApiResponse::ok(BatchAuthorizeResponse {
        count,
        updated: outcome.updated,
    })
    .message(format!("Authorized {} devices", count)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_request() -> CreateDeviceRequest {
        CreateDeviceRequest {
            name: Some("sensor".to_string()),
            ip_address: Some("10.0.0.7".to_string()),
            mac_address: Some("00:11:22:33:44:55".to_string()),
            description: None,
            tags: None,
            status: None,
        }
    }

    #[test]
    fn test_create_request_defaults() {
        let device = validate_create_request(create_request()).unwrap();
        assert_eq!(device.status, DeviceStatus::Offline);
        assert!(device.tags.is_empty());
        assert_eq!(device.description, "");
    }

    #[test]
    fn test_create_request_missing_fields() {
        let mut req = create_request();
        req.name = None;
        req.mac_address = None;
        let err = validate_create_request(req).unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::UNPROCESSABLE_ENTITY);
        assert!(err.message().contains("2 fields"));
    }

    #[test]
    fn test_create_request_invalid_values() {
        let mut req = create_request();
        req.ip_address = Some("not-an-ip".to_string());
        req.status = Some("rebooting".to_string());
        assert!(validate_create_request(req).is_err());
    }

    #[test]
    fn test_empty_update_rejected() {
        assert!(validate_update_request(UpdateDeviceRequest::default()).is_err());

        let patch = validate_update_request(UpdateDeviceRequest {
            status: Some("online".to_string()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(patch.status, Some(DeviceStatus::Online));
        assert!(patch.name.is_none());
    }
}
