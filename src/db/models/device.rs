//! Device inventory and per-user device grants.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::common::parse_tags;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Online,
    Offline,
}

impl DeviceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceStatus::Online => "online",
            DeviceStatus::Offline => "offline",
        }
    }
}

impl Default for DeviceStatus {
    fn default() -> Self {
        Self::Offline
    }
}

impl std::fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DeviceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "online" => Ok(DeviceStatus::Online),
            "offline" => Ok(DeviceStatus::Offline),
            _ => Err(format!("Unknown device status: {}", s)),
        }
    }
}

/// Access level granted to a user on a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionType {
    Read,
    Write,
}

impl PermissionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionType::Read => "read",
            PermissionType::Write => "write",
        }
    }
}

impl Default for PermissionType {
    fn default() -> Self {
        Self::Read
    }
}

impl std::fmt::Display for PermissionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PermissionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read" => Ok(PermissionType::Read),
            "write" => Ok(PermissionType::Write),
            _ => Err(format!("Unknown permission type: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Device {
    pub id: i64,
    pub name: String,
    pub ip_address: String,
    pub mac_address: String,
    pub status: String,
    pub description: String,
    /// Comma-joined tag list
    pub tags: String,
    pub created_at: String,
    pub updated_at: String,
}

impl Device {
    pub fn tag_list(&self) -> Vec<String> {
        parse_tags(&self.tags)
    }
}

/// Device as returned by the API, with tags expanded into a list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceResponse {
    pub id: i64,
    pub name: String,
    pub ip_address: String,
    pub mac_address: String,
    pub status: String,
    pub description: String,
    pub tags: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Device> for DeviceResponse {
    fn from(device: Device) -> Self {
        let tags = device.tag_list();
        Self {
            id: device.id,
            name: device.name,
            ip_address: device.ip_address,
            mac_address: device.mac_address,
            status: device.status,
            description: device.description,
            tags,
            created_at: device.created_at,
            updated_at: device.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DeviceUserAssociation {
    pub id: i64,
    pub device_id: i64,
    pub user_id: i64,
    pub permission_type: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateDeviceRequest {
    pub name: Option<String>,
    pub ip_address: Option<String>,
    pub mac_address: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateDeviceRequest {
    pub name: Option<String>,
    pub ip_address: Option<String>,
    pub mac_address: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
    pub status: Option<String>,
}

impl UpdateDeviceRequest {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.ip_address.is_none()
            && self.mac_address.is_none()
            && self.description.is_none()
            && self.tags.is_none()
            && self.status.is_none()
    }
}

#[derive(Debug, Deserialize)]
pub struct AuthorizeDeviceRequest {
    pub user_id: Option<i64>,
    pub permission_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BatchAuthorizeRequest {
    pub tags: Option<Vec<String>>,
    pub user_id: Option<i64>,
    pub permission_type: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BatchAuthorizeResponse {
    /// Number of newly created grants
    pub count: usize,
    /// Number of existing grants whose permission was overwritten
    pub updated: usize,
}

/// Validated device fields for creation
#[derive(Debug, Clone)]
pub struct NewDevice {
    pub name: String,
    pub ip_address: String,
    pub mac_address: String,
    pub description: String,
    pub tags: Vec<String>,
    pub status: DeviceStatus,
}

/// Validated partial device update
#[derive(Debug, Clone, Default)]
pub struct DevicePatch {
    pub name: Option<String>,
    pub ip_address: Option<String>,
    pub mac_address: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
    pub status: Option<DeviceStatus>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusStats {
    pub online: i64,
    pub offline: i64,
}

/// Dashboard counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceStatistics {
    #[serde(rename = "deviceCount")]
    pub device_count: i64,
    #[serde(rename = "statusStats")]
    pub status_stats: StatusStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_splits_tags() {
        let device = Device {
            id: 7,
            name: "sensor".to_string(),
            ip_address: "10.0.0.7".to_string(),
            mac_address: "00:11:22:33:44:55".to_string(),
            status: "offline".to_string(),
            description: String::new(),
            tags: "dp,test".to_string(),
            created_at: String::new(),
            updated_at: String::new(),
        };
        let response = DeviceResponse::from(device);
        assert_eq!(response.tags, vec!["dp", "test"]);
    }

    #[test]
    fn test_statistics_shape() {
        let stats = DeviceStatistics {
            device_count: 3,
            status_stats: StatusStats {
                online: 1,
                offline: 2,
            },
        };
        let json = serde_json::to_value(stats).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"deviceCount": 3, "statusStats": {"online": 1, "offline": 2}})
        );
    }

    #[test]
    fn test_enum_round_trip_through_str() {
        for status in [DeviceStatus::Online, DeviceStatus::Offline] {
            assert_eq!(status.as_str().parse::<DeviceStatus>(), Ok(status));
        }
        for perm in [PermissionType::Read, PermissionType::Write] {
            assert_eq!(perm.to_string().parse::<PermissionType>(), Ok(perm));
        }
        assert!("admin".parse::<PermissionType>().is_err());
    }
}
