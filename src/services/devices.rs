//! Device inventory and device grants.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::config::TagMatch;
use crate::db::{
    now_timestamp, serialize_tags, DbPool, Device, DevicePatch, DeviceStatistics,
    DeviceUserAssociation, NewDevice, PermissionType, StatusStats, TAG_SEPARATOR,
};

use super::{unique_violation, ServiceError, ServiceResult};

impl TagMatch {
    /// Whether a device's stored tag string matches any of `wanted`.
    ///
    /// Both modes ignore ASCII case.
    pub fn matches(&self, stored: &str, wanted: &[String]) -> bool {
        match self {
            TagMatch::Substring => {
                let stored = stored.to_ascii_lowercase();
                wanted
                    .iter()
                    .any(|tag| stored.contains(tag.to_ascii_lowercase().as_str()))
            }
            TagMatch::Exact => stored
                .split(TAG_SEPARATOR)
                .any(|have| wanted.iter().any(|tag| tag.eq_ignore_ascii_case(have))),
        }
    }
}

/// Result of a tag-based batch grant
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    /// Grants that did not exist before
    pub created: Vec<DeviceUserAssociation>,
    /// Existing grants whose permission was overwritten
    pub updated: usize,
}

#[derive(Debug, Clone)]
pub struct DeviceService {
    db: DbPool,
    tag_match: TagMatch,
}

impl DeviceService {
    pub fn new(db: DbPool, tag_match: TagMatch) -> Self {
        Self { db, tag_match }
    }

    pub async fn create_device(&self, device: NewDevice) -> ServiceResult<Device> {
        let now = now_timestamp();
        let result = sqlx::query(
            r#"
            INSERT INTO devices (name, ip_address, mac_address, status, description, tags, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&device.name)
        .bind(&device.ip_address)
        .bind(&device.mac_address)
        .bind(device.status.as_str())
        .bind(&device.description)
        .bind(serialize_tags(&device.tags))
        .bind(&now)
        .bind(&now)
        .execute(&self.db)
        .await?;

        let id = result.last_insert_rowid();
        info!(device_id = id, name = %device.name, "Device created");
        self.require_device(id).await
    }

    /// Admins see every device, everyone else only the devices granted to them
    pub async fn get_devices(&self, user_id: i64, is_admin: bool) -> ServiceResult<Vec<Device>> {
        let devices = if is_admin {
            sqlx::query_as::<_, Device>("SELECT * FROM devices ORDER BY id ASC")
                .fetch_all(&self.db)
                .await?
        } else {
            sqlx::query_as::<_, Device>(
                r#"
                SELECT d.* FROM devices d
                INNER JOIN device_user_associations a ON a.device_id = d.id
                WHERE a.user_id = ?
                ORDER BY d.id ASC
                "#,
            )
            .bind(user_id)
            .fetch_all(&self.db)
            .await?
        };
        Ok(devices)
    }

    pub async fn get_device(&self, id: i64) -> ServiceResult<Option<Device>> {
        Ok(sqlx::query_as::<_, Device>("SELECT * FROM devices WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.db)
            .await?)
    }

    /// Apply a partial update. `None` when the device does not exist.
    pub async fn update_device(&self, id: i64, patch: DevicePatch) -> ServiceResult<Option<Device>> {
        let Some(mut device) = self.get_device(id).await? else {
            return Ok(None);
        };

        if let Some(name) = patch.name {
            device.name = name;
        }
        if let Some(ip_address) = patch.ip_address {
            device.ip_address = ip_address;
        }
        if let Some(mac_address) = patch.mac_address {
            device.mac_address = mac_address;
        }
        if let Some(description) = patch.description {
            device.description = description;
        }
        if let Some(tags) = patch.tags {
            device.tags = serialize_tags(&tags);
        }
        if let Some(status) = patch.status {
            device.status = status.as_str().to_string();
        }
        device.updated_at = now_timestamp();

        sqlx::query(
            r#"
            UPDATE devices
            SET name = ?, ip_address = ?, mac_address = ?, status = ?, description = ?, tags = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&device.name)
        .bind(&device.ip_address)
        .bind(&device.mac_address)
        .bind(&device.status)
        .bind(&device.description)
        .bind(&device.tags)
        .bind(&device.updated_at)
        .bind(id)
        .execute(&self.db)
        .await?;

        info!(device_id = id, "Device updated");
        Ok(Some(device))
    }

    /// Grant a single user access to a single device. An existing grant for
    /// the pair is left untouched and reported as `AlreadyAuthorized`.
    pub async fn authorize_device(
        &self,
        device_id: i64,
        user_id: i64,
        permission: PermissionType,
    ) -> ServiceResult<DeviceUserAssociation> {
        self.require_device(device_id).await?;
        self.require_user(user_id).await?;

        if self.find_association(device_id, user_id).await?.is_some() {
            return Err(ServiceError::AlreadyAuthorized);
        }

        let now = now_timestamp();
        let result = sqlx::query(
            r#"
            INSERT INTO device_user_associations (device_id, user_id, permission_type, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(device_id)
        .bind(user_id)
        .bind(permission.as_str())
        .bind(&now)
        .bind(&now)
        .execute(&self.db)
        .await
        .map_err(|err| match unique_violation(&err) {
            // Lost a race with a concurrent grant for the same pair
            Some(_) => ServiceError::AlreadyAuthorized,
            None => ServiceError::Database(err),
        })?;

        info!(device_id, user_id, permission = %permission, "Device authorized");

        Ok(DeviceUserAssociation {
            id: result.last_insert_rowid(),
            device_id,
            user_id,
            permission_type: permission.as_str().to_string(),
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// Grant `user_id` access to every device whose tags match any of `tags`.
    ///
    /// Existing grants get their permission overwritten; only newly created
    /// grants are returned in `created`. Runs in a single transaction.
    pub async fn batch_authorize_by_tags(
        &self,
        tags: &[String],
        user_id: i64,
        permission: PermissionType,
    ) -> ServiceResult<BatchOutcome> {
        self.require_user(user_id).await?;

        let mut tx = self.db.begin().await?;

        let candidates =
            sqlx::query_as::<_, Device>("SELECT * FROM devices WHERE tags != '' ORDER BY id ASC")
                .fetch_all(&mut *tx)
                .await?;
        let matched: Vec<Device> = candidates
            .into_iter()
            .filter(|device| self.tag_match.matches(&device.tags, tags))
            .collect();

        debug!(
            user_id,
            matched = matched.len(),
            mode = ?self.tag_match,
            "Batch authorization matched devices"
        );

        let now = now_timestamp();
        let mut outcome = BatchOutcome::default();

        for device in matched {
            let existing = sqlx::query_as::<_, DeviceUserAssociation>(
                "SELECT * FROM device_user_associations WHERE device_id = ? AND user_id = ?",
            )
            .bind(device.id)
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?;

            if let Some(existing) = existing {
                sqlx::query(
                    "UPDATE device_user_associations SET permission_type = ?, updated_at = ? WHERE id = ?",
                )
                .bind(permission.as_str())
                .bind(&now)
                .bind(existing.id)
                .execute(&mut *tx)
                .await?;
                outcome.updated += 1;
            } else {
                let result = sqlx::query(
                    r#"
                    INSERT INTO device_user_associations (device_id, user_id, permission_type, created_at, updated_at)
                    VALUES (?, ?, ?, ?, ?)
                    "#,
                )
                .bind(device.id)
                .bind(user_id)
                .bind(permission.as_str())
                .bind(&now)
                .bind(&now)
                .execute(&mut *tx)
                .await?;

                outcome.created.push(DeviceUserAssociation {
                    id: result.last_insert_rowid(),
                    device_id: device.id,
                    user_id,
                    permission_type: permission.as_str().to_string(),
                    created_at: now.clone(),
                    updated_at: now.clone(),
                });
            }
        }

        tx.commit().await?;

        info!(
            user_id,
            created = outcome.created.len(),
            updated = outcome.updated,
            permission = %permission,
            "Batch authorization by tags completed"
        );
        Ok(outcome)
    }

    /// Device counts by status, scoped the same way as `get_devices`
    pub async fn statistics(&self, user_id: i64, is_admin: bool) -> ServiceResult<DeviceStatistics> {
        let rows: Vec<(String, i64)> = if is_admin {
            sqlx::query_as("SELECT status, COUNT(*) FROM devices GROUP BY status")
                .fetch_all(&self.db)
                .await?
        } else {
            sqlx::query_as(
                r#"
                SELECT d.status, COUNT(DISTINCT d.id) FROM devices d
                INNER JOIN device_user_associations a ON a.device_id = d.id
                WHERE a.user_id = ?
                GROUP BY d.status
                "#,
            )
            .bind(user_id)
            .fetch_all(&self.db)
            .await?
        };

        let by_status: HashMap<String, i64> = rows.into_iter().collect();
        Ok(DeviceStatistics {
            device_count: by_status.values().sum(),
            status_stats: StatusStats {
                online: by_status.get("online").copied().unwrap_or(0),
                offline: by_status.get("offline").copied().unwrap_or(0),
            },
        })
    }

    async fn find_association(
        &self,
        device_id: i64,
        user_id: i64,
    ) -> ServiceResult<Option<DeviceUserAssociation>> {
        Ok(sqlx::query_as::<_, DeviceUserAssociation>(
            "SELECT * FROM device_user_associations WHERE device_id = ? AND user_id = ?",
        )
        .bind(device_id)
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?)
    }

    async fn require_device(&self, id: i64) -> ServiceResult<Device> {
        self.get_device(id).await?.ok_or(ServiceError::DeviceNotFound)
    }

    async fn require_user(&self, id: i64) -> ServiceResult<()> {
        let exists: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE id = ?")
            .bind(id)
            .fetch_one(&self.db)
            .await?;
        if exists == 0 {
            return Err(ServiceError::UserNotFound);
        }
        Ok(())
    }
}
