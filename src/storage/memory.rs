// plantpulse-ingest-core/src/storage/memory.rs
// In-memory tier implementations for tests and local development

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::data_plane::{ObjectTarget, TenantPool};
use crate::errors::{StoreError, StoreResult};
use crate::models::{EquipmentStatus, SensorReading};
use crate::storage::cold::{archive_key, error_key, key_matches};
use crate::storage::{ColdStore, HotStore, WarmStore};
use crate::tenant::TenantContext;

/// Hot tier over a map keyed like the relational primary key
#[derive(Default)]
pub struct MemoryHotStore {
    rows: DashMap<(String, String, DateTime<Utc>), SensorReading>,
    pub fail: bool,
}

impl MemoryHotStore {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows stored for one tenant, for test assertions
    pub fn rows_for_tenant(&self, tenant_id: &str) -> Vec<SensorReading> {
        self.rows
            .iter()
            .filter(|entry| entry.key().0 == tenant_id)
            .map(|entry| entry.value().clone())
            .collect()
    }
}

#[async_trait]
impl HotStore for MemoryHotStore {
    async fn initialize(&self, _pool: &TenantPool) -> StoreResult<()> {
        Ok(())
    }

    async fn upsert_reading(
        &self,
        _pool: &TenantPool,
        tenant: &TenantContext,
        reading: &SensorReading,
    ) -> StoreResult<()> {
        if self.fail {
            return Err(StoreError::Connection("hot tier unavailable".to_string()));
        }
        self.rows.insert(
            (
                tenant.tenant_id.clone(),
                reading.equipment_id.clone(),
                reading.timestamp,
            ),
            reading.clone(),
        );
        Ok(())
    }

    async fn recent_readings(
        &self,
        _pool: &TenantPool,
        tenant: &TenantContext,
        equipment_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<Vec<SensorReading>> {
        if self.fail {
            return Err(StoreError::Connection("hot tier unavailable".to_string()));
        }
        let mut readings: Vec<SensorReading> = self
            .rows
            .iter()
            .filter(|entry| {
                let (tenant_id, eq, time) = entry.key();
                tenant_id == &tenant.tenant_id
                    && eq == equipment_id
                    && *time >= start
                    && *time <= end
            })
            .map(|entry| entry.value().clone())
            .collect();
        readings.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        readings.truncate(limit as usize);
        Ok(readings)
    }
}

/// Warm tier over a per-equipment map
#[derive(Default)]
pub struct MemoryWarmStore {
    rows: DashMap<String, (String, EquipmentStatus)>,
    pub fail: bool,
}

impl MemoryWarmStore {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[async_trait]
impl WarmStore for MemoryWarmStore {
    async fn initialize(&self, _pool: &TenantPool) -> StoreResult<()> {
        Ok(())
    }

    async fn upsert_status(
        &self,
        _pool: &TenantPool,
        tenant: &TenantContext,
        reading: &SensorReading,
    ) -> StoreResult<()> {
        if self.fail {
            return Err(StoreError::Connection("warm tier unavailable".to_string()));
        }
        let status = EquipmentStatus {
            equipment_id: reading.equipment_id.clone(),
            last_seen: reading.timestamp,
            current_temperature: reading.temperature,
            current_vibration: reading.vibration,
            current_pressure: reading.pressure,
            status: if reading.has_anomalies.unwrap_or(false) {
                "anomalous".to_string()
            } else {
                "online".to_string()
            },
            facility_id: reading.facility_id.clone(),
            line_id: reading.line_id.clone(),
            updated_at: Utc::now(),
        };
        self.rows.insert(
            reading.equipment_id.clone(),
            (tenant.tenant_id.clone(), status),
        );
        Ok(())
    }

    async fn get_status(
        &self,
        _pool: &TenantPool,
        tenant: &TenantContext,
        equipment_id: &str,
    ) -> StoreResult<Option<EquipmentStatus>> {
        if self.fail {
            return Err(StoreError::Connection("warm tier unavailable".to_string()));
        }
        Ok(self
            .rows
            .get(equipment_id)
            .filter(|entry| entry.value().0 == tenant.tenant_id)
            .map(|entry| entry.value().1.clone()))
    }

    async fn list_status(
        &self,
        _pool: &TenantPool,
        tenant: &TenantContext,
    ) -> StoreResult<Vec<EquipmentStatus>> {
        if self.fail {
            return Err(StoreError::Connection("warm tier unavailable".to_string()));
        }
        let mut statuses: Vec<EquipmentStatus> = self
            .rows
            .iter()
            .filter(|entry| entry.value().0 == tenant.tenant_id)
            .map(|entry| entry.value().1.clone())
            .collect();
        statuses.sort_by(|a, b| a.equipment_id.cmp(&b.equipment_id));
        Ok(statuses)
    }
}

/// Cold tier over a (bucket, key) -> body map
#[derive(Default)]
pub struct MemoryColdStore {
    objects: DashMap<(String, String), Vec<u8>>,
    pub fail: bool,
}

impl MemoryColdStore {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn keys(&self, bucket: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .objects
            .iter()
            .filter(|entry| entry.key().0 == bucket)
            .map(|entry| entry.key().1.clone())
            .collect();
        keys.sort();
        keys
    }

    pub fn body(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.objects
            .get(&(bucket.to_string(), key.to_string()))
            .map(|entry| entry.value().clone())
    }
}

#[async_trait]
impl ColdStore for MemoryColdStore {
    async fn archive_reading(
        &self,
        target: &ObjectTarget,
        tenant: &TenantContext,
        reading: &SensorReading,
    ) -> StoreResult<String> {
        if self.fail {
            return Err(StoreError::Connection("cold tier unavailable".to_string()));
        }
        let key = archive_key(target, reading);
        let body = serde_json::json!({
            "reading": reading,
            "tenant_id": tenant.tenant_id,
            "archived_at": Utc::now(),
        });
        self.objects.insert(
            (target.bucket.clone(), key.clone()),
            serde_json::to_vec(&body).map_err(|e| StoreError::Serialization(e.to_string()))?,
        );
        Ok(key)
    }

    async fn archive_error(
        &self,
        target: &ObjectTarget,
        tenant: &TenantContext,
        reading: &SensorReading,
    ) -> StoreResult<String> {
        let key = error_key(target, reading, Utc::now());
        let body = serde_json::json!({
            "reading": reading,
            "tenant_id": tenant.tenant_id,
            "archived_at": Utc::now(),
            "processing_failed": true,
        });
        self.objects.insert(
            (target.bucket.clone(), key.clone()),
            serde_json::to_vec(&body).map_err(|e| StoreError::Serialization(e.to_string()))?,
        );
        Ok(key)
    }

    async fn list_keys(
        &self,
        target: &ObjectTarget,
        equipment_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<String>> {
        if self.fail {
            return Err(StoreError::Connection("cold tier unavailable".to_string()));
        }
        let mut keys: Vec<String> = self
            .objects
            .iter()
            .filter(|entry| entry.key().0 == target.bucket)
            .map(|entry| entry.key().1.clone())
            .filter(|key| key_matches(target, key, equipment_id, start, end))
            .collect();
        keys.sort();
        keys.truncate(limit);
        Ok(keys)
    }
}
