// plantpulse-ingest-core/src/storage/warm.rs
// Warm tier: per-equipment current-state snapshots on PostgreSQL

use async_trait::async_trait;
use chrono::Utc;
use tokio_postgres::Row;

use crate::data_plane::TenantPool;
use crate::errors::{StoreError, StoreResult};
use crate::models::{EquipmentStatus, SensorReading};
use crate::storage::WarmStore;
use crate::tenant::TenantContext;

pub struct PostgresWarmStore;

const CREATE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS equipment_status (
        equipment_id TEXT PRIMARY KEY,
        tenant_id TEXT NOT NULL,
        last_seen TIMESTAMPTZ NOT NULL,
        current_temperature DOUBLE PRECISION,
        current_vibration DOUBLE PRECISION,
        current_pressure DOUBLE PRECISION,
        status TEXT NOT NULL,
        facility_id TEXT,
        line_id TEXT,
        updated_at TIMESTAMPTZ NOT NULL
    )
"#;

const UPSERT_STATUS: &str = r#"
    INSERT INTO equipment_status (
        equipment_id, tenant_id, last_seen, current_temperature,
        current_vibration, current_pressure, status, facility_id, line_id,
        updated_at
    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
    ON CONFLICT (equipment_id) DO UPDATE SET
        tenant_id = EXCLUDED.tenant_id,
        last_seen = EXCLUDED.last_seen,
        current_temperature = EXCLUDED.current_temperature,
        current_vibration = EXCLUDED.current_vibration,
        current_pressure = EXCLUDED.current_pressure,
        status = EXCLUDED.status,
        facility_id = EXCLUDED.facility_id,
        line_id = EXCLUDED.line_id,
        updated_at = EXCLUDED.updated_at
"#;

const SELECT_STATUS: &str = r#"
    SELECT equipment_id, last_seen, current_temperature, current_vibration,
           current_pressure, status, facility_id, line_id, updated_at
    FROM equipment_status
    WHERE tenant_id = $1 AND equipment_id = $2
"#;

const SELECT_ALL_STATUS: &str = r#"
    SELECT equipment_id, last_seen, current_temperature, current_vibration,
           current_pressure, status, facility_id, line_id, updated_at
    FROM equipment_status
    WHERE tenant_id = $1
    ORDER BY equipment_id
"#;

fn status_from_row(row: &Row) -> EquipmentStatus {
    EquipmentStatus {
        equipment_id: row.get(0),
        last_seen: row.get(1),
        current_temperature: row.get(2),
        current_vibration: row.get(3),
        current_pressure: row.get(4),
        status: row.get(5),
        facility_id: row.get(6),
        line_id: row.get(7),
        updated_at: row.get(8),
    }
}

#[async_trait]
impl WarmStore for PostgresWarmStore {
    async fn initialize(&self, pool: &TenantPool) -> StoreResult<()> {
        let conn = pool.acquire().await?;
        conn.batch_execute(CREATE_TABLE)
            .await
            .map_err(|e| StoreError::Query(format!("warm schema setup: {}", e)))?;
        Ok(())
    }

    async fn upsert_status(
        &self,
        pool: &TenantPool,
        tenant: &TenantContext,
        reading: &SensorReading,
    ) -> StoreResult<()> {
        let conn = pool.acquire().await?;
        let status = if reading.has_anomalies.unwrap_or(false) {
            "anomalous"
        } else {
            "online"
        };
        conn.execute(
            UPSERT_STATUS,
            &[
                &reading.equipment_id,
                &tenant.tenant_id,
                &reading.timestamp,
                &reading.temperature,
                &reading.vibration,
                &reading.pressure,
                &status,
                &reading.facility_id,
                &reading.line_id,
                &Utc::now(),
            ],
        )
        .await
        .map_err(|e| StoreError::Query(format!("warm upsert: {}", e)))?;
        Ok(())
    }

    async fn get_status(
        &self,
        pool: &TenantPool,
        tenant: &TenantContext,
        equipment_id: &str,
    ) -> StoreResult<Option<EquipmentStatus>> {
        let conn = pool.acquire().await?;
        let row = conn
            .query_opt(SELECT_STATUS, &[&tenant.tenant_id, &equipment_id])
            .await
            .map_err(|e| StoreError::Query(format!("warm select: {}", e)))?;
        Ok(row.as_ref().map(status_from_row))
    }

    async fn list_status(
        &self,
        pool: &TenantPool,
        tenant: &TenantContext,
    ) -> StoreResult<Vec<EquipmentStatus>> {
        let conn = pool.acquire().await?;
        let rows = conn
            .query(SELECT_ALL_STATUS, &[&tenant.tenant_id])
            .await
            .map_err(|e| StoreError::Query(format!("warm list: {}", e)))?;
        Ok(rows.iter().map(status_from_row).collect())
    }
}
