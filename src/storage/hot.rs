// plantpulse-ingest-core/src/storage/hot.rs
// Hot tier: time-partitioned raw readings on PostgreSQL/TimescaleDB

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::data_plane::TenantPool;
use crate::errors::{StoreError, StoreResult};
use crate::models::SensorReading;
use crate::storage::HotStore;
use crate::tenant::TenantContext;

/// Hot-tier store over the pool handle selected for the request.
///
/// Rows always carry the tenant id and queries always filter on it; in
/// shared mode the session variable set by the pool wrapper lets
/// row-level security enforce the same boundary server-side.
pub struct PostgresHotStore;

const CREATE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS sensor_data_raw (
        time TIMESTAMPTZ NOT NULL,
        equipment_id TEXT NOT NULL,
        tenant_id TEXT NOT NULL,
        temperature DOUBLE PRECISION,
        vibration DOUBLE PRECISION,
        pressure DOUBLE PRECISION,
        power_consumption DOUBLE PRECISION,
        custom_metrics JSONB,
        facility_id TEXT,
        line_id TEXT,
        ingestion_timestamp TIMESTAMPTZ,
        source TEXT,
        has_anomalies BOOLEAN NOT NULL DEFAULT FALSE,
        data_hash TEXT NOT NULL,
        PRIMARY KEY (time, equipment_id, tenant_id)
    )
"#;

const CREATE_HYPERTABLE: &str = r#"
    SELECT create_hypertable('sensor_data_raw', 'time',
        chunk_time_interval => INTERVAL '1 hour', if_not_exists => TRUE)
"#;

const ADD_RETENTION: &str = r#"
    SELECT add_retention_policy('sensor_data_raw', INTERVAL '30 days', if_not_exists => TRUE)
"#;

const UPSERT_READING: &str = r#"
    INSERT INTO sensor_data_raw (
        time, equipment_id, tenant_id, temperature, vibration, pressure,
        power_consumption, custom_metrics, facility_id, line_id,
        ingestion_timestamp, source, has_anomalies, data_hash
    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
    ON CONFLICT (time, equipment_id, tenant_id) DO UPDATE SET
        temperature = EXCLUDED.temperature,
        vibration = EXCLUDED.vibration,
        pressure = EXCLUDED.pressure,
        power_consumption = EXCLUDED.power_consumption,
        custom_metrics = EXCLUDED.custom_metrics,
        facility_id = EXCLUDED.facility_id,
        line_id = EXCLUDED.line_id,
        ingestion_timestamp = EXCLUDED.ingestion_timestamp,
        source = EXCLUDED.source,
        has_anomalies = EXCLUDED.has_anomalies,
        data_hash = EXCLUDED.data_hash
"#;

const SELECT_RECENT: &str = r#"
    SELECT time, equipment_id, temperature, vibration, pressure,
           power_consumption, custom_metrics, facility_id, line_id,
           ingestion_timestamp, source, has_anomalies
    FROM sensor_data_raw
    WHERE tenant_id = $1 AND equipment_id = $2 AND time >= $3 AND time <= $4
    ORDER BY time DESC
    LIMIT $5
"#;

#[async_trait]
impl HotStore for PostgresHotStore {
    async fn initialize(&self, pool: &TenantPool) -> StoreResult<()> {
        let conn = pool.acquire().await?;
        conn.batch_execute(CREATE_TABLE)
            .await
            .map_err(|e| StoreError::Query(format!("hot schema setup: {}", e)))?;

        // Partitioning and retention need the timescaledb extension;
        // absence is survivable in development environments
        if let Err(e) = conn.execute(CREATE_HYPERTABLE, &[]).await {
            log::warn!("hot store: hypertable setup skipped: {}", e);
        }
        if let Err(e) = conn.execute(ADD_RETENTION, &[]).await {
            log::warn!("hot store: retention policy skipped: {}", e);
        }
        Ok(())
    }

    async fn upsert_reading(
        &self,
        pool: &TenantPool,
        tenant: &TenantContext,
        reading: &SensorReading,
    ) -> StoreResult<()> {
        let conn = pool.acquire().await?;
        let custom_metrics = if reading.custom_metrics.is_empty() {
            None
        } else {
            Some(
                serde_json::to_value(&reading.custom_metrics)
                    .map_err(|e| StoreError::Serialization(e.to_string()))?,
            )
        };
        conn.execute(
            UPSERT_READING,
            &[
                &reading.timestamp,
                &reading.equipment_id,
                &tenant.tenant_id,
                &reading.temperature,
                &reading.vibration,
                &reading.pressure,
                &reading.power_consumption,
                &custom_metrics,
                &reading.facility_id,
                &reading.line_id,
                &reading.ingestion_timestamp,
                &reading.source,
                &reading.has_anomalies.unwrap_or(false),
                &reading.content_hash(),
            ],
        )
        .await
        .map_err(|e| StoreError::Query(format!("hot upsert: {}", e)))?;
        Ok(())
    }

    async fn recent_readings(
        &self,
        pool: &TenantPool,
        tenant: &TenantContext,
        equipment_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<Vec<SensorReading>> {
        let conn = pool.acquire().await?;
        let rows = conn
            .query(
                SELECT_RECENT,
                &[&tenant.tenant_id, &equipment_id, &start, &end, &limit],
            )
            .await
            .map_err(|e| StoreError::Query(format!("hot select: {}", e)))?;

        rows.iter()
            .map(|row| {
                let custom_metrics: Option<serde_json::Value> = row.get(6);
                let custom_metrics = match custom_metrics {
                    Some(value) => serde_json::from_value(value)
                        .map_err(|e| StoreError::Serialization(e.to_string()))?,
                    None => Default::default(),
                };
                Ok(SensorReading {
                    timestamp: row.get(0),
                    equipment_id: row.get(1),
                    temperature: row.get(2),
                    vibration: row.get(3),
                    pressure: row.get(4),
                    power_consumption: row.get(5),
                    custom_metrics,
                    facility_id: row.get(7),
                    line_id: row.get(8),
                    ingestion_timestamp: row.get(9),
                    source: row.get(10),
                    has_anomalies: Some(row.get(11)),
                    anomalies: Vec::new(),
                })
            })
            .collect()
    }
}
