// plantpulse-ingest-core/src/storage/mod.rs
// Three-tier persistence: hot time-series, warm snapshots, cold archive

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::data_plane::{ObjectTarget, TenantPool};
use crate::errors::StoreResult;
use crate::models::{EquipmentStatus, SensorReading};
use crate::tenant::TenantContext;

pub mod cold;
pub mod fanout;
pub mod hot;
pub mod memory;
pub mod warm;

pub use cold::S3ColdStore;
pub use fanout::StorageFanout;
pub use hot::PostgresHotStore;
pub use warm::PostgresWarmStore;

/// Time-series tier: short-retention raw readings
#[async_trait]
pub trait HotStore: Send + Sync {
    /// One-time schema setup against the shared store; dedicated stores
    /// are provisioned by tenant onboarding, which is out of scope here
    async fn initialize(&self, pool: &TenantPool) -> StoreResult<()>;

    async fn upsert_reading(
        &self,
        pool: &TenantPool,
        tenant: &TenantContext,
        reading: &SensorReading,
    ) -> StoreResult<()>;

    /// Readings for one equipment in a window, newest first, capped
    async fn recent_readings(
        &self,
        pool: &TenantPool,
        tenant: &TenantContext,
        equipment_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<Vec<SensorReading>>;
}

/// Relational tier: one current-state row per equipment
#[async_trait]
pub trait WarmStore: Send + Sync {
    async fn initialize(&self, pool: &TenantPool) -> StoreResult<()>;

    async fn upsert_status(
        &self,
        pool: &TenantPool,
        tenant: &TenantContext,
        reading: &SensorReading,
    ) -> StoreResult<()>;

    async fn get_status(
        &self,
        pool: &TenantPool,
        tenant: &TenantContext,
        equipment_id: &str,
    ) -> StoreResult<Option<EquipmentStatus>>;

    async fn list_status(
        &self,
        pool: &TenantPool,
        tenant: &TenantContext,
    ) -> StoreResult<Vec<EquipmentStatus>>;
}

/// Object tier: append-only raw readings at date-partitioned keys
#[async_trait]
pub trait ColdStore: Send + Sync {
    /// Archive one reading; returns the object key written
    async fn archive_reading(
        &self,
        target: &ObjectTarget,
        tenant: &TenantContext,
        reading: &SensorReading,
    ) -> StoreResult<String>;

    /// Write the raw reading to the error location after a tier failure
    async fn archive_error(
        &self,
        target: &ObjectTarget,
        tenant: &TenantContext,
        reading: &SensorReading,
    ) -> StoreResult<String>;

    /// Keys for one equipment over a date range; keys only, no bodies
    async fn list_keys(
        &self,
        target: &ObjectTarget,
        equipment_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<String>>;
}
