// plantpulse-ingest-core/src/storage/fanout.rs
// Concurrent three-tier persistence, detached from the request path

use std::sync::Arc;
use std::time::Instant;

use crate::data_plane::DataPlane;
use crate::models::{FanoutOutcome, SensorReading};
use crate::observability::MetricsSink;
use crate::storage::{ColdStore, HotStore, WarmStore};
use crate::tenant::TenantContext;

/// Fans one reading out to the hot, warm, and cold tiers.
///
/// Tiers run concurrently and fail independently; any failure additionally
/// archives the raw reading to the cold-tier error location. The fan-out
/// never raises to its caller.
pub struct StorageFanout {
    hot: Arc<dyn HotStore>,
    warm: Arc<dyn WarmStore>,
    cold: Arc<dyn ColdStore>,
    metrics: Arc<MetricsSink>,
}

impl StorageFanout {
    pub fn new(
        hot: Arc<dyn HotStore>,
        warm: Arc<dyn WarmStore>,
        cold: Arc<dyn ColdStore>,
        metrics: Arc<MetricsSink>,
    ) -> Self {
        Self {
            hot,
            warm,
            cold,
            metrics,
        }
    }

    pub async fn store(
        &self,
        reading: &SensorReading,
        plane: &DataPlane,
        tenant: &TenantContext,
        request_id: &str,
    ) -> FanoutOutcome {
        let started = Instant::now();
        let (hot_result, warm_result, cold_result) = tokio::join!(
            self.hot.upsert_reading(&plane.hot, tenant, reading),
            self.warm.upsert_status(&plane.warm, tenant, reading),
            self.cold.archive_reading(&plane.object_target, tenant, reading),
        );

        if let Err(e) = &hot_result {
            log::warn!(
                "fanout: hot tier failed request_id={} tenant={} equipment={}: {}",
                request_id,
                tenant.tenant_id,
                reading.equipment_id,
                e
            );
        }
        if let Err(e) = &warm_result {
            log::warn!(
                "fanout: warm tier failed request_id={} tenant={} equipment={}: {}",
                request_id,
                tenant.tenant_id,
                reading.equipment_id,
                e
            );
        }
        if let Err(e) = &cold_result {
            log::warn!(
                "fanout: cold tier failed request_id={} tenant={} equipment={}: {}",
                request_id,
                tenant.tenant_id,
                reading.equipment_id,
                e
            );
        }

        let any_failed =
            hot_result.is_err() || warm_result.is_err() || cold_result.is_err();
        let error_archived = if any_failed {
            match self
                .cold
                .archive_error(&plane.object_target, tenant, reading)
                .await
            {
                Ok(key) => {
                    log::info!(
                        "fanout: archived failed reading request_id={} key={}",
                        request_id,
                        key
                    );
                    true
                }
                Err(e) => {
                    log::error!(
                        "fanout: error archive failed request_id={} tenant={}: {}",
                        request_id,
                        tenant.tenant_id,
                        e
                    );
                    false
                }
            }
        } else {
            false
        };

        let outcome = FanoutOutcome {
            hot_ok: hot_result.is_ok(),
            warm_ok: warm_result.is_ok(),
            cold_ok: cold_result.is_ok(),
            error_archived,
            latency_ms: started.elapsed().as_millis() as u64,
        };
        self.metrics.record_fanout(&outcome);
        outcome
    }
}
