// plantpulse-ingest-core/src/runtime.rs
// Explicitly constructed process state; no global singletons

use std::sync::Arc;

use aws_config::{BehaviorVersion, Region};

use crate::alerts::AlertDispatcher;
use crate::config::IngestConfig;
use crate::core::{IngestCore, IngestCoreDeps};
use crate::data_plane::{DataPlaneSelector, InProcessUsageRecorder, PoolSet};
use crate::detection::{AnomalyDetector, DetectorConfig};
use crate::observability::MetricsSink;
use crate::storage::{ColdStore, HotStore, PostgresHotStore, PostgresWarmStore, S3ColdStore, StorageFanout, WarmStore};
use crate::streaming::{KafkaTransport, MessageTransport, StreamPublisher};
use crate::tasks::BackgroundTasks;
use crate::tenant::{HttpDirectorySource, StaticTenantSource, TenantDirectory, TenantSource};

/// One constructed process runtime. Request handlers receive this value;
/// tests assemble one over in-memory backends.
pub struct Runtime {
    pub config: IngestConfig,
    pub core: Arc<IngestCore>,
    pub metrics: Arc<MetricsSink>,
    pub publisher: Arc<StreamPublisher>,
    pub tasks: Arc<BackgroundTasks>,
    pub pools: Arc<PoolSet>,
    hot: Arc<dyn HotStore>,
    warm: Arc<dyn WarmStore>,
}

impl Runtime {
    /// Production bootstrap: Kafka transport, S3 client, postgres pools,
    /// and one-time schema initialization against the shared stores.
    pub async fn bootstrap(config: IngestConfig) -> anyhow::Result<Self> {
        config.validate().map_err(anyhow::Error::msg)?;

        let source: Arc<dyn TenantSource> = match std::env::var("TENANT_DIRECTORY_URL") {
            Ok(url) => Arc::new(HttpDirectorySource::new(url)),
            Err(_) => {
                log::warn!("runtime: TENANT_DIRECTORY_URL unset, serving the demo tenant directory");
                Arc::new(StaticTenantSource::with_demo_tenants())
            }
        };

        let transport: Arc<dyn MessageTransport> =
            Arc::new(KafkaTransport::new(&config.stream).map_err(anyhow::Error::msg)?);

        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.object_store.region.clone()))
            .load()
            .await;
        let cold: Arc<dyn ColdStore> = Arc::new(S3ColdStore::new(aws_sdk_s3::Client::new(&aws_config)));

        let runtime = Self::assemble(
            config,
            source,
            transport,
            Arc::new(PostgresHotStore),
            Arc::new(PostgresWarmStore),
            cold,
        )?;
        runtime.initialize_stores().await;
        Ok(runtime)
    }

    /// Wire the component graph over the given backends. Tests call this
    /// directly with in-memory stores and a capture transport.
    pub fn assemble(
        config: IngestConfig,
        source: Arc<dyn TenantSource>,
        transport: Arc<dyn MessageTransport>,
        hot: Arc<dyn HotStore>,
        warm: Arc<dyn WarmStore>,
        cold: Arc<dyn ColdStore>,
    ) -> anyhow::Result<Self> {
        let metrics = Arc::new(MetricsSink::new()?);
        let pools = Arc::new(PoolSet::new(&config.hot_store, &config.warm_store)?);
        let usage = Arc::new(InProcessUsageRecorder::new());
        let selector = Arc::new(DataPlaneSelector::new(
            pools.clone(),
            usage.clone(),
            config.object_store.shared_bucket.clone(),
        ));
        let directory = Arc::new(TenantDirectory::new(
            config.server.platform_domain.clone(),
            source,
        ));
        let publisher = Arc::new(StreamPublisher::new(
            transport,
            config.stream.critical_queue_capacity,
            metrics.clone(),
        ));
        let dispatcher = Arc::new(AlertDispatcher::new(
            publisher.clone(),
            metrics.clone(),
            config.alert_routing.dashboard_url.clone(),
        ));
        let fanout = Arc::new(StorageFanout::new(
            hot.clone(),
            warm.clone(),
            cold.clone(),
            metrics.clone(),
        ));
        let tasks = Arc::new(BackgroundTasks::new("storage-fanout", config.max_inflight_fanouts));

        let core = Arc::new(IngestCore::new(IngestCoreDeps {
            directory,
            selector,
            detector: AnomalyDetector::new(DetectorConfig::default()),
            dispatcher,
            fanout,
            publisher: publisher.clone(),
            metrics: metrics.clone(),
            usage,
            tasks: tasks.clone(),
            hot: hot.clone(),
            warm: warm.clone(),
            cold,
        }));

        Ok(Self {
            config,
            core,
            metrics,
            publisher,
            tasks,
            pools,
            hot,
            warm,
        })
    }

    /// One-time schema setup against the shared stores. An unreachable
    /// store at boot is logged, not fatal; writes will keep failing into
    /// the error archive until the store recovers.
    pub async fn initialize_stores(&self) {
        let hot_pool = self.pools.shared_hot("");
        if let Err(e) = self.hot.initialize(&hot_pool).await {
            log::warn!("runtime: hot store initialization failed: {}", e);
        }
        let warm_pool = self.pools.shared_warm("");
        if let Err(e) = self.warm.initialize(&warm_pool).await {
            log::warn!("runtime: warm store initialization failed: {}", e);
        }
    }

    /// Drain detached work, then flush and stop the publisher
    pub async fn shutdown(&self) {
        log::info!(
            "runtime: shutting down, draining {} in-flight fanout tasks",
            self.tasks.inflight()
        );
        self.tasks.drain().await;
        self.publisher.shutdown().await;
    }
}


#[cfg(test)]
mod tests {
    use super::testing::rig_with_tenants;
    use crate::tenant::memory::tenant_fixture;
    use crate::tenant::{DeploymentMode, RequestMeta};

    fn meta_for(tenant_id: &str) -> RequestMeta {
        let mut meta = RequestMeta::default();
        meta.headers
            .insert("x-tenant-id".to_string(), tenant_id.to_string());
        meta.headers
            .insert("x-api-key".to_string(), format!("{}_8f2a9c1d", tenant_id));
        meta
    }

    #[tokio::test]
    async fn assembled_runtime_serves_an_ingest_round_trip() {
        let rig = rig_with_tenants(vec![tenant_fixture("acme-corp", DeploymentMode::Shared)]);
        let body = br#"{
            "equipment_id": "PUMP_001",
            "timestamp": "2025-11-23T10:30:00Z",
            "temperature": 75.5,
            "vibration": 1.2,
            "pressure": 250.8,
            "facility_id": "FAC_CHICAGO_01",
            "line_id": "LINE_A"
        }"#;
        let receipt = rig.runtime.core.ingest(&meta_for("acme-corp"), body).await.unwrap();
        assert_eq!(receipt.equipment_id, "PUMP_001");
        assert_eq!(receipt.anomalies_detected, 0);
        assert_eq!(receipt.alerts_created, 0);
        assert!(receipt.sla_compliant);

        rig.runtime.shutdown().await;
        assert_eq!(rig.hot.len(), 1);
        assert_eq!(rig.warm.len(), 1);
        assert_eq!(rig.cold.keys("plantpulse-telemetry-archive").len(), 1);
        let sent = rig.transport.sent.lock().unwrap();
        assert_eq!(
            sent.iter().filter(|m| m.topic == "sensor-data-acme-corp").count(),
            1
        );
    }
}
