// plantpulse-ingest-core/src/data_plane/selector.rs
// Maps a tenant context to the concrete data-plane resources a request uses

use std::sync::Arc;

use crate::data_plane::pools::{PoolSet, TenantPool};
use crate::data_plane::usage::UsageStats;
use crate::errors::StoreResult;
use crate::tenant::{TenantContext, TenantTier};

/// Promotion thresholds for the dedicated hot pool
const PROMOTION_DAILY_VOLUME_GB: f64 = 100.0;
const PROMOTION_QUERIES_PER_SEC: f64 = 50.0;
const PROMOTION_SLA_VIOLATIONS: u32 = 5;

/// Platform-wide priority topic; critical alerts for every tenant land here
pub const PRIORITY_ALERT_TOPIC: &str = "manufacturing-alerts-priority";
/// Cross-tenant topic attached only in shared deployment mode
pub const SHARED_TOPIC: &str = "manufacturing-shared";

/// Stream topics selected for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamTopics {
    pub sensor_data: String,
    pub alerts: String,
    pub priority_alerts: String,
    pub shared: Option<String>,
}

/// Cold-tier location for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectTarget {
    pub bucket: String,
    pub prefix: String,
}

impl ObjectTarget {
    /// Full object key under this target's prefix
    pub fn key(&self, suffix: &str) -> String {
        format!("{}{}", self.prefix, suffix)
    }
}

/// Tenant notification fan-out endpoints
#[derive(Debug, Clone)]
pub struct AlertSinks {
    pub notification_topics: Vec<String>,
    pub webhook_urls: Vec<String>,
}

/// The concrete resources one request operates on
#[derive(Clone)]
pub struct DataPlane {
    pub hot: TenantPool,
    pub warm: TenantPool,
    pub object_target: ObjectTarget,
    pub topics: StreamTopics,
    pub sinks: AlertSinks,
}

/// Selects per-request data-plane resources from tenant identity
pub struct DataPlaneSelector {
    pools: Arc<PoolSet>,
    usage: Arc<dyn UsageStats>,
    shared_bucket: String,
}

impl DataPlaneSelector {
    pub fn new(pools: Arc<PoolSet>, usage: Arc<dyn UsageStats>, shared_bucket: impl Into<String>) -> Self {
        Self {
            pools,
            usage,
            shared_bucket: shared_bucket.into(),
        }
    }

    /// Resolve the data plane for one tenant
    pub fn select(&self, context: &TenantContext) -> StoreResult<DataPlane> {
        let hot = if !context.is_shared() && self.should_promote(context) {
            self.pools.dedicated_hot(context)?
        } else {
            self.pools.shared_hot(&context.tenant_id)
        };
        // Warm data is low-volume transactional state; it stays on the
        // shared pool for every deployment mode
        let warm = self.pools.shared_warm(&context.tenant_id);

        Ok(DataPlane {
            hot,
            warm,
            object_target: self.object_target(context),
            topics: Self::stream_topics(context),
            sinks: AlertSinks {
                notification_topics: context.alerts.notification_topics.clone(),
                webhook_urls: context.alerts.webhook_urls.clone(),
            },
        })
    }

    /// An isolated tenant gets a dedicated hot pool once its usage or its
    /// tier justifies the cost
    fn should_promote(&self, context: &TenantContext) -> bool {
        if context.tier == TenantTier::Enterprise {
            return true;
        }
        let usage = self.usage.snapshot(&context.tenant_id);
        usage.daily_volume_gb > PROMOTION_DAILY_VOLUME_GB
            || usage.avg_queries_per_sec > PROMOTION_QUERIES_PER_SEC
            || usage.recent_sla_violations > PROMOTION_SLA_VIOLATIONS
    }

    fn object_target(&self, context: &TenantContext) -> ObjectTarget {
        match context.object.dedicated_bucket.as_ref().filter(|_| !context.is_shared()) {
            Some(bucket) => ObjectTarget {
                bucket: bucket.clone(),
                prefix: String::new(),
            },
            None => ObjectTarget {
                bucket: self.shared_bucket.clone(),
                prefix: format!("tenants/{}/", context.tenant_id),
            },
        }
    }

    fn stream_topics(context: &TenantContext) -> StreamTopics {
        StreamTopics {
            sensor_data: format!("sensor-data-{}", context.tenant_id),
            alerts: format!("alerts-{}", context.tenant_id),
            priority_alerts: PRIORITY_ALERT_TOPIC.to_string(),
            shared: context.is_shared().then(|| SHARED_TOPIC.to_string()),
        }
    }
}
