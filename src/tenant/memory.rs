// plantpulse-ingest-core/src/tenant/memory.rs
// In-memory tenant source for development bootstrap and tests

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;

use crate::errors::IngestResult;
use crate::models::Severity;
use crate::tenant::context::{
    DeploymentMode, EscalationRule, TenantAlertConfig, TenantContext, TenantDataConfig,
    TenantFeatureConfig, TenantObjectConfig, TenantTier,
};
use crate::tenant::directory::TenantSource;

/// Tenant source backed by a fixed in-memory map; stands in for the
/// external directory in development mode and in tests
pub struct StaticTenantSource {
    tenants: HashMap<String, TenantContext>,
}

impl StaticTenantSource {
    pub fn with_tenants(tenants: Vec<TenantContext>) -> Self {
        Self {
            tenants: tenants
                .into_iter()
                .map(|t| (t.tenant_id.clone(), t))
                .collect(),
        }
    }

    /// Development seed: one shared and one isolated tenant
    pub fn with_demo_tenants() -> Self {
        let mut isolated = tenant_fixture("titan-steel", DeploymentMode::Isolated);
        isolated.tier = TenantTier::Enterprise;
        Self::with_tenants(vec![
            tenant_fixture("acme-corp", DeploymentMode::Shared),
            isolated,
        ])
    }
}

#[async_trait]
impl TenantSource for StaticTenantSource {
    async fn load(&self, tenant_id: &str) -> IngestResult<Option<TenantContext>> {
        Ok(self.tenants.get(tenant_id).cloned())
    }
}

/// Well-formed tenant record for the given deployment mode
pub fn tenant_fixture(tenant_id: &str, deployment_mode: DeploymentMode) -> TenantContext {
    let isolated = deployment_mode == DeploymentMode::Isolated;
    TenantContext {
        tenant_id: tenant_id.to_string(),
        display_name: tenant_id.replace('-', " "),
        deployment_mode,
        data_region: "us-east-1".to_string(),
        tier: TenantTier::Professional,
        compliance_tags: Vec::new(),
        max_equipment: 500,
        retention_days: 30,
        created_at: Utc::now(),
        data: TenantDataConfig {
            connection_string: isolated
                .then(|| format!("host=db-{} port=5432 dbname=plantpulse_hot user=plantpulse", tenant_id)),
            row_level_security: !isolated,
            max_pool_connections: 10,
        },
        object: TenantObjectConfig {
            dedicated_bucket: isolated.then(|| format!("plantpulse-{}-archive", tenant_id)),
            encryption_key_ref: None,
            retention_policy: "standard-30d".to_string(),
        },
        alerts: TenantAlertConfig {
            notification_topics: vec![format!("{}-ops-alerts", tenant_id)],
            webhook_urls: Vec::new(),
            escalation_rules: vec![EscalationRule {
                severity: Severity::Critical,
                delay_minutes: 0,
                channels: vec!["pagerduty".to_string()],
            }],
        },
        features: TenantFeatureConfig {
            advanced_analytics: false,
            custom_dashboards: false,
            api_rate_limit: 100_000,
            max_concurrent_users: 50,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn demo_tenants_pass_validation() {
        let source = StaticTenantSource::with_demo_tenants();
        let shared = source.load("acme-corp").await.unwrap().unwrap();
        assert!(shared.validate().is_ok());
        assert!(shared.is_shared());

        let isolated = source.load("titan-steel").await.unwrap().unwrap();
        assert!(isolated.validate().is_ok());
        assert_eq!(isolated.deployment_mode, DeploymentMode::Isolated);
        assert!(isolated.data.connection_string.is_some());
    }
}
