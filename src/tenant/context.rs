// plantpulse-ingest-core/src/tenant/context.rs
// Tenant routing and policy records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::Severity;

/// How a tenant's data-plane resources are provisioned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentMode {
    Isolated,
    Shared,
    Mixed,
}

/// Commercial tier, consulted by the dedicated-pool promotion policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenantTier {
    Basic,
    Professional,
    Enterprise,
}

/// Relational-tier settings for one tenant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantDataConfig {
    /// Present only for isolated deployments
    pub connection_string: Option<String>,
    /// Required true for shared deployments
    pub row_level_security: bool,
    pub max_pool_connections: usize,
}

/// Cold-tier settings for one tenant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantObjectConfig {
    pub dedicated_bucket: Option<String>,
    pub encryption_key_ref: Option<String>,
    pub retention_policy: String,
}

/// Alert routing settings for one tenant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantAlertConfig {
    pub notification_topics: Vec<String>,
    pub webhook_urls: Vec<String>,
    pub escalation_rules: Vec<EscalationRule>,
}

/// Feature flags and quotas for one tenant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantFeatureConfig {
    pub advanced_analytics: bool,
    pub custom_dashboards: bool,
    /// Requests per hour admitted before `TenantDenied`
    pub api_rate_limit: u64,
    pub max_concurrent_users: u32,
}

/// Severity-driven escalation: after `delay_minutes`, notify `channels`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationRule {
    pub severity: Severity,
    pub delay_minutes: u32,
    pub channels: Vec<String>,
}

/// The routing and policy record for one tenant; callers hold read-only
/// views handed out by the directory cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantContext {
    pub tenant_id: String,
    pub display_name: String,
    pub deployment_mode: DeploymentMode,
    pub data_region: String,
    pub tier: TenantTier,
    pub compliance_tags: Vec<String>,
    pub max_equipment: u32,
    pub retention_days: u32,
    pub created_at: DateTime<Utc>,
    pub data: TenantDataConfig,
    pub object: TenantObjectConfig,
    pub alerts: TenantAlertConfig,
    pub features: TenantFeatureConfig,
}

impl TenantContext {
    /// Enforce the deployment-mode invariants before a record enters the
    /// cache: shared tenants ride the pooled stores behind row-level
    /// security, isolated tenants carry their own connection string
    pub fn validate(&self) -> Result<(), String> {
        if self.tenant_id.is_empty() {
            return Err("tenant_id cannot be empty".to_string());
        }
        match self.deployment_mode {
            DeploymentMode::Shared => {
                if self.data.connection_string.is_some() {
                    return Err(format!(
                        "shared tenant {} must not carry a dedicated connection string",
                        self.tenant_id
                    ));
                }
                if !self.data.row_level_security {
                    return Err(format!(
                        "shared tenant {} requires row-level security",
                        self.tenant_id
                    ));
                }
            }
            DeploymentMode::Isolated => {
                if self.data.connection_string.is_none() {
                    return Err(format!(
                        "isolated tenant {} requires a dedicated connection string",
                        self.tenant_id
                    ));
                }
            }
            DeploymentMode::Mixed => {}
        }
        Ok(())
    }

    pub fn is_shared(&self) -> bool {
        self.deployment_mode == DeploymentMode::Shared
    }

    /// Whether a compliance tag restricts this tenant to its home region
    pub fn is_region_restricted(&self) -> bool {
        self.compliance_tags
            .iter()
            .any(|tag| tag == "region-restricted" || tag == "data-residency")
    }

    /// Escalation channels configured for the given severity
    pub fn escalation_channels(&self, severity: Severity) -> Vec<String> {
        self.alerts
            .escalation_rules
            .iter()
            .filter(|rule| rule.severity == severity)
            .flat_map(|rule| rule.channels.iter().cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn shared_tenant(tenant_id: &str) -> TenantContext {
        TenantContext {
            tenant_id: tenant_id.to_string(),
            display_name: "Acme Corp".to_string(),
            deployment_mode: DeploymentMode::Shared,
            data_region: "us-east-1".to_string(),
            tier: TenantTier::Professional,
            compliance_tags: Vec::new(),
            max_equipment: 500,
            retention_days: 30,
            created_at: Utc::now(),
            data: TenantDataConfig {
                connection_string: None,
                row_level_security: true,
                max_pool_connections: 10,
            },
            object: TenantObjectConfig {
                dedicated_bucket: None,
                encryption_key_ref: None,
                retention_policy: "standard-30d".to_string(),
            },
            alerts: TenantAlertConfig {
                notification_topics: vec!["ops-notifications".to_string()],
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
                api_rate_limit: 10_000,
                max_concurrent_users: 50,
            },
        }
    }

    #[test]
    fn shared_tenant_with_connection_string_is_invalid() {
        let mut tenant = shared_tenant("acme-corp");
        assert!(tenant.validate().is_ok());
        tenant.data.connection_string = Some("host=private".to_string());
        assert!(tenant.validate().is_err());
    }

    #[test]
    fn shared_tenant_without_rls_is_invalid() {
        let mut tenant = shared_tenant("acme-corp");
        tenant.data.row_level_security = false;
        assert!(tenant.validate().is_err());
    }

    #[test]
    fn isolated_tenant_requires_connection_string() {
        let mut tenant = shared_tenant("acme-corp");
        tenant.deployment_mode = DeploymentMode::Isolated;
        tenant.data.row_level_security = false;
        assert!(tenant.validate().is_err());
        tenant.data.connection_string = Some("host=dedicated".to_string());
        assert!(tenant.validate().is_ok());
    }

    #[test]
    fn escalation_channels_filter_by_severity() {
        let tenant = shared_tenant("acme-corp");
        assert_eq!(tenant.escalation_channels(Severity::Critical), vec!["pagerduty"]);
        assert!(tenant.escalation_channels(Severity::High).is_empty());
    }
}
