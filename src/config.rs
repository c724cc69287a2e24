// plantpulse-ingest-core/src/config.rs
// Process configuration, loaded from the environment at startup

use std::env;

use serde::{Deserialize, Serialize};

/// Connectivity for one relational tier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
    pub max_connections: usize,
    pub acquire_timeout_ms: u64,
}

impl StoreConfig {
    fn from_env(prefix: &str, defaults: StoreConfig) -> Self {
        let var = |suffix: &str| env::var(format!("{}_{}", prefix, suffix)).ok();
        Self {
            host: var("HOST").unwrap_or(defaults.host),
            port: var("PORT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.port),
            database: var("DB").unwrap_or(defaults.database),
            user: var("USER").unwrap_or(defaults.user),
            password: var("PASSWORD").unwrap_or(defaults.password),
            max_connections: defaults.max_connections,
            acquire_timeout_ms: defaults.acquire_timeout_ms,
        }
    }
}

/// Cold-tier object store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectStoreConfig {
    pub region: String,
    pub shared_bucket: String,
}

/// Stream bus settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    pub brokers: String,
    /// TLS is required outside development environments
    pub require_tls: bool,
    /// Bound on the fire-and-forget critical alert queue
    pub critical_queue_capacity: usize,
}

/// Alert routing settings shared by all tenants
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRoutingConfig {
    pub priority_topic_identifier: String,
    pub dashboard_url: String,
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind_address: String,
    /// Platform domain used for subdomain tenant resolution
    pub platform_domain: String,
}

/// Top-level process configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    pub environment: String,
    pub hot_store: StoreConfig,
    pub warm_store: StoreConfig,
    pub object_store: ObjectStoreConfig,
    pub stream: StreamConfig,
    pub alert_routing: AlertRoutingConfig,
    pub server: ServerConfig,
    /// Cap on concurrently running background fan-out tasks
    pub max_inflight_fanouts: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            hot_store: StoreConfig {
                host: "localhost".to_string(),
                port: 5432,
                database: "plantpulse_hot".to_string(),
                user: "plantpulse".to_string(),
                password: "".to_string(),
                max_connections: 30,
                acquire_timeout_ms: 1000,
            },
            warm_store: StoreConfig {
                host: "localhost".to_string(),
                port: 5432,
                database: "plantpulse_warm".to_string(),
                user: "plantpulse".to_string(),
                password: "".to_string(),
                max_connections: 20,
                acquire_timeout_ms: 2000,
            },
            object_store: ObjectStoreConfig {
                region: "us-east-1".to_string(),
                shared_bucket: "plantpulse-telemetry-archive".to_string(),
            },
            stream: StreamConfig {
                brokers: "localhost:9092".to_string(),
                require_tls: false,
                critical_queue_capacity: 1024,
            },
            alert_routing: AlertRoutingConfig {
                priority_topic_identifier: "manufacturing-alerts-priority".to_string(),
                dashboard_url: "http://localhost:3000".to_string(),
            },
            server: ServerConfig {
                bind_address: "0.0.0.0:8080".to_string(),
                platform_domain: "plantpulse".to_string(),
            },
            max_inflight_fanouts: 256,
        }
    }
}

impl IngestConfig {
    /// Load configuration from the environment, falling back to defaults
    /// for anything unset
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let environment = env::var("ENVIRONMENT").unwrap_or(defaults.environment);
        Self {
            hot_store: StoreConfig::from_env("HOT_STORE", defaults.hot_store),
            warm_store: StoreConfig::from_env("WARM_STORE", defaults.warm_store),
            object_store: ObjectStoreConfig {
                region: env::var("REGION").unwrap_or(defaults.object_store.region),
                shared_bucket: env::var("SHARED_OBJECT_BUCKET")
                    .unwrap_or(defaults.object_store.shared_bucket),
            },
            stream: StreamConfig {
                brokers: env::var("STREAM_BROKERS").unwrap_or(defaults.stream.brokers),
                require_tls: environment != "development" && environment != "test",
                critical_queue_capacity: defaults.stream.critical_queue_capacity,
            },
            alert_routing: AlertRoutingConfig {
                priority_topic_identifier: env::var("PRIORITY_ALERT_TOPIC_IDENTIFIER")
                    .unwrap_or(defaults.alert_routing.priority_topic_identifier),
                dashboard_url: env::var("DASHBOARD_URL")
                    .unwrap_or(defaults.alert_routing.dashboard_url),
            },
            server: ServerConfig {
                bind_address: env::var("BIND_ADDRESS").unwrap_or(defaults.server.bind_address),
                platform_domain: env::var("PLATFORM_DOMAIN")
                    .unwrap_or(defaults.server.platform_domain),
            },
            max_inflight_fanouts: defaults.max_inflight_fanouts,
            environment,
        }
    }

    /// Connection string for the shared hot-tier pool; the
    /// `SHARED_CONNECTION_STRING` variable overrides the assembled form
    pub fn shared_hot_connection_string(&self) -> String {
        env::var("SHARED_CONNECTION_STRING").unwrap_or_else(|_| self.hot_store.connection_string())
    }

    /// Reject configurations that cannot run
    pub fn validate(&self) -> Result<(), String> {
        if self.hot_store.host.is_empty() {
            return Err("hot store host cannot be empty".to_string());
        }
        if self.warm_store.host.is_empty() {
            return Err("warm store host cannot be empty".to_string());
        }
        if self.object_store.shared_bucket.is_empty() {
            return Err("shared object bucket cannot be empty".to_string());
        }
        if self.stream.brokers.is_empty() {
            return Err("stream brokers cannot be empty".to_string());
        }
        if self.max_inflight_fanouts == 0 {
            return Err("max_inflight_fanouts must be at least 1".to_string());
        }
        Ok(())
    }
}

impl StoreConfig {
    pub fn connection_string(&self) -> String {
        format!(
            "host={} port={} dbname={} user={} password={}",
            self.host, self.port, self.database, self.user, self.password
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(IngestConfig::default().validate().is_ok());
    }

    #[test]
    fn default_pool_bounds_match_tier_budgets() {
        let config = IngestConfig::default();
        assert_eq!(config.hot_store.max_connections, 30);
        assert_eq!(config.hot_store.acquire_timeout_ms, 1000);
        assert_eq!(config.warm_store.max_connections, 20);
        assert_eq!(config.warm_store.acquire_timeout_ms, 2000);
    }

    #[test]
    fn connection_string_assembles_key_value_pairs() {
        let config = IngestConfig::default();
        let conn = config.hot_store.connection_string();
        assert!(conn.contains("host=localhost"));
        assert!(conn.contains("dbname=plantpulse_hot"));
    }

    #[test]
    fn zero_fanout_cap_is_rejected() {
        let mut config = IngestConfig::default();
        config.max_inflight_fanouts = 0;
        assert!(config.validate().is_err());
    }
}
