// plantpulse-ingest-core/src/data_plane/pools.rs
// Connection pools for the hot and warm tiers, tenant session discipline

use std::time::Duration;

use dashmap::DashMap;
use deadpool_postgres::{
    Config as PoolFactoryConfig, Manager, ManagerConfig, Object, Pool, PoolConfig, PoolError,
    RecyclingMethod, Runtime,
};
use tokio_postgres::NoTls;

use crate::config::StoreConfig;
use crate::errors::{StoreError, StoreResult};
use crate::tenant::TenantContext;

/// Upper bound on dedicated pool sizes regardless of tenant configuration
const DEDICATED_POOL_CEILING: usize = 100;

/// A pool handle scoped to one tenant borrow discipline.
///
/// When `session_tenant` is set, every acquired connection has the
/// `app.current_tenant_id` session variable set before it is handed out;
/// when it is not, the variable is reset so state from a previous borrow
/// can never leak across tenants.
#[derive(Clone)]
pub struct TenantPool {
    pool: Pool,
    session_tenant: Option<String>,
    tier: &'static str,
}

impl TenantPool {
    pub fn new(pool: Pool, session_tenant: Option<String>, tier: &'static str) -> Self {
        Self {
            pool,
            session_tenant,
            tier,
        }
    }

    /// Borrow a connection with the tenant session variable applied
    pub async fn acquire(&self) -> StoreResult<Object> {
        let conn = self.pool.get().await.map_err(|e| match e {
            PoolError::Timeout(_) => {
                StoreError::Timeout(format!("{} pool acquisition timed out", self.tier))
            }
            other => StoreError::Connection(format!("{} pool: {}", self.tier, other)),
        })?;

        let tenant = self.session_tenant.as_deref().unwrap_or("");
        conn.execute(
            "SELECT set_config('app.current_tenant_id', $1, false)",
            &[&tenant],
        )
        .await
        .map_err(|e| StoreError::Connection(format!("{} session setup: {}", self.tier, e)))?;
        Ok(conn)
    }

    /// Tenant id applied to borrowed sessions, when this handle is scoped
    pub fn session_tenant(&self) -> Option<&str> {
        self.session_tenant.as_deref()
    }
}

/// Process-wide pool inventory: one shared hot pool, one shared warm
/// pool, and lazily created dedicated hot pools keyed by tenant id
pub struct PoolSet {
    shared_hot: Pool,
    shared_warm: Pool,
    dedicated_hot_pools: DashMap<String, Pool>,
    hot_acquire_timeout: Duration,
}

impl PoolSet {
    /// Build the two shared pools; connections are established lazily on
    /// first borrow
    pub fn new(hot: &StoreConfig, warm: &StoreConfig) -> StoreResult<Self> {
        Ok(Self {
            shared_hot: build_pool(hot)?,
            shared_warm: build_pool(warm)?,
            dedicated_hot_pools: DashMap::new(),
            hot_acquire_timeout: Duration::from_millis(hot.acquire_timeout_ms),
        })
    }

    /// Shared hot-tier handle scoped to the tenant session
    pub fn shared_hot(&self, tenant_id: &str) -> TenantPool {
        TenantPool::new(
            self.shared_hot.clone(),
            Some(tenant_id.to_string()),
            "hot",
        )
    }

    /// Shared warm-tier handle scoped to the tenant session
    pub fn shared_warm(&self, tenant_id: &str) -> TenantPool {
        TenantPool::new(
            self.shared_warm.clone(),
            Some(tenant_id.to_string()),
            "warm",
        )
    }

    /// Dedicated hot-tier handle for a promoted isolated tenant; the pool
    /// is created on first use from the tenant's own connection string
    pub fn dedicated_hot(&self, context: &TenantContext) -> StoreResult<TenantPool> {
        if let Some(pool) = self.dedicated_hot_pools.get(&context.tenant_id) {
            return Ok(TenantPool::new(pool.clone(), None, "hot"));
        }

        let conn_str = context.data.connection_string.as_deref().ok_or_else(|| {
            StoreError::Connection(format!(
                "tenant {} has no dedicated connection string",
                context.tenant_id
            ))
        })?;
        let pg_config: tokio_postgres::Config = conn_str
            .parse()
            .map_err(|e| StoreError::Connection(format!("dedicated connection string: {}", e)))?;

        let manager = Manager::from_config(
            pg_config,
            NoTls,
            ManagerConfig {
                recycling_method: RecyclingMethod::Fast,
            },
        );
        let pool = Pool::builder(manager)
            .max_size(context.data.max_pool_connections.min(DEDICATED_POOL_CEILING))
            .wait_timeout(Some(self.hot_acquire_timeout))
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| StoreError::Connection(format!("dedicated pool build: {}", e)))?;

        log::info!(
            "data plane: created dedicated hot pool tenant={} max_size={}",
            context.tenant_id,
            context.data.max_pool_connections.min(DEDICATED_POOL_CEILING)
        );
        self.dedicated_hot_pools.insert(context.tenant_id.clone(), pool.clone());
        Ok(TenantPool::new(pool, None, "hot"))
    }
}

fn build_pool(config: &StoreConfig) -> StoreResult<Pool> {
    let mut factory = PoolFactoryConfig::new();
    factory.host = Some(config.host.clone());
    factory.port = Some(config.port);
    factory.dbname = Some(config.database.clone());
    factory.user = Some(config.user.clone());
    factory.password = Some(config.password.clone());
    factory.manager = Some(ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    });
    let mut pool_config = PoolConfig::new(config.max_connections);
    pool_config.timeouts.wait = Some(Duration::from_millis(config.acquire_timeout_ms));
    factory.pool = Some(pool_config);
    factory
        .create_pool(Some(Runtime::Tokio1), NoTls)
        .map_err(|e| StoreError::Connection(format!("pool creation: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IngestConfig;
    use crate::tenant::memory::tenant_fixture;
    use crate::tenant::DeploymentMode;

    #[test]
    fn pool_set_builds_from_default_config() {
        let config = IngestConfig::default();
        let pools = PoolSet::new(&config.hot_store, &config.warm_store).unwrap();
        assert_eq!(pools.shared_hot("acme-corp").session_tenant(), Some("acme-corp"));
        assert_eq!(pools.shared_warm("acme-corp").session_tenant(), Some("acme-corp"));
    }

    #[tokio::test]
    async fn dedicated_pool_requires_connection_string() {
        let config = IngestConfig::default();
        let pools = PoolSet::new(&config.hot_store, &config.warm_store).unwrap();

        let shared = tenant_fixture("acme-corp", DeploymentMode::Shared);
        assert!(pools.dedicated_hot(&shared).is_err());

        let isolated = tenant_fixture("titan-steel", DeploymentMode::Isolated);
        let handle = pools.dedicated_hot(&isolated).unwrap();
        assert_eq!(handle.session_tenant(), None);
    }

    #[tokio::test]
    async fn dedicated_pool_is_cached_per_tenant() {
        let config = IngestConfig::default();
        let pools = PoolSet::new(&config.hot_store, &config.warm_store).unwrap();
        let isolated = tenant_fixture("titan-steel", DeploymentMode::Isolated);

        pools.dedicated_hot(&isolated).unwrap();
        pools.dedicated_hot(&isolated).unwrap();
        assert_eq!(pools.dedicated_hot_pools.len(), 1);
    }
}
