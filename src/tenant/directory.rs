// plantpulse-ingest-core/src/tenant/directory.rs
// Tenant resolution: directory loads, TTL cache, access policy

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::errors::{IngestError, IngestResult, TenantDenialReason};
use crate::tenant::context::TenantContext;
use crate::tenant::identity::{RequestMeta, TenantIdentityResolver};

/// Cached contexts expire this long after insertion
const CACHE_TTL: Duration = Duration::from_secs(300);

/// Backend that owns the authoritative tenant records
#[async_trait]
pub trait TenantSource: Send + Sync {
    /// Fetch one tenant record; `None` means the identifier is unknown
    async fn load(&self, tenant_id: &str) -> IngestResult<Option<TenantContext>>;
}

/// Directory client talking to the external tenant service over HTTP
pub struct HttpDirectorySource {
    base_url: String,
    client: reqwest::Client,
}

impl HttpDirectorySource {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl TenantSource for HttpDirectorySource {
    async fn load(&self, tenant_id: &str) -> IngestResult<Option<TenantContext>> {
        let url = format!("{}/tenants/{}", self.base_url.trim_end_matches('/'), tenant_id);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| IngestError::Dependency(format!("tenant directory request failed: {}", e)))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = response
            .error_for_status()
            .map_err(|e| IngestError::Dependency(format!("tenant directory error: {}", e)))?;
        let context: TenantContext = response
            .json()
            .await
            .map_err(|e| IngestError::Dependency(format!("tenant record decode failed: {}", e)))?;
        Ok(Some(context))
    }
}

struct CacheEntry {
    context: Arc<TenantContext>,
    inserted_at: Instant,
}

struct RateWindow {
    hour: i64,
    count: u64,
}

/// Resolves inbound requests to tenant contexts.
///
/// Resolutions are cached for five minutes; concurrent misses for the same
/// tenant are collapsed into a single directory load. Every successful
/// resolve ticks the per-tenant hourly counter against the tenant's rate
/// limit.
pub struct TenantDirectory {
    identity: TenantIdentityResolver,
    source: Arc<dyn TenantSource>,
    cache: DashMap<String, CacheEntry>,
    load_locks: DashMap<String, Arc<Mutex<()>>>,
    rate_windows: DashMap<String, RateWindow>,
}

impl TenantDirectory {
    pub fn new(platform_domain: impl Into<String>, source: Arc<dyn TenantSource>) -> Self {
        Self {
            identity: TenantIdentityResolver::new(platform_domain),
            source,
            cache: DashMap::new(),
            load_locks: DashMap::new(),
            rate_windows: DashMap::new(),
        }
    }

    /// Resolve a request to its tenant context, or fail with
    /// `TenantMissing`, `TenantUnknown`, or `TenantDenied`
    pub async fn resolve(&self, meta: &RequestMeta) -> IngestResult<Arc<TenantContext>> {
        let tenant_id = self.identity.resolve(meta).ok_or(IngestError::TenantMissing)?;
        let context = self.lookup(&tenant_id).await?;
        self.validate_access(meta, &context)?;
        self.tick_rate_limit(&context)?;
        Ok(context)
    }

    /// Cache-or-load for one tenant id; the per-tenant lock makes the
    /// second concurrent caller wait instead of issuing a duplicate load
    async fn lookup(&self, tenant_id: &str) -> IngestResult<Arc<TenantContext>> {
        if let Some(context) = self.cached(tenant_id) {
            return Ok(context);
        }

        let lock = self
            .load_locks
            .entry(tenant_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        // A concurrent load may have filled the cache while we waited
        if let Some(context) = self.cached(tenant_id) {
            return Ok(context);
        }

        let context = self
            .source
            .load(tenant_id)
            .await?
            .ok_or_else(|| IngestError::TenantUnknown(tenant_id.to_string()))?;
        context
            .validate()
            .map_err(|e| IngestError::Internal(format!("invalid tenant record: {}", e)))?;

        let context = Arc::new(context);
        self.cache.insert(
            tenant_id.to_string(),
            CacheEntry {
                context: context.clone(),
                inserted_at: Instant::now(),
            },
        );
        log::info!(
            "tenant directory: loaded tenant={} mode={:?} tier={:?}",
            tenant_id,
            context.deployment_mode,
            context.tier
        );
        Ok(context)
    }

    fn cached(&self, tenant_id: &str) -> Option<Arc<TenantContext>> {
        let expired = {
            // The read guard must drop before the removal below
            match self.cache.get(tenant_id) {
                Some(entry) if entry.inserted_at.elapsed() < CACHE_TTL => {
                    return Some(entry.context.clone());
                }
                Some(_) => true,
                None => false,
            }
        };
        if expired {
            self.cache.remove(tenant_id);
        }
        None
    }

    /// Compliance checks against the request source
    fn validate_access(&self, meta: &RequestMeta, context: &TenantContext) -> IngestResult<()> {
        if context.is_region_restricted() {
            if let Some(region) = meta.source_region.as_deref() {
                if region != context.data_region {
                    log::warn!(
                        "tenant directory: region-restricted tenant={} rejected source_region={}",
                        context.tenant_id,
                        region
                    );
                    return Err(IngestError::TenantDenied(TenantDenialReason::CompliancePolicy));
                }
            }
        }
        Ok(())
    }

    /// Per-tenant-per-hour request counter against `features.api_rate_limit`
    fn tick_rate_limit(&self, context: &TenantContext) -> IngestResult<()> {
        let hour = Utc::now().timestamp() / 3600;
        let mut window = self
            .rate_windows
            .entry(context.tenant_id.clone())
            .or_insert(RateWindow { hour, count: 0 });
        if window.hour != hour {
            window.hour = hour;
            window.count = 0;
        }
        window.count += 1;
        if window.count > context.features.api_rate_limit {
            return Err(IngestError::TenantDenied(TenantDenialReason::RateLimited));
        }
        Ok(())
    }

    /// Drop a cached context, forcing the next resolve to reload
    pub fn invalidate(&self, tenant_id: &str) {
        self.cache.remove(tenant_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tenant::context::DeploymentMode;
    use crate::tenant::memory::{tenant_fixture, StaticTenantSource};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        inner: StaticTenantSource,
        loads: AtomicUsize,
    }

    #[async_trait]
    impl TenantSource for CountingSource {
        async fn load(&self, tenant_id: &str) -> IngestResult<Option<TenantContext>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.inner.load(tenant_id).await
        }
    }

    fn meta_for(tenant_id: &str) -> RequestMeta {
        let mut meta = RequestMeta::default();
        meta.headers
            .insert("x-tenant-id".to_string(), tenant_id.to_string());
        meta
    }

    #[tokio::test]
    async fn resolves_known_tenant() {
        let source = StaticTenantSource::with_tenants(vec![tenant_fixture("acme-corp", DeploymentMode::Shared)]);
        let directory = TenantDirectory::new("plantpulse", Arc::new(source));
        let context = directory.resolve(&meta_for("acme-corp")).await.unwrap();
        assert_eq!(context.tenant_id, "acme-corp");
    }

    #[tokio::test]
    async fn unknown_tenant_fails() {
        let source = StaticTenantSource::with_tenants(vec![]);
        let directory = TenantDirectory::new("plantpulse", Arc::new(source));
        let err = directory.resolve(&meta_for("ghost")).await.unwrap_err();
        assert!(matches!(err, IngestError::TenantUnknown(_)));
    }

    #[tokio::test]
    async fn missing_identifier_fails() {
        let source = StaticTenantSource::with_tenants(vec![]);
        let directory = TenantDirectory::new("plantpulse", Arc::new(source));
        let err = directory.resolve(&RequestMeta::default()).await.unwrap_err();
        assert!(matches!(err, IngestError::TenantMissing));
    }

    #[tokio::test]
    async fn concurrent_resolves_share_one_directory_load() {
        let source = Arc::new(CountingSource {
            inner: StaticTenantSource::with_tenants(vec![tenant_fixture("acme-corp", DeploymentMode::Shared)]),
            loads: AtomicUsize::new(0),
        });
        let directory = Arc::new(TenantDirectory::new("plantpulse", source.clone()));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let directory = directory.clone();
                tokio::spawn(async move { directory.resolve(&meta_for("acme-corp")).await })
            })
            .collect();
        for task in tasks {
            assert!(task.await.unwrap().is_ok());
        }
        assert_eq!(source.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rate_limit_denies_after_budget() {
        let mut tenant = tenant_fixture("acme-corp", DeploymentMode::Shared);
        tenant.features.api_rate_limit = 3;
        let directory =
            TenantDirectory::new("plantpulse", Arc::new(StaticTenantSource::with_tenants(vec![tenant])));

        for _ in 0..3 {
            assert!(directory.resolve(&meta_for("acme-corp")).await.is_ok());
        }
        let err = directory.resolve(&meta_for("acme-corp")).await.unwrap_err();
        assert!(matches!(
            err,
            IngestError::TenantDenied(TenantDenialReason::RateLimited)
        ));
    }

    #[tokio::test]
    async fn region_restricted_tenant_rejects_foreign_source() {
        let mut tenant = tenant_fixture("acme-corp", DeploymentMode::Shared);
        tenant.compliance_tags = vec!["region-restricted".to_string()];
        tenant.data_region = "eu-central-1".to_string();
        let directory =
            TenantDirectory::new("plantpulse", Arc::new(StaticTenantSource::with_tenants(vec![tenant])));

        let mut meta = meta_for("acme-corp");
        meta.source_region = Some("us-east-1".to_string());
        let err = directory.resolve(&meta).await.unwrap_err();
        assert!(matches!(
            err,
            IngestError::TenantDenied(TenantDenialReason::CompliancePolicy)
        ));

        let mut meta = meta_for("acme-corp");
        meta.source_region = Some("eu-central-1".to_string());
        assert!(directory.resolve(&meta).await.is_ok());
    }

    #[tokio::test]
    async fn invalidate_forces_reload() {
        let source = Arc::new(CountingSource {
            inner: StaticTenantSource::with_tenants(vec![tenant_fixture("acme-corp", DeploymentMode::Shared)]),
            loads: AtomicUsize::new(0),
        });
        let directory = TenantDirectory::new("plantpulse", source.clone());

        directory.resolve(&meta_for("acme-corp")).await.unwrap();
        directory.resolve(&meta_for("acme-corp")).await.unwrap();
        assert_eq!(source.loads.load(Ordering::SeqCst), 1);

        directory.invalidate("acme-corp");
        directory.resolve(&meta_for("acme-corp")).await.unwrap();
        assert_eq!(source.loads.load(Ordering::SeqCst), 2);
    }
}
