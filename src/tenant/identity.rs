// plantpulse-ingest-core/src/tenant/identity.rs
// Tenant identifier extraction from heterogeneous request sources

use std::collections::HashMap;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

/// Framework-neutral view of the parts of a request that can carry a
/// tenant identifier; header keys are lowercased at construction
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    pub headers: HashMap<String, String>,
    pub query: HashMap<String, String>,
    pub host: Option<String>,
    /// Region the request entered from, when the edge stamps it
    pub source_region: Option<String>,
}

impl RequestMeta {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

/// Resolves a tenant identifier by probing five sources in a fixed
/// priority order; the first hit wins
pub struct TenantIdentityResolver {
    platform_domain: String,
}

impl TenantIdentityResolver {
    pub fn new(platform_domain: impl Into<String>) -> Self {
        Self {
            platform_domain: platform_domain.into(),
        }
    }

    /// Probe the extraction chain; `None` means no source carried an
    /// identifier and the request maps to `TenantMissing`
    pub fn resolve(&self, meta: &RequestMeta) -> Option<String> {
        let extractors: [fn(&Self, &RequestMeta) -> Option<String>; 5] = [
            Self::from_tenant_header,
            Self::from_bearer_token,
            Self::from_host_subdomain,
            Self::from_query_param,
            Self::from_api_key,
        ];
        extractors.iter().find_map(|extract| extract(self, meta))
    }

    fn from_tenant_header(&self, meta: &RequestMeta) -> Option<String> {
        meta.header("x-tenant-id")
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    /// Decode the claims segment of a JWT-shaped bearer token and read the
    /// `tenant_id` claim; signature verification belongs to the gateway,
    /// not this path
    fn from_bearer_token(&self, meta: &RequestMeta) -> Option<String> {
        let auth = meta.header("authorization")?;
        let token = auth.strip_prefix("Bearer ").or_else(|| auth.strip_prefix("bearer "))?;
        let mut segments = token.split('.');
        let (_, claims, _) = (segments.next()?, segments.next()?, segments.next()?);
        if segments.next().is_some() {
            return None;
        }
        let decoded = URL_SAFE_NO_PAD.decode(claims.trim_end_matches('=')).ok()?;
        let claims: serde_json::Value = serde_json::from_slice(&decoded).ok()?;
        claims
            .get("tenant_id")
            .and_then(|v| v.as_str())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    /// `<tenant>.<platform>.<tld>` hosts carry the tenant as the first
    /// label when the second label is the platform domain
    fn from_host_subdomain(&self, meta: &RequestMeta) -> Option<String> {
        let host = meta.host.as_deref().or_else(|| meta.header("host"))?;
        let host = host.split(':').next()?;
        let labels: Vec<&str> = host.split('.').collect();
        if labels.len() >= 3 && labels[1] == self.platform_domain && !labels[0].is_empty() {
            Some(labels[0].to_string())
        } else {
            None
        }
    }

    fn from_query_param(&self, meta: &RequestMeta) -> Option<String> {
        meta.query
            .get("tenant_id")
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    /// API keys are issued as `<tenant>_<opaque>`; the prefix routes
    fn from_api_key(&self, meta: &RequestMeta) -> Option<String> {
        meta.header("x-api-key")
            .and_then(|key| key.split('_').next())
            .filter(|prefix| !prefix.is_empty())
            .map(str::to_string)
    }
}
