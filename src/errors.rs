// plantpulse-ingest-core/src/errors.rs
// Error taxonomy for the ingestion path and the storage tiers

/// Request-path result type
pub type IngestResult<T> = Result<T, IngestError>;

/// Errors that can surface on the ingestion critical path.
///
/// Only `Validation`, the tenant variants, and `Internal` ever reach the
/// HTTP client; dependency and budget failures are absorbed into outcomes
/// and logs.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Validation failed: {}", .0.join(", "))]
    Validation(Vec<String>),
    #[error("No tenant identifier found in request")]
    TenantMissing,
    #[error("Unknown tenant: {0}")]
    TenantUnknown(String),
    #[error("Tenant access denied: {0}")]
    TenantDenied(TenantDenialReason),
    #[error("Missing API key")]
    AuthMissing,
    #[error("Dependency failure: {0}")]
    Dependency(String),
    #[error("Latency budget exceeded: {0}")]
    BudgetExceeded(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Why a tenant was denied; drives the 429-vs-403 response mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TenantDenialReason {
    RateLimited,
    CompliancePolicy,
}

impl std::fmt::Display for TenantDenialReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TenantDenialReason::RateLimited => f.write_str("rate limit exceeded"),
            TenantDenialReason::CompliancePolicy => f.write_str("compliance policy rejection"),
        }
    }
}

/// Storage-tier result type
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by the hot, warm, and cold tier backends
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Query error: {0}")]
    Query(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Timeout: {0}")]
    Timeout(String),
}

impl From<StoreError> for IngestError {
    fn from(err: StoreError) -> Self {
        IngestError::Dependency(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_joins_details() {
        let err = IngestError::Validation(vec![
            "equipment_id is required".to_string(),
            "timestamp is required".to_string(),
        ]);
        let text = err.to_string();
        assert!(text.contains("equipment_id is required"));
        assert!(text.contains("timestamp is required"));
    }

    #[test]
    fn store_errors_map_to_dependency_failures() {
        let err: IngestError = StoreError::Timeout("hot tier".to_string()).into();
        assert!(matches!(err, IngestError::Dependency(_)));
    }
}
