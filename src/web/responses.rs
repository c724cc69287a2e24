// plantpulse-ingest-core/src/web/responses.rs
// Response envelope shared by every endpoint

use actix_web::http::StatusCode;
use actix_web::HttpResponse;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::errors::{IngestError, TenantDenialReason};

/// Uniform envelope: `{ success, data?, error?, details?, timestamp }`
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<String>>,
    pub timestamp: DateTime<Utc>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            details: None,
            timestamp: Utc::now(),
        }
    }
}

impl ApiResponse<serde_json::Value> {
    pub fn failure(error: impl Into<String>, details: Option<Vec<String>>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            details,
            timestamp: Utc::now(),
        }
    }
}

/// Map an ingest-path error to its HTTP response.
///
/// Tenant-missing maps to 400; legacy gateways surfaced the same condition
/// as 403 in some paths and 502 in others, and 400 is the canonical
/// mapping here.
pub fn error_response(err: &IngestError) -> HttpResponse {
    let (status, error, details) = match err {
        IngestError::Validation(details) => (
            StatusCode::BAD_REQUEST,
            "Validation failed".to_string(),
            Some(details.clone()),
        ),
        IngestError::TenantMissing => (
            StatusCode::BAD_REQUEST,
            "No tenant identifier found in request".to_string(),
            None,
        ),
        IngestError::TenantUnknown(tenant_id) => (
            StatusCode::NOT_FOUND,
            format!("Unknown tenant: {}", tenant_id),
            None,
        ),
        IngestError::TenantDenied(TenantDenialReason::RateLimited) => (
            StatusCode::TOO_MANY_REQUESTS,
            "Rate limit exceeded".to_string(),
            None,
        ),
        IngestError::TenantDenied(TenantDenialReason::CompliancePolicy) => (
            StatusCode::FORBIDDEN,
            "Access denied by compliance policy".to_string(),
            None,
        ),
        IngestError::AuthMissing => (
            StatusCode::FORBIDDEN,
            "Missing API key".to_string(),
            None,
        ),
        IngestError::Dependency(msg) | IngestError::BudgetExceeded(msg) | IngestError::Internal(msg) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error".to_string(),
            Some(vec![msg.clone()]),
        ),
    };
    HttpResponse::build(status).json(ApiResponse::failure(error, details))
}

/// Health report in the shape the fleet monitors expect
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub checks: Vec<HealthCheck>,
}

#[derive(Debug, Serialize)]
pub struct HealthCheck {
    pub name: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub duration_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_envelope_has_no_error_fields() {
        let envelope = ApiResponse::success(serde_json::json!({"ok": true}));
        let text = serde_json::to_string(&envelope).unwrap();
        assert!(text.contains("\"success\":true"));
        assert!(!text.contains("\"error\""));
        assert!(!text.contains("\"details\""));
    }

    #[test]
    fn validation_maps_to_400_with_details() {
        let err = IngestError::Validation(vec!["equipment_id is required".to_string()]);
        let response = error_response(&err);
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn tenant_errors_map_per_contract() {
        assert_eq!(
            error_response(&IngestError::TenantMissing).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            error_response(&IngestError::TenantUnknown("ghost".to_string())).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            error_response(&IngestError::TenantDenied(TenantDenialReason::RateLimited)).status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            error_response(&IngestError::TenantDenied(TenantDenialReason::CompliancePolicy)).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            error_response(&IngestError::AuthMissing).status(),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn internal_errors_hide_behind_generic_message() {
        let err = IngestError::Internal("malformed JSON payload: oops".to_string());
        let response = error_response(&err);
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
