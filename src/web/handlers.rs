// plantpulse-ingest-core/src/web/handlers.rs
// HTTP handlers over the ingestion core and the query surface

use std::time::Instant;

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::errors::IngestError;
use crate::runtime::Runtime;
use crate::tenant::RequestMeta;
use crate::web::responses::{error_response, ApiResponse, HealthCheck, HealthResponse};

/// Framework-neutral request view handed to the core
pub fn request_meta(req: &HttpRequest) -> RequestMeta {
    let mut meta = RequestMeta::default();
    for (name, value) in req.headers() {
        if let Ok(value) = value.to_str() {
            meta.headers
                .insert(name.as_str().to_ascii_lowercase(), value.to_string());
        }
    }
    for (key, value) in url::form_urlencoded::parse(req.query_string().as_bytes()) {
        meta.query.insert(key.into_owned(), value.into_owned());
    }
    meta.host = Some(req.connection_info().host().to_string());
    meta.source_region = meta.headers.get("x-source-region").cloned();
    meta
}

/// `POST /webhook/events` and `POST /data`
pub async fn ingest(
    req: HttpRequest,
    body: web::Bytes,
    runtime: web::Data<Runtime>,
) -> HttpResponse {
    let meta = request_meta(&req);
    match runtime.core.ingest(&meta, &body).await {
        Ok(receipt) => HttpResponse::Ok().json(ApiResponse::success(receipt)),
        Err(e) => error_response(&e),
    }
}

/// Window parameters accepted by the history endpoints
#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    /// Accepted for forward compatibility with server-side aggregation
    #[allow(dead_code)]
    pub interval: Option<String>,
}

fn parse_range(query: &RangeQuery) -> Result<(Option<DateTime<Utc>>, Option<DateTime<Utc>>), IngestError> {
    let mut details = Vec::new();
    let parse = |raw: &Option<String>, field: &str, details: &mut Vec<String>| match raw {
        Some(raw) => match raw.parse::<DateTime<Utc>>() {
            Ok(ts) => Some(ts),
            Err(_) => {
                details.push(format!("{} must be an RFC-3339 UTC datetime", field));
                None
            }
        },
        None => None,
    };
    let start = parse(&query.start_time, "start_time", &mut details);
    let end = parse(&query.end_time, "end_time", &mut details);
    if details.is_empty() {
        Ok((start, end))
    } else {
        Err(IngestError::Validation(details))
    }
}

/// `GET /equipment`
pub async fn equipment_fleet(req: HttpRequest, runtime: web::Data<Runtime>) -> HttpResponse {
    let meta = request_meta(&req);
    match runtime.core.equipment_fleet(&meta).await {
        Ok(fleet) => HttpResponse::Ok().json(ApiResponse::success(fleet)),
        Err(e) => error_response(&e),
    }
}

/// `GET /equipment/{id}`
pub async fn equipment_status(
    req: HttpRequest,
    path: web::Path<String>,
    runtime: web::Data<Runtime>,
) -> HttpResponse {
    let equipment_id = path.into_inner();
    let meta = request_meta(&req);
    match runtime.core.equipment_status(&meta, &equipment_id).await {
        Ok(Some(status)) => HttpResponse::Ok().json(ApiResponse::success(status)),
        Ok(None) => HttpResponse::NotFound().json(ApiResponse::failure(
            format!("Equipment {} not found", equipment_id),
            None,
        )),
        Err(e) => error_response(&e),
    }
}

/// `GET /equipment/{id}/metrics`: recent readings from the hot tier
pub async fn equipment_metrics(
    req: HttpRequest,
    path: web::Path<String>,
    query: web::Query<RangeQuery>,
    runtime: web::Data<Runtime>,
) -> HttpResponse {
    let equipment_id = path.into_inner();
    let meta = request_meta(&req);
    let (start, end) = match parse_range(&query) {
        Ok(range) => range,
        Err(e) => return error_response(&e),
    };
    match runtime
        .core
        .recent_readings(&meta, &equipment_id, start, end)
        .await
    {
        Ok(readings) => HttpResponse::Ok().json(ApiResponse::success(readings)),
        Err(e) => error_response(&e),
    }
}

/// `GET /equipment/{id}/history`: cold-tier key listing
pub async fn equipment_history(
    req: HttpRequest,
    path: web::Path<String>,
    query: web::Query<RangeQuery>,
    runtime: web::Data<Runtime>,
) -> HttpResponse {
    let equipment_id = path.into_inner();
    let meta = request_meta(&req);
    let (start, end) = match parse_range(&query) {
        Ok(range) => range,
        Err(e) => return error_response(&e),
    };
    match runtime.core.history_keys(&meta, &equipment_id, start, end).await {
        Ok(keys) => HttpResponse::Ok().json(ApiResponse::success(keys)),
        Err(e) => error_response(&e),
    }
}

/// `GET /health`
pub async fn health(runtime: web::Data<Runtime>) -> HttpResponse {
    let mut checks = Vec::new();

    for (name, pool) in [
        ("hot_pool", runtime.pools.shared_hot("")),
        ("warm_pool", runtime.pools.shared_warm("")),
    ] {
        let started = Instant::now();
        let (status, message) = match pool.acquire().await {
            Ok(_conn) => ("healthy".to_string(), None),
            Err(e) => ("unhealthy".to_string(), Some(e.to_string())),
        };
        checks.push(HealthCheck {
            name: name.to_string(),
            status,
            message,
            duration_ms: started.elapsed().as_millis() as u64,
        });
    }

    checks.push(HealthCheck {
        name: "fanout_pool".to_string(),
        status: "healthy".to_string(),
        message: Some(format!("{} tasks in flight", runtime.tasks.inflight())),
        duration_ms: 0,
    });

    let overall = if checks.iter().all(|c| c.status == "healthy") {
        "healthy"
    } else {
        "degraded"
    };
    HttpResponse::Ok().json(ApiResponse::success(HealthResponse {
        status: overall.to_string(),
        service: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks,
    }))
}

/// `GET /metrics`: Prometheus exposition
pub async fn metrics(runtime: web::Data<Runtime>) -> HttpResponse {
    match runtime.metrics.export() {
        Ok(text) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(text),
        Err(e) => error_response(&IngestError::Internal(format!("metrics export: {}", e))),
    }
}
