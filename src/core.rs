// plantpulse-ingest-core/src/core.rs
// Ingestion orchestrator: the request critical path and the query surface

use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::alerts::AlertDispatcher;
use crate::data_plane::{DataPlane, DataPlaneSelector, InProcessUsageRecorder};
use crate::detection::AnomalyDetector;
use crate::errors::{IngestError, IngestResult};
use crate::models::{
    Anomaly, EquipmentStatus, ReadingDraft, SensorReading, Severity,
};
use crate::observability::MetricsSink;
use crate::storage::{ColdStore, HotStore, StorageFanout, WarmStore};
use crate::streaming::{OutgoingMessage, StreamPublisher};
use crate::tasks::BackgroundTasks;
use crate::tenant::{RequestMeta, TenantContext, TenantDirectory};

/// End-to-end latency target for the critical path
pub const LATENCY_SLA_MS: u64 = 500;
/// Deadline on the non-critical sensor-data stream publish
const SENSOR_PUBLISH_TIMEOUT: Duration = Duration::from_millis(100);
/// Hard cap on query-surface row counts
pub const QUERY_ROW_CAP: i64 = 1000;

/// Success payload returned for one accepted reading
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestReceipt {
    pub message: String,
    pub equipment_id: String,
    pub timestamp: DateTime<Utc>,
    pub anomalies_detected: usize,
    pub alerts_created: usize,
    pub processing_latency_ms: u64,
    pub sla_compliant: bool,
}

/// Everything the orchestrator depends on, wired up by the runtime
pub struct IngestCoreDeps {
    pub directory: Arc<TenantDirectory>,
    pub selector: Arc<DataPlaneSelector>,
    pub detector: AnomalyDetector,
    pub dispatcher: Arc<AlertDispatcher>,
    pub fanout: Arc<StorageFanout>,
    pub publisher: Arc<StreamPublisher>,
    pub metrics: Arc<MetricsSink>,
    pub usage: Arc<InProcessUsageRecorder>,
    pub tasks: Arc<BackgroundTasks>,
    pub hot: Arc<dyn HotStore>,
    pub warm: Arc<dyn WarmStore>,
    pub cold: Arc<dyn ColdStore>,
}

/// Sequences one request through tenant resolution, validation, anomaly
/// detection, and alert dispatch, then hands the reading to detached
/// background persistence.
pub struct IngestCore {
    directory: Arc<TenantDirectory>,
    selector: Arc<DataPlaneSelector>,
    detector: AnomalyDetector,
    dispatcher: Arc<AlertDispatcher>,
    fanout: Arc<StorageFanout>,
    publisher: Arc<StreamPublisher>,
    metrics: Arc<MetricsSink>,
    usage: Arc<InProcessUsageRecorder>,
    tasks: Arc<BackgroundTasks>,
    hot: Arc<dyn HotStore>,
    warm: Arc<dyn WarmStore>,
    cold: Arc<dyn ColdStore>,
}

impl IngestCore {
    pub fn new(deps: IngestCoreDeps) -> Self {
        Self {
            directory: deps.directory,
            selector: deps.selector,
            detector: deps.detector,
            dispatcher: deps.dispatcher,
            fanout: deps.fanout,
            publisher: deps.publisher,
            metrics: deps.metrics,
            usage: deps.usage,
            tasks: deps.tasks,
            hot: deps.hot,
            warm: deps.warm,
            cold: deps.cold,
        }
    }

    /// Handle one ingest request end to end. Returns the receipt for the
    /// 200 envelope; every error variant maps to its own status code at
    /// the HTTP layer.
    pub async fn ingest(&self, meta: &RequestMeta, body: &[u8]) -> IngestResult<IngestReceipt> {
        let started = Instant::now();
        let request_id = Uuid::new_v4().to_string();

        // Tenant resolution gates everything; no work happens for
        // unidentified callers
        let tenant = self.directory.resolve(meta).await?;
        // Ingest writes additionally require an API key even when the
        // tenant was identified through another source
        if meta.header("x-api-key").is_none() {
            return Err(IngestError::AuthMissing);
        }
        self.metrics.record_tenant_request(&tenant.tenant_id);
        self.usage.record_request(&tenant.tenant_id);

        let draft: ReadingDraft = serde_json::from_slice(body)
            .map_err(|e| IngestError::Internal(format!("malformed JSON payload: {}", e)))?;
        let mut reading = validate_draft(draft)?;
        reading.enrich(Utc::now());

        let plane = self
            .selector
            .select(&tenant)
            .map_err(|e| IngestError::Internal(format!("data plane selection: {}", e)))?;

        let anomalies = self.detector.detect(&reading);
        reading.attach_anomalies(anomalies.clone());

        let qualifying: Vec<&Anomaly> = anomalies
            .iter()
            .filter(|a| a.severity >= Severity::High)
            .collect();
        let outcomes = join_all(
            qualifying
                .iter()
                .map(|anomaly| self.dispatcher.dispatch(anomaly, &tenant, &plane, started)),
        )
        .await;
        let alerts_created = outcomes.len();

        self.launch_background(reading.clone(), plane, tenant.clone(), request_id.clone());

        let processing_latency_ms = started.elapsed().as_millis() as u64;
        let sla_compliant = processing_latency_ms < LATENCY_SLA_MS;
        self.metrics
            .record_latency(&tenant.tenant_id, processing_latency_ms, sla_compliant);
        if !sla_compliant {
            self.usage.record_sla_violation(&tenant.tenant_id);
            log::warn!(
                "ingest: latency target exceeded request_id={} tenant={} latency_ms={}",
                request_id,
                tenant.tenant_id,
                processing_latency_ms
            );
        }

        Ok(IngestReceipt {
            message: "Sensor reading accepted".to_string(),
            equipment_id: reading.equipment_id.clone(),
            timestamp: reading.timestamp,
            anomalies_detected: anomalies.len(),
            alerts_created,
            processing_latency_ms,
            sla_compliant,
        })
    }

    /// Step 7: storage fan-out and the sensor-data stream publish run
    /// detached; a client disconnect no longer affects them
    fn launch_background(
        &self,
        reading: SensorReading,
        plane: DataPlane,
        tenant: Arc<TenantContext>,
        request_id: String,
    ) {
        let fanout = self.fanout.clone();
        let publisher = self.publisher.clone();

        self.tasks.spawn(request_id.clone(), async move {
            let severity_header = reading
                .anomalies
                .iter()
                .map(|a| a.severity)
                .max()
                .map(|s| s.to_string())
                .unwrap_or_else(|| "none".to_string());
            let publish = async {
                let payload = match serde_json::to_vec(&reading) {
                    Ok(payload) => payload,
                    Err(e) => {
                        log::error!(
                            "ingest: reading serialization failed request_id={}: {}",
                            request_id,
                            e
                        );
                        return;
                    }
                };
                let message = OutgoingMessage {
                    topic: plane.topics.sensor_data.clone(),
                    key: reading.equipment_id.clone(),
                    payload,
                    headers: vec![
                        ("severity".to_string(), severity_header),
                        ("equipment_id".to_string(), reading.equipment_id.clone()),
                    ],
                };
                if let Err(e) = publisher.publish(message, SENSOR_PUBLISH_TIMEOUT).await {
                    log::warn!(
                        "ingest: sensor-data publish failed request_id={}: {}",
                        request_id,
                        e
                    );
                }
            };
            let store = fanout.store(&reading, &plane, &tenant, &request_id);
            let (_, outcome) = tokio::join!(publish, store);
            if !outcome.all_ok() {
                log::warn!(
                    "ingest: fanout degraded request_id={} hot={} warm={} cold={} error_archived={}",
                    request_id,
                    outcome.hot_ok,
                    outcome.warm_ok,
                    outcome.cold_ok,
                    outcome.error_archived
                );
            }
        });
    }

    /// Query surface: warm-tier snapshot for one equipment
    pub async fn equipment_status(
        &self,
        meta: &RequestMeta,
        equipment_id: &str,
    ) -> IngestResult<Option<EquipmentStatus>> {
        let (tenant, plane) = self.resolve_plane(meta).await?;
        Ok(self
            .warm
            .get_status(&plane.warm, &tenant, equipment_id)
            .await?)
    }

    /// Query surface: warm-tier snapshots for the whole fleet
    pub async fn equipment_fleet(&self, meta: &RequestMeta) -> IngestResult<Vec<EquipmentStatus>> {
        let (tenant, plane) = self.resolve_plane(meta).await?;
        Ok(self.warm.list_status(&plane.warm, &tenant).await?)
    }

    /// Query surface: hot-tier readings for one equipment over a window
    pub async fn recent_readings(
        &self,
        meta: &RequestMeta,
        equipment_id: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> IngestResult<Vec<SensorReading>> {
        let (tenant, plane) = self.resolve_plane(meta).await?;
        let (start, end) = query_window(start, end);
        Ok(self
            .hot
            .recent_readings(&plane.hot, &tenant, equipment_id, start, end, QUERY_ROW_CAP)
            .await?)
    }

    /// Query surface: cold-tier key listing for one equipment
    pub async fn history_keys(
        &self,
        meta: &RequestMeta,
        equipment_id: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> IngestResult<Vec<String>> {
        let (tenant, plane) = self.resolve_plane(meta).await?;
        let (start, end) = query_window(start, end);
        Ok(self
            .cold
            .list_keys(
                &plane.object_target,
                equipment_id,
                start,
                end,
                QUERY_ROW_CAP as usize,
            )
            .await?)
    }

    async fn resolve_plane(
        &self,
        meta: &RequestMeta,
    ) -> IngestResult<(Arc<TenantContext>, DataPlane)> {
        let tenant = self.directory.resolve(meta).await?;
        self.metrics.record_tenant_request(&tenant.tenant_id);
        self.usage.record_request(&tenant.tenant_id);
        let plane = self
            .selector
            .select(&tenant)
            .map_err(|e| IngestError::Internal(format!("data plane selection: {}", e)))?;
        Ok((tenant, plane))
    }
}

/// Query range defaults: end = now, start = now minus thirty days
fn query_window(
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let end = end.unwrap_or_else(Utc::now);
    let start = start.unwrap_or(end - chrono::Duration::days(30));
    (start, end)
}

fn equipment_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_\-]{0,63}$").unwrap())
}

/// Validate a raw payload into a well-formed reading, collecting every
/// problem instead of stopping at the first
pub fn validate_draft(draft: ReadingDraft) -> IngestResult<SensorReading> {
    let mut details = Vec::new();

    let equipment_id = match draft.equipment_id.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() => {
            if equipment_id_pattern().is_match(id) {
                Some(id.to_string())
            } else {
                details.push("equipment_id has an invalid format".to_string());
                None
            }
        }
        _ => {
            details.push("equipment_id is required".to_string());
            None
        }
    };

    let timestamp = match draft.timestamp.as_deref() {
        Some(raw) => match raw.parse::<DateTime<Utc>>() {
            Ok(ts) => Some(ts),
            Err(_) => {
                details.push("timestamp must be an RFC-3339 UTC datetime".to_string());
                None
            }
        },
        None => {
            details.push("timestamp is required".to_string());
            None
        }
    };

    if let Some(v) = draft.temperature {
        if !(-273.0..=1000.0).contains(&v) {
            details.push("temperature must be between -273 and 1000".to_string());
        }
    }
    if let Some(v) = draft.vibration {
        if !(0.0..=100.0).contains(&v) {
            details.push("vibration must be between 0 and 100".to_string());
        }
    }
    if let Some(v) = draft.pressure {
        if !(0.0..=10000.0).contains(&v) {
            details.push("pressure must be between 0 and 10000".to_string());
        }
    }
    if let Some(v) = draft.power_consumption {
        if v < 0.0 {
            details.push("power_consumption must be non-negative".to_string());
        }
    }

    if !details.is_empty() {
        return Err(IngestError::Validation(details));
    }

    Ok(SensorReading {
        equipment_id: equipment_id.expect("validated above"),
        timestamp: timestamp.expect("validated above"),
        temperature: draft.temperature,
        vibration: draft.vibration,
        pressure: draft.pressure,
        power_consumption: draft.power_consumption,
        facility_id: draft.facility_id,
        line_id: draft.line_id,
        custom_metrics: draft.custom_metrics,
        ingestion_timestamp: None,
        source: None,
        has_anomalies: None,
        anomalies: Vec::new(),
    })
}
