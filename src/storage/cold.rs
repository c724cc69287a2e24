// plantpulse-ingest-core/src/storage/cold.rs
// Cold tier: raw readings archived to object storage at dated keys

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};
use serde::Serialize;

use crate::data_plane::ObjectTarget;
use crate::errors::{StoreError, StoreResult};
use crate::models::SensorReading;
use crate::storage::ColdStore;
use crate::tenant::TenantContext;

/// Sensor-type tag stamped on every archived object
const SENSOR_TYPE: &str = "industrial-telemetry";

/// Archived object body: the reading plus archive metadata
#[derive(Serialize)]
struct ArchiveEnvelope<'a> {
    reading: &'a SensorReading,
    tenant_id: &'a str,
    archived_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    processing_failed: Option<bool>,
}

/// Date-partitioned key for one reading under the tenant's target
pub fn archive_key(target: &ObjectTarget, reading: &SensorReading) -> String {
    let facility = reading.facility_id.as_deref().unwrap_or("unassigned");
    let t = reading.timestamp;
    target.key(&format!(
        "{}/{}/{:04}/{:02}/{:02}/{:02}/{}.json",
        facility,
        reading.equipment_id,
        t.year(),
        t.month(),
        t.day(),
        t.hour(),
        t.to_rfc3339()
    ))
}

/// Error-location key for a reading whose fan-out partially failed
pub fn error_key(target: &ObjectTarget, reading: &SensorReading, failed_at: DateTime<Utc>) -> String {
    target.key(&format!(
        "errors/{}-{}.json",
        reading.equipment_id,
        failed_at.timestamp_millis()
    ))
}

/// Whether an archive key belongs to the given equipment and window.
///
/// Keys look like `<prefix><facility>/<equipment>/<Y>/<M>/<D>/<H>/<ts>.json`;
/// the hour directory is compared against the window at hour granularity.
pub fn key_matches(
    target: &ObjectTarget,
    key: &str,
    equipment_id: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> bool {
    let Some(relative) = key.strip_prefix(target.prefix.as_str()) else {
        return false;
    };
    let segments: Vec<&str> = relative.split('/').collect();
    if segments.len() != 7 || segments[0] == "errors" || segments[1] != equipment_id {
        return false;
    }
    let parsed = (
        segments[2].parse::<i32>(),
        segments[3].parse::<u32>(),
        segments[4].parse::<u32>(),
        segments[5].parse::<u32>(),
    );
    let (Ok(year), Ok(month), Ok(day), Ok(hour)) = parsed else {
        return false;
    };
    match Utc.with_ymd_and_hms(year, month, day, hour, 0, 0).single() {
        Some(bucket) => {
            let start_hour = start
                .with_minute(0)
                .and_then(|t| t.with_second(0))
                .and_then(|t| t.with_nanosecond(0))
                .unwrap_or(start);
            bucket >= start_hour && bucket <= end
        }
        None => false,
    }
}

/// Cold store on S3-compatible object storage
pub struct S3ColdStore {
    client: Client,
}

impl S3ColdStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn put(
        &self,
        target: &ObjectTarget,
        tenant: &TenantContext,
        reading: &SensorReading,
        key: String,
        processing_failed: bool,
    ) -> StoreResult<String> {
        let archived_at = Utc::now();
        let envelope = ArchiveEnvelope {
            reading,
            tenant_id: &tenant.tenant_id,
            archived_at,
            processing_failed: processing_failed.then_some(true),
        };
        let body = serde_json::to_vec(&envelope)
            .map_err(|e| StoreError::Serialization(format!("archive body: {}", e)))?;

        self.client
            .put_object()
            .bucket(&target.bucket)
            .key(&key)
            .body(ByteStream::from(body))
            .content_type("application/json")
            .metadata("equipment-id", &reading.equipment_id)
            .metadata("tenant-id", &tenant.tenant_id)
            .metadata("sensor-type", SENSOR_TYPE)
            .metadata("archived-at", archived_at.to_rfc3339())
            .send()
            .await
            .map_err(|e| StoreError::Connection(format!("cold put {}: {}", key, e)))?;
        Ok(key)
    }
}

#[async_trait]
impl ColdStore for S3ColdStore {
    async fn archive_reading(
        &self,
        target: &ObjectTarget,
        tenant: &TenantContext,
        reading: &SensorReading,
    ) -> StoreResult<String> {
        let key = archive_key(target, reading);
        self.put(target, tenant, reading, key, false).await
    }

    async fn archive_error(
        &self,
        target: &ObjectTarget,
        tenant: &TenantContext,
        reading: &SensorReading,
    ) -> StoreResult<String> {
        let key = error_key(target, reading, Utc::now());
        self.put(target, tenant, reading, key, true).await
    }

    async fn list_keys(
        &self,
        target: &ObjectTarget,
        equipment_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;
        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&target.bucket)
                .prefix(&target.prefix);
            if let Some(token) = &continuation {
                request = request.continuation_token(token);
            }
            let output = request
                .send()
                .await
                .map_err(|e| StoreError::Connection(format!("cold list: {}", e)))?;

            for object in output.contents() {
                if let Some(key) = object.key() {
                    if key_matches(target, key, equipment_id, start, end) {
                        keys.push(key.to_string());
                        if keys.len() >= limit {
                            return Ok(keys);
                        }
                    }
                }
            }

            if output.is_truncated() == Some(true) {
                continuation = output.next_continuation_token().map(String::from);
            } else {
                break;
            }
        }
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn reading() -> SensorReading {
        SensorReading {
            equipment_id: "PUMP_001".to_string(),
            timestamp: "2025-11-23T10:30:00Z".parse().unwrap(),
            temperature: Some(75.5),
            vibration: None,
            pressure: None,
            power_consumption: None,
            facility_id: Some("FAC_CHICAGO_01".to_string()),
            line_id: Some("LINE_A".to_string()),
            custom_metrics: HashMap::new(),
            ingestion_timestamp: None,
            source: None,
            has_anomalies: None,
            anomalies: Vec::new(),
        }
    }

    fn shared_target() -> ObjectTarget {
        ObjectTarget {
            bucket: "plantpulse-telemetry-archive".to_string(),
            prefix: "tenants/acme-corp/".to_string(),
        }
    }

    #[test]
    fn archive_key_is_date_partitioned() {
        let key = archive_key(&shared_target(), &reading());
        assert!(key.starts_with("tenants/acme-corp/FAC_CHICAGO_01/PUMP_001/2025/11/23/10/"));
        assert!(key.ends_with(".json"));
    }

    #[test]
    fn isolated_target_has_no_tenant_prefix() {
        let target = ObjectTarget {
            bucket: "plantpulse-titan-steel-archive".to_string(),
            prefix: String::new(),
        };
        let key = archive_key(&target, &reading());
        assert!(key.starts_with("FAC_CHICAGO_01/PUMP_001/2025/11/23/10/"));
    }

    #[test]
    fn missing_facility_falls_back_to_unassigned() {
        let mut r = reading();
        r.facility_id = None;
        let key = archive_key(&shared_target(), &r);
        assert!(key.starts_with("tenants/acme-corp/unassigned/PUMP_001/"));
    }

    #[test]
    fn error_key_lives_under_errors_root() {
        let failed_at: DateTime<Utc> = "2025-11-23T10:31:05.250Z".parse().unwrap();
        let key = error_key(&shared_target(), &reading(), failed_at);
        assert_eq!(
            key,
            format!("tenants/acme-corp/errors/PUMP_001-{}.json", failed_at.timestamp_millis())
        );
    }

    #[test]
    fn key_matching_filters_equipment_window_and_errors() {
        let target = shared_target();
        let key = archive_key(&target, &reading());
        let start = "2025-11-23T00:00:00Z".parse().unwrap();
        let end = "2025-11-24T00:00:00Z".parse().unwrap();

        assert!(key_matches(&target, &key, "PUMP_001", start, end));
        assert!(!key_matches(&target, &key, "PUMP_002", start, end));

        let early_end = "2025-11-23T09:00:00Z".parse().unwrap();
        assert!(!key_matches(&target, &key, "PUMP_001", start, early_end));

        let error = error_key(&target, &reading(), Utc::now());
        assert!(!key_matches(&target, &error, "PUMP_001", start, end));
    }

    #[test]
    fn key_matching_includes_partial_start_hour() {
        let target = shared_target();
        let key = archive_key(&target, &reading());
        // Window opens mid-hour; the 10:00 bucket still matches
        let start = "2025-11-23T10:15:00Z".parse().unwrap();
        let end = "2025-11-23T11:00:00Z".parse().unwrap();
        assert!(key_matches(&target, &key, "PUMP_001", start, end));
    }
}
