// plantpulse-ingest-core/src/models.rs
// Data models for sensor readings, anomalies, and alerts

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Source tag stamped on every reading accepted through the HTTP ingest path
pub const INGEST_SOURCE: &str = "http_ingest";

/// One telemetry sample from one piece of equipment at one instant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorReading {
    pub equipment_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vibration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pressure: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power_consumption: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facility_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_id: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub custom_metrics: HashMap<String, serde_json::Value>,
    // Enrichment fields, stamped by the orchestrator after validation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingestion_timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_anomalies: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub anomalies: Vec<Anomaly>,
}

impl SensorReading {
    /// Content hash over identity plus the three banded measurements,
    /// stored at the hot tier for duplicate suppression
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.equipment_id.as_bytes());
        hasher.update(self.timestamp.to_rfc3339().as_bytes());
        for value in [self.temperature, self.vibration, self.pressure] {
            match value {
                Some(v) => hasher.update(v.to_bits().to_be_bytes()),
                None => hasher.update(b"-"),
            }
        }
        format!("{:x}", hasher.finalize())
    }

    /// Stamp the enrichment fields the orchestrator owns
    pub fn enrich(&mut self, ingested_at: DateTime<Utc>) {
        self.ingestion_timestamp = Some(ingested_at);
        self.source = Some(INGEST_SOURCE.to_string());
    }

    /// Attach detected anomalies and flip the anomaly flag
    pub fn attach_anomalies(&mut self, anomalies: Vec<Anomaly>) {
        self.has_anomalies = Some(!anomalies.is_empty());
        self.anomalies = anomalies;
    }
}

/// Raw ingest payload before validation; every field optional so the
/// validator can enumerate what is missing instead of failing on the
/// first absent field
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReadingDraft {
    pub equipment_id: Option<String>,
    pub timestamp: Option<String>,
    pub temperature: Option<f64>,
    pub vibration: Option<f64>,
    pub pressure: Option<f64>,
    pub power_consumption: Option<f64>,
    pub facility_id: Option<String>,
    pub line_id: Option<String>,
    #[serde(default)]
    pub custom_metrics: HashMap<String, serde_json::Value>,
}

/// Severity scale for anomalies and alerts; ordering is total and the
/// derive follows declaration order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// Numeric score used for the per-equipment severity gauge
    pub fn score(&self) -> f64 {
        match self {
            Severity::Low => 1.0,
            Severity::Medium => 2.0,
            Severity::High => 3.0,
            Severity::Critical => 4.0,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed set of anomaly classifications emitted by the detector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnomalyKind {
    CriticalTemperature,
    HighTemperature,
    HighVibration,
    CriticalVibration,
    AbnormalPressure,
    CriticalPressure,
    PowerSpike,
    EquipmentOffline,
}

impl AnomalyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyKind::CriticalTemperature => "critical-temperature",
            AnomalyKind::HighTemperature => "high-temperature",
            AnomalyKind::HighVibration => "high-vibration",
            AnomalyKind::CriticalVibration => "critical-vibration",
            AnomalyKind::AbnormalPressure => "abnormal-pressure",
            AnomalyKind::CriticalPressure => "critical-pressure",
            AnomalyKind::PowerSpike => "power-spike",
            AnomalyKind::EquipmentOffline => "equipment-offline",
        }
    }
}

impl std::fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A threshold-band violation derived from a single reading
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anomaly {
    pub kind: AnomalyKind,
    pub equipment_id: String,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub threshold: f64,
    pub severity: Severity,
    pub message: String,
}

/// Notification artifact produced from an anomaly of severity >= high
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub alert_id: Uuid,
    pub equipment_id: String,
    pub kind: AnomalyKind,
    pub severity: Severity,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub acknowledged: bool,
    pub resolved: bool,
    pub processing_latency_ms: u64,
}

impl Alert {
    /// Construct the alert for an anomaly; latency is wall time elapsed
    /// since the originating request was received
    pub fn from_anomaly(anomaly: &Anomaly, processing_latency_ms: u64) -> Self {
        Self {
            alert_id: Uuid::new_v4(),
            equipment_id: anomaly.equipment_id.clone(),
            kind: anomaly.kind,
            severity: anomaly.severity,
            message: anomaly.message.clone(),
            timestamp: anomaly.timestamp,
            acknowledged: false,
            resolved: false,
            processing_latency_ms,
        }
    }
}

/// Per-channel delivery record inside an alert outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelOutcome {
    pub channel: String,
    pub delivered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of dispatching one alert across its channels
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertOutcome {
    pub alert: Alert,
    pub channels: Vec<ChannelOutcome>,
    pub latency_ms: u64,
}

/// Per-tier result of one storage fan-out
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FanoutOutcome {
    pub hot_ok: bool,
    pub warm_ok: bool,
    pub cold_ok: bool,
    pub error_archived: bool,
    pub latency_ms: u64,
}

impl FanoutOutcome {
    pub fn all_ok(&self) -> bool {
        self.hot_ok && self.warm_ok && self.cold_ok
    }
}

/// Warm-tier snapshot row, one per equipment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquipmentStatus {
    pub equipment_id: String,
    pub last_seen: DateTime<Utc>,
    pub current_temperature: Option<f64>,
    pub current_vibration: Option<f64>,
    pub current_pressure: Option<f64>,
    pub status: String,
    pub facility_id: Option<String>,
    pub line_id: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(equipment_id: &str) -> SensorReading {
        SensorReading {
            equipment_id: equipment_id.to_string(),
            timestamp: "2025-11-23T10:30:00Z".parse().unwrap(),
            temperature: Some(75.5),
            vibration: Some(1.2),
            pressure: Some(250.8),
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

    #[test]
    fn severity_ordering_is_total() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
        assert_eq!(
            vec![Severity::Critical, Severity::Low, Severity::High]
                .into_iter()
                .max(),
            Some(Severity::Critical)
        );
    }

    #[test]
    fn severity_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Severity::Critical).unwrap(), "\"critical\"");
        assert_eq!(serde_json::to_string(&AnomalyKind::CriticalTemperature).unwrap(), "\"critical-temperature\"");
    }

    #[test]
    fn content_hash_is_stable_and_measurement_sensitive() {
        let a = reading("PUMP_001");
        let b = reading("PUMP_001");
        assert_eq!(a.content_hash(), b.content_hash());

        let mut c = reading("PUMP_001");
        c.temperature = Some(76.0);
        assert_ne!(a.content_hash(), c.content_hash());

        let d = reading("PUMP_002");
        assert_ne!(a.content_hash(), d.content_hash());
    }

    #[test]
    fn enrich_stamps_source_and_ingestion_time() {
        let mut r = reading("PUMP_001");
        let now = Utc::now();
        r.enrich(now);
        assert_eq!(r.source.as_deref(), Some(INGEST_SOURCE));
        assert_eq!(r.ingestion_timestamp, Some(now));
    }

    #[test]
    fn alert_from_anomaly_starts_unacknowledged() {
        let anomaly = Anomaly {
            kind: AnomalyKind::CriticalTemperature,
            equipment_id: "FURNACE_003".to_string(),
            timestamp: Utc::now(),
            value: 195.7,
            threshold: 180.0,
            severity: Severity::Critical,
            message: "Critical temperature detected".to_string(),
        };
        let alert = Alert::from_anomaly(&anomaly, 12);
        assert!(!alert.acknowledged);
        assert!(!alert.resolved);
        assert_eq!(alert.processing_latency_ms, 12);
        assert_eq!(alert.kind, AnomalyKind::CriticalTemperature);
    }
}
