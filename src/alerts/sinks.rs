// plantpulse-ingest-core/src/alerts/sinks.rs
// Notification channels fanned out by the alert dispatcher

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Alert, Anomaly, AnomalyKind, Severity};
use crate::streaming::{OutgoingMessage, StreamPublisher};

/// Structured notification body delivered to every configured channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertNotification {
    pub alert_id: uuid::Uuid,
    pub equipment_id: String,
    pub kind: AnomalyKind,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensor: Option<SensorDetail>,
    pub recommended_actions: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub escalation_channels: Vec<String>,
    pub dashboard_url: String,
}

/// Observed value and breached threshold for the originating anomaly
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorDetail {
    pub value: f64,
    pub threshold: f64,
}

impl AlertNotification {
    pub fn new(
        alert: &Alert,
        anomaly: Option<&Anomaly>,
        escalation_channels: Vec<String>,
        dashboard_url: &str,
    ) -> Self {
        Self {
            alert_id: alert.alert_id,
            equipment_id: alert.equipment_id.clone(),
            kind: alert.kind,
            severity: alert.severity,
            timestamp: alert.timestamp,
            message: alert.message.clone(),
            sensor: anomaly.map(|a| SensorDetail {
                value: a.value,
                threshold: a.threshold,
            }),
            recommended_actions: recommended_actions(alert.kind)
                .iter()
                .map(|s| s.to_string())
                .collect(),
            escalation_channels,
            dashboard_url: format!("{}/equipment/{}", dashboard_url, alert.equipment_id),
        }
    }
}

/// Operator playbook per anomaly kind
pub fn recommended_actions(kind: AnomalyKind) -> &'static [&'static str] {
    match kind {
        AnomalyKind::CriticalTemperature => &[
            "Initiate emergency shutdown per thermal runbook",
            "Verify coolant flow and heat exchanger state",
            "Dispatch maintenance to inspect heating elements",
        ],
        AnomalyKind::HighTemperature => &[
            "Increase cooling output",
            "Schedule thermal inspection within 24 hours",
        ],
        AnomalyKind::CriticalVibration => &[
            "Stop equipment immediately to prevent mechanical damage",
            "Inspect bearings and couplings before restart",
        ],
        AnomalyKind::HighVibration => &[
            "Check mounting bolts and alignment",
            "Schedule vibration analysis",
        ],
        AnomalyKind::CriticalPressure => &[
            "Open relief valves per overpressure procedure",
            "Isolate the affected line segment",
        ],
        AnomalyKind::AbnormalPressure => &[
            "Inspect pumps and valves for blockage or leakage",
            "Verify pressure sensor calibration",
        ],
        AnomalyKind::PowerSpike => &[
            "Check electrical supply and drive controllers",
            "Review duty cycle against equipment rating",
        ],
        AnomalyKind::EquipmentOffline => &[
            "Verify network connectivity to the device gateway",
            "Confirm equipment power state on site",
        ],
    }
}

/// A notification channel the dispatcher can fan out to
#[async_trait]
pub trait NotificationSink: Send + Sync {
    fn name(&self) -> &str;
    async fn publish(&self, notification: &AlertNotification) -> Result<(), String>;
}

/// Delivers notifications onto a named bus topic
pub struct TopicNotificationSink {
    topic: String,
    publisher: Arc<StreamPublisher>,
}

impl TopicNotificationSink {
    pub fn new(topic: impl Into<String>, publisher: Arc<StreamPublisher>) -> Self {
        Self {
            topic: topic.into(),
            publisher,
        }
    }
}

#[async_trait]
impl NotificationSink for TopicNotificationSink {
    fn name(&self) -> &str {
        &self.topic
    }

    async fn publish(&self, notification: &AlertNotification) -> Result<(), String> {
        let payload = serde_json::to_vec(notification).map_err(|e| e.to_string())?;
        let message = OutgoingMessage {
            topic: self.topic.clone(),
            key: notification.equipment_id.clone(),
            payload,
            headers: vec![
                ("severity".to_string(), notification.severity.to_string()),
                ("equipment_id".to_string(), notification.equipment_id.clone()),
            ],
        };
        self.publisher
            .publish(message, Duration::from_millis(100))
            .await
            .map_err(|e| e.to_string())
    }
}

/// Posts notifications to a tenant-configured webhook
pub struct WebhookNotificationSink {
    url: url::Url,
    client: reqwest::Client,
}

impl WebhookNotificationSink {
    /// Rejects URLs that do not parse; a tenant record carrying a broken
    /// webhook should fail loudly at selection time, not at delivery time
    pub fn new(url: &str, client: reqwest::Client) -> Result<Self, String> {
        Ok(Self {
            url: url::Url::parse(url).map_err(|e| format!("webhook url {}: {}", url, e))?,
            client,
        })
    }
}

#[async_trait]
impl NotificationSink for WebhookNotificationSink {
    fn name(&self) -> &str {
        self.url.as_str()
    }

    async fn publish(&self, notification: &AlertNotification) -> Result<(), String> {
        let response = self
            .client
            .post(self.url.clone())
            .json(notification)
            .timeout(Duration::from_millis(100))
            .send()
            .await
            .map_err(|e| format!("webhook post: {}", e))?;
        response
            .error_for_status()
            .map(|_| ())
            .map_err(|e| format!("webhook status: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn alert(kind: AnomalyKind, severity: Severity) -> Alert {
        Alert {
            alert_id: uuid::Uuid::new_v4(),
            equipment_id: "FURNACE_003".to_string(),
            kind,
            severity,
            message: "Critical temperature".to_string(),
            timestamp: Utc::now(),
            acknowledged: false,
            resolved: false,
            processing_latency_ms: 10,
        }
    }

    #[test]
    fn every_kind_has_recommended_actions() {
        for kind in [
            AnomalyKind::CriticalTemperature,
            AnomalyKind::HighTemperature,
            AnomalyKind::HighVibration,
            AnomalyKind::CriticalVibration,
            AnomalyKind::AbnormalPressure,
            AnomalyKind::CriticalPressure,
            AnomalyKind::PowerSpike,
            AnomalyKind::EquipmentOffline,
        ] {
            assert!(!recommended_actions(kind).is_empty());
        }
    }

    #[test]
    fn notification_carries_sensor_detail_when_anomaly_present() {
        let alert = alert(AnomalyKind::CriticalTemperature, Severity::Critical);
        let anomaly = Anomaly {
            kind: AnomalyKind::CriticalTemperature,
            equipment_id: alert.equipment_id.clone(),
            timestamp: alert.timestamp,
            value: 195.7,
            threshold: 180.0,
            severity: Severity::Critical,
            message: alert.message.clone(),
        };
        let notification =
            AlertNotification::new(&alert, Some(&anomaly), vec!["pagerduty".to_string()], "http://dash");
        assert_eq!(notification.sensor.as_ref().unwrap().value, 195.7);
        assert_eq!(notification.sensor.as_ref().unwrap().threshold, 180.0);
        assert!(!notification.recommended_actions.is_empty());
        assert_eq!(notification.dashboard_url, "http://dash/equipment/FURNACE_003");
    }

    #[test]
    fn webhook_sink_rejects_invalid_url() {
        assert!(WebhookNotificationSink::new("not a url", reqwest::Client::new()).is_err());
        assert!(WebhookNotificationSink::new("https://hooks.example.com/a", reqwest::Client::new()).is_ok());
    }
}
