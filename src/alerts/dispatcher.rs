// plantpulse-ingest-core/src/alerts/dispatcher.rs
// Priority alert dispatch: stream publish, metrics, notifications

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::future::join_all;

use crate::alerts::sinks::{
    AlertNotification, NotificationSink, TopicNotificationSink, WebhookNotificationSink,
};
use crate::data_plane::DataPlane;
use crate::models::{Alert, AlertOutcome, Anomaly, ChannelOutcome, Severity};
use crate::observability::MetricsSink;
use crate::streaming::{OutgoingMessage, StreamPublisher};
use crate::tenant::TenantContext;

/// Channel label for the authoritative priority stream publish
const PRIORITY_CHANNEL: &str = "priority-stream";

/// Combined bound on the metrics and notification side work
const SIDE_WORK_BUDGET: Duration = Duration::from_millis(100);
/// Deadline on the awaited high-severity priority publish
const HIGH_PUBLISH_TIMEOUT: Duration = Duration::from_millis(100);

/// Dispatches one qualifying anomaly (severity >= high) across the
/// priority stream, the observability sink, and the tenant's configured
/// notification channels.
///
/// The priority stream is the authoritative durable sink; everything else
/// is best effort. Per-channel failures land in the outcome and in logs,
/// never at the caller.
pub struct AlertDispatcher {
    publisher: Arc<StreamPublisher>,
    metrics: Arc<MetricsSink>,
    http: reqwest::Client,
    dashboard_url: String,
}

impl AlertDispatcher {
    pub fn new(
        publisher: Arc<StreamPublisher>,
        metrics: Arc<MetricsSink>,
        dashboard_url: impl Into<String>,
    ) -> Self {
        Self {
            publisher,
            metrics,
            http: reqwest::Client::new(),
            dashboard_url: dashboard_url.into(),
        }
    }

    pub async fn dispatch(
        &self,
        anomaly: &Anomaly,
        tenant: &TenantContext,
        plane: &DataPlane,
        request_started: Instant,
    ) -> AlertOutcome {
        let started = Instant::now();
        let alert = Alert::from_anomaly(anomaly, request_started.elapsed().as_millis() as u64);

        let sinks = self.build_sinks(tenant, plane);
        let mut sink_names: Vec<String> = vec![plane.topics.alerts.clone()];
        sink_names.extend(sinks.iter().map(|s| s.name().to_string()));
        let notification = AlertNotification::new(
            &alert,
            Some(anomaly),
            tenant.escalation_channels(alert.severity),
            &self.dashboard_url,
        );

        let priority_work = self.publish_priority(&alert, plane);
        let side_work = async {
            self.metrics.record_alert(&tenant.tenant_id, anomaly);
            let tenant_topic_work = async {
                let message = OutgoingMessage {
                    topic: plane.topics.alerts.clone(),
                    key: alert.equipment_id.clone(),
                    payload: alert_wire_payload(&alert),
                    headers: vec![
                        ("severity".to_string(), alert.severity.to_string()),
                        ("equipment_id".to_string(), alert.equipment_id.clone()),
                    ],
                };
                let result = self
                    .publisher
                    .publish(message, HIGH_PUBLISH_TIMEOUT)
                    .await
                    .map_err(|e| e.to_string());
                (plane.topics.alerts.clone(), result)
            };
            let notification_work = join_all(sinks.iter().map(|sink| {
                let notification = &notification;
                async move {
                    let result = sink.publish(notification).await;
                    (sink.name().to_string(), result)
                }
            }));
            let (tenant_topic_result, mut notification_results) =
                tokio::join!(tenant_topic_work, notification_work);
            notification_results.insert(0, tenant_topic_result);
            notification_results
        };

        let (priority_outcome, side_results) =
            tokio::join!(priority_work, tokio::time::timeout(SIDE_WORK_BUDGET, side_work));

        let mut channels = vec![priority_outcome];
        match side_results {
            Ok(results) => {
                for (channel, result) in results {
                    match result {
                        Ok(()) => channels.push(ChannelOutcome {
                            channel,
                            delivered: true,
                            error: None,
                        }),
                        Err(e) => {
                            log::warn!(
                                "alert dispatch: channel {} failed alert_id={}: {}",
                                channel,
                                alert.alert_id,
                                e
                            );
                            channels.push(ChannelOutcome {
                                channel,
                                delivered: false,
                                error: Some(e),
                            });
                        }
                    }
                }
            }
            Err(_) => {
                let budget = crate::errors::IngestError::BudgetExceeded(format!(
                    "notification fan-out abandoned after {}ms",
                    SIDE_WORK_BUDGET.as_millis()
                ));
                log::warn!("alert dispatch: {} alert_id={}", budget, alert.alert_id);
                for channel in sink_names {
                    channels.push(ChannelOutcome {
                        channel,
                        delivered: false,
                        error: Some(budget.to_string()),
                    });
                }
            }
        }

        AlertOutcome {
            alert,
            channels,
            latency_ms: started.elapsed().as_millis() as u64,
        }
    }

    /// Step 2: the priority stream publish. Critical severity is submitted
    /// fire-and-forget; high severity is awaited under a short deadline.
    async fn publish_priority(&self, alert: &Alert, plane: &DataPlane) -> ChannelOutcome {
        let message = OutgoingMessage {
            topic: plane.topics.priority_alerts.clone(),
            key: alert.equipment_id.clone(),
            payload: alert_wire_payload(alert),
            headers: vec![
                ("severity".to_string(), alert.severity.to_string()),
                ("equipment_id".to_string(), alert.equipment_id.clone()),
            ],
        };

        let result = if alert.severity == Severity::Critical {
            self.publisher.publish_fire_and_forget(message)
        } else {
            self.publisher.publish(message, HIGH_PUBLISH_TIMEOUT).await
        };

        match result {
            Ok(()) => ChannelOutcome {
                channel: PRIORITY_CHANNEL.to_string(),
                delivered: true,
                error: None,
            },
            Err(e) => {
                log::warn!(
                    "alert dispatch: priority publish failed alert_id={}: {}",
                    alert.alert_id,
                    e
                );
                ChannelOutcome {
                    channel: PRIORITY_CHANNEL.to_string(),
                    delivered: false,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// The tenant's notification channel set: each configured topic and
    /// each webhook; the per-tenant alert topic is published separately
    /// in its stream wire form
    fn build_sinks(&self, tenant: &TenantContext, plane: &DataPlane) -> Vec<Box<dyn NotificationSink>> {
        let mut sinks: Vec<Box<dyn NotificationSink>> = Vec::new();
        for topic in &plane.sinks.notification_topics {
            sinks.push(Box::new(TopicNotificationSink::new(
                topic.clone(),
                self.publisher.clone(),
            )));
        }
        for url in &plane.sinks.webhook_urls {
            match WebhookNotificationSink::new(url, self.http.clone()) {
                Ok(sink) => sinks.push(Box::new(sink)),
                Err(e) => log::warn!(
                    "alert dispatch: skipping webhook for tenant {}: {}",
                    tenant.tenant_id,
                    e
                ),
            }
        }
        sinks
    }
}

/// Wire form of an alert on the stream bus
fn alert_wire_payload(alert: &Alert) -> Vec<u8> {
    serde_json::json!({
        "alert_id": alert.alert_id,
        "equipment_id": alert.equipment_id,
        "kind": alert.kind,
        "severity": alert.severity,
        "message": alert.message,
        "timestamp": alert.timestamp,
        "processing_latency_ms": alert.processing_latency_ms,
        "published_at": Utc::now().timestamp_millis(),
    })
    .to_string()
    .into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IngestConfig;
    use crate::data_plane::{DataPlaneSelector, InProcessUsageRecorder, PoolSet};
    use crate::models::AnomalyKind;
    use crate::streaming::publisher::testing::CaptureTransport;
    use crate::tenant::memory::tenant_fixture;
    use crate::tenant::DeploymentMode;

    fn anomaly(severity: Severity) -> Anomaly {
        Anomaly {
            kind: AnomalyKind::CriticalTemperature,
            equipment_id: "FURNACE_003".to_string(),
            timestamp: Utc::now(),
            value: 195.7,
            threshold: 180.0,
            severity,
            message: "Critical temperature".to_string(),
        }
    }

    fn plane_for(tenant: &crate::tenant::TenantContext) -> DataPlane {
        let config = IngestConfig::default();
        let pools = Arc::new(PoolSet::new(&config.hot_store, &config.warm_store).unwrap());
        DataPlaneSelector::new(
            pools,
            Arc::new(InProcessUsageRecorder::new()),
            config.object_store.shared_bucket.clone(),
        )
        .select(tenant)
        .unwrap()
    }

    fn dispatcher_with(transport: Arc<CaptureTransport>) -> (AlertDispatcher, Arc<StreamPublisher>) {
        let metrics = Arc::new(MetricsSink::new().unwrap());
        let publisher = Arc::new(StreamPublisher::new(transport, 64, metrics.clone()));
        (
            AlertDispatcher::new(publisher.clone(), metrics, "http://localhost:3000"),
            publisher,
        )
    }

    #[tokio::test]
    async fn critical_alert_reaches_priority_topic_with_headers() {
        let transport = Arc::new(CaptureTransport::default());
        let (dispatcher, publisher) = dispatcher_with(transport.clone());
        let tenant = tenant_fixture("acme-corp", DeploymentMode::Shared);
        let plane = plane_for(&tenant);

        let outcome = dispatcher
            .dispatch(&anomaly(Severity::Critical), &tenant, &plane, Instant::now())
            .await;
        publisher.shutdown().await;

        assert!(outcome.channels.iter().any(|c| c.channel == PRIORITY_CHANNEL && c.delivered));
        let sent = transport.sent.lock().unwrap();
        let priority: Vec<_> = sent
            .iter()
            .filter(|m| m.topic == "manufacturing-alerts-priority")
            .collect();
        assert_eq!(priority.len(), 1);
        assert!(priority[0]
            .headers
            .contains(&("severity".to_string(), "critical".to_string())));
        assert_eq!(priority[0].key, "FURNACE_003");

        let payload: serde_json::Value = serde_json::from_slice(&priority[0].payload).unwrap();
        assert_eq!(payload["severity"], "critical");
        assert_eq!(payload["kind"], "critical-temperature");
        assert!(payload["published_at"].is_i64());
    }

    #[tokio::test]
    async fn high_alert_awaits_priority_publish() {
        let transport = Arc::new(CaptureTransport::default());
        let (dispatcher, publisher) = dispatcher_with(transport.clone());
        let tenant = tenant_fixture("acme-corp", DeploymentMode::Shared);
        let plane = plane_for(&tenant);

        let outcome = dispatcher
            .dispatch(&anomaly(Severity::High), &tenant, &plane, Instant::now())
            .await;

        // Awaited path: the message is on the transport before dispatch returns
        assert!(transport
            .sent
            .lock()
            .unwrap()
            .iter()
            .any(|m| m.topic == "manufacturing-alerts-priority"));
        assert!(outcome.channels.iter().any(|c| c.channel == PRIORITY_CHANNEL && c.delivered));
        publisher.shutdown().await;
    }

    #[tokio::test]
    async fn notifications_fan_out_to_tenant_topics() {
        let transport = Arc::new(CaptureTransport::default());
        let (dispatcher, publisher) = dispatcher_with(transport.clone());
        let tenant = tenant_fixture("acme-corp", DeploymentMode::Shared);
        let plane = plane_for(&tenant);

        let outcome = dispatcher
            .dispatch(&anomaly(Severity::High), &tenant, &plane, Instant::now())
            .await;
        publisher.shutdown().await;

        let sent = transport.sent.lock().unwrap();
        assert!(sent.iter().any(|m| m.topic == "acme-corp-ops-alerts"));

        // The per-tenant alert topic carries the stream wire form
        let tenant_topic = sent.iter().find(|m| m.topic == "alerts-acme-corp").unwrap();
        let wire: serde_json::Value = serde_json::from_slice(&tenant_topic.payload).unwrap();
        assert!(wire["alert_id"].is_string());
        assert!(wire["published_at"].is_i64());
        assert!(wire["processing_latency_ms"].is_u64());

        let notification = sent.iter().find(|m| m.topic == "acme-corp-ops-alerts").unwrap();
        let body: serde_json::Value = serde_json::from_slice(&notification.payload).unwrap();
        assert_eq!(body["equipment_id"], "FURNACE_003");
        assert!(body["recommended_actions"].as_array().unwrap().len() >= 2);
        assert_eq!(body["sensor"]["value"], 195.7);

        assert!(outcome.channels.iter().any(|c| c.channel == "acme-corp-ops-alerts" && c.delivered));
    }

    #[tokio::test]
    async fn channel_failures_are_recorded_not_raised() {
        let transport = Arc::new(CaptureTransport {
            fail: true,
            ..Default::default()
        });
        let (dispatcher, publisher) = dispatcher_with(transport);
        let tenant = tenant_fixture("acme-corp", DeploymentMode::Shared);
        let plane = plane_for(&tenant);

        let outcome = dispatcher
            .dispatch(&anomaly(Severity::High), &tenant, &plane, Instant::now())
            .await;
        publisher.shutdown().await;

        // The awaited priority publish and every topic sink failed, and
        // the outcome says so without anything propagating
        assert!(outcome.channels.iter().all(|c| !c.delivered));
        let priority = outcome
            .channels
            .iter()
            .find(|c| c.channel == PRIORITY_CHANNEL)
            .unwrap();
        assert!(!priority.delivered);
        assert!(priority.error.is_some());
    }

    #[tokio::test]
    async fn alert_latency_reflects_request_start() {
        let transport = Arc::new(CaptureTransport::default());
        let (dispatcher, publisher) = dispatcher_with(transport);
        let tenant = tenant_fixture("acme-corp", DeploymentMode::Shared);
        let plane = plane_for(&tenant);

        let started = Instant::now() - Duration::from_millis(50);
        let outcome = dispatcher
            .dispatch(&anomaly(Severity::Critical), &tenant, &plane, started)
            .await;
        publisher.shutdown().await;
        assert!(outcome.alert.processing_latency_ms >= 50);
    }
}
