// plantpulse-ingest-core/src/observability.rs
// Prometheus metric families for the ingestion data plane

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
    GaugeVec,
};

use crate::models::{Anomaly, FanoutOutcome};

/// Process-wide observability sink. One instance lives in the runtime and
/// every component records through typed methods rather than touching
/// metric families directly.
pub struct MetricsSink {
    registry: Registry,
    tenant_requests: IntCounterVec,
    alerts_total: IntCounterVec,
    severity_score: GaugeVec,
    sensor_value: GaugeVec,
    fanout_results: IntCounterVec,
    publisher_queue_depth: IntGauge,
    sla_violations: IntCounterVec,
    ingest_latency_ms: HistogramVec,
}

impl MetricsSink {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let tenant_requests = IntCounterVec::new(
            Opts::new("tenant_requests_total", "Requests handled per tenant"),
            &["tenant"],
        )?;
        let alerts_total = IntCounterVec::new(
            Opts::new("alerts_total", "Alerts created by kind and severity"),
            &["tenant", "equipment", "kind", "severity"],
        )?;
        let severity_score = GaugeVec::new(
            Opts::new("anomaly_severity_score", "Last observed anomaly severity score"),
            &["tenant", "equipment"],
        )?;
        let sensor_value = GaugeVec::new(
            Opts::new("sensor_reading_value", "Last anomalous sensor value by metric"),
            &["tenant", "equipment", "metric", "threshold"],
        )?;
        let fanout_results = IntCounterVec::new(
            Opts::new("storage_fanout_total", "Storage fan-out attempts per tier and outcome"),
            &["tier", "outcome"],
        )?;
        let publisher_queue_depth = IntGauge::new(
            "publisher_critical_queue_depth",
            "Messages waiting in the critical publish queue",
        )?;
        let sla_violations = IntCounterVec::new(
            Opts::new("ingest_sla_violations_total", "Requests exceeding the latency target"),
            &["tenant"],
        )?;
        let ingest_latency_ms = HistogramVec::new(
            HistogramOpts::new("ingest_latency_ms", "End-to-end critical path latency")
                .buckets(vec![5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0]),
            &["tenant"],
        )?;

        registry.register(Box::new(tenant_requests.clone()))?;
        registry.register(Box::new(alerts_total.clone()))?;
        registry.register(Box::new(severity_score.clone()))?;
        registry.register(Box::new(sensor_value.clone()))?;
        registry.register(Box::new(fanout_results.clone()))?;
        registry.register(Box::new(publisher_queue_depth.clone()))?;
        registry.register(Box::new(sla_violations.clone()))?;
        registry.register(Box::new(ingest_latency_ms.clone()))?;

        Ok(Self {
            registry,
            tenant_requests,
            alerts_total,
            severity_score,
            sensor_value,
            fanout_results,
            publisher_queue_depth,
            sla_violations,
            ingest_latency_ms,
        })
    }

    /// Per-tenant usage tick, recorded at the top of every handled request
    pub fn record_tenant_request(&self, tenant_id: &str) {
        self.tenant_requests.with_label_values(&[tenant_id]).inc();
    }

    /// Alert counter plus the severity and per-metric gauges
    pub fn record_alert(&self, tenant_id: &str, anomaly: &Anomaly) {
        self.alerts_total
            .with_label_values(&[
                tenant_id,
                &anomaly.equipment_id,
                anomaly.kind.as_str(),
                anomaly.severity.as_str(),
            ])
            .inc();
        self.severity_score
            .with_label_values(&[tenant_id, &anomaly.equipment_id])
            .set(anomaly.severity.score());
        self.sensor_value
            .with_label_values(&[
                tenant_id,
                &anomaly.equipment_id,
                anomaly.kind.as_str(),
                &format!("{}", anomaly.threshold),
            ])
            .set(anomaly.value);
    }

    pub fn record_fanout(&self, outcome: &FanoutOutcome) {
        for (tier, ok) in [
            ("hot", outcome.hot_ok),
            ("warm", outcome.warm_ok),
            ("cold", outcome.cold_ok),
        ] {
            let label = if ok { "ok" } else { "failed" };
            self.fanout_results.with_label_values(&[tier, label]).inc();
        }
    }

    pub fn set_publisher_queue_depth(&self, depth: i64) {
        self.publisher_queue_depth.set(depth);
    }

    pub fn record_latency(&self, tenant_id: &str, latency_ms: u64, sla_compliant: bool) {
        self.ingest_latency_ms
            .with_label_values(&[tenant_id])
            .observe(latency_ms as f64);
        if !sla_compliant {
            self.sla_violations.with_label_values(&[tenant_id]).inc();
        }
    }

    /// Text exposition for the scrape endpoint
    pub fn export(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer)
            .map_err(|e| prometheus::Error::Msg(format!("metrics encoding: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AnomalyKind, Severity};
    use chrono::Utc;

    fn sample_anomaly() -> Anomaly {
        Anomaly {
            kind: AnomalyKind::CriticalTemperature,
            equipment_id: "FURNACE_003".to_string(),
            timestamp: Utc::now(),
            value: 195.7,
            threshold: 180.0,
            severity: Severity::Critical,
            message: "Critical temperature".to_string(),
        }
    }

    #[test]
    fn export_contains_recorded_families() {
        let sink = MetricsSink::new().unwrap();
        sink.record_tenant_request("acme-corp");
        sink.record_alert("acme-corp", &sample_anomaly());
        sink.record_latency("acme-corp", 42, true);

        let text = sink.export().unwrap();
        assert!(text.contains("tenant_requests_total"));
        assert!(text.contains("alerts_total"));
        assert!(text.contains("anomaly_severity_score"));
        assert!(text.contains("critical-temperature"));
    }

    #[test]
    fn sla_violation_counts_only_on_breach() {
        let sink = MetricsSink::new().unwrap();
        sink.record_latency("acme-corp", 120, true);
        sink.record_latency("acme-corp", 620, false);
        let text = sink.export().unwrap();
        assert!(text.contains("ingest_sla_violations_total{tenant=\"acme-corp\"} 1"));
    }
}
