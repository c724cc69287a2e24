// plantpulse-ingest-core/src/data_plane/usage.rs
// Tenant usage statistics feeding the dedicated-pool promotion policy

use std::time::Instant;

use dashmap::DashMap;

/// Point-in-time usage figures for one tenant
#[derive(Debug, Clone, Copy, Default)]
pub struct UsageSnapshot {
    pub daily_volume_gb: f64,
    pub avg_queries_per_sec: f64,
    pub recent_sla_violations: u32,
}

/// Source of tenant usage figures. The promotion policy treats this as an
/// opaque input; a metrics backend can implement it against its own data.
pub trait UsageStats: Send + Sync {
    fn snapshot(&self, tenant_id: &str) -> UsageSnapshot;
}

struct TenantWindow {
    window_start: Instant,
    request_count: u64,
    sla_violations: Vec<Instant>,
}

/// In-process recorder fed by the ingest path.
///
/// Request rate is averaged over a rolling sixty-second window and SLA
/// violations are counted over the trailing hour. Daily volume has no
/// authoritative in-process source and reports zero, which leaves
/// promotion driven by tier, rate, and SLA signals until an external
/// backend implements `UsageStats`.
#[derive(Default)]
pub struct InProcessUsageRecorder {
    windows: DashMap<String, TenantWindow>,
}

const RATE_WINDOW_SECS: u64 = 60;
const VIOLATION_WINDOW_SECS: u64 = 3600;

impl InProcessUsageRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tick one handled request for the tenant
    pub fn record_request(&self, tenant_id: &str) {
        let now = Instant::now();
        let mut window = self.windows.entry(tenant_id.to_string()).or_insert(TenantWindow {
            window_start: now,
            request_count: 0,
            sla_violations: Vec::new(),
        });
        if now.duration_since(window.window_start).as_secs() >= RATE_WINDOW_SECS {
            window.window_start = now;
            window.request_count = 0;
        }
        window.request_count += 1;
    }

    /// Record a request that breached the end-to-end latency target
    pub fn record_sla_violation(&self, tenant_id: &str) {
        let now = Instant::now();
        let mut window = self.windows.entry(tenant_id.to_string()).or_insert(TenantWindow {
            window_start: now,
            request_count: 0,
            sla_violations: Vec::new(),
        });
        window
            .sla_violations
            .retain(|at| now.duration_since(*at).as_secs() < VIOLATION_WINDOW_SECS);
        window.sla_violations.push(now);
    }
}

impl UsageStats for InProcessUsageRecorder {
    fn snapshot(&self, tenant_id: &str) -> UsageSnapshot {
        let now = Instant::now();
        match self.windows.get(tenant_id) {
            Some(window) => {
                let elapsed = now.duration_since(window.window_start).as_secs_f64().max(1.0);
                UsageSnapshot {
                    daily_volume_gb: 0.0,
                    avg_queries_per_sec: window.request_count as f64 / elapsed,
                    recent_sla_violations: window
                        .sla_violations
                        .iter()
                        .filter(|at| now.duration_since(**at).as_secs() < VIOLATION_WINDOW_SECS)
                        .count() as u32,
                }
            }
            None => UsageSnapshot::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unseen_tenant_reports_zero_usage() {
        let recorder = InProcessUsageRecorder::new();
        let snapshot = recorder.snapshot("ghost");
        assert_eq!(snapshot.avg_queries_per_sec, 0.0);
        assert_eq!(snapshot.recent_sla_violations, 0);
    }

    #[test]
    fn sla_violations_accumulate() {
        let recorder = InProcessUsageRecorder::new();
        for _ in 0..7 {
            recorder.record_sla_violation("acme-corp");
        }
        assert_eq!(recorder.snapshot("acme-corp").recent_sla_violations, 7);
    }

    #[test]
    fn request_rate_reflects_recorded_requests() {
        let recorder = InProcessUsageRecorder::new();
        for _ in 0..120 {
            recorder.record_request("acme-corp");
        }
        assert!(recorder.snapshot("acme-corp").avg_queries_per_sec > 0.0);
    }
}
