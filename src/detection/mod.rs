// plantpulse-ingest-core/src/detection/mod.rs
// Threshold-band anomaly detection over single readings

use serde::{Deserialize, Serialize};

use crate::models::{Anomaly, AnomalyKind, SensorReading, Severity};

/// Threshold bands, fixed at process start
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    pub temperature_normal_min: f64,
    pub temperature_high: f64,
    pub temperature_critical: f64,
    pub vibration_high: f64,
    pub vibration_critical: f64,
    pub pressure_normal_min: f64,
    pub pressure_high: f64,
    pub pressure_critical: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            temperature_normal_min: 0.0,
            temperature_high: 150.0,
            temperature_critical: 180.0,
            vibration_high: 2.0,
            vibration_critical: 5.0,
            pressure_normal_min: 50.0,
            pressure_high: 500.0,
            pressure_critical: 800.0,
        }
    }
}

/// Evaluates one reading against the configured bands.
///
/// Pure and allocation-bounded; each metric contributes at most one
/// anomaly, the highest applicable band winning.
pub struct AnomalyDetector {
    config: DetectorConfig,
}

impl AnomalyDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    pub fn detect(&self, reading: &SensorReading) -> Vec<Anomaly> {
        let mut anomalies = Vec::with_capacity(3);
        if let Some(temperature) = reading.temperature {
            if let Some(anomaly) = self.evaluate_temperature(reading, temperature) {
                anomalies.push(anomaly);
            }
        }
        if let Some(vibration) = reading.vibration {
            if let Some(anomaly) = self.evaluate_vibration(reading, vibration) {
                anomalies.push(anomaly);
            }
        }
        if let Some(pressure) = reading.pressure {
            if let Some(anomaly) = self.evaluate_pressure(reading, pressure) {
                anomalies.push(anomaly);
            }
        }
        anomalies
    }

    fn evaluate_temperature(&self, reading: &SensorReading, value: f64) -> Option<Anomaly> {
        let c = &self.config;
        if value > c.temperature_critical {
            Some(anomaly(
                reading,
                AnomalyKind::CriticalTemperature,
                value,
                c.temperature_critical,
                Severity::Critical,
                format!(
                    "Critical temperature {:.1}C exceeds threshold {:.1}C",
                    value, c.temperature_critical
                ),
            ))
        } else if value > c.temperature_high {
            Some(anomaly(
                reading,
                AnomalyKind::HighTemperature,
                value,
                c.temperature_high,
                Severity::High,
                format!(
                    "High temperature {:.1}C exceeds threshold {:.1}C",
                    value, c.temperature_high
                ),
            ))
        } else if value < c.temperature_normal_min {
            Some(anomaly(
                reading,
                AnomalyKind::HighTemperature,
                value,
                c.temperature_normal_min,
                Severity::Medium,
                format!(
                    "Low temperature {:.1}C below normal floor {:.1}C",
                    value, c.temperature_normal_min
                ),
            ))
        } else {
            None
        }
    }

    fn evaluate_vibration(&self, reading: &SensorReading, value: f64) -> Option<Anomaly> {
        let c = &self.config;
        if value > c.vibration_critical {
            Some(anomaly(
                reading,
                AnomalyKind::CriticalVibration,
                value,
                c.vibration_critical,
                Severity::Critical,
                format!(
                    "Critical vibration {:.2} mm/s exceeds threshold {:.2} mm/s",
                    value, c.vibration_critical
                ),
            ))
        } else if value > c.vibration_high {
            Some(anomaly(
                reading,
                AnomalyKind::HighVibration,
                value,
                c.vibration_high,
                Severity::High,
                format!(
                    "High vibration {:.2} mm/s exceeds threshold {:.2} mm/s",
                    value, c.vibration_high
                ),
            ))
        } else {
            None
        }
    }

    fn evaluate_pressure(&self, reading: &SensorReading, value: f64) -> Option<Anomaly> {
        let c = &self.config;
        if value > c.pressure_critical {
            Some(anomaly(
                reading,
                AnomalyKind::CriticalPressure,
                value,
                c.pressure_critical,
                Severity::Critical,
                format!(
                    "Critical pressure {:.1} kPa exceeds threshold {:.1} kPa",
                    value, c.pressure_critical
                ),
            ))
        } else if value > c.pressure_high {
            // Moderately-high and low pressure share the abnormal kind at
            // medium severity
            Some(anomaly(
                reading,
                AnomalyKind::AbnormalPressure,
                value,
                c.pressure_high,
                Severity::Medium,
                format!(
                    "Abnormal pressure {:.1} kPa above normal band {:.1} kPa",
                    value, c.pressure_high
                ),
            ))
        } else if value < c.pressure_normal_min {
            Some(anomaly(
                reading,
                AnomalyKind::AbnormalPressure,
                value,
                c.pressure_normal_min,
                Severity::Medium,
                format!(
                    "Abnormal pressure {:.1} kPa below normal band {:.1} kPa",
                    value, c.pressure_normal_min
                ),
            ))
        } else {
            None
        }
    }
}

fn anomaly(
    reading: &SensorReading,
    kind: AnomalyKind,
    value: f64,
    threshold: f64,
    severity: Severity,
    message: String,
) -> Anomaly {
    Anomaly {
        kind,
        equipment_id: reading.equipment_id.clone(),
        timestamp: reading.timestamp,
        value,
        threshold,
        severity,
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn detector() -> AnomalyDetector {
        AnomalyDetector::new(DetectorConfig::default())
    }

    fn reading(temperature: Option<f64>, vibration: Option<f64>, pressure: Option<f64>) -> SensorReading {
        SensorReading {
            equipment_id: "PUMP_001".to_string(),
            timestamp: "2025-11-23T10:30:00Z".parse().unwrap(),
            temperature,
            vibration,
            pressure,
            power_consumption: None,
            facility_id: None,
            line_id: None,
            custom_metrics: HashMap::new(),
            ingestion_timestamp: None,
            source: None,
            has_anomalies: None,
            anomalies: Vec::new(),
        }
    }

    #[test]
    fn normal_reading_produces_no_anomalies() {
        let anomalies = detector().detect(&reading(Some(75.0), Some(1.2), Some(250.0)));
        assert!(anomalies.is_empty());
    }

    #[test]
    fn critical_temperature_wins_over_high() {
        let anomalies = detector().detect(&reading(Some(195.0), None, None));
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].kind, AnomalyKind::CriticalTemperature);
        assert_eq!(anomalies[0].severity, Severity::Critical);
        assert_eq!(anomalies[0].threshold, 180.0);
    }

    #[test]
    fn high_temperature_band() {
        let anomalies = detector().detect(&reading(Some(165.0), None, None));
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].kind, AnomalyKind::HighTemperature);
        assert_eq!(anomalies[0].severity, Severity::High);
    }

    #[test]
    fn low_temperature_is_medium_with_low_message() {
        let anomalies = detector().detect(&reading(Some(-15.0), None, None));
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].severity, Severity::Medium);
        assert!(anomalies[0].message.contains("Low temperature"));
    }

    #[test]
    fn band_boundaries_are_exclusive() {
        assert!(detector().detect(&reading(Some(150.0), None, None)).is_empty());
        assert!(detector().detect(&reading(None, Some(2.0), None)).is_empty());
        assert!(detector().detect(&reading(None, None, Some(500.0))).is_empty());
        assert!(detector().detect(&reading(None, None, Some(50.0))).is_empty());
    }

    #[test]
    fn vibration_bands() {
        let high = detector().detect(&reading(None, Some(3.0), None));
        assert_eq!(high[0].kind, AnomalyKind::HighVibration);
        assert_eq!(high[0].severity, Severity::High);

        let critical = detector().detect(&reading(None, Some(8.2), None));
        assert_eq!(critical[0].kind, AnomalyKind::CriticalVibration);
        assert_eq!(critical[0].severity, Severity::Critical);
    }

    #[test]
    fn pressure_bands_share_abnormal_kind_at_medium() {
        let above = detector().detect(&reading(None, None, Some(620.0)));
        assert_eq!(above[0].kind, AnomalyKind::AbnormalPressure);
        assert_eq!(above[0].severity, Severity::Medium);

        let below = detector().detect(&reading(None, None, Some(20.0)));
        assert_eq!(below[0].kind, AnomalyKind::AbnormalPressure);
        assert_eq!(below[0].severity, Severity::Medium);
        assert!(below[0].message.contains("below normal band"));

        let critical = detector().detect(&reading(None, None, Some(1150.0)));
        assert_eq!(critical[0].kind, AnomalyKind::CriticalPressure);
        assert_eq!(critical[0].severity, Severity::Critical);
    }

    #[test]
    fn triple_critical_reading_produces_three_anomalies() {
        let anomalies = detector().detect(&reading(Some(205.9), Some(8.2), Some(1150.0)));
        assert_eq!(anomalies.len(), 3);
        assert!(anomalies.iter().all(|a| a.severity == Severity::Critical));
    }

    #[test]
    fn absent_metrics_are_not_evaluated() {
        assert!(detector().detect(&reading(None, None, None)).is_empty());
    }
}
