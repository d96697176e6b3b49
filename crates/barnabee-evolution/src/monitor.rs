//! Hourly post-deployment monitoring (spec.md §4.10 "Monitoring and
//! rollback"). Compares a rolling metrics window against the baseline
//! captured immediately before deployment; any one trigger firing means an
//! automatic rollback.

#[derive(Debug, Clone, Copy)]
pub struct MetricsWindow {
    pub accuracy: f32,
    pub p95_latency_ms: u64,
    pub error_rate: f32,
    pub correction_rate: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct RollbackThresholds {
    pub accuracy_drop: f32,
    pub latency_increase_ms: i64,
    pub error_rate: f32,
    pub correction_rate_increase: f32,
}

impl Default for RollbackThresholds {
    fn default() -> Self {
        Self { accuracy_drop: 0.02, latency_increase_ms: 50, error_rate: 0.05, correction_rate_increase: 0.50 }
    }
}

/// Returns the reason the first tripped trigger fires, or `None` if the
/// deployment is healthy. Checked in the order spec.md lists them.
pub fn rollback_reason(baseline: &MetricsWindow, current: &MetricsWindow, thresholds: &RollbackThresholds) -> Option<String> {
    let accuracy_drop = baseline.accuracy - current.accuracy;
    if accuracy_drop > thresholds.accuracy_drop {
        return Some(format!("accuracy dropped by {:.1} percentage points", accuracy_drop * 100.0));
    }

    let latency_increase = current.p95_latency_ms as i64 - baseline.p95_latency_ms as i64;
    if latency_increase > thresholds.latency_increase_ms {
        return Some(format!("p95 latency increased by {latency_increase}ms"));
    }

    if current.error_rate > thresholds.error_rate {
        return Some(format!("error rate {:.1}% exceeds threshold", current.error_rate * 100.0));
    }

    if baseline.correction_rate > 0.0 {
        let increase = (current.correction_rate - baseline.correction_rate) / baseline.correction_rate;
        if increase >= thresholds.correction_rate_increase {
            return Some(format!("correction rate increased by {:.0}%", increase * 100.0));
        }
    } else if current.correction_rate > 0.0 {
        return Some("correction rate increased from zero baseline".to_string());
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_rollback_when_metrics_hold() {
        let baseline = MetricsWindow { accuracy: 0.96, p95_latency_ms: 200, error_rate: 0.01, correction_rate: 0.02 };
        let current = MetricsWindow { accuracy: 0.962, p95_latency_ms: 202, error_rate: 0.01, correction_rate: 0.02 };
        assert!(rollback_reason(&baseline, &current, &RollbackThresholds::default()).is_none());
    }

    #[test]
    fn rolls_back_on_accuracy_drop() {
        let baseline = MetricsWindow { accuracy: 0.96, p95_latency_ms: 200, error_rate: 0.01, correction_rate: 0.02 };
        let current = MetricsWindow { accuracy: 0.936, p95_latency_ms: 200, error_rate: 0.01, correction_rate: 0.02 };
        let reason = rollback_reason(&baseline, &current, &RollbackThresholds::default());
        assert!(reason.unwrap().contains("accuracy dropped"));
    }

    #[test]
    fn rolls_back_on_latency_regression() {
        let baseline = MetricsWindow { accuracy: 0.96, p95_latency_ms: 200, error_rate: 0.01, correction_rate: 0.02 };
        let current = MetricsWindow { accuracy: 0.96, p95_latency_ms: 260, error_rate: 0.01, correction_rate: 0.02 };
        let reason = rollback_reason(&baseline, &current, &RollbackThresholds::default());
        assert!(reason.unwrap().contains("latency"));
    }
}
