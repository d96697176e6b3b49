//! Shadow testing (spec.md §4.10 "Shadow test"). Runs the golden dataset
//! against the live classifier/resolver and a clone with the candidate
//! improvement applied; compares accuracy and p95 latency; no partial
//! rollout — an improvement either fully passes or is rejected outright.

use std::collections::HashSet;
use std::time::Instant;

use async_trait::async_trait;
use uuid::Uuid;

use barnabee_storage::GoldenCase;

/// Abstraction over "the classifier, as configured right now" so the shadow
/// test doesn't need to know how an improvement's candidate data gets
/// loaded — the caller constructs one `ClassifierUnderTest` from the current
/// data and one from a candidate snapshot with the improvement applied.
#[async_trait]
pub trait ClassifierUnderTest: Send + Sync {
    async fn classify(&self, utterance: &str) -> (String, u64);
}

pub struct ShadowTestReport {
    pub accuracy_old: f32,
    pub accuracy_new: f32,
    pub p95_latency_old_ms: u64,
    pub p95_latency_new_ms: u64,
    pub newly_failing: Vec<Uuid>,
    pub passed: bool,
}

const MIN_ACCURACY: f32 = 0.95;
const MAX_LATENCY_REGRESSION_MS: i64 = 10;

fn p95(mut samples: Vec<u64>) -> u64 {
    if samples.is_empty() {
        return 0;
    }
    samples.sort_unstable();
    let idx = ((samples.len() as f32) * 0.95).ceil() as usize;
    samples[idx.saturating_sub(1).min(samples.len() - 1)]
}

pub async fn run_shadow_test(
    golden: &[GoldenCase],
    old: &dyn ClassifierUnderTest,
    new: &dyn ClassifierUnderTest,
) -> ShadowTestReport {
    let mut old_latencies = Vec::with_capacity(golden.len());
    let mut new_latencies = Vec::with_capacity(golden.len());
    let mut old_pass = HashSet::new();
    let mut new_pass = HashSet::new();

    for case in golden {
        let started = Instant::now();
        let (old_intent, old_latency_hint) = old.classify(&case.utterance).await;
        old_latencies.push(if old_latency_hint > 0 { old_latency_hint } else { started.elapsed().as_millis() as u64 });
        if old_intent == case.expected_intent {
            old_pass.insert(case.id);
        }

        let started = Instant::now();
        let (new_intent, new_latency_hint) = new.classify(&case.utterance).await;
        new_latencies.push(if new_latency_hint > 0 { new_latency_hint } else { started.elapsed().as_millis() as u64 });
        if new_intent == case.expected_intent {
            new_pass.insert(case.id);
        }
    }

    let accuracy_old = old_pass.len() as f32 / golden.len().max(1) as f32;
    let accuracy_new = new_pass.len() as f32 / golden.len().max(1) as f32;
    let p95_old = p95(old_latencies);
    let p95_new = p95(new_latencies);

    let newly_failing: Vec<Uuid> = golden
        .iter()
        .filter(|c| old_pass.contains(&c.id) && !new_pass.contains(&c.id))
        .map(|c| c.id)
        .collect();

    let passed = accuracy_new >= MIN_ACCURACY
        && accuracy_new >= accuracy_old
        && (p95_new as i64 - p95_old as i64) <= MAX_LATENCY_REGRESSION_MS
        && newly_failing.is_empty();

    ShadowTestReport {
        accuracy_old,
        accuracy_new,
        p95_latency_old_ms: p95_old,
        p95_latency_new_ms: p95_new,
        newly_failing,
        passed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    struct FixedClassifier(&'static str);

    #[async_trait]
    impl ClassifierUnderTest for FixedClassifier {
        async fn classify(&self, _utterance: &str) -> (String, u64) {
            (self.0.to_string(), 5)
        }
    }

    fn case(expected: &str) -> GoldenCase {
        GoldenCase {
            id: Uuid::new_v4(),
            utterance: "turn on the light".to_string(),
            expected_intent: expected.to_string(),
            expected_entities: serde_json::json!({}),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn passes_when_new_matches_every_case() {
        let golden = vec![case("home_control.light"), case("home_control.light")];
        let old = FixedClassifier("home_control.light");
        let new = FixedClassifier("home_control.light");
        let report = run_shadow_test(&golden, &old, &new).await;
        assert!(report.passed);
        assert_eq!(report.accuracy_new, 1.0);
    }

    #[tokio::test]
    async fn fails_on_newly_failing_case() {
        let golden = vec![case("home_control.light"), case("home_control.light")];
        let old = FixedClassifier("home_control.light");
        let new = FixedClassifier("home_control.climate");
        let report = run_shadow_test(&golden, &old, &new).await;
        assert!(!report.passed);
        assert_eq!(report.newly_failing.len(), 2);
    }
}
