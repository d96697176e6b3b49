//! S3 local model stage (spec.md §4.5): a fine-tuned small transformer,
//! softmax argmax over intent labels, threshold 0.80. Tie rule: top two
//! probabilities within 0.05 fall through to S4. The model itself is a
//! pluggable trait — this crate owns only the cascade gating logic, not
//! inference.

use crate::intent::StageOutcome;

pub const THRESHOLD: f32 = 0.80;
const TIE_MARGIN: f32 = 0.05;

/// A local intent classifier producing a softmax distribution over labels.
/// Implementations range from an embedded ONNX runtime to a lookup stub used
/// in tests; the cascade only needs the resulting distribution.
pub trait LocalClassifier: Send + Sync {
    fn classify(&self, normalized_text: &str) -> Vec<(String, f32)>;
}

pub struct LocalModelStage<'a> {
    pub model: &'a dyn LocalClassifier,
}

impl<'a> LocalModelStage<'a> {
    pub fn run(&self, normalized_text: &str) -> StageOutcome {
        let mut scored = self.model.classify(normalized_text);
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let Some((top_intent, top_prob)) = scored.first().cloned() else {
            return StageOutcome::Continue;
        };
        if let Some((_, second_prob)) = scored.get(1) {
            if (top_prob - second_prob).abs() <= TIE_MARGIN {
                return StageOutcome::Continue;
            }
        }
        if top_prob >= THRESHOLD {
            StageOutcome::Decided { intent: top_intent, confidence: top_prob }
        } else {
            StageOutcome::Continue
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubClassifier(Vec<(String, f32)>);
    impl LocalClassifier for StubClassifier {
        fn classify(&self, _text: &str) -> Vec<(String, f32)> {
            self.0.clone()
        }
    }

    #[test]
    fn clear_winner_decides() {
        let model = StubClassifier(vec![("home_control.light".into(), 0.9), ("home_control.climate".into(), 0.05)]);
        let stage = LocalModelStage { model: &model };
        assert!(matches!(stage.run("x"), StageOutcome::Decided { .. }));
    }

    #[test]
    fn near_tie_falls_through() {
        let model = StubClassifier(vec![("home_control.light".into(), 0.82), ("home_control.climate".into(), 0.80)]);
        let stage = LocalModelStage { model: &model };
        assert!(matches!(stage.run("x"), StageOutcome::Continue));
    }
}
