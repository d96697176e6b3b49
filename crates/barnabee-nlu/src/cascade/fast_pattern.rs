//! S1 fast pattern stage (spec.md §4.5): exact match or Levenshtein distance
//! ≤1 against a curated table of ≈50 phrases. Target p95 5ms, threshold 0.95.
//! No teacher precedent for phrase-table fuzzy matching; `levenshtein` is
//! adopted from the reference pack for the edit-distance check.

use levenshtein::levenshtein;

use crate::intent::StageOutcome;

pub const THRESHOLD: f32 = 0.95;

/// (phrase, intent) pairs. A small, representative seed of the ≈50-entry
/// table the spec calls for; the Improvement Pipeline's `exemplar` proposals
/// extend this set over time via alias/exemplar data, not code changes.
const PHRASE_TABLE: &[(&str, &str)] = &[
    ("turn on the lights", "home_control.light"),
    ("turn off the lights", "home_control.light"),
    ("lock the front door", "home_control.lock"),
    ("unlock the front door", "home_control.lock"),
    ("what time is it", "information.time"),
    ("what is the weather", "information.weather"),
    ("set a timer", "tasks.timer_set"),
    ("cancel the timer", "tasks.timer_cancel"),
    ("remind me", "tasks.reminder"),
    ("add to my todo list", "tasks.todo_add"),
    ("remember that", "memory.create"),
    ("what do you remember about", "memory.query"),
    ("start a conversation", "mode.conversation_start"),
    ("stop listening", "mode.conversation_end"),
    ("start taking notes", "mode.notes_start"),
    ("hello", "conversation.greeting"),
    ("goodbye", "conversation.farewell"),
    ("help", "system.help"),
    ("say that again", "system.repeat"),
    ("cancel", "system.cancel"),
    ("play some music", "home_control.media"),
    ("pause the music", "home_control.media"),
    ("set the temperature", "home_control.climate"),
    ("open the garage door", "home_control.cover"),
    ("close the garage door", "home_control.cover"),
    ("movie time scene", "home_control.scene"),
];

pub struct FastPatternStage;

impl FastPatternStage {
    pub fn run(&self, normalized_text: &str) -> StageOutcome {
        for (phrase, intent) in PHRASE_TABLE {
            if normalized_text == *phrase {
                return StageOutcome::Decided { intent: intent.to_string(), confidence: 1.0 };
            }
        }
        for (phrase, intent) in PHRASE_TABLE {
            if levenshtein(normalized_text, phrase) <= 1 {
                return StageOutcome::Decided { intent: intent.to_string(), confidence: THRESHOLD };
            }
        }
        StageOutcome::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_is_fully_confident() {
        let stage = FastPatternStage;
        match stage.run("turn on the lights") {
            StageOutcome::Decided { intent, confidence } => {
                assert_eq!(intent, "home_control.light");
                assert_eq!(confidence, 1.0);
            }
            StageOutcome::Continue => panic!("expected a decision"),
        }
    }

    #[test]
    fn single_edit_distance_still_matches() {
        let stage = FastPatternStage;
        match stage.run("turn on the light") {
            StageOutcome::Decided { confidence, .. } => assert_eq!(confidence, THRESHOLD),
            StageOutcome::Continue => panic!("expected a decision within edit distance 1"),
        }
    }

    #[test]
    fn unrelated_text_falls_through() {
        let stage = FastPatternStage;
        assert!(matches!(stage.run("please compose a symphony"), StageOutcome::Continue));
    }
}
