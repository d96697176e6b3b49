//! Proposal routing (spec.md §4.10 "Nightly analysis" (2) and "User
//! suggestions and voice learning"). Turns a cluster, or a single user
//! suggestion / voice-teach command, into a `pending` Improvement.

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use barnabee_storage::{Improvement, ImprovementSource, ImprovementStatus, ImprovementTier, ImprovementType, SignalKind};

use crate::clustering::SignalCluster;

/// Extracts the dominant intent mentioned in a cluster's signal contexts, if
/// any signal recorded one (`llm_fallback` and `low_confidence` signals carry
/// `context.intent`; `entity_fail` signals carry `context.entity_id`).
fn modal_string_field(contexts: &[serde_json::Value], field: &str) -> Option<String> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    for ctx in contexts {
        if let Some(value) = ctx.get(field).and_then(|v| v.as_str()) {
            match counts.iter_mut().find(|(v, _)| v == value) {
                Some(entry) => entry.1 += 1,
                None => counts.push((value.to_string(), 1)),
            }
        }
    }
    counts.into_iter().max_by_key(|(_, c)| *c).map(|(v, _)| v)
}

/// Proposes an improvement for a cluster per the dominant signal kind
/// routing table. Returns `None` when the cluster carries no actionable
/// signal (e.g. a `correction` cluster missing the corrected text).
pub fn propose_for_cluster(cluster: &SignalCluster, contexts: &[serde_json::Value]) -> Option<Improvement> {
    let now = Utc::now();
    let (improvement_type, tier, target, proposed_value, rationale) = match cluster.kind {
        SignalKind::LlmFallback => {
            let intent = modal_string_field(contexts, "intent")?;
            (
                ImprovementType::Exemplar,
                ImprovementTier::Tier1,
                intent,
                json!({ "exemplars": cluster.utterances }),
                format!("{} utterances repeatedly fell through to the LLM fallback stage", cluster.utterances.len()),
            )
        }
        SignalKind::EntityFail => {
            let entity_id = modal_string_field(contexts, "entity_id")?;
            (
                ImprovementType::Alias,
                ImprovementTier::Tier1,
                entity_id,
                json!({ "aliases": cluster.utterances }),
                format!("{} entity-resolution fallbacks converged on the same target", cluster.utterances.len()),
            )
        }
        SignalKind::Correction => {
            let intent = modal_string_field(contexts, "intent")?;
            (
                ImprovementType::Pattern,
                ImprovementTier::Tier2,
                intent,
                json!({ "corrected_utterances": cluster.utterances }),
                format!("{} user corrections cluster around the same misclassification", cluster.utterances.len()),
            )
        }
        SignalKind::LowConfidence | SignalKind::ExplicitFeedback => return None,
    };

    Some(Improvement {
        id: Uuid::new_v4(),
        improvement_type,
        tier,
        target,
        current_value: None,
        proposed_value,
        rationale,
        contributing_signal_ids: cluster.signal_ids.clone(),
        source: ImprovementSource::Automatic,
        shadow_test_passed: None,
        shadow_results: None,
        status: ImprovementStatus::Pending,
        monitoring_start: None,
        monitoring_end: None,
        created_at: now,
        updated_at: now,
    })
}

/// A user suggestion or parsed voice-teach command bypasses clustering and
/// goes straight to shadow test (spec.md §4.10).
pub fn propose_from_user_suggestion(target: &str, alias: &str, voice_command: bool) -> Improvement {
    let now = Utc::now();
    Improvement {
        id: Uuid::new_v4(),
        improvement_type: ImprovementType::Synonym,
        tier: ImprovementTier::Tier1,
        target: target.to_string(),
        current_value: None,
        proposed_value: json!({ "alias": alias }),
        rationale: if voice_command {
            "voice-teach command".to_string()
        } else {
            "user-submitted synonym suggestion".to_string()
        },
        contributing_signal_ids: Vec::new(),
        source: if voice_command { ImprovementSource::VoiceCommand } else { ImprovementSource::UserSuggestion },
        shadow_test_passed: None,
        shadow_results: None,
        status: ImprovementStatus::Pending,
        monitoring_start: None,
        monitoring_end: None,
        created_at: now,
        updated_at: now,
    }
}
