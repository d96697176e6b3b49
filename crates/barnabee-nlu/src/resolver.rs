//! Entity Resolver (component #6, spec.md §4.6). Two-phase: a fast
//! exact/fuzzy match against the Entity Mirror's lookups, falling back to an
//! LLM-assisted resolution that must never come back empty-handed. Grounded
//! on `pagi-core::orchestrator::protocols` for the sequential-phase shape and
//! `pagi-skills::recall_past_actions` for "most recently used" as a
//! last-resort candidate.

use std::sync::Arc;

use chrono::Utc;
use levenshtein::levenshtein;
use serde::Deserialize;
use uuid::Uuid;

use barnabee_mirror::EntityCache;
use barnabee_storage::{
    Improvement, ImprovementSource, ImprovementStatus, ImprovementTier, ImprovementType, Signal, SignalKind, Store,
};

use crate::error::NluResult;
use crate::providers::LlmProvider;

pub const FAST_MATCH_THRESHOLD: f32 = 0.85;

#[derive(Debug, Clone)]
pub struct ResolvedEntity {
    pub entity_id: String,
    pub friendly_name: String,
    pub confidence: f32,
    pub alternatives: Vec<String>,
    pub guessed: bool,
}

#[derive(Debug, Deserialize)]
struct LlmResolution {
    entity_id: String,
    friendly_name: String,
    confidence: f32,
    #[serde(default)]
    alternatives: Vec<String>,
    #[serde(default)]
    suggested_alias: Option<String>,
}

pub struct EntityResolver<'a> {
    pub cache: &'a EntityCache,
    pub store: Arc<Store>,
    pub llm_provider: &'a dyn LlmProvider,
}

impl<'a> EntityResolver<'a> {
    /// Phase A: exact/fuzzy match scoped by domain and, when known, area.
    fn phase_a(&self, mention: &str, domain: Option<&str>, area: Option<&str>) -> Vec<(ResolvedEntity, f32)> {
        let candidates = match (domain, area) {
            (Some(d), Some(a)) => self.cache.get_by_domain_and_area(d, a),
            (Some(d), None) => self.cache.get_by_domain(d),
            (None, Some(a)) => self.cache.get_by_area(a),
            (None, None) => self.cache.search(mention, None, None, 50),
        };

        let needle = mention.to_lowercase();
        let mut scored: Vec<(ResolvedEntity, f32)> = candidates
            .into_iter()
            .map(|entity| {
                let score = fuzzy_score(&needle, &entity.friendly_name, &entity.aliases, &entity.keywords);
                (
                    ResolvedEntity {
                        entity_id: entity.entity_id,
                        friendly_name: entity.friendly_name,
                        confidence: score,
                        alternatives: Vec::new(),
                        guessed: false,
                    },
                    score,
                )
            })
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored
    }

    /// Never returns `None` when `domain` has at least one live candidate —
    /// per spec.md §4.6 "Never-fail contract" — falling back to a guessed,
    /// lowered-confidence pick rather than reporting failure.
    pub async fn resolve(
        &self,
        mention: &str,
        intent: &str,
        domain: Option<&str>,
        speaker_area: Option<&str>,
    ) -> NluResult<Option<ResolvedEntity>> {
        let phase_a = self.phase_a(mention, domain, speaker_area);

        if let Some((top, score)) = phase_a.first() {
            if *score >= FAST_MATCH_THRESHOLD {
                // A direct Phase-A hit is a successful resolution, not a
                // failure signal: only the fallback paths below feed the
                // Improvement Pipeline's entity_fail clustering.
                return Ok(Some(top.clone()));
            }
        }

        let area_entities = speaker_area.map(|a| self.cache.get_by_area(a)).unwrap_or_default();
        let all_candidates = domain.map(|d| self.cache.get_by_domain(d)).unwrap_or_default();

        let schema = serde_json::json!({
            "type": "object",
            "properties": {
                "entity_id": {"type": "string"},
                "friendly_name": {"type": "string"},
                "confidence": {"type": "number", "minimum": 0.0, "maximum": 1.0},
                "alternatives": {"type": "array", "items": {"type": "string"}},
                "suggested_alias": {"type": "string"},
            },
            "required": ["entity_id", "friendly_name", "confidence"],
        });
        let user_prompt = serde_json::json!({
            "utterance": mention,
            "intent": intent,
            "speaker_area": speaker_area,
            "area_entities": area_entities.iter().map(|e| &e.entity_id).collect::<Vec<_>>(),
            "candidate_entities": all_candidates.iter().map(|e| &e.entity_id).collect::<Vec<_>>(),
            "near_miss_candidates": phase_a.iter().take(5).map(|(r, s)| (r.entity_id.clone(), s)).collect::<Vec<_>>(),
        })
        .to_string();

        let llm_result = self
            .llm_provider
            .complete_json(
                "Resolve the natural-language device reference to a concrete entity identifier.",
                &user_prompt,
                &schema,
            )
            .await;

        let resolved = match llm_result {
            Ok(value) => serde_json::from_value::<LlmResolution>(value).ok(),
            Err(_) => None,
        };

        if let Some(resolution) = resolved {
            if self.cache.get_by_id(&resolution.entity_id).is_some() {
                self.record_resolution(mention, intent, &resolution.entity_id, resolution.confidence, "phase_b").await;
                if let Some(alias) = resolution.suggested_alias {
                    self.submit_alias_suggestion(&resolution.entity_id, &alias).await;
                }
                return Ok(Some(ResolvedEntity {
                    entity_id: resolution.entity_id,
                    friendly_name: resolution.friendly_name,
                    confidence: resolution.confidence,
                    alternatives: resolution.alternatives,
                    guessed: false,
                }));
            }
        }

        // LLM result missing or hallucinated: fall back to the best Phase-A
        // candidate, then the most recently-changed entity in the area.
        if let Some((top, score)) = phase_a.into_iter().next() {
            self.record_resolution(mention, intent, &top.entity_id, score, "phase_a_fallback").await;
            return Ok(Some(ResolvedEntity { guessed: true, ..top }));
        }

        if let Some(recent) = most_recently_changed(&area_entities) {
            self.record_resolution(mention, intent, &recent.entity_id, 0.3, "recency_fallback").await;
            return Ok(Some(ResolvedEntity {
                entity_id: recent.entity_id.clone(),
                friendly_name: recent.friendly_name.clone(),
                confidence: 0.3,
                alternatives: Vec::new(),
                guessed: true,
            }));
        }

        Ok(None)
    }

    async fn record_resolution(&self, mention: &str, intent: &str, entity_id: &str, confidence: f32, path: &str) {
        let signal = Signal {
            id: Uuid::new_v4(),
            kind: SignalKind::EntityFail,
            utterance: mention.to_string(),
            normalized_text: mention.to_string(),
            context: serde_json::json!({"intent": intent, "entity_id": entity_id, "path": path}),
            expected_outcome: None,
            actual_outcome: Some(entity_id.to_string()),
            stage_reached: Some(path.to_string()),
            confidence: Some(confidence),
            processed: false,
            created_at: Utc::now(),
        };
        let _ = self.store.spawn_blocking(move |s| s.record_signal(&signal)).await;
    }

    async fn submit_alias_suggestion(&self, entity_id: &str, alias: &str) {
        let improvement = Improvement {
            id: Uuid::new_v4(),
            improvement_type: ImprovementType::Alias,
            tier: ImprovementTier::Tier1,
            target: entity_id.to_string(),
            current_value: None,
            proposed_value: serde_json::json!({"alias": alias}),
            rationale: "LLM-suggested alias from an entity-resolution fallback".to_string(),
            contributing_signal_ids: Vec::new(),
            source: ImprovementSource::UserSuggestion,
            shadow_test_passed: None,
            shadow_results: None,
            status: ImprovementStatus::Pending,
            monitoring_start: None,
            monitoring_end: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let _ = self.store.spawn_blocking(move |s| s.create_improvement(&improvement)).await;
    }
}

fn fuzzy_score(needle: &str, friendly_name: &str, aliases: &[String], keywords: &[String]) -> f32 {
    let name_lower = friendly_name.to_lowercase();
    if name_lower == needle || aliases.iter().any(|a| a == needle) {
        return 1.0;
    }
    let mut best = normalized_similarity(needle, &name_lower);
    for alias in aliases {
        best = best.max(normalized_similarity(needle, alias));
    }
    for keyword in keywords {
        if needle.contains(keyword.as_str()) {
            best = best.max(0.6);
        }
    }
    best
}

fn normalized_similarity(a: &str, b: &str) -> f32 {
    let distance = levenshtein(a, b) as f32;
    let max_len = a.len().max(b.len()).max(1) as f32;
    (1.0 - distance / max_len).max(0.0)
}

fn most_recently_changed(entities: &[barnabee_storage::MirroredEntity]) -> Option<&barnabee_storage::MirroredEntity> {
    entities.iter().max_by_key(|e| e.last_changed)
}
