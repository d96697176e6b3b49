//! Core entity types (spec.md §3). Each user-visible record carries a
//! globally unique identifier, creation/update timestamps, and a soft-delete
//! `status`. There is no hard delete in the core (see DESIGN NOTES §9).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Active,
    Deleted,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Active => "active",
            RecordStatus::Deleted => "deleted",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "deleted" => RecordStatus::Deleted,
            _ => RecordStatus::Active,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    Fact,
    Preference,
    Decision,
    Event,
    Person,
    Project,
    Meeting,
    Journal,
}

impl MemoryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryType::Fact => "fact",
            MemoryType::Preference => "preference",
            MemoryType::Decision => "decision",
            MemoryType::Event => "event",
            MemoryType::Person => "person",
            MemoryType::Project => "project",
            MemoryType::Meeting => "meeting",
            MemoryType::Journal => "journal",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "fact" => MemoryType::Fact,
            "preference" => MemoryType::Preference,
            "decision" => MemoryType::Decision,
            "event" => MemoryType::Event,
            "person" => MemoryType::Person,
            "project" => MemoryType::Project,
            "meeting" => MemoryType::Meeting,
            "journal" => MemoryType::Journal,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemorySource {
    Explicit,
    Extracted,
    Meeting,
    Journal,
    Migration,
}

impl MemorySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemorySource::Explicit => "explicit",
            MemorySource::Extracted => "extracted",
            MemorySource::Meeting => "meeting",
            MemorySource::Journal => "journal",
            MemorySource::Migration => "migration",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "explicit" => MemorySource::Explicit,
            "extracted" => MemorySource::Extracted,
            "meeting" => MemorySource::Meeting,
            "journal" => MemorySource::Journal,
            "migration" => MemorySource::Migration,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Owner,
    Family,
    All,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Owner => "owner",
            Visibility::Family => "family",
            Visibility::All => "all",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "owner" => Visibility::Owner,
            "family" => Visibility::Family,
            "all" => Visibility::All,
            _ => return None,
        })
    }
}

/// A semantic fact or summary. §3 "Memory".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    pub id: Uuid,
    pub summary: String,
    pub content: String,
    pub keywords: Vec<String>,
    pub memory_type: MemoryType,
    pub source: MemorySource,
    pub owner: String,
    pub visibility: Visibility,
    pub access_count: i64,
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub status: RecordStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Memory {
    pub fn new(
        summary: impl Into<String>,
        content: impl Into<String>,
        memory_type: MemoryType,
        source: MemorySource,
        owner: impl Into<String>,
        visibility: Visibility,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            summary: summary.into(),
            content: content.into(),
            keywords: Vec::new(),
            memory_type,
            source,
            owner: owner.into(),
            visibility,
            access_count: 0,
            last_accessed_at: None,
            status: RecordStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A fixed-width vector associated with a memory and the model that produced
/// it. Invariant: exactly one memory per embedding; a memory has at most one
/// embedding per active model (enforced by a unique index, see schema.rs).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEmbedding {
    pub id: Uuid,
    pub memory_id: Uuid,
    pub model: String,
    pub dimension: usize,
    pub vector: Vec<f32>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Assistant,
    System,
}

impl TurnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnRole::User => "user",
            TurnRole::Assistant => "assistant",
            TurnRole::System => "system",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "user" => TurnRole::User,
            "assistant" => TurnRole::Assistant,
            "system" => TurnRole::System,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub device_id: String,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub role: TurnRole,
    pub text: String,
    pub intent: Option<String>,
    pub confidence: Option<f32>,
    pub entities: serde_json::Value,
    pub latency_ms: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// A smart-home-side mirrored object. §3 "MirroredEntity".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirroredEntity {
    pub entity_id: String,
    pub domain: String,
    pub state: String,
    pub attributes: serde_json::Value,
    pub friendly_name: String,
    pub device_class: Option<String>,
    pub area: Option<String>,
    pub keywords: Vec<String>,
    pub aliases: Vec<String>,
    pub last_changed: DateTime<Utc>,
    pub access_count: i64,
    pub last_accessed_at: Option<DateTime<Utc>>,
}

impl MirroredEntity {
    /// §4.3: state freshness read — unavailable upstream means not available.
    pub fn is_available(&self) -> bool {
        self.state != "unavailable"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    LlmFallback,
    Correction,
    EntityFail,
    LowConfidence,
    ExplicitFeedback,
}

impl SignalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::LlmFallback => "llm_fallback",
            SignalKind::Correction => "correction",
            SignalKind::EntityFail => "entity_fail",
            SignalKind::LowConfidence => "low_confidence",
            SignalKind::ExplicitFeedback => "explicit_feedback",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "llm_fallback" => SignalKind::LlmFallback,
            "correction" => SignalKind::Correction,
            "entity_fail" => SignalKind::EntityFail,
            "low_confidence" => SignalKind::LowConfidence,
            "explicit_feedback" => SignalKind::ExplicitFeedback,
            _ => return None,
        })
    }
}

/// A production event. §3 "Signal". Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub id: Uuid,
    pub kind: SignalKind,
    pub utterance: String,
    pub normalized_text: String,
    pub context: serde_json::Value,
    pub expected_outcome: Option<String>,
    pub actual_outcome: Option<String>,
    pub stage_reached: Option<String>,
    pub confidence: Option<f32>,
    pub processed: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImprovementType {
    Alias,
    Exemplar,
    Synonym,
    Pattern,
    Template,
}

impl ImprovementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImprovementType::Alias => "alias",
            ImprovementType::Exemplar => "exemplar",
            ImprovementType::Synonym => "synonym",
            ImprovementType::Pattern => "pattern",
            ImprovementType::Template => "template",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "alias" => ImprovementType::Alias,
            "exemplar" => ImprovementType::Exemplar,
            "synonym" => ImprovementType::Synonym,
            "pattern" => ImprovementType::Pattern,
            "template" => ImprovementType::Template,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImprovementTier {
    Tier1 = 1,
    Tier2 = 2,
    Tier3 = 3,
}

impl ImprovementTier {
    pub fn as_i64(&self) -> i64 {
        *self as i64
    }

    pub fn from_i64(v: i64) -> Self {
        match v {
            2 => ImprovementTier::Tier2,
            3 => ImprovementTier::Tier3,
            _ => ImprovementTier::Tier1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImprovementSource {
    Automatic,
    UserSuggestion,
    VoiceCommand,
}

impl ImprovementSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImprovementSource::Automatic => "automatic",
            ImprovementSource::UserSuggestion => "user_suggestion",
            ImprovementSource::VoiceCommand => "voice_command",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "automatic" => ImprovementSource::Automatic,
            "user_suggestion" => ImprovementSource::UserSuggestion,
            "voice_command" => ImprovementSource::VoiceCommand,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImprovementStatus {
    Pending,
    Approved,
    Applied,
    RolledBack,
    Rejected,
}

impl ImprovementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImprovementStatus::Pending => "pending",
            ImprovementStatus::Approved => "approved",
            ImprovementStatus::Applied => "applied",
            ImprovementStatus::RolledBack => "rolled_back",
            ImprovementStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "pending" => ImprovementStatus::Pending,
            "approved" => ImprovementStatus::Approved,
            "applied" => ImprovementStatus::Applied,
            "rolled_back" => ImprovementStatus::RolledBack,
            "rejected" => ImprovementStatus::Rejected,
            _ => return None,
        })
    }
}

/// A proposed data change. §3 "Improvement". §4.10 documents the lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Improvement {
    pub id: Uuid,
    pub improvement_type: ImprovementType,
    pub tier: ImprovementTier,
    pub target: String,
    pub current_value: Option<serde_json::Value>,
    pub proposed_value: serde_json::Value,
    pub rationale: String,
    pub contributing_signal_ids: Vec<Uuid>,
    pub source: ImprovementSource,
    pub shadow_test_passed: Option<bool>,
    pub shadow_results: Option<serde_json::Value>,
    pub status: ImprovementStatus,
    pub monitoring_start: Option<DateTime<Utc>>,
    pub monitoring_end: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A labeled evaluation triple that must always classify correctly. §3 "GoldenCase".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoldenCase {
    pub id: Uuid,
    pub utterance: String,
    pub expected_intent: String,
    pub expected_entities: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
