use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    #[default]
    Command,
    Conversation,
    Notes,
    Journal,
    Ambient,
}

impl SessionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionMode::Command => "command",
            SessionMode::Conversation => "conversation",
            SessionMode::Notes => "notes",
            SessionMode::Journal => "journal",
            SessionMode::Ambient => "ambient",
        }
    }
}

/// The per-device frame held by the Session Store (spec.md §4.2). `context`
/// is an opaque conversation frame the Request Orchestrator reads and
/// rewrites; the store itself never interprets it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSession {
    pub device_id: String,
    pub context: serde_json::Value,
    pub mode: SessionMode,
    pub speaker: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl DeviceSession {
    pub fn new(device_id: impl Into<String>, ttl: chrono::Duration) -> Self {
        Self {
            device_id: device_id.into(),
            context: serde_json::Value::Null,
            mode: SessionMode::default(),
            speaker: None,
            expires_at: Utc::now() + ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// Published whenever the Entity Mirror updates its in-memory view, so other
/// workers can invalidate their own per-entity caches (spec.md §4.3 "State
/// update").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityChanged {
    pub entity_id: String,
    pub new_state: String,
}
