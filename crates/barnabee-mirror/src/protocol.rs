//! Wire messages for the home-automation connection (spec.md §6 upstream
//! interface): `{auth, auth_ok/required, subscribe_events(state_changed),
//! event(state_changed), call_service, get_states, result}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    Auth { access_token: String },
    SubscribeEvents { id: u64, event_type: &'static str },
    GetStates { id: u64 },
    CallService { id: u64, domain: String, service: String, target: Value, service_data: Value },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    AuthRequired { ha_version: Option<String> },
    AuthOk { ha_version: Option<String> },
    AuthInvalid { message: Option<String> },
    Event { id: u64, event: EventPayload },
    Result { id: u64, success: bool, result: Option<Value>, error: Option<ResultError> },
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResultError {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventPayload {
    pub event_type: String,
    pub data: StateChangedData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StateChangedData {
    pub entity_id: String,
    pub new_state: Option<RawState>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawState {
    pub entity_id: String,
    pub state: String,
    #[serde(default)]
    pub attributes: Value,
    pub last_changed: String,
}
