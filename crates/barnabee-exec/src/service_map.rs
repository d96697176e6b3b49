//! Maps a classified intent to a (domain, service) pair and builds the
//! service-call payload from extracted slots (spec.md §4.8 "Service
//! mapping"). A thin lookup table, in the spirit of the teacher's const
//! pattern tables rather than a general rules engine — there's a fixed,
//! small set of intents this executor ever acts on.

use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CommandSlots {
    pub brightness_pct: Option<u8>,
    pub color_temperature: Option<u32>,
    pub temperature: Option<f32>,
    pub volume_fraction: Option<f32>,
    pub cover_position: Option<u8>,
}

pub struct ServiceTarget {
    pub domain: &'static str,
    pub service: &'static str,
}

/// Returns `None` when the intent has no executable service mapping (e.g.
/// pure information or conversation intents never reach the executor).
pub fn map_intent(intent: &str) -> Option<ServiceTarget> {
    Some(match intent {
        "home_control.light" => ServiceTarget { domain: "light", service: "turn_on" },
        "home_control.climate" => ServiceTarget { domain: "climate", service: "set_temperature" },
        "home_control.lock" => ServiceTarget { domain: "lock", service: "lock" },
        "home_control.cover" => ServiceTarget { domain: "cover", service: "set_cover_position" },
        "home_control.media" => ServiceTarget { domain: "media_player", service: "volume_set" },
        "home_control.scene" => ServiceTarget { domain: "scene", service: "turn_on" },
        _ => return None,
    })
}

pub fn build_payload(target: &ServiceTarget, slots: &CommandSlots) -> Value {
    match (target.domain, target.service) {
        ("light", "turn_on") => {
            let mut data = json!({});
            if let Some(pct) = slots.brightness_pct {
                data["brightness_pct"] = json!(pct);
            }
            if let Some(temp) = slots.color_temperature {
                data["color_temp_kelvin"] = json!(temp);
            }
            data
        }
        ("climate", "set_temperature") => json!({ "temperature": slots.temperature }),
        ("cover", "set_cover_position") => json!({ "position": slots.cover_position }),
        ("media_player", "volume_set") => json!({ "volume_level": slots.volume_fraction }),
        _ => json!({}),
    }
}

/// Intents that may be issued as a single service call with a list of
/// entity ids rather than one call per entity (spec.md §4.8).
pub fn supports_batched_target(domain: &str) -> bool {
    matches!(domain, "light" | "cover" | "media_player" | "switch")
}
