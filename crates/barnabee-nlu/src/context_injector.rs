//! Context Injector (component #7, spec.md §4.7). Selects ≤N mirrored
//! entities for LLM prompting under a ~500-token budget, with a strategy
//! chosen per intent family. Grounded on `pagi-core::knowledge::kb_router`'s
//! per-topic routing table and `pagi-core::prompts`' token-budgeted assembly.

use barnabee_mirror::EntityCache;
use barnabee_storage::MirroredEntity;

pub const DEFAULT_TOKEN_BUDGET: usize = 500;
/// Fixed per-entity cost used for budget accounting (spec.md §4.7 "Token
/// estimation uses a fixed per-entity cost").
const TOKENS_PER_ENTITY: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentFamily {
    LightCover,
    Media,
    Climate,
    LockSecurity,
    Location,
    Weather,
    GeneralMinimal,
    TimerTime,
}

impl IntentFamily {
    pub fn from_intent(intent: &str) -> Self {
        match intent.split('.').next().unwrap_or("") {
            "home_control" if matches!(intent, "home_control.light" | "home_control.cover") => IntentFamily::LightCover,
            "home_control" if intent == "home_control.media" => IntentFamily::Media,
            "home_control" if intent == "home_control.climate" => IntentFamily::Climate,
            "home_control" if intent == "home_control.lock" => IntentFamily::LockSecurity,
            "information" if intent == "information.location" => IntentFamily::Location,
            "information" if intent == "information.weather" => IntentFamily::Weather,
            "information" if intent == "information.time" => IntentFamily::TimerTime,
            "tasks" => IntentFamily::TimerTime,
            _ => IntentFamily::GeneralMinimal,
        }
    }

    fn max_entities(&self) -> usize {
        match self {
            IntentFamily::LightCover => 10,
            IntentFamily::Media => 5,
            IntentFamily::Climate => 10,
            IntentFamily::LockSecurity => 10,
            IntentFamily::Location => 6,
            IntentFamily::Weather => 1,
            IntentFamily::GeneralMinimal => 2,
            IntentFamily::TimerTime => 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ContextEntity {
    pub entity_id: String,
    pub friendly_name: String,
    pub state_description: String,
}

pub struct ContextInjector<'a> {
    pub cache: &'a EntityCache,
}

impl<'a> ContextInjector<'a> {
    pub fn select(
        &self,
        intent: &str,
        mentioned_areas: &[String],
        speaker_area: Option<&str>,
        token_budget: usize,
    ) -> Vec<ContextEntity> {
        let family = IntentFamily::from_intent(intent);
        let max_entities = family.max_entities();
        if max_entities == 0 {
            return Vec::new();
        }

        let mut pool = match family {
            IntentFamily::LightCover | IntentFamily::Media => self.devices_for_intent(intent, mentioned_areas, speaker_area),
            IntentFamily::Climate => self.cache.get_by_domain("climate"),
            IntentFamily::LockSecurity => {
                let mut v = self.cache.get_by_domain("lock");
                v.extend(self.cache.get_by_domain("binary_sensor").into_iter().filter(|e| {
                    e.device_class.as_deref() == Some("door") || e.device_class.as_deref() == Some("window")
                }));
                v
            }
            IntentFamily::Location => self.cache.get_by_domain("person"),
            IntentFamily::Weather => self.cache.get_by_domain("weather").into_iter().take(1).collect(),
            IntentFamily::GeneralMinimal => self.cache.get_by_domain("person"),
            IntentFamily::TimerTime => Vec::new(),
        };

        // Privacy: camera entities are never included, regardless of strategy.
        pool.retain(|e| e.domain != "camera");

        let budget_cap = (token_budget.min(DEFAULT_TOKEN_BUDGET)) / TOKENS_PER_ENTITY;
        let limit = max_entities.min(budget_cap).min(pool.len());

        pool.into_iter().take(limit).map(|e| describe(e)).collect()
    }

    fn devices_for_intent(&self, intent: &str, mentioned_areas: &[String], speaker_area: Option<&str>) -> Vec<MirroredEntity> {
        let domain = match intent {
            "home_control.light" => "light",
            "home_control.cover" => "cover",
            "home_control.media" => "media_player",
            _ => "light",
        };

        if let Some(area) = mentioned_areas.first() {
            let devices = self.cache.get_by_domain_and_area(domain, area);
            if !devices.is_empty() {
                return devices;
            }
        }
        if let Some(area) = speaker_area {
            let devices = self.cache.get_by_domain_and_area(domain, area);
            if !devices.is_empty() {
                return devices;
            }
        }
        // Else: most-accessed devices of this domain.
        let mut devices = self.cache.get_by_domain(domain);
        devices.sort_by(|a, b| b.access_count.cmp(&a.access_count));
        devices
    }
}

fn describe(entity: MirroredEntity) -> ContextEntity {
    let description = match entity.domain.as_str() {
        "light" => {
            let brightness = entity
                .attributes
                .get("brightness_pct")
                .and_then(|v| v.as_i64())
                .map(|b| format!(" ({b}% brightness)"))
                .unwrap_or_default();
            format!("{}{}", entity.state, brightness)
        }
        "cover" => {
            let position = entity
                .attributes
                .get("position")
                .and_then(|v| v.as_i64())
                .map(|p| format!(" ({p}%)"))
                .unwrap_or_default();
            format!("{}{}", entity.state, position)
        }
        "person" => entity
            .attributes
            .get("zone")
            .and_then(|v| v.as_str())
            .unwrap_or(&entity.state)
            .to_string(),
        _ => entity.state.clone(),
    };

    ContextEntity { entity_id: entity.entity_id, friendly_name: entity.friendly_name, state_description: description }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timer_intent_gets_zero_entities() {
        assert_eq!(IntentFamily::from_intent("tasks.timer_set").max_entities(), 0);
    }

    #[test]
    fn weather_intent_caps_at_one_entity() {
        assert_eq!(IntentFamily::from_intent("information.weather").max_entities(), 1);
    }

    #[test]
    fn time_intent_gets_zero_entities() {
        assert_eq!(IntentFamily::from_intent("information.time").max_entities(), 0);
    }

    #[test]
    fn media_intent_caps_lower_than_light_and_cover() {
        assert_eq!(IntentFamily::from_intent("home_control.media").max_entities(), 5);
        assert_eq!(IntentFamily::from_intent("home_control.light").max_entities(), 10);
        assert_eq!(IntentFamily::from_intent("home_control.cover").max_entities(), 10);
    }
}
