//! In-memory entity view the mirror owns exclusively (spec.md §3 "Ownership
//! semantics"). Written only by the subscription worker; read by everyone
//! else. Modeled on `pagi-core::memory::MemoryManager`'s DashMap hot cache,
//! generalized to be the authority rather than a cache in front of one.

use std::sync::Arc;

use dashmap::DashMap;

use barnabee_storage::MirroredEntity;

#[derive(Default)]
pub struct EntityCache {
    by_id: Arc<DashMap<String, MirroredEntity>>,
}

impl EntityCache {
    pub fn new() -> Self {
        Self { by_id: Arc::new(DashMap::new()) }
    }

    pub fn upsert(&self, entity: MirroredEntity) {
        self.by_id.insert(entity.entity_id.clone(), entity);
    }

    /// Replaces the whole cache. Used after a bulk fetch, where the home
    /// system is the sole authority and no delta replay is attempted
    /// (spec.md §4.3 "Connection protocol").
    pub fn replace_all(&self, entities: Vec<MirroredEntity>) {
        self.by_id.clear();
        for entity in entities {
            self.by_id.insert(entity.entity_id.clone(), entity);
        }
    }

    pub fn get_by_id(&self, id: &str) -> Option<MirroredEntity> {
        self.by_id.get(id).map(|e| e.clone())
    }

    pub fn invalidate(&self, id: &str) {
        self.by_id.remove(id);
    }

    pub fn get_by_domain(&self, domain: &str) -> Vec<MirroredEntity> {
        self.by_id
            .iter()
            .filter(|e| e.entity_id.split('.').next() == Some(domain))
            .map(|e| e.clone())
            .collect()
    }

    pub fn get_by_area(&self, area: &str) -> Vec<MirroredEntity> {
        self.by_id
            .iter()
            .filter(|e| e.area.as_deref() == Some(area))
            .map(|e| e.clone())
            .collect()
    }

    pub fn get_by_domain_and_area(&self, domain: &str, area: &str) -> Vec<MirroredEntity> {
        self.by_id
            .iter()
            .filter(|e| e.entity_id.split('.').next() == Some(domain) && e.area.as_deref() == Some(area))
            .map(|e| e.clone())
            .collect()
    }

    /// Matches against friendly name, keywords, and aliases. Case-insensitive
    /// substring match, optionally narrowed by domain/area.
    pub fn search(&self, text: &str, domain: Option<&str>, area: Option<&str>, limit: usize) -> Vec<MirroredEntity> {
        let needle = text.to_lowercase();
        let mut matches: Vec<MirroredEntity> = self
            .by_id
            .iter()
            .filter(|e| domain.map_or(true, |d| e.entity_id.split('.').next() == Some(d)))
            .filter(|e| area.map_or(true, |a| e.area.as_deref() == Some(a)))
            .filter(|e| {
                e.friendly_name.to_lowercase().contains(&needle)
                    || e.keywords.iter().any(|k| k.to_lowercase().contains(&needle))
                    || e.aliases.iter().any(|a| a.to_lowercase().contains(&needle))
            })
            .map(|e| e.clone())
            .collect();
        matches.truncate(limit);
        matches
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use barnabee_storage::MirroredEntity;
    use chrono::Utc;

    fn entity(id: &str, area: &str, name: &str) -> MirroredEntity {
        MirroredEntity {
            entity_id: id.to_string(),
            domain: id.split('.').next().unwrap().to_string(),
            state: "on".to_string(),
            attributes: serde_json::json!({}),
            friendly_name: name.to_string(),
            device_class: None,
            area: Some(area.to_string()),
            keywords: vec![],
            aliases: vec![],
            last_changed: Utc::now(),
            access_count: 0,
            last_accessed_at: None,
        }
    }

    #[test]
    fn queries_filter_by_domain_and_area() {
        let cache = EntityCache::new();
        cache.upsert(entity("light.kitchen_main", "kitchen", "Kitchen Main Light"));
        cache.upsert(entity("lock.front_door", "entryway", "Front Door Lock"));

        assert_eq!(cache.get_by_domain("light").len(), 1);
        assert_eq!(cache.get_by_area("entryway").len(), 1);
        assert_eq!(cache.get_by_domain_and_area("light", "kitchen").len(), 1);
        assert!(cache.get_by_domain_and_area("light", "entryway").is_empty());
    }

    #[test]
    fn search_matches_friendly_name_case_insensitively() {
        let cache = EntityCache::new();
        cache.upsert(entity("light.kitchen_main", "kitchen", "Kitchen Main Light"));
        let hits = cache.search("KITCHEN", None, None, 10);
        assert_eq!(hits.len(), 1);
    }
}
