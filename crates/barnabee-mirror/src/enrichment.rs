//! Semantic enrichment of mirrored entities (spec.md §4.3 "Semantic
//! enrichment"). Pure functions over a friendly name / area / device class,
//! run on bulk fetch and on any name change. The alias set is additive —
//! callers merge the result into whatever aliases already exist, never
//! replace them.

const STRIPPABLE_SUFFIXES: &[&str] = &["lights", "light", "switch", "lock"];

const ABBREVIATIONS: &[(&str, &str)] = &[
    ("liv", "living"),
    ("bed", "bedroom"),
    ("kit", "kitchen"),
    ("gar", "garage"),
    ("bath", "bathroom"),
];

/// Splits on whitespace and underscores, lowercases, drops empty tokens.
pub fn derive_keywords(friendly_name: &str, area: Option<&str>, device_class: Option<&str>) -> Vec<String> {
    let mut keywords = Vec::new();
    for field in [Some(friendly_name), area, device_class].into_iter().flatten() {
        for token in field.split(|c: char| c.is_whitespace() || c == '_') {
            let token = token.trim().to_lowercase();
            if !token.is_empty() && !keywords.contains(&token) {
                keywords.push(token);
            }
        }
    }
    keywords
}

/// Derives additional aliases from a friendly name: suffix-stripped variants
/// plus abbreviation substitutions in both directions.
pub fn derive_aliases(friendly_name: &str) -> Vec<String> {
    let lower = friendly_name.to_lowercase();
    let mut aliases = vec![lower.clone()];

    for suffix in STRIPPABLE_SUFFIXES {
        if let Some(stripped) = lower.strip_suffix(suffix) {
            let stripped = stripped.trim();
            if !stripped.is_empty() {
                aliases.push(stripped.to_string());
            }
        }
    }

    let mut expanded = Vec::new();
    for alias in &aliases {
        for (short, long) in ABBREVIATIONS {
            if alias.contains(short) {
                expanded.push(alias.replace(short, long));
            }
            if alias.contains(long) {
                expanded.push(alias.replace(long, short));
            }
        }
    }
    aliases.extend(expanded);

    aliases.sort();
    aliases.dedup();
    aliases
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_split_on_whitespace_and_underscore() {
        let kw = derive_keywords("Living Room Light", Some("living_room"), Some("light"));
        assert!(kw.contains(&"living".to_string()));
        assert!(kw.contains(&"room".to_string()));
        assert!(kw.contains(&"light".to_string()));
    }

    #[test]
    fn aliases_strip_suffix_and_expand_abbreviations() {
        let aliases = derive_aliases("Liv Room Lights");
        assert!(aliases.iter().any(|a| a == "liv room lights"));
        assert!(aliases.iter().any(|a| a == "liv room"));
        assert!(aliases.iter().any(|a| a.contains("living room")));
    }

    #[test]
    fn alias_derivation_is_additive_never_lossy() {
        let aliases = derive_aliases("Garage Lock");
        assert!(aliases.contains(&"garage lock".to_string()));
    }
}
