//! Text Normalizer (component #4, spec.md §4.4). A pure function: lowercase,
//! strip wake words, expand contractions, strip politeness tokens on word
//! boundaries, collapse whitespace. Grounded on
//! `pagi-core::security::redaction::SAORedactor` for the word-boundary regex
//! idiom and const-table style.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

const DEFAULT_WAKE_WORDS: &[&str] = &["hey barnabee", "barnabee", "ok barnabee"];

const CONTRACTIONS: &[(&str, &str)] = &[
    ("won't", "will not"),
    ("can't", "cannot"),
    ("n't", " not"),
    ("i'm", "i am"),
    ("you're", "you are"),
    ("it's", "it is"),
    ("that's", "that is"),
    ("what's", "what is"),
    ("let's", "let us"),
    ("i'll", "i will"),
    ("i've", "i have"),
    ("i'd", "i would"),
];

const POLITENESS_TOKENS: &[&str] = &["please", "thanks", "thank you", "could you", "would you"];

fn whitespace_collapse() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").unwrap())
}

/// Compiles one case-insensitive, word-boundary regex matching any politeness
/// token. Built once; reused across every call.
fn politeness_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let escaped: Vec<String> = POLITENESS_TOKENS.iter().map(|t| regex::escape(t)).collect();
        Regex::new(&format!(r"(?i)\b(?:{})\b", escaped.join("|"))).unwrap()
    })
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NormalizationMetadata {
    pub wake_word_stripped: Option<String>,
    pub contractions_expanded: Vec<String>,
    pub politeness_tokens_stripped: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedUtterance {
    pub raw_text: String,
    pub normalized_text: String,
    pub metadata: NormalizationMetadata,
}

pub struct TextNormalizer {
    wake_words: Vec<String>,
}

impl Default for TextNormalizer {
    fn default() -> Self {
        Self { wake_words: DEFAULT_WAKE_WORDS.iter().map(|s| s.to_string()).collect() }
    }
}

impl TextNormalizer {
    pub fn new(wake_words: Vec<String>) -> Self {
        Self { wake_words }
    }

    pub fn normalize(&self, raw_text: &str) -> NormalizedUtterance {
        let mut metadata = NormalizationMetadata::default();
        let mut text = raw_text.to_lowercase();

        text = self.strip_wake_word(&text, &mut metadata);
        text = self.expand_contractions(&text, &mut metadata);
        text = self.strip_politeness_tokens(&text, &mut metadata);
        text = whitespace_collapse().replace_all(text.trim(), " ").to_string();

        NormalizedUtterance { raw_text: raw_text.to_string(), normalized_text: text, metadata }
    }

    fn strip_wake_word(&self, text: &str, metadata: &mut NormalizationMetadata) -> String {
        let trimmed = text.trim_start();
        for wake_word in &self.wake_words {
            if let Some(rest) = trimmed.strip_prefix(wake_word.as_str()) {
                metadata.wake_word_stripped = Some(wake_word.clone());
                return rest.trim_start_matches([',', ' ']).to_string();
            }
        }
        text.to_string()
    }

    fn expand_contractions(&self, text: &str, metadata: &mut NormalizationMetadata) -> String {
        let mut out = text.to_string();
        for (contraction, expansion) in CONTRACTIONS {
            if out.contains(contraction) {
                out = out.replace(contraction, expansion);
                metadata.contractions_expanded.push((*contraction).to_string());
            }
        }
        out
    }

    fn strip_politeness_tokens(&self, text: &str, metadata: &mut NormalizationMetadata) -> String {
        let pattern = politeness_pattern();
        if !pattern.is_match(text) {
            return text.to_string();
        }
        for capture in pattern.find_iter(text) {
            metadata.politeness_tokens_stripped.push(capture.as_str().to_string());
        }
        pattern.replace_all(text, "").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_wake_word_and_lowercases() {
        let n = TextNormalizer::default();
        let out = n.normalize("Hey Barnabee, turn on the lights");
        assert_eq!(out.normalized_text, "turn on the lights");
        assert_eq!(out.metadata.wake_word_stripped.as_deref(), Some("hey barnabee"));
    }

    #[test]
    fn expands_contractions() {
        let n = TextNormalizer::default();
        let out = n.normalize("I'm not sure what's going on");
        assert!(out.normalized_text.contains("i am"));
        assert!(out.normalized_text.contains("what is"));
    }

    #[test]
    fn strips_politeness_tokens_on_word_boundary_only() {
        let n = TextNormalizer::default();
        let out = n.normalize("could you please dim the lights");
        assert!(!out.normalized_text.contains("please"));
        assert!(!out.metadata.politeness_tokens_stripped.is_empty());
        // "pleasethe" as a single token must survive untouched.
        let out2 = n.normalize("pleasethe lights");
        assert!(out2.normalized_text.contains("pleasethe"));
    }

    #[test]
    fn collapses_repeated_whitespace() {
        let n = TextNormalizer::default();
        let out = n.normalize("turn   on   the  lights");
        assert_eq!(out.normalized_text, "turn on the lights");
    }

    #[test]
    fn is_deterministic() {
        let n = TextNormalizer::default();
        let a = n.normalize("Hey Barnabee please turn off the kitchen lights");
        let b = n.normalize("Hey Barnabee please turn off the kitchen lights");
        assert_eq!(a.normalized_text, b.normalized_text);
    }
}
