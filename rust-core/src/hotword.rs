//! Hotword classification over recognizer transcripts.
//!
//! The speech engine itself is external; this module only decides whether
//! a transcript (partial or final) contains one of a small set of distress
//! phrases. Matching is a case-insensitive substring test and the first
//! phrase that matches wins.
//!
//! The classifier is stateless: the same utterance arriving as several
//! partial results matches every time. Debouncing is the caller's job
//! (see `gate.rs`).

use serde::Deserialize;
use tracing::info;

use crate::types::{ActivationDecision, ActivationSource};

/// Configuration for hotword matching.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct HotwordConfig {
    /// Phrases checked in order.
    pub phrases: Vec<String>,
}

impl Default for HotwordConfig {
    fn default() -> Self {
        Self {
            phrases: vec!["help me".into(), "helpme".into(), "help".into()],
        }
    }
}

/// Stateless phrase matcher.
#[derive(Debug, Clone)]
pub struct HotwordClassifier {
    /// Lower-cased phrases, empty ones dropped.
    phrases: Vec<String>,
}

impl HotwordClassifier {
    pub fn new(config: HotwordConfig) -> Self {
        let phrases = config
            .phrases
            .iter()
            .map(|p| p.trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();
        Self { phrases }
    }

    /// The first configured phrase contained in `transcript`.
    pub fn matched_phrase(&self, transcript: &str) -> Option<&str> {
        let lower = transcript.to_lowercase();
        self.phrases
            .iter()
            .find(|phrase| lower.contains(phrase.as_str()))
            .map(String::as_str)
    }

    /// Classify one transcript heard at `now_ms`.
    pub fn classify(&self, transcript: &str, now_ms: u64) -> Option<ActivationDecision> {
        let phrase = self.matched_phrase(transcript)?;
        info!(phrase, transcript, "hotword detected");
        Some(ActivationDecision::new(ActivationSource::Hotword, now_ms))
    }

    /// Classify a recognizer result set; the first matching candidate wins.
    pub fn classify_candidates<S: AsRef<str>>(
        &self,
        candidates: &[S],
        now_ms: u64,
    ) -> Option<ActivationDecision> {
        candidates
            .iter()
            .find_map(|candidate| self.classify(candidate.as_ref(), now_ms))
    }

    /// Configured phrases, normalized.
    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }
}

impl Default for HotwordClassifier {
    fn default() -> Self {
        Self::new(HotwordConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_case_insensitively() {
        let classifier = HotwordClassifier::default();
        let decision = classifier.classify("Somebody HELP ME please", 10).unwrap();

        assert_eq!(decision.source, ActivationSource::Hotword);
        assert_eq!(decision.timestamp_ms, 10);
    }

    #[test]
    fn test_first_phrase_wins() {
        let classifier = HotwordClassifier::default();
        assert_eq!(classifier.matched_phrase("help me now"), Some("help me"));
        assert_eq!(classifier.matched_phrase("helpful"), Some("help"));
        assert_eq!(classifier.matched_phrase("HelpMe"), Some("helpme"));
    }

    #[test]
    fn test_no_match() {
        let classifier = HotwordClassifier::default();
        assert!(classifier.classify("what time is it", 0).is_none());
        assert!(classifier.classify("", 0).is_none());
    }

    #[test]
    fn test_idempotent_on_partials() {
        let classifier = HotwordClassifier::default();
        let partials = ["he", "help", "help me", "help me please"];
        let hits = partials
            .iter()
            .filter(|p| classifier.classify(p, 0).is_some())
            .count();
        // Stateless: every partial containing a phrase matches.
        assert_eq!(hits, 3);
    }

    #[test]
    fn test_candidates() {
        let classifier = HotwordClassifier::default();
        let candidates = vec!["yelp me".to_string(), "help me".to_string()];
        assert!(classifier.classify_candidates(&candidates, 5).is_some());

        let none: Vec<String> = vec!["hello".into(), "yellow".into()];
        assert!(classifier.classify_candidates(&none, 5).is_none());
    }

    #[test]
    fn test_custom_phrases_normalized() {
        let classifier = HotwordClassifier::new(HotwordConfig {
            phrases: vec!["  Bachao ".into(), "".into()],
        });
        assert_eq!(classifier.phrases(), &["bachao".to_string()]);
        assert!(classifier.classify("BACHAO", 1).is_some());
        assert!(classifier.classify("anything", 1).is_none());
    }
}
