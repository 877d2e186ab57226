//! Core domain model for Seer: fetched opportunities, source configuration,
//! the weighted-signal scorer, and the digest generator.

pub mod report;
pub mod scoring;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single item produced by a source adapter, before scoring and persistence.
///
/// `(source_type, external_id)` is the deduplication key; `metadata` carries
/// adapter-specific engagement figures the scorer reads at fetch time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    pub title: String,
    pub description: String,
    pub source_type: String,
    pub source_url: String,
    pub external_id: String,
    pub detected_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Opportunity {
    /// Adapters only return items that carry a title and a stable external id.
    pub fn is_well_formed(&self) -> bool {
        !self.title.is_empty() && !self.external_id.is_empty()
    }
}

/// Decoded configuration for one source instance, as handed to a factory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub id: i64,
    #[serde(rename = "type")]
    pub source_type: String,
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub config: HashMap<String, String>,
    pub enabled: bool,
    pub is_builtin: bool,
}

/// Truncate to `max` characters, appending `...` when anything was cut.
/// Operates on `char` boundaries so multi-byte text never splits mid-glyph.
pub fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_formedness_requires_title_and_id() {
        let mut opp = Opportunity {
            title: "A tool".into(),
            description: String::new(),
            source_type: "rss".into(),
            source_url: String::new(),
            external_id: "x1".into(),
            detected_at: Utc::now(),
            metadata: serde_json::Map::new(),
        };
        assert!(opp.is_well_formed());

        opp.title.clear();
        assert!(!opp.is_well_formed());

        opp.title = "A tool".into();
        opp.external_id.clear();
        assert!(!opp.is_well_formed());
    }

    #[test]
    fn truncation_is_char_safe() {
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("abcdef", 3), "abc...");
        // 4 two-byte chars, cut at 2 chars, not 2 bytes
        assert_eq!(truncate_chars("éééé", 2), "éé...");
    }

    #[test]
    fn source_config_serde_uses_type_tag() {
        let cfg = SourceConfig {
            id: 3,
            source_type: "rss".into(),
            name: "My Feed".into(),
            url: "https://example.com/feed.xml".into(),
            config: HashMap::new(),
            enabled: true,
            is_builtin: false,
        };
        let json = serde_json::to_value(&cfg).unwrap();
        assert_eq!(json["type"], "rss");
        let back: SourceConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, cfg);
    }
}
