//! Hacker News adapter over the Algolia `search_by_date` API.
//!
//! Runs a fixed list of opportunity phrases against stories from the last 24
//! hours. The produced `source_url` is always the HN discussion page, never
//! the submitted article, so readers land on the conversation.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use seer_core::{Opportunity, SourceConfig};
use serde::Deserialize;
use tracing::debug;

use crate::{ensure_success, http_client, Source, SourceError};

const SEARCH_URL: &str = "https://hn.algolia.com/api/v1/search_by_date";
const ITEM_BASE_URL: &str = "https://news.ycombinator.com/item?id=";

/// Search phrases tuned to surface needs, pain points, and launches.
const QUERIES: &[&str] = &[
    // Direct opportunities - people stating needs
    "I wish",
    "I need",
    "looking for",
    "searching for",
    // Pain points
    "frustrated with",
    "annoyed by",
    "hate using",
    "problem with",
    "issue with",
    "struggle with",
    // Requests for alternatives
    "alternative to",
    "replacement for",
    "instead of",
    "better than",
    "competitor to",
    // Willingness to pay
    "would pay for",
    "shut up and take my money",
    "take my money",
    "happy to pay",
    // Discovery requests
    "what do you use for",
    "how do you handle",
    "recommend a",
    "suggest a",
    "does anyone know",
    "is there a",
    "why isn't there",
    // Build signals
    "someone should build",
    "why hasn't anyone",
    "idea for a startup",
    "business idea",
    // Launches and questions worth mining
    "Show HN",
    "Ask HN",
];

#[derive(Debug)]
pub struct HackerNews {
    config: SourceConfig,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "objectID")]
    object_id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    story_text: String,
    #[serde(default)]
    author: String,
    #[serde(default)]
    points: i64,
    #[serde(default)]
    num_comments: i64,
    #[serde(default)]
    created_at: String,
}

impl HackerNews {
    pub fn from_config(config: SourceConfig) -> Result<Box<dyn Source>, SourceError> {
        Ok(Box::new(Self {
            client: http_client()?,
            config,
        }))
    }

    async fn search(&self, query: &str, cutoff: DateTime<Utc>) -> Result<Vec<Hit>, SourceError> {
        let numeric_filter = format!("created_at_i>{}", cutoff.timestamp());
        let response = self
            .client
            .get(SEARCH_URL)
            .query(&[
                ("query", query),
                ("tags", "story"),
                ("hitsPerPage", "20"),
                ("numericFilters", numeric_filter.as_str()),
            ])
            .send()
            .await?;
        ensure_success(&response)?;
        let body: SearchResponse = response.json().await?;
        Ok(body.hits)
    }
}

fn hit_to_opportunity(hit: Hit) -> Opportunity {
    let source_url = format!("{ITEM_BASE_URL}{}", hit.object_id);

    // Self posts carry their text; link posts fall back to the linked URL.
    let description = if hit.story_text.is_empty() {
        hit.url.clone()
    } else {
        hit.story_text.clone()
    };

    let detected_at = hit
        .created_at
        .parse::<DateTime<Utc>>()
        .unwrap_or_else(|_| Utc::now());

    let mut metadata = serde_json::Map::new();
    metadata.insert("author".into(), hit.author.into());
    metadata.insert("points".into(), hit.points.into());
    metadata.insert("num_comments".into(), hit.num_comments.into());
    metadata.insert("hn_url".into(), source_url.clone().into());

    Opportunity {
        title: hit.title,
        description,
        source_type: "hackernews".into(),
        source_url,
        external_id: hit.object_id,
        detected_at,
        metadata,
    }
}

#[async_trait]
impl Source for HackerNews {
    fn source_type(&self) -> &'static str {
        "hackernews"
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    async fn fetch(&self) -> Result<Vec<Opportunity>, SourceError> {
        let cutoff = Utc::now() - Duration::hours(24);
        let mut seen = HashSet::new();
        let mut opportunities = Vec::new();

        for query in QUERIES {
            let hits = match self.search(query, cutoff).await {
                Ok(hits) => hits,
                Err(err) => {
                    debug!(query, error = %err, "hacker news query failed");
                    continue;
                }
            };

            for hit in hits {
                if !seen.insert(hit.object_id.clone()) {
                    continue;
                }
                let opp = hit_to_opportunity(hit);
                if opp.is_well_formed() {
                    opportunities.push(opp);
                }
            }
        }

        Ok(opportunities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HIT_JSON: &str = r#"{
        "hits": [{
            "objectID": "3987123",
            "title": "Show HN: A linter for SQL migrations",
            "url": "https://example.com/linter",
            "story_text": "",
            "author": "pg",
            "points": 120,
            "num_comments": 45,
            "created_at": "2026-03-05T09:30:00Z"
        }]
    }"#;

    #[test]
    fn hit_maps_to_discussion_url_not_article_url() {
        let body: SearchResponse = serde_json::from_str(HIT_JSON).unwrap();
        let opp = hit_to_opportunity(body.hits.into_iter().next().unwrap());

        assert_eq!(opp.source_url, "https://news.ycombinator.com/item?id=3987123");
        assert_eq!(opp.external_id, "3987123");
        assert_eq!(opp.source_type, "hackernews");
        // link post: description falls back to the submitted URL
        assert_eq!(opp.description, "https://example.com/linter");
        assert_eq!(opp.detected_at.to_rfc3339(), "2026-03-05T09:30:00+00:00");
        assert_eq!(opp.metadata["points"], 120);
        assert_eq!(opp.metadata["num_comments"], 45);
    }

    #[test]
    fn story_text_wins_over_link() {
        let hit = Hit {
            object_id: "1".into(),
            title: "Ask HN: tooling?".into(),
            url: "https://example.com".into(),
            story_text: "What do you use for deploys?".into(),
            author: "a".into(),
            points: 1,
            num_comments: 0,
            created_at: "not a date".into(),
        };
        let opp = hit_to_opportunity(hit);
        assert_eq!(opp.description, "What do you use for deploys?");
        // unparseable timestamp falls back to "now", which is always recent
        assert!(Utc::now() - opp.detected_at < Duration::minutes(1));
    }

    #[test]
    fn queries_include_launch_and_ask_phrases() {
        assert!(QUERIES.contains(&"Show HN"));
        assert!(QUERIES.contains(&"Ask HN"));
        assert!(QUERIES.len() > 25);
    }
}
