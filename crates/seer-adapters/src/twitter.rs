//! Twitter/X adapter over the v2 recent-search API.
//!
//! Requires a `bearer_token` config entry; construction fails without one.
//! Each configured keyword becomes one search, filtered to original
//! English-language tweets.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use seer_core::{truncate_chars, Opportunity, SourceConfig};
use serde::Deserialize;
use tracing::debug;

use crate::{ensure_success, http_client, parse_csv, Source, SourceError};

const SEARCH_URL: &str = "https://api.twitter.com/2/tweets/search/recent";
const TITLE_LIMIT: usize = 100;

const DEFAULT_KEYWORDS: &[&str] = &[
    "looking for",
    "need a tool",
    "wish there was",
    "anyone know",
    "alternative to",
];

#[derive(Debug)]
pub struct Twitter {
    name: String,
    keywords: Vec<String>,
    bearer_token: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<Tweet>,
}

#[derive(Debug, Deserialize)]
struct Tweet {
    id: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    author_id: String,
    #[serde(default)]
    created_at: String,
    #[serde(default)]
    public_metrics: TweetMetrics,
}

#[derive(Debug, Default, Deserialize)]
struct TweetMetrics {
    #[serde(default)]
    retweet_count: i64,
    #[serde(default)]
    like_count: i64,
    #[serde(default)]
    reply_count: i64,
}

impl Twitter {
    pub fn from_config(config: SourceConfig) -> Result<Box<dyn Source>, SourceError> {
        let bearer_token = config
            .config
            .get("bearer_token")
            .filter(|token| !token.is_empty())
            .cloned()
            .ok_or_else(|| {
                SourceError::Config("twitter source requires bearer_token in config".into())
            })?;

        let keywords = match config.config.get("keywords") {
            Some(value) if !value.is_empty() => parse_csv(value),
            _ => DEFAULT_KEYWORDS.iter().map(|kw| kw.to_string()).collect(),
        };

        Ok(Box::new(Self {
            name: config.name,
            keywords,
            bearer_token,
            client: http_client()?,
        }))
    }

    async fn search(&self, keyword: &str) -> Result<Vec<Tweet>, SourceError> {
        let query = format!("{keyword} -is:retweet lang:en");
        let response = self
            .client
            .get(SEARCH_URL)
            .query(&[
                ("query", query.as_str()),
                ("max_results", "50"),
                ("tweet.fields", "created_at,public_metrics,author_id"),
            ])
            .bearer_auth(&self.bearer_token)
            .send()
            .await?;
        ensure_success(&response)?;
        let body: SearchResponse = response.json().await?;
        Ok(body.data)
    }
}

fn tweet_to_opportunity(tweet: Tweet, keyword: &str) -> Opportunity {
    let detected_at = tweet
        .created_at
        .parse::<DateTime<Utc>>()
        .unwrap_or_else(|_| Utc::now());

    let mut metadata = serde_json::Map::new();
    metadata.insert("author_id".into(), tweet.author_id.into());
    metadata.insert("retweet_count".into(), tweet.public_metrics.retweet_count.into());
    metadata.insert("like_count".into(), tweet.public_metrics.like_count.into());
    metadata.insert("reply_count".into(), tweet.public_metrics.reply_count.into());
    metadata.insert("keyword".into(), keyword.into());

    Opportunity {
        title: truncate_chars(&tweet.text, TITLE_LIMIT),
        description: tweet.text,
        source_type: "twitter".into(),
        source_url: format!("https://twitter.com/i/web/status/{}", tweet.id),
        external_id: tweet.id,
        detected_at,
        metadata,
    }
}

#[async_trait]
impl Source for Twitter {
    fn source_type(&self) -> &'static str {
        "twitter"
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> Result<Vec<Opportunity>, SourceError> {
        let mut seen = HashSet::new();
        let mut opportunities = Vec::new();

        for keyword in &self.keywords {
            let tweets = match self.search(keyword).await {
                Ok(tweets) => tweets,
                Err(err) => {
                    debug!(keyword, error = %err, "twitter search failed");
                    continue;
                }
            };

            for tweet in tweets {
                if !seen.insert(tweet.id.clone()) {
                    continue;
                }
                let opp = tweet_to_opportunity(tweet, keyword);
                if opp.is_well_formed() {
                    opportunities.push(opp);
                }
            }
        }

        Ok(opportunities)
    }
}
