//! Reddit adapter over the public `new` listings.
//!
//! One request per configured subreddit, with an optional keyword filter over
//! title + selftext. Reddit rejects requests without a user agent, so the
//! shared client's identity header is load-bearing here.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use seer_core::{truncate_chars, Opportunity, SourceConfig};
use serde::Deserialize;
use tracing::debug;

use crate::{contains_any_keyword, ensure_success, http_client, parse_csv, Source, SourceError};

const SELFTEXT_LIMIT: usize = 500;

const DEFAULT_SUBREDDITS: &[&str] = &[
    "SideProject",
    "startups",
    "Entrepreneur",
    "SaaS",
    "indiehackers",
];

#[derive(Debug)]
pub struct Reddit {
    name: String,
    subreddits: Vec<String>,
    keywords: Vec<String>,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<ListingChild>,
}

#[derive(Debug, Deserialize)]
struct ListingChild {
    data: Post,
}

#[derive(Debug, Deserialize)]
struct Post {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    selftext: String,
    #[serde(default)]
    permalink: String,
    #[serde(default)]
    subreddit: String,
    #[serde(default)]
    score: i64,
    #[serde(default)]
    created_utc: f64,
    #[serde(default)]
    num_comments: i64,
}

impl Reddit {
    pub fn from_config(config: SourceConfig) -> Result<Box<dyn Source>, SourceError> {
        let subreddits = match config.config.get("subreddits") {
            Some(value) if !value.is_empty() => parse_csv(value),
            _ => DEFAULT_SUBREDDITS.iter().map(|s| s.to_string()).collect(),
        };
        let keywords = config
            .config
            .get("keywords")
            .map(|value| parse_csv(value))
            .unwrap_or_default();

        Ok(Box::new(Self {
            name: config.name,
            subreddits,
            keywords,
            client: http_client()?,
        }))
    }

    async fn fetch_subreddit(&self, subreddit: &str) -> Result<Vec<Post>, SourceError> {
        let url = format!("https://www.reddit.com/r/{subreddit}/new.json");
        let response = self
            .client
            .get(&url)
            .query(&[("limit", "50")])
            .send()
            .await?;
        ensure_success(&response)?;
        let listing: Listing = response.json().await?;
        Ok(listing
            .data
            .children
            .into_iter()
            .map(|child| child.data)
            .collect())
    }
}

fn post_to_opportunity(post: Post) -> Opportunity {
    let detected_at = DateTime::<Utc>::from_timestamp(post.created_utc as i64, 0)
        .unwrap_or_else(Utc::now);

    let mut metadata = serde_json::Map::new();
    metadata.insert("subreddit".into(), post.subreddit.into());
    metadata.insert("score".into(), post.score.into());
    metadata.insert("num_comments".into(), post.num_comments.into());

    Opportunity {
        title: post.title,
        description: truncate_chars(&post.selftext, SELFTEXT_LIMIT),
        source_type: "reddit".into(),
        source_url: format!("https://reddit.com{}", post.permalink),
        external_id: post.id,
        detected_at,
        metadata,
    }
}

#[async_trait]
impl Source for Reddit {
    fn source_type(&self) -> &'static str {
        "reddit"
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> Result<Vec<Opportunity>, SourceError> {
        let mut seen = HashSet::new();
        let mut opportunities = Vec::new();

        for subreddit in &self.subreddits {
            let posts = match self.fetch_subreddit(subreddit).await {
                Ok(posts) => posts,
                Err(err) => {
                    debug!(subreddit, error = %err, "reddit listing failed");
                    continue;
                }
            };

            for post in posts {
                if !self.keywords.is_empty()
                    && !contains_any_keyword(
                        &format!("{} {}", post.title, post.selftext),
                        &self.keywords,
                    )
                {
                    continue;
                }
                if !seen.insert(post.id.clone()) {
                    continue;
                }
                let opp = post_to_opportunity(post);
                if opp.is_well_formed() {
                    opportunities.push(opp);
                }
            }
        }

        Ok(opportunities)
    }
}
