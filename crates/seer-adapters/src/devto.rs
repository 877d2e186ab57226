//! DEV.to adapter over the public articles API.
//!
//! Two passes: rising articles per curated tag, then a keyword sweep over the
//! freshest articles. Both passes honor a 7-day cutoff.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use seer_core::{Opportunity, SourceConfig};
use serde::Deserialize;
use tracing::debug;

use crate::{contains_any_keyword, ensure_success, http_client, Source, SourceError};

const ARTICLES_URL: &str = "https://dev.to/api/articles";
const FRESHNESS_WINDOW_DAYS: i64 = 7;

const TAGS: &[&str] = &[
    // Project showcases
    "showdev",
    "opensource",
    "sideproject",
    // Startup/business
    "startup",
    "entrepreneurship",
    "indiehackers",
    "buildinpublic",
    // Developer experience
    "productivity",
    "devtools",
    "tooling",
    // Technical categories
    "selfhosted",
    "docker",
    "api",
    "cli",
    // Discussion/discovery
    "discuss",
    "watercooler",
    "news",
    // Learning, where pain points surface
    "tutorial",
    "beginners",
    "webdev",
    "programming",
];

const TITLE_KEYWORDS: &[&str] = &[
    "built",
    "launched",
    "alternative",
    "self-hosted",
    "open source",
    "side project",
    "weekend project",
];

#[derive(Debug)]
pub struct DevTo {
    config: SourceConfig,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct Article {
    id: i64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    tag_list: Vec<String>,
    #[serde(default)]
    user: ArticleUser,
    #[serde(default)]
    positive_reactions_count: i64,
    #[serde(default)]
    comments_count: i64,
    #[serde(default)]
    reading_time_minutes: i64,
}

#[derive(Debug, Default, Deserialize)]
struct ArticleUser {
    #[serde(default)]
    name: String,
    #[serde(default)]
    username: String,
}

impl DevTo {
    pub fn from_config(config: SourceConfig) -> Result<Box<dyn Source>, SourceError> {
        Ok(Box::new(Self {
            client: http_client()?,
            config,
        }))
    }

    async fn rising_by_tag(&self, tag: &str) -> Result<Vec<Article>, SourceError> {
        let response = self
            .client
            .get(ARTICLES_URL)
            .query(&[("tag", tag), ("per_page", "20"), ("state", "rising")])
            .send()
            .await?;
        ensure_success(&response)?;
        let articles: Vec<Article> = response.json().await?;
        Ok(articles)
    }

    async fn latest(&self) -> Result<Vec<Article>, SourceError> {
        let response = self
            .client
            .get(ARTICLES_URL)
            .query(&[("per_page", "50"), ("state", "fresh")])
            .send()
            .await?;
        ensure_success(&response)?;
        let articles: Vec<Article> = response.json().await?;
        Ok(articles)
    }
}

fn article_to_opportunity(article: Article) -> Opportunity {
    let description = if article.description.is_empty() {
        format!("Article by {}", article.user.name)
    } else {
        article.description.clone()
    };

    let mut metadata = serde_json::Map::new();
    metadata.insert("author".into(), article.user.name.into());
    metadata.insert("username".into(), article.user.username.into());
    metadata.insert("tags".into(), article.tag_list.clone().into());
    metadata.insert("reactions".into(), article.positive_reactions_count.into());
    metadata.insert("comments".into(), article.comments_count.into());
    metadata.insert("reading_time".into(), article.reading_time_minutes.into());

    Opportunity {
        title: article.title,
        description,
        source_type: "devto".into(),
        source_url: article.url,
        external_id: article.id.to_string(),
        detected_at: article.published_at.unwrap_or_else(Utc::now),
        metadata,
    }
}

fn matches_title_keywords(article: &Article) -> bool {
    let keywords: Vec<String> = TITLE_KEYWORDS.iter().map(|kw| kw.to_string()).collect();
    contains_any_keyword(&format!("{} {}", article.title, article.description), &keywords)
}

#[async_trait]
impl Source for DevTo {
    fn source_type(&self) -> &'static str {
        "devto"
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    async fn fetch(&self) -> Result<Vec<Opportunity>, SourceError> {
        let cutoff = Utc::now() - Duration::days(FRESHNESS_WINDOW_DAYS);
        let mut seen = HashSet::new();
        let mut opportunities = Vec::new();

        for tag in TAGS {
            let articles = match self.rising_by_tag(tag).await {
                Ok(articles) => articles,
                Err(err) => {
                    debug!(tag, error = %err, "dev.to tag query failed");
                    continue;
                }
            };

            for article in articles {
                if article.published_at.is_some_and(|at| at < cutoff) {
                    continue;
                }
                if !seen.insert(article.id) {
                    continue;
                }
                let opp = article_to_opportunity(article);
                if opp.is_well_formed() {
                    opportunities.push(opp);
                }
            }
        }

        // Second pass: launch/alternative phrasing in the newest articles.
        match self.latest().await {
            Ok(articles) => {
                for article in articles {
                    if article.published_at.is_some_and(|at| at < cutoff) {
                        continue;
                    }
                    if !matches_title_keywords(&article) {
                        continue;
                    }
                    if !seen.insert(article.id) {
                        continue;
                    }
                    let opp = article_to_opportunity(article);
                    if opp.is_well_formed() {
                        opportunities.push(opp);
                    }
                }
            }
            Err(err) => debug!(error = %err, "dev.to latest query failed"),
        }

        Ok(opportunities)
    }
}
