//! GitHub adapter over the repository search API.
//!
//! Looks for freshly created repositories with traction and for repositories
//! explicitly asking for contributors.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use seer_core::{Opportunity, SourceConfig};
use serde::Deserialize;
use tracing::debug;

use crate::{ensure_success, http_client, Source, SourceError};

const SEARCH_URL: &str = "https://api.github.com/search/repositories";

#[derive(Debug)]
pub struct GitHub {
    config: SourceConfig,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<Repo>,
}

#[derive(Debug, Deserialize)]
struct Repo {
    id: i64,
    #[serde(default)]
    full_name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    html_url: String,
    #[serde(default)]
    stargazers_count: i64,
    #[serde(default)]
    forks_count: i64,
    #[serde(default)]
    open_issues_count: i64,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    topics: Vec<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pushed_at: Option<DateTime<Utc>>,
}

impl GitHub {
    pub fn from_config(config: SourceConfig) -> Result<Box<dyn Source>, SourceError> {
        Ok(Box::new(Self {
            client: http_client()?,
            config,
        }))
    }

    fn queries() -> Vec<String> {
        let week_ago = (Utc::now() - Duration::days(7)).format("%Y-%m-%d");
        vec![
            format!("stars:>10 created:>{week_ago}"),
            "help wanted good first issue".to_string(),
            "looking for contributors".to_string(),
        ]
    }

    async fn search(&self, query: &str) -> Result<Vec<Repo>, SourceError> {
        let response = self
            .client
            .get(SEARCH_URL)
            .query(&[
                ("q", query),
                ("sort", "stars"),
                ("order", "desc"),
                ("per_page", "20"),
            ])
            .header("Accept", "application/vnd.github+json")
            .send()
            .await?;
        ensure_success(&response)?;
        let body: SearchResponse = response.json().await?;
        Ok(body.items)
    }
}

fn repo_to_opportunity(repo: Repo) -> Opportunity {
    let description = match repo.description {
        Some(ref text) if !text.is_empty() => text.clone(),
        _ => format!("Repository: {}", repo.full_name),
    };

    let mut metadata = serde_json::Map::new();
    metadata.insert("stars".into(), repo.stargazers_count.into());
    metadata.insert("forks".into(), repo.forks_count.into());
    metadata.insert("open_issues".into(), repo.open_issues_count.into());
    metadata.insert(
        "language".into(),
        repo.language.clone().unwrap_or_default().into(),
    );
    metadata.insert("topics".into(), repo.topics.clone().into());
    if let Some(created_at) = repo.created_at {
        metadata.insert("created_at".into(), created_at.to_rfc3339().into());
    }

    Opportunity {
        title: repo.full_name,
        description,
        source_type: "github".into(),
        source_url: repo.html_url,
        external_id: repo.id.to_string(),
        detected_at: repo.pushed_at.unwrap_or_else(Utc::now),
        metadata,
    }
}

#[async_trait]
impl Source for GitHub {
    fn source_type(&self) -> &'static str {
        "github"
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    async fn fetch(&self) -> Result<Vec<Opportunity>, SourceError> {
        let mut seen = HashSet::new();
        let mut opportunities = Vec::new();

        for query in Self::queries() {
            let repos = match self.search(&query).await {
                Ok(repos) => repos,
                Err(err) => {
                    debug!(query, error = %err, "github query failed");
                    continue;
                }
            };

            for repo in repos {
                if !seen.insert(repo.id) {
                    continue;
                }
                let opp = repo_to_opportunity(repo);
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

    const REPO_JSON: &str = r#"{
        "items": [{
            "id": 9182736,
            "name": "sql-lint",
            "full_name": "octo/sql-lint",
            "description": "A fast SQL linter",
            "html_url": "https://github.com/octo/sql-lint",
            "stargazers_count": 321,
            "forks_count": 12,
            "open_issues_count": 7,
            "language": "Rust",
            "topics": ["sql", "linter"],
            "created_at": "2026-02-28T08:00:00Z",
            "pushed_at": "2026-03-05T20:15:00Z"
        }]
    }"#;

    #[test]
    fn repo_maps_with_push_time_and_engagement_metadata() {
        let body: SearchResponse = serde_json::from_str(REPO_JSON).unwrap();
        let opp = repo_to_opportunity(body.items.into_iter().next().unwrap());

        assert_eq!(opp.title, "octo/sql-lint");
        assert_eq!(opp.external_id, "9182736");
        assert_eq!(opp.source_url, "https://github.com/octo/sql-lint");
        assert_eq!(opp.detected_at.to_rfc3339(), "2026-03-05T20:15:00+00:00");
        assert_eq!(opp.metadata["stars"], 321);
        assert_eq!(opp.metadata["language"], "Rust");
    }

    #[test]
    fn missing_description_falls_back_to_repo_name() {
        let repo = Repo {
            id: 1,
            full_name: "a/b".into(),
            description: None,
            html_url: "https://github.com/a/b".into(),
            stargazers_count: 0,
            forks_count: 0,
            open_issues_count: 0,
            language: None,
            topics: vec![],
            created_at: None,
            pushed_at: None,
        };
        let opp = repo_to_opportunity(repo);
        assert_eq!(opp.description, "Repository: a/b");
    }

    #[test]
    fn recent_creation_query_carries_a_date_filter() {
        let queries = GitHub::queries();
        assert_eq!(queries.len(), 3);
        assert!(queries[0].starts_with("stars:>10 created:>"));
    }
}
