//! npm registry adapter over the public search endpoint.
//!
//! Sweeps a fixed keyword list with the maintenance-weighted ranking and
//! keeps only packages published in the last 14 days. The natural key is
//! `name@version`, so a new release of a known package is a new opportunity.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use seer_core::{Opportunity, SourceConfig};
use serde::Deserialize;
use tracing::debug;

use crate::{ensure_success, http_client, Source, SourceError};

const SEARCH_URL: &str = "https://registry.npmjs.org/-/v1/search";
const PACKAGE_BASE_URL: &str = "https://www.npmjs.com/package/";
const FRESHNESS_WINDOW_DAYS: i64 = 14;

const QUERIES: &[&str] = &[
    // Developer tools
    "cli",
    "devtool",
    "developer tool",
    "dev tool",
    // Self-hosted / alternatives
    "self-hosted",
    "selfhosted",
    "alternative",
    "open source",
    // Starters and templates
    "boilerplate",
    "starter",
    "template",
    "scaffold",
    "generator",
    // API/SDK surface
    "sdk",
    "api client",
    "wrapper",
    // Specific ecosystems
    "svelte",
    "nuxt",
    "vite plugin",
    "elysia",
    "hono",
    "bun",
    // Utilities
    "logger",
    "validation",
    "auth",
    "database",
    // Trending categories
    "ai",
    "llm",
    "openai",
    "markdown",
    "pdf",
];

#[derive(Debug)]
pub struct Npm {
    config: SourceConfig,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    objects: Vec<SearchObject>,
}

#[derive(Debug, Deserialize)]
struct SearchObject {
    package: Package,
    #[serde(default)]
    score: PackageScore,
}

#[derive(Debug, Deserialize)]
struct Package {
    name: String,
    #[serde(default)]
    version: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    keywords: Vec<String>,
    #[serde(default)]
    date: Option<DateTime<Utc>>,
    #[serde(default)]
    links: PackageLinks,
    #[serde(default)]
    author: PackageAuthor,
}

#[derive(Debug, Default, Deserialize)]
struct PackageLinks {
    #[serde(default)]
    npm: String,
    #[serde(default)]
    homepage: String,
    #[serde(default)]
    repository: String,
}

#[derive(Debug, Default, Deserialize)]
struct PackageAuthor {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct PackageScore {
    #[serde(rename = "final", default)]
    final_score: f64,
    #[serde(default)]
    detail: ScoreDetail,
}

#[derive(Debug, Default, Deserialize)]
struct ScoreDetail {
    #[serde(default)]
    quality: f64,
    #[serde(default)]
    popularity: f64,
    #[serde(default)]
    maintenance: f64,
}

impl Npm {
    pub fn from_config(config: SourceConfig) -> Result<Box<dyn Source>, SourceError> {
        Ok(Box::new(Self {
            client: http_client()?,
            config,
        }))
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchObject>, SourceError> {
        let response = self
            .client
            .get(SEARCH_URL)
            .query(&[
                ("text", query),
                ("size", "25"),
                // Boost maintenance to favor actively maintained packages.
                ("quality", "0.3"),
                ("popularity", "0.3"),
                ("maintenance", "0.4"),
            ])
            .send()
            .await?;
        ensure_success(&response)?;
        let body: SearchResponse = response.json().await?;
        Ok(body.objects)
    }
}

fn package_to_opportunity(object: SearchObject) -> Opportunity {
    let package = object.package;

    let source_url = if package.links.npm.is_empty() {
        format!("{PACKAGE_BASE_URL}{}", package.name)
    } else {
        package.links.npm.clone()
    };

    let description = match package.description {
        Some(ref text) if !text.is_empty() => text.clone(),
        _ => format!("npm package: {} v{}", package.name, package.version),
    };

    let mut metadata = serde_json::Map::new();
    metadata.insert("version".into(), package.version.clone().into());
    metadata.insert("keywords".into(), package.keywords.clone().into());
    metadata.insert("author".into(), package.author.name.into());
    metadata.insert("score".into(), object.score.final_score.into());
    metadata.insert("quality".into(), object.score.detail.quality.into());
    metadata.insert("popularity".into(), object.score.detail.popularity.into());
    metadata.insert("maintenance".into(), object.score.detail.maintenance.into());
    metadata.insert("homepage".into(), package.links.homepage.into());
    metadata.insert("repository".into(), package.links.repository.into());

    Opportunity {
        external_id: format!("{}@{}", package.name, package.version),
        title: package.name,
        description,
        source_type: "npm".into(),
        source_url,
        detected_at: package.date.unwrap_or_else(Utc::now),
        metadata,
    }
}

#[async_trait]
impl Source for Npm {
    fn source_type(&self) -> &'static str {
        "npm"
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    async fn fetch(&self) -> Result<Vec<Opportunity>, SourceError> {
        let cutoff = Utc::now() - Duration::days(FRESHNESS_WINDOW_DAYS);
        let mut seen = HashSet::new();
        let mut opportunities = Vec::new();

        for query in QUERIES {
            let objects = match self.search(query).await {
                Ok(objects) => objects,
                Err(err) => {
                    debug!(query, error = %err, "npm query failed");
                    continue;
                }
            };

            for object in objects {
                if let Some(date) = object.package.date {
                    if date < cutoff {
                        continue;
                    }
                }
                if !seen.insert(object.package.name.clone()) {
                    continue;
                }
                let opp = package_to_opportunity(object);
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

    const PACKAGE_JSON: &str = r#"{
        "objects": [{
            "package": {
                "name": "tiny-logger",
                "version": "2.1.0",
                "description": "A tiny structured logger",
                "keywords": ["logger", "cli"],
                "date": "2026-03-01T10:00:00.000Z",
                "links": {
                    "npm": "https://www.npmjs.com/package/tiny-logger",
                    "homepage": "https://tinylogger.dev",
                    "repository": "https://github.com/x/tiny-logger"
                },
                "author": {"name": "jo"}
            },
            "score": {
                "final": 0.41,
                "detail": {"quality": 0.6, "popularity": 0.1, "maintenance": 0.5}
            }
        }]
    }"#;

    #[test]
    fn package_maps_with_versioned_external_id() {
        let body: SearchResponse = serde_json::from_str(PACKAGE_JSON).unwrap();
        let opp = package_to_opportunity(body.objects.into_iter().next().unwrap());

        assert_eq!(opp.external_id, "tiny-logger@2.1.0");
        assert_eq!(opp.title, "tiny-logger");
        assert_eq!(opp.source_url, "https://www.npmjs.com/package/tiny-logger");
        assert_eq!(opp.detected_at.to_rfc3339(), "2026-03-01T10:00:00+00:00");
        assert_eq!(opp.metadata["version"], "2.1.0");
        assert_eq!(opp.metadata["maintenance"], 0.5);
    }

    #[test]
    fn missing_link_and_description_get_defaults() {
        let object = SearchObject {
            package: Package {
                name: "bare".into(),
                version: "0.1.0".into(),
                description: None,
                keywords: vec![],
                date: None,
                links: PackageLinks::default(),
                author: PackageAuthor::default(),
            },
            score: PackageScore::default(),
        };
        let opp = package_to_opportunity(object);
        assert_eq!(opp.source_url, "https://www.npmjs.com/package/bare");
        assert_eq!(opp.description, "npm package: bare v0.1.0");
    }
}
