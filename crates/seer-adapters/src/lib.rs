//! Source adapter contract, the type registry, and the concrete adapters.
//!
//! Every adapter turns a configured source instance into a bounded set of
//! remote queries and returns normalized, in-fetch-deduplicated
//! [`Opportunity`] values. Sub-query failures never fail the whole fetch;
//! cancellation happens by dropping the `fetch` future.

pub mod custom;
pub mod devto;
pub mod github;
pub mod hackernews;
pub mod npm;
pub mod reddit;
pub mod rss;
pub mod twitter;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use seer_core::{Opportunity, SourceConfig};
use thiserror::Error;

pub const USER_AGENT: &str = "Seer/1.0";
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source type `{0}` is not registered")]
    UnknownType(String),
    #[error("invalid source configuration: {0}")]
    Config(String),
    #[error("http status {status} for {url}")]
    Status { status: u16, url: String },
    #[error("failed to parse feed: {0}")]
    Parse(String),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// Capability set every source adapter provides.
#[async_trait]
pub trait Source: Send + Sync + std::fmt::Debug {
    /// Type tag identifying the adapter family (`hackernews`, `rss`, ...).
    fn source_type(&self) -> &'static str;

    /// Human-readable name of the configured instance.
    fn name(&self) -> &str;

    /// Run the adapter's remote queries and return well-formed opportunities,
    /// deduplicated by the adapter's natural key within this call.
    async fn fetch(&self) -> Result<Vec<Opportunity>, SourceError>;
}

pub type SourceFactory = fn(SourceConfig) -> Result<Box<dyn Source>, SourceError>;

/// Source types available in this build, in registration order.
pub fn available_types() -> &'static [&'static str] {
    &[
        "hackernews",
        "github",
        "npm",
        "devto",
        "rss",
        "reddit",
        "twitter",
        "custom",
    ]
}

/// Process-wide mapping from type tag to adapter factory.
pub struct Registry {
    factories: HashMap<&'static str, SourceFactory>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry with every built-in adapter registered.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("hackernews", hackernews::HackerNews::from_config);
        registry.register("github", github::GitHub::from_config);
        registry.register("npm", npm::Npm::from_config);
        registry.register("devto", devto::DevTo::from_config);
        registry.register("rss", rss::Rss::from_config);
        registry.register("reddit", reddit::Reddit::from_config);
        registry.register("twitter", twitter::Twitter::from_config);
        registry.register("custom", custom::Custom::from_config);
        registry
    }

    pub fn register(&mut self, source_type: &'static str, factory: SourceFactory) {
        self.factories.insert(source_type, factory);
    }

    pub fn contains(&self, source_type: &str) -> bool {
        self.factories.contains_key(source_type)
    }

    /// Build an adapter for `config`, or fail with `UnknownType` when the tag
    /// does not resolve to a registered factory.
    pub fn create(&self, config: SourceConfig) -> Result<Box<dyn Source>, SourceError> {
        let factory = self
            .factories
            .get(config.source_type.as_str())
            .ok_or_else(|| SourceError::UnknownType(config.source_type.clone()))?;
        factory(config)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

pub(crate) fn http_client() -> Result<reqwest::Client, SourceError> {
    Ok(reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .user_agent(USER_AGENT)
        .gzip(true)
        .build()?)
}

pub(crate) fn ensure_success(response: &reqwest::Response) -> Result<(), SourceError> {
    let status = response.status();
    if !status.is_success() {
        return Err(SourceError::Status {
            status: status.as_u16(),
            url: response.url().to_string(),
        });
    }
    Ok(())
}

/// Case-insensitive substring match against any of the configured keywords.
pub(crate) fn contains_any_keyword(text: &str, keywords: &[String]) -> bool {
    let lower = text.to_lowercase();
    keywords.iter().any(|kw| lower.contains(&kw.to_lowercase()))
}

/// Split a comma-separated config value into trimmed, non-empty entries.
pub(crate) fn parse_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

pub(crate) fn config_or_default(
    config: &HashMap<String, String>,
    key: &str,
    default: &str,
) -> String {
    match config.get(key) {
        Some(value) if !value.is_empty() => value.clone(),
        _ => default.to_string(),
    }
}
