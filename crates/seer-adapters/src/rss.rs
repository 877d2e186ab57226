//! Syndication feed adapter: one GET over a user-supplied URL, parsed as
//! RSS 2.0 with an Atom fallback.
//!
//! External id precedence: item GUID, else link, else the md5 hex digest of
//! `title + published`, so items from sloppy feeds still get a stable key.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use md5::{Digest, Md5};
use seer_core::{truncate_chars, Opportunity, SourceConfig};
use serde::Deserialize;

use crate::{ensure_success, http_client, Source, SourceError};

const CONTENT_FALLBACK_LIMIT: usize = 500;

#[derive(Debug)]
pub struct Rss {
    config: SourceConfig,
    client: reqwest::Client,
}

/// Feed shape after format detection, shared by the RSS and Atom branches.
#[derive(Debug, PartialEq)]
struct ParsedFeed {
    title: String,
    items: Vec<FeedItem>,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct FeedItem {
    title: String,
    link: String,
    guid: String,
    published_raw: String,
    published: Option<DateTime<Utc>>,
    description: String,
    author: String,
    categories: Vec<String>,
}

// Text-bearing element that may also carry attributes (`type`, `domain`, ...).
#[derive(Debug, Default, Deserialize)]
struct TextNode {
    #[serde(rename = "$text", default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct RssDocument {
    channel: RssChannel,
}

#[derive(Debug, Deserialize)]
struct RssChannel {
    #[serde(default)]
    title: TextNode,
    #[serde(rename = "item", default)]
    items: Vec<RssItem>,
}

#[derive(Debug, Deserialize)]
struct RssItem {
    #[serde(default)]
    title: TextNode,
    #[serde(default)]
    link: TextNode,
    #[serde(default)]
    guid: TextNode,
    #[serde(rename = "pubDate", default)]
    pub_date: TextNode,
    #[serde(default)]
    description: TextNode,
    #[serde(rename = "content:encoded", default)]
    content: TextNode,
    #[serde(default)]
    author: TextNode,
    #[serde(rename = "category", default)]
    categories: Vec<TextNode>,
}

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(default)]
    title: TextNode,
    #[serde(rename = "entry", default)]
    entries: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    #[serde(default)]
    id: TextNode,
    #[serde(default)]
    title: TextNode,
    #[serde(rename = "link", default)]
    links: Vec<AtomLink>,
    #[serde(default)]
    published: TextNode,
    #[serde(default)]
    updated: TextNode,
    #[serde(default)]
    summary: TextNode,
    #[serde(default)]
    author: Option<AtomAuthor>,
}

#[derive(Debug, Default, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href", default)]
    href: String,
    #[serde(rename = "@rel", default)]
    rel: String,
}

#[derive(Debug, Default, Deserialize)]
struct AtomAuthor {
    #[serde(default)]
    name: TextNode,
}

impl Rss {
    pub fn from_config(config: SourceConfig) -> Result<Box<dyn Source>, SourceError> {
        if config.url.is_empty() {
            return Err(SourceError::Config("rss source requires a url".into()));
        }
        Ok(Box::new(Self {
            client: http_client()?,
            config,
        }))
    }
}

fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    if raw.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc2822(raw)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn parse_feed(body: &str) -> Result<ParsedFeed, SourceError> {
    if let Ok(doc) = quick_xml::de::from_str::<RssDocument>(body) {
        return Ok(ParsedFeed {
            title: doc.channel.title.value,
            items: doc.channel.items.into_iter().map(rss_item).collect(),
        });
    }

    match quick_xml::de::from_str::<AtomFeed>(body) {
        Ok(feed) => Ok(ParsedFeed {
            title: feed.title.value,
            items: feed.entries.into_iter().map(atom_entry).collect(),
        }),
        Err(err) => Err(SourceError::Parse(err.to_string())),
    }
}

fn rss_item(item: RssItem) -> FeedItem {
    let published = parse_date(&item.pub_date.value);
    let description = if item.description.value.is_empty() && !item.content.value.is_empty() {
        truncate_chars(&item.content.value, CONTENT_FALLBACK_LIMIT)
    } else {
        item.description.value
    };

    FeedItem {
        title: item.title.value,
        link: item.link.value,
        guid: item.guid.value,
        published_raw: item.pub_date.value,
        published,
        description,
        author: item.author.value,
        categories: item.categories.into_iter().map(|c| c.value).collect(),
    }
}

fn atom_entry(entry: AtomEntry) -> FeedItem {
    // Prefer the alternate link; plain links come first in practice.
    let link = entry
        .links
        .iter()
        .find(|l| l.rel.is_empty() || l.rel == "alternate")
        .or_else(|| entry.links.first())
        .map(|l| l.href.clone())
        .unwrap_or_default();

    let published_raw = if entry.published.value.is_empty() {
        entry.updated.value.clone()
    } else {
        entry.published.value.clone()
    };
    let published = parse_date(&published_raw);

    FeedItem {
        title: entry.title.value,
        link,
        guid: entry.id.value,
        published_raw,
        published,
        description: entry.summary.value,
        author: entry.author.map(|a| a.name.value).unwrap_or_default(),
        categories: Vec::new(),
    }
}

fn external_id(item: &FeedItem) -> String {
    if !item.guid.is_empty() {
        return item.guid.clone();
    }
    if !item.link.is_empty() {
        return item.link.clone();
    }
    let mut hasher = Md5::new();
    hasher.update(item.title.as_bytes());
    hasher.update(item.published_raw.as_bytes());
    hex::encode(hasher.finalize())
}

fn item_to_opportunity(feed_title: &str, feed_url: &str, item: FeedItem) -> Opportunity {
    let external_id = external_id(&item);
    let detected_at = item.published.unwrap_or_else(Utc::now);

    let mut metadata = serde_json::Map::new();
    metadata.insert("feed_title".into(), feed_title.into());
    metadata.insert("feed_url".into(), feed_url.into());
    metadata.insert("author".into(), item.author.into());
    metadata.insert("categories".into(), item.categories.into());

    Opportunity {
        title: item.title,
        description: item.description,
        source_type: "rss".into(),
        source_url: item.link,
        external_id,
        detected_at,
        metadata,
    }
}

#[async_trait]
impl Source for Rss {
    fn source_type(&self) -> &'static str {
        "rss"
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    async fn fetch(&self) -> Result<Vec<Opportunity>, SourceError> {
        let response = self.client.get(&self.config.url).send().await?;
        ensure_success(&response)?;
        let body = response.text().await?;
        let feed = parse_feed(&body)?;

        let mut seen = HashSet::new();
        let mut opportunities = Vec::new();
        for item in feed.items {
            let opp = item_to_opportunity(&feed.title, &self.config.url, item);
            if !opp.is_well_formed() {
                continue;
            }
            if !seen.insert(opp.external_id.clone()) {
                continue;
            }
            opportunities.push(opp);
        }

        Ok(opportunities)
    }
}
