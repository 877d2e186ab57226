//! Generic JSON API adapter.
//!
//! One GET against a user-supplied endpoint, a dotted-path selector to the
//! item array, and per-field mappings into the opportunity shape. Recognized
//! config keys: `items_path`, `title_field`, `description_field`, `url_field`,
//! `id_field`, `date_field`, `authorization`, `api_key`. Unknown keys are
//! ignored.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use seer_core::{Opportunity, SourceConfig};
use serde_json::Value;

use crate::{config_or_default, ensure_success, http_client, Source, SourceError};

#[derive(Debug)]
pub struct Custom {
    name: String,
    url: String,
    authorization: Option<String>,
    api_key: Option<String>,
    mapping: FieldMapping,
    client: reqwest::Client,
}

#[derive(Debug, Clone)]
struct FieldMapping {
    /// Dotted path to the item array; empty means the root is the array.
    items_path: String,
    title_field: String,
    description_field: String,
    url_field: String,
    id_field: String,
    date_field: String,
}

impl Custom {
    pub fn from_config(config: SourceConfig) -> Result<Box<dyn Source>, SourceError> {
        if config.url.is_empty() {
            return Err(SourceError::Config("custom source requires a url".into()));
        }

        let mapping = FieldMapping {
            items_path: config_or_default(&config.config, "items_path", ""),
            title_field: config_or_default(&config.config, "title_field", "title"),
            description_field: config_or_default(&config.config, "description_field", "description"),
            url_field: config_or_default(&config.config, "url_field", "url"),
            id_field: config_or_default(&config.config, "id_field", "id"),
            date_field: config_or_default(&config.config, "date_field", ""),
        };

        Ok(Box::new(Self {
            name: config.name,
            url: config.url,
            authorization: config.config.get("authorization").cloned(),
            api_key: config.config.get("api_key").cloned(),
            mapping,
            client: http_client()?,
        }))
    }
}

/// Walk a dotted path (`data.items`) through nested objects.
fn select_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(root);
    }
    let mut current = root;
    for part in path.split('.').map(str::trim).filter(|p| !p.is_empty()) {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

/// Stringify the value at a (possibly dotted) field selector. Numbers render
/// without an exponent; anything non-scalar maps to empty.
fn extract_string(item: &Value, field: &str) -> String {
    if field.is_empty() {
        return String::new();
    }
    let Some(value) = select_path(item, field) else {
        return String::new();
    };
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i.to_string()
            } else if let Some(f) = n.as_f64() {
                format!("{f:.0}")
            } else {
                n.to_string()
            }
        }
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

fn item_to_opportunity(item: &Value, mapping: &FieldMapping) -> Opportunity {
    let mut detected_at = Utc::now();
    if !mapping.date_field.is_empty() {
        let raw = extract_string(item, &mapping.date_field);
        if let Ok(parsed) = raw.parse::<DateTime<Utc>>() {
            detected_at = parsed;
        }
    }

    Opportunity {
        title: extract_string(item, &mapping.title_field),
        description: extract_string(item, &mapping.description_field),
        source_type: "custom".into(),
        source_url: extract_string(item, &mapping.url_field),
        external_id: extract_string(item, &mapping.id_field),
        detected_at,
        metadata: serde_json::Map::new(),
    }
}

#[async_trait]
impl Source for Custom {
    fn source_type(&self) -> &'static str {
        "custom"
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> Result<Vec<Opportunity>, SourceError> {
        let mut request = self
            .client
            .get(&self.url)
            .header("Accept", "application/json");
        if let Some(authorization) = &self.authorization {
            request = request.header("Authorization", authorization.as_str());
        }
        if let Some(api_key) = &self.api_key {
            request = request.header("X-API-Key", api_key.as_str());
        }

        let response = request.send().await?;
        ensure_success(&response)?;
        let body: Value = response.json().await?;

        let items = select_path(&body, &self.mapping.items_path)
            .and_then(Value::as_array)
            .ok_or_else(|| {
                SourceError::Parse("could not extract items from response".into())
            })?;

        let mut opportunities = Vec::new();
        for item in items {
            let opp = item_to_opportunity(item, &self.mapping);
            if opp.is_well_formed() {
                opportunities.push(opp);
            }
        }

        Ok(opportunities)
    }
}
