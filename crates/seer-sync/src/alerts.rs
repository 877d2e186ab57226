//! Alert dispatch for high-scoring opportunities.
//!
//! The manager calls [`AlertSink::on_new_opportunity`] after upserting a row
//! whose score clears the configured threshold. Sinks swallow their own
//! failures; a broken webhook must never stall a fetch tick.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use seer_core::Opportunity;
use serde::Serialize;
use tracing::{debug, warn};

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Serialize)]
pub struct AlertPayload {
    pub title: String,
    pub description: String,
    pub score: i64,
    pub source: String,
    pub url: String,
    pub detected_at: DateTime<Utc>,
}

impl AlertPayload {
    pub fn from_opportunity(opportunity: &Opportunity, score: i64) -> Self {
        Self {
            title: opportunity.title.clone(),
            description: opportunity.description.clone(),
            score,
            source: opportunity.source_type.clone(),
            url: opportunity.source_url.clone(),
            detected_at: opportunity.detected_at,
        }
    }
}

#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Dispatch one alert. Implementations log and swallow their own errors.
    async fn on_new_opportunity(&self, payload: &AlertPayload);
}

/// POSTs the payload as JSON to a configured webhook URL.
pub struct WebhookAlerts {
    url: String,
    client: reqwest::Client,
}

impl WebhookAlerts {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl AlertSink for WebhookAlerts {
    async fn on_new_opportunity(&self, payload: &AlertPayload) {
        let result = self
            .client
            .post(&self.url)
            .timeout(WEBHOOK_TIMEOUT)
            .json(payload)
            .send()
            .await
            .and_then(|response| response.error_for_status());

        match result {
            Ok(_) => debug!(title = %payload.title, score = payload.score, "alert delivered"),
            Err(err) => warn!(error = %err, "alert webhook failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_projects_the_opportunity() {
        let opp = Opportunity {
            title: "Big one".into(),
            description: "Lots of pull".into(),
            source_type: "hackernews".into(),
            source_url: "https://news.ycombinator.com/item?id=9".into(),
            external_id: "9".into(),
            detected_at: Utc::now(),
            metadata: serde_json::Map::new(),
        };
        let payload = AlertPayload::from_opportunity(&opp, 85);
        assert_eq!(payload.title, "Big one");
        assert_eq!(payload.score, 85);
        assert_eq!(payload.source, "hackernews");

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["url"], "https://news.ycombinator.com/item?id=9");
    }
}
