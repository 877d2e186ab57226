//! Opportunity persistence: idempotent upserts keyed by
//! `(source, source_id_external)` plus the range and stats queries the API
//! and digest generator read from.

use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use seer_core::report::ReportItem;
use seer_core::Opportunity;
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::datetime_from_ts;

const SELECT_COLUMNS: &str = "SELECT id, source_id, title, description, source, source_url, \
     source_id_external, score, signals, detected_at, created_at FROM opportunities";

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 1000;

/// One persisted opportunity row.
#[derive(Debug, Clone, Serialize)]
pub struct StoredOpportunity {
    pub id: i64,
    pub source_id: i64,
    pub title: String,
    pub description: String,
    pub source_type: String,
    pub source_url: String,
    pub external_id: String,
    pub score: i64,
    pub signals: Vec<String>,
    pub detected_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl StoredOpportunity {
    pub fn to_report_item(&self) -> ReportItem {
        ReportItem {
            id: self.id,
            title: self.title.clone(),
            description: self.description.clone(),
            source_type: self.source_type.clone(),
            source_url: self.source_url.clone(),
            score: self.score,
            signals: self.signals.clone(),
            detected_at: self.detected_at,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct OpportunityFilter {
    pub source_type: Option<String>,
    pub min_score: i64,
    /// 0 means the default page size (50); capped at 1000.
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct OpportunityStats {
    pub total: i64,
    pub by_source: HashMap<String, i64>,
    pub average_score: f64,
    pub today: i64,
}

#[derive(Clone)]
pub struct OpportunityStore {
    pool: SqlitePool,
}

impl OpportunityStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or refresh the row for `(source_type, external_id)`. Mutable
    /// columns follow the newest fetch; `created_at` and `source_id` stay
    /// from the first insert.
    pub async fn upsert(
        &self,
        source_id: i64,
        opportunity: &Opportunity,
        score: i64,
        matched_signals: &[String],
    ) -> Result<()> {
        let signals_json = serde_json::to_string(matched_signals)?;
        sqlx::query(
            "INSERT INTO opportunities (source_id, title, description, source, source_url, \
             source_id_external, score, signals, detected_at, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(source, source_id_external) DO UPDATE SET
                 title = excluded.title,
                 description = excluded.description,
                 source_url = excluded.source_url,
                 score = excluded.score,
                 signals = excluded.signals,
                 detected_at = excluded.detected_at",
        )
        .bind(source_id)
        .bind(&opportunity.title)
        .bind(&opportunity.description)
        .bind(&opportunity.source_type)
        .bind(&opportunity.source_url)
        .bind(&opportunity.external_id)
        .bind(score)
        .bind(signals_json)
        .bind(opportunity.detected_at.timestamp())
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get(&self, id: i64) -> Result<Option<StoredOpportunity>> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(map_row).transpose()
    }

    /// Filtered page, ordered `score DESC, detected_at DESC`.
    pub async fn list(&self, filter: &OpportunityFilter) -> Result<Vec<StoredOpportunity>> {
        let mut sql = format!("{SELECT_COLUMNS} WHERE score >= ?");
        if filter.source_type.is_some() {
            sql.push_str(" AND source = ?");
        }
        sql.push_str(" ORDER BY score DESC, detected_at DESC LIMIT ? OFFSET ?");

        let limit = if filter.limit <= 0 {
            DEFAULT_LIMIT
        } else {
            filter.limit.min(MAX_LIMIT)
        };

        let mut query = sqlx::query(&sql).bind(filter.min_score);
        if let Some(source_type) = &filter.source_type {
            query = query.bind(source_type);
        }
        let rows = query
            .bind(limit)
            .bind(filter.offset.max(0))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(map_row).collect()
    }

    /// Every row detected within `[start, end]`, ordered `score DESC` for
    /// digest generation.
    pub async fn range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<StoredOpportunity>> {
        let rows = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE detected_at BETWEEN ? AND ? ORDER BY score DESC"
        ))
        .bind(start.timestamp())
        .bind(end.timestamp())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(map_row).collect()
    }

    pub async fn stats(
        &self,
        source_type: Option<&str>,
        min_score: i64,
    ) -> Result<OpportunityStats> {
        let mut where_clause = String::from("WHERE score >= ?");
        if source_type.is_some() {
            where_clause.push_str(" AND source = ?");
        }

        let total_sql = format!("SELECT COUNT(*) FROM opportunities {where_clause}");
        let mut total_query = sqlx::query_scalar::<_, i64>(&total_sql).bind(min_score);
        if let Some(source) = source_type {
            total_query = total_query.bind(source);
        }
        let total: i64 = total_query.fetch_one(&self.pool).await?;

        let average_sql =
            format!("SELECT COALESCE(AVG(score), 0.0) FROM opportunities {where_clause}");
        let mut average_query = sqlx::query_scalar::<_, f64>(&average_sql).bind(min_score);
        if let Some(source) = source_type {
            average_query = average_query.bind(source);
        }
        let average_score: f64 = average_query.fetch_one(&self.pool).await?;

        let day_ago = (Utc::now() - Duration::hours(24)).timestamp();
        let today_sql =
            format!("SELECT COUNT(*) FROM opportunities {where_clause} AND detected_at >= ?");
        let mut today_query = sqlx::query_scalar::<_, i64>(&today_sql).bind(min_score);
        if let Some(source) = source_type {
            today_query = today_query.bind(source);
        }
        let today: i64 = today_query.bind(day_ago).fetch_one(&self.pool).await?;

        let by_source_sql = format!(
            "SELECT source, COUNT(*) AS count FROM opportunities {where_clause} GROUP BY source"
        );
        let mut by_source_query = sqlx::query(&by_source_sql).bind(min_score);
        if let Some(source) = source_type {
            by_source_query = by_source_query.bind(source);
        }
        let rows = by_source_query.fetch_all(&self.pool).await?;

        let mut by_source = HashMap::new();
        for row in rows {
            let source: String = row.try_get("source")?;
            let count: i64 = row.try_get("count")?;
            by_source.insert(source, count);
        }

        Ok(OpportunityStats {
            total,
            by_source,
            average_score,
            today,
        })
    }
}

fn map_row(row: &SqliteRow) -> Result<StoredOpportunity> {
    let signals_json: String = row.try_get("signals")?;
    let signals: Vec<String> = serde_json::from_str(&signals_json).unwrap_or_default();
    Ok(StoredOpportunity {
        id: row.try_get("id")?,
        source_id: row.try_get("source_id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        source_type: row.try_get("source")?,
        source_url: row.try_get("source_url")?,
        external_id: row.try_get("source_id_external")?,
        score: row.try_get("score")?,
        signals,
        detected_at: datetime_from_ts(row.try_get("detected_at")?),
        created_at: datetime_from_ts(row.try_get("created_at")?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{connect_in_memory, migrate, SourceRecord, SourceRepository};

    async fn store_with_source() -> (OpportunityStore, i64) {
        let pool = connect_in_memory().await.unwrap();
        migrate(&pool).await.unwrap();

        let repo = SourceRepository::new(pool.clone());
        let mut record = SourceRecord {
            id: 0,
            source_type: "hackernews".into(),
            name: "Hacker News".into(),
            url: String::new(),
            config: "{}".into(),
            enabled: true,
            is_builtin: true,
            created_at: Utc::now(),
        };
        repo.create(&mut record).await.unwrap();

        (OpportunityStore::new(pool), record.id)
    }

    fn opportunity(external_id: &str, title: &str) -> Opportunity {
        Opportunity {
            title: title.into(),
            description: "desc".into(),
            source_type: "hackernews".into(),
            source_url: format!("https://news.ycombinator.com/item?id={external_id}"),
            external_id: external_id.into(),
            detected_at: Utc::now(),
            metadata: serde_json::Map::new(),
        }
    }

    #[tokio::test]
    async fn upsert_round_trips_all_observable_fields() {
        let (store, source_id) = store_with_source().await;
        let opp = opportunity("101", "First title");
        let signals = vec!["technical".to_string(), "recent".to_string()];

        store.upsert(source_id, &opp, 40, &signals).await.unwrap();

        let rows = store.list(&OpportunityFilter::default()).await.unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.title, "First title");
        assert_eq!(row.external_id, "101");
        assert_eq!(row.source_type, "hackernews");
        assert_eq!(row.score, 40);
        assert_eq!(row.signals, signals);
        assert_eq!(row.detected_at.timestamp(), opp.detected_at.timestamp());

        let by_id = store.get(row.id).await.unwrap().unwrap();
        assert_eq!(by_id.title, row.title);
    }

    #[tokio::test]
    async fn upsert_on_same_key_updates_in_place() {
        let (store, source_id) = store_with_source().await;

        let first = opportunity("200", "Original");
        store.upsert(source_id, &first, 30, &[]).await.unwrap();
        let original = store.list(&OpportunityFilter::default()).await.unwrap()[0].clone();

        let second = opportunity("200", "Rewritten");
        store
            .upsert(source_id, &second, 70, &["technical".to_string()])
            .await
            .unwrap();

        let rows = store.list(&OpportunityFilter::default()).await.unwrap();
        assert_eq!(rows.len(), 1, "same key must not create a second row");
        let row = &rows[0];
        assert_eq!(row.id, original.id);
        assert_eq!(row.title, "Rewritten");
        assert_eq!(row.score, 70);
        assert_eq!(row.signals, vec!["technical".to_string()]);
        // created_at survives the overwrite
        assert_eq!(row.created_at, original.created_at);
    }

    #[tokio::test]
    async fn same_external_id_in_different_sources_stays_distinct() {
        let (store, source_id) = store_with_source().await;

        let hn = opportunity("5", "From HN");
        let mut feed = opportunity("5", "From a feed");
        feed.source_type = "rss".into();

        store.upsert(source_id, &hn, 10, &[]).await.unwrap();
        store.upsert(source_id, &feed, 10, &[]).await.unwrap();

        let rows = store.list(&OpportunityFilter::default()).await.unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn list_filters_and_orders() {
        let (store, source_id) = store_with_source().await;

        for (id, score) in [("a", 90), ("b", 20), ("c", 55)] {
            store
                .upsert(source_id, &opportunity(id, id), score, &[])
                .await
                .unwrap();
        }
        let mut other = opportunity("d", "d");
        other.source_type = "npm".into();
        store.upsert(source_id, &other, 99, &[]).await.unwrap();

        let all = store.list(&OpportunityFilter::default()).await.unwrap();
        let scores: Vec<i64> = all.iter().map(|o| o.score).collect();
        assert_eq!(scores, vec![99, 90, 55, 20]);

        let filtered = store
            .list(&OpportunityFilter {
                source_type: Some("hackernews".into()),
                min_score: 50,
                ..OpportunityFilter::default()
            })
            .await
            .unwrap();
        let ids: Vec<&str> = filtered.iter().map(|o| o.external_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);

        let paged = store
            .list(&OpportunityFilter {
                limit: 2,
                offset: 1,
                ..OpportunityFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(paged.len(), 2);
        assert_eq!(paged[0].score, 90);
    }

    #[tokio::test]
    async fn range_selects_the_window_sorted_by_score() {
        let (store, source_id) = store_with_source().await;
        let now = Utc::now();

        let mut inside_low = opportunity("in-low", "in-low");
        inside_low.detected_at = now - Duration::hours(2);
        let mut inside_high = opportunity("in-high", "in-high");
        inside_high.detected_at = now - Duration::hours(3);
        let mut outside = opportunity("out", "out");
        outside.detected_at = now - Duration::days(10);

        store.upsert(source_id, &inside_low, 10, &[]).await.unwrap();
        store.upsert(source_id, &inside_high, 80, &[]).await.unwrap();
        store.upsert(source_id, &outside, 95, &[]).await.unwrap();

        let window = store.range(now - Duration::days(1), now).await.unwrap();
        let ids: Vec<&str> = window.iter().map(|o| o.external_id.as_str()).collect();
        assert_eq!(ids, vec!["in-high", "in-low"]);
    }

    #[tokio::test]
    async fn stats_reports_totals_averages_and_recency() {
        let (store, source_id) = store_with_source().await;
        let now = Utc::now();

        let mut old = opportunity("old", "old");
        old.detected_at = now - Duration::days(3);
        store.upsert(source_id, &old, 40, &[]).await.unwrap();
        store
            .upsert(source_id, &opportunity("new", "new"), 60, &[])
            .await
            .unwrap();
        let mut npm = opportunity("pkg", "pkg");
        npm.source_type = "npm".into();
        store.upsert(source_id, &npm, 80, &[]).await.unwrap();

        let stats = store.stats(None, 0).await.unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.by_source.get("hackernews"), Some(&2));
        assert_eq!(stats.by_source.get("npm"), Some(&1));
        assert!((stats.average_score - 60.0).abs() < f64::EPSILON);
        assert_eq!(stats.today, 2);

        let filtered = store.stats(Some("hackernews"), 50).await.unwrap();
        assert_eq!(filtered.total, 1);
        assert_eq!(filtered.by_source.len(), 1);
    }

    #[tokio::test]
    async fn empty_store_yields_empty_collections() {
        let (store, _) = store_with_source().await;
        assert!(store.list(&OpportunityFilter::default()).await.unwrap().is_empty());
        let stats = store.stats(None, 0).await.unwrap();
        assert_eq!(stats.total, 0);
        assert!(stats.by_source.is_empty());
        assert_eq!(stats.average_score, 0.0);
    }
}
