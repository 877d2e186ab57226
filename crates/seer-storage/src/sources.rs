//! Source-instance persistence and the builtin seed set.
//!
//! Builtin rows are write-protected: `update` and `delete` carry an
//! `is_builtin = 0` guard so the four seeded sources can only be toggled.

use std::collections::HashMap;

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use seer_core::SourceConfig;
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::datetime_from_ts;

const SELECT_COLUMNS: &str =
    "SELECT id, type, name, url, config, enabled, is_builtin, created_at FROM sources";

/// One row of the `sources` table. `config` is the raw JSON object; use
/// [`SourceRecord::to_config`] for the decoded map.
#[derive(Debug, Clone, Serialize)]
pub struct SourceRecord {
    pub id: i64,
    #[serde(rename = "type")]
    pub source_type: String,
    pub name: String,
    pub url: String,
    pub config: String,
    pub enabled: bool,
    pub is_builtin: bool,
    pub created_at: DateTime<Utc>,
}

impl SourceRecord {
    /// Decode into the shape adapter factories consume. An empty or invalid
    /// `config` column becomes an empty map.
    pub fn to_config(&self) -> SourceConfig {
        let config: HashMap<String, String> =
            serde_json::from_str(&self.config).unwrap_or_default();
        SourceConfig {
            id: self.id,
            source_type: self.source_type.clone(),
            name: self.name.clone(),
            url: self.url.clone(),
            config,
            enabled: self.enabled,
            is_builtin: self.is_builtin,
        }
    }
}

#[derive(Clone)]
pub struct SourceRepository {
    pool: SqlitePool,
}

impl SourceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get_all(&self) -> Result<Vec<SourceRecord>> {
        let rows = sqlx::query(&format!(
            "{SELECT_COLUMNS} ORDER BY is_builtin DESC, name ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(map_row).collect()
    }

    pub async fn get_enabled(&self) -> Result<Vec<SourceRecord>> {
        let rows = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE enabled = 1 ORDER BY is_builtin DESC, name ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(map_row).collect()
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<SourceRecord>> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(map_row).transpose()
    }

    /// Insert `record`, assigning its id and creation time.
    pub async fn create(&self, record: &mut SourceRecord) -> Result<()> {
        let created_at = Utc::now();
        let result = sqlx::query(
            "INSERT INTO sources (type, name, url, config, enabled, is_builtin, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.source_type)
        .bind(&record.name)
        .bind(&record.url)
        .bind(&record.config)
        .bind(record.enabled)
        .bind(record.is_builtin)
        .bind(created_at.timestamp())
        .execute(&self.pool)
        .await?;

        record.id = result.last_insert_rowid();
        record.created_at = created_at;
        Ok(())
    }

    /// Update a non-builtin row. Builtin rows are silently left untouched.
    pub async fn update(&self, record: &SourceRecord) -> Result<()> {
        sqlx::query(
            "UPDATE sources SET name = ?, url = ?, config = ?, enabled = ?
             WHERE id = ? AND is_builtin = 0",
        )
        .bind(&record.name)
        .bind(&record.url)
        .bind(&record.config)
        .bind(record.enabled)
        .bind(record.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Enable or disable any row, builtin included.
    pub async fn set_enabled(&self, id: i64, enabled: bool) -> Result<()> {
        sqlx::query("UPDATE sources SET enabled = ? WHERE id = ?")
            .bind(enabled)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Delete a non-builtin row.
    pub async fn delete(&self, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM sources WHERE id = ? AND is_builtin = 0")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            bail!("source not found or builtin");
        }
        Ok(())
    }

    /// Insert the default builtin sources on first boot. A no-op whenever any
    /// builtin row already exists.
    pub async fn seed(&self) -> Result<()> {
        let builtin_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM sources WHERE is_builtin = 1")
                .fetch_one(&self.pool)
                .await?;
        if builtin_count > 0 {
            return Ok(());
        }

        let defaults = [
            ("hackernews", "Hacker News"),
            ("github", "GitHub Trending"),
            ("npm", "npm Registry"),
            ("devto", "DEV.to"),
        ];
        for (source_type, name) in defaults {
            let mut record = SourceRecord {
                id: 0,
                source_type: source_type.into(),
                name: name.into(),
                url: String::new(),
                config: "{}".into(),
                enabled: true,
                is_builtin: true,
                created_at: Utc::now(),
            };
            self.create(&mut record).await?;
        }
        Ok(())
    }
}

fn map_row(row: &SqliteRow) -> Result<SourceRecord> {
    let mut config: String = row.try_get("config")?;
    if config.is_empty() {
        config = "{}".into();
    }
    Ok(SourceRecord {
        id: row.try_get("id")?,
        source_type: row.try_get("type")?,
        name: row.try_get("name")?,
        url: row.try_get("url")?,
        config,
        enabled: row.try_get("enabled")?,
        is_builtin: row.try_get("is_builtin")?,
        created_at: datetime_from_ts(row.try_get("created_at")?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{connect_in_memory, migrate};

    async fn repository() -> SourceRepository {
        let pool = connect_in_memory().await.unwrap();
        migrate(&pool).await.unwrap();
        SourceRepository::new(pool)
    }

    fn custom_record(name: &str) -> SourceRecord {
        SourceRecord {
            id: 0,
            source_type: "rss".into(),
            name: name.into(),
            url: "https://example.com/feed.xml".into(),
            config: "{}".into(),
            enabled: true,
            is_builtin: false,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn seeding_is_idempotent() {
        let repo = repository().await;

        repo.seed().await.unwrap();
        repo.seed().await.unwrap();

        let all = repo.get_all().await.unwrap();
        assert_eq!(all.len(), 4);
        assert!(all.iter().all(|s| s.is_builtin && s.enabled));

        let mut types: Vec<&str> = all.iter().map(|s| s.source_type.as_str()).collect();
        types.sort_unstable();
        assert_eq!(types, vec!["devto", "github", "hackernews", "npm"]);
    }

    #[tokio::test]
    async fn create_assigns_id_and_round_trips() {
        let repo = repository().await;
        let mut record = custom_record("My Feed");
        repo.create(&mut record).await.unwrap();
        assert!(record.id > 0);

        let fetched = repo.get_by_id(record.id).await.unwrap().unwrap();
        assert_eq!(fetched.name, "My Feed");
        assert_eq!(fetched.url, "https://example.com/feed.xml");
        assert!(!fetched.is_builtin);
    }

    #[tokio::test]
    async fn builtin_rows_resist_update_and_delete_but_allow_toggle() {
        let repo = repository().await;
        repo.seed().await.unwrap();

        let builtin = repo.get_all().await.unwrap().remove(0);

        let mut renamed = builtin.clone();
        renamed.name = "Renamed".into();
        repo.update(&renamed).await.unwrap();
        let after = repo.get_by_id(builtin.id).await.unwrap().unwrap();
        assert_eq!(after.name, builtin.name);

        let err = repo.delete(builtin.id).await.unwrap_err();
        assert_eq!(err.to_string(), "source not found or builtin");
        assert!(repo.get_by_id(builtin.id).await.unwrap().is_some());

        repo.set_enabled(builtin.id, false).await.unwrap();
        let toggled = repo.get_by_id(builtin.id).await.unwrap().unwrap();
        assert!(!toggled.enabled);
    }

    #[tokio::test]
    async fn non_builtin_rows_update_and_delete() {
        let repo = repository().await;
        let mut record = custom_record("Mutable");
        repo.create(&mut record).await.unwrap();

        record.name = "Renamed".into();
        record.enabled = false;
        repo.update(&record).await.unwrap();
        let after = repo.get_by_id(record.id).await.unwrap().unwrap();
        assert_eq!(after.name, "Renamed");
        assert!(!after.enabled);

        repo.delete(record.id).await.unwrap();
        assert!(repo.get_by_id(record.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn enabled_filter_and_ordering() {
        let repo = repository().await;
        repo.seed().await.unwrap();

        let mut disabled = custom_record("AAA Disabled");
        disabled.enabled = false;
        repo.create(&mut disabled).await.unwrap();

        let enabled = repo.get_enabled().await.unwrap();
        assert_eq!(enabled.len(), 4);
        assert!(enabled.iter().all(|s| s.enabled));
        // builtin rows sort ahead of user rows
        assert!(enabled[0].is_builtin);
    }

    #[tokio::test]
    async fn to_config_decodes_json_and_tolerates_garbage() {
        let repo = repository().await;
        let mut record = custom_record("Configured");
        record.config = r#"{"keywords": "a,b", "subreddits": "rust"}"#.into();
        repo.create(&mut record).await.unwrap();

        let config = repo
            .get_by_id(record.id)
            .await
            .unwrap()
            .unwrap()
            .to_config();
        assert_eq!(config.config.get("keywords").unwrap(), "a,b");
        assert_eq!(config.source_type, "rss");

        record.config = "not json".into();
        let config = record.to_config();
        assert!(config.config.is_empty());
    }
}
