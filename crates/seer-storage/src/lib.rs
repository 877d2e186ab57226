//! SQLite persistence for Seer.
//!
//! A single database file holds the source instances and the deduplicated
//! opportunity rows. WAL mode keeps reads from blocking the single writer.
//! Timestamps are stored as unix-epoch integers and converted with `chrono`
//! at the edges.

pub mod opportunities;
pub mod sources;

pub use opportunities::{OpportunityFilter, OpportunityStats, OpportunityStore, StoredOpportunity};
pub use sources::{SourceRecord, SourceRepository};

use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

/// Ordered migration statements. Each runs at most once and is recorded in
/// `schema_migrations`; append-only.
const MIGRATIONS: &[&str] = &[
    // 1: source instances
    r#"
    CREATE TABLE IF NOT EXISTS sources (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        type TEXT NOT NULL,
        name TEXT NOT NULL,
        url TEXT NOT NULL DEFAULT '',
        config TEXT NOT NULL DEFAULT '{}',
        enabled INTEGER NOT NULL DEFAULT 1,
        is_builtin INTEGER NOT NULL DEFAULT 0,
        created_at INTEGER NOT NULL
    )
    "#,
    // 2: deduplicated opportunities
    r#"
    CREATE TABLE IF NOT EXISTS opportunities (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        source_id INTEGER REFERENCES sources(id),
        title TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        source TEXT NOT NULL,
        source_url TEXT NOT NULL DEFAULT '',
        source_id_external TEXT NOT NULL,
        score INTEGER NOT NULL DEFAULT 0,
        signals TEXT NOT NULL DEFAULT '[]',
        detected_at INTEGER NOT NULL,
        created_at INTEGER NOT NULL,
        UNIQUE(source, source_id_external)
    )
    "#,
    // 3: range queries order by score then recency
    r#"
    CREATE INDEX IF NOT EXISTS idx_opportunities_score
        ON opportunities(score DESC, detected_at DESC)
    "#,
];

/// Open (creating if necessary) the database at `path` with WAL enabled.
pub async fn connect(path: impl AsRef<Path>) -> Result<SqlitePool> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating data directory {}", parent.display()))?;
        }
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .with_context(|| format!("opening database {}", path.display()))?;

    Ok(pool)
}

/// In-memory database on a single-connection pool. One connection is
/// required: every `:memory:` connection is otherwise a separate database.
pub async fn connect_in_memory() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .context("opening in-memory database")?;
    Ok(pool)
}

/// Apply pending migrations. Safe to call on every startup.
pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    let current: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(version), 0) FROM schema_migrations")
        .fetch_one(pool)
        .await?;

    for (index, statement) in MIGRATIONS.iter().enumerate() {
        let version = (index + 1) as i64;
        if version <= current {
            continue;
        }
        sqlx::query(statement)
            .execute(pool)
            .await
            .with_context(|| format!("migration {version} failed"))?;
        sqlx::query("INSERT INTO schema_migrations (version, applied_at) VALUES (?, ?)")
            .bind(version)
            .bind(Utc::now().timestamp())
            .execute(pool)
            .await
            .with_context(|| format!("recording migration {version}"))?;
    }

    Ok(())
}

pub(crate) fn datetime_from_ts(ts: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(ts, 0).unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}
