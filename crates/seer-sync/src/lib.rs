//! Fetch orchestration: the periodic scheduler, per-source fan-out, scoring,
//! persistence, and alert dispatch.
//!
//! A tick loads every enabled source record, builds its adapter through the
//! registry, and runs one task per source. Tasks are isolated: a hung,
//! failing, or panicking source never blocks the others, and a tick reports
//! success even when individual sources fail.

pub mod alerts;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use seer_adapters::Registry;
use seer_core::scoring::Scorer;
use seer_storage::{OpportunityStore, SourceRecord, SourceRepository};
use sqlx::SqlitePool;
use tokio::task::JoinSet;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{info, warn};
use uuid::Uuid;

pub use alerts::{AlertPayload, AlertSink, WebhookAlerts};

pub const DEFAULT_FETCH_INTERVAL_MINUTES: i64 = 60;
const DEFAULT_SOURCE_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// Outcome of one tick. Errors are per-source and already logged; the tick
/// itself succeeds whenever the source list could be read.
#[derive(Debug)]
pub struct FetchSummary {
    pub run_id: Uuid,
    pub sources: usize,
    pub stored: usize,
    pub errors: Vec<String>,
}

/// Owns the scheduler clock and the per-tick fan-out.
pub struct Manager {
    repo: SourceRepository,
    store: OpportunityStore,
    registry: Registry,
    scorer: Scorer,
    alerts: Option<Arc<dyn AlertSink>>,
    alert_min_score: i64,
    fetch_interval_minutes: u64,
    source_timeout: Duration,
    scheduler: tokio::sync::Mutex<Option<JobScheduler>>,
}

impl Manager {
    /// `fetch_interval_minutes <= 0` falls back to the hourly default; the
    /// effective minimum is one minute.
    pub fn new(pool: SqlitePool, fetch_interval_minutes: i64) -> Self {
        let interval = if fetch_interval_minutes <= 0 {
            DEFAULT_FETCH_INTERVAL_MINUTES
        } else {
            fetch_interval_minutes
        }
        .max(1) as u64;

        Self {
            repo: SourceRepository::new(pool.clone()),
            store: OpportunityStore::new(pool),
            registry: Registry::with_defaults(),
            scorer: Scorer::new(),
            alerts: None,
            alert_min_score: 50,
            fetch_interval_minutes: interval,
            source_timeout: DEFAULT_SOURCE_TIMEOUT,
            scheduler: tokio::sync::Mutex::new(None),
        }
    }

    pub fn with_registry(mut self, registry: Registry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_alerts(mut self, sink: Arc<dyn AlertSink>, min_score: i64) -> Self {
        self.alerts = Some(sink);
        self.alert_min_score = min_score;
        self
    }

    /// Cap on one source's whole `fetch` call. Dropping the timed-out future
    /// aborts its in-flight requests.
    pub fn with_source_timeout(mut self, timeout: Duration) -> Self {
        self.source_timeout = timeout;
        self
    }

    pub fn repository(&self) -> &SourceRepository {
        &self.repo
    }

    /// Seed the repository, schedule the periodic tick, and kick one fetch in
    /// the background. Idempotent: a running manager ignores further calls.
    pub async fn start(self: Arc<Self>) -> Result<()> {
        let mut guard = self.scheduler.lock().await;
        if guard.is_some() {
            return Ok(());
        }

        self.repo.seed().await.context("seeding default sources")?;

        let scheduler = JobScheduler::new().await.context("creating scheduler")?;
        let every = Duration::from_secs(self.fetch_interval_minutes * 60);
        let manager = Arc::clone(&self);
        let job = Job::new_repeated_async(every, move |_id, _scheduler| {
            let manager = Arc::clone(&manager);
            Box::pin(async move {
                if let Err(err) = manager.fetch_all().await {
                    warn!(error = %err, "scheduled fetch failed");
                }
            })
        })
        .context("creating fetch job")?;
        scheduler.add(job).await.context("adding fetch job")?;
        scheduler.start().await.context("starting scheduler")?;

        info!(
            interval_minutes = self.fetch_interval_minutes,
            "source manager started"
        );
        *guard = Some(scheduler);
        drop(guard);

        // Initial fetch runs in the background so startup is not gated on
        // remote APIs.
        let manager = Arc::clone(&self);
        tokio::spawn(async move {
            if let Err(err) = manager.fetch_all().await {
                warn!(error = %err, "initial fetch failed");
            }
        });

        Ok(())
    }

    /// Shut the scheduler down and wait for it to drain.
    pub async fn stop(&self) {
        let mut guard = self.scheduler.lock().await;
        if let Some(mut scheduler) = guard.take() {
            if let Err(err) = scheduler.shutdown().await {
                warn!(error = %err, "scheduler shutdown error");
            }
            info!("source manager stopped");
        }
    }

    /// Manual trigger, detached from the caller's lifetime. The HTTP handler
    /// uses this so sending the response does not cancel the fetch.
    pub fn spawn_fetch(self: Arc<Self>) {
        tokio::spawn(async move {
            if let Err(err) = self.fetch_all().await {
                warn!(error = %err, "manual fetch failed");
            }
        });
    }

    /// One tick: fan out over enabled sources, score and upsert everything
    /// they return. Per-source failures are collected, logged, and do not
    /// fail the tick.
    pub async fn fetch_all(self: Arc<Self>) -> Result<FetchSummary> {
        let run_id = Uuid::new_v4();
        let records = self
            .repo
            .get_enabled()
            .await
            .context("loading enabled sources")?;
        let sources = records.len();
        info!(%run_id, sources, "fetch tick started");

        let mut tasks: JoinSet<std::result::Result<usize, String>> = JoinSet::new();
        for record in records {
            let manager = Arc::clone(&self);
            tasks.spawn(async move {
                manager
                    .fetch_source(&record)
                    .await
                    .map_err(|err| format!("source {}: {err}", record.name))
            });
        }

        let mut stored = 0;
        let mut errors = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(count)) => stored += count,
                Ok(Err(err)) => errors.push(err),
                // A panicking adapter is contained by its task.
                Err(join_err) => errors.push(format!("source task panicked: {join_err}")),
            }
        }

        if errors.is_empty() {
            info!(%run_id, stored, "fetch tick completed");
        } else {
            warn!(%run_id, stored, failed = errors.len(), "fetch tick completed with errors");
            for error in &errors {
                warn!(%run_id, error = %error, "fetch error");
            }
        }

        Ok(FetchSummary {
            run_id,
            sources,
            stored,
            errors,
        })
    }

    async fn fetch_source(&self, record: &SourceRecord) -> std::result::Result<usize, String> {
        let source = self
            .registry
            .create(record.to_config())
            .map_err(|err| err.to_string())?;

        let opportunities =
            match tokio::time::timeout(self.source_timeout, source.fetch()).await {
                Ok(Ok(opportunities)) => opportunities,
                Ok(Err(err)) => return Err(format!("fetch failed: {err}")),
                Err(_) => {
                    return Err(format!(
                        "fetch timed out after {}s",
                        self.source_timeout.as_secs()
                    ))
                }
            };

        let mut stored = 0;
        for opportunity in &opportunities {
            let result = self.scorer.score(opportunity);
            let matched = result.matched_names();
            if let Err(err) = self
                .store
                .upsert(record.id, opportunity, result.score, &matched)
                .await
            {
                warn!(error = %err, title = %opportunity.title, "failed to store opportunity");
                continue;
            }
            stored += 1;

            if let Some(sink) = &self.alerts {
                if result.score >= self.alert_min_score {
                    sink.on_new_opportunity(&AlertPayload::from_opportunity(
                        opportunity,
                        result.score,
                    ))
                    .await;
                }
            }
        }

        info!(source = %record.name, fetched = opportunities.len(), stored, "source fetch complete");
        Ok(stored)
    }
}
