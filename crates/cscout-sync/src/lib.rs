//! Freshness-gated sync orchestration: decides when each source is re-fetched
//! and persists pipeline output idempotently.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use cscout_core::SourceMetadata;
use cscout_fetchers::{default_registry, FetcherRegistry, IngestionPipeline};
use cscout_storage::{
    DocumentStore, Filter, HttpClient, HttpClientConfig, StorageError, COMPETITIONS, METADATA,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{info, warn};
use uuid::Uuid;

pub const CRATE_NAME: &str = "cscout-sync";

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub data_dir: PathBuf,
    pub sources_file: PathBuf,
    pub ttl_hours: i64,
    pub user_agent: String,
    pub http_timeout_secs: u64,
    pub scheduler_enabled: bool,
    pub sync_cron_1: String,
    pub sync_cron_2: String,
}

impl SyncConfig {
    pub fn from_env() -> Self {
        Self {
            data_dir: std::env::var("CSCOUT_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data")),
            sources_file: std::env::var("CSCOUT_SOURCES")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("sources.yaml")),
            ttl_hours: std::env::var("CSCOUT_TTL_HOURS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(24),
            user_agent: std::env::var("CSCOUT_USER_AGENT")
                .unwrap_or_else(|_| "cscout-bot/0.1".to_string()),
            http_timeout_secs: std::env::var("CSCOUT_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(15),
            scheduler_enabled: std::env::var("CSCOUT_SCHEDULER_ENABLED")
                .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "True"))
                .unwrap_or(false),
            sync_cron_1: std::env::var("SYNC_CRON_1").unwrap_or_else(|_| "0 0 6 * * *".to_string()),
            sync_cron_2: std::env::var("SYNC_CRON_2")
                .unwrap_or_else(|_| "0 0 18 * * *".to_string()),
        }
    }

    pub fn http_client(&self) -> anyhow::Result<HttpClient> {
        HttpClient::new(HttpClientConfig {
            timeout: StdDuration::from_secs(self.http_timeout_secs),
            user_agent: Some(self.user_agent.clone()),
            ..Default::default()
        })
    }
}

/// One row of `sources.yaml`. Sources absent from the file keep their
/// defaults (enabled, workspace TTL).
#[derive(Debug, Clone, Deserialize)]
pub struct SourceSettings {
    pub source: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub ttl_hours: Option<i64>,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
struct SourcesFile {
    sources: Vec<SourceSettings>,
}

pub fn load_source_settings(path: &std::path::Path) -> anyhow::Result<Vec<SourceSettings>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let parsed: SourcesFile =
        serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    Ok(parsed.sources)
}

/// Built-in registry with disabled sources dropped, preserving registration
/// order.
pub fn configured_registry(settings: &[SourceSettings]) -> FetcherRegistry {
    let full = default_registry();
    if settings.is_empty() {
        return full;
    }
    let disabled: Vec<&str> = settings
        .iter()
        .filter(|s| !s.enabled)
        .map(|s| s.source.as_str())
        .collect();
    let mut registry = FetcherRegistry::new();
    let mut full = full;
    for name in full.names() {
        if disabled.contains(&name) {
            continue;
        }
        if let Some(fetcher) = full.take(name) {
            registry.register(fetcher);
        }
    }
    registry
}

pub fn ttl_overrides(settings: &[SourceSettings]) -> HashMap<String, i64> {
    settings
        .iter()
        .filter_map(|s| s.ttl_hours.map(|ttl| (s.source.clone(), ttl)))
        .collect()
}

/// Tracks, per source, the instant of the last successful sync. The
/// read-then-write is not atomic: two concurrent callers may both observe
/// staleness and both re-fetch, which is safe under idempotent upserts.
pub struct FreshnessGate {
    store: Arc<dyn DocumentStore>,
}

impl FreshnessGate {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// True iff metadata exists and the last sync is within `ttl`. Missing or
    /// unreadable metadata counts as stale and forces a fetch.
    pub async fn is_fresh(&self, source: &str, ttl: Duration) -> bool {
        match self.metadata(source).await {
            Ok(Some(metadata)) => Utc::now() - metadata.last_synced_at < ttl,
            Ok(None) => false,
            Err(err) => {
                warn!(source, error = %err, "freshness check failed, treating as stale");
                false
            }
        }
    }

    pub async fn update(&self, source: &str, count: usize) -> Result<(), StorageError> {
        let metadata = SourceMetadata {
            id: source.to_string(),
            last_synced_at: Utc::now(),
            record_count: count,
        };
        let document = serde_json::to_value(&metadata)?;
        self.store.upsert(METADATA, source, document).await?;
        Ok(())
    }

    pub async fn metadata(&self, source: &str) -> Result<Option<SourceMetadata>, StorageError> {
        let Some(document) = self.store.find_by_id(METADATA, source).await? else {
            return Ok(None);
        };
        Ok(serde_json::from_value(document).ok())
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("no sources registered")]
    NoSourcesRegistered,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceSyncOutcome {
    pub source: String,
    pub success: bool,
    pub skipped: bool,
    pub count: usize,
    pub error: Option<String>,
}

impl SourceSyncOutcome {
    fn skipped(source: &str) -> Self {
        Self {
            source: source.to_string(),
            success: true,
            skipped: true,
            count: 0,
            error: None,
        }
    }

    fn failed(source: &str, error: String) -> Self {
        Self {
            source: source.to_string(),
            success: false,
            skipped: false,
            count: 0,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub sources_processed: usize,
    pub sources_successful: usize,
    pub total_records: usize,
    pub details: Vec<SourceSyncOutcome>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceStatus {
    pub source: String,
    pub is_fresh: bool,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub record_count: usize,
}

/// Owns the fetcher table and the storage handle it was constructed with;
/// the only component that writes competition records.
pub struct SyncOrchestrator {
    store: Arc<dyn DocumentStore>,
    registry: FetcherRegistry,
    pipeline: IngestionPipeline,
    gate: FreshnessGate,
    default_ttl_hours: i64,
    ttl_overrides: HashMap<String, i64>,
}

impl SyncOrchestrator {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        registry: FetcherRegistry,
        http: HttpClient,
        default_ttl_hours: i64,
        ttl_overrides: HashMap<String, i64>,
    ) -> Self {
        Self {
            gate: FreshnessGate::new(store.clone()),
            store,
            registry,
            pipeline: IngestionPipeline::new(http),
            default_ttl_hours,
            ttl_overrides,
        }
    }

    pub fn source_names(&self) -> Vec<&'static str> {
        self.registry.names()
    }

    fn ttl_for(&self, source: &str) -> Duration {
        let hours = self
            .ttl_overrides
            .get(source)
            .copied()
            .unwrap_or(self.default_ttl_hours);
        Duration::hours(hours)
    }

    /// Sync one source. Every failure at this boundary is converted into the
    /// returned outcome; nothing propagates to the caller.
    pub async fn sync_one(&self, source: &str, force: bool) -> SourceSyncOutcome {
        let Some(fetcher) = self.registry.get(source) else {
            return SourceSyncOutcome::failed(source, format!("unknown source: {source}"));
        };

        if !force && self.gate.is_fresh(source, self.ttl_for(source)).await {
            info!(source, "source is fresh, skipping fetch");
            return SourceSyncOutcome::skipped(source);
        }

        let outcome = self.pipeline.run(fetcher).await;
        if let Some(error) = outcome.error {
            return SourceSyncOutcome::failed(source, error);
        }

        let mut persist_failures = 0usize;
        for record in &outcome.records {
            let document = match serde_json::to_value(record) {
                Ok(document) => document,
                Err(err) => {
                    warn!(source, id = %record.id, error = %err, "record serialization failed");
                    persist_failures += 1;
                    continue;
                }
            };
            if let Err(err) = self.store.upsert(COMPETITIONS, &record.id, document).await {
                warn!(source, id = %record.id, error = %err, "record upsert failed");
                persist_failures += 1;
            }
        }

        if let Err(err) = self.gate.update(source, outcome.records.len()).await {
            warn!(source, error = %err, "metadata update failed");
        }

        info!(source, count = outcome.records.len(), "sync complete");
        SourceSyncOutcome {
            source: source.to_string(),
            success: true,
            skipped: false,
            count: outcome.records.len(),
            error: (persist_failures > 0)
                .then(|| format!("{persist_failures} records failed to persist")),
        }
    }

    /// Sync every target source in registration order. One source's failure
    /// never stops the rest; only an empty registry or an unreachable store
    /// aborts the whole call.
    pub async fn sync_all(
        &self,
        force: bool,
        sources: Option<&[String]>,
    ) -> Result<SyncReport, SyncError> {
        if self.registry.is_empty() {
            return Err(SyncError::NoSourcesRegistered);
        }
        // Probe the store up front so total unavailability surfaces as a
        // top-level failure instead of N per-source ones.
        self.store.count(COMPETITIONS, &Filter::new()).await?;

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let targets: Vec<String> = match sources {
            Some(sources) => sources.to_vec(),
            None => self.registry.names().iter().map(ToString::to_string).collect(),
        };

        let mut details = Vec::with_capacity(targets.len());
        let mut sources_successful = 0usize;
        let mut total_records = 0usize;
        for source in &targets {
            let outcome = self.sync_one(source, force).await;
            if outcome.success {
                sources_successful += 1;
                total_records += outcome.count;
            }
            details.push(outcome);
        }

        Ok(SyncReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            sources_processed: targets.len(),
            sources_successful,
            total_records,
            details,
        })
    }

    pub async fn source_status(&self) -> Result<Vec<SourceStatus>, StorageError> {
        let mut rows = Vec::new();
        for source in self.registry.names() {
            let metadata = self.gate.metadata(source).await?;
            rows.push(SourceStatus {
                source: source.to_string(),
                is_fresh: self.gate.is_fresh(source, self.ttl_for(source)).await,
                last_synced_at: metadata.as_ref().map(|m| m.last_synced_at),
                record_count: metadata.map(|m| m.record_count).unwrap_or(0),
            });
        }
        Ok(rows)
    }
}

/// Cron-driven background syncs, enabled via `CSCOUT_SCHEDULER_ENABLED`.
pub async fn maybe_build_scheduler(
    orchestrator: Arc<SyncOrchestrator>,
    config: &SyncConfig,
) -> anyhow::Result<Option<JobScheduler>> {
    if !config.scheduler_enabled {
        return Ok(None);
    }

    let sched = JobScheduler::new().await.context("creating scheduler")?;
    for cron in [&config.sync_cron_1, &config.sync_cron_2] {
        let orchestrator = orchestrator.clone();
        let job = Job::new_async(cron.as_str(), move |_uuid, _l| {
            let orchestrator = orchestrator.clone();
            Box::pin(async move {
                match orchestrator.sync_all(false, None).await {
                    Ok(report) => info!(
                        sources = report.sources_processed,
                        records = report.total_records,
                        "scheduled sync completed"
                    ),
                    Err(err) => warn!(error = %err, "scheduled sync failed"),
                }
            })
        })
        .with_context(|| format!("creating scheduler job for cron {cron}"))?;
        sched.add(job).await.context("adding scheduler job")?;
    }
    Ok(Some(sched))
}
