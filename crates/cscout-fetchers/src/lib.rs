//! Source fetcher contract, per-source adapters, and the ingestion pipeline.

use std::collections::HashSet;

use async_trait::async_trait;
use cscout_core::CompetitionRecord;
use cscout_storage::{HttpClient, HttpError};
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

pub mod sources;

pub const CRATE_NAME: &str = "cscout-fetchers";

/// Opaque raw payload handed from `fetch()` to `parse()`. Shape is private to
/// each adapter; the pipeline never inspects it.
#[derive(Debug, Clone)]
pub enum RawPayload {
    Json(Value),
    Html(Vec<String>),
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Http(#[from] HttpError),
    #[error("unexpected payload from {source_name}: {detail}")]
    Payload { source_name: String, detail: String },
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("unusable raw payload: {0}")]
    Payload(String),
}

/// One external competition source. `fetch` performs retrieval, `parse`
/// converts the raw payload into canonical records, dropping malformed items
/// individually rather than aborting the batch. Failures of either method are
/// absorbed by the owning pipeline call and never propagate further.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch(&self, http: &HttpClient) -> Result<RawPayload, FetchError>;

    fn parse(&self, raw: &RawPayload) -> Result<Vec<CompetitionRecord>, ParseError>;
}

/// Drop records missing a title, start date, or link.
pub fn validate(records: Vec<CompetitionRecord>) -> Vec<CompetitionRecord> {
    records
        .into_iter()
        .filter(|record| {
            let valid =
                !record.title.is_empty() && record.start_date.is_some() && !record.link.is_empty();
            if !valid {
                warn!(id = %record.id, "dropping record with missing title, start_date, or link");
            }
            valid
        })
        .collect()
}

/// Collapse records sharing `(title, start_date)`. First occurrence wins and
/// relative order is preserved.
pub fn deduplicate(records: Vec<CompetitionRecord>) -> Vec<CompetitionRecord> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|record| {
            let key = (
                record.title.clone(),
                record.start_date.map(|d| d.to_rfc3339()).unwrap_or_default(),
            );
            seen.insert(key)
        })
        .collect()
}

/// Result of one per-source pipeline run. A failed run carries an empty
/// record set plus the failure detail; the pipeline itself never errors.
#[derive(Debug, Clone, Default)]
pub struct PipelineOutcome {
    pub records: Vec<CompetitionRecord>,
    pub error: Option<String>,
}

/// Composes fetch -> parse -> validate -> deduplicate for one source. Owns
/// the HTTP handle it was constructed with; no hidden global state.
#[derive(Debug, Clone)]
pub struct IngestionPipeline {
    http: HttpClient,
}

impl IngestionPipeline {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    pub async fn run(&self, fetcher: &dyn SourceFetcher) -> PipelineOutcome {
        let source = fetcher.name();

        let raw = match fetcher.fetch(&self.http).await {
            Ok(raw) => raw,
            Err(err) => {
                warn!(source, error = %err, "fetch failed");
                return PipelineOutcome {
                    records: Vec::new(),
                    error: Some(format!("fetch failed: {err}")),
                };
            }
        };

        let parsed = match fetcher.parse(&raw) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(source, error = %err, "parse failed");
                return PipelineOutcome {
                    records: Vec::new(),
                    error: Some(format!("parse failed: {err}")),
                };
            }
        };

        let records = deduplicate(validate(parsed));
        info!(source, count = records.len(), "pipeline produced records");
        PipelineOutcome {
            records,
            error: None,
        }
    }
}

/// Name-keyed fetcher table, built once at process start and passed into the
/// orchestrator. Iteration follows registration order.
#[derive(Default)]
pub struct FetcherRegistry {
    entries: Vec<Box<dyn SourceFetcher>>,
}

impl FetcherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, fetcher: Box<dyn SourceFetcher>) {
        self.entries.push(fetcher);
    }

    pub fn get(&self, name: &str) -> Option<&dyn SourceFetcher> {
        self.entries
            .iter()
            .find(|f| f.name() == name)
            .map(|f| f.as_ref())
    }

    pub fn take(&mut self, name: &str) -> Option<Box<dyn SourceFetcher>> {
        let index = self.entries.iter().position(|f| f.name() == name)?;
        Some(self.entries.remove(index))
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.entries.iter().map(|f| f.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// All built-in sources in their canonical registration order.
pub fn default_registry() -> FetcherRegistry {
    let mut registry = FetcherRegistry::new();
    registry.register(Box::new(sources::CodeforcesFetcher::new()));
    registry.register(Box::new(sources::KaggleFetcher::new()));
    registry.register(Box::new(sources::HackalistFetcher::new()));
    registry.register(Box::new(sources::HackerRankFetcher::new()));
    registry
}
