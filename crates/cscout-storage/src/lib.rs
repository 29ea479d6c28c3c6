//! Document store contract + HTTP fetch utilities for Competition Scout.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::info_span;
use uuid::Uuid;

pub const CRATE_NAME: &str = "cscout-storage";

pub const COMPETITIONS: &str = "competitions";
pub const METADATA: &str = "metadata";
pub const USERS: &str = "users";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("document serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Top-level field equality filter. Empty filter matches everything.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    conditions: BTreeMap<String, Value>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.conditions.insert(field.to_string(), value.into());
        self
    }

    pub fn matches(&self, document: &Value) -> bool {
        self.conditions
            .iter()
            .all(|(field, expected)| document.get(field) == Some(expected))
    }
}

#[derive(Debug, Clone)]
pub struct Sort {
    pub field: String,
    pub ascending: bool,
}

impl Sort {
    pub fn ascending(field: &str) -> Self {
        Self {
            field: field.to_string(),
            ascending: true,
        }
    }

    pub fn descending(field: &str) -> Self {
        Self {
            field: field.to_string(),
            ascending: false,
        }
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    match (a, b) {
        (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
        (Some(Value::Number(a)), Some(Value::Number(b))) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        _ => Ordering::Equal,
    }
}

/// Key-addressed document storage. The key is the document's natural id;
/// `upsert` is insert-or-overwrite and returns `true` when the document was
/// newly inserted. No cross-document transactions are assumed.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn upsert(&self, collection: &str, key: &str, document: Value)
        -> Result<bool, StorageError>;

    async fn find_by_id(&self, collection: &str, id: &str) -> Result<Option<Value>, StorageError>;

    async fn find_all(
        &self,
        collection: &str,
        filter: &Filter,
        sort: Option<&Sort>,
        limit: Option<usize>,
        skip: usize,
    ) -> Result<Vec<Value>, StorageError>;

    async fn count(&self, collection: &str, filter: &Filter) -> Result<usize, StorageError>;
}

fn select_documents(
    documents: &BTreeMap<String, Value>,
    filter: &Filter,
    sort: Option<&Sort>,
    limit: Option<usize>,
    skip: usize,
) -> Vec<Value> {
    let mut matched: Vec<Value> = documents
        .values()
        .filter(|doc| filter.matches(doc))
        .cloned()
        .collect();
    if let Some(sort) = sort {
        matched.sort_by(|a, b| {
            let ord = compare_values(a.get(&sort.field), b.get(&sort.field));
            if sort.ascending {
                ord
            } else {
                ord.reverse()
            }
        });
    }
    matched.into_iter().skip(skip).take(limit.unwrap_or(usize::MAX)).collect()
}

/// In-memory store, used by tests and as the reference implementation of the
/// contract semantics.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, BTreeMap<String, Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn upsert(
        &self,
        collection: &str,
        key: &str,
        document: Value,
    ) -> Result<bool, StorageError> {
        let mut collections = self.collections.write().await;
        let documents = collections.entry(collection.to_string()).or_default();
        Ok(documents.insert(key.to_string(), document).is_none())
    }

    async fn find_by_id(&self, collection: &str, id: &str) -> Result<Option<Value>, StorageError> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|documents| documents.get(id))
            .cloned())
    }

    async fn find_all(
        &self,
        collection: &str,
        filter: &Filter,
        sort: Option<&Sort>,
        limit: Option<usize>,
        skip: usize,
    ) -> Result<Vec<Value>, StorageError> {
        let collections = self.collections.read().await;
        let Some(documents) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        Ok(select_documents(documents, filter, sort, limit, skip))
    }

    async fn count(&self, collection: &str, filter: &Filter) -> Result<usize, StorageError> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .map(|documents| documents.values().filter(|doc| filter.matches(doc)).count())
            .unwrap_or(0))
    }
}

/// File-backed store for the CLI: one JSON file per collection under `root`,
/// holding a key -> document map. Writes go through a temp file + rename so a
/// crash never leaves a truncated collection on disk.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn collection_path(&self, collection: &str) -> PathBuf {
        self.root.join(format!("{collection}.json"))
    }

    async fn load_collection(
        &self,
        collection: &str,
    ) -> Result<BTreeMap<String, Value>, StorageError> {
        let path = self.collection_path(collection);
        match fs::read_to_string(&path).await {
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(err) => Err(StorageError::Io(err)),
        }
    }

    async fn write_collection(
        &self,
        collection: &str,
        documents: &BTreeMap<String, Value>,
    ) -> Result<(), StorageError> {
        fs::create_dir_all(&self.root).await?;
        let path = self.collection_path(collection);
        let temp_path = self.root.join(format!(".{}.{}.tmp", collection, Uuid::new_v4()));
        let bytes = serde_json::to_vec_pretty(documents)?;
        fs::write(&temp_path, bytes).await?;
        match fs::rename(&temp_path, &path).await {
            Ok(()) => Ok(()),
            Err(err) => {
                let _ = fs::remove_file(&temp_path).await;
                Err(StorageError::Io(err))
            }
        }
    }
}

#[async_trait]
impl DocumentStore for JsonFileStore {
    async fn upsert(
        &self,
        collection: &str,
        key: &str,
        document: Value,
    ) -> Result<bool, StorageError> {
        let mut documents = self.load_collection(collection).await?;
        let inserted = documents.insert(key.to_string(), document).is_none();
        self.write_collection(collection, &documents).await?;
        Ok(inserted)
    }

    async fn find_by_id(&self, collection: &str, id: &str) -> Result<Option<Value>, StorageError> {
        let documents = self.load_collection(collection).await?;
        Ok(documents.get(id).cloned())
    }

    async fn find_all(
        &self,
        collection: &str,
        filter: &Filter,
        sort: Option<&Sort>,
        limit: Option<usize>,
        skip: usize,
    ) -> Result<Vec<Value>, StorageError> {
        let documents = self.load_collection(collection).await?;
        Ok(select_documents(&documents, filter, sort, limit, skip))
    }

    async fn count(&self, collection: &str, filter: &Filter) -> Result<usize, StorageError> {
        let documents = self.load_collection(collection).await?;
        Ok(documents.values().filter(|doc| filter.matches(doc)).count())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retryable,
    NonRetryable,
}

pub fn classify_status(status: StatusCode) -> RetryDisposition {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

pub fn classify_reqwest_error(err: &reqwest::Error) -> RetryDisposition {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl BackoffPolicy {
    pub fn delay_for_attempt(&self, attempt_index: usize) -> Duration {
        let factor = 1u32.checked_shl(attempt_index as u32).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
    pub backoff: BackoffPolicy,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            user_agent: None,
            backoff: BackoffPolicy::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("request failed after retries: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error("invalid JSON body from {url}: {detail}")]
    Decode { url: String, detail: String },
}

/// Shared HTTP client with a bounded per-request timeout and capped
/// exponential-backoff retries. The timeout is what keeps one unreachable
/// source from stalling a whole sync run.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    backoff: BackoffPolicy,
}

impl HttpClient {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);
        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }
        let client = builder.build().context("building reqwest client")?;
        Ok(Self {
            client,
            backoff: config.backoff,
        })
    }

    pub async fn get_text(&self, source: &str, url: &str) -> Result<String, HttpError> {
        let span = info_span!("http_fetch", source, url);
        let _guard = span.enter();

        let mut last_request_error: Option<reqwest::Error> = None;
        for attempt in 0..=self.backoff.max_retries {
            match self.client.get(url).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    let final_url = resp.url().to_string();
                    if status.is_success() {
                        return Ok(resp.text().await?);
                    }
                    if classify_status(status) == RetryDisposition::Retryable
                        && attempt < self.backoff.max_retries
                    {
                        tokio::time::sleep(self.backoff.delay_for_attempt(attempt)).await;
                        continue;
                    }
                    return Err(HttpError::HttpStatus {
                        status: status.as_u16(),
                        url: final_url,
                    });
                }
                Err(err) => {
                    if classify_reqwest_error(&err) == RetryDisposition::Retryable
                        && attempt < self.backoff.max_retries
                    {
                        last_request_error = Some(err);
                        tokio::time::sleep(self.backoff.delay_for_attempt(attempt)).await;
                        continue;
                    }
                    return Err(HttpError::Request(err));
                }
            }
        }

        Err(HttpError::Request(
            last_request_error.expect("retry loop should capture a request error"),
        ))
    }

    pub async fn get_json(&self, source: &str, url: &str) -> Result<Value, HttpError> {
        let text = self.get_text(source, url).await?;
        serde_json::from_str(&text).map_err(|err| HttpError::Decode {
            url: url.to_string(),
            detail: err.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[tokio::test]
    async fn upsert_overwrites_by_key() {
        let store = MemoryStore::new();
        let inserted = store
            .upsert(COMPETITIONS, "codeforces_1", json!({"id": "codeforces_1", "v": 1}))
            .await
            .unwrap();
        assert!(inserted);
        let inserted = store
            .upsert(COMPETITIONS, "codeforces_1", json!({"id": "codeforces_1", "v": 2}))
            .await
            .unwrap();
        assert!(!inserted);

        assert_eq!(store.count(COMPETITIONS, &Filter::new()).await.unwrap(), 1);
        let doc = store
            .find_by_id(COMPETITIONS, "codeforces_1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(doc["v"], 2);
    }

    #[tokio::test]
    async fn find_all_filters_sorts_and_paginates() {
        let store = MemoryStore::new();
        for (id, category, start) in [
            ("a", "hackathon", "2026-09-03T00:00:00Z"),
            ("b", "ctf", "2026-09-01T00:00:00Z"),
            ("c", "hackathon", "2026-09-02T00:00:00Z"),
        ] {
            store
                .upsert(
                    COMPETITIONS,
                    id,
                    json!({"id": id, "category": category, "start_date": start}),
                )
                .await
                .unwrap();
        }

        let hackathons = store
            .find_all(
                COMPETITIONS,
                &Filter::new().eq("category", "hackathon"),
                Some(&Sort::ascending("start_date")),
                None,
                0,
            )
            .await
            .unwrap();
        assert_eq!(hackathons.len(), 2);
        assert_eq!(hackathons[0]["id"], "c");
        assert_eq!(hackathons[1]["id"], "a");

        let paged = store
            .find_all(
                COMPETITIONS,
                &Filter::new(),
                Some(&Sort::ascending("start_date")),
                Some(1),
                1,
            )
            .await
            .unwrap();
        assert_eq!(paged.len(), 1);
        assert_eq!(paged[0]["id"], "c");
    }

    #[tokio::test]
    async fn file_store_persists_across_handles() {
        let dir = tempdir().expect("tempdir");
        let store = JsonFileStore::new(dir.path());
        store
            .upsert(METADATA, "codeforces", json!({"id": "codeforces", "record_count": 7}))
            .await
            .unwrap();

        let reopened = JsonFileStore::new(dir.path());
        let doc = reopened
            .find_by_id(METADATA, "codeforces")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(doc["record_count"], 7);
    }

    #[test]
    fn backoff_is_exponential_and_capped() {
        let policy = BackoffPolicy {
            max_retries: 4,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
        };
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(350));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(350));
    }
}
