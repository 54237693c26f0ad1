//! Dataset store: where finished observations are published
//!
//! Each observation becomes one JSON file at
//! `metadata/<author_email>/<image_md5>.json` in the configured dataset.

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;

use crate::models::ImageHash;

const USER_AGENT: &str = concat!("sw-ingest/", env!("CARGO_PKG_VERSION"));
const REVISION: &str = "main";

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Store timed out after {0:?}")]
    Timeout(Duration),

    #[error("Store rejected write: {0}")]
    Rejected(String),
}

/// Result of one commit to the dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitInfo {
    pub commit_url: String,
    pub commit_oid: String,
    pub path_in_repo: String,
}

#[async_trait]
pub trait DatasetStore: Send + Sync {
    async fn upload(
        &self,
        content: Vec<u8>,
        path_in_repo: &str,
        dataset_id: &str,
    ) -> Result<CommitInfo, DatasetError>;

    async fn file_exists(&self, dataset_id: &str, path_in_repo: &str) -> Result<bool, DatasetError>;

    async fn delete(&self, dataset_id: &str, path_in_repo: &str) -> Result<CommitInfo, DatasetError>;

    /// Short name for logs and the health page
    fn kind(&self) -> &'static str;
}

/// Destination path for one observation
pub fn observation_path(author_email: &str, image_md5: &ImageHash) -> String {
    format!("metadata/{}/{}.json", author_email, image_md5)
}

/// Hugging Face Hub commit API client
pub struct HfDatasetStore {
    http_client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommitResponse {
    commit_url: String,
    commit_oid: String,
}

impl HfDatasetStore {
    pub fn new(
        endpoint: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, DatasetError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| DatasetError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    fn commit_url(&self, dataset_id: &str) -> String {
        format!(
            "{}/api/datasets/{}/commit/{}",
            self.endpoint, dataset_id, REVISION
        )
    }

    fn resolve_url(&self, dataset_id: &str, path_in_repo: &str) -> String {
        format!(
            "{}/datasets/{}/resolve/{}/{}",
            self.endpoint, dataset_id, REVISION, path_in_repo
        )
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn commit(
        &self,
        dataset_id: &str,
        path_in_repo: &str,
        body: String,
    ) -> Result<CommitInfo, DatasetError> {
        let response = self
            .authorized(self.http_client.post(self.commit_url(dataset_id)))
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(body)
            .send()
            .await
            .map_err(|e| DatasetError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DatasetError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let commit: CommitResponse = response
            .json()
            .await
            .map_err(|e| DatasetError::Parse(e.to_string()))?;

        Ok(CommitInfo {
            commit_url: commit.commit_url,
            commit_oid: commit.commit_oid,
            path_in_repo: path_in_repo.to_string(),
        })
    }
}

/// NDJSON commit payload: a header line then one operation line
fn commit_payload(summary: &str, operation: serde_json::Value) -> String {
    let header = serde_json::json!({
        "key": "header",
        "value": { "summary": summary, "description": "" }
    });
    format!("{}\n{}\n", header, operation)
}

fn upload_payload(content: &[u8], path_in_repo: &str) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(content);
    commit_payload(
        &format!("Upload {}", path_in_repo),
        serde_json::json!({
            "key": "file",
            "value": { "content": encoded, "path": path_in_repo, "encoding": "base64" }
        }),
    )
}

fn delete_payload(path_in_repo: &str) -> String {
    commit_payload(
        &format!("Delete {}", path_in_repo),
        serde_json::json!({
            "key": "deletedFile",
            "value": { "path": path_in_repo }
        }),
    )
}

#[async_trait]
impl DatasetStore for HfDatasetStore {
    async fn upload(
        &self,
        content: Vec<u8>,
        path_in_repo: &str,
        dataset_id: &str,
    ) -> Result<CommitInfo, DatasetError> {
        tracing::debug!(dataset_id, path = path_in_repo, bytes = content.len(), "Committing file");
        self.commit(dataset_id, path_in_repo, upload_payload(&content, path_in_repo))
            .await
    }

    async fn file_exists(&self, dataset_id: &str, path_in_repo: &str) -> Result<bool, DatasetError> {
        let response = self
            .authorized(self.http_client.head(self.resolve_url(dataset_id, path_in_repo)))
            .send()
            .await
            .map_err(|e| DatasetError::Network(e.to_string()))?;

        match response.status() {
            s if s.is_success() => Ok(true),
            reqwest::StatusCode::NOT_FOUND => Ok(false),
            s => Err(DatasetError::Api {
                status: s.as_u16(),
                body: String::new(),
            }),
        }
    }

    async fn delete(&self, dataset_id: &str, path_in_repo: &str) -> Result<CommitInfo, DatasetError> {
        tracing::debug!(dataset_id, path = path_in_repo, "Deleting file");
        self.commit(dataset_id, path_in_repo, delete_payload(path_in_repo))
            .await
    }

    fn kind(&self) -> &'static str {
        "huggingface"
    }
}

#[derive(Debug, Default)]
struct MemoryInner {
    files: HashMap<(String, String), Vec<u8>>,
    commits: u64,
    rejected_paths: HashSet<String>,
}

/// In-process store for dry runs and tests
#[derive(Debug, Default)]
pub struct MemoryDatasetStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryDatasetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every future write to `path_in_repo` fail with
    /// [`DatasetError::Rejected`]
    ///
    /// Failure simulation for dry runs and tests; [`HfDatasetStore`] has no
    /// counterpart.
    pub fn reject_path(&self, path_in_repo: impl Into<String>) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.rejected_paths.insert(path_in_repo.into());
        }
    }

    pub fn get(&self, dataset_id: &str, path_in_repo: &str) -> Option<Vec<u8>> {
        let inner = self.inner.lock().ok()?;
        inner
            .files
            .get(&(dataset_id.to_string(), path_in_repo.to_string()))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|i| i.files.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryInner>, DatasetError> {
        self.inner
            .lock()
            .map_err(|_| DatasetError::Rejected("store lock poisoned".to_string()))
    }
}

fn memory_commit(dataset_id: &str, path_in_repo: &str, n: u64) -> CommitInfo {
    let commit_oid = format!("{:040x}", n);
    CommitInfo {
        commit_url: format!("memory://{}/commit/{}", dataset_id, commit_oid),
        commit_oid,
        path_in_repo: path_in_repo.to_string(),
    }
}

#[async_trait]
impl DatasetStore for MemoryDatasetStore {
    async fn upload(
        &self,
        content: Vec<u8>,
        path_in_repo: &str,
        dataset_id: &str,
    ) -> Result<CommitInfo, DatasetError> {
        let mut inner = self.lock()?;
        if inner.rejected_paths.contains(path_in_repo) {
            return Err(DatasetError::Rejected(path_in_repo.to_string()));
        }
        inner.commits += 1;
        inner
            .files
            .insert((dataset_id.to_string(), path_in_repo.to_string()), content);
        Ok(memory_commit(dataset_id, path_in_repo, inner.commits))
    }

    async fn file_exists(&self, dataset_id: &str, path_in_repo: &str) -> Result<bool, DatasetError> {
        let inner = self.lock()?;
        Ok(inner
            .files
            .contains_key(&(dataset_id.to_string(), path_in_repo.to_string())))
    }

    async fn delete(&self, dataset_id: &str, path_in_repo: &str) -> Result<CommitInfo, DatasetError> {
        let mut inner = self.lock()?;
        if inner
            .files
            .remove(&(dataset_id.to_string(), path_in_repo.to_string()))
            .is_none()
        {
            return Err(DatasetError::NotFound(path_in_repo.to_string()));
        }
        inner.commits += 1;
        Ok(memory_commit(dataset_id, path_in_repo, inner.commits))
    }

    fn kind(&self) -> &'static str {
        "memory"
    }
}
