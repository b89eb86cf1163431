//! Filesystem-backed collaborators for local runs
//!
//! - [`FsObjectStore`]: `<root>/<bucket>/<key>`
//! - [`FileDirectory`]: recipients from a JSON array or a plain list
//! - [`SpoolDispatcher`]: one JSON file per started workflow

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mosaic_core::{
    CollaboratorError, DispatchPayload, ExecutionHandle, ObjectStore, Recipient,
    RecipientDirectory, WorkflowDispatcher,
};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use ulid::Ulid;

/// Object store rooted at a local directory; buckets are subdirectories
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, CollaboratorError> {
        let bucket = relative(bucket)?;
        let key = relative(key)?;
        Ok(self.root.join(bucket).join(key))
    }
}

// Bucket and key must stay below the root
fn relative(part: &str) -> Result<&Path, CollaboratorError> {
    let path = Path::new(part);
    let contained = !part.is_empty() && path.components().all(|c| matches!(c, Component::Normal(_)));
    if contained {
        Ok(path)
    } else {
        Err(CollaboratorError::Rejected(format!("path escapes store root: {part}")))
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn fetch(&self, bucket: &str, key: &str) -> Result<Vec<u8>, CollaboratorError> {
        let path = self.object_path(bucket, key)?;
        Ok(tokio::fs::read(&path).await?)
    }

    async fn store(&self, bucket: &str, key: &str, bytes: Vec<u8>) -> Result<(), CollaboratorError> {
        let path = self.object_path(bucket, key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        tracing::debug!(path = %path.display(), "object written");
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DirectoryEntry {
    Address(String),
    Item { email: String },
}

impl From<DirectoryEntry> for Recipient {
    fn from(entry: DirectoryEntry) -> Self {
        match entry {
            DirectoryEntry::Address(address) | DirectoryEntry::Item { email: address } => {
                Recipient::new(address)
            }
        }
    }
}

/// Recipient table stored as a local file
///
/// Accepts a JSON array of addresses, a JSON array of `{"email": ...}` items,
/// or one address per line (blank lines and `#` comments skipped).
#[derive(Debug, Clone)]
pub struct FileDirectory {
    path: PathBuf,
}

impl FileDirectory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<root>/<table>.json`
    pub fn for_table(root: impl AsRef<Path>, table: &str) -> Self {
        Self::new(root.as_ref().join(format!("{table}.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn parse_recipients(content: &str) -> Vec<Recipient> {
    if let Ok(entries) = serde_json::from_str::<Vec<DirectoryEntry>>(content) {
        return entries.into_iter().map(Recipient::from).collect();
    }
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(Recipient::from)
        .collect()
}

#[async_trait]
impl RecipientDirectory for FileDirectory {
    async fn list_recipients(&self) -> Result<Vec<Recipient>, CollaboratorError> {
        let content = tokio::fs::read_to_string(&self.path).await?;
        let recipients = parse_recipients(&content);
        tracing::debug!(path = %self.path.display(), count = recipients.len(), "recipients loaded");
        Ok(recipients)
    }
}

/// Spooled workflow start, as written to disk
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpoolRecord {
    pub workflow_id: String,
    pub execution: String,
    pub submitted_at: DateTime<Utc>,
    pub input: DispatchPayload,
}

/// Dispatcher that writes each start request to `<root>/<workflow>/<execution>.json`
#[derive(Debug, Clone)]
pub struct SpoolDispatcher {
    root: PathBuf,
}

impl SpoolDispatcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding records for `workflow_id`
    pub fn workflow_dir(&self, workflow_id: &str) -> PathBuf {
        let safe: String = workflow_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' { c } else { '_' })
            .collect();
        self.root.join(safe)
    }
}

#[async_trait]
impl WorkflowDispatcher for SpoolDispatcher {
    async fn start(
        &self,
        workflow_id: &str,
        payload: &DispatchPayload,
    ) -> Result<ExecutionHandle, CollaboratorError> {
        let execution = Ulid::new().to_string();
        let record = SpoolRecord {
            workflow_id: workflow_id.to_string(),
            execution: execution.clone(),
            submitted_at: Utc::now(),
            input: payload.clone(),
        };
        let json = serde_json::to_vec_pretty(&record)
            .map_err(|e| CollaboratorError::Rejected(e.to_string()))?;

        let dir = self.workflow_dir(workflow_id);
        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(dir.join(format!("{execution}.json")), json).await?;

        Ok(ExecutionHandle(execution))
    }
}
