//! In-process collaborators
//!
//! Used by tests and local runs. All state lives for the lifetime of the
//! value; nothing is persisted.

use crate::collaborators::{
    DispatchJob, DispatchPayload, ExecutionHandle, ObjectStore, Recipient, RecipientDirectory,
    WorkflowDispatcher,
};
use crate::error::CollaboratorError;
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use ulid::Ulid;

/// Object store backed by a concurrent map
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: DashMap<(String, String), Vec<u8>>,
    writes: DashMap<(String, String), usize>,
}

impl MemoryObjectStore {
    /// Create empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object
    pub fn insert(&self, bucket: impl Into<String>, key: impl Into<String>, bytes: Vec<u8>) {
        self.objects.insert((bucket.into(), key.into()), bytes);
    }

    /// Current object bytes, if present
    #[must_use]
    pub fn get(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.objects
            .get(&(bucket.to_string(), key.to_string()))
            .map(|entry| entry.value().clone())
    }

    /// Sorted keys present in `bucket`
    #[must_use]
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .objects
            .iter()
            .filter(|entry| entry.key().0 == bucket)
            .map(|entry| entry.key().1.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Number of successful `store` calls for a key
    #[must_use]
    pub fn write_count(&self, bucket: &str, key: &str) -> usize {
        self.writes
            .get(&(bucket.to_string(), key.to_string()))
            .map_or(0, |entry| *entry.value())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn fetch(&self, bucket: &str, key: &str) -> Result<Vec<u8>, CollaboratorError> {
        self.get(bucket, key)
            .ok_or_else(|| CollaboratorError::NotFound(format!("{bucket}/{key}")))
    }

    async fn store(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
    ) -> Result<(), CollaboratorError> {
        let id = (bucket.to_string(), key.to_string());
        self.objects.insert(id.clone(), bytes);
        *self.writes.entry(id).or_insert(0) += 1;
        Ok(())
    }
}

/// Directory returning a fixed list
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    recipients: Vec<Recipient>,
}

impl StaticDirectory {
    /// Create directory from addresses
    #[must_use]
    pub fn new<I, R>(recipients: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<Recipient>,
    {
        Self {
            recipients: recipients.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl RecipientDirectory for StaticDirectory {
    async fn list_recipients(&self) -> Result<Vec<Recipient>, CollaboratorError> {
        Ok(self.recipients.clone())
    }
}

/// Dispatcher that records every job it accepts
#[derive(Debug, Default)]
pub struct RecordingDispatcher {
    jobs: Mutex<Vec<DispatchJob>>,
}

impl RecordingDispatcher {
    /// Create empty recorder
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Jobs accepted so far, in submission order
    #[must_use]
    pub fn jobs(&self) -> Vec<DispatchJob> {
        self.jobs.lock().clone()
    }

    /// Number of jobs accepted
    #[must_use]
    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    /// Whether no job was accepted
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.jobs.lock().is_empty()
    }
}

#[async_trait]
impl WorkflowDispatcher for RecordingDispatcher {
    async fn start(
        &self,
        workflow_id: &str,
        payload: &DispatchPayload,
    ) -> Result<ExecutionHandle, CollaboratorError> {
        self.jobs.lock().push(DispatchJob {
            workflow_id: workflow_id.to_string(),
            payload: payload.clone(),
        });
        Ok(ExecutionHandle(format!("{workflow_id}:{}", Ulid::new())))
    }
}
