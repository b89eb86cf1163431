//! Testing utilities for Mosaic workspace
//!
//! Shared image fixtures and collaborator fakes that fail on demand.

#![allow(missing_docs)]

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use mosaic_core::{
    CollaboratorError, Collaborators, DispatchPayload, ExecutionHandle, MemoryObjectStore,
    ObjectStore, Pipeline, PipelineConfig, Recipient, RecipientDirectory, RecordingDispatcher,
    StaticDirectory, WorkflowDispatcher,
};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

pub const SOURCE_BUCKET: &str = "uploads";
pub const DESTINATION_BUCKET: &str = "processed";
pub const WORKFLOW_ID: &str = "arn:workflow:notify";

/// Smooth RGB gradient
pub fn gradient_image(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            (x * 255 / width.max(1)) as u8,
            (y * 255 / height.max(1)) as u8,
            ((x ^ y) & 0xff) as u8,
        ])
    }))
}

pub fn encode(image: &DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), format).unwrap();
    bytes
}

pub fn gradient_png(width: u32, height: u32) -> Vec<u8> {
    encode(&gradient_image(width, height), ImageFormat::Png)
}

/// Store that rejects writes to selected keys and can stall every call
#[derive(Debug, Default)]
pub struct FaultyStore {
    pub inner: MemoryObjectStore,
    failing_keys: Mutex<HashSet<String>>,
    delay: Option<Duration>,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every write to one of `keys`
    pub fn failing_writes<I, S>(self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.failing_keys.lock().extend(keys.into_iter().map(Into::into));
        self
    }

    /// Sleep before every call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    async fn stall(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl ObjectStore for FaultyStore {
    async fn fetch(&self, bucket: &str, key: &str) -> Result<Vec<u8>, CollaboratorError> {
        self.stall().await;
        self.inner.fetch(bucket, key).await
    }

    async fn store(&self, bucket: &str, key: &str, bytes: Vec<u8>) -> Result<(), CollaboratorError> {
        self.stall().await;
        if self.failing_keys.lock().contains(key) {
            return Err(CollaboratorError::Rejected(format!("write refused for {key}")));
        }
        self.inner.store(bucket, key, bytes).await
    }
}

/// Directory that always fails
#[derive(Debug, Clone)]
pub struct BrokenDirectory(pub CollaboratorError);

#[async_trait]
impl RecipientDirectory for BrokenDirectory {
    async fn list_recipients(&self) -> Result<Vec<Recipient>, CollaboratorError> {
        Err(self.0.clone())
    }
}

/// Dispatcher that refuses or stalls selected recipients and records the rest
#[derive(Debug, Default)]
pub struct SelectiveDispatcher {
    pub accepted: RecordingDispatcher,
    refused: HashSet<String>,
    stalled: HashSet<String>,
    stall: Duration,
}

impl SelectiveDispatcher {
    pub fn refusing<I, S>(recipients: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            refused: recipients.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Sleep for `delay` before answering any of `recipients`
    pub fn stalling<I, S>(mut self, recipients: I, delay: Duration) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stalled.extend(recipients.into_iter().map(Into::into));
        self.stall = delay;
        self
    }
}

#[async_trait]
impl WorkflowDispatcher for SelectiveDispatcher {
    async fn start(
        &self,
        workflow_id: &str,
        payload: &DispatchPayload,
    ) -> Result<ExecutionHandle, CollaboratorError> {
        if self.stalled.contains(payload.recipient.as_str()) {
            tokio::time::sleep(self.stall).await;
        }
        if self.refused.contains(payload.recipient.as_str()) {
            return Err(CollaboratorError::Unavailable(format!(
                "execution limit reached for {}",
                payload.recipient
            )));
        }
        self.accepted.start(workflow_id, payload).await
    }
}

/// Config pointing at the fixture buckets with fast retries
pub fn test_config() -> PipelineConfig {
    PipelineConfig::new(DESTINATION_BUCKET, WORKFLOW_ID)
        .with_retry(mosaic_core::RetryPolicy::new(2, Duration::from_millis(1)))
        .with_call_timeout(Duration::from_secs(5))
}

/// Pipeline over in-memory collaborators with `source_key` already uploaded
pub fn setup_memory_pipeline(
    config: PipelineConfig,
    source_key: &str,
    source: Vec<u8>,
    recipients: &[&str],
) -> (Pipeline, Arc<MemoryObjectStore>, Arc<RecordingDispatcher>) {
    let store = Arc::new(MemoryObjectStore::new());
    store.insert(SOURCE_BUCKET, source_key, source);
    let dispatcher = Arc::new(RecordingDispatcher::new());
    let directory = Arc::new(StaticDirectory::new(recipients.iter().copied()));

    let pipeline = Pipeline::new(
        config,
        Collaborators::new(store.clone(), directory, dispatcher.clone()),
    );
    (pipeline, store, dispatcher)
}
