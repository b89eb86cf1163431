//! Artifact publisher
//!
//! Uploads renditions to the destination bucket. Every artifact is retried
//! on its own and a failed upload never stops the others; callers receive a
//! [`PublishReport`] with one entry per artifact.

use crate::collaborators::{bounded, ObjectStore};
use crate::config::RetryPolicy;
use crate::error::{CollaboratorError, PipelineError};
use crate::types::{PublishFailure, PublishReceipt};
use futures::future::join_all;
use mosaic_render::RenditionArtifact;
use std::sync::Arc;
use std::time::Duration;

/// Outcome of publishing a rendition set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Successful uploads, in artifact order
    pub receipts: Vec<PublishReceipt>,
    /// Failed uploads, in artifact order
    pub failures: Vec<PublishFailure>,
}

impl PublishReport {
    /// Number of artifacts attempted
    #[inline]
    #[must_use]
    pub fn attempted(&self) -> usize {
        self.receipts.len() + self.failures.len()
    }

    /// Whether nothing was published
    #[inline]
    #[must_use]
    pub fn none_published(&self) -> bool {
        self.receipts.is_empty()
    }
}

/// Publishes renditions with per-artifact retry
pub struct ArtifactPublisher {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    retry: RetryPolicy,
    call_timeout: Duration,
}

impl std::fmt::Debug for ArtifactPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactPublisher")
            .field("bucket", &self.bucket)
            .field("retry", &self.retry)
            .field("call_timeout", &self.call_timeout)
            .finish_non_exhaustive()
    }
}

impl ArtifactPublisher {
    /// Create publisher for `bucket`
    #[must_use]
    pub fn new(
        store: Arc<dyn ObjectStore>,
        bucket: impl Into<String>,
        retry: RetryPolicy,
        call_timeout: Duration,
    ) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            retry,
            call_timeout,
        }
    }

    /// Destination bucket
    #[inline]
    #[must_use]
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Upload one artifact, overwriting any previous object under its key
    ///
    /// Retryable failures are retried with exponential backoff until the
    /// policy's attempts are used up.
    ///
    /// # Errors
    /// Returns `PipelineError::Publish` with the last cause and attempt count
    pub async fn publish(&self, artifact: &RenditionArtifact) -> Result<PublishReceipt, PipelineError> {
        let key = artifact.destination_key.as_str();
        let mut attempt = 1;

        loop {
            let result = bounded(
                "store",
                self.call_timeout,
                self.store.store(&self.bucket, key, artifact.bytes.clone()),
            )
            .await;

            match result {
                Ok(()) => {
                    tracing::info!(
                        bucket = %self.bucket,
                        key,
                        block_size = %artifact.block_size,
                        bytes = artifact.len(),
                        attempt,
                        "rendition published"
                    );
                    return Ok(PublishReceipt {
                        block_size: artifact.block_size,
                        bucket: self.bucket.clone(),
                        key: key.to_string(),
                        attempts: attempt,
                    });
                }
                Err(source) if source.is_retryable() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.backoff(attempt);
                    tracing::warn!(
                        key,
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %source,
                        "publish failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(source) => return Err(self.publish_error(artifact, attempt, source)),
            }
        }
    }

    /// Upload every artifact concurrently
    ///
    /// Never short-circuits: each artifact gets its own receipt or failure.
    pub async fn publish_all(&self, artifacts: &[RenditionArtifact]) -> PublishReport {
        let results = join_all(artifacts.iter().map(|artifact| self.publish(artifact))).await;

        let mut report = PublishReport::default();
        for (artifact, result) in artifacts.iter().zip(results) {
            match result {
                Ok(receipt) => report.receipts.push(receipt),
                Err(e) => {
                    tracing::error!(key = %artifact.destination_key, error = %e, "publish failed");
                    report.failures.push(PublishFailure::from_error(
                        &e,
                        artifact.block_size,
                        &artifact.destination_key,
                    ));
                }
            }
        }
        report
    }

    fn publish_error(
        &self,
        artifact: &RenditionArtifact,
        attempts: u32,
        source: CollaboratorError,
    ) -> PipelineError {
        PipelineError::Publish {
            key: artifact.destination_key.clone(),
            block_size: artifact.block_size,
            attempts,
            source,
        }
    }
}
