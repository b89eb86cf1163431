//! Pipeline orchestrator
//!
//! Drives one trigger event through
//! `Fetching -> Transforming -> Publishing -> Dispatching -> Done`.
//!
//! Whole-stage failures (fetch, render, every publish failing, directory
//! lookup) end the invocation as `Failed`. Per-item failures (one publish,
//! one dispatch) are recorded and the invocation still reaches `Done`.
//! There is no retry across stages; redelivery belongs to the caller.

use crate::collaborators::{bounded, Collaborators};
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::event::{InvocationResponse, TriggerEvent};
use crate::fanout::{notification_message, FanOutDispatcher};
use crate::publisher::ArtifactPublisher;
use crate::types::{PipelineResult, PipelineStage};
use mosaic_render::RenditionSetBuilder;
use tracing::Instrument;

/// Top-level pipeline, built once per process and reused per event
#[derive(Debug)]
pub struct Pipeline {
    config: PipelineConfig,
    collaborators: Collaborators,
    renditions: RenditionSetBuilder,
    publisher: ArtifactPublisher,
    fanout: FanOutDispatcher,
}

impl Pipeline {
    /// Wire the pipeline from configuration and collaborators
    #[must_use]
    pub fn new(config: PipelineConfig, collaborators: Collaborators) -> Self {
        let renditions = RenditionSetBuilder::new(config.block_sizes.clone());
        let publisher = ArtifactPublisher::new(
            collaborators.store.clone(),
            config.destination_bucket.clone(),
            config.retry,
            config.call_timeout,
        );
        let fanout = FanOutDispatcher::new(
            collaborators.dispatcher.clone(),
            config.workflow_id.clone(),
            config.dispatch_concurrency,
            config.call_timeout,
        );

        Self {
            config,
            collaborators,
            renditions,
            publisher,
            fanout,
        }
    }

    /// Configuration in use
    #[inline]
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Process one event to completion
    ///
    /// Never returns an error: failures are folded into the result, which
    /// keeps whatever counts were accumulated before the failing stage.
    pub async fn run(&self, event: &TriggerEvent) -> PipelineResult {
        let mut result = PipelineResult::started(&event.source_bucket, &event.source_key);
        let span = tracing::info_span!(
            "pipeline",
            invocation = %result.invocation_id,
            bucket = %event.source_bucket,
            key = %event.source_key,
        );

        async move {
            tracing::info!("processing new source object");
            match self.drive(event, &mut result).await {
                Ok(()) => {
                    let result = result.finish();
                    tracing::info!(
                        status = ?result.status,
                        renditions = result.renditions_published,
                        dispatched = result.dispatches_succeeded,
                        failed = result.dispatches_failed,
                        "pipeline done"
                    );
                    result
                }
                Err(e) => {
                    tracing::error!(stage = %result.stage, error = %e, retryable = e.is_retryable(), "pipeline failed");
                    result.fail(&e)
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Process one event and shape the caller-facing response
    pub async fn invoke(&self, event: &TriggerEvent) -> InvocationResponse {
        InvocationResponse::from(&self.run(event).await)
    }

    async fn drive(
        &self,
        event: &TriggerEvent,
        result: &mut PipelineResult,
    ) -> Result<(), PipelineError> {
        let timeout = self.config.call_timeout;

        // Fetching
        let source = bounded(
            "fetch",
            timeout,
            self.collaborators
                .store
                .fetch(&event.source_bucket, &event.source_key),
        )
        .await
        .map_err(|source| PipelineError::SourceFetch {
            bucket: event.source_bucket.clone(),
            key: event.source_key.clone(),
            source,
        })?;
        tracing::debug!(bytes = source.len(), "source fetched");

        // Transforming
        advance(result);
        let builder = self.renditions.clone();
        let key = event.source_key.clone();
        let artifacts = tokio::task::spawn_blocking(move || builder.build(&key, &source))
            .await
            .map_err(|e| PipelineError::RenderAborted(e.to_string()))??;
        tracing::debug!(renditions = artifacts.len(), "rendition set built");

        // Publishing
        advance(result);
        let report = self.publisher.publish_all(&artifacts).await;
        let attempted = report.attempted();
        let none_published = report.none_published();
        result.record_publishes(report.receipts, report.failures);
        if none_published {
            return Err(PipelineError::NoRenditionsPublished { attempted });
        }

        // Dispatching
        advance(result);
        let recipients = bounded(
            "list_recipients",
            timeout,
            self.collaborators.directory.list_recipients(),
        )
        .await
        .map_err(PipelineError::RecipientLookup)?;

        if recipients.is_empty() {
            tracing::info!(table = %self.config.recipient_table, "no recipients to notify");
            return Ok(());
        }

        let message = notification_message(&event.source_key);
        let outcomes = self.fanout.dispatch(&recipients, &message).await;
        result.record_dispatches(outcomes);
        Ok(())
    }
}

fn advance(result: &mut PipelineResult) {
    let next = result.stage.next();
    tracing::debug!(from = %result.stage, to = %next, "stage transition");
    result.stage = next;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryObjectStore, RecordingDispatcher, StaticDirectory};
    use crate::types::PipelineStatus;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use mosaic_render::BlockSize;
    use std::io::Cursor;
    use std::sync::Arc;

    fn png(side: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(side, side, |x, y| Rgb([x as u8, y as u8, 128]));
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn pipeline(
        store: Arc<MemoryObjectStore>,
        directory: StaticDirectory,
        dispatcher: Arc<RecordingDispatcher>,
    ) -> Pipeline {
        let config = PipelineConfig::new("out", "arn:wf")
            .with_block_sizes(vec![BlockSize::square(8), BlockSize::square(16)]);
        Pipeline::new(config, Collaborators::new(store, Arc::new(directory), dispatcher))
    }

    #[tokio::test]
    async fn happy_path_reaches_done() {
        let store = Arc::new(MemoryObjectStore::new());
        store.insert("in", "cat.png", png(32));
        let dispatcher = Arc::new(RecordingDispatcher::new());
        let pipeline = pipeline(store.clone(), StaticDirectory::new(["a@x.com"]), dispatcher.clone());

        let result = pipeline.run(&TriggerEvent::new("in", "cat.png")).await;

        assert_eq!(result.stage, PipelineStage::Done);
        assert_eq!(result.status, PipelineStatus::Completed);
        assert_eq!(result.renditions_published, 2);
        assert_eq!(result.dispatches_succeeded, 1);
        assert_eq!(dispatcher.len(), 1);
    }

    #[tokio::test]
    async fn missing_source_fails_while_fetching() {
        let store = Arc::new(MemoryObjectStore::new());
        let dispatcher = Arc::new(RecordingDispatcher::new());
        let pipeline = pipeline(store.clone(), StaticDirectory::new(["a@x.com"]), dispatcher.clone());

        let result = pipeline.run(&TriggerEvent::new("in", "ghost.png")).await;

        assert_eq!(result.status, PipelineStatus::Failed);
        assert_eq!(result.failed_stage, Some(PipelineStage::Fetching));
        assert!(result.error.as_deref().unwrap().contains("in/ghost.png"));
        assert!(store.keys("out").is_empty());
        assert!(dispatcher.is_empty());
    }

    #[tokio::test]
    async fn undecodable_source_fails_while_transforming() {
        let store = Arc::new(MemoryObjectStore::new());
        store.insert("in", "notes.txt", b"plain text".to_vec());
        let dispatcher = Arc::new(RecordingDispatcher::new());
        let pipeline = pipeline(store.clone(), StaticDirectory::new(["a@x.com"]), dispatcher.clone());

        let response = pipeline.invoke(&TriggerEvent::new("in", "notes.txt")).await;

        assert_eq!(response.status_code, 500);
        assert_eq!(response.body.renditions_published, 0);
        assert!(dispatcher.is_empty());
    }
}
