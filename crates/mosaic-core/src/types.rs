//! Core types for the pipeline
//!
//! Defines:
//! - Invocation identifiers
//! - Pipeline stages and the overall status
//! - Per-item outcomes for publishing and dispatch
//! - The aggregate [`PipelineResult`]

use crate::collaborators::{ExecutionHandle, Recipient};
use crate::error::PipelineError;
use mosaic_render::BlockSize;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unique invocation identifier (ULID for sortability)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InvocationId(pub Ulid);

impl InvocationId {
    /// Generate new invocation ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for InvocationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for InvocationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Pipeline state machine
///
/// `Fetching -> Transforming -> Publishing -> Dispatching -> Done`, with
/// `Failed` reachable from any non-terminal stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Fetching,
    Transforming,
    Publishing,
    Dispatching,
    Done,
    Failed,
}

impl PipelineStage {
    /// Check if no further transition is possible
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Stage that follows a successful completion of this one
    #[must_use]
    pub fn next(self) -> Self {
        match self {
            Self::Fetching => Self::Transforming,
            Self::Transforming => Self::Publishing,
            Self::Publishing => Self::Dispatching,
            Self::Dispatching | Self::Done => Self::Done,
            Self::Failed => Self::Failed,
        }
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Fetching => "fetching",
            Self::Transforming => "transforming",
            Self::Publishing => "publishing",
            Self::Dispatching => "dispatching",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Overall invocation status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PipelineStatus {
    /// Every rendition published and every dispatch started
    #[serde(rename = "ok")]
    Completed,
    /// Reached `Done` but some publishes or dispatches failed
    #[serde(rename = "partial")]
    CompletedWithErrors,
    /// Stopped before `Done`
    #[serde(rename = "failed")]
    Failed,
}

/// Published rendition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishReceipt {
    pub block_size: BlockSize,
    pub bucket: String,
    pub key: String,
    pub attempts: u32,
}

/// Rendition that could not be published
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishFailure {
    pub block_size: BlockSize,
    pub key: String,
    pub cause: String,
}

impl PublishFailure {
    pub(crate) fn from_error(error: &PipelineError, block_size: BlockSize, key: &str) -> Self {
        Self {
            block_size,
            key: key.to_string(),
            cause: error.to_string(),
        }
    }
}

/// Result of one workflow start
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DispatchOutcome {
    Started {
        recipient: Recipient,
        handle: ExecutionHandle,
    },
    Failed {
        recipient: Recipient,
        cause: String,
    },
}

impl DispatchOutcome {
    /// Recipient this outcome belongs to
    #[inline]
    #[must_use]
    pub fn recipient(&self) -> &Recipient {
        match self {
            Self::Started { recipient, .. } | Self::Failed { recipient, .. } => recipient,
        }
    }

    /// Whether the workflow was started
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Started { .. })
    }
}

/// Aggregate result of one invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineResult {
    pub invocation_id: InvocationId,
    pub source_bucket: String,
    pub source_key: String,
    pub status: PipelineStatus,
    /// Last stage entered; `Done` or `Failed` once finished
    pub stage: PipelineStage,
    /// Stage that was running when the invocation failed
    pub failed_stage: Option<PipelineStage>,
    pub renditions_published: usize,
    pub published: Vec<PublishReceipt>,
    pub publish_failures: Vec<PublishFailure>,
    pub dispatches_attempted: usize,
    pub dispatches_succeeded: usize,
    pub dispatches_failed: usize,
    pub dispatch_outcomes: Vec<DispatchOutcome>,
    pub error: Option<String>,
}

impl PipelineResult {
    /// Fresh result at the `Fetching` stage
    #[must_use]
    pub fn started(source_bucket: impl Into<String>, source_key: impl Into<String>) -> Self {
        Self {
            invocation_id: InvocationId::new(),
            source_bucket: source_bucket.into(),
            source_key: source_key.into(),
            status: PipelineStatus::Failed,
            stage: PipelineStage::Fetching,
            failed_stage: None,
            renditions_published: 0,
            published: Vec::new(),
            publish_failures: Vec::new(),
            dispatches_attempted: 0,
            dispatches_succeeded: 0,
            dispatches_failed: 0,
            dispatch_outcomes: Vec::new(),
            error: None,
        }
    }

    /// Record publish receipts and failures
    pub fn record_publishes(&mut self, receipts: Vec<PublishReceipt>, failures: Vec<PublishFailure>) {
        self.renditions_published = receipts.len();
        self.published = receipts;
        self.publish_failures = failures;
    }

    /// Record dispatch outcomes
    pub fn record_dispatches(&mut self, outcomes: Vec<DispatchOutcome>) {
        self.dispatches_attempted = outcomes.len();
        self.dispatches_succeeded = outcomes.iter().filter(|o| o.is_success()).count();
        self.dispatches_failed = self.dispatches_attempted - self.dispatches_succeeded;
        self.dispatch_outcomes = outcomes;
    }

    /// Transition to `Done`
    #[must_use]
    pub fn finish(mut self) -> Self {
        self.stage = PipelineStage::Done;
        self.status = if self.publish_failures.is_empty() && self.dispatches_failed == 0 {
            PipelineStatus::Completed
        } else {
            PipelineStatus::CompletedWithErrors
        };
        self
    }

    /// Transition to `Failed`, keeping accumulated counts
    #[must_use]
    pub fn fail(mut self, error: &PipelineError) -> Self {
        self.failed_stage = Some(self.stage);
        self.stage = PipelineStage::Failed;
        self.status = PipelineStatus::Failed;
        self.error = Some(error.to_string());
        self
    }

    /// Whether the invocation reached `Done`
    #[inline]
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.stage == PipelineStage::Done
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_progression() {
        let mut stage = PipelineStage::Fetching;
        let mut seen = vec![stage];
        while !stage.is_terminal() {
            stage = stage.next();
            seen.push(stage);
        }
        assert_eq!(
            seen,
            vec![
                PipelineStage::Fetching,
                PipelineStage::Transforming,
                PipelineStage::Publishing,
                PipelineStage::Dispatching,
                PipelineStage::Done,
            ]
        );
    }

    #[test]
    fn finish_reports_partial_when_dispatch_failed() {
        let mut result = PipelineResult::started("in", "cat.png");
        result.record_dispatches(vec![
            DispatchOutcome::Started {
                recipient: "a@x.com".into(),
                handle: ExecutionHandle("h1".to_string()),
            },
            DispatchOutcome::Failed {
                recipient: "b@x.com".into(),
                cause: "throttled".to_string(),
            },
        ]);
        let result = result.finish();

        assert_eq!(result.status, PipelineStatus::CompletedWithErrors);
        assert_eq!(result.dispatches_attempted, 2);
        assert_eq!(result.dispatches_succeeded, 1);
        assert_eq!(result.dispatches_failed, 1);
    }

    #[test]
    fn fail_remembers_stage() {
        let mut result = PipelineResult::started("in", "cat.png");
        result.stage = PipelineStage::Publishing;
        let result = result.fail(&PipelineError::NoRenditionsPublished { attempted: 3 });

        assert_eq!(result.stage, PipelineStage::Failed);
        assert_eq!(result.failed_stage, Some(PipelineStage::Publishing));
        assert_eq!(result.status, PipelineStatus::Failed);
        assert!(result.error.unwrap().contains("3 attempted"));
    }

    #[test]
    fn status_serializes_as_short_names() {
        assert_eq!(serde_json::to_string(&PipelineStatus::Completed).unwrap(), "\"ok\"");
        assert_eq!(
            serde_json::to_string(&PipelineStatus::CompletedWithErrors).unwrap(),
            "\"partial\""
        );
        assert_eq!(serde_json::to_string(&PipelineStatus::Failed).unwrap(), "\"failed\"");
    }
}
