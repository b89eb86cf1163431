//! Error types for Mosaic Core
//!
//! Provides error handling for:
//! - Collaborator calls (object store, directory, workflow dispatcher)
//! - Configuration loading at process start
//! - Pipeline stages, split into whole-stage failures that end an invocation
//!   and per-item failures that are recorded as outcomes

use mosaic_render::{BlockSize, RenderError};
use std::time::Duration;

/// Failure reported by an external collaborator
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollaboratorError {
    /// Object or resource does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Collaborator is unreachable or overloaded
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// Request was understood and refused
    #[error("rejected: {0}")]
    Rejected(String),

    /// Local IO failure in an adapter
    #[error("io error: {0}")]
    Io(String),

    /// Call exceeded its deadline
    #[error("{operation} timed out after {}ms", after.as_millis())]
    TimedOut {
        operation: &'static str,
        after: Duration,
    },
}

impl CollaboratorError {
    /// Check if a repeat of the same call might succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Unavailable(_) | Self::Io(_) | Self::TimedOut { .. }
        )
    }

    /// Check if the call hit its deadline
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut { .. })
    }
}

impl From<std::io::Error> for CollaboratorError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(err.to_string()),
            _ => Self::Io(err.to_string()),
        }
    }
}

/// Missing or malformed setting, fatal at process start
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required setting absent
    #[error("missing required setting: {0}")]
    Missing(&'static str),

    /// Setting present but unusable
    #[error("invalid value '{value}' for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    /// Create invalid setting error
    pub fn invalid(key: &'static str, value: impl Into<String>, reason: impl ToString) -> Self {
        Self::Invalid {
            key,
            value: value.into(),
            reason: reason.to_string(),
        }
    }
}

/// Pipeline errors
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Trigger event could not be reduced to bucket and key
    #[error("invalid trigger event: {0}")]
    InvalidEvent(String),

    /// Source object missing or unreadable
    #[error("failed to fetch {bucket}/{key}: {source}")]
    SourceFetch {
        bucket: String,
        key: String,
        #[source]
        source: CollaboratorError,
    },

    /// Transform failed for the whole set
    #[error("render failed: {0}")]
    Render(#[from] RenderError),

    /// Transform worker panicked or was cancelled
    #[error("render task aborted: {0}")]
    RenderAborted(String),

    /// Single rendition upload failed after all attempts
    #[error("failed to publish {key} ({block_size}) after {attempts} attempt(s): {source}")]
    Publish {
        key: String,
        block_size: BlockSize,
        attempts: u32,
        #[source]
        source: CollaboratorError,
    },

    /// Every rendition upload failed
    #[error("no renditions published ({attempted} attempted)")]
    NoRenditionsPublished { attempted: usize },

    /// Recipient directory lookup failed
    #[error("recipient lookup failed: {0}")]
    RecipientLookup(#[source] CollaboratorError),

    /// Single workflow start failed
    #[error("dispatch to {recipient} failed: {source}")]
    Dispatch {
        recipient: String,
        #[source]
        source: CollaboratorError,
    },
}

impl PipelineError {
    /// Check if redelivering the same event might succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::SourceFetch { source, .. }
            | Self::Publish { source, .. }
            | Self::RecipientLookup(source)
            | Self::Dispatch { source, .. } => source.is_retryable(),
            Self::NoRenditionsPublished { .. } | Self::RenderAborted(_) => true,
            Self::InvalidEvent(_) | Self::Render(_) => false,
        }
    }

    /// Check if the failure was a deadline expiry
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::SourceFetch { source, .. }
            | Self::Publish { source, .. }
            | Self::RecipientLookup(source)
            | Self::Dispatch { source, .. } => source.is_timeout(),
            _ => false,
        }
    }
}
