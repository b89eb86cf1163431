//! External collaborators
//!
//! The pipeline talks to three services it does not own:
//! - [`ObjectStore`]: fetch source blobs, store renditions
//! - [`RecipientDirectory`]: read-only list of addresses to notify
//! - [`WorkflowDispatcher`]: starts one durable workflow per job
//!
//! Implementations are constructed once per process and shared as
//! `Arc<dyn ...>`; see [`crate::memory`] for in-process versions.

use crate::error::CollaboratorError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Blob storage addressed by bucket and key
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Read the full object
    async fn fetch(&self, bucket: &str, key: &str) -> Result<Vec<u8>, CollaboratorError>;

    /// Write the object, replacing any existing one under the same key
    async fn store(&self, bucket: &str, key: &str, bytes: Vec<u8>)
        -> Result<(), CollaboratorError>;
}

/// Read-only recipient listing
#[async_trait]
pub trait RecipientDirectory: Send + Sync {
    /// All known recipients; may contain duplicates
    async fn list_recipients(&self) -> Result<Vec<Recipient>, CollaboratorError>;
}

/// Durable workflow starter
#[async_trait]
pub trait WorkflowDispatcher: Send + Sync {
    /// Start one execution of `workflow_id` with `payload` as input
    async fn start(
        &self,
        workflow_id: &str,
        payload: &DispatchPayload,
    ) -> Result<ExecutionHandle, CollaboratorError>;
}

/// Shared collaborator handles, built once at process start
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn ObjectStore>,
    pub directory: Arc<dyn RecipientDirectory>,
    pub dispatcher: Arc<dyn WorkflowDispatcher>,
}

impl Collaborators {
    /// Bundle collaborator handles
    #[inline]
    #[must_use]
    pub fn new(
        store: Arc<dyn ObjectStore>,
        directory: Arc<dyn RecipientDirectory>,
        dispatcher: Arc<dyn WorkflowDispatcher>,
    ) -> Self {
        Self {
            store,
            directory,
            dispatcher,
        }
    }
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

/// Opaque recipient address (typically an email)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Recipient(pub String);

impl Recipient {
    /// Create recipient
    #[inline]
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    /// Address as string
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Recipient {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Recipient {
    fn from(address: &str) -> Self {
        Self::new(address)
    }
}

impl From<String> for Recipient {
    fn from(address: String) -> Self {
        Self(address)
    }
}

/// Workflow input, as seen by the workflow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchPayload {
    pub recipient: Recipient,
    pub message: String,
    pub delay_seconds: u64,
}

/// One workflow start request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchJob {
    pub workflow_id: String,
    pub payload: DispatchPayload,
}

impl DispatchJob {
    /// Job with no delay before the workflow acts
    #[must_use]
    pub fn immediate(
        workflow_id: impl Into<String>,
        recipient: Recipient,
        message: impl Into<String>,
    ) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            payload: DispatchPayload {
                recipient,
                message: message.into(),
                delay_seconds: 0,
            },
        }
    }
}

/// Identifier of a started workflow execution
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionHandle(pub String);

impl Display for ExecutionHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Run a collaborator call with a deadline
///
/// Expiry surfaces as `CollaboratorError::TimedOut`.
pub(crate) async fn bounded<T, F>(
    operation: &'static str,
    after: Duration,
    call: F,
) -> Result<T, CollaboratorError>
where
    F: Future<Output = Result<T, CollaboratorError>>,
{
    tokio::time::timeout(after, call)
        .await
        .unwrap_or(Err(CollaboratorError::TimedOut { operation, after }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_wire_shape() {
        let job = DispatchJob::immediate("wf", Recipient::from("a@x.com"), "done");
        let json = serde_json::to_value(&job.payload).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"recipient": "a@x.com", "message": "done", "delaySeconds": 0})
        );
    }

    #[tokio::test]
    async fn bounded_passes_through_result() {
        let ok = bounded("noop", Duration::from_secs(1), async { Ok::<_, CollaboratorError>(7) }).await;
        assert_eq!(ok, Ok(7));

        let err = bounded("noop", Duration::from_secs(1), async {
            Err::<u8, _>(CollaboratorError::Rejected("no".to_string()))
        })
        .await;
        assert_eq!(err, Err(CollaboratorError::Rejected("no".to_string())));
    }

    #[tokio::test]
    async fn bounded_reports_timeout() {
        let result = bounded("slow", Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, CollaboratorError>(())
        })
        .await;
        assert!(matches!(
            result,
            Err(CollaboratorError::TimedOut { operation: "slow", .. })
        ));
    }
}
