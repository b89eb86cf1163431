//! Recipient fan-out
//!
//! Starts one workflow per unique recipient. Submissions are isolated: a
//! failure for one recipient is recorded in its outcome slot and the rest
//! carry on.
//!
//! Nothing here remembers earlier invocations, so processing the same
//! source twice notifies every recipient twice.

use crate::collaborators::{bounded, DispatchJob, Recipient, WorkflowDispatcher};
use crate::error::PipelineError;
use crate::types::DispatchOutcome;
use futures::stream::{self, StreamExt};
use indexmap::IndexSet;
use std::sync::Arc;
use std::time::Duration;

/// Notification text for a processed source
#[inline]
#[must_use]
pub fn notification_message(source_key: &str) -> String {
    format!("Your image {source_key} has been processed successfully!")
}

/// Drop repeated recipients, keeping first-seen order
#[must_use]
pub fn unique_recipients(recipients: &[Recipient]) -> Vec<Recipient> {
    recipients
        .iter()
        .cloned()
        .collect::<IndexSet<_>>()
        .into_iter()
        .collect()
}

/// Issues workflow starts with bounded concurrency
pub struct FanOutDispatcher {
    dispatcher: Arc<dyn WorkflowDispatcher>,
    workflow_id: String,
    concurrency: usize,
    call_timeout: Duration,
}

impl std::fmt::Debug for FanOutDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanOutDispatcher")
            .field("workflow_id", &self.workflow_id)
            .field("concurrency", &self.concurrency)
            .field("call_timeout", &self.call_timeout)
            .finish_non_exhaustive()
    }
}

impl FanOutDispatcher {
    /// Create fan-out for `workflow_id`
    #[must_use]
    pub fn new(
        dispatcher: Arc<dyn WorkflowDispatcher>,
        workflow_id: impl Into<String>,
        concurrency: usize,
        call_timeout: Duration,
    ) -> Self {
        Self {
            dispatcher,
            workflow_id: workflow_id.into(),
            concurrency: concurrency.max(1),
            call_timeout,
        }
    }

    /// Workflow started per recipient
    #[inline]
    #[must_use]
    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    /// Start one workflow per unique recipient
    ///
    /// Returns one outcome per unique recipient, in first-seen order.
    pub async fn dispatch(&self, recipients: &[Recipient], message: &str) -> Vec<DispatchOutcome> {
        let unique = unique_recipients(recipients);
        if unique.len() < recipients.len() {
            tracing::debug!(
                listed = recipients.len(),
                unique = unique.len(),
                "dropped duplicate recipients"
            );
        }

        stream::iter(unique)
            .map(|recipient| {
                let job = DispatchJob::immediate(self.workflow_id.as_str(), recipient, message);
                self.submit(job)
            })
            .buffered(self.concurrency)
            .collect()
            .await
    }

    async fn submit(&self, job: DispatchJob) -> DispatchOutcome {
        let result = bounded(
            "start_workflow",
            self.call_timeout,
            self.dispatcher.start(&job.workflow_id, &job.payload),
        )
        .await;

        let recipient = job.payload.recipient;
        match result {
            Ok(handle) => {
                tracing::info!(recipient = %recipient, execution = %handle, "workflow started");
                DispatchOutcome::Started { recipient, handle }
            }
            Err(source) => {
                let error = PipelineError::Dispatch {
                    recipient: recipient.to_string(),
                    source,
                };
                tracing::error!(recipient = %recipient, error = %error, "workflow start failed");
                DispatchOutcome::Failed {
                    recipient,
                    cause: error.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{DispatchPayload, ExecutionHandle};
    use crate::error::CollaboratorError;
    use crate::memory::RecordingDispatcher;
    use async_trait::async_trait;
    use mockall::mock;
    use mockall::predicate::eq;
    use proptest::prelude::*;

    mock! {
        pub Dispatcher {}

        #[async_trait]
        impl WorkflowDispatcher for Dispatcher {
            async fn start(
                &self,
                workflow_id: &str,
                payload: &DispatchPayload,
            ) -> Result<ExecutionHandle, CollaboratorError>;
        }
    }

    fn recipients(addresses: &[&str]) -> Vec<Recipient> {
        addresses.iter().map(|a| Recipient::from(*a)).collect()
    }

    #[test]
    fn message_names_the_source() {
        assert_eq!(
            notification_message("cat.png"),
            "Your image cat.png has been processed successfully!"
        );
    }

    #[test]
    fn duplicates_are_dropped_in_order() {
        let unique = unique_recipients(&recipients(&["b@x.com", "a@x.com", "b@x.com"]));
        assert_eq!(unique, recipients(&["b@x.com", "a@x.com"]));
    }

    #[tokio::test]
    async fn one_job_per_unique_recipient() {
        let recorder = Arc::new(RecordingDispatcher::new());
        let fanout = FanOutDispatcher::new(recorder.clone(), "wf", 4, Duration::from_secs(1));
        assert_eq!(fanout.workflow_id(), "wf");

        let outcomes = fanout
            .dispatch(&recipients(&["a@x.com", "b@x.com", "a@x.com"]), "hello")
            .await;

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(DispatchOutcome::is_success));
        let jobs = recorder.jobs();
        assert_eq!(jobs.len(), 2);
        assert!(jobs
            .iter()
            .all(|job| job.payload.delay_seconds == 0 && job.payload.message == "hello"));
    }

    #[tokio::test]
    async fn failure_is_isolated_per_recipient() {
        let mut mock = MockDispatcher::new();
        mock.expect_start()
            .withf(|_, payload| payload.recipient.as_str() == "bad@x.com")
            .times(1)
            .returning(|_, _| Err(CollaboratorError::Rejected("invalid input".to_string())));
        mock.expect_start()
            .withf(|workflow_id, payload| {
                workflow_id == "arn:wf" && payload.recipient.as_str() != "bad@x.com"
            })
            .times(2)
            .returning(|_, payload| Ok(ExecutionHandle(format!("exec-{}", payload.recipient))));

        let fanout = FanOutDispatcher::new(Arc::new(mock), "arn:wf", 1, Duration::from_secs(1));
        let outcomes = fanout
            .dispatch(&recipients(&["a@x.com", "bad@x.com", "c@x.com"]), "hi")
            .await;

        let flags: Vec<bool> = outcomes.iter().map(DispatchOutcome::is_success).collect();
        assert_eq!(flags, vec![true, false, true]);
        match &outcomes[1] {
            DispatchOutcome::Failed { recipient, cause } => {
                assert_eq!(recipient.as_str(), "bad@x.com");
                assert!(cause.contains("invalid input"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_recipient_list_dispatches_nothing() {
        let mut mock = MockDispatcher::new();
        mock.expect_start().never();
        let fanout = FanOutDispatcher::new(Arc::new(mock), "wf", 2, Duration::from_secs(1));

        assert!(fanout.dispatch(&[], "hi").await.is_empty());
    }

    #[tokio::test]
    async fn payload_matches_job() {
        let mut mock = MockDispatcher::new();
        let expected = DispatchPayload {
            recipient: Recipient::from("a@x.com"),
            message: notification_message("cat.png"),
            delay_seconds: 0,
        };
        mock.expect_start()
            .with(eq("wf"), eq(expected))
            .times(1)
            .returning(|_, _| Ok(ExecutionHandle("exec-1".to_string())));

        let fanout = FanOutDispatcher::new(Arc::new(mock), "wf", 2, Duration::from_secs(1));
        let outcomes = fanout
            .dispatch(&recipients(&["a@x.com"]), &notification_message("cat.png"))
            .await;
        assert!(outcomes[0].is_success());
    }

    proptest! {
        #[test]
        fn prop_unique_recipients_keeps_first_seen(addresses in prop::collection::vec("[a-d]@x\\.com", 0..20)) {
            let listed: Vec<Recipient> = addresses.iter().map(|a| Recipient::from(a.as_str())).collect();
            let unique = unique_recipients(&listed);

            let mut expected: Vec<Recipient> = Vec::new();
            for recipient in &listed {
                if !expected.contains(recipient) {
                    expected.push(recipient.clone());
                }
            }
            prop_assert_eq!(unique, expected);
        }
    }
}
