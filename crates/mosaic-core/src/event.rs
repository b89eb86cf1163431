//! Inbound trigger events and outbound invocation responses

use crate::error::PipelineError;
use crate::types::{PipelineResult, PipelineStatus};
use serde::{Deserialize, Serialize};

/// New source object to process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerEvent {
    pub source_bucket: String,
    pub source_key: String,
}

impl TriggerEvent {
    /// Create trigger event
    #[inline]
    #[must_use]
    pub fn new(source_bucket: impl Into<String>, source_key: impl Into<String>) -> Self {
        Self {
            source_bucket: source_bucket.into(),
            source_key: source_key.into(),
        }
    }

    /// Parse either the minimal shape or a storage-notification envelope
    ///
    /// # Errors
    /// Returns `PipelineError::InvalidEvent` if neither shape matches or the
    /// envelope carries no records
    pub fn from_json(json: &str) -> Result<Self, PipelineError> {
        let value: serde_json::Value =
            serde_json::from_str(json).map_err(|e| PipelineError::InvalidEvent(e.to_string()))?;
        Self::from_value(value)
    }

    /// Reduce an already parsed event
    ///
    /// Keys taken from a storage-notification envelope are used exactly as
    /// delivered. Notifications URL-encode object keys (`+` for a space,
    /// `%xx` escapes), so such keys only match the stored object when they
    /// contain no characters that need escaping.
    ///
    /// # Errors
    /// Same as [`TriggerEvent::from_json`]
    pub fn from_value(value: serde_json::Value) -> Result<Self, PipelineError> {
        let event = if value.get("Records").is_some() {
            let envelope: NotificationEnvelope = serde_json::from_value(value)
                .map_err(|e| PipelineError::InvalidEvent(e.to_string()))?;
            envelope.into_trigger()?
        } else {
            serde_json::from_value::<Self>(value)
                .map_err(|e| PipelineError::InvalidEvent(e.to_string()))?
        };

        if event.source_bucket.is_empty() || event.source_key.is_empty() {
            return Err(PipelineError::InvalidEvent(
                "bucket and key must be non-empty".to_string(),
            ));
        }
        Ok(event)
    }
}

// Storage-notification envelope: only the fields the pipeline needs
#[derive(Debug, Deserialize)]
struct NotificationEnvelope {
    #[serde(rename = "Records")]
    records: Vec<NotificationRecord>,
}

#[derive(Debug, Deserialize)]
struct NotificationRecord {
    s3: StorageEntity,
}

#[derive(Debug, Deserialize)]
struct StorageEntity {
    bucket: NamedEntity,
    object: ObjectEntity,
}

#[derive(Debug, Deserialize)]
struct NamedEntity {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ObjectEntity {
    key: String,
}

impl NotificationEnvelope {
    fn into_trigger(self) -> Result<TriggerEvent, PipelineError> {
        if self.records.len() > 1 {
            tracing::warn!(
                records = self.records.len(),
                "notification carries several records; processing the first"
            );
        }
        let record = self
            .records
            .into_iter()
            .next()
            .ok_or_else(|| PipelineError::InvalidEvent("notification has no records".to_string()))?;
        Ok(TriggerEvent::new(record.s3.bucket.name, record.s3.object.key))
    }
}

/// Invocation response returned to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationResponse {
    pub status_code: u16,
    pub body: ResponseBody,
}

/// Summary of what completed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseBody {
    pub status: PipelineStatus,
    pub renditions_published: usize,
    pub dispatches_succeeded: usize,
    pub dispatches_failed: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&PipelineResult> for InvocationResponse {
    fn from(result: &PipelineResult) -> Self {
        let status_code = match result.status {
            PipelineStatus::Failed => 500,
            PipelineStatus::Completed | PipelineStatus::CompletedWithErrors => 200,
        };
        Self {
            status_code,
            body: ResponseBody {
                status: result.status,
                renditions_published: result.renditions_published,
                dispatches_succeeded: result.dispatches_succeeded,
                dispatches_failed: result.dispatches_failed,
                error: result.error.clone(),
            },
        }
    }
}

impl InvocationResponse {
    /// Whether the caller should treat the invocation as successful
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status_code == 200
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_shape() {
        let event = TriggerEvent::from_json(r#"{"sourceBucket":"in","sourceKey":"cat.png"}"#).unwrap();
        assert_eq!(event, TriggerEvent::new("in", "cat.png"));
    }

    #[test]
    fn reduces_notification_envelope() {
        let json = r#"{
            "Records": [{
                "eventName": "ObjectCreated:Put",
                "s3": {
                    "bucket": {"name": "uploads", "arn": "arn:bucket"},
                    "object": {"key": "albums/cat.png", "size": 1024}
                }
            }]
        }"#;
        let event = TriggerEvent::from_json(json).unwrap();
        assert_eq!(event, TriggerEvent::new("uploads", "albums/cat.png"));
    }

    #[test]
    fn envelope_key_is_not_url_decoded() {
        let json = r#"{"Records":[{"s3":{"bucket":{"name":"uploads"},"object":{"key":"my+cat%21.png"}}}]}"#;
        let event = TriggerEvent::from_json(json).unwrap();
        assert_eq!(event.source_key, "my+cat%21.png");
    }

    #[test]
    fn empty_envelope_is_rejected() {
        let err = TriggerEvent::from_json(r#"{"Records": []}"#).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidEvent(_)));
    }

    #[test]
    fn unrelated_json_is_rejected() {
        assert!(TriggerEvent::from_json(r#"{"hello": "world"}"#).is_err());
        assert!(TriggerEvent::from_json(r#"{"sourceBucket":"","sourceKey":"k"}"#).is_err());
        assert!(TriggerEvent::from_json("not json").is_err());
    }
}
