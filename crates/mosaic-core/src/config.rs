//! Pipeline configuration
//!
//! Settings come from environment-style key/value lookup. Keys are accepted
//! in lower case (`processed_bucket`) or upper case (`PROCESSED_BUCKET`).

use crate::error::ConfigError;
use mosaic_render::BlockSize;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Destination bucket for renditions (required)
pub const DESTINATION_BUCKET_KEY: &str = "processed_bucket";
/// Recipient table name
pub const RECIPIENT_TABLE_KEY: &str = "ddb_table_name";
/// Workflow to start per recipient (required)
pub const WORKFLOW_ID_KEY: &str = "step_fn_arn";
/// Comma-separated block sizes
pub const BLOCK_SIZES_KEY: &str = "block_sizes";
/// Per-call deadline in seconds
pub const CALL_TIMEOUT_KEY: &str = "call_timeout_secs";
/// Attempts per rendition upload
pub const PUBLISH_ATTEMPTS_KEY: &str = "publish_max_attempts";
/// Concurrent workflow starts
pub const DISPATCH_CONCURRENCY_KEY: &str = "dispatch_concurrency";

/// Default recipient table
pub const DEFAULT_RECIPIENT_TABLE: &str = "UserEmails";

/// Retry policy for rendition uploads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles afterwards
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Create retry policy
    #[inline]
    #[must_use]
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Single attempt, no retry
    #[inline]
    #[must_use]
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Delay to wait after `attempt` (1-based) failed
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1 << exponent)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(200))
    }
}

/// Pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Bucket renditions are published to
    pub destination_bucket: String,
    /// Directory table recipients are read from
    pub recipient_table: String,
    /// Workflow started once per recipient
    pub workflow_id: String,
    /// Rendition sizes, in reporting order
    pub block_sizes: Vec<BlockSize>,
    /// Deadline applied to every collaborator call
    pub call_timeout: Duration,
    /// Upload retry policy
    pub retry: RetryPolicy,
    /// Maximum concurrent workflow starts
    pub dispatch_concurrency: usize,
}

impl PipelineConfig {
    /// Create configuration with defaults for optional settings
    #[must_use]
    pub fn new(destination_bucket: impl Into<String>, workflow_id: impl Into<String>) -> Self {
        Self {
            destination_bucket: destination_bucket.into(),
            recipient_table: DEFAULT_RECIPIENT_TABLE.to_string(),
            workflow_id: workflow_id.into(),
            block_sizes: BlockSize::defaults(),
            call_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            dispatch_concurrency: 8,
        }
    }

    /// With block sizes; repeats are kept once, at their first position
    #[must_use]
    pub fn with_block_sizes(mut self, block_sizes: Vec<BlockSize>) -> Self {
        self.block_sizes = BlockSize::unique(block_sizes);
        self
    }

    /// With recipient table
    #[inline]
    #[must_use]
    pub fn with_recipient_table(mut self, table: impl Into<String>) -> Self {
        self.recipient_table = table.into();
        self
    }

    /// With per-call deadline
    #[inline]
    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// With upload retry policy
    #[inline]
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// With dispatch concurrency (at least one)
    #[inline]
    #[must_use]
    pub fn with_dispatch_concurrency(mut self, concurrency: usize) -> Self {
        self.dispatch_concurrency = concurrency.max(1);
        self
    }

    /// Load from the process environment
    ///
    /// # Errors
    /// - `ConfigError::Missing` if the destination bucket or workflow id is absent
    /// - `ConfigError::Invalid` if an optional setting cannot be parsed
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key/value source
    ///
    /// # Errors
    /// Same as [`PipelineConfig::from_env`]
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .or_else(|| lookup(&key.to_ascii_uppercase()))
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let destination_bucket =
            get(DESTINATION_BUCKET_KEY).ok_or(ConfigError::Missing(DESTINATION_BUCKET_KEY))?;
        let workflow_id = get(WORKFLOW_ID_KEY).ok_or(ConfigError::Missing(WORKFLOW_ID_KEY))?;
        let mut config = Self::new(destination_bucket, workflow_id);

        if let Some(table) = get(RECIPIENT_TABLE_KEY) {
            config.recipient_table = table;
        }

        if let Some(list) = get(BLOCK_SIZES_KEY) {
            config.block_sizes = BlockSize::parse_list(&list)
                .map_err(|e| ConfigError::invalid(BLOCK_SIZES_KEY, list.as_str(), e))?;
        }

        if let Some(secs) = get(CALL_TIMEOUT_KEY) {
            let parsed = parse_positive(CALL_TIMEOUT_KEY, &secs)?;
            config.call_timeout = Duration::from_secs(parsed);
        }

        if let Some(attempts) = get(PUBLISH_ATTEMPTS_KEY) {
            let parsed = parse_positive(PUBLISH_ATTEMPTS_KEY, &attempts)?;
            let parsed = u32::try_from(parsed)
                .map_err(|e| ConfigError::invalid(PUBLISH_ATTEMPTS_KEY, attempts.as_str(), e))?;
            config.retry = RetryPolicy::new(parsed, config.retry.base_delay);
        }

        if let Some(concurrency) = get(DISPATCH_CONCURRENCY_KEY) {
            let parsed = parse_positive(DISPATCH_CONCURRENCY_KEY, &concurrency)?;
            config.dispatch_concurrency = usize::try_from(parsed).map_err(|e| {
                ConfigError::invalid(DISPATCH_CONCURRENCY_KEY, concurrency.as_str(), e)
            })?;
        }

        Ok(config)
    }
}

fn parse_positive(key: &'static str, value: &str) -> Result<u64, ConfigError> {
    match value.parse::<u64>() {
        Ok(0) => Err(ConfigError::invalid(key, value, "must be greater than zero")),
        Ok(parsed) => Ok(parsed),
        Err(e) => Err(ConfigError::invalid(key, value, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn required_settings_only() {
        let config = PipelineConfig::from_lookup(lookup(&[
            ("processed_bucket", "out"),
            ("step_fn_arn", "arn:wf"),
        ]))
        .unwrap();

        assert_eq!(config.destination_bucket, "out");
        assert_eq!(config.workflow_id, "arn:wf");
        assert_eq!(config.recipient_table, "UserEmails");
        assert_eq!(config.block_sizes, BlockSize::defaults());
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn upper_case_keys_are_accepted() {
        let config = PipelineConfig::from_lookup(lookup(&[
            ("PROCESSED_BUCKET", "out"),
            ("STEP_FN_ARN", "arn:wf"),
            ("DDB_TABLE_NAME", "Subscribers"),
        ]))
        .unwrap();
        assert_eq!(config.recipient_table, "Subscribers");
    }

    #[test]
    fn missing_destination_is_fatal() {
        let err = PipelineConfig::from_lookup(lookup(&[("step_fn_arn", "arn:wf")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("processed_bucket")));
    }

    #[test]
    fn missing_workflow_is_fatal() {
        let err = PipelineConfig::from_lookup(lookup(&[("processed_bucket", "out"), ("step_fn_arn", "  ")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Missing("step_fn_arn")));
    }

    #[test]
    fn optional_settings_are_parsed() {
        let config = PipelineConfig::from_lookup(lookup(&[
            ("processed_bucket", "out"),
            ("step_fn_arn", "arn:wf"),
            ("block_sizes", "8, 16x12"),
            ("call_timeout_secs", "5"),
            ("publish_max_attempts", "4"),
            ("dispatch_concurrency", "2"),
        ]))
        .unwrap();

        assert_eq!(config.block_sizes, vec![BlockSize::square(8), BlockSize::new(16, 12)]);
        assert_eq!(config.call_timeout, Duration::from_secs(5));
        assert_eq!(config.retry.max_attempts, 4);
        assert_eq!(config.dispatch_concurrency, 2);
    }

    #[test]
    fn repeated_block_sizes_collapse() {
        let config = PipelineConfig::from_lookup(lookup(&[
            ("processed_bucket", "out"),
            ("step_fn_arn", "arn:wf"),
            ("block_sizes", "8,8x8,16"),
        ]))
        .unwrap();
        assert_eq!(config.block_sizes, vec![BlockSize::square(8), BlockSize::square(16)]);

        let config = config.with_block_sizes(vec![BlockSize::square(32), BlockSize::square(32)]);
        assert_eq!(config.block_sizes, vec![BlockSize::square(32)]);
    }

    #[test]
    fn malformed_settings_are_rejected() {
        let err = PipelineConfig::from_lookup(lookup(&[
            ("processed_bucket", "out"),
            ("step_fn_arn", "arn:wf"),
            ("block_sizes", "8,0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "block_sizes", .. }));

        let err = PipelineConfig::from_lookup(lookup(&[
            ("processed_bucket", "out"),
            ("step_fn_arn", "arn:wf"),
            ("call_timeout_secs", "0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "call_timeout_secs", .. }));
    }

    #[test]
    fn backoff_doubles() {
        let retry = RetryPolicy::new(4, Duration::from_millis(100));
        assert_eq!(retry.backoff(1), Duration::from_millis(100));
        assert_eq!(retry.backoff(2), Duration::from_millis(200));
        assert_eq!(retry.backoff(3), Duration::from_millis(400));
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
    }
}
