//! Mosaic Core - Pipeline orchestration
//!
//! Reacts to a new source image and:
//! - Fetches it from the object store
//! - Builds the rendition set (see [`mosaic_render`])
//! - Publishes every rendition under a deterministic key
//! - Starts one notification workflow per known recipient
//! - Reports a single aggregate [`PipelineResult`]
//!
//! # Example
//!
//! ```rust,ignore
//! use mosaic_core::{Collaborators, Pipeline, PipelineConfig, TriggerEvent};
//!
//! # async fn example(collaborators: Collaborators) -> Result<(), Box<dyn std::error::Error>> {
//! let config = PipelineConfig::from_env()?;
//! let pipeline = Pipeline::new(config, collaborators);
//!
//! let event = TriggerEvent::new("uploads", "cat.png");
//! let response = pipeline.invoke(&event).await;
//!
//! println!("{}", serde_json::to_string(&response)?);
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

// Core modules
pub mod collaborators;
pub mod config;
pub mod error;
pub mod event;
pub mod fanout;
pub mod memory;
pub mod pipeline;
pub mod publisher;
pub mod types;

// Re-exports for convenience
pub use collaborators::{
    Collaborators, DispatchJob, DispatchPayload, ExecutionHandle, ObjectStore, Recipient,
    RecipientDirectory, WorkflowDispatcher,
};
pub use config::{PipelineConfig, RetryPolicy};
pub use error::{CollaboratorError, ConfigError, PipelineError};
pub use event::{InvocationResponse, ResponseBody, TriggerEvent};
pub use fanout::{notification_message, unique_recipients, FanOutDispatcher};
pub use memory::{MemoryObjectStore, RecordingDispatcher, StaticDirectory};
pub use pipeline::Pipeline;
pub use publisher::{ArtifactPublisher, PublishReport};
pub use types::{
    DispatchOutcome, InvocationId, PipelineResult, PipelineStage, PipelineStatus, PublishFailure,
    PublishReceipt,
};

pub use mosaic_render::{BlockSize, RenderError, RenditionArtifact};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with Mosaic Core
    pub use crate::{
        Collaborators, InvocationResponse, ObjectStore, Pipeline, PipelineConfig, PipelineResult,
        PipelineStatus, Recipient, RecipientDirectory, TriggerEvent, WorkflowDispatcher,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
