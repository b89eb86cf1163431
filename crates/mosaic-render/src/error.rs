//! Error types for rendering
//!
//! Covers the three ways a rendition can fail:
//! - Bad input (undecodable bytes, zero-sized blocks)
//! - Re-encoding into the source format
//! - An incomplete rendition set

use crate::block_size::BlockSize;

/// Rendering errors
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// Block dimension is zero
    #[error("invalid block size {width}x{height}: both dimensions must be at least 1")]
    InvalidBlockSize { width: u32, height: u32 },

    /// Block size text could not be parsed
    #[error("malformed block size '{0}': expected N or WxH")]
    MalformedBlockSize(String),

    /// Block size list contained no entries
    #[error("block size list is empty")]
    EmptyBlockSizeList,

    /// Source bytes are not a supported raster image
    #[error("failed to decode source image: {0}")]
    Decode(#[source] image::ImageError),

    /// Rendition could not be written back in the source format
    #[error("failed to encode rendition as {format:?}: {source}")]
    Encode {
        format: image::ImageFormat,
        #[source]
        source: image::ImageError,
    },

    /// At least one configured size failed; nothing from the set is usable
    #[error(
        "rendition set incomplete: {} of {} sizes failed",
        failed.len(),
        failed.len() + succeeded.len()
    )]
    PartialRendition {
        /// Sizes that rendered, in configured order
        succeeded: Vec<BlockSize>,
        /// Sizes that failed with their cause, in configured order
        failed: Vec<(BlockSize, String)>,
    },
}

impl RenderError {
    /// Check if the failure is caused by the source bytes rather than configuration
    #[inline]
    #[must_use]
    pub fn is_input_error(&self) -> bool {
        matches!(self, Self::Decode(_))
    }

    /// Sizes that failed, empty unless this is a partial rendition
    #[must_use]
    pub fn failed_sizes(&self) -> Vec<BlockSize> {
        match self {
            Self::PartialRendition { failed, .. } => failed.iter().map(|(size, _)| *size).collect(),
            _ => Vec::new(),
        }
    }
}
