//! Mosaic Render
//!
//! The pure, synchronous half of the pipeline:
//! - [`BlockSize`]: target grid a source image is reduced to
//! - [`pixelate`]: smoothed downsample followed by a hard-edged upsample
//! - [`RenditionSetBuilder`]: one [`RenditionArtifact`] per configured size
//! - [`destination_key`]: deterministic naming for published renditions
//!
//! # Example
//!
//! ```rust,ignore
//! use mosaic_render::{BlockSize, RenditionSetBuilder};
//!
//! let builder = RenditionSetBuilder::new(BlockSize::defaults());
//! let renditions = builder.build("cat.png", &png_bytes)?;
//!
//! for rendition in &renditions {
//!     println!("{} -> {}", rendition.block_size, rendition.destination_key);
//! }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod block_size;
mod error;
mod rendition;
mod transform;

pub use block_size::BlockSize;
pub use error::RenderError;
pub use rendition::{destination_key, RenditionArtifact, RenditionSetBuilder, DESTINATION_PREFIX};
pub use transform::{pixelate, pixelate_image, DecodedSource};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
