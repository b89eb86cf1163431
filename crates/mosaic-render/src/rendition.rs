//! Rendition sets
//!
//! Applies the transform once per configured size and names each result.
//! A set is all-or-nothing: if any size fails, none of the renditions are
//! returned.

use crate::block_size::BlockSize;
use crate::error::RenderError;
use crate::transform::DecodedSource;
use rayon::prelude::*;

/// Prefix shared by every published rendition key
pub const DESTINATION_PREFIX: &str = "pixelated";

/// Destination key for a rendition: `pixelated-{w}x{h}-{source_key}`
///
/// Pure: the same inputs always give the same key, so reprocessing a source
/// overwrites its earlier renditions.
#[inline]
#[must_use]
pub fn destination_key(source_key: &str, block: BlockSize) -> String {
    format!("{DESTINATION_PREFIX}-{block}-{source_key}")
}

/// One derived image ready for publishing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenditionArtifact {
    /// Grid the source was reduced to
    pub block_size: BlockSize,
    /// Encoded image, same format and dimensions as the source
    pub bytes: Vec<u8>,
    /// Key to publish under
    pub destination_key: String,
}

impl RenditionArtifact {
    /// Encoded size in bytes
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the encoded payload is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Builds the full rendition set for one source image
#[derive(Debug, Clone)]
pub struct RenditionSetBuilder {
    block_sizes: Vec<BlockSize>,
}

impl RenditionSetBuilder {
    /// Create builder for the given sizes, in reporting order
    ///
    /// Repeated sizes are dropped so every artifact gets its own key.
    #[must_use]
    pub fn new(block_sizes: Vec<BlockSize>) -> Self {
        Self {
            block_sizes: BlockSize::unique(block_sizes),
        }
    }

    /// Configured sizes
    #[inline]
    #[must_use]
    pub fn block_sizes(&self) -> &[BlockSize] {
        &self.block_sizes
    }

    /// Destination keys this builder would produce for `source_key`
    #[must_use]
    pub fn destination_keys(&self, source_key: &str) -> Vec<String> {
        self.block_sizes
            .iter()
            .map(|block| destination_key(source_key, *block))
            .collect()
    }

    /// Render every configured size
    ///
    /// The source is decoded once; sizes render in parallel and results are
    /// returned in configured order.
    ///
    /// # Errors
    /// - `RenderError::Decode` if the source bytes cannot be decoded
    /// - `RenderError::PartialRendition` listing every size that failed
    pub fn build(
        &self,
        source_key: &str,
        source: &[u8],
    ) -> Result<Vec<RenditionArtifact>, RenderError> {
        let decoded = DecodedSource::decode(source)?;
        let (width, height) = decoded.dimensions();
        tracing::debug!(
            key = source_key,
            width,
            height,
            format = ?decoded.format,
            sizes = self.block_sizes.len(),
            "decoded source image"
        );

        let rendered: Vec<(BlockSize, Result<Vec<u8>, RenderError>)> = self
            .block_sizes
            .par_iter()
            .map(|block| (*block, decoded.render(*block)))
            .collect();

        let mut artifacts = Vec::with_capacity(rendered.len());
        let mut failed = Vec::new();

        for (block, result) in rendered {
            match result {
                Ok(bytes) => artifacts.push(RenditionArtifact {
                    block_size: block,
                    bytes,
                    destination_key: destination_key(source_key, block),
                }),
                Err(e) => {
                    tracing::warn!(key = source_key, block_size = %block, error = %e, "rendition failed");
                    failed.push((block, e.to_string()));
                }
            }
        }

        if !failed.is_empty() {
            return Err(RenderError::PartialRendition {
                succeeded: artifacts.iter().map(|a| a.block_size).collect(),
                failed,
            });
        }

        Ok(artifacts)
    }
}

impl Default for RenditionSetBuilder {
    fn default() -> Self {
        Self::new(BlockSize::defaults())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use std::io::Cursor;

    fn checker_png(side: u32) -> Vec<u8> {
        let img = RgbaImage::from_fn(side, side, |x, y| {
            if (x / 4 + y / 4) % 2 == 0 {
                Rgba([255, 0, 0, 255])
            } else {
                Rgba([0, 0, 255, 255])
            }
        });
        let mut bytes = Vec::new();
        DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn destination_key_embeds_size() {
        assert_eq!(destination_key("cat.png", BlockSize::square(8)), "pixelated-8x8-cat.png");
        assert_eq!(
            destination_key("albums/cat.png", BlockSize::new(16, 32)),
            "pixelated-16x32-albums/cat.png"
        );
    }

    #[test]
    fn builds_in_configured_order() {
        let builder = RenditionSetBuilder::new(vec![
            BlockSize::square(32),
            BlockSize::square(8),
            BlockSize::square(16),
        ]);
        let artifacts = builder.build("cat.png", &checker_png(64)).unwrap();

        let keys: Vec<&str> = artifacts.iter().map(|a| a.destination_key.as_str()).collect();
        assert_eq!(
            keys,
            vec!["pixelated-32x32-cat.png", "pixelated-8x8-cat.png", "pixelated-16x16-cat.png"]
        );
        assert!(artifacts.iter().all(|a| !a.is_empty()));
    }

    #[test]
    fn repeated_sizes_render_once() {
        let builder = RenditionSetBuilder::new(vec![
            BlockSize::square(8),
            BlockSize::square(16),
            BlockSize::new(8, 8),
        ]);
        assert_eq!(builder.block_sizes(), &[BlockSize::square(8), BlockSize::square(16)]);

        let artifacts = builder.build("cat.png", &checker_png(32)).unwrap();
        let keys: Vec<&str> = artifacts.iter().map(|a| a.destination_key.as_str()).collect();
        assert_eq!(keys, vec!["pixelated-8x8-cat.png", "pixelated-16x16-cat.png"]);
    }

    #[test]
    fn default_builder_produces_five_renditions() {
        let artifacts = RenditionSetBuilder::default()
            .build("dog.png", &checker_png(96))
            .unwrap();
        assert_eq!(artifacts.len(), 5);
    }

    #[test]
    fn one_bad_size_fails_whole_set() {
        let builder = RenditionSetBuilder::new(vec![
            BlockSize::square(8),
            BlockSize::square(16),
            BlockSize::new(0, 32),
            BlockSize::square(48),
            BlockSize::square(64),
        ]);

        let err = builder.build("cat.png", &checker_png(64)).unwrap_err();
        match err {
            RenderError::PartialRendition { succeeded, failed } => {
                assert_eq!(succeeded.len(), 4);
                assert_eq!(failed.len(), 1);
                assert_eq!(failed[0].0, BlockSize::new(0, 32));
            }
            other => panic!("expected partial rendition, got {other:?}"),
        }
    }

    #[test]
    fn undecodable_source_is_decode_error() {
        let err = RenditionSetBuilder::default()
            .build("cat.png", b"GIF89a but not really")
            .unwrap_err();
        assert!(err.is_input_error());
    }

    proptest! {
        #[test]
        fn prop_destination_key_is_pure(key in "[a-z0-9/._-]{1,40}", w in 1..512u32, h in 1..512u32) {
            let block = BlockSize::new(w, h);
            let first = destination_key(&key, block);
            prop_assert_eq!(&first, &destination_key(&key, block));
            prop_assert!(first.ends_with(&key));
            let prefix = format!("pixelated-{w}x{h}-");
            prop_assert!(first.starts_with(&prefix));
        }
    }
}
