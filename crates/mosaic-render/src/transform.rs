//! Pixelation transform
//!
//! Two resamples produce the mosaic look:
//! 1. Reduce the source to the block grid with a smoothing filter, so each
//!    cell becomes the blended colour of the area it covers.
//! 2. Scale the grid back to the source dimensions with nearest-neighbour,
//!    so each cell stays a hard-edged block.
//!
//! Both filters are fixed.

use crate::block_size::BlockSize;
use crate::error::RenderError;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};
use std::io::Cursor;

/// Filter used when reducing to the block grid
const DOWNSAMPLE_FILTER: FilterType = FilterType::Triangle;

/// Filter used when restoring the original dimensions
const UPSAMPLE_FILTER: FilterType = FilterType::Nearest;

/// A decoded source image together with the format it arrived in
#[derive(Debug, Clone)]
pub struct DecodedSource {
    /// Decoded pixels
    pub image: DynamicImage,
    /// Encoding of the original bytes, reused for every rendition
    pub format: ImageFormat,
}

impl DecodedSource {
    /// Detect the format and decode
    ///
    /// # Errors
    /// Returns `RenderError::Decode` if the format is unknown or the bytes are corrupt
    pub fn decode(bytes: &[u8]) -> Result<Self, RenderError> {
        let format = image::guess_format(bytes).map_err(RenderError::Decode)?;
        let image =
            image::load_from_memory_with_format(bytes, format).map_err(RenderError::Decode)?;
        Ok(Self { image, format })
    }

    /// Source dimensions `(width, height)`
    #[inline]
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Pixelate and encode in the source format
    ///
    /// # Errors
    /// - `RenderError::InvalidBlockSize` for a zero dimension
    /// - `RenderError::Encode` if the format cannot be written
    pub fn render(&self, block: BlockSize) -> Result<Vec<u8>, RenderError> {
        let mosaic = pixelate_image(&self.image, block)?;
        encode(&mosaic, self.format)
    }
}

/// Pixelate encoded image bytes, returning bytes in the same format and dimensions
///
/// # Errors
/// - `RenderError::Decode` if `source` is not a supported image
/// - `RenderError::InvalidBlockSize` if either block dimension is zero
/// - `RenderError::Encode` if the result cannot be written in the source format
pub fn pixelate(source: &[u8], block: BlockSize) -> Result<Vec<u8>, RenderError> {
    let block = block.validate()?;
    DecodedSource::decode(source)?.render(block)
}

/// Pixelate an already decoded image
///
/// The colour type of `image` is preserved.
///
/// # Errors
/// Returns `RenderError::InvalidBlockSize` if either block dimension is zero
pub fn pixelate_image(image: &DynamicImage, block: BlockSize) -> Result<DynamicImage, RenderError> {
    let block = block.validate()?;
    let (width, height) = image.dimensions();

    let reduced = image.resize_exact(block.width, block.height, DOWNSAMPLE_FILTER);
    Ok(reduced.resize_exact(width, height, UPSAMPLE_FILTER))
}

fn encode(image: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>, RenderError> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), format)
        .map_err(|source| RenderError::Encode { format, source })?;
    Ok(bytes)
}
