//! Block sizes
//!
//! A [`BlockSize`] is the grid a source image is reduced to before it is
//! blown back up. Sizes larger than the source are legal and produce a
//! near-identity rendition.

use crate::error::RenderError;
use indexmap::IndexSet;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Default rendition sizes, smallest first
const DEFAULT_SIDES: [u32; 5] = [8, 16, 32, 48, 64];

/// Target grid dimensions in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockSize {
    pub width: u32,
    pub height: u32,
}

impl BlockSize {
    /// Create block size without validation
    ///
    /// Use [`BlockSize::validate`] or [`FromStr`] when the values are untrusted.
    #[inline]
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Square block size
    #[inline]
    #[must_use]
    pub const fn square(side: u32) -> Self {
        Self::new(side, side)
    }

    /// The built-in rendition list: 8, 16, 32, 48 and 64 squares
    #[must_use]
    pub fn defaults() -> Vec<Self> {
        DEFAULT_SIDES.iter().copied().map(Self::square).collect()
    }

    /// Ensure both dimensions are at least one pixel
    ///
    /// # Errors
    /// Returns `RenderError::InvalidBlockSize` if either dimension is zero
    #[inline]
    pub fn validate(self) -> Result<Self, RenderError> {
        if self.width == 0 || self.height == 0 {
            return Err(RenderError::InvalidBlockSize {
                width: self.width,
                height: self.height,
            });
        }
        Ok(self)
    }

    /// Drop repeated sizes, keeping first-seen order
    #[must_use]
    pub fn unique(sizes: impl IntoIterator<Item = Self>) -> Vec<Self> {
        sizes.into_iter().collect::<IndexSet<_>>().into_iter().collect()
    }

    /// Parse a comma-separated list such as `"8,16x16, 32x24"`
    ///
    /// Repeated sizes are kept once, at their first position.
    ///
    /// # Errors
    /// - `RenderError::EmptyBlockSizeList` if no entries are present
    /// - Any error from parsing an individual entry
    pub fn parse_list(list: &str) -> Result<Vec<Self>, RenderError> {
        let sizes = list
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(Self::from_str)
            .collect::<Result<Vec<_>, _>>()?;

        if sizes.is_empty() {
            return Err(RenderError::EmptyBlockSizeList);
        }
        Ok(Self::unique(sizes))
    }
}

impl Display for BlockSize {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for BlockSize {
    type Err = RenderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || RenderError::MalformedBlockSize(s.to_string());
        let parse_side = |side: &str| side.trim().parse::<u32>().map_err(|_| malformed());

        let size = match s.trim().split_once(['x', 'X']) {
            Some((width, height)) => Self::new(parse_side(width)?, parse_side(height)?),
            None => Self::square(parse_side(s)?),
        };
        size.validate()
    }
}

// Serialized as the "WxH" string so reports stay readable
impl serde::Serialize for BlockSize {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for BlockSize {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(serde::de::Error::custom)
    }
}
