use alloc::string::String;
use alloc::vec::Vec;
use thiserror::Error;

use super::vp8::Vp8Decoder;

/// Errors that can occur when attempting to decode a VP8 frame
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DecodeError {
    /// VP8's `[0x9D, 0x01, 0x2A]` magic not found or invalid
    #[error("Invalid VP8 magic: {0:x?}")]
    Vp8MagicInvalid([u8; 3]),

    /// VP8 Decoder initialisation wasn't provided with enough data
    #[error("Not enough VP8 init data")]
    NotEnoughInitData,

    /// At time of writing, only the YUV colour-space encoded as `0` is specified
    #[error("Invalid VP8 color space: {0}")]
    ColorSpaceInvalid(u8),

    /// The frame may be valid, but this crate doesn't support decoding it.
    #[error("Unsupported feature: {0}")]
    UnsupportedFeature(String),

    /// The coded data is corrupt: an undefined token category, a partition
    /// table that does not fit the data, or a partition that ends early.
    #[error("Malformed bitstream: {0}")]
    MalformedBitstream(&'static str),

    /// The frame exceeds the configured [`DecodeLimits`].
    #[error("Image too large")]
    ImageTooLarge,

    /// Decoding was cancelled via a [`enough::Stop`] token.
    #[error("Decoding cancelled: {0}")]
    Cancelled(enough::StopReason),
}

impl From<enough::StopReason> for DecodeError {
    fn from(reason: enough::StopReason) -> Self {
        Self::Cancelled(reason)
    }
}

/// Size limits checked against the frame header before any plane is allocated.
///
/// All limits are optional; `None` means unlimited.
///
/// ```rust
/// use zenvp8::DecodeLimits;
///
/// let limits = DecodeLimits::default().max_dimensions(4096, 4096);
/// let unlimited = DecodeLimits::none();
/// # let _ = (limits, unlimited);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct DecodeLimits {
    /// Maximum frame width in pixels.
    pub max_width: Option<u32>,
    /// Maximum frame height in pixels.
    pub max_height: Option<u32>,
    /// Maximum total pixels (width * height).
    pub max_pixels: Option<u64>,
}

impl Default for DecodeLimits {
    /// The format maximum of 16383 in each dimension and 100 megapixels.
    fn default() -> Self {
        Self {
            max_width: Some(16383),
            max_height: Some(16383),
            max_pixels: Some(100_000_000),
        }
    }
}

impl DecodeLimits {
    /// Create limits with no restrictions.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_width: None,
            max_height: None,
            max_pixels: None,
        }
    }

    /// Set maximum dimensions.
    #[must_use]
    pub fn max_dimensions(mut self, width: u32, height: u32) -> Self {
        self.max_width = Some(width);
        self.max_height = Some(height);
        self
    }

    /// Set maximum total pixels.
    #[must_use]
    pub fn max_pixels(mut self, pixels: u64) -> Self {
        self.max_pixels = Some(pixels);
        self
    }

    /// Check if dimensions are within limits.
    pub fn check_dimensions(&self, width: u32, height: u32) -> Result<(), DecodeError> {
        let too_wide = self.max_width.is_some_and(|max| width > max);
        let too_tall = self.max_height.is_some_and(|max| height > max);
        let too_many = self
            .max_pixels
            .is_some_and(|max| u64::from(width) * u64::from(height) > max);
        if too_wide || too_tall || too_many {
            log::debug!("{width}x{height} rejected by {self:?}");
            Err(DecodeError::ImageTooLarge)
        } else {
            Ok(())
        }
    }
}

/// A decoded key frame in planar YUV 4:2:0, cropped to the picture size.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DecodedFrame {
    /// Picture width in pixels.
    pub width: u16,
    /// Picture height in pixels.
    pub height: u16,
    /// Luma plane, `y_stride * height` bytes.
    pub y: Vec<u8>,
    /// Cb plane, `uv_stride * ceil(height / 2)` bytes.
    pub u: Vec<u8>,
    /// Cr plane, same layout as `u`.
    pub v: Vec<u8>,
    /// Distance between luma rows.
    pub y_stride: usize,
    /// Distance between chroma rows.
    pub uv_stride: usize,
}

impl DecodedFrame {
    /// Width of the chroma planes.
    pub fn chroma_width(&self) -> usize {
        usize::from(self.width).div_ceil(2)
    }

    /// Height of the chroma planes.
    pub fn chroma_height(&self) -> usize {
        usize::from(self.height).div_ceil(2)
    }
}

/// Decodes a raw VP8 key frame with the default [`DecodeLimits`].
///
/// ```rust,no_run
/// # fn load() -> Vec<u8> { Vec::new() }
/// let data = load();
/// let frame = zenvp8::decode_frame(&data)?;
/// println!("{}x{}", frame.width, frame.height);
/// # Ok::<(), zenvp8::DecodeError>(())
/// ```
pub fn decode_frame(data: &[u8]) -> Result<DecodedFrame, DecodeError> {
    decode_frame_with_limits(data, &DecodeLimits::default())
}

/// Decodes a raw VP8 key frame, rejecting frames beyond `limits`.
pub fn decode_frame_with_limits(
    data: &[u8],
    limits: &DecodeLimits,
) -> Result<DecodedFrame, DecodeError> {
    decode_frame_with_stop(data, limits, &enough::Unstoppable)
}

/// Decodes a raw VP8 key frame, checking `stop` once per macroblock row.
pub fn decode_frame_with_stop(
    data: &[u8],
    limits: &DecodeLimits,
    stop: &dyn enough::Stop,
) -> Result<DecodedFrame, DecodeError> {
    let mut decoder = Vp8Decoder::new(data, limits)?;
    decoder.decode(stop)
}
