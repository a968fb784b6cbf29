//! Encoding of VP8 key frames.
//!
//! # API
//!
//! ```rust
//! use zenvp8::{EncoderConfig, YuvImage};
//!
//! let (y, u, v) = (vec![128u8; 32 * 32], vec![128u8; 16 * 16], vec![128u8; 16 * 16]);
//! let image = YuvImage::new(32, 32, &y, &u, &v);
//! let config = EncoderConfig::new().with_quality(85.0).with_method(4);
//! let frame = zenvp8::encode_frame(&image, &config)?;
//! assert_eq!(&frame[3..6], &[0x9d, 0x01, 0x2a]);
//! # Ok::<(), zenvp8::EncodeError>(())
//! ```
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use thiserror::Error;

use super::vp8::encode_frame_lossy;

/// Largest width or height a key frame can describe.
pub const MAX_DIMENSION: u16 = 16383;

/// Error that can occur during encoding.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EncodeError {
    /// Width or height is zero or above [`MAX_DIMENSION`].
    #[error("Invalid dimensions")]
    InvalidDimensions,

    /// A plane is too small for the given dimensions and stride.
    #[error("Invalid buffer size: {0}")]
    InvalidBufferSize(String),

    /// A configuration value or an intermediate result is out of range.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Encoding was cancelled via a [`enough::Stop`] token.
    #[error("Encoding cancelled: {0}")]
    Cancelled(enough::StopReason),
}

impl From<enough::StopReason> for EncodeError {
    fn from(reason: enough::StopReason) -> Self {
        Self::Cancelled(reason)
    }
}

/// Encoder settings.
///
/// Fields can be set directly; the `with_*` builders clamp to the valid
/// range. [`EncoderConfig::validate`] catches what clamping cannot.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub struct EncoderConfig {
    /// Quality from 0.0 (smallest) to 100.0 (best). Default: 75.0.
    pub quality: f32,
    /// Effort from 0 (fast) to 6 (slow, better). Default: 4.
    ///
    /// Methods 3 and above run the full rate-distortion mode search;
    /// 2 and above consider subblock luma prediction against whole-block
    /// modes; 5 and above smooth the segment map.
    pub method: u8,
    /// Spatial noise shaping, 0..=100: how much quantizers follow the local
    /// complexity. Default: 50.
    pub sns_strength: u8,
    /// Loop filter strength, 0..=100. Default: 60.
    pub filter_strength: u8,
    /// Loop filter sharpness, 0..=7. Default: 0.
    pub filter_sharpness: u8,
    /// Use the simple loop filter instead of the normal one. Default: false.
    pub simple_filter: bool,
    /// Number of segments, 1..=4. Default: 4.
    pub segments: u8,
    /// Log2 of the token partition count, 0..=3. Default: 0.
    pub partitions: u8,
    /// Statistics passes before the final encode, 1..=10. Default: 1.
    pub passes: u8,
    /// Target frame size in bytes; 0 disables the size search. Default: 0.
    pub target_size: u32,
    /// Target PSNR in dB; 0.0 disables the search. Ignored when
    /// `target_size` is set. Default: 0.0.
    pub target_psnr: f32,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl EncoderConfig {
    /// Default settings: quality 75, method 4, four segments.
    #[must_use]
    pub fn new() -> Self {
        Self {
            quality: 75.0,
            method: 4,
            sns_strength: 50,
            filter_strength: 60,
            filter_sharpness: 0,
            simple_filter: false,
            segments: 4,
            partitions: 0,
            passes: 1,
            target_size: 0,
            target_psnr: 0.0,
        }
    }

    /// Set quality (0.0 = smallest output, 100.0 = best).
    #[must_use]
    pub fn with_quality(mut self, quality: f32) -> Self {
        self.quality = quality.clamp(0.0, 100.0);
        self
    }

    /// Set method (0 = fastest, 6 = slowest).
    #[must_use]
    pub fn with_method(mut self, method: u8) -> Self {
        self.method = method.min(6);
        self
    }

    /// Set spatial noise shaping strength (0-100).
    #[must_use]
    pub fn with_sns_strength(mut self, strength: u8) -> Self {
        self.sns_strength = strength.min(100);
        self
    }

    /// Set loop filter strength (0-100). 0 turns the filter off.
    #[must_use]
    pub fn with_filter_strength(mut self, strength: u8) -> Self {
        self.filter_strength = strength.min(100);
        self
    }

    /// Set loop filter sharpness (0-7).
    #[must_use]
    pub fn with_filter_sharpness(mut self, sharpness: u8) -> Self {
        self.filter_sharpness = sharpness.min(7);
        self
    }

    /// Select the simple loop filter.
    #[must_use]
    pub fn with_simple_filter(mut self, simple: bool) -> Self {
        self.simple_filter = simple;
        self
    }

    /// Set the number of segments (1-4).
    #[must_use]
    pub fn with_segments(mut self, segments: u8) -> Self {
        self.segments = segments.clamp(1, 4);
        self
    }

    /// Split tokens into `1 << log2` partitions (log2 in 0-3).
    #[must_use]
    pub fn with_partitions(mut self, log2: u8) -> Self {
        self.partitions = log2.min(3);
        self
    }

    /// Set the number of statistics passes (1-10).
    #[must_use]
    pub fn with_passes(mut self, passes: u8) -> Self {
        self.passes = passes.clamp(1, 10);
        self
    }

    /// Search the quality that yields about `size` bytes.
    #[must_use]
    pub fn with_target_size(mut self, size: u32) -> Self {
        self.target_size = size;
        self
    }

    /// Search the quality that yields about `psnr` dB.
    #[must_use]
    pub fn with_target_psnr(mut self, psnr: f32) -> Self {
        self.target_psnr = if psnr.is_nan() { psnr } else { psnr.max(0.0) };
        self
    }

    /// Checks the fields that may have been set directly.
    pub fn validate(&self) -> Result<(), EncodeError> {
        let check = |ok: bool, what: &str| {
            if ok {
                Ok(())
            } else {
                Err(EncodeError::InvalidParameter(String::from(what)))
            }
        };
        check(
            (0.0..=100.0).contains(&self.quality),
            "quality must be within 0.0..=100.0",
        )?;
        check(self.method <= 6, "method must be within 0..=6")?;
        check(self.sns_strength <= 100, "sns_strength must be within 0..=100")?;
        check(
            self.filter_strength <= 100,
            "filter_strength must be within 0..=100",
        )?;
        check(
            self.filter_sharpness <= 7,
            "filter_sharpness must be within 0..=7",
        )?;
        check(
            (1..=4).contains(&self.segments),
            "segments must be within 1..=4",
        )?;
        check(self.partitions <= 3, "partitions must be within 0..=3")?;
        check((1..=10).contains(&self.passes), "passes must be within 1..=10")?;
        check(
            self.target_psnr >= 0.0,
            "target_psnr must be a non-negative number",
        )?;
        Ok(())
    }

    /// Whether the statistics passes search a quality.
    pub(crate) fn do_search(&self) -> bool {
        self.target_size > 0 || self.target_psnr > 0.0
    }
}

/// Planar YUV 4:2:0 input.
///
/// Chroma planes are `ceil(width / 2) x ceil(height / 2)`.
#[derive(Clone, Copy, Debug)]
pub struct YuvImage<'a> {
    /// Luma samples.
    pub y: &'a [u8],
    /// Cb samples.
    pub u: &'a [u8],
    /// Cr samples.
    pub v: &'a [u8],
    /// Width in pixels.
    pub width: u16,
    /// Height in pixels.
    pub height: u16,
    /// Distance between luma rows.
    pub y_stride: usize,
    /// Distance between chroma rows.
    pub uv_stride: usize,
}

impl<'a> YuvImage<'a> {
    /// Tightly packed planes.
    pub fn new(width: u16, height: u16, y: &'a [u8], u: &'a [u8], v: &'a [u8]) -> Self {
        let y_stride = usize::from(width);
        Self::with_strides(width, height, y, u, v, y_stride, y_stride.div_ceil(2))
    }

    /// Planes with explicit row strides.
    pub fn with_strides(
        width: u16,
        height: u16,
        y: &'a [u8],
        u: &'a [u8],
        v: &'a [u8],
        y_stride: usize,
        uv_stride: usize,
    ) -> Self {
        Self {
            y,
            u,
            v,
            width,
            height,
            y_stride,
            uv_stride,
        }
    }

    /// Width of the chroma planes.
    pub fn chroma_width(&self) -> usize {
        usize::from(self.width).div_ceil(2)
    }

    /// Height of the chroma planes.
    pub fn chroma_height(&self) -> usize {
        usize::from(self.height).div_ceil(2)
    }

    /// Checks dimensions, strides and plane sizes.
    pub fn validate(&self) -> Result<(), EncodeError> {
        let in_range = |d: u16| (1..=MAX_DIMENSION).contains(&d);
        if !in_range(self.width) || !in_range(self.height) {
            return Err(EncodeError::InvalidDimensions);
        }
        let plane = |name: &str, data: &[u8], w: usize, h: usize, stride: usize| {
            if stride < w {
                return Err(EncodeError::InvalidBufferSize(format!(
                    "{name} stride {stride} is below the width {w}"
                )));
            }
            let needed = stride * (h - 1) + w;
            if data.len() < needed {
                return Err(EncodeError::InvalidBufferSize(format!(
                    "{name} plane has {} bytes, {needed} needed",
                    data.len()
                )));
            }
            Ok(())
        };
        let (w, h) = (usize::from(self.width), usize::from(self.height));
        let (cw, ch) = (self.chroma_width(), self.chroma_height());
        plane("Y", self.y, w, h, self.y_stride)?;
        plane("U", self.u, cw, ch, self.uv_stride)?;
        plane("V", self.v, cw, ch, self.uv_stride)
    }
}

/// What the encoder did, gathered during the final pass.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EncodeStats {
    /// Size of the whole frame in bytes.
    pub coded_size: u32,
    /// PSNR of the reconstruction in dB: Y, U, V and all planes. The loop
    /// filter is not applied, so a decoder's output differs slightly.
    pub psnr: [f32; 4],
    /// Macroblocks coded with subblock luma prediction.
    pub block_count_i4: u32,
    /// Macroblocks coded with whole-block luma prediction.
    pub block_count_i16: u32,
    /// Macroblocks without any coded coefficient.
    pub block_count_skip: u32,
    /// Uncompressed header bytes (frame tag, start code, dimensions).
    pub header_bytes: u32,
    /// Bytes of the first partition: frame header fields and modes.
    pub mode_partition_bytes: u32,
    /// Bytes of each token partition.
    pub partition_bytes: Vec<u32>,
    /// Quantizer index per segment.
    pub segment_quant: [u8; 4],
    /// Loop filter level per segment.
    pub segment_level: [u8; 4],
    /// Segments in the coded frame.
    pub segments: u8,
    /// Statistics passes run, including restarts.
    pub passes: u8,
    /// Quality the final encode used.
    pub quality: f32,
}

/// Encodes a raw VP8 key frame.
pub fn encode_frame(image: &YuvImage<'_>, config: &EncoderConfig) -> Result<Vec<u8>, EncodeError> {
    encode_frame_with_stats(image, config).map(|(frame, _)| frame)
}

/// Encodes a raw VP8 key frame and reports [`EncodeStats`].
pub fn encode_frame_with_stats(
    image: &YuvImage<'_>,
    config: &EncoderConfig,
) -> Result<(Vec<u8>, EncodeStats), EncodeError> {
    encode_frame_with_stop(image, config, &enough::Unstoppable)
}

/// Encodes a raw VP8 key frame, checking `stop` once per macroblock row.
pub fn encode_frame_with_stop(
    image: &YuvImage<'_>,
    config: &EncoderConfig,
    stop: &dyn enough::Stop,
) -> Result<(Vec<u8>, EncodeStats), EncodeError> {
    config.validate()?;
    image.validate()?;
    encode_frame_lossy(image, config, stop)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builders_clamp() {
        let c = EncoderConfig::new()
            .with_quality(140.0)
            .with_method(9)
            .with_segments(0)
            .with_partitions(5)
            .with_passes(20)
            .with_filter_sharpness(8);
        assert_eq!(c.quality, 100.0);
        assert_eq!(c.method, 6);
        assert_eq!(c.segments, 1);
        assert_eq!(c.partitions, 3);
        assert_eq!(c.passes, 10);
        assert_eq!(c.filter_sharpness, 7);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn validate_rejects_nan_and_direct_out_of_range_fields() {
        let mut c = EncoderConfig::new();
        c.quality = f32::NAN;
        assert!(matches!(c.validate(), Err(EncodeError::InvalidParameter(_))));
        let c = EncoderConfig::new().with_quality(f32::NAN);
        assert!(c.validate().is_err());
        let c = EncoderConfig::new().with_target_psnr(f32::NAN);
        assert!(c.validate().is_err());
        let mut c = EncoderConfig::new();
        c.segments = 5;
        assert!(c.validate().is_err());
        assert!(EncoderConfig::default().validate().is_ok());
        assert!(!EncoderConfig::default().do_search());
    }

    #[test]
    fn image_validation() {
        let y = [0u8; 9 * 5];
        let uv = [0u8; 5 * 3];
        assert!(YuvImage::new(9, 5, &y, &uv, &uv).validate().is_ok());
        assert!(matches!(
            YuvImage::new(0, 5, &y, &uv, &uv).validate(),
            Err(EncodeError::InvalidDimensions)
        ));
        assert!(matches!(
            YuvImage::new(9, 6, &y, &uv, &uv).validate(),
            Err(EncodeError::InvalidBufferSize(_))
        ));
        assert!(matches!(
            YuvImage::with_strides(9, 5, &y, &uv, &uv, 8, 5).validate(),
            Err(EncodeError::InvalidBufferSize(_))
        ));
        // the last row does not need padding
        let y = [0u8; 12 * 4 + 9];
        assert!(YuvImage::with_strides(9, 5, &y, &uv, &uv, 12, 5).validate().is_ok());
    }
}
