//! VP8 key frame encoder.
//!
//! Takes planar YUV 4:2:0 input and produces a raw VP8 key frame (frame tag,
//! start code, dimensions, partitions), without any container.

pub(crate) mod analysis;
mod api;
pub(crate) mod arithmetic;
pub(crate) mod cost;
pub(crate) mod quantize;
pub(crate) mod residual_cost;
pub(crate) mod tables;
pub(crate) mod vp8;

pub use analysis::segment;
pub use api::{
    encode_frame, encode_frame_with_stats, encode_frame_with_stop, EncodeError, EncodeStats,
    EncoderConfig, YuvImage, MAX_DIMENSION,
};
