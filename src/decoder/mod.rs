//! VP8 key frame decoder

mod api;
pub(crate) mod bit_reader;
mod loop_filter;
mod vp8;

// Re-export public API
pub use api::{
    decode_frame, decode_frame_with_limits, decode_frame_with_stop, DecodeError, DecodeLimits,
    DecodedFrame,
};
