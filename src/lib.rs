//! VP8 intra-frame (key frame) codec.
//!
//! The encoder turns planar YUV 4:2:0 into a raw VP8 key frame: macroblocks
//! are clustered into up to four segments by complexity, each with its own
//! quantizer and loop filter level, and every macroblock's prediction modes
//! are picked by rate-distortion search. The decoder reverses the process,
//! including the in-loop deblocking filter.
//!
//! # Features
//!
//! - `std` (default): `std::error::Error` impls. Everything else only needs
//!   `alloc`.
//!
//! # Encoding
//!
//! ```rust
//! use zenvp8::{EncoderConfig, YuvImage};
//!
//! let (w, h) = (64u16, 48u16);
//! let y = vec![128u8; 64 * 48];
//! let (u, v) = (vec![128u8; 32 * 24], vec![128u8; 32 * 24]);
//! let image = YuvImage::new(w, h, &y, &u, &v);
//! let config = EncoderConfig::new().with_quality(80.0).with_method(4);
//! let (frame, stats) = zenvp8::encode_frame_with_stats(&image, &config)?;
//! assert_eq!(stats.coded_size as usize, frame.len());
//! # Ok::<(), zenvp8::EncodeError>(())
//! ```
//!
//! # Decoding
//!
//! ```rust
//! # let (y, u, v) = (vec![90u8; 16 * 16], vec![100u8; 64], vec![110u8; 64]);
//! # let image = zenvp8::YuvImage::new(16, 16, &y, &u, &v);
//! # let frame = zenvp8::encode_frame(&image, &zenvp8::EncoderConfig::new())?;
//! let decoded = zenvp8::decode_frame(&frame)?;
//! assert_eq!((decoded.width, decoded.height), (16, 16));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Both directions accept an [`enough::Stop`] token, checked once per
//! macroblock row.

#![cfg_attr(not(feature = "std"), no_std)]
#![forbid(unsafe_code)]
#![deny(missing_docs)]

extern crate alloc;

pub mod common;
pub mod decoder;
pub mod encoder;

pub use decoder::{
    decode_frame, decode_frame_with_limits, decode_frame_with_stop, DecodeError, DecodeLimits,
    DecodedFrame,
};

pub use encoder::{
    encode_frame, encode_frame_with_stats, encode_frame_with_stop, EncodeError, EncodeStats,
    EncoderConfig, YuvImage, MAX_DIMENSION,
};

pub use enough::{Stop, StopReason, Unstoppable};
