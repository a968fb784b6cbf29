//! Rate-distortion multipliers and loop filter strength.
//!
//! All lambdas derive from a segment's averaged quantizer steps. The fixed
//! `LAMBDA_*` values are used by the fast distortion-only refinement.

use crate::common::types::AC_QUANT;
use crate::encoder::tables::{LEVELS_FROM_DELTA, MAX_DELTA_SIZE};

/// Whole-block luma lambda of the distortion-only refinement.
pub const LAMBDA_I16: u32 = 106;
/// Subblock lambda of the distortion-only refinement.
pub const LAMBDA_I4: u32 = 11;
/// Chroma lambda of the distortion-only refinement.
pub const LAMBDA_UV: u32 = 120;

/// Filter levels below this have no visible effect and are dropped.
const FSTRENGTH_CUTOFF: u32 = 2;

/// `(3 * q^2) >> 7`
#[inline]
pub fn calc_lambda_i4(q: u32) -> u32 {
    ((3 * q * q) >> 7).max(1)
}

/// `3 * q^2`
#[inline]
pub fn calc_lambda_i16(q: u32) -> u32 {
    (3 * q * q).max(1)
}

/// `(3 * q^2) >> 6`
#[inline]
pub fn calc_lambda_uv(q: u32) -> u32 {
    ((3 * q * q) >> 6).max(1)
}

/// `q^2 >> 7`
#[inline]
pub fn calc_lambda_mode(q: u32) -> u32 {
    ((q * q) >> 7).max(1)
}

/// Score handicap of subblock prediction relative to the whole-block modes.
#[inline]
pub fn calc_i4_penalty(q: u32) -> u64 {
    1000 * u64::from(q) * u64::from(q)
}

/// Weight of the spectral distortion term. Zero disables it.
#[inline]
pub fn calc_tlambda(sns_strength: u32, q: u32) -> u32 {
    (sns_strength * q) >> 5
}

/// Smallest filter level that smooths an edge step of `delta`.
#[inline]
pub fn filter_strength_from_delta(sharpness: u8, delta: u32) -> u8 {
    let pos = (delta as usize).min(MAX_DELTA_SIZE - 1);
    LEVELS_FROM_DELTA[usize::from(sharpness.min(7))][pos]
}

/// Loop filter level of a segment.
///
/// The base level is what smooths a step of a quarter AC quantizer, scaled by
/// `filter_strength` (0..=100) and damped for segments of low complexity
/// (`beta` 0..=255). Levels under 2 are dropped and the result is capped at 63.
pub fn segment_filter_level(quant_index: u8, sharpness: u8, filter_strength: u8, beta: u8) -> u8 {
    let level0 = 5 * u32::from(filter_strength);
    let qstep = u32::from(AC_QUANT[usize::from(quant_index.min(127))].unsigned_abs()) >> 2;
    let base = u32::from(filter_strength_from_delta(sharpness, qstep));
    let f = base * level0 / (256 + u32::from(beta));
    if f < FSTRENGTH_CUTOFF {
        0
    } else {
        f.min(63) as u8
    }
}
