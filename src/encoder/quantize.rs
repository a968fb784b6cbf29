//! Quantization matrices and block quantization.
//!
//! A [`QuantMatrix`] holds, per coefficient position, the quantizer step, its
//! fixed-point reciprocal, a rounding bias and the threshold below which a
//! coefficient is known to quantize to zero. Only the DC entry differs from
//! the others; positions 2..16 replicate position 1.

use super::tables::{FREQ_SHARPENING, MAX_LEVEL};
use crate::common::types::ZIGZAG;

/// Fixed-point precision of the reciprocals.
pub const QFIX: u32 = 17;

const SHARPEN_BITS: u32 = 11;

/// Rounding bias for a bias value expressed in 1/256.
#[inline]
pub const fn quantization_bias(b: u32) -> u32 {
    ((b << QFIX) + 128) >> 8
}

/// `(coeff * iq + bias) >> QFIX`
#[inline]
pub fn quantdiv(coeff: u32, iq: u32, bias: u32) -> i32 {
    ((u64::from(coeff) * u64::from(iq) + u64::from(bias)) >> QFIX) as i32
}

/// Which coefficient family a matrix quantizes. Each has its own rounding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatrixKind {
    /// Luma blocks.
    Y1,
    /// The second-order (WHT) luma DC block.
    Y2,
    /// Chroma blocks.
    Uv,
}

impl MatrixKind {
    /// DC and AC biases in 1/256.
    const fn biases(self) -> (u32, u32) {
        match self {
            MatrixKind::Y1 => (96, 110),
            MatrixKind::Y2 => (96, 108),
            MatrixKind::Uv => (110, 115),
        }
    }
}

/// Per-position quantization parameters for one coefficient family.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QuantMatrix {
    /// Quantizer step.
    pub q: [u16; 16],
    /// `(1 << QFIX) / q`
    pub iq: [u32; 16],
    /// Rounding bias.
    pub bias: [u32; 16],
    /// Magnitudes at or below this quantize to zero.
    pub zthresh: [u32; 16],
    /// Magnitude boost added before quantizing; non-zero only for luma.
    pub sharpen: [u16; 16],
}

impl QuantMatrix {
    /// Builds a matrix from the DC and AC quantizer steps.
    pub fn new(q_dc: u16, q_ac: u16, kind: MatrixKind) -> Self {
        assert!(q_dc > 0 && q_ac > 0, "quantizer steps must be positive");
        let (dc_bias, ac_bias) = kind.biases();
        let mut m = QuantMatrix {
            q: [q_ac; 16],
            iq: [0; 16],
            bias: [0; 16],
            zthresh: [0; 16],
            sharpen: [0; 16],
        };
        m.q[0] = q_dc;
        for i in 0..16 {
            let bias = if i == 0 { dc_bias } else { ac_bias };
            m.iq[i] = (1 << QFIX) / u32::from(m.q[i]);
            m.bias[i] = quantization_bias(bias);
            m.zthresh[i] = ((1 << QFIX) - 1 - m.bias[i]) / m.iq[i];
            if kind == MatrixKind::Y1 {
                m.sharpen[i] =
                    ((u32::from(FREQ_SHARPENING[i]) * u32::from(m.q[i])) >> SHARPEN_BITS) as u16;
            }
        }
        m
    }

    /// Mean step over the 16 positions, rounded. Drives the lambdas.
    pub fn average_q(&self) -> u32 {
        let sum: u32 = self.q.iter().map(|&q| u32::from(q)).sum();
        (sum + 8) >> 4
    }

    /// Quantizes one coefficient at raster position `pos`.
    #[inline]
    pub fn quantize_coeff(&self, coeff: i32, pos: usize) -> i32 {
        let magnitude = coeff.unsigned_abs() + u32::from(self.sharpen[pos]);
        if magnitude <= self.zthresh[pos] {
            return 0;
        }
        let level = quantdiv(magnitude, self.iq[pos], self.bias[pos]).min(MAX_LEVEL);
        if coeff < 0 {
            -level
        } else {
            level
        }
    }

    /// Quantizes a block given in raster order.
    ///
    /// `levels` receives the quantized levels in zigzag order and `coeffs` is
    /// replaced by its dequantized reconstruction. Returns whether any level
    /// is non-zero.
    pub fn quantize_block(&self, coeffs: &mut [i32; 16], levels: &mut [i32; 16]) -> bool {
        let mut nz = false;
        for (n, &j) in ZIGZAG.iter().enumerate() {
            let j = usize::from(j);
            let level = self.quantize_coeff(coeffs[j], j);
            coeffs[j] = level * i32::from(self.q[j]);
            levels[n] = level;
            nz |= level != 0;
        }
        nz
    }

    /// Multiplies zigzag-ordered levels back into a raster-order block.
    pub fn dequantize_block(&self, levels: &[i32; 16]) -> [i32; 16] {
        let mut out = [0i32; 16];
        for (&level, &j) in levels.iter().zip(ZIGZAG.iter()) {
            let j = usize::from(j);
            out[j] = level * i32::from(self.q[j]);
        }
        out
    }
}

/// The three matrices of a segment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SegmentMatrices {
    /// Luma.
    pub y1: QuantMatrix,
    /// Luma DC (WHT).
    pub y2: QuantMatrix,
    /// Chroma.
    pub uv: QuantMatrix,
}

impl SegmentMatrices {
    /// Matrices for the dequantization steps of a segment.
    pub fn from_segment(seg: &crate::common::types::Segment) -> Self {
        let step = |v: i16| v.max(1) as u16;
        SegmentMatrices {
            y1: QuantMatrix::new(step(seg.ydc), step(seg.yac), MatrixKind::Y1),
            y2: QuantMatrix::new(step(seg.y2dc), step(seg.y2ac), MatrixKind::Y2),
            uv: QuantMatrix::new(step(seg.uvdc), step(seg.uvac), MatrixKind::Uv),
        }
    }
}
