//! DCT coefficient histograms and the "alpha" complexity measure.
//!
//! A block is transformed against a prediction and every coefficient,
//! divided by 8 and clipped to [`MAX_COEFF_THRESH`], is counted. A histogram
//! whose mass stays near zero compresses well; one that reaches far out with
//! a thin peak does not.

use crate::common::transform::{dct4x4, residual4x4};

/// Largest histogram bin.
pub const MAX_COEFF_THRESH: usize = 31;
/// Upper end of the alpha scale.
pub const MAX_ALPHA: i32 = 255;
const ALPHA_SCALE: i32 = 2 * MAX_ALPHA;

/// Alpha of a block that was never measured.
pub const DEFAULT_ALPHA: i32 = -1;

/// Summary of a coefficient distribution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DctHistogram {
    /// Height of the tallest bin.
    pub max_value: u32,
    /// Highest populated bin.
    pub last_non_zero: usize,
}

impl Default for DctHistogram {
    fn default() -> Self {
        Self {
            max_value: 0,
            last_non_zero: 1,
        }
    }
}

impl DctHistogram {
    /// Summarizes a bin count distribution.
    pub fn from_distribution(distribution: &[u32; MAX_COEFF_THRESH + 1]) -> Self {
        let mut histo = Self::default();
        for (k, &count) in distribution.iter().enumerate() {
            if count > 0 {
                histo.max_value = histo.max_value.max(count);
                histo.last_non_zero = k;
            }
        }
        histo
    }

    /// Histogram of the 4x4 blocks of a `cols x rows` grid of blocks.
    pub fn collect(
        src: &[u8],
        src_stride: usize,
        pred: &[u8],
        pred_stride: usize,
        cols: usize,
        rows: usize,
    ) -> Self {
        let mut distribution = [0u32; MAX_COEFF_THRESH + 1];
        accumulate(&mut distribution, src, src_stride, pred, pred_stride, cols, rows);
        Self::from_distribution(&distribution)
    }

    /// Complexity in `0..=510`: high when the coefficients spread out.
    pub fn alpha(&self) -> i32 {
        if self.max_value > 1 {
            ALPHA_SCALE * self.last_non_zero as i32 / self.max_value as i32
        } else {
            0
        }
    }
}

/// Adds the clipped coefficient magnitudes of a grid of 4x4 blocks to
/// `distribution`.
pub fn accumulate(
    distribution: &mut [u32; MAX_COEFF_THRESH + 1],
    src: &[u8],
    src_stride: usize,
    pred: &[u8],
    pred_stride: usize,
    cols: usize,
    rows: usize,
) {
    for by in 0..rows {
        for bx in 0..cols {
            let mut block = residual4x4(
                &src[by * 4 * src_stride + bx * 4..],
                src_stride,
                &pred[by * 4 * pred_stride + bx * 4..],
                pred_stride,
            );
            dct4x4(&mut block);
            for coeff in block {
                let bin = (coeff.unsigned_abs() >> 3) as usize;
                distribution[bin.min(MAX_COEFF_THRESH)] += 1;
            }
        }
    }
}

/// Turns a mixed alpha into a susceptibility: high means easy to compress.
pub fn final_alpha_value(alpha: i32) -> u8 {
    (MAX_ALPHA - alpha).clamp(0, MAX_ALPHA) as u8
}
