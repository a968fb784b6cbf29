//! Macroblock complexity analysis and segmentation.
//!
//! Every macroblock is predicted from its source neighbours and the shape of
//! its residual coefficient histogram gives an "alpha": high for blocks that
//! compress well. Alphas are clustered into segments, which later get their
//! own quantizer and filter level.
//!
//! - [`histogram`]: coefficient histograms and alpha
//! - [`iterator`]: macroblock walk and boundary cache
//! - [`segment`]: k-means clustering and quantizer mapping

pub mod histogram;
pub mod iterator;
pub mod segment;

use alloc::vec;
use alloc::vec::Vec;

use crate::common::prediction::{CHROMA_BLOCK_SIZE, LUMA_BLOCK_SIZE};
use crate::common::types::{BlockMode, ChromaMode, MAX_SEGMENTS};
use crate::encoder::api::YuvImage;
use crate::encoder::vp8::mode_selection::ModeHint;
use crate::encoder::vp8::prediction::{chroma_prediction, luma16_prediction};

use histogram::{accumulate, final_alpha_value, DctHistogram, MAX_COEFF_THRESH};
use iterator::{MacroblockIterator, MacroblockPixels, UV_STRIDE, Y_STRIDE};
use segment::{assign_segments, segment_alphas, smooth_segment_map};

/// Analysis of one macroblock.
#[derive(Clone, Copy, Debug)]
pub struct MbAnalysis {
    /// Susceptibility, 0..=255. High means easy to compress.
    pub alpha: u8,
    /// Segment assigned by clustering.
    pub segment: u8,
    /// Modes suggested for the distortion-only search.
    pub hint: ModeHint,
}

/// Analysis of a whole frame.
#[derive(Clone, Debug)]
pub struct FrameAnalysis {
    /// Raster-order per-macroblock results.
    pub mbs: Vec<MbAnalysis>,
    /// Population of each alpha.
    pub alpha_histogram: [u32; 256],
    /// Mean mixed alpha.
    pub alpha_avg: i32,
    /// Mean raw chroma alpha, typically 30 (hard) to 100 (easy).
    pub uv_alpha_avg: i32,
    /// Number of segments in use.
    pub num_segments: usize,
    /// `(alpha, beta)` of each segment: alpha in `-127..=127` relative to the
    /// mean, beta in `0..=255` across the spread.
    pub segment_alphas: Vec<(i32, i32)>,
}

// Both DC and TM are tried; the prediction whose residual spreads the most
// decides the alpha.
fn best_intra16_alpha(
    ws: &[u8; LUMA_BLOCK_SIZE],
    px: &MacroblockPixels,
    x: usize,
    y: usize,
) -> i32 {
    let mut best = histogram::DEFAULT_ALPHA;
    for mode in [BlockMode::DC, BlockMode::TM] {
        let pred = luma16_prediction(ws, mode, x, y);
        let alpha = DctHistogram::collect(&px.y, Y_STRIDE, &pred, Y_STRIDE, 4, 4).alpha();
        if alpha > best {
            best = alpha;
        }
    }
    best
}

fn best_uv_alpha(
    ws_uv: &[[u8; CHROMA_BLOCK_SIZE]; 2],
    px: &MacroblockPixels,
    x: usize,
    y: usize,
) -> (i32, ChromaMode) {
    let mut best = (histogram::DEFAULT_ALPHA, ChromaMode::DC);
    for mode in [ChromaMode::DC, ChromaMode::TM] {
        let mut distribution = [0u32; MAX_COEFF_THRESH + 1];
        for (src, ws) in [(&px.u, &ws_uv[0]), (&px.v, &ws_uv[1])] {
            let pred = chroma_prediction(ws, mode.into(), x, y);
            accumulate(&mut distribution, src, UV_STRIDE, &pred, UV_STRIDE, 2, 2);
        }
        let alpha = DctHistogram::from_distribution(&distribution).alpha();
        if alpha > best.0 {
            best = (alpha, mode);
        }
    }
    best
}

/// Whole-block DC when the 4x4 block means barely vary, subblock DC
/// otherwise. Used by the fastest methods instead of histograms.
fn fast_is_i16(px: &MacroblockPixels, quality: f32) -> bool {
    let threshold = 8 + (17 - 8) * quality as u64 / 100;
    let mut m = 0u64;
    let mut m2 = 0u64;
    for by in 0..4 {
        for bx in 0..4 {
            let dc: u64 = (0..4)
                .flat_map(|r| px.y[(by * 4 + r) * Y_STRIDE + bx * 4..][..4].iter())
                .map(|&p| u64::from(p))
                .sum();
            m += dc;
            m2 += dc * dc;
        }
    }
    threshold * m2 < m * m
}

/// Analyzes every macroblock of `image` and clusters them into up to
/// `num_segments` segments.
pub fn analyze(
    image: &YuvImage<'_>,
    method: u8,
    quality: f32,
    num_segments: usize,
) -> FrameAnalysis {
    let mut it = MacroblockIterator::new(usize::from(image.width), usize::from(image.height));
    let total = it.mb_w * it.mb_h;
    let mut mbs = Vec::with_capacity(total);
    let mut alpha_histogram = [0u32; 256];
    let mut alpha_sum = 0i64;
    let mut uv_alpha_sum = 0i64;

    loop {
        let px = it.import(image);
        let ws_y = it.luma_workspace();
        let ws_uv = it.chroma_workspaces();

        let (luma_alpha, is_i16) = if method <= 1 {
            (0, fast_is_i16(&px, quality))
        } else {
            (best_intra16_alpha(&ws_y, &px, it.x, it.y), true)
        };
        let (uv_alpha, uv_mode) = best_uv_alpha(&ws_uv, &px, it.x, it.y);

        let alpha = final_alpha_value((3 * luma_alpha + uv_alpha + 2) >> 2);
        alpha_histogram[usize::from(alpha)] += 1;
        alpha_sum += i64::from(alpha);
        uv_alpha_sum += i64::from(uv_alpha);
        mbs.push(MbAnalysis {
            alpha,
            segment: 0,
            hint: ModeHint { is_i16, uv_mode },
        });

        // analysis predicts from source neighbours
        it.save_boundary(&px);
        if !it.next() {
            break;
        }
    }

    let mut analysis = FrameAnalysis {
        mbs,
        alpha_histogram,
        alpha_avg: (alpha_sum / total as i64) as i32,
        uv_alpha_avg: (uv_alpha_sum / total as i64) as i32,
        num_segments: 1,
        segment_alphas: vec![(0, 0)],
    };
    analysis.assign_segments(num_segments, method >= 5, it.mb_w, it.mb_h);
    analysis
}

impl FrameAnalysis {
    /// Clusters the alphas and assigns each macroblock its segment.
    ///
    /// With `smooth`, isolated segment ids are replaced by the majority of
    /// their neighbours.
    pub fn assign_segments(
        &mut self,
        num_segments: usize,
        smooth: bool,
        mb_w: usize,
        mb_h: usize,
    ) {
        let nb = num_segments.clamp(1, MAX_SEGMENTS);
        let clustering = assign_segments(&self.alpha_histogram, nb);
        let mut map: Vec<u8> = self
            .mbs
            .iter()
            .map(|mb| clustering.map[usize::from(mb.alpha)])
            .collect();
        if smooth && nb > 1 {
            smooth_segment_map(&mut map, mb_w, mb_h);
        }
        for (mb, &segment) in self.mbs.iter_mut().zip(&map) {
            mb.segment = segment;
        }
        self.num_segments = nb;
        self.segment_alphas =
            segment_alphas(&clustering.centers[..nb], clustering.weighted_average);
        log::debug!(
            "segmentation: {} segments after {} k-means rounds, centers {:?}, alpha/beta {:?}",
            nb,
            clustering.iterations,
            &clustering.centers[..nb],
            self.segment_alphas,
        );
    }

    /// Number of macroblocks in each segment.
    pub fn segment_counts(&self) -> [u32; MAX_SEGMENTS] {
        let mut counts = [0u32; MAX_SEGMENTS];
        for mb in &self.mbs {
            counts[usize::from(mb.segment)] += 1;
        }
        counts
    }
}
