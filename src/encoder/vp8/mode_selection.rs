//! Intra prediction mode selection.
//!
//! Full search reconstructs every candidate and keeps the one with the lowest
//! `(R + H) * lambda + RD_DISTO_MULT * (D + SD)`. The whole-block luma modes
//! are tried first; subblock prediction must then beat their score (plus a
//! header-bit budget) block by block, and chroma is chosen independently.
//! Low effort settings rank candidates by prediction error alone and only
//! reconstruct the winner.

use crate::common::prediction::{CHROMA_BLOCK_SIZE, LUMA_BLOCK_SIZE, LUMA_STRIDE};
use crate::common::types::{BlockMode, ChromaMode, IntraMode, LumaMode, KEYFRAME_YMODE_PROBS};
use crate::encoder::analysis::iterator::{MacroblockIterator, MacroblockPixels, UV_STRIDE, Y_STRIDE};
use crate::encoder::cost::{
    calc_i4_penalty, calc_lambda_i16, calc_lambda_i4, calc_lambda_mode, calc_lambda_uv,
    calc_tlambda, is_flat, is_flat_source_16, mult_8b, sse, tdisto_16x16, tdisto_4x4, ModeScore,
    ProbaModel, FLATNESS_LIMIT_I16, FLATNESS_LIMIT_I4, FLATNESS_LIMIT_UV, FLATNESS_PENALTY,
    LAMBDA_I16, LAMBDA_I4, LAMBDA_UV, MAX_COST, RD_DISTO_MULT, WEIGHT_Y,
};
use crate::encoder::quantize::SegmentMatrices;
use crate::encoder::residual_cost::{cost_luma16, cost_luma4, cost_uv};
use crate::encoder::tables::{bit_cost, FIXED_COSTS_I16, FIXED_COSTS_I4, FIXED_COSTS_UV};

use super::prediction::{
    chroma_prediction, luma16_prediction, reconstruct_intra16, reconstruct_intra4, reconstruct_uv,
    store_subblock, subblock_prediction_at,
};

/// Quantizers, lambdas and filter bookkeeping of one segment.
#[derive(Clone, Debug)]
pub(crate) struct SegmentInfo {
    /// Quantizer index.
    pub quant: u8,
    /// Loop filter level.
    pub fstrength: u8,
    /// Position of the segment in the complexity spread, 0..=255.
    pub beta: u8,
    pub matrices: SegmentMatrices,
    pub lambda_i16: u32,
    pub lambda_i4: u32,
    pub lambda_uv: u32,
    pub lambda_mode: u32,
    /// Weight of the spectral distortion; zero turns it off.
    pub tlambda: u32,
    pub i4_penalty: i64,
    /// Whole-block distortion above which DC-only blocks count as blocky.
    pub min_disto: i64,
    /// Largest DC step seen between neighbouring subblocks of a blocky
    /// macroblock.
    pub max_edge: i32,
}

impl SegmentInfo {
    /// Derives lambdas from the segment's averaged quantizer steps.
    ///
    /// `tlambda_scale` is the spatial noise shaping strength at methods that
    /// weigh spectral distortion, zero otherwise.
    pub(crate) fn new(quant: u8, beta: u8, matrices: SegmentMatrices, tlambda_scale: u32) -> Self {
        let q_i4 = matrices.y1.average_q();
        let q_i16 = matrices.y2.average_q();
        let q_uv = matrices.uv.average_q();
        Self {
            quant,
            fstrength: 0,
            beta,
            lambda_i16: calc_lambda_i16(q_i16),
            lambda_i4: calc_lambda_i4(q_i4),
            lambda_uv: calc_lambda_uv(q_uv),
            lambda_mode: calc_lambda_mode(q_i4),
            tlambda: calc_tlambda(tlambda_scale, q_i4),
            i4_penalty: calc_i4_penalty(q_i4) as i64,
            min_disto: 20 * i64::from(matrices.y1.q[0]),
            max_edge: 0,
            matrices,
        }
    }

    // The first AC levels of the Y2 block measure the DC steps between
    // neighbouring subblocks.
    fn store_max_delta(&mut self, dc_levels: &[i32; 16]) {
        let v = dc_levels[1].abs().max(dc_levels[2].abs()).max(dc_levels[4].abs());
        self.max_edge = self.max_edge.max(v);
    }
}

/// How a macroblock's modes are searched.
#[derive(Clone, Copy, Debug)]
pub(crate) struct SearchParams {
    /// Full rate-distortion search instead of distortion-only refinement.
    pub rd_opt: bool,
    /// Whether subblock prediction is considered against whole-block modes.
    pub try_i4: bool,
    /// Whether the distortion-only path re-picks the chroma mode.
    pub refine_uv: bool,
    /// Subblock mode header budget in 1/256 bit; zero disables subblock
    /// prediction in the full search.
    pub max_i4_header_bits: i64,
    /// Header budget of the distortion-only path.
    pub mb_header_limit: i64,
}

/// Modes suggested by the analysis pass, used when the distortion-only path
/// does not search them.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ModeHint {
    pub is_i16: bool,
    pub uv_mode: ChromaMode,
}

impl Default for ModeHint {
    fn default() -> Self {
        Self {
            is_i16: true,
            uv_mode: ChromaMode::DC,
        }
    }
}

/// Neighbourhood of the current macroblock, captured before the search.
pub(crate) struct MbContext {
    pub x: usize,
    pub y: usize,
    pub ws_y: [u8; LUMA_BLOCK_SIZE],
    pub ws_uv: [[u8; CHROMA_BLOCK_SIZE]; 2],
    pub top_nz: [u8; 9],
    pub left_nz: [u8; 9],
    pub top_modes: [IntraMode; 4],
    pub left_modes: [IntraMode; 4],
}

impl MbContext {
    /// Reloads the iterator's non-zero context and snapshots the borders.
    pub(crate) fn capture(it: &mut MacroblockIterator) -> Self {
        it.nz_to_bytes();
        let (top_modes, left_modes) = it.mode_context();
        Self {
            x: it.x,
            y: it.y,
            ws_y: it.luma_workspace(),
            ws_uv: it.chroma_workspaces(),
            top_nz: it.top_nz,
            left_nz: it.left_nz,
            top_modes,
            left_modes,
        }
    }

    fn subblock_mode_costs(&self, modes: &[IntraMode; 16], i: usize) -> &'static [u16; 10] {
        let (bx, by) = (i % 4, i / 4);
        let top = if by == 0 { self.top_modes[bx] } else { modes[i - 4] };
        let left = if bx == 0 { self.left_modes[by] } else { modes[i - 1] };
        &FIXED_COSTS_I4[top as usize][left as usize]
    }
}

/// Running minimum over scored candidates. Ties keep the earlier candidate.
pub(crate) struct BestCandidate<T> {
    best: Option<(ModeScore, T)>,
}

impl<T> BestCandidate<T> {
    pub(crate) fn new() -> Self {
        Self { best: None }
    }

    /// Keeps `candidate` if its score beats the best so far.
    pub(crate) fn offer(&mut self, score: ModeScore, candidate: T) {
        if self.best.as_ref().map_or(true, |(best, _)| score.score < best.score) {
            self.best = Some((score, candidate));
        }
    }

    pub(crate) fn into_inner(self) -> Option<(ModeScore, T)> {
        self.best
    }
}

/// Result of mode decision for one macroblock.
pub(crate) struct MacroblockDecision {
    /// Chosen modes, levels and score terms.
    pub rd: ModeScore,
    /// Reconstruction the decoder will produce.
    pub recon: MacroblockPixels,
}

impl MacroblockDecision {
    /// Whether the macroblock has no coefficient to code.
    pub(crate) fn is_skipped(&self) -> bool {
        self.rd.nz == 0
    }
}

/// Whole-block luma search. Returns the best score, rescored with the mode
/// lambda so it can be compared against subblock prediction, and its
/// reconstruction.
pub(crate) fn pick_best_intra16(
    ctx: &MbContext,
    src: &MacroblockPixels,
    seg: &mut SegmentInfo,
    model: &ProbaModel,
) -> (ModeScore, [u8; 256]) {
    let mut flat = is_flat_source_16(&src.y, Y_STRIDE);
    let mut best = BestCandidate::new();
    for (mode, block) in LumaMode::I16.into_iter().zip(BlockMode::ALL) {
        let pred = luma16_prediction(&ctx.ws_y, block, ctx.x, ctx.y);
        let recon = reconstruct_intra16(&src.y, &pred, &seg.matrices);

        let mut rd = ModeScore::new();
        rd.mode_i16 = mode;
        rd.nz = recon.nz;
        rd.y_dc_levels = recon.dc_levels;
        rd.y_ac_levels = recon.ac_levels;
        rd.d = i64::from(sse(&src.y, Y_STRIDE, &recon.pixels, Y_STRIDE, 16, 16));
        if seg.tlambda > 0 {
            let disto = tdisto_16x16(&src.y, Y_STRIDE, &recon.pixels, Y_STRIDE, &WEIGHT_Y);
            rd.sd = mult_8b(seg.tlambda, disto as u32);
        }
        rd.h = i64::from(FIXED_COSTS_I16[mode as usize]);
        rd.r = i64::from(cost_luma16(
            &rd.y_dc_levels,
            &rd.y_ac_levels,
            ctx.top_nz,
            ctx.left_nz,
            &model.level_costs,
            &model.coeffs,
        ));
        if flat {
            flat = is_flat(&rd.y_ac_levels, FLATNESS_LIMIT_I16);
            if flat {
                rd.d *= 2;
                rd.sd *= 2;
            }
        }
        rd.set_rd_score(seg.lambda_i16);
        best.offer(rd, recon.pixels);
    }

    let Some((mut rd, pixels)) = best.into_inner() else {
        unreachable!("four candidates were scored");
    };
    rd.set_rd_score(seg.lambda_mode);

    // DC-only with a high distortion: remember the steps for the filter
    if rd.nz & 0x100_ffff == 0x100_0000 && rd.d > seg.min_disto {
        seg.store_max_delta(&rd.y_dc_levels);
    }
    (rd, pixels)
}

/// Subblock luma search. Replaces `rd` and `recon_y` and returns `true`
/// when it beats the whole-block score already in `rd`.
pub(crate) fn pick_best_intra4(
    ctx: &MbContext,
    src: &MacroblockPixels,
    seg: &SegmentInfo,
    model: &ProbaModel,
    max_header_bits: i64,
    rd: &mut ModeScore,
    recon_y: &mut [u8; 256],
) -> bool {
    if max_header_bits == 0 {
        return false;
    }

    let mut rd_best = ModeScore::new();
    rd_best.init_score();
    rd_best.h = i64::from(bit_cost(false, KEYFRAME_YMODE_PROBS[0]));
    rd_best.set_rd_score(seg.lambda_mode);

    let mut ws = ctx.ws_y;
    let mut top_nz = ctx.top_nz;
    let mut left_nz = ctx.left_nz;
    let mut modes = [IntraMode::DC; 16];
    let mut levels = [[0i32; 16]; 16];
    let mut total_header_bits = 0i64;

    for i in 0..16 {
        let (bx, by) = (i % 4, i / 4);
        let src_block = &src.y[by * 4 * Y_STRIDE + bx * 4..];
        let mode_costs = ctx.subblock_mode_costs(&modes, i);
        let nz_ctx = usize::from(top_nz[bx] + left_nz[by]);

        let mut best: Option<(ModeScore, IntraMode, [u8; 16], [i32; 16])> = None;
        for mode in IntraMode::ALL {
            let pred = subblock_prediction_at(&ws, mode, bx, by);
            let recon = reconstruct_intra4(src_block, &pred, &seg.matrices.y1);

            let mut tmp = ModeScore::new();
            tmp.nz = u32::from(recon.nz) << i;
            tmp.d = i64::from(sse(src_block, Y_STRIDE, &recon.pixels, 4, 4, 4));
            if seg.tlambda > 0 {
                let disto = tdisto_4x4(src_block, Y_STRIDE, &recon.pixels, 4, &WEIGHT_Y);
                tmp.sd = mult_8b(seg.tlambda, disto as u32);
            }
            tmp.h = i64::from(mode_costs[mode as usize]);
            tmp.r = if mode != IntraMode::DC
                && is_flat(core::slice::from_ref(&recon.levels), FLATNESS_LIMIT_I4)
            {
                i64::from(FLATNESS_PENALTY)
            } else {
                0
            };

            // early out before costing the coefficients
            tmp.set_rd_score(seg.lambda_i4);
            if best.as_ref().is_some_and(|(b, ..)| tmp.score >= b.score) {
                continue;
            }
            tmp.r += i64::from(cost_luma4(
                &recon.levels,
                nz_ctx,
                &model.level_costs,
                &model.coeffs,
            ));
            tmp.set_rd_score(seg.lambda_i4);
            if best.as_ref().map_or(true, |(b, ..)| tmp.score < b.score) {
                best = Some((tmp, mode, recon.pixels, recon.levels));
            }
        }

        let Some((mut rd_i4, mode, pixels, block_levels)) = best else {
            unreachable!("ten candidates were scored");
        };
        rd_i4.set_rd_score(seg.lambda_mode);
        rd_best.add_score(&rd_i4);
        if rd_best.score >= rd.score {
            return false;
        }
        total_header_bits += rd_i4.h;
        if total_header_bits > max_header_bits {
            return false;
        }

        store_subblock(&mut ws, &pixels, bx, by);
        modes[i] = mode;
        levels[i] = block_levels;
        let nz = u8::from(rd_i4.nz != 0);
        top_nz[bx] = nz;
        left_nz[by] = nz;
    }

    rd.copy_score(&rd_best);
    rd.mode_i16 = LumaMode::B;
    rd.modes_i4 = modes;
    rd.y_ac_levels = levels;
    copy_luma(&ws, recon_y);
    true
}

/// Chroma search. Adds the winner's terms to `rd` and returns its
/// reconstruction.
pub(crate) fn pick_best_uv(
    ctx: &MbContext,
    src: &MacroblockPixels,
    seg: &SegmentInfo,
    model: &ProbaModel,
    rd: &mut ModeScore,
) -> ([u8; 64], [u8; 64]) {
    let mut best = BestCandidate::new();
    for mode in ChromaMode::ALL {
        let pu = chroma_prediction(&ctx.ws_uv[0], mode.into(), ctx.x, ctx.y);
        let pv = chroma_prediction(&ctx.ws_uv[1], mode.into(), ctx.x, ctx.y);
        let recon = reconstruct_uv([&src.u, &src.v], [&pu, &pv], &seg.matrices.uv);

        let mut tmp = ModeScore::new();
        tmp.nz = recon.nz;
        tmp.d = i64::from(
            sse(&src.u, UV_STRIDE, &recon.u, UV_STRIDE, 8, 8)
                + sse(&src.v, UV_STRIDE, &recon.v, UV_STRIDE, 8, 8),
        );
        // no spectral term: it tends to flatten chroma
        tmp.h = i64::from(FIXED_COSTS_UV[mode as usize]);
        tmp.r = i64::from(cost_uv(
            &recon.levels,
            ctx.top_nz,
            ctx.left_nz,
            &model.level_costs,
            &model.coeffs,
        ));
        if mode != ChromaMode::DC && is_flat(&recon.levels, FLATNESS_LIMIT_UV) {
            tmp.r += i64::from(FLATNESS_PENALTY) * 8;
        }
        tmp.set_rd_score(seg.lambda_uv);
        tmp.uv_levels = recon.levels;
        best.offer(tmp, (mode, recon.u, recon.v));
    }

    let Some((best, (mode, u, v))) = best.into_inner() else {
        unreachable!("four candidates were scored");
    };
    rd.mode_uv = mode;
    rd.uv_levels = best.uv_levels;
    rd.add_score(&best);
    (u, v)
}

/// Distortion-only mode choice for low effort settings.
///
/// Modes are ranked by prediction error plus a fixed lambda times their
/// header cost; subblock prediction carries a flat penalty instead of its
/// coefficient rate. Only the winner is quantized, so `rd` ends up with the
/// levels, non-zero flags and score, but no rate terms.
pub(crate) fn refine_using_distortion(
    ctx: &MbContext,
    src: &MacroblockPixels,
    seg: &SegmentInfo,
    params: &SearchParams,
    hint: ModeHint,
    rd: &mut ModeScore,
) -> MacroblockPixels {
    let mut try_both = params.try_i4;
    let mut is_i16 = try_both || hint.is_i16;
    let bit_limit = if try_both {
        params.mb_header_limit
    } else {
        MAX_COST
    };
    let mut best_score = MAX_COST;
    let mut i16_mode = (LumaMode::DC, BlockMode::DC);
    let mut recon = MacroblockPixels::default();
    let mut nz = 0u32;

    if is_i16 {
        for (mode, block) in LumaMode::I16.into_iter().zip(BlockMode::ALL) {
            let header = i64::from(FIXED_COSTS_I16[mode as usize]);
            if mode != LumaMode::DC && header > bit_limit {
                continue;
            }
            let pred = luma16_prediction(&ctx.ws_y, block, ctx.x, ctx.y);
            let score = i64::from(sse(&src.y, Y_STRIDE, &pred, Y_STRIDE, 16, 16)) * RD_DISTO_MULT
                + header * i64::from(LAMBDA_I16);
            if score < best_score {
                best_score = score;
                i16_mode = (mode, block);
            }
        }
        // flat border blocks would start a checkerboard resonance
        if (ctx.x == 0 || ctx.y == 0) && is_flat_source_16(&src.y, Y_STRIDE) {
            i16_mode = if ctx.x == 0 {
                (LumaMode::DC, BlockMode::DC)
            } else {
                (LumaMode::V, BlockMode::V)
            };
            try_both = false;
        }
    }

    if try_both || !is_i16 {
        is_i16 = false;
        let mut ws = ctx.ws_y;
        let mut modes = [IntraMode::DC; 16];
        let mut score_i4 = seg.i4_penalty;
        let mut i4_bit_sum = 0i64;
        for i in 0..16 {
            let (bx, by) = (i % 4, i / 4);
            let src_block = &src.y[by * 4 * Y_STRIDE + bx * 4..];
            let mode_costs = ctx.subblock_mode_costs(&modes, i);
            let mut best: Option<(i64, IntraMode, [u8; 16])> = None;
            for mode in IntraMode::ALL {
                let pred = subblock_prediction_at(&ws, mode, bx, by);
                let score = i64::from(sse(src_block, Y_STRIDE, &pred, 4, 4, 4)) * RD_DISTO_MULT
                    + i64::from(mode_costs[mode as usize]) * i64::from(LAMBDA_I4);
                if best.as_ref().map_or(true, |(s, ..)| score < *s) {
                    best = Some((score, mode, pred));
                }
            }
            let Some((score, mode, pred)) = best else {
                unreachable!("ten candidates were scored");
            };
            i4_bit_sum += i64::from(mode_costs[mode as usize]);
            modes[i] = mode;
            score_i4 += score;
            if score_i4 >= best_score || i4_bit_sum > bit_limit {
                is_i16 = true;
                break;
            }
            let r = reconstruct_intra4(src_block, &pred, &seg.matrices.y1);
            nz |= u32::from(r.nz) << i;
            rd.y_ac_levels[i] = r.levels;
            store_subblock(&mut ws, &r.pixels, bx, by);
        }
        if !is_i16 {
            rd.mode_i16 = LumaMode::B;
            rd.modes_i4 = modes;
            best_score = score_i4;
            copy_luma(&ws, &mut recon.y);
        }
    }

    if is_i16 {
        let (mode, block) = i16_mode;
        let pred = luma16_prediction(&ctx.ws_y, block, ctx.x, ctx.y);
        let r = reconstruct_intra16(&src.y, &pred, &seg.matrices);
        rd.mode_i16 = mode;
        rd.y_dc_levels = r.dc_levels;
        rd.y_ac_levels = r.ac_levels;
        nz = r.nz;
        recon.y = r.pixels;
    }

    rd.mode_uv = if params.refine_uv {
        let mut best = (MAX_COST, ChromaMode::DC);
        for mode in ChromaMode::ALL {
            let pu = chroma_prediction(&ctx.ws_uv[0], mode.into(), ctx.x, ctx.y);
            let pv = chroma_prediction(&ctx.ws_uv[1], mode.into(), ctx.x, ctx.y);
            let d = sse(&src.u, UV_STRIDE, &pu, UV_STRIDE, 8, 8)
                + sse(&src.v, UV_STRIDE, &pv, UV_STRIDE, 8, 8);
            let score = i64::from(d) * RD_DISTO_MULT
                + i64::from(FIXED_COSTS_UV[mode as usize]) * i64::from(LAMBDA_UV);
            if score < best.0 {
                best = (score, mode);
            }
        }
        best.1
    } else {
        hint.uv_mode
    };
    let pu = chroma_prediction(&ctx.ws_uv[0], rd.mode_uv.into(), ctx.x, ctx.y);
    let pv = chroma_prediction(&ctx.ws_uv[1], rd.mode_uv.into(), ctx.x, ctx.y);
    let uv = reconstruct_uv([&src.u, &src.v], [&pu, &pv], &seg.matrices.uv);
    rd.uv_levels = uv.levels;
    recon.u = uv.u;
    recon.v = uv.v;

    rd.nz = nz | uv.nz;
    rd.score = best_score;
    recon
}

fn copy_luma(ws: &[u8; LUMA_BLOCK_SIZE], out: &mut [u8; 256]) {
    for (row, dst) in ws.chunks_exact(LUMA_STRIDE).skip(1).zip(out.chunks_exact_mut(Y_STRIDE)) {
        dst.copy_from_slice(&row[1..17]);
    }
}

/// Chooses the modes of the current macroblock and quantizes its residuals.
pub(crate) fn decimate(
    it: &mut MacroblockIterator,
    src: &MacroblockPixels,
    seg: &mut SegmentInfo,
    model: &ProbaModel,
    params: &SearchParams,
    hint: ModeHint,
) -> MacroblockDecision {
    let ctx = MbContext::capture(it);
    if params.rd_opt {
        let (mut rd, mut y) = pick_best_intra16(&ctx, src, seg, model);
        if params.try_i4 {
            pick_best_intra4(&ctx, src, seg, model, params.max_i4_header_bits, &mut rd, &mut y);
        }
        let (u, v) = pick_best_uv(&ctx, src, seg, model, &mut rd);
        MacroblockDecision {
            rd,
            recon: MacroblockPixels { y, u, v },
        }
    } else {
        let mut rd = ModeScore::new();
        rd.init_score();
        let recon = refine_using_distortion(&ctx, src, seg, params, hint, &mut rd);
        MacroblockDecision { rd, recon }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::{QuantDeltas, Segment};
    use crate::encoder::api::YuvImage;

    fn segment(q: i32, sns: u32) -> SegmentInfo {
        let matrices = SegmentMatrices::from_segment(&Segment::from_index(q, &QuantDeltas::default()));
        SegmentInfo::new(q as u8, 0, matrices, sns)
    }

    fn full_search() -> SearchParams {
        SearchParams {
            rd_opt: true,
            try_i4: true,
            refine_uv: true,
            max_i4_header_bits: 256 * 16 * 16,
            mb_header_limit: MAX_COST,
        }
    }

    fn first_macroblock(y: &[u8], u: &[u8], v: &[u8]) -> (MacroblockIterator, MacroblockPixels) {
        let image = YuvImage::new(16, 16, y, u, v);
        let it = MacroblockIterator::new(16, 16);
        let px = it.import(&image);
        (it, px)
    }

    #[test]
    fn best_candidate_minimizes_the_rd_score() {
        // (sse, rate bits) of three synthetic predictions
        let lambda = 10;
        let candidates = [("dc", 4000, 120), ("v", 2500, 400), ("h", 2600, 300)];
        let mut best = BestCandidate::new();
        let mut scores = [0i64; 3];
        for (i, &(name, d, r)) in candidates.iter().enumerate() {
            let mut s = ModeScore::new();
            s.d = d;
            s.r = r;
            s.set_rd_score(lambda);
            scores[i] = s.score;
            best.offer(s, name);
        }
        let (score, name) = best.into_inner().unwrap();
        // 400*10 + 256*2500 beats 300*10 + 256*2600 and 120*10 + 256*4000
        assert_eq!(name, "v");
        assert!(scores.iter().all(|&s| score.score <= s));
    }

    #[test]
    fn ties_keep_the_first_candidate() {
        let mut best = BestCandidate::new();
        for name in ["first", "second"] {
            let mut s = ModeScore::new();
            s.d = 10;
            s.set_rd_score(1);
            best.offer(s, name);
        }
        assert_eq!(best.into_inner().unwrap().1, "first");
    }

    #[test]
    fn flat_grey_macroblock_is_dc_and_skipped() {
        let y = [128u8; 256];
        let uv = [128u8; 64];
        let (mut it, px) = first_macroblock(&y, &uv, &uv);
        let mut seg = segment(20, 0);
        let model = ProbaModel::new();
        let decision = decimate(&mut it, &px, &mut seg, &model, &full_search(), ModeHint::default());
        assert_eq!(decision.rd.mode_i16, LumaMode::DC);
        assert_eq!(decision.rd.mode_uv, ChromaMode::DC);
        assert!(decision.is_skipped());
        assert_eq!(decision.recon.y, [128; 256]);
        assert_eq!(decision.recon.u, [128; 64]);
    }

    #[test]
    fn vertical_stripes_pick_a_subblock_or_vertical_mode() {
        // stripes only predictable from above once the first row is coded
        let y: Vec<u8> = (0..256).map(|i| if (i % 16) / 2 % 2 == 0 { 40 } else { 210 }).collect();
        let uv = [128u8; 64];
        let (mut it, px) = first_macroblock(&y, &uv, &uv);
        let mut seg = segment(30, 50);
        let model = ProbaModel::new();
        let decision = decimate(&mut it, &px, &mut seg, &model, &full_search(), ModeHint::default());
        assert!(!decision.is_skipped());
        let err = sse(&px.y, 16, &decision.recon.y, 16, 16, 16);
        let flat = sse(&px.y, 16, &[128u8; 256], 16, 16, 16);
        assert!(err < flat / 4, "{err} vs {flat}");
    }

    #[test]
    fn subblock_search_respects_the_header_budget() {
        let y: Vec<u8> = (0..256).map(|i| ((i * 37) % 251) as u8).collect();
        let uv = [100u8; 64];
        let (mut it, px) = first_macroblock(&y, &uv, &uv);
        let ctx = MbContext::capture(&mut it);
        let seg = segment(10, 0);
        let model = ProbaModel::new();
        let mut rd = ModeScore::new();
        rd.score = MAX_COST;
        let mut recon = [0u8; 256];
        assert!(!pick_best_intra4(&ctx, &px, &seg, &model, 0, &mut rd, &mut recon));
        assert!(!pick_best_intra4(&ctx, &px, &seg, &model, 1, &mut rd, &mut recon));
        assert!(pick_best_intra4(&ctx, &px, &seg, &model, i64::MAX, &mut rd, &mut recon));
        assert!(rd.is_i4());
    }

    #[test]
    fn distortion_only_path_reconstructs_the_winner() {
        let y: Vec<u8> = (0..256).map(|i| (i / 16 * 12) as u8).collect();
        let u = [90u8; 64];
        let v = [160u8; 64];
        let (mut it, px) = first_macroblock(&y, &u, &v);
        let mut seg = segment(20, 0);
        let model = ProbaModel::new();
        let params = SearchParams {
            rd_opt: false,
            try_i4: true,
            refine_uv: true,
            max_i4_header_bits: 0,
            mb_header_limit: MAX_COST,
        };
        let d = decimate(&mut it, &px, &mut seg, &model, &params, ModeHint::default());
        assert!(d.rd.score < MAX_COST);
        assert_eq!((d.rd.r, d.rd.h), (0, 0));
        for (a, b) in d.recon.u.iter().zip(&px.u) {
            assert!(a.abs_diff(*b) <= 3);
        }
        let err = sse(&px.y, 16, &d.recon.y, 16, 16, 16);
        assert!(err < 256 * 64, "{err}");
    }

    #[test]
    fn blocky_dc_macroblocks_record_their_edge() {
        let mut seg = segment(40, 0);
        let mut levels = [0i32; 16];
        levels[1] = -7;
        levels[2] = 3;
        levels[4] = 5;
        seg.store_max_delta(&levels);
        assert_eq!(seg.max_edge, 7);
        levels[1] = 1;
        seg.store_max_delta(&levels);
        assert_eq!(seg.max_edge, 7);
    }
}
