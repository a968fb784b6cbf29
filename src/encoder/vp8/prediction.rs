//! Trial reconstruction of prediction candidates.
//!
//! Each candidate is predicted from the bordered workspace the decoder will
//! rebuild, its residual transformed and quantized, and the quantized levels
//! transformed back onto the prediction. The reconstruction is bit-exact
//! with the decoder's, so it can seed the prediction of later blocks.

use crate::common::prediction::{
    add_residue, predict_block, subblock_prediction, Edges, SubblockEdges, CHROMA_BLOCK_SIZE,
    CHROMA_STRIDE, LUMA_BLOCK_SIZE, LUMA_STRIDE,
};
use crate::common::transform::{dct4x4, idct4x4_dispatch, iwht4x4, residual4x4, wht4x4, IdctKind};
use crate::common::types::{BlockMode, IntraMode};
use crate::encoder::analysis::iterator::{UV_STRIDE, Y_STRIDE};
use crate::encoder::quantize::{QuantMatrix, SegmentMatrices};

/// Whole-block luma prediction, `Y_STRIDE` wide.
pub(crate) fn luma16_prediction(
    ws: &[u8; LUMA_BLOCK_SIZE],
    mode: BlockMode,
    mbx: usize,
    mby: usize,
) -> [u8; 256] {
    let edges = Edges::<16>::from_workspace(ws, 1, 1, LUMA_STRIDE, mby > 0, mbx > 0);
    let mut out = [0u8; 256];
    predict_block(mode, &edges, &mut out, Y_STRIDE);
    out
}

/// Chroma prediction of one plane, `UV_STRIDE` wide.
pub(crate) fn chroma_prediction(
    ws: &[u8; CHROMA_BLOCK_SIZE],
    mode: BlockMode,
    mbx: usize,
    mby: usize,
) -> [u8; 64] {
    let edges = Edges::<8>::from_workspace(ws, 1, 1, CHROMA_STRIDE, mby > 0, mbx > 0);
    let mut out = [0u8; 64];
    predict_block(mode, &edges, &mut out, UV_STRIDE);
    out
}

/// Prediction of the subblock at `(bx, by)` of a luma workspace that holds
/// the reconstruction of the subblocks before it.
pub(crate) fn subblock_prediction_at(
    ws: &[u8; LUMA_BLOCK_SIZE],
    mode: IntraMode,
    bx: usize,
    by: usize,
) -> [u8; 16] {
    let edges = SubblockEdges::from_workspace(ws, 1 + bx * 4, 1 + by * 4, LUMA_STRIDE);
    subblock_prediction(mode, &edges)
}

/// Writes a reconstructed 4x4 subblock into a luma workspace.
pub(crate) fn store_subblock(ws: &mut [u8; LUMA_BLOCK_SIZE], block: &[u8; 16], bx: usize, by: usize) {
    for (y, row) in block.chunks_exact(4).enumerate() {
        let start = (1 + by * 4 + y) * LUMA_STRIDE + 1 + bx * 4;
        ws[start..start + 4].copy_from_slice(row);
    }
}

// Inverse transforms `coeffs` onto the 4x4 prediction at `(x0, y0)` of `out`.
fn add_block(out: &mut [u8], coeffs: &mut [i32; 16], y0: usize, x0: usize, stride: usize) {
    let kind = IdctKind::of(coeffs);
    if kind != IdctKind::None {
        idct4x4_dispatch(coeffs, kind);
        add_residue(out, coeffs, y0, x0, stride);
    }
}

/// Levels and reconstruction of a whole-block luma candidate.
#[derive(Clone, Debug)]
pub(crate) struct Luma16Recon {
    /// Y2 levels, zigzag order.
    pub dc_levels: [i32; 16],
    /// AC levels per subblock, zigzag order; position 0 is always zero.
    pub ac_levels: [[i32; 16]; 16],
    /// Reconstructed samples, `Y_STRIDE` wide.
    pub pixels: [u8; 256],
    /// Packed non-zero flags: bit n for subblock n, bit 24 for Y2.
    pub nz: u32,
}

/// Transforms and quantizes `src - pred` with a second-order DC transform.
pub(crate) fn reconstruct_intra16(
    src: &[u8; 256],
    pred: &[u8; 256],
    mats: &SegmentMatrices,
) -> Luma16Recon {
    let mut coeffs = [[0i32; 16]; 16];
    for (n, block) in coeffs.iter_mut().enumerate() {
        let off = (n / 4) * 4 * Y_STRIDE + (n % 4) * 4;
        *block = residual4x4(&src[off..], Y_STRIDE, &pred[off..], Y_STRIDE);
        dct4x4(block);
    }

    let mut dc: [i32; 16] = core::array::from_fn(|n| coeffs[n][0]);
    wht4x4(&mut dc);
    let mut dc_levels = [0i32; 16];
    let mut nz = u32::from(mats.y2.quantize_block(&mut dc, &mut dc_levels)) << 24;

    let mut ac_levels = [[0i32; 16]; 16];
    for (n, block) in coeffs.iter_mut().enumerate() {
        block[0] = 0;
        nz |= u32::from(mats.y1.quantize_block(block, &mut ac_levels[n])) << n;
    }

    iwht4x4(&mut dc);
    let mut pixels = *pred;
    for (n, block) in coeffs.iter_mut().enumerate() {
        block[0] = dc[n];
        add_block(&mut pixels, block, (n / 4) * 4, (n % 4) * 4, Y_STRIDE);
    }

    Luma16Recon {
        dc_levels,
        ac_levels,
        pixels,
        nz,
    }
}

/// Levels and reconstruction of one 4x4 luma candidate.
#[derive(Clone, Copy, Debug)]
pub(crate) struct SubblockRecon {
    /// Levels, zigzag order.
    pub levels: [i32; 16],
    /// Reconstructed samples, row-major.
    pub pixels: [u8; 16],
    /// Whether any level is non-zero.
    pub nz: bool,
}

/// Transforms and quantizes one subblock residual.
///
/// `src` points at the subblock's first source sample, `Y_STRIDE` wide.
pub(crate) fn reconstruct_intra4(src: &[u8], pred: &[u8; 16], y1: &QuantMatrix) -> SubblockRecon {
    let mut block = residual4x4(src, Y_STRIDE, pred, 4);
    dct4x4(&mut block);
    let mut levels = [0i32; 16];
    let nz = y1.quantize_block(&mut block, &mut levels);
    let mut pixels = *pred;
    add_block(&mut pixels, &mut block, 0, 0, 4);
    SubblockRecon { levels, pixels, nz }
}

/// Levels and reconstruction of both chroma planes.
#[derive(Clone, Debug)]
pub(crate) struct ChromaRecon {
    /// Four U blocks then four V blocks, zigzag order.
    pub levels: [[i32; 16]; 8],
    /// Reconstructed Cb, `UV_STRIDE` wide.
    pub u: [u8; 64],
    /// Reconstructed Cr.
    pub v: [u8; 64],
    /// Packed non-zero flags, bits 16-23.
    pub nz: u32,
}

/// Transforms and quantizes the chroma residuals of a macroblock.
pub(crate) fn reconstruct_uv(
    src: [&[u8; 64]; 2],
    pred: [&[u8; 64]; 2],
    uv: &QuantMatrix,
) -> ChromaRecon {
    let mut levels = [[0i32; 16]; 8];
    let mut out = [*pred[0], *pred[1]];
    let mut nz = 0u32;
    for ch in 0..2 {
        for n in 0..4 {
            let off = (n / 2) * 4 * UV_STRIDE + (n % 2) * 4;
            let mut block = residual4x4(&src[ch][off..], UV_STRIDE, &pred[ch][off..], UV_STRIDE);
            dct4x4(&mut block);
            let idx = ch * 4 + n;
            nz |= u32::from(uv.quantize_block(&mut block, &mut levels[idx])) << idx;
            add_block(&mut out[ch], &mut block, (n / 2) * 4, (n % 2) * 4, UV_STRIDE);
        }
    }
    let [u, v] = out;
    ChromaRecon {
        levels,
        u,
        v,
        nz: nz << 16,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::prediction::{create_border_chroma, create_border_luma};
    use crate::common::types::{QuantDeltas, Segment};

    fn matrices(q: i32) -> SegmentMatrices {
        SegmentMatrices::from_segment(&Segment::from_index(q, &QuantDeltas::default()))
    }

    #[test]
    fn first_macroblock_predicts_from_fill_values() {
        let ws = create_border_luma(0, 0, 1, &[0; 16], &[0; 17]);
        assert_eq!(luma16_prediction(&ws, BlockMode::DC, 0, 0), [128; 256]);
        assert_eq!(luma16_prediction(&ws, BlockMode::V, 0, 0), [127; 256]);
        assert_eq!(luma16_prediction(&ws, BlockMode::H, 0, 0), [129; 256]);
        let cws = create_border_chroma(0, 0, &[0; 8], &[0; 9]);
        assert_eq!(chroma_prediction(&cws, BlockMode::TM, 0, 0), [129; 64]);
    }

    #[test]
    fn exact_prediction_codes_nothing() {
        let src = [128u8; 256];
        let r = reconstruct_intra16(&src, &src, &matrices(20));
        assert_eq!(r.nz, 0);
        assert_eq!(r.pixels, src);
        assert_eq!(r.dc_levels, [0; 16]);
    }

    #[test]
    fn flat_offset_travels_in_the_dc_block() {
        let src = [150u8; 256];
        let pred = [128u8; 256];
        let r = reconstruct_intra16(&src, &pred, &matrices(20));
        assert_eq!(r.nz, 1 << 24);
        assert_ne!(r.dc_levels[0], 0);
        assert!(r.ac_levels.iter().all(|b| b.iter().all(|&l| l == 0)));
        for &p in &r.pixels {
            assert!((i32::from(p) - 150).abs() <= 2, "{p}");
        }
    }

    #[test]
    fn subblock_reconstruction_tracks_the_source() {
        let src: [u8; 64] = core::array::from_fn(|i| (40 + (i % 16) * 9) as u8);
        let pred = [100u8; 16];
        let mats = matrices(0);
        let r = reconstruct_intra4(&src, &pred, &mats.y1);
        assert!(r.nz);
        for y in 0..4 {
            for x in 0..4 {
                let d = i32::from(r.pixels[y * 4 + x]) - i32::from(src[y * Y_STRIDE + x]);
                assert!(d.abs() <= 4, "({x},{y}) off by {d}");
            }
        }
    }

    #[test]
    fn chroma_flags_land_in_the_upper_bits() {
        let src_u = [200u8; 64];
        let src_v = [128u8; 64];
        let pred = [128u8; 64];
        let r = reconstruct_uv([&src_u, &src_v], [&pred, &pred], &matrices(30).uv);
        assert_eq!(r.nz, 0x000f_0000);
        assert_eq!(r.v, pred);
        assert!(r.levels[4..].iter().all(|b| *b == [0; 16]));
    }

    #[test]
    fn stored_subblock_feeds_the_next_prediction() {
        let mut ws = create_border_luma(0, 0, 1, &[0; 16], &[0; 17]);
        let block: [u8; 16] = core::array::from_fn(|i| i as u8 * 10);
        store_subblock(&mut ws, &block, 0, 0);
        // HE of the block to the right copies its left column
        let pred = subblock_prediction_at(&ws, IntraMode::HE, 1, 0);
        let edges = SubblockEdges::from_workspace(&ws, 5, 1, LUMA_STRIDE);
        assert_eq!(edges.left, [30, 70, 110, 150]);
        assert_eq!(pred, subblock_prediction(IntraMode::HE, &edges));
    }
}
