//! Intra prediction shared by the decoder and the encoder.
//!
//! Predictors are pure: they read an edge record and write an `N x N` block
//! into a strided destination. Missing edges are represented by the format's
//! fixed fill values (127 above the frame, 129 left of it) so that V, H and TM
//! need no special cases; only DC looks at which edges really exist.
//!
//! The decoder keeps each macroblock in a bordered workspace (`LUMA_STRIDE`
//! wide, one border row and column), which [`create_border_luma`] and
//! [`create_border_chroma`] fill from the row caches.

use super::types::{BlockMode, IntraMode};

/// Luma workspace stride: 1 border pixel + 16 luma pixels + 4 top-right + padding.
pub(crate) const LUMA_STRIDE: usize = 32;
/// Luma workspace size: 17 rows (1 border + 16) × `LUMA_STRIDE`.
pub(crate) const LUMA_BLOCK_SIZE: usize = LUMA_STRIDE * (1 + 16);
/// Chroma workspace stride.
pub(crate) const CHROMA_STRIDE: usize = 32;
/// Chroma workspace size: 9 rows (1 border + 8) × `CHROMA_STRIDE`.
pub(crate) const CHROMA_BLOCK_SIZE: usize = CHROMA_STRIDE * (8 + 1);

/// Fill value for samples above the first macroblock row.
pub(crate) const TOP_FILL: u8 = 127;
/// Fill value for samples left of the first macroblock column.
pub(crate) const LEFT_FILL: u8 = 129;

/// Corner sample used when the real one is outside the frame.
#[inline]
pub(crate) fn corner_fill(mbx: usize, mby: usize) -> Option<u8> {
    if mby == 0 {
        Some(TOP_FILL)
    } else if mbx == 0 {
        Some(LEFT_FILL)
    } else {
        None
    }
}

/// Boundary samples of an `N x N` block.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Edges<const N: usize> {
    pub top_left: u8,
    pub top: [u8; N],
    pub left: [u8; N],
    pub has_top: bool,
    pub has_left: bool,
}

impl<const N: usize> Edges<N> {
    /// Edges with every sample replaced by the frame-border fill values.
    pub(crate) fn unavailable() -> Self {
        Edges {
            top_left: TOP_FILL,
            top: [TOP_FILL; N],
            left: [LEFT_FILL; N],
            has_top: false,
            has_left: false,
        }
    }

    /// Reads the edges of a block whose first pixel is at `(x0, y0)` in a
    /// bordered workspace.
    pub(crate) fn from_workspace(
        ws: &[u8],
        x0: usize,
        y0: usize,
        stride: usize,
        has_top: bool,
        has_left: bool,
    ) -> Self {
        let top_row = (y0 - 1) * stride;
        let mut top = [0u8; N];
        top.copy_from_slice(&ws[top_row + x0..][..N]);
        let left = core::array::from_fn(|i| ws[(y0 + i) * stride + x0 - 1]);
        Edges {
            top_left: ws[top_row + x0 - 1],
            top,
            left,
            has_top,
            has_left,
        }
    }

    fn dc(&self) -> u8 {
        let shift = N.trailing_zeros();
        let sum_top: u32 = self.top.iter().map(|&v| u32::from(v)).sum();
        let sum_left: u32 = self.left.iter().map(|&v| u32::from(v)).sum();
        match (self.has_top, self.has_left) {
            (true, true) => ((sum_top + sum_left + (1 << shift)) >> (shift + 1)) as u8,
            (true, false) => ((sum_top + (1 << (shift - 1))) >> shift) as u8,
            (false, true) => ((sum_left + (1 << (shift - 1))) >> shift) as u8,
            (false, false) => 128,
        }
    }
}

/// Writes the `N x N` prediction for `mode` into `out`.
pub(crate) fn predict_block<const N: usize>(
    mode: BlockMode,
    edges: &Edges<N>,
    out: &mut [u8],
    stride: usize,
) {
    let rows = out.chunks_mut(stride).take(N);
    match mode {
        BlockMode::DC => {
            let dc = edges.dc();
            rows.for_each(|row| row[..N].fill(dc));
        }
        BlockMode::V => rows.for_each(|row| row[..N].copy_from_slice(&edges.top)),
        BlockMode::H => rows
            .zip(edges.left)
            .for_each(|(row, left)| row[..N].fill(left)),
        BlockMode::TM => {
            let p = i32::from(edges.top_left);
            for (row, left) in rows.zip(edges.left) {
                let left_minus_p = i32::from(left) - p;
                for (cur, &abv) in row[..N].iter_mut().zip(&edges.top) {
                    *cur = (left_minus_p + i32::from(abv)).clamp(0, 255) as u8;
                }
            }
        }
    }
}

/// The 13 samples around a 4x4 subblock: corner, eight above (four of them
/// above-right) and four to the left.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct SubblockEdges {
    pub top_left: u8,
    pub top: [u8; 8],
    pub left: [u8; 4],
}

impl SubblockEdges {
    /// Reads the edges of the subblock at `(x0, y0)` in a bordered workspace.
    pub(crate) fn from_workspace(ws: &[u8], x0: usize, y0: usize, stride: usize) -> Self {
        let top_row = (y0 - 1) * stride;
        let mut top = [0u8; 8];
        top.copy_from_slice(&ws[top_row + x0..][..8]);
        SubblockEdges {
            top_left: ws[top_row + x0 - 1],
            top,
            left: core::array::from_fn(|i| ws[(y0 + i) * stride + x0 - 1]),
        }
    }

    /// Left column bottom-up, then the corner, then the row above:
    /// `[L3, L2, L1, L0, P, A0, A1, A2, A3]`.
    fn edge(&self) -> [u8; 9] {
        let [l0, l1, l2, l3] = self.left;
        let t = self.top;
        [l3, l2, l1, l0, self.top_left, t[0], t[1], t[2], t[3]]
    }
}

fn avg3(left: u8, this: u8, right: u8) -> u8 {
    let avg = (u16::from(left) + 2 * u16::from(this) + u16::from(right) + 2) >> 2;
    avg as u8
}

fn avg2(this: u8, right: u8) -> u8 {
    let avg = (u16::from(this) + u16::from(right) + 1) >> 1;
    avg as u8
}

/// Writes the 4x4 prediction for `mode` into `out`.
pub(crate) fn predict_subblock(mode: IntraMode, e: &SubblockEdges, out: &mut [u8], stride: usize) {
    let block = subblock_prediction(mode, e);
    for (row, src) in out.chunks_mut(stride).zip(block.chunks_exact(4)) {
        row[..4].copy_from_slice(src);
    }
}

/// The 4x4 prediction for `mode`, row-major.
pub(crate) fn subblock_prediction(mode: IntraMode, e: &SubblockEdges) -> [u8; 16] {
    let mut out = [0u8; 16];
    let p = e.top_left;
    let [a0, a1, a2, a3, a4, a5, a6, a7] = e.top;
    let [l0, l1, l2, l3] = e.left;

    match mode {
        IntraMode::DC => {
            let sum: u32 = e.top[..4]
                .iter()
                .chain(&e.left)
                .map(|&v| u32::from(v))
                .sum();
            out.fill(((sum + 4) >> 3) as u8);
        }
        IntraMode::TM => {
            let edges = Edges::<4> {
                top_left: p,
                top: [a0, a1, a2, a3],
                left: e.left,
                has_top: true,
                has_left: true,
            };
            predict_block(BlockMode::TM, &edges, &mut out, 4);
        }
        IntraMode::VE => {
            let avg = [
                avg3(p, a0, a1),
                avg3(a0, a1, a2),
                avg3(a1, a2, a3),
                avg3(a2, a3, a4),
            ];
            for row in out.chunks_exact_mut(4) {
                row.copy_from_slice(&avg);
            }
        }
        IntraMode::HE => {
            let avgs = [
                avg3(p, l0, l1),
                avg3(l0, l1, l2),
                avg3(l1, l2, l3),
                avg3(l2, l3, l3),
            ];
            for (row, avg) in out.chunks_exact_mut(4).zip(avgs) {
                row.fill(avg);
            }
        }
        IntraMode::LD => {
            let avgs = [
                avg3(a0, a1, a2),
                avg3(a1, a2, a3),
                avg3(a2, a3, a4),
                avg3(a3, a4, a5),
                avg3(a4, a5, a6),
                avg3(a5, a6, a7),
                avg3(a6, a7, a7),
            ];
            for (y, row) in out.chunks_exact_mut(4).enumerate() {
                row.copy_from_slice(&avgs[y..y + 4]);
            }
        }
        IntraMode::RD => {
            let [e0, e1, e2, e3, e4, e5, e6, e7, e8] = e.edge();
            let avgs = [
                avg3(e0, e1, e2),
                avg3(e1, e2, e3),
                avg3(e2, e3, e4),
                avg3(e3, e4, e5),
                avg3(e4, e5, e6),
                avg3(e5, e6, e7),
                avg3(e6, e7, e8),
            ];
            for (y, row) in out.chunks_exact_mut(4).enumerate() {
                row.copy_from_slice(&avgs[3 - y..7 - y]);
            }
        }
        IntraMode::VR => {
            let [_, e1, e2, e3, e4, e5, e6, e7, e8] = e.edge();
            out[12] = avg3(e1, e2, e3);
            out[8] = avg3(e2, e3, e4);
            out[13] = avg3(e3, e4, e5);
            out[4] = out[13];
            out[9] = avg2(e4, e5);
            out[0] = out[9];
            out[14] = avg3(e4, e5, e6);
            out[5] = out[14];
            out[10] = avg2(e5, e6);
            out[1] = out[10];
            out[15] = avg3(e5, e6, e7);
            out[6] = out[15];
            out[11] = avg2(e6, e7);
            out[2] = out[11];
            out[7] = avg3(e6, e7, e8);
            out[3] = avg2(e7, e8);
        }
        IntraMode::VL => {
            out[0] = avg2(a0, a1);
            out[4] = avg3(a0, a1, a2);
            out[8] = avg2(a1, a2);
            out[1] = out[8];
            out[5] = avg3(a1, a2, a3);
            out[12] = out[5];
            out[9] = avg2(a2, a3);
            out[2] = out[9];
            out[13] = avg3(a2, a3, a4);
            out[6] = out[13];
            out[10] = avg2(a3, a4);
            out[3] = out[10];
            out[14] = avg3(a3, a4, a5);
            out[7] = out[14];
            out[11] = avg3(a4, a5, a6);
            out[15] = avg3(a5, a6, a7);
        }
        IntraMode::HD => {
            let [e0, e1, e2, e3, e4, e5, e6, e7, _] = e.edge();
            out[12] = avg2(e0, e1);
            out[13] = avg3(e0, e1, e2);
            out[8] = avg2(e1, e2);
            out[14] = out[8];
            out[9] = avg3(e1, e2, e3);
            out[15] = out[9];
            out[10] = avg2(e2, e3);
            out[4] = out[10];
            out[11] = avg3(e2, e3, e4);
            out[5] = out[11];
            out[6] = avg2(e3, e4);
            out[0] = out[6];
            out[7] = avg3(e3, e4, e5);
            out[1] = out[7];
            out[2] = avg3(e4, e5, e6);
            out[3] = avg3(e5, e6, e7);
        }
        IntraMode::HU => {
            out[0] = avg2(l0, l1);
            out[1] = avg3(l0, l1, l2);
            out[2] = avg2(l1, l2);
            out[4] = out[2];
            out[3] = avg3(l1, l2, l3);
            out[5] = out[3];
            out[6] = avg2(l2, l3);
            out[8] = out[6];
            out[7] = avg3(l2, l3, l3);
            out[9] = out[7];
            out[10..].fill(l3);
        }
    }
    out
}

/// Creates a luma workspace whose border holds the reconstructed neighbours.
///
/// `top` is the row cache of the whole frame width, `left` holds the corner
/// followed by the 16 samples of the column to the left.
pub(crate) fn create_border_luma(
    mbx: usize,
    mby: usize,
    mbw: usize,
    top: &[u8],
    left: &[u8; 17],
) -> [u8; LUMA_BLOCK_SIZE] {
    let stride = LUMA_STRIDE;
    let mut ws = [0u8; LUMA_BLOCK_SIZE];

    // A
    {
        let above = &mut ws[1..stride];
        if mby == 0 {
            above.fill(TOP_FILL);
        } else {
            above[..16].copy_from_slice(&top[mbx * 16..][..16]);
            if mbx == mbw - 1 {
                above[16..].fill(top[mbx * 16 + 15]);
            } else {
                for (above, &top) in above[16..].iter_mut().zip(&top[mbx * 16 + 16..]) {
                    *above = top;
                }
            }
        }
    }

    // Subblocks on the right column see the macroblock's top-right samples.
    for i in 17usize..21 {
        ws[4 * stride + i] = ws[i];
        ws[8 * stride + i] = ws[i];
        ws[12 * stride + i] = ws[i];
    }

    // L
    for i in 0usize..16 {
        ws[(i + 1) * stride] = if mbx == 0 { LEFT_FILL } else { left[i + 1] };
    }

    // P
    ws[0] = corner_fill(mbx, mby).unwrap_or(left[0]);

    ws
}

/// Creates a chroma workspace whose border holds the reconstructed neighbours.
pub(crate) fn create_border_chroma(
    mbx: usize,
    mby: usize,
    top: &[u8],
    left: &[u8; 9],
) -> [u8; CHROMA_BLOCK_SIZE] {
    let stride: usize = CHROMA_STRIDE;
    let mut ws = [0u8; CHROMA_BLOCK_SIZE];

    if mby == 0 {
        ws[1..=8].fill(TOP_FILL);
    } else {
        ws[1..=8].copy_from_slice(&top[mbx * 8..][..8]);
    }

    for y in 0usize..8 {
        ws[(y + 1) * stride] = if mbx == 0 { LEFT_FILL } else { left[y + 1] };
    }

    ws[0] = corner_fill(mbx, mby).unwrap_or(left[0]);

    ws
}

// Adds a 4x4 residual to the prediction at `(x0, y0)`, saturating to u8.
#[inline(always)]
pub(crate) fn add_residue(
    pblock: &mut [u8],
    rblock: &[i32; 16],
    y0: usize,
    x0: usize,
    stride: usize,
) {
    let mut pos = y0 * stride + x0;
    for row in rblock.chunks_exact(4) {
        for (p, &a) in pblock[pos..][..4].iter_mut().zip(row.iter()) {
            *p = (a + i32::from(*p)).clamp(0, 255) as u8;
        }
        pos += stride;
    }
}
