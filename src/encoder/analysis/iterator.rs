//! Macroblock scan and boundary cache.
//!
//! The iterator walks macroblocks in raster order. For the current position
//! it imports the source samples (replicating the last column and row of a
//! partial macroblock), hands out bordered prediction workspaces built from
//! the row and column caches, and keeps the neighbour state token coding
//! needs: packed non-zero flags and the subblock modes along the edges.
//!
//! Non-zero flags of a macroblock are packed into a `u32`: bits 0-15 are the
//! luma subblocks in raster order, 16-19 the U blocks, 20-23 the V blocks and
//! bit 24 the Y2 block. Only the bottom row and right column of a macroblock
//! matter to its neighbours; [`MacroblockIterator::nz_to_bytes`] unpacks them
//! into the nine-entry `top_nz`/`left_nz` context arrays.

use alloc::vec;
use alloc::vec::Vec;

use crate::common::prediction::{
    create_border_chroma, create_border_luma, CHROMA_BLOCK_SIZE, LUMA_BLOCK_SIZE,
};
use crate::common::types::{IntraMode, LumaMode};
use crate::encoder::api::YuvImage;

/// Row stride of [`MacroblockPixels::y`].
pub const Y_STRIDE: usize = 16;
/// Row stride of [`MacroblockPixels::u`] and [`MacroblockPixels::v`].
pub const UV_STRIDE: usize = 8;

/// Bit of the Y2 block in a packed non-zero word.
pub const NZ_DC_BIT: u32 = 1 << 24;

/// Samples of one macroblock: 16x16 luma and two 8x8 chroma blocks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MacroblockPixels {
    /// Luma, `Y_STRIDE` wide.
    pub y: [u8; 16 * Y_STRIDE],
    /// Cb, `UV_STRIDE` wide.
    pub u: [u8; 8 * UV_STRIDE],
    /// Cr, `UV_STRIDE` wide.
    pub v: [u8; 8 * UV_STRIDE],
}

impl Default for MacroblockPixels {
    fn default() -> Self {
        Self {
            y: [0; 16 * Y_STRIDE],
            u: [0; 8 * UV_STRIDE],
            v: [0; 8 * UV_STRIDE],
        }
    }
}

// Copies a `w x h` block and replicates its last column and row up to `size`.
fn import_block(src: &[u8], src_stride: usize, dst: &mut [u8], w: usize, h: usize, size: usize) {
    for y in 0..h {
        let row = &mut dst[y * size..][..size];
        row[..w].copy_from_slice(&src[y * src_stride..][..w]);
        let last = row[w - 1];
        row[w..].fill(last);
    }
    for y in h..size {
        dst.copy_within((h - 1) * size..h * size, y * size);
    }
}

#[inline]
fn bit(nz: u32, n: u32) -> u8 {
    ((nz >> n) & 1) as u8
}

/// Raster-order walk over the macroblocks of a frame.
pub struct MacroblockIterator {
    /// Current column.
    pub x: usize,
    /// Current row.
    pub y: usize,
    /// Width in macroblocks.
    pub mb_w: usize,
    /// Height in macroblocks.
    pub mb_h: usize,
    width: usize,
    height: usize,

    y_top: Vec<u8>,
    u_top: Vec<u8>,
    v_top: Vec<u8>,
    // index 0 is the corner sample
    y_left: [u8; 17],
    u_left: [u8; 9],
    v_left: [u8; 9],

    // packed flags of the last macroblock coded in each column
    nz: Vec<u32>,
    /// Non-zero context above: four luma, two U, two V, Y2.
    pub top_nz: [u8; 9],
    /// Non-zero context to the left, same layout.
    pub left_nz: [u8; 9],

    top_modes: Vec<[IntraMode; 4]>,
    left_modes: [IntraMode; 4],
}

impl MacroblockIterator {
    /// Iterator positioned on the first macroblock of a `width x height` frame.
    pub fn new(width: usize, height: usize) -> Self {
        let mb_w = width.div_ceil(16);
        let mb_h = height.div_ceil(16);
        let mut it = Self {
            x: 0,
            y: 0,
            mb_w,
            mb_h,
            width,
            height,
            y_top: vec![0; mb_w * 16],
            u_top: vec![0; mb_w * 8],
            v_top: vec![0; mb_w * 8],
            y_left: [0; 17],
            u_left: [0; 9],
            v_left: [0; 9],
            nz: vec![0; mb_w],
            top_nz: [0; 9],
            left_nz: [0; 9],
            top_modes: vec![[IntraMode::DC; 4]; mb_w],
            left_modes: [IntraMode::DC; 4],
        };
        it.reset();
        it
    }

    /// Rewinds to the first macroblock and forgets every neighbour.
    pub fn reset(&mut self) {
        self.x = 0;
        self.y = 0;
        self.nz.fill(0);
        self.top_modes.fill([IntraMode::DC; 4]);
        self.top_nz = [0; 9];
        self.start_row();
    }

    fn start_row(&mut self) {
        self.left_nz = [0; 9];
        self.left_modes = [IntraMode::DC; 4];
    }

    /// Moves to the next macroblock. Returns `false` past the last one.
    pub fn next(&mut self) -> bool {
        self.x += 1;
        if self.x == self.mb_w {
            self.x = 0;
            self.y += 1;
            self.start_row();
        }
        !self.is_done()
    }

    /// Whether every macroblock has been visited.
    pub fn is_done(&self) -> bool {
        self.y >= self.mb_h
    }

    /// Index of the current macroblock in raster order.
    pub fn mb_index(&self) -> usize {
        self.y * self.mb_w + self.x
    }

    /// Visible width and height of the current macroblock.
    pub fn visible_size(&self) -> (usize, usize) {
        (
            (self.width - self.x * 16).min(16),
            (self.height - self.y * 16).min(16),
        )
    }

    /// Source samples of the current macroblock, edge-replicated past the
    /// picture border.
    pub fn import(&self, image: &YuvImage<'_>) -> MacroblockPixels {
        let (w, h) = self.visible_size();
        let (uv_w, uv_h) = (w.div_ceil(2), h.div_ceil(2));
        let y_off = self.y * 16 * image.y_stride + self.x * 16;
        let uv_off = self.y * 8 * image.uv_stride + self.x * 8;
        let mut px = MacroblockPixels::default();
        import_block(&image.y[y_off..], image.y_stride, &mut px.y, w, h, 16);
        import_block(&image.u[uv_off..], image.uv_stride, &mut px.u, uv_w, uv_h, 8);
        import_block(&image.v[uv_off..], image.uv_stride, &mut px.v, uv_w, uv_h, 8);
        px
    }

    /// Bordered luma workspace of the current macroblock, as the decoder
    /// will see it.
    pub fn luma_workspace(&self) -> [u8; LUMA_BLOCK_SIZE] {
        create_border_luma(self.x, self.y, self.mb_w, &self.y_top, &self.y_left)
    }

    /// Bordered Cb and Cr workspaces of the current macroblock.
    pub fn chroma_workspaces(&self) -> [[u8; CHROMA_BLOCK_SIZE]; 2] {
        [
            create_border_chroma(self.x, self.y, &self.u_top, &self.u_left),
            create_border_chroma(self.x, self.y, &self.v_top, &self.v_left),
        ]
    }

    /// Stores the right column and bottom row of `px` as the neighbours of
    /// the next macroblocks.
    pub fn save_boundary(&mut self, px: &MacroblockPixels) {
        let x0 = self.x * 16;
        // the corner comes from the row above, before it is overwritten
        self.y_left[0] = self.y_top[x0 + 15];
        for (i, row) in px.y.chunks_exact(Y_STRIDE).enumerate() {
            self.y_left[i + 1] = row[15];
        }
        self.y_top[x0..x0 + 16].copy_from_slice(&px.y[15 * Y_STRIDE..]);

        let c0 = self.x * 8;
        for (plane, top, left) in [
            (&px.u, &mut self.u_top, &mut self.u_left),
            (&px.v, &mut self.v_top, &mut self.v_left),
        ] {
            left[0] = top[c0 + 7];
            for (i, row) in plane.chunks_exact(UV_STRIDE).enumerate() {
                left[i + 1] = row[7];
            }
            top[c0..c0 + 8].copy_from_slice(&plane[7 * UV_STRIDE..]);
        }
    }

    /// Unpacks the neighbour flags of the current macroblock into
    /// `top_nz` and `left_nz`. The left Y2 flag lives only in `left_nz[8]`.
    pub fn nz_to_bytes(&mut self) {
        let tnz = self.nz[self.x];
        let lnz = if self.x > 0 { self.nz[self.x - 1] } else { 0 };
        self.top_nz = [
            bit(tnz, 12),
            bit(tnz, 13),
            bit(tnz, 14),
            bit(tnz, 15),
            bit(tnz, 18),
            bit(tnz, 19),
            bit(tnz, 22),
            bit(tnz, 23),
            bit(tnz, 24),
        ];
        let left_dc = self.left_nz[8];
        self.left_nz = [
            bit(lnz, 3),
            bit(lnz, 7),
            bit(lnz, 11),
            bit(lnz, 15),
            bit(lnz, 17),
            bit(lnz, 19),
            bit(lnz, 21),
            bit(lnz, 23),
            left_dc,
        ];
    }

    /// Packs `top_nz` and `left_nz`, as left by coding the current
    /// macroblock, back into its column slot.
    pub fn bytes_to_nz(&mut self) {
        let t = |i: usize| u32::from(self.top_nz[i]);
        let l = |i: usize| u32::from(self.left_nz[i]);
        let nz = (t(0) << 12)
            | (t(1) << 13)
            | (t(2) << 14)
            | (t(3) << 15)
            | (t(4) << 18)
            | (t(5) << 19)
            | (t(6) << 22)
            | (t(7) << 23)
            | (t(8) << 24)
            | (l(0) << 3)
            | (l(1) << 7)
            | (l(2) << 11)
            | (l(4) << 17)
            | (l(6) << 21);
        self.nz[self.x] = nz;
    }

    /// Neighbour state after a macroblock whose coefficients were skipped.
    ///
    /// Whole-block luma clears every flag including Y2; subblock luma keeps
    /// the Y2 flag of the column, which it never touches.
    pub fn reset_after_skip(&mut self, is_i16: bool) {
        if is_i16 {
            self.nz[self.x] = 0;
            self.left_nz[8] = 0;
        } else {
            self.nz[self.x] &= NZ_DC_BIT;
        }
    }

    /// Packed flags last stored for the current column.
    pub fn packed_nz(&self) -> u32 {
        self.nz[self.x]
    }

    /// Subblock modes bordering the current macroblock: the bottom row of
    /// the one above and the right column of the one to the left.
    pub fn mode_context(&self) -> ([IntraMode; 4], [IntraMode; 4]) {
        (self.top_modes[self.x], self.left_modes)
    }

    /// Records the luma prediction of the current macroblock as context for
    /// subblock mode coding of its neighbours.
    pub fn set_modes(&mut self, luma: LumaMode, modes: &[IntraMode; 16]) {
        match luma.into_intra() {
            Some(mode) => {
                self.top_modes[self.x] = [mode; 4];
                self.left_modes = [mode; 4];
            }
            None => {
                self.top_modes[self.x] = core::array::from_fn(|i| modes[12 + i]);
                self.left_modes = core::array::from_fn(|i| modes[i * 4 + 3]);
            }
        }
    }
}
