//! Key frame parsing and reconstruction.
//!
//! The first partition carries the frame header and every macroblock header;
//! coefficient tokens live in up to eight further partitions, macroblock row
//! `mby` reading from partition `mby % n`. Rows are reconstructed into
//! macroblock-aligned planes and deblocked in place once complete; the row
//! caches keep the unfiltered samples that prediction of the next row needs.

use alloc::boxed::Box;
use alloc::format;
use alloc::vec;
use alloc::vec::Vec;

use byteorder_lite::{ByteOrder, LittleEndian};

use super::api::{DecodeError, DecodeLimits, DecodedFrame};
use super::bit_reader::{tree_nodes_from, BoolReader, TreeNode};
use super::loop_filter::{self, FilterParams, Planes};
use crate::common::prediction::{
    add_residue, create_border_chroma, create_border_luma, predict_block, predict_subblock,
    Edges, SubblockEdges, CHROMA_STRIDE, LUMA_STRIDE,
};
use crate::common::transform::{self, IdctKind};
use crate::common::types::*;

const START_CODE: [u8; 3] = [0x9d, 0x01, 0x2a];

const KEYFRAME_YMODE_NODES: [TreeNode; 4] =
    tree_nodes_from(KEYFRAME_YMODE_TREE, KEYFRAME_YMODE_PROBS);

const KEYFRAME_UV_MODE_NODES: [TreeNode; 3] =
    tree_nodes_from(KEYFRAME_UV_MODE_TREE, KEYFRAME_UV_MODE_PROBS);

const KEYFRAME_BPRED_MODE_NODES: [[[TreeNode; 9]; 10]; 10] = {
    let mut output = [[[TreeNode::UNINIT; 9]; 10]; 10];
    let mut i = 0;
    while i < output.len() {
        let mut j = 0;
        while j < output[i].len() {
            output[i][j] =
                tree_nodes_from(KEYFRAME_BPRED_MODE_TREE, KEYFRAME_BPRED_MODE_PROBS[i][j]);
            j += 1;
        }
        i += 1;
    }
    output
};

/// Token probabilities of one plane type, `[band][context][node]`.
type PlaneProbs = [[[Prob; NUM_DCT_TOKENS - 1]; 3]; 8];

#[derive(Clone, Copy, Debug, Default)]
struct MacroBlock {
    bpred: [IntraMode; 16],
    luma_mode: LumaMode,
    chroma_mode: ChromaMode,
    segment: usize,
    coeffs_skipped: bool,
}

/// What a macroblock leaves behind for its right and lower neighbours.
#[derive(Clone, Copy, Debug, Default)]
struct MbContext {
    bpred: [IntraMode; 4],
    /// Non-zero flags: Y2, four luma, two Cb, two Cr.
    complexity: [u8; 9],
}

#[derive(Clone, Copy, Debug, Default)]
struct SegmentHeader {
    enabled: bool,
    update_map: bool,
    absolute: bool,
    quantizer: [i32; MAX_SEGMENTS],
    filter_level: [i32; MAX_SEGMENTS],
    tree_probs: [Prob; 3],
}

#[derive(Clone, Copy, Debug, Default)]
struct FilterHeader {
    simple: bool,
    level: u8,
    sharpness: u8,
    use_lf_delta: bool,
    ref_delta: [i32; 4],
    mode_delta: [i32; 4],
}

/// Decoder for a single key frame borrowed from the caller's buffer.
pub(crate) struct Vp8Decoder<'a> {
    header: BoolReader<'a>,
    partitions: Vec<BoolReader<'a>>,

    width: u16,
    height: u16,
    mbwidth: usize,
    mbheight: usize,

    segment_header: SegmentHeader,
    segment_nodes: [TreeNode; 3],
    segments: [Segment; MAX_SEGMENTS],
    filter: FilterHeader,

    token_probs: Box<TokenProbTables>,
    prob_skip: Option<Prob>,
}

impl<'a> Vp8Decoder<'a> {
    /// Parses the frame header and first-partition globals, checking the
    /// dimensions against `limits` before anything is allocated.
    pub(crate) fn new(data: &'a [u8], limits: &DecodeLimits) -> Result<Self, DecodeError> {
        if data.len() < 10 {
            return Err(DecodeError::NotEnoughInitData);
        }
        let tag = LittleEndian::read_u24(&data[..3]);
        let keyframe = tag & 1 == 0;
        let version = (tag >> 1) & 7;
        let first_partition_size = (tag >> 5) as usize;
        if !keyframe {
            return Err(DecodeError::UnsupportedFeature(
                "non-keyframe frames".into(),
            ));
        }
        if version > 3 {
            return Err(DecodeError::UnsupportedFeature(format!(
                "version number {version}"
            )));
        }

        let magic = [data[3], data[4], data[5]];
        if magic != START_CODE {
            return Err(DecodeError::Vp8MagicInvalid(magic));
        }

        let width = LittleEndian::read_u16(&data[6..8]) & 0x3fff;
        let height = LittleEndian::read_u16(&data[8..10]) & 0x3fff;
        if width == 0 || height == 0 {
            return Err(DecodeError::MalformedBitstream("zero frame dimension"));
        }
        limits.check_dimensions(u32::from(width), u32::from(height))?;

        let rest = &data[10..];
        if first_partition_size > rest.len() {
            return Err(DecodeError::MalformedBitstream(
                "first partition larger than the frame",
            ));
        }
        let (first, tokens) = rest.split_at(first_partition_size);

        let mut decoder = Self {
            header: BoolReader::new(first),
            partitions: Vec::new(),
            width,
            height,
            mbwidth: usize::from(width).div_ceil(16),
            mbheight: usize::from(height).div_ceil(16),
            segment_header: SegmentHeader::default(),
            segment_nodes: tree_nodes_from(SEGMENT_ID_TREE, [255; 3]),
            segments: [Segment::default(); MAX_SEGMENTS],
            filter: FilterHeader::default(),
            token_probs: Box::new(COEFF_PROBS),
            prob_skip: None,
        };
        decoder.read_frame_header(tokens)?;
        Ok(decoder)
    }

    fn read_frame_header(&mut self, tokens: &'a [u8]) -> Result<(), DecodeError> {
        let color_space = self.header.read_literal(1) as u8;
        if color_space != 0 {
            return Err(DecodeError::ColorSpaceInvalid(color_space));
        }
        // Pixel clamping is always on; the bit only allows decoders to skip it.
        let _clamping_type = self.header.read_literal(1);

        self.read_segment_header();
        self.read_filter_header();

        let num_partitions = 1usize << self.header.read_literal(2);
        self.init_partitions(tokens, num_partitions)?;

        self.read_quantizers();

        // Key frames always refresh the entropy context.
        let _refresh_entropy_probs = self.header.read_flag();

        self.update_token_probabilities();
        self.prob_skip = if self.header.read_flag() {
            Some(self.header.read_literal(8) as Prob)
        } else {
            None
        };

        log::debug!(
            "vp8 key frame {}x{}: {} partitions, segments {:?}, filter {:?}, skip prob {:?}",
            self.width,
            self.height,
            num_partitions,
            self.segment_header,
            self.filter,
            self.prob_skip,
        );
        self.header.check((), "first partition ended inside the frame header")
    }

    fn read_segment_header(&mut self) {
        let hdr = &mut self.segment_header;
        hdr.enabled = self.header.read_flag();
        if !hdr.enabled {
            return;
        }
        hdr.update_map = self.header.read_flag();
        let update_data = self.header.read_flag();
        if update_data {
            hdr.absolute = self.header.read_flag();
            for q in hdr.quantizer.iter_mut() {
                *q = self.header.read_optional_signed_value(7);
            }
            for level in hdr.filter_level.iter_mut() {
                *level = self.header.read_optional_signed_value(6);
            }
        }
        if hdr.update_map {
            for prob in hdr.tree_probs.iter_mut() {
                *prob = if self.header.read_flag() {
                    self.header.read_literal(8) as Prob
                } else {
                    255
                };
            }
            self.segment_nodes = tree_nodes_from(SEGMENT_ID_TREE, hdr.tree_probs);
        }
    }

    fn read_filter_header(&mut self) {
        let f = &mut self.filter;
        f.simple = self.header.read_flag();
        f.level = self.header.read_literal(6) as u8;
        f.sharpness = self.header.read_literal(3) as u8;
        f.use_lf_delta = self.header.read_flag();
        if f.use_lf_delta && self.header.read_flag() {
            for delta in f.ref_delta.iter_mut() {
                if self.header.read_flag() {
                    *delta = self.header.read_signed_value(6);
                }
            }
            for delta in f.mode_delta.iter_mut() {
                if self.header.read_flag() {
                    *delta = self.header.read_signed_value(6);
                }
            }
        }
    }

    fn init_partitions(&mut self, data: &'a [u8], n: usize) -> Result<(), DecodeError> {
        let table_len = 3 * (n - 1);
        if data.len() < table_len {
            return Err(DecodeError::MalformedBitstream(
                "partition size table truncated",
            ));
        }
        let (sizes, mut rest) = data.split_at(table_len);
        for size in sizes.chunks_exact(3) {
            let size = LittleEndian::read_u24(size) as usize;
            if size > rest.len() {
                return Err(DecodeError::MalformedBitstream(
                    "partition larger than the remaining data",
                ));
            }
            let (part, tail) = rest.split_at(size);
            self.partitions.push(BoolReader::new(part));
            rest = tail;
        }
        if rest.is_empty() {
            return Err(DecodeError::MalformedBitstream("last partition is empty"));
        }
        self.partitions.push(BoolReader::new(rest));
        log::trace!("{} token partitions over {} bytes", n, data.len());
        Ok(())
    }

    fn read_quantizers(&mut self) {
        let base_q = self.header.read_literal(7) as i32;
        let deltas = QuantDeltas {
            y1dc: self.header.read_optional_signed_value(4),
            y2dc: self.header.read_optional_signed_value(4),
            y2ac: self.header.read_optional_signed_value(4),
            uvdc: self.header.read_optional_signed_value(4),
            uvac: self.header.read_optional_signed_value(4),
        };
        let hdr = &self.segment_header;
        for (i, segment) in self.segments.iter_mut().enumerate() {
            let q = match (hdr.enabled, hdr.absolute) {
                (false, _) => base_q,
                (true, true) => hdr.quantizer[i],
                (true, false) => base_q + hdr.quantizer[i],
            };
            *segment = Segment::from_index(q, &deltas);
            segment.delta_values = !hdr.absolute;
            segment.loopfilter_level = hdr.filter_level[i] as i8;
        }
    }

    fn update_token_probabilities(&mut self) {
        for (i, plane) in COEFF_UPDATE_PROBS.iter().enumerate() {
            for (j, band) in plane.iter().enumerate() {
                for (k, ctx) in band.iter().enumerate() {
                    for (t, &update_prob) in ctx.iter().enumerate() {
                        if self.header.read_bool(update_prob) {
                            self.token_probs[i][j][k][t] = self.header.read_literal(8) as Prob;
                        }
                    }
                }
            }
        }
    }

    // Filter strength of each segment, for whole-block and subblock luma.
    fn filter_strengths(&self) -> [[FilterParams; 2]; MAX_SEGMENTS] {
        let hdr = &self.segment_header;
        let f = &self.filter;
        core::array::from_fn(|s| {
            let mut base = i32::from(f.level);
            if hdr.enabled {
                base = if hdr.absolute {
                    hdr.filter_level[s]
                } else {
                    base + hdr.filter_level[s]
                };
                base = base.clamp(0, 63);
            }
            core::array::from_fn(|i4| {
                let mut level = base;
                if f.use_lf_delta {
                    level += f.ref_delta[0];
                    if i4 == 1 {
                        level += f.mode_delta[0];
                    }
                }
                FilterParams::new(level.clamp(0, 63) as u8, f.sharpness)
            })
        })
    }

    fn read_macroblock_header(
        &mut self,
        top: &mut MbContext,
        left: &mut MbContext,
    ) -> Result<MacroBlock, DecodeError> {
        let mut mb = MacroBlock::default();
        if self.segment_header.update_map {
            mb.segment = self.header.read_with_tree(&self.segment_nodes) as usize;
        }
        mb.coeffs_skipped = match self.prob_skip {
            Some(prob) => self.header.read_bool(prob),
            None => false,
        };

        mb.luma_mode = LumaMode::from_i8(self.header.read_with_tree(&KEYFRAME_YMODE_NODES))
            .ok_or(DecodeError::MalformedBitstream("invalid luma mode"))?;

        match mb.luma_mode.into_intra() {
            Some(mode) => {
                mb.bpred = [mode; 16];
                top.bpred = [mode; 4];
                left.bpred = [mode; 4];
            }
            None => {
                for y in 0..4 {
                    for x in 0..4 {
                        let above = top.bpred[x] as usize;
                        let beside = left.bpred[y] as usize;
                        let nodes = &KEYFRAME_BPRED_MODE_NODES[above][beside];
                        let mode = IntraMode::from_i8(self.header.read_with_tree(nodes))
                            .ok_or(DecodeError::MalformedBitstream("invalid subblock mode"))?;
                        mb.bpred[y * 4 + x] = mode;
                        top.bpred[x] = mode;
                        left.bpred[y] = mode;
                    }
                }
            }
        }

        mb.chroma_mode =
            ChromaMode::from_i8(self.header.read_with_tree(&KEYFRAME_UV_MODE_NODES))
                .ok_or(DecodeError::MalformedBitstream("invalid chroma mode"))?;

        self.header
            .check(mb, "first partition ended inside a macroblock header")
    }

    /// Reads and dequantizes the coefficients of one macroblock into `blocks`
    /// (16 luma, 4 Cb, 4 Cr). Returns whether any block has a non-zero
    /// coefficient after the Y2 transform.
    fn read_residual_data(
        &mut self,
        mb: &MacroBlock,
        partition: usize,
        top: &mut MbContext,
        left: &mut MbContext,
        blocks: &mut [[i32; 16]; 24],
    ) -> Result<bool, DecodeError> {
        let segment = self.segments[mb.segment];
        let probs = &*self.token_probs;
        let reader = &mut self.partitions[partition];
        let mut non_zero = false;

        let (plane, first) = if mb.luma_mode == LumaMode::B {
            (PLANE_Y_WITH_DC, 0)
        } else {
            let mut y2 = [0i32; 16];
            let ctx = top.complexity[0] + left.complexity[0];
            let n = read_coefficients(
                reader,
                &mut y2,
                &probs[PLANE_Y2],
                0,
                ctx,
                i32::from(segment.y2dc),
                i32::from(segment.y2ac),
            )?;
            let flag = u8::from(n > 0);
            top.complexity[0] = flag;
            left.complexity[0] = flag;
            if n > 1 {
                transform::iwht4x4(&mut y2);
            } else {
                y2 = [(y2[0] + 3) >> 3; 16];
            }
            for (block, dc) in blocks.iter_mut().zip(y2) {
                block[0] = dc;
            }
            (PLANE_Y_NO_DC, 1)
        };

        for y in 0..4 {
            let mut l = left.complexity[y + 1];
            for x in 0..4 {
                let block = &mut blocks[y * 4 + x];
                let n = read_coefficients(
                    reader,
                    block,
                    &probs[plane],
                    first,
                    l + top.complexity[x + 1],
                    i32::from(segment.ydc),
                    i32::from(segment.yac),
                )?;
                l = u8::from(n > first);
                top.complexity[x + 1] = l;
                non_zero |= n > 1 || block[0] != 0;
            }
            left.complexity[y + 1] = l;
        }

        for (ctx_base, block_base) in [(5, 16), (7, 20)] {
            for y in 0..2 {
                let mut l = left.complexity[ctx_base + y];
                for x in 0..2 {
                    let block = &mut blocks[block_base + y * 2 + x];
                    let n = read_coefficients(
                        reader,
                        block,
                        &probs[PLANE_UV],
                        0,
                        l + top.complexity[ctx_base + x],
                        i32::from(segment.uvdc),
                        i32::from(segment.uvac),
                    )?;
                    l = u8::from(n > 0);
                    top.complexity[ctx_base + x] = l;
                    non_zero |= n > 1 || block[0] != 0;
                }
                left.complexity[ctx_base + y] = l;
            }
        }

        reader.check(non_zero, "token partition ended early")
    }

    /// Decodes every macroblock row, checking `stop` before each one.
    pub(crate) fn decode(&mut self, stop: &dyn enough::Stop) -> Result<DecodedFrame, DecodeError> {
        let mbw = self.mbwidth;
        let y_stride = mbw * 16;
        let uv_stride = mbw * 8;
        let mut ybuf = vec![0u8; y_stride * self.mbheight * 16];
        let mut ubuf = vec![0u8; uv_stride * self.mbheight * 8];
        let mut vbuf = vec![0u8; uv_stride * self.mbheight * 8];

        let mut top = vec![MbContext::default(); mbw];
        let mut top_y = vec![0u8; y_stride];
        let mut top_u = vec![0u8; uv_stride];
        let mut top_v = vec![0u8; uv_stride];

        let strengths = self.filter_strengths();
        let mut row_filter = vec![(FilterParams::default(), false); mbw];

        for mby in 0..self.mbheight {
            stop.check()?;
            let partition = mby % self.partitions.len();
            let mut left = MbContext::default();
            let mut left_y = [0u8; 17];
            let mut left_u = [0u8; 9];
            let mut left_v = [0u8; 9];

            for mbx in 0..mbw {
                let mb = self.read_macroblock_header(&mut top[mbx], &mut left)?;
                let mut blocks = [[0i32; 16]; 24];
                let non_zero = if mb.coeffs_skipped {
                    let ctx = &mut top[mbx];
                    let keep_y2 = usize::from(mb.luma_mode == LumaMode::B);
                    ctx.complexity[keep_y2..].fill(0);
                    left.complexity[keep_y2..].fill(0);
                    false
                } else {
                    self.read_residual_data(&mb, partition, &mut top[mbx], &mut left, &mut blocks)?
                };

                // Luma
                let mut ws = create_border_luma(mbx, mby, mbw, &top_y, &left_y);
                let (luma, chroma) = blocks.split_at_mut(16);
                reconstruct_luma(&mut ws, &mb, mbx, mby, luma);
                let x0 = mbx * 16;
                for (y, row) in ws.chunks_exact(LUMA_STRIDE).skip(1).enumerate() {
                    ybuf[(mby * 16 + y) * y_stride + x0..][..16].copy_from_slice(&row[1..17]);
                }
                left_y[0] = top_y[x0 + 15];
                for (y, row) in ws.chunks_exact(LUMA_STRIDE).skip(1).enumerate() {
                    left_y[y + 1] = row[16];
                }
                top_y[x0..x0 + 16].copy_from_slice(&ws[16 * LUMA_STRIDE + 1..][..16]);

                // Chroma
                let (ublocks, vblocks) = chroma.split_at_mut(4);
                for (blocks, top_c, left_c, buf) in [
                    (ublocks, &mut top_u, &mut left_u, &mut ubuf),
                    (vblocks, &mut top_v, &mut left_v, &mut vbuf),
                ] {
                    let mut ws = create_border_chroma(mbx, mby, top_c, left_c);
                    reconstruct_chroma(&mut ws, &mb, mbx, mby, blocks);
                    let x0 = mbx * 8;
                    for (y, row) in ws.chunks_exact(CHROMA_STRIDE).skip(1).enumerate() {
                        buf[(mby * 8 + y) * uv_stride + x0..][..8].copy_from_slice(&row[1..9]);
                        left_c[y + 1] = row[8];
                    }
                    left_c[0] = top_c[x0 + 7];
                    top_c[x0..x0 + 8].copy_from_slice(&ws[8 * CHROMA_STRIDE + 1..][..8]);
                }

                let i4 = mb.luma_mode == LumaMode::B;
                row_filter[mbx] = (strengths[mb.segment][usize::from(i4)], i4 || non_zero);
            }

            if self.filter.level > 0 {
                let mut planes = Planes {
                    y: &mut ybuf,
                    u: &mut ubuf,
                    v: &mut vbuf,
                    y_stride,
                    uv_stride,
                };
                for (mbx, (params, inner)) in row_filter.iter().enumerate() {
                    loop_filter::filter_macroblock(
                        &mut planes,
                        mbx,
                        mby,
                        params,
                        *inner,
                        self.filter.simple,
                    );
                }
            }
        }

        Ok(self.crop(&ybuf, &ubuf, &vbuf, y_stride, uv_stride))
    }

    fn crop(&self, y: &[u8], u: &[u8], v: &[u8], y_stride: usize, uv_stride: usize) -> DecodedFrame {
        let width = usize::from(self.width);
        let height = usize::from(self.height);
        let (cw, ch) = (width.div_ceil(2), height.div_ceil(2));
        let crop = |plane: &[u8], stride: usize, w: usize, h: usize| -> Vec<u8> {
            plane
                .chunks_exact(stride)
                .take(h)
                .flat_map(|row| row[..w].iter().copied())
                .collect()
        };
        DecodedFrame {
            width: self.width,
            height: self.height,
            y: crop(y, y_stride, width, height),
            u: crop(u, uv_stride, cw, ch),
            v: crop(v, uv_stride, cw, ch),
            y_stride: width,
            uv_stride: cw,
        }
    }
}

fn add_block(ws: &mut [u8], block: &mut [i32; 16], y0: usize, x0: usize, stride: usize) {
    let kind = IdctKind::of(block);
    if kind != IdctKind::None {
        transform::idct4x4_dispatch(block, kind);
        add_residue(ws, block, y0, x0, stride);
    }
}

fn reconstruct_luma(
    ws: &mut [u8],
    mb: &MacroBlock,
    mbx: usize,
    mby: usize,
    blocks: &mut [[i32; 16]],
) {
    let stride = LUMA_STRIDE;
    match mb.luma_mode.block_mode() {
        Some(mode) => {
            let edges = Edges::<16>::from_workspace(ws, 1, 1, stride, mby > 0, mbx > 0);
            predict_block(mode, &edges, &mut ws[stride + 1..], stride);
            for (i, block) in blocks.iter_mut().enumerate() {
                add_block(ws, block, 1 + (i / 4) * 4, 1 + (i % 4) * 4, stride);
            }
        }
        None => {
            for (i, block) in blocks.iter_mut().enumerate() {
                let (y0, x0) = (1 + (i / 4) * 4, 1 + (i % 4) * 4);
                let edges = SubblockEdges::from_workspace(ws, x0, y0, stride);
                predict_subblock(mb.bpred[i], &edges, &mut ws[y0 * stride + x0..], stride);
                add_block(ws, block, y0, x0, stride);
            }
        }
    }
}

fn reconstruct_chroma(
    ws: &mut [u8],
    mb: &MacroBlock,
    mbx: usize,
    mby: usize,
    blocks: &mut [[i32; 16]],
) {
    let stride = CHROMA_STRIDE;
    let edges = Edges::<8>::from_workspace(ws, 1, 1, stride, mby > 0, mbx > 0);
    predict_block(mb.chroma_mode.into(), &edges, &mut ws[stride + 1..], stride);
    for (i, block) in blocks.iter_mut().enumerate() {
        add_block(ws, block, 1 + (i / 2) * 4, 1 + (i % 2) * 4, stride);
    }
}

/// Reads the tokens of one 4x4 block starting at scan position `first` and
/// stores dequantized values in raster order.
///
/// Returns the scan position after the last coded coefficient: 0 (or
/// `first`) for an empty block, 16 when the block runs to the end.
fn read_coefficients(
    reader: &mut BoolReader<'_>,
    block: &mut [i32; 16],
    probs: &PlaneProbs,
    first: usize,
    ctx: u8,
    dcq: i32,
    acq: i32,
) -> Result<usize, DecodeError> {
    let band = |n: usize| usize::from(COEFF_BANDS[n]);
    let mut n = first;
    let mut p = &probs[band(n)][usize::from(ctx)];
    while n < 16 {
        if !reader.read_bool(p[0]) {
            return Ok(n);
        }
        while !reader.read_bool(p[1]) {
            n += 1;
            if n == 16 {
                return Ok(16);
            }
            p = &probs[band(n)][0];
        }
        let next = &probs[band(n + 1)];
        let magnitude = if !reader.read_bool(p[2]) {
            p = &next[1];
            1
        } else {
            let v = read_large_value(reader, p)?;
            p = &next[2];
            v
        };
        let value = if reader.read_flag() {
            -magnitude
        } else {
            magnitude
        };
        let q = if n > 0 { acq } else { dcq };
        block[usize::from(ZIGZAG[n])] = value * q;
        n += 1;
    }
    Ok(16)
}

// Magnitudes of 2 and above: literal tokens up to 4, then categories with
// extra bits.
fn read_large_value(reader: &mut BoolReader<'_>, p: &[Prob; 11]) -> Result<i32, DecodeError> {
    if !reader.read_bool(p[3]) {
        if !reader.read_bool(p[4]) {
            return Ok(2);
        }
        return Ok(3 + i32::from(reader.read_bool(p[5])));
    }
    if !reader.read_bool(p[6]) {
        if !reader.read_bool(p[7]) {
            return Ok(i32::from(DCT_CAT_BASE[0]) + i32::from(reader.read_bool(PROB_DCT_CAT[0][0])));
        }
        let hi = i32::from(reader.read_bool(PROB_DCT_CAT[1][0]));
        let lo = i32::from(reader.read_bool(PROB_DCT_CAT[1][1]));
        return Ok(i32::from(DCT_CAT_BASE[1]) + 2 * hi + lo);
    }
    let bit1 = usize::from(reader.read_bool(p[8]));
    let bit0 = usize::from(reader.read_bool(p[9 + bit1]));
    let cat = 2 + 2 * bit1 + bit0;
    let (extra_probs, base) = PROB_DCT_CAT
        .get(cat)
        .zip(DCT_CAT_BASE.get(cat))
        .ok_or(DecodeError::MalformedBitstream("undefined token category"))?;
    let extra = extra_probs
        .iter()
        .take_while(|&&prob| prob != 0)
        .fold(0, |v, &prob| 2 * v + i32::from(reader.read_bool(prob)));
    Ok(i32::from(*base) + extra)
}
