//! Frame and macroblock header writing.
//!
//! The uncompressed chunk (frame tag, start code, dimensions) is written with
//! `byteorder-lite`; everything else goes through the boolean encoder of the
//! first partition.

use alloc::vec::Vec;

use byteorder_lite::{ByteOrder, LittleEndian};

use crate::common::types::{
    ChromaMode, IntraMode, LumaMode, COEFF_PROBS, COEFF_UPDATE_PROBS, KEYFRAME_BPRED_MODE_PROBS,
    KEYFRAME_BPRED_MODE_TREE, KEYFRAME_UV_MODE_PROBS, KEYFRAME_UV_MODE_TREE, KEYFRAME_YMODE_PROBS,
    KEYFRAME_YMODE_TREE, SEGMENT_ID_TREE,
};
use crate::encoder::api::EncodeError;
use crate::encoder::arithmetic::ArithmeticEncoder;
use crate::encoder::cost::{ModeScore, ProbaModel};

/// Start code following the frame tag of a key frame.
pub(crate) const START_CODE: [u8; 3] = [0x9d, 0x01, 0x2a];

/// Size of the frame tag, start code and dimensions.
pub(crate) const KEYFRAME_HEADER_SIZE: usize = 10;

/// The first partition size field has 19 bits.
pub(crate) const PARTITION0_SIZE_LIMIT: usize = 1 << 19;

/// Segment quantizers and filter levels, written as absolute values.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct SegmentHeader {
    pub quant: [u8; 4],
    pub filter: [u8; 4],
    /// Tree probabilities of the segment map. The map is only sent when one
    /// of them differs from 255.
    pub probas: [u8; 3],
}

impl SegmentHeader {
    pub(crate) fn update_map(&self) -> bool {
        self.probas.iter().any(|&p| p != 255)
    }
}

/// Everything the first partition says before the macroblock headers.
#[derive(Clone, Debug)]
pub(crate) struct FrameHeader {
    pub width: u16,
    pub height: u16,
    /// `None` when a single segment is in use.
    pub segments: Option<SegmentHeader>,
    pub simple_filter: bool,
    pub filter_level: u8,
    pub sharpness: u8,
    pub log2_partitions: u8,
    pub base_quant: u8,
    pub dq_uv_dc: i32,
    pub dq_uv_ac: i32,
}

impl FrameHeader {
    /// Segment tree probabilities if the map is coded per macroblock.
    pub(crate) fn segment_map_probas(&self) -> Option<&[u8; 3]> {
        self.segments
            .as_ref()
            .filter(|s| s.update_map())
            .map(|s| &s.probas)
    }
}

/// Side information of a coded macroblock, kept until the first partition
/// is written.
#[derive(Clone, Copy, Debug)]
pub(crate) struct MacroblockModes {
    pub segment: u8,
    pub skipped: bool,
    pub luma: LumaMode,
    pub sub: [IntraMode; 16],
    pub chroma: ChromaMode,
}

impl MacroblockModes {
    pub(crate) fn new(segment: u8, skipped: bool, rd: &ModeScore) -> Self {
        Self {
            segment,
            skipped,
            luma: rd.mode_i16,
            sub: rd.modes_i4,
            chroma: rd.mode_uv,
        }
    }
}

fn optional(v: i32) -> Option<i32> {
    (v != 0).then_some(v)
}

/// Writes the frame-level fields of the first partition.
pub(crate) fn write_frame_header(w: &mut ArithmeticEncoder, hdr: &FrameHeader, model: &ProbaModel) {
    // color space, clamping type
    w.write_flag(false);
    w.write_flag(false);

    w.write_flag(hdr.segments.is_some());
    if let Some(seg) = &hdr.segments {
        let update_map = seg.update_map();
        w.write_flag(update_map);
        // update data, absolute values
        w.write_flag(true);
        w.write_flag(true);
        for &q in &seg.quant {
            w.write_optional_signed_value(7, optional(i32::from(q)));
        }
        for &f in &seg.filter {
            w.write_optional_signed_value(6, optional(i32::from(f)));
        }
        if update_map {
            for &p in &seg.probas {
                w.write_flag(p != 255);
                if p != 255 {
                    w.write_literal(8, u32::from(p));
                }
            }
        }
    }

    w.write_flag(hdr.simple_filter);
    w.write_literal(6, u32::from(hdr.filter_level));
    w.write_literal(3, u32::from(hdr.sharpness));
    // no loop filter deltas
    w.write_flag(false);

    w.write_literal(2, u32::from(hdr.log2_partitions));

    w.write_literal(7, u32::from(hdr.base_quant));
    w.write_optional_signed_value(4, None);
    w.write_optional_signed_value(4, None);
    w.write_optional_signed_value(4, None);
    w.write_optional_signed_value(4, optional(hdr.dq_uv_dc));
    w.write_optional_signed_value(4, optional(hdr.dq_uv_ac));

    // refresh entropy probs
    w.write_flag(false);

    write_token_probas(w, model);

    w.write_flag(model.skip.used);
    if model.skip.used {
        w.write_literal(8, u32::from(model.skip.proba));
    }
}

// Probabilities are sent as updates over the defaults the decoder starts
// from.
fn write_token_probas(w: &mut ArithmeticEncoder, model: &ProbaModel) {
    for (t, plane) in COEFF_UPDATE_PROBS.iter().enumerate() {
        for (b, band) in plane.iter().enumerate() {
            for (c, ctx) in band.iter().enumerate() {
                for (p, &update_prob) in ctx.iter().enumerate() {
                    let prob = model.coeffs[t][b][c][p];
                    let update = prob != COEFF_PROBS[t][b][c][p];
                    w.write_bool(update, update_prob);
                    if update {
                        w.write_literal(8, u32::from(prob));
                    }
                }
            }
        }
    }
}

/// Writes the header of one macroblock: segment id, skip flag and modes.
///
/// `top` and `left` are the subblock modes bordering the macroblock.
pub(crate) fn write_macroblock_header(
    w: &mut ArithmeticEncoder,
    segment_probas: Option<&[u8; 3]>,
    skip_proba: Option<u8>,
    mb: &MacroblockModes,
    top: [IntraMode; 4],
    left: [IntraMode; 4],
) {
    if let Some(probas) = segment_probas {
        w.write_with_tree(&SEGMENT_ID_TREE, probas, mb.segment as i8);
    }
    if let Some(prob) = skip_proba {
        w.write_bool(mb.skipped, prob);
    }
    w.write_with_tree(&KEYFRAME_YMODE_TREE, &KEYFRAME_YMODE_PROBS, mb.luma as i8);
    if mb.luma == LumaMode::B {
        let mut top = top;
        for y in 0..4 {
            let mut left_mode = left[y];
            for x in 0..4 {
                let mode = mb.sub[y * 4 + x];
                let probs = &KEYFRAME_BPRED_MODE_PROBS[top[x] as usize][left_mode as usize];
                w.write_with_tree(&KEYFRAME_BPRED_MODE_TREE, probs, mode as i8);
                top[x] = mode;
                left_mode = mode;
            }
        }
    }
    w.write_with_tree(&KEYFRAME_UV_MODE_TREE, &KEYFRAME_UV_MODE_PROBS, mb.chroma as i8);
}

/// Assembles the key frame: uncompressed header, first partition, partition
/// size table and token partitions.
pub(crate) fn assemble_frame(
    hdr: &FrameHeader,
    partition0: &[u8],
    partitions: &[Vec<u8>],
) -> Result<Vec<u8>, EncodeError> {
    if partition0.len() >= PARTITION0_SIZE_LIMIT {
        return Err(EncodeError::InvalidParameter(alloc::format!(
            "first partition of {} bytes exceeds the 19-bit size field",
            partition0.len()
        )));
    }
    let tokens: usize = partitions.iter().map(Vec::len).sum();
    let table = 3 * partitions.len().saturating_sub(1);
    let mut out = Vec::with_capacity(KEYFRAME_HEADER_SIZE + partition0.len() + table + tokens);

    // key frame, version 0, shown
    let tag = (partition0.len() as u32) << 5 | 1 << 4;
    let mut buf = [0u8; 3];
    LittleEndian::write_u24(&mut buf, tag);
    out.extend_from_slice(&buf);
    out.extend_from_slice(&START_CODE);
    let mut dim = [0u8; 2];
    for v in [hdr.width, hdr.height] {
        // no upscaling
        LittleEndian::write_u16(&mut dim, v & 0x3fff);
        out.extend_from_slice(&dim);
    }

    out.extend_from_slice(partition0);
    if let Some((_, sized)) = partitions.split_last() {
        for p in sized {
            LittleEndian::write_u24(&mut buf, p.len() as u32);
            out.extend_from_slice(&buf);
        }
    }
    for p in partitions {
        out.extend_from_slice(p);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::bit_reader::BoolReader;

    fn header() -> FrameHeader {
        FrameHeader {
            width: 40,
            height: 24,
            segments: None,
            simple_filter: false,
            filter_level: 20,
            sharpness: 3,
            log2_partitions: 1,
            base_quant: 33,
            dq_uv_dc: -4,
            dq_uv_ac: 0,
        }
    }

    #[test]
    fn uncompressed_chunk_layout() {
        let parts = [alloc::vec![1, 2, 3, 4], alloc::vec![5]];
        let frame = assemble_frame(&header(), &[9; 6], &parts).unwrap();
        let tag = LittleEndian::read_u24(&frame[0..3]);
        assert_eq!(tag & 1, 0, "key frame");
        assert_eq!((tag >> 1) & 7, 0, "version");
        assert_eq!((tag >> 4) & 1, 1, "shown");
        assert_eq!(tag >> 5, 6);
        assert_eq!(frame[3..6], START_CODE);
        assert_eq!(LittleEndian::read_u16(&frame[6..8]), 40);
        assert_eq!(LittleEndian::read_u16(&frame[8..10]), 24);
        assert_eq!(frame[10..16], [9; 6]);
        // only the first partition's size is stored
        assert_eq!(LittleEndian::read_u24(&frame[16..19]), 4);
        assert_eq!(frame[19..], [1, 2, 3, 4, 5]);
    }

    #[test]
    fn oversized_first_partition_is_rejected() {
        let p0 = alloc::vec![0; PARTITION0_SIZE_LIMIT];
        assert!(matches!(
            assemble_frame(&header(), &p0, &[alloc::vec![0]]),
            Err(EncodeError::InvalidParameter(_))
        ));
    }

    #[test]
    fn frame_header_fields_read_back() {
        let mut hdr = header();
        hdr.segments = Some(SegmentHeader {
            quant: [10, 20, 30, 0],
            filter: [5, 0, 63, 1],
            probas: [128, 255, 7],
        });
        let mut model = ProbaModel::new();
        model.coeffs[1][2][0][3] = 77;
        model.skip.used = true;
        model.skip.proba = 200;

        let mut w = ArithmeticEncoder::new();
        write_frame_header(&mut w, &hdr, &model);
        let data = w.flush_and_get_buffer();
        let mut r = BoolReader::new(&data);

        assert_eq!(r.read_literal(2), 0);
        assert!(r.read_flag(), "segmentation");
        assert!(r.read_flag(), "map update");
        assert!(r.read_flag(), "data update");
        assert!(r.read_flag(), "absolute");
        let mut quant = [0; 4];
        for q in &mut quant {
            *q = r.read_optional_signed_value(7);
        }
        assert_eq!(quant, [10, 20, 30, 0]);
        let mut filter = [0; 4];
        for f in &mut filter {
            *f = r.read_optional_signed_value(6);
        }
        assert_eq!(filter, [5, 0, 63, 1]);
        let probas: Vec<u32> = (0..3)
            .map(|_| if r.read_flag() { r.read_literal(8) } else { 255 })
            .collect();
        assert_eq!(probas, [128, 255, 7]);

        assert!(!r.read_flag(), "normal filter");
        assert_eq!(r.read_literal(6), 20);
        assert_eq!(r.read_literal(3), 3);
        assert!(!r.read_flag(), "filter deltas");
        assert_eq!(r.read_literal(2), 1);
        assert_eq!(r.read_literal(7), 33);
        let deltas: Vec<i32> = (0..5).map(|_| r.read_optional_signed_value(4)).collect();
        assert_eq!(deltas, [0, 0, 0, -4, 0]);
        assert!(!r.read_flag(), "refresh");

        let mut updated = Vec::new();
        for (t, plane) in COEFF_UPDATE_PROBS.iter().enumerate() {
            for (b, band) in plane.iter().enumerate() {
                for (c, ctx) in band.iter().enumerate() {
                    for (p, &up) in ctx.iter().enumerate() {
                        if r.read_bool(up) {
                            updated.push((t, b, c, p, r.read_literal(8)));
                        }
                    }
                }
            }
        }
        assert_eq!(updated, [(1, 2, 0, 3, 77)]);
        assert!(r.read_flag());
        assert_eq!(r.read_literal(8), 200);
    }

    #[test]
    fn subblock_modes_use_neighbour_contexts() {
        let mut rd = ModeScore::new();
        rd.mode_i16 = LumaMode::B;
        rd.modes_i4 = core::array::from_fn(|i| IntraMode::ALL[i % 10]);
        rd.mode_uv = ChromaMode::TM;
        let top = [IntraMode::VE; 4];
        let left = [IntraMode::HU; 4];

        let mut w = ArithmeticEncoder::new();
        let mb = MacroblockModes::new(2, true, &rd);
        write_macroblock_header(&mut w, Some(&[120, 60, 200]), Some(40), &mb, top, left);
        let data = w.flush_and_get_buffer();
        let mut r = BoolReader::new(&data);

        // segment 2: right branch, then left
        assert!(r.read_bool(120));
        assert!(!r.read_bool(200));
        assert!(r.read_bool(40), "skip");
        assert!(!r.read_bool(KEYFRAME_YMODE_PROBS[0]), "subblock luma");

        let mut top = top;
        for y in 0..4 {
            let mut left_mode = left[y];
            for x in 0..4 {
                let probs = &KEYFRAME_BPRED_MODE_PROBS[top[x] as usize][left_mode as usize];
                let mode = read_tree(&mut r, &KEYFRAME_BPRED_MODE_TREE, probs);
                assert_eq!(mode, rd.modes_i4[y * 4 + x] as i8);
                top[x] = rd.modes_i4[y * 4 + x];
                left_mode = top[x];
            }
        }
        let uv = read_tree(&mut r, &KEYFRAME_UV_MODE_TREE, &KEYFRAME_UV_MODE_PROBS);
        assert_eq!(uv, ChromaMode::TM as i8);
    }

    fn read_tree(r: &mut BoolReader<'_>, tree: &[i8], probs: &[u8]) -> i8 {
        let mut i = 0usize;
        loop {
            let next = tree[i + usize::from(r.read_bool(probs[i >> 1]))];
            if next <= 0 {
                return -next;
            }
            i = next as usize;
        }
    }
}
