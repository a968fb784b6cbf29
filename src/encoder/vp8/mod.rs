//! VP8 key frame encoder.
//!
//! ## Module organization
//!
//! - [`header`]: frame and macroblock headers, frame assembly
//! - [`mode_selection`]: intra mode decision (I16, I4, UV)
//! - [`prediction`]: block prediction and reconstruction
//! - [`residuals`]: token coding and statistics recording
//!
//! ## Encoding pipeline
//!
//! 1. **Analysis**: per-macroblock alpha, k-means segmentation
//! 2. **Segment parameters**: quantizer and filter level per segment from the
//!    quality, merging segments that end up identical
//! 3. **Statistics passes**: mode decision over the frame to adapt token
//!    probabilities, optionally searching the quality that meets a target
//!    size or PSNR
//! 4. **Final pass**: mode decision and token coding into the partitions
//! 5. **Loop filter**: per-segment levels raised to cover blocky edges
//! 6. **First partition**: frame header and macroblock modes

pub(crate) mod header;
pub(crate) mod mode_selection;
pub(crate) mod prediction;
pub(crate) mod residuals;

use alloc::vec::Vec;

use crate::common::types::{QuantDeltas, Segment, MAX_SEGMENTS};

use super::analysis::iterator::{MacroblockIterator, MacroblockPixels, UV_STRIDE, Y_STRIDE};
use super::analysis::segment::{
    chroma_deltas, merge_equivalent, quality_to_compression, segment_map_cost, segment_probas,
    segment_quant,
};
use super::analysis::{analyze, FrameAnalysis};
use super::api::{EncodeError, EncodeStats, EncoderConfig, YuvImage};
use super::arithmetic::ArithmeticEncoder;
use super::cost::{filter_strength_from_delta, segment_filter_level, sse, ProbaModel};
use super::quantize::SegmentMatrices;

use header::{
    assemble_frame, write_frame_header, write_macroblock_header, FrameHeader, MacroblockModes,
    SegmentHeader, KEYFRAME_HEADER_SIZE, PARTITION0_SIZE_LIMIT,
};
use mode_selection::{decimate, SearchParams, SegmentInfo};
use residuals::{code_residuals, record_residuals};

//------------------------------------------------------------------------------
// Quality search

/// The search stops once the quality moves by less than this.
const DQ_LIMIT: f32 = 0.4;

/// Passes run when searching a target and fewer were requested.
const MIN_SEARCH_PASSES: u8 = 6;

/// Estimated first partition size above which the subblock header budget is
/// halved, in 1/256 bit. Leaves room for the frame header fields.
const PARTITION0_BUDGET: i64 = ((PARTITION0_SIZE_LIMIT as i64) - 2048) << 11;

/// Initial subblock mode header budget, in 1/256 bit.
const MAX_I4_HEADER_BITS: i64 = 256 * 16 * 16;

/// Quality search state.
///
/// The first step moves by a fixed amount towards the target; the next ones
/// interpolate between the last two `(q, value)` points.
#[derive(Clone, Debug)]
struct PassStats {
    is_first: bool,
    dq: f32,
    q: f32,
    last_q: f32,
    /// Estimated size in bytes, or PSNR in dB.
    value: f64,
    last_value: f64,
    target: f64,
}

impl PassStats {
    fn new(config: &EncoderConfig) -> Self {
        let target = if config.target_size > 0 {
            f64::from(config.target_size)
        } else if config.target_psnr > 0.0 {
            f64::from(config.target_psnr)
        } else {
            40.0
        };
        Self {
            is_first: true,
            dq: 10.0,
            q: config.quality,
            last_q: config.quality,
            value: 0.0,
            last_value: 0.0,
            target,
        }
    }

    /// Moves `q` towards the target and returns it.
    fn compute_next_q(&mut self) -> f32 {
        let dq = if self.is_first {
            self.is_first = false;
            if self.value > self.target {
                -self.dq
            } else {
                self.dq
            }
        } else if self.value != self.last_value {
            let slope = (self.target - self.value) / (self.last_value - self.value);
            (slope * f64::from(self.last_q - self.q)) as f32
        } else {
            0.0
        };
        self.dq = dq.clamp(-30.0, 30.0);
        self.last_q = self.q;
        self.last_value = self.value;
        self.q = (self.q + self.dq).clamp(0.0, 100.0);
        self.q
    }

    fn is_converged(&self) -> bool {
        self.dq.abs() <= DQ_LIMIT
    }
}

/// PSNR of a squared error summed over `samples` samples.
fn psnr(distortion: u64, samples: u64) -> f64 {
    if distortion == 0 || samples == 0 {
        99.0
    } else {
        10.0 * libm::log10(255.0 * 255.0 * samples as f64 / distortion as f64)
    }
}

//------------------------------------------------------------------------------
// Segment parameters

/// Quantizers, filter levels and segment assignment for one quality.
#[derive(Clone, Debug)]
struct FrameParams {
    /// Segments after merging; at least one.
    segments: Vec<SegmentInfo>,
    /// Final segment of each macroblock.
    mb_segments: Vec<u8>,
    /// Segment tree probabilities.
    probas: [u8; 3],
    /// Cost of the segment map in 1/256 bit.
    map_bits: u32,
    dq_uv_dc: i32,
    dq_uv_ac: i32,
}

impl FrameParams {
    /// Derives every segment's quantizer and filter level for `quality`.
    fn new(analysis: &FrameAnalysis, config: &EncoderConfig, quality: f32) -> Self {
        let compression = quality_to_compression(quality);
        let nb = analysis.num_segments.min(analysis.segment_alphas.len()).max(1);
        let mut levels: Vec<(u8, u8)> = analysis.segment_alphas[..nb]
            .iter()
            .map(|&(alpha, beta)| {
                let quant = segment_quant(compression, alpha, config.sns_strength);
                let level = segment_filter_level(
                    quant,
                    config.filter_sharpness,
                    config.filter_strength,
                    beta as u8,
                );
                (quant, level)
            })
            .collect();
        let (remap, num_final) = merge_equivalent(&mut levels);

        let (dq_uv_ac, dq_uv_dc) = chroma_deltas(analysis.uv_alpha_avg, config.sns_strength);
        let deltas = QuantDeltas {
            uvdc: dq_uv_dc,
            uvac: dq_uv_ac,
            ..QuantDeltas::default()
        };
        let tlambda_scale = if config.method >= 4 {
            u32::from(config.sns_strength)
        } else {
            0
        };

        let segments: Vec<SegmentInfo> = levels[..num_final]
            .iter()
            .enumerate()
            .map(|(k, &(quant, level))| {
                let beta = (0..nb)
                    .find(|&s| usize::from(remap[s]) == k)
                    .map_or(0, |s| analysis.segment_alphas[s].1);
                let matrices = SegmentMatrices::from_segment(&Segment::from_index(
                    i32::from(quant),
                    &deltas,
                ));
                let mut info = SegmentInfo::new(quant, beta as u8, matrices, tlambda_scale);
                info.fstrength = level;
                info
            })
            .collect();

        let mut mb_segments: Vec<u8> = analysis
            .mbs
            .iter()
            .map(|mb| remap[usize::from(mb.segment)])
            .collect();

        let mut counts = [0u32; MAX_SEGMENTS];
        for &s in &mb_segments {
            counts[usize::from(s)] += 1;
        }
        let (probas, map_bits) = if num_final > 1 {
            let probas = segment_probas(&counts);
            (probas, segment_map_cost(&counts, &probas))
        } else {
            ([255; 3], 0)
        };
        if probas.iter().all(|&p| p == 255) {
            // a map that is not sent decodes as segment 0 everywhere
            mb_segments.fill(0);
        }

        Self {
            segments,
            mb_segments,
            probas,
            map_bits,
            dq_uv_dc,
            dq_uv_ac,
        }
    }

    /// Header of the segments, or `None` when one segment remains.
    fn segment_header(&self) -> Option<SegmentHeader> {
        let n = self.segments.len();
        if n < 2 {
            return None;
        }
        let last = &self.segments[n - 1];
        let seg = |i: usize| self.segments.get(i).unwrap_or(last);
        Some(SegmentHeader {
            quant: core::array::from_fn(|i| seg(i).quant),
            filter: core::array::from_fn(|i| seg(i).fstrength),
            probas: self.probas,
        })
    }
}

/// Raises each segment's filter level so that it smooths the largest DC step
/// seen between subblocks of its blocky macroblocks. Returns the frame level.
fn adjust_filter_strength(segments: &mut [SegmentInfo], config: &EncoderConfig) -> u8 {
    if config.filter_strength == 0 {
        return segments.first().map_or(0, |s| s.fstrength);
    }
    let mut max_level = 0;
    for seg in segments.iter_mut() {
        let delta = (seg.max_edge * i32::from(seg.matrices.y2.q[1])) >> 3;
        let level = filter_strength_from_delta(config.filter_sharpness, delta.max(0) as u32);
        seg.fstrength = seg.fstrength.max(level);
        max_level = max_level.max(seg.fstrength);
    }
    max_level
}

//------------------------------------------------------------------------------
// Encoder

/// Totals of one statistics pass, in 1/256 bit and squared error.
#[derive(Clone, Copy, Debug, Default)]
struct PassTotals {
    size: i64,
    size_p0: i64,
    distortion: u64,
    mbs: usize,
}

struct Vp8Encoder<'a> {
    image: YuvImage<'a>,
    config: &'a EncoderConfig,
    stop: &'a dyn enough::Stop,
    analysis: FrameAnalysis,
    model: ProbaModel,
    mb_w: usize,
    mb_h: usize,
    max_i4_header_bits: i64,
    passes: u8,
}

impl<'a> Vp8Encoder<'a> {
    fn new(image: YuvImage<'a>, config: &'a EncoderConfig, stop: &'a dyn enough::Stop) -> Self {
        let analysis = analyze(
            &image,
            config.method,
            config.quality,
            usize::from(config.segments),
        );
        Self {
            image,
            config,
            stop,
            analysis,
            model: ProbaModel::new(),
            mb_w: usize::from(image.width).div_ceil(16),
            mb_h: usize::from(image.height).div_ceil(16),
            max_i4_header_bits: MAX_I4_HEADER_BITS,
            passes: 0,
        }
    }

    fn iterator(&self) -> MacroblockIterator {
        MacroblockIterator::new(usize::from(self.image.width), usize::from(self.image.height))
    }

    fn search_params(&self, rd_opt: bool) -> SearchParams {
        let method = self.config.method;
        SearchParams {
            rd_opt,
            try_i4: method >= 2,
            refine_uv: method >= 1,
            max_i4_header_bits: self.max_i4_header_bits,
            mb_header_limit: 256 * 510 * 8 * 1024 / (self.mb_w * self.mb_h) as i64,
        }
    }

    /// Runs mode decision over the first `max_mbs` macroblocks and records
    /// their token statistics.
    fn stat_pass(
        &mut self,
        params: &mut FrameParams,
        rd_opt: bool,
        max_mbs: usize,
    ) -> Result<PassTotals, EncodeError> {
        let search = self.search_params(rd_opt);
        let mut it = self.iterator();
        let mut totals = PassTotals::default();
        self.model.reset_stats();

        loop {
            if it.x == 0 {
                self.stop.check()?;
            }
            let idx = it.mb_index();
            let px = it.import(&self.image);
            let seg = &mut params.segments[usize::from(params.mb_segments[idx])];
            let hint = self.analysis.mbs[idx].hint;
            let decision = decimate(&mut it, &px, seg, &self.model, &search, hint);
            if decision.is_skipped() {
                self.model.skip.nb_skip += 1;
            }
            record_residuals(&mut it, &decision.rd, &mut self.model.stats);
            totals.size += decision.rd.r + decision.rd.h;
            totals.size_p0 += decision.rd.h;
            totals.distortion += decision.rd.d.max(0) as u64;
            totals.mbs += 1;

            it.set_modes(decision.rd.mode_i16, &decision.rd.modes_i4);
            it.save_boundary(&decision.recon);
            if totals.mbs >= max_mbs || !it.next() {
                break;
            }
        }
        totals.size_p0 += i64::from(params.map_bits);
        Ok(totals)
    }

    /// Adapts the token probabilities and, with a target, searches the
    /// quality. Returns the quality of the last pass run, which the adapted
    /// probabilities belong to.
    fn stat_loop(&mut self) -> Result<f32, EncodeError> {
        let method = self.config.method;
        let do_search = self.config.do_search();
        let size_search = self.config.target_size > 0;
        let rd_opt = method >= 3 || do_search;
        let total = self.mb_w * self.mb_h;
        let max_mbs = match method {
            // a quick pass over part of the frame
            3 if !do_search => {
                if total > 200 {
                    total >> 1
                } else {
                    100
                }
            }
            0 if !do_search => {
                if total > 200 {
                    total >> 2
                } else {
                    50
                }
            }
            _ => total,
        };

        let mut stats = PassStats::new(self.config);
        // A search first runs one pass that only moves the probabilities off
        // their defaults, so that size estimates are comparable between q.
        let mut calibrating = do_search;
        let mut passes_left = if do_search {
            self.config.passes.max(MIN_SEARCH_PASSES) + 1
        } else {
            self.config.passes
        };
        let mut pass_q = stats.q;

        while passes_left > 0 {
            passes_left -= 1;
            let is_last = !calibrating
                && (stats.is_converged() || passes_left == 0 || self.max_i4_header_bits == 0);
            pass_q = stats.q;
            let mut params = FrameParams::new(&self.analysis, self.config, pass_q);
            let pass = self.stat_pass(&mut params, rd_opt, max_mbs)?;
            self.passes = self.passes.saturating_add(1);
            let proba_bits = self.model.finalize(pass.mbs as u32);

            if self.max_i4_header_bits > 0 && pass.size_p0 > PARTITION0_BUDGET {
                passes_left += 1;
                self.max_i4_header_bits >>= 1;
                log::debug!(
                    "pass {}: first partition estimate {} bytes over the limit, \
                     subblock header budget now {}",
                    self.passes,
                    pass.size_p0 >> 11,
                    self.max_i4_header_bits
                );
                continue;
            }
            if calibrating {
                calibrating = false;
                log::trace!("pass {}: probabilities calibrated at q {:.2}", self.passes, pass_q);
                continue;
            }

            stats.value = if size_search {
                let size = pass.size + i64::from(proba_bits) + pass.size_p0;
                (((size + 1024) >> 11) + KEYFRAME_HEADER_SIZE as i64) as f64
            } else {
                psnr(pass.distortion, pass.mbs as u64 * 384)
            };
            log::debug!(
                "pass {}: q {:.2}, {} macroblocks, value {:.2} (target {:.2}), \
                 first partition estimate {} bytes",
                self.passes,
                pass_q,
                pass.mbs,
                stats.value,
                stats.target,
                pass.size_p0 >> 11
            );

            if is_last {
                break;
            }
            if do_search {
                stats.compute_next_q();
                if stats.is_converged() {
                    break;
                }
            }
        }
        // the model holds the probabilities of the pass run at `pass_q`
        Ok(pass_q)
    }

    /// Codes the frame at `quality` with the adapted probabilities.
    fn encode(&mut self, quality: f32) -> Result<(Vec<u8>, EncodeStats), EncodeError> {
        let mut params = FrameParams::new(&self.analysis, self.config, quality);
        let search = self.search_params(self.config.method >= 3);
        let num_partitions = 1usize << self.config.partitions;
        let mut partitions: Vec<ArithmeticEncoder> =
            (0..num_partitions).map(|_| ArithmeticEncoder::new()).collect();
        let skip_used = self.model.skip.used;

        let mut stats = EncodeStats {
            quality,
            ..EncodeStats::default()
        };
        let mut sse_planes = [0u64; 3];
        let mut modes = Vec::with_capacity(self.mb_w * self.mb_h);
        let mut it = self.iterator();
        loop {
            if it.x == 0 {
                self.stop.check()?;
            }
            let idx = it.mb_index();
            let px = it.import(&self.image);
            let segment = params.mb_segments[idx];
            let seg = &mut params.segments[usize::from(segment)];
            let hint = self.analysis.mbs[idx].hint;
            let decision = decimate(&mut it, &px, seg, &self.model, &search, hint);
            let skipped = decision.is_skipped();
            if !skipped || !skip_used {
                let w = &mut partitions[it.y % num_partitions];
                code_residuals(w, &mut it, &decision.rd, &self.model.coeffs);
            } else {
                it.reset_after_skip(!decision.rd.is_i4());
            }

            if decision.rd.is_i4() {
                stats.block_count_i4 += 1;
            } else {
                stats.block_count_i16 += 1;
            }
            if skipped {
                stats.block_count_skip += 1;
            }
            accumulate_sse(&mut sse_planes, &px, &decision.recon, it.visible_size());
            modes.push(MacroblockModes::new(segment, skipped, &decision.rd));

            it.set_modes(decision.rd.mode_i16, &decision.rd.modes_i4);
            it.save_boundary(&decision.recon);
            if !it.next() {
                break;
            }
        }

        let filter_level = adjust_filter_strength(&mut params.segments, self.config);
        let hdr = FrameHeader {
            width: self.image.width,
            height: self.image.height,
            segments: params.segment_header(),
            simple_filter: self.config.simple_filter,
            filter_level,
            sharpness: self.config.filter_sharpness,
            log2_partitions: self.config.partitions,
            base_quant: params.segments[0].quant,
            dq_uv_dc: params.dq_uv_dc,
            dq_uv_ac: params.dq_uv_ac,
        };

        let mut p0 = ArithmeticEncoder::new();
        write_frame_header(&mut p0, &hdr, &self.model);
        let segment_probas = hdr.segment_map_probas();
        let skip_proba = skip_used.then_some(self.model.skip.proba);
        it.reset();
        for mb in &modes {
            let (top, left) = it.mode_context();
            write_macroblock_header(&mut p0, segment_probas, skip_proba, mb, top, left);
            it.set_modes(mb.luma, &mb.sub);
            if !it.next() {
                break;
            }
        }

        let partition0 = p0.flush_and_get_buffer();
        let tokens: Vec<Vec<u8>> = partitions
            .into_iter()
            .map(ArithmeticEncoder::flush_and_get_buffer)
            .collect();
        let frame = assemble_frame(&hdr, &partition0, &tokens)?;

        let n = params.segments.len();
        stats.coded_size = frame.len() as u32;
        stats.header_bytes = KEYFRAME_HEADER_SIZE as u32;
        stats.mode_partition_bytes = partition0.len() as u32;
        stats.partition_bytes = tokens.iter().map(|p| p.len() as u32).collect();
        stats.segments = n as u8;
        stats.passes = self.passes;
        for i in 0..MAX_SEGMENTS {
            let seg = &params.segments[i.min(n - 1)];
            stats.segment_quant[i] = seg.quant;
            stats.segment_level[i] = if n > 1 { seg.fstrength } else { filter_level };
        }
        let luma = usize::from(self.image.width) * usize::from(self.image.height);
        let chroma = self.image.chroma_width() * self.image.chroma_height();
        let samples = [luma as u64, chroma as u64, chroma as u64];
        for p in 0..3 {
            stats.psnr[p] = psnr(sse_planes[p], samples[p]) as f32;
        }
        stats.psnr[3] = psnr(sse_planes.iter().sum(), samples.iter().sum()) as f32;

        log::debug!(
            "frame {}x{}: {} bytes at q {:.2}, first partition {} bytes, {} partitions, \
             filter level {}, {} segments, PSNR {:.2}",
            self.image.width,
            self.image.height,
            stats.coded_size,
            quality,
            stats.mode_partition_bytes,
            num_partitions,
            filter_level,
            n,
            stats.psnr[3]
        );
        Ok((frame, stats))
    }
}

/// Adds the squared error of the visible part of a macroblock.
fn accumulate_sse(
    acc: &mut [u64; 3],
    src: &MacroblockPixels,
    recon: &MacroblockPixels,
    (w, h): (usize, usize),
) {
    let (cw, ch) = (w.div_ceil(2), h.div_ceil(2));
    acc[0] += u64::from(sse(&src.y, Y_STRIDE, &recon.y, Y_STRIDE, w, h));
    acc[1] += u64::from(sse(&src.u, UV_STRIDE, &recon.u, UV_STRIDE, cw, ch));
    acc[2] += u64::from(sse(&src.v, UV_STRIDE, &recon.v, UV_STRIDE, cw, ch));
}

/// Encodes `image` as a raw key frame.
pub(crate) fn encode_frame_lossy(
    image: &YuvImage<'_>,
    config: &EncoderConfig,
    stop: &dyn enough::Stop,
) -> Result<(Vec<u8>, EncodeStats), EncodeError> {
    let mut encoder = Vp8Encoder::new(*image, config, stop);
    let quality = encoder.stat_loop()?;
    encoder.encode(quality)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::decode_frame;
    use alloc::vec;

    fn planes(w: usize, h: usize, f: impl Fn(usize, usize) -> u8) -> (Vec<u8>, Vec<u8>, Vec<u8>) {
        let y = (0..w * h).map(|i| f(i % w, i / w)).collect();
        let (cw, ch) = (w.div_ceil(2), h.div_ceil(2));
        let u = (0..cw * ch).map(|i| f(i % cw * 2, i / cw * 2) / 2 + 64).collect();
        let v = vec![128; cw * ch];
        (y, u, v)
    }

    fn textured(x: usize, y: usize) -> u8 {
        if x < 48 {
            (x * 2 + y) as u8
        } else {
            ((x * 7919 + y * 104_729) % 251) as u8
        }
    }

    #[test]
    fn first_search_step_moves_towards_the_target() {
        let config = EncoderConfig::new().with_quality(50.0).with_target_size(1000);
        let mut s = PassStats::new(&config);
        s.value = 3000.0;
        assert_eq!(s.compute_next_q(), 40.0);
        // 3000 at q 50, 1500 at q 40: the secant lands on q 36.67
        s.value = 1500.0;
        let q = s.compute_next_q();
        assert!((q - 36.666).abs() < 0.01, "{q}");
        assert!(!s.is_converged());
    }

    #[test]
    fn search_steps_are_clamped_and_stop_on_a_flat_response() {
        let config = EncoderConfig::new().with_quality(50.0).with_target_psnr(45.0);
        let mut s = PassStats::new(&config);
        s.value = 30.0;
        assert_eq!(s.compute_next_q(), 60.0);
        // almost no change in PSNR asks for a huge step
        s.value = 30.1;
        assert_eq!(s.compute_next_q(), 90.0);
        s.value = 30.1;
        assert_eq!(s.compute_next_q(), 90.0);
        assert!(s.is_converged());
    }

    #[test]
    fn unset_targets_default_to_40() {
        assert_eq!(PassStats::new(&EncoderConfig::new()).target, 40.0);
    }

    #[test]
    fn psnr_of_a_perfect_reconstruction_is_99() {
        assert_eq!(psnr(0, 100), 99.0);
        let p = psnr(100, 100);
        assert!((p - 48.13).abs() < 0.01, "{p}");
    }

    #[test]
    fn identical_segments_merge_into_one() {
        let (y, u, v) = planes(64, 64, textured);
        let image = YuvImage::new(64, 64, &y, &u, &v);
        let config = EncoderConfig::new()
            .with_sns_strength(0)
            .with_filter_strength(0);
        let analysis = analyze(&image, config.method, config.quality, 4);
        assert_eq!(analysis.num_segments, 4);
        let params = FrameParams::new(&analysis, &config, 75.0);
        assert_eq!(params.segments.len(), 1);
        assert!(params.mb_segments.iter().all(|&s| s == 0));
        assert!(params.segment_header().is_none());
        assert_eq!(params.map_bits, 0);
    }

    #[test]
    fn distinct_segments_get_a_header() {
        let (y, u, v) = planes(64, 64, textured);
        let image = YuvImage::new(64, 64, &y, &u, &v);
        let config = EncoderConfig::new().with_sns_strength(100);
        let analysis = analyze(&image, config.method, config.quality, 4);
        let params = FrameParams::new(&analysis, &config, 50.0);
        assert!(params.segments.len() > 1);
        let hdr = params.segment_header().unwrap();
        let n = params.segments.len();
        assert_eq!(hdr.quant[n - 1..], vec![params.segments[n - 1].quant; 5 - n][..]);
        assert!(params
            .mb_segments
            .iter()
            .all(|&s| usize::from(s) < params.segments.len()));
    }

    #[test]
    fn filter_strength_follows_blocky_edges() {
        let matrices =
            SegmentMatrices::from_segment(&Segment::from_index(40, &QuantDeltas::default()));
        let mut segments = vec![
            SegmentInfo::new(40, 0, matrices.clone(), 0),
            SegmentInfo::new(40, 0, matrices, 0),
        ];
        segments[0].fstrength = 3;
        segments[1].max_edge = 40;
        let config = EncoderConfig::new();
        let level = adjust_filter_strength(&mut segments, &config);
        assert_eq!(segments[0].fstrength, 3);
        assert!(segments[1].fstrength > 3);
        assert_eq!(level, segments[1].fstrength);

        let config = EncoderConfig::new().with_filter_strength(0);
        segments[0].fstrength = 0;
        assert_eq!(adjust_filter_strength(&mut segments, &config), 0);
    }

    #[test]
    fn flat_frame_skips_every_macroblock() {
        let (y, u, v) = (vec![128u8; 48 * 32], vec![128u8; 24 * 16], vec![128u8; 24 * 16]);
        let image = YuvImage::new(48, 32, &y, &u, &v);
        let (frame, stats) = encode_frame_lossy(&image, &EncoderConfig::new(), &enough::Unstoppable)
            .unwrap();
        assert_eq!(stats.block_count_skip, 6);
        assert_eq!(stats.block_count_i16, 6);
        assert_eq!(stats.psnr[3], 99.0);
        assert_eq!(stats.coded_size as usize, frame.len());
        let decoded = decode_frame(&frame).unwrap();
        assert!(decoded.y.iter().all(|&p| p == 128));
    }

    #[test]
    fn tokens_spread_over_partitions() {
        let (y, u, v) = planes(64, 64, textured);
        let image = YuvImage::new(64, 64, &y, &u, &v);
        let config = EncoderConfig::new().with_partitions(2);
        let (frame, stats) =
            encode_frame_lossy(&image, &config, &enough::Unstoppable).unwrap();
        assert_eq!(stats.partition_bytes.len(), 4);
        assert!(stats.partition_bytes.iter().all(|&n| n > 0));
        let total = stats.header_bytes
            + stats.mode_partition_bytes
            + 3 * 3
            + stats.partition_bytes.iter().sum::<u32>();
        assert_eq!(total as usize, frame.len());
        assert_eq!(
            stats.block_count_i4 + stats.block_count_i16,
            16,
            "every macroblock is counted once"
        );
    }

    #[test]
    fn target_size_search_lands_near_the_target() {
        let (y, u, v) = planes(96, 96, textured);
        let image = YuvImage::new(96, 96, &y, &u, &v);
        let loose = encode_frame_lossy(&image, &EncoderConfig::new(), &enough::Unstoppable)
            .unwrap()
            .0
            .len() as u32;
        let config = EncoderConfig::new().with_target_size(loose / 2);
        let (frame, stats) = encode_frame_lossy(&image, &config, &enough::Unstoppable).unwrap();
        // one calibration pass, then the search
        assert!(stats.passes >= 2);
        assert!(stats.passes <= MIN_SEARCH_PASSES + 1);
        assert!(stats.quality < 75.0);
        assert!((frame.len() as u32) < loose, "{} vs {loose}", frame.len());
        assert_eq!(decode_frame(&frame).unwrap().y.len(), 96 * 96);
    }
}
