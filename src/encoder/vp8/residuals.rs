//! Coefficient token coding and statistics recording.
//!
//! Both passes walk the blocks of a macroblock in bitstream order (Y2, 16
//! luma, 4 Cb, 4 Cr), deriving each block's context from the non-zero flags
//! of its upper and left neighbours.

use crate::common::types::{
    TokenProbTables, COEFF_BANDS, DCT_CAT_BASE, PLANE_UV, PLANE_Y2, PLANE_Y_NO_DC,
    PLANE_Y_WITH_DC, PROB_DCT_CAT,
};
use crate::encoder::analysis::iterator::MacroblockIterator;
use crate::encoder::arithmetic::ArithmeticEncoder;
use crate::encoder::cost::{record_coeffs, ModeScore, ProbaStats};
use crate::encoder::residual_cost::Residual;
use crate::encoder::tables::{dct_category, dct_category_bits};

/// Writes the tokens of one block starting in context `ctx`.
///
/// Returns whether the block has any non-zero level.
pub(crate) fn put_coeffs(
    w: &mut ArithmeticEncoder,
    ctx: usize,
    res: &Residual,
    probs: &TokenProbTables,
) -> bool {
    let planes = &probs[res.coeff_type];
    let band = |n: usize| usize::from(COEFF_BANDS[n]);
    let mut n = res.first;
    let mut p = &planes[band(n)][ctx];
    w.write_bool(res.last >= 0, p[0]);
    if res.last < 0 {
        return false;
    }
    let last = res.last as usize;

    while n < 16 {
        let c = res.coeffs[n];
        n += 1;
        let v = c.unsigned_abs() as usize;
        w.write_bool(v != 0, p[1]);
        if v == 0 {
            p = &planes[band(n)][0];
            continue;
        }
        w.write_bool(v > 1, p[2]);
        if v == 1 {
            p = &planes[band(n)][1];
        } else {
            put_large_value(w, v, p);
            p = &planes[band(n)][2];
        }
        w.write_flag(c < 0);
        if n == 16 {
            break;
        }
        w.write_bool(n <= last, p[0]);
        if n > last {
            break;
        }
    }
    true
}

// Magnitudes of 2 and above, after the "greater than one" bit.
fn put_large_value(w: &mut ArithmeticEncoder, v: usize, p: &[u8; 11]) {
    w.write_bool(v > 4, p[3]);
    if v <= 4 {
        w.write_bool(v != 2, p[4]);
        if v != 2 {
            w.write_bool(v == 4, p[5]);
        }
        return;
    }
    w.write_bool(v > 10, p[6]);
    if v <= 10 {
        w.write_bool(v > 6, p[7]);
    } else {
        let cat = dct_category(v);
        // categories 3 to 6 as a two-bit index
        let (hi, lo) = ((cat - 2) >> 1 != 0, (cat - 2) & 1 != 0);
        w.write_bool(hi, p[8]);
        w.write_bool(lo, p[9 + usize::from(hi)]);
    }
    let cat = dct_category(v);
    let nbits = dct_category_bits(cat);
    let extra = v - usize::from(DCT_CAT_BASE[cat]);
    for (i, &prob) in PROB_DCT_CAT[cat][..nbits].iter().enumerate() {
        w.write_bool((extra >> (nbits - 1 - i)) & 1 != 0, prob);
    }
}

// Visits every block of the macroblock in bitstream order, updating the
// iterator's neighbour flags with what `visit` reports.
fn for_each_block(
    it: &mut MacroblockIterator,
    rd: &ModeScore,
    mut visit: impl FnMut(usize, &Residual) -> bool,
) {
    it.nz_to_bytes();

    let (plane, first) = if rd.is_i4() {
        (PLANE_Y_WITH_DC, 0)
    } else {
        let res = Residual::new(&rd.y_dc_levels, PLANE_Y2, 0);
        let ctx = usize::from(it.top_nz[8] + it.left_nz[8]);
        let nz = u8::from(visit(ctx, &res));
        it.top_nz[8] = nz;
        it.left_nz[8] = nz;
        (PLANE_Y_NO_DC, 1)
    };

    for y in 0..4 {
        for x in 0..4 {
            let ctx = usize::from(it.top_nz[x] + it.left_nz[y]);
            let res = Residual::new(&rd.y_ac_levels[y * 4 + x], plane, first);
            let nz = u8::from(visit(ctx, &res));
            it.top_nz[x] = nz;
            it.left_nz[y] = nz;
        }
    }

    for ch in [0, 2] {
        for y in 0..2 {
            for x in 0..2 {
                let ctx = usize::from(it.top_nz[4 + ch + x] + it.left_nz[4 + ch + y]);
                let res = Residual::new(&rd.uv_levels[ch * 2 + y * 2 + x], PLANE_UV, 0);
                let nz = u8::from(visit(ctx, &res));
                it.top_nz[4 + ch + x] = nz;
                it.left_nz[4 + ch + y] = nz;
            }
        }
    }

    it.bytes_to_nz();
}

/// Writes the tokens of the current macroblock.
pub(crate) fn code_residuals(
    w: &mut ArithmeticEncoder,
    it: &mut MacroblockIterator,
    rd: &ModeScore,
    probs: &TokenProbTables,
) {
    for_each_block(it, rd, |ctx, res| put_coeffs(w, ctx, res, probs));
}

/// Counts the token bits of the current macroblock into `stats`.
pub(crate) fn record_residuals(it: &mut MacroblockIterator, rd: &ModeScore, stats: &mut ProbaStats) {
    for_each_block(it, rd, |ctx, res| record_coeffs(ctx, res, stats));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::COEFF_PROBS;
    use crate::decoder::bit_reader::BoolReader;
    use crate::encoder::cost::LevelCosts;
    use crate::encoder::residual_cost::get_residual_cost;

    // Mirror of the token grammar, reading back what `put_coeffs` wrote.
    fn read_block(r: &mut BoolReader<'_>, ctype: usize, first: usize, ctx: usize) -> [i32; 16] {
        let planes = &COEFF_PROBS[ctype];
        let band = |n: usize| usize::from(COEFF_BANDS[n]);
        let mut out = [0i32; 16];
        let mut n = first;
        let mut p = &planes[band(n)][ctx];
        while n < 16 {
            if !r.read_bool(p[0]) {
                break;
            }
            while !r.read_bool(p[1]) {
                n += 1;
                p = &planes[band(n)][0];
            }
            let v = if !r.read_bool(p[2]) {
                p = &planes[band(n + 1)][1];
                1
            } else {
                let v = if !r.read_bool(p[3]) {
                    if !r.read_bool(p[4]) {
                        2
                    } else {
                        3 + i32::from(r.read_bool(p[5]))
                    }
                } else {
                    let cat = if !r.read_bool(p[6]) {
                        usize::from(r.read_bool(p[7]))
                    } else {
                        let hi = usize::from(r.read_bool(p[8]));
                        let lo = usize::from(r.read_bool(p[9 + hi]));
                        2 + 2 * hi + lo
                    };
                    let extra = PROB_DCT_CAT[cat]
                        .iter()
                        .take_while(|&&p| p != 0)
                        .fold(0, |v, &prob| 2 * v + i32::from(r.read_bool(prob)));
                    i32::from(DCT_CAT_BASE[cat]) + extra
                };
                p = &planes[band(n + 1)][2];
                v
            };
            out[n] = if r.read_flag() { -v } else { v };
            n += 1;
        }
        out
    }

    #[test]
    fn empty_block_is_a_single_bit() {
        let levels = [0i32; 16];
        let mut w = ArithmeticEncoder::new();
        let res = Residual::new(&levels, PLANE_UV, 0);
        assert!(!put_coeffs(&mut w, 1, &res, &COEFF_PROBS));
        let data = w.flush_and_get_buffer();
        let mut r = BoolReader::new(&data);
        assert!(!r.read_bool(COEFF_PROBS[PLANE_UV][0][1][0]));
    }

    #[test]
    fn tokens_read_back_for_every_magnitude_class() {
        let blocks: [([i32; 16], usize, usize); 4] = [
            ([3, 0, -1, 0, 0, 2, 0, 0, 0, 0, 0, 0, 0, 0, 0, 4], PLANE_Y_WITH_DC, 0),
            ([0, 6, -9, 0, 15, 30, -60, 0, 0, 100, 0, 0, 0, 0, 0, 0], PLANE_Y_NO_DC, 1),
            ([-2047, 67, 66, 35, 34, 19, 18, 11, 10, 7, 5, 1, 0, 0, 0, 0], PLANE_Y2, 0),
            ([1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, -1], PLANE_UV, 0),
        ];
        let mut w = ArithmeticEncoder::new();
        for (i, (levels, ctype, first)) in blocks.iter().enumerate() {
            let res = Residual::new(levels, *ctype, *first);
            assert!(put_coeffs(&mut w, i % 3, &res, &COEFF_PROBS));
        }
        let data = w.flush_and_get_buffer();
        let mut r = BoolReader::new(&data);
        for (i, (levels, ctype, first)) in blocks.iter().enumerate() {
            assert_eq!(read_block(&mut r, *ctype, *first, i % 3), *levels, "block {i}");
        }
    }

    #[test]
    fn written_size_tracks_the_cost_estimate() {
        let mut costs = LevelCosts::new();
        costs.calculate(&COEFF_PROBS);
        let levels = [12, -3, 0, 5, 1, 0, 0, -1, 0, 0, 2, 0, 0, 0, 0, 0];
        let res = Residual::new(&levels, PLANE_Y_WITH_DC, 0);
        let estimate = get_residual_cost(0, &res, &costs, &COEFF_PROBS);

        let mut w = ArithmeticEncoder::new();
        for _ in 0..200 {
            put_coeffs(&mut w, 0, &res, &COEFF_PROBS);
        }
        let bits = w.flush_and_get_buffer().len() as f64 * 8.0 / 200.0;
        let predicted = f64::from(estimate) / 256.0;
        assert!((bits - predicted).abs() < predicted * 0.1 + 1.0, "{bits} vs {predicted}");
    }

    #[test]
    fn recording_updates_neighbour_flags() {
        let mut it = MacroblockIterator::new(32, 16);
        let mut rd = ModeScore::new();
        rd.y_dc_levels[0] = 4;
        rd.y_ac_levels[13][1] = 1;
        rd.y_ac_levels[7][2] = 1;
        rd.uv_levels[7][0] = -2;
        let mut stats = ProbaStats::new();
        record_residuals(&mut it, &rd, &mut stats);
        // top holds the bottom row of blocks, left the right column
        assert_eq!(it.top_nz, [0, 1, 0, 0, 0, 0, 0, 1, 1]);
        assert_eq!(it.left_nz, [0, 1, 0, 0, 0, 0, 0, 1, 1]);
        assert_eq!(it.packed_nz(), 1 << 24 | 1 << 23 | 1 << 13 | 1 << 7);
        assert!(stats.counts(PLANE_Y2, 0, 0, 0).0 > 0);
    }
}
