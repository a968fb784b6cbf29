//! Token statistics for adaptive probabilities.
//!
//! During a statistics pass every coded token bit is counted per
//! `[type][band][context][node]`. At the end of the pass each probability is
//! replaced by its empirical value when that is cheaper than keeping the
//! default, including the cost of signalling the change.

use crate::common::types::{TokenProbTables, COEFF_BANDS, COEFF_PROBS, COEFF_UPDATE_PROBS};
use crate::encoder::residual_cost::Residual;
use crate::encoder::tables::{bit_cost, LEVEL_CODES, MAX_VARIABLE_LEVEL};

/// Number of token plane types.
pub const NUM_TYPES: usize = 4;
/// Number of coefficient bands.
pub const NUM_BANDS: usize = 8;
/// Number of neighbour contexts.
pub const NUM_CTX: usize = 3;
/// Number of token tree nodes per slot.
pub const NUM_PROBAS: usize = 11;

/// Skip probabilities at or above this are not worth signalling.
const SKIP_PROBA_THRESHOLD: u8 = 250;

/// Counters packed as `total << 16 | ones`.
#[derive(Clone, Default)]
pub struct ProbaStats {
    /// `[type][band][context][node]`
    pub stats: [[[[u32; NUM_PROBAS]; NUM_CTX]; NUM_BANDS]; NUM_TYPES],
}

impl ProbaStats {
    /// Empty counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Zeroes every counter.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Counts one `bit` at a node and returns it.
    #[inline]
    pub fn record(&mut self, t: usize, b: usize, c: usize, p: usize, bit: bool) -> bool {
        record_stat(&mut self.stats[t][b][c][p], bit)
    }

    /// Total and ones counted at a node.
    pub fn counts(&self, t: usize, b: usize, c: usize, p: usize) -> (u32, u32) {
        let s = self.stats[t][b][c][p];
        (s >> 16, s & 0xffff)
    }
}

/// Adds one event to a packed counter, halving both halves before either
/// can overflow.
#[inline]
pub(crate) fn record_stat(stats: &mut u32, bit: bool) -> bool {
    if *stats >= 0xfffe_0000 {
        *stats = ((*stats + 1) >> 1) & 0x7fff_7fff;
    }
    *stats += 0x0001_0000 + u32::from(bit);
    bit
}

/// Probability of a zero given `nb` ones out of `total`.
#[inline]
pub fn calc_token_proba(nb: u32, total: u32) -> u8 {
    if nb == 0 {
        255
    } else {
        (255 - nb * 255 / total) as u8
    }
}

/// Cost of coding `nb` ones and `total - nb` zeros with `proba`.
#[inline]
fn branch_cost(nb: u32, total: u32, proba: u8) -> u32 {
    nb * u32::from(bit_cost(true, proba)) + (total - nb) * u32::from(bit_cost(false, proba))
}

/// Counts the token bits `res` would produce, starting in context `ctx`.
///
/// Returns whether the block has any non-zero coefficient.
pub fn record_coeffs(ctx: usize, res: &Residual, stats: &mut ProbaStats) -> bool {
    let t = res.coeff_type;
    let mut n = res.first;
    let mut slot = (usize::from(COEFF_BANDS[n]), ctx);
    if res.last < 0 {
        stats.record(t, slot.0, slot.1, 0, false);
        return false;
    }
    let last = res.last as usize;
    while n <= last {
        stats.record(t, slot.0, slot.1, 0, true);
        let mut v = res.coeffs[n];
        n += 1;
        while v == 0 {
            stats.record(t, slot.0, slot.1, 1, false);
            slot = (usize::from(COEFF_BANDS[n]), 0);
            v = res.coeffs[n];
            n += 1;
        }
        stats.record(t, slot.0, slot.1, 1, true);
        let v = v.unsigned_abs() as usize;
        if !stats.record(t, slot.0, slot.1, 2, v > 1) {
            slot = (usize::from(COEFF_BANDS[n]), 1);
        } else {
            let (mut pattern, bits) = LEVEL_CODES[v.min(MAX_VARIABLE_LEVEL) - 1];
            let mut i = 0;
            loop {
                pattern >>= 1;
                if pattern == 0 {
                    break;
                }
                if pattern & 1 != 0 {
                    stats.record(t, slot.0, slot.1, 3 + i, bits & (2 << i) != 0);
                }
                i += 1;
            }
            slot = (usize::from(COEFF_BANDS[n]), 2);
        }
    }
    if n < 16 {
        stats.record(t, slot.0, slot.1, 0, false);
    }
    true
}

/// Chooses the probabilities to code the next pass with.
///
/// Every slot starts from the format default; an empirical probability wins
/// only if it saves more than its 8-bit update costs. Returns the estimated
/// size of the update section in 1/256 bit and whether any probability
/// differs from the default.
pub fn finalize_token_probas(stats: &ProbaStats, probs: &mut TokenProbTables) -> (u32, bool) {
    let mut changed = false;
    let mut size = 0u32;
    for t in 0..NUM_TYPES {
        for b in 0..NUM_BANDS {
            for c in 0..NUM_CTX {
                for p in 0..NUM_PROBAS {
                    let (total, nb) = stats.counts(t, b, c, p);
                    let update_proba = COEFF_UPDATE_PROBS[t][b][c][p];
                    let old_p = COEFF_PROBS[t][b][c][p];
                    let new_p = calc_token_proba(nb, total);
                    let old_cost =
                        branch_cost(nb, total, old_p) + u32::from(bit_cost(false, update_proba));
                    let new_cost = branch_cost(nb, total, new_p)
                        + u32::from(bit_cost(true, update_proba))
                        + 8 * 256;
                    let use_new = old_cost > new_cost;
                    size += u32::from(bit_cost(use_new, update_proba));
                    if use_new {
                        probs[t][b][c][p] = new_p;
                        changed |= new_p != old_p;
                        size += 8 * 256;
                    } else {
                        probs[t][b][c][p] = old_p;
                    }
                }
            }
        }
    }
    (size, changed)
}

/// Skip flag statistics and the resulting probability.
#[derive(Clone, Copy, Debug, Default)]
pub struct SkipProba {
    /// Macroblocks with no coded coefficients in this pass.
    pub nb_skip: u32,
    /// Probability that a macroblock is not skipped.
    pub proba: u8,
    /// Whether skip flags are coded at all.
    pub used: bool,
}

impl SkipProba {
    /// Derives the probability from the pass counts and returns the
    /// estimated cost of the skip flags in 1/256 bit.
    pub fn finalize(&mut self, nb_mbs: u32) -> u32 {
        let nb_events = self.nb_skip.min(nb_mbs);
        self.proba = if nb_mbs == 0 {
            255
        } else {
            ((nb_mbs - nb_events) * 255 / nb_mbs) as u8
        };
        self.used = self.proba < SKIP_PROBA_THRESHOLD;
        let mut size = 256;
        if self.used {
            size += nb_events * u32::from(bit_cost(true, self.proba))
                + (nb_mbs - nb_events) * u32::from(bit_cost(false, self.proba));
            size += 8 * 256;
        }
        size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::{PLANE_UV, PLANE_Y_WITH_DC};

    #[test]
    fn record_packs_total_and_ones() {
        let mut stats = ProbaStats::new();
        stats.record(1, 2, 0, 3, true);
        stats.record(1, 2, 0, 3, false);
        stats.record(1, 2, 0, 3, true);
        assert_eq!(stats.counts(1, 2, 0, 3), (3, 2));
    }

    #[test]
    fn counters_halve_before_overflow() {
        let mut s = 0xfffe_0000 | 0x8000;
        record_stat(&mut s, true);
        let (total, ones) = (s >> 16, s & 0xffff);
        assert_eq!(total, 0x7fff + 1);
        assert_eq!(ones, 0x4000 + 1);

        let mut s = 0;
        for i in 0..200_000u32 {
            record_stat(&mut s, i % 4 == 0);
            assert!(s >> 16 >= s & 0xffff);
        }
        // the ratio survives the halvings
        let ratio = f64::from(s & 0xffff) / f64::from(s >> 16);
        assert!((ratio - 0.25).abs() < 0.01);
    }

    #[test]
    fn token_proba_of_counts() {
        assert_eq!(calc_token_proba(0, 0), 255);
        assert_eq!(calc_token_proba(0, 10), 255);
        assert_eq!(calc_token_proba(10, 10), 0);
        assert_eq!(calc_token_proba(5, 10), 128);
    }

    #[test]
    fn empty_block_records_a_single_eob() {
        let mut stats = ProbaStats::new();
        let levels = [0i32; 16];
        let res = Residual::new(&levels, PLANE_UV, 0);
        assert!(!record_coeffs(1, &res, &mut stats));
        assert_eq!(stats.counts(PLANE_UV, 0, 1, 0), (1, 0));
        let total: u32 = stats.stats.iter().flatten().flatten().flatten().map(|s| s >> 16).sum();
        assert_eq!(total, 1);
    }

    #[test]
    fn records_follow_the_token_path() {
        let mut stats = ProbaStats::new();
        let mut levels = [0i32; 16];
        levels[0] = 1;
        levels[2] = -3;
        let res = Residual::new(&levels, PLANE_Y_WITH_DC, 0);
        assert!(record_coeffs(0, &res, &mut stats));
        let t = PLANE_Y_WITH_DC;
        // position 0: not EOB, non-zero, one
        assert_eq!(stats.counts(t, 0, 0, 0), (1, 1));
        assert_eq!(stats.counts(t, 0, 0, 1), (1, 1));
        assert_eq!(stats.counts(t, 0, 0, 2), (1, 0));
        // position 1 in context 1: not EOB, zero
        assert_eq!(stats.counts(t, 1, 1, 0), (1, 1));
        assert_eq!(stats.counts(t, 1, 1, 1), (1, 0));
        // position 2 in context 0, no EOB check after a zero: 3 = >1, <=4, >2, !=4
        assert_eq!(stats.counts(t, 2, 0, 0), (0, 0));
        assert_eq!(stats.counts(t, 2, 0, 1), (1, 1));
        assert_eq!(stats.counts(t, 2, 0, 2), (1, 1));
        assert_eq!(stats.counts(t, 2, 0, 3), (1, 0));
        assert_eq!(stats.counts(t, 2, 0, 4), (1, 1));
        assert_eq!(stats.counts(t, 2, 0, 5), (1, 0));
        // EOB at position 3 in context 2
        assert_eq!(stats.counts(t, 3, 2, 0), (1, 0));
    }

    #[test]
    fn unused_statistics_keep_defaults() {
        let stats = ProbaStats::new();
        let mut probs = [[[[0u8; NUM_PROBAS]; NUM_CTX]; NUM_BANDS]; NUM_TYPES];
        let (size, changed) = finalize_token_probas(&stats, &mut probs);
        assert!(!changed);
        assert_eq!(probs, COEFF_PROBS);
        let expected: u32 = COEFF_UPDATE_PROBS
            .iter()
            .flatten()
            .flatten()
            .flatten()
            .map(|&p| u32::from(bit_cost(false, p)))
            .sum();
        assert_eq!(size, expected);
    }

    #[test]
    fn skewed_statistics_update_probabilities() {
        let mut stats = ProbaStats::new();
        // type 2 band 1 ctx 0 node 0 defaults to 1, make it almost always zero
        for _ in 0..5000 {
            stats.record(2, 1, 0, 0, false);
        }
        let mut probs = COEFF_PROBS;
        let (_, changed) = finalize_token_probas(&stats, &mut probs);
        assert!(changed);
        assert_eq!(probs[2][1][0][0], 255);
    }

    #[test]
    fn skip_proba() {
        let mut skip = SkipProba {
            nb_skip: 90,
            ..SkipProba::default()
        };
        let size = skip.finalize(100);
        assert_eq!(skip.proba, 25);
        assert!(skip.used);
        assert!(size > 256 + 8 * 256);

        let mut skip = SkipProba::default();
        assert_eq!(skip.finalize(100), 256);
        assert_eq!(skip.proba, 255);
        assert!(!skip.used);
    }
}
