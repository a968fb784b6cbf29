//! Rate-distortion bookkeeping.
//!
//! A candidate is scored as `(R + H) * lambda + RD_DISTO_MULT * (D + SD)`:
//! `R` is the coefficient rate and `H` the mode header rate, both in 1/256
//! bit; `D` is the squared error of the reconstruction and `SD` the weighted
//! spectral distortion. Lower is better.
//!
//! - [`distortion`]: SSE, spectral distortion and flatness tests
//! - [`lambda`]: lambdas and loop filter strength
//! - [`level_costs`]: per-level cost tables derived from token probabilities
//! - [`stats`]: token and skip statistics for probability adaptation

pub mod distortion;
pub mod lambda;
pub mod level_costs;
pub mod stats;

pub use distortion::{
    is_flat, is_flat_source_16, sse, tdisto_16x16, tdisto_4x4, FLATNESS_LIMIT_I16,
    FLATNESS_LIMIT_I4, FLATNESS_LIMIT_UV, FLATNESS_PENALTY, WEIGHT_Y,
};
pub use lambda::{
    calc_i4_penalty, calc_lambda_i16, calc_lambda_i4, calc_lambda_mode, calc_lambda_uv,
    calc_tlambda, filter_strength_from_delta, segment_filter_level, LAMBDA_I16, LAMBDA_I4,
    LAMBDA_UV,
};
pub use level_costs::LevelCosts;
pub use stats::{finalize_token_probas, record_coeffs, ProbaStats, SkipProba};

use crate::common::types::{ChromaMode, IntraMode, LumaMode, TokenProbTables, COEFF_PROBS};

/// Scale of distortion against rate.
pub const RD_DISTO_MULT: i64 = 256;

/// Score of a candidate that has not been evaluated.
pub const MAX_COST: i64 = 0x7fff_ffff_ffff_ff;

/// `(a * b + 128) >> 8`
#[inline]
pub fn mult_8b(a: u32, b: u32) -> i64 {
    (i64::from(a) * i64::from(b) + 128) >> 8
}

/// Scores and levels of the best candidate found so far for one macroblock.
#[derive(Clone, Debug)]
pub struct ModeScore {
    /// Squared error.
    pub d: i64,
    /// Spectral distortion.
    pub sd: i64,
    /// Header bits.
    pub h: i64,
    /// Coefficient bits.
    pub r: i64,
    /// Combined score.
    pub score: i64,
    /// Packed non-zero flags of the reconstruction.
    pub nz: u32,
    /// Luma mode; [`LumaMode::B`] when the subblock modes apply.
    pub mode_i16: LumaMode,
    /// Subblock modes in raster order.
    pub modes_i4: [IntraMode; 16],
    /// Chroma mode.
    pub mode_uv: ChromaMode,
    /// Y2 levels in zigzag order.
    pub y_dc_levels: [i32; 16],
    /// Luma levels per subblock in zigzag order.
    pub y_ac_levels: [[i32; 16]; 16],
    /// Chroma levels, four U blocks then four V blocks.
    pub uv_levels: [[i32; 16]; 8],
}

impl Default for ModeScore {
    fn default() -> Self {
        Self {
            d: 0,
            sd: 0,
            h: 0,
            r: 0,
            score: MAX_COST,
            nz: 0,
            mode_i16: LumaMode::DC,
            modes_i4: [IntraMode::DC; 16],
            mode_uv: ChromaMode::DC,
            y_dc_levels: [0; 16],
            y_ac_levels: [[0; 16]; 16],
            uv_levels: [[0; 16]; 8],
        }
    }
}

impl ModeScore {
    /// A candidate scoring worse than anything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the score as unset and clears the accumulated terms.
    pub fn init_score(&mut self) {
        self.d = 0;
        self.sd = 0;
        self.h = 0;
        self.r = 0;
        self.nz = 0;
        self.score = MAX_COST;
    }

    /// Copies the four score terms of `other`.
    pub fn copy_score(&mut self, other: &ModeScore) {
        self.d = other.d;
        self.sd = other.sd;
        self.h = other.h;
        self.r = other.r;
        self.nz = other.nz;
        self.score = other.score;
    }

    /// Accumulates the terms of `other`.
    pub fn add_score(&mut self, other: &ModeScore) {
        self.d += other.d;
        self.sd += other.sd;
        self.h += other.h;
        self.r += other.r;
        self.nz |= other.nz;
        self.score += other.score;
    }

    /// Recomputes `score` with `lambda`.
    #[inline]
    pub fn set_rd_score(&mut self, lambda: u32) {
        self.score = (self.r + self.h) * i64::from(lambda) + RD_DISTO_MULT * (self.d + self.sd);
    }

    /// Whether the luma levels belong to the subblock modes.
    pub fn is_i4(&self) -> bool {
        self.mode_i16 == LumaMode::B
    }
}

/// Adaptive probabilities of a frame and the statistics that drive them.
#[derive(Clone)]
pub struct ProbaModel {
    /// Segment id tree probabilities.
    pub segments: [u8; 3],
    /// Token probabilities.
    pub coeffs: TokenProbTables,
    /// Token counts of the current pass.
    pub stats: ProbaStats,
    /// Level costs for `coeffs`.
    pub level_costs: LevelCosts,
    /// Skip flag statistics.
    pub skip: SkipProba,
}

impl Default for ProbaModel {
    fn default() -> Self {
        Self::new()
    }
}

impl ProbaModel {
    /// Default token probabilities, ready to be costed.
    pub fn new() -> Self {
        let mut level_costs = LevelCosts::new();
        level_costs.calculate(&COEFF_PROBS);
        Self {
            segments: [255; 3],
            coeffs: COEFF_PROBS,
            stats: ProbaStats::new(),
            level_costs,
            skip: SkipProba::default(),
        }
    }

    /// Clears the statistics before a pass.
    pub fn reset_stats(&mut self) {
        self.stats.reset();
        self.skip.nb_skip = 0;
    }

    /// Turns the pass statistics into probabilities for the next pass.
    ///
    /// Returns the estimated header size of the probabilities in 1/256 bit.
    pub fn finalize(&mut self, nb_mbs: u32) -> u32 {
        let skip_size = self.skip.finalize(nb_mbs);
        let (token_size, changed) = finalize_token_probas(&self.stats, &mut self.coeffs);
        if changed {
            self.level_costs.mark_dirty();
        }
        self.level_costs.calculate(&self.coeffs);
        skip_size + token_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rd_score_combines_rate_and_distortion() {
        let mut s = ModeScore::new();
        assert_eq!(s.score, MAX_COST);
        s.d = 10;
        s.sd = 2;
        s.r = 300;
        s.h = 100;
        s.set_rd_score(5);
        assert_eq!(s.score, 400 * 5 + 256 * 12);
    }

    #[test]
    fn add_accumulates_and_ors_nz() {
        let mut a = ModeScore::new();
        a.init_score();
        a.score = 0;
        let mut b = ModeScore::new();
        b.d = 3;
        b.r = 7;
        b.nz = 1 << 24;
        b.score = 11;
        a.nz = 1;
        a.add_score(&b);
        a.add_score(&b);
        assert_eq!((a.d, a.r, a.score), (6, 14, 22));
        assert_eq!(a.nz, 1 | 1 << 24);
    }

    #[test]
    fn mult_8b_rounds() {
        assert_eq!(mult_8b(256, 7), 7);
        assert_eq!(mult_8b(128, 3), 2);
        assert_eq!(mult_8b(0, 99), 0);
    }

    #[test]
    fn model_without_statistics_keeps_defaults() {
        let mut model = ProbaModel::new();
        model.reset_stats();
        model.finalize(10);
        assert_eq!(model.coeffs, COEFF_PROBS);
        assert!(!model.skip.used);
        assert!(!model.level_costs.is_dirty());
    }
}
