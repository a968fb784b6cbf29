//! Level cost tables.
//!
//! For every `[type][band][context]` the table holds the cost of coding each
//! level from 0 to [`MAX_VARIABLE_LEVEL`], derived purely from the eleven
//! token probabilities of that slot. Larger levels reuse the last entry; the
//! remainder of their cost lives in [`LEVEL_FIXED_COSTS`].

use super::stats::{NUM_BANDS, NUM_CTX, NUM_PROBAS, NUM_TYPES};
use crate::common::types::{Prob, TokenProbTables, COEFF_BANDS};
use crate::encoder::tables::{bit_cost, LEVEL_CODES, LEVEL_FIXED_COSTS, MAX_LEVEL, MAX_VARIABLE_LEVEL};

/// Costs of levels `0..=MAX_VARIABLE_LEVEL` for one probability slot.
pub type LevelCostArray = [u16; MAX_VARIABLE_LEVEL + 1];

/// Level costs indexed by `[type][band][context]`.
pub type LevelCostTables = [[[LevelCostArray; NUM_CTX]; NUM_BANDS]; NUM_TYPES];

/// Cost of the tree decisions below node 2 for a level of at least 1.
fn variable_level_cost(level: usize, probas: &[Prob; NUM_PROBAS]) -> u16 {
    let (mut pattern, mut bits) = LEVEL_CODES[level.min(MAX_VARIABLE_LEVEL) - 1];
    let mut cost = 0;
    let mut node = 2;
    while pattern != 0 {
        if pattern & 1 != 0 {
            cost += bit_cost(bits & 1 != 0, probas[node]);
        }
        pattern >>= 1;
        bits >>= 1;
        node += 1;
    }
    cost
}

/// Precomputed level costs for the current token probabilities.
#[derive(Clone)]
pub struct LevelCosts {
    level_cost: LevelCostTables,
    dirty: bool,
}

impl Default for LevelCosts {
    fn default() -> Self {
        Self::new()
    }
}

impl LevelCosts {
    /// Empty tables, marked as needing a [`LevelCosts::calculate`].
    pub fn new() -> Self {
        Self {
            level_cost: [[[[0; MAX_VARIABLE_LEVEL + 1]; NUM_CTX]; NUM_BANDS]; NUM_TYPES],
            dirty: true,
        }
    }

    /// Flags the tables as stale after a probability change.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Whether [`LevelCosts::calculate`] has work to do.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Rebuilds the tables from `probs` if they are stale.
    ///
    /// `cost(0) = bitcost(0, p1) + bitcost(ctx > 0, p0)` and each level above
    /// adds the token-tree path of that level. At context 0 the "more
    /// coefficients" bit is left out: after a zero it is never coded.
    pub fn calculate(&mut self, probs: &TokenProbTables) {
        if !self.dirty {
            return;
        }
        for (ctype, type_probs) in probs.iter().enumerate() {
            for (band, band_probs) in type_probs.iter().enumerate() {
                for (ctx, p) in band_probs.iter().enumerate() {
                    let cost0 = if ctx > 0 { bit_cost(true, p[0]) } else { 0 };
                    let cost_base = bit_cost(true, p[1]) + cost0;
                    let table = &mut self.level_cost[ctype][band][ctx];
                    table[0] = bit_cost(false, p[1]) + cost0;
                    for (v, entry) in table.iter_mut().enumerate().skip(1) {
                        *entry = cost_base + variable_level_cost(v, p);
                    }
                }
            }
        }
        self.dirty = false;
    }

    /// The cost table for coefficient position `n` (0..16).
    #[inline]
    pub fn table(&self, ctype: usize, n: usize, ctx: usize) -> &LevelCostArray {
        &self.level_cost[ctype][usize::from(COEFF_BANDS[n])][ctx]
    }

    /// Full cost of `level` at position `n`: fixed part plus table part.
    #[inline]
    pub fn level_cost(&self, ctype: usize, n: usize, ctx: usize, level: usize) -> u32 {
        let fixed = u32::from(LEVEL_FIXED_COSTS[level.min(MAX_LEVEL as usize)]);
        fixed + u32::from(self.table(ctype, n, ctx)[level.min(MAX_VARIABLE_LEVEL)])
    }
}
