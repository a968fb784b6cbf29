//! Encoder-side constant tables.
//!
//! The entropy and level cost tables are derived at compile time from the
//! format's probability tables, so they cannot drift from the values the
//! decoder uses.

use crate::common::types::{
    Prob, DCT_CAT_BASE, KEYFRAME_BPRED_MODE_PROBS, KEYFRAME_BPRED_MODE_TREE, KEYFRAME_UV_MODE_PROBS,
    KEYFRAME_UV_MODE_TREE, KEYFRAME_YMODE_PROBS, KEYFRAME_YMODE_TREE, PROB_DCT_CAT,
};

pub(crate) use crate::common::types::MAX_LEVEL;

/// Levels above this share the cost of the largest category prefix.
pub const MAX_VARIABLE_LEVEL: usize = 67;

/// Number of entries in [`LEVELS_FROM_DELTA`] rows.
pub const MAX_DELTA_SIZE: usize = 64;

/// `log2(v)` in 16.16 fixed point for `v >= 1`.
const fn log2_q16(v: u32) -> u32 {
    let int_part = 31 - v.leading_zeros();
    // mantissa in [1, 2) as Q30
    let mut m = (v as u64) << (30 - int_part);
    let mut frac = 0u32;
    let mut bit = 0;
    while bit < 16 {
        m = (m * m) >> 30;
        frac <<= 1;
        if m >= 1 << 31 {
            frac |= 1;
            m >>= 1;
        }
        bit += 1;
    }
    (int_part << 16) | frac
}

const fn build_entropy_cost() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut p = 0;
    while p < 256 {
        table[p] = if p < 2 {
            2048
        } else {
            (((8 << 16) - log2_q16(p as u32) + 128) >> 8) as u16
        };
        p += 1;
    }
    table
}

/// Cost in 1/256 bit of coding a zero with probability `p / 256`.
pub const ENTROPY_COST: [u16; 256] = build_entropy_cost();

/// Cost in 1/256 bit of coding `bit` with probability `prob` of a zero.
#[inline]
pub const fn bit_cost(bit: bool, prob: Prob) -> u16 {
    if bit {
        ENTROPY_COST[255 - prob as usize]
    } else {
        ENTROPY_COST[prob as usize]
    }
}

/// Token category of a level of at least 5: 0 for cat1 up to 5 for cat6.
pub(crate) const fn dct_category(level: usize) -> usize {
    let mut cat = 5;
    while cat > 0 && level < DCT_CAT_BASE[cat] as usize {
        cat -= 1;
    }
    cat
}

/// Number of extra bits category `cat` carries.
pub(crate) const fn dct_category_bits(cat: usize) -> usize {
    let probs = &PROB_DCT_CAT[cat];
    let mut n = 0;
    while probs[n] != 0 {
        n += 1;
    }
    n
}

const fn build_level_fixed_costs() -> [u16; MAX_LEVEL as usize + 1] {
    let mut table = [0u16; MAX_LEVEL as usize + 1];
    let mut level = 1;
    while level <= MAX_LEVEL as usize {
        // sign
        let mut cost = 256u16;
        if level >= DCT_CAT_BASE[0] as usize {
            let cat = dct_category(level);
            let nbits = dct_category_bits(cat);
            let extra = level - DCT_CAT_BASE[cat] as usize;
            let mut i = 0;
            while i < nbits {
                let bit = (extra >> (nbits - 1 - i)) & 1 != 0;
                cost += bit_cost(bit, PROB_DCT_CAT[cat][i]);
                i += 1;
            }
        }
        table[level] = cost;
        level += 1;
    }
    table
}

/// Probability-independent part of a level's cost: sign and category extra bits.
pub const LEVEL_FIXED_COSTS: [u16; MAX_LEVEL as usize + 1] = build_level_fixed_costs();

/// Tree decisions taken below node 2 for a level of 1 through 67.
///
/// Returns `(pattern, bits)`: bit `k` of `pattern` marks node `2 + k` as
/// visited and the same bit of `bits` is the branch taken there.
const fn level_code(level: usize) -> (u16, u16) {
    let mut pattern = 0u16;
    let mut bits = 0u16;
    pattern |= 1;
    if level > 1 {
        bits |= 1;
        pattern |= 1 << 1;
        if level <= 4 {
            pattern |= 1 << 2;
            if level > 2 {
                bits |= 1 << 2;
                pattern |= 1 << 3;
                if level == 4 {
                    bits |= 1 << 3;
                }
            }
        } else {
            bits |= 1 << 1;
            pattern |= 1 << 4;
            if level <= 10 {
                pattern |= 1 << 5;
                if level > 6 {
                    bits |= 1 << 5;
                }
            } else {
                bits |= 1 << 4;
                pattern |= 1 << 6;
                if level <= 34 {
                    pattern |= 1 << 7;
                    if level > 18 {
                        bits |= 1 << 7;
                    }
                } else {
                    bits |= 1 << 6;
                    pattern |= 1 << 8;
                    if level > 66 {
                        bits |= 1 << 8;
                    }
                }
            }
        }
    }
    (pattern, bits)
}

const fn build_level_codes() -> [(u16, u16); MAX_VARIABLE_LEVEL] {
    let mut table = [(0u16, 0u16); MAX_VARIABLE_LEVEL];
    let mut i = 0;
    while i < MAX_VARIABLE_LEVEL {
        table[i] = level_code(i + 1);
        i += 1;
    }
    table
}

/// `LEVEL_CODES[v - 1]` is the `(pattern, bits)` pair of level `v`.
pub const LEVEL_CODES: [(u16, u16); MAX_VARIABLE_LEVEL] = build_level_codes();

/// Leaf costs of a mode tree, walking parents before children.
const fn tree_costs<const N: usize, const M: usize, const L: usize>(
    tree: &[i8; N],
    probs: &[Prob; M],
) -> [u16; L] {
    let mut node_cost = [0u16; M];
    let mut leaves = [0u16; L];
    let mut k = 0;
    while k < M {
        let mut side = 0;
        while side < 2 {
            let t = tree[2 * k + side];
            let cost = node_cost[k] + bit_cost(side == 1, probs[k]);
            if t > 0 {
                node_cost[t as usize / 2] = cost;
            } else {
                leaves[(-t) as usize] = cost;
            }
            side += 1;
        }
        k += 1;
    }
    leaves
}

const fn build_i16_costs() -> [u16; 4] {
    let leaves: [u16; 5] = tree_costs(&KEYFRAME_YMODE_TREE, &KEYFRAME_YMODE_PROBS);
    [leaves[0], leaves[1], leaves[2], leaves[3]]
}

/// Header cost of each whole-block luma mode, indexed by `LumaMode as usize`.
pub const FIXED_COSTS_I16: [u16; 4] = build_i16_costs();

/// Header cost of each chroma mode, indexed by `ChromaMode as usize`.
pub const FIXED_COSTS_UV: [u16; 4] = tree_costs(&KEYFRAME_UV_MODE_TREE, &KEYFRAME_UV_MODE_PROBS);

const fn build_i4_costs() -> [[[u16; 10]; 10]; 10] {
    let mut table = [[[0u16; 10]; 10]; 10];
    let mut top = 0;
    while top < 10 {
        let mut left = 0;
        while left < 10 {
            table[top][left] =
                tree_costs(&KEYFRAME_BPRED_MODE_TREE, &KEYFRAME_BPRED_MODE_PROBS[top][left]);
            left += 1;
        }
        top += 1;
    }
    table
}

/// Header cost of each subblock mode given the modes above and to the left:
/// `FIXED_COSTS_I4[top][left][mode]`.
pub const FIXED_COSTS_I4: [[[u16; 10]; 10]; 10] = build_i4_costs();

/// Interior limit the decoder derives for `level` and `sharpness`.
const fn interior_limit(level: usize, sharpness: usize) -> usize {
    let mut limit = level;
    if sharpness > 0 {
        limit >>= if sharpness > 4 { 2 } else { 1 };
        if limit > 9 - sharpness {
            limit = 9 - sharpness;
        }
    }
    if limit < 1 {
        1
    } else {
        limit
    }
}

const fn build_levels_from_delta() -> [[u8; MAX_DELTA_SIZE]; 8] {
    let mut table = [[0u8; MAX_DELTA_SIZE]; 8];
    let mut sharpness = 0;
    while sharpness < 8 {
        let mut delta = 0;
        while delta < MAX_DELTA_SIZE {
            let mut level = 0;
            // smallest level whose inner edge test lets a step of `delta` through
            while level < 63 && 5 * delta > 2 * (2 * level + interior_limit(level, sharpness)) + 1 {
                level += 1;
            }
            table[sharpness][delta] = level as u8;
            delta += 1;
        }
        sharpness += 1;
    }
    table
}

/// Filter level needed to smooth a step of `delta` at each sharpness.
pub const LEVELS_FROM_DELTA: [[u8; MAX_DELTA_SIZE]; 8] = build_levels_from_delta();

/// Extra rounding boost for luma AC positions, scaled by the quantizer step.
pub const FREQ_SHARPENING: [u8; 16] = [0, 30, 60, 90, 30, 60, 90, 90, 60, 90, 90, 90, 90, 90, 90, 90];
