//! Residual view and coefficient cost estimation.

use super::cost::LevelCosts;
use super::tables::bit_cost;
use crate::common::types::{TokenProbTables, COEFF_BANDS, PLANE_UV, PLANE_Y2, PLANE_Y_NO_DC, PLANE_Y_WITH_DC};

/// One 4x4 block of quantized levels in scan order, as the token coder sees it.
#[derive(Clone, Copy, Debug)]
pub struct Residual<'a> {
    /// First coded position: 1 when the DC travels in the Y2 block.
    pub first: usize,
    /// Index of the last non-zero level, or -1.
    pub last: i32,
    /// Levels in zigzag order.
    pub coeffs: &'a [i32; 16],
    /// Token plane type.
    pub coeff_type: usize,
}

impl<'a> Residual<'a> {
    /// Wraps `coeffs`, locating the last non-zero level.
    pub fn new(coeffs: &'a [i32; 16], coeff_type: usize, first: usize) -> Self {
        let last = coeffs
            .iter()
            .rposition(|&c| c != 0)
            .map_or(-1, |i| i as i32);
        Self {
            first,
            last,
            coeffs,
            coeff_type,
        }
    }

    /// Whether any level is non-zero.
    pub fn has_nonzero(&self) -> bool {
        self.last >= 0
    }
}

/// Bits needed to code `res` in context `ctx0`, in 1/256 bit.
///
/// An empty block costs exactly the end-of-block bit. Otherwise every level
/// up to the last contributes its fixed and table cost, and a block ending
/// before position 15 pays for the end-of-block bit after its last level.
pub fn get_residual_cost(
    ctx0: usize,
    res: &Residual,
    costs: &LevelCosts,
    probs: &TokenProbTables,
) -> u32 {
    let ctype = res.coeff_type;
    let mut n = res.first;
    let p0 = probs[ctype][usize::from(COEFF_BANDS[n])][ctx0][0];

    if res.last < 0 {
        return u32::from(bit_cost(false, p0));
    }

    // the level tables include the "more coefficients" bit only for ctx > 0
    let mut cost = if ctx0 == 0 {
        u32::from(bit_cost(true, p0))
    } else {
        0
    };
    let last = res.last as usize;
    let mut ctx = ctx0;
    while n < last {
        let v = res.coeffs[n].unsigned_abs() as usize;
        cost += costs.level_cost(ctype, n, ctx, v);
        ctx = v.min(2);
        n += 1;
    }

    let v = res.coeffs[n].unsigned_abs() as usize;
    debug_assert!(v != 0);
    cost += costs.level_cost(ctype, n, ctx, v);
    if n < 15 {
        let band = usize::from(COEFF_BANDS[n + 1]);
        let ctx = if v == 1 { 1 } else { 2 };
        cost += u32::from(bit_cost(false, probs[ctype][band][ctx][0]));
    }
    cost
}

/// Cost of one 4x4 block of a `B` macroblock.
pub fn cost_luma4(
    levels: &[i32; 16],
    ctx: usize,
    costs: &LevelCosts,
    probs: &TokenProbTables,
) -> u32 {
    let res = Residual::new(levels, PLANE_Y_WITH_DC, 0);
    get_residual_cost(ctx, &res, costs, probs)
}

/// Cost of the Y2 block and the sixteen AC blocks of a whole-block luma mode.
///
/// `top_nz` and `left_nz` are the neighbour flags of the macroblock (index 8
/// is the Y2 block); they are taken by value and advanced locally.
pub fn cost_luma16(
    dc_levels: &[i32; 16],
    ac_levels: &[[i32; 16]; 16],
    mut top_nz: [u8; 9],
    mut left_nz: [u8; 9],
    costs: &LevelCosts,
    probs: &TokenProbTables,
) -> u32 {
    let dc = Residual::new(dc_levels, PLANE_Y2, 0);
    let ctx = usize::from(top_nz[8] + left_nz[8]);
    let mut cost = get_residual_cost(ctx, &dc, costs, probs);

    for y in 0..4 {
        for x in 0..4 {
            let ctx = usize::from(top_nz[x] + left_nz[y]);
            let res = Residual::new(&ac_levels[y * 4 + x], PLANE_Y_NO_DC, 1);
            cost += get_residual_cost(ctx, &res, costs, probs);
            let nz = u8::from(res.has_nonzero());
            top_nz[x] = nz;
            left_nz[y] = nz;
        }
    }
    cost
}

/// Cost of the eight chroma blocks (four U, then four V).
pub fn cost_uv(
    uv_levels: &[[i32; 16]; 8],
    mut top_nz: [u8; 9],
    mut left_nz: [u8; 9],
    costs: &LevelCosts,
    probs: &TokenProbTables,
) -> u32 {
    let mut cost = 0;
    for ch in [0, 2] {
        for y in 0..2 {
            for x in 0..2 {
                let ctx = usize::from(top_nz[4 + ch + x] + left_nz[4 + ch + y]);
                let res = Residual::new(&uv_levels[ch * 2 + y * 2 + x], PLANE_UV, 0);
                cost += get_residual_cost(ctx, &res, costs, probs);
                let nz = u8::from(res.has_nonzero());
                top_nz[4 + ch + x] = nz;
                left_nz[4 + ch + y] = nz;
            }
        }
    }
    cost
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::COEFF_PROBS;

    fn costs() -> LevelCosts {
        let mut costs = LevelCosts::new();
        costs.calculate(&COEFF_PROBS);
        costs
    }

    #[test]
    fn empty_block_costs_one_eob_bit() {
        let costs = costs();
        let zeros = [0i32; 16];
        for ctype in 0..4 {
            for ctx in 0..3 {
                let first = usize::from(ctype == PLANE_Y_NO_DC);
                let res = Residual::new(&zeros, ctype, first);
                let p0 = COEFF_PROBS[ctype][first][ctx][0];
                assert_eq!(
                    get_residual_cost(ctx, &res, &costs, &COEFF_PROBS),
                    u32::from(bit_cost(false, p0))
                );
            }
        }
    }

    #[test]
    fn an_extra_trailing_coefficient_costs_more() {
        let costs = costs();
        let mut shorter = [0i32; 16];
        shorter[0] = 1;
        let mut longer = shorter;
        longer[1] = 1;
        let a = get_residual_cost(0, &Residual::new(&shorter, PLANE_Y_WITH_DC, 0), &costs, &COEFF_PROBS);
        let b = get_residual_cost(0, &Residual::new(&longer, PLANE_Y_WITH_DC, 0), &costs, &COEFF_PROBS);
        assert!(b > a);

        let mut deeper = shorter;
        deeper[6] = -2;
        let c = get_residual_cost(0, &Residual::new(&deeper, PLANE_Y_WITH_DC, 0), &costs, &COEFF_PROBS);
        assert!(c > a);
    }

    #[test]
    fn single_dc_matches_hand_sum() {
        let costs = costs();
        let mut levels = [0i32; 16];
        levels[0] = 1;
        let p = &COEFF_PROBS[PLANE_UV];
        let expected = u32::from(bit_cost(true, p[0][0][0]))
            + 256
            + u32::from(bit_cost(true, p[0][0][1]))
            + u32::from(bit_cost(false, p[0][0][2]))
            + u32::from(bit_cost(false, p[1][1][0]));
        let res = Residual::new(&levels, PLANE_UV, 0);
        assert_eq!(get_residual_cost(0, &res, &costs, &COEFF_PROBS), expected);
    }

    #[test]
    fn neighbour_context_changes_luma16_cost() {
        let costs = costs();
        let dc = [0i32; 16];
        let mut ac = [[0i32; 16]; 16];
        ac[0][1] = 2;
        let quiet = cost_luma16(&dc, &ac, [0; 9], [0; 9], &costs, &COEFF_PROBS);
        let busy = cost_luma16(&dc, &ac, [1; 9], [1; 9], &costs, &COEFF_PROBS);
        assert_ne!(quiet, busy);
        let none = cost_luma16(&dc, &[[0; 16]; 16], [0; 9], [0; 9], &costs, &COEFF_PROBS);
        assert!(none < quiet);
    }

    #[test]
    fn chroma_cost_of_empty_blocks() {
        let costs = costs();
        let cost = cost_uv(&[[0; 16]; 8], [0; 9], [0; 9], &costs, &COEFF_PROBS);
        assert_eq!(cost, 8 * u32::from(bit_cost(false, COEFF_PROBS[PLANE_UV][0][0][0])));
    }
}
