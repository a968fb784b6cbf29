//! Integer 4x4 DCT and Walsh-Hadamard transforms.
//!
//! All transforms work in place on a row-major `[i32; 16]` block. The inverse
//! transforms are the bit-exact reference the decoder and the encoder's
//! reconstruction share; the DC-only and AC3 variants produce exactly the same
//! output as [`idct4x4`] for the blocks they accept.

/// 16 bit fixed point version of cos(PI/8) * sqrt(2) - 1
const CONST1: i64 = 20091;
/// 16 bit fixed point version of sin(PI/8) * sqrt(2)
const CONST2: i64 = 35468;

#[inline(always)]
fn mul1(a: i64) -> i64 {
    a + ((a * CONST1) >> 16)
}

#[inline(always)]
fn mul2(a: i64) -> i64 {
    (a * CONST2) >> 16
}

/// Which inverse transform a dequantized block needs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum IdctKind {
    /// All coefficients are zero.
    None,
    /// Only the DC coefficient may be non-zero.
    Dc,
    /// Only positions 0, 1 and 4 may be non-zero.
    Ac3,
    /// Anything else.
    Full,
}

impl IdctKind {
    /// Picks the cheapest transform that is exact for `block`.
    pub(crate) fn of(block: &[i32; 16]) -> Self {
        if block[1..].iter().all(|&c| c == 0) {
            if block[0] == 0 {
                IdctKind::None
            } else {
                IdctKind::Dc
            }
        } else if block
            .iter()
            .enumerate()
            .all(|(i, &c)| c == 0 || matches!(i, 0 | 1 | 4))
        {
            IdctKind::Ac3
        } else {
            IdctKind::Full
        }
    }
}

/// Inverse transform dispatching to the fast path `kind` allows.
#[inline]
pub(crate) fn idct4x4_dispatch(block: &mut [i32; 16], kind: IdctKind) {
    match kind {
        IdctKind::None => {}
        IdctKind::Dc => idct4x4_dc(block),
        IdctKind::Ac3 => idct4x4_ac3(block),
        IdctKind::Full => idct4x4(block),
    }
}

/// DC-only inverse transform: fills all 16 positions with `(DC + 4) >> 3`.
/// AC positions are ignored.
#[inline(always)]
pub(crate) fn idct4x4_dc(block: &mut [i32; 16]) {
    let dc = (block[0] + 4) >> 3;
    block.fill(dc);
}

/// Inverse transform for blocks whose only non-zero coefficients are at
/// positions 0, 1 and 4.
pub(crate) fn idct4x4_ac3(block: &mut [i32; 16]) {
    let a = i64::from(block[0]) + 4;
    let c4 = mul2(i64::from(block[4]));
    let d4 = mul1(i64::from(block[4]));
    let c1 = mul2(i64::from(block[1]));
    let d1 = mul1(i64::from(block[1]));

    let rows = [a + d4, a + c4, a - c4, a - d4];
    for (row, dc) in block.chunks_exact_mut(4).zip(rows) {
        row[0] = ((dc + d1) >> 3) as i32;
        row[1] = ((dc + c1) >> 3) as i32;
        row[2] = ((dc - c1) >> 3) as i32;
        row[3] = ((dc - d1) >> 3) as i32;
    }
}

// inverse discrete cosine transform, used in decoding
pub(crate) fn idct4x4(block: &mut [i32; 16]) {
    // The intermediate results may overflow the types, so we stretch the type.
    fn fetch(block: &[i32; 16], idx: usize) -> i64 {
        i64::from(block[idx])
    }

    for i in 0usize..4 {
        let a1 = fetch(block, i) + fetch(block, 8 + i);
        let b1 = fetch(block, i) - fetch(block, 8 + i);
        let c1 = mul2(fetch(block, 4 + i)) - mul1(fetch(block, 12 + i));
        let d1 = mul1(fetch(block, 4 + i)) + mul2(fetch(block, 12 + i));

        block[i] = (a1 + d1) as i32;
        block[4 + i] = (b1 + c1) as i32;
        block[4 * 3 + i] = (a1 - d1) as i32;
        block[4 * 2 + i] = (b1 - c1) as i32;
    }

    for i in 0usize..4 {
        let a1 = fetch(block, 4 * i) + fetch(block, 4 * i + 2);
        let b1 = fetch(block, 4 * i) - fetch(block, 4 * i + 2);
        let c1 = mul2(fetch(block, 4 * i + 1)) - mul1(fetch(block, 4 * i + 3));
        let d1 = mul1(fetch(block, 4 * i + 1)) + mul2(fetch(block, 4 * i + 3));

        block[4 * i] = ((a1 + d1 + 4) >> 3) as i32;
        block[4 * i + 3] = ((a1 - d1 + 4) >> 3) as i32;
        block[4 * i + 1] = ((b1 + c1 + 4) >> 3) as i32;
        block[4 * i + 2] = ((b1 - c1 + 4) >> 3) as i32;
    }
}

// 14.3 inverse walsh-hadamard transform, used in decoding
pub(crate) fn iwht4x4(block: &mut [i32; 16]) {
    for i in 0usize..4 {
        let a1 = block[i] + block[12 + i];
        let b1 = block[4 + i] + block[8 + i];
        let c1 = block[4 + i] - block[8 + i];
        let d1 = block[i] - block[12 + i];

        block[i] = a1 + b1;
        block[4 + i] = c1 + d1;
        block[8 + i] = a1 - b1;
        block[12 + i] = d1 - c1;
    }

    for row in block.chunks_exact_mut(4) {
        let a1 = row[0] + row[3];
        let b1 = row[1] + row[2];
        let c1 = row[1] - row[2];
        let d1 = row[0] - row[3];

        row[0] = (a1 + b1 + 3) >> 3;
        row[1] = (c1 + d1 + 3) >> 3;
        row[2] = (a1 - b1 + 3) >> 3;
        row[3] = (d1 - c1 + 3) >> 3;
    }
}

/// Forward Walsh-Hadamard transform over the 16 luma DC values of a macroblock.
pub(crate) fn wht4x4(block: &mut [i32; 16]) {
    fn fetch(block: &[i32; 16], idx: usize) -> i64 {
        i64::from(block[idx])
    }

    // vertical
    for i in 0..4 {
        let a = fetch(block, i * 4) + fetch(block, i * 4 + 3);
        let b = fetch(block, i * 4 + 1) + fetch(block, i * 4 + 2);
        let c = fetch(block, i * 4 + 1) - fetch(block, i * 4 + 2);
        let d = fetch(block, i * 4) - fetch(block, i * 4 + 3);

        block[i * 4] = (a + b) as i32;
        block[i * 4 + 1] = (c + d) as i32;
        block[i * 4 + 2] = (a - b) as i32;
        block[i * 4 + 3] = (d - c) as i32;
    }

    // horizontal
    for i in 0..4 {
        let a1 = fetch(block, i) + fetch(block, i + 12);
        let b1 = fetch(block, i + 4) + fetch(block, i + 8);
        let c1 = fetch(block, i + 4) - fetch(block, i + 8);
        let d1 = fetch(block, i) - fetch(block, i + 12);

        block[i] = ((a1 + b1) >> 1) as i32;
        block[i + 4] = ((c1 + d1) >> 1) as i32;
        block[i + 8] = ((a1 - b1) >> 1) as i32;
        block[i + 12] = ((d1 - c1) >> 1) as i32;
    }
}

/// Forward DCT of a residual block.
pub(crate) fn dct4x4(block: &mut [i32; 16]) {
    fn fetch(block: &[i32; 16], idx: usize) -> i64 {
        i64::from(block[idx])
    }

    // vertical
    for i in 0..4 {
        let a = (fetch(block, i * 4) + fetch(block, i * 4 + 3)) * 8;
        let b = (fetch(block, i * 4 + 1) + fetch(block, i * 4 + 2)) * 8;
        let c = (fetch(block, i * 4 + 1) - fetch(block, i * 4 + 2)) * 8;
        let d = (fetch(block, i * 4) - fetch(block, i * 4 + 3)) * 8;

        block[i * 4] = (a + b) as i32;
        block[i * 4 + 2] = (a - b) as i32;
        block[i * 4 + 1] = ((c * 2217 + d * 5352 + 14500) >> 12) as i32;
        block[i * 4 + 3] = ((d * 2217 - c * 5352 + 7500) >> 12) as i32;
    }

    // horizontal
    for i in 0..4 {
        let a = fetch(block, i) + fetch(block, i + 12);
        let b = fetch(block, i + 4) + fetch(block, i + 8);
        let c = fetch(block, i + 4) - fetch(block, i + 8);
        let d = fetch(block, i) - fetch(block, i + 12);

        block[i] = ((a + b + 7) >> 4) as i32;
        block[i + 8] = ((a - b + 7) >> 4) as i32;
        block[i + 4] = (((c * 2217 + d * 5352 + 12000) >> 16) + i64::from(d != 0)) as i32;
        block[i + 12] = ((d * 2217 - c * 5352 + 51000) >> 16) as i32;
    }
}

/// Residual `src - pred` of the 4x4 blocks starting at the front of two strided slices.
pub(crate) fn residual4x4(
    src: &[u8],
    src_stride: usize,
    pred: &[u8],
    pred_stride: usize,
) -> [i32; 16] {
    let mut out = [0i32; 16];
    for y in 0..4 {
        for x in 0..4 {
            out[y * 4 + x] = i32::from(src[y * src_stride + x]) - i32::from(pred[y * pred_stride + x]);
        }
    }
    out
}
