//! Distortion measures used by mode decision.
//!
//! Besides plain SSE, the encoder weighs a frequency-domain difference
//! ("TDisto"): a weighted 4x4 Hadamard transform of source and
//! reconstruction, compared by magnitude. It favours reconstructions that keep
//! the source's texture energy even when their SSE is slightly worse.

/// Hadamard weights for luma spectral distortion, low frequencies first.
pub const WEIGHT_Y: [u16; 16] = [38, 32, 20, 9, 32, 28, 17, 7, 20, 17, 10, 4, 9, 7, 4, 2];

/// Non-zero AC levels an I16 block may have and still count as flat.
pub const FLATNESS_LIMIT_I16: i32 = 0;
/// Same for one I4 subblock.
pub const FLATNESS_LIMIT_I4: i32 = 3;
/// Same for the eight chroma blocks together.
pub const FLATNESS_LIMIT_UV: i32 = 2;
/// Rate penalty for a non-DC mode on flat content.
pub const FLATNESS_PENALTY: u32 = 140;

/// Sum of squared differences over a `w x h` region.
pub fn sse(a: &[u8], a_stride: usize, b: &[u8], b_stride: usize, w: usize, h: usize) -> u32 {
    let mut sum = 0u32;
    for (ra, rb) in a.chunks(a_stride).zip(b.chunks(b_stride)).take(h) {
        for (&pa, &pb) in ra[..w].iter().zip(&rb[..w]) {
            let d = i32::from(pa) - i32::from(pb);
            sum += (d * d) as u32;
        }
    }
    sum
}

/// Sum of `|coefficient| * weight` over the Hadamard transform of a 4x4 block.
pub fn t_transform(input: &[u8], stride: usize, w: &[u16; 16]) -> i32 {
    let mut tmp = [0i32; 16];
    for i in 0..4 {
        let row = &input[i * stride..][..4];
        let a0 = i32::from(row[0]) + i32::from(row[2]);
        let a1 = i32::from(row[1]) + i32::from(row[3]);
        let a2 = i32::from(row[1]) - i32::from(row[3]);
        let a3 = i32::from(row[0]) - i32::from(row[2]);
        tmp[i * 4] = a0 + a1;
        tmp[i * 4 + 1] = a3 + a2;
        tmp[i * 4 + 2] = a3 - a2;
        tmp[i * 4 + 3] = a0 - a1;
    }

    let mut sum = 0i32;
    for i in 0..4 {
        let a0 = tmp[i] + tmp[8 + i];
        let a1 = tmp[4 + i] + tmp[12 + i];
        let a2 = tmp[4 + i] - tmp[12 + i];
        let a3 = tmp[i] - tmp[8 + i];
        sum += i32::from(w[i]) * (a0 + a1).abs();
        sum += i32::from(w[4 + i]) * (a3 + a2).abs();
        sum += i32::from(w[8 + i]) * (a3 - a2).abs();
        sum += i32::from(w[12 + i]) * (a0 - a1).abs();
    }
    sum
}

/// `|T(b) - T(a)| >> 5` for two 4x4 blocks.
pub fn tdisto_4x4(a: &[u8], a_stride: usize, b: &[u8], b_stride: usize, w: &[u16; 16]) -> i32 {
    let sum1 = t_transform(a, a_stride, w);
    let sum2 = t_transform(b, b_stride, w);
    (sum2 - sum1).abs() >> 5
}

/// [`tdisto_4x4`] summed over the sixteen subblocks of a macroblock.
pub fn tdisto_16x16(a: &[u8], a_stride: usize, b: &[u8], b_stride: usize, w: &[u16; 16]) -> i32 {
    let mut d = 0;
    for y in 0..4 {
        for x in 0..4 {
            d += tdisto_4x4(
                &a[y * 4 * a_stride + x * 4..],
                a_stride,
                &b[y * 4 * b_stride + x * 4..],
                b_stride,
                w,
            );
        }
    }
    d
}

/// Whether every pixel of a 16x16 source block has the same value.
pub fn is_flat_source_16(src: &[u8], stride: usize) -> bool {
    let v = src[0];
    src.chunks(stride)
        .take(16)
        .all(|row| row[..16].iter().all(|&p| p == v))
}

/// Whether the blocks carry at most `thresh` non-zero AC levels in total.
pub fn is_flat(levels: &[[i32; 16]], thresh: i32) -> bool {
    let mut score = 0;
    for block in levels {
        for &level in &block[1..] {
            score += i32::from(level != 0);
            if score > thresh {
                return false;
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sse_of_known_difference() {
        let a = [10u8; 64];
        let mut b = [10u8; 64];
        b[0] = 13;
        b[9] = 6;
        b[63] = 12;
        assert_eq!(sse(&a, 8, &b, 8, 8, 8), 9 + 16 + 4);
        // only the 4x4 corner
        assert_eq!(sse(&a, 8, &b, 8, 4, 4), 9 + 16);
    }

    #[test]
    fn flat_blocks_have_only_dc_energy() {
        let flat = [77u8; 16];
        let mut w = [0u16; 16];
        w[0] = 1;
        assert_eq!(t_transform(&flat, 4, &w), 77 * 16);
        w[0] = 0;
        w[5] = 9;
        assert_eq!(t_transform(&flat, 4, &w), 0);
    }

    #[test]
    fn tdisto_is_symmetric_and_zero_on_equal() {
        let a: [u8; 16] = core::array::from_fn(|i| (i * 13) as u8);
        let b: [u8; 16] = core::array::from_fn(|i| (i * 7 + 3) as u8);
        assert_eq!(tdisto_4x4(&a, 4, &a, 4, &WEIGHT_Y), 0);
        assert_eq!(
            tdisto_4x4(&a, 4, &b, 4, &WEIGHT_Y),
            tdisto_4x4(&b, 4, &a, 4, &WEIGHT_Y)
        );
    }

    #[test]
    fn flat_source_detection() {
        let mut src = [5u8; 32 * 16];
        assert!(is_flat_source_16(&src, 32));
        // outside the 16 columns
        src[20] = 9;
        assert!(is_flat_source_16(&src, 32));
        src[32 * 15 + 15] = 9;
        assert!(!is_flat_source_16(&src, 32));
    }

    #[test]
    fn flatness_counts_ac_only() {
        let mut blocks = [[0i32; 16]; 2];
        blocks[0][0] = 50;
        assert!(is_flat(&blocks, 0));
        blocks[1][3] = 1;
        assert!(!is_flat(&blocks, 0));
        assert!(is_flat(&blocks, 1));
    }
}
