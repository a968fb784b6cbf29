//! Segment assignment and per-segment quantizers.
//!
//! Macroblocks are clustered by their alpha with a 1-D k-means over the
//! alpha histogram. Each cluster becomes a segment with its own quantizer:
//! smooth segments, where artifacts show, get finer steps than busy ones.

use alloc::vec::Vec;

use crate::common::types::MAX_SEGMENTS;
use crate::encoder::tables::bit_cost;

use super::histogram::MAX_ALPHA;

const MAX_ITERS_K_MEANS: usize = 6;

/// Scale between SNS strength and the quantizer exponent.
const SNS_TO_DQ: f64 = 0.9;

// chroma alphas usually spread between these
const MID_ALPHA: i32 = 64;
const MIN_ALPHA: i32 = 30;
const MAX_ALPHA_UV: i32 = 100;
const MIN_DQ_UV: i32 = -4;
const MAX_DQ_UV: i32 = 6;

const MAJORITY_CNT_3X3: u8 = 5;

/// Result of clustering an alpha histogram.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Clustering {
    /// Segment of each alpha value.
    pub map: [u8; MAX_ALPHA as usize + 1],
    /// Cluster centers; only the first `num_segments` are meaningful.
    pub centers: [i32; MAX_SEGMENTS],
    /// Population-weighted mean of the centers.
    pub weighted_average: i32,
    /// Iterations run before the centers settled.
    pub iterations: usize,
}

/// Centers spread evenly over the populated range of `alphas`.
pub fn initial_centers(alphas: &[u32; 256], num_segments: usize) -> [i32; MAX_SEGMENTS] {
    let nb = num_segments.clamp(1, MAX_SEGMENTS);
    let (min_a, max_a) = bracket(alphas);
    let range = max_a - min_a;
    let mut centers = [0i32; MAX_SEGMENTS];
    for (k, center) in centers.iter_mut().enumerate().take(nb) {
        let n = 2 * k as i32 + 1;
        *center = min_a + n * range / (2 * nb as i32);
    }
    centers
}

fn bracket(alphas: &[u32; 256]) -> (i32, i32) {
    let min_a = alphas.iter().position(|&c| c != 0).unwrap_or(MAX_ALPHA as usize);
    let max_a = alphas
        .iter()
        .rposition(|&c| c != 0)
        .map_or(min_a, |n| n.max(min_a));
    (min_a as i32, max_a as i32)
}

/// Clusters `alphas` into at most `num_segments` groups starting from `seeds`.
///
/// Each alpha goes to its nearest center; on a tie the lower center wins.
/// Stops once the centers move by less than 5 in total, or after six rounds.
pub fn kmeans(alphas: &[u32; 256], num_segments: usize, seeds: [i32; MAX_SEGMENTS]) -> Clustering {
    let nb = num_segments.clamp(1, MAX_SEGMENTS);
    let (min_a, max_a) = bracket(alphas);
    let mut centers = seeds;
    let mut map = [0u8; MAX_ALPHA as usize + 1];
    let mut weighted_average = 0;
    let mut iterations = 0;

    for _ in 0..MAX_ITERS_K_MEANS {
        iterations += 1;
        let mut accum = [0i64; MAX_SEGMENTS];
        let mut dist_accum = [0i64; MAX_SEGMENTS];

        let mut n = 0;
        for a in min_a..=max_a {
            let count = i64::from(alphas[a as usize]);
            if count == 0 {
                continue;
            }
            while n + 1 < nb && (a - centers[n + 1]).abs() < (a - centers[n]).abs() {
                n += 1;
            }
            map[a as usize] = n as u8;
            dist_accum[n] += i64::from(a) * count;
            accum[n] += count;
        }

        let mut displaced = 0;
        let mut total = 0i64;
        let mut weighted = 0i64;
        for n in 0..nb {
            if accum[n] != 0 {
                let center = ((dist_accum[n] + accum[n] / 2) / accum[n]) as i32;
                displaced += (centers[n] - center).abs();
                centers[n] = center;
                weighted += i64::from(center) * accum[n];
                total += accum[n];
            }
        }
        weighted_average = if total > 0 {
            ((weighted + total / 2) / total) as i32
        } else {
            centers[0]
        };
        if displaced < 5 {
            break;
        }
    }

    Clustering {
        map,
        centers,
        weighted_average,
        iterations,
    }
}

/// [`kmeans`] seeded with [`initial_centers`].
pub fn assign_segments(alphas: &[u32; 256], num_segments: usize) -> Clustering {
    kmeans(alphas, num_segments, initial_centers(alphas, num_segments))
}

/// Per-segment `(alpha, beta)`: alpha in `-127..=127` is the distance of a
/// center from the mean, beta in `0..=255` its position in the spread.
/// No centers give an empty result.
pub fn segment_alphas(centers: &[i32], mid: i32) -> Vec<(i32, i32)> {
    let (Some(&min), Some(&max)) = (centers.iter().min(), centers.iter().max()) else {
        return Vec::new();
    };
    let max = if max == min { min + 1 } else { max };
    centers
        .iter()
        .map(|&c| {
            let alpha = 255 * (c - mid) / (max - min);
            let beta = 255 * (c - min) / (max - min);
            (alpha.clamp(-127, 127), beta.clamp(0, 255))
        })
        .collect()
}

/// Replaces the segment of every interior macroblock by the one shared by
/// at least five of its eight neighbours, if any.
pub fn smooth_segment_map(map: &mut [u8], mb_w: usize, mb_h: usize) {
    if mb_w < 3 || mb_h < 3 {
        return;
    }
    let mut tmp = map.to_vec();
    for y in 1..mb_h - 1 {
        for x in 1..mb_w - 1 {
            let idx = x + y * mb_w;
            let mut cnt = [0u8; MAX_SEGMENTS];
            for (dx, dy) in [(-1, -1), (0, -1), (1, -1), (-1, 0), (1, 0), (-1, 1), (0, 1), (1, 1)] {
                let n = (idx as isize + dy * mb_w as isize + dx) as usize;
                cnt[usize::from(map[n])] += 1;
            }
            if let Some(seg) = cnt.iter().rposition(|&c| c >= MAJORITY_CNT_3X3) {
                tmp[idx] = seg as u8;
            }
        }
    }
    map.copy_from_slice(&tmp);
}

/// Merges segments that ended up with the same quantizer and filter level.
///
/// `params` holds `(quant, filter_level)` per segment and is compacted in
/// place. Returns the remapping of old segment ids and the number of
/// remaining segments; segments past that count replicate the last one.
pub fn merge_equivalent(params: &mut [(u8, u8)]) -> ([u8; MAX_SEGMENTS], usize) {
    let mut remap = [0u8, 1, 2, 3];
    let nb = params.len().min(MAX_SEGMENTS);
    let mut num_final = 1;
    for s1 in 1..nb {
        match (0..num_final).find(|&s2| params[s2] == params[s1]) {
            Some(s2) => remap[s1] = s2 as u8,
            None => {
                remap[s1] = num_final as u8;
                params[num_final] = params[s1];
                num_final += 1;
            }
        }
    }
    for s in num_final..nb {
        params[s] = params[num_final - 1];
    }
    (remap, num_final)
}

/// Maps a 0..=100 quality to a compression factor in `0.0..=1.0`, so that
/// 75 lands in the middle of the quantizer range.
pub fn quality_to_compression(quality: f32) -> f64 {
    let c = f64::from(quality) / 100.0;
    let linear_c = if c < 0.75 { c * (2.0 / 3.0) } else { 2.0 * c - 1.0 };
    // file size scales roughly with quantizer^3
    libm::cbrt(linear_c)
}

/// Quantizer index of a segment with susceptibility `alpha` (-127..=127).
pub fn segment_quant(compression: f64, alpha: i32, sns_strength: u8) -> u8 {
    let amp = SNS_TO_DQ * f64::from(sns_strength) / 100.0 / 128.0;
    let expn = 1.0 - amp * f64::from(alpha);
    let c = libm::pow(compression, expn);
    ((127.0 * (1.0 - c)) as i32).clamp(0, 127) as u8
}

/// Chroma AC and DC quantizer deltas from the average chroma alpha.
pub fn chroma_deltas(uv_alpha: i32, sns_strength: u8) -> (i32, i32) {
    let sns = i32::from(sns_strength);
    let dq_ac = (uv_alpha - MID_ALPHA) * (MAX_DQ_UV - MIN_DQ_UV) / (MAX_ALPHA_UV - MIN_ALPHA);
    let dq_ac = (dq_ac * sns / 100).clamp(MIN_DQ_UV, MAX_DQ_UV);
    let dq_dc = (-4 * sns / 100).clamp(-15, 15);
    (dq_ac, dq_dc)
}

fn get_proba(a: u32, b: u32) -> u8 {
    let total = a + b;
    if total == 0 {
        255
    } else {
        ((255 * a + total / 2) / total) as u8
    }
}

/// Segment id tree probabilities for the given population of each segment.
pub fn segment_probas(counts: &[u32; MAX_SEGMENTS]) -> [u8; 3] {
    [
        get_proba(counts[0] + counts[1], counts[2] + counts[3]),
        get_proba(counts[0], counts[1]),
        get_proba(counts[2], counts[3]),
    ]
}

/// Cost in 1/256 bit of coding every segment id with `probas`.
pub fn segment_map_cost(counts: &[u32; MAX_SEGMENTS], probas: &[u8; 3]) -> u32 {
    let c = |bit, p| u32::from(bit_cost(bit, p));
    counts[0] * (c(false, probas[0]) + c(false, probas[1]))
        + counts[1] * (c(false, probas[0]) + c(true, probas[1]))
        + counts[2] * (c(true, probas[0]) + c(false, probas[2]))
        + counts[3] * (c(true, probas[0]) + c(true, probas[2]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn histogram(points: &[(usize, u32)]) -> [u32; 256] {
        let mut alphas = [0u32; 256];
        for &(a, n) in points {
            alphas[a] = n;
        }
        alphas
    }

    #[test]
    fn centers_spread_over_range() {
        let alphas = histogram(&[(20, 1), (220, 1)]);
        assert_eq!(initial_centers(&alphas, 4), [45, 95, 145, 195]);
        assert_eq!(initial_centers(&alphas, 1)[0], 120);
    }

    #[test]
    fn separated_clusters_find_their_centers() {
        let alphas = histogram(&[(10, 5), (12, 5), (100, 3), (180, 7), (250, 2)]);
        let c = assign_segments(&alphas, 4);
        assert_eq!(&c.centers, &[11, 100, 180, 250]);
        assert_eq!(c.map[10], 0);
        assert_eq!(c.map[12], 0);
        assert_eq!(c.map[100], 1);
        assert_eq!(c.map[250], 3);
        let mean = (11 * 10 + 100 * 3 + 180 * 7 + 250 * 2 + 11) / 22;
        assert_eq!(c.weighted_average, mean);
    }

    #[test]
    fn converged_centers_are_a_fixed_point() {
        let alphas = histogram(&[(30, 40), (35, 10), (90, 25), (140, 5), (200, 60)]);
        let first = assign_segments(&alphas, 4);
        let second = kmeans(&alphas, 4, first.centers);
        assert_eq!(second.centers, first.centers);
        assert_eq!(second.iterations, 1);
    }

    #[test]
    fn ties_go_to_the_lower_center() {
        let alphas = histogram(&[(50, 1)]);
        let c = kmeans(&alphas, 2, [40, 60, 0, 0]);
        assert_eq!(c.map[50], 0);
        assert_eq!(c.centers[0], 50);
        // the empty cluster keeps its center
        assert_eq!(c.centers[1], 60);
    }

    #[test]
    fn single_alpha_value() {
        let alphas = histogram(&[(77, 9)]);
        let c = assign_segments(&alphas, 4);
        assert!(c.map.iter().all(|&s| s == 0));
        assert_eq!(c.centers[0], 77);
        assert_eq!(c.weighted_average, 77);
    }

    #[test]
    fn segment_alphas_span_the_scale() {
        let v = segment_alphas(&[10, 50, 90, 110], 60);
        assert_eq!(v[0], ((255 * -50 / 100).clamp(-127, 127), 0));
        assert_eq!(v[3], (127, 255));
        // identical centers do not divide by zero
        let v = segment_alphas(&[40, 40], 40);
        assert_eq!(v, [(0, 0), (0, 0)]);
        assert!(segment_alphas(&[], 40).is_empty());
    }

    #[test]
    fn smoothing_takes_the_majority() {
        let mut map = [
            1, 1, 1, 0, //
            1, 2, 1, 0, //
            1, 1, 3, 0, //
            0, 0, 0, 0,
        ];
        smooth_segment_map(&mut map, 4, 4);
        // (1,1) has seven neighbours in segment 1
        assert_eq!(map[5], 1);
        // (2,1) sees no majority
        assert_eq!(map[6], 1);
        // (2,2) has 5 neighbours in segment 0
        assert_eq!(map[10], 0);
        // borders are untouched
        assert_eq!(map[3], 0);
    }

    #[test]
    fn equivalent_segments_merge() {
        let mut params = [(40, 20), (50, 22), (40, 20), (50, 22)];
        let (remap, n) = merge_equivalent(&mut params);
        assert_eq!(n, 2);
        assert_eq!(remap, [0, 1, 0, 1]);
        assert_eq!(params, [(40, 20), (50, 22), (50, 22), (50, 22)]);

        let mut distinct = [(1, 0), (2, 0), (3, 0)];
        let (remap, n) = merge_equivalent(&mut distinct);
        assert_eq!((n, &remap[..3]), (3, &[0u8, 1, 2][..]));
    }

    #[test]
    fn quality_maps_monotonically() {
        let mut prev = 128u8;
        for quality in (0..=100).step_by(5) {
            let q = segment_quant(quality_to_compression(quality as f32), 0, 50);
            assert!(q <= prev);
            prev = q;
        }
        assert_eq!(segment_quant(quality_to_compression(100.0), 0, 50), 0);
        assert_eq!(segment_quant(quality_to_compression(0.0), 0, 50), 127);
    }

    #[test]
    fn smooth_segments_get_finer_quantizers() {
        let c = quality_to_compression(75.0);
        assert!(segment_quant(c, 100, 80) < segment_quant(c, -100, 80));
        // without SNS alpha has no effect
        assert_eq!(segment_quant(c, 100, 0), segment_quant(c, -100, 0));
    }

    #[test]
    fn chroma_deltas_are_clamped() {
        assert_eq!(chroma_deltas(64, 100), (0, -4));
        assert_eq!(chroma_deltas(255, 100), (6, -4));
        assert_eq!(chroma_deltas(0, 100), (-4, -4));
        assert_eq!(chroma_deltas(255, 0), (0, 0));
    }

    #[test]
    fn segment_tree_probabilities() {
        assert_eq!(segment_probas(&[10, 0, 0, 0]), [255, 255, 255]);
        assert_eq!(segment_probas(&[5, 5, 5, 5]), [128, 128, 128]);
        assert_eq!(segment_probas(&[0, 4, 0, 0]), [255, 0, 255]);
        assert_eq!(segment_map_cost(&[0; 4], &[128; 3]), 0);
        assert_eq!(segment_map_cost(&[1, 0, 0, 0], &[128; 3]), 512);
    }
}
