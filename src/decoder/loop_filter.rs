//! In-loop deblocking filter.
//!
//! Every primitive works on a sample buffer, the index `pos` of the first
//! sample past the edge (`q0`) and the distance `step` between samples that
//! straddle it: `1` across a vertical edge, the row stride across a
//! horizontal one. `p0` is at `pos - step`, `p3` at `pos - 4 * step`.

/// Strength of the filter for one (segment, prediction class) pair.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct FilterParams {
    /// Sub-block edge limit `2 * level + interior`; 0 disables filtering.
    pub limit: u8,
    /// Interior limit compared against differences on one side of the edge.
    pub interior: u8,
    /// High edge variance threshold.
    pub hev_threshold: u8,
}

impl FilterParams {
    /// Derives the limits for a filter `level` in `0..=63` and `sharpness`
    /// in `0..=7`.
    pub(crate) fn new(level: u8, sharpness: u8) -> Self {
        assert!(level <= 63, "filter level {level} out of range");
        assert!(sharpness <= 7, "filter sharpness {sharpness} out of range");
        if level == 0 {
            return Self::default();
        }
        let mut interior = level;
        if sharpness > 0 {
            interior >>= if sharpness > 4 { 2 } else { 1 };
            interior = interior.min(9 - sharpness);
        }
        let interior = interior.max(1);
        let hev_threshold = match level {
            40.. => 2,
            15.. => 1,
            _ => 0,
        };
        Self {
            limit: 2 * level + interior,
            interior,
            hev_threshold,
        }
    }

    /// True when this strength leaves every pixel untouched.
    pub(crate) fn is_disabled(&self) -> bool {
        self.limit == 0
    }

    /// Limit applied across macroblock edges.
    fn mb_limit(&self) -> i32 {
        i32::from(self.limit) + 4
    }
}

#[inline(always)]
fn clip_signed(v: i32) -> i32 {
    v.clamp(-128, 127)
}

#[inline(always)]
fn clip_tap(v: i32) -> i32 {
    v.clamp(-16, 15)
}

#[inline(always)]
fn clip_pixel(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}

#[inline(always)]
fn at(buf: &[u8], pos: usize, back: usize, step: usize) -> i32 {
    i32::from(buf[pos - back * step])
}

// 2*|p0-q0| + |p1-q1|/2 <= limit, written without the division.
#[inline(always)]
fn edge_ok(buf: &[u8], pos: usize, step: usize, limit: i32) -> bool {
    let p1 = at(buf, pos, 2, step);
    let p0 = at(buf, pos, 1, step);
    let q0 = i32::from(buf[pos]);
    let q1 = i32::from(buf[pos + step]);
    4 * (p0 - q0).abs() + (p1 - q1).abs() <= 2 * limit + 1
}

#[inline(always)]
fn normal_ok(buf: &[u8], pos: usize, step: usize, limit: i32, interior: i32) -> bool {
    if !edge_ok(buf, pos, step, limit) {
        return false;
    }
    let p3 = at(buf, pos, 4, step);
    let p2 = at(buf, pos, 3, step);
    let p1 = at(buf, pos, 2, step);
    let p0 = at(buf, pos, 1, step);
    let q0 = i32::from(buf[pos]);
    let q1 = i32::from(buf[pos + step]);
    let q2 = i32::from(buf[pos + 2 * step]);
    let q3 = i32::from(buf[pos + 3 * step]);
    [p3 - p2, p2 - p1, p1 - p0, q3 - q2, q2 - q1, q1 - q0]
        .iter()
        .all(|d| d.abs() <= interior)
}

#[inline(always)]
fn high_edge_variance(buf: &[u8], pos: usize, step: usize, threshold: i32) -> bool {
    let p1 = at(buf, pos, 2, step);
    let p0 = at(buf, pos, 1, step);
    let q0 = i32::from(buf[pos]);
    let q1 = i32::from(buf[pos + step]);
    (p1 - p0).abs() > threshold || (q1 - q0).abs() > threshold
}

// Adjusts p0 and q0 only.
#[inline(always)]
fn filter2(buf: &mut [u8], pos: usize, step: usize) {
    let p1 = at(buf, pos, 2, step);
    let p0 = at(buf, pos, 1, step);
    let q0 = i32::from(buf[pos]);
    let q1 = i32::from(buf[pos + step]);
    let a = 3 * (q0 - p0) + clip_signed(p1 - q1);
    let a1 = clip_tap((a + 4) >> 3);
    let a2 = clip_tap((a + 3) >> 3);
    buf[pos - step] = clip_pixel(p0 + a2);
    buf[pos] = clip_pixel(q0 - a1);
}

// Adjusts p1, p0, q0 and q1.
#[inline(always)]
fn filter4(buf: &mut [u8], pos: usize, step: usize) {
    let p1 = at(buf, pos, 2, step);
    let p0 = at(buf, pos, 1, step);
    let q0 = i32::from(buf[pos]);
    let q1 = i32::from(buf[pos + step]);
    let a = 3 * (q0 - p0);
    let a1 = clip_tap((a + 4) >> 3);
    let a2 = clip_tap((a + 3) >> 3);
    let a3 = (a1 + 1) >> 1;
    buf[pos - 2 * step] = clip_pixel(p1 + a3);
    buf[pos - step] = clip_pixel(p0 + a2);
    buf[pos] = clip_pixel(q0 - a1);
    buf[pos + step] = clip_pixel(q1 - a3);
}

// Adjusts three samples on each side.
#[inline(always)]
fn filter6(buf: &mut [u8], pos: usize, step: usize) {
    let p2 = at(buf, pos, 3, step);
    let p1 = at(buf, pos, 2, step);
    let p0 = at(buf, pos, 1, step);
    let q0 = i32::from(buf[pos]);
    let q1 = i32::from(buf[pos + step]);
    let q2 = i32::from(buf[pos + 2 * step]);
    let a = clip_signed(3 * (q0 - p0) + clip_signed(p1 - q1));
    let a1 = (27 * a + 63) >> 7;
    let a2 = (18 * a + 63) >> 7;
    let a3 = (9 * a + 63) >> 7;
    buf[pos - 3 * step] = clip_pixel(p2 + a3);
    buf[pos - 2 * step] = clip_pixel(p1 + a2);
    buf[pos - step] = clip_pixel(p0 + a1);
    buf[pos] = clip_pixel(q0 - a1);
    buf[pos + step] = clip_pixel(q1 - a2);
    buf[pos + 2 * step] = clip_pixel(q2 - a3);
}

/// Simple filter over `len` samples of one edge, walking by `advance`.
pub(crate) fn simple_edge(
    buf: &mut [u8],
    mut pos: usize,
    step: usize,
    advance: usize,
    len: usize,
    limit: i32,
) {
    for _ in 0..len {
        if edge_ok(buf, pos, step, limit) {
            filter2(buf, pos, step);
        }
        pos += advance;
    }
}

/// Normal filter across a macroblock edge.
pub(crate) fn macroblock_edge(
    buf: &mut [u8],
    mut pos: usize,
    step: usize,
    advance: usize,
    len: usize,
    params: &FilterParams,
) {
    let limit = params.mb_limit();
    let interior = i32::from(params.interior);
    let hev = i32::from(params.hev_threshold);
    for _ in 0..len {
        if normal_ok(buf, pos, step, limit, interior) {
            if high_edge_variance(buf, pos, step, hev) {
                filter2(buf, pos, step);
            } else {
                filter6(buf, pos, step);
            }
        }
        pos += advance;
    }
}

/// Normal filter across an edge between subblocks.
pub(crate) fn subblock_edge(
    buf: &mut [u8],
    mut pos: usize,
    step: usize,
    advance: usize,
    len: usize,
    params: &FilterParams,
) {
    let limit = i32::from(params.limit);
    let interior = i32::from(params.interior);
    let hev = i32::from(params.hev_threshold);
    for _ in 0..len {
        if normal_ok(buf, pos, step, limit, interior) {
            if high_edge_variance(buf, pos, step, hev) {
                filter2(buf, pos, step);
            } else {
                filter4(buf, pos, step);
            }
        }
        pos += advance;
    }
}

/// The three reconstructed planes of a frame, macroblock aligned.
pub(crate) struct Planes<'a> {
    pub y: &'a mut [u8],
    pub u: &'a mut [u8],
    pub v: &'a mut [u8],
    pub y_stride: usize,
    pub uv_stride: usize,
}

/// Filters the edges owned by macroblock `(mbx, mby)`: its left and top
/// macroblock edges (when not on the frame border) and, if `inner`, the
/// edges between its subblocks.
///
/// The macroblocks to the left and above must already be filtered.
pub(crate) fn filter_macroblock(
    planes: &mut Planes<'_>,
    mbx: usize,
    mby: usize,
    params: &FilterParams,
    inner: bool,
    simple: bool,
) {
    if params.is_disabled() {
        return;
    }
    let ys = planes.y_stride;
    let uvs = planes.uv_stride;
    let y0 = mby * 16 * ys + mbx * 16;
    let uv0 = mby * 8 * uvs + mbx * 8;

    if simple {
        let mb_limit = params.mb_limit();
        let limit = i32::from(params.limit);
        if mbx > 0 {
            simple_edge(planes.y, y0, 1, ys, 16, mb_limit);
        }
        if inner {
            for x in [4, 8, 12] {
                simple_edge(planes.y, y0 + x, 1, ys, 16, limit);
            }
        }
        if mby > 0 {
            simple_edge(planes.y, y0, ys, 1, 16, mb_limit);
        }
        if inner {
            for y in [4, 8, 12] {
                simple_edge(planes.y, y0 + y * ys, ys, 1, 16, limit);
            }
        }
        return;
    }

    if mbx > 0 {
        macroblock_edge(planes.y, y0, 1, ys, 16, params);
        macroblock_edge(planes.u, uv0, 1, uvs, 8, params);
        macroblock_edge(planes.v, uv0, 1, uvs, 8, params);
    }
    if inner {
        for x in [4, 8, 12] {
            subblock_edge(planes.y, y0 + x, 1, ys, 16, params);
        }
        subblock_edge(planes.u, uv0 + 4, 1, uvs, 8, params);
        subblock_edge(planes.v, uv0 + 4, 1, uvs, 8, params);
    }
    if mby > 0 {
        macroblock_edge(planes.y, y0, ys, 1, 16, params);
        macroblock_edge(planes.u, uv0, uvs, 1, 8, params);
        macroblock_edge(planes.v, uv0, uvs, 1, 8, params);
    }
    if inner {
        for y in [4, 8, 12] {
            subblock_edge(planes.y, y0 + y * ys, ys, 1, 16, params);
        }
        subblock_edge(planes.u, uv0 + 4 * uvs, uvs, 1, 8, params);
        subblock_edge(planes.v, uv0 + 4 * uvs, uvs, 1, 8, params);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use alloc::vec::Vec;

    #[test]
    fn params_follow_sharpness() {
        let p = FilterParams::new(20, 0);
        assert_eq!((p.limit, p.interior, p.hev_threshold), (60, 20, 1));
        let p = FilterParams::new(20, 3);
        assert_eq!((p.limit, p.interior, p.hev_threshold), (46, 6, 1));
        let p = FilterParams::new(63, 7);
        assert_eq!((p.limit, p.interior, p.hev_threshold), (128, 2, 2));
        let p = FilterParams::new(1, 6);
        assert_eq!(p.interior, 1);
        assert!(FilterParams::new(0, 5).is_disabled());
        assert_eq!(FilterParams::new(63, 0).limit, 189);
    }

    #[test]
    #[should_panic]
    fn level_above_63_is_a_contract_violation() {
        let _ = FilterParams::new(64, 0);
    }

    #[test]
    fn macroblock_edge_smooths_gentle_step() {
        let mut row = [100, 100, 100, 100, 110, 110, 110, 110];
        macroblock_edge(&mut row, 4, 1, 8, 1, &FilterParams::new(20, 0));
        assert_eq!(row, [100, 101, 103, 104, 106, 107, 109, 110]);
    }

    #[test]
    fn high_variance_touches_only_the_edge_pair() {
        let mut row = [100, 100, 100, 90, 110, 110, 110, 110];
        macroblock_edge(&mut row, 4, 1, 8, 1, &FilterParams::new(30, 0));
        assert_eq!(row, [100, 100, 100, 96, 104, 110, 110, 110]);
    }

    #[test]
    fn strong_edges_are_preserved() {
        let mut row = [10, 10, 10, 10, 200, 200, 200, 200];
        let before = row;
        macroblock_edge(&mut row, 4, 1, 8, 1, &FilterParams::new(20, 0));
        assert_eq!(row, before);
    }

    #[test]
    fn simple_filter_adjusts_edge_pair() {
        let mut row = [100, 100, 100, 100, 110, 110, 110, 110];
        simple_edge(&mut row, 4, 1, 8, 1, FilterParams::new(20, 0).mb_limit());
        assert_eq!(row, [100, 100, 100, 102, 107, 110, 110, 110]);
    }

    #[test]
    fn vertical_step_matches_horizontal() {
        // The same step laid out down a column.
        let stride = 3;
        let mut col: Vec<u8> = [100u8, 100, 100, 100, 110, 110, 110, 110]
            .iter()
            .flat_map(|&v| [0, v, 0])
            .collect();
        macroblock_edge(&mut col, 4 * stride + 1, stride, 1, 1, &FilterParams::new(20, 0));
        let filtered: Vec<u8> = col.chunks(stride).map(|c| c[1]).collect();
        assert_eq!(filtered, [100, 101, 103, 104, 106, 107, 109, 110]);
    }

    #[test]
    fn disabled_params_leave_planes_untouched() {
        let mut y: Vec<u8> = (0..32 * 32).map(|i| (i * 7 % 251) as u8).collect();
        let mut u = vec![90u8; 16 * 16];
        let mut v = vec![30u8; 16 * 16];
        let (y0, u0, v0) = (y.clone(), u.clone(), v.clone());
        let mut planes = Planes {
            y: &mut y,
            u: &mut u,
            v: &mut v,
            y_stride: 32,
            uv_stride: 16,
        };
        for simple in [false, true] {
            filter_macroblock(&mut planes, 1, 1, &FilterParams::new(0, 0), true, simple);
        }
        assert_eq!((y, u, v), (y0, u0, v0));
    }
}
