// ============================================================================
// LANES: one distance kernel, scalar and 4-wide
// ============================================================================
//
// The closest-segment search is written once against `Lanes`.  `f32` gives
// the scalar path and `wide::f32x4` the SSE-width path.  Both evaluate the
// same IEEE operations in the same order (no fused multiply-add), so the
// minimum they find is bit-identical.

use wide::f32x4;

use crate::raster::clip::POINT_STRIDE;

pub trait Lanes: Copy {
    const WIDTH: usize;

    fn splat(v: f32) -> Self;
    fn from_fn<F: FnMut(usize) -> f32>(f: F) -> Self;
    fn add(self, o: Self) -> Self;
    fn sub(self, o: Self) -> Self;
    fn mul(self, o: Self) -> Self;
    fn div(self, o: Self) -> Self;
    fn max(self, o: Self) -> Self;
    fn min(self, o: Self) -> Self;
    fn sqrt(self) -> Self;
    fn lane(self, i: usize) -> f32;
}

impl Lanes for f32 {
    const WIDTH: usize = 1;

    #[inline]
    fn splat(v: f32) -> Self {
        v
    }
    #[inline]
    fn from_fn<F: FnMut(usize) -> f32>(mut f: F) -> Self {
        f(0)
    }
    #[inline]
    fn add(self, o: Self) -> Self {
        self + o
    }
    #[inline]
    fn sub(self, o: Self) -> Self {
        self - o
    }
    #[inline]
    fn mul(self, o: Self) -> Self {
        self * o
    }
    #[inline]
    fn div(self, o: Self) -> Self {
        self / o
    }
    #[inline]
    fn max(self, o: Self) -> Self {
        f32::max(self, o)
    }
    #[inline]
    fn min(self, o: Self) -> Self {
        f32::min(self, o)
    }
    #[inline]
    fn sqrt(self) -> Self {
        f32::sqrt(self)
    }
    #[inline]
    fn lane(self, _i: usize) -> f32 {
        self
    }
}

impl Lanes for f32x4 {
    const WIDTH: usize = 4;

    #[inline]
    fn splat(v: f32) -> Self {
        f32x4::splat(v)
    }
    #[inline]
    fn from_fn<F: FnMut(usize) -> f32>(mut f: F) -> Self {
        f32x4::new([f(0), f(1), f(2), f(3)])
    }
    #[inline]
    fn add(self, o: Self) -> Self {
        self + o
    }
    #[inline]
    fn sub(self, o: Self) -> Self {
        self - o
    }
    #[inline]
    fn mul(self, o: Self) -> Self {
        self * o
    }
    #[inline]
    fn div(self, o: Self) -> Self {
        self / o
    }
    #[inline]
    fn max(self, o: Self) -> Self {
        f32x4::max(self, o)
    }
    #[inline]
    fn min(self, o: Self) -> Self {
        f32x4::min(self, o)
    }
    #[inline]
    fn sqrt(self) -> Self {
        f32x4::sqrt(self)
    }
    #[inline]
    fn lane(self, i: usize) -> f32 {
        self.to_array()[i]
    }
}

/// Nearest point of a stroke's distance field, relative to the pixel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Closest {
    /// Distance to the tube surface: negative inside the brush.
    pub dist: f32,
    pub cx: f32,
    pub cy: f32,
    /// Brush radius at the closest point, local units.
    pub radius: f32,
}

impl Closest {
    pub const FAR: Closest = Closest { dist: f32::MAX, cx: 0.0, cy: 0.0, radius: 0.0 };
}

/// Distance from pixel `(px, py)` to a single clipped point.
pub fn closest_to_point(points: &[f32], px: f32, py: f32, radius_scale: f32) -> Closest {
    let ax = points[0] - px;
    let ay = points[1] - py;
    let radius = points[2] * radius_scale;
    Closest { dist: (ax * ax + ay * ay).sqrt() - radius, cx: ax, cy: ay, radius }
}

/// Minimum signed distance from pixel `(px, py)` to `num_segments` segment
/// pairs stored as `[x, y, pressure]` triples (A,B, B,C, ...).  Lanes past
/// `num_segments` read padding and are ignored in the reduction.
pub fn closest_on_segments<L: Lanes>(
    points: &[f32],
    num_segments: usize,
    px: f32,
    py: f32,
    radius_scale: f32,
) -> Closest {
    let zero = L::splat(0.0);
    let one = L::splat(1.0);
    let tiny = L::splat(f32::MIN_POSITIVE);
    let rs = L::splat(radius_scale);
    let mut best = Closest::FAR;

    let mut s = 0;
    while s < num_segments {
        let at = |seg: usize, field: usize| (2 * seg) * POINT_STRIDE + field;
        let bt = |seg: usize, field: usize| (2 * seg + 1) * POINT_STRIDE + field;

        let ax = L::from_fn(|l| points[at(s + l, 0)] - px);
        let ay = L::from_fn(|l| points[at(s + l, 1)] - py);
        let ap = L::from_fn(|l| points[at(s + l, 2)]);
        let bx = L::from_fn(|l| points[bt(s + l, 0)] - px);
        let by = L::from_fn(|l| points[bt(s + l, 1)] - py);
        let bp = L::from_fn(|l| points[bt(s + l, 2)]);

        let abx = bx.sub(ax);
        let aby = by.sub(ay);
        let len2 = abx.mul(abx).add(aby.mul(aby));
        // (P - A)·(B - A) with P at the origin
        let proj = zero.sub(ax.mul(abx).add(ay.mul(aby)));
        let t = proj.div(len2.max(tiny)).max(zero).min(one);

        let cx = ax.add(t.mul(abx));
        let cy = ay.add(t.mul(aby));
        let radius = ap.add(t.mul(bp.sub(ap))).mul(rs);
        let dist = cx.mul(cx).add(cy.mul(cy)).sqrt().sub(radius);

        for l in 0..L::WIDTH {
            if s + l >= num_segments {
                break;
            }
            let d = dist.lane(l);
            if d < best.dist {
                best = Closest { dist: d, cx: cx.lane(l), cy: cy.lane(l), radius: radius.lane(l) };
            }
        }
        s += L::WIDTH;
    }
    best
}
