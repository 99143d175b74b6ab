// ============================================================================
// GEOMETRY: integer vectors, rectangles and sampling helpers
// ============================================================================

use std::ops::{Add, Mul, Neg, Sub};

use serde::{Deserialize, Serialize};

/// Raster-space point (screen pixels).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct V2i {
    pub x: i32,
    pub y: i32,
}

/// Canvas-space point.  Canvas coordinates are zoom-invariant and can grow
/// well past `i32` when the user zooms far out.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct V2l {
    pub x: i64,
    pub y: i64,
}

pub const fn v2i(x: i32, y: i32) -> V2i {
    V2i { x, y }
}

pub const fn v2l(x: i64, y: i64) -> V2l {
    V2l { x, y }
}

impl V2i {
    pub fn to_v2l(self) -> V2l {
        v2l(self.x as i64, self.y as i64)
    }
}

impl V2l {
    pub fn manhattan(self) -> i64 {
        self.x.abs() + self.y.abs()
    }
}

macro_rules! impl_vec_ops {
    ($t:ty, $s:ty) => {
        impl Add for $t {
            type Output = $t;
            fn add(self, o: $t) -> $t {
                Self { x: self.x + o.x, y: self.y + o.y }
            }
        }
        impl Sub for $t {
            type Output = $t;
            fn sub(self, o: $t) -> $t {
                Self { x: self.x - o.x, y: self.y - o.y }
            }
        }
        impl Mul<$s> for $t {
            type Output = $t;
            fn mul(self, k: $s) -> $t {
                Self { x: self.x * k, y: self.y * k }
            }
        }
        impl Neg for $t {
            type Output = $t;
            fn neg(self) -> $t {
                Self { x: -self.x, y: -self.y }
            }
        }
    };
}

impl_vec_ops!(V2i, i32);
impl_vec_ops!(V2l, i64);

// ============================================================================
// RECT
// ============================================================================

/// Axis-aligned integer rectangle, `right` and `bottom` exclusive.
///
/// `left > right` (or `top > bottom`) marks an invalid rect; check
/// [`Rect::is_valid`] before using one that came out of an intersection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub left: i64,
    pub right: i64,
    pub top: i64,
    pub bottom: i64,
}

impl Rect {
    pub const INVALID: Rect = Rect { left: i64::MAX, right: i64::MIN, top: i64::MAX, bottom: i64::MIN };

    pub const fn new(left: i64, top: i64, right: i64, bottom: i64) -> Self {
        Self { left, right, top, bottom }
    }

    pub fn from_corners(top_left: V2l, bot_right: V2l) -> Self {
        Self::new(top_left.x, top_left.y, bot_right.x, bot_right.y)
    }

    pub fn top_left(&self) -> V2l {
        v2l(self.left, self.top)
    }

    pub fn bot_right(&self) -> V2l {
        v2l(self.right, self.bottom)
    }

    pub fn width(&self) -> i64 {
        self.right - self.left
    }

    pub fn height(&self) -> i64 {
        self.bottom - self.top
    }

    pub fn is_valid(&self) -> bool {
        self.left <= self.right && self.top <= self.bottom
    }

    /// Valid but covering no pixels.
    pub fn is_empty(&self) -> bool {
        !self.is_valid() || self.left == self.right || self.top == self.bottom
    }

    pub fn area(&self) -> i64 {
        if self.is_valid() { self.width() * self.height() } else { 0 }
    }

    /// Intersection; may be invalid when the rects are disjoint.
    pub fn intersect(&self, o: &Rect) -> Rect {
        Rect {
            left: self.left.max(o.left),
            right: self.right.min(o.right),
            top: self.top.max(o.top),
            bottom: self.bottom.min(o.bottom),
        }
    }

    /// Smallest rect containing both.  Invalid operands are ignored.
    pub fn union(&self, o: &Rect) -> Rect {
        if !self.is_valid() {
            return *o;
        }
        if !o.is_valid() {
            return *self;
        }
        Rect {
            left: self.left.min(o.left),
            right: self.right.max(o.right),
            top: self.top.min(o.top),
            bottom: self.bottom.max(o.bottom),
        }
    }

    pub fn enlarge(&self, by: i64) -> Rect {
        Rect {
            left: self.left.saturating_sub(by),
            right: self.right.saturating_add(by),
            top: self.top.saturating_sub(by),
            bottom: self.bottom.saturating_add(by),
        }
    }

    /// Inclusive on all four edges so that points on a bounding box built
    /// from the points themselves count as inside.
    pub fn contains(&self, p: V2l) -> bool {
        p.x >= self.left && p.x <= self.right && p.y >= self.top && p.y <= self.bottom
    }

    pub fn intersects(&self, o: &Rect) -> bool {
        self.intersect(o).is_valid()
    }
}

/// Bounding rect of a point set (inclusive of the extreme points).
/// Returns [`Rect::INVALID`] for an empty set.
pub fn bounding_rect_for_points(points: &[V2l]) -> Rect {
    let mut rect = Rect::INVALID;
    for p in points {
        rect.left = rect.left.min(p.x);
        rect.right = rect.right.max(p.x);
        rect.top = rect.top.min(p.y);
        rect.bottom = rect.bottom.max(p.y);
    }
    rect
}

/// Split `rect` into tiles of at most `width × height`, row-major.
pub fn rect_split(rect: &Rect, width: i64, height: i64) -> Vec<Rect> {
    assert!(width > 0 && height > 0, "rect_split needs a positive tile size");
    if rect.is_empty() {
        return Vec::new();
    }
    let cols = (rect.width() + width - 1) / width;
    let rows = (rect.height() + height - 1) / height;
    let mut out = Vec::with_capacity((cols * rows) as usize);
    let mut top = rect.top;
    while top < rect.bottom {
        let bottom = (top + height).min(rect.bottom);
        let mut left = rect.left;
        while left < rect.right {
            let right = (left + width).min(rect.right);
            out.push(Rect::new(left, top, right, bottom));
            left = right;
        }
        top = bottom;
    }
    out
}

/// Conservative segment/rect test: rejects only when both endpoints lie
/// strictly outside the same side of `rect`.  May report segments that pass
/// near a corner; never misses one that touches.
pub fn segment_maybe_in_rect(a: V2l, b: V2l, rect: &Rect) -> bool {
    let both_left = a.x < rect.left && b.x < rect.left;
    let both_right = a.x > rect.right && b.x > rect.right;
    let both_above = a.y < rect.top && b.y < rect.top;
    let both_below = a.y > rect.bottom && b.y > rect.bottom;
    !(both_left || both_right || both_above || both_below)
}

// ============================================================================
// COVERAGE SAMPLING
// ============================================================================

/// Number of coverage samples per pixel.
pub const SAMPLE_COUNT: u32 = 16;

/// 4×4 rotated-grid sample offsets, in pixels from the pixel center: four
/// 2×2 quads centered at (±¼, ±¼), each holding a rotated-grid pattern.
pub const ROTATED_GRID_OFFSETS: [[f32; 2]; 16] = {
    const QUAD: [[f32; 2]; 4] = [
        [-1.0 / 16.0, -3.0 / 16.0],
        [3.0 / 16.0, -1.0 / 16.0],
        [1.0 / 16.0, 3.0 / 16.0],
        [-3.0 / 16.0, 1.0 / 16.0],
    ];
    const CENTERS: [[f32; 2]; 4] = [[-0.25, -0.25], [0.25, -0.25], [-0.25, 0.25], [0.25, 0.25]];
    let mut out = [[0.0f32; 2]; 16];
    let mut q = 0;
    while q < 4 {
        let mut s = 0;
        while s < 4 {
            out[q * 4 + s] = [CENTERS[q][0] + QUAD[s][0], CENTERS[q][1] + QUAD[s][1]];
            s += 1;
        }
        q += 1;
    }
    out
};

/// Upper bound on the distance from a pixel center to any of its samples.
/// The farthest sample sits at (7/16, 5/16) ≈ 0.538 px.
pub const MAX_SAMPLE_REACH: f32 = 0.54;

/// Radii at or above this use `sqrt` comparisons instead of squared ones.
pub const SQRT_RADIUS_THRESHOLD: f32 = 65536.0;

/// Count how many of the 16 samples around the origin pixel fall inside the
/// disc of `radius` centered at `(cx, cy)`.  All quantities are in the same
/// local units; `sample_scale` converts pixel offsets into those units.
pub fn disc_coverage(cx: f32, cy: f32, radius: f32, sample_scale: f32) -> u32 {
    let mut count = 0;
    if radius < SQRT_RADIUS_THRESHOLD {
        let r2 = radius * radius;
        for o in ROTATED_GRID_OFFSETS.iter() {
            let dx = o[0] * sample_scale - cx;
            let dy = o[1] * sample_scale - cy;
            if dx * dx + dy * dy < r2 {
                count += 1;
            }
        }
    } else {
        for o in ROTATED_GRID_OFFSETS.iter() {
            let dx = o[0] * sample_scale - cx;
            let dy = o[1] * sample_scale - cy;
            if (dx * dx + dy * dy).sqrt() < radius {
                count += 1;
            }
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_covers_rect_without_overlap() {
        let r = Rect::new(3, 5, 100, 70);
        let tiles = rect_split(&r, 32, 32);
        assert_eq!(tiles.len(), 4 * 3);
        assert_eq!(tiles.iter().map(|t| t.area()).sum::<i64>(), r.area());
        for (i, a) in tiles.iter().enumerate() {
            for b in &tiles[i + 1..] {
                assert!(a.intersect(b).is_empty());
            }
        }
    }

    #[test]
    fn invalid_rects_are_representable() {
        let a = Rect::new(0, 0, 10, 10);
        let b = Rect::new(20, 20, 30, 30);
        let i = a.intersect(&b);
        assert!(!i.is_valid());
        assert_eq!(i.area(), 0);
        assert_eq!(Rect::INVALID.union(&a), a);
    }

    #[test]
    fn maybe_in_rect_never_misses_a_crossing() {
        let r = Rect::new(0, 0, 10, 10);
        assert!(segment_maybe_in_rect(v2l(-5, 5), v2l(15, 5), &r));
        assert!(!segment_maybe_in_rect(v2l(-5, -5), v2l(-1, 20), &r));
        // near-corner false positive is allowed
        assert!(segment_maybe_in_rect(v2l(-5, 4), v2l(4, -5), &r));
    }

    #[test]
    fn sample_reach_bounds_every_offset() {
        for o in ROTATED_GRID_OFFSETS {
            assert!((o[0] * o[0] + o[1] * o[1]).sqrt() <= MAX_SAMPLE_REACH);
        }
    }

    #[test]
    fn coverage_paths_agree() {
        assert_eq!(disc_coverage(0.0, 0.0, 10.0, 1.0), 16);
        assert_eq!(disc_coverage(20.0, 0.0, 10.0, 1.0), 0);
        let half = disc_coverage(10.0, 0.0, 10.0, 1.0);
        assert!(half > 0 && half < 16);
        // huge radius takes the sqrt branch
        assert_eq!(disc_coverage(0.0, 0.0, 1.0e6, 1.0), 16);
        assert_eq!(disc_coverage(2.0e6, 0.0, 1.0e6, 1.0), 0);
    }
}
