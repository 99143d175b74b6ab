// ============================================================================
// STROKE CLIPPER: visibility masks and tile-local point lists
// ============================================================================

use crate::arena::{Arena, ArenaError, ArenaSlice};
use crate::canvas::{Brush, CanvasView, Stroke};
use crate::geometry::{Rect, V2l, segment_maybe_in_rect};
use crate::raster::scene::Scene;

/// Zeroed points appended after every clipped stroke so 4-wide loads can run
/// past the logical end.
pub const CLIP_PADDING_POINTS: usize = 8;

/// Views at or above this scale clip with a 4× local precision multiplier.
pub const LOCAL_SCALE_ZOOM_THRESHOLD: i64 = 1 << 12;

/// Floats per clipped point: x, y, pressure.
pub const POINT_STRIDE: usize = 3;

pub fn local_scale_for(view: &CanvasView) -> i64 {
    if view.scale >= LOCAL_SCALE_ZOOM_THRESHOLD { 4 } else { 1 }
}

/// Does the disc `(p0, r0)` cover the disc `(p1, r1)`?
///
/// Uses Manhattan distance, so it under-reports containment near the
/// diagonals.  Only used for point decimation inside one stroke.  A negative
/// `r0` contains everything.
pub fn stroke_point_contains_point(p0: V2l, r0: i64, p1: V2l, r1: i64) -> bool {
    if r0 < 0 {
        return true;
    }
    let d = (p1 - p0).manhattan();
    r0 >= d + r1
}

/// Conservative stroke/rect overlap test.  False positives are possible,
/// false negatives are not.
pub fn stroke_intersects_rect(stroke: &Stroke, rect: &Rect) -> bool {
    if stroke.is_empty() || !stroke.bounding_rect().intersects(rect) {
        return false;
    }
    let enlarged = rect.enlarge(stroke.brush.radius.max(0));
    let points = stroke.points();
    if points.len() == 1 {
        return enlarged.contains(points[0]);
    }
    points.windows(2).any(|w| segment_maybe_in_rect(w[0], w[1], &enlarged))
}

// ============================================================================
// VISIBILITY MASK
// ============================================================================

/// One bit per scene stroke ordinal.  Owned by a single worker.
#[derive(Default, Debug)]
pub struct StrokeMask {
    words: Vec<u64>,
}

impl StrokeMask {
    pub fn clear(&mut self, len: usize) {
        self.words.clear();
        self.words.resize(len.div_ceil(64), 0);
    }

    pub fn set(&mut self, ordinal: usize) {
        self.words[ordinal / 64] |= 1u64 << (ordinal % 64);
    }

    pub fn get(&self, ordinal: usize) -> bool {
        self.words
            .get(ordinal / 64)
            .is_some_and(|w| w & (1u64 << (ordinal % 64)) != 0)
    }

    /// Recompute against a canvas-space query rect.
    pub fn compute(&mut self, scene: &Scene<'_>, rect: &Rect) {
        self.clear(scene.stroke_count());
        for (ordinal, stroke) in scene.ordered_strokes() {
            if stroke_intersects_rect(stroke, rect) {
                self.set(ordinal);
            }
        }
    }
}

// ============================================================================
// CLIPPED STROKES
// ============================================================================

/// A stroke re-expressed for one tile: `[x, y, pressure]` triples laid out
/// as segment pairs A,B, B,C, ... (only segments near the tile survive), or a
/// single point.  Coordinates are `(canvas - reference) * local_scale`.
#[derive(Clone, Copy, Debug)]
pub struct ClippedStroke {
    pub brush: Brush,
    pub num_points: usize,
    pub points: ArenaSlice,
}

impl ClippedStroke {
    pub fn is_single_point(&self) -> bool {
        self.num_points == 1
    }

    pub fn num_segments(&self) -> usize {
        self.num_points / 2
    }
}

/// Entry of the per-tile draw list.  `LayerMark` separates layers so eraser
/// state does not leak across them.
#[derive(Clone, Copy, Debug)]
pub enum ClipNode {
    Stroke(ClippedStroke),
    LayerMark { alpha: f32 },
}

fn write_point(dst: &mut [f32], p: V2l, pressure: f32, reference: V2l, local_scale: i64) {
    dst[0] = p.x.saturating_sub(reference.x).saturating_mul(local_scale) as f32;
    dst[1] = p.y.saturating_sub(reference.y).saturating_mul(local_scale) as f32;
    dst[2] = pressure;
}

/// Clip `stroke` against canvas rect `rect`.
///
/// `Ok(None)` means nothing of the stroke can touch the rect.  An arena
/// error means the tile must be retried with more memory.
pub fn stroke_clip_to_rect(
    arena: &mut Arena<f32>,
    stroke: &Stroke,
    rect: &Rect,
    reference: V2l,
    local_scale: i64,
) -> Result<Option<ClippedStroke>, ArenaError> {
    let points = stroke.points();
    let pressures = stroke.pressures();
    let enlarged = rect.enlarge(stroke.brush.radius.max(0));

    if points.len() == 1 {
        if !enlarged.contains(points[0]) {
            return Ok(None);
        }
        let slice = arena.alloc((1 + CLIP_PADDING_POINTS) * POINT_STRIDE)?;
        write_point(arena.get_mut(slice), points[0], pressures[0], reference, local_scale);
        return Ok(Some(ClippedStroke { brush: stroke.brush, num_points: 1, points: slice }));
    }

    let kept = points
        .windows(2)
        .filter(|w| segment_maybe_in_rect(w[0], w[1], &enlarged))
        .count();
    if kept == 0 {
        return Ok(None);
    }

    // Round up to whole 4-segment groups, then pad.
    let capacity_points = 2 * kept.next_multiple_of(4) + CLIP_PADDING_POINTS;
    let slice = arena.alloc(capacity_points * POINT_STRIDE)?;
    let out = arena.get_mut(slice);
    let mut cursor = 0;
    for i in 0..points.len() - 1 {
        let (a, b) = (points[i], points[i + 1]);
        if !segment_maybe_in_rect(a, b, &enlarged) {
            continue;
        }
        write_point(&mut out[cursor..], a, pressures[i], reference, local_scale);
        cursor += POINT_STRIDE;
        write_point(&mut out[cursor..], b, pressures[i + 1], reference, local_scale);
        cursor += POINT_STRIDE;
    }

    Ok(Some(ClippedStroke { brush: stroke.brush, num_points: 2 * kept, points: slice }))
}

/// Build the newest-first draw list for one tile.  Only strokes whose bit is
/// set in `mask` are considered; every visible layer starts with a marker.
pub fn build_clip_list(
    scene: &Scene<'_>,
    mask: &StrokeMask,
    rect: &Rect,
    reference: V2l,
    local_scale: i64,
    arena: &mut Arena<f32>,
    out: &mut Vec<ClipNode>,
) -> Result<(), ArenaError> {
    out.clear();
    let mut ordinal = 0;
    for layer in &scene.layers {
        out.push(ClipNode::LayerMark { alpha: layer.alpha });
        for stroke in &layer.strokes {
            let visible = mask.get(ordinal);
            ordinal += 1;
            if !visible || !stroke_intersects_rect(stroke, rect) {
                continue;
            }
            if let Some(clipped) = stroke_clip_to_rect(arena, stroke, rect, reference, local_scale)? {
                out.push(ClipNode::Stroke(clipped));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::v2l;

    fn stroke(points: &[(i64, i64)], radius: i64) -> Stroke {
        let pts = points.iter().map(|&(x, y)| v2l(x, y)).collect::<Vec<_>>();
        let pr = vec![1.0; pts.len()];
        Stroke::from_parts(Brush::new(radius, [0, 0, 0], 1.0), pts, pr).unwrap()
    }

    #[test]
    fn containment_is_manhattan() {
        assert!(stroke_point_contains_point(v2l(0, 0), 10, v2l(3, 3), 4));
        assert!(!stroke_point_contains_point(v2l(0, 0), 10, v2l(4, 3), 4));
        assert!(stroke_point_contains_point(v2l(0, 0), -1, v2l(1_000_000, 0), 500));
    }

    #[test]
    fn intersection_uses_radius() {
        let s = stroke(&[(0, 0)], 5);
        assert!(stroke_intersects_rect(&s, &Rect::new(4, 4, 20, 20)));
        assert!(!stroke_intersects_rect(&s, &Rect::new(6, 6, 20, 20)));
        let line = stroke(&[(-100, 50), (100, 50)], 2);
        assert!(stroke_intersects_rect(&line, &Rect::new(0, 0, 10, 49)));
        assert!(!stroke_intersects_rect(&line, &Rect::new(0, 0, 10, 40)));
    }

    #[test]
    fn clip_emits_pairs_for_nearby_segments_only() {
        let s = stroke(&[(0, 0), (10, 0), (10, 100), (10, 200)], 1);
        let mut arena = Arena::new(1024);
        let rect = Rect::new(0, -5, 20, 20);
        let c = stroke_clip_to_rect(&mut arena, &s, &rect, v2l(0, -5), 1).unwrap().unwrap();
        assert_eq!(c.num_points, 4);
        let data = arena.get(c.points);
        assert_eq!(&data[..12], &[0.0, 5.0, 1.0, 10.0, 5.0, 1.0, 10.0, 5.0, 1.0, 10.0, 105.0, 1.0]);
        // 2 segments round up to 4, plus padding
        assert_eq!(data.len(), (8 + CLIP_PADDING_POINTS) * POINT_STRIDE);
        assert!(data[12..].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn clip_applies_local_scale() {
        let s = stroke(&[(3, 4)], 1);
        let mut arena = Arena::new(64);
        let c = stroke_clip_to_rect(&mut arena, &s, &Rect::new(0, 0, 8, 8), v2l(1, 1), 4)
            .unwrap()
            .unwrap();
        assert!(c.is_single_point());
        assert_eq!(&arena.get(c.points)[..3], &[8.0, 12.0, 1.0]);
    }

    #[test]
    fn clip_reports_exhaustion() {
        let s = stroke(&[(0, 0), (1, 1)], 1);
        let mut arena = Arena::new(4);
        assert!(stroke_clip_to_rect(&mut arena, &s, &Rect::new(0, 0, 8, 8), v2l(0, 0), 1).is_err());
    }

    #[test]
    fn mask_bits() {
        let mut mask = StrokeMask::default();
        mask.clear(130);
        mask.set(0);
        mask.set(129);
        assert!(mask.get(129) && mask.get(0) && !mask.get(64));
        assert!(!mask.get(1000));
        assert_eq!((0..130).filter(|&i| mask.get(i)).count(), 2);
    }
}
