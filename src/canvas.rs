use serde::{Deserialize, Serialize};

use crate::color::Rgba;
use crate::components::history::HistoryManager;
use crate::components::layers::{LayerId, LayerStack, StrokeRef};
use crate::geometry::{Rect, V2i, V2l, bounding_rect_for_points, v2i, v2l};

/// Maximum number of points in one stroke.  Longer gestures are split.
pub const STROKE_MAX_POINTS: usize = 2048;

/// Pressure value reported by input devices without pressure support.
pub const NO_PRESSURE_INFO: f32 = -1.0;

/// Blocks whose canvas rect leaves `[-limit, limit]` are not rasterized.
pub const CANVAS_RADIUS_LIMIT: i64 = 1 << 30;

/// Largest brush radius accepted from a document.
pub const MAX_BRUSH_RADIUS: i64 = CANVAS_RADIUS_LIMIT;

pub const MIN_SCALE: i64 = 1;
pub const MAX_SCALE: i64 = 1 << 20;
pub const DEFAULT_SCALE: i64 = 64;

pub type StrokeId = u64;

// ============================================================================
// VIEW
// ============================================================================

/// Pan/zoom transform between canvas space and raster space.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanvasView {
    pub screen_size: V2i,
    pub screen_center: V2i,
    /// Canvas units.
    pub pan_vector: V2l,
    /// Canvas units per pixel, always ≥ 1.
    pub scale: i64,
    /// Pixel step used by the rasterizer (1 = full quality).
    pub downsampling_factor: i32,
}

impl CanvasView {
    pub fn new(width: i32, height: i32) -> Self {
        Self {
            screen_size: v2i(width, height),
            screen_center: v2i(width / 2, height / 2),
            pan_vector: v2l(0, 0),
            scale: DEFAULT_SCALE,
            downsampling_factor: 1,
        }
    }

    pub fn with_scale(mut self, scale: i64) -> Self {
        assert!(scale >= MIN_SCALE, "view scale must be at least 1");
        self.scale = scale;
        self
    }

    /// `raster = (canvas + pan) / scale + center`, truncating.
    pub fn canvas_to_raster(&self, p: V2l) -> V2i {
        let x = (p.x + self.pan_vector.x) / self.scale + self.screen_center.x as i64;
        let y = (p.y + self.pan_vector.y) / self.scale + self.screen_center.y as i64;
        v2i(saturate_i32(x), saturate_i32(y))
    }

    /// `canvas = (raster - center) * scale - pan`.
    pub fn raster_to_canvas(&self, p: V2i) -> V2l {
        v2l(
            (p.x as i64 - self.screen_center.x as i64) * self.scale - self.pan_vector.x,
            (p.y as i64 - self.screen_center.y as i64) * self.scale - self.pan_vector.y,
        )
    }

    /// Canvas rect covered by a raster rect (exclusive corners map to
    /// exclusive corners).
    pub fn raster_rect_to_canvas(&self, r: &Rect) -> Rect {
        let tl = self.raster_to_canvas(v2i(r.left as i32, r.top as i32));
        let br = self.raster_to_canvas(v2i(r.right as i32, r.bottom as i32));
        Rect::from_corners(tl, br)
    }

    /// Raster rect covering a canvas rect, padded by one pixel on each side
    /// to absorb truncation.
    pub fn canvas_rect_to_raster(&self, r: &Rect) -> Rect {
        let tl = self.canvas_to_raster(r.top_left());
        let br = self.canvas_to_raster(r.bot_right());
        Rect::new(tl.x as i64, tl.y as i64, br.x as i64 + 1, br.y as i64 + 1).enlarge(1)
    }

    pub fn screen_rect(&self) -> Rect {
        Rect::new(0, 0, self.screen_size.x as i64, self.screen_size.y as i64)
    }

    /// Move the canvas content by `delta` pixels.
    pub fn pan_by_pixels(&mut self, delta: V2i) {
        self.pan_vector = self.pan_vector + delta.to_v2l() * self.scale;
    }

    /// Change the scale while keeping the canvas point under `anchor` fixed.
    pub fn set_scale_at(&mut self, new_scale: i64, anchor: V2i) {
        let new_scale = new_scale.clamp(MIN_SCALE, MAX_SCALE);
        let fixed = self.raster_to_canvas(anchor);
        self.scale = new_scale;
        self.pan_vector = v2l(
            (anchor.x as i64 - self.screen_center.x as i64) * new_scale - fixed.x,
            (anchor.y as i64 - self.screen_center.y as i64) * new_scale - fixed.y,
        );
    }

    pub fn zoom_in(&mut self, anchor: V2i) {
        let next = (self.scale * 4 / 5).min(self.scale - 1);
        self.set_scale_at(next, anchor);
    }

    pub fn zoom_out(&mut self, anchor: V2i) {
        let next = (self.scale * 5 / 4).max(self.scale + 1);
        self.set_scale_at(next, anchor);
    }

    /// New window size; the canvas point at the old center stays centered.
    pub fn resize(&mut self, width: i32, height: i32) {
        self.screen_size = v2i(width, height);
        self.screen_center = v2i(width / 2, height / 2);
    }
}

fn saturate_i32(v: i64) -> i32 {
    v.clamp(i32::MIN as i64, i32::MAX as i64) as i32
}

// ============================================================================
// BRUSH / STROKE
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Brush {
    /// Canvas units.  Negative only as the containment sentinel.
    pub radius: i64,
    /// Premultiplied; already includes `alpha`.
    pub color: Rgba,
    pub alpha: f32,
    pub eraser: bool,
}

impl Brush {
    pub fn new(radius: i64, rgb: [u8; 3], alpha: f32) -> Self {
        let f = |v: u8| v as f32 / 255.0;
        Self {
            radius,
            color: Rgba::from_straight(f(rgb[0]), f(rgb[1]), f(rgb[2]), alpha),
            alpha,
            eraser: false,
        }
    }

    pub fn eraser(radius: i64) -> Self {
        Self { radius, color: Rgba::WHITE, alpha: 1.0, eraser: true }
    }
}

impl Default for Brush {
    fn default() -> Self {
        Brush::new(10, [0, 0, 0], 1.0)
    }
}

/// A polyline with one pressure value per point.
#[derive(Clone, Debug, PartialEq)]
pub struct Stroke {
    pub id: StrokeId,
    pub layer_id: LayerId,
    pub brush: Brush,
    points: Vec<V2l>,
    pressures: Vec<f32>,
    bounding_rect: Rect,
}

impl Stroke {
    pub fn new(brush: Brush) -> Self {
        Self {
            id: 0,
            layer_id: 0,
            brush,
            points: Vec::new(),
            pressures: Vec::new(),
            bounding_rect: Rect::INVALID,
        }
    }

    /// Build a stroke from stored arrays.  Returns `None` when the arrays are
    /// empty, too long, or not parallel.
    pub fn from_parts(brush: Brush, points: Vec<V2l>, pressures: Vec<f32>) -> Option<Self> {
        if points.is_empty() || points.len() > STROKE_MAX_POINTS || points.len() != pressures.len() {
            return None;
        }
        let mut stroke = Stroke { points, pressures, ..Stroke::new(brush) };
        stroke.bounding_rect = stroke.bounding_box_for_stroke();
        Some(stroke)
    }

    pub fn points(&self) -> &[V2l] {
        &self.points
    }

    pub fn pressures(&self) -> &[f32] {
        &self.pressures
    }

    pub fn num_points(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.points.len() >= STROKE_MAX_POINTS
    }

    /// Cached bounding rect (brush radius included).
    pub fn bounding_rect(&self) -> Rect {
        self.bounding_rect
    }

    /// Append a point.  Returns `false` when the stroke is already full.
    pub fn push_point(&mut self, p: V2l, pressure: f32) -> bool {
        if self.is_full() {
            return false;
        }
        self.points.push(p);
        self.pressures.push(pressure);
        self.bounding_rect = self.bounding_rect.union(&self.point_box(p));
        true
    }

    /// Replace the most recent point (used when a new sample swallows it).
    pub fn replace_last(&mut self, p: V2l, pressure: f32) {
        if let (Some(lp), Some(lpr)) = (self.points.last_mut(), self.pressures.last_mut()) {
            *lp = p;
            *lpr = pressure;
            self.bounding_rect = self.bounding_box_for_stroke();
        }
    }

    pub fn clear(&mut self) {
        self.points.clear();
        self.pressures.clear();
        self.bounding_rect = Rect::INVALID;
    }

    fn point_box(&self, p: V2l) -> Rect {
        Rect::from_corners(p, p).enlarge(self.brush.radius.max(0))
    }

    /// Axis-aligned box over every point, enlarged by the brush radius so the
    /// rasterized footprint is always inside.
    pub fn bounding_box_for_stroke(&self) -> Rect {
        bounding_rect_for_points(&self.points).enlarge(self.brush.radius.max(0))
    }

    /// Same as [`Self::bounding_box_for_stroke`] over the newest `n` points.
    pub fn bounding_box_for_last_n_points(&self, n: usize) -> Rect {
        let start = self.points.len().saturating_sub(n);
        let rect = bounding_rect_for_points(&self.points[start..]);
        if rect.is_valid() { rect.enlarge(self.brush.radius.max(0)) } else { rect }
    }
}

// ============================================================================
// CANVAS STATE
// ============================================================================

/// The document: layers with their strokes, the working stroke and history.
pub struct CanvasState {
    pub layers: LayerStack,
    pub history: HistoryManager,
    /// In-progress stroke; rendered on top of the working layer.
    pub working_stroke: Stroke,
    stroke_id_counter: StrokeId,
}

impl Default for CanvasState {
    fn default() -> Self {
        Self::new()
    }
}

impl CanvasState {
    pub fn new() -> Self {
        Self {
            layers: LayerStack::new(),
            history: HistoryManager::new(),
            working_stroke: Stroke::new(Brush::default()),
            stroke_id_counter: 0,
        }
    }

    /// Rebuild a canvas from loaded layers.  History starts empty and is
    /// regenerated by [`Self::validate`].
    pub fn from_layers(layers: LayerStack) -> Self {
        let next_id = layers
            .iter()
            .flat_map(|l| l.strokes().iter().map(|s| s.id + 1))
            .max()
            .unwrap_or(0);
        let mut state = Self { layers, stroke_id_counter: next_id, ..Self::new() };
        state.validate();
        state
    }

    pub fn next_stroke_id(&self) -> StrokeId {
        self.stroke_id_counter
    }

    pub fn stroke_count(&self) -> usize {
        self.layers.iter().map(|l| l.strokes().len()).sum()
    }

    /// Commit `stroke` to the working layer.  Returns a reference usable for
    /// an incremental redraw, or `None` when the layer refuses paint (locked
    /// or hidden) or the stroke is empty.
    pub fn commit_stroke(&mut self, mut stroke: Stroke) -> Option<StrokeRef> {
        if stroke.is_empty() {
            return None;
        }
        let layer_id = self.layers.working_layer_id();
        {
            let layer = self.layers.working();
            if layer.locked || !layer.visible {
                return None;
            }
        }
        stroke.id = self.stroke_id_counter;
        self.stroke_id_counter += 1;
        stroke.layer_id = layer_id;
        let r = self.layers.layer_push_stroke(layer_id, stroke)?;
        self.history.record(layer_id);
        Some(r)
    }

    /// Undo the newest stroke.  Returns the canvas rect that needs redrawing.
    pub fn undo(&mut self) -> Option<Rect> {
        self.history.undo(&mut self.layers)
    }

    pub fn redo(&mut self) -> Option<Rect> {
        self.history.redo(&mut self.layers)
    }

    /// Check the history/stroke invariant and rebuild history when broken.
    /// Returns `true` when a repair happened.
    pub fn validate(&mut self) -> bool {
        if self.history.is_consistent(&self.layers) {
            return false;
        }
        crate::log_warn!(
            "history out of sync with {} strokes; rebuilding",
            self.stroke_count()
        );
        self.history.rebuild_from_layers(&self.layers);
        true
    }

    pub fn get_stroke(&self, r: StrokeRef) -> Option<&Stroke> {
        self.layers.get_by_id(r.layer_id)?.strokes().get(r.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raster_canvas_round_trip() {
        let mut view = CanvasView::new(800, 600).with_scale(1);
        view.pan_vector = v2l(-37, 12);
        for x in (-300..300).step_by(7) {
            for y in (-200..200).step_by(11) {
                let p = v2l(x, y);
                assert_eq!(view.raster_to_canvas(view.canvas_to_raster(p)), p);
                let r = v2i(x as i32, y as i32);
                assert_eq!(view.canvas_to_raster(view.raster_to_canvas(r)), r);
            }
        }
    }

    #[test]
    fn raster_round_trip_is_exact_at_any_scale() {
        let mut view = CanvasView::new(1024, 768).with_scale(1000);
        view.pan_vector = v2l(123_456, -98_765);
        for x in (0..1024).step_by(37) {
            let r = v2i(x, x / 2);
            assert_eq!(view.canvas_to_raster(view.raster_to_canvas(r)), r);
        }
    }

    #[test]
    fn zoom_keeps_anchor_fixed() {
        let mut view = CanvasView::new(640, 480);
        let anchor = v2i(100, 50);
        let before = view.raster_to_canvas(anchor);
        view.zoom_out(anchor);
        assert_eq!(view.raster_to_canvas(anchor), before);
        view.zoom_in(anchor);
        view.zoom_in(anchor);
        assert_eq!(view.raster_to_canvas(anchor), before);
        assert!(view.scale >= MIN_SCALE);
    }

    #[test]
    fn zoom_in_never_goes_below_one() {
        let mut view = CanvasView::new(100, 100).with_scale(2);
        for _ in 0..5 {
            view.zoom_in(v2i(10, 10));
        }
        assert_eq!(view.scale, 1);
    }

    #[test]
    fn pan_shifts_raster_positions_exactly() {
        let mut view = CanvasView::new(200, 200).with_scale(7);
        let p = v2l(70, -140);
        let before = view.canvas_to_raster(p);
        view.pan_by_pixels(v2i(5, 3));
        assert_eq!(view.canvas_to_raster(p), before + v2i(5, 3));
    }

    #[test]
    fn bounding_boxes_include_radius() {
        let mut s = Stroke::new(Brush::new(5, [0, 0, 0], 1.0));
        s.push_point(v2l(0, 0), 1.0);
        s.push_point(v2l(100, 10), 1.0);
        s.push_point(v2l(200, -40), 1.0);
        assert_eq!(s.bounding_rect(), Rect::new(-5, -45, 205, 15));
        assert_eq!(s.bounding_box_for_stroke(), s.bounding_rect());
        assert_eq!(s.bounding_box_for_last_n_points(2), Rect::new(95, -45, 205, 15));
    }

    #[test]
    fn stroke_rejects_points_past_capacity() {
        let mut s = Stroke::new(Brush::default());
        for i in 0..STROKE_MAX_POINTS {
            assert!(s.push_point(v2l(i as i64, 0), 1.0));
        }
        assert!(!s.push_point(v2l(0, 0), 1.0));
        assert!(Stroke::from_parts(Brush::default(), vec![], vec![]).is_none());
        assert!(Stroke::from_parts(Brush::default(), vec![v2l(0, 0)], vec![]).is_none());
    }

    #[test]
    fn commit_refuses_locked_layer() {
        let mut canvas = CanvasState::new();
        let mut s = Stroke::new(Brush::default());
        s.push_point(v2l(0, 0), 1.0);
        let id = canvas.layers.working_layer_id();
        canvas.layers.set_locked(id, true);
        assert!(canvas.commit_stroke(s.clone()).is_none());
        canvas.layers.set_locked(id, false);
        let r = canvas.commit_stroke(s).unwrap();
        assert_eq!(canvas.get_stroke(r).unwrap().id, 0);
        assert_eq!(canvas.next_stroke_id(), 1);
    }
}
