use std::collections::HashMap;

use bytemuck::{Pod, Zeroable};

use crate::canvas::{CanvasState, Stroke, StrokeId};
use crate::geometry::V2l;

/// One corner of a segment's bounding quad.  The fragment stage measures
/// its distance to `point_a..point_b`, so every corner carries the whole
/// segment.  Positions are canvas units relative to the stroke origin.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct StrokeVertex {
    pub position: [f32; 2],
    pub point_a: [f32; 2],
    pub point_b: [f32; 2],
    pub pressure_a: f32,
    pub pressure_b: f32,
}

/// Upload-ready geometry for one committed stroke.
#[derive(Clone, Debug)]
pub struct StrokeGpuData {
    /// Canvas point the vertex positions are relative to.
    pub origin: V2l,
    pub radius: f32,
    /// Premultiplied RGBA.
    pub color: [f32; 4],
    pub eraser: bool,
    pub vertices: Vec<StrokeVertex>,
    pub indices: Vec<u32>,
}

impl StrokeGpuData {
    pub fn build(stroke: &Stroke) -> Self {
        let points = stroke.points();
        let pressures = stroke.pressures();
        let origin = points.first().copied().unwrap_or_default();
        let radius = stroke.brush.radius.max(0) as f32;
        let local = |p: V2l| [(p.x - origin.x) as f32, (p.y - origin.y) as f32];

        // A lone point is a zero-length segment.
        let segments: Vec<(usize, usize)> = if points.len() == 1 {
            vec![(0, 0)]
        } else {
            (0..points.len().saturating_sub(1)).map(|i| (i, i + 1)).collect()
        };

        let mut vertices = Vec::with_capacity(segments.len() * 4);
        let mut indices = Vec::with_capacity(segments.len() * 6);
        for (ia, ib) in segments {
            let (a, b) = (local(points[ia]), local(points[ib]));
            let min_x = a[0].min(b[0]) - radius;
            let max_x = a[0].max(b[0]) + radius;
            let min_y = a[1].min(b[1]) - radius;
            let max_y = a[1].max(b[1]) + radius;
            let base = vertices.len() as u32;
            for position in [[min_x, min_y], [max_x, min_y], [max_x, max_y], [min_x, max_y]] {
                vertices.push(StrokeVertex {
                    position,
                    point_a: a,
                    point_b: b,
                    pressure_a: pressures[ia],
                    pressure_b: pressures[ib],
                });
            }
            indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }

        let c = stroke.brush.color;
        Self {
            origin,
            radius,
            color: [c.r, c.g, c.b, c.a],
            eraser: stroke.brush.eraser,
            vertices,
            indices,
        }
    }

    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }
}

/// Per-stroke vertex data keyed by stroke id.  Committed strokes never
/// change, so an entry stays valid until its stroke leaves the canvas.
#[derive(Default)]
pub struct VertexCache {
    entries: HashMap<StrokeId, StrokeGpuData>,
}

impl VertexCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: StrokeId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn get_or_build(&mut self, stroke: &Stroke) -> &StrokeGpuData {
        self.entries.entry(stroke.id).or_insert_with(|| StrokeGpuData::build(stroke))
    }

    /// Drop entries for strokes that are no longer on any layer (undone or
    /// on a removed layer).
    pub fn retain_live(&mut self, canvas: &CanvasState) {
        let live: std::collections::HashSet<StrokeId> = canvas
            .layers
            .iter()
            .flat_map(|l| l.strokes().iter().map(|s| s.id))
            .collect();
        self.entries.retain(|id, _| live.contains(id));
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
