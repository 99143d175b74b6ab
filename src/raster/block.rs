// ============================================================================
// BLOCK RASTERIZER: distance-field brush sampling and layer compositing
// ============================================================================
//
// One block is a small screen rect painted from its clipped draw list.  The
// generic `rasterize_block` is instantiated for `f32` (scalar) and `f32x4`
// (SIMD); the two produce identical pixels.

use wide::f32x4;

use crate::arena::Arena;
use crate::canvas::{CANVAS_RADIUS_LIMIT, CanvasView};
use crate::color::{OUT_OF_CANVAS_COLOR, Rgba};
use crate::geometry::{MAX_SAMPLE_REACH, Rect, SAMPLE_COUNT, V2l, disc_coverage, v2i};
use crate::raster::clip::ClipNode;
use crate::raster::lanes::{Closest, Lanes, closest_on_segments, closest_to_point};

/// Everything a block needs besides its output buffer.
pub struct BlockJob<'a> {
    /// Screen pixels to fill.  Must be valid and non-empty.
    pub raster_rect: Rect,
    pub view: &'a CanvasView,
    /// Newest-first draw list built against `reference`.
    pub nodes: &'a [ClipNode],
    pub arena: &'a Arena<f32>,
    /// Canvas point the clipped coordinates are relative to.
    pub reference: V2l,
    pub local_scale: i64,
    pub background: Rgba,
}

/// `true` when any corner of the block's canvas rect is past the addressable
/// canvas radius.
pub fn block_outside_canvas(view: &CanvasView, raster_rect: &Rect) -> bool {
    let c = view.raster_rect_to_canvas(raster_rect);
    [c.left, c.top, c.right, c.bottom]
        .iter()
        .any(|v| v.abs() > CANVAS_RADIUS_LIMIT)
}

/// Composite the draw list at one pixel whose local position is `(px, py)`.
fn shade_pixel<L: Lanes>(job: &BlockJob<'_>, px: f32, py: f32, sample_scale: f32) -> u32 {
    let reach = MAX_SAMPLE_REACH * sample_scale;
    let mut acc = Rgba::TRANSPARENT;
    let mut layer_alpha = 1.0;
    let mut pixel_erased = false;

    for node in job.nodes {
        let clipped = match node {
            ClipNode::LayerMark { alpha } => {
                layer_alpha = *alpha;
                pixel_erased = false;
                continue;
            }
            ClipNode::Stroke(c) => c,
        };
        if pixel_erased {
            continue;
        }

        let data = job.arena.get(clipped.points);
        let radius_scale = clipped.brush.radius.saturating_mul(job.local_scale) as f32;
        let closest: Closest = if clipped.is_single_point() {
            closest_to_point(data, px, py, radius_scale)
        } else {
            closest_on_segments::<L>(data, clipped.num_segments(), px, py, radius_scale)
        };

        if closest.dist >= reach {
            continue;
        }
        let coverage = if closest.dist <= -reach {
            SAMPLE_COUNT
        } else {
            disc_coverage(closest.cx, closest.cy, closest.radius, sample_scale)
        };
        if coverage == 0 {
            continue;
        }

        if clipped.brush.eraser {
            pixel_erased = true;
            continue;
        }

        let weight = coverage as f32 / SAMPLE_COUNT as f32 * layer_alpha;
        acc = acc.over(clipped.brush.color.scale(weight));
        if acc.a >= 1.0 {
            break;
        }
    }

    acc.over(job.background).to_packed()
}

/// Paint `job.raster_rect` into `out` (row-major, rect-sized).
pub fn rasterize_block<L: Lanes>(job: &BlockJob<'_>, out: &mut [u32]) {
    let rect = job.raster_rect;
    assert!(rect.is_valid() && !rect.is_empty(), "rasterizing an invalid block rect");
    let width = rect.width() as usize;
    let height = rect.height() as usize;
    assert_eq!(out.len(), width * height, "block buffer does not match its rect");

    if block_outside_canvas(job.view, &rect) {
        out.fill(OUT_OF_CANVAS_COLOR);
        return;
    }

    let factor = job.view.downsampling_factor.max(1) as usize;
    let sample_scale = (job.view.scale * job.local_scale) as f32;

    for j in (0..height).step_by(factor) {
        for i in (0..width).step_by(factor) {
            let raster = v2i(rect.left as i32 + i as i32, rect.top as i32 + j as i32);
            let local = (job.view.raster_to_canvas(raster) - job.reference) * job.local_scale;
            let pixel = shade_pixel::<L>(job, local.x as f32, local.y as f32, sample_scale);

            for row in out.chunks_exact_mut(width).skip(j).take(factor) {
                let end = (i + factor).min(width);
                row[i..end].fill(pixel);
            }
        }
    }
}

pub fn rasterize_block_simd(job: &BlockJob<'_>, out: &mut [u32]) {
    rasterize_block::<f32x4>(job, out)
}

pub fn rasterize_block_scalar(job: &BlockJob<'_>, out: &mut [u32]) {
    rasterize_block::<f32>(job, out)
}
