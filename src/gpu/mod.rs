// ============================================================================
// GPU MODULE: data handed to an external GPU presenter
// ============================================================================
//
// No device code lives here.  A presenter uploads:
//   vertex_cache.rs: per-stroke quads keyed by stroke id
//   the framebuffer's dirty region, widened by `align_upload_rect`
// ============================================================================

pub mod vertex_cache;

pub use vertex_cache::{StrokeGpuData, StrokeVertex, VertexCache};

use crate::geometry::Rect;

/// Texture uploads want `bytes_per_row` to be a multiple of 256.
pub const COPY_BYTES_PER_ROW_ALIGNMENT: i64 = 256;

/// Widen a dirty rect so `width * 4` is a multiple of 256 bytes, clamped to
/// a `width × height` texture.  Returns an invalid rect when nothing is left.
pub fn align_upload_rect(rect: &Rect, width: i64, height: i64) -> Rect {
    const PIXEL_ALIGNMENT: i64 = COPY_BYTES_PER_ROW_ALIGNMENT / 4;

    let r = rect.intersect(&Rect::new(0, 0, width, height));
    if !r.is_valid() || r.is_empty() {
        return Rect::INVALID;
    }
    let aligned_w = (r.width() + PIXEL_ALIGNMENT - 1) / PIXEL_ALIGNMENT * PIXEL_ALIGNMENT;
    let right = (r.left + aligned_w).min(width);
    Rect::new(r.left, r.top, right, r.bottom)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_rect_widens_to_row_alignment() {
        assert_eq!(align_upload_rect(&Rect::new(10, 5, 20, 9), 1000, 100), Rect::new(10, 5, 74, 9));
        assert_eq!(align_upload_rect(&Rect::new(990, 0, 1000, 4), 1000, 100), Rect::new(990, 0, 1000, 4));
        assert!(!align_upload_rect(&Rect::new(2000, 0, 2010, 4), 1000, 100).is_valid());
    }
}
