//! CPU-side screen buffer the rasterizer writes into.

use image::RgbaImage;

use crate::geometry::{Rect, V2i};

/// Packed RGBA8 pixels (`0xAABBGGRR`, little-endian bytes R, G, B, A),
/// row-major, `width * height` long.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Framebuffer {
    width: i32,
    height: i32,
    pixels: Vec<u32>,
}

impl Framebuffer {
    pub fn new(width: i32, height: i32, fill: u32) -> Self {
        assert!(width >= 0 && height >= 0, "negative framebuffer size");
        Self { width, height, pixels: vec![fill; width as usize * height as usize] }
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn rect(&self) -> Rect {
        Rect::new(0, 0, self.width as i64, self.height as i64)
    }

    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    /// Raw bytes, ready for a texture upload.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.pixels)
    }

    pub fn pixel(&self, x: i32, y: i32) -> u32 {
        self.pixels[(y * self.width + x) as usize]
    }

    /// Reallocate for a new window size.  Contents are discarded.
    pub fn resize(&mut self, width: i32, height: i32, fill: u32) {
        *self = Framebuffer::new(width, height, fill);
    }

    /// Copy a rendered block (row-major, `rect`-sized) into place.
    pub fn blit(&mut self, rect: &Rect, src: &[u32]) {
        assert!(
            rect.is_valid() && self.rect().intersect(rect) == *rect,
            "blit rect outside the framebuffer"
        );
        let w = rect.width() as usize;
        for (row, line) in src.chunks_exact(w).enumerate() {
            let start = (rect.top as usize + row) * self.width as usize + rect.left as usize;
            self.pixels[start..start + w].copy_from_slice(line);
        }
    }

    /// Copy of the pixels under `rect`, row-major.  Used to upload dirty
    /// regions instead of the whole screen.
    pub fn pixels_for_rect(&self, rect: &Rect) -> Vec<u32> {
        let rect = self.rect().intersect(rect);
        if !rect.is_valid() || rect.is_empty() {
            return Vec::new();
        }
        let w = rect.width() as usize;
        let mut out = Vec::with_capacity(w * rect.height() as usize);
        for y in rect.top..rect.bottom {
            let start = y as usize * self.width as usize + rect.left as usize;
            out.extend_from_slice(&self.pixels[start..start + w]);
        }
        out
    }

    /// Move the contents by `delta` pixels and return the strips the move
    /// exposed, which hold stale pixels until they are re-rendered.
    pub fn scroll(&mut self, delta: V2i) -> Vec<Rect> {
        let (w, h) = (self.width as i64, self.height as i64);
        let (dx, dy) = (delta.x as i64, delta.y as i64);
        if dx.abs() >= w || dy.abs() >= h {
            return vec![self.rect()];
        }
        if dx == 0 && dy == 0 {
            return Vec::new();
        }

        let row_len = (w - dx.abs()) as usize;
        let (src_x, dst_x) = if dx >= 0 { (0, dx as usize) } else { ((-dx) as usize, 0) };
        let stride = w as usize;
        let mut copy_row = |src_y: i64, dst_y: i64| {
            let src = src_y as usize * stride + src_x;
            let dst = dst_y as usize * stride + dst_x;
            self.pixels.copy_within(src..src + row_len, dst);
        };
        // Walk rows against the direction of motion so sources are read
        // before they are overwritten.
        if dy > 0 {
            for y in (dy..h).rev() {
                copy_row(y - dy, y);
            }
        } else {
            for y in 0..h + dy {
                copy_row(y - dy, y);
            }
        }

        let mut exposed = Vec::new();
        if dy > 0 {
            exposed.push(Rect::new(0, 0, w, dy));
        } else if dy < 0 {
            exposed.push(Rect::new(0, h + dy, w, h));
        }
        let (top, bottom) = (dy.max(0), h + dy.min(0));
        if dx > 0 {
            exposed.push(Rect::new(0, top, dx, bottom));
        } else if dx < 0 {
            exposed.push(Rect::new(w + dx, top, w, bottom));
        }
        exposed
    }

    /// Convert to an `image` buffer for PNG export.
    pub fn to_rgba_image(&self) -> RgbaImage {
        let bytes = self.as_bytes().to_vec();
        RgbaImage::from_raw(self.width as u32, self.height as u32, bytes)
            .unwrap_or_else(|| RgbaImage::new(self.width as u32, self.height as u32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::v2i;

    fn numbered(w: i32, h: i32) -> Framebuffer {
        let mut fb = Framebuffer::new(w, h, 0);
        let src: Vec<u32> = (0..(w * h) as u32).collect();
        let all = fb.rect();
        fb.blit(&all, &src);
        fb
    }

    #[test]
    fn scroll_moves_interior_and_reports_strips() {
        let mut fb = numbered(6, 5);
        let before = fb.clone();
        let exposed = fb.scroll(v2i(2, -1));
        for y in 0..4 {
            for x in 2..6 {
                assert_eq!(fb.pixel(x, y), before.pixel(x - 2, y + 1));
            }
        }
        assert_eq!(exposed, vec![Rect::new(0, 4, 6, 5), Rect::new(0, 0, 2, 4)]);
        let covered: i64 = exposed.iter().map(|r| r.area()).sum();
        assert_eq!(covered, 6 * 5 - 4 * 4);
    }

    #[test]
    fn scroll_past_screen_exposes_everything() {
        let mut fb = numbered(4, 4);
        assert_eq!(fb.scroll(v2i(0, 4)), vec![fb.rect()]);
    }

    #[test]
    fn pixels_for_rect_clips_to_screen() {
        let fb = numbered(4, 3);
        assert_eq!(fb.pixels_for_rect(&Rect::new(2, 1, 10, 10)), vec![6, 7, 10, 11]);
        assert!(fb.pixels_for_rect(&Rect::new(8, 8, 9, 9)).is_empty());
    }

    #[test]
    fn image_export_keeps_byte_order() {
        let mut fb = Framebuffer::new(1, 1, 0);
        fb.blit(&Rect::new(0, 0, 1, 1), &[u32::from_le_bytes([10, 20, 30, 255])]);
        assert_eq!(fb.to_rgba_image().get_pixel(0, 0).0, [10, 20, 30, 255]);
    }
}
