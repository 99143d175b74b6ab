//! Premultiplied RGBA in `f32` and packing to 8-bit pixels.

use serde::{Deserialize, Serialize};

/// Premultiplied linear RGBA.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Rgba {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Rgba {
    pub const TRANSPARENT: Rgba = Rgba { r: 0.0, g: 0.0, b: 0.0, a: 0.0 };
    pub const WHITE: Rgba = Rgba { r: 1.0, g: 1.0, b: 1.0, a: 1.0 };

    /// Build from straight (non-premultiplied) components.
    pub fn from_straight(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r: r * a, g: g * a, b: b * a, a }
    }

    pub fn from_rgba8(c: [u8; 4]) -> Self {
        let f = |v: u8| v as f32 / 255.0;
        Self::from_straight(f(c[0]), f(c[1]), f(c[2]), f(c[3]))
    }

    pub fn scale(self, k: f32) -> Self {
        Self { r: self.r * k, g: self.g * k, b: self.b * k, a: self.a * k }
    }

    /// `self` over `dst`, both premultiplied.
    pub fn over(self, dst: Rgba) -> Rgba {
        let inv = 1.0 - self.a;
        Rgba {
            r: self.r + dst.r * inv,
            g: self.g + dst.g * inv,
            b: self.b + dst.b * inv,
            a: self.a + dst.a * inv,
        }
    }

    /// Pack to a little-endian `0xAABBGGRR` word (bytes R, G, B, A in memory).
    pub fn to_packed(self) -> u32 {
        let q = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        u32::from_le_bytes([q(self.r), q(self.g), q(self.b), q(self.a)])
    }
}

pub fn unpack(pixel: u32) -> [u8; 4] {
    pixel.to_le_bytes()
}

pub fn pack(c: [u8; 4]) -> u32 {
    u32::from_le_bytes(c)
}

/// Sentinel fill for blocks outside the addressable canvas.
pub const OUT_OF_CANVAS_COLOR: u32 = 0xFFFF_00FF;
