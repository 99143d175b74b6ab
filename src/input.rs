//! One frame's worth of normalized input, as delivered by the windowing layer.

use crate::canvas::NO_PRESSURE_INFO;
use crate::geometry::{V2i, v2i};

/// Event bits carried by an [`InputFrame`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InputFlags(u32);

impl InputFlags {
    pub const NONE: InputFlags = InputFlags(0);
    pub const BEGIN_STROKE: InputFlags = InputFlags(1 << 0);
    pub const END_STROKE: InputFlags = InputFlags(1 << 1);
    pub const UNDO: InputFlags = InputFlags(1 << 2);
    pub const REDO: InputFlags = InputFlags(1 << 3);
    pub const PAN: InputFlags = InputFlags(1 << 4);
    pub const ZOOM: InputFlags = InputFlags(1 << 5);
    pub const CHANGE_MODE: InputFlags = InputFlags(1 << 6);
    pub const FULL_REFRESH: InputFlags = InputFlags(1 << 7);

    pub fn contains(self, other: InputFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: InputFlags) {
        self.0 |= other.0;
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for InputFlags {
    type Output = InputFlags;
    fn bitor(self, o: InputFlags) -> InputFlags {
        InputFlags(self.0 | o.0)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BrushMode {
    #[default]
    Pen,
    Eraser,
}

#[derive(Clone, Debug, Default)]
pub struct InputFrame {
    pub flags: InputFlags,
    /// Pointer samples in raster space, oldest first.
    pub points: Vec<V2i>,
    /// One per point; [`NO_PRESSURE_INFO`] for devices without pressure.
    pub pressures: Vec<f32>,
    /// Pixels to move the canvas content by.
    pub pan_delta: V2i,
    pub zoom_anchor: V2i,
    /// Positive zooms in, negative zooms out, one step each.
    pub zoom_steps: i32,
    pub mode: BrushMode,
}

impl InputFrame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_flags(mut self, flags: InputFlags) -> Self {
        self.flags.insert(flags);
        self
    }

    /// Append a sample.  Mouse-style devices pass [`NO_PRESSURE_INFO`].
    pub fn point(mut self, x: i32, y: i32, pressure: f32) -> Self {
        self.points.push(v2i(x, y));
        self.pressures.push(pressure);
        self
    }

    pub fn pan(mut self, dx: i32, dy: i32) -> Self {
        self.flags.insert(InputFlags::PAN);
        self.pan_delta = self.pan_delta + v2i(dx, dy);
        self
    }

    pub fn zoom(mut self, anchor: V2i, steps: i32) -> Self {
        self.flags.insert(InputFlags::ZOOM);
        self.zoom_anchor = anchor;
        self.zoom_steps += steps;
        self
    }

    pub fn mode(mut self, mode: BrushMode) -> Self {
        self.flags.insert(InputFlags::CHANGE_MODE);
        self.mode = mode;
        self
    }
}

/// Map a device pressure to `[0, 1]`; devices without pressure draw at full
/// width.
pub fn normalize_pressure(p: f32) -> f32 {
    if p == NO_PRESSURE_INFO || !p.is_finite() { 1.0 } else { p.clamp(0.0, 1.0) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_combine() {
        let f = InputFlags::UNDO | InputFlags::PAN;
        assert!(f.contains(InputFlags::UNDO));
        assert!(!f.contains(InputFlags::REDO));
        assert!(InputFlags::NONE.is_empty());
        let frame = InputFrame::new().pan(3, 4).pan(1, 0);
        assert!(frame.flags.contains(InputFlags::PAN));
        assert_eq!(frame.pan_delta, v2i(4, 4));
    }

    #[test]
    fn pressure_normalization() {
        assert_eq!(normalize_pressure(NO_PRESSURE_INFO), 1.0);
        assert_eq!(normalize_pressure(1.7), 1.0);
        assert_eq!(normalize_pressure(0.3), 0.3);
        assert_eq!(normalize_pressure(f32::NAN), 1.0);
    }
}
