//! Read-only snapshot of what a render pass draws.

use crate::canvas::{CanvasState, Stroke};
use crate::components::layers::LayerId;

/// One visible layer, strokes newest first.
pub struct SceneLayer<'a> {
    pub id: LayerId,
    pub alpha: f32,
    pub strokes: Vec<&'a Stroke>,
}

/// Visible layers top to bottom.  Each stroke gets an ordinal (its position
/// in this top-down, newest-first walk) used to index visibility masks.
pub struct Scene<'a> {
    pub layers: Vec<SceneLayer<'a>>,
    stroke_count: usize,
}

impl<'a> Scene<'a> {
    /// Snapshot `canvas`.  The working stroke, when non-empty, is drawn as the
    /// newest stroke of the working layer.
    pub fn build(canvas: &'a CanvasState) -> Self {
        let working_id = canvas.layers.working_layer_id();
        let mut layers = Vec::new();
        let mut stroke_count = 0;
        for layer in canvas.layers.iter_visible().rev() {
            let mut strokes: Vec<&'a Stroke> = Vec::with_capacity(layer.strokes().len() + 1);
            if layer.id == working_id && !layer.locked && !canvas.working_stroke.is_empty() {
                strokes.push(&canvas.working_stroke);
            }
            strokes.extend(layer.strokes().iter().rev());
            stroke_count += strokes.len();
            layers.push(SceneLayer { id: layer.id, alpha: layer.alpha, strokes });
        }
        Self { layers, stroke_count }
    }

    pub fn stroke_count(&self) -> usize {
        self.stroke_count
    }

    /// `(ordinal, stroke)` pairs in draw-walk order.
    pub fn ordered_strokes(&self) -> impl Iterator<Item = (usize, &'a Stroke)> + '_ {
        self.layers
            .iter()
            .flat_map(|l| l.strokes.iter().copied())
            .enumerate()
    }
}
