use crate::canvas::Stroke;

pub type LayerId = u32;

const MAX_RECOMMENDED_LAYERS: usize = 200;

/// Stable address of a committed stroke: the layer it lives in and its index
/// in that layer's stroke list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StrokeRef {
    pub layer_id: LayerId,
    pub index: usize,
}

/// A paint layer.  Strokes are stored oldest first.
#[derive(Clone, Debug)]
pub struct Layer {
    pub id: LayerId,
    pub name: String,
    pub visible: bool,
    pub locked: bool,
    pub alpha: f32,
    strokes: Vec<Stroke>,
}

impl Layer {
    pub fn new(id: LayerId, name: String) -> Self {
        Self {
            id,
            name,
            visible: true,
            locked: false,
            alpha: 1.0,
            strokes: Vec::new(),
        }
    }

    pub fn strokes(&self) -> &[Stroke] {
        &self.strokes
    }

    pub fn push_stroke(&mut self, stroke: Stroke) -> usize {
        self.strokes.push(stroke);
        self.strokes.len() - 1
    }

    pub fn pop_stroke(&mut self) -> Option<Stroke> {
        self.strokes.pop()
    }
}

/// Ordered layer list, bottom (root) first.
///
/// There is always at least one layer and exactly one working layer.  Ids
/// come from a counter and are never reused, even after removal.
#[derive(Clone, Debug)]
pub struct LayerStack {
    layers: Vec<Layer>,
    working_layer_id: LayerId,
    layer_id_counter: LayerId,
}

impl Default for LayerStack {
    fn default() -> Self {
        Self::new()
    }
}

impl LayerStack {
    pub fn new() -> Self {
        Self {
            layers: vec![Layer::new(0, "Layer 1".to_string())],
            working_layer_id: 0,
            layer_id_counter: 1,
        }
    }

    /// Rebuild from loaded layers.  Falls back to a fresh stack when `layers`
    /// is empty, and to the topmost layer when `working` is not present.
    pub fn from_layers(layers: Vec<Layer>, working: LayerId) -> Self {
        if layers.is_empty() {
            return Self::new();
        }
        let counter = layers.iter().map(|l| l.id).max().unwrap_or(0) + 1;
        let working_layer_id = if layers.iter().any(|l| l.id == working) {
            working
        } else {
            layers[layers.len() - 1].id
        };
        Self { layers, working_layer_id, layer_id_counter: counter }
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Bottom to top.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Layer> {
        self.layers.iter()
    }

    /// Visible layers, bottom to top.
    pub fn iter_visible(&self) -> impl DoubleEndedIterator<Item = &Layer> {
        self.layers.iter().filter(|l| l.visible)
    }

    pub fn root(&self) -> &Layer {
        &self.layers[0]
    }

    pub fn topmost(&self) -> &Layer {
        &self.layers[self.layers.len() - 1]
    }

    pub fn index_of(&self, id: LayerId) -> Option<usize> {
        self.layers.iter().position(|l| l.id == id)
    }

    pub fn get_by_id(&self, id: LayerId) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id == id)
    }

    pub fn get_by_id_mut(&mut self, id: LayerId) -> Option<&mut Layer> {
        self.layers.iter_mut().find(|l| l.id == id)
    }

    pub fn contains(&self, id: LayerId) -> bool {
        self.index_of(id).is_some()
    }

    pub fn working_layer_id(&self) -> LayerId {
        self.working_layer_id
    }

    pub fn working(&self) -> &Layer {
        match self.get_by_id(self.working_layer_id) {
            Some(l) => l,
            None => self.topmost(),
        }
    }

    pub fn set_working(&mut self, id: LayerId) -> bool {
        if self.contains(id) {
            self.working_layer_id = id;
            true
        } else {
            false
        }
    }

    /// Add a layer on top and make it the working layer.
    pub fn new_layer(&mut self, name: Option<String>) -> LayerId {
        let id = self.layer_id_counter;
        self.layer_id_counter += 1;
        let name = name.unwrap_or_else(|| format!("Layer {}", id + 1));
        if self.layers.len() >= MAX_RECOMMENDED_LAYERS {
            crate::log_warn!("layer count {} exceeds the recommended maximum", self.layers.len() + 1);
        }
        self.layers.push(Layer::new(id, name));
        self.working_layer_id = id;
        id
    }

    /// Unlink a layer.  The last remaining layer cannot be removed.  When the
    /// working layer goes away the layer below it (or the new bottom) takes
    /// over.
    pub fn remove_layer(&mut self, id: LayerId) -> Option<Layer> {
        if self.layers.len() <= 1 {
            return None;
        }
        let idx = self.index_of(id)?;
        let removed = self.layers.remove(idx);
        if self.working_layer_id == id {
            self.working_layer_id = self.layers[idx.saturating_sub(1)].id;
        }
        Some(removed)
    }

    pub fn toggle_visibility(&mut self, id: LayerId) -> bool {
        match self.get_by_id_mut(id) {
            Some(l) => {
                l.visible = !l.visible;
                true
            }
            None => false,
        }
    }

    pub fn set_locked(&mut self, id: LayerId, locked: bool) -> bool {
        match self.get_by_id_mut(id) {
            Some(l) => {
                l.locked = locked;
                true
            }
            None => false,
        }
    }

    pub fn set_alpha(&mut self, id: LayerId, alpha: f32) -> bool {
        match self.get_by_id_mut(id) {
            Some(l) => {
                l.alpha = alpha.clamp(0.0, 1.0);
                true
            }
            None => false,
        }
    }

    pub fn rename(&mut self, id: LayerId, name: &str) -> bool {
        match self.get_by_id_mut(id) {
            Some(l) => {
                l.name = name.to_string();
                true
            }
            None => false,
        }
    }

    /// Swap with the layer above.  Returns `false` at the top.
    pub fn move_up(&mut self, id: LayerId) -> bool {
        match self.index_of(id) {
            Some(i) if i + 1 < self.layers.len() => {
                self.layers.swap(i, i + 1);
                true
            }
            _ => false,
        }
    }

    /// Swap with the layer below.  Returns `false` at the bottom.
    pub fn move_down(&mut self, id: LayerId) -> bool {
        match self.index_of(id) {
            Some(i) if i > 0 => {
                self.layers.swap(i, i - 1);
                true
            }
            _ => false,
        }
    }

    /// Append `stroke` to layer `id`.
    pub fn layer_push_stroke(&mut self, id: LayerId, stroke: Stroke) -> Option<StrokeRef> {
        let layer = self.get_by_id_mut(id)?;
        let index = layer.push_stroke(stroke);
        Some(StrokeRef { layer_id: id, index })
    }
}
