use crate::canvas::Stroke;
use crate::components::layers::{LayerId, LayerStack};
use crate::geometry::Rect;

// ============================================================================
// HISTORY: stroke-granular undo/redo
// ============================================================================

/// One committed action: "a stroke was appended to this layer".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HistoryEntry {
    pub layer_id: LayerId,
}

/// Undo log, redo stack and the graveyard of undone strokes.
///
/// Undo across a deleted layer is lossy: entries that reference a layer that
/// no longer exists are dropped rather than restored.
#[derive(Default, Debug)]
pub struct HistoryManager {
    history: Vec<HistoryEntry>,
    redo_stack: Vec<HistoryEntry>,
    stroke_graveyard: Vec<Stroke>,
}

impl HistoryManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn graveyard_len(&self) -> usize {
        self.stroke_graveyard.len()
    }

    /// Log a freshly committed stroke.  Any redo state is discarded.
    pub fn record(&mut self, layer_id: LayerId) {
        self.history.push(HistoryEntry { layer_id });
        self.redo_stack.clear();
        self.stroke_graveyard.clear();
    }

    /// Move the newest stroke of the newest still-existing layer in the log
    /// to the graveyard.  Returns the stroke's canvas bounds.
    pub fn undo(&mut self, layers: &mut LayerStack) -> Option<Rect> {
        while let Some(entry) = self.history.pop() {
            let Some(layer) = layers.get_by_id_mut(entry.layer_id) else {
                continue;
            };
            let Some(stroke) = layer.pop_stroke() else {
                continue;
            };
            let bounds = stroke.bounding_rect();
            self.stroke_graveyard.push(stroke);
            self.redo_stack.push(entry);
            return Some(bounds);
        }
        None
    }

    /// Re-append the most recently undone stroke.  Graveyard strokes that do
    /// not belong to the entry's layer are stale and get skipped.
    pub fn redo(&mut self, layers: &mut LayerStack) -> Option<Rect> {
        while let Some(entry) = self.redo_stack.pop() {
            while let Some(stroke) = self.stroke_graveyard.pop() {
                if stroke.layer_id != entry.layer_id {
                    continue;
                }
                let bounds = stroke.bounding_rect();
                if layers.layer_push_stroke(entry.layer_id, stroke).is_some() {
                    self.history.push(entry);
                    return Some(bounds);
                }
                // layer is gone: this entry cannot be replayed
                break;
            }
        }
        None
    }

    /// Entries referencing live layers must match the live stroke count.
    pub fn is_consistent(&self, layers: &LayerStack) -> bool {
        let live_entries = self.history.iter().filter(|e| layers.contains(e.layer_id)).count();
        let strokes: usize = layers.iter().map(|l| l.strokes().len()).sum();
        live_entries == strokes
    }

    /// Discard history and redo state and regenerate one entry per live
    /// stroke, in stroke-id order.
    pub fn rebuild_from_layers(&mut self, layers: &LayerStack) {
        let mut entries: Vec<(u64, LayerId)> = layers
            .iter()
            .flat_map(|l| l.strokes().iter().map(move |s| (s.id, l.id)))
            .collect();
        entries.sort_unstable();
        self.history = entries
            .into_iter()
            .map(|(_, layer_id)| HistoryEntry { layer_id })
            .collect();
        self.redo_stack.clear();
        self.stroke_graveyard.clear();
    }
}
