use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::canvas::{
    Brush, CANVAS_RADIUS_LIMIT, CanvasState, CanvasView, MAX_BRUSH_RADIUS, MAX_SCALE, MIN_SCALE, STROKE_MAX_POINTS, Stroke,
    StrokeId,
};
use crate::components::layers::{Layer, LayerId, LayerStack};
use crate::geometry::V2l;

// ============================================================================
// INK FILE FORMAT
// ============================================================================
//
// bincode (fixed-width little-endian integers).  The file opens with the raw
// 4-byte magic and a u32 version, so the header can be checked before the
// body is decoded.  Everything is stored in canvas units.

pub const INK_MAGIC: [u8; 4] = *b"INK1";
pub const INK_VERSION: u32 = 1;

/// Maximum number of layers in an ink file.
/// Prevents memory exhaustion from crafted files.
const MAX_LAYERS: usize = 4096;

/// Serializable document snapshot.
#[derive(Serialize, Deserialize)]
pub struct InkFile {
    magic: [u8; 4],
    version: u32,
    view: CanvasView,
    brush: Brush,
    eraser: Brush,
    working_layer: LayerId,
    layers: Vec<LayerRecord>,
}

#[derive(Serialize, Deserialize)]
struct LayerRecord {
    id: LayerId,
    name: String,
    visible: bool,
    locked: bool,
    alpha: f32,
    strokes: Vec<StrokeRecord>,
}

/// One stroke as stored.  `num_points` is checked against both arrays on
/// load; a record that disagrees is dropped.
#[derive(Serialize, Deserialize)]
struct StrokeRecord {
    id: StrokeId,
    brush: Brush,
    num_points: i32,
    points: Vec<V2l>,
    pressures: Vec<f32>,
}

/// Error type for ink file operations
#[derive(Debug)]
pub enum InkFileError {
    Io(std::io::Error),
    Serialize(String),
    InvalidFormat(String),
}

impl std::fmt::Display for InkFileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InkFileError::Io(e) => write!(f, "I/O error: {}", e),
            InkFileError::Serialize(e) => write!(f, "Serialization error: {}", e),
            InkFileError::InvalidFormat(e) => write!(f, "Invalid format: {}", e),
        }
    }
}

impl std::error::Error for InkFileError {}

impl From<std::io::Error> for InkFileError {
    fn from(e: std::io::Error) -> Self {
        InkFileError::Io(e)
    }
}

impl From<Box<bincode::ErrorKind>> for InkFileError {
    fn from(e: Box<bincode::ErrorKind>) -> Self {
        InkFileError::Serialize(e.to_string())
    }
}

/// A document read back from disk.
pub struct LoadedInk {
    pub canvas: CanvasState,
    pub view: CanvasView,
    pub brush: Brush,
    pub eraser: Brush,
    /// Stroke records that were dropped as corrupt.
    pub skipped_strokes: usize,
}

/// Build the serializable snapshot.  Copies the committed strokes, so it is
/// safe to call on the drawing thread and hand the result to a writer.
pub fn build_ink(canvas: &CanvasState, view: &CanvasView, brush: &Brush, eraser: &Brush) -> InkFile {
    let layers = canvas
        .layers
        .iter()
        .map(|layer| LayerRecord {
            id: layer.id,
            name: layer.name.clone(),
            visible: layer.visible,
            locked: layer.locked,
            alpha: layer.alpha,
            strokes: layer
                .strokes()
                .iter()
                .map(|s| StrokeRecord {
                    id: s.id,
                    brush: s.brush,
                    num_points: s.num_points() as i32,
                    points: s.points().to_vec(),
                    pressures: s.pressures().to_vec(),
                })
                .collect(),
        })
        .collect();

    InkFile {
        magic: INK_MAGIC,
        version: INK_VERSION,
        view: *view,
        brush: *brush,
        eraser: *eraser,
        working_layer: canvas.layers.working_layer_id(),
        layers,
    }
}

/// Serialize + write a pre-built snapshot.  Writes to a sibling temp file
/// and renames it over `path`, so a crash mid-write leaves the old file.
/// Safe to call on a background thread.
pub fn write_ink(file: &InkFile, path: &Path) -> Result<(), InkFileError> {
    let tmp = path.with_extension("ink.tmp");
    {
        let writer = BufWriter::new(File::create(&tmp)?);
        bincode::serialize_into(writer, file)?;
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Save synchronously.
pub fn save_ink(
    canvas: &CanvasState,
    view: &CanvasView,
    brush: &Brush,
    eraser: &Brush,
    path: &Path,
) -> Result<(), InkFileError> {
    write_ink(&build_ink(canvas, view, brush, eraser), path)
}

/// Load an ink file.  Corrupt stroke records are skipped with a warning;
/// history is regenerated from the surviving strokes.
pub fn load_ink(path: &Path) -> Result<LoadedInk, InkFileError> {
    let raw = std::fs::read(path)?;
    if raw.len() < 8 {
        return Err(InkFileError::InvalidFormat("File too small".into()));
    }
    if raw[0..4] != INK_MAGIC {
        return Err(InkFileError::InvalidFormat(format!(
            "Unknown magic '{}'",
            String::from_utf8_lossy(&raw[0..4])
        )));
    }
    let version = u32::from_le_bytes([raw[4], raw[5], raw[6], raw[7]]);
    if version != INK_VERSION {
        return Err(InkFileError::InvalidFormat(format!("Unsupported version {}", version)));
    }

    let file: InkFile = bincode::deserialize(&raw)?;
    if file.layers.is_empty() {
        return Err(InkFileError::InvalidFormat("File contains no layers".into()));
    }
    if file.layers.len() > MAX_LAYERS {
        return Err(InkFileError::InvalidFormat(format!(
            "File contains {} layers, which exceeds the maximum of {}",
            file.layers.len(),
            MAX_LAYERS
        )));
    }

    let mut skipped = 0;
    let mut layers = Vec::with_capacity(file.layers.len());
    for record in file.layers {
        let mut layer = Layer::new(record.id, record.name);
        layer.visible = record.visible;
        layer.locked = record.locked;
        layer.alpha = record.alpha.clamp(0.0, 1.0);
        for (i, sr) in record.strokes.into_iter().enumerate() {
            match stroke_from_record(sr, record.id) {
                Some(stroke) => {
                    layer.push_stroke(stroke);
                }
                None => {
                    skipped += 1;
                    crate::log_warn!("skipping corrupt stroke #{} in layer '{}'", i, layer.name);
                }
            }
        }
        layers.push(layer);
    }

    let mut view = file.view;
    view.scale = view.scale.clamp(MIN_SCALE, MAX_SCALE);
    view.pan_vector.x = view.pan_vector.x.clamp(-CANVAS_RADIUS_LIMIT, CANVAS_RADIUS_LIMIT);
    view.pan_vector.y = view.pan_vector.y.clamp(-CANVAS_RADIUS_LIMIT, CANVAS_RADIUS_LIMIT);
    view.downsampling_factor = 1;

    if skipped > 0 {
        crate::log_warn!("{}: skipped {} corrupt stroke record(s)", path.display(), skipped);
    }
    Ok(LoadedInk {
        canvas: CanvasState::from_layers(LayerStack::from_layers(layers, file.working_layer)),
        view,
        brush: file.brush,
        eraser: file.eraser,
        skipped_strokes: skipped,
    })
}

fn on_canvas(p: V2l) -> bool {
    let limit = -CANVAS_RADIUS_LIMIT..=CANVAS_RADIUS_LIMIT;
    limit.contains(&p.x) && limit.contains(&p.y)
}

fn stroke_from_record(sr: StrokeRecord, layer_id: LayerId) -> Option<Stroke> {
    if sr.num_points < 1 || sr.num_points as usize >= STROKE_MAX_POINTS {
        return None;
    }
    let n = sr.num_points as usize;
    if sr.points.len() != n || sr.pressures.len() != n {
        return None;
    }
    if !(0..=MAX_BRUSH_RADIUS).contains(&sr.brush.radius) {
        crate::log_warn!("stroke {} has out-of-range radius {}", sr.id, sr.brush.radius);
        return None;
    }
    if let Some(p) = sr.points.iter().find(|p| !on_canvas(**p)) {
        crate::log_warn!("stroke {} has a point outside the canvas: ({}, {})", sr.id, p.x, p.y);
        return None;
    }
    let pressures = sr.pressures.into_iter().map(|p| if p.is_finite() { p.clamp(0.0, 1.0) } else { 1.0 }).collect();
    let mut stroke = Stroke::from_parts(sr.brush, sr.points, pressures)?;
    stroke.id = sr.id;
    stroke.layer_id = layer_id;
    Some(stroke)
}

// ============================================================================
// BACKGROUND SAVE
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SaveState {
    Idle,
    /// A snapshot was handed off; the writer has not started yet.
    Saving,
    /// The writer is on disk.
    InProgress,
}

struct SaveShared {
    state: Mutex<SaveState>,
    done: Condvar,
    last_error: Mutex<Option<String>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Runs at most one save at a time on the rayon pool.  Dropping the saver
/// blocks until an in-flight save finishes.
pub struct AsyncSaver {
    shared: Arc<SaveShared>,
}

impl Default for AsyncSaver {
    fn default() -> Self {
        Self::new()
    }
}

impl AsyncSaver {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(SaveShared {
                state: Mutex::new(SaveState::Idle),
                done: Condvar::new(),
                last_error: Mutex::new(None),
            }),
        }
    }

    pub fn state(&self) -> SaveState {
        *lock(&self.shared.state)
    }

    /// Queue `file` for writing.  Returns `false` (and drops the snapshot)
    /// when a save is already in flight.
    pub fn save(&self, file: InkFile, path: PathBuf) -> bool {
        {
            let mut state = lock(&self.shared.state);
            if *state != SaveState::Idle {
                return false;
            }
            *state = SaveState::Saving;
        }
        let shared = Arc::clone(&self.shared);
        rayon::spawn(move || {
            *lock(&shared.state) = SaveState::InProgress;
            let result = write_ink(&file, &path);
            match &result {
                Ok(()) => {
                    crate::log_info!("saved {}", path.display());
                }
                Err(e) => {
                    crate::log_err!("save FAILED for {}: {}", path.display(), e);
                }
            }
            *lock(&shared.last_error) = result.err().map(|e| e.to_string());
            *lock(&shared.state) = SaveState::Idle;
            shared.done.notify_all();
        });
        true
    }

    /// Block until no save is in flight.
    pub fn wait_idle(&self) {
        let mut state = lock(&self.shared.state);
        while *state != SaveState::Idle {
            state = self.shared.done.wait(state).unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Error message of the most recent finished save, if it failed.
    pub fn take_last_error(&self) -> Option<String> {
        lock(&self.shared.last_error).take()
    }
}

impl Drop for AsyncSaver {
    fn drop(&mut self) {
        self.wait_idle();
    }
}
