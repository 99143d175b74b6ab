use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::canvas::{Brush, CanvasState, CanvasView, STROKE_MAX_POINTS, Stroke};
use crate::geometry::{Rect, V2i, v2i};
use crate::gpu::{VertexCache, align_upload_rect};
use crate::input::{BrushMode, InputFlags, InputFrame, normalize_pressure};
use crate::io::{AsyncSaver, InkFileError, LoadedInk, SaveState, build_ink, load_ink};
use crate::raster::clip::stroke_point_contains_point;
use crate::raster::framebuffer::Framebuffer;
use crate::raster::orchestrator::{IterativeRender, RenderError, Renderer};
use crate::settings::RenderSettings;

/// Working strokes are committed and continued in a fresh stroke once they
/// reach this many points, so saved strokes stay below the loader's limit.
const STROKE_SPLIT_POINTS: usize = STROKE_MAX_POINTS - 1;

#[derive(Debug)]
pub enum ProjectError {
    File(InkFileError),
    Render(RenderError),
}

impl std::fmt::Display for ProjectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProjectError::File(e) => write!(f, "{}", e),
            ProjectError::Render(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for ProjectError {}

impl From<InkFileError> for ProjectError {
    fn from(e: InkFileError) -> Self {
        ProjectError::File(e)
    }
}

impl From<RenderError> for ProjectError {
    fn from(e: RenderError) -> Self {
        ProjectError::Render(e)
    }
}

/// What one input frame caused on screen.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameReport {
    /// A full (progressive) redraw was started or continued.
    pub full_redraw: bool,
    /// Pixels the old image was moved by.
    pub panned: V2i,
    /// Screen region redrawn incrementally (invalid when none).
    pub dirty: Rect,
    /// `false` while a progressive redraw still has coarser pixels on screen.
    pub complete: bool,
}

/// Single open document with its view and render state.
pub struct Project {
    pub id: Uuid,
    /// Display name (derived from path or "Untitled-X")
    pub name: String,
    /// `None` for unsaved/untitled files.
    pub path: Option<PathBuf>,
    pub is_dirty: bool,

    pub canvas: CanvasState,
    pub view: CanvasView,
    pub brush: Brush,
    pub eraser: Brush,
    pub mode: BrushMode,

    pub renderer: Renderer,
    pub framebuffer: Framebuffer,
    pub vertex_cache: VertexCache,
    saver: AsyncSaver,
    /// Set while a save started from an unedited document is in flight.
    clean_on_save: bool,
    save_error: Option<String>,
    settings: RenderSettings,
    progressive: Option<IterativeRender>,
    /// Screen region changed since the last upload.
    upload_rect: Rect,
}

impl Project {
    pub fn new_untitled(
        untitled_counter: usize,
        width: i32,
        height: i32,
        settings: &RenderSettings,
    ) -> Result<Self, RenderError> {
        let name = format!("Untitled-{}", untitled_counter);
        Self::assemble(name, None, CanvasState::new(), CanvasView::new(width, height), Brush::default(), Brush::eraser(20), settings)
    }

    pub fn open(path: &Path, width: i32, height: i32, settings: &RenderSettings) -> Result<Self, ProjectError> {
        let loaded = load_ink(path)?;
        Ok(Self::from_loaded(path.to_path_buf(), loaded, width, height, settings)?)
    }

    pub fn from_loaded(
        path: PathBuf,
        loaded: LoadedInk,
        width: i32,
        height: i32,
        settings: &RenderSettings,
    ) -> Result<Self, RenderError> {
        let name = path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "Unknown".to_string());
        let mut view = loaded.view;
        view.resize(width, height);
        let mut project = Self::assemble(name, Some(path), loaded.canvas, view, loaded.brush, loaded.eraser, settings)?;
        if loaded.skipped_strokes > 0 {
            project.mark_dirty();
        }
        Ok(project)
    }

    fn assemble(
        name: String,
        path: Option<PathBuf>,
        canvas: CanvasState,
        view: CanvasView,
        brush: Brush,
        eraser: Brush,
        settings: &RenderSettings,
    ) -> Result<Self, RenderError> {
        check_screen_size(view.screen_size.x, view.screen_size.y, settings);
        let renderer = Renderer::new(settings)?;
        let framebuffer = Framebuffer::new(view.screen_size.x, view.screen_size.y, renderer.background().to_packed());
        Ok(Self {
            id: Uuid::new_v4(),
            name,
            path,
            is_dirty: false,
            canvas,
            view,
            brush,
            eraser,
            mode: BrushMode::Pen,
            renderer,
            framebuffer,
            vertex_cache: VertexCache::new(),
            saver: AsyncSaver::new(),
            clean_on_save: false,
            save_error: None,
            settings: settings.clone(),
            progressive: Some(IterativeRender::new(view.screen_rect())),
            upload_rect: Rect::INVALID,
        })
    }

    pub fn mark_dirty(&mut self) {
        self.is_dirty = true;
        self.clean_on_save = false;
    }

    pub fn mark_clean(&mut self) {
        self.is_dirty = false;
    }

    pub fn update_name_from_path(&mut self) {
        if let Some(ref path) = self.path {
            self.name = path
                .file_name()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| "Unknown".to_string());
        }
    }

    /// Get the display title (name with dirty indicator)
    pub fn display_title(&self) -> String {
        if self.is_dirty { format!("{}*", self.name) } else { self.name.clone() }
    }

    pub fn active_brush(&self) -> Brush {
        match self.mode {
            BrushMode::Pen => self.brush,
            BrushMode::Eraser => self.eraser,
        }
    }

    /// `true` while a progressive redraw still has frames to go.
    pub fn is_refining(&self) -> bool {
        self.progressive.is_some()
    }

    // ------------------------------------------------------------------------
    // Input
    // ------------------------------------------------------------------------

    /// Apply one frame of input and bring the framebuffer up to date.
    pub fn handle_input(&mut self, input: &InputFrame) -> Result<FrameReport, RenderError> {
        let flags = input.flags;
        let mut dirty = Rect::INVALID;
        let mut full = flags.contains(InputFlags::FULL_REFRESH);
        let mut panned = v2i(0, 0);

        if flags.contains(InputFlags::CHANGE_MODE) && input.mode != self.mode {
            // a mode switch ends the gesture in progress
            dirty = dirty.union(&self.finish_stroke());
            self.mode = input.mode;
        }

        if flags.contains(InputFlags::UNDO) {
            dirty = dirty.union(&self.finish_stroke());
            if let Some(r) = self.canvas.undo() {
                dirty = dirty.union(&r);
                self.vertex_cache.retain_live(&self.canvas);
                self.mark_dirty();
            }
        }
        if flags.contains(InputFlags::REDO) {
            dirty = dirty.union(&self.finish_stroke());
            if let Some(r) = self.canvas.redo() {
                dirty = dirty.union(&r);
                self.mark_dirty();
            }
        }

        if flags.contains(InputFlags::BEGIN_STROKE) {
            dirty = dirty.union(&self.finish_stroke());
        }

        if flags.contains(InputFlags::ZOOM) && input.zoom_steps != 0 {
            for _ in 0..input.zoom_steps.unsigned_abs() {
                if input.zoom_steps > 0 {
                    self.view.zoom_in(input.zoom_anchor);
                } else {
                    self.view.zoom_out(input.zoom_anchor);
                }
            }
            full = true;
        }

        if flags.contains(InputFlags::PAN) && input.pan_delta != v2i(0, 0) {
            self.view.pan_by_pixels(input.pan_delta);
            panned = input.pan_delta;
        } else if !input.points.is_empty() {
            dirty = dirty.union(&self.extend_stroke(input));
        }

        if flags.contains(InputFlags::END_STROKE) {
            dirty = dirty.union(&self.finish_stroke());
        }

        self.present(full, panned, dirty)
    }

    /// Feed the frame's samples into the working stroke.  Returns the canvas
    /// rect the new points cover.
    fn extend_stroke(&mut self, input: &InputFrame) -> Rect {
        let mut dirty = Rect::INVALID;
        if self.canvas.working_stroke.is_empty() {
            self.canvas.working_stroke = Stroke::new(self.active_brush());
        }
        let radius = self.canvas.working_stroke.brush.radius;

        for (&raster, &raw_pressure) in input.points.iter().zip(&input.pressures) {
            let point = self.view.raster_to_canvas(raster);
            let pressure = normalize_pressure(raw_pressure);
            let r_new = (radius as f32 * pressure) as i64;

            let stroke = &mut self.canvas.working_stroke;
            let n = stroke.num_points();
            if n > 0 {
                let last = stroke.points()[n - 1];
                let r_last = (radius as f32 * stroke.pressures()[n - 1]) as i64;
                // Samples swallowed by the previous disc add nothing.
                if stroke_point_contains_point(last, r_last, point, r_new) {
                    continue;
                }
                // A new sample that swallows the previous one replaces it,
                // unless that would leave a lone point behind.
                if n > 1 && stroke_point_contains_point(point, r_new, last, r_last) {
                    dirty = dirty.union(&stroke.bounding_box_for_last_n_points(2));
                    stroke.replace_last(point, pressure);
                    dirty = dirty.union(&stroke.bounding_box_for_last_n_points(2));
                    continue;
                }
            }

            stroke.push_point(point, pressure);
            dirty = dirty.union(&stroke.bounding_box_for_last_n_points(2));

            if stroke.num_points() >= STROKE_SPLIT_POINTS {
                self.split_working_stroke();
            }
        }
        dirty
    }

    /// Commit the full working stroke and continue from its last point.
    fn split_working_stroke(&mut self) {
        let stroke = &self.canvas.working_stroke;
        let n = stroke.num_points();
        let (last, pressure, brush) = (stroke.points()[n - 1], stroke.pressures()[n - 1], stroke.brush);
        self.commit_working_stroke();
        let mut next = Stroke::new(brush);
        next.push_point(last, pressure);
        self.canvas.working_stroke = next;
    }

    fn commit_working_stroke(&mut self) -> Rect {
        let fresh = Stroke::new(self.active_brush());
        let stroke = std::mem::replace(&mut self.canvas.working_stroke, fresh);
        if stroke.is_empty() {
            return Rect::INVALID;
        }
        let bounds = stroke.bounding_rect();
        if let Some(r) = self.canvas.commit_stroke(stroke) {
            if let Some(s) = self.canvas.get_stroke(r) {
                self.vertex_cache.get_or_build(s);
            }
            self.mark_dirty();
        }
        bounds
    }

    /// End the gesture in progress.  Returns the rect to redraw.
    fn finish_stroke(&mut self) -> Rect {
        self.commit_working_stroke()
    }

    // ------------------------------------------------------------------------
    // Rendering
    // ------------------------------------------------------------------------

    /// Pick the redraw strategy for this frame and run it.
    fn present(&mut self, full: bool, panned: V2i, dirty: Rect) -> Result<FrameReport, RenderError> {
        let screen = self.framebuffer.rect();
        let mut report = FrameReport { full_redraw: false, panned, dirty: Rect::INVALID, complete: true };

        if full {
            crate::log_info!("full redraw at scale {}", self.view.scale);
            self.progressive = Some(IterativeRender::new(screen));
        } else if panned != v2i(0, 0) {
            if self.progressive.is_some() {
                // coarse pixels on screen cannot be reused
                self.progressive = Some(IterativeRender::new(screen));
            } else {
                self.renderer.render_pan(&self.canvas, &self.view, &mut self.framebuffer, panned)?;
                self.upload_rect = self.upload_rect.union(&screen);
            }
        }

        if dirty.is_valid() {
            let raster = self.view.canvas_rect_to_raster(&dirty.enlarge(self.view.scale)).intersect(&screen);
            if raster.is_valid() && !raster.is_empty() {
                self.renderer.render_incremental(&self.canvas, &self.view, &mut self.framebuffer, &dirty)?;
                self.upload_rect = self.upload_rect.union(&raster);
                report.dirty = raster;
            }
        }

        if let Some(mut progress) = self.progressive.take() {
            report.full_redraw = true;
            let done = self.renderer.render_iterative(
                &self.canvas,
                &self.view,
                &mut self.framebuffer,
                &mut progress,
                self.settings.iterative_budget(),
            )?;
            self.upload_rect = self.upload_rect.union(&progress.rect);
            if !done {
                self.progressive = Some(progress);
                report.complete = false;
            }
        }
        Ok(report)
    }

    /// Finish any progressive redraw at full quality right now.
    pub fn render_now(&mut self) -> Result<(), RenderError> {
        self.progressive = None;
        self.renderer.render_full(&self.canvas, &self.view, &mut self.framebuffer)?;
        self.upload_rect = self.framebuffer.rect();
        Ok(())
    }

    /// The window changed size.  Sizes past the configured maximum end the
    /// session.
    pub fn resize(&mut self, width: i32, height: i32) {
        check_screen_size(width, height, &self.settings);
        self.view.resize(width, height);
        self.framebuffer.resize(width, height, self.renderer.background().to_packed());
        self.progressive = Some(IterativeRender::new(self.framebuffer.rect()));
    }

    /// Region to upload since the last call, widened for row alignment, and
    /// its pixels.  `None` when nothing changed.
    pub fn take_upload(&mut self) -> Option<(Rect, Vec<u32>)> {
        let fb = &self.framebuffer;
        let rect = align_upload_rect(&self.upload_rect, fb.width() as i64, fb.height() as i64);
        self.upload_rect = Rect::INVALID;
        if !rect.is_valid() {
            return None;
        }
        Some((rect, fb.pixels_for_rect(&rect)))
    }

    // ------------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------------

    /// Snapshot the document and write it in the background.  Returns `false`
    /// when a save is already running.  The document stays dirty until the
    /// write is known to have succeeded.
    pub fn save_async(&mut self, path: PathBuf) -> bool {
        let file = build_ink(&self.canvas, &self.view, &self.brush, &self.eraser);
        let started = self.saver.save(file, path.clone());
        if started {
            self.path = Some(path);
            self.update_name_from_path();
            self.clean_on_save = true;
            self.save_error = None;
        }
        started
    }

    /// Block until a background save has landed.
    pub fn wait_for_save(&mut self) {
        self.saver.wait_idle();
        self.finish_save();
    }

    /// Error of the most recent finished save.  `None` while a save is still
    /// running or when it succeeded.
    pub fn last_save_error(&mut self) -> Option<String> {
        if self.saver.state() == SaveState::Idle {
            self.finish_save();
        }
        self.save_error.clone()
    }

    fn finish_save(&mut self) {
        if let Some(e) = self.saver.take_last_error() {
            self.save_error = Some(e);
            self.clean_on_save = false;
        }
        if std::mem::take(&mut self.clean_on_save) {
            self.mark_clean();
        }
    }
}

fn check_screen_size(width: i32, height: i32, settings: &RenderSettings) {
    if width <= 0 || height <= 0 || width > settings.max_screen_dim || height > settings.max_screen_dim {
        crate::logger::graceful_death(&format!(
            "unsupported screen size {}x{} (max {})",
            width, height, settings.max_screen_dim
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::NO_PRESSURE_INFO as NO_PRESSURE;

    fn project() -> Project {
        let settings = RenderSettings { single_threaded: true, ..RenderSettings::default() };
        let mut p = Project::new_untitled(1, 64, 64, &settings).unwrap();
        p.view.scale = 1;
        p.render_now().unwrap();
        p
    }

    #[test]
    fn samples_become_a_committed_stroke() {
        let mut p = project();
        let frame = InputFrame::new()
            .with_flags(InputFlags::BEGIN_STROKE)
            .point(10, 10, NO_PRESSURE)
            .point(30, 12, NO_PRESSURE)
            .point(50, 40, NO_PRESSURE);
        let report = p.handle_input(&frame).unwrap();
        assert!(report.dirty.is_valid());
        assert_eq!(p.canvas.working_stroke.num_points(), 3);
        assert_eq!(p.canvas.stroke_count(), 0);

        p.handle_input(&InputFrame::new().with_flags(InputFlags::END_STROKE)).unwrap();
        assert_eq!(p.canvas.stroke_count(), 1);
        assert!(p.canvas.working_stroke.is_empty());
        assert_eq!(p.vertex_cache.len(), 1);
        assert!(p.display_title().ends_with('*'));
    }

    #[test]
    fn swallowed_samples_are_dropped() {
        let mut p = project();
        p.brush.radius = 10;
        let frame = InputFrame::new().point(20, 20, 1.0).point(21, 20, 0.5).point(40, 20, 1.0);
        p.handle_input(&frame).unwrap();
        assert_eq!(p.canvas.working_stroke.num_points(), 2);
    }

    #[test]
    fn long_gestures_split_into_continuous_strokes() {
        let mut p = project();
        p.brush.radius = 0;
        let mut frame = InputFrame::new();
        for i in 0..(STROKE_SPLIT_POINTS + 10) as i32 {
            frame = frame.point(i % 60, i / 60, 1.0);
        }
        p.handle_input(&frame.with_flags(InputFlags::END_STROKE)).unwrap();
        assert_eq!(p.canvas.stroke_count(), 2);
        let strokes = p.canvas.layers.working().strokes();
        assert_eq!(strokes[0].num_points(), STROKE_SPLIT_POINTS);
        assert_eq!(strokes[1].points()[0], *strokes[0].points().last().unwrap());
    }

    #[test]
    fn undo_redraws_the_stroke_area() {
        let mut p = project();
        let blank = p.framebuffer.clone();
        p.handle_input(&InputFrame::new().point(32, 32, 1.0).with_flags(InputFlags::END_STROKE))
            .unwrap();
        assert_ne!(p.framebuffer, blank);
        let report = p.handle_input(&InputFrame::new().with_flags(InputFlags::UNDO)).unwrap();
        assert!(report.dirty.is_valid());
        assert_eq!(p.framebuffer, blank);
        assert!(p.vertex_cache.is_empty());
    }

    #[test]
    fn eraser_mode_uses_the_eraser_brush() {
        let mut p = project();
        p.handle_input(&InputFrame::new().mode(BrushMode::Eraser).point(5, 5, 1.0)).unwrap();
        assert!(p.canvas.working_stroke.brush.eraser);
    }

    #[test]
    fn zoom_starts_a_progressive_redraw() {
        let mut p = project();
        let report = p
            .handle_input(&InputFrame::new().zoom(v2i(32, 32), -1))
            .unwrap();
        assert!(report.full_redraw);
        while p.is_refining() {
            p.handle_input(&InputFrame::new()).unwrap();
        }
        let upload = p.take_upload().unwrap();
        assert_eq!(upload.0, p.framebuffer.rect());
        assert!(p.take_upload().is_none());
    }
}
