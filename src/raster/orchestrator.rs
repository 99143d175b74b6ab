// ============================================================================
// RENDER ORCHESTRATOR: blockgroups, worker scratch, memory retry
// ============================================================================
//
// A redraw splits its screen rect into square blocks and groups of blocks.
// Group descriptors sit on a mutex-protected stack; every pool task pops one,
// renders it with its worker's scratch, and hands the finished blocks back.
// The driver blits them once the scope has joined.  Groups that ran out of
// arena space are collected, every worker arena doubles, and only those
// groups run again.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::arena::{Arena, ArenaError};
use crate::canvas::{CanvasState, CanvasView};
use crate::color::Rgba;
use crate::geometry::{Rect, V2i, rect_split, v2i};
use crate::raster::block::{BlockJob, block_outside_canvas, rasterize_block_scalar, rasterize_block_simd};
use crate::raster::clip::{ClipNode, StrokeMask, build_clip_list, local_scale_for};
use crate::raster::framebuffer::Framebuffer;
use crate::raster::scene::Scene;
use crate::settings::RenderSettings;

/// Which instantiation of the block rasterizer to run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RasterBackend {
    Simd,
    Scalar,
}

#[derive(Debug)]
pub enum RenderError {
    /// A worker arena would have to grow past the configured maximum.
    ArenaLimit { needed: usize, max: usize },
    /// The render thread pool could not be created.
    ThreadPool(String),
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::ArenaLimit { needed, max } => {
                write!(f, "render arena of {needed} elements exceeds the limit of {max}")
            }
            RenderError::ThreadPool(e) => write!(f, "could not start render workers: {e}"),
        }
    }
}

impl std::error::Error for RenderError {}

impl From<rayon::ThreadPoolBuildError> for RenderError {
    fn from(e: rayon::ThreadPoolBuildError) -> Self {
        RenderError::ThreadPool(e.to_string())
    }
}

/// Counters for the most recent redraw.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub blocks: usize,
    pub groups: usize,
    /// Groups that had to be rendered again after an arena grew.
    pub retried_groups: usize,
    pub arena_growths: usize,
}

/// Per-worker scratch.  Only ever touched by the worker it belongs to.
struct WorkerScratch {
    arena: Arena<f32>,
    mask: StrokeMask,
    nodes: Vec<ClipNode>,
}

impl WorkerScratch {
    fn new(arena_size: usize) -> Self {
        Self { arena: Arena::new(arena_size), mask: StrokeMask::default(), nodes: Vec::new() }
    }
}

struct RenderedBlock {
    rect: Rect,
    pixels: Vec<u32>,
}

/// Read-only parameters shared by every task of one pass.
struct PassParams<'a> {
    scene: &'a Scene<'a>,
    view: &'a CanvasView,
    local_scale: i64,
    background: Rgba,
    backend: RasterBackend,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

pub struct Renderer {
    pool: Option<ThreadPool>,
    workers: Vec<Mutex<WorkerScratch>>,
    arena_size: usize,
    max_arena_size: usize,
    block_width: i32,
    blocks_per_group: usize,
    backend: RasterBackend,
    background: Rgba,
    needs_memory: AtomicBool,
    stats: RenderStats,
}

impl Renderer {
    pub fn new(settings: &RenderSettings) -> Result<Self, RenderError> {
        let (pool, worker_count) = if settings.single_threaded {
            (None, 1)
        } else {
            let threads = match settings.worker_threads {
                0 => std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
                n => n,
            };
            let pool = ThreadPoolBuilder::new()
                .num_threads(threads)
                .thread_name(|i| format!("inkfe-render-{i}"))
                .build()?;
            (Some(pool), threads)
        };
        crate::log_info!(
            "renderer: {} worker(s), {}px blocks, {} per group, {:?}",
            worker_count,
            settings.block_width,
            settings.blocks_per_group,
            settings.backend()
        );
        let [r, g, b] = settings.background;
        let initial_arena_size = settings.initial_arena_size.max(1);
        Ok(Self {
            pool,
            workers: (0..worker_count)
                .map(|_| Mutex::new(WorkerScratch::new(initial_arena_size)))
                .collect(),
            arena_size: initial_arena_size,
            max_arena_size: settings.max_arena_size.max(initial_arena_size),
            block_width: settings.block_width.max(1),
            blocks_per_group: settings.blocks_per_group.max(1),
            backend: settings.backend(),
            background: Rgba::from_rgba8([r, g, b, 255]),
            needs_memory: AtomicBool::new(false),
            stats: RenderStats::default(),
        })
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn arena_size(&self) -> usize {
        self.arena_size
    }

    pub fn backend(&self) -> RasterBackend {
        self.backend
    }

    pub fn set_backend(&mut self, backend: RasterBackend) {
        self.backend = backend;
    }

    pub fn background(&self) -> Rgba {
        self.background
    }

    pub fn stats(&self) -> RenderStats {
        self.stats
    }

    /// Redraw the whole screen.
    pub fn render_full(&mut self, canvas: &CanvasState, view: &CanvasView, fb: &mut Framebuffer) -> Result<(), RenderError> {
        self.stats = RenderStats::default();
        let screen = fb.rect();
        self.render_rect(canvas, view, fb, screen)
    }

    /// The view was panned by `delta` pixels: reuse the interior and render
    /// only the exposed strips.  A shift of a screen or more is a full redraw.
    pub fn render_pan(
        &mut self,
        canvas: &CanvasState,
        view: &CanvasView,
        fb: &mut Framebuffer,
        delta: V2i,
    ) -> Result<(), RenderError> {
        self.stats = RenderStats::default();
        let strips = fb.scroll(delta);
        if strips.first() == Some(&fb.rect()) {
            crate::log_info!("pan of {:?} exceeds the screen; full redraw", delta);
        }
        for strip in strips {
            self.render_rect(canvas, view, fb, strip)?;
        }
        Ok(())
    }

    /// Redraw what a canvas-space change can have touched.
    pub fn render_incremental(
        &mut self,
        canvas: &CanvasState,
        view: &CanvasView,
        fb: &mut Framebuffer,
        dirty: &Rect,
    ) -> Result<(), RenderError> {
        self.stats = RenderStats::default();
        if !dirty.is_valid() {
            return Ok(());
        }
        // one extra pixel covers antialiasing reach past the stroke bounds
        let raster = view.canvas_rect_to_raster(&dirty.enlarge(view.scale));
        self.render_rect(canvas, view, fb, raster)
    }

    /// Advance a progressive render.  Each step renders the whole rect at the
    /// next finer downsampling factor; steps stop once `budget` is spent and
    /// resume on the next call.  Returns `true` when full quality is reached.
    pub fn render_iterative(
        &mut self,
        canvas: &CanvasState,
        view: &CanvasView,
        fb: &mut Framebuffer,
        progress: &mut IterativeRender,
        budget: Duration,
    ) -> Result<bool, RenderError> {
        self.stats = RenderStats::default();
        let start = Instant::now();
        while let Some(factor) = progress.factor() {
            let mut step_view = *view;
            step_view.downsampling_factor = factor;
            self.render_rect(canvas, &step_view, fb, progress.rect)?;
            progress.advance();
            if start.elapsed() >= budget {
                break;
            }
        }
        Ok(progress.is_done())
    }

    /// Render `rect` (clipped to the screen) and blit it.
    pub fn render_rect(
        &mut self,
        canvas: &CanvasState,
        view: &CanvasView,
        fb: &mut Framebuffer,
        rect: Rect,
    ) -> Result<(), RenderError> {
        let rect = fb.rect().intersect(&rect);
        if !rect.is_valid() || rect.is_empty() {
            return Ok(());
        }
        let scene = Scene::build(canvas);
        let params = PassParams {
            scene: &scene,
            view,
            local_scale: local_scale_for(view),
            background: self.background,
            backend: self.backend,
        };

        let blocks = rect_split(&rect, self.block_width as i64, self.block_width as i64);
        let mut pending: Vec<Vec<Rect>> = blocks.chunks(self.blocks_per_group).map(|c| c.to_vec()).collect();
        self.stats.blocks += blocks.len();
        self.stats.groups += pending.len();

        loop {
            self.needs_memory.store(false, Ordering::Relaxed);
            let (rendered, failed) = self.run_pass(&params, pending);
            for block in rendered {
                fb.blit(&block.rect, &block.pixels);
            }
            if !self.needs_memory.load(Ordering::Relaxed) {
                break;
            }
            self.grow_arenas()?;
            self.stats.retried_groups += failed.len();
            pending = failed;
        }
        Ok(())
    }

    /// Fan the groups out over the pool (or run them inline) and fan back in.
    fn run_pass(&self, params: &PassParams<'_>, groups: Vec<Vec<Rect>>) -> (Vec<RenderedBlock>, Vec<Vec<Rect>>) {
        let count = groups.len();
        let stack = Mutex::new(groups);
        let done = Mutex::new(Vec::new());
        let failed = Mutex::new(Vec::new());

        let task = || {
            let Some(group) = lock(&stack).pop() else { return };
            let index = rayon::current_thread_index().unwrap_or(0) % self.workers.len();
            let mut scratch = lock(&self.workers[index]);
            match render_group(&mut scratch, params, &group) {
                Ok(blocks) => lock(&done).extend(blocks),
                Err(e) => {
                    crate::log_info!("worker {} needs memory: {}", index, e);
                    self.needs_memory.store(true, Ordering::Relaxed);
                    lock(&failed).push(group);
                }
            }
        };

        match &self.pool {
            Some(pool) => {
                let task = &task;
                pool.scope(|s| {
                    for _ in 0..count {
                        s.spawn(move |_| task());
                    }
                });
            }
            None => (0..count).for_each(|_| task()),
        }

        (
            done.into_inner().unwrap_or_else(|e| e.into_inner()),
            failed.into_inner().unwrap_or_else(|e| e.into_inner()),
        )
    }

    fn grow_arenas(&mut self) -> Result<(), RenderError> {
        let needed = self.arena_size.saturating_mul(2).max(self.arena_size.saturating_add(1));
        if needed > self.max_arena_size || needed <= self.arena_size {
            return Err(RenderError::ArenaLimit { needed, max: self.max_arena_size });
        }
        crate::log_info!("growing worker arenas from {} to {} elements", self.arena_size, needed);
        self.arena_size = needed;
        for worker in &self.workers {
            lock(worker).arena = Arena::new(needed);
        }
        self.stats.arena_growths += 1;
        Ok(())
    }
}

/// Render every block of one group inside a scope pushed on the worker's
/// arena.  On failure none of the group's blocks are returned.
fn render_group(
    scratch: &mut WorkerScratch,
    params: &PassParams<'_>,
    group: &[Rect],
) -> Result<Vec<RenderedBlock>, ArenaError> {
    let WorkerScratch { arena, mask, nodes } = scratch;
    let view = params.view;

    let group_rect = group.iter().fold(Rect::INVALID, |acc, r| acc.union(r));
    mask.compute(params.scene, &view.raster_rect_to_canvas(&group_rect).enlarge(view.scale));

    let checkpoint = arena.push(arena.remaining())?;
    let result = render_blocks(arena, mask, nodes, params, group);
    arena.pop(checkpoint);
    result
}

fn render_blocks(
    arena: &mut Arena<f32>,
    mask: &StrokeMask,
    nodes: &mut Vec<ClipNode>,
    params: &PassParams<'_>,
    group: &[Rect],
) -> Result<Vec<RenderedBlock>, ArenaError> {
    let view = params.view;
    let mut out = Vec::with_capacity(group.len());
    for block in group {
        arena.reset();
        let reference = view.raster_to_canvas(v2i(block.left as i32, block.top as i32));
        if block_outside_canvas(view, block) {
            nodes.clear();
        } else {
            let block_canvas = view.raster_rect_to_canvas(block).enlarge(view.scale);
            build_clip_list(params.scene, mask, &block_canvas, reference, params.local_scale, arena, nodes)?;
        }

        let job = BlockJob {
            raster_rect: *block,
            view,
            nodes: nodes.as_slice(),
            arena: &*arena,
            reference,
            local_scale: params.local_scale,
            background: params.background,
        };
        let mut pixels = vec![0u32; block.area() as usize];
        match params.backend {
            RasterBackend::Simd => rasterize_block_simd(&job, &mut pixels),
            RasterBackend::Scalar => rasterize_block_scalar(&job, &mut pixels),
        }
        out.push(RenderedBlock { rect: *block, pixels });
    }
    Ok(out)
}

// ============================================================================
// PROGRESSIVE RENDERING
// ============================================================================

const ITERATIVE_FACTORS: [i32; 4] = [8, 4, 2, 1];

/// Resumable coarse-to-fine render of one screen rect.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IterativeRender {
    pub rect: Rect,
    step: usize,
}

impl IterativeRender {
    pub fn new(rect: Rect) -> Self {
        Self { rect, step: 0 }
    }

    /// Downsampling factor of the next step, `None` when finished.
    pub fn factor(&self) -> Option<i32> {
        ITERATIVE_FACTORS.get(self.step).copied()
    }

    pub fn advance(&mut self) {
        self.step = (self.step + 1).min(ITERATIVE_FACTORS.len());
    }

    pub fn is_done(&self) -> bool {
        self.step >= ITERATIVE_FACTORS.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::{Brush, Stroke};
    use crate::geometry::v2l;

    fn settings(single: bool) -> RenderSettings {
        RenderSettings { single_threaded: single, worker_threads: 3, block_width: 16, ..RenderSettings::default() }
    }

    fn scribble(canvas: &mut CanvasState) {
        let mut s = Stroke::new(Brush::new(6, [20, 120, 220], 0.8));
        for i in 0..30 {
            s.push_point(v2l(i * 9 - 130, (i * i * 7) % 90 - 45), 0.5 + (i % 3) as f32 / 4.0);
        }
        canvas.commit_stroke(s);
    }

    #[test]
    fn groups_that_run_out_of_memory_are_retried() {
        let mut canvas = CanvasState::new();
        scribble(&mut canvas);
        let view = CanvasView::new(96, 64).with_scale(1);

        let mut roomy = Renderer::new(&settings(true)).unwrap();
        let mut expected = Framebuffer::new(96, 64, 0);
        roomy.render_full(&canvas, &view, &mut expected).unwrap();

        let tight = RenderSettings { initial_arena_size: 8, ..settings(false) };
        let mut renderer = Renderer::new(&tight).unwrap();
        let mut fb = Framebuffer::new(96, 64, 0);
        renderer.render_full(&canvas, &view, &mut fb).unwrap();
        assert!(renderer.stats().arena_growths > 0);
        assert!(renderer.stats().retried_groups > 0);
        assert_eq!(fb, expected);
    }

    #[test]
    fn arena_limit_is_reported() {
        let mut canvas = CanvasState::new();
        scribble(&mut canvas);
        let view = CanvasView::new(64, 64).with_scale(1);
        let s = RenderSettings { initial_arena_size: 8, max_arena_size: 16, ..settings(true) };
        let mut renderer = Renderer::new(&s).unwrap();
        let mut fb = Framebuffer::new(64, 64, 0);
        let err = renderer.render_full(&canvas, &view, &mut fb).unwrap_err();
        assert!(matches!(err, RenderError::ArenaLimit { max: 16, .. }));
    }

    #[test]
    fn zero_sized_arenas_still_grow() {
        let mut canvas = CanvasState::new();
        let mut dot = Stroke::new(Brush::new(5, [0, 0, 0], 1.0));
        dot.push_point(v2l(0, 0), 1.0);
        canvas.commit_stroke(dot);
        let view = CanvasView::new(32, 32).with_scale(1);

        let mut expected = Framebuffer::new(32, 32, 0);
        Renderer::new(&settings(true)).unwrap().render_full(&canvas, &view, &mut expected).unwrap();

        let s = RenderSettings { initial_arena_size: 0, ..settings(true) };
        let mut renderer = Renderer::new(&s).unwrap();
        assert_eq!(renderer.arena_size(), 1);
        let mut fb = Framebuffer::new(32, 32, 0);
        renderer.render_full(&canvas, &view, &mut fb).unwrap();
        assert!(renderer.arena_size() > 1);
        assert_eq!(fb, expected);

        let capped = RenderSettings { initial_arena_size: 0, max_arena_size: 0, ..settings(true) };
        let mut renderer = Renderer::new(&capped).unwrap();
        let err = renderer.render_full(&canvas, &view, &mut fb).unwrap_err();
        assert!(matches!(err, RenderError::ArenaLimit { needed: 2, max: 1 }));
    }

    #[test]
    fn iterative_render_resumes_until_full_quality() {
        let mut canvas = CanvasState::new();
        scribble(&mut canvas);
        let view = CanvasView::new(64, 48).with_scale(1);
        let mut renderer = Renderer::new(&settings(true)).unwrap();
        let mut fb = Framebuffer::new(64, 48, 0);
        let mut progress = IterativeRender::new(fb.rect());
        let mut frames = 0;
        while !renderer
            .render_iterative(&canvas, &view, &mut fb, &mut progress, Duration::ZERO)
            .unwrap()
        {
            frames += 1;
        }
        assert_eq!(frames, 3);

        let mut full = Framebuffer::new(64, 48, 0);
        renderer.render_full(&canvas, &view, &mut full).unwrap();
        assert_eq!(fb, full);
    }

    #[test]
    fn incremental_ignores_invalid_rects() {
        let canvas = CanvasState::new();
        let view = CanvasView::new(16, 16);
        let mut renderer = Renderer::new(&settings(true)).unwrap();
        let mut fb = Framebuffer::new(16, 16, 7);
        renderer.render_incremental(&canvas, &view, &mut fb, &Rect::INVALID).unwrap();
        assert!(fb.pixels().iter().all(|&p| p == 7));
    }
}
