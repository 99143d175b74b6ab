// ============================================================================
// RASTER MODULE: CPU stroke rasterization
// ============================================================================
//
//   scene.rs:        flattened, render-ordered view of the canvas
//   clip.rs:         per-region stroke culling and clipping into arena scratch
//   lanes.rs:        distance-to-polyline kernel, scalar and 4-wide
//   block.rs:        per-pixel coverage and compositing for one block
//   framebuffer.rs:  screen-sized pixel buffer with scroll/blit
//   orchestrator.rs: worker pool, block groups, memory retry, render modes
// ============================================================================

pub mod block;
pub mod clip;
pub mod framebuffer;
pub mod lanes;
pub mod orchestrator;
pub mod scene;

pub use framebuffer::Framebuffer;
pub use orchestrator::{IterativeRender, RasterBackend, RenderError, RenderStats, Renderer};
