// ============================================================================
// InkFE CLI: headless rendering of .ink documents to PNG
// ============================================================================
//
// Usage examples:
//   inkfe --input sketch.ink --output sketch.png
//   inkfe -i notes/*.ink --output-dir renders/ --width 3840 --height 2160
//   inkfe -i sketch.ink -o zoomed.png --scale 8 --pan-x -4000 --pan-y 1200
//   inkfe --demo demo.ink
//
// Rendering uses the same block rasterizer and worker pool as the editor.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;

use crate::canvas::{Brush, CanvasState, CanvasView, MIN_SCALE, Stroke};
use crate::geometry::v2l;
use crate::io::{load_ink, save_ink};
use crate::raster::framebuffer::Framebuffer;
use crate::raster::orchestrator::{RenderError, Renderer};
use crate::settings::RenderSettings;

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// InkFE headless renderer.
#[derive(Parser, Debug)]
#[command(
    name = "inkfe",
    about = "InkFE headless canvas renderer",
    long_about = "Render InkFE documents to PNG without opening a window.\n\n\
                  Example:\n  \
                  inkfe --input sketch.ink --output sketch.png\n  \
                  inkfe -i '*.ink' --output-dir renders/ --width 1920 --height 1080"
)]
pub struct CliArgs {
    /// Input .ink file(s). Glob patterns accepted (e.g. "*.ink").
    #[arg(short, long, num_args = 1.., required_unless_present = "demo")]
    pub input: Vec<String>,

    /// Output PNG path. Only valid for single-file input.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output directory for batch rendering.
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Output width in pixels.
    #[arg(long, default_value_t = 1920)]
    pub width: i32,

    /// Output height in pixels.
    #[arg(long, default_value_t = 1080)]
    pub height: i32,

    /// Canvas units per pixel. Defaults to the scale saved in the document.
    #[arg(long)]
    pub scale: Option<i64>,

    /// Horizontal pan in canvas units. Defaults to the saved view.
    #[arg(long, allow_hyphen_values = true)]
    pub pan_x: Option<i64>,

    /// Vertical pan in canvas units. Defaults to the saved view.
    #[arg(long, allow_hyphen_values = true)]
    pub pan_y: Option<i64>,

    /// Render worker threads (0 = one per CPU).
    #[arg(short = 't', long)]
    pub threads: Option<usize>,

    /// Render on the main thread only.
    #[arg(long)]
    pub single_threaded: bool,

    /// Use the scalar rasterizer instead of the 4-wide one.
    #[arg(long)]
    pub scalar: bool,

    /// Write a generated sample document to this path and exit.
    #[arg(long, value_name = "FILE.ink")]
    pub demo: Option<PathBuf>,

    /// Echo the log to stderr and print per-file timing.
    #[arg(short, long)]
    pub verbose: bool,
}

impl CliArgs {
    /// Settings file values with command-line overrides applied.
    pub fn render_settings(&self, base: &RenderSettings) -> RenderSettings {
        let mut settings = base.clone();
        if let Some(t) = self.threads {
            settings.worker_threads = t;
        }
        if self.single_threaded {
            settings.single_threaded = true;
        }
        if self.scalar {
            settings.simd = false;
        }
        settings
    }
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run the CLI and return an OS exit code.
/// `0` = all files succeeded, `1` = one or more files failed.
pub fn run(args: CliArgs, settings: &RenderSettings) -> ExitCode {
    crate::logger::set_echo(args.verbose);

    if let Some(path) = &args.demo {
        return match write_demo(path) {
            Ok(count) => {
                println!("wrote {} strokes to {}", count, path.display());
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("error: {}", e);
                ExitCode::FAILURE
            }
        };
    }

    let inputs = resolve_inputs(&args.input);
    if inputs.is_empty() {
        eprintln!("error: no input files matched the given pattern(s).");
        return ExitCode::FAILURE;
    }

    if inputs.len() > 1 && args.output.is_some() && args.output_dir.is_none() {
        eprintln!(
            "error: {} input files given but --output only accepts a single file path.\n\
             Use --output-dir to specify a destination directory for batch rendering.",
            inputs.len()
        );
        return ExitCode::FAILURE;
    }

    if args.width <= 0 || args.height <= 0 || args.width > settings.max_screen_dim || args.height > settings.max_screen_dim {
        eprintln!(
            "error: output size {}x{} is outside 1..={}.",
            args.width, args.height, settings.max_screen_dim
        );
        return ExitCode::FAILURE;
    }

    if let Some(dir) = &args.output_dir
        && let Err(e) = std::fs::create_dir_all(dir)
    {
        eprintln!("error: could not create output directory '{}': {}", dir.display(), e);
        return ExitCode::FAILURE;
    }

    let render_settings = args.render_settings(settings);
    let mut renderer = match Renderer::new(&render_settings) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    crate::log_info!(
        "CLI render with {} worker(s), {:?} backend",
        renderer.worker_count(),
        renderer.backend()
    );

    let total = inputs.len();
    let multi = total > 1;
    let mut any_failure = false;

    for (idx, input_path) in inputs.iter().enumerate() {
        if multi || args.verbose {
            println!("[{}/{}] {}", idx + 1, total, input_path.display());
        }
        let file_start = Instant::now();

        let Some(output_path) = build_output_path(input_path, args.output.as_deref(), args.output_dir.as_deref())
        else {
            eprintln!("  error: cannot determine output path for '{}'.", input_path.display());
            any_failure = true;
            continue;
        };

        match render_one(&mut renderer, input_path, &output_path, &args) {
            Ok(()) => {
                if args.verbose || multi {
                    println!(
                        "  → {} ({:.0}ms)",
                        output_path.display(),
                        file_start.elapsed().as_secs_f64() * 1000.0
                    );
                }
            }
            Err(CliError::Render(RenderError::ArenaLimit { needed, max })) => {
                crate::logger::graceful_death(&format!(
                    "rendering '{}' needs {} arena elements per worker, limit is {}",
                    input_path.display(),
                    needed,
                    max
                ));
            }
            Err(e) => {
                eprintln!("  error: {}", e);
                any_failure = true;
            }
        }
    }

    if any_failure { ExitCode::FAILURE } else { ExitCode::SUCCESS }
}

// ============================================================================
// Per-file pipeline
// ============================================================================

#[derive(Debug)]
enum CliError {
    Load(String),
    Render(RenderError),
    Save(String),
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::Load(e) => write!(f, "load failed: {}", e),
            CliError::Render(e) => write!(f, "render failed: {}", e),
            CliError::Save(e) => write!(f, "save failed: {}", e),
        }
    }
}

fn render_one(renderer: &mut Renderer, input: &Path, output: &Path, args: &CliArgs) -> Result<(), CliError> {
    let loaded = load_ink(input).map_err(|e| CliError::Load(e.to_string()))?;
    if loaded.skipped_strokes > 0 {
        eprintln!("  warning: skipped {} corrupt stroke(s)", loaded.skipped_strokes);
    }

    let view = output_view(loaded.view, args);
    let mut fb = Framebuffer::new(view.screen_size.x, view.screen_size.y, renderer.background().to_packed());
    renderer.render_full(&loaded.canvas, &view, &mut fb).map_err(CliError::Render)?;

    if args.verbose {
        let stats = renderer.stats();
        println!(
            "  {} strokes, {} blocks in {} groups ({} retried)",
            loaded.canvas.stroke_count(),
            stats.blocks,
            stats.groups,
            stats.retried_groups
        );
    }

    fb.to_rgba_image().save(output).map_err(|e| CliError::Save(e.to_string()))
}

/// The saved view resized to the output, with command-line overrides.
fn output_view(saved: CanvasView, args: &CliArgs) -> CanvasView {
    let mut view = saved;
    view.resize(args.width, args.height);
    view.downsampling_factor = 1;
    if let Some(scale) = args.scale {
        view.scale = scale.max(MIN_SCALE);
    }
    if let Some(x) = args.pan_x {
        view.pan_vector.x = x;
    }
    if let Some(y) = args.pan_y {
        view.pan_vector.y = y;
    }
    view
}

// ============================================================================
// Demo document
// ============================================================================

/// Spiral arms crossed by an erased band, under a translucent layer of dots.
pub fn demo_canvas() -> CanvasState {
    let mut canvas = CanvasState::new();

    for arm in 0..6 {
        let color = [(arm * 40) as u8, 80, (255 - arm * 40) as u8];
        let mut stroke = Stroke::new(Brush::new(400, color, 1.0));
        let phase = arm as f64 * std::f64::consts::TAU / 6.0;
        for i in 0..400 {
            let t = i as f64 / 40.0;
            let r = 1500.0 * t;
            let p = v2l((r * (t + phase).cos()) as i64, (r * (t + phase).sin()) as i64);
            stroke.push_point(p, 0.3 + 0.7 * (i as f32 / 400.0));
        }
        canvas.commit_stroke(stroke);
    }

    let mut band = Stroke::new(Brush::eraser(1200));
    band.push_point(v2l(-20000, 4000), 1.0);
    band.push_point(v2l(20000, 4000), 1.0);
    canvas.commit_stroke(band);

    let top = canvas.layers.new_layer(Some("Dots".to_string()));
    canvas.layers.set_alpha(top, 0.6);
    for i in 0..40_i64 {
        let mut dot = Stroke::new(Brush::new(600 + 30 * i, [240, 160, 20], 0.8));
        dot.push_point(v2l(-24000 + i * 1200, -12000 + (i % 7) * 900), 1.0);
        canvas.commit_stroke(dot);
    }
    canvas
}

fn write_demo(path: &Path) -> Result<usize, String> {
    let canvas = demo_canvas();
    let view = CanvasView::new(1920, 1080);
    save_ink(&canvas, &view, &Brush::default(), &Brush::eraser(20), path).map_err(|e| e.to_string())?;
    Ok(canvas.stroke_count())
}

// ============================================================================
// Helpers
// ============================================================================

/// Expand glob patterns and literal paths into a deduplicated, ordered list.
fn resolve_inputs(patterns: &[String]) -> Vec<PathBuf> {
    let mut result: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        let as_path = Path::new(pattern);

        if as_path.exists() {
            if !result.iter().any(|p| p.as_path() == as_path) {
                result.push(as_path.to_path_buf());
            }
            continue;
        }

        match glob::glob(pattern) {
            Ok(entries) => {
                let mut matched = false;
                for entry in entries.flatten() {
                    if !result.contains(&entry) {
                        result.push(entry);
                    }
                    matched = true;
                }
                if !matched {
                    eprintln!("warning: pattern '{}' matched no files.", pattern);
                }
            }
            Err(e) => {
                eprintln!("warning: invalid glob '{}': {}", pattern, e);
            }
        }
    }

    result
}

/// Compute the PNG path for one input.
///
/// Priority:
/// 1. `--output`
/// 2. `--output-dir` plus the input stem
/// 3. next to the input, same stem
fn build_output_path(input: &Path, output: Option<&Path>, output_dir: Option<&Path>) -> Option<PathBuf> {
    if let Some(out) = output {
        return Some(out.to_path_buf());
    }
    let stem = input.file_stem()?.to_string_lossy().into_owned();
    if let Some(dir) = output_dir {
        return Some(dir.join(format!("{}.png", stem)));
    }
    let parent = input.parent().unwrap_or(Path::new("."));
    Some(parent.join(format!("{}.png", stem)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::orchestrator::RasterBackend;

    #[test]
    fn output_paths() {
        let input = Path::new("notes/sketch.ink");
        assert_eq!(build_output_path(input, None, None), Some(PathBuf::from("notes/sketch.png")));
        assert_eq!(
            build_output_path(input, None, Some(Path::new("out"))),
            Some(PathBuf::from("out/sketch.png"))
        );
        assert_eq!(
            build_output_path(input, Some(Path::new("x.png")), Some(Path::new("out"))),
            Some(PathBuf::from("x.png"))
        );
    }

    #[test]
    fn overrides_apply_to_settings_and_view() {
        let args = CliArgs::parse_from([
            "inkfe", "-i", "a.ink", "--scalar", "--single-threaded", "-t", "3", "--scale", "0", "--pan-x", "-50",
        ]);
        let s = args.render_settings(&RenderSettings::default());
        assert!(s.single_threaded);
        assert_eq!(s.worker_threads, 3);
        assert_eq!(s.backend(), RasterBackend::Scalar);

        let view = output_view(CanvasView::new(10, 10), &args);
        assert_eq!(view.screen_size.x, 1920);
        assert_eq!(view.scale, MIN_SCALE);
        assert_eq!(view.pan_vector.x, -50);
        assert_eq!(view.pan_vector.y, 0);
    }

    #[test]
    fn demo_round_trips_and_renders() {
        let dir = tempfile::tempdir().unwrap();
        let ink = dir.path().join("demo.ink");
        let count = write_demo(&ink).unwrap();
        assert_eq!(count, 47);

        let args = CliArgs::parse_from(["inkfe", "-i", "x", "--width", "64", "--height", "48", "--single-threaded"]);
        let settings = args.render_settings(&RenderSettings::default());
        let mut renderer = Renderer::new(&settings).unwrap();
        let png = dir.path().join("demo.png");
        render_one(&mut renderer, &ink, &png, &args).unwrap();
        let img = image::open(&png).unwrap().into_rgba8();
        assert_eq!(img.dimensions(), (64, 48));
    }
}
