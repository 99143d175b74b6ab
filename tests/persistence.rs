use inkfe::canvas::{Brush, CanvasState, CanvasView, STROKE_MAX_POINTS, Stroke};
use inkfe::geometry::v2l;
use inkfe::io::{AsyncSaver, InkFileError, SaveState, build_ink, load_ink, save_ink};
use inkfe::raster::{Framebuffer, Renderer};
use inkfe::settings::RenderSettings;
use tempfile::tempdir;

fn render(canvas: &CanvasState, view: &CanvasView) -> Framebuffer {
    let settings = RenderSettings { single_threaded: true, ..RenderSettings::default() };
    let mut renderer = Renderer::new(&settings).unwrap();
    let mut fb = Framebuffer::new(view.screen_size.x, view.screen_size.y, 0);
    renderer.render_full(canvas, view, &mut fb).unwrap();
    fb
}

fn sample_canvas() -> CanvasState {
    let mut canvas = CanvasState::new();
    for i in 0..5 {
        let mut s = Stroke::new(Brush::new(4 + i, [200, (i * 40) as u8, 10], 0.7));
        for j in 0..8 {
            s.push_point(v2l(-40 + j * 11, -20 + i * 9 + (j % 2) * 4), 0.25 * (1 + j % 4) as f32);
        }
        canvas.commit_stroke(s);
    }
    let top = canvas.layers.new_layer(Some("Ink".into()));
    canvas.layers.set_alpha(top, 0.5);
    let mut e = Stroke::new(Brush::eraser(6));
    e.push_point(v2l(0, 0), 1.0);
    canvas.commit_stroke(e);
    let mut s = Stroke::new(Brush::new(9, [0, 0, 0], 1.0));
    s.push_point(v2l(10, 10), 1.0);
    canvas.commit_stroke(s);
    canvas
}

#[test]
fn saved_documents_render_the_same() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("doc.ink");
    let canvas = sample_canvas();
    let mut view = CanvasView::new(100, 70).with_scale(1);
    view.pan_vector = v2l(3, -4);
    let brush = Brush::new(7, [1, 2, 3], 0.4);
    save_ink(&canvas, &view, &brush, &Brush::eraser(30), &path).unwrap();

    let loaded = load_ink(&path).unwrap();
    assert_eq!(loaded.skipped_strokes, 0);
    assert_eq!(loaded.view, view);
    assert_eq!(loaded.brush, brush);
    assert_eq!(loaded.eraser.radius, 30);
    assert_eq!(loaded.canvas.stroke_count(), canvas.stroke_count());
    assert_eq!(loaded.canvas.layers.len(), 2);
    assert_eq!(loaded.canvas.layers.topmost().name, "Ink");
    assert_eq!(render(&loaded.canvas, &view), render(&canvas, &view));
}

#[test]
fn history_is_rebuilt_on_load() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("doc.ink");
    save_ink(&sample_canvas(), &CanvasView::new(10, 10), &Brush::default(), &Brush::eraser(5), &path).unwrap();

    let mut loaded = load_ink(&path).unwrap().canvas;
    assert_eq!(loaded.history.len(), 7);
    assert!(loaded.undo().is_some());
    assert_eq!(loaded.stroke_count(), 6);
    // ids continue past the loaded strokes
    assert_eq!(loaded.next_stroke_id(), 7);
}

#[test]
fn full_strokes_are_refused_on_load() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("long.ink");
    let mut canvas = CanvasState::new();
    let points: Vec<_> = (0..STROKE_MAX_POINTS as i64).map(|i| v2l(i, 0)).collect();
    let pressures = vec![1.0; STROKE_MAX_POINTS];
    canvas.commit_stroke(Stroke::from_parts(Brush::default(), points, pressures).unwrap());
    let mut ok = Stroke::new(Brush::default());
    ok.push_point(v2l(0, 0), 1.0);
    canvas.commit_stroke(ok);
    save_ink(&canvas, &CanvasView::new(10, 10), &Brush::default(), &Brush::eraser(5), &path).unwrap();

    let loaded = load_ink(&path).unwrap();
    assert_eq!(loaded.skipped_strokes, 1);
    assert_eq!(loaded.canvas.stroke_count(), 1);
}

#[test]
fn truncated_and_foreign_files_fail() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("doc.ink");
    save_ink(&sample_canvas(), &CanvasView::new(10, 10), &Brush::default(), &Brush::eraser(5), &path).unwrap();
    let bytes = std::fs::read(&path).unwrap();

    std::fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();
    assert!(matches!(load_ink(&path), Err(InkFileError::Serialize(_))));

    std::fs::write(&path, b"\x89PNG\r\n\x1a\n........").unwrap();
    assert!(matches!(load_ink(&path), Err(InkFileError::InvalidFormat(_))));

    assert!(matches!(load_ink(&dir.path().join("missing.ink")), Err(InkFileError::Io(_))));
}

#[test]
fn background_save_lands_on_disk() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bg.ink");
    let canvas = sample_canvas();
    let view = CanvasView::new(10, 10);
    let saver = AsyncSaver::new();
    assert!(saver.save(build_ink(&canvas, &view, &Brush::default(), &Brush::eraser(5)), path.clone()));
    saver.wait_idle();
    assert_eq!(saver.state(), SaveState::Idle);
    assert!(saver.take_last_error().is_none());
    assert_eq!(load_ink(&path).unwrap().canvas.stroke_count(), 7);
}

#[test]
fn failed_background_save_reports_an_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("no_such_dir").join("x.ink");
    let saver = AsyncSaver::new();
    let canvas = CanvasState::new();
    assert!(saver.save(build_ink(&canvas, &CanvasView::new(4, 4), &Brush::default(), &Brush::eraser(5)), path));
    saver.wait_idle();
    assert!(saver.take_last_error().is_some());
}

#[test]
fn out_of_range_records_are_skipped() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("far.ink");
    let mut canvas = CanvasState::new();
    let mut far = Stroke::new(Brush::new(4, [0, 0, 0], 1.0));
    far.push_point(v2l(0, 0), 1.0);
    far.push_point(v2l(1 << 50, 0), 1.0);
    canvas.commit_stroke(far);
    let mut huge = Stroke::new(Brush::new(1 << 40, [0, 0, 0], 1.0));
    huge.push_point(v2l(5, 5), 1.0);
    canvas.commit_stroke(huge);
    let mut dot = Stroke::new(Brush::new(6, [0, 0, 0], 1.0));
    dot.push_point(v2l(0, 0), 1.0);
    canvas.commit_stroke(dot.clone());
    save_ink(&canvas, &CanvasView::new(32, 32), &Brush::default(), &Brush::eraser(5), &path).unwrap();

    let loaded = load_ink(&path).unwrap();
    assert_eq!(loaded.skipped_strokes, 2);
    assert_eq!(loaded.canvas.stroke_count(), 1);

    let mut expected = CanvasState::new();
    expected.commit_stroke(dot);
    let view = CanvasView::new(32, 32).with_scale(1);
    assert_eq!(render(&loaded.canvas, &view), render(&expected, &view));
}
