use inkfe::canvas::{Brush, CanvasState, CanvasView, Stroke};
use inkfe::geometry::v2l;
use inkfe::raster::{Framebuffer, Renderer};
use inkfe::settings::RenderSettings;

fn render(canvas: &CanvasState) -> Framebuffer {
    let settings = RenderSettings { single_threaded: true, ..RenderSettings::default() };
    let mut renderer = Renderer::new(&settings).unwrap();
    let view = CanvasView::new(96, 64).with_scale(1);
    let mut fb = Framebuffer::new(96, 64, 0);
    renderer.render_full(canvas, &view, &mut fb).unwrap();
    fb
}

fn snapshot(canvas: &CanvasState) -> Vec<Vec<Stroke>> {
    canvas.layers.iter().map(|l| l.strokes().to_vec()).collect()
}

fn line(i: i64) -> Stroke {
    let mut s = Stroke::new(Brush::new(3 + i % 4, [(i * 30) as u8, 60, 200], 0.9));
    s.push_point(v2l(-40 + i * 6, -25), 1.0);
    s.push_point(v2l(-30 + i * 5, 25), 0.5);
    s
}

/// Strokes alternate between two layers.
fn painted(n: i64) -> CanvasState {
    let mut canvas = CanvasState::new();
    let top = canvas.layers.new_layer(Some("Top".into()));
    for i in 0..n {
        canvas.layers.set_working(if i % 2 == 0 { 0 } else { top });
        canvas.commit_stroke(line(i));
    }
    canvas
}

#[test]
fn undo_then_redo_is_the_identity() {
    let mut canvas = painted(10);
    let before = render(&canvas);
    let strokes = snapshot(&canvas);
    for k in 1..=10 {
        for _ in 0..k {
            assert!(canvas.undo().is_some());
        }
        for _ in 0..k {
            assert!(canvas.redo().is_some());
        }
        assert_eq!(snapshot(&canvas), strokes, "after {} undos", k);
        assert_eq!(render(&canvas), before, "after {} undos", k);
    }
}

#[test]
fn undo_removes_the_newest_stroke_across_layers() {
    let mut canvas = painted(6);
    canvas.undo();
    canvas.undo();
    assert_eq!(render(&canvas), render(&painted(4)));
    assert_eq!(canvas.history.graveyard_len(), 2);
}

#[test]
fn undo_past_the_start_is_a_no_op() {
    let mut canvas = painted(2);
    assert!(canvas.undo().is_some());
    assert!(canvas.undo().is_some());
    assert!(canvas.undo().is_none());
    assert_eq!(canvas.stroke_count(), 0);
    assert!(canvas.redo().is_some());
    assert_eq!(canvas.stroke_count(), 1);
}

#[test]
fn committing_discards_redo() {
    let mut canvas = painted(3);
    canvas.undo();
    assert!(canvas.history.can_redo());
    canvas.commit_stroke(line(9));
    assert!(!canvas.history.can_redo());
    assert!(canvas.redo().is_none());
    assert_eq!(canvas.stroke_count(), 3);
}

#[test]
fn undo_skips_removed_layers() {
    let mut canvas = painted(4);
    let top = canvas.layers.topmost().id;
    canvas.layers.remove_layer(top).unwrap();
    assert_eq!(canvas.stroke_count(), 2);
    assert!(canvas.undo().is_some());
    assert_eq!(canvas.stroke_count(), 1);
    assert!(!canvas.validate());
}

#[test]
fn broken_history_is_rebuilt() {
    let mut canvas = painted(5);
    canvas.history = Default::default();
    assert!(canvas.validate());
    assert_eq!(canvas.history.len(), 5);
    let before = render(&canvas);
    canvas.undo();
    canvas.redo();
    assert_eq!(render(&canvas), before);
}

#[test]
fn locked_and_hidden_layers_refuse_strokes() {
    let mut canvas = CanvasState::new();
    let id = canvas.layers.working_layer_id();
    canvas.layers.set_locked(id, true);
    assert!(canvas.commit_stroke(line(0)).is_none());
    canvas.layers.set_locked(id, false);
    canvas.layers.toggle_visibility(id);
    assert!(canvas.commit_stroke(line(0)).is_none());
    assert_eq!(canvas.history.len(), 0);
}
