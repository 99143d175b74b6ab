use inkfe::canvas::NO_PRESSURE_INFO;
use inkfe::geometry::v2i;
use inkfe::input::{BrushMode, InputFlags, InputFrame};
use inkfe::project::Project;
use inkfe::raster::{Framebuffer, Renderer};
use inkfe::settings::RenderSettings;
use tempfile::tempdir;

fn settings() -> RenderSettings {
    RenderSettings { single_threaded: true, block_width: 16, ..RenderSettings::default() }
}

fn session() -> Project {
    let mut p = Project::new_untitled(1, 80, 60, &settings()).unwrap();
    p.view.scale = 1;
    p.render_now().unwrap();
    p
}

fn fresh_render(p: &Project) -> Framebuffer {
    let mut renderer = Renderer::new(&settings()).unwrap();
    let mut fb = Framebuffer::new(80, 60, 0);
    renderer.render_full(&p.canvas, &p.view, &mut fb).unwrap();
    fb
}

fn scribble(p: &mut Project, y: i32) {
    let mut frame = InputFrame::new().with_flags(InputFlags::BEGIN_STROKE);
    for x in (5..75).step_by(7) {
        frame = frame.point(x, y + (x % 3), NO_PRESSURE_INFO);
    }
    p.handle_input(&frame).unwrap();
    p.handle_input(&InputFrame::new().with_flags(InputFlags::END_STROKE)).unwrap();
}

#[test]
fn incremental_updates_match_a_full_render() {
    let mut p = session();
    scribble(&mut p, 20);
    scribble(&mut p, 35);
    assert_eq!(p.canvas.stroke_count(), 2);
    assert_eq!(p.framebuffer, fresh_render(&p));

    p.handle_input(&InputFrame::new().with_flags(InputFlags::UNDO)).unwrap();
    assert_eq!(p.framebuffer, fresh_render(&p));
    p.handle_input(&InputFrame::new().with_flags(InputFlags::REDO)).unwrap();
    assert_eq!(p.canvas.stroke_count(), 2);
    assert_eq!(p.framebuffer, fresh_render(&p));
}

#[test]
fn panning_reuses_pixels() {
    let mut p = session();
    scribble(&mut p, 30);
    let report = p.handle_input(&InputFrame::new().pan(9, -4)).unwrap();
    assert_eq!(report.panned, v2i(9, -4));
    assert!(!report.full_redraw);
    assert_eq!(p.framebuffer, fresh_render(&p));
}

#[test]
fn erasing_in_eraser_mode() {
    let mut p = session();
    scribble(&mut p, 30);
    p.eraser.radius = 200;
    p.handle_input(&InputFrame::new().mode(BrushMode::Eraser).point(40, 30, 1.0)).unwrap();
    p.handle_input(&InputFrame::new().with_flags(InputFlags::END_STROKE)).unwrap();
    assert_eq!(p.mode, BrushMode::Eraser);
    assert!(p.framebuffer.pixels().iter().all(|&px| px == 0xFFFF_FFFF));
}

#[test]
fn zooming_refines_to_full_quality() {
    let mut p = session();
    scribble(&mut p, 30);
    let report = p.handle_input(&InputFrame::new().zoom(v2i(40, 30), -2)).unwrap();
    assert!(report.full_redraw);
    let mut frames = 0;
    while p.is_refining() {
        p.handle_input(&InputFrame::new()).unwrap();
        frames += 1;
        assert!(frames < 10);
    }
    assert_eq!(p.framebuffer, fresh_render(&p));
}

#[test]
fn saved_sessions_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("notes.ink");
    let mut p = session();
    scribble(&mut p, 10);
    scribble(&mut p, 40);
    assert!(p.display_title().ends_with('*'));

    assert!(p.save_async(path.clone()));
    p.wait_for_save();
    assert!(p.last_save_error().is_none());
    assert_eq!(p.display_title(), "notes.ink");

    let mut reopened = Project::open(&path, 80, 60, &settings()).unwrap();
    reopened.render_now().unwrap();
    assert_eq!(reopened.canvas.stroke_count(), 2);
    assert_eq!(reopened.view, p.view);
    assert_eq!(reopened.framebuffer, p.framebuffer);
}

#[test]
fn failed_saves_keep_the_document_dirty() {
    let dir = tempdir().unwrap();
    let mut p = session();
    scribble(&mut p, 10);

    assert!(p.save_async(dir.path().join("missing").join("notes.ink")));
    assert!(p.is_dirty);
    p.wait_for_save();
    assert!(p.last_save_error().is_some());
    assert!(p.is_dirty);
    assert!(p.display_title().ends_with('*'));

    assert!(p.save_async(dir.path().join("notes.ink")));
    p.wait_for_save();
    assert!(p.last_save_error().is_none());
    assert!(!p.is_dirty);
}

#[test]
fn edits_during_a_save_stay_dirty() {
    let dir = tempdir().unwrap();
    let mut p = session();
    scribble(&mut p, 10);
    assert!(p.save_async(dir.path().join("notes.ink")));
    scribble(&mut p, 30);
    p.wait_for_save();
    assert!(p.last_save_error().is_none());
    assert!(p.is_dirty);
}

#[test]
fn resizing_restarts_the_redraw() {
    let mut p = session();
    p.resize(100, 50);
    assert!(p.is_refining());
    assert_eq!(p.framebuffer.width(), 100);
    p.render_now().unwrap();
    assert!(!p.is_refining());
}
