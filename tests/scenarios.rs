// scenarios.rs — 端到端场景：只通过公开的引擎接口驱动

use glam::{Vec2, Vec3};
use image::RgbaImage;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use tour_viewer::collision::Collider;
use tour_viewer::config::{ViewerConfig, WalkableConfigDefaults};
use tour_viewer::camera::OrientationSample;
use tour_viewer::engine::{AlwaysGranted, Callbacks, LoadState, ViewState, ViewerEngine};
use tour_viewer::input::InputEvent;
use tour_viewer::panorama::PanoramaEngine;
use tour_viewer::texture_cache::{DeferredExecutor, MemoryImageLoader, TextureCache};
use tour_viewer::tour::{AngularPosition, FurnitureItem, InitialView, Point3, PrimitiveKind, WalkableConfig};
use tour_viewer::{Hotspot, HotspotType, Scene, SceneMode};

const W: f32 = 800.0;
const H: f32 = 600.0;
const DT: f32 = 1.0 / 60.0;

fn panorama_scene(hotspots: Vec<Hotspot>) -> Scene {
    Scene {
        id: "A".into(),
        name: "Scene A".into(),
        description: None,
        mode: SceneMode::Panorama,
        image_url: "a.jpg".into(),
        thumbnail: None,
        initial_view: Some(InitialView { yaw: 60.0, pitch: 0.0, fov: 75.0 }),
        walkable_config: None,
        hotspots,
    }
}

fn scene_b() -> Scene {
    Scene {
        id: "B".into(),
        name: "Scene B".into(),
        image_url: "b.jpg".into(),
        initial_view: Some(InitialView { yaw: 0.0, pitch: 0.0, fov: 75.0 }),
        ..panorama_scene(vec![])
    }
}

fn info_at(yaw: f32) -> Hotspot {
    let mut h = Hotspot::new("note", HotspotType::Info);
    h.position = Some(AngularPosition { yaw, pitch: 0.0 });
    h
}

fn nav_to_b() -> Hotspot {
    let mut h = Hotspot::new("to-b", HotspotType::Navigation);
    h.position = Some(AngularPosition { yaw: 90.0, pitch: 0.0 });
    h.target_scene = Some("B".into());
    h
}

fn engine(exec: &DeferredExecutor) -> PanoramaEngine {
    let loader = MemoryImageLoader::new()
        .with("a.jpg", RgbaImage::new(16, 8))
        .with("b.jpg", RgbaImage::new(16, 8));
    let cache = TextureCache::new(Arc::new(loader), Rc::new(exec.clone()));
    let mut e = PanoramaEngine::new(&ViewerConfig::default(), cache);
    e.handle_event(InputEvent::Resize { width: W, height: H });
    e
}

/// 预先加载好纹理再进入场景
fn loaded(exec: &DeferredExecutor, scene: &Scene) -> PanoramaEngine {
    let mut e = engine(exec);
    let handle = e.load_scene(scene, false);
    exec.run_pending();
    e.tick(DT);
    assert!(handle.is_ready());
    e
}

fn yaw_pitch(e: &PanoramaEngine) -> (f32, f32) {
    match e.view_state() {
        ViewState::Panorama { yaw, pitch, .. } => (yaw, pitch),
        other => panic!("unexpected view state {:?}", other),
    }
}

fn to_pixels(ndc: Vec2) -> (f32, f32) {
    ((ndc.x + 1.0) * 0.5 * W, (1.0 - ndc.y) * 0.5 * H)
}

/// Surface pixel of the first marker on screen.
fn marker_pixel(e: &mut PanoramaEngine) -> (f32, f32) {
    let frame = e.tick(DT).unwrap();
    let marker = frame.markers.first().copied().unwrap();
    to_pixels(frame.camera.project(marker.position).unwrap())
}

fn clicked_ids(e: &mut PanoramaEngine) -> Rc<RefCell<Vec<String>>> {
    let ids = Rc::new(RefCell::new(Vec::<String>::new()));
    let sink = Rc::clone(&ids);
    e.set_callbacks(Callbacks::new().on_click(move |h| sink.borrow_mut().push(h.id.clone())));
    ids
}

fn drag(e: &mut PanoramaEngine, from: (f32, f32), to: (f32, f32), steps: usize) {
    e.handle_event(InputEvent::PointerDown { x: from.0, y: from.1 });
    for i in 1..=steps {
        let t = i as f32 / steps as f32;
        e.handle_event(InputEvent::PointerMove {
            x: from.0 + (to.0 - from.0) * t,
            y: from.1 + (to.1 - from.1) * t,
        });
        e.tick(DT);
    }
    e.handle_event(InputEvent::PointerUp { x: to.0, y: to.1 });
}

#[test]
fn navigation_click_dollies_then_fires_once() {
    let exec = DeferredExecutor::new();
    let mut e = loaded(&exec, &panorama_scene(vec![nav_to_b()]));

    let clicks = Rc::new(RefCell::new(Vec::<String>::new()));
    let sink = Rc::clone(&clicks);
    e.set_callbacks(Callbacks::new().on_click(move |h| {
        sink.borrow_mut().push(h.target_scene.clone().unwrap_or_default());
    }));

    let frame = e.tick(DT).unwrap();
    let marker = frame.markers.first().copied().unwrap();
    let (x, y) = to_pixels(frame.camera.project(marker.position).unwrap());

    e.handle_event(InputEvent::PointerDown { x, y });
    e.handle_event(InputEvent::PointerUp { x, y });
    e.tick(DT);
    let frame = e.tick(DT).unwrap();
    assert!(frame.opacity < 1.0, "dolly fades the panorama out");
    assert!(clicks.borrow().is_empty());

    for _ in 0..90 {
        e.tick(DT);
    }
    assert_eq!(*clicks.borrow(), vec!["B".to_string()]);
    let (yaw, _) = yaw_pitch(&e);
    assert!((yaw - 90.0).abs() < 1.0);
}

#[test]
fn screen_stays_dark_until_next_scene_is_ready() {
    let exec = DeferredExecutor::new();
    let mut e = loaded(&exec, &panorama_scene(vec![nav_to_b()]));
    let ids = clicked_ids(&mut e);
    let (x, y) = marker_pixel(&mut e);
    e.handle_event(InputEvent::PointerDown { x, y });
    e.handle_event(InputEvent::PointerUp { x, y });
    for _ in 0..120 {
        e.tick(DT);
        if !ids.borrow().is_empty() {
            break;
        }
    }
    assert_eq!(ids.borrow().len(), 1);

    let handle = e.load_scene(&scene_b(), true);
    assert!(handle.is_pending());
    for _ in 0..30 {
        let frame = e.tick(DT).unwrap();
        assert_eq!(frame.opacity, 0.0, "old scene must not reappear while B decodes");
    }

    exec.run_pending();
    let frame = e.tick(DT).unwrap();
    assert!(handle.is_ready());
    assert!(frame.opacity > 0.0 && frame.opacity < 0.1);
    assert!(matches!(e.view_state(), ViewState::Panorama { fov, .. } if (fov - 75.0).abs() < 1e-3));
    for _ in 0..60 {
        e.tick(DT);
    }
    assert_eq!(e.tick(DT).unwrap().opacity, 1.0);
}

#[test]
fn sofa_blocks_but_parallel_path_is_clear() {
    let sofa = FurnitureItem {
        id: Some("sofa".into()),
        kind: PrimitiveKind::Box,
        position: Point3::new(3.0, 0.4, -1.0),
        rotation: None,
        scale: Point3::new(2.4, 0.8, 0.9),
        color: "#555555".into(),
        emissive: None,
        label: None,
        collision: None,
    };
    let room = WalkableConfig {
        room_width: 10.0,
        room_depth: 8.0,
        room_height: 3.0,
        wall_color: "#e8e0d8".into(),
        floor_color: "#8b7355".into(),
        ceiling_color: "#f5f5f5".into(),
        spawn_position: Point3::new(0.0, 1.7, 2.0),
        spawn_look_at: Point3::new(0.0, 1.7, 0.0),
        furniture: vec![sofa],
        lights: Vec::new(),
    };
    let c = Collider::new(&room, &WalkableConfigDefaults::default());

    let start = Vec3::new(3.0, 1.7, 0.5);
    let into_sofa = Vec3::new(3.0, 1.7, -0.6);
    assert!(!c.is_position_valid(into_sofa));
    assert_eq!(c.resolve_move(start, into_sofa), start);

    let beside = start + Vec3::new(-3.0, 0.0, 0.0);
    let along = beside + Vec3::new(0.0, 0.0, -1.1);
    assert!(c.is_position_valid(along));
    assert_eq!(c.resolve_move(beside, along), along);
}

#[test]
fn dispose_during_load_is_silent() {
    let exec = DeferredExecutor::new();
    let mut e = engine(&exec);
    let fired = Rc::new(RefCell::new(0));
    let f = Rc::clone(&fired);
    let g = Rc::clone(&fired);
    e.set_callbacks(
        Callbacks::new()
            .on_view(move |_, _, _| *f.borrow_mut() += 1)
            .on_click(move |_| *g.borrow_mut() += 1),
    );

    let handle = e.load_scene(&panorama_scene(vec![nav_to_b()]), true);
    assert!(handle.is_pending());
    e.dispose();
    assert_eq!(handle.state(), LoadState::Cancelled);

    exec.run_pending();
    assert!(e.tick(DT).is_none());
    e.dispose();
    assert_eq!(*fired.borrow(), 0);
    assert!(e.is_disposed());
}

#[test]
fn gyro_recalibrates_after_toggle() {
    let exec = DeferredExecutor::new();
    let mut scene = panorama_scene(vec![]);
    scene.initial_view = Some(InitialView { yaw: 0.0, pitch: 0.0, fov: 75.0 });
    let mut e = loaded(&exec, &scene);
    let sample = |alpha: f32| InputEvent::Orientation(OrientationSample { alpha, beta: 90.0, gamma: 0.0 });

    let controls = e.panorama_controls().unwrap();
    controls.set_gyro_enabled(true, &mut AlwaysGranted);
    e.handle_event(sample(10.0));
    e.tick(DT);

    let controls = e.panorama_controls().unwrap();
    controls.set_gyro_enabled(false, &mut AlwaysGranted);
    controls.set_gyro_enabled(true, &mut AlwaysGranted);
    e.handle_event(sample(200.0));
    for _ in 0..120 {
        e.tick(DT);
    }
    let (yaw, _) = yaw_pitch(&e);
    assert!(yaw.abs() < 1e-3, "first sample after re-enable must not jump, got {}", yaw);

    e.handle_event(sample(210.0));
    for _ in 0..600 {
        e.tick(DT);
    }
    let (yaw, _) = yaw_pitch(&e);
    assert!((yaw + 10.0).abs() < 0.5, "heading change of 10 turns the view, got {}", yaw);
}

#[test]
fn wiggle_clicks_hotspot_but_drag_does_not() {
    let exec = DeferredExecutor::new();
    let mut e = loaded(&exec, &panorama_scene(vec![info_at(60.0)]));
    let ids = clicked_ids(&mut e);
    let before = yaw_pitch(&e);
    let (x, y) = marker_pixel(&mut e);

    e.handle_event(InputEvent::PointerDown { x, y });
    e.handle_event(InputEvent::PointerMove { x: x + 3.0, y: y + 1.0 });
    e.handle_event(InputEvent::PointerUp { x: x + 3.0, y: y + 1.0 });
    for _ in 0..30 {
        e.tick(DT);
    }
    assert_eq!(*ids.borrow(), vec!["note".to_string()]);
    assert_eq!(yaw_pitch(&e), before);

    drag(&mut e, (x, y), (x - 200.0, y), 10);
    for _ in 0..30 {
        e.tick(DT);
    }
    assert_eq!(ids.borrow().len(), 1, "a drag must not activate");
    assert_ne!(yaw_pitch(&e).0, before.0);
}

#[test]
fn tap_clicks_hotspot_but_swipe_does_not() {
    let exec = DeferredExecutor::new();
    let mut e = loaded(&exec, &panorama_scene(vec![info_at(60.0)]));
    let ids = clicked_ids(&mut e);
    let (x, y) = marker_pixel(&mut e);

    e.handle_event(InputEvent::TouchStart { id: 7, x, y });
    e.handle_event(InputEvent::TouchEnd { id: 7, x, y });
    e.tick(DT);
    assert_eq!(*ids.borrow(), vec!["note".to_string()]);

    let before = yaw_pitch(&e);
    e.handle_event(InputEvent::TouchStart { id: 8, x, y });
    for i in 1..=10 {
        e.handle_event(InputEvent::TouchMove { id: 8, x: x - 20.0 * i as f32, y });
        e.tick(DT);
    }
    e.handle_event(InputEvent::TouchEnd { id: 8, x: x - 200.0, y });
    for _ in 0..30 {
        e.tick(DT);
    }
    assert_eq!(ids.borrow().len(), 1, "a swipe must not activate");
    assert_ne!(yaw_pitch(&e).0, before.0);
}

#[test]
fn pitch_reaches_but_never_passes_limits() {
    let exec = DeferredExecutor::new();
    let mut e = loaded(&exec, &panorama_scene(vec![]));
    // 75° 视场下一次拖满整个高度约 87°，两次必然顶到上限
    for (from, to, limit) in [(10.0, 590.0, 85.0f32), (590.0, 10.0, -85.0)] {
        for _ in 0..2 {
            drag(&mut e, (400.0, from), (400.0, to), 20);
            for _ in 0..200 {
                e.tick(DT);
                let (_, pitch) = yaw_pitch(&e);
                assert!((-85.0..=85.0).contains(&pitch), "pitch {}", pitch);
            }
        }
        let (_, pitch) = yaw_pitch(&e);
        assert!((pitch - limit).abs() < 0.01, "expected {} got {}", limit, pitch);
    }

    e.set_view(0.0, 400.0, None);
    for _ in 0..200 {
        e.tick(DT);
    }
    assert!((yaw_pitch(&e).1 - 85.0).abs() < 0.01);
}
