// walkable.rs — 漫游模式引擎：第一人称房间，WASD/方向键移动，拖拽转视角，点击热点/瞬移
//
// 与全景模式同样的每帧顺序；状态推进同样是纯函数 WalkableState::step

use crate::camera::{CameraFrame, MoveKeys, WalkCamera};
use crate::collision::Collider;
use crate::config::{ViewerConfig, WalkableConfigDefaults};
use crate::engine::{
    Background, Callbacks, EngineEffect, MarkerSprite, RenderFrame, SceneLoad, ViewState, ViewerEngine,
    WalkableControls,
};
use crate::geometry::pointer_to_ndc;
use crate::input::{DragTracker, InputBindings, InputEvent, InputQueue, Key, PointerKind, Release, TouchSet};
use crate::markers::MarkerStyle;
use crate::mesh::{build_room, RoomMesh};
use crate::picking::MarkerSet;
use crate::tour::{Hotspot, Point3, Scene, SceneMode};
use crate::transition::{Fade, Teleport};
use glam::{Vec2, Vec3};
use std::rc::Rc;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct WalkableState {
    pub camera: WalkCamera,
    pub keys: MoveKeys,
    pub scene: Option<Rc<Scene>>,
    pub room: Option<Arc<RoomMesh>>,
    pub collider: Collider,
    pub markers: MarkerSet,
    pub fade: Fade,
    pub teleport: Option<Teleport>,
    pub hovered: Option<usize>,
    pub elapsed: f32,
    pub viewport: Vec2,
    drag: DragTracker,
    touches: TouchSet,
    pointer: Option<Vec2>,
    last_reported: Option<(f32, f32)>,
}

fn marker_style(cfg: &WalkableConfigDefaults) -> MarkerStyle {
    MarkerStyle {
        icon_size: cfg.icon_size,
        ring_size: cfg.ring_size,
        float_amplitude: cfg.float_amplitude,
    }
}

impl WalkableState {
    pub fn new(cfg: &WalkableConfigDefaults) -> Self {
        Self {
            camera: WalkCamera::new(Vec3::new(0.0, cfg.player_height, 0.0)),
            keys: MoveKeys::default(),
            scene: None,
            room: None,
            collider: Collider::unbounded(cfg),
            markers: MarkerSet::new(),
            fade: Fade::visible(),
            teleport: None,
            hovered: None,
            elapsed: 0.0,
            viewport: Vec2::ZERO,
            drag: DragTracker::new(cfg.mouse_drag_threshold, cfg.touch_tap_threshold),
            touches: TouchSet::default(),
            pointer: None,
            last_reported: None,
        }
    }

    pub fn hotspots(&self) -> &[Hotspot] {
        self.scene.as_deref().map(|s| s.hotspots.as_slice()).unwrap_or(&[])
    }

    /// Builds the room for `scene`. Without a room description nothing is
    /// built and the scene stays empty.
    pub fn with_scene(mut self, scene: Rc<Scene>, transition: bool, cfg: &WalkableConfigDefaults) -> (Self, Vec<EngineEffect>) {
        let mut effects = Vec::new();
        if self.hovered.take().is_some() {
            effects.push(EngineEffect::Hover(None));
        }
        self.teleport = None;
        self.drag.cancel();
        self.camera.velocity = Vec3::ZERO;

        match &scene.walkable_config {
            Some(room) => {
                self.room = Some(Arc::new(build_room(room)));
                self.collider = Collider::new(room, cfg);
                self.markers = MarkerSet::for_walkable(&scene.hotspots, &marker_style(cfg));
                let spawn: Vec3 = room.spawn_position.into();
                self.camera.position = Vec3::new(spawn.x, cfg.player_height, spawn.z);
                self.camera.look_at(room.spawn_look_at.into());
                log::debug!(
                    "room {} built: {} furniture, {} colliders, {} markers",
                    scene.id,
                    room.furniture.len(),
                    self.collider.boxes().len(),
                    self.markers.len()
                );
            }
            None => {
                log::warn!("scene {} is walkable but has no room description", scene.id);
                self.room = None;
                self.collider = Collider::unbounded(cfg);
                self.markers.clear();
            }
        }
        self.fade = if transition { Fade::start(cfg.fade_rate) } else { Fade::visible() };
        self.scene = Some(scene);
        (self, effects)
    }

    pub fn unload(&mut self) {
        self.scene = None;
        self.room = None;
        self.markers.clear();
        self.teleport = None;
        self.hovered = None;
        self.keys = MoveKeys::default();
        self.drag.cancel();
        self.touches.clear();
    }

    pub fn start_teleport(&mut self, target: Vec3, cfg: &WalkableConfigDefaults) {
        self.camera.velocity = Vec3::ZERO;
        self.teleport = Some(Teleport::new(self.camera.position, target, cfg.player_height, cfg.teleport_duration));
    }

    fn aspect(&self) -> f32 {
        if self.viewport.x > 0.0 && self.viewport.y > 0.0 {
            self.viewport.x / self.viewport.y
        } else {
            1.0
        }
    }

    pub fn camera_frame(&self, cfg: &WalkableConfigDefaults) -> CameraFrame {
        self.camera.frame(cfg.fov, self.aspect())
    }

    pub fn pick_at(&self, p: Vec2, cfg: &WalkableConfigDefaults) -> Option<usize> {
        if self.viewport.x <= 0.0 || self.viewport.y <= 0.0 {
            return None;
        }
        let frame = self.camera_frame(cfg);
        let ndc = pointer_to_ndc(p.x, p.y, self.viewport.x, self.viewport.y);
        self.markers.pick(&frame.ray_through(ndc), frame.right, frame.up)
    }

    pub fn step(mut self, events: &[InputEvent], dt: f32, cfg: &WalkableConfigDefaults) -> (Self, Vec<EngineEffect>) {
        let dt = dt.clamp(0.0, cfg.max_frame_dt);
        let mut effects = Vec::new();
        let mut clicks = Vec::new();
        self.elapsed += dt;

        for event in events {
            self.apply_input(event, cfg, &mut clicks);
        }

        // 移动 / 瞬移
        if let Some(tp) = self.teleport.as_mut() {
            let (pos, done) = tp.advance(dt);
            self.camera.position = pos;
            if done {
                self.teleport = None;
                effects.push(EngineEffect::TeleportComplete(pos));
            }
        } else {
            let proposed = self.camera.propose_move(self.keys, dt, cfg);
            if proposed != self.camera.position {
                let next = self.collider.resolve_move(self.camera.position, proposed);
                self.camera.position = Vec3::new(next.x, cfg.player_height, next.z);
            }
        }

        self.fade.advance(dt);
        self.markers.animate(self.elapsed);

        let mut activations = Vec::new();
        for p in &clicks {
            activations.extend(self.pick_at(*p, cfg));
        }
        let hover_now = match self.pointer {
            Some(p) if !self.drag.has_moved() => self.pick_at(p, cfg),
            _ => None,
        };
        if hover_now != self.hovered {
            self.hovered = hover_now;
            effects.push(EngineEffect::Hover(hover_now));
        }
        for idx in activations {
            let teleport_to = self
                .hotspots()
                .get(idx)
                .filter(|h| h.is_in_room_teleport())
                .and_then(|h| h.teleport_to);
            match teleport_to {
                Some(target) => self.start_teleport(target.into(), cfg),
                None => effects.push(EngineEffect::Activate(idx)),
            }
        }

        let now = (self.camera.yaw_degrees(), self.camera.pitch_degrees());
        let changed = match self.last_reported {
            None => true,
            Some((y, p)) => (y - now.0).abs() > 1e-3 || (p - now.1).abs() > 1e-3,
        };
        if changed {
            self.last_reported = Some(now);
            effects.push(EngineEffect::ViewChanged {
                yaw: now.0,
                pitch: now.1,
                fov: cfg.fov,
            });
        }

        (self, effects)
    }

    fn set_key(&mut self, key: Key, down: bool) {
        match key {
            Key::W | Key::ArrowUp => self.keys.forward = down,
            Key::S | Key::ArrowDown => self.keys.backward = down,
            Key::A | Key::ArrowLeft => self.keys.left = down,
            Key::D | Key::ArrowRight => self.keys.right = down,
            Key::Other => {}
        }
    }

    fn apply_input(&mut self, event: &InputEvent, cfg: &WalkableConfigDefaults, clicks: &mut Vec<Vec2>) {
        match *event {
            InputEvent::PointerDown { x, y } => {
                if !self.drag.is_active() {
                    self.drag.press(Vec2::new(x, y), PointerKind::Mouse, self.elapsed);
                }
            }
            InputEvent::PointerMove { x, y } => {
                let p = Vec2::new(x, y);
                self.pointer = Some(p);
                if self.drag.kind() == Some(PointerKind::Mouse) {
                    if let Some(look) = self.drag.motion(p) {
                        self.camera.rotate(look.step.x * cfg.mouse_sensitivity, look.step.y * cfg.mouse_sensitivity);
                    }
                }
            }
            InputEvent::PointerUp { x, y } => {
                if self.drag.kind() == Some(PointerKind::Mouse) {
                    if let Release::Click { position, .. } = self.drag.release(Vec2::new(x, y), self.elapsed) {
                        clicks.push(position);
                    }
                }
            }
            InputEvent::PointerLeave => {
                // 鼠标离开画布即结束拖拽
                self.pointer = None;
                if self.drag.kind() == Some(PointerKind::Mouse) {
                    self.drag.cancel();
                }
            }
            InputEvent::TouchStart { id, x, y } => {
                if self.touches.start(id, Vec2::new(x, y)) == 1 {
                    self.drag.press(Vec2::new(x, y), PointerKind::Touch, self.elapsed);
                } else {
                    self.drag.cancel();
                }
            }
            InputEvent::TouchMove { id, x, y } => {
                self.touches.update(id, Vec2::new(x, y));
                if self.touches.len() == 1 && self.drag.kind() == Some(PointerKind::Touch) {
                    if let Some(look) = self.drag.motion(Vec2::new(x, y)) {
                        self.camera.rotate(look.step.x * cfg.touch_sensitivity, look.step.y * cfg.touch_sensitivity);
                    }
                }
            }
            InputEvent::TouchEnd { id, x, y } => {
                let remaining = self.touches.end(id);
                if remaining == 0 && self.drag.kind() == Some(PointerKind::Touch) {
                    if let Release::Click { position, held } = self.drag.release(Vec2::new(x, y), self.elapsed) {
                        if held < cfg.tap_max_duration {
                            clicks.push(position);
                        }
                    }
                }
            }
            InputEvent::KeyDown(key) => self.set_key(key, true),
            InputEvent::KeyUp(key) => self.set_key(key, false),
            InputEvent::FocusLost => {
                self.keys = MoveKeys::default();
                self.drag.cancel();
                self.touches.clear();
            }
            InputEvent::Resize { width, height } => self.viewport = Vec2::new(width, height),
            InputEvent::Wheel { .. }
            | InputEvent::Orientation(_)
            | InputEvent::OrientationPermission(_)
            | InputEvent::XrFrame(_)
            | InputEvent::XrSelect { .. } => {}
        }
    }

    pub fn render_frame(&self, cfg: &WalkableConfigDefaults) -> RenderFrame {
        let markers = self
            .markers
            .markers()
            .iter()
            .map(|m| MarkerSprite {
                hotspot_index: m.hotspot_index,
                position: m.position,
                size: m.size * m.pulse,
                glyph: m.glyph,
                tint: m.tint,
                hovered: self.hovered == Some(m.hotspot_index),
                dwell: 0.0,
            })
            .collect();
        RenderFrame {
            camera: self.camera_frame(cfg),
            background: match &self.room {
                Some(room) => Background::Room(Arc::clone(room)),
                None => Background::Empty,
            },
            opacity: self.fade.opacity(),
            markers,
            markers_depth_tested: true,
            in_xr: false,
        }
    }
}

// ---------------------------------------------------------------------------

pub struct WalkableEngine {
    config: WalkableConfigDefaults,
    state: WalkableState,
    queue: InputQueue,
    bindings: InputBindings,
    callbacks: Callbacks,
    deferred: Vec<EngineEffect>,
    disposed: bool,
}

impl WalkableEngine {
    pub fn new(config: &ViewerConfig) -> Self {
        Self {
            config: config.walkable.clone(),
            state: WalkableState::new(&config.walkable),
            queue: InputQueue::default(),
            bindings: InputBindings::standard(),
            callbacks: Callbacks::default(),
            deferred: Vec::new(),
            disposed: false,
        }
    }

    pub fn state(&self) -> &WalkableState {
        &self.state
    }
}

impl ViewerEngine for WalkableEngine {
    fn mode(&self) -> SceneMode {
        SceneMode::Walkable
    }

    /// 房间是程序生成的，没有要等待的资源，句柄立即就绪
    fn load_scene(&mut self, scene: &Scene, transition: bool) -> SceneLoad {
        if self.disposed {
            return SceneLoad::cancelled(&scene.id);
        }
        log::info!("loading walkable scene {}", scene.id);
        let state = std::mem::replace(&mut self.state, WalkableState::new(&self.config));
        let (state, effects) = state.with_scene(Rc::new(scene.clone()), transition, &self.config);
        self.state = state;
        self.deferred.extend(effects);
        SceneLoad::ready(&scene.id)
    }

    fn set_callbacks(&mut self, callbacks: Callbacks) {
        self.callbacks.merge(callbacks);
    }

    fn preload_texture(&mut self, url: &str) {
        log::debug!("walkable engine has no texture cache, ignoring preload of {}", url);
    }

    fn set_view(&mut self, yaw: f32, pitch: f32, _fov: Option<f32>) {
        self.state.camera.set_look_degrees(yaw, pitch);
    }

    fn handle_event(&mut self, event: InputEvent) {
        if self.disposed || !self.bindings.accepts(&event) {
            return;
        }
        if let InputEvent::Resize { width, height } = event {
            self.bindings.set_viewport(width, height);
        }
        self.queue.push(event);
    }

    fn tick(&mut self, dt: f32) -> Option<RenderFrame> {
        if self.disposed {
            return None;
        }
        let events = self.queue.drain();
        let state = std::mem::replace(&mut self.state, WalkableState::new(&self.config));
        let (state, effects) = state.step(&events, dt, &self.config);
        self.state = state;

        let mut all = std::mem::take(&mut self.deferred);
        all.extend(effects);
        let frame = self.state.render_frame(&self.config);
        self.callbacks.dispatch(self.state.hotspots(), &all);
        Some(frame)
    }

    fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.bindings.clear();
        self.queue.clear();
        self.state.unload();
        self.deferred.clear();
        log::debug!("walkable engine disposed");
    }

    fn is_disposed(&self) -> bool {
        self.disposed
    }

    fn view_state(&self) -> ViewState {
        ViewState::Walkable {
            position: self.state.camera.position,
            orientation: self.state.camera.orientation(),
            yaw: self.state.camera.yaw_degrees(),
            pitch: self.state.camera.pitch_degrees(),
        }
    }

    fn hotspot_at(&self, x: f32, y: f32) -> Option<Hotspot> {
        let idx = self.state.pick_at(Vec2::new(x, y), &self.config)?;
        self.state.hotspots().get(idx).cloned()
    }

    fn walkable_controls(&mut self) -> Option<&mut dyn WalkableControls> {
        Some(self)
    }
}

impl WalkableControls for WalkableEngine {
    fn teleport_to_position(&mut self, target: Point3) {
        if !self.disposed {
            self.state.start_teleport(target.into(), &self.config);
        }
    }

    fn position(&self) -> Vec3 {
        self.state.camera.position
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tour::{FurnitureItem, HotspotType, PrimitiveKind, WalkableConfig};

    fn room_scene(hotspots: Vec<Hotspot>) -> Rc<Scene> {
        Rc::new(Scene {
            id: "room".into(),
            name: "Room".into(),
            description: None,
            mode: SceneMode::Walkable,
            image_url: String::new(),
            thumbnail: None,
            initial_view: None,
            walkable_config: Some(WalkableConfig {
                room_width: 10.0,
                room_depth: 8.0,
                room_height: 3.0,
                wall_color: "#e8e0d8".into(),
                floor_color: "#8b7355".into(),
                ceiling_color: "#f5f5f5".into(),
                spawn_position: Point3::new(0.0, 1.7, 2.0),
                spawn_look_at: Point3::new(0.0, 1.7, 0.0),
                furniture: vec![FurnitureItem {
                    id: Some("sofa".into()),
                    kind: PrimitiveKind::Box,
                    position: Point3::new(3.0, 0.4, -1.0),
                    rotation: None,
                    scale: Point3::new(2.4, 0.8, 0.9),
                    color: "#555555".into(),
                    emissive: None,
                    label: None,
                    collision: None,
                }],
                lights: Vec::new(),
            }),
            hotspots,
        })
    }

    fn loaded(hotspots: Vec<Hotspot>) -> WalkableState {
        let cfg = WalkableConfigDefaults::default();
        let mut s = WalkableState::new(&cfg);
        s.viewport = Vec2::new(800.0, 600.0);
        s.with_scene(room_scene(hotspots), false, &cfg).0
    }

    #[test]
    fn spawns_at_eye_height_facing_look_at() {
        let s = loaded(vec![]);
        assert_eq!(s.camera.position, Vec3::new(0.0, 1.7, 2.0));
        assert!((s.camera.forward() - Vec3::NEG_Z).length() < 1e-5);
    }

    #[test]
    fn holding_w_walks_forward_and_keeps_height() {
        let cfg = WalkableConfigDefaults::default();
        let mut s = loaded(vec![]);
        s = s.step(&[InputEvent::KeyDown(Key::W)], 1.0 / 60.0, &cfg).0;
        for _ in 0..10 {
            s = s.step(&[], 1.0 / 60.0, &cfg).0;
        }
        assert!(s.camera.position.z < 2.0);
        assert_eq!(s.camera.position.y, 1.7);
        let z = s.camera.position.z;
        // 松键后惯性滑行一段
        s = s.step(&[InputEvent::KeyUp(Key::W)], 1.0 / 60.0, &cfg).0;
        assert!(s.camera.position.z < z);
    }

    #[test]
    fn walls_stop_the_player() {
        let cfg = WalkableConfigDefaults::default();
        let mut s = loaded(vec![]);
        s = s.step(&[InputEvent::KeyDown(Key::ArrowUp)], 0.05, &cfg).0;
        for _ in 0..400 {
            s = s.step(&[], 0.05, &cfg).0;
        }
        assert!(s.camera.position.z >= -3.7 - 1e-4);
    }

    #[test]
    fn long_frames_are_clamped() {
        let cfg = WalkableConfigDefaults::default();
        let s = loaded(vec![]);
        let s = s.step(&[], 5.0, &cfg).0;
        assert!((s.elapsed - cfg.max_frame_dt).abs() < 1e-6);
    }

    #[test]
    fn slow_tap_is_not_a_click() {
        let mut h = Hotspot::new("i", HotspotType::Info);
        h.position3d = Some(Point3::new(0.0, 1.7, -1.0));
        let cfg = WalkableConfigDefaults::default();
        let s = loaded(vec![h]);
        let (s, _) = s.step(&[InputEvent::TouchStart { id: 1, x: 400.0, y: 300.0 }], 0.05, &cfg);
        let (s, _) = s.step(&[], 0.1, &cfg);
        let (s, _) = s.step(&[], 0.1, &cfg);
        let (s, _) = s.step(&[], 0.1, &cfg);
        let (_, fx) = s.step(&[InputEvent::TouchEnd { id: 1, x: 400.0, y: 300.0 }], 0.1, &cfg);
        assert!(!fx.iter().any(|e| matches!(e, EngineEffect::Activate(_))));
    }

    #[test]
    fn in_room_teleport_glides_then_reports() {
        let mut h = Hotspot::new("tp", HotspotType::Navigation);
        h.position3d = Some(Point3::new(0.0, 0.05, -1.0));
        h.teleport_to = Some(Point3::new(-2.0, 0.0, -2.0));
        let cfg = WalkableConfigDefaults::default();
        let s = loaded(vec![h]);
        let frame = s.camera_frame(&cfg);
        let ndc = frame.project(Vec3::new(0.0, 0.05, -1.0)).unwrap();
        let (px, py) = ((ndc.x + 1.0) * 400.0, (1.0 - ndc.y) * 300.0);

        let (mut s, fx) = s.step(
            &[InputEvent::PointerDown { x: px, y: py }, InputEvent::PointerUp { x: px, y: py }],
            0.0,
            &cfg,
        );
        assert!(!fx.iter().any(|e| matches!(e, EngineEffect::Activate(_))));
        assert!(s.teleport.is_some());

        let mut done = Vec::new();
        for _ in 0..10 {
            let (n, fx) = s.step(&[], 0.05, &cfg);
            s = n;
            done.extend(fx.into_iter().filter(|e| matches!(e, EngineEffect::TeleportComplete(_))));
        }
        assert_eq!(done, vec![EngineEffect::TeleportComplete(Vec3::new(-2.0, 1.7, -2.0))]);
    }

    #[test]
    fn missing_room_builds_nothing() {
        let cfg = WalkableConfigDefaults::default();
        let mut bare = (*room_scene(vec![])).clone();
        bare.walkable_config = None;
        let (s, _) = WalkableState::new(&cfg).with_scene(Rc::new(bare), true, &cfg);
        assert!(s.room.is_none());
        assert!(matches!(s.render_frame(&cfg).background, Background::Empty));
    }
}
