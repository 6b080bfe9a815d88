// panorama.rs — 全景模式引擎
//
// 每帧顺序：输入 → 视角更新（阻尼/自动旋转/陀螺仪/推镜）→ 淡入 → 热点动画 → 拾取 → 出帧 → 回调
// 状态推进是纯函数：PanoramaState::step(self, events, dt) -> (新状态, 副作用列表)

use crate::camera::{CameraFrame, GyroTracker, PanoramaView, PANORAMA_FAR, PANORAMA_NEAR};
use crate::config::{PanoramaConfig, ViewerConfig, XrConfig};
use crate::engine::{
    Background, Callbacks, EngineEffect, MarkerSprite, PanoramaControls, PermissionPrompt, PermissionState,
    RenderFrame, SceneLoad, ViewState, ViewerEngine,
};
use crate::geometry::pointer_to_ndc;
use crate::input::{DragTracker, InputBindings, InputEvent, InputQueue, LookDelta, PinchTracker, PointerKind, Release, TouchSet};
use crate::markers::MarkerStyle;
use crate::picking::{self, MarkerSet};
use crate::texture_cache::{CacheLookup, TextureCache};
use crate::tour::{AngularPosition, Hotspot, Scene, SceneMode};
use crate::transition::{Dolly, Fade, GazeDwell};
use crate::xr::{XrFrame, XrRuntime};
use glam::{Vec2, Vec3};
use image::RgbaImage;
use std::rc::Rc;
use std::sync::Arc;

/// Parameters a state step reads.
#[derive(Debug, Clone, Copy)]
pub struct StepConfig<'a> {
    pub panorama: &'a PanoramaConfig,
    pub xr: &'a XrConfig,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GyroMode {
    Off,
    AwaitingPermission,
    On(GyroTracker),
}

#[derive(Debug, Clone, PartialEq)]
pub struct XrSession {
    pub frame: XrFrame,
    pub dwell: GazeDwell,
}

#[derive(Debug, Clone)]
pub struct PanoramaState {
    pub view: PanoramaView,
    pub scene: Option<Rc<Scene>>,
    pub background: Option<Arc<RgbaImage>>,
    pub markers: MarkerSet,
    pub fade: Fade,
    pub dolly: Option<Dolly>,
    pub auto_rotate: bool,
    pub gyro: GyroMode,
    pub xr: Option<XrSession>,
    pub hovered: Option<usize>,
    pub elapsed: f32,
    pub viewport: Vec2,
    drag: DragTracker,
    drag_start: (f32, f32),
    touches: TouchSet,
    pinch: PinchTracker,
    pointer: Option<Vec2>,
    last_reported: Option<(f32, f32, f32)>,
}

fn marker_style(cfg: &PanoramaConfig) -> MarkerStyle {
    MarkerStyle {
        icon_size: cfg.icon_size,
        ring_size: cfg.ring_size,
        float_amplitude: cfg.float_amplitude,
    }
}

impl PanoramaState {
    pub fn new(cfg: &PanoramaConfig) -> Self {
        Self {
            view: PanoramaView::new(cfg),
            scene: None,
            background: None,
            markers: MarkerSet::new(),
            fade: Fade::visible(),
            dolly: None,
            auto_rotate: false,
            gyro: if cfg.gyro_enabled_by_default {
                GyroMode::On(GyroTracker::default())
            } else {
                GyroMode::Off
            },
            xr: None,
            hovered: None,
            elapsed: 0.0,
            viewport: Vec2::ZERO,
            drag: DragTracker::new(cfg.mouse_drag_threshold, cfg.touch_drag_threshold),
            drag_start: (0.0, 0.0),
            touches: TouchSet::default(),
            pinch: PinchTracker::default(),
            pointer: None,
            last_reported: None,
        }
    }

    pub fn hotspots(&self) -> &[Hotspot] {
        self.scene.as_deref().map(|s| s.hotspots.as_slice()).unwrap_or(&[])
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_active()
    }

    /// Swaps in a freshly loaded scene. Markers are rebuilt from scratch.
    pub fn with_scene(
        mut self,
        scene: Rc<Scene>,
        image: Option<Arc<RgbaImage>>,
        transition: bool,
        cfg: &PanoramaConfig,
    ) -> (Self, Vec<EngineEffect>) {
        let mut effects = Vec::new();
        if self.hovered.take().is_some() {
            effects.push(EngineEffect::Hover(None));
        }
        self.markers = MarkerSet::for_panorama(&scene.hotspots, cfg.hotspot_radius, &marker_style(cfg));
        if let Some(iv) = scene.initial_view {
            self.view.snap(iv.yaw, iv.pitch, iv.fov, cfg);
        }
        self.background = image;
        self.fade = if transition { Fade::start(cfg.fade_rate) } else { Fade::visible() };
        self.dolly = None;
        self.drag.cancel();
        if let Some(xr) = self.xr.as_mut() {
            xr.dwell = GazeDwell::new(xr.dwell.threshold());
        }
        log::debug!("panorama scene {} applied ({} markers)", scene.id, self.markers.len());
        self.scene = Some(scene);
        (self, effects)
    }

    /// Drops everything tied to the current scene.
    pub fn unload(&mut self) {
        self.scene = None;
        self.background = None;
        self.markers.clear();
        self.dolly = None;
        self.hovered = None;
        self.drag.cancel();
        self.touches.clear();
    }

    fn aspect(&self) -> f32 {
        if self.viewport.x > 0.0 && self.viewport.y > 0.0 {
            self.viewport.x / self.viewport.y
        } else {
            1.0
        }
    }

    pub fn camera_frame(&self) -> CameraFrame {
        match &self.xr {
            Some(xr) => CameraFrame::oriented(Vec3::ZERO, xr.frame.head, self.view.fov, self.aspect(), PANORAMA_NEAR, PANORAMA_FAR),
            None => self.view.frame(self.aspect()),
        }
    }

    fn ndc(&self, p: Vec2) -> Option<Vec2> {
        (self.viewport.x > 0.0 && self.viewport.y > 0.0).then(|| pointer_to_ndc(p.x, p.y, self.viewport.x, self.viewport.y))
    }

    /// Hotspot index under a surface pixel.
    pub fn pick_at(&self, p: Vec2) -> Option<usize> {
        let ndc = self.ndc(p)?;
        let frame = self.camera_frame();
        self.markers.pick(&frame.ray_through(ndc), frame.right, frame.up)
    }

    pub fn angles_at(&self, p: Vec2, sphere_radius: f32) -> Option<AngularPosition> {
        let ndc = self.ndc(p)?;
        picking::angles_at(&self.camera_frame().ray_through(ndc), sphere_radius)
    }

    pub fn step(mut self, events: &[InputEvent], dt: f32, cfg: &StepConfig) -> (Self, Vec<EngineEffect>) {
        let dt = dt.max(0.0);
        let pcfg = cfg.panorama;
        let mut effects = Vec::new();
        let mut clicks = Vec::new();
        let mut selects = Vec::new();
        self.elapsed += dt;

        for event in events {
            self.apply_input(event, pcfg, &mut clicks, &mut selects);
        }

        // 视角
        if let Some(dolly) = self.dolly.as_mut() {
            let s = dolly.advance(dt);
            self.view.lon = s.lon;
            self.view.lat = s.lat;
            self.view.fov = s.fov;
            self.view.target_lon = s.lon;
            self.view.target_lat = s.lat;
            self.view.target_fov = s.fov;
            self.fade = Fade::held(s.opacity);
            if s.finished {
                let idx = dolly.hotspot_index;
                self.dolly = None;
                // 保持全黑，直到下一个场景的纹理就绪后由 with_scene 淡入
                self.fade = Fade::held(0.0);
                effects.push(EngineEffect::Activate(idx));
            }
        } else {
            if self.auto_rotate && !self.drag.is_active() && self.gyro == GyroMode::Off && self.xr.is_none() {
                self.view.target_lon += pcfg.auto_rotate_speed * dt;
            }
            self.view.step(dt, pcfg);
        }

        self.fade.advance(dt);
        self.markers.animate(self.elapsed);

        // 拾取
        let frame = self.camera_frame();
        let mut activations = Vec::new();
        let hover_now = if let Some(xr) = self.xr.as_mut() {
            let gaze = self.markers.pick(&xr.frame.gaze(), frame.right, frame.up);
            let pointed = xr
                .frame
                .controllers
                .iter()
                .find_map(|c| self.markers.pick(&c.ray(), frame.right, frame.up));
            activations.extend(xr.dwell.update(gaze, dt));
            for c in &selects {
                if let Some(ctrl) = xr.frame.controllers.get(*c) {
                    activations.extend(self.markers.pick(&ctrl.ray(), frame.right, frame.up));
                }
            }
            pointed.or(gaze)
        } else {
            for p in &clicks {
                activations.extend(self.pick_at(*p));
            }
            match self.pointer {
                Some(p) if !self.drag.has_moved() => self.pick_at(p),
                _ => None,
            }
        };

        if hover_now != self.hovered {
            self.hovered = hover_now;
            effects.push(EngineEffect::Hover(hover_now));
        }
        for idx in activations {
            self.activate(idx, pcfg, &mut effects);
        }

        let now = (self.view.yaw(), self.view.pitch(), self.view.fov);
        let changed = match self.last_reported {
            None => true,
            Some((y, p, f)) => (y - now.0).abs() > 1e-3 || (p - now.1).abs() > 1e-3 || (f - now.2).abs() > 1e-3,
        };
        if changed {
            self.last_reported = Some(now);
            effects.push(EngineEffect::ViewChanged {
                yaw: now.0,
                pitch: now.1,
                fov: now.2,
            });
        }

        (self, effects)
    }

    /// 导航热点先推镜，结束后才通知；其它类型直接通知
    fn activate(&mut self, idx: usize, cfg: &PanoramaConfig, effects: &mut Vec<EngineEffect>) {
        if self.dolly.is_some() {
            return;
        }
        let Some(h) = self.hotspots().get(idx) else {
            return;
        };
        match (h.is_navigation(), h.position, self.xr.is_some()) {
            (true, Some(pos), false) => {
                self.dolly = Some(Dolly::new(&self.view, pos, idx, cfg.dolly_fov, cfg.dolly_duration));
                self.drag.cancel();
            }
            _ => effects.push(EngineEffect::Activate(idx)),
        }
    }

    fn look(&mut self, look: LookDelta, kind: PointerKind, cfg: &PanoramaConfig) {
        let divisor = match kind {
            PointerKind::Mouse => cfg.mouse_divisor,
            PointerKind::Touch => cfg.touch_divisor,
        };
        let sens = self.view.fov / divisor;
        let (lon0, lat0) = self.drag_start;
        self.view.target_lon = lon0 - look.total.x * sens;
        self.view.target_lat = lat0 + look.total.y * sens;
        self.view.clamp_target(cfg);
    }

    fn press(&mut self, p: Vec2, kind: PointerKind) {
        self.drag.press(p, kind, self.elapsed);
        self.drag_start = (self.view.target_lon, self.view.target_lat);
    }

    fn apply_input(&mut self, event: &InputEvent, cfg: &PanoramaConfig, clicks: &mut Vec<Vec2>, selects: &mut Vec<usize>) {
        let look_locked = self.dolly.is_some() || self.xr.is_some();
        match *event {
            InputEvent::PointerDown { x, y } => {
                if !look_locked && !self.drag.is_active() {
                    self.press(Vec2::new(x, y), PointerKind::Mouse);
                }
            }
            InputEvent::PointerMove { x, y } => {
                let p = Vec2::new(x, y);
                self.pointer = Some(p);
                if self.drag.kind() == Some(PointerKind::Mouse) {
                    if let Some(look) = self.drag.motion(p) {
                        if !look_locked {
                            self.look(look, PointerKind::Mouse, cfg);
                        }
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
            InputEvent::PointerLeave => self.pointer = None,
            InputEvent::TouchStart { id, x, y } => {
                let n = self.touches.start(id, Vec2::new(x, y));
                if n == 1 && !self.pinch.suppresses_look() && !look_locked {
                    self.press(Vec2::new(x, y), PointerKind::Touch);
                } else if n == 2 {
                    self.drag.cancel();
                    if let Some(d) = self.touches.spread() {
                        self.pinch.begin(d, self.view.target_fov);
                    }
                }
            }
            InputEvent::TouchMove { id, x, y } => {
                self.touches.update(id, Vec2::new(x, y));
                if self.pinch.is_active() {
                    if let Some(fov) = self.touches.spread().and_then(|d| self.pinch.update(d, cfg.fov_min, cfg.fov_max)) {
                        if !look_locked {
                            self.view.set_target_fov(fov, cfg);
                        }
                    }
                } else if self.touches.len() == 1 && self.drag.kind() == Some(PointerKind::Touch) {
                    if let Some(look) = self.drag.motion(Vec2::new(x, y)) {
                        if !look_locked {
                            self.look(look, PointerKind::Touch, cfg);
                        }
                    }
                }
            }
            InputEvent::TouchEnd { id, x, y } => {
                let remaining = self.touches.end(id);
                if self.pinch.suppresses_look() {
                    self.pinch.fingers_changed(remaining);
                } else if remaining == 0 && self.drag.kind() == Some(PointerKind::Touch) {
                    if let Release::Click { position, .. } = self.drag.release(Vec2::new(x, y), self.elapsed) {
                        clicks.push(position);
                    }
                }
            }
            InputEvent::Wheel { delta_y } => {
                if !look_locked {
                    self.view.set_target_fov(self.view.target_fov + delta_y * cfg.wheel_zoom_rate, cfg);
                }
            }
            InputEvent::Orientation(sample) => {
                if let GyroMode::On(tracker) = &mut self.gyro {
                    if !self.drag.is_active() && !look_locked {
                        tracker.apply(sample, &mut self.view, cfg);
                    }
                }
            }
            InputEvent::OrientationPermission(granted) => {
                if self.gyro == GyroMode::AwaitingPermission {
                    self.gyro = if granted {
                        GyroMode::On(GyroTracker::default())
                    } else {
                        log::info!("device orientation permission denied, gyro stays off");
                        GyroMode::Off
                    };
                }
            }
            InputEvent::Resize { width, height } => self.viewport = Vec2::new(width, height),
            InputEvent::XrFrame(ref frame) => {
                if let Some(xr) = self.xr.as_mut() {
                    xr.frame = frame.clone();
                }
            }
            InputEvent::XrSelect { controller } => {
                if self.xr.is_some() {
                    selects.push(controller);
                }
            }
            InputEvent::FocusLost => {
                self.drag.cancel();
                self.touches.clear();
                self.pinch.fingers_changed(0);
            }
            InputEvent::KeyDown(_) | InputEvent::KeyUp(_) => {}
        }
    }

    pub fn render_frame(&self) -> RenderFrame {
        let dwell = self.xr.as_ref().map(|xr| (xr.dwell.target(), xr.dwell.progress()));
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
                dwell: match dwell {
                    Some((Some(t), p)) if t == m.hotspot_index => p,
                    _ => 0.0,
                },
            })
            .collect();
        RenderFrame {
            camera: self.camera_frame(),
            background: if self.scene.is_some() {
                Background::Panorama(self.background.clone())
            } else {
                Background::Empty
            },
            opacity: self.fade.opacity(),
            markers,
            markers_depth_tested: false,
            in_xr: self.xr.is_some(),
        }
    }
}

// ---------------------------------------------------------------------------
// 引擎外壳：加载、监听、回调

struct PendingLoad {
    scene: Rc<Scene>,
    url: String,
    handle: SceneLoad,
    transition: bool,
}

pub struct PanoramaEngine {
    config: ViewerConfig,
    state: PanoramaState,
    cache: TextureCache,
    queue: InputQueue,
    bindings: InputBindings,
    callbacks: Callbacks,
    pending: Option<PendingLoad>,
    deferred: Vec<EngineEffect>,
    disposed: bool,
}

impl PanoramaEngine {
    pub fn new(config: &ViewerConfig, cache: TextureCache) -> Self {
        Self {
            config: config.clone(),
            state: PanoramaState::new(&config.panorama),
            cache,
            queue: InputQueue::default(),
            bindings: InputBindings::standard(),
            callbacks: Callbacks::default(),
            pending: None,
            deferred: Vec::new(),
            disposed: false,
        }
    }

    pub fn state(&self) -> &PanoramaState {
        &self.state
    }

    fn step_config(&self) -> StepConfig<'_> {
        StepConfig {
            panorama: &self.config.panorama,
            xr: &self.config.xr,
        }
    }

    fn apply(&mut self, scene: Rc<Scene>, image: Option<Arc<RgbaImage>>, transition: bool) {
        let state = std::mem::replace(&mut self.state, PanoramaState::new(&self.config.panorama));
        let (state, effects) = state.with_scene(scene, image, transition, &self.config.panorama);
        self.state = state;
        self.deferred.extend(effects);
    }

    fn placeholder(&self, scene_id: &str) -> Option<Arc<RgbaImage>> {
        let a = &self.config.assets;
        match crate::placeholder::generate(scene_id, a.placeholder_width, a.placeholder_height) {
            Some(img) => Some(Arc::new(img)),
            None => {
                log::warn!("no placeholder for {}, rendering untextured", scene_id);
                None
            }
        }
    }

    /// 收取后台解码结果；只有与当前待加载场景匹配的才会生效
    fn poll_loads(&mut self) {
        for done in self.cache.drain() {
            let matches = self.pending.as_ref().is_some_and(|p| p.url == done.url);
            if !matches {
                continue;
            }
            let Some(p) = self.pending.take() else {
                continue;
            };
            let image = match done.result {
                Ok(img) => Some(img),
                Err(e) => {
                    log::warn!("scene {}: {}; using placeholder", p.scene.id, e);
                    self.placeholder(&p.scene.id)
                }
            };
            self.apply(p.scene, image, p.transition);
            p.handle.resolve();
        }
    }
}

impl ViewerEngine for PanoramaEngine {
    fn mode(&self) -> SceneMode {
        SceneMode::Panorama
    }

    fn load_scene(&mut self, scene: &Scene, transition: bool) -> SceneLoad {
        if self.disposed {
            return SceneLoad::cancelled(&scene.id);
        }
        if let Some(old) = self.pending.take() {
            log::debug!("load of {} superseded by {}", old.scene.id, scene.id);
            old.handle.cancel();
        }
        let scene = Rc::new(scene.clone());
        log::info!("loading panorama scene {}", scene.id);
        match self.cache.request(&scene.image_url) {
            CacheLookup::Ready(img) => {
                let handle = SceneLoad::ready(&scene.id);
                self.apply(scene, Some(img), transition);
                handle
            }
            CacheLookup::Pending => {
                let handle = SceneLoad::pending(&scene.id);
                self.pending = Some(PendingLoad {
                    url: scene.image_url.clone(),
                    scene,
                    handle: handle.clone(),
                    transition,
                });
                handle
            }
        }
    }

    fn set_callbacks(&mut self, callbacks: Callbacks) {
        self.callbacks.merge(callbacks);
    }

    fn preload_texture(&mut self, url: &str) {
        if !self.disposed {
            self.cache.preload(url);
        }
    }

    fn set_view(&mut self, yaw: f32, pitch: f32, fov: Option<f32>) {
        self.state.view.set_target(yaw, pitch, fov, &self.config.panorama);
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
        self.poll_loads();
        let events = self.queue.drain();
        let state = std::mem::replace(&mut self.state, PanoramaState::new(&self.config.panorama));
        let (state, effects) = state.step(&events, dt, &self.step_config());
        self.state = state;

        let mut all = std::mem::take(&mut self.deferred);
        all.extend(effects);
        let frame = self.state.render_frame();
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
        if let Some(p) = self.pending.take() {
            p.handle.cancel();
        }
        self.cache.clear();
        self.state.unload();
        self.deferred.clear();
        log::debug!("panorama engine disposed");
    }

    fn is_disposed(&self) -> bool {
        self.disposed
    }

    fn view_state(&self) -> ViewState {
        ViewState::Panorama {
            yaw: self.state.view.yaw(),
            pitch: self.state.view.pitch(),
            fov: self.state.view.fov,
        }
    }

    fn hotspot_at(&self, x: f32, y: f32) -> Option<Hotspot> {
        let idx = self.state.pick_at(Vec2::new(x, y))?;
        self.state.hotspots().get(idx).cloned()
    }

    fn panorama_controls(&mut self) -> Option<&mut dyn PanoramaControls> {
        Some(self)
    }
}

impl PanoramaControls for PanoramaEngine {
    fn set_auto_rotate(&mut self, enabled: bool) {
        self.state.auto_rotate = enabled;
    }

    fn auto_rotate(&self) -> bool {
        self.state.auto_rotate
    }

    fn set_gyro_enabled(&mut self, enabled: bool, prompt: &mut dyn PermissionPrompt) {
        if !enabled {
            self.state.gyro = GyroMode::Off;
            return;
        }
        if matches!(self.state.gyro, GyroMode::On(_)) {
            return;
        }
        self.state.gyro = match prompt.request_orientation() {
            PermissionState::Granted => GyroMode::On(GyroTracker::default()),
            PermissionState::Pending => GyroMode::AwaitingPermission,
            PermissionState::Denied => {
                log::info!("device orientation permission denied, gyro stays off");
                GyroMode::Off
            }
        };
    }

    fn gyro_enabled(&self) -> bool {
        matches!(self.state.gyro, GyroMode::On(_))
    }

    fn enter_vr(&mut self, runtime: &mut dyn XrRuntime) -> bool {
        if self.state.xr.is_some() {
            return true;
        }
        if !runtime.is_supported() {
            log::info!("immersive mode not supported here");
            return false;
        }
        match runtime.request_session() {
            Ok(()) => {
                self.state.drag.cancel();
                self.state.xr = Some(XrSession {
                    frame: XrFrame::default(),
                    dwell: GazeDwell::new(self.config.xr.dwell_seconds),
                });
                log::info!("entered immersive mode");
                true
            }
            Err(e) => {
                log::warn!("immersive session failed: {}", e);
                false
            }
        }
    }

    fn exit_vr(&mut self, runtime: &mut dyn XrRuntime) {
        if self.state.xr.take().is_some() {
            runtime.end_session();
            log::info!("left immersive mode");
        }
    }

    fn in_vr(&self) -> bool {
        self.state.xr.is_some()
    }

    fn angles_at(&self, x: f32, y: f32) -> Option<AngularPosition> {
        self.state.angles_at(Vec2::new(x, y), self.config.panorama.sphere_radius)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tour::{HotspotType, InitialView};

    fn cfgs() -> (PanoramaConfig, XrConfig) {
        (PanoramaConfig::default(), XrConfig::default())
    }

    fn scene_with(hotspots: Vec<Hotspot>) -> Rc<Scene> {
        Rc::new(Scene {
            id: "a".into(),
            name: "A".into(),
            description: None,
            mode: SceneMode::Panorama,
            image_url: "a.jpg".into(),
            thumbnail: None,
            initial_view: Some(InitialView { yaw: 0.0, pitch: 0.0, fov: 75.0 }),
            walkable_config: None,
            hotspots,
        })
    }

    fn ready_state(hotspots: Vec<Hotspot>) -> PanoramaState {
        let (p, _) = cfgs();
        let mut s = PanoramaState::new(&p);
        s.viewport = Vec2::new(800.0, 600.0);
        s.with_scene(scene_with(hotspots), None, false, &p).0
    }

    fn run(s: PanoramaState, events: &[InputEvent], dt: f32) -> (PanoramaState, Vec<EngineEffect>) {
        let (p, x) = cfgs();
        s.step(events, dt, &StepConfig { panorama: &p, xr: &x })
    }

    #[test]
    fn small_wiggle_does_not_rotate() {
        let s = ready_state(vec![]);
        let (s, _) = run(
            s,
            &[
                InputEvent::PointerDown { x: 400.0, y: 300.0 },
                InputEvent::PointerMove { x: 403.0, y: 302.0 },
                InputEvent::PointerUp { x: 403.0, y: 302.0 },
            ],
            1.0 / 60.0,
        );
        assert_eq!(s.view.target_lon, 0.0);
        assert_eq!(s.view.target_lat, 0.0);
    }

    #[test]
    fn drag_scales_with_fov() {
        let s = ready_state(vec![]);
        let (s, _) = run(
            s,
            &[
                InputEvent::PointerDown { x: 400.0, y: 300.0 },
                InputEvent::PointerMove { x: 300.0, y: 350.0 },
            ],
            0.0,
        );
        // 75 / 500 = 0.15°/px
        assert!((s.view.target_lon - 15.0).abs() < 1e-4);
        assert!((s.view.target_lat - 7.5).abs() < 1e-4);
    }

    #[test]
    fn pitch_stays_clamped_under_extreme_drag() {
        let mut s = ready_state(vec![]);
        s = run(s, &[InputEvent::PointerDown { x: 400.0, y: 0.0 }], 0.0).0;
        for i in 1..40 {
            let (n, _) = run(s, &[InputEvent::PointerMove { x: 400.0, y: i as f32 * 500.0 }], 1.0 / 60.0);
            s = n;
            assert!(s.view.lat.abs() <= 85.0);
            assert!(s.view.target_lat.abs() <= 85.0);
        }
        assert!((s.view.target_lat - 85.0).abs() < 1e-4);
    }

    #[test]
    fn wheel_zooms_within_bounds() {
        let s = ready_state(vec![]);
        let (s, _) = run(s, &[InputEvent::Wheel { delta_y: 10_000.0 }], 0.0);
        assert_eq!(s.view.target_fov, 100.0);
        let (s, _) = run(s, &[InputEvent::Wheel { delta_y: -100.0 }], 0.0);
        assert_eq!(s.view.target_fov, 95.0);
    }

    #[test]
    fn auto_rotate_pauses_while_dragging() {
        let mut s = ready_state(vec![]);
        s.auto_rotate = true;
        let (s, _) = run(s, &[], 1.0);
        assert!((s.view.target_lon - 9.0).abs() < 1e-4);
        let (s, _) = run(s, &[InputEvent::PointerDown { x: 10.0, y: 10.0 }], 1.0);
        assert!((s.view.target_lon - 9.0).abs() < 1e-4);
    }

    #[test]
    fn info_click_fires_immediately() {
        let mut h = Hotspot::new("info", HotspotType::Info);
        h.position = Some(AngularPosition { yaw: 0.0, pitch: 0.0 });
        let s = ready_state(vec![h]);
        let (_, fx) = run(
            s,
            &[InputEvent::PointerDown { x: 400.0, y: 300.0 }, InputEvent::PointerUp { x: 400.0, y: 300.0 }],
            0.0,
        );
        assert!(fx.contains(&EngineEffect::Activate(0)));
    }

    #[test]
    fn view_change_only_on_change() {
        let s = ready_state(vec![]);
        let (s, fx) = run(s, &[], 0.016);
        assert_eq!(fx.iter().filter(|e| matches!(e, EngineEffect::ViewChanged { .. })).count(), 1);
        let (_, fx) = run(s, &[], 0.016);
        assert!(fx.is_empty());
    }

    #[test]
    fn pinch_blocks_look_until_all_lift() {
        let s = ready_state(vec![]);
        let (s, _) = run(
            s,
            &[
                InputEvent::TouchStart { id: 1, x: 300.0, y: 300.0 },
                InputEvent::TouchStart { id: 2, x: 400.0, y: 300.0 },
                InputEvent::TouchMove { id: 2, x: 500.0, y: 300.0 },
                InputEvent::TouchEnd { id: 2, x: 500.0, y: 300.0 },
                InputEvent::TouchMove { id: 1, x: 100.0, y: 300.0 },
            ],
            0.0,
        );
        assert!((s.view.target_fov - 37.5).abs() < 1e-3);
        assert_eq!(s.view.target_lon, 0.0);
    }
}
