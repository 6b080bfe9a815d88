// engine.rs — 查看器引擎接口：两种模式共用的 trait、回调、加载句柄和每帧渲染描述

use crate::camera::CameraFrame;
use crate::input::InputEvent;
use crate::markers::MarkerGlyph;
use crate::mesh::RoomMesh;
use crate::tour::{AngularPosition, Hotspot, Point3, Scene, SceneMode};
use crate::xr::XrRuntime;
use glam::{Quat, Vec3};
use image::RgbaImage;
use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;

pub type HoverFn = Rc<dyn Fn(Option<&Hotspot>)>;
pub type ClickFn = Rc<dyn Fn(&Hotspot)>;
pub type ViewChangeFn = Rc<dyn Fn(f32, f32, f32)>;
pub type TeleportFn = Rc<dyn Fn(Vec3)>;

/// Host callbacks. Any handler may be left out.
#[derive(Clone, Default)]
pub struct Callbacks {
    pub on_hotspot_hover: Option<HoverFn>,
    pub on_hotspot_click: Option<ClickFn>,
    pub on_view_change: Option<ViewChangeFn>,
    pub on_teleport_complete: Option<TeleportFn>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_hover(mut self, f: impl Fn(Option<&Hotspot>) + 'static) -> Self {
        self.on_hotspot_hover = Some(Rc::new(f));
        self
    }

    pub fn on_click(mut self, f: impl Fn(&Hotspot) + 'static) -> Self {
        self.on_hotspot_click = Some(Rc::new(f));
        self
    }

    pub fn on_view(mut self, f: impl Fn(f32, f32, f32) + 'static) -> Self {
        self.on_view_change = Some(Rc::new(f));
        self
    }

    pub fn on_teleport(mut self, f: impl Fn(Vec3) + 'static) -> Self {
        self.on_teleport_complete = Some(Rc::new(f));
        self
    }

    /// 只覆盖传入的回调，其余保留
    pub fn merge(&mut self, other: Callbacks) {
        if other.on_hotspot_hover.is_some() {
            self.on_hotspot_hover = other.on_hotspot_hover;
        }
        if other.on_hotspot_click.is_some() {
            self.on_hotspot_click = other.on_hotspot_click;
        }
        if other.on_view_change.is_some() {
            self.on_view_change = other.on_view_change;
        }
        if other.on_teleport_complete.is_some() {
            self.on_teleport_complete = other.on_teleport_complete;
        }
    }

    /// Dispatches engine effects against the scene's hotspot list.
    pub fn dispatch(&self, hotspots: &[Hotspot], effects: &[EngineEffect]) {
        for effect in effects {
            match *effect {
                EngineEffect::Hover(idx) => {
                    if let Some(f) = &self.on_hotspot_hover {
                        f(idx.and_then(|i| hotspots.get(i)));
                    }
                }
                EngineEffect::Activate(idx) => match (&self.on_hotspot_click, hotspots.get(idx)) {
                    (Some(f), Some(h)) => f(h),
                    _ => {}
                },
                EngineEffect::ViewChanged { yaw, pitch, fov } => {
                    if let Some(f) = &self.on_view_change {
                        f(yaw, pitch, fov);
                    }
                }
                EngineEffect::TeleportComplete(pos) => {
                    if let Some(f) = &self.on_teleport_complete {
                        f(pos);
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_hotspot_hover", &self.on_hotspot_hover.is_some())
            .field("on_hotspot_click", &self.on_hotspot_click.is_some())
            .field("on_view_change", &self.on_view_change.is_some())
            .field("on_teleport_complete", &self.on_teleport_complete.is_some())
            .finish()
    }
}

/// What a pure state step asks the outside world to do. Hotspots are by index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EngineEffect {
    Hover(Option<usize>),
    Activate(usize),
    ViewChanged { yaw: f32, pitch: f32, fov: f32 },
    TeleportComplete(Vec3),
}

// ---------------------------------------------------------------------------
// 加载句柄

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Pending,
    Ready,
    Cancelled,
}

/// Completion handle returned by `load_scene`. The engine resolves it from
/// inside `tick`; a newer load or `dispose` cancels it.
#[derive(Debug, Clone)]
pub struct SceneLoad {
    scene_id: Rc<str>,
    state: Rc<Cell<LoadState>>,
}

impl SceneLoad {
    pub(crate) fn pending(scene_id: &str) -> Self {
        Self {
            scene_id: Rc::from(scene_id),
            state: Rc::new(Cell::new(LoadState::Pending)),
        }
    }

    pub(crate) fn ready(scene_id: &str) -> Self {
        let s = Self::pending(scene_id);
        s.resolve();
        s
    }

    pub(crate) fn cancelled(scene_id: &str) -> Self {
        let s = Self::pending(scene_id);
        s.cancel();
        s
    }

    pub(crate) fn resolve(&self) {
        if self.state.get() == LoadState::Pending {
            self.state.set(LoadState::Ready);
        }
    }

    pub(crate) fn cancel(&self) {
        if self.state.get() == LoadState::Pending {
            self.state.set(LoadState::Cancelled);
        }
    }

    pub fn scene_id(&self) -> &str {
        &self.scene_id
    }

    pub fn state(&self) -> LoadState {
        self.state.get()
    }

    pub fn is_pending(&self) -> bool {
        self.state() == LoadState::Pending
    }

    pub fn is_ready(&self) -> bool {
        self.state() == LoadState::Ready
    }
}

// ---------------------------------------------------------------------------
// 渲染描述

#[derive(Debug, Clone)]
pub enum Background {
    /// `None` = 没有纹理（加载和占位图都失败了）
    Panorama(Option<Arc<RgbaImage>>),
    Room(Arc<RoomMesh>),
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarkerSprite {
    pub hotspot_index: usize,
    pub position: Vec3,
    /// Edge length in world units, pulse included.
    pub size: f32,
    pub glyph: MarkerGlyph,
    pub tint: [f32; 3],
    pub hovered: bool,
    /// Gaze-dwell progress 0..1, drawn as a ring.
    pub dwell: f32,
}

/// Everything the renderer needs to draw one frame.
#[derive(Debug, Clone)]
pub struct RenderFrame {
    pub camera: CameraFrame,
    pub background: Background,
    /// Scene visibility: panorama alpha, or one minus the room's black overlay.
    pub opacity: f32,
    pub markers: Vec<MarkerSprite>,
    /// Room markers are hidden behind furniture; panorama markers draw on top.
    pub markers_depth_tested: bool,
    pub in_xr: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ViewState {
    Panorama { yaw: f32, pitch: f32, fov: f32 },
    Walkable { position: Vec3, orientation: Quat, yaw: f32, pitch: f32 },
}

// ---------------------------------------------------------------------------
// 权限

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionState {
    Granted,
    Denied,
    /// Answer arrives later as `InputEvent::OrientationPermission`.
    Pending,
}

pub trait PermissionPrompt {
    fn request_orientation(&mut self) -> PermissionState;
}

/// Platforms without a permission gate.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysGranted;

impl PermissionPrompt for AlwaysGranted {
    fn request_orientation(&mut self) -> PermissionState {
        PermissionState::Granted
    }
}

// ---------------------------------------------------------------------------
// 引擎接口

/// Panorama-only capabilities.
pub trait PanoramaControls {
    fn set_auto_rotate(&mut self, enabled: bool);
    fn auto_rotate(&self) -> bool;
    fn set_gyro_enabled(&mut self, enabled: bool, prompt: &mut dyn PermissionPrompt);
    fn gyro_enabled(&self) -> bool;
    /// `false` when the runtime is missing or refuses; state is left as it was.
    fn enter_vr(&mut self, runtime: &mut dyn XrRuntime) -> bool;
    fn exit_vr(&mut self, runtime: &mut dyn XrRuntime);
    fn in_vr(&self) -> bool;
    /// Yaw/pitch on the background sphere under a surface pixel.
    fn angles_at(&self, x: f32, y: f32) -> Option<AngularPosition>;
}

/// Walkable-only capabilities.
pub trait WalkableControls {
    fn teleport_to_position(&mut self, target: Point3);
    fn position(&self) -> Vec3;
}

pub trait ViewerEngine {
    fn mode(&self) -> SceneMode;
    fn load_scene(&mut self, scene: &Scene, transition: bool) -> SceneLoad;
    fn set_callbacks(&mut self, callbacks: Callbacks);
    fn preload_texture(&mut self, url: &str);
    fn set_view(&mut self, yaw: f32, pitch: f32, fov: Option<f32>);
    fn handle_event(&mut self, event: InputEvent);
    fn tick(&mut self, dt: f32) -> Option<RenderFrame>;
    fn dispose(&mut self);
    fn is_disposed(&self) -> bool;
    fn view_state(&self) -> ViewState;
    /// Hotspot under a surface pixel, using the latest camera.
    fn hotspot_at(&self, x: f32, y: f32) -> Option<Hotspot>;

    fn panorama_controls(&mut self) -> Option<&mut dyn PanoramaControls> {
        None
    }

    fn walkable_controls(&mut self) -> Option<&mut dyn WalkableControls> {
        None
    }
}
