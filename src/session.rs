// session.rs — 导览会话：把引擎回调翻译成“去哪个场景 / 弹出哪个热点”，并预加载相邻全景

use crate::engine::{Callbacks, RenderFrame, SceneLoad, ViewState};
use crate::input::InputEvent;
use crate::mode::{EngineFactory, ModeController};
use crate::tour::{Hotspot, Scene, SceneMode, TourConfig};
use glam::Vec3;
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug, Clone)]
enum Notice {
    Hover(Option<Hotspot>),
    Click(Hotspot),
    View(f32, f32, f32),
    Teleported(Vec3),
}

pub struct TourSession {
    tour: TourConfig,
    controller: ModeController,
    inbox: Rc<RefCell<Vec<Notice>>>,
    current_scene: Option<String>,
    load: Option<SceneLoad>,
    active_hotspot: Option<Hotspot>,
    hovered: Option<Hotspot>,
    view: Option<(f32, f32, f32)>,
    last_teleport: Option<Vec3>,
}

impl TourSession {
    pub fn new(tour: TourConfig, factory: Box<dyn EngineFactory>) -> Self {
        let inbox: Rc<RefCell<Vec<Notice>>> = Rc::new(RefCell::new(Vec::new()));
        let mut controller = ModeController::new(factory);

        let (a, b, c, d) = (Rc::clone(&inbox), Rc::clone(&inbox), Rc::clone(&inbox), Rc::clone(&inbox));
        controller.set_callbacks(
            Callbacks::new()
                .on_hover(move |h| a.borrow_mut().push(Notice::Hover(h.cloned())))
                .on_click(move |h| b.borrow_mut().push(Notice::Click(h.clone())))
                .on_view(move |y, p, f| c.borrow_mut().push(Notice::View(y, p, f)))
                .on_teleport(move |pos| d.borrow_mut().push(Notice::Teleported(pos))),
        );

        Self {
            tour,
            controller,
            inbox,
            current_scene: None,
            load: None,
            active_hotspot: None,
            hovered: None,
            view: None,
            last_teleport: None,
        }
    }

    /// Opens the tour at its default scene, without a transition.
    pub fn start(&mut self) -> Option<SceneLoad> {
        let id = self.tour.default_scene()?.id.clone();
        self.go_to(&id, false)
    }

    pub fn go_to(&mut self, scene_id: &str, transition: bool) -> Option<SceneLoad> {
        let Some(scene) = self.tour.scene(scene_id).cloned() else {
            log::warn!("tour {} has no scene {}", self.tour.id, scene_id);
            return None;
        };
        self.active_hotspot = None;
        self.hovered = None;
        let handle = self.controller.load_scene(&scene, transition);
        for url in self.tour.adjacent_panorama_urls(&scene) {
            self.controller.preload_texture(&url);
        }
        self.current_scene = Some(scene.id);
        self.load = Some(handle.clone());
        Some(handle)
    }

    /// Replaces the whole tour and restarts at its default scene.
    pub fn replace_tour(&mut self, tour: TourConfig) -> Option<SceneLoad> {
        log::info!("opening tour {} ({} scenes)", tour.id, tour.scenes.len());
        self.tour = tour;
        self.current_scene = None;
        self.start()
    }

    pub fn handle_event(&mut self, event: InputEvent) {
        self.controller.handle_event(event);
    }

    pub fn tick(&mut self, dt: f32) -> Option<RenderFrame> {
        let frame = self.controller.tick(dt);
        let notices: Vec<Notice> = self.inbox.borrow_mut().drain(..).collect();
        for n in notices {
            match n {
                Notice::Hover(h) => self.hovered = h,
                Notice::View(y, p, f) => self.view = Some((y, p, f)),
                Notice::Teleported(pos) => self.last_teleport = Some(pos),
                Notice::Click(h) => self.on_click(h),
            }
        }
        frame
    }

    fn on_click(&mut self, h: Hotspot) {
        if h.is_navigation() {
            let reached = match h.target_scene.as_deref() {
                Some(target) => {
                    let target = target.to_string();
                    self.go_to(&target, true).is_some()
                }
                None => {
                    log::debug!("navigation hotspot {} has no target scene", h.id);
                    false
                }
            };
            // 全景推镜结束后画面停在全黑，目标不存在时重新淡入当前场景
            let dark = self.current_scene().is_some_and(|s| s.mode == SceneMode::Panorama);
            if !reached && dark {
                if let Some(id) = self.current_scene.clone() {
                    self.go_to(&id, true);
                }
            }
        } else {
            self.active_hotspot = Some(h);
        }
    }

    pub fn tour(&self) -> &TourConfig {
        &self.tour
    }

    pub fn current_scene(&self) -> Option<&Scene> {
        self.current_scene.as_deref().and_then(|id| self.tour.scene(id))
    }

    pub fn is_loading(&self) -> bool {
        self.load.as_ref().is_some_and(|l| l.is_pending())
    }

    /// Info/image/video/link hotspot the UI should show.
    pub fn active_hotspot(&self) -> Option<&Hotspot> {
        self.active_hotspot.as_ref()
    }

    pub fn dismiss_hotspot(&mut self) {
        self.active_hotspot = None;
    }

    pub fn hovered(&self) -> Option<&Hotspot> {
        self.hovered.as_ref()
    }

    /// Last reported (yaw, pitch, fov).
    pub fn view(&self) -> Option<(f32, f32, f32)> {
        self.view
    }

    pub fn last_teleport(&self) -> Option<Vec3> {
        self.last_teleport
    }

    pub fn view_state(&self) -> Option<ViewState> {
        self.controller.view_state()
    }

    pub fn controller_mut(&mut self) -> &mut ModeController {
        &mut self.controller
    }

    pub fn dispose(&mut self) {
        self.controller.dispose();
        self.inbox.borrow_mut().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ViewerConfig;
    use crate::mode::DefaultEngineFactory;
    use crate::texture_cache::{DeferredExecutor, MemoryImageLoader};
    use crate::tour::HotspotType;
    use image::RgbaImage;
    use std::sync::Arc;

    fn session(exec: &DeferredExecutor) -> TourSession {
        let loader = MemoryImageLoader::new()
            .with("tours/demo/living-room.jpg", RgbaImage::new(8, 4))
            .with("tours/demo/kitchen.jpg", RgbaImage::new(8, 4));
        let factory = DefaultEngineFactory::new(ViewerConfig::default(), Arc::new(loader), Rc::new(exec.clone()));
        TourSession::new(TourConfig::demo().unwrap(), Box::new(factory))
    }

    #[test]
    fn starts_at_default_and_preloads_neighbours() {
        let exec = DeferredExecutor::new();
        let mut s = session(&exec);
        let handle = s.start().unwrap();
        assert!(handle.is_pending());
        // 自身 + 厨房（loft 是漫游场景，不预加载）
        assert_eq!(exec.pending(), 2);
        exec.run_pending();
        s.tick(0.016);
        assert!(handle.is_ready());
        assert!(!s.is_loading());
        assert_eq!(s.current_scene().unwrap().id, "living-room");
    }

    #[test]
    fn dangling_navigation_fades_current_scene_back_in() {
        let exec = DeferredExecutor::new();
        let mut s = session(&exec);
        s.start();
        exec.run_pending();
        for _ in 0..120 {
            s.tick(0.016);
        }
        let mut h = Hotspot::new("lost", HotspotType::Navigation);
        h.target_scene = Some("nowhere".into());
        s.on_click(h);
        assert_eq!(s.current_scene().unwrap().id, "living-room");
        let frame = s.tick(0.016).unwrap();
        assert!(frame.opacity < 0.1);
        for _ in 0..60 {
            s.tick(0.016);
        }
        assert_eq!(s.tick(0.016).unwrap().opacity, 1.0);
    }

    #[test]
    fn unknown_scene_is_ignored() {
        let exec = DeferredExecutor::new();
        let mut s = session(&exec);
        assert!(s.go_to("nowhere", true).is_none());
        assert!(s.current_scene().is_none());
    }
}
