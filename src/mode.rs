// mode.rs — 模式切换：场景模式变化时销毁旧引擎、创建新引擎，并把回调重新挂上

use crate::config::ViewerConfig;
use crate::engine::{Callbacks, PanoramaControls, RenderFrame, SceneLoad, ViewState, ViewerEngine, WalkableControls};
use crate::input::InputEvent;
use crate::panorama::PanoramaEngine;
use crate::texture_cache::{ImageLoader, LoadExecutor, TextureCache};
use crate::tour::{Scene, SceneMode};
use crate::walkable::WalkableEngine;
use std::rc::Rc;
use std::sync::Arc;

/// Builds a fresh engine for a mode.
pub trait EngineFactory {
    fn create(&mut self, mode: SceneMode) -> Box<dyn ViewerEngine>;
}

/// Production factory: every panorama engine gets its own texture cache.
pub struct DefaultEngineFactory {
    config: ViewerConfig,
    loader: Arc<dyn ImageLoader>,
    executor: Rc<dyn LoadExecutor>,
}

impl DefaultEngineFactory {
    pub fn new(config: ViewerConfig, loader: Arc<dyn ImageLoader>, executor: Rc<dyn LoadExecutor>) -> Self {
        Self { config, loader, executor }
    }
}

impl EngineFactory for DefaultEngineFactory {
    fn create(&mut self, mode: SceneMode) -> Box<dyn ViewerEngine> {
        match mode {
            SceneMode::Panorama => {
                let cache = TextureCache::new(Arc::clone(&self.loader), Rc::clone(&self.executor));
                Box::new(PanoramaEngine::new(&self.config, cache))
            }
            SceneMode::Walkable => Box::new(WalkableEngine::new(&self.config)),
        }
    }
}

/// Owns the one live engine.
pub struct ModeController {
    factory: Box<dyn EngineFactory>,
    engine: Option<Box<dyn ViewerEngine>>,
    callbacks: Callbacks,
    /// 最近一次的尺寸，新引擎创建后补发
    last_resize: Option<(f32, f32)>,
}

impl ModeController {
    pub fn new(factory: Box<dyn EngineFactory>) -> Self {
        Self {
            factory,
            engine: None,
            callbacks: Callbacks::default(),
            last_resize: None,
        }
    }

    pub fn mode(&self) -> Option<SceneMode> {
        self.engine.as_ref().map(|e| e.mode())
    }

    pub fn engine(&self) -> Option<&dyn ViewerEngine> {
        self.engine.as_deref()
    }

    pub fn set_callbacks(&mut self, callbacks: Callbacks) {
        if let Some(engine) = self.engine.as_mut() {
            engine.set_callbacks(callbacks.clone());
        }
        self.callbacks.merge(callbacks);
    }

    /// Loads `scene`, swapping engines first when its mode differs from the
    /// live one. The old engine is disposed and dropped before the new one exists.
    pub fn load_scene(&mut self, scene: &Scene, transition: bool) -> SceneLoad {
        if self.mode() != Some(scene.mode) {
            if let Some(mut old) = self.engine.take() {
                log::info!("switching engine {:?} -> {:?}", old.mode(), scene.mode);
                old.dispose();
                drop(old);
            }
            let mut engine = self.factory.create(scene.mode);
            engine.set_callbacks(self.callbacks.clone());
            if let Some((width, height)) = self.last_resize {
                engine.handle_event(InputEvent::Resize { width, height });
            }
            self.engine = Some(engine);
        }
        match self.engine.as_mut() {
            Some(engine) => engine.load_scene(scene, transition),
            None => SceneLoad::cancelled(&scene.id),
        }
    }

    pub fn handle_event(&mut self, event: InputEvent) {
        if let InputEvent::Resize { width, height } = event {
            self.last_resize = Some((width, height));
        }
        if let Some(engine) = self.engine.as_mut() {
            engine.handle_event(event);
        }
    }

    pub fn tick(&mut self, dt: f32) -> Option<RenderFrame> {
        self.engine.as_mut()?.tick(dt)
    }

    pub fn preload_texture(&mut self, url: &str) {
        if let Some(engine) = self.engine.as_mut() {
            engine.preload_texture(url);
        }
    }

    pub fn set_view(&mut self, yaw: f32, pitch: f32, fov: Option<f32>) {
        if let Some(engine) = self.engine.as_mut() {
            engine.set_view(yaw, pitch, fov);
        }
    }

    pub fn view_state(&self) -> Option<ViewState> {
        self.engine.as_ref().map(|e| e.view_state())
    }

    pub fn panorama_controls(&mut self) -> Option<&mut dyn PanoramaControls> {
        self.engine.as_mut()?.panorama_controls()
    }

    pub fn walkable_controls(&mut self) -> Option<&mut dyn WalkableControls> {
        self.engine.as_mut()?.walkable_controls()
    }

    pub fn dispose(&mut self) {
        if let Some(mut engine) = self.engine.take() {
            engine.dispose();
        }
    }
}

impl Drop for ModeController {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::texture_cache::{DeferredExecutor, MemoryImageLoader};
    use crate::tour::TourConfig;
    use std::cell::RefCell;

    /// 记录创建顺序，验证旧引擎先销毁
    struct Recording {
        inner: DefaultEngineFactory,
        log: Rc<RefCell<Vec<SceneMode>>>,
    }

    impl EngineFactory for Recording {
        fn create(&mut self, mode: SceneMode) -> Box<dyn ViewerEngine> {
            self.log.borrow_mut().push(mode);
            self.inner.create(mode)
        }
    }

    fn controller() -> (ModeController, Rc<RefCell<Vec<SceneMode>>>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let factory = Recording {
            inner: DefaultEngineFactory::new(
                ViewerConfig::default(),
                Arc::new(MemoryImageLoader::new()),
                Rc::new(DeferredExecutor::new()),
            ),
            log: Rc::clone(&log),
        };
        (ModeController::new(Box::new(factory)), log)
    }

    #[test]
    fn swaps_only_on_mode_change() {
        let tour = TourConfig::demo().unwrap();
        let pano: Vec<&Scene> = tour.scenes.iter().filter(|s| s.mode == SceneMode::Panorama).collect();
        let walk = tour.scenes.iter().find(|s| s.mode == SceneMode::Walkable).unwrap();
        let (mut mc, log) = controller();

        mc.load_scene(pano[0], false);
        mc.load_scene(pano[1], true);
        assert_eq!(*log.borrow(), vec![SceneMode::Panorama]);
        assert!(mc.panorama_controls().is_some());
        assert!(mc.walkable_controls().is_none());

        let handle = mc.load_scene(walk, true);
        assert!(handle.is_ready());
        assert_eq!(*log.borrow(), vec![SceneMode::Panorama, SceneMode::Walkable]);
        assert_eq!(mc.mode(), Some(SceneMode::Walkable));
        assert!(mc.walkable_controls().is_some());
    }

    #[test]
    fn callbacks_survive_engine_swap() {
        let tour = TourConfig::demo().unwrap();
        let walk = tour.scenes.iter().find(|s| s.mode == SceneMode::Walkable).unwrap();
        let (mut mc, _) = controller();
        let seen = Rc::new(RefCell::new(0));
        let s = Rc::clone(&seen);
        mc.set_callbacks(Callbacks::new().on_view(move |_, _, _| *s.borrow_mut() += 1));
        mc.handle_event(InputEvent::Resize { width: 640.0, height: 480.0 });
        mc.load_scene(walk, false);
        assert!(mc.tick(0.016).is_some());
        assert_eq!(*seen.borrow(), 1);
    }

    #[test]
    fn no_engine_no_frame() {
        let (mut mc, _) = controller();
        assert!(mc.tick(0.016).is_none());
        mc.dispose();
        mc.dispose();
    }
}
