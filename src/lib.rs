// lib.rs — tour_viewer：360° 全景 / 第一人称房间导览查看器引擎

pub mod camera;
pub mod collision;
pub mod config;
pub mod engine;
pub mod error;
pub mod fonts;
pub mod geometry;
pub mod i18n;
pub mod input;
pub mod markers;
pub mod mesh;
pub mod mode;
pub mod panorama;
pub mod picking;
pub mod placeholder;
pub mod renderer;
pub mod session;
pub mod texture_cache;
pub mod tour;
pub mod transition;
pub mod walkable;
pub mod xr;

pub use config::ViewerConfig;
pub use engine::{Callbacks, LoadState, RenderFrame, SceneLoad, ViewState, ViewerEngine};
pub use mode::{DefaultEngineFactory, EngineFactory, ModeController};
pub use session::TourSession;
pub use tour::{Hotspot, HotspotType, Scene, SceneMode, TourConfig};
