// config.rs — 查看器参数（全部带默认值，可由 JSON 覆盖）
//
// 查找顺序与语言选择一致：
// - CLI: --config <path>
// - Env: TOUR_VIEWER_CONFIG
// - 都没有时使用内置默认值

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// How the panorama low-pass filter relates to frame time.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum DampingMode {
    /// `current += (target - current) * damping` once per frame, whatever the frame time.
    #[default]
    PerFrame,
    /// Same filter rescaled so it converges identically at any frame rate.
    #[serde(rename_all = "camelCase")]
    FrameRateIndependent { reference_fps: f32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PanoramaConfig {
    pub damping: f32,
    pub damping_mode: DampingMode,
    pub default_fov: f32,
    pub fov_min: f32,
    pub fov_max: f32,
    pub pitch_limit: f32,
    pub mouse_divisor: f32,
    pub touch_divisor: f32,
    pub mouse_drag_threshold: f32,
    pub touch_drag_threshold: f32,
    pub wheel_zoom_rate: f32,
    /// 度/秒
    pub auto_rotate_speed: f32,
    pub sphere_radius: f32,
    pub hotspot_radius: f32,
    pub icon_size: f32,
    pub ring_size: f32,
    pub float_amplitude: f32,
    pub fade_rate: f32,
    pub dolly_duration: f32,
    pub dolly_fov: f32,
    pub gyro_enabled_by_default: bool,
}

impl Default for PanoramaConfig {
    fn default() -> Self {
        Self {
            damping: 0.15,
            damping_mode: DampingMode::PerFrame,
            default_fov: 75.0,
            fov_min: 30.0,
            fov_max: 100.0,
            pitch_limit: 85.0,
            mouse_divisor: 500.0,
            touch_divisor: 250.0,
            mouse_drag_threshold: 5.0,
            touch_drag_threshold: 15.0,
            wheel_zoom_rate: 0.05,
            auto_rotate_speed: 9.0,
            sphere_radius: 500.0,
            hotspot_radius: 450.0,
            icon_size: 18.0,
            ring_size: 28.0,
            float_amplitude: 1.5,
            fade_rate: 2.0,
            dolly_duration: 0.7,
            dolly_fov: 35.0,
            gyro_enabled_by_default: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WalkableConfigDefaults {
    pub fov: f32,
    pub player_height: f32,
    pub player_radius: f32,
    pub move_speed: f32,
    pub friction: f32,
    pub mouse_sensitivity: f32,
    pub touch_sensitivity: f32,
    pub mouse_drag_threshold: f32,
    pub touch_tap_threshold: f32,
    pub tap_max_duration: f32,
    pub teleport_duration: f32,
    pub icon_size: f32,
    pub ring_size: f32,
    pub float_amplitude: f32,
    pub fade_rate: f32,
    /// 单帧最大时间步长，防止切后台回来时一次走太远
    pub max_frame_dt: f32,
}

impl Default for WalkableConfigDefaults {
    fn default() -> Self {
        Self {
            fov: 70.0,
            player_height: 1.7,
            player_radius: 0.3,
            move_speed: 32.0,
            friction: 8.0,
            mouse_sensitivity: 0.003,
            touch_sensitivity: 0.004,
            mouse_drag_threshold: 3.0,
            touch_tap_threshold: 15.0,
            tap_max_duration: 0.3,
            teleport_duration: 0.4,
            icon_size: 0.35,
            ring_size: 0.5,
            float_amplitude: 0.05,
            fade_rate: 2.0,
            max_frame_dt: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct XrConfig {
    pub dwell_seconds: f32,
}

impl Default for XrConfig {
    fn default() -> Self {
        Self { dwell_seconds: 1.5 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AssetConfig {
    /// Relative image URLs resolve against this directory.
    pub root: PathBuf,
    pub placeholder_width: u32,
    pub placeholder_height: u32,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("assets"),
            placeholder_width: 2048,
            placeholder_height: 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ViewerConfig {
    pub panorama: PanoramaConfig,
    pub walkable: WalkableConfigDefaults,
    pub xr: XrConfig,
    pub assets: AssetConfig,
}

impl ViewerConfig {
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Loads the config named on the command line / environment, or defaults.
    /// A broken config file is reported and replaced by defaults rather than aborting.
    pub fn resolve() -> Self {
        let Some(path) = resolve_config_path() else {
            return Self::default();
        };
        match Self::load(&path) {
            Ok(cfg) => {
                log::info!("loaded viewer config from {}", path.display());
                cfg
            }
            Err(e) => {
                log::warn!("ignoring config {}: {}", path.display(), e);
                Self::default()
            }
        }
    }
}

fn resolve_config_path() -> Option<PathBuf> {
    let mut it = std::env::args();
    while let Some(a) = it.next() {
        if a == "--config" {
            if let Some(v) = it.next() {
                return Some(PathBuf::from(v));
            }
        }
    }

    match std::env::var("TOUR_VIEWER_CONFIG") {
        Ok(v) if !v.trim().is_empty() => Some(PathBuf::from(v)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg = ViewerConfig::from_json_str(r#"{"panorama":{"damping":0.3},"xr":{"dwellSeconds":2.0}}"#).unwrap();
        assert_eq!(cfg.panorama.damping, 0.3);
        assert_eq!(cfg.panorama.fov_min, 30.0);
        assert_eq!(cfg.xr.dwell_seconds, 2.0);
        assert_eq!(cfg.walkable.player_height, 1.7);
    }

    #[test]
    fn damping_mode_json() {
        let cfg = ViewerConfig::from_json_str(
            r#"{"panorama":{"dampingMode":{"kind":"frameRateIndependent","referenceFps":60}}}"#,
        )
        .unwrap();
        assert_eq!(
            cfg.panorama.damping_mode,
            DampingMode::FrameRateIndependent { reference_fps: 60.0 }
        );
    }

    #[test]
    fn bad_json_is_an_error() {
        assert!(matches!(ViewerConfig::from_json_str("{"), Err(ConfigError::Json(_))));
    }
}
