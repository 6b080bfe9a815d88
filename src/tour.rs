// tour.rs — 导览数据模型（与外部持久化/编辑层约定的 JSON 结构）

use crate::error::TourError;
use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::path::Path;

const DEMO_TOUR_JSON: &str = include_str!("../assets/tours/demo.json");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SceneMode {
    #[default]
    Panorama,
    Walkable,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InitialView {
    pub yaw: f32,
    pub pitch: f32,
    pub fov: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AngularPosition {
    pub yaw: f32,
    pub pitch: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Point3 {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

impl From<Point3> for Vec3 {
    fn from(p: Point3) -> Self {
        Vec3::new(p.x, p.y, p.z)
    }
}

impl From<Vec3> for Point3 {
    fn from(v: Vec3) -> Self {
        Point3::new(v.x, v.y, v.z)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HotspotType {
    Navigation,
    Info,
    Image,
    Video,
    Link,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkTarget {
    #[serde(rename = "_blank")]
    Blank,
    #[serde(rename = "_self")]
    SameWindow,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hotspot {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: HotspotType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<AngularPosition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position3d: Option<Point3>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tooltip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_scene: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teleport_to: Option<Point3>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_alt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_target: Option<LinkTarget>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pulse_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<f32>,
}

impl Hotspot {
    /// Minimal hotspot of the given kind; every optional field empty.
    pub fn new(id: impl Into<String>, kind: HotspotType) -> Self {
        Self {
            id: id.into(),
            kind,
            position: None,
            position3d: None,
            tooltip: None,
            icon: None,
            title: None,
            content: None,
            target_scene: None,
            teleport_to: None,
            image_url: None,
            image_alt: None,
            video_url: None,
            link_url: None,
            link_target: None,
            pulse_color: None,
            scale: None,
        }
    }

    pub fn is_navigation(&self) -> bool {
        self.kind == HotspotType::Navigation
    }

    /// `scale` 缺省或非正数时按 1 处理
    pub fn base_scale(&self) -> f32 {
        match self.scale {
            Some(s) if s > 0.0 => s,
            _ => 1.0,
        }
    }

    /// In-room teleport: navigation with a teleport target but nowhere else to go.
    pub fn is_in_room_teleport(&self) -> bool {
        self.is_navigation() && self.teleport_to.is_some() && self.target_scene.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimitiveKind {
    Box,
    Cylinder,
    Plane,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FurnitureItem {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub kind: PrimitiveKind,
    pub position: Point3,
    #[serde(default)]
    pub rotation: Option<Point3>,
    pub scale: Point3,
    pub color: String,
    #[serde(default)]
    pub emissive: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub collision: Option<bool>,
}

impl FurnitureItem {
    pub fn collides(&self) -> bool {
        self.collision.unwrap_or(true)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LightKind {
    Ambient,
    Point,
    Spot,
    Directional,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LightConfig {
    #[serde(rename = "type")]
    pub kind: LightKind,
    pub color: String,
    pub intensity: f32,
    #[serde(default)]
    pub position: Option<Point3>,
    #[serde(default)]
    pub target: Option<Point3>,
    #[serde(default)]
    pub distance: Option<f32>,
    #[serde(default)]
    pub angle: Option<f32>,
    #[serde(default)]
    pub penumbra: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalkableConfig {
    pub room_width: f32,
    pub room_depth: f32,
    pub room_height: f32,
    pub wall_color: String,
    pub floor_color: String,
    pub ceiling_color: String,
    pub spawn_position: Point3,
    pub spawn_look_at: Point3,
    #[serde(default)]
    pub furniture: Vec<FurnitureItem>,
    #[serde(default)]
    pub lights: Vec<LightConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub mode: SceneMode,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub initial_view: Option<InitialView>,
    #[serde(default)]
    pub walkable_config: Option<WalkableConfig>,
    #[serde(default)]
    pub hotspots: Vec<Hotspot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TourConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    pub default_scene: String,
    pub scenes: Vec<Scene>,
}

impl TourConfig {
    pub fn from_json_str(text: &str) -> Result<Self, TourError> {
        let tour: TourConfig = serde_json::from_str(text)?;
        if tour.scenes.is_empty() {
            return Err(TourError::Empty);
        }
        Ok(tour)
    }

    pub fn load(path: &Path) -> Result<Self, TourError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// 内置演示导览
    pub fn demo() -> Result<Self, TourError> {
        Self::from_json_str(DEMO_TOUR_JSON)
    }

    pub fn scene(&self, id: &str) -> Option<&Scene> {
        self.scenes.iter().find(|s| s.id == id)
    }

    /// Declared default scene, or the first one when the id is dangling.
    pub fn default_scene(&self) -> Option<&Scene> {
        self.scene(&self.default_scene).or_else(|| self.scenes.first())
    }

    /// Image URLs of panorama scenes reachable from `scene` through navigation hotspots.
    pub fn adjacent_panorama_urls(&self, scene: &Scene) -> Vec<String> {
        let mut urls: Vec<String> = Vec::new();
        for h in scene.hotspots.iter().filter(|h| h.is_navigation()) {
            let Some(target) = h.target_scene.as_deref().and_then(|id| self.scene(id)) else {
                continue;
            };
            if target.mode == SceneMode::Panorama
                && !target.image_url.is_empty()
                && !urls.contains(&target.image_url)
            {
                urls.push(target.image_url.clone());
            }
        }
        urls
    }
}

/// `#rgb` / `#rrggbb` → linear-ish RGB in 0..1. Bad input logs and returns mid grey.
pub fn parse_hex_color(s: &str) -> [f32; 3] {
    let hex = s.trim().trim_start_matches('#');
    let expanded: String = match hex.len() {
        3 => hex.chars().flat_map(|c| [c, c]).collect(),
        6 => hex.to_string(),
        _ => {
            log::warn!("invalid color {:?}, using grey", s);
            return [0.5, 0.5, 0.5];
        }
    };
    match u32::from_str_radix(&expanded, 16) {
        Ok(v) => [
            ((v >> 16) & 0xff) as f32 / 255.0,
            ((v >> 8) & 0xff) as f32 / 255.0,
            (v & 0xff) as f32 / 255.0,
        ],
        Err(_) => {
            log::warn!("invalid color {:?}, using grey", s);
            [0.5, 0.5, 0.5]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hotspot_json() {
        let json = r#"{
            "id": "lr-to-kitchen",
            "type": "navigation",
            "position": { "yaw": -120, "pitch": -30 },
            "tooltip": "Walk to Kitchen",
            "targetScene": "kitchen",
            "linkTarget": "_blank"
        }"#;
        let h: Hotspot = serde_json::from_str(json).unwrap();
        assert_eq!(h.kind, HotspotType::Navigation);
        assert_eq!(h.target_scene.as_deref(), Some("kitchen"));
        assert_eq!(h.position.unwrap().yaw, -120.0);
        assert!(h.position3d.is_none());
        assert_eq!(h.link_target, Some(LinkTarget::Blank));
        assert_eq!(h.base_scale(), 1.0);
    }

    #[test]
    fn scene_mode_defaults_to_panorama() {
        let s: Scene = serde_json::from_str(r#"{"id":"a","name":"A","imageUrl":"a.jpg"}"#).unwrap();
        assert_eq!(s.mode, SceneMode::Panorama);
        assert!(s.hotspots.is_empty());
    }

    #[test]
    fn furniture_collision_defaults_true() {
        let f: FurnitureItem = serde_json::from_str(
            r##"{"type":"box","position":{"x":3,"y":0.4,"z":-1},"scale":{"x":2.4,"y":0.8,"z":0.9},"color":"#555555"}"##,
        )
        .unwrap();
        assert!(f.collides());
    }

    #[test]
    fn demo_tour_loads() {
        let tour = TourConfig::demo().unwrap();
        let first = tour.default_scene().unwrap();
        assert_eq!(first.id, tour.default_scene);
        assert!(tour.scenes.iter().any(|s| s.mode == SceneMode::Walkable));
        let urls = tour.adjacent_panorama_urls(first);
        assert!(!urls.is_empty());
    }

    #[test]
    fn dangling_default_scene_falls_back() {
        let tour = TourConfig::from_json_str(
            r#"{"id":"t","name":"T","defaultScene":"nope","scenes":[{"id":"a","name":"A"}]}"#,
        )
        .unwrap();
        assert_eq!(tour.default_scene().unwrap().id, "a");
    }

    #[test]
    fn empty_tour_is_an_error() {
        let err = TourConfig::from_json_str(r#"{"id":"t","name":"T","defaultScene":"a","scenes":[]}"#);
        assert!(matches!(err, Err(TourError::Empty)));
    }

    #[test]
    fn hex_colors() {
        assert_eq!(parse_hex_color("#ffffff"), [1.0, 1.0, 1.0]);
        assert_eq!(parse_hex_color("#000"), [0.0, 0.0, 0.0]);
        assert_eq!(parse_hex_color("oops"), [0.5, 0.5, 0.5]);
    }
}
