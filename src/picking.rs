// picking.rs — 热点标记的摆放与射线拾取

use crate::geometry::{cartesian_to_spherical, ray_billboard, ray_sphere, spherical_to_cartesian, Ray};
use crate::markers::{HotspotMarker, MarkerStyle};
use crate::tour::{AngularPosition, Hotspot};
use glam::Vec3;

/// Markers of the loaded scene. Rebuilt on every load, emptied on unload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarkerSet {
    markers: Vec<HotspotMarker>,
}

impl MarkerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 全景模式：yaw/pitch 投到半径 `radius` 的球面上（略小于背景球，保证在前面）
    pub fn for_panorama(hotspots: &[Hotspot], radius: f32, style: &MarkerStyle) -> Self {
        let markers = hotspots
            .iter()
            .enumerate()
            .filter_map(|(i, h)| match h.position {
                Some(p) => Some(HotspotMarker::new(i, h, spherical_to_cartesian(p.yaw, p.pitch, radius), style)),
                None => {
                    log::debug!("hotspot {} has no angular position, skipped", h.id);
                    None
                }
            })
            .collect();
        Self { markers }
    }

    /// 漫游模式：直接使用 position3d，没有的跳过
    pub fn for_walkable(hotspots: &[Hotspot], style: &MarkerStyle) -> Self {
        let markers = hotspots
            .iter()
            .enumerate()
            .filter_map(|(i, h)| match h.position3d {
                Some(p) => Some(HotspotMarker::new(i, h, p.into(), style)),
                None => {
                    log::debug!("hotspot {} has no 3d position, skipped", h.id);
                    None
                }
            })
            .collect();
        Self { markers }
    }

    pub fn markers(&self) -> &[HotspotMarker] {
        &self.markers
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn clear(&mut self) {
        self.markers.clear();
    }

    pub fn animate(&mut self, elapsed: f32) {
        for m in &mut self.markers {
            m.animate(elapsed);
        }
    }

    /// Hotspot index of the nearest marker hit by `ray`. Markers are quads
    /// spanned by the camera's `right`/`up`, so they always face the viewer.
    pub fn pick(&self, ray: &Ray, right: Vec3, up: Vec3) -> Option<usize> {
        self.markers
            .iter()
            .filter_map(|m| {
                ray_billboard(ray, m.position, right, up, m.half_extent()).map(|t| (t, m.hotspot_index))
            })
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, idx)| idx)
    }

    pub fn marker_for(&self, hotspot_index: usize) -> Option<&HotspotMarker> {
        self.markers.iter().find(|m| m.hotspot_index == hotspot_index)
    }
}

/// Angular position of whatever `ray` hits on the background sphere (the hotspot editor's "place here").
pub fn angles_at(ray: &Ray, sphere_radius: f32) -> Option<AngularPosition> {
    let t = ray_sphere(ray, Vec3::ZERO, sphere_radius)?;
    let (yaw, pitch) = cartesian_to_spherical(ray.at(t));
    Some(AngularPosition { yaw, pitch })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tour::{HotspotType, Point3};

    fn style() -> MarkerStyle {
        MarkerStyle { icon_size: 18.0, ring_size: 28.0, float_amplitude: 1.5 }
    }

    fn at(id: &str, yaw: f32, pitch: f32) -> Hotspot {
        let mut h = Hotspot::new(id, HotspotType::Info);
        h.position = Some(AngularPosition { yaw, pitch });
        h
    }

    #[test]
    fn panorama_skips_unplaced() {
        let mut walk_only = Hotspot::new("w", HotspotType::Info);
        walk_only.position3d = Some(Point3::new(1.0, 1.0, 1.0));
        let set = MarkerSet::for_panorama(&[at("a", 0.0, 0.0), walk_only, at("b", 90.0, 0.0)], 450.0, &style());
        assert_eq!(set.len(), 2);
        assert_eq!(set.markers()[1].hotspot_index, 2);
        assert!((set.markers()[1].position - Vec3::new(0.0, 0.0, 450.0)).length() < 1e-3);
    }

    #[test]
    fn picks_nearest() {
        let mut near = Hotspot::new("near", HotspotType::Info);
        near.position3d = Some(Point3::new(0.0, 0.0, -3.0));
        let mut far = Hotspot::new("far", HotspotType::Info);
        far.position3d = Some(Point3::new(0.0, 0.0, -6.0));
        let set = MarkerSet::for_walkable(&[far, near], &MarkerStyle { icon_size: 0.35, ring_size: 0.5, float_amplitude: 0.05 });

        let ray = Ray::new(Vec3::ZERO, -Vec3::Z);
        assert_eq!(set.pick(&ray, Vec3::X, Vec3::Y), Some(1));
        let miss = Ray::new(Vec3::ZERO, Vec3::new(1.0, 0.0, -1.0));
        assert_eq!(set.pick(&miss, Vec3::X, Vec3::Y), None);
    }

    #[test]
    fn angles_at_inverts_placement() {
        let dir = spherical_to_cartesian(-120.0, -30.0, 1.0);
        let a = angles_at(&Ray::new(Vec3::ZERO, dir), 500.0).unwrap();
        assert!((a.yaw + 120.0).abs() < 1e-2);
        assert!((a.pitch + 30.0).abs() < 1e-2);
    }
}
