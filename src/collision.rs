// collision.rs — 漫游模式碰撞：房间边界（内缩玩家半径）+ 家具包围盒，沿轴滑动

use crate::config::WalkableConfigDefaults;
use crate::geometry::Aabb;
use crate::mesh::{furniture_transform, primitive_bounds};
use crate::tour::{FurnitureItem, WalkableConfig};
use glam::Vec3;

/// World AABB of a furniture primitive after rotation and translation.
pub fn furniture_bounds(item: &FurnitureItem) -> Aabb {
    primitive_bounds(item).transformed(furniture_transform(item))
}

#[derive(Debug, Clone, PartialEq)]
pub struct Collider {
    /// `None` = 没有房间配置，不限制
    room: Option<Aabb>,
    boxes: Vec<Aabb>,
    player_height: f32,
    player_radius: f32,
}

impl Collider {
    pub fn new(cfg: &WalkableConfig, defaults: &WalkableConfigDefaults) -> Self {
        let (hw, hd) = (cfg.room_width * 0.5, cfg.room_depth * 0.5);
        let room = Aabb::new(Vec3::new(-hw, 0.0, -hd), Vec3::new(hw, cfg.room_height, hd)).inset_xz(defaults.player_radius);
        let boxes = cfg
            .furniture
            .iter()
            .filter(|f| f.collides())
            .map(furniture_bounds)
            .collect();
        Self {
            room: Some(room),
            boxes,
            player_height: defaults.player_height,
            player_radius: defaults.player_radius,
        }
    }

    pub fn unbounded(defaults: &WalkableConfigDefaults) -> Self {
        Self {
            room: None,
            boxes: Vec::new(),
            player_height: defaults.player_height,
            player_radius: defaults.player_radius,
        }
    }

    pub fn boxes(&self) -> &[Aabb] {
        &self.boxes
    }

    pub fn room_bounds(&self) -> Option<Aabb> {
        self.room
    }

    fn player_box(&self, pos: Vec3) -> Aabb {
        Aabb::from_center_size(
            Vec3::new(pos.x, self.player_height * 0.5, pos.z),
            Vec3::new(self.player_radius * 2.0, self.player_height, self.player_radius * 2.0),
        )
    }

    /// 房间内（按眼高判断）且不与任何家具相交
    pub fn is_position_valid(&self, pos: Vec3) -> bool {
        if let Some(room) = &self.room {
            if !room.contains_point(Vec3::new(pos.x, self.player_height, pos.z)) {
                return false;
            }
        }
        let player = self.player_box(pos);
        !self.boxes.iter().any(|b| player.intersects(b))
    }

    /// Full move if clear, else slide along X, else along Z, else stay.
    pub fn resolve_move(&self, current: Vec3, proposed: Vec3) -> Vec3 {
        if self.is_position_valid(proposed) {
            return proposed;
        }
        let x_only = Vec3::new(proposed.x, current.y, current.z);
        if self.is_position_valid(x_only) {
            return x_only;
        }
        let z_only = Vec3::new(current.x, current.y, proposed.z);
        if self.is_position_valid(z_only) {
            return z_only;
        }
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tour::{Point3, PrimitiveKind};

    fn sofa() -> FurnitureItem {
        FurnitureItem {
            id: Some("sofa".into()),
            kind: PrimitiveKind::Box,
            position: Point3::new(3.0, 0.4, -1.0),
            rotation: None,
            scale: Point3::new(2.4, 0.8, 0.9),
            color: "#555555".into(),
            emissive: None,
            label: None,
            collision: None,
        }
    }

    fn room(furniture: Vec<FurnitureItem>) -> WalkableConfig {
        WalkableConfig {
            room_width: 10.0,
            room_depth: 8.0,
            room_height: 3.0,
            wall_color: "#ffffff".into(),
            floor_color: "#888888".into(),
            ceiling_color: "#ffffff".into(),
            spawn_position: Point3::new(0.0, 1.7, 2.0),
            spawn_look_at: Point3::new(0.0, 1.7, 0.0),
            furniture,
            lights: Vec::new(),
        }
    }

    #[test]
    fn walls_are_inset_by_radius() {
        let c = Collider::new(&room(vec![]), &WalkableConfigDefaults::default());
        assert!(c.is_position_valid(Vec3::new(4.69, 1.7, 0.0)));
        assert!(!c.is_position_valid(Vec3::new(4.71, 1.7, 0.0)));
        assert!(!c.is_position_valid(Vec3::new(0.0, 1.7, -3.8)));
    }

    #[test]
    fn sofa_blocks_and_slides() {
        let c = Collider::new(&room(vec![sofa()]), &WalkableConfigDefaults::default());
        assert!(!c.is_position_valid(Vec3::new(3.0, 1.7, -1.0)));
        assert!(c.is_position_valid(Vec3::new(3.0, 1.7, 2.0)));

        // 斜着撞上沙发前沿：Z 被挡，X 分量保留
        let from = Vec3::new(3.0, 1.7, -0.2);
        let to = Vec3::new(3.2, 1.7, -0.4);
        let got = c.resolve_move(from, to);
        assert_eq!(got, Vec3::new(3.2, 1.7, -0.2));
    }

    #[test]
    fn non_colliding_furniture_is_ignored() {
        let mut rug = sofa();
        rug.collision = Some(false);
        let c = Collider::new(&room(vec![rug]), &WalkableConfigDefaults::default());
        assert!(c.boxes().is_empty());
        assert!(c.is_position_valid(Vec3::new(3.0, 1.7, -1.0)));
    }

    #[test]
    fn cylinder_uses_diameter() {
        let mut lamp = sofa();
        lamp.kind = PrimitiveKind::Cylinder;
        lamp.scale = Point3::new(1.0, 2.0, 7.0);
        let b = furniture_bounds(&lamp);
        assert!((b.max.z - b.min.z - 1.0).abs() < 1e-5);
        assert!((b.max.y - b.min.y - 2.0).abs() < 1e-5);
    }
}
