// mesh.rs — 漫游房间网格生成：地板/天花板/四面墙 + 家具基本体（长方体、圆柱、平面）
// 顶点带颜色和自发光，灯光打包成 uniform 数组

use crate::geometry::Aabb;
use crate::tour::{parse_hex_color, FurnitureItem, LightConfig, LightKind, PrimitiveKind, WalkableConfig};
use bytemuck::{Pod, Zeroable};
use glam::{Mat3, Mat4, Vec3};

pub const CYLINDER_SEGMENTS: usize = 16;
pub const MAX_LIGHTS: usize = 8;
pub const EMISSIVE_INTENSITY: f32 = 0.3;
pub const FOG_COLOR: [f32; 3] = [0x1a as f32 / 255.0; 3];
pub const FOG_NEAR: f32 = 12.0;
pub const FOG_FAR: f32 = 30.0;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct RoomVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub color: [f32; 3],
    pub emissive: [f32; 3],
}

/// std140-friendly light record.
///
/// - `position.w`: kind (0 ambient, 1 point, 2 spot, 3 directional)
/// - `color.w`: range, 0 = unlimited
/// - `direction.w`: cos of the spot cone
/// - `params.x`: cos of the inner (full-strength) cone
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct PackedLight {
    pub position: [f32; 4],
    pub color: [f32; 4],
    pub direction: [f32; 4],
    pub params: [f32; 4],
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoomMesh {
    pub vertices: Vec<RoomVertex>,
    pub indices: Vec<u32>,
    pub lights: Vec<PackedLight>,
    pub fog_color: [f32; 3],
    pub fog_near: f32,
    pub fog_far: f32,
}

struct MeshBuilder {
    vertices: Vec<RoomVertex>,
    indices: Vec<u32>,
}

impl MeshBuilder {
    fn new() -> Self {
        Self {
            vertices: Vec::new(),
            indices: Vec::new(),
        }
    }

    /// Appends a quad given counter-clockwise corners (seen from the front).
    fn quad(&mut self, corners: [Vec3; 4], normal: Vec3, color: [f32; 3], emissive: [f32; 3]) {
        let base = self.vertices.len() as u32;
        for c in corners {
            self.vertices.push(RoomVertex {
                position: c.to_array(),
                normal: normal.to_array(),
                color,
                emissive,
            });
        }
        self.indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    /// Appends everything built by `f` in local space, then moves it by `transform`.
    fn transformed(&mut self, transform: Mat4, f: impl FnOnce(&mut MeshBuilder)) {
        let start = self.vertices.len();
        f(self);
        let normal_m = Mat3::from_mat4(transform).inverse().transpose();
        for v in &mut self.vertices[start..] {
            v.position = transform.transform_point3(Vec3::from(v.position)).to_array();
            v.normal = (normal_m * Vec3::from(v.normal)).normalize_or_zero().to_array();
        }
    }

    fn cuboid(&mut self, size: Vec3, color: [f32; 3], emissive: [f32; 3]) {
        let h = size * 0.5;
        let p = |x: f32, y: f32, z: f32| Vec3::new(x * h.x, y * h.y, z * h.z);
        // +X -X +Y -Y +Z -Z
        self.quad([p(1., -1., 1.), p(1., -1., -1.), p(1., 1., -1.), p(1., 1., 1.)], Vec3::X, color, emissive);
        self.quad([p(-1., -1., -1.), p(-1., -1., 1.), p(-1., 1., 1.), p(-1., 1., -1.)], Vec3::NEG_X, color, emissive);
        self.quad([p(-1., 1., 1.), p(1., 1., 1.), p(1., 1., -1.), p(-1., 1., -1.)], Vec3::Y, color, emissive);
        self.quad([p(-1., -1., -1.), p(1., -1., -1.), p(1., -1., 1.), p(-1., -1., 1.)], Vec3::NEG_Y, color, emissive);
        self.quad([p(-1., -1., 1.), p(1., -1., 1.), p(1., 1., 1.), p(-1., 1., 1.)], Vec3::Z, color, emissive);
        self.quad([p(1., -1., -1.), p(-1., -1., -1.), p(-1., 1., -1.), p(1., 1., -1.)], Vec3::NEG_Z, color, emissive);
    }

    /// Y 轴向圆柱，侧面 + 上下盖
    fn cylinder(&mut self, radius: f32, height: f32, color: [f32; 3], emissive: [f32; 3]) {
        let hy = height * 0.5;
        let ring = |j: usize| {
            let phi = 2.0 * std::f32::consts::PI * (j as f32) / (CYLINDER_SEGMENTS as f32);
            (phi.cos(), phi.sin())
        };

        for j in 0..CYLINDER_SEGMENTS {
            let (c0, s0) = ring(j);
            let (c1, s1) = ring(j + 1);
            let a = Vec3::new(radius * c0, -hy, radius * s0);
            let b = Vec3::new(radius * c1, -hy, radius * s1);
            let base = self.vertices.len() as u32;
            for (pos, (c, s)) in [(a, (c0, s0)), (b, (c1, s1)), (b + Vec3::Y * height, (c1, s1)), (a + Vec3::Y * height, (c0, s0))] {
                self.vertices.push(RoomVertex {
                    position: pos.to_array(),
                    normal: [c, 0.0, s],
                    color,
                    emissive,
                });
            }
            // 外侧朝向：从外面看是逆时针
            self.indices.extend_from_slice(&[base, base + 2, base + 1, base, base + 3, base + 2]);
        }

        for (y, normal) in [(hy, Vec3::Y), (-hy, Vec3::NEG_Y)] {
            let center = self.vertices.len() as u32;
            self.vertices.push(RoomVertex {
                position: [0.0, y, 0.0],
                normal: normal.to_array(),
                color,
                emissive,
            });
            for j in 0..=CYLINDER_SEGMENTS {
                let (c, s) = ring(j);
                self.vertices.push(RoomVertex {
                    position: [radius * c, y, radius * s],
                    normal: normal.to_array(),
                    color,
                    emissive,
                });
            }
            for j in 0..CYLINDER_SEGMENTS as u32 {
                let (a, b) = (center + 1 + j, center + 2 + j);
                if y > 0.0 {
                    self.indices.extend_from_slice(&[center, b, a]);
                } else {
                    self.indices.extend_from_slice(&[center, a, b]);
                }
            }
        }
    }

    /// XY 平面，法线 +Z
    fn plane(&mut self, width: f32, height: f32, color: [f32; 3], emissive: [f32; 3]) {
        let (hx, hy) = (width * 0.5, height * 0.5);
        self.quad(
            [
                Vec3::new(-hx, -hy, 0.0),
                Vec3::new(hx, -hy, 0.0),
                Vec3::new(hx, hy, 0.0),
                Vec3::new(-hx, hy, 0.0),
            ],
            Vec3::Z,
            color,
            emissive,
        );
    }
}

/// Local-space bounds of a primitive before rotation/translation.
pub fn primitive_bounds(item: &FurnitureItem) -> Aabb {
    let s = Vec3::from(item.scale);
    let size = match item.kind {
        PrimitiveKind::Box => s,
        PrimitiveKind::Cylinder => Vec3::new(s.x, s.y, s.x),
        PrimitiveKind::Plane => Vec3::new(s.x, s.y, 0.0),
    };
    Aabb::from_center_size(Vec3::ZERO, size)
}

/// 平移 × 欧拉 XYZ 旋转
pub fn furniture_transform(item: &FurnitureItem) -> Mat4 {
    let r = item.rotation.map(Vec3::from).unwrap_or(Vec3::ZERO);
    Mat4::from_translation(item.position.into())
        * Mat4::from_rotation_x(r.x)
        * Mat4::from_rotation_y(r.y)
        * Mat4::from_rotation_z(r.z)
}

fn emissive_of(item: &FurnitureItem) -> [f32; 3] {
    match item.emissive.as_deref() {
        Some(hex) => parse_hex_color(hex).map(|c| c * EMISSIVE_INTENSITY),
        None => [0.0; 3],
    }
}

/// Builds the static geometry of a walkable room.
pub fn build_room(cfg: &WalkableConfig) -> RoomMesh {
    let (w, d, h) = (cfg.room_width, cfg.room_depth, cfg.room_height);
    let (hw, hd) = (w * 0.5, d * 0.5);
    let floor = parse_hex_color(&cfg.floor_color);
    let ceiling = parse_hex_color(&cfg.ceiling_color);
    let wall = parse_hex_color(&cfg.wall_color);
    let none = [0.0; 3];
    let v = Vec3::new;

    let mut b = MeshBuilder::new();
    b.quad([v(-hw, 0.0, hd), v(hw, 0.0, hd), v(hw, 0.0, -hd), v(-hw, 0.0, -hd)], Vec3::Y, floor, none);
    b.quad([v(-hw, h, -hd), v(hw, h, -hd), v(hw, h, hd), v(-hw, h, hd)], Vec3::NEG_Y, ceiling, none);
    // 四面墙，法线朝内
    b.quad([v(-hw, 0.0, -hd), v(hw, 0.0, -hd), v(hw, h, -hd), v(-hw, h, -hd)], Vec3::Z, wall, none);
    b.quad([v(hw, 0.0, hd), v(-hw, 0.0, hd), v(-hw, h, hd), v(hw, h, hd)], Vec3::NEG_Z, wall, none);
    b.quad([v(-hw, 0.0, hd), v(-hw, 0.0, -hd), v(-hw, h, -hd), v(-hw, h, hd)], Vec3::X, wall, none);
    b.quad([v(hw, 0.0, -hd), v(hw, 0.0, hd), v(hw, h, hd), v(hw, h, -hd)], Vec3::NEG_X, wall, none);

    for item in &cfg.furniture {
        let color = parse_hex_color(&item.color);
        let emissive = emissive_of(item);
        let s = Vec3::from(item.scale);
        b.transformed(furniture_transform(item), |b| match item.kind {
            PrimitiveKind::Box => b.cuboid(s, color, emissive),
            PrimitiveKind::Cylinder => b.cylinder(s.x * 0.5, s.y, color, emissive),
            PrimitiveKind::Plane => b.plane(s.x, s.y, color, emissive),
        });
    }

    RoomMesh {
        vertices: b.vertices,
        indices: b.indices,
        lights: pack_lights(&cfg.lights),
        fog_color: FOG_COLOR,
        fog_near: FOG_NEAR,
        fog_far: FOG_FAR,
    }
}

pub fn pack_lights(lights: &[LightConfig]) -> Vec<PackedLight> {
    if lights.len() > MAX_LIGHTS {
        log::warn!("room declares {} lights, only the first {} are used", lights.len(), MAX_LIGHTS);
    }
    lights.iter().take(MAX_LIGHTS).map(pack_light).collect()
}

fn pack_light(l: &LightConfig) -> PackedLight {
    let c = parse_hex_color(&l.color).map(|c| c * l.intensity);
    let pos = l.position.map(Vec3::from);
    let target = l.target.map(Vec3::from).unwrap_or(Vec3::ZERO);
    let (kind, pos) = match l.kind {
        LightKind::Ambient => (0.0, Vec3::ZERO),
        LightKind::Point => (1.0, pos.unwrap_or(Vec3::ZERO)),
        LightKind::Spot => (2.0, pos.unwrap_or(Vec3::ZERO)),
        // 平行光缺省从正上方照下
        LightKind::Directional => (3.0, pos.unwrap_or(Vec3::Y)),
    };
    let dir = (target - pos).normalize_or(Vec3::NEG_Y);
    let angle = l.angle.unwrap_or(std::f32::consts::FRAC_PI_6);
    let penumbra = l.penumbra.unwrap_or(0.0).clamp(0.0, 1.0);
    PackedLight {
        position: [pos.x, pos.y, pos.z, kind],
        color: [c[0], c[1], c[2], l.distance.unwrap_or(0.0).max(0.0)],
        direction: [dir.x, dir.y, dir.z, angle.cos()],
        params: [(angle * (1.0 - penumbra)).cos(), 0.0, 0.0, 0.0],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tour::Point3;

    fn room() -> WalkableConfig {
        serde_json::from_str(
            r##"{
                "roomWidth": 10, "roomDepth": 8, "roomHeight": 3,
                "wallColor": "#e8e0d8", "floorColor": "#8b7355", "ceilingColor": "#f5f5f5",
                "spawnPosition": {"x":0,"y":1.7,"z":2}, "spawnLookAt": {"x":0,"y":1.7,"z":0},
                "furniture": [
                    {"type":"box","position":{"x":3,"y":0.4,"z":-1},"scale":{"x":2.4,"y":0.8,"z":0.9},"color":"#555555"},
                    {"type":"cylinder","position":{"x":-2,"y":0.5,"z":0},"scale":{"x":1,"y":1,"z":1},"color":"#aa8866","emissive":"#ffffff"}
                ],
                "lights": [
                    {"type":"ambient","color":"#ffffff","intensity":0.5},
                    {"type":"spot","color":"#ffffff","intensity":1,"position":{"x":0,"y":3,"z":0}}
                ]
            }"##,
        )
        .unwrap()
    }

    #[test]
    fn room_has_walls_and_furniture() {
        let mesh = build_room(&room());
        // 6 个面 + 长方体 6 面 = 12 个四边形
        let quads = 12 * 4;
        let cyl_side = CYLINDER_SEGMENTS * 4;
        let cyl_caps = 2 * (CYLINDER_SEGMENTS + 2);
        assert_eq!(mesh.vertices.len(), quads + cyl_side + cyl_caps);
        assert!(mesh.indices.iter().all(|&i| (i as usize) < mesh.vertices.len()));
        assert_eq!(mesh.lights.len(), 2);
    }

    #[test]
    fn emissive_is_scaled() {
        let mesh = build_room(&room());
        let lit = mesh.vertices.iter().find(|v| v.emissive[0] > 0.0).unwrap();
        assert!((lit.emissive[0] - EMISSIVE_INTENSITY).abs() < 1e-6);
    }

    #[test]
    fn rotated_box_bounds() {
        let mut item = room().furniture[0].clone();
        item.rotation = Some(Point3::new(0.0, std::f32::consts::FRAC_PI_2, 0.0));
        let world = primitive_bounds(&item).transformed(furniture_transform(&item));
        // 绕 Y 转 90°，X/Z 尺寸互换
        assert!((world.max.x - world.min.x - 0.9).abs() < 1e-4);
        assert!((world.max.z - world.min.z - 2.4).abs() < 1e-4);
    }

    #[test]
    fn spot_defaults() {
        let mesh = build_room(&room());
        let spot = mesh.lights[1];
        assert_eq!(spot.position[3], 2.0);
        assert!((spot.direction[1] + 1.0).abs() < 1e-6);
        assert!((spot.direction[3] - std::f32::consts::FRAC_PI_6.cos()).abs() < 1e-6);
    }

    #[test]
    fn light_overflow_is_truncated() {
        let l = room().lights[0].clone();
        assert_eq!(pack_lights(&vec![l; 11]).len(), MAX_LIGHTS);
    }
}
