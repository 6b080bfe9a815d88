// geometry.rs — 几何工具：球面/笛卡尔换算、射线求交、AABB、缓动函数
//
// 坐标系：Y 轴朝上，右手系。全景球从内部观察，yaw=0 指向 +X，yaw 增大转向 +Z。

use glam::{Mat4, Vec2, Vec3};

/// Degrees → point on a sphere of `radius` (Y-up, viewed from inside).
///
/// `phi = 90° - pitch`, `theta = yaw`; identical to the hotspot placement
/// formula so that the camera looking at (yaw, pitch) sees the hotspot centered.
pub fn spherical_to_cartesian(yaw_deg: f32, pitch_deg: f32, radius: f32) -> Vec3 {
    let phi = (90.0 - pitch_deg).to_radians();
    let theta = yaw_deg.to_radians();
    Vec3::new(
        radius * phi.sin() * theta.cos(),
        radius * phi.cos(),
        radius * phi.sin() * theta.sin(),
    )
}

/// Inverse of [`spherical_to_cartesian`]. Returns `(yaw, pitch)` in degrees.
/// At the poles yaw is undefined and comes back as whatever `atan2` yields.
pub fn cartesian_to_spherical(p: Vec3) -> (f32, f32) {
    let r = p.length();
    if r <= f32::EPSILON {
        return (0.0, 0.0);
    }
    let pitch = (p.y / r).clamp(-1.0, 1.0).asin().to_degrees();
    let yaw = p.z.atan2(p.x).to_degrees();
    (yaw, pitch)
}

/// 角度归一化到 [-180, 180)
pub fn wrap_degrees(angle: f32) -> f32 {
    (angle + 180.0).rem_euclid(360.0) - 180.0
}

/// Signed difference `to - from` folded into [-180, 180), i.e. the short way round.
pub fn shortest_angle_delta(from: f32, to: f32) -> f32 {
    wrap_degrees(to - from)
}

/// Pixel coordinates (origin top-left) → normalized device coordinates.
pub fn pointer_to_ndc(x: f32, y: f32, width: f32, height: f32) -> Vec2 {
    if width <= 0.0 || height <= 0.0 {
        return Vec2::ZERO;
    }
    Vec2::new((x / width) * 2.0 - 1.0, -(y / height) * 2.0 + 1.0)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Ray {
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize_or_zero(),
        }
    }

    /// Ray through an NDC point, unprojected with the inverse view-projection.
    pub fn from_ndc(ndc: Vec2, inv_view_proj: Mat4) -> Self {
        let near = inv_view_proj.project_point3(Vec3::new(ndc.x, ndc.y, 0.0));
        let far = inv_view_proj.project_point3(Vec3::new(ndc.x, ndc.y, 1.0));
        Self::new(near, far - near)
    }

    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }
}

/// Nearest non-negative hit distance of `ray` against a sphere.
/// From inside the sphere this is the exit point, which is what panorama picking wants.
pub fn ray_sphere(ray: &Ray, center: Vec3, radius: f32) -> Option<f32> {
    let oc = ray.origin - center;
    let b = oc.dot(ray.direction);
    let c = oc.length_squared() - radius * radius;
    let disc = b * b - c;
    if disc < 0.0 {
        return None;
    }
    let sq = disc.sqrt();
    let t0 = -b - sq;
    let t1 = -b + sq;
    if t0 >= 0.0 {
        Some(t0)
    } else if t1 >= 0.0 {
        Some(t1)
    } else {
        None
    }
}

/// Ray against a camera-facing square of side `2 * half_size`, spanned by `right`/`up`.
pub fn ray_billboard(ray: &Ray, center: Vec3, right: Vec3, up: Vec3, half_size: f32) -> Option<f32> {
    let normal = right.cross(up).normalize_or_zero();
    let denom = normal.dot(ray.direction);
    if denom.abs() < 1e-6 {
        return None;
    }
    let t = normal.dot(center - ray.origin) / denom;
    if t < 0.0 {
        return None;
    }
    let local = ray.at(t) - center;
    if local.dot(right).abs() <= half_size && local.dot(up).abs() <= half_size {
        Some(t)
    } else {
        None
    }
}

/// Axis-aligned box, closed on both ends (touching counts as intersecting, like Box3).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn from_center_size(center: Vec3, size: Vec3) -> Self {
        let half = size * 0.5;
        Self {
            min: center - half,
            max: center + half,
        }
    }

    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Option<Self> {
        let mut it = points.into_iter();
        let first = it.next()?;
        let (min, max) = it.fold((first, first), |(lo, hi), p| (lo.min(p), hi.max(p)));
        Some(Self { min, max })
    }

    /// World bounds of this box after `transform` (all eight corners).
    pub fn transformed(&self, transform: Mat4) -> Self {
        let corners = (0..8).map(|i| {
            Vec3::new(
                if i & 1 == 0 { self.min.x } else { self.max.x },
                if i & 2 == 0 { self.min.y } else { self.max.y },
                if i & 4 == 0 { self.min.z } else { self.max.z },
            )
        });
        let pts: Vec<Vec3> = corners.map(|c| transform.transform_point3(c)).collect();
        Self::from_points(pts).unwrap_or(*self)
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn contains_point(&self, p: Vec3) -> bool {
        p.cmpge(self.min).all() && p.cmple(self.max).all()
    }

    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.cmple(other.max).all() && self.max.cmpge(other.min).all()
    }

    /// Shrinks the X/Z extents by `margin` on every side; Y untouched.
    pub fn inset_xz(&self, margin: f32) -> Self {
        Self {
            min: Vec3::new(self.min.x + margin, self.min.y, self.min.z + margin),
            max: Vec3::new(self.max.x - margin, self.max.y, self.max.z - margin),
        }
    }
}

pub fn ease_out_cubic(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    1.0 - (1.0 - t).powi(3)
}

pub fn ease_in_out_quad(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    if t < 0.5 {
        2.0 * t * t
    } else {
        1.0 - (-2.0 * t + 2.0).powi(2) / 2.0
    }
}
