// camera.rs — 视角控制：全景（经纬度 + 阻尼）、陀螺仪、漫游相机（位置 + 惯性移动）

use crate::config::{DampingMode, PanoramaConfig, WalkableConfigDefaults};
use crate::geometry::{shortest_angle_delta, spherical_to_cartesian, wrap_degrees, Ray};
use glam::{Mat4, Quat, Vec2, Vec3};

pub const PANORAMA_NEAR: f32 = 0.1;
pub const PANORAMA_FAR: f32 = 1100.0;
pub const ROOM_NEAR: f32 = 0.1;
pub const ROOM_FAR: f32 = 100.0;

/// Everything the picker and the renderer need from a camera for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraFrame {
    pub eye: Vec3,
    pub forward: Vec3,
    pub right: Vec3,
    pub up: Vec3,
    pub view: Mat4,
    pub proj: Mat4,
    pub fov_y_deg: f32,
    pub aspect: f32,
}

impl CameraFrame {
    /// Camera at `eye` looking along `forward` with world-up Y.
    pub fn looking(eye: Vec3, forward: Vec3, fov_y_deg: f32, aspect: f32, near: f32, far: f32) -> Self {
        let forward = forward.normalize_or_zero();
        let right = forward.cross(Vec3::Y).normalize_or_zero();
        let up = right.cross(forward);
        Self::build(eye, forward, right, up, fov_y_deg, aspect, near, far)
    }

    pub fn oriented(eye: Vec3, orientation: Quat, fov_y_deg: f32, aspect: f32, near: f32, far: f32) -> Self {
        let forward = orientation * Vec3::NEG_Z;
        let right = orientation * Vec3::X;
        let up = orientation * Vec3::Y;
        Self::build(eye, forward, right, up, fov_y_deg, aspect, near, far)
    }

    #[allow(clippy::too_many_arguments)]
    fn build(eye: Vec3, forward: Vec3, right: Vec3, up: Vec3, fov_y_deg: f32, aspect: f32, near: f32, far: f32) -> Self {
        let aspect = if aspect > 0.0 { aspect } else { 1.0 };
        Self {
            eye,
            forward,
            right,
            up,
            view: Mat4::look_to_rh(eye, forward, up),
            proj: Mat4::perspective_rh(fov_y_deg.to_radians(), aspect, near, far),
            fov_y_deg,
            aspect,
        }
    }

    pub fn view_proj(&self) -> Mat4 {
        self.proj * self.view
    }

    pub fn ray_through(&self, ndc: Vec2) -> Ray {
        Ray::from_ndc(ndc, self.view_proj().inverse())
    }

    /// World point → NDC, `None` when it is behind the camera.
    pub fn project(&self, p: Vec3) -> Option<Vec2> {
        let clip = self.view_proj() * p.extend(1.0);
        if clip.w <= 0.0 {
            return None;
        }
        Some(Vec2::new(clip.x / clip.w, clip.y / clip.w))
    }
}

// ---------------------------------------------------------------------------
// 全景

/// Smoothing factor for one frame of length `dt`.
pub fn damping_factor(cfg: &PanoramaConfig, dt: f32) -> f32 {
    let d = cfg.damping.clamp(0.0, 1.0);
    match cfg.damping_mode {
        DampingMode::PerFrame => d,
        DampingMode::FrameRateIndependent { reference_fps } => 1.0 - (1.0 - d).powf(dt.max(0.0) * reference_fps),
    }
}

/// Panorama look state. `lon` is left unwrapped so damping never spins the long way
/// round; the public yaw is wrapped on the way out.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PanoramaView {
    pub lon: f32,
    pub lat: f32,
    pub fov: f32,
    pub target_lon: f32,
    pub target_lat: f32,
    pub target_fov: f32,
}

impl PanoramaView {
    pub fn new(cfg: &PanoramaConfig) -> Self {
        let fov = cfg.default_fov.clamp(cfg.fov_min, cfg.fov_max);
        Self {
            lon: 0.0,
            lat: 0.0,
            fov,
            target_lon: 0.0,
            target_lat: 0.0,
            target_fov: fov,
        }
    }

    /// 直接跳到某个视角（场景初始视角）
    pub fn snap(&mut self, yaw: f32, pitch: f32, fov: f32, cfg: &PanoramaConfig) {
        self.set_target(yaw, pitch, Some(fov), cfg);
        self.lon = self.target_lon;
        self.lat = self.target_lat;
        self.fov = self.target_fov;
    }

    pub fn set_target(&mut self, yaw: f32, pitch: f32, fov: Option<f32>, cfg: &PanoramaConfig) {
        // 目标经度就近展开，避免阻尼绕远路
        self.target_lon = self.lon + shortest_angle_delta(self.lon, yaw);
        self.target_lat = pitch.clamp(-cfg.pitch_limit, cfg.pitch_limit);
        if let Some(f) = fov {
            self.target_fov = f.clamp(cfg.fov_min, cfg.fov_max);
        }
    }

    pub fn set_target_fov(&mut self, fov: f32, cfg: &PanoramaConfig) {
        self.target_fov = fov.clamp(cfg.fov_min, cfg.fov_max);
    }

    pub fn clamp_target(&mut self, cfg: &PanoramaConfig) {
        self.target_lat = self.target_lat.clamp(-cfg.pitch_limit, cfg.pitch_limit);
        self.target_fov = self.target_fov.clamp(cfg.fov_min, cfg.fov_max);
    }

    /// One low-pass step of current toward target.
    pub fn step(&mut self, dt: f32, cfg: &PanoramaConfig) {
        let k = damping_factor(cfg, dt);
        self.lon += (self.target_lon - self.lon) * k;
        self.lat += (self.target_lat - self.lat) * k;
        self.fov += (self.target_fov - self.fov) * k;
        self.lat = self.lat.clamp(-cfg.pitch_limit, cfg.pitch_limit);
        self.fov = self.fov.clamp(cfg.fov_min, cfg.fov_max);
    }

    pub fn yaw(&self) -> f32 {
        wrap_degrees(self.lon)
    }

    pub fn pitch(&self) -> f32 {
        self.lat
    }

    pub fn look_direction(&self) -> Vec3 {
        spherical_to_cartesian(self.lon, self.lat, 1.0)
    }

    pub fn frame(&self, aspect: f32) -> CameraFrame {
        CameraFrame::looking(Vec3::ZERO, self.look_direction(), self.fov, aspect, PANORAMA_NEAR, PANORAMA_FAR)
    }
}

// ---------------------------------------------------------------------------
// 陀螺仪

/// One device-orientation reading, in degrees (W3C DeviceOrientation conventions).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientationSample {
    /// 罗盘朝向 0..360
    pub alpha: f32,
    /// 前后倾角，竖直握持时约为 90
    pub beta: f32,
    pub gamma: f32,
}

/// Turns orientation samples into panorama targets relative to where the user
/// was facing when tracking (re)started.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GyroTracker {
    last_alpha: Option<f32>,
}

impl GyroTracker {
    pub fn reset(&mut self) {
        self.last_alpha = None;
    }

    pub fn is_calibrated(&self) -> bool {
        self.last_alpha.is_some()
    }

    /// The first sample after a reset only calibrates. Later samples turn the
    /// yaw target by the unwrapped heading change and set pitch from tilt.
    pub fn apply(&mut self, sample: OrientationSample, view: &mut PanoramaView, cfg: &PanoramaConfig) {
        let Some(last) = self.last_alpha.replace(sample.alpha) else {
            return;
        };
        // 罗盘角顺时针增大，经度逆向
        view.target_lon -= shortest_angle_delta(last, sample.alpha);
        view.target_lat = (sample.beta - 90.0).clamp(-cfg.pitch_limit, cfg.pitch_limit);
    }
}

// ---------------------------------------------------------------------------
// 漫游

/// Held movement keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MoveKeys {
    pub forward: bool,
    pub backward: bool,
    pub left: bool,
    pub right: bool,
}

impl MoveKeys {
    pub fn any(&self) -> bool {
        self.forward || self.backward || self.left || self.right
    }
}

const PITCH_LIMIT_RAD: f32 = std::f32::consts::FRAC_PI_2 - 0.01;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WalkCamera {
    pub position: Vec3,
    /// 弧度，绕 Y
    pub yaw: f32,
    /// 弧度，绕 X（无横滚）
    pub pitch: f32,
    pub velocity: Vec3,
}

impl WalkCamera {
    pub fn new(position: Vec3) -> Self {
        Self {
            position,
            yaw: 0.0,
            pitch: 0.0,
            velocity: Vec3::ZERO,
        }
    }

    pub fn orientation(&self) -> Quat {
        Quat::from_rotation_y(self.yaw) * Quat::from_rotation_x(self.pitch)
    }

    pub fn forward(&self) -> Vec3 {
        self.orientation() * Vec3::NEG_Z
    }

    pub fn look_at(&mut self, target: Vec3) {
        let d = target - self.position;
        let len = d.length();
        if len <= f32::EPSILON {
            return;
        }
        self.yaw = (-d.x).atan2(-d.z);
        self.pitch = (d.y / len).clamp(-1.0, 1.0).asin().clamp(-PITCH_LIMIT_RAD, PITCH_LIMIT_RAD);
    }

    pub fn rotate(&mut self, d_yaw: f32, d_pitch: f32) {
        self.yaw += d_yaw;
        self.pitch = (self.pitch + d_pitch).clamp(-PITCH_LIMIT_RAD, PITCH_LIMIT_RAD);
    }

    /// Look angles in degrees, as reported through view-change callbacks.
    pub fn set_look_degrees(&mut self, yaw: f32, pitch: f32) {
        self.yaw = yaw.to_radians();
        self.pitch = pitch.to_radians().clamp(-PITCH_LIMIT_RAD, PITCH_LIMIT_RAD);
    }

    pub fn yaw_degrees(&self) -> f32 {
        wrap_degrees(self.yaw.to_degrees())
    }

    pub fn pitch_degrees(&self) -> f32 {
        self.pitch.to_degrees()
    }

    /// Applies friction and key impulses to the velocity and returns the
    /// position the camera would move to. Collision is the caller's business.
    pub fn propose_move(&mut self, keys: MoveKeys, dt: f32, cfg: &WalkableConfigDefaults) -> Vec3 {
        self.velocity -= self.velocity * (cfg.friction * dt).min(1.0);

        let dir = Vec3::new(
            (keys.right as i32 - keys.left as i32) as f32,
            0.0,
            (keys.forward as i32 - keys.backward as i32) as f32,
        )
        .normalize_or_zero();
        if keys.forward || keys.backward {
            self.velocity.z -= dir.z * cfg.move_speed * dt;
        }
        if keys.left || keys.right {
            self.velocity.x -= dir.x * cfg.move_speed * dt;
        }

        let mut forward = self.forward();
        forward.y = 0.0;
        let forward = forward.normalize_or_zero();
        let right = forward.cross(Vec3::Y).normalize_or_zero();

        self.position + forward * (-self.velocity.z * dt) + right * (-self.velocity.x * dt)
    }

    pub fn is_moving(&self) -> bool {
        self.velocity.length_squared() > 1e-8
    }

    pub fn frame(&self, fov_y_deg: f32, aspect: f32) -> CameraFrame {
        CameraFrame::oriented(self.position, self.orientation(), fov_y_deg, aspect, ROOM_NEAR, ROOM_FAR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn damping_converges_and_clamps() {
        let cfg = PanoramaConfig::default();
        let mut v = PanoramaView::new(&cfg);
        v.target_lat = 500.0;
        v.set_target(30.0, 500.0, Some(10.0), &cfg);
        assert_eq!(v.target_lat, 85.0);
        assert_eq!(v.target_fov, 30.0);
        for _ in 0..200 {
            v.step(1.0 / 60.0, &cfg);
            assert!(v.lat <= 85.0);
        }
        assert!((v.yaw() - 30.0).abs() < 1e-3);
        assert!((v.fov - 30.0).abs() < 1e-3);
    }

    #[test]
    fn first_damping_step_is_fifteen_percent() {
        let cfg = PanoramaConfig::default();
        let mut v = PanoramaView::new(&cfg);
        v.set_target(100.0, 0.0, None, &cfg);
        v.step(0.5, &cfg);
        assert!((v.lon - 15.0).abs() < 1e-4);
    }

    #[test]
    fn frame_rate_independent_matches_at_reference() {
        let mut cfg = PanoramaConfig::default();
        cfg.damping_mode = DampingMode::FrameRateIndependent { reference_fps: 60.0 };
        assert!((damping_factor(&cfg, 1.0 / 60.0) - 0.15).abs() < 1e-5);
        // 两个 120Hz 帧 ≈ 一个 60Hz 帧
        let half = damping_factor(&cfg, 1.0 / 120.0);
        assert!((1.0 - (1.0 - half).powi(2) - 0.15).abs() < 1e-5);
    }

    #[test]
    fn target_lon_unwraps_across_seam() {
        let cfg = PanoramaConfig::default();
        let mut v = PanoramaView::new(&cfg);
        v.snap(170.0, 0.0, 75.0, &cfg);
        v.set_target(-170.0, 0.0, None, &cfg);
        assert!((v.target_lon - 190.0).abs() < 1e-3);
    }

    #[test]
    fn gyro_calibrates_on_first_sample() {
        let cfg = PanoramaConfig::default();
        let mut v = PanoramaView::new(&cfg);
        v.snap(40.0, 0.0, 75.0, &cfg);
        let mut g = GyroTracker::default();
        g.apply(OrientationSample { alpha: 300.0, beta: 90.0, gamma: 0.0 }, &mut v, &cfg);
        assert_eq!(v.target_lon, 40.0);
        g.apply(OrientationSample { alpha: 10.0, beta: 100.0, gamma: 0.0 }, &mut v, &cfg);
        // 300 → 10 是 +70°
        assert!((v.target_lon + 30.0).abs() < 1e-3);
        assert!((v.target_lat - 10.0).abs() < 1e-4);
    }

    #[test]
    fn gyro_tilting_back_looks_up() {
        let cfg = PanoramaConfig::default();
        let mut v = PanoramaView::new(&cfg);
        let mut g = GyroTracker::default();
        // 竖直握持 → 水平视线
        g.apply(OrientationSample { alpha: 0.0, beta: 90.0, gamma: 0.0 }, &mut v, &cfg);
        g.apply(OrientationSample { alpha: 0.0, beta: 90.0, gamma: 0.0 }, &mut v, &cfg);
        assert_eq!(v.target_lat, 0.0);
        // 顶部向后仰 30° → 抬头 30°
        g.apply(OrientationSample { alpha: 0.0, beta: 120.0, gamma: 0.0 }, &mut v, &cfg);
        assert!((v.target_lat - 30.0).abs() < 1e-4);
        v.snap(v.target_lon, v.target_lat, v.target_fov, &cfg);
        assert!(v.frame(1.0).ray_through(Vec2::ZERO).direction.y > 0.4);
    }

    #[test]
    fn walk_look_at() {
        let mut c = WalkCamera::new(Vec3::new(0.0, 1.7, 0.0));
        c.look_at(Vec3::new(5.0, 1.7, 0.0));
        assert!((c.forward() - Vec3::X).length() < 1e-4);
        c.look_at(Vec3::new(0.0, 1.7, -4.0));
        assert!((c.forward() - Vec3::NEG_Z).length() < 1e-4);
        c.rotate(0.0, 10.0);
        assert!(c.pitch < std::f32::consts::FRAC_PI_2);
    }

    #[test]
    fn walk_forward_moves_along_view() {
        let cfg = WalkableConfigDefaults::default();
        let mut c = WalkCamera::new(Vec3::new(0.0, 1.7, 0.0));
        let keys = MoveKeys { forward: true, ..Default::default() };
        let mut p = c.position;
        for _ in 0..10 {
            p = c.propose_move(keys, 1.0 / 60.0, &cfg);
            c.position = p;
        }
        assert!(p.z < -0.1);
        assert!(p.x.abs() < 1e-4);

        // 松开按键后仍会滑行一小段
        let before = c.position;
        let after = c.propose_move(MoveKeys::default(), 1.0 / 60.0, &cfg);
        assert!(after.z < before.z);
    }

    #[test]
    fn projection_round_trip() {
        let v = PanoramaView::new(&PanoramaConfig::default());
        let f = v.frame(16.0 / 9.0);
        let p = spherical_to_cartesian(10.0, 5.0, 450.0);
        let ndc = f.project(p).unwrap();
        let ray = f.ray_through(ndc);
        assert!(ray.direction.dot(p.normalize()) > 0.9999);
    }
}
