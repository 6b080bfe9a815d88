// transition.rs — 过渡动画：淡入、推镜（dolly）、房间内瞬移、XR 注视计时

use crate::camera::PanoramaView;
use crate::geometry::{ease_in_out_quad, ease_out_cubic, shortest_angle_delta};
use crate::tour::AngularPosition;
use glam::Vec3;

/// Time-based 0→1 progress. Never goes backwards and lands on exactly 1.0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tween {
    elapsed: f32,
    duration: f32,
}

impl Tween {
    pub fn new(duration: f32) -> Self {
        Self {
            elapsed: 0.0,
            duration: duration.max(0.0),
        }
    }

    pub fn advance(&mut self, dt: f32) -> f32 {
        self.elapsed = (self.elapsed + dt.max(0.0)).min(self.duration);
        self.progress()
    }

    pub fn progress(&self) -> f32 {
        if self.duration <= 0.0 || self.elapsed >= self.duration {
            1.0
        } else {
            self.elapsed / self.duration
        }
    }

    pub fn is_finished(&self) -> bool {
        self.progress() >= 1.0
    }
}

/// Scene fade-in, driven by a rate (units per second) rather than a duration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fade {
    opacity: f32,
    rate: f32,
}

impl Fade {
    /// 完全可见，无动画
    pub fn visible() -> Self {
        Self { opacity: 1.0, rate: 0.0 }
    }

    pub fn start(rate: f32) -> Self {
        Self { opacity: 0.0, rate }
    }

    /// Pinned at `opacity` until replaced.
    pub fn held(opacity: f32) -> Self {
        Self {
            opacity: opacity.clamp(0.0, 1.0),
            rate: 0.0,
        }
    }

    pub fn advance(&mut self, dt: f32) {
        if self.rate > 0.0 {
            self.opacity = (self.opacity + self.rate * dt.max(0.0)).min(1.0);
        }
    }

    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    pub fn is_running(&self) -> bool {
        self.rate > 0.0 && self.opacity < 1.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DollyStep {
    pub lon: f32,
    pub lat: f32,
    pub fov: f32,
    pub opacity: f32,
    pub finished: bool,
}

/// Eases the panorama camera toward a navigation hotspot while fading out.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dolly {
    pub hotspot_index: usize,
    tween: Tween,
    from: (f32, f32, f32),
    to: (f32, f32, f32),
}

impl Dolly {
    pub fn new(view: &PanoramaView, target: AngularPosition, hotspot_index: usize, fov: f32, duration: f32) -> Self {
        let from = (view.lon, view.lat, view.fov);
        let to = (view.lon + shortest_angle_delta(view.lon, target.yaw), target.pitch, fov);
        Self {
            hotspot_index,
            tween: Tween::new(duration),
            from,
            to,
        }
    }

    pub fn target_lon(&self) -> f32 {
        self.to.0
    }

    pub fn advance(&mut self, dt: f32) -> DollyStep {
        let p = self.tween.advance(dt);
        let e = ease_out_cubic(p);
        let lerp = |a: f32, b: f32| a + (b - a) * e;
        DollyStep {
            lon: lerp(self.from.0, self.to.0),
            lat: lerp(self.from.1, self.to.1),
            fov: lerp(self.from.2, self.to.2),
            opacity: 1.0 - p,
            finished: self.tween.is_finished(),
        }
    }
}

/// In-room glide to a point on the floor; eye height stays fixed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Teleport {
    tween: Tween,
    from: Vec3,
    to: Vec3,
}

impl Teleport {
    pub fn new(from: Vec3, to_xz: Vec3, eye_height: f32, duration: f32) -> Self {
        Self {
            tween: Tween::new(duration),
            from: Vec3::new(from.x, eye_height, from.z),
            to: Vec3::new(to_xz.x, eye_height, to_xz.z),
        }
    }

    pub fn destination(&self) -> Vec3 {
        self.to
    }

    /// Position for this frame, and whether the glide just ended.
    pub fn advance(&mut self, dt: f32) -> (Vec3, bool) {
        let p = self.tween.advance(dt);
        let pos = self.from.lerp(self.to, ease_in_out_quad(p));
        (pos, self.tween.is_finished())
    }
}

/// Gaze-to-activate timer for XR.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GazeDwell {
    target: Option<usize>,
    elapsed: f32,
    latched: bool,
    threshold: f32,
}

impl GazeDwell {
    pub fn new(threshold: f32) -> Self {
        Self {
            target: None,
            elapsed: 0.0,
            latched: false,
            threshold,
        }
    }

    /// Feeds the current gaze hit; returns the hotspot to activate, if any.
    pub fn update(&mut self, target: Option<usize>, dt: f32) -> Option<usize> {
        if target != self.target {
            self.target = target;
            self.elapsed = 0.0;
            self.latched = false;
        }
        let current = self.target?;
        if self.latched {
            return None;
        }
        self.elapsed += dt.max(0.0);
        if self.elapsed >= self.threshold {
            // 触发后锁住，视线离开再回来才会再次计时
            self.elapsed = 0.0;
            self.latched = true;
            return Some(current);
        }
        None
    }

    pub fn target(&self) -> Option<usize> {
        self.target
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn progress(&self) -> f32 {
        if self.threshold <= 0.0 {
            return 0.0;
        }
        (self.elapsed / self.threshold).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PanoramaConfig;

    #[test]
    fn tween_is_monotonic_and_exact() {
        let mut t = Tween::new(0.7);
        let mut last = 0.0;
        let mut finishes = 0;
        for i in 0..100 {
            let dt = if i % 3 == 0 { 0.033 } else { 0.011 };
            let was_done = t.is_finished();
            let p = t.advance(dt);
            assert!(p >= last);
            last = p;
            if t.is_finished() && !was_done {
                finishes += 1;
            }
        }
        assert_eq!(last, 1.0);
        assert_eq!(finishes, 1);
    }

    #[test]
    fn dolly_takes_short_way_round() {
        let cfg = PanoramaConfig::default();
        let mut view = PanoramaView::new(&cfg);
        view.snap(170.0, 0.0, 75.0, &cfg);
        let mut d = Dolly::new(&view, AngularPosition { yaw: -170.0, pitch: 10.0 }, 0, 35.0, 0.7);
        assert!((d.target_lon() - 190.0).abs() < 1e-3);
        let mid = d.advance(0.2);
        assert!(mid.lon > 170.0 && mid.lon < 190.0);
        assert!(!mid.finished);
        let end = d.advance(1.0);
        assert!(end.finished);
        assert_eq!(end.opacity, 0.0);
        assert!((end.fov - 35.0).abs() < 1e-4);
    }

    #[test]
    fn teleport_keeps_eye_height() {
        let mut t = Teleport::new(Vec3::new(0.0, 1.0, 0.0), Vec3::new(2.0, 0.0, -2.0), 1.7, 0.4);
        let (p, done) = t.advance(0.2);
        assert_eq!(p.y, 1.7);
        assert!(!done);
        let (p, done) = t.advance(0.3);
        assert!(done);
        assert_eq!(p, Vec3::new(2.0, 1.7, -2.0));
    }

    #[test]
    fn dwell_fires_once_then_latches() {
        let mut g = GazeDwell::new(1.5);
        assert_eq!(g.update(Some(2), 1.0), None);
        assert!((g.progress() - 2.0 / 3.0).abs() < 1e-5);
        assert_eq!(g.update(Some(2), 0.6), Some(2));
        assert_eq!(g.update(Some(2), 5.0), None);
        // 移开再回来重新计时
        g.update(None, 0.1);
        assert_eq!(g.update(Some(2), 1.6), Some(2));
    }

    #[test]
    fn dwell_switch_resets() {
        let mut g = GazeDwell::new(1.5);
        g.update(Some(1), 1.0);
        assert_eq!(g.update(Some(3), 1.0), None);
        assert!((g.progress() - 1.0 / 1.5).abs() < 1e-5);
    }

    #[test]
    fn fade_runs_to_one() {
        let mut f = Fade::start(2.0);
        f.advance(0.25);
        assert!((f.opacity() - 0.5).abs() < 1e-6);
        f.advance(1.0);
        assert_eq!(f.opacity(), 1.0);
        assert!(!f.is_running());
    }
}
