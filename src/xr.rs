// xr.rs — 沉浸式（XR）会话抽象：运行时由宿主提供，引擎只消费头部姿态和手柄射线

use crate::error::XrError;
use crate::geometry::Ray;
use glam::{Quat, Vec3};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct XrController {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl XrController {
    pub fn ray(&self) -> Ray {
        Ray::new(self.origin, self.direction)
    }
}

/// Pose data for one XR frame.
#[derive(Debug, Clone, PartialEq)]
pub struct XrFrame {
    pub head: Quat,
    pub controllers: Vec<XrController>,
}

impl Default for XrFrame {
    fn default() -> Self {
        Self {
            head: Quat::IDENTITY,
            controllers: Vec::new(),
        }
    }
}

impl XrFrame {
    /// Ray along the center of the user's view.
    pub fn gaze(&self) -> Ray {
        Ray::new(Vec3::ZERO, self.head * Vec3::NEG_Z)
    }
}

/// Whatever the platform offers for immersive sessions.
pub trait XrRuntime {
    fn is_supported(&self) -> bool;
    fn request_session(&mut self) -> Result<(), XrError>;
    fn end_session(&mut self);
}

/// Desktop builds: no headset, every request is refused.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoXr;

impl XrRuntime for NoXr {
    fn is_supported(&self) -> bool {
        false
    }

    fn request_session(&mut self) -> Result<(), XrError> {
        Err(XrError::Unsupported)
    }

    fn end_session(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gaze_follows_head() {
        let f = XrFrame {
            head: Quat::from_rotation_y(std::f32::consts::FRAC_PI_2),
            controllers: Vec::new(),
        };
        let d = f.gaze().direction;
        assert!((d - Vec3::NEG_X).length() < 1e-5);
    }

    #[test]
    fn desktop_refuses() {
        let mut rt = NoXr;
        assert!(!rt.is_supported());
        assert_eq!(rt.request_session(), Err(XrError::Unsupported));
    }
}
