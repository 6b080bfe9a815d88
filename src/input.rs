// input.rs — 输入事件、监听登记表、每帧事件队列，以及拖拽/点击、双指缩放的判别

use crate::camera::OrientationSample;
use crate::xr::XrFrame;
use glam::Vec2;
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointerKind {
    Mouse,
    Touch,
}

/// Keys the engines care about; everything else arrives as `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    W,
    A,
    S,
    D,
    ArrowUp,
    ArrowDown,
    ArrowLeft,
    ArrowRight,
    Other,
}

/// Host input, in surface pixels (origin top-left).
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    PointerDown { x: f32, y: f32 },
    PointerMove { x: f32, y: f32 },
    PointerUp { x: f32, y: f32 },
    PointerLeave,
    TouchStart { id: u64, x: f32, y: f32 },
    TouchMove { id: u64, x: f32, y: f32 },
    TouchEnd { id: u64, x: f32, y: f32 },
    /// 浏览器约定：正值 = 放大视场（拉远）
    Wheel { delta_y: f32 },
    KeyDown(Key),
    KeyUp(Key),
    FocusLost,
    Orientation(OrientationSample),
    OrientationPermission(bool),
    Resize { width: f32, height: f32 },
    XrFrame(XrFrame),
    XrSelect { controller: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    PointerDown,
    PointerMove,
    PointerUp,
    PointerLeave,
    TouchStart,
    TouchMove,
    TouchEnd,
    Wheel,
    Key,
    Focus,
    Orientation,
    Resize,
    Xr,
}

impl InputEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            InputEvent::PointerDown { .. } => EventKind::PointerDown,
            InputEvent::PointerMove { .. } => EventKind::PointerMove,
            InputEvent::PointerUp { .. } => EventKind::PointerUp,
            InputEvent::PointerLeave => EventKind::PointerLeave,
            InputEvent::TouchStart { .. } => EventKind::TouchStart,
            InputEvent::TouchMove { .. } => EventKind::TouchMove,
            InputEvent::TouchEnd { .. } => EventKind::TouchEnd,
            InputEvent::Wheel { .. } => EventKind::Wheel,
            InputEvent::KeyDown(_) | InputEvent::KeyUp(_) => EventKind::Key,
            InputEvent::FocusLost => EventKind::Focus,
            InputEvent::Orientation(_) | InputEvent::OrientationPermission(_) => EventKind::Orientation,
            InputEvent::Resize { .. } => EventKind::Resize,
            InputEvent::XrFrame(_) | InputEvent::XrSelect { .. } => EventKind::Xr,
        }
    }

    pub fn position(&self) -> Option<Vec2> {
        match *self {
            InputEvent::PointerDown { x, y }
            | InputEvent::PointerMove { x, y }
            | InputEvent::PointerUp { x, y }
            | InputEvent::TouchStart { x, y, .. }
            | InputEvent::TouchMove { x, y, .. }
            | InputEvent::TouchEnd { x, y, .. } => Some(Vec2::new(x, y)),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// 监听登记

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Only while the position lies on the render surface.
    Surface,
    /// Anywhere, including positions outside the surface.
    Window,
}

/// The engine's listener registrations, released all at once on dispose.
#[derive(Debug, Clone, Default)]
pub struct InputBindings {
    entries: Vec<(EventKind, Scope)>,
    viewport: Vec2,
}

impl InputBindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// 两个引擎共用的默认登记：抬起/键盘/尺寸/朝向放在窗口级，拖拽不会“卡住”
    pub fn standard() -> Self {
        let mut b = Self::new();
        for kind in [
            EventKind::PointerDown,
            EventKind::PointerMove,
            EventKind::PointerLeave,
            EventKind::TouchStart,
            EventKind::TouchMove,
            EventKind::Wheel,
        ] {
            b.bind(kind, Scope::Surface);
        }
        for kind in [
            EventKind::PointerUp,
            EventKind::TouchEnd,
            EventKind::Key,
            EventKind::Focus,
            EventKind::Orientation,
            EventKind::Resize,
            EventKind::Xr,
        ] {
            b.bind(kind, Scope::Window);
        }
        b
    }

    pub fn bind(&mut self, kind: EventKind, scope: Scope) {
        self.entries.retain(|(k, _)| *k != kind);
        self.entries.push((kind, scope));
    }

    pub fn scope_of(&self, kind: EventKind) -> Option<Scope> {
        self.entries.iter().find(|(k, _)| *k == kind).map(|(_, s)| *s)
    }

    pub fn set_viewport(&mut self, width: f32, height: f32) {
        self.viewport = Vec2::new(width, height);
    }

    pub fn viewport(&self) -> Vec2 {
        self.viewport
    }

    pub fn accepts(&self, event: &InputEvent) -> bool {
        match self.scope_of(event.kind()) {
            None => false,
            Some(Scope::Window) => true,
            Some(Scope::Surface) => match event.position() {
                Some(p) if self.viewport.x > 0.0 && self.viewport.y > 0.0 => {
                    p.x >= 0.0 && p.y >= 0.0 && p.x < self.viewport.x && p.y < self.viewport.y
                }
                _ => true,
            },
        }
    }

    /// Drops every registration. Safe to call repeatedly.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Events recorded by handlers, consumed once per tick.
#[derive(Debug, Clone, Default)]
pub struct InputQueue {
    events: VecDeque<InputEvent>,
}

impl InputQueue {
    pub fn push(&mut self, event: InputEvent) {
        self.events.push_back(event);
    }

    pub fn drain(&mut self) -> Vec<InputEvent> {
        self.events.drain(..).collect()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

// ---------------------------------------------------------------------------
// 拖拽 / 点击

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LookDelta {
    /// Displacement since the press.
    pub total: Vec2,
    /// Displacement since the previous motion event.
    pub step: Vec2,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Release {
    /// Released without ever crossing the threshold.
    Click { position: Vec2, held: f32 },
    DragEnd,
    Idle,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Press {
    origin: Vec2,
    last: Vec2,
    kind: PointerKind,
    at: f32,
}

/// Tells a look-drag from a click. Nothing counts as look until the pointer
/// has travelled past the threshold for its device.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DragTracker {
    press: Option<Press>,
    moved: bool,
    mouse_threshold: f32,
    touch_threshold: f32,
}

impl DragTracker {
    pub fn new(mouse_threshold: f32, touch_threshold: f32) -> Self {
        Self {
            press: None,
            moved: false,
            mouse_threshold,
            touch_threshold,
        }
    }

    pub fn press(&mut self, position: Vec2, kind: PointerKind, now: f32) {
        self.press = Some(Press {
            origin: position,
            last: position,
            kind,
            at: now,
        });
        self.moved = false;
    }

    pub fn is_active(&self) -> bool {
        self.press.is_some()
    }

    pub fn has_moved(&self) -> bool {
        self.moved
    }

    pub fn kind(&self) -> Option<PointerKind> {
        self.press.map(|p| p.kind)
    }

    /// 鼠标按单轴判断，触摸按直线距离判断
    fn exceeds(&self, kind: PointerKind, d: Vec2) -> bool {
        match kind {
            PointerKind::Mouse => d.x.abs() > self.mouse_threshold || d.y.abs() > self.mouse_threshold,
            PointerKind::Touch => d.length() > self.touch_threshold,
        }
    }

    pub fn motion(&mut self, position: Vec2) -> Option<LookDelta> {
        let press = self.press.as_mut()?;
        let total = position - press.origin;
        let step = position - press.last;
        press.last = position;
        let kind = press.kind;
        if !self.moved && self.exceeds(kind, total) {
            self.moved = true;
        }
        self.moved.then_some(LookDelta { total, step })
    }

    /// Ends the press. The click decision uses the release position itself,
    /// since touch screens may not send any motion before lifting.
    pub fn release(&mut self, position: Vec2, now: f32) -> Release {
        let Some(press) = self.press.take() else {
            return Release::Idle;
        };
        let moved = std::mem::take(&mut self.moved) || self.exceeds(press.kind, position - press.origin);
        if moved {
            Release::DragEnd
        } else {
            Release::Click {
                position,
                held: now - press.at,
            }
        }
    }

    pub fn cancel(&mut self) {
        self.press = None;
        self.moved = false;
    }
}

// ---------------------------------------------------------------------------
// 多指

/// Fingers currently on the surface, in arrival order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TouchSet {
    points: Vec<(u64, Vec2)>,
}

impl TouchSet {
    pub fn start(&mut self, id: u64, p: Vec2) -> usize {
        self.points.retain(|(i, _)| *i != id);
        self.points.push((id, p));
        self.points.len()
    }

    pub fn update(&mut self, id: u64, p: Vec2) {
        if let Some(slot) = self.points.iter_mut().find(|(i, _)| *i == id) {
            slot.1 = p;
        }
    }

    pub fn end(&mut self, id: u64) -> usize {
        self.points.retain(|(i, _)| *i != id);
        self.points.len()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }

    /// Distance between the first two fingers.
    pub fn spread(&self) -> Option<f32> {
        match self.points.as_slice() {
            [(_, a), (_, b), ..] => Some(a.distance(*b)),
            _ => None,
        }
    }
}

/// Two-finger zoom. Once a pinch starts, single-finger look stays off until
/// every finger has lifted.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PinchTracker {
    start_dist: f32,
    start_fov: f32,
    active: bool,
    suppressing: bool,
}

impl PinchTracker {
    pub fn begin(&mut self, dist: f32, fov: f32) {
        self.start_dist = dist.max(1.0);
        self.start_fov = fov;
        self.active = true;
        self.suppressing = true;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn suppresses_look(&self) -> bool {
        self.suppressing
    }

    /// New fov for the current finger spread, clamped to `[min, max]`.
    pub fn update(&self, dist: f32, min: f32, max: f32) -> Option<f32> {
        if !self.active || dist <= 0.0 {
            return None;
        }
        Some((self.start_fov * self.start_dist / dist).clamp(min, max))
    }

    pub fn fingers_changed(&mut self, remaining: usize) {
        if remaining < 2 {
            self.active = false;
        }
        if remaining == 0 {
            self.suppressing = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surface_scope_drops_outside_positions() {
        let mut b = InputBindings::standard();
        b.set_viewport(800.0, 600.0);
        assert!(b.accepts(&InputEvent::PointerDown { x: 10.0, y: 10.0 }));
        assert!(!b.accepts(&InputEvent::PointerDown { x: 900.0, y: 10.0 }));
        // 抬起是窗口级的，画布外也收
        assert!(b.accepts(&InputEvent::PointerUp { x: 900.0, y: -5.0 }));
        b.clear();
        b.clear();
        assert!(b.is_empty());
        assert!(!b.accepts(&InputEvent::PointerUp { x: 1.0, y: 1.0 }));
    }

    #[test]
    fn sub_threshold_release_is_click() {
        let mut d = DragTracker::new(5.0, 15.0);
        d.press(Vec2::new(100.0, 100.0), PointerKind::Mouse, 0.0);
        assert!(d.motion(Vec2::new(103.0, 102.0)).is_none());
        match d.release(Vec2::new(104.0, 101.0), 0.2) {
            Release::Click { position, held } => {
                assert_eq!(position, Vec2::new(104.0, 101.0));
                assert!((held - 0.2).abs() < 1e-6);
            }
            other => panic!("expected click, got {:?}", other),
        }
    }

    #[test]
    fn over_threshold_is_drag() {
        let mut d = DragTracker::new(5.0, 15.0);
        d.press(Vec2::ZERO, PointerKind::Mouse, 0.0);
        assert!(d.motion(Vec2::new(3.0, 0.0)).is_none());
        let look = d.motion(Vec2::new(9.0, 0.0)).unwrap();
        assert_eq!(look.total, Vec2::new(9.0, 0.0));
        assert_eq!(look.step, Vec2::new(6.0, 0.0));
        // 回到原点松开仍是拖拽
        d.motion(Vec2::ZERO);
        assert_eq!(d.release(Vec2::ZERO, 1.0), Release::DragEnd);
    }

    #[test]
    fn tap_without_moves_uses_release_position() {
        let mut d = DragTracker::new(3.0, 15.0);
        d.press(Vec2::new(50.0, 50.0), PointerKind::Touch, 0.0);
        assert_eq!(d.release(Vec2::new(80.0, 50.0), 0.1), Release::DragEnd);
        d.press(Vec2::new(50.0, 50.0), PointerKind::Touch, 0.0);
        assert!(matches!(d.release(Vec2::new(55.0, 55.0), 0.1), Release::Click { .. }));
    }

    #[test]
    fn pinch_scales_inverse_and_suppresses() {
        let mut p = PinchTracker::default();
        p.begin(100.0, 60.0);
        assert_eq!(p.update(200.0, 30.0, 100.0), Some(30.0));
        assert_eq!(p.update(120.0, 30.0, 100.0), Some(50.0));
        assert_eq!(p.update(10.0, 30.0, 100.0), Some(100.0));
        p.fingers_changed(1);
        assert!(!p.is_active());
        assert!(p.suppresses_look());
        p.fingers_changed(0);
        assert!(!p.suppresses_look());
    }

    #[test]
    fn queue_drains_in_order() {
        let mut q = InputQueue::default();
        q.push(InputEvent::PointerLeave);
        q.push(InputEvent::Wheel { delta_y: 1.0 });
        let out = q.drain();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0], InputEvent::PointerLeave);
        assert!(q.is_empty());
    }
}
