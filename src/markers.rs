// markers.rs — 热点标记：图标栅格化（纹理图集）与浮动/脉动动画
//
// 图标只取决于热点类型，所有标记共用一张图集。

use crate::tour::{Hotspot, HotspotType};
use glam::{Vec2, Vec3};
use image::{Rgba, RgbaImage};

/// 图集里每个图标的边长（像素）
pub const GLYPH_SIZE: u32 = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pictogram {
    Square,
    Play,
    Link,
    Dot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkerGlyph {
    /// Large "walk here" ring used for navigation.
    FloorRing,
    /// Round badge with a black pictogram in the middle.
    Icon(Pictogram),
}

impl MarkerGlyph {
    pub const ALL: [MarkerGlyph; 5] = [
        MarkerGlyph::FloorRing,
        MarkerGlyph::Icon(Pictogram::Square),
        MarkerGlyph::Icon(Pictogram::Play),
        MarkerGlyph::Icon(Pictogram::Link),
        MarkerGlyph::Icon(Pictogram::Dot),
    ];

    pub fn for_type(kind: HotspotType) -> Self {
        match kind {
            HotspotType::Navigation => MarkerGlyph::FloorRing,
            HotspotType::Image => MarkerGlyph::Icon(Pictogram::Square),
            HotspotType::Video => MarkerGlyph::Icon(Pictogram::Play),
            HotspotType::Link => MarkerGlyph::Icon(Pictogram::Link),
            HotspotType::Info => MarkerGlyph::Icon(Pictogram::Dot),
        }
    }

    pub fn atlas_slot(self) -> usize {
        Self::ALL.iter().position(|g| *g == self).unwrap_or(0)
    }

    /// `[u0, v0, u1, v1]` of this glyph inside [`atlas`].
    pub fn atlas_uv(self) -> [f32; 4] {
        let n = Self::ALL.len() as f32;
        let i = self.atlas_slot() as f32;
        [i / n, 0.0, (i + 1.0) / n, 1.0]
    }

    pub fn is_ring(self) -> bool {
        matches!(self, MarkerGlyph::FloorRing)
    }
}

// ---------------------------------------------------------------------------
// 栅格化：逐像素求有向距离，1px 抗锯齿，按 "over" 叠加

type Rgbaf = [f32; 4];

fn over(dst: Rgbaf, rgb: [f32; 3], a: f32) -> Rgbaf {
    let a = a.clamp(0.0, 1.0);
    if a <= 0.0 {
        return dst;
    }
    let out_a = a + dst[3] * (1.0 - a);
    let mix = |c: usize| (rgb[c] * a + dst[c] * dst[3] * (1.0 - a)) / out_a;
    [mix(0), mix(1), mix(2), out_a]
}

fn coverage(signed_dist_px: f32) -> f32 {
    (0.5 - signed_dist_px).clamp(0.0, 1.0)
}

fn circle_sd(p: Vec2, c: Vec2, r: f32) -> f32 {
    (p - c).length() - r
}

fn ring_sd(p: Vec2, c: Vec2, r: f32, width: f32) -> f32 {
    ((p - c).length() - r).abs() - width * 0.5
}

fn segment_sd(p: Vec2, a: Vec2, b: Vec2, width: f32) -> f32 {
    let ab = b - a;
    let t = ((p - a).dot(ab) / ab.length_squared()).clamp(0.0, 1.0);
    (p - (a + ab * t)).length() - width * 0.5
}

/// Signed distance to a simple polygon (negative inside).
fn polygon_sd(p: Vec2, pts: &[Vec2]) -> f32 {
    let mut d = f32::MAX;
    let mut inside = false;
    let mut j = pts.len() - 1;
    for i in 0..pts.len() {
        let (a, b) = (pts[j], pts[i]);
        let e = a - b;
        let w = p - b;
        let t = (w.dot(e) / e.length_squared()).clamp(0.0, 1.0);
        d = d.min((w - e * t).length());
        if (b.y > p.y) != (a.y > p.y) && p.x < (a.x - b.x) * (p.y - b.y) / (a.y - b.y) + b.x {
            inside = !inside;
        }
        j = i;
    }
    if inside {
        -d
    } else {
        d
    }
}

/// Piecewise-linear alpha ramp, `stops` sorted by offset.
fn ramp(stops: &[(f32, f32)], t: f32) -> f32 {
    if t <= stops[0].0 {
        return stops[0].1;
    }
    for w in stops.windows(2) {
        let ((t0, a0), (t1, a1)) = (w[0], w[1]);
        if t <= t1 {
            return a0 + (a1 - a0) * (t - t0) / (t1 - t0);
        }
    }
    stops[stops.len() - 1].1
}

const WHITE: [f32; 3] = [1.0, 1.0, 1.0];
const BLACK: [f32; 3] = [0.0, 0.0, 0.0];

/// 地面圆环，在 256 单位的画布上设计
fn shade_floor_ring(p: Vec2, px: f32) -> Rgbaf {
    let c = Vec2::splat(128.0);
    let d = (p - c).length();
    let mut out = [0.0; 4];

    // 外圈光晕
    let glow = ramp(&[(0.0, 0.45), (0.35, 0.15), (0.7, 0.05), (1.0, 0.0)], (d - 20.0) / 100.0);
    out = over(out, WHITE, glow * coverage(circle_sd(p, c, 120.0) * px));

    // 半透明圆盘
    let disc = 0.4 + (0.12 - 0.4) * (d / 50.0).min(1.0);
    out = over(out, WHITE, disc * coverage(circle_sd(p, c, 50.0) * px));

    out = over(out, WHITE, 0.95 * coverage(ring_sd(p, c, 50.0, 3.5) * px));
    out = over(out, WHITE, 0.35 * coverage(ring_sd(p, c, 34.0, 2.0) * px));

    // 中间的向下箭头
    let chevron = [
        Vec2::new(0.0, 12.0),
        Vec2::new(-10.0, -4.0),
        Vec2::new(-4.0, -4.0),
        Vec2::new(-4.0, -14.0),
        Vec2::new(4.0, -14.0),
        Vec2::new(4.0, -4.0),
        Vec2::new(10.0, -4.0),
    ]
    .map(|v| v + c);
    over(out, WHITE, coverage(polygon_sd(p, &chevron) * px))
}

/// 圆形图标，在 128 单位的画布上设计
fn shade_icon(p: Vec2, px: f32, pictogram: Pictogram) -> Rgbaf {
    let c = Vec2::splat(64.0);
    let r = 48.0;
    let d = (p - c).length();
    let mut out = [0.0; 4];

    let glow = ramp(&[(0.0, 0.6), (0.35, 0.2), (1.0, 0.0)], (d - r * 0.2) / (r * 0.8));
    out = over(out, WHITE, glow * coverage(circle_sd(p, c, r) * px));
    out = over(out, WHITE, 0.95 * coverage(circle_sd(p, c, 16.0) * px));
    out = over(out, WHITE, 0.5 * coverage(ring_sd(p, c, 24.0, 2.0) * px));

    let q = p - c;
    let sd = match pictogram {
        Pictogram::Square => polygon_sd(
            q,
            &[
                Vec2::new(-6.0, -5.0),
                Vec2::new(6.0, -5.0),
                Vec2::new(6.0, 5.0),
                Vec2::new(-6.0, 5.0),
            ],
        ),
        Pictogram::Play => polygon_sd(q, &[Vec2::new(-4.0, -6.0), Vec2::new(6.0, 0.0), Vec2::new(-4.0, 6.0)]),
        Pictogram::Link => {
            let tip = Vec2::new(5.0, -5.0);
            segment_sd(q, Vec2::new(-5.0, 5.0), tip, 2.0)
                .min(segment_sd(q, tip, Vec2::new(5.0, 0.0), 2.0))
                .min(segment_sd(q, tip, Vec2::new(0.0, -5.0), 2.0))
        }
        Pictogram::Dot => circle_sd(q, Vec2::ZERO, 4.0),
    };
    over(out, BLACK, coverage(sd * px))
}

/// Renders one glyph at [`GLYPH_SIZE`]² as straight-alpha RGBA.
pub fn rasterize(glyph: MarkerGlyph) -> RgbaImage {
    let canvas = match glyph {
        MarkerGlyph::FloorRing => 256.0,
        MarkerGlyph::Icon(_) => 128.0,
    };
    let units_per_px = canvas / GLYPH_SIZE as f32;
    let px_per_unit = 1.0 / units_per_px;

    RgbaImage::from_fn(GLYPH_SIZE, GLYPH_SIZE, |x, y| {
        let p = Vec2::new(x as f32 + 0.5, y as f32 + 0.5) * units_per_px;
        let c = match glyph {
            MarkerGlyph::FloorRing => shade_floor_ring(p, px_per_unit),
            MarkerGlyph::Icon(pic) => shade_icon(p, px_per_unit, pic),
        };
        Rgba(c.map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8))
    })
}

/// All glyphs side by side in [`MarkerGlyph::ALL`] order.
pub fn atlas() -> RgbaImage {
    let n = MarkerGlyph::ALL.len() as u32;
    let mut out = RgbaImage::new(GLYPH_SIZE * n, GLYPH_SIZE);
    for (i, glyph) in MarkerGlyph::ALL.iter().enumerate() {
        let tile = rasterize(*glyph);
        for (x, y, px) in tile.enumerate_pixels() {
            out.put_pixel(i as u32 * GLYPH_SIZE + x, y, *px);
        }
    }
    out
}

// ---------------------------------------------------------------------------
// 标记实例

/// Per-mode marker dimensions (world units).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarkerStyle {
    pub icon_size: f32,
    pub ring_size: f32,
    pub float_amplitude: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HotspotMarker {
    /// Index into the scene's hotspot list.
    pub hotspot_index: usize,
    pub glyph: MarkerGlyph,
    pub base_position: Vec3,
    pub position: Vec3,
    pub phase: f32,
    /// Unpulsed edge length.
    pub size: f32,
    pub pulse: f32,
    pub float_amplitude: f32,
    pub tint: [f32; 3],
}

impl HotspotMarker {
    pub fn new(hotspot_index: usize, hotspot: &Hotspot, position: Vec3, style: &MarkerStyle) -> Self {
        let glyph = MarkerGlyph::for_type(hotspot.kind);
        let base = if glyph.is_ring() { style.ring_size } else { style.icon_size };
        let tint = hotspot
            .pulse_color
            .as_deref()
            .map(crate::tour::parse_hex_color)
            .unwrap_or([1.0, 1.0, 1.0]);
        Self {
            hotspot_index,
            glyph,
            base_position: position,
            position,
            phase: hotspot_index as f32 * 1.3,
            size: base * hotspot.base_scale(),
            pulse: 1.0,
            float_amplitude: style.float_amplitude,
            tint,
        }
    }

    /// 环不浮动，脉动更明显；图标上下浮动
    pub fn animate(&mut self, t: f32) {
        if self.glyph.is_ring() {
            self.pulse = 1.0 + (t * 2.5 + self.phase).sin() * 0.12;
            self.position = self.base_position;
        } else {
            self.pulse = 1.0 + (t * 2.0 + self.phase).sin() * 0.08;
            self.position = self.base_position + Vec3::Y * ((t * 1.5 + self.phase).sin() * self.float_amplitude);
        }
    }

    pub fn half_extent(&self) -> f32 {
        self.size * self.pulse * 0.5
    }
}
