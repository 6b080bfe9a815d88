// placeholder.rs — 占位全景图：真实照片缺失或加载失败时使用
//
// 同一个场景 id 每次生成的图完全相同（伪随机数种子取自 id）。

use ab_glyph::{point, Font, FontArc, PxScale, ScaleFont};
use image::{Rgba, RgbaImage};

struct Scheme {
    primary: [f32; 3],
    secondary: [f32; 3],
    accent: [f32; 3],
}

fn scheme_for(scene_id: &str) -> Scheme {
    let hex = |s: &str| crate::tour::parse_hex_color(s);
    let (p, s, a) = match scene_id {
        "kitchen" => ("#1b1b2f", "#162447", "#e43f5a"),
        "bedroom" => ("#0f0e17", "#2a2438", "#ff8906"),
        "patio" => ("#0b132b", "#1c2541", "#5bc0be"),
        _ => ("#1a1a2e", "#16213e", "#e94560"),
    };
    Scheme {
        primary: hex(p),
        secondary: hex(s),
        accent: hex(a),
    }
}

/// xorshift32，够用就行
struct Rng(u32);

impl Rng {
    fn seeded(text: &str) -> Self {
        // FNV-1a
        let mut h: u32 = 0x811c_9dc5;
        for b in text.bytes() {
            h ^= b as u32;
            h = h.wrapping_mul(0x0100_0193);
        }
        Self(h.max(1))
    }

    fn next_f32(&mut self) -> f32 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.0 = x;
        (x >> 8) as f32 / (1u32 << 24) as f32
    }
}

fn lerp3(a: [f32; 3], b: [f32; 3], t: f32) -> [f32; 3] {
    [
        a[0] + (b[0] - a[0]) * t,
        a[1] + (b[1] - a[1]) * t,
        a[2] + (b[2] - a[2]) * t,
    ]
}

fn blend(px: &mut Rgba<u8>, color: [f32; 3], alpha: f32) {
    let alpha = alpha.clamp(0.0, 1.0);
    for c in 0..3 {
        let dst = px[c] as f32 / 255.0;
        px[c] = ((dst + (color[c] - dst) * alpha) * 255.0).round().clamp(0.0, 255.0) as u8;
    }
}

fn background(scheme: &Scheme, v: f32) -> [f32; 3] {
    let floor = [10.0 / 255.0; 3];
    if v < 0.4 {
        lerp3(scheme.primary, scheme.secondary, v / 0.4)
    } else if v < 0.6 {
        scheme.secondary
    } else {
        lerp3(scheme.secondary, floor, (v - 0.6) / 0.4)
    }
}

/// Generates the placeholder equirect for `scene_id`. `None` only for a zero-sized request.
pub fn generate(scene_id: &str, width: u32, height: u32) -> Option<RgbaImage> {
    if width == 0 || height == 0 {
        return None;
    }
    let scheme = scheme_for(scene_id);
    let mut rng = Rng::seeded(scene_id);

    // 1. 渐变背景
    let mut img = RgbaImage::from_fn(width, height, |_, y| {
        let c = background(&scheme, y as f32 / height as f32);
        Rgba([
            (c[0] * 255.0) as u8,
            (c[1] * 255.0) as u8,
            (c[2] * 255.0) as u8,
            255,
        ])
    });

    // 2. 网格线：24 列 × 12 行，提供空间参照
    let col = (width / 24).max(1);
    let row = (height / 12).max(1);
    for (x, y, px) in img.enumerate_pixels_mut() {
        if x % col == 0 || y % row == 0 {
            blend(px, [1.0; 3], 0.05);
        }
    }

    // 3. 光斑
    for _ in 0..30 {
        let cx = rng.next_f32() * width as f32;
        let cy = rng.next_f32() * height as f32;
        let r = 20.0 + rng.next_f32() * 80.0;
        let x0 = (cx - r).max(0.0) as u32;
        let x1 = ((cx + r).ceil() as u32).min(width);
        let y0 = (cy - r).max(0.0) as u32;
        let y1 = ((cy + r).ceil() as u32).min(height);
        for y in y0..y1 {
            for x in x0..x1 {
                let d = ((x as f32 - cx).powi(2) + (y as f32 - cy).powi(2)).sqrt();
                if d < r {
                    let a = (0x30 as f32 / 255.0) * (1.0 - d / r);
                    blend(img.get_pixel_mut(x, y), scheme.accent, a);
                }
            }
        }
    }

    // 4. 地面提示（下 35%）
    let floor_start = (height as f32 * 0.65) as u32;
    for y in floor_start..height {
        let t = (y - floor_start) as f32 / (height - floor_start).max(1) as f32;
        for x in 0..width {
            blend(img.get_pixel_mut(x, y), [1.0; 3], 0.03 * t);
        }
    }

    // 5. 场景名，环绕四处，任意朝向都能看到
    if let Some(font) = crate::fonts::label_font() {
        let label = scene_id.replace('-', " ").to_uppercase();
        for i in 0..4 {
            let cx = width as f32 / 4.0 * i as f32 + width as f32 / 8.0;
            draw_label(&mut img, &font, &label, cx, height as f32 / 2.0, height as f32 / 8.0);
        }
    }

    // 6. 噪点
    for px in img.pixels_mut() {
        let n = (rng.next_f32() - 0.5) * 10.0;
        for c in 0..3 {
            px[c] = (px[c] as f32 + n).clamp(0.0, 255.0) as u8;
        }
    }

    Some(img)
}

fn draw_label(img: &mut RgbaImage, font: &FontArc, text: &str, cx: f32, cy: f32, size: f32) {
    let scale = PxScale::from(size);
    let scaled = font.as_scaled(scale);
    let total: f32 = text.chars().map(|c| scaled.h_advance(scaled.glyph_id(c))).sum();
    let baseline = cy + (scaled.ascent() + scaled.descent()) / 2.0;

    let (w, h) = img.dimensions();
    let mut caret = cx - total / 2.0;
    for c in text.chars() {
        let id = scaled.glyph_id(c);
        let glyph = id.with_scale_and_position(scale, point(caret, baseline));
        caret += scaled.h_advance(id);
        let Some(outlined) = font.outline_glyph(glyph) else {
            continue;
        };
        let bounds = outlined.px_bounds();
        outlined.draw(|gx, gy, coverage| {
            let x = bounds.min.x as i32 + gx as i32;
            let y = bounds.min.y as i32 + gy as i32;
            if x >= 0 && y >= 0 && (x as u32) < w && (y as u32) < h {
                blend(img.get_pixel_mut(x as u32, y as u32), [1.0; 3], 0.15 * coverage);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_per_scene() {
        let a = generate("kitchen", 128, 64).unwrap();
        let b = generate("kitchen", 128, 64).unwrap();
        let c = generate("living-room", 128, 64).unwrap();
        assert_eq!(a.as_raw(), b.as_raw());
        assert_ne!(a.as_raw(), c.as_raw());
        assert_eq!(a.dimensions(), (128, 64));
    }

    #[test]
    fn zero_size_is_none() {
        assert!(generate("x", 0, 10).is_none());
    }

    #[test]
    fn fully_opaque() {
        let img = generate("patio", 64, 32).unwrap();
        assert!(img.pixels().all(|p| p[3] == 255));
    }
}
