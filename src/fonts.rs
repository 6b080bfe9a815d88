// fonts.rs — 系统/资源目录字体查找（egui 界面与占位图标注共用）
//
// 查找顺序：系统字体目录 → <exe_dir>/assets/fonts → ./assets/fonts
// 只要 ab_glyph 能解析就算可用。

use once_cell::sync::OnceCell;
use std::path::{Path, PathBuf};

const WINDOWS_FONTS: &[&str] = &[
    "msyh.ttc", "msyh.ttf", "simhei.ttf", "Deng.ttf", "meiryo.ttc", "malgun.ttf", "segoeui.ttf", "arial.ttf",
];

const MACOS_FONTS: &[&str] = &[
    "/System/Library/Fonts/PingFang.ttc",
    "/System/Library/Fonts/Hiragino Sans GB.ttc",
    "/System/Library/Fonts/Helvetica.ttc",
    "/System/Library/Fonts/Supplemental/Arial Unicode.ttf",
    "/Library/Fonts/NotoSansCJK-Regular.ttc",
];

const LINUX_FONTS: &[&str] = &[
    "/usr/share/fonts/opentype/noto/NotoSansCJK-Regular.ttc",
    "/usr/share/fonts/truetype/noto/NotoSansCJK-Regular.ttc",
    "/usr/share/fonts/noto-cjk/NotoSansCJK-Regular.ttc",
    "/usr/share/fonts/truetype/wqy/wqy-microhei.ttc",
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
];

// 用户可以把字体放进 assets/fonts，便于打包
const ASSET_FONTS: &[&str] = &[
    "NotoSansCJK-Regular.ttc",
    "NotoSansSC-Regular.otf",
    "NotoSansSC-Regular.ttf",
    "NotoSans-Regular.ttf",
];

fn candidates() -> Vec<PathBuf> {
    let mut out = Vec::new();

    if cfg!(windows) {
        let dir = PathBuf::from(r"C:\Windows\Fonts");
        out.extend(WINDOWS_FONTS.iter().map(|f| dir.join(f)));
    } else if cfg!(target_os = "macos") {
        out.extend(MACOS_FONTS.iter().map(PathBuf::from));
        if let Ok(home) = std::env::var("HOME") {
            out.push(PathBuf::from(home).join("Library/Fonts/NotoSansCJK-Regular.ttc"));
        }
    } else if cfg!(unix) {
        out.extend(LINUX_FONTS.iter().map(PathBuf::from));
        if let Ok(home) = std::env::var("HOME") {
            let home = PathBuf::from(home);
            out.push(home.join(".local/share/fonts/NotoSansCJK-Regular.ttc"));
            out.push(home.join(".fonts/NotoSansCJK-Regular.ttc"));
        }
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            out.extend(ASSET_FONTS.iter().map(|f| dir.join("assets").join("fonts").join(f)));
        }
    }
    out.extend(ASSET_FONTS.iter().map(|f| PathBuf::from("assets").join("fonts").join(f)));
    out
}

fn try_load(path: &Path) -> Option<Vec<u8>> {
    let bytes = std::fs::read(path).ok()?;
    ab_glyph::FontArc::try_from_vec(bytes.clone()).ok()?;
    Some(bytes)
}

/// First usable UI font on this machine, searched once per process.
pub fn ui_font() -> Option<&'static (PathBuf, Vec<u8>)> {
    static FONT: OnceCell<Option<(PathBuf, Vec<u8>)>> = OnceCell::new();
    FONT.get_or_init(|| {
        let found = candidates().into_iter().find_map(|p| try_load(&p).map(|b| (p, b)));
        match &found {
            Some((p, _)) => log::info!("using UI font {}", p.display()),
            None => log::warn!("no UI font found, falling back to egui defaults"),
        }
        found
    })
    .as_ref()
}

/// The same font parsed for glyph rasterization.
pub fn label_font() -> Option<ab_glyph::FontArc> {
    let (_, bytes) = ui_font()?;
    ab_glyph::FontArc::try_from_vec(bytes.clone()).ok()
}

/// Installs [`ui_font`] as egui's first choice for both families.
pub fn install_egui_fonts(ctx: &egui::Context) {
    let Some((_, bytes)) = ui_font() else {
        return;
    };

    let mut fonts = egui::FontDefinitions::default();
    fonts
        .font_data
        .insert("ui".to_owned(), egui::FontData::from_owned(bytes.clone()));
    for family in [egui::FontFamily::Proportional, egui::FontFamily::Monospace] {
        if let Some(list) = fonts.families.get_mut(&family) {
            list.insert(0, "ui".to_owned());
        }
    }
    ctx.set_fonts(fonts);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_list_ends_with_assets() {
        let list = candidates();
        assert!(list.last().is_some_and(|p| p.starts_with("assets")));
    }
}
