// i18n.rs — 运行时界面文案
//
// - 文案来源：assets/i18n/<lang>.json（扁平 key → value）
// - 查找顺序：所选语言 → 内置英文
// - 用法：tr("key") / tr_with("key", &[("name", ...)])，{name} 为占位符
//
// 语言选择：
// - CLI: --lang <code>（如 en、zh-Hans）
// - Env: TOUR_VIEWER_LANG
// - 默认：en

use once_cell::sync::OnceCell;
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::RwLock,
};

const BUILTIN_EN: &str = include_str!("../assets/i18n/en.json");

#[derive(Debug, Clone)]
pub struct I18n {
    pub lang: String,
    map: HashMap<String, String>,
    fallback_map: HashMap<String, String>,
}

static I18N: OnceCell<RwLock<I18n>> = OnceCell::new();

fn parse_map(text: &str) -> Option<HashMap<String, String>> {
    serde_json::from_str(text).ok()
}

fn load_json_map(path: &Path) -> Option<HashMap<String, String>> {
    let text = std::fs::read_to_string(path).ok()?;
    let map = parse_map(&text);
    if map.is_none() {
        log::warn!("ignoring malformed translation file {}", path.display());
    }
    map
}

/// <exe_dir>/assets/i18n/<lang>.json，找不到再看工作目录下的 assets/i18n/
fn find_lang_file(lang: &str) -> Option<PathBuf> {
    let file = format!("{}.json", lang);

    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            let p = dir.join("assets").join("i18n").join(&file);
            if p.exists() {
                return Some(p);
            }
        }
    }

    let p = PathBuf::from("assets").join("i18n").join(&file);
    p.exists().then_some(p)
}

fn builtin_map() -> HashMap<String, String> {
    parse_map(BUILTIN_EN).unwrap_or_default()
}

/// Installs `lang` as the active language. Calling again switches languages.
pub fn init(lang: impl Into<String>) {
    let lang = lang.into();
    let fallback_map = builtin_map();
    let map = find_lang_file(&lang)
        .and_then(|p| load_json_map(&p))
        .unwrap_or_else(|| {
            if lang != "en" {
                log::info!("no translations for {:?}, using English", lang);
            }
            HashMap::new()
        });

    let i = I18n {
        lang,
        map,
        fallback_map,
    };

    if let Some(lock) = I18N.get() {
        if let Ok(mut w) = lock.write() {
            *w = i;
        }
    } else {
        let _ = I18N.set(RwLock::new(i));
    }
}

fn get_locked() -> Option<std::sync::RwLockReadGuard<'static, I18n>> {
    I18N.get().and_then(|l| l.read().ok())
}

/// Localized text for `key`; the key itself when nothing matches.
pub fn tr(key: &str) -> String {
    let Some(i) = get_locked() else {
        return builtin_map().remove(key).unwrap_or_else(|| key.to_string());
    };

    i.map
        .get(key)
        .or_else(|| i.fallback_map.get(key))
        .cloned()
        .unwrap_or_else(|| key.to_string())
}

/// [`tr`] plus `{name}` substitution. Unknown placeholders stay as-is.
pub fn tr_with(key: &str, args: &[(&str, String)]) -> String {
    let mut s = tr(key);
    for (k, v) in args {
        let placeholder = format!("{{{}}}", k);
        s = s.replace(&placeholder, v);
    }
    s
}

pub fn resolve_lang_from_args() -> String {
    let mut it = std::env::args();
    while let Some(a) = it.next() {
        if a == "--lang" {
            if let Some(v) = it.next() {
                return v;
            }
        }
    }

    if let Ok(v) = std::env::var("TOUR_VIEWER_LANG") {
        if !v.trim().is_empty() {
            return v;
        }
    }

    "en".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_english_has_status_keys() {
        let m = builtin_map();
        assert!(m.contains_key("status.loading"));
        assert!(m.contains_key("menu.open_tour"));
    }

    #[test]
    fn placeholders_substitute() {
        init("en");
        let s = tr_with("status.scene", &[("name", "Kitchen".to_string())]);
        assert!(s.contains("Kitchen"));
        assert_eq!(tr("no.such.key"), "no.such.key");
    }
}
