// main.rs — 桌面宿主：窗口、winit 事件翻译、菜单/状态栏/热点面板，驱动 TourSession

#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")] // Release 下隐藏控制台窗口

use tour_viewer::engine::{AlwaysGranted, ViewState};
use tour_viewer::input::{InputEvent, Key};
use tour_viewer::renderer::Renderer;
use tour_viewer::texture_cache::{FileImageLoader, ThreadExecutor};
use tour_viewer::xr::NoXr;
use tour_viewer::{i18n, DefaultEngineFactory, Hotspot, HotspotType, SceneMode, TourConfig, TourSession, ViewerConfig};

use winit::{
    dpi::LogicalSize,
    event::*,
    event_loop::{ControlFlow, EventLoop},
    window::{Fullscreen, Window, WindowBuilder},
};

use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;

/// 菜单里点出来的动作，渲染结束后统一执行
enum UiAction {
    OpenTour,
    GoTo(String),
    ResetView,
    AutoRotate(bool),
    Gyro(bool),
    EnterVr,
    ExitVr,
    DismissHotspot,
    Language(String),
    ToggleFullscreen,
    Exit,
}

/// 每帧渲染前从会话里取出的只读状态
struct Snapshot {
    scene_name: Option<String>,
    scenes: Vec<(String, String)>,
    loading: bool,
    mode: Option<SceneMode>,
    view: Option<ViewState>,
    auto_rotate: bool,
    gyro: bool,
    in_vr: bool,
    hovered: Option<Hotspot>,
    active: Option<Hotspot>,
}

struct UiState {
    lang: String,
    is_fullscreen: bool,
    toast: Option<String>,
}

/// First argument that is not an option or an option's value.
fn tour_path_from_args() -> Option<PathBuf> {
    let mut it = std::env::args().skip(1);
    while let Some(a) = it.next() {
        if a == "--lang" || a == "--config" {
            it.next();
            continue;
        }
        if !a.starts_with("--") {
            return Some(PathBuf::from(a));
        }
    }
    None
}

fn initial_tour() -> TourConfig {
    if let Some(path) = tour_path_from_args() {
        match TourConfig::load(&path) {
            Ok(t) => return t,
            Err(e) => log::error!("cannot open tour {}: {}", path.display(), e),
        }
    }
    match TourConfig::demo() {
        Ok(t) => t,
        Err(e) => {
            log::error!("built-in demo tour is broken: {}", e);
            std::process::exit(1);
        }
    }
}

fn map_key(code: Option<VirtualKeyCode>) -> Key {
    match code {
        Some(VirtualKeyCode::W) => Key::W,
        Some(VirtualKeyCode::A) => Key::A,
        Some(VirtualKeyCode::S) => Key::S,
        Some(VirtualKeyCode::D) => Key::D,
        Some(VirtualKeyCode::Up) => Key::ArrowUp,
        Some(VirtualKeyCode::Down) => Key::ArrowDown,
        Some(VirtualKeyCode::Left) => Key::ArrowLeft,
        Some(VirtualKeyCode::Right) => Key::ArrowRight,
        _ => Key::Other,
    }
}

/// winit → engine input. `cursor` tracks the last pointer position, which
/// winit does not repeat on button events.
fn translate(event: &WindowEvent, cursor: &mut (f32, f32)) -> Option<InputEvent> {
    match event {
        WindowEvent::CursorMoved { position, .. } => {
            *cursor = (position.x as f32, position.y as f32);
            Some(InputEvent::PointerMove { x: cursor.0, y: cursor.1 })
        }
        WindowEvent::CursorLeft { .. } => Some(InputEvent::PointerLeave),
        WindowEvent::MouseInput {
            state,
            button: MouseButton::Left,
            ..
        } => Some(match state {
            ElementState::Pressed => InputEvent::PointerDown { x: cursor.0, y: cursor.1 },
            ElementState::Released => InputEvent::PointerUp { x: cursor.0, y: cursor.1 },
        }),
        WindowEvent::MouseWheel { delta, .. } => {
            // 向上滚 = 拉近，换成浏览器的 deltaY 约定
            let delta_y = match delta {
                MouseScrollDelta::LineDelta(_, y) => -y * 100.0,
                MouseScrollDelta::PixelDelta(pos) => -pos.y as f32,
            };
            Some(InputEvent::Wheel { delta_y })
        }
        WindowEvent::Touch(t) => {
            let (id, x, y) = (t.id, t.location.x as f32, t.location.y as f32);
            Some(match t.phase {
                TouchPhase::Started => InputEvent::TouchStart { id, x, y },
                TouchPhase::Moved => InputEvent::TouchMove { id, x, y },
                TouchPhase::Ended | TouchPhase::Cancelled => InputEvent::TouchEnd { id, x, y },
            })
        }
        WindowEvent::KeyboardInput { input, .. } => {
            let key = map_key(input.virtual_keycode);
            if key == Key::Other {
                return None;
            }
            Some(match input.state {
                ElementState::Pressed => InputEvent::KeyDown(key),
                ElementState::Released => InputEvent::KeyUp(key),
            })
        }
        WindowEvent::Focused(false) => Some(InputEvent::FocusLost),
        WindowEvent::Resized(size) => Some(InputEvent::Resize {
            width: size.width as f32,
            height: size.height as f32,
        }),
        _ => None,
    }
}

fn pick_tour_file() -> Option<PathBuf> {
    rfd::FileDialog::new()
        .add_filter(&i18n::tr("dialog.tour_filter"), &["json"])
        .pick_file()
}

fn snapshot(session: &mut TourSession) -> Snapshot {
    let scenes = session
        .tour()
        .scenes
        .iter()
        .map(|s| (s.id.clone(), s.name.clone()))
        .collect();
    let scene_name = session.current_scene().map(|s| s.name.clone());
    let loading = session.is_loading();
    let view = session.view_state();
    let hovered = session.hovered().cloned();
    let active = session.active_hotspot().cloned();
    let controller = session.controller_mut();
    let mode = controller.mode();
    let (auto_rotate, gyro, in_vr) = match controller.panorama_controls() {
        Some(c) => (c.auto_rotate(), c.gyro_enabled(), c.in_vr()),
        None => (false, false, false),
    };
    Snapshot {
        scene_name,
        scenes,
        loading,
        mode,
        view,
        auto_rotate,
        gyro,
        in_vr,
        hovered,
        active,
    }
}

fn apply(action: UiAction, session: &mut TourSession, ui: &mut UiState, window: &Window, control_flow: &mut ControlFlow) {
    match action {
        UiAction::OpenTour => {
            if let Some(path) = pick_tour_file() {
                match TourConfig::load(&path) {
                    Ok(tour) => {
                        session.replace_tour(tour);
                    }
                    Err(e) => {
                        log::error!("cannot open tour {}: {}", path.display(), e);
                        ui.toast = Some(i18n::tr_with("dialog.open_failed", &[("err", e.to_string())]));
                    }
                }
            }
        }
        UiAction::GoTo(id) => {
            session.go_to(&id, true);
        }
        UiAction::ResetView => {
            let initial = session.current_scene().and_then(|s| s.initial_view);
            let (yaw, pitch, fov) = initial.map(|v| (v.yaw, v.pitch, Some(v.fov))).unwrap_or((0.0, 0.0, None));
            session.controller_mut().set_view(yaw, pitch, fov);
        }
        UiAction::AutoRotate(on) => {
            if let Some(c) = session.controller_mut().panorama_controls() {
                c.set_auto_rotate(on);
            }
        }
        UiAction::Gyro(on) => {
            if let Some(c) = session.controller_mut().panorama_controls() {
                c.set_gyro_enabled(on, &mut AlwaysGranted);
            }
        }
        UiAction::EnterVr => {
            if let Some(c) = session.controller_mut().panorama_controls() {
                if !c.enter_vr(&mut NoXr) {
                    ui.toast = Some(i18n::tr("xr.unavailable"));
                }
            }
        }
        UiAction::ExitVr => {
            if let Some(c) = session.controller_mut().panorama_controls() {
                c.exit_vr(&mut NoXr);
            }
        }
        UiAction::DismissHotspot => session.dismiss_hotspot(),
        UiAction::Language(code) => {
            ui.lang = code;
            i18n::init(ui.lang.clone());
            window.set_title(&i18n::tr("app.title"));
        }
        UiAction::ToggleFullscreen => {
            ui.is_fullscreen = !ui.is_fullscreen;
            if ui.is_fullscreen {
                window.set_fullscreen(Some(Fullscreen::Borderless(None)));
            } else {
                window.set_fullscreen(None);
            }
        }
        UiAction::Exit => *control_flow = ControlFlow::Exit,
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let lang = i18n::resolve_lang_from_args();
    i18n::init(lang.clone());

    let config = ViewerConfig::resolve();
    let tour = initial_tour();

    let event_loop = EventLoop::new();
    let window = Arc::new(
        WindowBuilder::new()
            .with_title(&i18n::tr("app.title"))
            .with_inner_size(LogicalSize::new(1280, 720))
            .build(&event_loop)
            .unwrap(),
    );

    let mut renderer = pollster::block_on(Renderer::new(window.clone()));

    let loader = Arc::new(FileImageLoader::new(config.assets.root.clone()));
    let factory = DefaultEngineFactory::new(config, loader, Rc::new(ThreadExecutor));
    let mut session = TourSession::new(tour, Box::new(factory));
    let size = window.inner_size();
    session.handle_event(InputEvent::Resize {
        width: size.width as f32,
        height: size.height as f32,
    });
    session.start();

    let mut ui_state = UiState {
        lang,
        is_fullscreen: false,
        toast: None,
    };
    let mut cursor = (0.0f32, 0.0f32);
    let mut last_tick = Instant::now();

    event_loop.run(move |event, _, control_flow| {
        *control_flow = ControlFlow::Poll;

        match event {
            Event::WindowEvent { event, .. } => {
                // 先给 egui；松开按键总要转发，否则拖拽会卡住
                let response = renderer.egui_state.on_event(&renderer.egui_ctx, &event);
                let is_release = matches!(
                    event,
                    WindowEvent::MouseInput {
                        state: ElementState::Released,
                        ..
                    }
                );
                if response.consumed && !is_release {
                    return;
                }

                match &event {
                    WindowEvent::CloseRequested => {
                        session.dispose();
                        *control_flow = ControlFlow::Exit;
                        return;
                    }
                    WindowEvent::Resized(new_size) => renderer.resize(*new_size),
                    WindowEvent::ScaleFactorChanged { new_inner_size, .. } => renderer.resize(**new_inner_size),
                    WindowEvent::KeyboardInput { input, .. } if input.state == ElementState::Pressed => {
                        match input.virtual_keycode {
                            Some(VirtualKeyCode::O) => {
                                apply(UiAction::OpenTour, &mut session, &mut ui_state, &window, control_flow)
                            }
                            Some(VirtualKeyCode::F11) => {
                                apply(UiAction::ToggleFullscreen, &mut session, &mut ui_state, &window, control_flow)
                            }
                            _ => {}
                        }
                    }
                    WindowEvent::DroppedFile(path) => match TourConfig::load(path) {
                        Ok(tour) => {
                            session.replace_tour(tour);
                        }
                        Err(e) => ui_state.toast = Some(i18n::tr_with("dialog.open_failed", &[("err", e.to_string())])),
                    },
                    _ => {}
                }

                if let Some(input) = translate(&event, &mut cursor) {
                    session.handle_event(input);
                }
            }

            Event::RedrawRequested(_) => {
                let now = Instant::now();
                let dt = now.duration_since(last_tick).as_secs_f32();
                last_tick = now;

                let frame = session.tick(dt);
                renderer.prepare(frame.as_ref());

                let snap = snapshot(&mut session);
                let mut actions = Vec::new();
                let render_result = renderer.render_with_ui(&window, |ctx| {
                    draw_ui(ctx, &snap, &ui_state, &mut actions);
                });

                for action in actions {
                    apply(action, &mut session, &mut ui_state, &window, control_flow);
                }

                match render_result {
                    Ok(_) => {}
                    Err(wgpu::SurfaceError::Lost) => renderer.resize(renderer.size),
                    Err(wgpu::SurfaceError::OutOfMemory) => *control_flow = ControlFlow::Exit,
                    Err(e) => log::warn!("render error: {:?}", e),
                }
            }

            Event::MainEventsCleared => {
                window.request_redraw();
            }

            _ => {}
        }
    });
}

fn draw_ui(ctx: &egui::Context, snap: &Snapshot, ui_state: &UiState, actions: &mut Vec<UiAction>) {
    egui::TopBottomPanel::top("menu_bar").show(ctx, |ui| {
        egui::menu::bar(ui, |ui| {
            ui.menu_button(i18n::tr("menu.file"), |ui| {
                if ui.button(i18n::tr("menu.open_tour")).clicked() {
                    ui.close_menu();
                    actions.push(UiAction::OpenTour);
                }
                if ui.button(i18n::tr("menu.exit")).clicked() {
                    actions.push(UiAction::Exit);
                }
            });

            ui.menu_button(i18n::tr("menu.scenes"), |ui| {
                for (id, name) in &snap.scenes {
                    let current = snap.scene_name.as_deref() == Some(name.as_str());
                    if ui.selectable_label(current, name).clicked() {
                        ui.close_menu();
                        actions.push(UiAction::GoTo(id.clone()));
                    }
                }
            });

            ui.menu_button(i18n::tr("menu.view"), |ui| {
                if ui.button(i18n::tr("menu.reset_view")).clicked() {
                    ui.close_menu();
                    actions.push(UiAction::ResetView);
                }
                if snap.mode == Some(SceneMode::Panorama) {
                    ui.separator();
                    let mut auto_rotate = snap.auto_rotate;
                    if ui.checkbox(&mut auto_rotate, i18n::tr("menu.auto_rotate")).clicked() {
                        actions.push(UiAction::AutoRotate(auto_rotate));
                    }
                    let mut gyro = snap.gyro;
                    if ui.checkbox(&mut gyro, i18n::tr("menu.gyro")).clicked() {
                        actions.push(UiAction::Gyro(gyro));
                    }
                    let vr_label = if snap.in_vr { "menu.exit_vr" } else { "menu.enter_vr" };
                    if ui.button(i18n::tr(vr_label)).clicked() {
                        ui.close_menu();
                        actions.push(if snap.in_vr { UiAction::ExitVr } else { UiAction::EnterVr });
                    }
                }
            });

            ui.menu_button("🌐", |ui| {
                for (code, name) in [("en", "English"), ("zh-Hans", "简体中文")] {
                    if ui.radio(ui_state.lang == code, name).clicked() {
                        ui.close_menu();
                        actions.push(UiAction::Language(code.to_string()));
                    }
                }
            });
        });
    });

    egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
        ui.horizontal(|ui| {
            if let Some(name) = &snap.scene_name {
                if snap.loading {
                    ui.label(
                        egui::RichText::new(i18n::tr_with("status.loading", &[("name", name.clone())]))
                            .color(egui::Color32::YELLOW),
                    );
                } else {
                    ui.label(i18n::tr_with("status.scene", &[("name", name.clone())]));
                }
                ui.label("|");
            }

            match snap.view {
                Some(ViewState::Panorama { yaw, pitch, fov }) => {
                    ui.label(i18n::tr_with(
                        "status.view",
                        &[
                            ("yaw", format!("{:.1}", yaw)),
                            ("pitch", format!("{:.1}", pitch)),
                            ("fov", format!("{:.1}", fov)),
                        ],
                    ));
                    ui.label("|");
                    ui.label(i18n::tr("hint.panorama"));
                }
                Some(ViewState::Walkable { position, .. }) => {
                    ui.label(i18n::tr_with(
                        "status.position",
                        &[
                            ("x", format!("{:.2}", position.x)),
                            ("y", format!("{:.2}", position.y)),
                            ("z", format!("{:.2}", position.z)),
                        ],
                    ));
                    ui.label("|");
                    ui.label(i18n::tr("hint.walkable"));
                }
                None => {}
            }

            if let Some(toast) = &ui_state.toast {
                ui.label("|");
                ui.label(egui::RichText::new(toast).color(egui::Color32::LIGHT_RED));
            }
        });
    });

    if let Some(h) = &snap.hovered {
        if let Some(tip) = h.tooltip.as_deref().or(h.title.as_deref()) {
            egui::show_tooltip_at_pointer(ctx, egui::Id::new("hotspot_tooltip"), |ui| {
                ui.label(tip);
            });
        }
    }

    if let Some(h) = &snap.active {
        hotspot_panel(ctx, h, actions);
    }
}

fn hotspot_panel(ctx: &egui::Context, h: &Hotspot, actions: &mut Vec<UiAction>) {
    let title = h.title.clone().or_else(|| h.tooltip.clone()).unwrap_or_else(|| h.id.clone());
    egui::Window::new(title)
        .id(egui::Id::new("hotspot_panel"))
        .collapsible(false)
        .resizable(false)
        .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
        .show(ctx, |ui| {
            if let Some(content) = &h.content {
                ui.label(content);
            }
            match h.kind {
                HotspotType::Image => {
                    if let Some(url) = &h.image_url {
                        ui.label(i18n::tr_with("panel.image", &[("url", url.clone())]));
                    }
                    if let Some(alt) = &h.image_alt {
                        ui.weak(alt);
                    }
                }
                HotspotType::Video => {
                    if let Some(url) = &h.video_url {
                        ui.hyperlink_to(i18n::tr_with("panel.video", &[("url", url.clone())]), url);
                    }
                }
                HotspotType::Link => {
                    if let Some(url) = &h.link_url {
                        ui.hyperlink_to(i18n::tr("panel.open_link"), url);
                    }
                }
                HotspotType::Info | HotspotType::Navigation => {}
            }
            ui.separator();
            if ui.button(i18n::tr("panel.close")).clicked() {
                actions.push(UiAction::DismissHotspot);
            }
        });
}
