// src/ui.rs
use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use egui::{Align, Color32, ColorImage, ImageData, Layout, TextureHandle, TextureOptions, Vec2};
use log::{debug, info};

use crate::session::{SessionCoordinator, SessionResult, SessionSnapshot, SessionState};

const FPS_UPDATE_INTERVAL: Duration = Duration::from_millis(500);

/// Which controls accept clicks, derived from the session snapshot alone.
/// Diagnose is read-only and stays enabled in every state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ControlAvailability {
    start: bool,
    stop: bool,
    reconfigure: bool,
    start_recording: bool,
    stop_recording: bool,
}

impl ControlAvailability {
    fn for_snapshot(snapshot: &SessionSnapshot) -> Self {
        let running = snapshot.is_running();
        Self {
            start: snapshot.session_state == SessionState::Stopped,
            stop: snapshot.session_state != SessionState::Stopped,
            reconfigure: running,
            start_recording: running && !snapshot.is_recording,
            stop_recording: running && snapshot.is_recording,
        }
    }
}

pub struct CameraPreviewUI {
    coordinator: SessionCoordinator,

    // --- Preview ---
    texture: Option<TextureHandle>,
    texture_size: Option<Vec2>,

    // --- Popovers ---
    show_format_picker: bool,
    diagnostics: Option<Vec<String>>,

    // --- FPS Fields ---
    last_fps_update_time: Instant,
    frames_since_last_update: u32,
    last_calculated_fps: f32,
}

impl CameraPreviewUI {
    pub fn new(_cc: &eframe::CreationContext<'_>, mut coordinator: SessionCoordinator) -> Self {
        info!("Initializing CameraPreviewUI");
        dispatch("check permissions", coordinator.check_permissions());
        Self {
            coordinator,
            texture: None,
            texture_size: None,
            show_format_picker: false,
            diagnostics: None,
            last_fps_update_time: Instant::now(),
            frames_since_last_update: 0,
            last_calculated_fps: 0.0,
        }
    }

    fn update_fps_counter(&mut self) {
        self.frames_since_last_update += 1;
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_fps_update_time);

        if elapsed >= FPS_UPDATE_INTERVAL {
            let elapsed_secs = elapsed.as_secs_f32();
            self.last_calculated_fps = if elapsed_secs > 0.0 {
                self.frames_since_last_update as f32 / elapsed_secs
            } else {
                f32::INFINITY
            };
            self.frames_since_last_update = 0;
            self.last_fps_update_time = now;
        }
    }

    /// Uploads the newest preview frame, if one arrived since the last repaint.
    fn update_preview_texture(&mut self, ctx: &egui::Context) {
        let Some(frame) = self
            .coordinator
            .preview_mut()
            .and_then(|preview| preview.take_new_frame())
        else {
            return;
        };
        let size = [frame.width() as usize, frame.height() as usize];
        let frame_size_vec = Vec2::new(size[0] as f32, size[1] as f32);
        let color_image = Arc::new(ColorImage::from_rgb(size, frame.as_raw()));

        match self.texture {
            Some(ref mut texture) => {
                if self.texture_size.map_or(true, |s| s != frame_size_vec) {
                    debug!("Texture size changed to: {:?}", frame_size_vec);
                    self.texture_size = Some(frame_size_vec);
                }
                texture.set(ImageData::Color(color_image), TextureOptions::LINEAR);
            }
            None => {
                info!("Creating texture with size: {:?}", size);
                let new_texture = ctx.load_texture(
                    "camera_preview",
                    ImageData::Color(color_image),
                    TextureOptions::LINEAR,
                );
                self.texture_size = Some(frame_size_vec);
                self.texture = Some(new_texture);
            }
        }
    }

    fn preview_panel(&self, ui: &mut egui::Ui) {
        let state = self.coordinator.snapshot().session_state;
        let texture = match (&self.texture, self.texture_size) {
            (Some(texture), Some(size)) if state != SessionState::Stopped => Some((texture, size)),
            _ => None,
        };

        let Some((texture, tex_size)) = texture else {
            ui.with_layout(Layout::top_down(Align::Center), |ui| {
                ui.add_space(ui.available_height() / 3.0);
                match state {
                    SessionState::Starting => {
                        ui.spinner();
                        ui.label("Starting camera...");
                    }
                    SessionState::Running => {
                        ui.spinner();
                        ui.label("Waiting for first frame...");
                    }
                    SessionState::Stopped if self.coordinator.preview_available() => {
                        ui.label("Camera stopped. Press Start Camera to preview.");
                    }
                    SessionState::Stopped => {
                        ui.label("No camera preview available.");
                    }
                }
            });
            return;
        };

        let aspect_ratio = if tex_size.y > 0.0 {
            tex_size.x / tex_size.y
        } else {
            1.0
        };
        let available_width = ui.available_width();
        let available_height = ui.available_height();
        let mut image_width = available_width;
        let mut image_height = available_width / aspect_ratio;
        if image_height > available_height {
            image_height = available_height;
            image_width = available_height * aspect_ratio;
        }

        ui.with_layout(Layout::top_down(Align::Center), |ui| {
            ui.add(
                egui::Image::new(texture)
                    .max_width(image_width)
                    .max_height(image_height)
                    .maintain_aspect_ratio(true)
                    .rounding(5.0),
            );
        });
    }

    fn control_rows(&mut self, ui: &mut egui::Ui) {
        let snapshot = self.coordinator.snapshot();
        let controls = ControlAvailability::for_snapshot(snapshot);
        let recording = snapshot.is_recording;

        ui.horizontal(|ui| {
            if ui
                .add_enabled(controls.start, egui::Button::new("Start Camera"))
                .clicked()
            {
                dispatch("start session", self.coordinator.start_session());
            }
            if ui
                .add_enabled(controls.stop, egui::Button::new("Stop Camera"))
                .clicked()
            {
                dispatch("stop session", self.coordinator.stop_session());
            }
        });

        ui.horizontal(|ui| {
            if ui
                .add_enabled(controls.reconfigure, egui::Button::new("Try Ultra-Wide Mode"))
                .clicked()
            {
                dispatch("ultra-wide", self.coordinator.attempt_ultra_wide_capture());
            }
            if ui
                .add_enabled(controls.reconfigure, egui::Button::new("Select Format…"))
                .clicked()
            {
                self.show_format_picker = true;
            }
            if ui.button("Diagnose Camera Access").clicked() {
                self.diagnostics = Some(self.coordinator.diagnose().lines());
            }
        });

        ui.horizontal(|ui| {
            if ui
                .add_enabled(controls.start_recording, egui::Button::new("Start Recording"))
                .clicked()
            {
                self.coordinator.start_recording();
            }
            if ui
                .add_enabled(controls.stop_recording, egui::Button::new("Stop Recording"))
                .clicked()
            {
                self.coordinator.stop_recording();
            }
            if recording {
                ui.colored_label(Color32::RED, "● REC");
            }
        });
    }

    fn format_picker(&mut self, ctx: &egui::Context) {
        if !self.show_format_picker {
            return;
        }
        let snapshot = self.coordinator.snapshot();
        let labels = snapshot.format_labels.clone();
        let selected = snapshot.selected_format_index;

        let mut open = true;
        let mut picked = None;
        let mut dismissed = false;
        let mut refresh = false;
        egui::Window::new("Select Format")
            .open(&mut open)
            .collapsible(false)
            .resizable(false)
            .show(ctx, |ui| {
                if labels.is_empty() {
                    ui.label("The camera reported no formats.");
                }
                egui::ScrollArea::vertical().max_height(300.0).show(ui, |ui| {
                    for (index, label) in labels.iter().enumerate() {
                        ui.horizontal(|ui| {
                            if ui.selectable_label(index == selected, label.as_str()).clicked() {
                                picked = Some(index);
                            }
                            if index == selected {
                                ui.label("✔");
                            }
                        });
                    }
                });
                ui.separator();
                ui.horizontal(|ui| {
                    if ui.button("Refresh").clicked() {
                        refresh = true;
                    }
                    if ui.button("Cancel").clicked() {
                        dismissed = true;
                    }
                });
            });

        if refresh {
            if let Err(err) = self.coordinator.refresh_formats() {
                debug!("Format refresh failed: {}", err);
            }
        }
        if let Some(index) = picked {
            dispatch("select format", self.coordinator.select_format(index));
        }
        self.show_format_picker = open && picked.is_none() && !dismissed;
    }

    fn diagnostics_window(&mut self, ctx: &egui::Context) {
        let Some(lines) = &self.diagnostics else {
            return;
        };
        let mut open = true;
        egui::Window::new("Camera Diagnostics")
            .open(&mut open)
            .show(ctx, |ui| {
                for line in lines {
                    ui.monospace(line.as_str());
                }
            });
        if !open {
            self.diagnostics = None;
        }
    }
}

/// Coordinator operations log their own failures; the shell only traces them.
fn dispatch(action: &str, result: SessionResult<()>) {
    if let Err(err) = result {
        debug!("{} failed: {}", action, err);
    }
}

impl eframe::App for CameraPreviewUI {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.update_fps_counter();
        self.coordinator.pump_events();
        self.update_preview_texture(ctx);

        // --- Top Panel (Menu Bar) ---
        egui::TopBottomPanel::top("top_panel").show(ctx, |ui| {
            egui::menu::bar(ui, |ui| {
                ui.menu_button("File", |ui| {
                    if ui.button("Quit").clicked() {
                        ctx.send_viewport_cmd(egui::ViewportCommand::Close);
                    }
                });
                ui.add_space(16.0);
                egui::widgets::global_theme_preference_buttons(ui);
            });
        });

        // --- Bottom Panel (Status) ---
        egui::TopBottomPanel::bottom("bottom_panel")
            .resizable(false)
            .show(ctx, |ui| {
                let snapshot = self.coordinator.snapshot();
                ui.with_layout(Layout::right_to_left(Align::Center), |ui| {
                    ui.label(format!("UI FPS: {:.1}", self.last_calculated_fps));
                    ui.add_space(10.0);
                    match self.texture_size {
                        Some(size) => ui.label(format!("Cam Res: {}x{}", size.x, size.y)),
                        None => ui.label("Cam Res: ..."),
                    };
                    ui.add_space(10.0);
                    ui.label(format!("Session: {}", snapshot.session_state));
                    if let Some(preset) = self.coordinator.active_preset() {
                        ui.add_space(10.0);
                        ui.label(format!("Preset: {}", preset));
                    }
                });
            });

        // --- Controls ---
        egui::TopBottomPanel::bottom("controls_panel")
            .resizable(false)
            .show(ctx, |ui| {
                ui.add_space(4.0);
                self.control_rows(ui);
                ui.add_space(4.0);
            });

        // --- Central Panel (Preview) ---
        egui::CentralPanel::default().show(ctx, |ui| {
            let snapshot = self.coordinator.snapshot();
            match &snapshot.device {
                Some(device) => ui.heading(format!("Camera: {}", device.name)),
                None => ui.heading("Camera Preview"),
            };
            ui.separator();

            if let Some(err) = &snapshot.last_error {
                ui.colored_label(Color32::RED, format!("Error: {}", err));
            }

            self.preview_panel(ui);
        });

        self.format_picker(ctx);
        self.diagnostics_window(ctx);
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        info!("Exit requested. Stopping capture session...");
        dispatch("stop session", self.coordinator.stop_session());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(session_state: SessionState, is_recording: bool) -> SessionSnapshot {
        SessionSnapshot {
            session_state,
            is_recording,
            ..SessionSnapshot::default()
        }
    }

    #[test]
    fn test_stopped_session_only_offers_start() {
        let controls = ControlAvailability::for_snapshot(&snapshot(SessionState::Stopped, false));
        assert!(controls.start);
        assert!(!controls.stop);
        assert!(!controls.reconfigure);
        assert!(!controls.start_recording);
        assert!(!controls.stop_recording);
    }

    #[test]
    fn test_recording_controls_require_running_session() {
        let starting = ControlAvailability::for_snapshot(&snapshot(SessionState::Starting, true));
        assert!(starting.stop);
        assert!(!starting.stop_recording);
        assert!(!starting.reconfigure);

        let running = ControlAvailability::for_snapshot(&snapshot(SessionState::Running, true));
        assert!(running.stop_recording);
        assert!(!running.start_recording);
        assert!(running.reconfigure);
    }
}
