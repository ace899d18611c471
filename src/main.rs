// src/main.rs
#![warn(clippy::all, rust_2018_idioms)]
#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

use std::sync::Arc;

use cam_preview::{
    camera::NokhwaBackend, config::CoordinatorConfig, session::SessionCoordinator,
    CameraPreviewUI,
};

fn main() -> eframe::Result {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("Starting cam_preview");

    let config = CoordinatorConfig::from_env();
    let backend = NokhwaBackend::new(config.frame_rate);

    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([800.0, 600.0])
            .with_min_inner_size([300.0, 200.0]),
        ..Default::default()
    };

    eframe::run_native(
        "Camera Preview",
        native_options,
        Box::new(|cc| {
            // Background threads wake the UI the same way frames do.
            let ctx = cc.egui_ctx.clone();
            let coordinator = SessionCoordinator::new(Box::new(backend), config)
                .with_repaint_hook(Arc::new(move || ctx.request_repaint()));
            Ok(Box::new(CameraPreviewUI::new(cc, coordinator)))
        }),
    )
}
