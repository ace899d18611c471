// src/lib.rs
#![warn(clippy::all, rust_2018_idioms)]

pub mod camera;
pub mod config;
pub mod preview;
pub mod session;
pub mod ui;

pub use ui::CameraPreviewUI;
