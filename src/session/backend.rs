// src/session/backend.rs
//! Seam between the coordinator and the platform camera framework.
//!
//! The nokhwa implementation lives in `crate::camera`; tests drive the
//! coordinator through a scripted implementation.

use std::sync::Arc;

use log::{debug, warn};
use parking_lot::Mutex;

use super::{
    error::BackendError,
    types::{Authorization, DeviceInfo, DiscoveryQuery, QualityPreset, ReportedFormat},
};
use crate::preview::PreviewSink;

/// Invoked once, from any thread, when an access request resolves.
pub type AccessCallback = Box<dyn FnOnce(bool) + Send + 'static>;

/// Invoked once, from any thread, when a session start attempt finishes.
pub type StartCompletion = Box<dyn FnOnce(Result<(), BackendError>) + Send + 'static>;

/// Device parameters written under a configuration lock and read by the
/// session when it starts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceSettings {
    pub active_format: Option<ReportedFormat>,
    pub exposure_locked: bool,
    pub white_balance_locked: bool,
}

pub type SharedDeviceSettings = Arc<Mutex<DeviceSettings>>;

/// Input leg: what a session needs to pull frames from a device.
#[derive(Debug, Clone)]
pub struct DeviceInput {
    pub device: DeviceInfo,
    pub formats: Vec<ReportedFormat>,
    pub settings: SharedDeviceSettings,
}

pub trait CameraBackend {
    fn authorization(&self) -> Authorization;

    /// Asks the platform for camera access. Must not block the caller.
    fn request_access(&self, on_complete: AccessCallback);

    fn default_device(&self) -> Option<DeviceInfo>;

    fn discover_devices(&self, query: &DiscoveryQuery) -> Vec<DeviceInfo>;

    /// Every camera the platform knows about, for diagnostics.
    fn all_devices(&self) -> Vec<DeviceInfo>;

    fn open_device(&self, device: &DeviceInfo) -> Result<Box<dyn CaptureDevice>, BackendError>;

    fn create_session(&self) -> Box<dyn CaptureSession>;
}

pub trait CaptureDevice {
    fn info(&self) -> &DeviceInfo;

    fn formats(&mut self) -> Result<Vec<ReportedFormat>, BackendError>;

    fn lock_for_configuration(&mut self) -> Result<(), BackendError>;

    fn unlock_for_configuration(&mut self);

    fn supports_exposure_lock(&self) -> bool;

    fn supports_white_balance_lock(&self) -> bool;

    fn settings(&self) -> SharedDeviceSettings;
}

pub trait CaptureSession {
    fn begin_configuration(&mut self);

    fn commit_configuration(&mut self);

    fn can_set_preset(&self, preset: QualityPreset) -> bool;

    fn set_preset(&mut self, preset: QualityPreset);

    fn preset(&self) -> QualityPreset;

    fn add_input(&mut self, input: DeviceInput) -> Result<(), BackendError>;

    fn add_output(&mut self, sink: PreviewSink) -> Result<(), BackendError>;

    /// Starts the session off the caller's thread and reports through `done`.
    fn start(&mut self, done: StartCompletion);

    /// Blocks until the session has stopped.
    fn stop(&mut self);
}

/// Scoped configuration access. The device is unlocked when the guard drops.
pub struct ConfigurationGuard<'a> {
    device: &'a mut dyn CaptureDevice,
    settings: SharedDeviceSettings,
}

impl<'a> ConfigurationGuard<'a> {
    pub fn acquire(device: &'a mut dyn CaptureDevice) -> Result<Self, BackendError> {
        device.lock_for_configuration()?;
        let settings = device.settings();
        debug!("Locked {} for configuration", device.info().name);
        Ok(Self { device, settings })
    }

    pub fn set_active_format(&mut self, format: Option<ReportedFormat>) {
        self.settings.lock().active_format = format;
    }

    /// Pins exposure and white balance where the device allows it.
    pub fn lock_exposure_and_white_balance(&mut self) {
        let exposure = self.device.supports_exposure_lock();
        let white_balance = self.device.supports_white_balance_lock();
        if !exposure {
            warn!("{} does not support exposure lock", self.device.info().name);
        }
        if !white_balance {
            warn!("{} does not support white balance lock", self.device.info().name);
        }
        let mut settings = self.settings.lock();
        settings.exposure_locked |= exposure;
        settings.white_balance_locked |= white_balance;
    }
}

impl Drop for ConfigurationGuard<'_> {
    fn drop(&mut self) {
        self.device.unlock_for_configuration();
        debug!("Unlocked {}", self.device.info().name);
    }
}
