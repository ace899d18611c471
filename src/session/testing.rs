// src/session/testing.rs
//! Scripted backend used by the coordinator tests.

use std::sync::Arc;

use parking_lot::Mutex;

use super::{
    backend::{
        AccessCallback, CameraBackend, CaptureDevice, CaptureSession, DeviceInput,
        SharedDeviceSettings, StartCompletion,
    },
    error::BackendError,
    types::{
        Authorization, DeviceInfo, DeviceKind, DiscoveryQuery, MediaKind, QualityPreset,
        ReportedFormat,
    },
};
use crate::preview::PreviewSink;

#[derive(Debug, Default)]
pub struct BackendLog {
    pub access_requests: usize,
    pub sessions_created: usize,
    pub starts: usize,
    pub stops: usize,
    pub locks: usize,
    pub unlocks: usize,
    pub commits: usize,
    pub presets: Vec<QualityPreset>,
}

#[derive(Debug, Clone)]
pub enum StartScript {
    Succeed,
    Fail(String),
    /// Keep the completion in `held` until the test fires it.
    Hold,
}

pub fn wide_angle_device(id: &str, name: &str) -> DeviceInfo {
    DeviceInfo {
        id: id.to_string(),
        name: name.to_string(),
        model_id: format!("model-{}", id),
        kind: DeviceKind::WideAngle,
        media: MediaKind::Video,
    }
}

pub struct ScriptedBackend {
    pub authorization: Authorization,
    pub grant_access: bool,
    pub default_device: Option<DeviceInfo>,
    pub discoverable: Vec<DeviceInfo>,
    pub formats: Arc<Mutex<Vec<ReportedFormat>>>,
    pub start: StartScript,
    pub lock_fails: bool,
    pub log: Arc<Mutex<BackendLog>>,
    pub held: Arc<Mutex<Vec<StartCompletion>>>,
    pub settings: SharedDeviceSettings,
}

impl ScriptedBackend {
    pub fn with_formats(formats: &[(u32, u32)]) -> Self {
        Self {
            authorization: Authorization::Authorized,
            grant_access: true,
            default_device: Some(wide_angle_device("0", "Scripted Camera")),
            discoverable: Vec::new(),
            formats: Arc::new(Mutex::new(
                formats
                    .iter()
                    .map(|&(w, h)| ReportedFormat::new(w, h, 30))
                    .collect(),
            )),
            start: StartScript::Succeed,
            lock_fails: false,
            log: Arc::default(),
            held: Arc::default(),
            settings: Arc::default(),
        }
    }

    pub fn without_devices() -> Self {
        let mut backend = Self::with_formats(&[]);
        backend.default_device = None;
        backend
    }
}

impl CameraBackend for ScriptedBackend {
    fn authorization(&self) -> Authorization {
        self.authorization
    }

    fn request_access(&self, on_complete: AccessCallback) {
        self.log.lock().access_requests += 1;
        on_complete(self.grant_access);
    }

    fn default_device(&self) -> Option<DeviceInfo> {
        self.default_device.clone()
    }

    fn discover_devices(&self, query: &DiscoveryQuery) -> Vec<DeviceInfo> {
        self.discoverable
            .iter()
            .filter(|device| query.matches(device))
            .cloned()
            .collect()
    }

    fn all_devices(&self) -> Vec<DeviceInfo> {
        self.default_device
            .iter()
            .chain(self.discoverable.iter())
            .cloned()
            .collect()
    }

    fn open_device(&self, device: &DeviceInfo) -> Result<Box<dyn CaptureDevice>, BackendError> {
        Ok(Box::new(ScriptedDevice {
            info: device.clone(),
            formats: self.formats.clone(),
            lock_fails: self.lock_fails,
            locked: false,
            log: self.log.clone(),
            settings: self.settings.clone(),
        }))
    }

    fn create_session(&self) -> Box<dyn CaptureSession> {
        self.log.lock().sessions_created += 1;
        Box::new(ScriptedSession {
            preset: QualityPreset::Low,
            formats: Vec::new(),
            start: self.start.clone(),
            log: self.log.clone(),
            held: self.held.clone(),
        })
    }
}

struct ScriptedDevice {
    info: DeviceInfo,
    formats: Arc<Mutex<Vec<ReportedFormat>>>,
    lock_fails: bool,
    locked: bool,
    log: Arc<Mutex<BackendLog>>,
    settings: SharedDeviceSettings,
}

impl CaptureDevice for ScriptedDevice {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn formats(&mut self) -> Result<Vec<ReportedFormat>, BackendError> {
        Ok(self.formats.lock().clone())
    }

    fn lock_for_configuration(&mut self) -> Result<(), BackendError> {
        if self.lock_fails || self.locked {
            return Err(BackendError::Busy);
        }
        self.locked = true;
        self.log.lock().locks += 1;
        Ok(())
    }

    fn unlock_for_configuration(&mut self) {
        self.locked = false;
        self.log.lock().unlocks += 1;
    }

    fn supports_exposure_lock(&self) -> bool {
        true
    }

    fn supports_white_balance_lock(&self) -> bool {
        true
    }

    fn settings(&self) -> SharedDeviceSettings {
        self.settings.clone()
    }
}

struct ScriptedSession {
    preset: QualityPreset,
    // Formats of the attached input; presets above them are refused.
    formats: Vec<ReportedFormat>,
    start: StartScript,
    log: Arc<Mutex<BackendLog>>,
    held: Arc<Mutex<Vec<StartCompletion>>>,
}

impl CaptureSession for ScriptedSession {
    fn begin_configuration(&mut self) {}

    fn commit_configuration(&mut self) {
        self.log.lock().commits += 1;
    }

    fn can_set_preset(&self, preset: QualityPreset) -> bool {
        let (width, height) = preset.target_resolution();
        preset == QualityPreset::Low
            || self
                .formats
                .iter()
                .any(|format| format.width >= width && format.height >= height)
    }

    fn set_preset(&mut self, preset: QualityPreset) {
        self.preset = preset;
        self.log.lock().presets.push(preset);
    }

    fn preset(&self) -> QualityPreset {
        self.preset
    }

    fn add_input(&mut self, input: DeviceInput) -> Result<(), BackendError> {
        self.formats = input.formats;
        Ok(())
    }

    fn add_output(&mut self, _sink: PreviewSink) -> Result<(), BackendError> {
        Ok(())
    }

    fn start(&mut self, done: StartCompletion) {
        self.log.lock().starts += 1;
        match &self.start {
            StartScript::Succeed => done(Ok(())),
            StartScript::Fail(reason) => done(Err(BackendError::Camera(reason.clone()))),
            StartScript::Hold => self.held.lock().push(done),
        }
    }

    fn stop(&mut self) {
        self.log.lock().stops += 1;
    }
}
