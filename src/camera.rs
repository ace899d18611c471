// src/camera.rs
//! nokhwa-backed camera platform: access, discovery, format probing, and the
//! capture worker thread that feeds the preview surface.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use anyhow::Context;
use log::{debug, error, info, warn};
use nokhwa::{
    nokhwa_check, nokhwa_initialize,
    pixel_format::RgbFormat,
    query,
    utils::{
        ApiBackend, CameraFormat, CameraIndex, CameraInfo, FrameFormat, KnownCameraControl,
        RequestedFormat, RequestedFormatType, Resolution,
    },
    Camera, NokhwaError,
};
use parking_lot::Mutex;

use crate::{
    preview::{PreviewSink, SubmitOutcome},
    session::{
        backend::{
            AccessCallback, CameraBackend, CaptureDevice, CaptureSession, DeviceInput,
            DeviceSettings, SharedDeviceSettings, StartCompletion,
        },
        error::BackendError,
        types::{
            Authorization, DeviceInfo, DeviceKind, DiscoveryQuery, MediaKind, QualityPreset,
            ReportedFormat,
        },
    },
};

// --- Constants ---
const TIMEOUT_BACKOFF: Duration = Duration::from_millis(100);
const DECODE_BACKOFF: Duration = Duration::from_millis(50);
const CAPTURE_ERROR_BACKOFF: Duration = Duration::from_secs(1);

pub struct NokhwaBackend {
    frame_rate: u32,
}

impl NokhwaBackend {
    pub fn new(frame_rate: u32) -> Self {
        Self { frame_rate }
    }
}

impl CameraBackend for NokhwaBackend {
    fn authorization(&self) -> Authorization {
        // nokhwa cannot tell "denied" from "not asked yet".
        if nokhwa_check() {
            Authorization::Authorized
        } else {
            Authorization::NotDetermined
        }
    }

    fn request_access(&self, on_complete: AccessCallback) {
        let callback = Mutex::new(Some(on_complete));
        nokhwa_initialize(move |granted| {
            info!("Camera access request resolved: granted={}", granted);
            if let Some(callback) = callback.lock().take() {
                callback(granted);
            }
        });
    }

    fn default_device(&self) -> Option<DeviceInfo> {
        query_devices().into_iter().next()
    }

    fn discover_devices(&self, query: &DiscoveryQuery) -> Vec<DeviceInfo> {
        query_devices()
            .into_iter()
            .filter(|device| query.matches(device))
            .collect()
    }

    fn all_devices(&self) -> Vec<DeviceInfo> {
        query_devices()
    }

    fn open_device(&self, device: &DeviceInfo) -> Result<Box<dyn CaptureDevice>, BackendError> {
        Ok(Box::new(NokhwaDevice::open(device)?))
    }

    fn create_session(&self) -> Box<dyn CaptureSession> {
        Box::new(NokhwaSession::new(self.frame_rate))
    }
}

fn query_devices() -> Vec<DeviceInfo> {
    match query(ApiBackend::Auto) {
        Ok(cameras) => cameras.iter().map(device_info).collect(),
        Err(err) => {
            warn!("Failed to enumerate cameras: {}", err);
            Vec::new()
        }
    }
}

fn device_info(info: &CameraInfo) -> DeviceInfo {
    let id = match info.index() {
        CameraIndex::Index(i) => i.to_string(),
        CameraIndex::String(s) => s.clone(),
    };
    let name = info.human_name();
    DeviceInfo {
        id,
        kind: classify(&name),
        model_id: info.misc(),
        name,
        media: MediaKind::Video,
    }
}

/// nokhwa does not report lens types, so infer them from the device name.
fn classify(name: &str) -> DeviceKind {
    let name = name.to_lowercase();
    if name.contains("ultra wide") || name.contains("ultrawide") {
        DeviceKind::UltraWide
    } else if name.contains("telephoto") {
        DeviceKind::Telephoto
    } else if ["facetime", "built-in", "integrated", "front camera", "back camera"]
        .iter()
        .any(|marker| name.contains(marker))
    {
        DeviceKind::WideAngle
    } else {
        DeviceKind::External
    }
}

fn camera_index(id: &str) -> CameraIndex {
    id.parse::<u32>()
        .map(CameraIndex::Index)
        .unwrap_or_else(|_| CameraIndex::String(id.to_string()))
}

fn camera_error(err: NokhwaError) -> BackendError {
    BackendError::Camera(err.to_string())
}

fn open_camera(
    index: CameraIndex,
    requested: RequestedFormat<'static>,
) -> Result<Camera, NokhwaError> {
    Camera::new(index.clone(), requested).or_else(|err| {
        warn!("Default backend failed: {}. Trying AVFoundation explicitly...", err);
        Camera::with_backend(index, requested, ApiBackend::AVFoundation)
    })
}

struct Probe {
    formats: Vec<ReportedFormat>,
    exposure: bool,
    white_balance: bool,
}

fn probe(index: &CameraIndex) -> Result<Probe, BackendError> {
    let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::None);
    let mut camera = open_camera(index.clone(), requested).map_err(camera_error)?;

    let mut formats: Vec<ReportedFormat> = Vec::new();
    for format in camera.compatible_camera_formats().map_err(camera_error)? {
        let reported = ReportedFormat::new(format.width(), format.height(), format.frame_rate());
        // The same size is usually offered once per pixel encoding.
        if !formats.contains(&reported) {
            formats.push(reported);
        }
    }

    let controls = camera.supported_camera_controls().unwrap_or_else(|err| {
        warn!("Could not query camera controls: {}", err);
        Vec::new()
    });
    debug!("Camera {} controls: {:?}", index, controls);
    Ok(Probe {
        formats,
        exposure: controls.contains(&KnownCameraControl::Exposure),
        white_balance: controls.contains(&KnownCameraControl::WhiteBalance),
    })
}

pub struct NokhwaDevice {
    info: DeviceInfo,
    index: CameraIndex,
    formats: Vec<ReportedFormat>,
    // The formats probed in `open` have not been handed out yet.
    fresh: bool,
    exposure: bool,
    white_balance: bool,
    locked: bool,
    settings: SharedDeviceSettings,
}

impl NokhwaDevice {
    fn open(info: &DeviceInfo) -> Result<Self, BackendError> {
        let index = camera_index(&info.id);
        let probe = probe(&index)?;
        info!(
            "Opened {}: {} formats, exposure lock={}, white balance lock={}",
            info.name,
            probe.formats.len(),
            probe.exposure,
            probe.white_balance
        );
        Ok(Self {
            info: info.clone(),
            index,
            formats: probe.formats,
            fresh: true,
            exposure: probe.exposure,
            white_balance: probe.white_balance,
            locked: false,
            settings: Arc::new(Mutex::new(DeviceSettings::default())),
        })
    }
}

impl CaptureDevice for NokhwaDevice {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn formats(&mut self) -> Result<Vec<ReportedFormat>, BackendError> {
        if self.fresh {
            self.fresh = false;
            return Ok(self.formats.clone());
        }
        match probe(&self.index) {
            Ok(probe) => {
                self.formats = probe.formats;
                Ok(self.formats.clone())
            }
            // A running stream may hold the device exclusively.
            Err(err) if !self.formats.is_empty() => {
                warn!("Re-probing {} failed ({}); using cached formats.", self.info.name, err);
                Ok(self.formats.clone())
            }
            Err(err) => Err(err),
        }
    }

    fn lock_for_configuration(&mut self) -> Result<(), BackendError> {
        if self.locked {
            return Err(BackendError::Busy);
        }
        self.locked = true;
        Ok(())
    }

    fn unlock_for_configuration(&mut self) {
        self.locked = false;
    }

    fn supports_exposure_lock(&self) -> bool {
        self.exposure
    }

    fn supports_white_balance_lock(&self) -> bool {
        self.white_balance
    }

    fn settings(&self) -> SharedDeviceSettings {
        self.settings.clone()
    }
}

struct CaptureWorker {
    handle: JoinHandle<()>,
    stop_signal: Arc<AtomicBool>,
}

pub struct NokhwaSession {
    frame_rate: u32,
    preset: QualityPreset,
    configuring: bool,
    input: Option<DeviceInput>,
    output: Option<PreviewSink>,
    worker: Option<CaptureWorker>,
}

impl NokhwaSession {
    fn new(frame_rate: u32) -> Self {
        Self {
            frame_rate,
            // Raised during setup once the input shows what it supports.
            preset: QualityPreset::Low,
            configuring: false,
            input: None,
            output: None,
            worker: None,
        }
    }
}

impl CaptureSession for NokhwaSession {
    fn begin_configuration(&mut self) {
        self.configuring = true;
    }

    fn commit_configuration(&mut self) {
        if self.configuring {
            debug!("Session configuration committed ({} preset).", self.preset);
        }
        self.configuring = false;
    }

    fn can_set_preset(&self, preset: QualityPreset) -> bool {
        if preset == QualityPreset::Low {
            return true;
        }
        let (width, height) = preset.target_resolution();
        self.input.as_ref().is_some_and(|input| {
            input
                .formats
                .iter()
                .any(|format| format.width >= width && format.height >= height)
        })
    }

    fn set_preset(&mut self, preset: QualityPreset) {
        if !self.configuring {
            warn!("Preset changed outside a configuration transaction.");
        }
        self.preset = preset;
    }

    fn preset(&self) -> QualityPreset {
        self.preset
    }

    fn add_input(&mut self, input: DeviceInput) -> Result<(), BackendError> {
        info!("Session input: {} [{}]", input.device.name, input.device.id);
        self.input = Some(input);
        Ok(())
    }

    fn add_output(&mut self, sink: PreviewSink) -> Result<(), BackendError> {
        self.output = Some(sink);
        Ok(())
    }

    fn start(&mut self, done: StartCompletion) {
        if self.worker.is_some() {
            self.stop();
        }
        let Some(input) = &self.input else {
            done(Err(BackendError::Camera("session has no input".to_string())));
            return;
        };

        let request = CaptureRequest {
            index: camera_index(&input.device.id),
            settings: input.settings.lock().clone(),
            preset: self.preset,
            frame_rate: self.frame_rate,
        };
        let sink = self.output.clone();
        let stop_signal = Arc::new(AtomicBool::new(false));
        let worker_stop = stop_signal.clone();

        info!("Spawning camera capture thread.");
        let handle = thread::spawn(move || {
            capture_loop(request, sink, worker_stop, done);
        });
        self.worker = Some(CaptureWorker {
            handle,
            stop_signal,
        });
    }

    fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.stop_signal.store(true, Ordering::Relaxed);
            if let Err(e) = worker.handle.join() {
                error!("Error joining camera thread: {:?}", e);
            } else {
                info!("Camera thread joined successfully.");
            }
        }
    }
}

impl Drop for NokhwaSession {
    fn drop(&mut self) {
        self.stop();
    }
}

struct CaptureRequest {
    index: CameraIndex,
    settings: DeviceSettings,
    preset: QualityPreset,
    frame_rate: u32,
}

impl CaptureRequest {
    /// A pinned device format wins over the session preset.
    fn target(&self) -> (u32, u32, u32) {
        match self.settings.active_format {
            Some(format) => (format.width, format.height, format.frame_rate),
            None => {
                let (width, height) = self.preset.target_resolution();
                (width, height, self.frame_rate)
            }
        }
    }

    fn requested_format(&self) -> RequestedFormat<'static> {
        let (width, height, frame_rate) = self.target();
        let target = CameraFormat::new(
            Resolution::new(width, height),
            FrameFormat::MJPEG,
            frame_rate,
        );
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(target))
    }
}

fn open_stream(request: &CaptureRequest) -> anyhow::Result<Camera> {
    let requested = request.requested_format();
    info!("Requested camera format: {:?}", requested);
    let mut camera = open_camera(request.index.clone(), requested)
        .with_context(|| format!("failed to open camera {}", request.index))?;
    info!("Actual camera format received: {:?}", camera.camera_format());

    if request.settings.exposure_locked {
        pin_control(&mut camera, KnownCameraControl::Exposure);
    }
    if request.settings.white_balance_locked {
        pin_control(&mut camera, KnownCameraControl::WhiteBalance);
    }

    camera
        .open_stream()
        .context("failed to open camera stream")?;
    Ok(camera)
}

/// Holds a control at its current value so the camera stops adjusting it.
fn pin_control(camera: &mut Camera, control: KnownCameraControl) {
    let current = match camera.camera_control(control) {
        Ok(current) => current,
        Err(err) => {
            warn!("Could not read {:?}: {}", control, err);
            return;
        }
    };
    match camera.set_camera_control(control, current.value()) {
        Ok(()) => info!("{:?} locked.", control),
        Err(err) => warn!("Could not lock {:?}: {}", control, err),
    }
}

fn capture_loop(
    request: CaptureRequest,
    sink: Option<PreviewSink>,
    stop_signal: Arc<AtomicBool>,
    done: StartCompletion,
) {
    let mut camera = match open_stream(&request) {
        Ok(camera) => camera,
        Err(err) => {
            error!("Camera failed to start: {:#}", err);
            done(Err(BackendError::Camera(format!("{:#}", err))));
            return;
        }
    };
    info!("Camera stream opened successfully.");
    done(Ok(()));

    // --- Frame Capture Loop ---
    while !stop_signal.load(Ordering::Relaxed) {
        match camera.frame() {
            Ok(frame) => match frame.decode_image::<RgbFormat>() {
                Ok(decoded_rgb_image) => {
                    let Some(sink) = &sink else { continue };
                    if sink.submit(Arc::new(decoded_rgb_image)) == SubmitOutcome::Disconnected {
                        info!("Preview surface dropped. Stopping camera loop.");
                        break;
                    }
                }
                Err(err) => {
                    warn!("Failed to decode frame to RGB: {}", err);
                    thread::sleep(DECODE_BACKOFF);
                }
            },
            Err(NokhwaError::ReadFrameError(msg)) if msg.contains("Timeout") => {
                warn!("Camera frame read timeout.");
                thread::sleep(TIMEOUT_BACKOFF);
            }
            Err(err) => {
                error!("Failed to capture frame: {}", err);
                thread::sleep(CAPTURE_ERROR_BACKOFF);
            }
        }
    }

    // --- Cleanup ---
    info!("Camera capture loop stopping.");
    if let Err(e) = camera.stop_stream() {
        error!("Failed to stop camera stream cleanly: {}", e);
    }
    info!("Camera capture loop finished.");
}
