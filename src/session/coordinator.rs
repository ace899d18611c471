// src/session/coordinator.rs
//! Camera session lifecycle: permission, device setup, start/stop, and
//! format/preset selection.
//!
//! The coordinator is owned by the UI thread. Background results (access
//! grants, session start outcomes) arrive on an internal channel and are only
//! applied inside [`SessionCoordinator::pump_events`], so every state change
//! happens on the owning thread.

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, error, info, warn};

use super::{
    backend::{
        CameraBackend, CaptureDevice, CaptureSession, ConfigurationGuard, DeviceInput,
        DeviceSettings,
    },
    catalog::{FormatCatalog, FormatDescriptor, FormatId},
    diagnostics::DiagnosticReport,
    error::{BackendError, SessionError, SessionResult},
    state::{Observers, SessionSnapshot, StateChange},
    types::{Authorization, DiscoveryQuery, QualityPreset, SessionState},
};
use crate::{
    config::CoordinatorConfig,
    preview::{PreviewSurface, RepaintHook},
};

// --- Messages marshalled back onto the UI thread ---
enum CoordinatorEvent {
    AccessResolved(bool),
    StartFinished {
        ticket: u64,
        result: Result<(), BackendError>,
    },
}

pub struct SessionCoordinator {
    backend: Box<dyn CameraBackend>,
    config: CoordinatorConfig,

    device: Option<Box<dyn CaptureDevice>>,
    session: Option<Box<dyn CaptureSession>>,
    preview: Option<PreviewSurface>,
    catalog: FormatCatalog,

    snapshot: SessionSnapshot,
    observers: Observers,

    events_tx: Sender<CoordinatorEvent>,
    events_rx: Receiver<CoordinatorEvent>,
    // Called after anything lands on `events_rx` so the shell pumps it.
    repaint: Option<RepaintHook>,
    // Pairs a start request with its completion; bumped on every start.
    start_ticket: u64,
}

impl SessionCoordinator {
    pub fn new(backend: Box<dyn CameraBackend>, config: CoordinatorConfig) -> Self {
        let (events_tx, events_rx) = unbounded();
        Self {
            backend,
            config,
            device: None,
            session: None,
            preview: None,
            catalog: FormatCatalog::default(),
            snapshot: SessionSnapshot::default(),
            observers: Observers::default(),
            events_tx,
            events_rx,
            repaint: None,
            start_ticket: 0,
        }
    }

    /// Installs the shell's wake-up call. Must be set before setup so the
    /// preview surface picks it up too.
    pub fn with_repaint_hook(mut self, hook: RepaintHook) -> Self {
        self.repaint = Some(hook);
        self
    }

    pub fn snapshot(&self) -> &SessionSnapshot {
        &self.snapshot
    }

    pub fn subscribe(&mut self) -> Receiver<StateChange> {
        self.observers.subscribe()
    }

    pub fn formats(&self) -> &FormatCatalog {
        &self.catalog
    }

    pub fn preview_mut(&mut self) -> Option<&mut PreviewSurface> {
        self.preview.as_mut()
    }

    pub fn preview_available(&self) -> bool {
        self.preview.is_some()
    }

    pub fn active_preset(&self) -> Option<QualityPreset> {
        self.session.as_ref().map(|session| session.preset())
    }

    pub fn device_settings(&self) -> Option<DeviceSettings> {
        self.device
            .as_ref()
            .map(|device| device.settings().lock().clone())
    }

    /// Queries camera authorization and configures the session once access
    /// is (or becomes) available.
    pub fn check_permissions(&mut self) -> SessionResult<()> {
        let authorization = self.backend.authorization();
        self.set_authorization(authorization);
        match authorization {
            Authorization::Authorized => self.setup_capture_session(),
            Authorization::NotDetermined => {
                info!("Camera access not determined yet. Requesting access...");
                let tx = self.events_tx.clone();
                let repaint = self.repaint.clone();
                self.backend.request_access(Box::new(move |granted| {
                    let _ = tx.send(CoordinatorEvent::AccessResolved(granted));
                    wake(&repaint);
                }));
                Ok(())
            }
            Authorization::Denied | Authorization::Restricted => {
                warn!("Camera access {}. Capture session not configured.", authorization);
                Err(self.record_error(SessionError::PermissionDenied))
            }
        }
    }

    /// Applies results produced off the UI thread. Returns how many were handled.
    pub fn pump_events(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            handled += 1;
            match event {
                CoordinatorEvent::AccessResolved(true) => {
                    info!("Camera access granted.");
                    self.set_authorization(Authorization::Authorized);
                    if let Err(err) = self.setup_capture_session() {
                        debug!("Setup after access grant failed: {}", err);
                    }
                }
                CoordinatorEvent::AccessResolved(false) => {
                    warn!("Camera access request was declined.");
                    self.set_authorization(Authorization::Denied);
                    self.record_error(SessionError::PermissionDenied);
                }
                CoordinatorEvent::StartFinished { ticket, result } => {
                    self.finish_start(ticket, result);
                }
            }
        }
        handled
    }

    /// Finds a camera, enumerates its formats and wires input and preview
    /// output into a new capture session. Does nothing once configured.
    pub fn setup_capture_session(&mut self) -> SessionResult<()> {
        if self.device.is_some() {
            debug!("Capture session already configured.");
            return Ok(());
        }

        let info = match self.backend.default_device() {
            Some(device) => device,
            None => {
                debug!("No default camera. Querying wide-angle video devices...");
                let query = DiscoveryQuery::wide_angle_video();
                match self.backend.discover_devices(&query).into_iter().next() {
                    Some(device) => device,
                    None => {
                        error!("No camera device found. Capture session left unconfigured.");
                        return Err(self.record_error(SessionError::DeviceNotFound));
                    }
                }
            }
        };
        info!("Using camera: {} (model {})", info.name, info.model_id);

        let mut device = match self.backend.open_device(&info) {
            Ok(device) => device,
            Err(err) => {
                error!("Failed to open {}: {}", info.name, err);
                return Err(self.record_error(err.into()));
            }
        };

        let reported = match device.formats() {
            Ok(formats) => formats,
            Err(err) => {
                warn!("Could not enumerate formats for {}: {}", info.name, err);
                Vec::new()
            }
        };

        let mut preview = PreviewSurface::new(self.config.preview_queue_depth);
        if let Some(hook) = &self.repaint {
            preview = preview.with_repaint_hook(hook.clone());
        }
        let mut session = self.backend.create_session();
        session.begin_configuration();
        let input = DeviceInput {
            device: info.clone(),
            formats: reported.clone(),
            settings: device.settings(),
        };
        let attached = session
            .add_input(input)
            .and_then(|()| session.add_output(preview.sink()));
        if attached.is_ok() {
            // Preset support is only known once the input is attached.
            let preset = best_preset(session.as_ref());
            session.set_preset(preset);
            info!("Initial session preset: {}", preset);
        }
        session.commit_configuration();
        if let Err(err) = attached {
            error!("Failed to attach session legs for {}: {}", info.name, err);
            return Err(self.record_error(err.into()));
        }

        self.catalog.replace(&reported);
        for label in self.catalog.labels() {
            debug!("Format {}", label);
        }
        self.device = Some(device);
        self.session = Some(session);
        self.preview = Some(preview);
        self.snapshot.device = Some(info.clone());
        self.snapshot.format_labels = self.catalog.labels();
        self.snapshot.selected_format_index = 0;
        self.snapshot.selected_format = self.catalog.get(0).map(|format| format.id);
        self.snapshot.last_error = None;
        info!("Capture session configured with {} formats.", self.catalog.len());

        self.observers.publish(StateChange::DeviceConfigured(info));
        self.observers.publish(StateChange::FormatsEnumerated {
            count: self.catalog.len(),
        });
        Ok(())
    }

    /// Begins running the session. The outcome lands via `pump_events`.
    pub fn start_session(&mut self) -> SessionResult<()> {
        match self.snapshot.session_state {
            SessionState::Running => {
                debug!("Session already running.");
                return Ok(());
            }
            SessionState::Starting => {
                debug!("Session start already in flight.");
                return Ok(());
            }
            SessionState::Stopped => {}
        }
        if self.session.is_none() {
            warn!("Start requested before the capture session was configured.");
            return Err(SessionError::NotConfigured);
        }

        self.start_ticket += 1;
        let ticket = self.start_ticket;
        self.set_session_state(SessionState::Starting);

        let tx = self.events_tx.clone();
        let repaint = self.repaint.clone();
        if let Some(session) = self.session.as_mut() {
            info!("Starting capture session ({} preset)...", session.preset());
            session.start(Box::new(move |result| {
                let _ = tx.send(CoordinatorEvent::StartFinished { ticket, result });
                wake(&repaint);
            }));
        }
        Ok(())
    }

    /// Stops the session synchronously. Also abandons a pending start.
    pub fn stop_session(&mut self) -> SessionResult<()> {
        if self.snapshot.session_state == SessionState::Stopped {
            debug!("Session already stopped.");
            return Ok(());
        }
        self.halt_session();
        if self.snapshot.is_recording {
            self.set_recording(false);
        }
        Ok(())
    }

    /// Picks the largest-area format and the best preset the session accepts,
    /// pins exposure and white balance, then restarts the session.
    ///
    /// Chooses by resolution only; the device's field of view is not checked.
    pub fn attempt_ultra_wide_capture(&mut self) -> SessionResult<()> {
        let (Some(device), Some(session)) =
            (self.device.as_deref_mut(), self.session.as_deref_mut())
        else {
            warn!("Ultra-wide capture requested without a configured camera.");
            return Err(SessionError::DeviceNotFound);
        };

        let applied = apply_largest_format(device, session, &self.catalog);
        let (largest, preset) = match applied {
            Ok(choice) => choice,
            Err(err) => {
                error!("Could not lock camera for ultra-wide configuration: {}", err);
                let err = SessionError::ConfigurationLockFailed(err.to_string());
                return Err(self.record_error(err));
            }
        };
        match largest {
            Some(format) => info!(
                "Ultra-wide attempt: {}x{} with {} preset",
                format.width, format.height, preset
            ),
            None => info!("Ultra-wide attempt: no formats reported, {} preset only", preset),
        }
        self.restart_session()
    }

    /// Applies the preset tier matching the format at `index` and restarts
    /// the session.
    pub fn select_format(&mut self, index: usize) -> SessionResult<()> {
        let count = self.catalog.len();
        let Some(format) = self.catalog.get(index).copied() else {
            warn!("Ignoring format index {} ({} formats available).", index, count);
            return Err(SessionError::InvalidFormatIndex { index, count });
        };
        self.apply_format(format)
    }

    pub fn select_format_id(&mut self, id: FormatId) -> SessionResult<()> {
        let Some(format) = self.catalog.resolve(id).copied() else {
            warn!("Ignoring stale format id {:?}.", id);
            return Err(SessionError::StaleFormat);
        };
        self.apply_format(format)
    }

    /// Re-enumerates the device's formats. Ids from the previous enumeration
    /// stop resolving; the selection follows its format when still present.
    pub fn refresh_formats(&mut self) -> SessionResult<usize> {
        let Some(device) = self.device.as_deref_mut() else {
            return Err(SessionError::DeviceNotFound);
        };
        let reported = match device.formats() {
            Ok(formats) => formats,
            Err(err) => {
                warn!("Format refresh failed: {}", err);
                return Err(err.into());
            }
        };

        let previous = self.snapshot.selected_format;
        self.catalog.replace(&reported);
        let (index, id) = match previous.and_then(|id| self.catalog.rematch(id)) {
            Some(format) => (format.id.index(), Some(format.id)),
            None => {
                if previous.is_some() {
                    warn!("Selected format no longer offered. Selection reset to index 0.");
                }
                (0, self.catalog.get(0).map(|format| format.id))
            }
        };

        self.snapshot.format_labels = self.catalog.labels();
        self.snapshot.selected_format = id;
        self.observers.publish(StateChange::FormatsEnumerated {
            count: self.catalog.len(),
        });
        if index != self.snapshot.selected_format_index {
            self.snapshot.selected_format_index = index;
            self.observers.publish(StateChange::FormatSelected { index });
        }
        info!("Formats refreshed: {} available.", self.catalog.len());
        Ok(self.catalog.len())
    }

    pub fn start_recording(&mut self) {
        if self.snapshot.is_recording {
            return;
        }
        info!("Recording started (no encoder attached; preview only).");
        self.set_recording(true);
    }

    pub fn stop_recording(&mut self) {
        if !self.snapshot.is_recording {
            return;
        }
        info!("Recording stopped.");
        self.set_recording(false);
    }

    pub fn diagnose(&self) -> DiagnosticReport {
        let report = DiagnosticReport {
            authorization: self.backend.authorization(),
            default_device: self.backend.default_device(),
            devices: self.backend.all_devices(),
            current_device: self.snapshot.device.clone(),
            formats: self.catalog.labels(),
            session_state: self.snapshot.session_state,
            preset: self.active_preset(),
            frames_received: self.preview.as_ref().map_or(0, |p| p.frames_received()),
            frames_dropped: self.preview.as_ref().map_or(0, |p| p.frames_dropped()),
        };
        for line in report.lines() {
            info!("[diagnose] {}", line);
        }
        report
    }

    fn apply_format(&mut self, format: FormatDescriptor) -> SessionResult<()> {
        let (Some(device), Some(session)) =
            (self.device.as_deref_mut(), self.session.as_deref_mut())
        else {
            return Err(SessionError::NotConfigured);
        };

        let preset = QualityPreset::for_width(format.width, &self.config.thresholds);
        if let Err(err) = apply_preset(device, session, preset) {
            error!("Could not lock camera to select format {}: {}", format.label(), err);
            let err = SessionError::ConfigurationLockFailed(err.to_string());
            return Err(self.record_error(err));
        }
        info!("Selected format {} ({} preset).", format.label(), preset);

        let restarted = self.restart_session();
        let index = format.id.index();
        self.snapshot.selected_format_index = index;
        self.snapshot.selected_format = Some(format.id);
        self.observers.publish(StateChange::FormatSelected { index });
        restarted
    }

    fn finish_start(&mut self, ticket: u64, result: Result<(), BackendError>) {
        if ticket != self.start_ticket || self.snapshot.session_state != SessionState::Starting {
            debug!("Ignoring completion of abandoned start #{}.", ticket);
            return;
        }
        match result {
            Ok(()) => {
                info!("Capture session running.");
                self.set_session_state(SessionState::Running);
            }
            Err(err) => {
                error!("Capture session failed to start: {}", err);
                self.set_session_state(SessionState::Stopped);
                self.record_error(SessionError::StartFailed(err.to_string()));
            }
        }
    }

    fn halt_session(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.stop();
        }
        info!("Capture session stopped.");
        self.set_session_state(SessionState::Stopped);
    }

    fn restart_session(&mut self) -> SessionResult<()> {
        if self.snapshot.session_state != SessionState::Stopped {
            self.halt_session();
        }
        self.start_session()
    }

    fn set_session_state(&mut self, to: SessionState) {
        let from = self.snapshot.session_state;
        if from == to {
            return;
        }
        debug!("Session state {} -> {}", from, to);
        self.snapshot.session_state = to;
        self.observers.publish(StateChange::Session { from, to });
    }

    fn set_authorization(&mut self, authorization: Authorization) {
        if self.snapshot.authorization == authorization {
            return;
        }
        self.snapshot.authorization = authorization;
        self.observers.publish(StateChange::Authorization(authorization));
    }

    fn set_recording(&mut self, recording: bool) {
        self.snapshot.is_recording = recording;
        self.observers.publish(StateChange::Recording(recording));
    }

    fn record_error(&mut self, err: SessionError) -> SessionError {
        self.snapshot.last_error = Some(err.clone());
        self.observers.publish(StateChange::Error(err.clone()));
        err
    }
}

fn wake(repaint: &Option<RepaintHook>) {
    if let Some(repaint) = repaint {
        repaint();
    }
}

fn best_preset(session: &dyn CaptureSession) -> QualityPreset {
    QualityPreset::DESCENDING
        .into_iter()
        .find(|preset| session.can_set_preset(*preset))
        .unwrap_or(QualityPreset::Low)
}

fn apply_largest_format(
    device: &mut dyn CaptureDevice,
    session: &mut dyn CaptureSession,
    catalog: &FormatCatalog,
) -> Result<(Option<FormatDescriptor>, QualityPreset), BackendError> {
    let mut guard = ConfigurationGuard::acquire(device)?;
    let largest = catalog.largest().copied();

    session.begin_configuration();
    let preset = best_preset(session);
    session.set_preset(preset);
    session.commit_configuration();

    // Pinned after the preset so the preset does not override it.
    guard.set_active_format(largest.map(|format| format.reported()));
    guard.lock_exposure_and_white_balance();
    Ok((largest, preset))
}

fn apply_preset(
    device: &mut dyn CaptureDevice,
    session: &mut dyn CaptureSession,
    preset: QualityPreset,
) -> Result<(), BackendError> {
    let mut guard = ConfigurationGuard::acquire(device)?;
    session.begin_configuration();
    if session.can_set_preset(preset) {
        session.set_preset(preset);
    } else {
        warn!("Session cannot use the {} preset; keeping {}.", preset, session.preset());
    }
    session.commit_configuration();
    guard.set_active_format(None);
    Ok(())
}
