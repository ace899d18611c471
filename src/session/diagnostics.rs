// src/session/diagnostics.rs
use std::fmt;

use super::types::{Authorization, DeviceInfo, QualityPreset, SessionState};

/// Point-in-time dump behind "Diagnose Camera Access".
#[derive(Debug, Clone)]
pub struct DiagnosticReport {
    pub authorization: Authorization,
    pub default_device: Option<DeviceInfo>,
    pub devices: Vec<DeviceInfo>,
    pub current_device: Option<DeviceInfo>,
    pub formats: Vec<String>,
    pub session_state: SessionState,
    pub preset: Option<QualityPreset>,
    pub frames_received: u64,
    pub frames_dropped: u64,
}

impl DiagnosticReport {
    pub fn lines(&self) -> Vec<String> {
        let mut lines = vec![format!("Authorization: {}", self.authorization)];
        match &self.default_device {
            Some(device) => lines.push(format!("Default device: {} [{}]", device.name, device.id)),
            None => lines.push("Default device: none".to_string()),
        }
        lines.push(format!("Devices found: {}", self.devices.len()));
        for device in &self.devices {
            lines.push(format!(
                "  [{}] {} ({:?}, model {})",
                device.id, device.name, device.kind, device.model_id
            ));
        }
        match &self.current_device {
            Some(device) => lines.push(format!("Session device: {}", device.name)),
            None => lines.push("Session device: not configured".to_string()),
        }
        lines.push(format!("Formats: {}", self.formats.len()));
        lines.extend(self.formats.iter().map(|label| format!("  {}", label)));
        lines.push(format!("Session state: {}", self.session_state));
        if let Some(preset) = self.preset {
            lines.push(format!("Session preset: {}", preset));
        }
        lines.push(format!(
            "Preview frames: {} received, {} dropped",
            self.frames_received, self.frames_dropped
        ));
        lines
    }
}

impl fmt::Display for DiagnosticReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.lines().join("\n"))
    }
}
