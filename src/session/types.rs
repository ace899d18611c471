// src/session/types.rs
use std::fmt;

use crate::config::PresetThresholds;

/// Camera authorization as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authorization {
    NotDetermined,
    Authorized,
    Denied,
    Restricted,
}

impl fmt::Display for Authorization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::NotDetermined => "not determined",
            Self::Authorized => "authorized",
            Self::Denied => "denied",
            Self::Restricted => "restricted",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    WideAngle,
    UltraWide,
    Telephoto,
    External,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Platform camera index, in string form.
    pub id: String,
    pub name: String,
    pub model_id: String,
    pub kind: DeviceKind,
    pub media: MediaKind,
}

/// Capability-filtered device lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryQuery {
    pub kinds: Vec<DeviceKind>,
    pub media: MediaKind,
}

impl DiscoveryQuery {
    pub fn wide_angle_video() -> Self {
        Self {
            kinds: vec![DeviceKind::WideAngle],
            media: MediaKind::Video,
        }
    }

    pub fn matches(&self, device: &DeviceInfo) -> bool {
        device.media == self.media && self.kinds.contains(&device.kind)
    }
}

/// A capture format exactly as the backend reported it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReportedFormat {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
}

impl ReportedFormat {
    pub fn new(width: u32, height: u32, frame_rate: u32) -> Self {
        Self {
            width,
            height,
            frame_rate,
        }
    }

    pub fn pixel_count(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Stopped,
    Starting,
    Running,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
        };
        f.write_str(label)
    }
}

/// Coarse session-wide quality tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityPreset {
    High,
    Medium,
    Low,
}

impl QualityPreset {
    /// Highest first.
    pub const DESCENDING: [QualityPreset; 3] = [Self::High, Self::Medium, Self::Low];

    /// Three-tier mapping from a format's width to a preset.
    pub fn for_width(width: u32, thresholds: &PresetThresholds) -> Self {
        if width >= thresholds.high_min_width {
            Self::High
        } else if width >= thresholds.medium_min_width {
            Self::Medium
        } else {
            Self::Low
        }
    }

    /// Resolution the backend aims for when this preset governs the session.
    pub fn target_resolution(&self) -> (u32, u32) {
        match self {
            Self::High => (1920, 1080),
            Self::Medium => (1280, 720),
            Self::Low => (640, 480),
        }
    }
}

impl fmt::Display for QualityPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        };
        f.write_str(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_tiers_follow_width_thresholds() {
        let thresholds = PresetThresholds::default();
        assert_eq!(QualityPreset::for_width(3840, &thresholds), QualityPreset::High);
        assert_eq!(QualityPreset::for_width(1920, &thresholds), QualityPreset::High);
        assert_eq!(QualityPreset::for_width(1919, &thresholds), QualityPreset::Medium);
        assert_eq!(QualityPreset::for_width(1280, &thresholds), QualityPreset::Medium);
        assert_eq!(QualityPreset::for_width(640, &thresholds), QualityPreset::Low);
    }

    #[test]
    fn test_wide_angle_query_skips_other_lenses() {
        let query = DiscoveryQuery::wide_angle_video();
        let mut device = DeviceInfo {
            id: "0".to_string(),
            name: "FaceTime HD Camera".to_string(),
            model_id: "built-in".to_string(),
            kind: DeviceKind::WideAngle,
            media: MediaKind::Video,
        };
        assert!(query.matches(&device));

        device.kind = DeviceKind::External;
        assert!(!query.matches(&device));
    }
}
