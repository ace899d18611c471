// src/config.rs
use std::{env, str::FromStr};

use log::{info, warn};

// --- Defaults ---
const HIGH_PRESET_MIN_WIDTH: u32 = 1920;
const MEDIUM_PRESET_MIN_WIDTH: u32 = 1280;
const PREVIEW_QUEUE_DEPTH: usize = 2;
const PREVIEW_FRAME_RATE: u32 = 30;

// --- Environment overrides ---
const ENV_HIGH_WIDTH: &str = "CAM_PREVIEW_HIGH_WIDTH";
const ENV_MEDIUM_WIDTH: &str = "CAM_PREVIEW_MEDIUM_WIDTH";
const ENV_QUEUE_DEPTH: &str = "CAM_PREVIEW_QUEUE_DEPTH";
const ENV_FRAME_RATE: &str = "CAM_PREVIEW_FRAME_RATE";

/// Width thresholds used to map a format onto a quality preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresetThresholds {
    pub high_min_width: u32,
    pub medium_min_width: u32,
}

impl Default for PresetThresholds {
    fn default() -> Self {
        Self {
            high_min_width: HIGH_PRESET_MIN_WIDTH,
            medium_min_width: MEDIUM_PRESET_MIN_WIDTH,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorConfig {
    pub thresholds: PresetThresholds,
    /// Frames buffered between the capture worker and the UI before dropping.
    pub preview_queue_depth: usize,
    /// Frame rate requested from the camera when a preset governs the session.
    pub frame_rate: u32,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            thresholds: PresetThresholds::default(),
            preview_queue_depth: PREVIEW_QUEUE_DEPTH,
            frame_rate: PREVIEW_FRAME_RATE,
        }
    }
}

impl CoordinatorConfig {
    /// Defaults, overridden by any valid `CAM_PREVIEW_*` variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(v) = parse_override(&lookup, ENV_HIGH_WIDTH) {
            config.thresholds.high_min_width = v;
        }
        if let Some(v) = parse_override(&lookup, ENV_MEDIUM_WIDTH) {
            config.thresholds.medium_min_width = v;
        }
        if let Some(v) = parse_override::<usize>(&lookup, ENV_QUEUE_DEPTH) {
            if v == 0 {
                warn!(
                    "{} must be at least 1, keeping {}",
                    ENV_QUEUE_DEPTH, config.preview_queue_depth
                );
            } else {
                config.preview_queue_depth = v;
            }
        }
        if let Some(v) = parse_override(&lookup, ENV_FRAME_RATE) {
            config.frame_rate = v;
        }
        if config.thresholds.medium_min_width > config.thresholds.high_min_width {
            warn!(
                "Medium preset width ({}) exceeds high preset width ({}); restoring defaults.",
                config.thresholds.medium_min_width, config.thresholds.high_min_width
            );
            config.thresholds = PresetThresholds::default();
        }
        info!("Coordinator config: {:?}", config);
        config
    }
}

fn parse_override<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring invalid {}={:?}", key, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> CoordinatorConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        CoordinatorConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_without_overrides() {
        assert_eq!(config_from(&[]), CoordinatorConfig::default());
    }

    #[test]
    fn test_valid_overrides_apply() {
        let config = config_from(&[(ENV_HIGH_WIDTH, "2560"), (ENV_QUEUE_DEPTH, "4")]);
        assert_eq!(config.thresholds.high_min_width, 2560);
        assert_eq!(config.thresholds.medium_min_width, MEDIUM_PRESET_MIN_WIDTH);
        assert_eq!(config.preview_queue_depth, 4);
    }

    #[test]
    fn test_invalid_overrides_are_ignored() {
        let config = config_from(&[(ENV_FRAME_RATE, "fast"), (ENV_QUEUE_DEPTH, "0")]);
        assert_eq!(config.frame_rate, PREVIEW_FRAME_RATE);
        assert_eq!(config.preview_queue_depth, PREVIEW_QUEUE_DEPTH);
    }

    #[test]
    fn test_inverted_thresholds_fall_back_to_defaults() {
        let config = config_from(&[(ENV_MEDIUM_WIDTH, "4000")]);
        assert_eq!(config.thresholds, PresetThresholds::default());
    }
}
