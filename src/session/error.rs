// src/session/error.rs
use thiserror::Error;

/// Failures at the platform camera seam.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("camera backend error: {0}")]
    Camera(String),

    #[error("device configuration is already locked")]
    Busy,
}

/// Failures of coordinator operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("camera access was denied")]
    PermissionDenied,

    #[error("no camera device found")]
    DeviceNotFound,

    #[error("could not lock device for configuration: {0}")]
    ConfigurationLockFailed(String),

    #[error("format index {index} is out of range ({count} formats available)")]
    InvalidFormatIndex { index: usize, count: usize },

    #[error("format id belongs to an earlier enumeration")]
    StaleFormat,

    #[error("capture session is not configured")]
    NotConfigured,

    #[error("capture session failed to start: {0}")]
    StartFailed(String),

    #[error("{0}")]
    Backend(#[from] BackendError),
}

pub type SessionResult<T> = Result<T, SessionError>;
