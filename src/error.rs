//! Error taxonomy for the scan pipeline.
//!
//! Hardware and permission failures propagate to the caller; algorithmic
//! degraded modes (no detector backend, empty OCR text) are absorbed by the
//! pipeline and never surface here.

use std::time::Duration;
use thiserror::Error;

/// Errors reported by frame sources, recognizers and the scan session.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Camera access was denied. Fatal to the current session.
    #[error("camera permission denied: {0}")]
    PermissionDenied(String),

    /// No camera found, or the device is held by another application.
    #[error("camera unavailable: {0}")]
    DeviceUnavailable(String),

    /// Camera start exceeded the configured bound.
    #[error("camera start timed out after {0:?}")]
    StartTimeout(Duration),

    /// Capture requested without a recent positive detection.
    #[error("no document detected recently enough to capture")]
    NoDocumentDetected,

    /// The external text-recognition engine failed.
    #[error("text recognition failed: {0}")]
    Recognition(String),

    /// Operation is not valid in the session's current state.
    #[error("operation not valid in state {state}")]
    InvalidState { state: &'static str },
}
