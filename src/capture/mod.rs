//! Frame Capture Layer
//!
//! Abstracts the camera behind the `FrameSource` trait so the scan session
//! can be wired against a live device, decoded files, or test doubles. A
//! source is exclusively owned by at most one active session.

pub mod frame;

use std::path::{Path, PathBuf};
use std::time::Duration;

use image::imageops::FilterType;
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::ScanError;
use frame::Frame;

/// Requested stream constraints, mirroring the media-capture surface the
/// product targets: rear-facing preferred, 720p ideal up to 1080p, 30 fps
/// ideal with a 60 fps cap.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConstraints {
    /// Prefer the rear-facing ("environment") camera when available.
    pub prefer_rear_facing: bool,
    /// Ideal capture width in pixels.
    pub ideal_width: u32,
    /// Ideal capture height in pixels.
    pub ideal_height: u32,
    /// Maximum capture width in pixels.
    pub max_width: u32,
    /// Maximum capture height in pixels.
    pub max_height: u32,
    /// Ideal frames per second.
    pub ideal_fps: u32,
    /// Maximum frames per second.
    pub max_fps: u32,
    /// Hard bound on stream acquisition; exceeding it fails the start.
    pub start_timeout_ms: u64,
}

impl Default for CameraConstraints {
    fn default() -> Self {
        Self {
            prefer_rear_facing: true,
            ideal_width: 1280,
            ideal_height: 720,
            max_width: 1920,
            max_height: 1080,
            ideal_fps: 30,
            max_fps: 60,
            start_timeout_ms: 15_000,
        }
    }
}

impl CameraConstraints {
    pub fn start_timeout(&self) -> Duration {
        Duration::from_millis(self.start_timeout_ms)
    }
}

/// A live stream of frames.
///
/// Implementations must honor the constraint timeout in `open` and must make
/// `close` safe to call repeatedly and from any state.
pub trait FrameSource {
    /// Acquire the underlying device or data. Blocks at most for the
    /// constraint timeout.
    fn open(&mut self, constraints: &CameraConstraints) -> Result<(), ScanError>;

    /// The current frame. Only valid after a successful `open`.
    fn frame(&mut self) -> Result<Frame, ScanError>;

    /// Release the stream and any hardware tracks.
    fn close(&mut self);

    fn is_open(&self) -> bool;
}

/// Frame source over decoded image files.
///
/// Backs the uploaded-invoice path and offline CLI scans: each `frame` call
/// yields the current image and advances (wrapping), so a sequence of stills
/// stands in for a stream. Images larger than the constraint maximum are
/// scaled down to fit, preserving aspect ratio.
pub struct FileSource {
    paths: Vec<PathBuf>,
    frames: Vec<Frame>,
    cursor: usize,
}

impl FileSource {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self {
            paths,
            frames: Vec::new(),
            cursor: 0,
        }
    }
}

/// Decode an image file, scaled down to the constraint maximum when it is
/// larger, preserving aspect ratio.
pub fn decode_constrained(
    path: &Path,
    constraints: &CameraConstraints,
) -> Result<RgbaImage, ScanError> {
    let decoded = image::open(path).map_err(|e| {
        ScanError::DeviceUnavailable(format!("failed to decode {}: {e}", path.display()))
    })?;
    let mut rgba = decoded.to_rgba8();

    let (w, h) = rgba.dimensions();
    if w > constraints.max_width || h > constraints.max_height {
        let scale = (constraints.max_width as f32 / w as f32)
            .min(constraints.max_height as f32 / h as f32);
        let new_w = ((w as f32 * scale) as u32).max(1);
        let new_h = ((h as f32 * scale) as u32).max(1);
        debug!(
            "Scaling {} from {}x{} to {}x{}",
            path.display(),
            w,
            h,
            new_w,
            new_h
        );
        rgba = image::imageops::resize(&rgba, new_w, new_h, FilterType::Triangle);
    }
    Ok(rgba)
}

impl FrameSource for FileSource {
    fn open(&mut self, constraints: &CameraConstraints) -> Result<(), ScanError> {
        if self.paths.is_empty() {
            return Err(ScanError::DeviceUnavailable("no input files".into()));
        }

        self.frames.clear();
        self.cursor = 0;

        for path in &self.paths {
            let rgba = decode_constrained(path, constraints)?;
            self.frames.push(Frame::new(rgba));
        }

        info!("File source opened with {} frame(s)", self.frames.len());
        Ok(())
    }

    fn frame(&mut self) -> Result<Frame, ScanError> {
        if self.frames.is_empty() {
            return Err(ScanError::DeviceUnavailable("source not open".into()));
        }
        let frame = self.frames[self.cursor].clone();
        self.cursor = (self.cursor + 1) % self.frames.len();
        Ok(frame)
    }

    fn close(&mut self) {
        self.frames.clear();
        self.cursor = 0;
    }

    fn is_open(&self) -> bool {
        !self.frames.is_empty()
    }
}
