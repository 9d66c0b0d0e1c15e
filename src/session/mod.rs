//! Scan Session Orchestration
//!
//! Drives the capture pipeline through an explicit state machine:
//! Idle -> Starting -> Scanning, with Capturing -> Processing -> Scanning
//! nested inside each capture. Single-threaded and tick-driven; the caller
//! owns the cadence and renders overlays from the emitted events.

use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::capture::frame::Frame;
use crate::capture::{CameraConstraints, FrameSource};
use crate::detect::{DetectionResult, DocumentDetector};
use crate::error::ScanError;
use crate::extract::{AmountAnalysis, AmountExtractor};
use crate::geometry::Quadrilateral;
use crate::recognize::{RecognizedText, TextRecognizer};
use crate::rectify::{RectifiedImage, Rectifier};

/// Session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Starting,
    Scanning,
    Capturing,
    Processing,
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Starting => "starting",
            SessionState::Scanning => "scanning",
            SessionState::Capturing => "capturing",
            SessionState::Processing => "processing",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Raise the help prompt after scanning this long with no detection.
    pub help_prompt_after_ms: u64,
    /// A capture requires a positive detection within this window.
    pub detection_recency_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            help_prompt_after_ms: 3_000,
            detection_recency_ms: 2_000,
        }
    }
}

impl SessionConfig {
    fn help_prompt_after(&self) -> Duration {
        Duration::from_millis(self.help_prompt_after_ms)
    }

    fn detection_recency(&self) -> Duration {
        Duration::from_millis(self.detection_recency_ms)
    }
}

/// Progress events, published on a channel separate from capture results so
/// UI code can consume them without touching the pipeline.
#[derive(Debug, Clone)]
pub enum ScanEvent {
    Started,
    /// Per-tick detection outcome.
    Detection {
        found: bool,
        confidence: f32,
        quad: Option<Quadrilateral>,
    },
    /// Scanning has gone too long without a detection.
    HelpPrompt,
    HelpPromptCleared,
    CaptureStarted {
        capture_id: Uuid,
    },
    /// Recognition failed but the capture still completed.
    RecognitionFailed {
        capture_id: Uuid,
        reason: String,
    },
    CaptureCompleted {
        capture_id: Uuid,
        suggested: Option<f64>,
        confidence: f32,
    },
    Stopped,
}

/// Everything one capture produced.
#[derive(Debug, Clone)]
pub struct CaptureOutcome {
    pub capture_id: Uuid,
    pub rectified: RectifiedImage,
    pub recognized: RecognizedText,
    pub analysis: AmountAnalysis,
    /// True when recognition failed and empty text was substituted.
    pub recognition_failed: bool,
}

/// A positive detection with the frame it came from, retained for capture.
struct LastDetection {
    at: Instant,
    quad: Quadrilateral,
    frame: Frame,
}

/// The scan session. Collaborators are injected at construction; the
/// session owns its frame source exclusively while running.
pub struct ScanSession {
    source: Box<dyn FrameSource>,
    detector: Box<dyn DocumentDetector>,
    rectifier: Rectifier,
    recognizer: Box<dyn TextRecognizer>,
    extractor: AmountExtractor,
    constraints: CameraConstraints,
    config: SessionConfig,
    state: SessionState,
    last_detection: Option<LastDetection>,
    scanning_since: Option<Instant>,
    help_prompt_shown: bool,
    events_tx: Sender<ScanEvent>,
    events_rx: Receiver<ScanEvent>,
}

impl ScanSession {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: Box<dyn FrameSource>,
        detector: Box<dyn DocumentDetector>,
        rectifier: Rectifier,
        recognizer: Box<dyn TextRecognizer>,
        extractor: AmountExtractor,
        constraints: CameraConstraints,
        config: SessionConfig,
    ) -> Self {
        let (events_tx, events_rx) = unbounded();
        Self {
            source,
            detector,
            rectifier,
            recognizer,
            extractor,
            constraints,
            config,
            state: SessionState::Idle,
            last_detection: None,
            scanning_since: None,
            help_prompt_shown: false,
            events_tx,
            events_rx,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Progress event stream. Cloneable; dropping all receivers only means
    /// events go unobserved.
    pub fn events(&self) -> Receiver<ScanEvent> {
        self.events_rx.clone()
    }

    fn emit(&self, event: ScanEvent) {
        let _ = self.events_tx.send(event);
    }

    /// Open the frame source and enter Scanning.
    pub fn start(&mut self) -> Result<(), ScanError> {
        if self.state != SessionState::Idle {
            return Err(ScanError::InvalidState {
                state: self.state.name(),
            });
        }

        self.state = SessionState::Starting;
        if let Err(e) = self.source.open(&self.constraints) {
            self.source.close();
            self.state = SessionState::Idle;
            return Err(e);
        }

        self.state = SessionState::Scanning;
        self.scanning_since = Some(Instant::now());
        self.help_prompt_shown = false;
        self.last_detection = None;
        info!("Scan session started");
        self.emit(ScanEvent::Started);
        Ok(())
    }

    /// Run one detection pass. Valid only while Scanning.
    pub fn tick(&mut self) -> Result<DetectionResult, ScanError> {
        self.tick_at(Instant::now())
    }

    fn tick_at(&mut self, now: Instant) -> Result<DetectionResult, ScanError> {
        if self.state != SessionState::Scanning {
            return Err(ScanError::InvalidState {
                state: self.state.name(),
            });
        }

        let frame = self.source.frame()?;
        let result = self.detector.detect(&frame);

        if result.found {
            if let Some(quad) = result.quad {
                self.last_detection = Some(LastDetection {
                    at: now,
                    quad,
                    frame,
                });
            }
            if self.help_prompt_shown {
                self.help_prompt_shown = false;
                self.emit(ScanEvent::HelpPromptCleared);
            }
        } else {
            let since = self
                .last_detection
                .as_ref()
                .map(|d| d.at)
                .or(self.scanning_since);
            let waited_out = since
                .map(|t| now.duration_since(t) >= self.config.help_prompt_after())
                .unwrap_or(false);
            if waited_out && !self.help_prompt_shown {
                self.help_prompt_shown = true;
                debug!("No document detected for a while, raising help prompt");
                self.emit(ScanEvent::HelpPrompt);
            }
        }

        self.emit(ScanEvent::Detection {
            found: result.found,
            confidence: result.confidence,
            quad: result.quad,
        });
        Ok(result)
    }

    /// Capture the most recent detection and run it through rectification,
    /// recognition, and extraction. Requires a detection within the recency
    /// window; on refusal the session stays in Scanning untouched.
    pub fn capture(&mut self) -> Result<CaptureOutcome, ScanError> {
        self.capture_at(Instant::now())
    }

    fn capture_at(&mut self, now: Instant) -> Result<CaptureOutcome, ScanError> {
        if self.state != SessionState::Scanning {
            return Err(ScanError::InvalidState {
                state: self.state.name(),
            });
        }

        let recent = self
            .last_detection
            .as_ref()
            .filter(|d| now.duration_since(d.at) <= self.config.detection_recency());
        let Some(detection) = recent else {
            return Err(ScanError::NoDocumentDetected);
        };
        let quad = detection.quad;
        let frame = detection.frame.clone();

        let capture_id = Uuid::new_v4();
        self.state = SessionState::Capturing;
        self.emit(ScanEvent::CaptureStarted { capture_id });

        let rectified = self.rectifier.rectify(&frame, &quad);

        self.state = SessionState::Processing;
        let (recognized, recognition_failed) = match self.recognizer.recognize(&rectified) {
            Ok(text) => (text, false),
            Err(e) => {
                // Recognition failures never abort a capture.
                warn!("Recognition failed, continuing with empty text: {e}");
                self.emit(ScanEvent::RecognitionFailed {
                    capture_id,
                    reason: e.to_string(),
                });
                (RecognizedText::empty(), true)
            }
        };

        let analysis = self
            .extractor
            .analyze(&recognized.text, recognized.confidence);

        self.state = SessionState::Scanning;
        info!(
            "Capture {} complete: suggested {:?}, confidence {:.2}",
            capture_id, analysis.suggested, analysis.confidence
        );
        self.emit(ScanEvent::CaptureCompleted {
            capture_id,
            suggested: analysis.suggested,
            confidence: analysis.confidence,
        });

        Ok(CaptureOutcome {
            capture_id,
            rectified,
            recognized,
            analysis,
            recognition_failed,
        })
    }

    /// Release the frame source and return to Idle. Safe from any state and
    /// idempotent.
    pub fn stop(&mut self) {
        let was_idle = self.state == SessionState::Idle;
        self.source.close();
        self.last_detection = None;
        self.scanning_since = None;
        self.help_prompt_shown = false;
        self.state = SessionState::Idle;
        if !was_idle {
            info!("Scan session stopped");
            self.emit(ScanEvent::Stopped);
        }
    }
}

impl Drop for ScanSession {
    fn drop(&mut self) {
        if self.state != SessionState::Idle {
            self.stop();
        }
    }
}
