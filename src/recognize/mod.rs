//! Text Recognition Layer
//!
//! Recognition is an external collaborator behind the `TextRecognizer`
//! trait: an HTTP backend posts the rectified image to a local OCR service,
//! and a stub backend keeps the pipeline running offline. The backend is
//! chosen by configuration at startup, never probed at runtime.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::ScanError;
use crate::rectify::RectifiedImage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecognizerBackend {
    /// POST the capture to a local OCR service.
    Http,
    /// Offline stand-in; recognizes nothing.
    #[default]
    Stub,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognizerConfig {
    pub backend: RecognizerBackend,
    /// OCR service endpoint for the HTTP backend.
    pub endpoint: String,
    /// Per-request timeout.
    pub timeout_ms: u64,
    /// Recognition language hint passed to the service.
    pub language: String,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            backend: RecognizerBackend::Stub,
            endpoint: "http://127.0.0.1:8884/ocr".to_string(),
            timeout_ms: 30_000,
            language: "spa".to_string(),
        }
    }
}

/// Recognized text with a confidence normalized to [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecognizedText {
    pub text: String,
    pub confidence: f32,
}

impl RecognizedText {
    /// Build from an engine result. Engines report confidence on a 0-100
    /// scale.
    pub fn from_engine(text: String, engine_confidence: f32) -> Self {
        Self {
            text,
            confidence: (engine_confidence / 100.0).clamp(0.0, 1.0),
        }
    }

    /// The absorbed-failure value: no text, zero confidence.
    pub fn empty() -> Self {
        Self {
            text: String::new(),
            confidence: 0.0,
        }
    }
}

/// Turns a rectified capture into text.
pub trait TextRecognizer {
    fn recognize(&self, image: &RectifiedImage) -> Result<RecognizedText, ScanError>;
}

/// Build the configured recognizer backend.
pub fn build_recognizer(config: &RecognizerConfig) -> Result<Box<dyn TextRecognizer>, ScanError> {
    match config.backend {
        RecognizerBackend::Http => Ok(Box::new(HttpRecognizer::new(config)?)),
        RecognizerBackend::Stub => {
            info!("Text recognition running in stub mode");
            Ok(Box::new(StubRecognizer))
        }
    }
}

#[derive(Serialize)]
struct OcrRequest<'a> {
    /// PNG data URL of the capture.
    image: &'a str,
    language: &'a str,
}

#[derive(Deserialize)]
struct OcrResponse {
    text: String,
    /// 0-100 engine scale.
    confidence: f32,
}

/// OCR over a local HTTP service.
pub struct HttpRecognizer {
    client: reqwest::blocking::Client,
    endpoint: String,
    language: String,
}

impl HttpRecognizer {
    pub fn new(config: &RecognizerConfig) -> Result<Self, ScanError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| ScanError::Recognition(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            language: config.language.clone(),
        })
    }
}

impl TextRecognizer for HttpRecognizer {
    fn recognize(&self, image: &RectifiedImage) -> Result<RecognizedText, ScanError> {
        let data_url = image
            .to_data_url()
            .map_err(|e| ScanError::Recognition(format!("failed to encode capture: {e}")))?;

        let response = self
            .client
            .post(&self.endpoint)
            .json(&OcrRequest {
                image: &data_url,
                language: &self.language,
            })
            .send()
            .map_err(|e| ScanError::Recognition(format!("OCR request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(ScanError::Recognition(format!(
                "OCR service returned {}",
                response.status()
            )));
        }

        let body: OcrResponse = response
            .json()
            .map_err(|e| ScanError::Recognition(format!("invalid OCR response: {e}")))?;

        debug!(
            "Recognized {} character(s) at engine confidence {:.1}",
            body.text.len(),
            body.confidence
        );
        Ok(RecognizedText::from_engine(body.text, body.confidence))
    }
}

/// Offline stand-in used when no OCR service is configured.
pub struct StubRecognizer;

impl TextRecognizer for StubRecognizer {
    fn recognize(&self, _image: &RectifiedImage) -> Result<RecognizedText, ScanError> {
        Ok(RecognizedText::empty())
    }
}
